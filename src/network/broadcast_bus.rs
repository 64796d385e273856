//! Broadcast bus for cross-instance fan-out.
//!
//! Joining a channel yields a [`BusPublisher`] (cheap to clone, handed to
//! whoever announces completions) and a [`BusSubscription`] (owned by the
//! event loop). Two transports sit behind the pair:
//!
//! - [`LocalChannel`]: a `tokio::sync::broadcast` hub for controllers living in
//!   the same process.
//! - [`UdpChannel`](super::udp_channel::UdpChannel): loopback datagrams between
//!   processes sharing a storage path.
//!
//! When no transport is available the pair is *detached*: publishing succeeds
//! without effect and the subscription never yields, which leaves presence
//! with only the local instance.

use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::types::{BusMessage, Envelope, PeerId};
use super::udp_channel::{UdpInbox, UdpRoute};
use crate::error_handling::types::TransportError;

#[derive(Clone)]
enum Route {
    Local(broadcast::Sender<Envelope>),
    Udp(Arc<UdpRoute>),
    Detached,
}

/// Sending half of a joined channel.
#[derive(Clone)]
pub struct BusPublisher {
    origin: PeerId,
    route: Route,
}

impl BusPublisher {
    pub(crate) fn local(origin: PeerId, tx: broadcast::Sender<Envelope>) -> Self {
        Self { origin, route: Route::Local(tx) }
    }

    pub(crate) fn udp(origin: PeerId, route: Arc<UdpRoute>) -> Self {
        Self { origin, route: Route::Udp(route) }
    }

    pub fn detached(origin: PeerId) -> Self {
        Self { origin, route: Route::Detached }
    }

    pub fn origin(&self) -> &PeerId {
        &self.origin
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.route, Route::Detached)
    }

    /// Publishes `message` to every other instance on the channel.
    pub fn publish(&self, message: &BusMessage) -> Result<(), TransportError> {
        match &self.route {
            Route::Local(tx) => {
                // `send` only fails when nobody is subscribed, which is not an error here.
                let receivers = tx
                    .send(Envelope {
                        origin: self.origin.clone(),
                        message: message.clone(),
                    })
                    .unwrap_or(0);
                debug!("[{}] published {:?} to {} receiver(s)", self.origin, message, receivers);
                Ok(())
            }
            Route::Udp(route) => route.send(message),
            Route::Detached => {
                debug!("[{}] channel detached, dropping {:?}", self.origin, message);
                Ok(())
            }
        }
    }
}

enum Source {
    Local(broadcast::Receiver<Envelope>),
    Udp(UdpInbox),
    Detached,
}

/// Receiving half of a joined channel. Never yields the owner's own messages.
pub struct BusSubscription {
    origin: PeerId,
    source: Source,
}

impl BusSubscription {
    pub(crate) fn local(origin: PeerId, rx: broadcast::Receiver<Envelope>) -> Self {
        Self { origin, source: Source::Local(rx) }
    }

    pub(crate) fn udp(origin: PeerId, inbox: UdpInbox) -> Self {
        Self { origin, source: Source::Udp(inbox) }
    }

    pub fn detached(origin: PeerId) -> Self {
        Self { origin, source: Source::Detached }
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.source, Source::Detached)
    }

    /// Waits for the next message from another instance.
    ///
    /// Cancel safe, so it can sit in a `tokio::select!` loop.
    pub async fn recv(&mut self) -> Result<BusMessage, TransportError> {
        match &mut self.source {
            Source::Local(rx) => loop {
                match rx.recv().await {
                    Ok(envelope) if envelope.origin == self.origin => continue,
                    Ok(envelope) => return Ok(envelope.message),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[{}] bus subscriber lagged, skipped {} message(s)", self.origin, skipped);
                    }
                    Err(RecvError::Closed) => return Err(TransportError::ChannelClosed),
                }
            },
            Source::Udp(inbox) => inbox.recv().await,
            Source::Detached => std::future::pending().await,
        }
    }

    /// Releases the subscription. Further `recv` calls never yield.
    pub fn close(&mut self) {
        if let Source::Udp(inbox) = &mut self.source {
            inbox.unregister();
        }
        self.source = Source::Detached;
        debug!("[{}] bus subscription closed", self.origin);
    }
}

/// In-process channel shared by every controller holding a clone.
#[derive(Clone)]
pub struct LocalChannel {
    tx: broadcast::Sender<Envelope>,
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalChannel {
    /// Create a new channel with a bounded capacity of 256 messages.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn join(&self, origin: PeerId) -> (BusPublisher, BusSubscription) {
        let rx = self.tx.subscribe();
        (
            BusPublisher::local(origin.clone(), self.tx.clone()),
            BusSubscription::local(origin, rx),
        )
    }
}

/// A publisher/subscription pair that is not connected to anything.
pub fn detached(origin: PeerId) -> (BusPublisher, BusSubscription) {
    (BusPublisher::detached(origin.clone()), BusSubscription::detached(origin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beverage::BeverageKind;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_local_publish_reaches_peer() {
        let channel = LocalChannel::new();
        let (pub_a, _sub_a) = channel.join(PeerId::from("a"));
        let (_pub_b, mut sub_b) = channel.join(PeerId::from("b"));

        pub_a.publish(&BusMessage::cup_finished(BeverageKind::Cappuccino)).unwrap();
        let got = sub_b.recv().await.unwrap();
        assert_eq!(got.finished_kind(), Some(BeverageKind::Cappuccino));
    }

    #[tokio::test]
    async fn test_local_echo_is_dropped() {
        let channel = LocalChannel::new();
        let (pub_a, mut sub_a) = channel.join(PeerId::from("a"));
        let (pub_b, _sub_b) = channel.join(PeerId::from("b"));

        pub_a.publish(&BusMessage::heartbeat(&PeerId::from("a"))).unwrap();
        pub_b.publish(&BusMessage::heartbeat(&PeerId::from("b"))).unwrap();

        let got = sub_a.recv().await.unwrap();
        assert_eq!(got, BusMessage::heartbeat(&PeerId::from("b")));
    }

    #[tokio::test]
    async fn test_messages_from_one_peer_keep_order() {
        let channel = LocalChannel::new();
        let (pub_a, _sub_a) = channel.join(PeerId::from("a"));
        let (_pub_b, mut sub_b) = channel.join(PeerId::from("b"));

        for kind in BeverageKind::ALL {
            pub_a.publish(&BusMessage::cup_finished(kind)).unwrap();
        }
        for kind in BeverageKind::ALL {
            assert_eq!(sub_b.recv().await.unwrap().finished_kind(), Some(kind));
        }
    }

    #[test]
    fn test_recv_wakes_only_for_peer_messages() {
        let channel = LocalChannel::new();
        let (pub_a, _sub_a) = channel.join(PeerId::from("a"));
        let (pub_b, mut sub_b) = channel.join(PeerId::from("b"));

        let mut recv = tokio_test::task::spawn(sub_b.recv());
        tokio_test::assert_pending!(recv.poll());

        pub_b.publish(&BusMessage::heartbeat(&PeerId::from("b"))).unwrap();
        tokio_test::assert_pending!(recv.poll());

        pub_a.publish(&BusMessage::cup_finished(BeverageKind::IcedCoffee)).unwrap();
        assert!(recv.is_woken());
        let got = tokio_test::assert_ready_ok!(recv.poll());
        assert_eq!(got.finished_kind(), Some(BeverageKind::IcedCoffee));
    }

    #[tokio::test]
    async fn test_publish_without_peers_is_ok() {
        let channel = LocalChannel::new();
        let (publisher, subscription) = channel.join(PeerId::from("solo"));
        drop(subscription);
        publisher.publish(&BusMessage::heartbeat(&PeerId::from("solo"))).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_never_yields() {
        let (publisher, mut subscription) = detached(PeerId::from("x"));
        assert!(publisher.is_detached());
        publisher.publish(&BusMessage::heartbeat(&PeerId::from("x"))).unwrap();
        assert!(timeout(Duration::from_secs(60), subscription.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_subscription_goes_quiet() {
        let channel = LocalChannel::new();
        let (pub_a, _sub_a) = channel.join(PeerId::from("a"));
        let (_pub_b, mut sub_b) = channel.join(PeerId::from("b"));

        sub_b.close();
        assert!(sub_b.is_detached());
        pub_a.publish(&BusMessage::heartbeat(&PeerId::from("a"))).unwrap();
        assert!(timeout(Duration::from_secs(5), sub_b.recv()).await.is_err());
    }
}
