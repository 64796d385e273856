//! Serverless cross-process channel over loopback UDP.
//!
//! Every member binds `127.0.0.1:<ephemeral>` and registers its port in
//! `<channel_dir>/<peer_id>.port`. Publishing reads the directory and sends
//! the JSON wire message as one datagram to every registered port except its
//! own. Registrations left behind by crashed instances only cost a wasted
//! datagram.

use std::fs;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::UdpSocket;

use super::broadcast_bus::{BusPublisher, BusSubscription};
use super::types::{BusMessage, PeerId};
use crate::error_handling::types::TransportError;

const REGISTRATION_EXTENSION: &str = "port";
const MAX_DATAGRAM: usize = 2048;

pub struct UdpChannel;

impl UdpChannel {
    /// Binds a loopback socket and registers it under `channel_dir`.
    pub async fn join(
        channel_dir: &Path,
        origin: PeerId,
    ) -> Result<(BusPublisher, BusSubscription), TransportError> {
        fs::create_dir_all(channel_dir).map_err(TransportError::RegistrationFailed)?;

        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(TransportError::BindFailed)?;
        let own_port = socket
            .local_addr()
            .map_err(TransportError::BindFailed)?
            .port();

        let registration =
            channel_dir.join(format!("{}.{}", origin, REGISTRATION_EXTENSION));
        fs::write(&registration, own_port.to_string())
            .map_err(TransportError::RegistrationFailed)?;
        info!(
            "[{}] joined channel {} on 127.0.0.1:{}",
            origin,
            channel_dir.display(),
            own_port
        );

        let socket = Arc::new(socket);
        let route = Arc::new(UdpRoute {
            origin: origin.clone(),
            socket: socket.clone(),
            channel_dir: channel_dir.to_path_buf(),
            own_port,
        });
        let inbox = UdpInbox {
            socket,
            registration: Some(registration),
            buf: vec![0; MAX_DATAGRAM],
        };

        Ok((
            BusPublisher::udp(origin.clone(), route),
            BusSubscription::udp(origin, inbox),
        ))
    }
}

pub(crate) struct UdpRoute {
    origin: PeerId,
    socket: Arc<UdpSocket>,
    channel_dir: PathBuf,
    own_port: u16,
}

impl UdpRoute {
    fn member_ports(&self) -> Result<Vec<u16>, TransportError> {
        let entries = fs::read_dir(&self.channel_dir)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let mut ports = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(REGISTRATION_EXTENSION) {
                continue;
            }
            match fs::read_to_string(&path).map(|s| s.trim().parse::<u16>()) {
                Ok(Ok(port)) if port != self.own_port => ports.push(port),
                Ok(Ok(_)) => {}
                _ => debug!("[{}] skipping unreadable registration {}", self.origin, path.display()),
            }
        }
        Ok(ports)
    }

    pub(crate) fn send(&self, message: &BusMessage) -> Result<(), TransportError> {
        let bytes = message.encode()?;
        let ports = self.member_ports()?;

        let mut delivered = 0usize;
        for port in &ports {
            let target = SocketAddr::from((Ipv4Addr::LOCALHOST, *port));
            match self.socket.try_send_to(&bytes, target) {
                Ok(_) => delivered += 1,
                Err(e) => debug!("[{}] datagram to {} not sent: {}", self.origin, target, e),
            }
        }
        debug!(
            "[{}] published {:?} to {}/{} member(s)",
            self.origin,
            message,
            delivered,
            ports.len()
        );
        Ok(())
    }
}

pub(crate) struct UdpInbox {
    socket: Arc<UdpSocket>,
    registration: Option<PathBuf>,
    buf: Vec<u8>,
}

impl UdpInbox {
    pub(crate) async fn recv(&mut self) -> Result<BusMessage, TransportError> {
        loop {
            let (len, from) = match self.socket.recv_from(&mut self.buf).await {
                Ok(received) => received,
                // Some platforms report an earlier datagram to a dead port here.
                Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused) => {
                    continue
                }
                Err(e) => return Err(TransportError::ReceiveFailed(e)),
            };
            match BusMessage::decode(&self.buf[..len]) {
                Ok(message) => return Ok(message),
                Err(e) => debug!("Ignoring datagram from {}: {}", from, e),
            }
        }
    }

    pub(crate) fn unregister(&mut self) {
        if let Some(path) = self.registration.take() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove channel registration {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for UdpInbox {
    fn drop(&mut self) {
        self.unregister();
    }
}
