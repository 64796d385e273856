use log::debug;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::session_management::SessionEvent;

const TICK: Duration = Duration::from_secs(1);

/// One-second countdown bound to a single session epoch.
///
/// Sends `Tick` for every second that leaves time on the clock, then exactly
/// one `Expired`, then stops. Stopping (or dropping) the timer aborts the
/// task; events it already queued still carry the old epoch and are discarded
/// by the controller.
pub struct CountdownTimer {
    epoch: u64,
    handle: JoinHandle<()>,
}

impl CountdownTimer {
    pub fn start(epoch: u64, duration_secs: u32, events: UnboundedSender<SessionEvent>) -> Self {
        debug!("Countdown {} started for {}s", epoch, duration_secs);
        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + TICK, TICK);
            let mut remaining = duration_secs;
            while remaining > 0 {
                ticks.tick().await;
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
                if events.send(SessionEvent::Tick { epoch, remaining_secs: remaining }).is_err() {
                    return;
                }
            }
            debug!("Countdown {} expired", epoch);
            let _ = events.send(SessionEvent::Expired { epoch });
        });
        Self { epoch, handle }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn stop(self) {
        // Drop aborts the task.
        debug!("Countdown {} stopped", self.epoch);
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_counts_down_then_expires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _timer = CountdownTimer::start(7, 3, tx);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[0], SessionEvent::Tick { epoch: 7, remaining_secs: 2 }));
        assert!(matches!(seen[1], SessionEvent::Tick { epoch: 7, remaining_secs: 1 }));
        assert!(matches!(seen[2], SessionEvent::Expired { epoch: 7 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_are_one_second_apart() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        let _timer = CountdownTimer::start(1, 2, tx);

        rx.recv().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        rx.recv().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_timer_goes_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = CountdownTimer::start(3, 60, tx);

        assert!(matches!(rx.recv().await, Some(SessionEvent::Tick { remaining_secs: 59, .. })));
        timer.stop();
        tokio::time::sleep(Duration::from_secs(120)).await;

        let mut late = Vec::new();
        while let Ok(event) = rx.try_recv() {
            late.push(event);
        }
        assert!(late.iter().all(|e| !matches!(e, SessionEvent::Expired { .. })));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_expires_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _timer = CountdownTimer::start(2, 0, tx);
        assert!(matches!(rx.recv().await, Some(SessionEvent::Expired { epoch: 2 })));
    }
}
