use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum interval between outbound requests
///
/// The gate hands out request slots: each caller reserves the earliest slot
/// that is at least `interval` after the previously reserved one, then sleeps
/// until it. The reservation happens under a lock, the sleep does not, so
/// concurrent workers are spaced strictly without serializing their I/O.
#[derive(Debug)]
pub struct PolitenessGate {
    interval: Duration,
    last_slot: Mutex<Option<Instant>>,
}

impl PolitenessGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_slot: Mutex::new(None),
        }
    }

    /// Waits until this caller may issue its request
    pub async fn wait(&self) {
        let slot = self.reserve(Instant::now());
        tokio::time::sleep_until(slot).await;
    }

    /// Reserves the next free slot relative to `now`
    fn reserve(&self, now: Instant) -> Instant {
        let mut last = self.last_slot.lock().unwrap_or_else(|e| e.into_inner());
        let slot = match *last {
            Some(previous) => std::cmp::max(now, previous + self.interval),
            None => now,
        };
        *last = Some(slot);
        slot
    }
}
