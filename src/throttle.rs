use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Releases callers no faster than one per `interval`. The first release is
/// immediate.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_release: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_release: None,
        }
    }

    pub async fn ready(&mut self) {
        if let Some(last) = self.last_release {
            sleep_until(last + self.interval).await;
        }
        self.last_release = Some(Instant::now());
    }
}
