//! Periodic status line.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Default interval between status lines.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Logs how many posts arrived since the previous report.
pub struct StatusReporter {
    received: Arc<AtomicU64>,
    interval: Duration,
}

impl StatusReporter {
    /// `received` is shared with the pipeline, which increments it per post.
    pub fn new(received: Arc<AtomicU64>, interval: Duration) -> Self {
        Self { received, interval }
    }

    /// Read and reset the counter.
    pub fn take_count(&self) -> u64 {
        self.received.swap(0, Ordering::Relaxed)
    }

    /// Report every interval until `shutdown` flips to `true`.
    ///
    /// Returns the total number of posts reported.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut total = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let count = self.take_count();
                    total += count;
                    tracing::info!(
                        "Received {} posts in the last {}s",
                        count,
                        self.interval.as_secs()
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_count_resets() {
        let counter = Arc::new(AtomicU64::new(7));
        let reporter = StatusReporter::new(Arc::clone(&counter), DEFAULT_REPORT_INTERVAL);

        assert_eq!(reporter.take_count(), 7);
        assert_eq!(reporter.take_count(), 0);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_each_interval() {
        let counter = Arc::new(AtomicU64::new(0));
        let reporter = StatusReporter::new(Arc::clone(&counter), DEFAULT_REPORT_INTERVAL);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(reporter.run(shutdown_rx));

        counter.fetch_add(5, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 5);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 0);

        counter.fetch_add(4, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 0);

        counter.fetch_add(3, Ordering::Relaxed);
        shutdown.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), 9);
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }
}
