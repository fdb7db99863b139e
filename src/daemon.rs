//! Repeated backups with cooperative shutdown
//!
//! The loop runs a job, then waits for the interval while polling a shared
//! shutdown flag every 200 ms. A job in progress is never interrupted; the
//! flag is only honoured between runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::error::BackupResult;

/// How often the shutdown flag is checked while waiting
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Consecutive failures before a health warning is logged
pub const FAILURE_WARNING_THRESHOLD: u32 = 3;

/// Counters kept across iterations
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DaemonStats {
    pub iterations: u32,
    pub successes: u32,
    pub failures: u32,
    pub consecutive_failures: u32,
    pub uptime: Duration,
}

/// Runs a job repeatedly until asked to stop
pub struct Daemon {
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    max_iterations: Option<u32>,
}

impl Daemon {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            max_iterations: None,
        }
    }

    /// Share an externally owned flag, e.g. one set by a signal handler
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    /// Stop after `n` runs
    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run `job` until shutdown; errors are counted, not propagated
    pub fn run<T, F>(&self, mut job: F) -> DaemonStats
    where
        F: FnMut(u32) -> BackupResult<T>,
    {
        let started = Instant::now();
        let mut stats = DaemonStats::default();
        info!(interval_secs = self.interval.as_secs(), "Daemon started");

        while !self.stopping() {
            stats.iterations += 1;
            match job(stats.iterations) {
                Ok(_) => {
                    stats.successes += 1;
                    stats.consecutive_failures = 0;
                    info!(iteration = stats.iterations, "Backup iteration succeeded");
                }
                Err(e) => {
                    stats.failures += 1;
                    stats.consecutive_failures += 1;
                    error!(iteration = stats.iterations, error = %e, "Backup iteration failed");
                    if stats.consecutive_failures >= FAILURE_WARNING_THRESHOLD {
                        warn!(
                            consecutive = stats.consecutive_failures,
                            "Repeated failures, check configuration and connectivity"
                        );
                    }
                }
            }

            if self.max_iterations.is_some_and(|max| stats.iterations >= max) {
                break;
            }
            self.wait();
        }

        stats.uptime = started.elapsed();
        info!(
            iterations = stats.iterations,
            successes = stats.successes,
            failures = stats.failures,
            "Daemon stopped"
        );
        stats
    }

    /// Sleep for the interval in poll-sized steps, returning early on shutdown
    fn wait(&self) {
        let deadline = Instant::now() + self.interval;
        while !self.stopping() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackupError;

    #[test]
    fn test_counts_successes_and_failures() {
        let daemon = Daemon::new(Duration::ZERO).with_max_iterations(5);
        let stats = daemon.run(|i| {
            if i % 2 == 0 {
                Err(BackupError::Validation("boom".into()))
            } else {
                Ok(())
            }
        });
        assert_eq!(stats.iterations, 5);
        assert_eq!(stats.successes, 3);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[test]
    fn test_consecutive_failures_tracked() {
        let daemon = Daemon::new(Duration::ZERO).with_max_iterations(4);
        let stats = daemon.run(|_| -> BackupResult<()> { Err(BackupError::Validation("down".into())) });
        assert_eq!(stats.consecutive_failures, 4);
    }

    #[test]
    fn test_shutdown_interrupts_long_wait() {
        let daemon = Daemon::new(Duration::from_secs(600));
        let flag = daemon.shutdown_flag();

        let setter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        let stats = daemon.run(|_| Ok(()));
        setter.join().unwrap();

        assert_eq!(stats.iterations, 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_preset_flag_skips_all_runs() {
        let flag = Arc::new(AtomicBool::new(true));
        let daemon = Daemon::new(Duration::from_secs(1)).with_shutdown_flag(flag);
        let stats = daemon.run(|_| Ok(()));
        assert_eq!(stats.iterations, 0);
    }
}
