//! Per-command usage statistics with scheduled drain.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Counts accumulated since the last drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageReport {
    /// Invocations per command identifier.
    pub counts: BTreeMap<String, u64>,
}

impl UsageReport {
    /// Sum over all commands.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl fmt::Display for UsageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (command, count) in &self.counts {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{command}={count}")?;
            first = false;
        }
        Ok(())
    }
}

/// Process-wide usage aggregator.
#[derive(Debug, Default)]
pub struct UsageStats {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl UsageStats {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one invocation of `command`.
    pub fn record(&self, command: &str) {
        let mut counters = self.lock();
        match counters.get_mut(command) {
            Some(count) => *count += 1,
            None => {
                counters.insert(command.to_string(), 1);
            }
        }
    }

    /// Current count for `command`.
    #[must_use]
    pub fn count(&self, command: &str) -> u64 {
        self.lock().get(command).copied().unwrap_or(0)
    }

    /// Copy of the current counts, leaving them in place.
    #[must_use]
    pub fn snapshot(&self) -> UsageReport {
        UsageReport {
            counts: self.lock().clone(),
        }
    }

    /// Take the current counts and reset them to zero.
    pub fn drain(&self) -> UsageReport {
        UsageReport {
            counts: std::mem::take(&mut *self.lock()),
        }
    }

    /// Drain and log the counts at every UTC day boundary until cancelled.
    pub fn spawn_daily_drain(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        self.spawn_drain_task(cancel, || until_next_day_boundary(SystemTime::now()))
    }

    /// Drain and log the counts after each delay produced by `next_delay`.
    pub fn spawn_drain_task<F>(
        self: Arc<Self>,
        cancel: CancellationToken,
        mut next_delay: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Duration + Send + 'static,
    {
        tokio::spawn(async move {
            loop {
                let delay = next_delay();
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {
                        let report = self.drain();
                        tracing::info!(total = report.total(), "Usage since last drain: {report}");
                    }
                }
            }
            tracing::debug!("Usage drain task stopped");
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, u64>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Time left until the next UTC midnight.
///
/// Exactly at midnight this returns a full day, so a drain that fires on the
/// boundary does not fire again immediately.
#[must_use]
pub fn until_next_day_boundary(now: SystemTime) -> Duration {
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let into_day = since_epoch.as_secs() % SECS_PER_DAY;
    let remaining = Duration::from_secs(SECS_PER_DAY - into_day);
    remaining
        .saturating_sub(Duration::from_nanos(u64::from(since_epoch.subsec_nanos())))
        .max(Duration::from_millis(1))
}
