use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default interval between dropped-record warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Helper that rate limits dropped-record warnings.
///
/// The caller increments the drop counter via [`record_drop`]. The next call to
/// [`warn_if_due`] emits a warning using the provided callback if the configured
/// interval has elapsed. [`flush`] emits a warning immediately if any records
/// have been dropped since the last emission.
///
/// [`record_drop`]: RateLimitedWarner::record_drop
/// [`warn_if_due`]: RateLimitedWarner::warn_if_due
/// [`flush`]: RateLimitedWarner::flush
#[derive(Debug)]
pub struct RateLimitedWarner {
    origin: Instant,
    interval: Duration,
    // Milliseconds since `origin` of the last warning; u64::MAX means never.
    last_warn: AtomicU64,
    dropped: AtomicU64,
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}

impl RateLimitedWarner {
    /// Create a new [`RateLimitedWarner`]. The first warning can be emitted
    /// immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            interval,
            last_warn: AtomicU64::new(u64::MAX),
            dropped: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX - 1)
    }

    /// Increment the dropped-record counter.
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[cfg(test)]
    fn pending(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Emit a warning if the rate limit interval has elapsed.
    pub fn warn_if_due(&self, mut warn: impl FnMut(u64)) {
        let now = self.now_ms();
        let prev = self.last_warn.load(Ordering::Relaxed);
        let interval = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        if prev == u64::MAX || now.saturating_sub(prev) >= interval {
            let count = self.dropped.swap(0, Ordering::Relaxed);
            if count > 0 {
                warn(count);
                self.last_warn.store(now, Ordering::Relaxed);
            }
        }
    }

    /// Immediately warn about any dropped records.
    pub fn flush(&self, mut warn: impl FnMut(u64)) {
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn.store(self.now_ms(), Ordering::Relaxed);
        }
    }
}
