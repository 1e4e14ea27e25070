use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Callback invoked with the coalesced completion level (0..=100)
pub type ProgressSink = Box<dyn Fn(u8) + Send + Sync>;

/// Tracks work units for one job and publishes the completion percentage.
///
/// Updates are coalesced: the sink only fires when the rounded percentage
/// actually advances, and the published value never decreases even with
/// concurrent reporters.
pub struct ProgressTracker {
    total: AtomicUsize,
    worked: AtomicUsize,
    last_published: AtomicU8,
    sink: ProgressSink,
}

impl ProgressTracker {
    pub fn new(sink: ProgressSink) -> Self {
        Self {
            total: AtomicUsize::new(0),
            worked: AtomicUsize::new(0),
            last_published: AtomicU8::new(0),
            sink,
        }
    }

    /// Declares the total number of work units. May be called once the job
    /// knows its workload; until then the level stays at zero.
    pub fn begin(&self, total_work: usize) {
        self.total.store(total_work.max(1), Ordering::SeqCst);
        self.worked.store(0, Ordering::SeqCst);
    }

    pub fn worked(&self, units: usize) {
        self.worked.fetch_add(units, Ordering::SeqCst);
        self.publish();
    }

    /// Forces the level to 100 regardless of remaining units
    pub fn done(&self) {
        let total = self.total.load(Ordering::SeqCst);
        self.worked.store(total, Ordering::SeqCst);
        self.publish();
    }

    pub fn completion_level(&self) -> u8 {
        self.last_published.load(Ordering::SeqCst)
    }

    fn publish(&self) {
        let total = self.total.load(Ordering::SeqCst);
        if total == 0 {
            return;
        }
        let worked = self.worked.load(Ordering::SeqCst).min(total);
        let level = (worked * 100 / total) as u8;
        // fetch_max keeps the published value monotone under races
        let previous = self.last_published.fetch_max(level, Ordering::SeqCst);
        if level > previous {
            (self.sink)(level);
        }
    }
}

/// Shared cooperative cancellation flag. Long-running work polls
/// [`CancelFlag::is_canceled`] at its own safe points; nothing is aborted
/// forcibly.
#[derive(Debug, Default)]
pub struct CancelFlag {
    canceled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested
    pub async fn canceled(&self) {
        while !self.is_canceled() {
            let notified = self.notify.notified();
            if self.is_canceled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    fn tracker_with_log() -> (Arc<Mutex<Vec<u8>>>, ProgressTracker) {
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&published);
        let tracker = ProgressTracker::new(Box::new(move |level| {
            sink_log.lock().unwrap().push(level);
        }));
        (published, tracker)
    }

    #[test]
    fn test_levels_are_monotone_and_coalesced() {
        let (published, tracker) = tracker_with_log();
        tracker.begin(8);
        for _ in 0..8 {
            tracker.worked(1);
        }
        let levels = published.lock().unwrap().clone();
        assert_eq!(*levels.last().unwrap(), 100);
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_overreporting_clamps_at_hundred() {
        let (published, tracker) = tracker_with_log();
        tracker.begin(2);
        tracker.worked(5);
        tracker.worked(5);
        assert_eq!(*published.lock().unwrap(), vec![100]);
        assert_eq!(tracker.completion_level(), 100);
    }

    #[tokio::test]
    async fn test_cancel_flag_wakes_waiters() {
        let flag = Arc::new(CancelFlag::new());
        let waiter_flag = Arc::clone(&flag);
        let waiter = tokio::spawn(async move { waiter_flag.canceled().await });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        flag.request();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve after request")
            .unwrap();
        assert!(flag.is_canceled());
    }
}
