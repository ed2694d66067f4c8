use super::batch::FlushReason;
use super::error::Operation;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferMetrics {
    pub items_accepted: u64,
    pub items_flushed: u64,
    pub batches_flushed: u64,
    pub capacity_flushes: u64,
    pub interval_flushes: u64,
    pub manual_flushes: u64,
    pub close_flushes: u64,
    pub push_timeouts: u64,
    pub flush_timeouts: u64,
    pub close_timeouts: u64,
    pub closed_rejections: u64,
}

impl BufferMetrics {
    /// Items accepted by the controller but not yet handed to the flusher.
    pub fn pending(&self) -> u64 {
        self.items_accepted.saturating_sub(self.items_flushed)
    }
}

/// Counters shared between the gateway handles and the controller task.
#[derive(Debug)]
pub struct BufferMetricsCollector {
    items_accepted: AtomicU64,
    items_flushed: AtomicU64,
    batches_flushed: AtomicU64,
    capacity_flushes: AtomicU64,
    interval_flushes: AtomicU64,
    manual_flushes: AtomicU64,
    close_flushes: AtomicU64,
    push_timeouts: AtomicU64,
    flush_timeouts: AtomicU64,
    close_timeouts: AtomicU64,
    closed_rejections: AtomicU64,
    start_time: Instant,
}

impl BufferMetricsCollector {
    pub(crate) fn new() -> Self {
        Self {
            items_accepted: AtomicU64::new(0),
            items_flushed: AtomicU64::new(0),
            batches_flushed: AtomicU64::new(0),
            capacity_flushes: AtomicU64::new(0),
            interval_flushes: AtomicU64::new(0),
            manual_flushes: AtomicU64::new(0),
            close_flushes: AtomicU64::new(0),
            push_timeouts: AtomicU64::new(0),
            flush_timeouts: AtomicU64::new(0),
            close_timeouts: AtomicU64::new(0),
            closed_rejections: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> BufferMetrics {
        BufferMetrics {
            items_accepted: self.items_accepted.load(Ordering::Relaxed),
            items_flushed: self.items_flushed.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            capacity_flushes: self.capacity_flushes.load(Ordering::Relaxed),
            interval_flushes: self.interval_flushes.load(Ordering::Relaxed),
            manual_flushes: self.manual_flushes.load(Ordering::Relaxed),
            close_flushes: self.close_flushes.load(Ordering::Relaxed),
            push_timeouts: self.push_timeouts.load(Ordering::Relaxed),
            flush_timeouts: self.flush_timeouts.load(Ordering::Relaxed),
            close_timeouts: self.close_timeouts.load(Ordering::Relaxed),
            closed_rejections: self.closed_rejections.load(Ordering::Relaxed),
        }
    }

    /// Items flushed per second since the buffer was created.
    pub fn throughput_per_second(&self) -> f64 {
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();
        if elapsed_secs > 0.0 {
            self.items_flushed.load(Ordering::Relaxed) as f64 / elapsed_secs
        } else {
            0.0
        }
    }

    pub(crate) fn record_accepted(&self) {
        self.items_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, reason: FlushReason, items: usize) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.items_flushed.fetch_add(items as u64, Ordering::Relaxed);
        let counter = match reason {
            FlushReason::Capacity => &self.capacity_flushes,
            FlushReason::Interval => &self.interval_flushes,
            FlushReason::Manual => &self.manual_flushes,
            FlushReason::Close => &self.close_flushes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self, operation: Operation) {
        let counter = match operation {
            Operation::Push => &self.push_timeouts,
            Operation::Flush => &self.flush_timeouts,
            Operation::Close => &self.close_timeouts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed_rejection(&self) {
        self.closed_rejections.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_counters_by_reason() {
        let metrics = BufferMetricsCollector::new();
        for _ in 0..5 {
            metrics.record_accepted();
        }
        metrics.record_flush(FlushReason::Capacity, 3);
        metrics.record_flush(FlushReason::Close, 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.items_accepted, 5);
        assert_eq!(snapshot.items_flushed, 4);
        assert_eq!(snapshot.batches_flushed, 2);
        assert_eq!(snapshot.capacity_flushes, 1);
        assert_eq!(snapshot.close_flushes, 1);
        assert_eq!(snapshot.manual_flushes, 0);
        assert_eq!(snapshot.pending(), 1);
    }

    #[test]
    fn test_throughput_counts_flushed_items() {
        let collector = BufferMetricsCollector::new();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(collector.throughput_per_second(), 0.0);

        collector.record_flush(FlushReason::Capacity, 50);
        assert!(collector.throughput_per_second() > 0.0);
    }

    #[test]
    fn test_timeout_counters_by_operation() {
        let metrics = BufferMetricsCollector::new();
        metrics.record_timeout(Operation::Push);
        metrics.record_timeout(Operation::Push);
        metrics.record_timeout(Operation::Close);
        metrics.record_closed_rejection();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.push_timeouts, 2);
        assert_eq!(snapshot.flush_timeouts, 0);
        assert_eq!(snapshot.close_timeouts, 1);
        assert_eq!(snapshot.closed_rejections, 1);
    }
}
