use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide counters for the public operations.
#[derive(Default)]
pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,

    // Timing (in microseconds)
    total_ingest_time_us: AtomicU64,
    total_ask_time_us: AtomicU64,

    // Counts
    ingest_calls: AtomicUsize,
    ask_calls: AtomicUsize,
    search_calls: AtomicUsize,
    total_texts_ingested: AtomicUsize,
    total_files_ingested: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_ingest(&self, duration: Duration, texts: usize) {
        self.ingest_calls.fetch_add(1, Ordering::Relaxed);
        self.total_ingest_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.total_texts_ingested.fetch_add(texts, Ordering::Relaxed);
    }

    pub fn record_ask(&self, duration: Duration) {
        self.ask_calls.fetch_add(1, Ordering::Relaxed);
        self.total_ask_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_search(&self) {
        self.search_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_files(&self, files: usize) {
        self.total_files_ingested.fetch_add(files, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            ingest_calls: self.ingest_calls.load(Ordering::Relaxed),
            ask_calls: self.ask_calls.load(Ordering::Relaxed),
            search_calls: self.search_calls.load(Ordering::Relaxed),
            avg_ingest_time_ms: avg_time_ms(&self.total_ingest_time_us, &self.ingest_calls),
            avg_ask_time_ms: avg_time_ms(&self.total_ask_time_us, &self.ask_calls),
            total_texts_ingested: self.total_texts_ingested.load(Ordering::Relaxed),
            total_files_ingested: self.total_files_ingested.load(Ordering::Relaxed),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub ingest_calls: usize,
    pub ask_calls: usize,
    pub search_calls: usize,
    pub avg_ingest_time_ms: f64,
    pub avg_ask_time_ms: f64,
    pub total_texts_ingested: usize,
    pub total_files_ingested: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_averages() {
        let metrics = Metrics::new();
        metrics.record_ingest(Duration::from_millis(10), 3);
        metrics.record_ingest(Duration::from_millis(30), 1);
        metrics.record_request(true);
        metrics.record_request(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ingest_calls, 2);
        assert_eq!(snapshot.total_texts_ingested, 4);
        assert!((snapshot.avg_ingest_time_ms - 20.0).abs() < 1e-9);
        assert_eq!(snapshot.avg_ask_time_ms, 0.0);
        assert_eq!(snapshot.failed_requests, 1);
    }
}
