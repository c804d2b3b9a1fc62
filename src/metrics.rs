use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-wide request counters exposed at `/debug/vars`.
#[derive(Debug, Default)]
pub struct Metrics {
    total_requests_received: AtomicU64,
    total_responses_sent: AtomicU64,
    total_processing_time_us: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub version: &'static str,
    pub timestamp: i64,
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    #[serde(rename = "total_processing_time_μs")]
    pub total_processing_time_us: u64,
    pub requests_in_flight: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_received(&self) {
        self.total_requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_sent(&self, elapsed: Duration) {
        self.total_responses_sent.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_processing_time_us.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let received = self.total_requests_received.load(Ordering::Relaxed);
        let sent = self.total_responses_sent.load(Ordering::Relaxed);

        MetricsSnapshot {
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now().timestamp(),
            total_requests_received: received,
            total_responses_sent: sent,
            total_processing_time_us: self.total_processing_time_us.load(Ordering::Relaxed),
            requests_in_flight: received.saturating_sub(sent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.request_received();
        metrics.request_received();
        metrics.response_sent(Duration::from_micros(250));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests_received, 2);
        assert_eq!(snapshot.total_responses_sent, 1);
        assert_eq!(snapshot.total_processing_time_us, 250);
    }

    #[test]
    fn test_snapshot_serialization() {
        let json = serde_json::to_value(Metrics::new().snapshot()).unwrap();
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert!(json.get("total_processing_time_μs").is_some());
    }
}
