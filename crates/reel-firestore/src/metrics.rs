//! Firestore request metrics.

use metrics::{counter, histogram};

pub mod names {
    /// Requests by operation and HTTP status.
    pub const REQUESTS_TOTAL: &str = "reel_firestore_requests_total";

    /// Retries by operation.
    pub const RETRIES_TOTAL: &str = "reel_firestore_retries_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "reel_firestore_latency_seconds";

    /// Documents returned by queries, by collection.
    pub const QUERY_DOCUMENTS_TOTAL: &str = "reel_firestore_query_documents_total";

    /// Optimistic updates rejected by an updateTime precondition.
    pub const PRECONDITION_CONFLICTS_TOTAL: &str = "reel_firestore_precondition_conflicts_total";
}

pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(names::LATENCY_SECONDS, "operation" => operation.to_string())
        .record(latency_ms / 1000.0);
}

pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_query_documents(collection: &str, returned: usize) {
    counter!(names::QUERY_DOCUMENTS_TOTAL, "collection" => collection.to_string())
        .increment(returned as u64);
}

pub fn record_precondition_conflict(collection: &str) {
    counter!(names::PRECONDITION_CONFLICTS_TOTAL, "collection" => collection.to_string())
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            names::REQUESTS_TOTAL,
            names::RETRIES_TOTAL,
            names::LATENCY_SECONDS,
            names::QUERY_DOCUMENTS_TOTAL,
            names::PRECONDITION_CONFLICTS_TOTAL,
        ] {
            assert!(name.starts_with("reel_firestore_"));
        }
    }
}
