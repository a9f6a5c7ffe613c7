//! Metric name and label definitions.
//!
//! Every metric the gateway records is named here so dashboards and the
//! code agree on spelling.

/// Inbound webhook request metrics
pub mod webhook {
    /// Total webhook requests, labelled by method and outcome
    pub const REQUESTS_TOTAL: &str = "pagehook_webhook_requests_total";
    /// Signature verification failures, labelled by reason
    pub const SIGNATURE_FAILURES_TOTAL: &str = "pagehook_webhook_signature_failures_total";
    /// Subscription handshakes, labelled by outcome
    pub const HANDSHAKES_TOTAL: &str = "pagehook_webhook_handshakes_total";
    /// Request handling duration in seconds
    pub const REQUEST_DURATION_SECONDS: &str = "pagehook_webhook_request_duration_seconds";
}

/// Event classification and dispatch metrics
pub mod dispatch {
    /// Envelopes dispatched, labelled by acknowledgment
    pub const ENVELOPES_TOTAL: &str = "pagehook_dispatch_envelopes_total";
    /// Classified events, labelled by kind
    pub const EVENTS_TOTAL: &str = "pagehook_dispatch_events_total";
    /// Events that matched no classification rule
    pub const UNKNOWN_EVENTS_TOTAL: &str = "pagehook_dispatch_unknown_events_total";
    /// Handler failures, labelled by handler and kind
    pub const HANDLER_ERRORS_TOTAL: &str = "pagehook_dispatch_handler_errors_total";
    /// Time spent in the synchronous part of a dispatch, in seconds
    pub const DURATION_SECONDS: &str = "pagehook_dispatch_duration_seconds";
}

/// Outbound Send API metrics
pub mod send_api {
    /// Send API calls, labelled by operation and success
    pub const REQUESTS_TOTAL: &str = "pagehook_send_api_requests_total";
    /// Send API call duration in seconds
    pub const REQUEST_DURATION_SECONDS: &str = "pagehook_send_api_request_duration_seconds";
}

/// Common label keys
pub mod labels {
    pub const METHOD: &str = "method";
    pub const OUTCOME: &str = "outcome";
    pub const REASON: &str = "reason";
    pub const KIND: &str = "kind";
    pub const HANDLER: &str = "handler";
    pub const OPERATION: &str = "operation";
    pub const SUCCESS: &str = "success";
}

/// Histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Inbound request and dispatch durations (in seconds)
    /// Covers 100µs to 10s
    pub static REQUEST_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0,
        ]
    });

    /// Outbound Send API durations (in seconds)
    /// Covers 10ms to 30s
    pub static SEND_API_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]
    });
}
