//! Handshake and notification handlers.

use std::time::Instant;

use {
    axum::{
        body::Bytes,
        extract::{Query, State},
        http::{HeaderMap, Method, StatusCode, header},
        response::{IntoResponse, Response},
    },
    secrecy::ExposeSecret,
    serde::Deserialize,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use pagehook_metrics::{counter, histogram, labels, webhook as webhook_metrics};

use {
    pagehook_protocol::{Envelope, SIGNATURE_256_HEADER, SIGNATURE_HEADER},
    pagehook_webhook::{HandshakeError, SignatureError, verify_subscription},
};

use crate::state::AppState;

/// Body returned once a notification has been accepted.
pub const EVENT_RECEIVED: &str = "EVENT_RECEIVED";

/// Raw `hub.*` query parameters of a subscription handshake.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

// ── Handshake ────────────────────────────────────────────────────────────────

pub async fn handshake_handler(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
) -> Response {
    let started = Instant::now();
    let result = verify_subscription(
        query.mode.as_deref(),
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
        state.verify_token.expose_secret(),
    );

    let (status, outcome) = match &result {
        Ok(_) => (StatusCode::OK, "verified"),
        Err(HandshakeError::MissingChallenge) => (StatusCode::BAD_REQUEST, "missing_challenge"),
        Err(HandshakeError::InvalidVerifyToken) => (StatusCode::FORBIDDEN, "invalid_token"),
        Err(HandshakeError::UnsupportedMode { .. }) => (StatusCode::FORBIDDEN, "unsupported_mode"),
    };

    #[cfg(feature = "metrics")]
    counter!(webhook_metrics::HANDSHAKES_TOTAL, labels::OUTCOME => outcome).increment(1);
    record_request(&Method::GET, outcome, started);

    match result {
        Ok(challenge) => {
            info!("webhook subscription verified");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                challenge,
            )
                .into_response()
        },
        Err(e) => {
            warn!(error = %e, "webhook subscription rejected");
            (status, e.to_string()).into_response()
        },
    }
}

// ── Notifications ────────────────────────────────────────────────────────────

pub async fn notification_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();

    if let Err(e) = state.verifier.verify(&body, signature_header(&state, &headers)) {
        let status = match e {
            SignatureError::MissingSignature => StatusCode::UNAUTHORIZED,
            SignatureError::UnsupportedAlgorithm { .. } | SignatureError::SignatureMismatch => {
                StatusCode::FORBIDDEN
            },
        };
        warn!(reason = e.reason(), error = %e, "rejected webhook notification");

        #[cfg(feature = "metrics")]
        counter!(webhook_metrics::SIGNATURE_FAILURES_TOTAL, labels::REASON => e.reason())
            .increment(1);
        record_request(&Method::POST, "rejected", started);

        return (status, e.to_string()).into_response();
    }

    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "notification body is not an envelope");
            record_request(&Method::POST, "malformed", started);
            return (StatusCode::BAD_REQUEST, "invalid envelope").into_response();
        },
    };

    let outcome = state.dispatcher.dispatch(envelope).await;
    for diagnostic in &outcome.diagnostics {
        debug!(%diagnostic, "dispatch diagnostic");
    }
    if outcome.background.pending() > 0 {
        debug!(
            pending = outcome.background.pending(),
            "handlers still running after acknowledgment"
        );
    }
    record_request(&Method::POST, outcome.ack.as_str(), started);

    (StatusCode::OK, EVENT_RECEIVED).into_response()
}

/// The configured signature header, falling back to the other algorithm's
/// header so a mismatched algorithm is reported as such.
fn signature_header<'a>(state: &AppState, headers: &'a HeaderMap) -> Option<&'a str> {
    let configured = state.verifier.header_name();
    let fallback = if configured == SIGNATURE_HEADER {
        SIGNATURE_256_HEADER
    } else {
        SIGNATURE_HEADER
    };
    headers
        .get(configured)
        .or_else(|| headers.get(fallback))
        .and_then(|v| v.to_str().ok())
}

fn record_request(method: &Method, outcome: &'static str, started: Instant) {
    let elapsed = started.elapsed();
    debug!(
        method = %method,
        outcome,
        elapsed_ms = elapsed.as_millis() as u64,
        "webhook request handled"
    );

    #[cfg(feature = "metrics")]
    {
        counter!(
            webhook_metrics::REQUESTS_TOTAL,
            labels::METHOD => method.to_string(),
            labels::OUTCOME => outcome
        )
        .increment(1);
        histogram!(webhook_metrics::REQUEST_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }
}
