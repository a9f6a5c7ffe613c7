//! HTTP surface for the Messenger webhook.
//!
//! `GET <path>` answers the subscription handshake and `POST <path>`
//! verifies and dispatches notifications. `/health` is always served;
//! `/metrics` needs the `prometheus` feature.

pub mod routes;
pub mod server;
pub mod state;

#[cfg(feature = "prometheus")]
pub mod metrics_routes;

pub use {
    server::{build_webhook_app, start_gateway},
    state::AppState,
};
