//! Metrics for the pagehook gateway.
//!
//! Recording goes through the `metrics` crate facade, which is a no-op until
//! a recorder is installed. With the `prometheus` feature, [`init_metrics`]
//! installs a Prometheus recorder whose output the gateway serves on
//! `/metrics`.
//!
//! ```rust,ignore
//! use pagehook_metrics::{counter, dispatch, labels};
//!
//! counter!(dispatch::EVENTS_TOTAL, labels::KIND => "postback").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
