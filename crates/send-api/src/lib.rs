//! Outbound replies through the Graph Send API.
//!
//! [`GraphSendApi`] implements [`pagehook_webhook::ReplySender`]: messages
//! and sender actions are POSTed to `<api_url>me/messages` with the page
//! access token as a query parameter. Failures are reported once, without
//! retries.

mod client;

pub use client::GraphSendApi;
