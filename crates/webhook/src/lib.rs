//! Messenger webhook core.
//!
//! - [`verify`]: body signatures and the subscription handshake
//! - [`classify`]: one raw messaging event to typed classifications
//! - [`registry`]: handler subscriptions per classification
//! - [`dispatch`]: envelope walk with per-handler failure isolation
//! - [`reply`]: the reply capability bound to each event's sender

pub mod classify;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod registry;
pub mod reply;
pub mod verify;

pub use {
    classify::{AttachmentKind, ClassifiedEvent, EventKind, Precedence, classify, classify_with},
    dispatch::{
        Acknowledgment, BackgroundWork, Diagnostic, DiagnosticSink, DispatchOutcome,
        EventDispatcher, EventIdentity,
    },
    error::{HandshakeError, SendError, SignatureError},
    logging::LoggingHandler,
    registry::{EventHandler, FnHandler, SubscriptionRegistry},
    reply::{
        DisabledSender, ReplyBinder, ReplyChannel, ReplySender, SendReceipt, SenderAction,
        SenderBinder,
    },
    verify::{SignatureVerifier, verify_challenge, verify_subscription},
};
