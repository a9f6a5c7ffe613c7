//! Envelope dispatch.
//!
//! [`EventDispatcher::dispatch`] walks a verified envelope in order,
//! classifies every messaging event and hands each classification to its
//! subscribed handlers. Handler failures are isolated per invocation.
//!
//! Each handler is polled once inline, so handlers start in envelope order.
//! A handler that finishes on that first poll has its failure recorded in
//! the returned outcome. One that is still pending moves to a background
//! task whose late failure goes to the [`DiagnosticSink`] and to
//! [`BackgroundWork::settle`].

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
    task::Poll,
    time::Instant,
};

use {
    futures::FutureExt,
    tokio::task::JoinHandle,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use pagehook_metrics::{counter, dispatch as dispatch_metrics, histogram, labels};

use pagehook_protocol::{Entry, Envelope, MessagingEvent};

use crate::{
    classify::{ClassifiedEvent, EventKind, Precedence, classify_with},
    registry::{EventHandler, SubscriptionRegistry},
    reply::ReplyBinder,
};

// ── Diagnostics ──────────────────────────────────────────────────────────────

/// Where an event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventIdentity {
    pub entry_id: String,
    pub sender_id: String,
    pub timestamp: i64,
    pub mid: Option<String>,
}

impl EventIdentity {
    fn new(entry_id: &str, event: &MessagingEvent) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            sender_id: event.sender_id().to_string(),
            timestamp: event.timestamp,
            mid: event.mid().map(str::to_string),
        }
    }
}

/// Non-fatal findings of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Envelope `object` was not `page`; nothing was dispatched.
    MalformedEnvelope { object: String },
    /// An event matched no classification rule.
    UnknownEvent {
        identity: EventIdentity,
        raw: serde_json::Value,
    },
    /// A handler returned an error or panicked.
    HandlerError {
        handler: String,
        kind: EventKind,
        identity: EventIdentity,
        error: String,
        /// Failure surfaced after `dispatch` returned.
        background: bool,
    },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedEnvelope { object } => {
                write!(f, "ignored envelope with object \"{object}\"")
            },
            Self::UnknownEvent { identity, .. } => write!(
                f,
                "unknown event from {} on entry {}",
                identity.sender_id, identity.entry_id
            ),
            Self::HandlerError {
                handler,
                kind,
                identity,
                error,
                ..
            } => write!(
                f,
                "handler \"{handler}\" failed on {kind} from {}: {error}",
                identity.sender_id
            ),
        }
    }
}

/// Receives diagnostics as they are produced, including late handler
/// failures from background tasks.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: &Diagnostic);
}

// ── Outcome ──────────────────────────────────────────────────────────────────

/// Acknowledgment for the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Acknowledgment {
    /// Page envelope, events dispatched.
    #[default]
    Processed,
    /// Not a page envelope; acknowledged without dispatch.
    Ignored,
}

impl Acknowledgment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Ignored => "ignored",
        }
    }
}

/// Handler work still running after `dispatch` returned.
#[derive(Debug, Default)]
pub struct BackgroundWork {
    tasks: Vec<JoinHandle<Option<Diagnostic>>>,
}

impl BackgroundWork {
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every background handler and collect their failures.
    ///
    /// Dropping [`BackgroundWork`] instead detaches the tasks; they still
    /// report through `tracing` and the sink.
    pub async fn settle(self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for task in self.tasks {
            match task.await {
                Ok(Some(diagnostic)) => diagnostics.push(diagnostic),
                Ok(None) => {},
                Err(e) => warn!(error = %e, "background handler task did not complete"),
            }
        }
        diagnostics
    }
}

/// Result of dispatching one envelope.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub events_processed: usize,
    /// Handler invocations started.
    pub invocations: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub ack: Acknowledgment,
    pub background: BackgroundWork,
}

impl DispatchOutcome {
    pub fn handler_errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::HandlerError { .. }))
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────────────

/// Routes classified events to subscribed handlers.
pub struct EventDispatcher {
    registry: Arc<SubscriptionRegistry>,
    binder: Arc<dyn ReplyBinder>,
    precedence: Precedence,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("registry", &self.registry)
            .field("precedence", &self.precedence)
            .field("sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    pub fn new(registry: SubscriptionRegistry, binder: Arc<dyn ReplyBinder>) -> Self {
        Self {
            registry: Arc::new(registry),
            binder,
            precedence: Precedence::default(),
            sink: None,
        }
    }

    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Dispatch every event of `envelope`.
    pub async fn dispatch(&self, envelope: Envelope) -> DispatchOutcome {
        let started = Instant::now();
        let mut outcome = DispatchOutcome::default();

        if !envelope.is_page() {
            warn!(object = %envelope.object, "ignoring envelope that is not a page subscription");
            outcome.ack = Acknowledgment::Ignored;
            self.report(&mut outcome, Diagnostic::MalformedEnvelope {
                object: envelope.object,
            });
        } else {
            for entry in envelope.entry {
                self.dispatch_entry(entry, &mut outcome).await;
            }
        }

        debug!(
            events = outcome.events_processed,
            invocations = outcome.invocations,
            diagnostics = outcome.diagnostics.len(),
            background = outcome.background.pending(),
            ack = outcome.ack.as_str(),
            "envelope dispatched"
        );

        #[cfg(feature = "metrics")]
        {
            counter!(dispatch_metrics::ENVELOPES_TOTAL, labels::OUTCOME => outcome.ack.as_str())
                .increment(1);
            histogram!(dispatch_metrics::DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        }
        #[cfg(not(feature = "metrics"))]
        let _ = started;

        outcome
    }

    async fn dispatch_entry(&self, entry: Entry, outcome: &mut DispatchOutcome) {
        let Entry {
            id: entry_id,
            time,
            messaging,
        } = entry;
        debug!(entry_id, time, events = messaging.len(), "dispatching entry");

        for event in messaging {
            let event = Arc::new(event);
            let identity = EventIdentity::new(&entry_id, &event);
            outcome.events_processed += 1;

            for classified in classify_with(&event, &self.precedence) {
                let kind = classified.kind;
                debug!(
                    kind = %kind,
                    entry_id,
                    sender_id = identity.sender_id,
                    mid = identity.mid.as_deref(),
                    "event classified"
                );

                #[cfg(feature = "metrics")]
                counter!(dispatch_metrics::EVENTS_TOTAL, labels::KIND => kind.label())
                    .increment(1);

                if kind == EventKind::Unknown {
                    self.report_unknown(&event, &identity, outcome);
                }

                for handler in self.registry.handlers_for(kind) {
                    outcome.invocations += 1;
                    self.invoke(handler, classified.clone(), &identity, outcome)
                        .await;
                }
            }
        }
    }

    fn report_unknown(
        &self,
        event: &MessagingEvent,
        identity: &EventIdentity,
        outcome: &mut DispatchOutcome,
    ) {
        let raw = serde_json::to_value(event).unwrap_or_default();
        info!(
            entry_id = identity.entry_id,
            sender_id = identity.sender_id,
            event = %raw,
            "webhook received unknown messaging event"
        );

        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::UNKNOWN_EVENTS_TOTAL).increment(1);

        self.report(outcome, Diagnostic::UnknownEvent {
            identity: identity.clone(),
            raw,
        });
    }

    /// Start one handler. Failures already known after the first poll are
    /// recorded in `outcome`; pending work moves to a background task.
    async fn invoke(
        &self,
        handler: &Arc<dyn EventHandler>,
        event: ClassifiedEvent,
        identity: &EventIdentity,
        outcome: &mut DispatchOutcome,
    ) {
        let kind = event.kind;
        let reply = self.binder.bind(event.sender_id());
        let running = Arc::clone(handler);
        let mut fut = AssertUnwindSafe(async move { running.handle(event, reply).await })
            .catch_unwind()
            .boxed();

        match futures::poll!(&mut fut) {
            Poll::Ready(result) => {
                if let Some(error) = failure_message(result) {
                    let diagnostic =
                        handler_failed(handler.name(), kind, identity.clone(), error, false);
                    self.report(outcome, diagnostic);
                }
            },
            Poll::Pending => {
                let name = handler.name().to_string();
                let identity = identity.clone();
                let sink = self.sink.clone();
                outcome.background.tasks.push(tokio::spawn(async move {
                    let error = failure_message(fut.await)?;
                    let diagnostic = handler_failed(&name, kind, identity, error, true);
                    if let Some(sink) = sink {
                        sink.record(&diagnostic);
                    }
                    Some(diagnostic)
                }));
            },
        }
    }

    fn report(&self, outcome: &mut DispatchOutcome, diagnostic: Diagnostic) {
        if let Some(sink) = &self.sink {
            sink.record(&diagnostic);
        }
        outcome.diagnostics.push(diagnostic);
    }
}

fn handler_failed(
    handler: &str,
    kind: EventKind,
    identity: EventIdentity,
    error: String,
    background: bool,
) -> Diagnostic {
    warn!(
        handler,
        kind = %kind,
        entry_id = identity.entry_id,
        sender_id = identity.sender_id,
        mid = identity.mid.as_deref(),
        background,
        error,
        "event handler failed"
    );

    #[cfg(feature = "metrics")]
    counter!(
        dispatch_metrics::HANDLER_ERRORS_TOTAL,
        labels::HANDLER => handler.to_string(),
        labels::KIND => kind.label()
    )
    .increment(1);

    Diagnostic::HandlerError {
        handler: handler.to_string(),
        kind,
        identity,
        error,
        background,
    }
}

type HandlerResult = Result<anyhow::Result<()>, Box<dyn Any + Send>>;

fn failure_message(result: HandlerResult) -> Option<String> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{e:#}")),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Some(format!("handler panicked: {message}"))
        },
    }
}
