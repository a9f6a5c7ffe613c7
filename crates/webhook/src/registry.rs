//! Handler subscriptions keyed by classification.

use std::{collections::HashMap, future::Future, sync::Arc};

use {async_trait::async_trait, tracing::info};

use crate::{
    classify::{ClassifiedEvent, EventKind},
    reply::ReplyChannel,
};

/// Receives classified events.
///
/// An `Err` (or a panic) is recorded as a handler failure and never stops
/// the dispatch of other handlers or events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &str;

    async fn handle(&self, event: ClassifiedEvent, reply: ReplyChannel) -> anyhow::Result<()>;
}

/// Adapts an async closure into an [`EventHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(ClassifiedEvent, ReplyChannel) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: ClassifiedEvent, reply: ReplyChannel) -> anyhow::Result<()> {
        (self.f)(event, reply).await
    }
}

/// Classification tag to handlers, in registration order.
///
/// Built during setup, then moved into the dispatcher and only read.
#[derive(Default, Clone)]
pub struct SubscriptionRegistry {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `kind`. Handlers for the same tag run in the
    /// order they were added.
    pub fn on(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> &mut Self {
        info!(handler = handler.name(), kind = %kind, "event handler registered");
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    /// Subscribe an async closure to `kind`.
    pub fn on_fn<F, Fut>(&mut self, kind: EventKind, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(ClassifiedEvent, ReplyChannel) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on(kind, Arc::new(FnHandler::new(name, f)))
    }

    /// Subscribe one handler to several tags.
    pub fn on_all(
        &mut self,
        kinds: impl IntoIterator<Item = EventKind>,
        handler: Arc<dyn EventHandler>,
    ) -> &mut Self {
        for kind in kinds {
            self.on(kind, Arc::clone(&handler));
        }
        self
    }

    pub fn handlers_for(&self, kind: EventKind) -> &[Arc<dyn EventHandler>] {
        self.handlers.get(&kind).map_or(&[], Vec::as_slice)
    }

    pub fn has_handlers(&self, kind: EventKind) -> bool {
        !self.handlers_for(kind).is_empty()
    }

    /// Total subscriptions across all tags.
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered handler names, sorted and deduplicated.
    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .values()
            .flatten()
            .map(|h| h.name().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("handlers", &self.handler_names())
            .field("subscriptions", &self.len())
            .finish()
    }
}
