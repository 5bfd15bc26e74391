//! Typed and wildcard event handler dispatch.
//!
//! Handlers are invoked sequentially -- never concurrently -- so that
//! dispatch order is deterministic and replayable: typed handlers for an
//! event's exact kind run first in registration order, then every
//! wildcard handler, also in registration order. A `fail_fast` dispatch
//! stops and returns the first handler error; the default policy logs
//! the error and keeps going.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chronicle_core::event::{Event, EventKind};

/// Error returned by a single handler invocation.
#[derive(Debug, thiserror::Error)]
#[error("handler '{handler_name}' failed on event {event_kind}: {reason}")]
pub struct HandlerError {
    pub handler_name: String,
    pub event_kind: String,
    pub reason: String,
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

/// A registered async event handler.
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;
    fn handle(&self, event: &Event) -> HandlerFuture;
}

/// Wraps a plain async closure as an [`EventHandler`].
pub struct FnHandler<F> {
    name: String,
    func: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &Event) -> HandlerFuture {
        Box::pin((self.func)(event))
    }
}

/// Registry of typed and wildcard handlers, dispatched sequentially.
#[derive(Default)]
pub struct HandlerRegistry {
    typed: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
    wildcard: Vec<Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to exactly one event kind.
    pub fn on(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.typed.entry(kind).or_default().push(handler);
    }

    /// Subscribe a handler to every event kind.
    pub fn on_all(&mut self, handler: Arc<dyn EventHandler>) {
        self.wildcard.push(handler);
    }

    /// Remove every handler subscribed to `kind` named `handler_name`.
    pub fn off(&mut self, kind: &EventKind, handler_name: &str) {
        if let Some(handlers) = self.typed.get_mut(kind) {
            handlers.retain(|h| h.name() != handler_name);
        }
    }

    pub fn off_all(&mut self, handler_name: &str) {
        self.wildcard.retain(|h| h.name() != handler_name);
    }

    pub fn clear(&mut self) {
        self.typed.clear();
        self.wildcard.clear();
    }

    pub fn handler_count(&self) -> usize {
        self.typed.values().map(Vec::len).sum::<usize>() + self.wildcard.len()
    }

    /// Run every handler subscribed to `event`'s kind, then every
    /// wildcard handler, in registration order and strictly sequentially.
    ///
    /// With `fail_fast = true`, the first error short-circuits the rest
    /// and is returned. Otherwise every handler runs regardless of
    /// earlier failures, which are logged and collected.
    pub async fn dispatch(&self, event: &Event, fail_fast: bool) -> Result<(), HandlerError> {
        let empty: Vec<Arc<dyn EventHandler>> = Vec::new();
        let typed = self.typed.get(&event.event_kind).unwrap_or(&empty);

        for handler in typed.iter().chain(self.wildcard.iter()) {
            if let Err(error) = handler.handle(event).await {
                if fail_fast {
                    return Err(error);
                }
                tracing::error!(
                    handler = %error.handler_name,
                    event_kind = %error.event_kind,
                    reason = %error.reason,
                    "handler.failed"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::event::Payload;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ok_handler(name: &str, order: Arc<Mutex<Vec<String>>>) -> Arc<dyn EventHandler> {
        let name = name.to_owned();
        Arc::new(FnHandler::new(name.clone(), move |_event: &Event| {
            let order = Arc::clone(&order);
            let name = name.clone();
            async move {
                order.lock().unwrap().push(name);
                Ok(())
            }
        }))
    }

    use std::sync::Mutex;

    #[tokio::test]
    async fn typed_handlers_run_before_wildcard() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.on(EventKind::EntityMoved, ok_handler("typed", Arc::clone(&order)));
        registry.on_all(ok_handler("wildcard", Arc::clone(&order)));

        let event = Event::new(0.0, EventKind::EntityMoved, Payload::new());
        registry.dispatch(&event, false).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["typed", "wildcard"]);
    }

    #[tokio::test]
    async fn non_matching_kind_skips_typed_handler() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.on(EventKind::EntityMoved, ok_handler("typed", Arc::clone(&order)));

        let event = Event::new(0.0, EventKind::EntityCreated, Payload::new());
        registry.dispatch(&event, false).await.unwrap();

        assert!(order.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fail_fast_stops_on_first_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();

        let calls_a = Arc::clone(&calls);
        registry.on_all(Arc::new(FnHandler::new("a", move |_: &Event| {
            let calls = Arc::clone(&calls_a);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError {
                    handler_name: "a".into(),
                    event_kind: "entity.moved".into(),
                    reason: "boom".into(),
                })
            }
        })));

        let calls_b = Arc::clone(&calls);
        registry.on_all(Arc::new(FnHandler::new("b", move |_: &Event| {
            let calls = Arc::clone(&calls_b);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })));

        let event = Event::new(0.0, EventKind::EntityMoved, Payload::new());
        let result = registry.dispatch(&event, true).await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn default_policy_logs_and_continues() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();

        let calls_a = Arc::clone(&calls);
        registry.on_all(Arc::new(FnHandler::new("a", move |_: &Event| {
            let calls = Arc::clone(&calls_a);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError {
                    handler_name: "a".into(),
                    event_kind: "entity.moved".into(),
                    reason: "boom".into(),
                })
            }
        })));

        let calls_b = Arc::clone(&calls);
        registry.on_all(Arc::new(FnHandler::new("b", move |_: &Event| {
            let calls = Arc::clone(&calls_b);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })));

        let event = Event::new(0.0, EventKind::EntityMoved, Payload::new());
        let result = registry.dispatch(&event, false).await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn off_removes_typed_handler() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.on(EventKind::EntityMoved, ok_handler("typed", Arc::clone(&order)));
        registry.off(&EventKind::EntityMoved, "typed");

        let event = Event::new(0.0, EventKind::EntityMoved, Payload::new());
        registry.dispatch(&event, false).await.unwrap();

        assert!(order.lock().unwrap().is_empty());
        assert_eq!(registry.handler_count(), 0);
    }
}
