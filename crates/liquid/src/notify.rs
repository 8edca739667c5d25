//! Delivery of value notifications to host listeners.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Receives notifications about remote values.
///
/// Both methods default to doing nothing.
pub trait ValuesListener: Send + Sync {
    /// A fresh package arrived from the server.
    fn on_values_received(&self) {}

    /// The values readable through the getters changed.
    fn on_values_loaded(&self) {}
}

/// Runs listener callbacks on a context chosen by the host, such as a UI
/// thread.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>);
}

/// Runs callbacks synchronously on the SDK's worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
        job()
    }
}

/// Handle returned by [`attach_listener`](crate::Liquid::attach_listener).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notification {
    Received,
    Loaded,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<dyn ValuesListener>)>,
    // latest notification raised while nobody was listening
    pending: Option<Notification>,
}

/// Fans notifications out to every attached listener.
#[derive(Clone)]
pub(crate) struct Notifier {
    registry: Arc<Mutex<Registry>>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Notifier {
    pub(crate) fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            dispatcher,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach a listener. A notification missed while no listener was
    /// attached is delivered to it right away.
    pub(crate) fn attach(&self, listener: Arc<dyn ValuesListener>) -> ListenerId {
        let (id, pending) = {
            let mut registry = self.registry();
            registry.next_id += 1;
            let id = ListenerId(registry.next_id);
            registry.listeners.push((id, listener.clone()));
            (id, registry.pending.take())
        };
        if let Some(notification) = pending {
            debug!(?notification, "delivering missed notification");
            self.deliver(vec![listener], notification);
        }
        id
    }

    /// Returns false if the id was not attached.
    pub(crate) fn detach(&self, id: ListenerId) -> bool {
        let mut registry = self.registry();
        let before = registry.listeners.len();
        registry.listeners.retain(|(existing, _)| *existing != id);
        registry.listeners.len() != before
    }

    pub(crate) fn notify(&self, notification: Notification) {
        let listeners: Vec<Arc<dyn ValuesListener>> = {
            let mut registry = self.registry();
            if registry.listeners.is_empty() {
                registry.pending = Some(notification);
                return;
            }
            registry.listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        self.deliver(listeners, notification);
    }

    fn deliver(&self, listeners: Vec<Arc<dyn ValuesListener>>, notification: Notification) {
        self.dispatcher.dispatch(Box::new(move || {
            for listener in &listeners {
                match notification {
                    Notification::Received => listener.on_values_received(),
                    Notification::Loaded => listener.on_values_loaded(),
                }
            }
        }));
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}
