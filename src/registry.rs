
//! Handler declaration and registration bookkeeping.

use crate::error::WorkerError;
use crate::fabric::{FabricConnection, Handler, Payload, Reply};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Declaration set of the messages a worker listens to.
///
/// Names are accumulated in call order and validated when the worker is
/// constructed, not when `handle` is called; an empty set is valid for a
/// worker that only sends.
#[derive(Default)]
pub struct Messages {
    entries: Vec<(String, Handler)>,
}

impl Messages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a handler for `name`.
    pub fn handle<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Payload, Reply) + Send + Sync + 'static,
    {
        self.entries.push((name.into(), Arc::new(handler)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Validated map from message name to handler, bound to and unbound from a
/// fabric connection as one unit.
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Handler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    /// Validates a declaration set: every name must be non-empty and unique
    /// within the set.
    pub(crate) fn from_messages(messages: Messages) -> Result<Self, WorkerError> {
        let mut handlers = BTreeMap::new();
        for (name, handler) in messages.entries {
            if name.is_empty() {
                return Err(WorkerError::EmptyMessageName);
            }
            if handlers.insert(name.clone(), handler).is_some() {
                return Err(WorkerError::DuplicateMessage(name));
            }
        }
        Ok(Self { handlers })
    }

    /// Binds every handler on `conn`. Re-registering a name replaces the
    /// previous binding, so repeating this call is harmless.
    pub(crate) fn register(&self, conn: &dyn FabricConnection) {
        for (name, handler) in &self.handlers {
            conn.on(name, handler.clone());
        }
    }

    /// Unbinds every handler from `conn`. Unbinding names that were never
    /// bound (or were already unbound) is a no-op.
    pub(crate) fn unregister(&self, conn: &dyn FabricConnection) {
        for name in self.handlers.keys() {
            conn.off(name);
        }
    }

    /// The registered message names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> impl Fn(Payload, Reply) + Send + Sync {
        |_parameters, reply| reply.resolve(json!(null))
    }

    #[test]
    fn builds_a_registry_from_valid_declarations() {
        let messages = Messages::new()
            .handle("orders.create", noop())
            .handle("orders.cancel", noop());
        let registry = HandlerRegistry::from_messages(messages).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["orders.cancel", "orders.create"]
        );
    }

    #[test]
    fn an_empty_declaration_set_is_valid() {
        let registry = HandlerRegistry::from_messages(Messages::new()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn rejects_an_empty_message_name() {
        let messages = Messages::new().handle("", noop());
        assert_eq!(
            HandlerRegistry::from_messages(messages).unwrap_err(),
            WorkerError::EmptyMessageName
        );
    }

    #[test]
    fn rejects_a_duplicate_message_name() {
        let messages = Messages::new()
            .handle("orders.create", noop())
            .handle("orders.create", noop());
        assert_eq!(
            HandlerRegistry::from_messages(messages).unwrap_err(),
            WorkerError::DuplicateMessage("orders.create".into())
        );
    }
}
