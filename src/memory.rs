
//! In-memory message fabric for testing and single-process scenarios.
//!
//! Implements the full delivery contract without a broker: requests are
//! handed to exactly one bound handler, rotating through a command's
//! consumers in registration order, and events fan out to every started
//! connection that subscribed. Clone the fabric handle freely; all clones
//! share one topology.

use crate::error::WorkerError;
use crate::fabric::{
    DeliveryOptions, FabricConnection, Handler, MessageFabric, Payload, Reply,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct Binding {
    conn: u64,
    group: String,
    handler: Handler,
}

#[derive(Default)]
struct Topology {
    /// Message name -> bindings in registration order.
    bindings: HashMap<String, Vec<Binding>>,
    /// Connections with delivery activated.
    started: HashSet<u64>,
    /// Per-command rotation position for competing-consumer dispatch.
    cursors: HashMap<String, usize>,
}

#[derive(Default)]
struct FabricShared {
    next_conn: AtomicU64,
    topology: Mutex<Topology>,
}

/// Process-local [`MessageFabric`].
#[derive(Clone, Default)]
pub struct InMemoryFabric {
    shared: Arc<FabricShared>,
}

impl InMemoryFabric {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageFabric for InMemoryFabric {
    async fn connect(&self, name: &str) -> Result<Arc<dyn FabricConnection>, WorkerError> {
        let id = self.shared.next_conn.fetch_add(1, Ordering::Relaxed);
        log::debug!("in-memory fabric: connection {} opened for '{}'", id, name);
        Ok(Arc::new(MemoryConnection {
            id,
            group: name.to_string(),
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// One fabric connection, tied to the worker name it was opened under.
struct MemoryConnection {
    id: u64,
    group: String,
    shared: Arc<FabricShared>,
}

#[async_trait]
impl FabricConnection for MemoryConnection {
    fn on(&self, name: &str, handler: Handler) {
        let mut topo = self.shared.topology.lock().unwrap();
        let bindings = topo.bindings.entry(name.to_string()).or_default();
        match bindings.iter_mut().find(|b| b.conn == self.id) {
            Some(existing) => existing.handler = handler,
            None => bindings.push(Binding {
                conn: self.id,
                group: self.group.clone(),
                handler,
            }),
        }
    }

    fn off(&self, name: &str) {
        let mut topo = self.shared.topology.lock().unwrap();
        let now_empty = match topo.bindings.get_mut(name) {
            Some(bindings) => {
                bindings.retain(|b| b.conn != self.id);
                bindings.is_empty()
            }
            None => false,
        };
        if now_empty {
            topo.bindings.remove(name);
        }
    }

    async fn start(&self) -> Result<(), WorkerError> {
        self.shared.topology.lock().unwrap().started.insert(self.id);
        log::debug!("in-memory fabric: connection {} started", self.id);
        Ok(())
    }

    async fn stop(&self) -> Result<(), WorkerError> {
        let mut topo = self.shared.topology.lock().unwrap();
        topo.started.remove(&self.id);
        // A closed connection takes its remaining bindings with it.
        topo.bindings.retain(|_, bindings| {
            bindings.retain(|b| b.conn != self.id);
            !bindings.is_empty()
        });
        log::debug!("in-memory fabric: connection {} stopped", self.id);
        Ok(())
    }

    async fn request(
        &self,
        cmd: &str,
        parameters: Payload,
        _options: DeliveryOptions,
    ) -> Result<Payload, WorkerError> {
        let (group, handler) = {
            let mut guard = self.shared.topology.lock().unwrap();
            let topo = &mut *guard;
            let mut eligible: Vec<(String, Handler)> = match topo.bindings.get(cmd) {
                Some(bindings) => bindings
                    .iter()
                    .filter(|b| topo.started.contains(&b.conn))
                    .map(|b| (b.group.clone(), b.handler.clone()))
                    .collect(),
                None => Vec::new(),
            };
            if eligible.is_empty() {
                return Err(WorkerError::NoHandler(cmd.to_string()));
            }
            let cursor = topo.cursors.entry(cmd.to_string()).or_insert(0);
            let index = *cursor % eligible.len();
            *cursor = index + 1;
            eligible.swap_remove(index)
        };

        log::debug!("in-memory fabric: request '{}' routed to a '{}' consumer", cmd, group);
        let (reply, outcome) = Reply::channel();
        (*handler)(parameters, reply);
        match outcome.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(WorkerError::ReplyDropped),
        }
    }

    async fn publish(
        &self,
        event: &str,
        parameters: Payload,
        _options: DeliveryOptions,
    ) -> Result<(), WorkerError> {
        let subscribers: Vec<(String, Handler)> = {
            let guard = self.shared.topology.lock().unwrap();
            match guard.bindings.get(event) {
                Some(bindings) => bindings
                    .iter()
                    .filter(|b| guard.started.contains(&b.conn))
                    .map(|b| (b.group.clone(), b.handler.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };

        log::debug!(
            "in-memory fabric: event '{}' fanned out to {} subscriber(s)",
            event,
            subscribers.len()
        );
        for (group, handler) in subscribers {
            let (reply, outcome) = Reply::channel();
            (*handler)(parameters.clone(), reply);
            // Subscriber outcomes are advisory; they never reach the publisher.
            let event = event.to_string();
            tokio::spawn(async move {
                if let Ok(Err(err)) = outcome.await {
                    log::warn!("subscriber '{}' rejected event '{}': {}", group, event, err);
                }
            });
        }
        Ok(())
    }
}
