//! The worker: lifecycle state machine, handler bookkeeping, and dispatch
//! delegation over a message fabric.

use crate::error::WorkerError;
use crate::fabric::{DeliveryOptions, FabricConnection, MessageFabric, Payload};
use crate::registry::{HandlerRegistry, Messages};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};

/// Externally observable lifecycle states of a worker's fabric connection.
///
/// The state moves strictly forward: `Connecting` to `Ready` or `Failed`,
/// and to `Stopped` once [`Worker::stop`] runs. `stop` always wins; it
/// forces `Stopped` from any earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Failed,
    Stopped,
}

/// Lifecycle notifications delivered through [`Worker::notifications`].
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// The worker activated delivery and can now send and receive.
    Ready,
    /// Initialisation failed; the payload carries the underlying cause.
    Error(WorkerError),
}

/// Settlement of the connection attempt made at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectPhase {
    Pending,
    Connected,
    Failed,
}

struct Shared {
    name: String,
    registry: HandlerRegistry,
    state: watch::Sender<ConnectionState>,
    phase: watch::Sender<ConnectPhase>,
    connection: Mutex<Option<Arc<dyn FabricConnection>>>,
    failure: Mutex<Option<WorkerError>>,
    events: broadcast::Sender<LifecycleEvent>,
}

/// The basic building block for implementing concrete business logic over a
/// message fabric.
///
/// A worker binds a name, a fabric connection, and a set of message
/// handlers. It supports the two classic messaging patterns: request-reply
/// ([`Worker::request`], answered by exactly one member of a same-named
/// competing-consumer group) and publish-subscribe ([`Worker::publish`],
/// fanned out to every subscribed worker).
///
/// Construction validates its inputs synchronously and then connects to the
/// fabric in the background. Once [`Worker::start`] completes, the worker
/// receives deliveries and may send messages itself; a [`LifecycleEvent::Ready`]
/// notification fires on success and [`LifecycleEvent::Error`] on failure.
///
/// ```no_run
/// use fabric_worker::{DeliveryOptions, InMemoryFabric, Messages, Worker};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), fabric_worker::WorkerError> {
/// let fabric = Arc::new(InMemoryFabric::new());
/// let worker = Worker::new(
///     "myWorker",
///     fabric,
///     Messages::new()
///         .handle("myservice.doSomethingAmazing", |parameters, reply| {
///             reply.resolve(parameters);
///         }),
/// )?;
///
/// worker.start().await?;
/// let reply = worker
///     .request("myservice.doSomethingAmazing", json!([1, 2]), DeliveryOptions::default())
///     .await?;
/// worker.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Worker {
    shared: Arc<Shared>,
}

impl Worker {
    /// Creates a worker named `name` that listens for `messages` over a
    /// connection obtained from `fabric`.
    ///
    /// Validation failures (empty worker name, empty or duplicate message
    /// names) are returned synchronously; the connection attempt itself runs
    /// on a background task and its outcome is observed through
    /// [`Worker::start`]. Must be called from within a tokio runtime.
    pub fn new(
        name: impl Into<String>,
        fabric: Arc<dyn MessageFabric>,
        messages: Messages,
    ) -> Result<Self, WorkerError> {
        let name = name.into();
        if name.is_empty() {
            return Err(WorkerError::EmptyWorkerName);
        }
        let registry = HandlerRegistry::from_messages(messages)?;

        let (state, _) = watch::channel(ConnectionState::Connecting);
        let (phase, _) = watch::channel(ConnectPhase::Pending);
        let (events, _) = broadcast::channel(16);
        let shared = Arc::new(Shared {
            name,
            registry,
            state,
            phase,
            connection: Mutex::new(None),
            failure: Mutex::new(None),
            events,
        });

        // TODO: surface fabric-initiated disconnects once FabricConnection
        // grows a disconnect signal.
        let task = Arc::clone(&shared);
        tokio::spawn(async move {
            match fabric.connect(&task.name).await {
                Ok(conn) => {
                    let kept = {
                        let mut slot = task.connection.lock().unwrap();
                        if *task.state.borrow() == ConnectionState::Stopped {
                            false
                        } else {
                            task.registry.register(conn.as_ref());
                            *slot = Some(Arc::clone(&conn));
                            true
                        }
                    };
                    if kept {
                        log::debug!(
                            "worker '{}': connected, {} message(s) registered",
                            task.name,
                            task.registry.len()
                        );
                    } else if let Err(err) = conn.stop().await {
                        log::warn!(
                            "worker '{}': releasing a connection established after stop failed: {}",
                            task.name,
                            err
                        );
                    }
                    task.phase.send_replace(ConnectPhase::Connected);
                }
                Err(err) => {
                    log::error!("worker '{}': {}", task.name, err);
                    *task.failure.lock().unwrap() = Some(err);
                    task.state.send_replace(ConnectionState::Failed);
                    task.phase.send_replace(ConnectPhase::Failed);
                }
            }
        });

        Ok(Self { shared })
    }

    /// The worker's name. Workers sharing a name form one competing-consumer
    /// group for requests; each still receives broadcast events on its own.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Subscribes to lifecycle notifications.
    ///
    /// Subscribe before awaiting [`Worker::start`]; a receiver obtained
    /// afterwards misses notifications that already fired.
    pub fn notifications(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.shared.events.subscribe()
    }

    /// Starts the worker. Once started the worker receives messages and may
    /// send messages itself.
    ///
    /// Waits for the connection attempt from construction to settle, then
    /// asks the fabric to activate delivery. Emits [`LifecycleEvent::Ready`]
    /// on success and [`LifecycleEvent::Error`] (carrying the cause) on
    /// failure; the same cause is returned. A failed connection is never
    /// retried. Starting an already-ready worker is a no-op that reports
    /// success without a second notification.
    pub async fn start(&self) -> Result<(), WorkerError> {
        self.connection_settled().await;

        match self.state() {
            ConnectionState::Ready => return Ok(()),
            ConnectionState::Stopped => return Err(WorkerError::Stopped),
            ConnectionState::Failed => {
                let err = self.stored_failure();
                self.emit(LifecycleEvent::Error(err.clone()));
                return Err(err);
            }
            ConnectionState::Connecting => {}
        }

        let conn = match self.connection() {
            Some(conn) => conn,
            // stop() won the race while we were waiting.
            None => return Err(WorkerError::Stopped),
        };
        match conn.start().await {
            Ok(()) => {
                self.shared.state.send_replace(ConnectionState::Ready);
                log::info!("worker '{}': ready", self.shared.name);
                self.emit(LifecycleEvent::Ready);
                Ok(())
            }
            Err(err) => {
                log::error!(
                    "worker '{}': failed to activate delivery: {}",
                    self.shared.name,
                    err
                );
                *self.shared.failure.lock().unwrap() = Some(err.clone());
                self.shared.state.send_replace(ConnectionState::Failed);
                self.emit(LifecycleEvent::Error(err.clone()));
                Err(err)
            }
        }
    }

    /// Stops the worker. Once stopped the worker neither receives messages
    /// nor can send messages itself.
    ///
    /// Every handler is unregistered before the connection is released.
    /// Stopping is always safe: a worker that never reached readiness, or
    /// was already stopped, stops without error. Outstanding requests are
    /// not cancelled, but their completions are no longer guaranteed once
    /// the connection goes away.
    pub async fn stop(&self) -> Result<(), WorkerError> {
        let conn = {
            let mut slot = self.shared.connection.lock().unwrap();
            self.shared.state.send_replace(ConnectionState::Stopped);
            slot.take()
        };
        if let Some(conn) = conn {
            self.shared.registry.unregister(conn.as_ref());
            conn.stop().await?;
            log::info!("worker '{}': stopped", self.shared.name);
        }
        Ok(())
    }

    /// Sends `cmd` with the supplied parameters to the fabric and awaits the
    /// single reply. This is an RPC-style call: exactly one handler bound to
    /// `cmd` anywhere on the fabric receives it, with same-named workers
    /// served round-robin.
    ///
    /// Fails fast with [`WorkerError::NotReady`] unless the worker is ready;
    /// await a successful [`Worker::start`] first.
    pub async fn request(
        &self,
        cmd: &str,
        parameters: Payload,
        options: DeliveryOptions,
    ) -> Result<Payload, WorkerError> {
        let conn = self.ready_connection()?;
        conn.request(cmd, parameters, options).await
    }

    /// Publishes `event` with the supplied parameters to the fabric. Every
    /// worker subscribed to `event` is notified independently; success means
    /// the fabric accepted the event, not that any subscriber handled it.
    ///
    /// Fails fast with [`WorkerError::NotReady`] unless the worker is ready.
    pub async fn publish(
        &self,
        event: &str,
        parameters: Payload,
        options: DeliveryOptions,
    ) -> Result<(), WorkerError> {
        let conn = self.ready_connection()?;
        conn.publish(event, parameters, options).await
    }

    /// Waits until the connection attempt from construction has settled.
    async fn connection_settled(&self) {
        let mut phase = self.shared.phase.subscribe();
        while *phase.borrow_and_update() == ConnectPhase::Pending {
            if phase.changed().await.is_err() {
                break;
            }
        }
    }

    fn connection(&self) -> Option<Arc<dyn FabricConnection>> {
        self.shared.connection.lock().unwrap().clone()
    }

    fn ready_connection(&self) -> Result<Arc<dyn FabricConnection>, WorkerError> {
        if self.state() != ConnectionState::Ready {
            return Err(WorkerError::NotReady);
        }
        self.connection().ok_or(WorkerError::NotReady)
    }

    fn stored_failure(&self) -> WorkerError {
        self.shared
            .failure
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| WorkerError::Connect("connection attempt failed".to_string()))
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.shared.events.send(event);
    }
}
