
//! The message-fabric capability set consumed by [`crate::worker::Worker`].
//!
//! A fabric is the broker/transport collaborator that owns delivery
//! semantics: competing-consumer routing for requests and fan-out for
//! events. The worker core only ever talks to these traits; wire framing,
//! topology, and RPC correlation live behind them.

use crate::error::WorkerError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Message payloads travel as JSON values end to end.
pub type Payload = serde_json::Value;

/// The outcome a handler produces through its [`Reply`] token.
pub type ReplyResult = Result<Payload, WorkerError>;

/// Application-supplied message handler.
///
/// Invoked with the message parameters and a [`Reply`] token that must be
/// completed exactly once. Handlers must not block the caller; either
/// complete the reply synchronously or move it into a spawned task.
pub type Handler = Arc<dyn Fn(Payload, Reply) + Send + Sync>;

/// One-shot completion token handed to a handler on every delivery.
///
/// The token is consumed by [`Reply::resolve`] or [`Reply::reject`], so
/// completing a delivery twice is impossible. Dropping the token without
/// completing it surfaces to the requester as
/// [`WorkerError::ReplyDropped`].
pub struct Reply {
    tx: oneshot::Sender<ReplyResult>,
}

impl Reply {
    /// Creates a reply token together with the receiving half a fabric
    /// implementation awaits for the handler's outcome.
    pub fn channel() -> (Reply, oneshot::Receiver<ReplyResult>) {
        let (tx, rx) = oneshot::channel();
        (Reply { tx }, rx)
    }

    /// Completes the delivery successfully with `value`.
    pub fn resolve(self, value: Payload) {
        let _ = self.tx.send(Ok(value));
    }

    /// Completes the delivery with a failure.
    pub fn reject(self, error: impl Into<WorkerError>) {
        let _ = self.tx.send(Err(error.into()));
    }
}

/// Delivery hints passed through to the fabric on `request`/`publish`.
///
/// All hints are optional; the default carries none and must not alter
/// delivery behavior. Whether a hint is honored is up to the fabric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// Relative delivery priority, fabric-defined scale.
    pub priority: Option<u8>,
    /// Time the message may spend undelivered before the fabric discards it.
    pub ttl: Option<Duration>,
}

impl DeliveryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a delivery priority hint.
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets a time-to-live hint.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Entry point into a message fabric: opens named connections.
///
/// Connections opened under the same name form one competing-consumer group
/// for requests; every connection is an independent subscriber for events.
#[async_trait]
pub trait MessageFabric: Send + Sync {
    /// Opens a connection for the worker named `name`.
    async fn connect(&self, name: &str) -> Result<Arc<dyn FabricConnection>, WorkerError>;
}

/// A single fabric connection, exclusively owned by one worker.
#[async_trait]
pub trait FabricConnection: Send + Sync {
    /// Binds `handler` under `name`. Binding an already-bound name replaces
    /// the previous handler.
    fn on(&self, name: &str, handler: Handler);

    /// Removes the binding for `name`. Unbinding an absent name is a no-op.
    fn off(&self, name: &str);

    /// Activates inbound delivery. Until this succeeds, bound handlers
    /// receive nothing.
    async fn start(&self) -> Result<(), WorkerError>;

    /// Deactivates inbound delivery and releases the connection.
    async fn stop(&self) -> Result<(), WorkerError>;

    /// Point-to-point dispatch: exactly one handler bound to `cmd` anywhere
    /// on the fabric receives the parameters; its reply outcome is returned.
    async fn request(
        &self,
        cmd: &str,
        parameters: Payload,
        options: DeliveryOptions,
    ) -> Result<Payload, WorkerError>;

    /// Broadcast dispatch: every started connection with a handler bound to
    /// `event` is invoked independently. `Ok` means the fabric accepted the
    /// event, not that any subscriber succeeded.
    async fn publish(
        &self,
        event: &str,
        parameters: Payload,
        options: DeliveryOptions,
    ) -> Result<(), WorkerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reply_resolve_reaches_the_receiver() {
        let (reply, rx) = Reply::channel();
        reply.resolve(json!(42));
        assert_eq!(rx.await.unwrap(), Ok(json!(42)));
    }

    #[tokio::test]
    async fn reply_reject_carries_the_handler_failure() {
        let (reply, rx) = Reply::channel();
        reply.reject("out of cheese");
        assert_eq!(
            rx.await.unwrap(),
            Err(WorkerError::Handler("out of cheese".into()))
        );
    }

    #[tokio::test]
    async fn dropped_reply_closes_the_channel() {
        let (reply, rx) = Reply::channel();
        drop(reply);
        assert!(rx.await.is_err());
    }

    #[test]
    fn default_options_carry_no_hints() {
        let options = DeliveryOptions::default();
        assert_eq!(options.priority, None);
        assert_eq!(options.ttl, None);
    }

    #[test]
    fn options_builder_sets_hints() {
        let options = DeliveryOptions::new()
            .priority(7)
            .ttl(Duration::from_secs(30));
        assert_eq!(options.priority, Some(7));
        assert_eq!(options.ttl, Some(Duration::from_secs(30)));
    }
}
