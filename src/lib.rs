
//! # Fabric Worker
//! A worker abstraction over a shared message fabric, implementing the
//! request-reply (competing consumers) and publish-subscribe (fan-out)
//! messaging patterns. The fabric itself is pluggable: the worker core
//! only consumes the [`MessageFabric`] trait, and an in-memory fabric is
//! included for tests and single-process use.

pub mod error;
pub mod fabric;
pub mod memory;
pub mod registry;
pub mod worker;

// Re-export key components for easy access
pub use error::{ErrorKind, WorkerError};
pub use fabric::{DeliveryOptions, FabricConnection, Handler, MessageFabric, Payload, Reply};
pub use memory::InMemoryFabric;
pub use registry::{HandlerRegistry, Messages};
pub use worker::{ConnectionState, LifecycleEvent, Worker};
