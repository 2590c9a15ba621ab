//! Subscription registry for a publish/subscribe message bus.
//!
//! Persistently records which endpoints want which message types from this
//! publisher, and answers "who receives this message type?" from an
//! in-process cache on every publish.

pub mod config;
pub mod registry;
pub mod storage;
pub mod subscription;
pub mod utils;

pub use config::{ConfigError, RegistryConfig};
pub use registry::SubscriptionRegistry;
pub use storage::{AmbientConnection, ConnectionTarget, StorageError, SubscriptionStore};
pub use subscription::Subscription;
