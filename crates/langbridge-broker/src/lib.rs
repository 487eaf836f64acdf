//! langbridge broker
//!
//! The broker is the hub every endpoint connects to. It keeps the
//! session's class registry and object table, picks the constructor or
//! method overload a request refers to, forwards the resulting instruction
//! to the endpoint that owns the object, and routes the answer back to the
//! caller.
//!
//! # Components
//!
//! - **[`Registry`]**: class descriptors by name, object handles by name
//! - **[`resolver`]**: first-match overload resolution, strict or loose
//! - **[`CorrelationTable`]**: pending calls keyed by broker-allocated id
//! - **[`Broker`]**: the call router tying the three together
//! - **[`BrokerServer`]**: TCP listener with per-connection reader/writer tasks

pub mod broker;
pub mod config;
pub mod correlation;
pub mod registry;
pub mod resolver;
pub mod server;

pub use broker::{Broker, BrokerStats};
pub use config::{BrokerConfig, DEFAULT_BIND_ADDR};
pub use correlation::{CorrelationTable, PendingCall};
pub use registry::{ObjectBinding, RegisteredClass, Registry};
pub use resolver::Strictness;
pub use server::{BrokerServer, ServerHandle};
