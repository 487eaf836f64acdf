//! langbridge endpoint client
//!
//! Connects a program to a langbridge broker so it can expose classes to
//! other runtimes and use theirs.
//!
//! - **[`BridgeClient`]**: register classes, create remote objects, call methods
//! - **[`ReturnCorrelator`]**: matches each Return to the call waiting on it
//! - **[`ObjectHost`]** / **[`ObjectTable`]**: how this endpoint runs the
//!   instructions the broker forwards to it

pub mod client;
pub mod correlator;
pub mod host;

pub use client::{BridgeClient, ClientConfig, DEFAULT_ERROR_QUEUE_CAPACITY};
pub use correlator::{PendingReturn, ReturnCorrelator};
pub use host::{HostObject, ObjectHost, ObjectTable};
