//! langbridge common types and transport
//!
//! This crate provides the wire protocol and connection plumbing shared by
//! the broker and by endpoints.
//!
//! # Overview
//!
//! langbridge lets programs running in different runtimes share live
//! objects through a single broker. Each runtime ("endpoint") registers the
//! classes it exposes; any endpoint can then create objects of those
//! classes and call methods on them, wherever they live.
//!
//! - **Protocol Layer**: type-tags, class descriptors, arguments, frames, error kinds
//! - **Transport Layer**: newline-delimited frame codec, bounded outbound
//!   queue, reader/writer pump per connection
//!
//! # Wire format
//!
//! - **Transport**: one TCP connection per endpoint
//! - **Framing**: one frame per line, `OOOOO[RRRRR]PAYLOAD`
//! - **Payload**: compact JSON, plain text for `Error`
//!
//! # Example
//!
//! ```
//! use langbridge_common::protocol::{Argument, Frame};
//! use langbridge_common::transport::FrameCodec;
//!
//! let frame = Frame::call_method(1, "calc", "add", vec![Argument::from(2), Argument::from(3)]);
//! let line = FrameCodec::encode(&frame).unwrap();
//! assert!(line.starts_with("0000300001"));
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
