//! Transport layer: line codec and per-connection message pump.
//!
//! # Components
//!
//! - **[`FrameCodec`]**: encode/decode one frame per text line
//! - **[`FrameReader`]**: reads frames off a buffered byte stream
//! - **[`Outbound`]**: bounded, ordered outbound queue feeding a writer task
//! - **[`ConnectionChannel`]**: reader + writer task pair for one connection
//! - **[`connect`]**: TCP connect with address resolution and timeout
//!
//! Producers never write to a socket directly: they enqueue frames on an
//! [`Outbound`] and the connection's writer task drains the queue in
//! order. A full queue makes producers wait rather than dropping frames.

pub mod codec;
pub mod connection;
pub mod tcp;

pub use codec::FrameCodec;
pub use connection::{
    map_io_error, spawn_writer, write_frames, ConnectionChannel, ConnectionConfig, FrameReader,
    Outbound, OutboundPermit, DEFAULT_MAX_FRAME_SIZE, DEFAULT_OUTBOUND_CAPACITY,
};
pub use tcp::{connect, DEFAULT_CONNECT_TIMEOUT};
