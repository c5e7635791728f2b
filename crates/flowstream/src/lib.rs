//! Flow-controlled audio streams over a paced transport.
//!
//! This crate provides:
//!
//! - **Stream controller**: [`Stream`] with its connect/disconnect lifecycle
//!   and the [`StreamState`] machine
//! - **Write path**: [`Stream::write`] submits whole buffers; the transport
//!   pulls them in its own increments and the drain callback fires once per
//!   buffer
//! - **Read gate**: [`Stream::read`] arms or disarms delivery of captured
//!   chunks
//! - **Transport boundary**: the [`Transport`] and [`Connection`] traits plus
//!   two implementations, [`simulated`] and (feature `cpal-transport`)
//!   `cpal_transport`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use flowstream::{Direction, Stream, StreamFlags, StreamOptions};
//!
//! let mut stream = Stream::new(connection, StreamOptions::default().with_latency_usec(20_000))?;
//! stream.connect(None, Direction::Playback, StreamFlags::ADJUST_LATENCY)?;
//!
//! stream.write(Some(pcm.into()), Some(Box::new(|_stream| {
//!     println!("buffer handed to the device");
//!     Ok(())
//! })));
//!
//! loop {
//!     connection.iterate(Duration::from_millis(10));
//!     stream.dispatch();
//! }
//! ```

mod attr;
mod flags;
mod format;
mod read;
mod state;
mod stream;
mod transport;
mod write;

pub mod simulated;

#[cfg(feature = "cpal-transport")]
pub mod cpal_transport;

pub use attr::BufferAttr;
pub use flags::StreamFlags;
pub use format::{CHANNELS_MAX, RATE_MAX, SampleFormat, SampleSpec};
pub use state::{Direction, Latency, StreamState};
pub use stream::{
    CallbackError, CallbackResult, ChunkCallback, DEFAULT_STREAM_NAME, DrainCallback, StateListener, Stream,
    StreamOptions,
};
pub use transport::{ConnectParams, Connection, Transport, TransportError, TransportEvent};

/// Error types for stream operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The connection could not allocate a stream handle.
    #[error("unable to create stream: {0}")]
    Create(#[source] TransportError),

    /// The transport rejected the connect parameters.
    #[error("connect rejected: {0}")]
    Connect(#[source] TransportError),

    /// The transport cannot report latency right now.
    #[error("latency unavailable: {0}")]
    Latency(#[source] TransportError),

    /// The transport reported the stream as failed.
    #[error("stream failed: {0}")]
    Failed(String),

    /// Connect was called without a direction.
    #[error("stream direction must be playback, record or upload")]
    InvalidDirection,

    /// The operation is not valid in the current state.
    #[error("invalid operation in state {0}")]
    InvalidState(StreamState),

    /// Sample rate or channel count out of range.
    #[error("invalid sample spec: {0}")]
    InvalidSampleSpec(String),
}

/// Convenience result type for stream operations.
pub type Result<T> = std::result::Result<T, Error>;
