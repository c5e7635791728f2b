//! The transport boundary.
//!
//! A [`Transport`] is the stream-level handle of some lower layer (an audio
//! server connection, a device, a simulation) that paces data on its own
//! schedule. It never calls back into the engine directly. Instead it queues
//! [`TransportEvent`]s which the owning [`Stream`](crate::Stream) pulls with
//! [`dispatch`](crate::Stream::dispatch). This keeps every notification on the
//! engine's thread and lets the engine call back into the transport while it
//! handles one.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  create_stream   ┌──────────────────┐
//! │  Connection  │ ───────────────▶ │ Box<dyn Transport>│
//! │ (shared, Rc) │                  └────────┬─────────┘
//! └──────┬───────┘                           │ owned by
//!        │ iterate()                         ▼
//!        │ (mainloop step)          ┌──────────────────┐
//!        └────────────────────────▶ │      Stream       │
//!                                   │ dispatch(): pulls │
//!                                   │ TransportEvent s  │
//!                                   └──────────────────┘
//! ```

use std::time::Duration;

use bytes::Bytes;

use crate::attr::BufferAttr;
use crate::flags::StreamFlags;
use crate::format::SampleSpec;
use crate::state::{Direction, Latency, StreamState};

/// Errors reported by a transport or connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection refused to allocate a stream handle.
    #[error("stream handle refused: {0}")]
    Refused(String),

    /// Connect parameters were rejected.
    #[error("invalid connect parameters: {0}")]
    Rejected(String),

    /// The requested information is not available yet.
    #[error("no data available")]
    NoData,

    /// The operation is not valid in the current transport state.
    #[error("bad transport state")]
    BadState,

    /// The transport does not support the requested configuration.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

/// Notification from the transport to its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport-side stream state changed.
    StateChanged(StreamState),
    /// A fresh latency measurement can be queried.
    LatencyChanged,
    /// The transport settled on new buffer metrics.
    BufferAttrChanged(BufferAttr),
    /// The transport is ready to accept this many bytes.
    WriteRequest(usize),
    /// This many captured bytes are ready to be peeked.
    ReadReady(usize),
    /// The device ran out of data to play.
    Underflow,
    /// A flush requested with [`Transport::flush`] completed.
    FlushComplete {
        /// Whether the transport reported success.
        success: bool,
    },
}

/// Parameters of a connect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParams<'a> {
    /// Device to attach to, or the transport's default.
    pub device: Option<&'a str>,
    /// Data direction.
    pub direction: Direction,
    /// Buffer sizing hints.
    pub attr: BufferAttr,
    /// Tuning flags.
    pub flags: StreamFlags,
}

/// Stream-level transport handle.
///
/// Every method is non-blocking. Outcomes that take time (connect, flush,
/// disconnect) are reported later as [`TransportEvent`]s.
pub trait Transport {
    /// Attach the stream. Synchronous rejection is an error; the eventual
    /// outcome arrives as [`TransportEvent::StateChanged`].
    fn connect(&mut self, params: &ConnectParams<'_>) -> Result<(), TransportError>;

    /// Detach the stream. Completion arrives as a `Terminated` state change.
    fn disconnect(&mut self);

    /// Pause (`true`) or resume (`false`) pacing.
    fn cork(&mut self, corked: bool);

    /// Whether pacing is paused.
    fn is_corked(&self) -> bool;

    /// Bytes the transport would accept right now.
    fn writable_size(&self) -> usize;

    /// Hand bytes to the transport, appended after everything written so far.
    fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Push everything written so far through. Completion arrives as
    /// [`TransportEvent::FlushComplete`], one per call, in call order.
    fn flush(&mut self);

    /// The oldest captured chunk, without consuming it.
    fn peek(&mut self) -> Option<Bytes>;

    /// Release the chunk returned by [`peek`](Transport::peek). No-op when
    /// nothing is buffered.
    fn drop_chunk(&mut self);

    /// Current end-to-end latency.
    fn latency(&self) -> Result<Latency, TransportError>;

    /// Next queued notification, if any.
    fn poll_event(&mut self) -> Option<TransportEvent>;
}

/// Session with an audio server or device layer that hands out stream handles.
pub trait Connection {
    /// Allocate a stream handle.
    fn create_stream(&self, name: &str, spec: &SampleSpec) -> Result<Box<dyn Transport>, TransportError>;

    /// Description of the most recent error on this connection.
    fn error_description(&self) -> String;

    /// Run one mainloop step, waiting at most `max_wait` for the transport to
    /// make progress.
    fn iterate(&self, max_wait: Duration);
}
