//! Stream direction, connection state machine and latency observations.

use std::fmt;
use std::str::FromStr;

/// Which way data flows through a stream. Fixed when the stream connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Not connected yet.
    #[default]
    Unset,
    /// Application to device.
    Playback,
    /// Device to application.
    Record,
    /// Application to a server-side sample cache.
    Upload,
}

impl Direction {
    /// Directions that can be passed to `connect`.
    pub const CONNECTABLE: [Direction; 3] = [Direction::Playback, Direction::Record, Direction::Upload];

    /// Lowercase identifier.
    pub const fn name(self) -> &'static str {
        match self {
            Direction::Unset => "unset",
            Direction::Playback => "playback",
            Direction::Record => "record",
            Direction::Upload => "upload",
        }
    }

    /// Whether the write path is live for this direction.
    pub const fn writes(self) -> bool {
        matches!(self, Direction::Playback | Direction::Upload)
    }

    /// Whether the read gate is live for this direction.
    pub const fn reads(self) -> bool {
        matches!(self, Direction::Record)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "playback" => Ok(Direction::Playback),
            "record" => Ok(Direction::Record),
            "upload" => Ok(Direction::Upload),
            "unset" => Ok(Direction::Unset),
            _ => Err(format!("unknown stream direction '{s}'")),
        }
    }
}

/// Connection state of a stream.
///
/// ```text
/// Unconnected ──connect()──▶ Creating ──ready──▶ Ready
///       │                       │                  │
///       └───────────────────────┴──────────────────┴──▶ Failed | Terminated
/// ```
///
/// `Failed` and `Terminated` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamState {
    /// Handle allocated, not connected.
    #[default]
    Unconnected,
    /// Connect issued, waiting for the transport.
    Creating,
    /// Established; data may flow.
    Ready,
    /// The transport reported an error.
    Failed,
    /// Disconnected.
    Terminated,
}

impl StreamState {
    /// Every state, in lifecycle order.
    pub const ALL: [StreamState; 5] = [
        StreamState::Unconnected,
        StreamState::Creating,
        StreamState::Ready,
        StreamState::Failed,
        StreamState::Terminated,
    ];

    /// Lowercase identifier.
    pub const fn name(self) -> &'static str {
        match self {
            StreamState::Unconnected => "unconnected",
            StreamState::Creating => "creating",
            StreamState::Ready => "ready",
            StreamState::Failed => "failed",
            StreamState::Terminated => "terminated",
        }
    }

    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, StreamState::Failed | StreamState::Terminated)
    }

    /// Whether the stream holds a live transport connection.
    pub const fn is_connected(self) -> bool {
        matches!(self, StreamState::Creating | StreamState::Ready)
    }

    /// Whether `self -> next` is a legal transition.
    pub const fn can_transition_to(self, next: StreamState) -> bool {
        match (self, next) {
            (StreamState::Unconnected, StreamState::Creating) => true,
            (StreamState::Creating, StreamState::Ready) => true,
            (from, StreamState::Failed | StreamState::Terminated) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One latency observation. Latency can be negative when a record stream is
/// read ahead of the device clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Latency {
    /// Magnitude in microseconds.
    pub usec: u64,
    /// Sign of the observation.
    pub negative: bool,
}

impl Latency {
    /// A non-negative latency.
    pub const fn new(usec: u64) -> Self {
        Self {
            usec,
            negative: false,
        }
    }

    /// Signed value in microseconds.
    pub fn as_signed_usec(&self) -> i64 {
        let usec = i64::try_from(self.usec).unwrap_or(i64::MAX);
        if self.negative { -usec } else { usec }
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}us", if self.negative { "-" } else { "" }, self.usec)
    }
}
