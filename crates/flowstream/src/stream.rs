//! Stream controller: lifecycle, state machine and event dispatch.

use std::fmt;
use std::rc::Rc;

use bytes::Bytes;

use crate::attr::BufferAttr;
use crate::flags::StreamFlags;
use crate::format::{SampleFormat, SampleSpec};
use crate::read::ReadGate;
use crate::state::{Direction, Latency, StreamState};
use crate::transport::{ConnectParams, Connection, Transport, TransportEvent};
use crate::write::WritePath;
use crate::{Error, Result};

/// Error type application callbacks may return.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of application callbacks. An `Err` is logged and counted; it
/// never changes engine state.
pub type CallbackResult = std::result::Result<(), CallbackError>;

/// Fired once when a submitted buffer has been fully handed to the transport.
pub type DrainCallback = Box<dyn FnOnce(&mut Stream) -> CallbackResult>;

/// Fired with each captured chunk while the read gate is armed.
pub type ChunkCallback = Box<dyn FnMut(&mut Stream, Bytes) -> CallbackResult>;

/// Fired on every state change. The error is set only for `Failed`.
pub type StateListener = Box<dyn FnMut(StreamState, Option<&Error>) -> CallbackResult>;

/// Default stream name announced to the transport.
pub const DEFAULT_STREAM_NAME: &str = "flowstream";

/// Construction parameters for a [`Stream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    /// Byte layout of the stream.
    pub spec: SampleSpec,
    /// Latency target in microseconds. Zero lets the transport decide.
    pub latency_usec: u64,
    /// Name announced to the transport.
    pub name: String,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            spec: SampleSpec::default(),
            latency_usec: 0,
            name: DEFAULT_STREAM_NAME.to_string(),
        }
    }
}

impl StreamOptions {
    /// Set the sample format.
    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.spec.format = format;
        self
    }

    /// Set the sample rate.
    pub fn with_rate(mut self, rate: u32) -> Self {
        self.spec.rate = rate;
        self
    }

    /// Set the channel count.
    pub fn with_channels(mut self, channels: u8) -> Self {
        self.spec.channels = channels;
        self
    }

    /// Set the latency target.
    pub fn with_latency_usec(mut self, latency_usec: u64) -> Self {
        self.latency_usec = latency_usec;
        self
    }

    /// Set the stream name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A flow-controlled audio stream over a paced [`Transport`].
///
/// The application submits whole buffers with [`write`](Stream::write) and
/// arms capture with [`read`](Stream::read). The transport drives both paths
/// through [`TransportEvent`]s, pulled with [`dispatch`](Stream::dispatch).
/// Everything runs on the caller's thread and nothing blocks.
///
/// ## Example
///
/// ```rust
/// use std::rc::Rc;
/// use flowstream::{Direction, Stream, StreamFlags, StreamOptions, StreamState};
/// use flowstream::simulated::SimulatedConnection;
///
/// let connection = Rc::new(SimulatedConnection::new());
/// let mut stream = Stream::new(connection.clone(), StreamOptions::default())?;
/// let device = connection.last_handle().expect("handle allocated");
///
/// stream.connect(None, Direction::Playback, StreamFlags::NONE)?;
/// stream.dispatch();
/// assert_eq!(stream.state(), StreamState::Ready);
///
/// stream.write(Some(vec![1u8, 2, 3, 4].into()), None);
/// device.request_write(16);
/// stream.dispatch();
/// assert_eq!(device.written(), vec![1, 2, 3, 4]);
/// # Ok::<(), flowstream::Error>(())
/// ```
pub struct Stream {
    name: String,
    spec: SampleSpec,
    latency_usec: u64,
    buffer_attr: BufferAttr,
    direction: Direction,
    state: StreamState,
    disconnect_requested: bool,
    last_latency: Option<Latency>,
    underflows: u64,
    callback_failures: u64,
    write: WritePath,
    read: ReadGate,
    state_listener: Option<StateListener>,
    // Dropped before `connection`.
    transport: Box<dyn Transport>,
    connection: Rc<dyn Connection>,
}

impl Stream {
    /// Create a stream and allocate its transport handle.
    pub fn new(connection: Rc<dyn Connection>, options: StreamOptions) -> Result<Self> {
        let StreamOptions {
            spec,
            latency_usec,
            name,
        } = options;

        if !spec.is_valid() {
            return Err(Error::InvalidSampleSpec(spec.to_string()));
        }

        let transport = connection.create_stream(&name, &spec).map_err(Error::Create)?;
        tracing::debug!(name = %name, spec = %spec, latency_usec, "stream created");

        Ok(Self {
            name,
            spec,
            latency_usec,
            buffer_attr: BufferAttr::default(),
            direction: Direction::Unset,
            state: StreamState::Unconnected,
            disconnect_requested: false,
            last_latency: None,
            underflows: 0,
            callback_failures: 0,
            write: WritePath::default(),
            read: ReadGate::default(),
            state_listener: None,
            transport,
            connection,
        })
    }

    /// Register or clear the state listener.
    pub fn set_state_listener(&mut self, listener: Option<StateListener>) {
        self.state_listener = listener;
    }

    /// Connect in `direction`, optionally to a named device.
    ///
    /// The outcome is asynchronous: the stream enters `Creating` here and
    /// `Ready` or `Failed` when the transport says so.
    pub fn connect(&mut self, device: Option<&str>, direction: Direction, flags: StreamFlags) -> Result<()> {
        if direction == Direction::Unset {
            return Err(Error::InvalidDirection);
        }
        if self.state != StreamState::Unconnected {
            return Err(Error::InvalidState(self.state));
        }

        let attr = BufferAttr::for_connect(direction, self.latency_usec, &self.spec);
        tracing::debug!(%direction, %flags, device = device.unwrap_or("default"), "{attr}");

        let params = ConnectParams {
            device,
            direction,
            attr,
            flags,
        };
        self.transport.connect(&params).map_err(Error::Connect)?;

        self.direction = direction;
        self.buffer_attr = attr;
        self.set_state(StreamState::Creating);
        Ok(())
    }

    /// Ask the transport to tear the stream down. Idempotent.
    pub fn disconnect(&mut self) {
        if self.disconnect_requested || !self.state.is_connected() {
            return;
        }
        tracing::debug!(name = %self.name, "disconnect");
        self.disconnect_requested = true;
        self.transport.disconnect();
    }

    /// Query the transport for the current latency.
    pub fn latency(&self) -> Result<Latency> {
        self.transport.latency().map_err(Error::Latency)
    }

    /// Arm the read gate with `callback`, or disarm it with `None`.
    pub fn read(&mut self, callback: Option<ChunkCallback>) {
        match callback {
            Some(callback) => self.read.arm(callback, self.transport.as_mut()),
            None => self.read.disarm(self.transport.as_mut()),
        }
    }

    /// Submit a buffer for playback, or pause with `None` or an empty buffer.
    ///
    /// A buffer still pending from an earlier call is flushed to the
    /// transport first and its drain callback fires once the flush is
    /// confirmed. `on_drained` fires once this buffer has been handed over in
    /// full.
    pub fn write(&mut self, buffer: Option<Bytes>, on_drained: Option<DrainCallback>) {
        let due = self.write.submit(buffer, on_drained, self.transport.as_mut());
        self.fire_drained(due);
    }

    /// Handle every queued transport notification. Returns how many were
    /// handled.
    pub fn dispatch(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.transport.poll_event() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Handle one transport notification.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => self.on_state_changed(state),
            TransportEvent::LatencyChanged => self.on_latency_changed(),
            TransportEvent::BufferAttrChanged(attr) => {
                tracing::debug!("{attr}");
                self.buffer_attr = attr;
            }
            TransportEvent::WriteRequest(requested) => self.on_write_request(requested),
            TransportEvent::ReadReady(size) => self.on_read_ready(size),
            TransportEvent::Underflow => self.on_underflow(),
            TransportEvent::FlushComplete { success } => {
                if !success {
                    tracing::warn!("transport reported failed flush");
                }
                let due = self.write.on_flush_complete(self.transport.as_mut());
                self.fire_drained(due);
            }
        }
    }

    /// Current connection state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Direction chosen at connect time.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Byte layout of the stream.
    pub fn sample_spec(&self) -> &SampleSpec {
        &self.spec
    }

    /// Name announced to the transport.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested latency target in microseconds.
    pub fn requested_latency_usec(&self) -> u64 {
        self.latency_usec
    }

    /// Buffer metrics: what was requested at connect, or what the transport
    /// reported since.
    pub fn buffer_attr(&self) -> &BufferAttr {
        &self.buffer_attr
    }

    /// Most recent latency seen through a latency notification.
    pub fn last_latency(&self) -> Option<Latency> {
        self.last_latency
    }

    /// Device underflows reported so far.
    pub fn underflow_count(&self) -> u64 {
        self.underflows
    }

    /// Application callbacks that returned an error so far.
    pub fn callback_failures(&self) -> u64 {
        self.callback_failures
    }

    /// Whether the transport is corked.
    pub fn is_corked(&self) -> bool {
        self.transport.is_corked()
    }

    /// Whether a chunk callback is registered.
    pub fn is_reading(&self) -> bool {
        self.read.is_armed()
    }

    /// Length and write cursor of the active output buffer.
    pub fn pending_write(&self) -> Option<(usize, usize)> {
        self.write.pending()
    }

    /// Whether superseded buffers still wait for flush confirmation.
    pub fn is_flushing(&self) -> bool {
        self.write.outstanding_flushes() > 0 || self.write.has_queued()
    }

    fn on_state_changed(&mut self, next: StreamState) {
        if next == self.state {
            return;
        }
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "ignoring invalid state transition");
            return;
        }
        self.set_state(next);
    }

    fn set_state(&mut self, next: StreamState) {
        tracing::info!(name = %self.name, from = %self.state, to = %next, "stream state");
        self.state = next;

        if next.is_terminal() {
            // Registered callbacks are never invoked once the stream is gone.
            self.write.abandon();
            self.read.clear();
        }

        let error = (next == StreamState::Failed).then(|| Error::Failed(self.connection.error_description()));
        if let Some(ref e) = error {
            tracing::warn!(name = %self.name, error = %e, "stream failed");
        }

        if let Some(listener) = self.state_listener.as_mut()
            && let Err(e) = listener(next, error.as_ref())
        {
            tracing::warn!(error = %e, "state listener failed");
            self.callback_failures += 1;
        }
    }

    fn on_latency_changed(&mut self) {
        match self.transport.latency() {
            Ok(latency) => {
                tracing::debug!(%latency, "latency");
                self.last_latency = Some(latency);
            }
            Err(e) => tracing::trace!(error = %e, "latency not available"),
        }
    }

    fn accepts_data(&self) -> bool {
        self.state.is_connected() && !self.disconnect_requested
    }

    fn on_write_request(&mut self, requested: usize) {
        if !self.accepts_data() || !self.direction.writes() {
            tracing::trace!(requested, "ignoring write request");
            return;
        }
        if let Some(callback) = self.write.on_write_request(requested, self.transport.as_mut()) {
            self.fire_drained(vec![callback]);
        }
    }

    fn on_read_ready(&mut self, size: usize) {
        if !self.accepts_data() || !self.direction.reads() {
            // Still reclaim whatever the transport buffered.
            self.transport.drop_chunk();
            return;
        }
        let Some(delivery) = self.read.on_read_ready(size, self.transport.as_mut()) else {
            return;
        };
        let mut callback = delivery.callback;
        if let Err(e) = callback(self, delivery.chunk) {
            tracing::warn!(error = %e, "chunk callback failed");
            self.callback_failures += 1;
        }
        self.read.restore(callback, delivery.epoch);
    }

    fn on_underflow(&mut self) {
        self.underflows += 1;
        tracing::debug!(name = %self.name, count = self.underflows, "underflow");
    }

    fn fire_drained(&mut self, callbacks: Vec<DrainCallback>) {
        for callback in callbacks {
            if let Err(e) = callback(self) {
                tracing::warn!(error = %e, "drain callback failed");
                self.callback_failures += 1;
            }
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if self.state.is_connected() && !self.disconnect_requested {
            self.disconnect_requested = true;
            self.transport.disconnect();
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("direction", &self.direction)
            .field("state", &self.state)
            .field("pending_write", &self.write.pending())
            .field("reading", &self.read.is_armed())
            .finish_non_exhaustive()
    }
}
