//! Deterministic in-process transport.
//!
//! [`SimulatedConnection`] hands out [`Transport`]s backed by a scripted
//! device. Every created stream also gets a [`SimulatedHandle`] that can
//! inject notifications (state changes, write requests, captured chunks,
//! underflows, latency updates), hold back flush confirmations, and inspect
//! what the engine did to the transport (bytes written, cork state, chunks
//! acknowledged).
//!
//! Two ways to drive it:
//!
//! - **Scripted**: call [`SimulatedHandle::request_write`],
//!   [`SimulatedHandle::push_capture`] and friends, then
//!   [`Stream::dispatch`](crate::Stream::dispatch).
//! - **Clocked**: [`Connection::iterate`] advances a virtual device clock.
//!   Playback streams consume queued bytes at the sample rate and ask for more
//!   as space frees up; record streams produce silence in fragment sized
//!   chunks.
//!
//! ```rust
//! use std::rc::Rc;
//! use flowstream::{Direction, Stream, StreamFlags, StreamOptions};
//! use flowstream::simulated::SimulatedConnection;
//!
//! let connection = Rc::new(SimulatedConnection::new());
//! let mut stream = Stream::new(connection.clone(), StreamOptions::default())?;
//! let device = connection.last_handle().expect("handle allocated");
//! stream.connect(None, Direction::Record, StreamFlags::NONE)?;
//! stream.dispatch();
//!
//! assert!(device.push_capture(&[0u8; 8]));
//! stream.dispatch();
//! assert_eq!(device.acknowledged(), 1);
//! # Ok::<(), flowstream::Error>(())
//! ```

use std::cell::{Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;

use crate::attr::BufferAttr;
use crate::flags::StreamFlags;
use crate::format::{SampleFormat, SampleSpec};
use crate::state::{Direction, Latency, StreamState};
use crate::transport::{ConnectParams, Connection, Transport, TransportError, TransportEvent};

/// Playback buffer target used when the stream asks for the default.
const DEFAULT_TARGET_USEC: u64 = 250_000;

/// Record fragment size used when the stream asks for the default.
const DEFAULT_FRAGMENT_USEC: u64 = 25_000;

/// Connect-time settings the device recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Attachment {
    device: Option<String>,
    direction: Direction,
    requested: BufferAttr,
    flags: StreamFlags,
}

#[derive(Debug)]
struct Device {
    name: String,
    spec: SampleSpec,
    attachment: Option<Attachment>,
    attr: BufferAttr,
    state: StreamState,
    auto_ready: bool,
    reject_connect: Option<String>,
    corked: bool,
    writable: usize,
    written: Vec<u8>,
    written_total: usize,
    discard_written: bool,
    write_sizes: Vec<usize>,
    flush_requests: usize,
    hold_flushes: bool,
    held_flushes: usize,
    capture: VecDeque<Bytes>,
    acknowledged: usize,
    latency: Option<Latency>,
    events: VecDeque<TransportEvent>,
    disconnects: usize,
    released: bool,
    queued: usize,
    played: usize,
    underflowing: bool,
    capture_backlog: usize,
}

impl Device {
    fn new(name: &str, spec: SampleSpec) -> Self {
        Self {
            name: name.to_string(),
            spec,
            attachment: None,
            attr: BufferAttr::default(),
            state: StreamState::Unconnected,
            auto_ready: true,
            reject_connect: None,
            corked: false,
            writable: 0,
            written: Vec::new(),
            written_total: 0,
            discard_written: false,
            write_sizes: Vec::new(),
            flush_requests: 0,
            hold_flushes: false,
            held_flushes: 0,
            capture: VecDeque::new(),
            acknowledged: 0,
            latency: None,
            events: VecDeque::new(),
            disconnects: 0,
            released: false,
            queued: 0,
            played: 0,
            underflowing: false,
            capture_backlog: 0,
        }
    }

    fn direction(&self) -> Direction {
        self.attachment.as_ref().map_or(Direction::Unset, |a| a.direction)
    }

    fn set_state(&mut self, state: StreamState) {
        self.state = state;
        self.events.push_back(TransportEvent::StateChanged(state));
    }

    /// Fill in transport defaults for everything the stream left unset.
    fn effective_attr(&self, requested: BufferAttr) -> BufferAttr {
        let target = requested
            .target_length
            .unwrap_or_else(|| u32::try_from(self.spec.usec_to_bytes(DEFAULT_TARGET_USEC)).unwrap_or(u32::MAX));
        let min_request = requested.min_request.unwrap_or(target / 4);
        BufferAttr {
            max_length: Some(requested.max_length.unwrap_or(target.saturating_mul(4))),
            target_length: Some(target),
            pre_buffer: Some(requested.pre_buffer.unwrap_or(target.saturating_sub(min_request))),
            min_request: Some(min_request),
            fragment_size: Some(requested.fragment_size.unwrap_or_else(|| {
                u32::try_from(self.spec.usec_to_bytes(DEFAULT_FRAGMENT_USEC)).unwrap_or(u32::MAX)
            })),
        }
    }

    fn push_capture(&mut self, chunk: Bytes) -> bool {
        if self.corked || chunk.is_empty() {
            return false;
        }
        let len = chunk.len();
        self.capture.push_back(chunk);
        self.events.push_back(TransportEvent::ReadReady(len));
        true
    }

    fn advance(&mut self, elapsed: Duration) {
        if self.state != StreamState::Ready || self.corked {
            return;
        }
        let usec = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let bytes = self.spec.usec_to_bytes(usec);

        match self.direction() {
            Direction::Playback => {
                let played = bytes.min(self.queued);
                self.queued -= played;
                self.played += played;
                if played < bytes && self.played > 0 && !self.underflowing {
                    self.underflowing = true;
                    self.events.push_back(TransportEvent::Underflow);
                }

                let target = self.attr.target_length.unwrap_or(0) as usize;
                let min_request = self.attr.min_request.unwrap_or(0) as usize;
                let free = target.saturating_sub(self.queued);
                if free > self.writable && free - self.writable >= min_request.max(1) {
                    self.writable = free;
                    self.events.push_back(TransportEvent::WriteRequest(free));
                }
            }
            Direction::Record => {
                let fragment = (self.attr.fragment_size.unwrap_or(0) as usize).max(self.spec.frame_size());
                self.capture_backlog += bytes;
                let silence = silence_byte(self.spec.format);
                while self.capture_backlog >= fragment {
                    self.capture_backlog -= fragment;
                    self.push_capture(Bytes::from(vec![silence; fragment]));
                }
            }
            Direction::Upload | Direction::Unset => {}
        }
    }
}

/// Byte value that encodes silence in `format`.
fn silence_byte(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::U8 => 0x80,
        SampleFormat::ALaw => 0xd5,
        SampleFormat::ULaw => 0xff,
        _ => 0,
    }
}

/// The [`Transport`] half of a simulated stream, owned by the engine.
#[derive(Debug)]
pub struct SimulatedTransport {
    device: Rc<RefCell<Device>>,
}

impl SimulatedTransport {
    fn device(&self) -> Ref<'_, Device> {
        self.device.borrow()
    }

    fn device_mut(&self) -> RefMut<'_, Device> {
        self.device.borrow_mut()
    }
}

impl Transport for SimulatedTransport {
    fn connect(&mut self, params: &ConnectParams<'_>) -> Result<(), TransportError> {
        let mut device = self.device_mut();
        if device.state != StreamState::Unconnected {
            return Err(TransportError::BadState);
        }
        if let Some(reason) = device.reject_connect.clone() {
            return Err(TransportError::Rejected(reason));
        }

        device.attachment = Some(Attachment {
            device: params.device.map(str::to_string),
            direction: params.direction,
            requested: params.attr,
            flags: params.flags,
        });
        device.attr = device.effective_attr(params.attr);
        device.corked = params.flags.contains(StreamFlags::START_CORKED);
        device.set_state(StreamState::Creating);

        if device.auto_ready {
            let attr = device.attr;
            device.set_state(StreamState::Ready);
            device.events.push_back(TransportEvent::BufferAttrChanged(attr));
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut device = self.device_mut();
        device.disconnects += 1;
        if !device.state.is_terminal() {
            device.set_state(StreamState::Terminated);
        }
    }

    fn cork(&mut self, corked: bool) {
        self.device_mut().corked = corked;
    }

    fn is_corked(&self) -> bool {
        self.device().corked
    }

    fn writable_size(&self) -> usize {
        self.device().writable
    }

    fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut device = self.device_mut();
        if device.state.is_terminal() {
            return Err(TransportError::BadState);
        }
        device.written_total += bytes.len();
        if !device.discard_written {
            device.written.extend_from_slice(bytes);
        }
        device.write_sizes.push(bytes.len());
        device.writable = device.writable.saturating_sub(bytes.len());
        device.queued += bytes.len();
        device.underflowing = false;
        Ok(())
    }

    fn flush(&mut self) {
        let mut device = self.device_mut();
        device.flush_requests += 1;
        if device.hold_flushes {
            device.held_flushes += 1;
        } else {
            device.events.push_back(TransportEvent::FlushComplete { success: true });
        }
    }

    fn peek(&mut self) -> Option<Bytes> {
        self.device().capture.front().cloned()
    }

    fn drop_chunk(&mut self) {
        let mut device = self.device_mut();
        if device.capture.pop_front().is_some() {
            device.acknowledged += 1;
        }
    }

    fn latency(&self) -> Result<Latency, TransportError> {
        let device = self.device();
        if device.state != StreamState::Ready {
            return Err(TransportError::NoData);
        }
        if let Some(latency) = device.latency {
            return Ok(latency);
        }
        let buffered = device.queued + device.capture.iter().map(Bytes::len).sum::<usize>();
        Ok(Latency::new(device.spec.bytes_to_usec(buffered)))
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.device_mut().events.pop_front()
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        self.device_mut().released = true;
    }
}

/// Script and inspect one simulated stream.
#[derive(Debug, Clone)]
pub struct SimulatedHandle {
    device: Rc<RefCell<Device>>,
}

impl SimulatedHandle {
    /// Name the stream was created with.
    pub fn name(&self) -> String {
        self.device.borrow().name.clone()
    }

    /// Sample spec the stream was created with.
    pub fn sample_spec(&self) -> SampleSpec {
        self.device.borrow().spec
    }

    /// Transport-side state.
    pub fn state(&self) -> StreamState {
        self.device.borrow().state
    }

    /// Whether a connect reports `Ready` on its own. Defaults to `true`.
    pub fn set_auto_ready(&self, auto_ready: bool) {
        self.device.borrow_mut().auto_ready = auto_ready;
    }

    /// Make the next connect fail synchronously with `reason`.
    pub fn reject_connect(&self, reason: Option<&str>) {
        self.device.borrow_mut().reject_connect = reason.map(str::to_string);
    }

    /// Report a state change.
    pub fn set_state(&self, state: StreamState) {
        self.device.borrow_mut().set_state(state);
    }

    /// Ask for `len` bytes, as the device does when space frees up.
    pub fn request_write(&self, len: usize) {
        let mut device = self.device.borrow_mut();
        device.writable = len;
        device.events.push_back(TransportEvent::WriteRequest(len));
    }

    /// Set what `writable_size` answers without sending a request.
    pub fn set_writable(&self, len: usize) {
        self.device.borrow_mut().writable = len;
    }

    /// Deliver a captured chunk. Returns `false` if the stream is corked and
    /// the chunk was discarded.
    pub fn push_capture(&self, chunk: &[u8]) -> bool {
        self.device.borrow_mut().push_capture(Bytes::copy_from_slice(chunk))
    }

    /// Report a device underflow.
    pub fn underflow(&self) {
        self.device.borrow_mut().events.push_back(TransportEvent::Underflow);
    }

    /// Override the latency answer and announce it. `None` goes back to the
    /// buffer-derived estimate.
    pub fn set_latency(&self, latency: Option<Latency>) {
        let mut device = self.device.borrow_mut();
        device.latency = latency;
        device.events.push_back(TransportEvent::LatencyChanged);
    }

    /// Queue an arbitrary notification.
    pub fn push_event(&self, event: TransportEvent) {
        self.device.borrow_mut().events.push_back(event);
    }

    /// Hold flush confirmations back until [`release_flushes`](Self::release_flushes).
    pub fn hold_flushes(&self, hold: bool) {
        self.device.borrow_mut().hold_flushes = hold;
    }

    /// Queue confirmations for every held flush. Returns how many.
    pub fn release_flushes(&self) -> usize {
        let mut device = self.device.borrow_mut();
        let held = std::mem::take(&mut device.held_flushes);
        for _ in 0..held {
            device.events.push_back(TransportEvent::FlushComplete { success: true });
        }
        held
    }

    /// Every byte written so far, in order. Empty if the connection was told
    /// to [discard written bytes](SimulatedConnection::discard_written).
    pub fn written(&self) -> Vec<u8> {
        self.device.borrow().written.clone()
    }

    /// Total bytes written, kept or not.
    pub fn written_bytes(&self) -> usize {
        self.device.borrow().written_total
    }

    /// Size of each `write_chunk` call, in order.
    pub fn write_sizes(&self) -> Vec<usize> {
        self.device.borrow().write_sizes.clone()
    }

    /// Forget recorded writes.
    pub fn clear_written(&self) {
        let mut device = self.device.borrow_mut();
        device.written.clear();
        device.write_sizes.clear();
    }

    /// Whether pacing is paused.
    pub fn is_corked(&self) -> bool {
        self.device.borrow().corked
    }

    /// Number of flushes requested.
    pub fn flush_requests(&self) -> usize {
        self.device.borrow().flush_requests
    }

    /// Number of captured chunks released by the engine.
    pub fn acknowledged(&self) -> usize {
        self.device.borrow().acknowledged
    }

    /// Captured chunks still buffered.
    pub fn buffered_chunks(&self) -> usize {
        self.device.borrow().capture.len()
    }

    /// Number of disconnect calls.
    pub fn disconnects(&self) -> usize {
        self.device.borrow().disconnects
    }

    /// Whether the engine dropped its transport.
    pub fn is_released(&self) -> bool {
        self.device.borrow().released
    }

    /// Notifications not yet dispatched.
    pub fn pending_events(&self) -> usize {
        self.device.borrow().events.len()
    }

    /// Direction given at connect, if connected.
    pub fn direction(&self) -> Option<Direction> {
        self.device.borrow().attachment.as_ref().map(|a| a.direction)
    }

    /// Device name given at connect.
    pub fn device_name(&self) -> Option<String> {
        self.device.borrow().attachment.as_ref().and_then(|a| a.device.clone())
    }

    /// Buffer attributes the stream asked for at connect.
    pub fn requested_attr(&self) -> Option<BufferAttr> {
        self.device.borrow().attachment.as_ref().map(|a| a.requested)
    }

    /// Flags given at connect.
    pub fn connect_flags(&self) -> Option<StreamFlags> {
        self.device.borrow().attachment.as_ref().map(|a| a.flags)
    }

    /// Buffer attributes in effect after defaults were applied.
    pub fn effective_attr(&self) -> BufferAttr {
        self.device.borrow().attr
    }

    /// Bytes written but not yet played by the virtual clock.
    pub fn queued_bytes(&self) -> usize {
        self.device.borrow().queued
    }

    /// Bytes played by the virtual clock.
    pub fn played_bytes(&self) -> usize {
        self.device.borrow().played
    }
}

#[derive(Debug, Default)]
struct ConnectionInner {
    devices: Vec<Rc<RefCell<Device>>>,
    last_error: Option<String>,
    refusal: Option<String>,
    discard_written: bool,
    clock: Duration,
}

/// A simulated server connection. Shared between streams with `Rc`.
#[derive(Debug, Default)]
pub struct SimulatedConnection {
    inner: RefCell<ConnectionInner>,
}

impl SimulatedConnection {
    /// Create a connection with no streams.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse (with `Some(reason)`) or allow new stream handles.
    pub fn refuse_streams(&self, reason: Option<&str>) {
        self.inner.borrow_mut().refusal = reason.map(str::to_string);
    }

    /// Set what [`Connection::error_description`] reports.
    pub fn set_error(&self, description: &str) {
        self.inner.borrow_mut().last_error = Some(description.to_string());
    }

    /// Count written bytes without keeping them, for streams created from
    /// now on.
    pub fn discard_written(&self, discard: bool) {
        self.inner.borrow_mut().discard_written = discard;
    }

    /// Handles for every live stream.
    pub fn handles(&self) -> Vec<SimulatedHandle> {
        self.inner
            .borrow()
            .devices
            .iter()
            .map(|device| SimulatedHandle {
                device: Rc::clone(device),
            })
            .collect()
    }

    /// Handle for the most recently created live stream.
    pub fn last_handle(&self) -> Option<SimulatedHandle> {
        self.inner.borrow().devices.last().map(|device| SimulatedHandle {
            device: Rc::clone(device),
        })
    }

    /// Advance the virtual device clock of every stream. Streams whose
    /// transport was released are forgotten.
    pub fn advance(&self, elapsed: Duration) {
        let mut inner = self.inner.borrow_mut();
        inner.clock += elapsed;
        inner.devices.retain(|device| !device.borrow().released);
        for device in &inner.devices {
            device.borrow_mut().advance(elapsed);
        }
    }

    /// Total virtual time elapsed.
    pub fn clock(&self) -> Duration {
        self.inner.borrow().clock
    }
}

impl Connection for SimulatedConnection {
    fn create_stream(&self, name: &str, spec: &SampleSpec) -> Result<Box<dyn Transport>, TransportError> {
        let mut inner = self.inner.borrow_mut();
        if let Some(reason) = &inner.refusal {
            return Err(TransportError::Refused(reason.clone()));
        }
        let mut device = Device::new(name, *spec);
        device.discard_written = inner.discard_written;
        let device = Rc::new(RefCell::new(device));
        inner.devices.push(Rc::clone(&device));
        Ok(Box::new(SimulatedTransport { device }))
    }

    fn error_description(&self) -> String {
        self.inner
            .borrow()
            .last_error
            .clone()
            .unwrap_or_else(|| "no error".to_string())
    }

    fn iterate(&self, max_wait: Duration) {
        self.advance(max_wait);
    }
}
