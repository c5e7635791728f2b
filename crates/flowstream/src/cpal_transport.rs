//! cpal-backed transport for real playback and capture devices.
//!
//! cpal runs its data callbacks on a real-time thread. This transport bridges
//! that thread to the engine's single-threaded model with a shared byte queue
//! per direction: the audio callback drains (playback) or fills (record) the
//! queue, and [`poll_event`](Transport::poll_event), running on the engine
//! thread, turns queue levels into write requests, read notifications and
//! underflows. The audio callback only ever `try_lock`s the queue and plays
//! silence when it cannot get it.
//!
//! Only [`SampleFormat::F32Le`] streams are carried; cpal hands out native
//! `f32` samples and this transport does not convert formats.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use flowstream::cpal_transport::CpalConnection;
//! use flowstream::{Direction, SampleFormat, Stream, StreamFlags, StreamOptions};
//!
//! let connection = Rc::new(CpalConnection::new());
//! let options = StreamOptions::default().with_format(SampleFormat::F32Le).with_rate(48000);
//! let mut stream = Stream::new(connection.clone(), options)?;
//! stream.connect(None, Direction::Playback, StreamFlags::NONE)?;
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::attr::BufferAttr;
use crate::flags::StreamFlags;
use crate::format::{SampleFormat, SampleSpec};
use crate::state::{Direction, Latency, StreamState};
use crate::transport::{ConnectParams, Connection, Transport, TransportError, TransportEvent};

const SAMPLE_BYTES: usize = 4;
const DEFAULT_TARGET_USEC: u64 = 100_000;
const DEFAULT_FRAGMENT_USEC: u64 = 20_000;

/// State shared with the audio thread.
#[derive(Debug, Default)]
struct Shared {
    playback: VecDeque<u8>,
    capture: VecDeque<u8>,
    capture_limit: usize,
    corked: bool,
    primed: bool,
    underflowed: bool,
    error: Option<String>,
}

/// Extract device name via `description()` (cpal 0.17+).
fn device_name(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|d| d.name().to_string())
}

/// Find a device whose name contains `search` (case-insensitive), or the
/// host default.
fn find_device(host: &cpal::Host, search: Option<&str>, direction: Direction) -> Result<cpal::Device, TransportError> {
    let input = direction == Direction::Record;
    let Some(search) = search else {
        let device = if input {
            host.default_input_device()
        } else {
            host.default_output_device()
        };
        return device.ok_or_else(|| TransportError::Rejected("no default audio device".to_string()));
    };

    let search_lower = search.to_lowercase();
    let devices: Vec<cpal::Device> = if input {
        host.input_devices()
            .map_err(|e| TransportError::Backend(e.to_string()))?
            .collect()
    } else {
        host.output_devices()
            .map_err(|e| TransportError::Backend(e.to_string()))?
            .collect()
    };

    devices
        .into_iter()
        .find(|device| device_name(device).is_some_and(|name| name.to_lowercase().contains(&search_lower)))
        .ok_or_else(|| TransportError::Rejected(format!("no {direction} device matching '{search}'")))
}

/// Stream handle on a cpal device.
pub struct CpalTransport {
    spec: SampleSpec,
    shared: Arc<Mutex<Shared>>,
    stream: Option<cpal::Stream>,
    direction: Direction,
    attr: BufferAttr,
    state: StreamState,
    advertised: usize,
    current_chunk: Option<Bytes>,
    chunk_pending: bool,
    events: VecDeque<TransportEvent>,
    last_error: Rc<RefCell<Option<String>>>,
}

impl CpalTransport {
    fn new(spec: SampleSpec, last_error: Rc<RefCell<Option<String>>>) -> Self {
        Self {
            spec,
            shared: Arc::new(Mutex::new(Shared::default())),
            stream: None,
            direction: Direction::Unset,
            attr: BufferAttr::default(),
            state: StreamState::Unconnected,
            advertised: 0,
            current_chunk: None,
            chunk_pending: false,
            events: VecDeque::new(),
            last_error,
        }
    }

    fn set_state(&mut self, state: StreamState) {
        self.state = state;
        self.events.push_back(TransportEvent::StateChanged(state));
    }

    fn target_length(&self) -> usize {
        self.attr.target_length.unwrap_or(0) as usize
    }

    fn fragment_size(&self) -> usize {
        (self.attr.fragment_size.unwrap_or(0) as usize).max(self.spec.frame_size())
    }

    fn effective_attr(&self, requested: BufferAttr) -> BufferAttr {
        let bytes = |usec| u32::try_from(self.spec.usec_to_bytes(usec)).unwrap_or(u32::MAX);
        let target = requested.target_length.unwrap_or_else(|| bytes(DEFAULT_TARGET_USEC));
        let min_request = requested.min_request.unwrap_or(target / 4);
        BufferAttr {
            max_length: Some(requested.max_length.unwrap_or(target.saturating_mul(4))),
            target_length: Some(target),
            pre_buffer: Some(requested.pre_buffer.unwrap_or(0)),
            min_request: Some(min_request),
            fragment_size: Some(requested.fragment_size.unwrap_or_else(|| bytes(DEFAULT_FRAGMENT_USEC))),
        }
    }

    fn build_stream(&self, device: &cpal::Device) -> Result<cpal::Stream, TransportError> {
        let stream_config = cpal::StreamConfig {
            channels: u16::from(self.spec.channels),
            sample_rate: self.spec.rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let error_shared = Arc::clone(&self.shared);
        let on_error = move |err: cpal::StreamError| {
            if let Ok(mut shared) = error_shared.lock() {
                shared.error = Some(err.to_string());
            }
        };

        let shared = Arc::clone(&self.shared);
        let stream = match self.direction {
            Direction::Playback => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut shared) = shared.try_lock() else {
                        data.fill(0.0);
                        return;
                    };
                    if shared.corked {
                        data.fill(0.0);
                        return;
                    }
                    let mut filled = 0;
                    while filled < data.len() && shared.playback.len() >= SAMPLE_BYTES {
                        let mut raw = [0u8; SAMPLE_BYTES];
                        for (dst, src) in raw.iter_mut().zip(shared.playback.drain(..SAMPLE_BYTES)) {
                            *dst = src;
                        }
                        data[filled] = f32::from_le_bytes(raw);
                        filled += 1;
                    }
                    if filled < data.len() {
                        data[filled..].fill(0.0);
                        if shared.primed {
                            shared.underflowed = true;
                        }
                    }
                    if filled > 0 {
                        shared.primed = true;
                    }
                },
                on_error,
                None,
            ),
            _ => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let Ok(mut shared) = shared.try_lock() else {
                        return;
                    };
                    if shared.corked {
                        return;
                    }
                    for sample in data {
                        shared.capture.extend(sample.to_le_bytes());
                    }
                    let excess = shared.capture.len().saturating_sub(shared.capture_limit);
                    if excess > 0 {
                        shared.capture.drain(..excess);
                    }
                },
                on_error,
                None,
            ),
        };

        stream.map_err(|e| TransportError::Backend(e.to_string()))
    }
}

impl Transport for CpalTransport {
    fn connect(&mut self, params: &ConnectParams<'_>) -> Result<(), TransportError> {
        if self.state != StreamState::Unconnected {
            return Err(TransportError::BadState);
        }
        if !matches!(params.direction, Direction::Playback | Direction::Record) {
            return Err(TransportError::Unsupported(format!(
                "{} streams are not available on cpal devices",
                params.direction
            )));
        }

        self.direction = params.direction;
        self.attr = self.effective_attr(params.attr);

        let host = cpal::default_host();
        let device = find_device(&host, params.device, params.direction)?;
        {
            let mut shared = self.shared.lock().map_err(|_| TransportError::BadState)?;
            shared.corked = params.flags.contains(StreamFlags::START_CORKED);
            shared.capture_limit = self.attr.max_length.unwrap_or(u32::MAX) as usize;
        }

        let stream = self.build_stream(&device)?;
        stream.play().map_err(|e| TransportError::Backend(e.to_string()))?;
        tracing::info!(
            device = device_name(&device).as_deref().unwrap_or("unknown"),
            channels = self.spec.channels,
            sample_rate = self.spec.rate,
            direction = %self.direction,
            "cpal stream started"
        );
        self.stream = Some(stream);

        let attr = self.attr;
        self.set_state(StreamState::Creating);
        self.set_state(StreamState::Ready);
        self.events.push_back(TransportEvent::BufferAttrChanged(attr));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.stream = None;
        if !self.state.is_terminal() {
            self.set_state(StreamState::Terminated);
        }
    }

    fn cork(&mut self, corked: bool) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.corked = corked;
        }
    }

    fn is_corked(&self) -> bool {
        self.shared.lock().map(|shared| shared.corked).unwrap_or(true)
    }

    fn writable_size(&self) -> usize {
        if self.state != StreamState::Ready || self.direction != Direction::Playback {
            return 0;
        }
        self.shared
            .lock()
            .map(|shared| self.target_length().saturating_sub(shared.playback.len()))
            .unwrap_or(0)
    }

    fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.state != StreamState::Ready {
            return Err(TransportError::BadState);
        }
        let mut shared = self.shared.lock().map_err(|_| TransportError::BadState)?;
        shared.playback.extend(bytes.iter().copied());
        self.advertised = self.advertised.saturating_sub(bytes.len());
        Ok(())
    }

    fn flush(&mut self) {
        // Written bytes are already queued for the device.
        self.events.push_back(TransportEvent::FlushComplete { success: true });
    }

    fn peek(&mut self) -> Option<Bytes> {
        if self.current_chunk.is_none() {
            let fragment = self.fragment_size();
            let mut shared = self.shared.lock().ok()?;
            let len = fragment.min(shared.capture.len());
            if len == 0 {
                return None;
            }
            let chunk: Vec<u8> = shared.capture.drain(..len).collect();
            self.current_chunk = Some(Bytes::from(chunk));
        }
        self.current_chunk.clone()
    }

    fn drop_chunk(&mut self) {
        if self.current_chunk.take().is_none()
            && self.chunk_pending
            && let Ok(mut shared) = self.shared.lock()
        {
            let len = self.fragment_size().min(shared.capture.len());
            shared.capture.drain(..len);
        }
        self.chunk_pending = false;
    }

    fn latency(&self) -> Result<Latency, TransportError> {
        if self.state != StreamState::Ready {
            return Err(TransportError::NoData);
        }
        let shared = self.shared.lock().map_err(|_| TransportError::BadState)?;
        let buffered = match self.direction {
            Direction::Playback => shared.playback.len(),
            _ => shared.capture.len(),
        };
        Ok(Latency::new(self.spec.bytes_to_usec(buffered)))
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        if self.state != StreamState::Ready {
            return None;
        }

        let (error, event) = {
            let mut shared = self.shared.lock().ok()?;
            if let Some(error) = shared.error.take() {
                (Some(error), None)
            } else if shared.corked {
                (None, None)
            } else {
                match self.direction {
                    Direction::Playback if std::mem::take(&mut shared.underflowed) => {
                        (None, Some(TransportEvent::Underflow))
                    }
                    Direction::Playback => {
                        let writable = self.target_length().saturating_sub(shared.playback.len());
                        let min_request = (self.attr.min_request.unwrap_or(0) as usize).max(1);
                        if writable.saturating_sub(self.advertised) >= min_request {
                            self.advertised = writable;
                            (None, Some(TransportEvent::WriteRequest(writable)))
                        } else {
                            (None, None)
                        }
                    }
                    Direction::Record if !self.chunk_pending && shared.capture.len() >= self.fragment_size() => {
                        self.chunk_pending = true;
                        (None, Some(TransportEvent::ReadReady(self.fragment_size())))
                    }
                    _ => (None, None),
                }
            }
        };

        if let Some(error) = error {
            tracing::warn!(error = %error, "cpal stream error");
            *self.last_error.borrow_mut() = Some(error);
            self.stream = None;
            self.state = StreamState::Failed;
            return Some(TransportEvent::StateChanged(StreamState::Failed));
        }
        event
    }
}

/// Connection to the platform's default cpal host.
#[derive(Debug, Default)]
pub struct CpalConnection {
    last_error: Rc<RefCell<Option<String>>>,
}

impl CpalConnection {
    /// Create a connection to the default host.
    pub fn new() -> Self {
        tracing::info!(host = cpal::default_host().id().name(), "cpal connection initialized");
        Self::default()
    }
}

impl Connection for CpalConnection {
    fn create_stream(&self, name: &str, spec: &SampleSpec) -> Result<Box<dyn Transport>, TransportError> {
        if spec.format != SampleFormat::F32Le {
            return Err(TransportError::Refused(format!(
                "stream '{name}': cpal devices carry f32le samples only, not {}",
                spec.format
            )));
        }
        Ok(Box::new(CpalTransport::new(*spec, Rc::clone(&self.last_error))))
    }

    fn error_description(&self) -> String {
        self.last_error
            .borrow()
            .clone()
            .unwrap_or_else(|| "no error".to_string())
    }

    fn iterate(&self, max_wait: Duration) {
        // The device clock runs on its own; just give it time.
        std::thread::sleep(max_wait);
    }
}
