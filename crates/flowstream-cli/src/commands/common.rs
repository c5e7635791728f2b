//! Shared CLI helpers used across multiple commands.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::bail;
use bytes::Bytes;
use clap::Args;
use flowstream::simulated::SimulatedConnection;
use flowstream::{Connection, Direction, SampleSpec, StateListener, Stream, StreamState};
use flowstream_config::{StreamProfile, ValidatedProfile, load_profile};

/// Stream settings shared by `play` and `record`.
#[derive(Args)]
pub struct StreamArgs {
    /// Profile name or path
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Device name (partial match)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Latency target in microseconds (overrides the profile)
    #[arg(long)]
    pub latency_usec: Option<u64>,

    /// Run against the simulated transport instead of a sound card
    #[arg(long)]
    pub simulate: bool,
}

impl StreamArgs {
    /// Load the profile (or `fallback`), apply overrides, and validate.
    pub fn resolve(&self, fallback: &str, direction: Direction) -> anyhow::Result<ValidatedProfile> {
        let name = self.profile.as_deref().unwrap_or(fallback);
        let mut profile: StreamProfile = match load_profile(name) {
            Ok(profile) => profile,
            Err(e) => bail!("{e}. Use 'flowstream profiles list' to see available profiles."),
        };
        if let Some(device) = &self.device {
            profile.device = Some(device.clone());
        }
        if let Some(latency_usec) = self.latency_usec {
            profile.latency_usec = latency_usec;
        }

        let mut resolved = profile.resolve()?;
        if resolved.connect.direction != direction {
            tracing::debug!(
                profile = %profile.name,
                from = %resolved.connect.direction,
                to = %direction,
                "overriding profile direction"
            );
            resolved.connect.direction = direction;
        }
        Ok(resolved)
    }

    /// Connection to the selected transport.
    pub fn connection(&self) -> anyhow::Result<Rc<dyn Connection>> {
        if self.simulate {
            let connection = SimulatedConnection::new();
            connection.discard_written(true);
            return Ok(Rc::new(connection));
        }
        device_connection()
    }
}

#[cfg(feature = "cpal-transport")]
fn device_connection() -> anyhow::Result<Rc<dyn Connection>> {
    Ok(Rc::new(flowstream::cpal_transport::CpalConnection::new()))
}

#[cfg(not(feature = "cpal-transport"))]
fn device_connection() -> anyhow::Result<Rc<dyn Connection>> {
    bail!("built without the cpal-transport feature; pass --simulate to use the simulated transport")
}

/// Whether the sound card path needs `f32le` samples.
pub fn needs_float(args: &StreamArgs) -> bool {
    cfg!(feature = "cpal-transport") && !args.simulate
}

/// Install a Ctrl+C handler and return the running flag it clears.
pub fn interrupt_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}

/// State listener that keeps the failure message, if any.
pub fn failure_listener(failure: &Rc<RefCell<Option<String>>>) -> Option<StateListener> {
    let failure = Rc::clone(failure);
    Some(Box::new(move |state: StreamState, error: Option<&flowstream::Error>| {
        if let Some(error) = error {
            *failure.borrow_mut() = Some(error.to_string());
        }
        tracing::debug!(%state, "state listener");
        Ok(())
    }))
}

/// Splits a byte buffer into frame-aligned pieces and submits them one at a
/// time, each from the previous piece's drain callback.
pub struct Feeder {
    pieces: RefCell<VecDeque<Bytes>>,
    submitted: Cell<usize>,
    drained: Cell<usize>,
    finished: Cell<bool>,
}

impl Feeder {
    /// Prepare `data` in pieces of `piece_usec` worth of audio.
    pub fn new(data: Bytes, spec: &SampleSpec, piece_usec: u64) -> Rc<Self> {
        let piece = spec.usec_to_bytes(piece_usec).max(spec.frame_size());
        let mut pieces = VecDeque::new();
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + piece).min(data.len());
            pieces.push_back(data.slice(offset..end));
            offset = end;
        }
        Rc::new(Self {
            pieces: RefCell::new(pieces),
            submitted: Cell::new(0),
            drained: Cell::new(0),
            finished: Cell::new(false),
        })
    }

    /// Submit the next piece, or mark the feed finished.
    pub fn submit_next(self: Rc<Self>, stream: &mut Stream) {
        let next = self.pieces.borrow_mut().pop_front();
        match next {
            Some(piece) => {
                self.submitted.set(self.submitted.get() + piece.len());
                let len = piece.len();
                let feeder = Rc::clone(&self);
                stream.write(
                    Some(piece),
                    Some(Box::new(move |stream: &mut Stream| {
                        feeder.drained.set(feeder.drained.get() + len);
                        feeder.submit_next(stream);
                        Ok(())
                    })),
                );
            }
            None => self.finished.set(true),
        }
    }

    /// Bytes handed to the stream so far.
    pub fn submitted(&self) -> usize {
        self.submitted.get()
    }

    /// Bytes of fully drained pieces.
    pub fn drained(&self) -> usize {
        self.drained.get()
    }

    /// Whether every piece has drained.
    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }
}
