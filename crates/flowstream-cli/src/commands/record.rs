//! Capture from a record stream into a WAV file.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use clap::Args;
use flowstream::{Direction, SampleFormat, Stream};
use hound::WavWriter;
use indicatif::{ProgressBar, ProgressStyle};

use super::common::{StreamArgs, failure_listener, interrupt_flag, needs_float};
use crate::wav::{wav_spec, write_bytes};

#[derive(Args)]
pub struct RecordArgs {
    /// WAV file to write
    #[arg(value_name = "FILE")]
    output: PathBuf,

    #[command(flatten)]
    stream: StreamArgs,

    /// Recording length in seconds
    #[arg(short = 't', long, default_value = "5.0")]
    duration: f64,

    /// Main loop step, in milliseconds
    #[arg(long, default_value = "10")]
    tick_ms: u64,
}

pub fn run(args: RecordArgs) -> anyhow::Result<()> {
    if !(args.duration.is_finite() && args.duration > 0.0) {
        anyhow::bail!("duration must be a positive number of seconds");
    }

    let resolved = args.stream.resolve("voice-capture", Direction::Record)?;
    let mut options = resolved.options;
    if needs_float(&args.stream) {
        options.spec.format = SampleFormat::F32Le;
    }
    let spec = options.spec;
    let writer = WavWriter::create(&args.output, wav_spec(&spec)?)?;
    let target = spec.usec_to_bytes((args.duration * 1e6) as u64);

    let connection = args.stream.connection()?;
    let mut stream = Stream::new(Rc::clone(&connection), options)?;
    let failure = Rc::new(RefCell::new(None));
    stream.set_state_listener(failure_listener(&failure));
    stream.connect(
        resolved.connect.device.as_deref(),
        Direction::Record,
        resolved.connect.flags,
    )?;

    let writer = Rc::new(RefCell::new(Some(writer)));
    let captured = Rc::new(Cell::new(0usize));
    {
        let writer = Rc::clone(&writer);
        let captured = Rc::clone(&captured);
        stream.read(Some(Box::new(move |_: &mut Stream, chunk: Bytes| {
            let take = chunk.len().min(target.saturating_sub(captured.get()));
            if let Some(writer) = writer.borrow_mut().as_mut() {
                write_bytes(writer, spec.format, &chunk[..take])?;
            }
            captured.set(captured.get() + take);
            Ok(())
        })));
    }

    println!("Recording {:.1}s of {} to {}", args.duration, spec, args.output.display());
    println!("Press Ctrl+C to stop early.\n");
    let running = interrupt_flag()?;

    let pb = ProgressBar::new(target as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.green/blue}] {bytes}/{total_bytes}")?
            .progress_chars("##-"),
    );

    let tick = Duration::from_millis(args.tick_ms.max(1));
    while running.load(Ordering::SeqCst) && captured.get() < target && !stream.state().is_terminal() {
        connection.iterate(tick);
        stream.dispatch();
        pb.set_position(captured.get() as u64);
    }
    pb.finish();

    stream.read(None);
    stream.disconnect();
    stream.dispatch();

    if let Some(writer) = writer.borrow_mut().take() {
        writer.finalize()?;
    }
    if let Some(message) = failure.borrow_mut().take() {
        anyhow::bail!(message);
    }

    println!("\nCaptured {} bytes ({:.2}s)", captured.get(), spec.bytes_to_usec(captured.get()) as f64 / 1e6);
    if stream.callback_failures() > 0 {
        println!("  Write failures: {}", stream.callback_failures());
    }
    println!("Done!");
    Ok(())
}
