//! WAV playback through a flow-controlled stream.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use super::common::{Feeder, StreamArgs, failure_listener, interrupt_flag, needs_float};
use crate::wav::read_pcm;
use flowstream::{Direction, Stream};

#[derive(Args)]
pub struct PlayArgs {
    /// WAV file to play
    #[arg(value_name = "FILE")]
    file: PathBuf,

    #[command(flatten)]
    stream: StreamArgs,

    /// Audio per submitted buffer, in milliseconds
    #[arg(long, default_value = "100")]
    buffer_ms: u64,

    /// Main loop step, in milliseconds
    #[arg(long, default_value = "10")]
    tick_ms: u64,
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    println!("Loading {}...", args.file.display());
    let pcm = read_pcm(&args.file, needs_float(&args.stream))?;
    let total = pcm.bytes.len();
    println!(
        "  {} bytes, {}, {:.1}s",
        total,
        pcm.spec,
        pcm.spec.bytes_to_usec(total) as f64 / 1e6
    );

    let resolved = args.stream.resolve("default", Direction::Playback)?;
    let mut options = resolved.options;
    options.spec = pcm.spec;
    if let Some(stem) = args.file.file_stem().and_then(|s| s.to_str()) {
        options.name = stem.to_string();
    }

    let connection = args.stream.connection()?;
    let mut stream = Stream::new(Rc::clone(&connection), options)?;
    let failure = Rc::new(RefCell::new(None));
    stream.set_state_listener(failure_listener(&failure));
    stream.connect(
        resolved.connect.device.as_deref(),
        Direction::Playback,
        resolved.connect.flags,
    )?;

    let feeder = Feeder::new(Bytes::from(pcm.bytes), &pcm.spec, args.buffer_ms * 1000);
    Rc::clone(&feeder).submit_next(&mut stream);

    println!("\nPlaying... Press Ctrl+C to stop.\n");
    let running = interrupt_flag()?;

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("##-"),
    );

    let tick = Duration::from_millis(args.tick_ms.max(1));
    while running.load(Ordering::SeqCst) && !feeder.is_finished() && !stream.state().is_terminal() {
        connection.iterate(tick);
        stream.dispatch();
        pb.set_position(feeder.drained() as u64);
    }

    if let Some(message) = failure.borrow_mut().take() {
        pb.abandon();
        anyhow::bail!(message);
    }

    if feeder.is_finished() {
        // Let the device play out what it still holds.
        let tail = stream.latency().map(|l| Duration::from_micros(l.usec)).unwrap_or_default();
        connection.iterate(tail);
        stream.dispatch();
        pb.finish_with_message("done");
    } else {
        pb.abandon();
    }

    stream.disconnect();
    stream.dispatch();

    println!("\nPlayed {} of {} bytes", feeder.drained(), total);
    println!("  Underflows: {}", stream.underflow_count());
    if stream.callback_failures() > 0 {
        println!("  Callback failures: {}", stream.callback_failures());
    }
    println!("Done!");
    Ok(())
}
