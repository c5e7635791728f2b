//! Run a stream against the simulated transport's virtual clock.
//!
//! Useful for checking how a profile's buffering behaves without a sound
//! card: playback sessions report requests, underflows and drains; record
//! sessions report captured fragments.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use clap::Args;
use flowstream::simulated::SimulatedConnection;
use flowstream::{Connection, Direction, Stream};
use flowstream_config::load_profile;

use super::common::Feeder;

#[derive(Args)]
pub struct SimulateArgs {
    /// Profile name or path
    #[arg(short, long, default_value = "low-latency")]
    profile: String,

    /// Session length in seconds of virtual time
    #[arg(short = 't', long, default_value = "1.0")]
    duration: f64,

    /// Virtual clock step, in milliseconds
    #[arg(long, default_value = "10")]
    tick_ms: u64,

    /// Audio per submitted buffer, in milliseconds (playback only)
    #[arg(long, default_value = "50")]
    buffer_ms: u64,

    /// Stall the feed for this many milliseconds halfway through (playback only)
    #[arg(long, default_value = "0")]
    stall_ms: u64,
}

pub fn run(args: SimulateArgs) -> anyhow::Result<()> {
    if !(args.duration.is_finite() && args.duration > 0.0) {
        anyhow::bail!("duration must be a positive number of seconds");
    }

    let profile = load_profile(&args.profile)?;
    let resolved = profile.resolve()?;
    let spec = resolved.options.spec;

    let connection = Rc::new(SimulatedConnection::new());
    connection.discard_written(true);
    let mut stream = Stream::new(connection.clone(), resolved.options)?;
    let Some(device) = connection.last_handle() else {
        anyhow::bail!("simulated connection did not allocate a stream");
    };
    stream.connect(
        resolved.connect.device.as_deref(),
        resolved.connect.direction,
        resolved.connect.flags,
    )?;

    println!("Simulating profile '{}'", profile.name);
    println!("  Spec:      {}", spec);
    println!("  Direction: {}", resolved.connect.direction);
    println!("  Flags:     {}", resolved.connect.flags);

    let tick = Duration::from_millis(args.tick_ms.max(1));
    let session = Duration::from_secs_f64(args.duration);
    let steps = (session.as_micros() / tick.as_micros()).max(1);

    match resolved.connect.direction {
        Direction::Record => {
            let chunks = Rc::new(Cell::new(0usize));
            let bytes = Rc::new(Cell::new(0usize));
            {
                let chunks = Rc::clone(&chunks);
                let bytes = Rc::clone(&bytes);
                stream.read(Some(Box::new(move |_: &mut Stream, chunk: Bytes| {
                    chunks.set(chunks.get() + 1);
                    bytes.set(bytes.get() + chunk.len());
                    Ok(())
                })));
            }
            for _ in 0..steps {
                connection.iterate(tick);
                stream.dispatch();
            }
            println!("  Buffer:    {}", stream.buffer_attr());
            println!();
            println!("Captured {} chunks, {} bytes", chunks.get(), bytes.get());
        }
        _ => {
            let total = spec.usec_to_bytes(u64::try_from(session.as_micros()).unwrap_or(u64::MAX));
            let data: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
            let feeder = Feeder::new(Bytes::from(data), &spec, args.buffer_ms * 1000);
            Rc::clone(&feeder).submit_next(&mut stream);

            let stall_at = steps / 2;
            let stall_steps = u128::from(args.stall_ms) * 1000 / tick.as_micros();
            let mut step = 0;
            while !feeder.is_finished() && step < steps * 4 {
                if step == stall_at && stall_steps > 0 {
                    // The device keeps playing while the application is late.
                    for _ in 0..stall_steps {
                        connection.iterate(tick);
                    }
                }
                connection.iterate(tick);
                stream.dispatch();
                step += 1;
            }
            let tail = stream.latency().map(|l| Duration::from_micros(l.usec)).unwrap_or_default();
            connection.iterate(tail);
            stream.dispatch();

            println!("  Buffer:    {}", stream.buffer_attr());
            println!();
            println!("Submitted:  {} bytes", feeder.submitted());
            println!("Written:    {} bytes in {} requests", device.written_bytes(), device.write_sizes().len());
            println!("Played:     {} bytes", device.played_bytes());
            println!("Underflows: {}", stream.underflow_count());
        }
    }

    stream.disconnect();
    stream.dispatch();
    println!("Virtual time: {:.3}s", connection.clock().as_secs_f64());
    println!("Final state: {}", stream.state());
    Ok(())
}
