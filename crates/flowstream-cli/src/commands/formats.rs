//! Listing of the names profiles and flags accept.

#![allow(clippy::print_literal)] // Table headers use literal strings intentionally

use clap::Args;
use flowstream::{Direction, SampleFormat, StreamFlags, StreamState};

#[derive(Args)]
pub struct FormatsArgs {
    /// Also list stream flags and their bits
    #[arg(long)]
    flags: bool,
}

pub fn run(args: FormatsArgs) -> anyhow::Result<()> {
    println!("Sample Formats");
    println!("==============");
    println!();
    println!("  {:10}  {}", "Name", "Bytes/sample");
    println!("  {:10}  {}", "----", "------------");
    for format in SampleFormat::ALL {
        println!("  {:10}  {}", format.name(), format.sample_size());
    }
    println!();

    let directions: Vec<&str> = Direction::CONNECTABLE.iter().map(|d| d.name()).collect();
    println!("Directions: {}", directions.join(", "));
    let states: Vec<&str> = StreamState::ALL.iter().map(|s| s.name()).collect();
    println!("States:     {}", states.join(" -> "));
    println!();

    if args.flags {
        println!("Stream Flags");
        println!("============");
        println!();
        println!("  {:28}  {}", "Name", "Bit");
        println!("  {:28}  {}", "----", "---");
        for (name, flag) in StreamFlags::NAMED {
            println!("  {:28}  {:#07x}", name, flag.bits());
        }
        println!();
    }

    Ok(())
}
