// Streaming capture example
//
// This example runs the simulated logic analyzer in real time, driving the
// acquisition from a timer loop the way a session host would.

use clap::Parser;
use logic_demo_rs::{
    AcquisitionOptions, CollectingSink, IdleDemoDevice, PatternMode, Trigger, TriggerState,
};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "stream_capture")]
#[command(version = "1.0")]
#[command(about = "Capture synthetic logic data from the demo device")]
#[command(long_about = "Open the demo logic analyzer, configure pattern, limits and an optional soft trigger, then tick the acquisition in real time and print what was captured.")]
struct Args {
    /// Number of logic channels on the device
    #[arg(short, long, default_value_t = 12)]
    channels: usize,

    /// Disable the given channels (repeatable)
    #[arg(short, long, help = "Channel index to disable, may be given more than once")]
    disable: Vec<usize>,

    /// Sample rate in Hz
    #[arg(short, long, default_value_t = 1_000_000)]
    samplerate: u64,

    /// Stop after this many samples
    #[arg(long, default_value_t = 10_000)]
    limit_samples: u64,

    /// Stop after this many milliseconds (overrides --limit-samples)
    #[arg(long)]
    limit_ms: Option<u64>,

    /// Pattern mode
    #[arg(short, long, default_value = "incremental", help = "sigrok, random, incremental, walking-one, walking-zero, all-low, all-high or squid")]
    pattern: String,

    /// Soft trigger, e.g. "D0=1,D3=r"
    #[arg(short, long)]
    trigger: Option<String>,

    /// Percentage of the sample limit captured before the trigger
    #[arg(long, default_value_t = 0)]
    capture_ratio: u64,

    /// Samples to skip after each trigger match
    #[arg(long, default_value_t = 0)]
    holdoff: u64,

    /// Rearm the trigger after each completed capture
    #[arg(short, long)]
    repeat: bool,

    /// Give up after this many milliseconds of wall-clock time
    #[arg(long, default_value_t = 5_000)]
    max_runtime_ms: u64,

    /// Print the first rows of the captured data
    #[arg(long)]
    show_data: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    println!("Demo Logic Analyzer Stream Capture");
    println!("==================================\n");

    let mut device = IdleDemoDevice::open(args.channels).with_options(AcquisitionOptions {
        samples_per_frame: 4096,
        ..AcquisitionOptions::default()
    });
    for &channel in &args.disable {
        device.set_channel_enabled(channel, false)?;
    }
    device.set_sample_rate(args.samplerate)?;
    device.set_limit_samples(args.limit_samples);
    if let Some(ms) = args.limit_ms {
        device.set_limit_time(Duration::from_millis(ms));
    }
    device.set_pattern_mode(args.pattern.parse::<PatternMode>()?);
    device.set_capture_ratio(args.capture_ratio)?;
    device.set_holdoff_samples(args.holdoff);
    device.set_repeat_trigger(args.repeat);
    if let Some(trigger) = &args.trigger {
        device.set_trigger(Some(trigger.parse::<Trigger>()?))?;
    }

    let ctx = device.context();
    println!("Model: {}", device.model());
    println!("Channels: {} ({} enabled)", ctx.logic_channel_count(), ctx.channels().iter().filter(|c| c.enabled).count());
    println!("Sample rate: {} Hz", ctx.sample_rate());
    println!("Pattern: {}", ctx.pattern_mode());
    match ctx.trigger() {
        Some(trigger) => println!("Trigger: {} (capture ratio {}%)", trigger, ctx.capture_ratio()),
        None => println!("Trigger: none"),
    }
    println!();

    let mut running = device
        .start_acquisition(CollectingSink::new())
        .map_err(|(_, _, e)| e)?;

    let start = Instant::now();
    let max_runtime = Duration::from_millis(args.max_runtime_ms);
    while !running.is_finished() && start.elapsed() < max_runtime {
        std::thread::sleep(running.tick_interval());
        let report = running.tick();
        log::debug!(
            "Tick: generated {} sent {} trigger {:?}",
            report.generated,
            report.sent,
            running.trigger_state()
        );
    }

    if running.trigger_state() == TriggerState::Armed {
        println!("Trigger never matched within {}ms", args.max_runtime_ms);
    }
    let cycles = running.run_state().cycles;
    let (_device, sink) = running.stop();
    let capture = sink.into_capture()?;

    println!("Captured {} samples in {} frames", capture.sample_count(), capture.frame_count);
    println!("Unit size: {} byte(s)", capture.header.unit_size);
    if args.repeat {
        println!("Completed trigger cycles: {}", cycles);
    }
    println!("Elapsed: {:.3}s", start.elapsed().as_secs_f64());

    if args.show_data {
        let df = capture.to_dataframe()?;
        println!("\n{}", df.head(Some(10)));
    }

    Ok(())
}
