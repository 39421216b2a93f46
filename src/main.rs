//! Writeahead - stall soak tool
//!
//! Runs a stalling frame-counter processor behind the write-ahead buffer
//! and reports whether the simulated host heard any glitch.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use writeahead::soak::cli::{self, Command};
use writeahead::soak::{run_soak, SoakReport};
use writeahead::BufferConfig;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("writeahead=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match cli::parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            cli::print_help();
            std::process::exit(2);
        }
    };

    let (mut options, config_path, json) = match command {
        Command::Version => {
            println!("writeahead {} (built {})", writeahead::VERSION, writeahead::BUILD_DATE);
            return Ok(());
        }
        Command::Help => {
            cli::print_help();
            return Ok(());
        }
        Command::Run {
            options,
            config_path,
            json,
        } => (options, config_path, json),
    };

    if let Some(path) = config_path {
        options.buffer = BufferConfig::load(&path);
    }

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .ok();

    if !json {
        println!(
            "Soaking {} ch @ {} Hz, block {}, {}ms stall every {} chunks, for {}s. Ctrl+C to stop.",
            options.channels,
            options.sample_rate,
            options.block_size,
            options.stall_ms,
            options.stall_every,
            options.seconds
        );
    }

    let report = match run_soak(options, running) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Soak failed");
            return Err(e);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_healthy() {
        info!("Glitches detected");
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &SoakReport) {
    let c = &report.continuity;
    println!();
    println!("Blocks played:    {}", report.blocks);
    println!("Stalls simulated: {}", report.stalls);
    println!(
        "Latency:          {} samples ({:.2} ms)",
        report.stats.latency_samples,
        report.stats.latency_samples as f64 * 1000.0 / f64::from(report.options.sample_rate)
    );
    println!("────────────────────────────────────────");
    for (ch, stats) in report.stats.channels.iter().enumerate() {
        println!(
            "  ch{}: fill {:>5.1}% | underruns {:>4} | overruns {:>4} | adjustments {:>4}",
            ch, stats.fill_percentage, stats.underruns, stats.overruns, stats.adjustments
        );
    }
    println!("────────────────────────────────────────");
    println!(
        "Counter: {} checked | {} breaks | {} lost | {} repeated | {} silent runs",
        c.samples_checked, c.discontinuities, c.lost_samples, c.repeated_samples, c.silent_runs
    );
    println!(
        "Events:  {} queued | {} delivered | {} dropped",
        report.stats.events.queued,
        report.stats.events.delivered,
        report.stats.events_dropped()
    );
    if report.monitor_overflow > 0 {
        println!("Monitor overflow: {} samples not checked", report.monitor_overflow);
    }
    println!();
    println!("Status: {}", if report.is_healthy() { "OK" } else { "GLITCH" });
}
