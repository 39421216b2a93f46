//! Command line parsing for the soak tool

use super::SoakOptions;
use std::path::PathBuf;
use thiserror::Error;

/// What the command line asked for
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run {
        options: SoakOptions,
        config_path: Option<PathBuf>,
        json: bool,
    },
    Version,
    Help,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    Unknown(String),
}

fn value<'a>(args: &'a [String], i: usize) -> Result<&'a str, ArgError> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| ArgError::MissingValue(args[i].clone()))
}

fn parse<T: std::str::FromStr>(args: &[String], i: usize) -> Result<T, ArgError> {
    let raw = value(args, i)?;
    raw.parse().map_err(|_| ArgError::InvalidValue {
        flag: args[i].clone(),
        value: raw.to_string(),
    })
}

/// Parse arguments, not including the program name
pub fn parse_args(args: &[String]) -> Result<Command, ArgError> {
    let mut options = SoakOptions::default();
    let mut config_path = None;
    let mut json = false;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => return Ok(Command::Version),
            "--help" | "-h" => return Ok(Command::Help),
            "--json" => json = true,
            "--sample-rate" | "-r" => {
                options.sample_rate = parse(args, i)?;
                i += 1;
            }
            "--channels" | "-c" => {
                options.channels = parse(args, i)?;
                i += 1;
            }
            "--block" | "-b" => {
                options.block_size = parse(args, i)?;
                i += 1;
            }
            "--seconds" | "-s" => {
                options.seconds = parse(args, i)?;
                i += 1;
            }
            "--stall-ms" => {
                options.stall_ms = parse(args, i)?;
                i += 1;
            }
            "--stall-every" => {
                options.stall_every = parse(args, i)?;
                i += 1;
            }
            "--config" => {
                config_path = Some(PathBuf::from(value(args, i)?));
                i += 1;
            }
            other => return Err(ArgError::Unknown(other.to_string())),
        }
        i += 1;
    }

    Ok(Command::Run {
        options,
        config_path,
        json,
    })
}

pub fn print_help() {
    println!("Usage: writeahead [OPTIONS]");
    println!();
    println!("Drives a stalling frame-counter processor through the write-ahead");
    println!("buffer at real-time block cadence and reports what the host heard.");
    println!();
    println!("Options:");
    println!("  -r, --sample-rate RATE  Sample rate in Hz (default: 48000)");
    println!("  -c, --channels N        Channel count (default: 2)");
    println!("  -b, --block N           Host block size in samples (default: 256)");
    println!("  -s, --seconds N         Run time in seconds (default: 5)");
    println!("      --stall-ms MS       Length of each simulated stall (default: 20)");
    println!("      --stall-every N     Stall on every Nth chunk, 0 = never (default: 50)");
    println!("      --config PATH       Buffer config JSON (default: built-in)");
    println!("      --json              Print the report as JSON");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Examples:");
    println!("  writeahead --stall-ms 40 --stall-every 20");
    println!("  writeahead -r 96000 -b 64 --seconds 30 --json");
}
