//! # Faultline Diagnostic
//!
//! Offline inspector for raw stack dumps. Parses one dump, runs panic
//! detection with the configured markers and prints a report.
//!
//! # Usage
//!
//! ```bash
//! # Inspect a dump file with the built-in Rust markers
//! faultline_diagnostic crash.txt
//!
//! # Markers of another runtime, JSON report
//! faultline_diagnostic --config faultline.toml --json crash.txt
//!
//! # Read from stdin, dropping two capture frames
//! faultline_diagnostic --skip 2 - < crash.txt
//! ```

#![deny(warnings)]

use clap::Parser;
use faultline::config::{ConfigError, ConfigLoader, FaultlineConfig};
use faultline::detect::{PanicDetector, PanicSite};
use faultline::stack::{CaptureError, StackModel};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

/// Faultline Diagnostic - inspect a raw stack dump
#[derive(Parser, Debug)]
#[command(name = "faultline_diagnostic")]
#[command(version)]
#[command(about = "Parse a raw stack dump and locate the panic site")]
#[command(long_about = None)]
struct Args {
    /// Dump file to inspect, or `-` for stdin
    #[arg(value_name = "DUMP")]
    dump: PathBuf,

    /// Configuration file with log level and panic markers
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Innermost frames to discard
    #[arg(long, default_value_t = 0)]
    skip: usize,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    log_json: bool,
}

/// Errors reported by the inspector.
#[derive(Debug, Error)]
enum CliError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("malformed stack dump: {0}")]
    Capture(#[from] CaptureError),

    #[error("cannot encode report: {0}")]
    Json(#[from] serde_json::Error),
}

/// What the inspector found in one dump.
#[derive(Debug, Serialize)]
struct Report<'a> {
    stack: &'a StackModel,
    panic: Option<PanicSite>,
    location: String,
}

impl<'a> Report<'a> {
    fn new(stack: &'a StackModel, detector: &PanicDetector) -> Self {
        let panic = detector.indices(stack);
        let frame = match panic {
            Some(site) => &stack.frames()[site.panic_index],
            None => stack.origin(),
        };
        Self {
            stack,
            panic,
            location: frame.location(),
        }
    }

    fn to_text(&self) -> String {
        let stack = self.stack;
        let mut out = String::new();
        let role = if stack.is_main() { "main" } else { "worker" };
        let _ = writeln!(
            out,
            "thread {} [{}] ({role})",
            stack.thread_id(),
            stack.status()
        );
        if let Some(creator) = stack.creator() {
            let _ = writeln!(out, "created by {creator}");
        }
        match self.panic {
            Some(site) => {
                let frame = &stack.frames()[site.panic_index];
                let _ = writeln!(out, "panic site: {frame}");
            }
            None => {
                let _ = writeln!(out, "no panic markers found; origin {}", self.location);
            }
        }
        let _ = writeln!(out, "frames:");
        for (i, frame) in stack.frames().iter().enumerate() {
            let mark = match self.panic {
                Some(site) if site.panic_index == i => "  <- panic",
                Some(site) if site.recovery_index == i => "  <- recovery",
                _ => "",
            };
            let _ = writeln!(out, "  #{i:<3} {frame}{mark}");
        }
        out
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("faultline_diagnostic: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => FaultlineConfig::load(path)?,
        None => FaultlineConfig::default(),
    };
    config.validate()?;

    setup_tracing(&args, &config);
    info!("Faultline Diagnostic v{} starting...", env!("CARGO_PKG_VERSION"));

    let text = read_dump(&args.dump)?;
    debug!(bytes = text.len(), skip = args.skip, "parsing dump");
    let stack = StackModel::parse(&text, args.skip)?;

    let detector = PanicDetector::new(config.markers);
    let report = Report::new(&stack, &detector);
    info!(
        frames = stack.frames().len(),
        panic = report.panic.is_some(),
        "dump inspected"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.to_text());
    }
    Ok(())
}

fn read_dump(path: &Path) -> Result<String, CliError> {
    let read_error = |source| CliError::Read {
        path: path.display().to_string(),
        source,
    };
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).map_err(read_error)?;
        Ok(text)
    } else {
        std::fs::read_to_string(path).map_err(read_error)
    }
}

/// Setup tracing subscriber from the configured level and CLI flags.
fn setup_tracing(args: &Args, config: &FaultlineConfig) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        config.log_level.as_str().parse().unwrap_or(Level::INFO)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
}
