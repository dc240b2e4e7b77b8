//! CLI entry point for digit2raw.
//!
//! Converts a simulated digit container into raw data-link files:
//!
//! ```bash
//! digit2raw -i digits.raw -o ./raw/ --rdh-version 6 --no-empty-hbf
//! ```
//!
//! Exit codes: 0 on success, 1 for invalid arguments or a fatal run error,
//! 2 when the arguments parse but the resulting configuration is rejected.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use digit2raw::config::{FileGrouping, RawConfig, RdhVersion, ReadoutMode};
use digit2raw::error::RawError;

#[derive(Parser)]
#[command(name = "digit2raw")]
#[command(version = digit2raw::VERSION)]
#[command(about = "Convert detector sim output to CRU raw data", long_about = None)]
struct Cli {
    /// Input digit container file
    #[arg(short, long, default_value = "digits.raw")]
    input_file: PathBuf,

    /// Output directory for raw data (created if absent)
    #[arg(short, long, default_value = "./")]
    output_dir: PathBuf,

    /// Verbosity level (0 = info, 1 = debug, 2+ = trace)
    #[arg(short, long, default_value_t = 0)]
    verbosity: u8,

    /// Create one output file per half-CRU (15 links each) instead of one merged file
    #[arg(short = 'l', long)]
    file_per_halfcru: bool,

    /// RDH version to use (4 or 6)
    #[arg(short, long, default_value_t = 4)]
    rdh_version: u32,

    /// Do not create empty HBF pages (except the anchor HBF of each super-period)
    #[arg(short = 'e', long)]
    no_empty_hbf: bool,

    /// Use continuous (heartbeat-clocked) readout instead of triggered
    #[arg(long)]
    continuous: bool,

    /// Maximum encoded frame size in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    super_page_size: usize,
}

fn build_config(cli: &Cli) -> Result<RawConfig, RawError> {
    let config = RawConfig {
        rdh_version: RdhVersion::from_cli(cli.rdh_version)?,
        readout: if cli.continuous {
            ReadoutMode::Continuous
        } else {
            ReadoutMode::Triggered
        },
        super_page_size: cli.super_page_size,
        skip_empty_hbf: cli.no_empty_hbf,
        file_grouping: if cli.file_per_halfcru {
            FileGrouping::PerHalfCru
        } else {
            FileGrouping::Merged
        },
        orbits_per_superperiod: 128,
        verbosity: cli.verbosity,
    };
    config.validate()?;
    Ok(config)
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap renders its own message (including --help/--version).
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    init_logging(cli.verbosity);

    let config = match build_config(&cli) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            log::error!("{}", e);
            process::exit(2);
        }
    };

    let start = Instant::now();
    match digit2raw::pipeline::run(config, &cli.input_file, &cli.output_dir) {
        Ok(summary) => {
            log::info!(
                "done in {:.2?}: {} digits, {} frames, {} dropped",
                start.elapsed(),
                summary.digits_read,
                summary.frames_written,
                summary.digits_dropped
            );
        }
        Err(e) => {
            log::error!("conversion failed: {}", e);
            process::exit(1);
        }
    }
}
