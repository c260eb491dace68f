// Commandline argument parser using clap for tetrasurvey

use crate::config::{ScanConfig, TraceConfig, TraceFormat, DEFAULT_SCAN_TIMEOUT};
use crate::trace::parse_dec_or_hex;

use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, time::Duration};

/// Device name that selects the built-in demo radio.
pub const DEMO_DEVICE: &str = "demo";

#[derive(Debug, Parser, Clone)]
#[clap(version, about = "Measure TETRA signal strength and quality")]
pub struct SurveyArgs {
    #[command(subcommand)]
    /// Which task to perform, interactive survey or headless tracing
    pub command: CommandTask,

    /// Serial device of the radio, or "demo". Pick interactively if omitted
    #[arg(short = 'd', long = "device", global = true)]
    pub device: Option<String>,

    /// Timeout for initializing and resetting the radio, in milliseconds
    #[arg(long = "command-timeout", default_value_t = 5000, global = true)]
    pub command_timeout: u64,

    /// Append the raw PEI communication to this file
    #[arg(long = "trace-pei", global = true, hide = true)]
    pub trace_pei: Option<PathBuf>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Show position, signal quality and field statistics in the terminal
    #[command(about)]
    Tui(ScanOptions),

    /// Write every reading to a trace file until <Enter> is pressed
    #[command(about)]
    Trace(ScanOptions),
}

#[derive(Debug, Args, Clone)]
pub struct ScanOptions {
    /// Time between two scans, in seconds
    #[arg(short = 'i', long = "scan-interval", default_value_t = 10)]
    pub scan_interval: u64,

    /// Time one scan may take, in milliseconds. Never longer than the interval
    #[arg(short = 't', long = "scan-timeout", default_value_t = DEFAULT_SCAN_TIMEOUT.as_millis() as u64)]
    pub scan_timeout: u64,

    /// Format of trace files
    #[arg(short = 'f', long = "format", value_enum, default_value_t = TraceFormat::Csv)]
    pub format: TraceFormat,

    /// Directory for trace files
    #[arg(short = 'o', long = "outdir", default_value = ".")]
    pub output_dir: PathBuf,

    /// Trace only readings with GPS fix and signal
    #[arg(long = "only-valid")]
    pub only_valid: bool,

    /// Only summarize this LAC at exit, decimal or hex (e.g. 0x3039 or caffe)
    #[arg(long = "lac", value_parser = parse_dec_or_hex)]
    pub lac: Option<u32>,
}

impl SurveyArgs {
    /// Options of the selected task.
    pub fn scan_options(&self) -> &ScanOptions {
        match &self.command {
            CommandTask::Tui(options) | CommandTask::Trace(options) => options,
        }
    }

    #[allow(missing_docs)]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout)
    }
}

impl From<&ScanOptions> for ScanConfig {
    fn from(options: &ScanOptions) -> Self {
        ScanConfig::new(
            Duration::from_secs(options.scan_interval),
            Duration::from_millis(options.scan_timeout),
        )
    }
}

impl From<&ScanOptions> for TraceConfig {
    fn from(options: &ScanOptions) -> Self {
        TraceConfig {
            format: options.format,
            output_dir: options.output_dir.clone(),
            only_valid: options.only_valid,
        }
    }
}
