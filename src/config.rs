//! Runtime settings of the pipeline, resolved from the command line.

use std::{fmt, path::PathBuf, time::Duration};

/// Default time between two scans.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);
/// Default time one scan may take.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing of the scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Time between the start of two scans
    pub scan_interval: Duration,
    /// Time one scan may take, never longer than the interval
    pub scan_timeout: Duration,
}

impl ScanConfig {
    /// Builds a config, clamping the timeout to the interval.
    pub fn new(scan_interval: Duration, scan_timeout: Duration) -> Self {
        Self {
            scan_interval,
            scan_timeout: scan_timeout.min(scan_interval),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_INTERVAL, DEFAULT_SCAN_TIMEOUT)
    }
}

/// Line format of trace files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TraceFormat {
    /// `ts,lat,lon,sats,lac,carrier,rssi,cx`
    #[default]
    Csv,
    /// One JSON object per line
    Json,
}

impl TraceFormat {
    /// File name extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            TraceFormat::Csv => "csv",
            TraceFormat::Json => "json",
        }
    }
}

impl fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Where and how trace files are written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceConfig {
    #[allow(missing_docs)]
    pub format: TraceFormat,
    /// Directory for new trace files
    pub output_dir: PathBuf,
    /// Skip readings without GPS fix or signal
    pub only_valid: bool,
}
