//! Trace files: every reading the pipeline sees, one line each, so a survey
//! can be evaluated again later.
//!
//! CSV lines look like
//!
//! ```text
//! 2024-05-01T12:00:00Z,52.349885,13.377718,7,100,caffe,-61,5
//! ```
//!
//! The JSON format writes one object per line with the same fields.

use crate::config::{TraceConfig, TraceFormat};
use crate::reading::Reading;

use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use std::{
    fmt,
    fs::File,
    io::{self, BufWriter, Write},
    num::ParseIntError,
    path::{Path, PathBuf},
};

/// Failures while writing a trace.
#[derive(Debug)]
pub enum TraceError {
    #[allow(missing_docs)]
    Io(io::Error),
    #[allow(missing_docs)]
    Json(serde_json::Error),
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Io(err) => write!(f, "cannot write trace: {}", err),
            TraceError::Json(err) => write!(f, "cannot encode reading: {}", err),
        }
    }
}

impl std::error::Error for TraceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TraceError::Io(err) => Some(err),
            TraceError::Json(err) => Some(err),
        }
    }
}

impl From<io::Error> for TraceError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for TraceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Destination of an active trace.
pub trait TraceSink: Send {
    /// Appends one reading.
    fn write_reading(&mut self, reading: &Reading) -> Result<(), TraceError>;

    /// Flushes and releases the sink. Errors are reported here rather than
    /// being lost on drop.
    fn close(self: Box<Self>) -> Result<(), TraceError>;

    /// Where the trace goes.
    fn path(&self) -> &Path;
}

/// A trace written to a file.
pub struct TraceFile {
    path: PathBuf,
    format: TraceFormat,
    only_valid: bool,
    writer: BufWriter<File>,
}

impl TraceFile {
    /// Creates `trace-<timestamp>.<ext>` in the configured directory.
    pub fn create(config: &TraceConfig) -> Result<Self, TraceError> {
        let path = config
            .output_dir
            .join(trace_file_name(Utc::now(), config.format));
        let mut trace = Self::create_at(path, config.format)?;
        trace.only_valid = config.only_valid;
        Ok(trace)
    }

    /// Creates a trace file at an explicit path, truncating existing files.
    pub fn create_at(path: impl Into<PathBuf>, format: TraceFormat) -> Result<Self, TraceError> {
        let path = path.into();
        let writer = BufWriter::new(File::create(&path)?);
        info!("tracing to {}", path.display());
        Ok(Self {
            path,
            format,
            only_valid: false,
            writer,
        })
    }
}

impl TraceSink for TraceFile {
    fn write_reading(&mut self, reading: &Reading) -> Result<(), TraceError> {
        if self.only_valid && !reading.is_valid() {
            return Ok(());
        }
        let line = match self.format {
            TraceFormat::Csv => encode_csv(reading),
            TraceFormat::Json => encode_json(reading)?,
        };
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), TraceError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        info!("trace {} closed", self.path.display());
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// `trace-20240501T120000.csv`
pub fn trace_file_name(now: DateTime<Utc>, format: TraceFormat) -> String {
    format!(
        "trace-{}.{}",
        now.format("%Y%m%dT%H%M%S"),
        format.extension()
    )
}

/// One CSV trace line, without the line break.
pub fn encode_csv(reading: &Reading) -> String {
    format!(
        "{},{:.6},{:.6},{},{},{:x},{},{}",
        reading.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        reading.latitude,
        reading.longitude,
        reading.satellites,
        reading.lac,
        reading.carrier,
        reading.rssi,
        reading.cx
    )
}

/// One JSON trace line, without the line break.
pub fn encode_json(reading: &Reading) -> Result<String, serde_json::Error> {
    serde_json::to_string(reading)
}

/// Parses a number the way traces print them: hex if it has a `0x` prefix
/// or contains any of `a-f`, decimal otherwise. `caffe` is `0xcaffe`, `1234`
/// is decimal.
pub fn parse_dec_or_hex(s: &str) -> Result<u32, ParseIntError> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16);
    }
    if s.chars().any(|c| matches!(c, 'a'..='f' | 'A'..='F')) {
        u32::from_str_radix(s, 16)
    } else {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn reading() -> Reading {
        Reading {
            latitude: 52.349885,
            longitude: 13.377718,
            satellites: 7,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            lac: 100,
            carrier: 0xcaffe,
            rssi: -61,
            cx: 5,
        }
    }

    #[test]
    fn csv_line() {
        assert_eq!(
            encode_csv(&reading()),
            "2024-05-01T12:00:00Z,52.349885,13.377718,7,100,caffe,-61,5"
        );
    }

    #[test]
    fn json_line() {
        let value: serde_json::Value = serde_json::from_str(&encode_json(&reading()).unwrap()).unwrap();
        assert_eq!(value["lat"], 52.349885);
        assert_eq!(value["sats"], 7);
        assert_eq!(value["carrier"], 0xcaffe);
        assert_eq!(value["rssi"], -61);
        assert_eq!(value["ts"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn file_name() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 3, 9).unwrap();
        assert_eq!(trace_file_name(now, TraceFormat::Csv), "trace-20240501T080309.csv");
        assert_eq!(trace_file_name(now, TraceFormat::Json), "trace-20240501T080309.json");
    }

    #[test]
    fn trace_file_writes_lines() {
        let dir = tempdir().unwrap();
        let config = TraceConfig {
            format: TraceFormat::Csv,
            output_dir: dir.path().to_path_buf(),
            only_valid: false,
        };
        let mut trace = Box::new(TraceFile::create(&config).unwrap());
        let path = trace.path().to_path_buf();
        assert!(path.starts_with(dir.path()));
        assert!(path.to_string_lossy().ends_with(".csv"));

        trace.write_reading(&reading()).unwrap();
        trace
            .write_reading(&Reading {
                rssi: 99,
                ..reading()
            })
            .unwrap();
        trace.close().unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with(",99,5"));
    }

    #[test]
    fn only_valid_readings() {
        let dir = tempdir().unwrap();
        let config = TraceConfig {
            format: TraceFormat::Json,
            output_dir: dir.path().to_path_buf(),
            only_valid: true,
        };
        let mut trace = Box::new(TraceFile::create(&config).unwrap());
        let path = trace.path().to_path_buf();
        trace.write_reading(&reading()).unwrap();
        trace
            .write_reading(&Reading {
                satellites: 0,
                ..reading()
            })
            .unwrap();
        trace.close().unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn missing_directory_fails() {
        let dir = tempdir().unwrap();
        let result = TraceFile::create_at(dir.path().join("missing").join("t.csv"), TraceFormat::Csv);
        assert!(matches!(result, Err(TraceError::Io(_))));
    }

    #[test]
    fn dec_or_hex() {
        assert_eq!(parse_dec_or_hex("42"), Ok(42));
        assert_eq!(parse_dec_or_hex("0x2a"), Ok(42));
        assert_eq!(parse_dec_or_hex(" 0XCAFFE "), Ok(0xcaffe));
        assert_eq!(parse_dec_or_hex("caffe"), Ok(0xcaffe));
        assert_eq!(parse_dec_or_hex("CAFFE"), Ok(0xcaffe));
        assert_eq!(parse_dec_or_hex("1234"), Ok(1234));
        assert!(parse_dec_or_hex("cafe!").is_err());
        assert!(parse_dec_or_hex("").is_err());
    }
}
