//! The scan loop polls the radio once per scan interval and publishes the
//! result as [`RadioData`].
//!
//! The output holds a single value. If the consumer has not picked up the
//! previous value when the next scan is done, the new value is dropped and
//! reported to the logger; the loop never waits for its consumer.

use crate::config::ScanConfig;
use crate::measurement::Measurement;
use crate::pei::{Deadline, Pei};
use crate::reading::Position;
use crate::scanner::scan_signal_and_position;

use crossbeam::channel::{self, select, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use std::sync::Arc;

/// The outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadioData {
    /// Where the scan was taken
    pub position: Position,
    /// All readings of the scan
    pub measurement: Measurement,
}

/// Receives messages about recoverable problems of the scan loop.
pub type ScanLogger = Arc<dyn Fn(String) + Send + Sync>;

/// Periodically scans a radio and publishes the results.
pub struct ScanLoop {
    config: ScanConfig,
    output: Sender<RadioData>,
    logger: Option<ScanLogger>,
}

impl ScanLoop {
    /// Creates a scan loop and the receiving end of its single slot output.
    pub fn new(config: ScanConfig, logger: Option<ScanLogger>) -> (Self, Receiver<RadioData>) {
        let (output, data) = channel::bounded(1);
        (
            Self {
                config,
                output,
                logger,
            },
            data,
        )
    }

    /// Scans `pei` every scan interval until `stop` becomes ready or
    /// disconnected.
    pub fn run(&self, pei: &mut dyn Pei, stop: &Receiver<()>) {
        info!(
            "scan loop started, interval {:?}, timeout {:?}",
            self.config.scan_interval, self.config.scan_timeout
        );
        let ticker = channel::tick(self.config.scan_interval);
        loop {
            select! {
                recv(stop) -> _ => break,
                recv(ticker) -> _ => self.scan(pei),
            }
        }
        info!("scan loop closed");
    }

    /// Runs one scan, bounded by the scan timeout, and publishes the result.
    pub fn scan(&self, pei: &mut dyn Pei) {
        let deadline = Deadline::after(self.config.scan_timeout);
        let log = |msg: String| self.log(msg);
        let (position, readings) = scan_signal_and_position(pei, deadline, &log);

        let mut measurement = Measurement::new();
        for reading in readings {
            if let Err(err) = measurement.add(reading) {
                self.log(format!("dropping reading: {}", err));
            }
        }
        debug!(
            "scanned {} readings at {:.5} {:.5}",
            measurement.len(),
            position.latitude,
            position.longitude
        );

        self.publish(RadioData {
            position,
            measurement,
        });
    }

    /// Hands the data to the consumer without waiting.
    pub fn publish(&self, data: RadioData) {
        match self.output.try_send(data) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.log("cannot report scan data point, output channel not ready".to_owned())
            }
            Err(TrySendError::Disconnected(_)) => {
                self.log("cannot report scan data point, output channel closed".to_owned())
            }
        }
    }

    fn log(&self, msg: String) {
        warn!("{}", msg);
        if let Some(logger) = &self.logger {
            logger(msg);
        }
    }
}
