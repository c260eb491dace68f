//! A [`Measurement`] collects all readings of one scan, i.e. every base
//! station that was visible from one place at one instant.

use crate::reading::{rank_by_signal, MeasurementId, Reading};
use crate::signal::NO_SIGNAL;

use std::fmt;

/// Returned when a reading is added to a measurement it does not belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasurementError {
    /// The reading was taken at another place or time.
    ForeignReading {
        #[allow(missing_docs)]
        expected: MeasurementId,
        #[allow(missing_docs)]
        actual: MeasurementId,
    },
}

impl fmt::Display for MeasurementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementError::ForeignReading { expected, actual } => write!(
                f,
                "reading {} does not belong to measurement {}",
                actual, expected
            ),
        }
    }
}

impl std::error::Error for MeasurementError {}

/// The readings of one scan, strongest signal first.
///
/// The first reading fixes the id of the measurement, readings with another
/// id are rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    id: Option<MeasurementId>,
    readings: Vec<Reading>,
}

impl Measurement {
    /// An empty measurement; its id is taken from the first reading.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a measurement from the readings of one scan.
    pub fn from_readings<I>(readings: I) -> Result<Self, MeasurementError>
    where
        I: IntoIterator<Item = Reading>,
    {
        let mut result = Self::new();
        for reading in readings {
            result.add(reading)?;
        }
        Ok(result)
    }

    /// Adds a reading, keeping the readings sorted by signal strength.
    pub fn add(&mut self, reading: Reading) -> Result<(), MeasurementError> {
        let reading_id = reading.measurement_id();
        match &self.id {
            Some(id) if *id != reading_id => {
                return Err(MeasurementError::ForeignReading {
                    expected: id.clone(),
                    actual: reading_id,
                });
            }
            Some(_) => {}
            None => self.id = Some(reading_id),
        }

        // insert after all readings that rank before or equal, keeps the sort stable
        let index = self
            .readings
            .partition_point(|r| rank_by_signal(r, &reading).is_le());
        self.readings.insert(index, reading);
        Ok(())
    }

    /// Id shared by all readings, `None` while empty.
    pub fn id(&self) -> Option<&MeasurementId> {
        self.id.as_ref()
    }

    /// All readings, strongest signal first.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// The reading with the strongest signal, or the zero reading.
    pub fn best_server(&self) -> Reading {
        self.readings.first().copied().unwrap_or_default()
    }

    /// The reading with the second strongest signal, or the zero reading.
    pub fn second_best_server(&self) -> Reading {
        self.readings.get(1).copied().unwrap_or_default()
    }

    /// RSSI of the best server, [`NO_SIGNAL`] if no reading has a signal.
    pub fn best_rssi(&self) -> i32 {
        self.readings.first().map_or(NO_SIGNAL, |r| r.rssi)
    }

    /// Gap between the best and the second best server, 0 if there are
    /// fewer than two readings with a signal.
    pub fn signal_level_difference(&self) -> i32 {
        match self.readings.as_slice() {
            [best, second, ..] if best.rssi != NO_SIGNAL && second.rssi != NO_SIGNAL => {
                best.rssi - second.rssi
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn reading(seconds: u32, carrier: u32, rssi: i32) -> Reading {
        Reading {
            latitude: 52.35,
            longitude: 13.37,
            satellites: 7,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, seconds).unwrap(),
            lac: 100,
            carrier,
            rssi,
            cx: 0,
        }
    }

    #[test]
    fn readings_are_sorted_best_first() {
        let measurement = Measurement::from_readings([
            reading(0, 1, NO_SIGNAL),
            reading(0, 2, -95),
            reading(0, 3, -61),
            reading(0, 4, -80),
        ])
        .unwrap();

        let carriers: Vec<u32> = measurement.readings().iter().map(|r| r.carrier).collect();
        assert_eq!(carriers, vec![3, 4, 2, 1]);
        assert_eq!(measurement.best_server().carrier, 3);
        assert_eq!(measurement.second_best_server().carrier, 4);
        assert_eq!(measurement.best_rssi(), -61);
        assert_eq!(measurement.signal_level_difference(), 19);
    }

    #[test]
    fn sorting_is_idempotent() {
        let measurement = Measurement::from_readings([
            reading(0, 1, -80),
            reading(0, 2, NO_SIGNAL),
            reading(0, 3, -80),
            reading(0, 4, -70),
        ])
        .unwrap();

        let mut resorted = measurement.readings().to_vec();
        resorted.sort_by(rank_by_signal);
        assert_eq!(resorted, measurement.readings());

        let rebuilt = Measurement::from_readings(measurement.readings().iter().copied()).unwrap();
        assert_eq!(rebuilt, measurement);
        assert_eq!(rebuilt.readings().last().unwrap().rssi, NO_SIGNAL);
    }

    #[test]
    fn foreign_readings_are_rejected() {
        let mut measurement = Measurement::new();
        measurement.add(reading(0, 1, -80)).unwrap();
        measurement.add(reading(0, 2, -70)).unwrap();

        let result = measurement.add(reading(10, 3, -60));
        assert!(matches!(
            result,
            Err(MeasurementError::ForeignReading { .. })
        ));
        assert_eq!(measurement.len(), 2);
    }

    #[test]
    fn empty_and_single_measurements() {
        let empty = Measurement::new();
        assert!(empty.best_server().is_zero());
        assert_eq!(empty.best_rssi(), NO_SIGNAL);
        assert_eq!(empty.signal_level_difference(), 0);
        assert!(empty.id().is_none());

        let single = Measurement::from_readings([reading(0, 1, -80)]).unwrap();
        assert_eq!(single.signal_level_difference(), 0);
        assert!(single.second_best_server().is_zero());

        let with_sentinel =
            Measurement::from_readings([reading(0, 1, -80), reading(0, 2, NO_SIGNAL)]).unwrap();
        assert_eq!(with_sentinel.signal_level_difference(), 0);
    }
}
