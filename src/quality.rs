//! The quality report accumulates readings into per-field statistics.
//!
//! Readings are binned by the 100m x 100m [`UtmField`] they were taken in.
//! Each field keeps one [`LacReport`] per location area and one
//! [`Measurement`] per scan, so both "how good is LAC x here" and "how good
//! is the best server here" can be answered.
//!
//! The report only grows: fields, LAC reports and measurements are created
//! on first use and are never removed.

use crate::measurement::Measurement;
use crate::reading::{MeasurementId, Reading};
use crate::signal::{average_rssi, cmp_rssi, rssi_to_gan, NO_GAN, NO_SIGNAL};
use crate::utm::{Area, UtmField};

use log::debug;
use std::collections::HashMap;

/// All fields visited during a survey, keyed by [`UtmField::field_id`].
#[derive(Debug, Clone, Default)]
pub struct QualityReport {
    fields_by_utm: HashMap<String, FieldReport>,
}

impl QualityReport {
    /// Instantiates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts a single reading in the field it was taken in.
    pub fn add(&mut self, reading: Reading) {
        let field = reading.utm_field();
        self.fields_by_utm
            .entry(field.field_id())
            .or_insert_with(|| {
                debug!("new field {}", field);
                FieldReport::new(field)
            })
            .add(reading);
    }

    /// Accounts every reading of the given measurement.
    pub fn add_measurement(&mut self, measurement: &Measurement) {
        for reading in measurement.readings() {
            self.add(*reading);
        }
    }

    /// All field reports, ordered by field id.
    pub fn field_reports(&self) -> Vec<&FieldReport> {
        let mut result: Vec<&FieldReport> = self.fields_by_utm.values().collect();
        result.sort_by(|a, b| a.field.cmp(&b.field));
        result
    }

    /// The report of one field, if anything was measured there.
    pub fn field_report_by_utm(&self, field: &UtmField) -> Option<&FieldReport> {
        self.fields_by_utm.get(&field.field_id())
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.fields_by_utm.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.fields_by_utm.is_empty()
    }
}

/// Statistics of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldReport {
    field: UtmField,
    lacs: HashMap<u32, LacReport>,
    measurements: HashMap<MeasurementId, Measurement>,
}

impl FieldReport {
    /// Instantiates an empty report for the given field.
    pub fn new(field: UtmField) -> Self {
        Self {
            field,
            lacs: HashMap::new(),
            measurements: HashMap::new(),
        }
    }

    #[allow(missing_docs)]
    pub fn field(&self) -> &UtmField {
        &self.field
    }

    /// Bounding box of the field.
    pub fn area(&self) -> Area {
        self.field.area()
    }

    /// Accounts a reading in its LAC report and in its measurement.
    pub fn add(&mut self, reading: Reading) {
        self.lacs
            .entry(reading.lac)
            .or_insert_with(|| LacReport::new(reading.lac))
            .add(reading.rssi);

        let measurement = self
            .measurements
            .entry(reading.measurement_id())
            .or_default();
        // the entry is keyed by this reading's id, so it always fits
        if let Err(err) = measurement.add(reading) {
            debug!("{}", err);
        }
    }

    /// The LAC report of one location area.
    pub fn lac_report(&self, lac: u32) -> Option<&LacReport> {
        self.lacs.get(&lac)
    }

    /// All LAC reports, ordered by LAC.
    pub fn lac_reports(&self) -> Vec<&LacReport> {
        let mut result: Vec<&LacReport> = self.lacs.values().collect();
        result.sort_by_key(|report| report.lac);
        result
    }

    /// All LAC reports, strongest average RSSI first, ties ordered by LAC.
    pub fn lac_reports_by_rssi(&self) -> Vec<&LacReport> {
        let mut result: Vec<&LacReport> = self.lacs.values().collect();
        result.sort_by(|a, b| {
            cmp_rssi(b.average_rssi(), a.average_rssi()).then_with(|| a.lac.cmp(&b.lac))
        });
        result
    }

    /// The measurements taken in this field, in no particular order.
    pub fn measurements(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.values()
    }

    #[allow(missing_docs)]
    pub fn measurement_count(&self) -> usize {
        self.measurements.len()
    }

    /// Mean of the best server RSSI of all measurements, [`NO_SIGNAL`] if
    /// no measurement had a signal.
    pub fn average_rssi(&self) -> i32 {
        average_rssi(self.measurements.values().map(Measurement::best_rssi))
    }

    /// Mean GAN of the best servers of all measurements with a signal,
    /// [`NO_GAN`] if there are none.
    pub fn average_gan(&self) -> i32 {
        let gans: Vec<i32> = self
            .measurements
            .values()
            .map(Measurement::best_rssi)
            .filter(|&rssi| rssi != NO_SIGNAL)
            .map(rssi_to_gan)
            .collect();
        if gans.is_empty() {
            NO_GAN
        } else {
            gans.iter().sum::<i32>() / gans.len() as i32
        }
    }

    /// Mean signal level difference of all measurements that saw at least
    /// two base stations with a signal, 0 if there are none.
    pub fn average_signal_level_difference(&self) -> i32 {
        let differences: Vec<i32> = self
            .measurements
            .values()
            .filter(|m| m.second_best_server().rssi != NO_SIGNAL && m.len() >= 2)
            .map(Measurement::signal_level_difference)
            .collect();
        if differences.is_empty() {
            0
        } else {
            differences.iter().sum::<i32>() / differences.len() as i32
        }
    }
}

/// RSSI statistics of one location area within one field. The history is
/// append-only; [`NO_SIGNAL`] values are never recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LacReport {
    /// Location area code
    pub lac: u32,
    /// Weakest recorded RSSI, [`NO_SIGNAL`] while empty
    pub min_rssi: i32,
    /// Strongest recorded RSSI, [`NO_SIGNAL`] while empty
    pub max_rssi: i32,
    rssi: Vec<i32>,
}

impl LacReport {
    /// Instantiates an empty report.
    pub fn new(lac: u32) -> Self {
        Self {
            lac,
            min_rssi: NO_SIGNAL,
            max_rssi: NO_SIGNAL,
            rssi: Vec::new(),
        }
    }

    /// Records one RSSI value, the sentinel is ignored.
    pub fn add(&mut self, rssi: i32) {
        if rssi == NO_SIGNAL {
            return;
        }
        if self.rssi.is_empty() {
            self.min_rssi = rssi;
            self.max_rssi = rssi;
        } else {
            self.min_rssi = self.min_rssi.min(rssi);
            self.max_rssi = self.max_rssi.max(rssi);
        }
        self.rssi.push(rssi);
    }

    /// Mean of all recorded values, [`NO_SIGNAL`] while empty.
    pub fn average_rssi(&self) -> i32 {
        average_rssi(self.rssi.iter().copied())
    }

    /// GAN of [`LacReport::average_rssi`].
    pub fn average_gan(&self) -> i32 {
        rssi_to_gan(self.average_rssi())
    }

    /// The last recorded value, [`NO_SIGNAL`] while empty.
    pub fn current_rssi(&self) -> i32 {
        self.rssi.last().copied().unwrap_or(NO_SIGNAL)
    }

    /// GAN of [`LacReport::current_rssi`].
    pub fn current_gan(&self) -> i32 {
        rssi_to_gan(self.current_rssi())
    }

    /// All recorded values, oldest first.
    pub fn history(&self) -> &[i32] {
        &self.rssi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn reading(seconds: u32, lac: u32, rssi: i32) -> Reading {
        Reading {
            latitude: 52.349885,
            longitude: 13.377718,
            satellites: 7,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, seconds).unwrap(),
            lac,
            carrier: 0xcaffe,
            rssi,
            cx: 0,
        }
    }

    #[test]
    fn lac_report_ignores_the_sentinel() {
        let mut report = LacReport::new(100);
        for rssi in [-90, -85, NO_SIGNAL] {
            report.add(rssi);
        }
        assert_eq!(report.min_rssi, -90);
        assert_eq!(report.max_rssi, -85);
        assert_eq!(report.average_rssi(), (-90 - 85) / 2);
        assert_eq!(report.current_rssi(), -85);
        assert_eq!(report.history(), &[-90, -85]);
    }

    #[test]
    fn lac_report_with_only_sentinels_has_no_signal() {
        let mut report = LacReport::new(100);
        report.add(NO_SIGNAL);
        report.add(NO_SIGNAL);
        assert_eq!(report.average_rssi(), NO_SIGNAL);
        assert_eq!(report.average_gan(), NO_GAN);
        assert_eq!(report.current_rssi(), NO_SIGNAL);
    }

    #[test]
    fn readings_are_binned_into_fields() {
        let mut report = QualityReport::new();
        report.add(reading(0, 100, -80));
        report.add(reading(0, 101, -70));
        report.add(Reading {
            latitude: 48.0,
            ..reading(0, 100, -80)
        });

        assert_eq!(report.len(), 2);
        let here = reading(0, 100, -80).utm_field();
        let field = report.field_report_by_utm(&here).unwrap();
        assert_eq!(field.measurement_count(), 1);
        assert_eq!(field.lac_reports().len(), 2);
    }

    #[test]
    fn field_averages_use_the_best_server() {
        let mut report = QualityReport::new();
        report.add(reading(0, 100, -80));
        report.add(reading(0, 101, -70));
        report.add(reading(10, 100, -90));
        report.add(reading(10, 101, -96));
        report.add(reading(20, 100, NO_SIGNAL));

        let field = report
            .field_report_by_utm(&reading(0, 100, -80).utm_field())
            .unwrap();
        assert_eq!(field.measurement_count(), 3);
        assert_eq!(field.average_rssi(), (-70 - 90) / 2);
        assert_eq!(field.average_gan(), (rssi_to_gan(-70) + rssi_to_gan(-90)) / 2);
        assert_eq!(field.average_signal_level_difference(), (10 + 6) / 2);
    }

    #[test]
    fn lac_listings() {
        let mut report = QualityReport::new();
        report.add(reading(0, 300, -80));
        report.add(reading(0, 100, -70));
        report.add(reading(0, 200, -80));
        report.add(reading(0, 400, NO_SIGNAL));

        let field = &report.field_reports()[0];
        let by_lac: Vec<u32> = field.lac_reports().iter().map(|r| r.lac).collect();
        assert_eq!(by_lac, vec![100, 200, 300, 400]);
        let by_rssi: Vec<u32> = field.lac_reports_by_rssi().iter().map(|r| r.lac).collect();
        assert_eq!(by_rssi, vec![100, 200, 300, 400]);
    }

    #[test]
    fn empty_field_has_no_signal() {
        let field = FieldReport::new(UtmField::from_lat_lon(52.0, 13.0));
        assert_eq!(field.average_rssi(), NO_SIGNAL);
        assert_eq!(field.average_gan(), NO_GAN);
        assert_eq!(field.average_signal_level_difference(), 0);
    }
}
