//! The values produced by one scan: where we were ([`Position`]) and what
//! one base station looked like from there ([`Reading`]).

use crate::signal::{cmp_rssi, NO_SIGNAL};
use crate::utm::UtmField;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::{cmp::Ordering, fmt};

/// A GPS fix. The default value is "no fix yet", see [`Position::NONE`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    #[allow(missing_docs)]
    pub latitude: f64,
    #[allow(missing_docs)]
    pub longitude: f64,
    /// Number of satellites used for the fix, 0 if there is no fix
    pub satellites: u32,
    /// UTC time of the fix
    pub timestamp: DateTime<Utc>,
}

impl Position {
    /// The position before the first fix.
    pub const NONE: Position = Position {
        latitude: 0.0,
        longitude: 0.0,
        satellites: 0,
        timestamp: DateTime::<Utc>::UNIX_EPOCH,
    };

    /// The grid field that contains this position.
    pub fn utm_field(&self) -> UtmField {
        UtmField::from_lat_lon(self.latitude, self.longitude)
    }
}

/// One base station observed at one point in time and space.
///
/// `rssi` is in dBm, or [`NO_SIGNAL`]. The default value is the "absent"
/// reading, see [`Reading::is_zero`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Reading {
    #[serde(rename = "lat")]
    #[allow(missing_docs)]
    pub latitude: f64,
    #[serde(rename = "lon")]
    #[allow(missing_docs)]
    pub longitude: f64,
    #[serde(rename = "sats")]
    #[allow(missing_docs)]
    pub satellites: u32,
    #[serde(rename = "ts")]
    #[allow(missing_docs)]
    pub timestamp: DateTime<Utc>,
    /// Location area code
    pub lac: u32,
    /// Carrier of the base station, shown in hex by the radio
    pub carrier: u32,
    #[allow(missing_docs)]
    pub rssi: i32,
    /// Secondary quality value (C1/CSNR) as reported by the radio
    pub cx: i32,
}

/// Fingerprint of the place and time a [`Reading`] was taken. All readings
/// of one scan share the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeasurementId(String);

impl MeasurementId {
    #[allow(missing_docs)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Reading {
    /// A reading at the given position that carries no cell information.
    pub fn at(position: &Position) -> Self {
        Reading {
            latitude: position.latitude,
            longitude: position.longitude,
            satellites: position.satellites,
            timestamp: position.timestamp,
            ..Default::default()
        }
    }

    /// True for the "absent" reading.
    pub fn is_zero(&self) -> bool {
        *self == Reading::default()
    }

    /// A reading is valid if it was taken with a GPS fix and has a signal.
    pub fn is_valid(&self) -> bool {
        self.satellites > 0 && self.rssi != NO_SIGNAL
    }

    /// The fingerprint of this reading's place and time.
    pub fn measurement_id(&self) -> MeasurementId {
        MeasurementId(format!(
            "{:.7},{:.7},{}",
            self.latitude,
            self.longitude,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
        ))
    }

    /// The grid field this reading was taken in.
    pub fn utm_field(&self) -> UtmField {
        UtmField::from_lat_lon(self.latitude, self.longitude)
    }

    /// Position part of this reading.
    pub fn position(&self) -> Position {
        Position {
            latitude: self.latitude,
            longitude: self.longitude,
            satellites: self.satellites,
            timestamp: self.timestamp,
        }
    }
}

/// Ranks two readings for sorting, strongest signal first. [`NO_SIGNAL`]
/// always ranks after measured values, ties are ordered by timestamp.
pub fn rank_by_signal(a: &Reading, b: &Reading) -> Ordering {
    cmp_rssi(b.rssi, a.rssi).then_with(|| a.timestamp.cmp(&b.timestamp))
}

/// Decides which of two readings is the better server: `Greater` means `a`
/// is better. Equal RSSI is decided by the higher `cx`.
pub fn better_server(a: &Reading, b: &Reading) -> Ordering {
    cmp_rssi(a.rssi, b.rssi).then_with(|| a.cx.cmp(&b.cx))
}
