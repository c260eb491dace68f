//! Selections over sequences of readings, used to pick one reading per
//! scan or one base station out of a survey.

use crate::reading::{better_server, rank_by_signal, MeasurementId, Reading};
use crate::utm::UtmField;

use std::collections::{BTreeMap, HashMap};

/// Groups readings by the place and time they were taken, keeping the
/// original order within each group.
pub fn group_by_measurement(readings: &[Reading]) -> BTreeMap<MeasurementId, Vec<Reading>> {
    let mut result: BTreeMap<MeasurementId, Vec<Reading>> = BTreeMap::new();
    for reading in readings {
        result
            .entry(reading.measurement_id())
            .or_default()
            .push(*reading);
    }
    result
}

/// Groups readings by the grid field they were taken in.
pub fn group_by_field(readings: &[Reading]) -> HashMap<UtmField, Vec<Reading>> {
    let mut result: HashMap<UtmField, Vec<Reading>> = HashMap::new();
    for reading in readings {
        result.entry(reading.utm_field()).or_default().push(*reading);
    }
    result
}

/// The best server of one group of simultaneous readings. Returns `None` if
/// the group is empty or its winner is not valid.
pub fn best_server_of(readings: &[Reading]) -> Option<Reading> {
    let mut iter = readings.iter();
    let first = *iter.next()?;
    let best = iter.fold(first, |best, r| {
        if better_server(r, &best).is_gt() {
            *r
        } else {
            best
        }
    });
    best.is_valid().then_some(best)
}

/// Reduces every scan to its best server and returns them in chronological
/// order. Scans without a valid best server are dropped.
pub fn best_servers(readings: &[Reading]) -> Vec<Reading> {
    let result = group_by_measurement(readings)
        .values()
        .filter_map(|group| best_server_of(group))
        .collect();
    sort_by_timestamp(result)
}

/// Keeps the readings of one location area.
pub fn by_lac(readings: &[Reading], lac: u32) -> Vec<Reading> {
    readings.iter().filter(|r| r.lac == lac).copied().collect()
}

/// Keeps the readings of one carrier.
pub fn by_carrier(readings: &[Reading], carrier: u32) -> Vec<Reading> {
    readings
        .iter()
        .filter(|r| r.carrier == carrier)
        .copied()
        .collect()
}

/// Oldest reading first.
pub fn sort_by_timestamp(mut readings: Vec<Reading>) -> Vec<Reading> {
    readings.sort_by_key(|r| r.timestamp);
    readings
}

/// Strongest signal first, see [`rank_by_signal`].
pub fn sort_by_rssi(mut readings: Vec<Reading>) -> Vec<Reading> {
    readings.sort_by(rank_by_signal);
    readings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::NO_SIGNAL;
    use chrono::{TimeZone, Utc};

    fn reading(seconds: u32, lac: u32, carrier: u32, rssi: i32, cx: i32) -> Reading {
        Reading {
            latitude: 52.35,
            longitude: 13.37,
            satellites: 7,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, seconds).unwrap(),
            lac,
            carrier,
            rssi,
            cx,
        }
    }

    #[test]
    fn equal_rssi_is_decided_by_cx() {
        let readings = [reading(0, 100, 1, -80, 3), reading(0, 100, 2, -80, 5)];
        let best = best_server_of(&readings).unwrap();
        assert_eq!(best.cx, 5);
        assert_eq!(best.carrier, 2);
    }

    #[test]
    fn groups_by_time_and_place() {
        let readings = [
            reading(0, 100, 1, -80, 0),
            reading(0, 100, 2, -70, 0),
            reading(10, 100, 1, -75, 0),
        ];
        let groups = group_by_measurement(&readings);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&readings[0].measurement_id()].len(), 2);
        assert_eq!(groups[&readings[2].measurement_id()].len(), 1);
    }

    #[test]
    fn best_servers_in_chronological_order() {
        let readings = [
            reading(20, 100, 1, -90, 0),
            reading(20, 101, 2, -60, 0),
            reading(10, 100, 1, -85, 0),
            reading(10, 101, 2, NO_SIGNAL, 0),
            reading(30, 100, 1, NO_SIGNAL, 0),
        ];
        let best = best_servers(&readings);
        assert_eq!(best.len(), 2);
        assert_eq!((best[0].carrier, best[0].rssi), (1, -85));
        assert_eq!((best[1].carrier, best[1].rssi), (2, -60));
    }

    #[test]
    fn invalid_winner_contributes_nothing() {
        let no_fix = Reading {
            satellites: 0,
            ..reading(0, 100, 1, -60, 0)
        };
        assert!(best_server_of(&[no_fix]).is_none());
        assert!(best_server_of(&[]).is_none());
    }

    #[test]
    fn lac_and_carrier_filters_keep_order() {
        let readings = [
            reading(0, 100, 1, -80, 0),
            reading(1, 101, 2, -70, 0),
            reading(2, 100, 2, -75, 0),
        ];
        let lac = by_lac(&readings, 100);
        assert_eq!(lac, vec![readings[0], readings[2]]);
        let carrier = by_carrier(&readings, 2);
        assert_eq!(carrier, vec![readings[1], readings[2]]);
    }

    #[test]
    fn sort_by_rssi_is_best_first() {
        let readings = vec![
            reading(0, 100, 1, NO_SIGNAL, 0),
            reading(1, 100, 2, -100, 0),
            reading(2, 100, 3, -70, 0),
        ];
        let sorted = sort_by_rssi(readings);
        assert_eq!(
            sorted.iter().map(|r| r.carrier).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
    }

    #[test]
    fn groups_by_field() {
        let near = reading(0, 100, 1, -80, 0);
        let far = Reading {
            latitude: 48.0,
            ..near
        };
        let groups = group_by_field(&[near, far, near]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&near.utm_field()].len(), 2);
    }
}
