//! A radio that does not exist. It walks randomly around an origin and
//! reports a ring of base stations whose signal fades with distance, using
//! the same response grammar as a real device.

use crate::pei::{Deadline, DisconnectCallback, Pei, PeiError};
use crate::scanner::{CELL_LIST_REQUEST, GPS_POSITION_REQUEST, SIGNAL_STRENGTH_REQUEST};
use crate::signal::NO_SIGNAL;

use chrono::Utc;
use log::debug;
use rand::prelude::*;
use std::f64::consts::PI;

const METERS_PER_DEGREE_LATITUDE: f64 = 110_540.0;
const METERS_PER_DEGREE_LONGITUDE: f64 = 111_320.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tower {
    lac: u32,
    carrier: u32,
    latitude: f64,
    longitude: f64,
}

/// Builds a [`DummyPei`].
#[derive(Debug, Clone)]
pub struct DummyPeiBuilder {
    origin: (f64, f64),
    tower_count: usize,
    range: f64,
    step: f64,
    noise: i32,
    seed: Option<u64>,
}

impl Default for DummyPeiBuilder {
    fn default() -> Self {
        Self {
            origin: (52.349885, 13.377718),
            tower_count: 3,
            range: 1500.0,
            step: 25.0,
            noise: 3,
            seed: None,
        }
    }
}

impl DummyPeiBuilder {
    /// Center of the walk and of the ring of towers.
    pub fn origin(self, latitude: f64, longitude: f64) -> Self {
        Self {
            origin: (latitude, longitude),
            ..self
        }
    }

    /// Number of towers on the ring.
    pub fn towers(self, tower_count: usize) -> Self {
        Self {
            tower_count,
            ..self
        }
    }

    /// Radius of the ring of towers, in meters.
    pub fn range(self, range: f64) -> Self {
        Self { range, ..self }
    }

    /// Maximum distance walked per position request, in meters.
    pub fn step(self, step: f64) -> Self {
        Self { step, ..self }
    }

    /// Maximum deviation of reported RSSI values, in dB.
    pub fn noise(self, noise: i32) -> Self {
        Self {
            noise: noise.abs(),
            ..self
        }
    }

    /// Makes the walk and the noise reproducible.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    #[allow(missing_docs)]
    pub fn build(self) -> DummyPei {
        let (latitude, longitude) = self.origin;
        let towers = tower_positions(self.tower_count, self.range)
            .into_iter()
            .enumerate()
            .map(|(i, (east, north))| Tower {
                lac: 12345 + i as u32,
                carrier: 0xcaffe - i as u32,
                latitude: latitude + north / METERS_PER_DEGREE_LATITUDE,
                longitude: longitude + east / longitude_scale(latitude),
            })
            .collect();
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        DummyPei {
            latitude,
            longitude,
            step: self.step,
            noise: self.noise,
            towers,
            rng,
            closed: false,
        }
    }
}

/// The demo device.
pub struct DummyPei {
    latitude: f64,
    longitude: f64,
    step: f64,
    noise: i32,
    towers: Vec<Tower>,
    rng: StdRng,
    closed: bool,
}

impl DummyPei {
    #[allow(missing_docs)]
    pub fn builder() -> DummyPeiBuilder {
        DummyPeiBuilder::default()
    }

    fn walk(&mut self) {
        if self.step <= 0.0 {
            return;
        }
        let east = self.rng.gen_range(-self.step..=self.step);
        let north = self.rng.gen_range(-self.step..=self.step);
        self.latitude += north / METERS_PER_DEGREE_LATITUDE;
        self.longitude += east / longitude_scale(self.latitude);
    }

    fn gps_position(&mut self) -> Vec<String> {
        self.walk();
        vec![format!(
            "+GPSPOS: {},{},{},7",
            Utc::now().format("%H:%M:%S"),
            format_coordinate(self.latitude, 'N', 'S', 2),
            format_coordinate(self.longitude, 'E', 'W', 3)
        )]
    }

    fn raw_rssi(&mut self, tower: &Tower) -> i32 {
        let dy = (tower.latitude - self.latitude) * METERS_PER_DEGREE_LATITUDE;
        let dx = (tower.longitude - self.longitude) * longitude_scale(self.latitude);
        let distance = dx.hypot(dy).max(1.0);
        let jitter = if self.noise > 0 {
            self.rng.gen_range(-self.noise..=self.noise)
        } else {
            0
        };
        let dbm = path_loss_dbm(distance) + jitter;
        let raw = (dbm + 113) / 2;
        if raw < 0 {
            NO_SIGNAL
        } else {
            raw.min(62)
        }
    }

    fn signal_strength(&mut self) -> Vec<String> {
        let towers = self.towers.clone();
        let raw = towers
            .iter()
            .map(|tower| self.raw_rssi(tower))
            .filter(|&raw| raw != NO_SIGNAL)
            .max()
            .unwrap_or(NO_SIGNAL);
        vec![format!("+CSQ: {},99", raw)]
    }

    fn cell_list(&mut self) -> Vec<String> {
        let towers = self.towers.clone();
        let mut lines = vec![format!("+GCLI: {}", towers.len())];
        for tower in &towers {
            let raw = self.raw_rssi(tower);
            let cx = self.rng.gen_range(0..50);
            lines.push(format!("{},{:x},{},{}", tower.lac, tower.carrier, raw, cx));
        }
        lines
    }
}

impl Pei for DummyPei {
    fn request(&mut self, command: &str, _deadline: Deadline) -> Result<Vec<String>, PeiError> {
        if self.closed {
            return Err(PeiError::Closed);
        }
        Ok(match command {
            GPS_POSITION_REQUEST => self.gps_position(),
            SIGNAL_STRENGTH_REQUEST => self.signal_strength(),
            CELL_LIST_REQUEST => self.cell_list(),
            _ => Vec::new(),
        })
    }

    fn clear_syntax_errors(&mut self, _deadline: Deadline) -> Result<(), PeiError> {
        if self.closed {
            return Err(PeiError::Closed);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        debug!("demo radio closed");
        self.closed = true;
    }

    fn wait_until_closed(&mut self, _deadline: Deadline) {}

    fn is_closed(&self) -> bool {
        self.closed
    }

    // the demo radio never loses its connection
    fn on_disconnect(&mut self, _callback: DisconnectCallback) {}
}

fn longitude_scale(latitude: f64) -> f64 {
    METERS_PER_DEGREE_LONGITUDE * latitude.to_radians().cos()
}

/// Evenly spaced points on a circle, as (east, north) offsets in meters.
fn tower_positions(count: usize, range: f64) -> Vec<(f64, f64)> {
    (0..count)
        .map(|i| (i as f64 / count as f64) * 2.0 * PI)
        .map(|angle| (angle.cos() * range, angle.sin() * range))
        .collect()
}

/// -55 dBm at 100 m, 30 dB less per decade.
fn path_loss_dbm(distance: f64) -> i32 {
    (-55.0 - 30.0 * (distance / 100.0).log10()).round() as i32
}

/// `N: 52_20.9931`
fn format_coordinate(value: f64, positive: char, negative: char, width: usize) -> String {
    let hemisphere = if value < 0.0 { negative } else { positive };
    let ten_thousandths = (value.abs() * 60.0 * 10_000.0).round() as u64;
    let degrees = ten_thousandths / 600_000;
    let minutes = ten_thousandths % 600_000;
    format!(
        "{}: {:0width$}_{:02}.{:04}",
        hemisphere,
        degrees,
        minutes / 10_000,
        minutes % 10_000,
        width = width
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pei_decoder::{decode_cell_list_header, decode_signal_strength, CellInfo, GpsPosition};
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(1))
    }

    #[test]
    fn towers_on_a_circle() {
        let points = tower_positions(4, 1.0);
        let expected = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];
        for (point, expected) in points.iter().zip(expected) {
            assert!((point.0 - expected.0).abs() < 1e-9);
            assert!((point.1 - expected.1).abs() < 1e-9);
        }
    }

    #[test]
    fn coordinates_use_degrees_and_minutes() {
        assert_eq!(format_coordinate(52.349885, 'N', 'S', 2), "N: 52_20.9931");
        assert_eq!(format_coordinate(13.377718, 'E', 'W', 3), "E: 013_22.6631");
        assert_eq!(format_coordinate(-0.5, 'E', 'W', 3), "W: 000_30.0000");
    }

    #[test]
    fn signal_fades_with_distance() {
        assert_eq!(path_loss_dbm(100.0), -55);
        assert_eq!(path_loss_dbm(1000.0), -85);
        assert!(path_loss_dbm(20_000.0) < -113);
    }

    #[test]
    fn responses_follow_the_radio_grammar() {
        let mut pei = DummyPei::builder().seed(7).build();

        let lines = pei.request(GPS_POSITION_REQUEST, deadline()).unwrap();
        let position: GpsPosition = lines[0].parse().unwrap();
        assert!((position.latitude - 52.349885).abs() < 0.01);
        assert!((position.longitude - 13.377718).abs() < 0.01);
        assert_eq!(position.satellites, 7);

        let lines = pei.request(SIGNAL_STRENGTH_REQUEST, deadline()).unwrap();
        assert!(decode_signal_strength(&lines[0]).unwrap() < 0);

        let lines = pei.request(CELL_LIST_REQUEST, deadline()).unwrap();
        assert_eq!(decode_cell_list_header(&lines[0]).unwrap(), 3);
        let cells: Vec<CellInfo> = lines[1..].iter().map(|l| l.parse().unwrap()).collect();
        assert_eq!(cells[0].lac, 12345);
        assert_eq!(cells[0].carrier, 0xcaffe);
        assert_eq!(cells[2].carrier, 0xcaffc);

        assert!(pei.request("ATZ", deadline()).unwrap().is_empty());
    }

    #[test]
    fn far_away_towers_have_no_signal() {
        let mut pei = DummyPei::builder()
            .towers(1)
            .range(50_000.0)
            .noise(0)
            .step(0.0)
            .build();
        let lines = pei.request(CELL_LIST_REQUEST, deadline()).unwrap();
        let cell: CellInfo = lines[1].parse().unwrap();
        assert_eq!(cell.rssi, NO_SIGNAL);
        let lines = pei.request(SIGNAL_STRENGTH_REQUEST, deadline()).unwrap();
        assert_eq!(lines[0], "+CSQ: 99,99");
    }

    #[test]
    fn seeded_walks_are_reproducible() {
        let mut a = DummyPei::builder().seed(42).build();
        let mut b = DummyPei::builder().seed(42).build();
        for _ in 0..5 {
            a.walk();
            b.walk();
        }
        assert_eq!((a.latitude, a.longitude), (b.latitude, b.longitude));
    }

    #[test]
    fn close_is_orderly() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut pei = DummyPei::builder().build();
        pei.on_disconnect(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        pei.close();
        pei.close();
        assert!(pei.is_closed());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(matches!(
            pei.request(CELL_LIST_REQUEST, deadline()),
            Err(PeiError::Closed)
        ));
    }
}
