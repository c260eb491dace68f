//! Projection between WGS84 latitude/longitude and UTM, and the 100m x 100m
//! grid fields built on top of it.
//!
//! The quality report bins readings into fields: a position is projected
//! into its UTM zone and band, and easting and northing are floored to the
//! next lower multiple of [`FIELD_SIZE`]. The resulting [`UtmField`] is the
//! same for every position inside one grid cell.

use std::fmt;

/// Edge length of a field, in meters.
pub const FIELD_SIZE: u32 = 100;

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

const BANDS: &[u8; 20] = b"CDEFGHJKLMNPQRSTUVWX";

/// A UTM coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utm {
    /// Longitude zone, 1..=60
    pub zone: u8,
    /// Latitude band letter, `C`..=`X` (without `I` and `O`)
    pub band: char,
    /// Meters east, including the false easting
    pub easting: f64,
    /// Meters north, including the false northing on the southern hemisphere
    pub northing: f64,
}

/// One 100m x 100m cell of the UTM grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtmField {
    /// Longitude zone
    pub zone: u8,
    /// Latitude band letter
    pub band: char,
    /// Easting of the south west corner, a multiple of [`FIELD_SIZE`]
    pub easting: u32,
    /// Northing of the south west corner, a multiple of [`FIELD_SIZE`]
    pub northing: u32,
}

/// Geographic bounding box of a field, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Area {
    #[allow(missing_docs)]
    pub min_latitude: f64,
    #[allow(missing_docs)]
    pub min_longitude: f64,
    #[allow(missing_docs)]
    pub max_latitude: f64,
    #[allow(missing_docs)]
    pub max_longitude: f64,
}

fn zone_for(latitude: f64, longitude: f64) -> u8 {
    // Norway and Svalbard deviate from the regular 6 degree zones
    if (56.0..64.0).contains(&latitude) && (3.0..12.0).contains(&longitude) {
        return 32;
    }
    if (72.0..=84.0).contains(&latitude) && longitude >= 0.0 && longitude < 42.0 {
        return match longitude {
            l if l < 9.0 => 31,
            l if l < 21.0 => 33,
            l if l < 33.0 => 35,
            _ => 37,
        };
    }
    let zone = ((longitude + 180.0) / 6.0).floor() as i32 + 1;
    zone.clamp(1, 60) as u8
}

fn band_for(latitude: f64) -> char {
    let index = ((latitude + 80.0) / 8.0).floor() as i32;
    BANDS[index.clamp(0, BANDS.len() as i32 - 1) as usize] as char
}

fn central_meridian(zone: u8) -> f64 {
    (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
}

fn is_southern(band: char) -> bool {
    band < 'N'
}

impl Utm {
    /// Projects a WGS84 position into its UTM zone, including the Norway and
    /// Svalbard exceptions.
    pub fn from_lat_lon(latitude: f64, longitude: f64) -> Self {
        let zone = zone_for(latitude, longitude);
        let band = band_for(latitude);

        let e2 = F * (2.0 - F);
        let ep2 = e2 / (1.0 - e2);
        let phi = latitude.to_radians();
        let delta_lambda = (longitude - central_meridian(zone)).to_radians();

        let n = A / (1.0 - e2 * phi.sin().powi(2)).sqrt();
        let t = phi.tan().powi(2);
        let c = ep2 * phi.cos().powi(2);
        let a = phi.cos() * delta_lambda;
        let m = A
            * ((1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e2.powi(2) / 32.0 + 45.0 * e2.powi(3) / 1024.0)
                    * (2.0 * phi).sin()
                + (15.0 * e2.powi(2) / 256.0 + 45.0 * e2.powi(3) / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e2.powi(3) / 3072.0) * (6.0 * phi).sin());

        let easting = K0
            * n
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
            + FALSE_EASTING;
        let mut northing = K0
            * (m + n
                * phi.tan()
                * (a * a / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
        if latitude < 0.0 {
            northing += FALSE_NORTHING_SOUTH;
        }

        Utm {
            zone,
            band,
            easting,
            northing,
        }
    }

    /// Converts back into WGS84 latitude and longitude, in degrees.
    pub fn to_lat_lon(&self) -> (f64, f64) {
        let e2 = F * (2.0 - F);
        let e = e2.sqrt();
        let ep2 = e2 / (1.0 - e2);

        let x = self.easting - FALSE_EASTING;
        let y = if is_southern(self.band) {
            self.northing - FALSE_NORTHING_SOUTH
        } else {
            self.northing
        };

        let m = y / K0;
        let mu = m / (A * (1.0 - e2 / 4.0 - 3.0 * e.powi(4) / 64.0 - 5.0 * e.powi(6) / 256.0));
        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
        let j1 = 3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0;
        let j2 = 21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0;
        let j3 = 151.0 * e1.powi(3) / 96.0;
        let j4 = 1097.0 * e1.powi(4) / 512.0;
        let fp = mu
            + j1 * (2.0 * mu).sin()
            + j2 * (4.0 * mu).sin()
            + j3 * (6.0 * mu).sin()
            + j4 * (8.0 * mu).sin();

        let c1 = ep2 * fp.cos().powi(2);
        let t1 = fp.tan().powi(2);
        let r1 = A * (1.0 - e2) / (1.0 - (e * fp.sin()).powi(2)).powf(1.5);
        let n1 = A / (1.0 - (e * fp.sin()).powi(2)).sqrt();
        let d = x / (n1 * K0);

        let lat = fp
            - (n1 * fp.tan() / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2
                        - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);
        let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / fp.cos();

        (lat.to_degrees(), central_meridian(self.zone) + lon.to_degrees())
    }
}

impl UtmField {
    /// The field that contains the given position.
    pub fn from_lat_lon(latitude: f64, longitude: f64) -> Self {
        let utm = Utm::from_lat_lon(latitude, longitude);
        let floor = |v: f64| (v.max(0.0) as u32 / FIELD_SIZE) * FIELD_SIZE;
        UtmField {
            zone: utm.zone,
            band: utm.band,
            easting: floor(utm.easting),
            northing: floor(utm.northing),
        }
    }

    /// Stable string key of this field, e.g. `33U 391700 5820000`.
    pub fn field_id(&self) -> String {
        self.to_string()
    }

    /// Bounding box of the four corners of this field.
    pub fn area(&self) -> Area {
        let size = FIELD_SIZE as f64;
        let corners = [(0.0, 0.0), (size, 0.0), (0.0, size), (size, size)].map(|(de, dn)| {
            Utm {
                zone: self.zone,
                band: self.band,
                easting: self.easting as f64 + de,
                northing: self.northing as f64 + dn,
            }
            .to_lat_lon()
        });

        corners.iter().fold(
            Area {
                min_latitude: f64::MAX,
                min_longitude: f64::MAX,
                max_latitude: f64::MIN,
                max_longitude: f64::MIN,
            },
            |area, &(lat, lon)| Area {
                min_latitude: area.min_latitude.min(lat),
                min_longitude: area.min_longitude.min(lon),
                max_latitude: area.max_latitude.max(lat),
                max_longitude: area.max_longitude.max(lon),
            },
        )
    }
}

impl fmt::Display for UtmField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {:06} {:07}",
            self.zone, self.band, self.easting, self.northing
        )
    }
}
