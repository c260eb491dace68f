//! Grammars of the PEI responses the scanner relies on.
//!
//! ```text
//! +GPSPOS: 12:00:00,N: 52_20.9931,E: 013_22.6631,7
//! +CSQ: 26,99
//! +GCLI: 2
//! 100,caffe,26,5
//! ```

use crate::signal::raw_to_dbm;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use nom::{
    bytes::complete::tag,
    character::complete::{char, hex_digit1, i32, one_of, space0, u32},
    combinator::{all_consuming, map, map_opt, map_res},
    error::Error,
    number::complete::double,
    sequence::{preceded, separated_pair, terminated, tuple},
    Finish, IResult,
};
use std::str::FromStr;

/// A GPS fix as reported by `AT+GPSPOS?`. The radio only reports the time
/// of day, see [`GpsPosition::timestamp_near`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsPosition {
    #[allow(missing_docs)]
    pub latitude: f64,
    #[allow(missing_docs)]
    pub longitude: f64,
    #[allow(missing_docs)]
    pub satellites: u32,
    /// UTC time of day
    pub time: NaiveTime,
}

/// One entry of the cell list reported by `AT+GCLI?`, RSSI already in dBm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellInfo {
    #[allow(missing_docs)]
    pub lac: u32,
    #[allow(missing_docs)]
    pub carrier: u32,
    #[allow(missing_docs)]
    pub rssi: i32,
    #[allow(missing_docs)]
    pub cx: i32,
}

fn parse_time(s: &str) -> IResult<&str, NaiveTime> {
    map_opt(
        tuple((u32, preceded(char(':'), u32), preceded(char(':'), u32))),
        |(h, m, sec)| NaiveTime::from_hms_opt(h, m, sec),
    )(s)
}

/// `N: 52_20.9931` -> degrees, negative on the southern/western hemisphere
fn parse_coordinate<'a>(hemispheres: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, f64> {
    map(
        tuple((
            one_of(hemispheres),
            preceded(char(':'), preceded(space0, u32)),
            preceded(char('_'), double),
        )),
        |(hemisphere, degrees, minutes)| {
            let value = degrees as f64 + minutes / 60.0;
            if hemisphere == 'S' || hemisphere == 'W' {
                -value
            } else {
                value
            }
        },
    )
}

fn parse_gps_position(s: &str) -> IResult<&str, GpsPosition> {
    map(
        tuple((
            preceded(terminated(tag("+GPSPOS:"), space0), parse_time),
            preceded(char(','), parse_coordinate("NS")),
            preceded(char(','), parse_coordinate("EW")),
            preceded(char(','), u32),
        )),
        |(time, latitude, longitude, satellites)| GpsPosition {
            latitude,
            longitude,
            satellites,
            time,
        },
    )(s)
}

fn parse_signal_strength(s: &str) -> IResult<&str, i32> {
    map(
        preceded(
            terminated(tag("+CSQ:"), space0),
            separated_pair(i32, char(','), i32),
        ),
        |(raw, _ber)| raw_to_dbm(raw),
    )(s)
}

fn parse_cell_list_header(s: &str) -> IResult<&str, usize> {
    map(preceded(tag("+GCLI: "), u32), |count| count as usize)(s)
}

fn parse_cell_info(s: &str) -> IResult<&str, CellInfo> {
    map(
        tuple((
            u32,
            preceded(
                char(','),
                map_res(hex_digit1, |h| u32::from_str_radix(h, 16)),
            ),
            preceded(char(','), i32),
            preceded(char(','), i32),
        )),
        |(lac, carrier, raw_rssi, cx)| CellInfo {
            lac,
            carrier,
            rssi: raw_to_dbm(raw_rssi),
            cx,
        },
    )(s)
}

fn owned(err: Error<&str>) -> Error<String> {
    Error {
        input: err.input.to_string(),
        code: err.code,
    }
}

impl FromStr for GpsPosition {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_gps_position(s.trim()).finish() {
            Ok((_remaining, position)) => Ok(position),
            Err(err) => Err(owned(err)),
        }
    }
}

impl FromStr for CellInfo {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim().to_lowercase();
        // trailing fields are allowed, newer radios report more values
        match parse_cell_info(&line).finish() {
            Ok((_remaining, info)) => Ok(info),
            Err(err) => Err(owned(err)),
        }
    }
}

/// Parses the dBm value of a `+CSQ` response line.
pub fn decode_signal_strength(line: &str) -> Result<i32, Error<String>> {
    match parse_signal_strength(line.trim()).finish() {
        Ok((_remaining, dbm)) => Ok(dbm),
        Err(err) => Err(owned(err)),
    }
}

/// Parses the entry count of a `+GCLI` header line. Nothing may follow the
/// count.
pub fn decode_cell_list_header(line: &str) -> Result<usize, Error<String>> {
    match all_consuming(parse_cell_list_header)(line.trim()).finish() {
        Ok((_remaining, count)) => Ok(count),
        Err(err) => Err(owned(err)),
    }
}

impl GpsPosition {
    /// Combines the time of day with the date of `now`. A fix that would lie
    /// more than a minute in the future was taken before midnight.
    pub fn timestamp_near(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let timestamp = Utc.from_utc_datetime(&now.date_naive().and_time(self.time));
        if timestamp > now + Duration::minutes(1) {
            timestamp - Duration::days(1)
        } else {
            timestamp
        }
    }
}
