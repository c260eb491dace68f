//! One scan: ask the radio where it is, how strong the signal is, and which
//! base stations it can see, and turn the answers into readings.
//!
//! Failures of single queries are logged and replaced by defaults, so a scan
//! always produces at least one reading.

use crate::pei::{Deadline, Pei, PeiError};
use crate::pei_decoder::{decode_cell_list_header, decode_signal_strength, CellInfo, GpsPosition};
use crate::reading::{Position, Reading};

use chrono::Utc;
use log::warn;

/// Queries the GPS position.
pub const GPS_POSITION_REQUEST: &str = "AT+GPSPOS?";
/// Queries the signal strength of the serving cell.
pub const SIGNAL_STRENGTH_REQUEST: &str = "AT+CSQ?";
/// Queries the list of neighbor cells.
pub const CELL_LIST_REQUEST: &str = "AT+GCLI?";

/// Receives messages about recoverable problems during a scan.
pub type Logger<'a> = &'a dyn Fn(String);

/// Requests and decodes the current GPS position.
pub fn request_gps_position(pei: &mut dyn Pei, deadline: Deadline) -> Result<Position, PeiError> {
    let response = pei.request(GPS_POSITION_REQUEST, deadline)?;
    let line = response.first().ok_or(PeiError::EmptyResponse)?;
    let position: GpsPosition = line
        .parse()
        .map_err(|_| PeiError::InvalidResponse(line.clone()))?;
    Ok(Position {
        latitude: position.latitude,
        longitude: position.longitude,
        satellites: position.satellites,
        timestamp: position.timestamp_near(Utc::now()),
    })
}

/// Requests the signal strength of the serving cell, in dBm.
pub fn request_signal_strength(pei: &mut dyn Pei, deadline: Deadline) -> Result<i32, PeiError> {
    let response = pei.request(SIGNAL_STRENGTH_REQUEST, deadline)?;
    let line = response.first().ok_or(PeiError::EmptyResponse)?;
    decode_signal_strength(line).map_err(|_| PeiError::InvalidResponse(line.clone()))
}

/// Requests the neighbor cell list. The whole call fails if the header is
/// malformed or the number of lines does not match the header; malformed
/// entries are skipped.
pub fn request_cell_list(pei: &mut dyn Pei, deadline: Deadline) -> Result<Vec<CellInfo>, PeiError> {
    let response = pei.request(CELL_LIST_REQUEST, deadline)?;
    let (header, entries) = response.split_first().ok_or(PeiError::EmptyResponse)?;
    let count = decode_cell_list_header(header)
        .map_err(|_| PeiError::InvalidResponse(header.clone()))?;
    if entries.len() != count {
        return Err(PeiError::InvalidResponse(format!(
            "invalid response length: {} != {}",
            entries.len(),
            count
        )));
    }

    Ok(entries
        .iter()
        .filter_map(|line| match line.parse::<CellInfo>() {
            Ok(info) => Some(info),
            Err(err) => {
                warn!("invalid cell info line {:?}: {:?}", line, err.code);
                None
            }
        })
        .collect())
}

/// Runs one scan and returns the position and the readings of all visible
/// base stations. Every failure is passed to `log`.
pub fn scan_signal_and_position(
    pei: &mut dyn Pei,
    deadline: Deadline,
    log: Logger,
) -> (Position, Vec<Reading>) {
    let position = request_gps_position(pei, deadline).unwrap_or_else(|err| {
        log(format!("cannot read GPS position: {}", err));
        Position {
            timestamp: Utc::now(),
            ..Position::NONE
        }
    });

    let dbm = request_signal_strength(pei, deadline).unwrap_or_else(|err| {
        log(format!("cannot read signal strength: {}", err));
        0
    });

    match request_cell_list(pei, deadline) {
        Ok(cells) => {
            let readings = cells
                .iter()
                .map(|cell| Reading {
                    lac: cell.lac,
                    carrier: cell.carrier,
                    rssi: cell.rssi,
                    cx: cell.cx,
                    ..Reading::at(&position)
                })
                .collect();
            (position, readings)
        }
        Err(err) => {
            log(format!("cannot read cell list information: {}", err));
            let fallback = Reading {
                rssi: dbm,
                ..Reading::at(&position)
            };
            (position, vec![fallback])
        }
    }
}
