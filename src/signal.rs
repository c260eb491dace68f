//! Signal strength conventions shared by the whole pipeline: the "no signal"
//! sentinel, the conversion from raw radio values to dBm, and the GAN scale
//! used to summarize coverage.

use std::cmp::Ordering;

/// RSSI value reported by the radio when it cannot measure a signal. It
/// passes through the dBm conversion unchanged and is never averaged.
pub const NO_SIGNAL: i32 = 99;

/// GAN value for readings without a usable signal.
pub const NO_GAN: i32 = -3;

/// Lower dBm bound of GAN -1, 0, 1, 2, 3 and 4. Everything below the first
/// breakpoint is GAN -2. These values are tuned for TETRA handhelds and are
/// not meant to be derived from anything.
const GAN_BREAKPOINTS: [i32; 6] = [-103, -95, -88, -79, -70, -61];

/// Converts a raw RSSI value as reported by `AT+CSQ?` and `AT+GCLI?` into dBm.
pub fn raw_to_dbm(raw: i32) -> i32 {
    if raw == NO_SIGNAL {
        NO_SIGNAL
    } else {
        -113 + 2 * raw
    }
}

/// Maps an RSSI in dBm onto the GAN scale (-2..=4), or [`NO_GAN`].
pub fn rssi_to_gan(rssi: i32) -> i32 {
    if rssi == NO_SIGNAL {
        return NO_GAN;
    }
    let passed = GAN_BREAKPOINTS.iter().filter(|&&b| rssi >= b).count() as i32;
    passed - 2
}

/// Orders two RSSI values by strength: `Greater` means `rssi1` is the
/// stronger signal. [`NO_SIGNAL`] is weaker than any measured value, two
/// sentinels compare `Equal`.
pub fn cmp_rssi(rssi1: i32, rssi2: i32) -> Ordering {
    match (rssi1 == NO_SIGNAL, rssi2 == NO_SIGNAL) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => rssi1.cmp(&rssi2),
    }
}

/// Integer mean of the given RSSI values, skipping the sentinel. Returns
/// [`NO_SIGNAL`] if nothing is left to average.
pub fn average_rssi<I>(values: I) -> i32
where
    I: IntoIterator<Item = i32>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|&rssi| rssi != NO_SIGNAL)
        .fold((0i64, 0i64), |(sum, count), rssi| (sum + rssi as i64, count + 1));
    if count == 0 {
        NO_SIGNAL
    } else {
        (sum / count) as i32
    }
}
