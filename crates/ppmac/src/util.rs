use std::f64::consts::PI;
use std::time::Duration;

use crate::error::CommandError;

const UTIL_MAKEFILE: &str = include_str!("../templates/util_makefile");

/// Servo elements shown by `servo` and copied by `servo_copy` when no
/// catalog is loaded.
pub const SERVO_SETTINGS: &[&str] = &[
    "Kp",
    "Kvfb",
    "Kvifb",
    "Ki",
    "Kvff",
    "Kviff",
    "Kaff",
    "Kfff",
    "Kbreak",
    "BreakPosErr",
    "SwZvInt",
    "MaxInt",
    "OutDbOn",
    "OutDbOff",
    "OutDbSeed",
];

/// A time in seconds given as a command argument.
pub fn seconds(value: f64) -> Result<Duration, CommandError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| CommandError::Invalid(format!("Invalid time: {} s", value)))
}

/// Encoder table tracking filter gains `(index1, index2)` for a cutoff
/// frequency in Hz and a servo period in seconds.
///
/// `index2 = 256 - 512·wn·ζ·Ts`, `index1 = 256·wn²·Ts²` with `wn = 2π·fc`,
/// each rounded and clamped to a byte.
pub fn tracking_filter(cutoff: f64, damping: f64, servo_period: f64) -> (u8, u8) {
    if cutoff <= 0.0 {
        return (0, 0);
    }

    let wn = 2.0 * PI * cutoff;
    let ts = servo_period;
    let index2 = 256.0 - 512.0 * wn * damping * ts;
    let index1 = 256.0 * wn * wn * ts * ts;

    (to_byte(index1), to_byte(index2))
}

fn to_byte(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Formats like C's `%.Ng`: `precision` significant digits, trailing
/// zeros removed, scientific notation for very large or small values.
pub fn format_general(value: f64, precision: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let precision = precision.max(1);
    // the exponent after rounding to `precision` digits decides the notation
    let text = format!("{:.*e}", precision - 1, value);
    let (mantissa, exp) = text.split_once('e').unwrap_or((&text, "0"));
    let exponent: i32 = exp.parse().unwrap_or(0);
    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// Makefile for a user utility built on the controller.
pub fn util_makefile(source_files: &[String], output_name: &str) -> String {
    UTIL_MAKEFILE
        .replace("{source_files}", &source_files.join(" "))
        .replace("{output_name}", output_name)
}
