//! Payload checksum shared with the gateway sender
//!
//! The gateway computes its checksum over a re-stringified payload rather
//! than over the wire bytes, so the receiving side has to rebuild exactly the
//! same text:
//!
//! 1. every float is rounded to [`FLOAT_DECIMALS`] places (integers are left
//!    alone),
//! 2. the payload is printed as `{"key":value,...}` with no whitespace; keys
//!    and strings are double-quoted, spaces inside them are dropped and
//!    single quotes become double quotes,
//! 3. the code points of that text are summed modulo [`CHECKSUM_MODULUS`].
//!
//! Floats print the way the sender's float repr does: shortest round-trip
//! digits, always with a fractional part, and exponent notation outside
//! `[1e-4, 1e16)`.
//!
//! This catches truncation and bit flips on the serial line. It authenticates
//! nothing.

use crate::frame::{FieldValue, Payload};

pub const CHECKSUM_MODULUS: u32 = 256;
pub const FLOAT_DECIMALS: usize = 2;

/// Compute the checksum of a payload
pub fn compute(payload: &Payload) -> u8 {
    let sum = canonical_form(payload)
        .chars()
        .fold(0u32, |acc, c| (acc + c as u32) % CHECKSUM_MODULUS);
    sum as u8
}

/// Check a declared checksum against the payload
pub fn validate(payload: &Payload, declared: i64) -> bool {
    i64::from(compute(payload)) == declared
}

/// The exact text the checksum is computed over
pub fn canonical_form(payload: &Payload) -> String {
    let mut out = String::from("{");
    for (i, (key, value)) in payload.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_quoted(&mut out, key);
        out.push(':');
        match value {
            FieldValue::Int(v) => out.push_str(&v.to_string()),
            FieldValue::Float(v) => out.push_str(&format_float(round_to(*v, FLOAT_DECIMALS))),
            FieldValue::Text(s) => push_quoted(&mut out, s),
        }
    }
    out.push('}');
    out
}

/// Round to `decimals` places from the exact binary value, ties away from zero.
///
/// `value * 10^d` rounds before `round()` ever sees it, which pushes values
/// like 0.015 (really 0.01499999...) onto a tie. Precision formatting works on
/// the exact value instead, but breaks ties to even. A double sits exactly on
/// a tie only when it is an odd multiple of `2^-(d+1)`; those are handled
/// apart, where `value * 10^d` is exact.
fn round_to(value: f64, decimals: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let halves = value * 2f64.powi(decimals as i32 + 1);
    if halves.fract() == 0.0 && halves % 2.0 != 0.0 {
        let scale = 10f64.powi(decimals as i32);
        return ((value * scale).abs() + 0.5).floor().copysign(value) / scale;
    }

    format!("{:.*}", decimals, value).parse().unwrap_or(value)
}

/// Plain `"..."`: no `u` prefix and no `\x..` escapes for non-ASCII text
fn push_quoted(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        match c {
            ' ' => {}
            '\'' => out.push('"'),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        // `{:e}` gives "1.5e16" / "1e-5"; the sender writes "1.5e+16" / "1e-05"
        let formatted = format!("{:e}", value);
        if let Some((mantissa, exponent)) = formatted.split_once('e') {
            if let Ok(exponent) = exponent.parse::<i32>() {
                let sign = if exponent < 0 { '-' } else { '+' };
                return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
            }
        }
        return formatted;
    }

    let formatted = format!("{}", value);
    if formatted.contains('.') {
        formatted
    } else {
        formatted + ".0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tsc_payload() -> Payload {
        Payload::new()
            .with("engine_rpm", 3000)
            .with("shaft_rpm", 100)
            .with("gear", 1)
    }

    #[test]
    fn test_canonical_form_compact() {
        assert_eq!(
            canonical_form(&tsc_payload()),
            r#"{"engine_rpm":3000,"shaft_rpm":100,"gear":1}"#
        );
        assert_eq!(canonical_form(&Payload::new()), "{}");
    }

    #[test]
    fn test_compute_golden_values() {
        assert_eq!(compute(&tsc_payload()), 214);
        assert_eq!(compute(&Payload::new()), 248);
        let brakes = Payload::new().with("left_brake", 12.5).with("right_brake", 40.0);
        assert_eq!(canonical_form(&brakes), r#"{"left_brake":12.5,"right_brake":40.0}"#);
        assert_eq!(compute(&brakes), 57);
    }

    #[test]
    fn test_floats_rounded_before_summing() {
        let precise = Payload::new().with("velocity", 3.14159);
        let rounded = Payload::new().with("velocity", 3.14);
        assert_eq!(canonical_form(&precise), r#"{"velocity":3.14}"#);
        assert_eq!(compute(&precise), 171);
        assert_eq!(compute(&precise), compute(&rounded));
    }

    #[test]
    fn test_rounding_uses_exact_binary_value() {
        // Each sits just below the halfway point once stored as a double
        let cases = [(0.015, "0.01"), (0.045, "0.04"), (1.005, "1.0"), (0.155, "0.15")];
        for (value, expected) in cases {
            let payload = Payload::new().with("velocity", value);
            assert_eq!(
                canonical_form(&payload),
                format!(r#"{{"velocity":{}}}"#, expected),
                "rounding {}",
                value
            );
        }
        assert_eq!(round_to(2.675, FLOAT_DECIMALS), 2.67);
        assert_eq!(round_to(0.075, FLOAT_DECIMALS), 0.07);
    }

    #[test]
    fn test_exact_ties_round_away_from_zero() {
        assert_eq!(round_to(0.125, FLOAT_DECIMALS), 0.13);
        assert_eq!(round_to(-0.125, FLOAT_DECIMALS), -0.13);
        assert_eq!(round_to(0.375, FLOAT_DECIMALS), 0.38);
        assert_eq!(round_to(2.5, 0), 3.0);
        assert_eq!(round_to(-0.5, 0), -1.0);
        assert_eq!(round_to(12.5, FLOAT_DECIMALS), 12.5);
        assert!(round_to(f64::NAN, FLOAT_DECIMALS).is_nan());
        assert_eq!(round_to(f64::INFINITY, FLOAT_DECIMALS), f64::INFINITY);
    }

    #[test]
    fn test_integers_not_printed_as_floats() {
        let int = Payload::new().with("gear", 3);
        let float = Payload::new().with("gear", 3.0);
        assert_eq!(canonical_form(&int), r#"{"gear":3}"#);
        assert_eq!(canonical_form(&float), r#"{"gear":3.0}"#);
        assert_ne!(compute(&int), compute(&float));
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e15), "1000000000000000.0");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e17), "1.5e+17");
        assert_eq!(format_float(0.00001), "1e-05");
    }

    #[test]
    fn test_strings_lose_spaces_and_single_quotes() {
        let payload = Payload::new().with("mode", "it's on");
        assert_eq!(canonical_form(&payload), r#"{"mode":"it"son"}"#);
    }

    #[test]
    fn test_strings_render_plain_without_prefix_or_escapes() {
        let payload = Payload::new().with("note", "café");
        assert_eq!(canonical_form(&payload), "{\"note\":\"café\"}");
        assert_eq!(
            canonical_form(&Payload::new().with("path", "a\\b")),
            r#"{"path":"a\\b"}"#
        );
    }

    #[test]
    fn test_key_order_does_not_change_checksum() {
        let reordered = Payload::new()
            .with("gear", 1)
            .with("engine_rpm", 3000)
            .with("shaft_rpm", 100);
        assert_eq!(compute(&reordered), compute(&tsc_payload()));
    }

    #[test]
    fn test_validate() {
        let payload = tsc_payload();
        let good = i64::from(compute(&payload));
        assert!(validate(&payload, good));
        assert!(!validate(&payload, (good + 1) % 256));
        assert!(!validate(&payload, good + 256));
        assert!(!validate(&payload, -1));
    }

    #[test]
    fn test_compute_is_deterministic() {
        let payload = Payload::new()
            .with("ballast_position", 55.555)
            .with("ballast_state", 2)
            .with("motor_temp", 81.0);
        let first = compute(&payload);
        for _ in 0..10 {
            assert_eq!(compute(&payload), first);
        }
    }
}
