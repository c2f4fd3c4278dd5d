//! Numeric canonicalization
//!
//! Engines disagree on whether `80` is an integer or a float. Every value
//! crossing the host boundary goes through [`canonicalize`] so the same
//! template produces identical JSON whichever engine ran it.

use serde_json::{Number, Value};

/// Bounds of the floats that convert losslessly to `i64`
const I64_MIN_F: f64 = -9_223_372_036_854_775_808.0;
const I64_MAX_F: f64 = 9_223_372_036_854_775_808.0;

/// Rewrite integral floats (e.g. `80.0`) as integers, recursively
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(canonical_number(n)),
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect()),
        other => other,
    }
}

fn canonical_number(n: Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n;
    }
    match n.as_f64() {
        #[allow(clippy::cast_possible_truncation, reason = "fraction and range are checked")]
        Some(f) if f.fract() == 0.0 && (I64_MIN_F..I64_MAX_F).contains(&f) => Number::from(f as i64),
        _ => n,
    }
}
