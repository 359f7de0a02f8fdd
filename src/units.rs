// SPDX-License-Identifier: Apache-2.0

//! Unit scale factors for the input formats.
//!
//! Internally everything is kept in ns, pF and kOhm so that `kOhm * pF = ns`
//! and the Elmore term needs no conversion.

pub const PS_TO_NS: f64 = 1e-3;

/// Splits a unit string like `"1ns"`, `"10 ps"` or `"1.0e-3 pf"` into its
/// numeric prefix and (lowercased) suffix.
fn split_magnitude(text: &str) -> Option<(f64, String)> {
    let text = text.trim().trim_matches('"');
    let split_at = text
        .char_indices()
        .find(|(_, c)| c.is_ascii_alphabetic() && *c != 'e' && *c != 'E')
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let (num, suffix) = text.split_at(split_at);
    let num = num.trim();
    let magnitude = if num.is_empty() {
        1.0
    } else {
        num.parse::<f64>().ok()?
    };
    Some((magnitude, suffix.trim().to_ascii_lowercase()))
}

/// Returns the multiplier that converts a value in `unit` to ns.
pub fn parse_time_unit(unit: &str) -> Option<f64> {
    let (magnitude, suffix) = split_magnitude(unit)?;
    let to_ns = match suffix.as_str() {
        "s" => 1e9,
        "ms" => 1e6,
        "us" => 1e3,
        "ns" => 1.0,
        "ps" => 1e-3,
        "fs" => 1e-6,
        _ => return None,
    };
    Some(magnitude * to_ns)
}

/// Returns the multiplier that converts a value in `unit` to pF.
pub fn parse_capacitance_unit(unit: &str) -> Option<f64> {
    let (magnitude, suffix) = split_magnitude(unit)?;
    let to_pf = match suffix.as_str() {
        "f" => 1e12,
        "uf" => 1e6,
        "nf" => 1e3,
        "pf" => 1.0,
        "ff" => 1e-3,
        _ => return None,
    };
    Some(magnitude * to_pf)
}

/// Returns the multiplier that converts a value in `unit` to kOhm.
pub fn parse_resistance_unit(unit: &str) -> Option<f64> {
    let (magnitude, suffix) = split_magnitude(unit)?;
    let to_kohm = match suffix.as_str() {
        "ohm" => 1e-3,
        "kohm" => 1.0,
        "mohm" => 1e3,
        _ => return None,
    };
    Some(magnitude * to_kohm)
}
