use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn dms_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)^\s*(\d+(?:\.\d+)?)\s*deg\s*(?:(\d+(?:\.\d+)?)'\s*)?(?:(\d+(?:\.\d+)?)"\s*)?([NSEW])?\s*$"#,
        )
        .expect("dms pattern")
    })
}

/// Parses one GPS coordinate: a JSON number, a decimal string
/// (optionally with a trailing hemisphere letter), or ExifTool's
/// `37 deg 14' 21.60" N` rendering.
pub fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => coordinate_str(s),
        _ => None,
    }
}

fn coordinate_str(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<f64>() {
        return Some(v);
    }

    // "12.5 N" / "4.2 W"
    if let Some((num, hemi)) = s.rsplit_once(char::is_whitespace) {
        if hemi.len() == 1 {
            if let Ok(v) = num.trim().parse::<f64>() {
                return Some(apply_hemisphere(v, hemi.chars().next()?));
            }
        }
    }

    let caps = dms_re().captures(s)?;
    let degrees: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps.get(2).map_or(Ok(0.0), |m| m.as_str().parse()).ok()?;
    let seconds: f64 = caps.get(3).map_or(Ok(0.0), |m| m.as_str().parse()).ok()?;
    let value = degrees + minutes / 60.0 + seconds / 3600.0;
    match caps.get(4) {
        Some(h) => Some(apply_hemisphere(value, h.as_str().chars().next()?)),
        None => Some(value),
    }
}

pub fn apply_hemisphere(value: f64, hemisphere: char) -> f64 {
    match hemisphere.to_ascii_uppercase() {
        'S' | 'W' => -value.abs(),
        _ => value.abs(),
    }
}

/// The domain validity rule: coordinates must be in range, and the
/// all-zero pair is the "no fix" sentinel many devices write.
pub fn valid_pair(lat: f64, lon: f64) -> bool {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return false;
    }
    !(lat.abs() < 1e-6 && lon.abs() < 1e-6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_and_decimal_strings() {
        assert_eq!(coordinate(&json!(52.37403)), Some(52.37403));
        assert_eq!(coordinate(&json!("-122.41942")), Some(-122.41942));
    }

    #[test]
    fn dms_with_hemisphere() {
        let v = coordinate(&json!(r#"37 deg 14' 21.60" N"#)).unwrap();
        assert!((v - 37.2393).abs() < 1e-3);

        let w = coordinate(&json!(r#"122 deg 25' 9.91" W"#)).unwrap();
        assert!(w < 0.0);
    }

    #[test]
    fn hemisphere_suffix_on_decimal() {
        assert_eq!(coordinate(&json!("12.5 S")), Some(-12.5));
    }

    #[test]
    fn zero_pair_is_invalid() {
        assert!(!valid_pair(0.0, 0.0));
        assert!(valid_pair(0.0, 4.9));
        assert!(!valid_pair(91.0, 0.0));
        assert!(!valid_pair(12.0, 181.0));
        assert!(valid_pair(52.37, 4.89));
    }
}
