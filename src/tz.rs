//! Timezone inference for one file's tag bag.
//!
//! A file rarely states its zone outright; the cascade in [`infer`]
//! tries a fixed list of increasingly desperate sources and keeps the
//! first that yields one. The result is computed at most once per read
//! task and applied to every date-time decoded for that file.

use std::collections::BTreeMap;

use chrono::{FixedOffset, NaiveDateTime};
use serde_json::Value;

use crate::options::ExifPipeOptions;
use crate::parse_fn;
use crate::value::format_offset;

/// A zone the cascade settled on: a display identifier plus the UTC
/// offset that applies at the file's capture instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedZone {
    pub name: String,
    pub offset: FixedOffset,
}

impl ResolvedZone {
    pub fn utc() -> Self {
        Self {
            name: "UTC".to_string(),
            offset: FixedOffset::east_opt(0).expect("zero offset"),
        }
    }

    pub fn from_offset(offset: FixedOffset) -> Self {
        if offset.local_minus_utc() == 0 {
            return Self::utc();
        }
        Self {
            name: format_offset(&offset),
            offset,
        }
    }
}

/// A resolved zone plus the tag or heuristic that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TzSrc {
    pub zone: ResolvedZone,
    pub src: String,
}

/// Coordinate-to-zone lookup, supplied by the embedding application.
/// Evaluating a timezone database is outside this crate.
pub trait TzResolver {
    /// Zone containing the coordinate pair.
    fn zone_at(&self, lat: f64, lon: f64) -> Option<ResolvedZone>;

    /// Offset for a named zone (e.g. an IANA identifier the worker's
    /// geolocation API emitted), when the implementation knows it.
    fn zone_named(&self, name: &str) -> Option<ResolvedZone> {
        let _ = name;
        None
    }
}

/// Timezone-bearing tags, in trust order.
const EXPLICIT_TZ_TAGS: &[&str] = &[
    "TimeZone",
    "OffsetTime",
    "OffsetTimeOriginal",
    "OffsetTimeDigitized",
    "TimeZoneOffset",
];

/// Tags holding the capture instant in UTC.
const UTC_STAMP_TAGS: &[&str] = &["GPSDateTime", "DateTimeUTC", "SonyDateTime2"];

/// Tags holding the capture instant in local wall-clock time.
const LOCAL_STAMP_TAGS: &[&str] = &[
    "SubSecDateTimeOriginal",
    "DateTimeOriginal",
    "SubSecCreateDate",
    "CreateDate",
    "SubSecMediaCreateDate",
    "MediaCreateDate",
    "DateTimeCreated",
];

/// Last-resort tags whose value embeds an offset suffix.
const STAMP_WITH_OFFSET_TAGS: &[&str] = &["TimeStamp", "CreationDate"];

const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Runs the cascade over the (degrouped) raw tag bag.
///
/// `gps` carries coordinates that already passed the validity rule.
/// Lookup failures are recorded in `warnings` and the cascade moves on.
pub fn infer(
    bag: &BTreeMap<String, Value>,
    gps: Option<(f64, f64)>,
    is_video: bool,
    options: &ExifPipeOptions,
    resolver: Option<&dyn TzResolver>,
    warnings: &mut Vec<String>,
) -> Option<TzSrc> {
    if options.prefer_timezone_from_gps {
        if let Some(found) = from_gps(bag, gps, resolver, warnings) {
            return Some(found);
        }
    }

    if let Some(found) = from_explicit_tags(bag) {
        return Some(found);
    }

    if !options.prefer_timezone_from_gps {
        if let Some(found) = from_gps(bag, gps, resolver, warnings) {
            return Some(found);
        }
    }

    if let Some(found) = from_stamp_delta(bag) {
        return Some(found);
    }

    if is_video && options.default_videos_to_utc {
        return Some(TzSrc {
            zone: ResolvedZone::utc(),
            src: "defaultVideosToUTC".to_string(),
        });
    }

    if let Some(value) = bag.get("UTCOffset") {
        if let Some(offset) = parse_offset_value(value) {
            return Some(TzSrc {
                zone: ResolvedZone::from_offset(offset),
                src: "UTCOffset".to_string(),
            });
        }
    }

    from_stamp_suffix(bag)
}

fn from_explicit_tags(bag: &BTreeMap<String, Value>) -> Option<TzSrc> {
    for tag in EXPLICIT_TZ_TAGS {
        let Some(value) = bag.get(*tag) else { continue };
        if let Some(offset) = parse_offset_value(value) {
            return Some(TzSrc {
                zone: ResolvedZone::from_offset(offset),
                src: (*tag).to_string(),
            });
        }
    }
    None
}

fn from_gps(
    bag: &BTreeMap<String, Value>,
    gps: Option<(f64, f64)>,
    resolver: Option<&dyn TzResolver>,
    warnings: &mut Vec<String>,
) -> Option<TzSrc> {
    // The worker's own geolocation result wins over a fresh lookup.
    if let Some(Value::String(name)) = bag.get("GeolocationTimeZone") {
        if let Some(zone) = resolver.and_then(|r| r.zone_named(name)) {
            return Some(TzSrc {
                zone,
                src: "GeolocationTimeZone".to_string(),
            });
        }
        if let Some(offset) = parse_offset_str(name) {
            return Some(TzSrc {
                zone: ResolvedZone {
                    name: name.clone(),
                    offset,
                },
                src: "GeolocationTimeZone".to_string(),
            });
        }
    }

    let (lat, lon) = gps?;
    let resolver = resolver?;
    match resolver.zone_at(lat, lon) {
        Some(zone) => Some(TzSrc {
            zone,
            src: "GPSLatitude/GPSLongitude".to_string(),
        }),
        None => {
            warnings.push(format!(
                "timezone lookup failed for GPS coordinates ({lat}, {lon})"
            ));
            None
        }
    }
}

/// The arithmetic difference between a local and a UTC datestamp of the
/// same instant implies the offset, modulo clock skew. Rounded to the
/// nearest 15 minutes since real offsets are quantized.
fn from_stamp_delta(bag: &BTreeMap<String, Value>) -> Option<TzSrc> {
    let (utc_tag, utc_stamp) = first_stamp(bag, UTC_STAMP_TAGS)?;
    let (local_tag, local_stamp) = first_stamp(bag, LOCAL_STAMP_TAGS)?;

    let delta = local_stamp.signed_duration_since(utc_stamp).num_minutes() as i32;
    let rounded = ((delta as f64) / 15.0).round() as i32 * 15;
    if rounded.abs() > MAX_OFFSET_MINUTES {
        return None;
    }
    let offset = FixedOffset::east_opt(rounded * 60)?;
    Some(TzSrc {
        zone: ResolvedZone::from_offset(offset),
        src: format!("offset between {local_tag} and {utc_tag}"),
    })
}

fn from_stamp_suffix(bag: &BTreeMap<String, Value>) -> Option<TzSrc> {
    for tag in STAMP_WITH_OFFSET_TAGS {
        let Some(Value::String(s)) = bag.get(*tag) else {
            continue;
        };
        if let Some((_, Some(offset))) = parse_fn::datetime::datetime(s) {
            return Some(TzSrc {
                zone: ResolvedZone::from_offset(offset),
                src: (*tag).to_string(),
            });
        }
    }
    None
}

fn first_stamp(
    bag: &BTreeMap<String, Value>,
    candidates: &[&'static str],
) -> Option<(&'static str, NaiveDateTime)> {
    for tag in candidates {
        let Some(Value::String(s)) = bag.get(*tag) else {
            continue;
        };
        if let Some((naive, _)) = parse_fn::datetime::datetime(s) {
            return Some((*tag, naive));
        }
    }
    None
}

/// Parses an offset however the tag spells it: `+02:00`, `-0700`, `Z`,
/// `UTC+2`, a bare hour count, or an array whose first element is one.
pub fn parse_offset_value(value: &Value) -> Option<FixedOffset> {
    match value {
        Value::String(s) => parse_offset_str(s),
        Value::Number(n) => offset_from_hours(n.as_f64()?),
        // TimeZoneOffset is sometimes a pair; the first entry applies to
        // DateTimeOriginal.
        Value::Array(items) => parse_offset_value(items.first()?),
        _ => None,
    }
}

pub fn parse_offset_str(s: &str) -> Option<FixedOffset> {
    let mut t = s.trim();
    if t.is_empty() {
        return None;
    }
    if t.eq_ignore_ascii_case("z") || t.eq_ignore_ascii_case("utc") || t.eq_ignore_ascii_case("gmt")
    {
        return FixedOffset::east_opt(0);
    }
    for prefix in ["UTC", "GMT"] {
        if let Some(rest) = t.strip_prefix(prefix) {
            t = rest.trim();
        }
    }

    let (sign, digits) = match *t.as_bytes().first()? {
        b'+' => (1, &t[1..]),
        b'-' => (-1, &t[1..]),
        _ => (1, t),
    };

    // ±HH:MM and ±HHMM
    let (hours, minutes) = if let Some((h, m)) = digits.split_once(':') {
        (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?)
    } else if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        (digits[..2].parse().ok()?, digits[2..].parse().ok()?)
    } else {
        return offset_from_hours(sign as f64 * digits.parse::<f64>().ok()?);
    };

    let total = sign * (hours * 60 + minutes);
    if total.abs() > MAX_OFFSET_MINUTES || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(total * 60)
}

fn offset_from_hours(hours: f64) -> Option<FixedOffset> {
    let minutes = (hours * 60.0).round() as i32;
    if minutes.abs() > MAX_OFFSET_MINUTES {
        return None;
    }
    FixedOffset::east_opt(minutes * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedResolver(ResolvedZone);

    impl TzResolver for FixedResolver {
        fn zone_at(&self, _lat: f64, _lon: f64) -> Option<ResolvedZone> {
            Some(self.0.clone())
        }
    }

    struct FailingResolver;

    impl TzResolver for FailingResolver {
        fn zone_at(&self, _lat: f64, _lon: f64) -> Option<ResolvedZone> {
            None
        }
    }

    fn amsterdam() -> ResolvedZone {
        ResolvedZone {
            name: "Europe/Amsterdam".to_string(),
            offset: FixedOffset::east_opt(2 * 3600).unwrap(),
        }
    }

    fn bag(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn offset_spellings() {
        assert_eq!(
            parse_offset_str("+02:00").unwrap().local_minus_utc(),
            2 * 3600
        );
        assert_eq!(
            parse_offset_str("-0700").unwrap().local_minus_utc(),
            -7 * 3600
        );
        assert_eq!(parse_offset_str("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(
            parse_offset_str("UTC+2").unwrap().local_minus_utc(),
            2 * 3600
        );
        assert_eq!(
            parse_offset_value(&json!(-3.5)).unwrap().local_minus_utc(),
            -(3 * 3600 + 1800)
        );
        assert_eq!(
            parse_offset_value(&json!([10, 11])).unwrap().local_minus_utc(),
            10 * 3600
        );
        assert!(parse_offset_str("+25:00").is_none());
        assert!(parse_offset_str("tomorrow").is_none());
    }

    #[test]
    fn explicit_tag_beats_gps_when_preference_off() {
        let bag = bag(&[("OffsetTimeOriginal", json!("+03:00"))]);
        let options = ExifPipeOptions::default();
        let mut warnings = Vec::new();

        let found = infer(
            &bag,
            Some((52.37, 4.89)),
            false,
            &options,
            Some(&FixedResolver(amsterdam())),
            &mut warnings,
        )
        .unwrap();

        assert_eq!(found.src, "OffsetTimeOriginal");
        assert_eq!(found.zone.offset.local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn gps_preference_short_circuits() {
        let bag = bag(&[("OffsetTimeOriginal", json!("+03:00"))]);
        let options = ExifPipeOptions {
            prefer_timezone_from_gps: true,
            ..Default::default()
        };
        let mut warnings = Vec::new();

        let found = infer(
            &bag,
            Some((52.37, 4.89)),
            false,
            &options,
            Some(&FixedResolver(amsterdam())),
            &mut warnings,
        )
        .unwrap();

        assert_eq!(found.src, "GPSLatitude/GPSLongitude");
        assert_eq!(found.zone.name, "Europe/Amsterdam");
    }

    #[test]
    fn failed_lookup_warns_and_falls_through() {
        let bag = bag(&[
            ("GPSDateTime", json!("2020:01:01 08:00:00Z")),
            ("DateTimeOriginal", json!("2020:01:01 10:00:02")),
        ]);
        let options = ExifPipeOptions::default();
        let mut warnings = Vec::new();

        let found = infer(
            &bag,
            Some((52.37, 4.89)),
            false,
            &options,
            Some(&FailingResolver),
            &mut warnings,
        )
        .unwrap();

        assert_eq!(warnings.len(), 1);
        assert_eq!(found.src, "offset between DateTimeOriginal and GPSDateTime");
        assert_eq!(found.zone.offset.local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn video_defaults_to_utc() {
        let bag = BTreeMap::new();
        let options = ExifPipeOptions::default();
        let mut warnings = Vec::new();

        let found = infer(&bag, None, true, &options, None, &mut warnings).unwrap();
        assert_eq!(found.src, "defaultVideosToUTC");
        assert_eq!(found.zone.name, "UTC");

        let none = infer(&bag, None, false, &options, None, &mut warnings);
        assert!(none.is_none());
    }

    #[test]
    fn stamp_suffix_is_last_resort() {
        let bag = bag(&[("TimeStamp", json!("2020:05:05 12:00:00+05:30"))]);
        let options = ExifPipeOptions::default();
        let mut warnings = Vec::new();

        let found = infer(&bag, None, false, &options, None, &mut warnings).unwrap();
        assert_eq!(found.src, "TimeStamp");
        assert_eq!(found.zone.offset.local_minus_utc(), 5 * 3600 + 1800);
    }
}
