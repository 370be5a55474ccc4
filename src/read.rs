//! Read task: builds the JSON read command and decodes one reply into
//! a typed [`TagRecord`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ExifPipeError;
use crate::options::ExifPipeOptions;
use crate::parse_fn;
use crate::tz::{self, TzResolver, TzSrc};
use crate::value::{ExifDateTime, TagRecord, TagValue};

/// Tag names that merely contain date/time-ish substrings; their values
/// are display formats or version strings, never instants.
const PASSTHROUGH_TAGS: &[&str] = &[
    "ExifToolVersion",
    "DateStampMode",
    "Sharpness",
    "Firmware",
    "DateDisplayFormat",
];

fn temporal_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)when|date|time|subsec|creat|modif").expect("name pattern"))
}

/// Tags whose instants are defined to be UTC regardless of any zone the
/// file claims elsewhere.
fn is_utc_tag(name: &str) -> bool {
    name.starts_with("GPS") || name.contains("UTC")
}

fn is_gps_family(name: &str) -> bool {
    name.starts_with("GPS") || name.starts_with("Geolocation")
}

/// Path separators normalized for comparison; the worker echoes paths
/// in platform style.
fn normalize_path(p: &str) -> String {
    p.replace('\\', "/")
}

fn degroup(key: &str) -> &str {
    key.rsplit(':').next().unwrap_or(key)
}

/// Coordinates pulled out of the raw bag, once per task.
#[derive(Debug, Clone, Copy, Default)]
struct GpsExtraction {
    present: bool,
    valid: bool,
    lat: f64,
    lon: f64,
}

impl GpsExtraction {
    fn from_bag(bag: &BTreeMap<String, Value>) -> Self {
        let lat = bag
            .get("GPSLatitude")
            .and_then(parse_fn::gps::coordinate)
            .map(|v| apply_ref(v, bag.get("GPSLatitudeRef")));
        let lon = bag
            .get("GPSLongitude")
            .and_then(parse_fn::gps::coordinate)
            .map(|v| apply_ref(v, bag.get("GPSLongitudeRef")));

        match (lat, lon) {
            (Some(lat), Some(lon)) => Self {
                present: true,
                valid: parse_fn::gps::valid_pair(lat, lon),
                lat,
                lon,
            },
            _ => Self::default(),
        }
    }

    fn coordinates(&self) -> Option<(f64, f64)> {
        self.valid.then_some((self.lat, self.lon))
    }
}

fn apply_ref(value: f64, reference: Option<&Value>) -> f64 {
    let Some(Value::String(r)) = reference else {
        return value;
    };
    match r.trim().chars().next() {
        Some(h) => parse_fn::gps::apply_hemisphere(value, h),
        None => value,
    }
}

/// One file's read request plus its decode configuration.
pub struct ReadTask<'a> {
    path: &'a Path,
    options: &'a ExifPipeOptions,
    resolver: Option<&'a dyn TzResolver>,
}

impl<'a> ReadTask<'a> {
    pub fn new(
        path: &'a Path,
        options: &'a ExifPipeOptions,
        resolver: Option<&'a dyn TzResolver>,
    ) -> Self {
        Self {
            path,
            options,
            resolver,
        }
    }

    /// The worker argument list for this read. Configuration flags come
    /// first, the target path last.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-json".to_string()];
        if self.options.expand_structs {
            args.push("-struct".to_string());
        }
        if self.options.group_prefixes {
            args.push("-G".to_string());
        }
        args.push("-coordFormat".to_string());
        args.push("%.6f".to_string());
        args.push("-fast".to_string());
        for tag in &self.options.numeric_tags {
            args.push(format!("-{tag}#"));
        }
        if self.options.geolocation {
            args.push("-api".to_string());
            args.push("geolocation".to_string());
        }
        if let Some(hash) = self.options.image_hash_type {
            args.push("-api".to_string());
            args.push(format!("imagehashtype={}", hash.api_value()));
            args.push("-ImageDataHash".to_string());
        }
        args.push(self.path.to_string_lossy().into_owned());
        args
    }

    /// Decodes the worker's reply text. `stream_warnings` are the
    /// stderr lines the supervisor attributed to this command.
    pub fn decode(
        &self,
        reply: &str,
        stream_warnings: Vec<String>,
    ) -> Result<TagRecord, ExifPipeError> {
        let parsed: Value = serde_json::from_str(reply)?;
        let element = match parsed {
            Value::Array(mut items) if items.len() == 1 => items.remove(0),
            _ => {
                return Err(ExifPipeError::UnexpectedFormat {
                    path: self.path.to_string_lossy().into_owned(),
                    command_args: self.args().join(" "),
                })
            }
        };
        let Value::Object(map) = element else {
            return Err(ExifPipeError::UnexpectedFormat {
                path: self.path.to_string_lossy().into_owned(),
                command_args: self.args().join(" "),
            });
        };

        // Integrity first: a reply about some other file means the
        // request/reply queue desynchronized. Hard failure, always.
        let requested = normalize_path(&self.path.to_string_lossy());
        let got = map
            .get("SourceFile")
            .and_then(Value::as_str)
            .map(normalize_path)
            .unwrap_or_default();
        if got != requested {
            return Err(ExifPipeError::SourceFileMismatch {
                expected: requested,
                got,
            });
        }

        let mut record = TagRecord {
            source_file: self.path.to_path_buf(),
            ..Default::default()
        };
        record.warnings = stream_warnings;

        // Degrouped view for cross-tag lookups; the record itself keeps
        // the keys as the worker wrote them.
        let bag: BTreeMap<String, Value> = map
            .iter()
            .filter(|(k, _)| k.as_str() != "SourceFile")
            .map(|(k, v)| (degroup(k).to_string(), v.clone()))
            .collect();

        let gps = GpsExtraction::from_bag(&bag);
        let is_video = bag
            .get("MIMEType")
            .and_then(Value::as_str)
            .is_some_and(|m| m.starts_with("video/"));

        let tz = tz::infer(
            &bag,
            gps.coordinates(),
            is_video,
            self.options,
            self.resolver,
            &mut record.warnings,
        );

        let ctx = DecodeCtx {
            tz: tz.as_ref(),
            utc_default: is_video && self.options.default_videos_to_utc,
            backfill: self.options.backfill_timezones,
        };

        for (key, value) in &map {
            let name = degroup(key);
            match name {
                "SourceFile" => continue,
                "Error" => {
                    if let Some(s) = value.as_str() {
                        record.errors.push(s.to_string());
                    }
                    continue;
                }
                "Warning" => {
                    if let Some(s) = value.as_str() {
                        record.warnings.push(s.to_string());
                    }
                    continue;
                }
                _ => {}
            }

            if is_gps_family(name) {
                // A degenerate fix must not surface as a reading at
                // (0,0); drop the whole family.
                if gps.present && !gps.valid {
                    continue;
                }
                if gps.valid {
                    if name == "GPSLatitude" {
                        record.tags.insert(key.clone(), TagValue::from_number(gps.lat));
                        continue;
                    }
                    if name == "GPSLongitude" {
                        record.tags.insert(key.clone(), TagValue::from_number(gps.lon));
                        continue;
                    }
                }
            }

            if let Some(decoded) = decode_value(name, key, value, &ctx, &mut record.warnings) {
                record.tags.insert(key.clone(), decoded);
            }
        }

        record.tz = tz;
        Ok(record)
    }
}

struct DecodeCtx<'a> {
    tz: Option<&'a TzSrc>,
    utc_default: bool,
    backfill: bool,
}

/// Decodes one value; `name` is the (degrouped) leaf tag name driving
/// the heuristics, `path` the dotted location used in warnings.
fn decode_value(
    name: &str,
    path: &str,
    value: &Value,
    ctx: &DecodeCtx<'_>,
    warnings: &mut Vec<String>,
) -> Option<TagValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(TagValue::Bool(*b)),
        Value::Number(n) => Some(TagValue::Number(n.clone())),
        Value::String(s) => decode_scalar(name, path, s, ctx, warnings),
        Value::Array(items) => {
            let decoded = items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| {
                    decode_value(name, &format!("{path}.{i}"), item, ctx, warnings)
                })
                .collect();
            Some(TagValue::List(decoded))
        }
        Value::Object(map) => {
            let mut decoded = BTreeMap::new();
            for (k, v) in map {
                if let Some(inner) = decode_value(k, &format!("{path}.{k}"), v, ctx, warnings) {
                    decoded.insert(k.clone(), inner);
                }
            }
            Some(TagValue::Struct(decoded))
        }
    }
}

fn decode_scalar(
    name: &str,
    path: &str,
    raw: &str,
    ctx: &DecodeCtx<'_>,
    warnings: &mut Vec<String>,
) -> Option<TagValue> {
    if PASSTHROUGH_TAGS.contains(&name) {
        return Some(TagValue::Text(raw.to_string()));
    }
    if parse_fn::sentinel::nullish(raw) {
        return None;
    }
    if let Some(marker) = parse_fn::binary::binary(raw) {
        return Some(TagValue::Binary(marker));
    }
    if name.ends_with("Valid") {
        if let Some(b) = parse_fn::boolean::boolean(raw) {
            return Some(TagValue::Bool(b));
        }
    }

    if temporal_name_re().is_match(name) {
        // All-zero stamps are placeholders the camera never filled in.
        if parse_fn::sentinel::zeroish(raw) {
            return Some(TagValue::Text(raw.to_string()));
        }
        if let Some((naive, offset)) = parse_fn::datetime::datetime(raw) {
            let mut dt = ExifDateTime::new(naive, offset, raw);
            attach_zone(name, &mut dt, ctx);
            return Some(TagValue::DateTime(dt));
        }
        if let Some(t) = parse_fn::time::time(raw) {
            return Some(TagValue::Time(t));
        }
        if let Some(d) = parse_fn::date::date(raw) {
            return Some(TagValue::Date(d));
        }
        warnings.push(format!("unparseable {path} value kept as text: {raw:?}"));
    }

    Some(TagValue::Text(raw.to_string()))
}

/// Zone attachment rules for a decoded date-time, in order: inherently
/// UTC tags and UTC-defaulted files force UTC, then the cascade result
/// backfills zoneless values, then the video rewrite corrects values
/// whose UTC zone was itself only inferred.
fn attach_zone(name: &str, dt: &mut ExifDateTime, ctx: &DecodeCtx<'_>) {
    let utc_tag = is_utc_tag(name);

    if dt.offset.is_none() {
        if utc_tag {
            force_utc(dt, name);
        } else if ctx.utc_default {
            force_utc(dt, "defaultVideosToUTC");
        } else if ctx.backfill {
            if let Some(tz) = ctx.tz {
                dt.offset = Some(tz.zone.offset);
                dt.zone_name = Some(tz.zone.name.clone());
                dt.tz_source = Some(tz.src.clone());
            }
        }
    } else if dt.tz_source.is_none() {
        dt.tz_source = Some(name.to_string());
    }

    // Zoneless video stamps are really UTC wall clocks; once read as
    // UTC, re-express them in the file's actual zone.
    if dt.inferred_zone && ctx.utc_default && !utc_tag {
        if let Some(tz) = ctx.tz {
            if Some(tz.zone.offset) != dt.offset {
                dt.rewrite_offset(tz.zone.offset, &tz.zone.name, &tz.src);
            }
        }
    }
}

fn force_utc(dt: &mut ExifDateTime, source: &str) {
    dt.offset = chrono::FixedOffset::east_opt(0);
    dt.zone_name = Some("UTC".to_string());
    dt.tz_source = Some(source.to_string());
}
