use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::tz::TzSrc;

/// Placeholder for a value ExifTool elided as an opaque binary blob,
/// e.g. `(Binary data 2506078 bytes, use -b option to extract)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMarker {
    pub bytes: u64,
}

/// A date-and-time tag value in ExifTool's dialect, with whatever zone
/// information could be established for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExifDateTime {
    /// Wall-clock time as written in the tag.
    pub datetime: NaiveDateTime,
    /// UTC offset, if explicit in the raw text or inferred later.
    pub offset: Option<FixedOffset>,
    /// Zone identifier when one is known (`UTC`, `+02:00`, an IANA name
    /// from geolocation).
    pub zone_name: Option<String>,
    /// Which tag or heuristic supplied the zone.
    pub tz_source: Option<String>,
    /// True when the offset was not present in the raw text.
    pub inferred_zone: bool,
    /// The tag text exactly as the worker emitted it.
    pub raw: String,
}

impl ExifDateTime {
    pub(crate) fn new(datetime: NaiveDateTime, offset: Option<FixedOffset>, raw: &str) -> Self {
        Self {
            datetime,
            offset,
            zone_name: offset.map(|o| format_offset(&o)),
            tz_source: None,
            inferred_zone: offset.is_none(),
            raw: raw.to_string(),
        }
    }

    /// The absolute instant, when the offset is known.
    pub fn to_fixed(&self) -> Option<DateTime<FixedOffset>> {
        let offset = self.offset?;
        offset.from_local_datetime(&self.datetime).single()
    }

    /// Re-express the value in `offset`, keeping the same absolute
    /// instant. No-op on zoneless values.
    pub(crate) fn rewrite_offset(&mut self, offset: FixedOffset, zone_name: &str, source: &str) {
        if let Some(fixed) = self.to_fixed() {
            let shifted = fixed.with_timezone(&offset);
            self.datetime = shifted.naive_local();
        }
        self.offset = Some(offset);
        self.zone_name = Some(zone_name.to_string());
        self.tz_source = Some(source.to_string());
    }

    /// Render in ExifTool's `YYYY:mm:dd HH:MM:SS[.fff][±HH:MM]` format.
    pub fn format_exiftool(&self) -> String {
        let mut out = self.datetime.format("%Y:%m:%d %H:%M:%S%.f").to_string();
        if let Some(offset) = self.offset {
            out.push_str(&format_offset(&offset));
        }
        out
    }
}

pub(crate) fn format_offset(offset: &FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let abs = secs.abs();
    format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

/// One decoded tag value.
///
/// Every value the worker can emit is classified into exactly one
/// variant at decode time; `Raw` is the pass-through for values no
/// richer rule applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(ExifDateTime),
    Binary(BinaryMarker),
    List(Vec<TagValue>),
    Struct(BTreeMap<String, TagValue>),
    Raw(serde_json::Value),
}

impl TagValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Text(s) => Some(s),
            TagValue::Raw(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Number(n) => n.as_f64(),
            TagValue::Raw(serde_json::Value::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&ExifDateTime> {
        match self {
            TagValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub(crate) fn from_number(f: f64) -> TagValue {
        match serde_json::Number::from_f64(f) {
            Some(n) => TagValue::Number(n),
            None => TagValue::Raw(serde_json::Value::Null),
        }
    }
}

/// The decoded result of one read task.
#[derive(Debug, Clone, Default)]
pub struct TagRecord {
    /// Absolute path of the file the reply describes. Set once from the
    /// reply's `SourceFile`, after it passed the integrity check.
    pub source_file: PathBuf,
    pub tags: BTreeMap<String, TagValue>,
    /// Errors the worker reported for the file (its `Error` key).
    pub errors: Vec<String>,
    /// Everything recovered from during decode: bad leaves, stderr
    /// diagnostics, downgraded zone-lookup failures.
    pub warnings: Vec<String>,
    /// The cascade's zone decision for this file, when one was reached.
    pub tz: Option<TzSrc>,
}

impl TagRecord {
    pub fn get(&self, tag: &str) -> Option<&TagValue> {
        self.tags.get(tag)
    }
}
