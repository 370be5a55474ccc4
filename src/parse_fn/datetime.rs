use chrono::{DateTime, FixedOffset, NaiveDateTime};

/// Parses ExifTool's datetime dialect: `YYYY:mm:dd HH:MM:SS`, optional
/// subseconds, optional `±HH:MM` / `±HHMM` offset or trailing `Z`.
///
/// Returns the wall-clock time plus the offset when one was written.
pub fn datetime(s: &str) -> Option<(NaiveDateTime, Option<FixedOffset>)> {
    let s = s.trim();

    // Offset with colon, e.g. +03:00
    if let Ok(zoned) = DateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S%.f%:z") {
        return Some((zoned.naive_local(), Some(*zoned.offset())));
    }
    if let Ok(zoned) = DateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S%:z") {
        return Some((zoned.naive_local(), Some(*zoned.offset())));
    }
    // Compact offset, e.g. +0300
    if let Ok(zoned) = DateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S%.f%#z") {
        return Some((zoned.naive_local(), Some(*zoned.offset())));
    }
    if let Ok(zoned) = DateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S%#z") {
        return Some((zoned.naive_local(), Some(*zoned.offset())));
    }
    // Literal Z suffix, common in video containers
    if let Some(stripped) = s.strip_suffix('Z') {
        if let Ok(naive) = NaiveDateTime::parse_from_str(stripped.trim(), "%Y:%m:%d %H:%M:%S%.f") {
            return Some((naive, Some(FixedOffset::east_opt(0)?)));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(stripped.trim(), "%Y:%m:%d %H:%M:%S") {
            return Some((naive, Some(FixedOffset::east_opt(0)?)));
        }
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S%.f") {
        return Some((naive, None));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S") {
        return Some((naive, None));
    }

    None
}
