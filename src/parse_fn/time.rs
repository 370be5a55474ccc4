use chrono::NaiveTime;

/// Parses a time-only value, `HH:MM:SS` with optional subseconds.
pub fn time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S") {
        return Some(t);
    }
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok()
}
