use chrono::NaiveDate;

/// Parses a date-only value, `YYYY:mm:dd`.
pub fn date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y:%m:%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_date() {
        assert_eq!(
            date("2021:07:04"),
            NaiveDate::from_ymd_opt(2021, 7, 4)
        );
    }

    #[test]
    fn rejects_datetime_and_garbage() {
        assert!(date("2021:07:04 10:00:00").is_none());
        assert!(date("July 4th").is_none());
    }
}
