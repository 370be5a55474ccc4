use std::sync::OnceLock;

use regex::Regex;

use crate::value::BinaryMarker;

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\(Binary data (\d+) bytes, use -b option to extract\)$")
            .expect("binary marker pattern")
    })
}

/// Recognizes the placeholder ExifTool substitutes for binary blobs.
pub fn binary(s: &str) -> Option<BinaryMarker> {
    let caps = marker_re().captures(s.trim())?;
    let bytes = caps[1].parse::<u64>().ok()?;
    Some(BinaryMarker { bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_is_recognized() {
        let m = binary("(Binary data 2506078 bytes, use -b option to extract)").unwrap();
        assert_eq!(m.bytes, 2506078);
    }

    #[test]
    fn plain_text_is_not_a_marker() {
        assert!(binary("Binary data").is_none());
        assert!(binary("(Binary data x bytes, use -b option to extract)").is_none());
    }
}
