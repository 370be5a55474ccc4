/// ExifTool renders missing values as these literals.
pub fn nullish(s: &str) -> bool {
    let t = s.trim();
    t.eq_ignore_ascii_case("undef")
        || t.eq_ignore_ascii_case("null")
        || t.eq_ignore_ascii_case("undefined")
}

/// True when every digit in the value is zero, e.g. `"00"` or
/// `"0000:00:00 00:00:00"`. Such values are placeholders, not times.
pub fn zeroish(s: &str) -> bool {
    let mut saw_digit = false;
    for c in s.chars() {
        if c.is_ascii_digit() {
            if c != '0' {
                return false;
            }
            saw_digit = true;
        }
    }
    saw_digit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullish_is_case_and_space_insensitive() {
        assert!(nullish("undef"));
        assert!(nullish(" NULL "));
        assert!(nullish("Undefined"));
        assert!(!nullish("undefine"));
        assert!(!nullish(""));
    }

    #[test]
    fn zeroish_placeholders() {
        assert!(zeroish("00"));
        assert!(zeroish("0000:00:00 00:00:00"));
        assert!(!zeroish("2020:01:01 00:00:00"));
        assert!(!zeroish("no digits"));
    }
}
