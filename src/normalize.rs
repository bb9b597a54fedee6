use once_cell::sync::Lazy;
use regex::Regex;

/// Unit designators plus the token that follows them, including the
/// whitespace in front so "St Apt 4B, City" becomes "St, City". A designator
/// glued to its number ("Apt4B") only matches when a digit follows, which
/// leaves words like "United" alone.
static UNIT_DESIGNATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\s*(?:\b(?:apartment|apt|suite|ste|unit)\b\.?\s*[a-z0-9-]+|\b(?:apartment|apt|suite|ste|unit)\.?\d[a-z0-9-]*|#\s*[a-z0-9-]+)",
    )
    .expect("unit designator pattern compiles")
});

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern compiles"));

/// Canonical cache key for a raw address.
///
/// Lossy on purpose: two addresses that differ only in their unit number map
/// to the same key. Blank or missing input yields an empty key.
pub fn normalize(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };

    let mut current = raw.trim().to_string();
    // "Apt#1 5" only exposes "Apt 5" once "#1" is gone.
    loop {
        let stripped = UNIT_DESIGNATOR.replace_all(&current, "");
        if stripped == current {
            break;
        }
        current = stripped.into_owned();
    }

    WHITESPACE
        .replace_all(current.trim(), " ")
        .to_lowercase()
}

pub fn is_blank(key: &str) -> bool {
    key.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_units_case_insensitively() {
        let expected = "123 main st";
        assert_eq!(normalize(Some("123 Main St Apt 4")), expected);
        assert_eq!(normalize(Some("123 MAIN ST UNIT 4")), expected);
        assert_eq!(normalize(Some("123 main st")), expected);
        assert_eq!(normalize(Some("  123   Main St   Suite 200 ")), expected);
        assert_eq!(normalize(Some("123 Main St Ste. 7")), expected);
        assert_eq!(normalize(Some("123 Main St #12")), expected);
        assert_eq!(normalize(Some("123 Main St # 12")), expected);
        assert_eq!(normalize(Some("123 Main St Apartment B-2")), expected);
        assert_eq!(normalize(Some("123 Main St Apt#1 5")), expected);
        assert_eq!(normalize(Some("123 Main St Apt4B")), expected);
        assert_eq!(normalize(Some("123 Main St unit12")), expected);
        assert_eq!(normalize(Some("123 Main St Ste.7")), expected);
    }

    #[test]
    fn keeps_the_rest_of_the_address() {
        assert_eq!(
            normalize(Some("123 Main St Apt 4B, Springfield, ST")),
            "123 main st, springfield, st"
        );
        assert_eq!(
            normalize(Some("9 Steele Ave, United City")),
            "9 steele ave, united city"
        );
        assert_eq!(normalize(Some("4 Aptos Way")), "4 aptos way");
    }

    #[test]
    fn blank_inputs_yield_empty_key() {
        assert_eq!(normalize(None), "");
        assert_eq!(normalize(Some("")), "");
        assert_eq!(normalize(Some(" \t\n ")), "");
        assert!(is_blank(&normalize(Some("   "))));
        assert!(!is_blank(&normalize(Some("1 Elm"))));
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "123 Main St Apt 4",
            "  Unit Apt 5 6  ",
            "Apt#1 5 Oak Rd",
            "#",
            "Apt",
            "PO Box 12, Ste 9, Duluth",
            "\u{00c9}cole   Rd  #A1",
            "",
        ];
        for sample in samples {
            let once = normalize(Some(sample));
            assert_eq!(normalize(Some(&once)), once, "sample {sample:?}");
        }
    }
}
