//! Storage key encoding for hand-built URLs.
//!
//! Signed URLs are produced by OpenDAL, which escapes keys itself. Public URLs
//! are assembled here, so keys go through [`encode_key`] first.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters escaped inside a single key segment.
///
/// Everything except unreserved characters (A-Z, a-z, 0-9, `-`, `_`, `.`, `~`).
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes every `/`-delimited segment of `key` independently.
///
/// Separators are kept as-is, so `users/42/my photo.png` becomes
/// `users/42/my%20photo.png`.
#[must_use]
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("users/42/abc123.png", "users/42/abc123.png")]
    #[case("reports/big file.csv", "reports/big%20file.csv")]
    #[case("a/b?c/d#e", "a/b%3Fc/d%23e")]
    #[case("unreserved/-_.~", "unreserved/-_.~")]
    #[case("docs/résumé.pdf", "docs/r%C3%A9sum%C3%A9.pdf")]
    #[case("plus+and&amp", "plus%2Band%26amp")]
    fn test_encode_key(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(encode_key(key), expected);
    }

    #[test]
    fn test_encode_key_keeps_empty_segments() {
        assert_eq!(encode_key("/leading//double/"), "/leading//double/");
        assert_eq!(encode_key(""), "");
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use percent_encoding::percent_decode_str;
    use proptest::prelude::*;

    // Encoding keeps the segment structure and each segment decodes back to
    // the original text.
    proptest! {
        #[test]
        fn prop_segments_round_trip(key in "\\PC{0,64}") {
            let encoded = encode_key(&key);
            let original: Vec<&str> = key.split('/').collect();
            let segments: Vec<&str> = encoded.split('/').collect();

            prop_assert_eq!(segments.len(), original.len());
            for (segment, expected) in segments.iter().zip(&original) {
                let decoded = percent_decode_str(segment)
                    .decode_utf8()
                    .expect("encoded segment decodes as utf-8");
                prop_assert_eq!(decoded.as_ref(), *expected);
            }
        }
    }

    proptest! {
        #[test]
        fn prop_unreserved_keys_unchanged(key in "[A-Za-z0-9._~/-]{0,64}") {
            prop_assert_eq!(encode_key(&key), key);
        }
    }
}
