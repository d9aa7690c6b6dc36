//! Content fingerprints used for change detection.

use sha2::{Digest, Sha256};

/// Normalize a frontmatter-stripped body for hashing.
///
/// Line endings become `\n`, trailing whitespace is removed from every line
/// and trailing blank lines are dropped. The result never ends in a newline.
pub fn normalize(body: &str) -> String {
    let unified = body.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<&str> = unified.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Hex-encoded SHA-256 of `text`.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Fingerprint of a document body: the digest of its normalized form.
pub fn fingerprint(body: &str) -> String {
    sha256_hex(&normalize(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn empty_body_hashes_to_empty_digest() {
        assert_eq!(fingerprint(""), EMPTY_SHA256);
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let hash = fingerprint("# Title\n");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[rstest]
    #[case("a\r\nb\r\n", "a\nb")]
    #[case("a  \nb\t\n", "a\nb")]
    #[case("a\n\n\n", "a")]
    #[case("\na\n", "\na")]
    #[case("a\rb", "a\nb")]
    #[case("   \n\n", "")]
    fn normalize_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn whitespace_only_differences_share_a_fingerprint() {
        assert_eq!(fingerprint("# A\r\ntext   \r\n\r\n"), fingerprint("# A\ntext"));
    }

    #[test]
    fn content_differences_change_the_fingerprint() {
        assert_ne!(fingerprint("# A\ntext"), fingerprint("# A\ntext!"));
    }

    #[test]
    fn fingerprint_is_stable_across_calls() {
        let body = "## Section\n\nSome *text* here.\n";
        let first = fingerprint(body);
        for _ in 0..10 {
            assert_eq!(fingerprint(body), first);
        }
    }
}
