//! Checksums and identifier matching.
//!
//! [`hasher`] computes content digests; this module also owns
//! [`matches_identifier`], the one place where loose (substring) matching of
//! identifiers and checksums is decided.

pub mod hasher;

pub use hasher::{ChecksumAlgorithm, compute_checksum, compute_file_checksum, digests_equal};

/// Whether `candidate` refers to `target`.
///
/// Archived packages carry identifiers such as `<urn:uuid:…>` and checksum
/// fields that may be prefixed (`md5:…`), so matching is a case-insensitive
/// containment test rather than equality. An empty target never matches.
///
/// Every lookup that needs this loose rule goes through here; tightening it to
/// exact matching only has to happen in this function.
pub fn matches_identifier(candidate: &str, target: &str) -> bool {
    let target = target.trim();
    if target.is_empty() {
        return false;
    }
    candidate
        .to_ascii_lowercase()
        .contains(&target.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_identifier_substring() {
        assert!(matches_identifier(
            "<urn:uuid:6f1c2a9e-0000-4000-8000-000000000001>",
            "6f1c2a9e-0000-4000-8000-000000000001"
        ));
        assert!(matches_identifier("md5:ABCDEF", "abcdef"));
        assert!(!matches_identifier("<urn:uuid:1234>", "5678"));
    }

    #[test]
    fn test_empty_target_never_matches() {
        assert!(!matches_identifier("anything", ""));
        assert!(!matches_identifier("anything", "  "));
    }
}
