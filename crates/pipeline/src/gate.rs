//! Skip/regenerate decision keyed on the identity marker that every
//! generated document ends with.

use serde::{Deserialize, Serialize};

pub const MARKER_PREFIX: &str = "SHA:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Skip,
    Regenerate,
}

/// Identity recorded in a previously generated document: the token on the
/// last line starting with `SHA:`.
pub fn extract_identity(document: &str) -> Option<&str> {
    document
        .lines()
        .rev()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(MARKER_PREFIX))
        .and_then(|rest| rest.split_whitespace().next())
}

pub fn decide(new_identity: &str, existing_document: Option<&str>) -> Decision {
    match existing_document.and_then(extract_identity) {
        Some(recorded) if recorded == new_identity => Decision::Skip,
        _ => Decision::Regenerate,
    }
}

/// Append the identity marker so the document ends with `SHA:<identity>`.
pub fn stamp(markdown_body: &str, identity: &str) -> String {
    format!("{}\n\n{}{}", markdown_body.trim_end(), MARKER_PREFIX, identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_existing_document_regenerates() {
        assert_eq!(decide("abc", None), Decision::Regenerate);
    }

    #[test]
    fn test_same_marker_skips() {
        let doc = "# Program.cs\n\nDoes things.\n\nSHA:ABC123";
        assert_eq!(decide("ABC123", Some(doc)), Decision::Skip);
    }

    #[test]
    fn test_different_marker_regenerates() {
        let doc = "# Program.cs\n\nSHA:OLD999";
        assert_eq!(decide("ABC123", Some(doc)), Decision::Regenerate);
    }

    #[test]
    fn test_document_without_marker_regenerates() {
        assert_eq!(decide("ABC123", Some("# handwritten notes")), Decision::Regenerate);
        assert_eq!(decide("ABC123", Some("SHA:")), Decision::Regenerate);
    }

    #[test]
    fn test_last_marker_wins() {
        let doc = "Example output:\nSHA:ABC123\n\nSHA:NEW456\n";
        assert_eq!(extract_identity(doc), Some("NEW456"));
        assert_eq!(decide("ABC123", Some(doc)), Decision::Regenerate);
    }

    #[test]
    fn test_stamp_round_trips_through_gate() {
        let stamped = stamp("# Doc\n\nbody\n\n\n", "deadbeef");

        assert!(stamped.ends_with("\n\nSHA:deadbeef"));
        assert_eq!(stamped.lines().last(), Some("SHA:deadbeef"));
        assert_eq!(decide("deadbeef", Some(&stamped)), Decision::Skip);
    }

    #[test]
    fn test_marker_tolerates_crlf_and_trailing_newline() {
        let doc = "# Doc\r\n\r\nSHA:abc\r\n";
        assert_eq!(extract_identity(doc), Some("abc"));
    }
}
