//! Section path handling.
//!
//! Paths are `/`-delimited. The empty segment before a leading `/` names the
//! root section, whose own name is `""`.

use super::node::PARAM_NAME_MAX;
use crate::error::Result;
use crate::types::validate_name;

/// Split off the first segment of `path`.
///
/// Returns the segment and the remainder after its `/` (empty if none).
pub(crate) fn split_segment(path: &str) -> (&str, &str) {
    match path.split_once('/') {
        Some((segment, rest)) => (segment, rest),
        None => (path, ""),
    }
}

/// Check every segment of `path` before anything is created.
pub(crate) fn validate_path(path: &str) -> Result<()> {
    path.split('/')
        .try_for_each(|segment| validate_name(segment, PARAM_NAME_MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_walks_segments() {
        assert_eq!(split_segment("/sec/subsec"), ("", "sec/subsec"));
        assert_eq!(split_segment("sec/subsec"), ("sec", "subsec"));
        assert_eq!(split_segment("subsec"), ("subsec", ""));
        assert_eq!(split_segment("sec/"), ("sec", ""));
        assert_eq!(split_segment(""), ("", ""));
    }

    #[test]
    fn repeated_split_exhausts_path() {
        let mut path = "/sec/subsec/subsubsec";
        let mut segments = Vec::new();
        for _ in 0..5 {
            let (segment, rest) = split_segment(path);
            segments.push(segment);
            path = rest;
        }
        assert_eq!(segments, ["", "sec", "subsec", "subsubsec", ""]);
    }

    #[test]
    fn validation_checks_each_segment() {
        assert!(validate_path("/sec1/sub1").is_ok());
        assert!(validate_path("").is_ok());

        let long = format!("/ok/{}", "x".repeat(PARAM_NAME_MAX + 1));
        assert_eq!(validate_path(&long).unwrap_err().code(), "E302");
        assert_eq!(validate_path("/a\0b").unwrap_err().code(), "E302");
    }
}
