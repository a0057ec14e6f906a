//! Fixed-size, NUL-padded name fields stored inside arena nodes.

use super::ArenaOffset;
use crate::arena::Mapping;
use crate::error::{Result, RtshmError};

/// Check that `name` fits a name field of `max` bytes.
///
/// Names are stored as raw bytes padded with NUL, so a name may use the whole
/// field but must not itself contain a NUL byte.
pub fn validate_name(name: &str, max: usize) -> Result<()> {
    if name.len() > max {
        return Err(RtshmError::InvalidName {
            name: name.to_string(),
            cause: format!("{} bytes exceeds the {} byte limit", name.len(), max),
        });
    }
    if name.as_bytes().contains(&0) {
        return Err(RtshmError::InvalidName {
            name: name.escape_default().to_string(),
            cause: "contains a NUL byte".to_string(),
        });
    }
    Ok(())
}

/// Write `name` into the `max`-byte field at `offset`, zeroing the tail.
pub(crate) fn write_name(mapping: &Mapping, offset: ArenaOffset, max: usize, name: &str) -> Result<()> {
    validate_name(name, max)?;
    let mut field = vec![0u8; max];
    field[..name.len()].copy_from_slice(name.as_bytes());
    mapping.write_bytes(offset, &field)
}

/// Read the name stored in the `max`-byte field at `offset`.
pub(crate) fn read_name(mapping: &Mapping, offset: ArenaOffset, max: usize) -> Result<String> {
    let field = mapping.read_bytes(offset, max)?;
    let len = field.iter().position(|&b| b == 0).unwrap_or(max);
    Ok(String::from_utf8_lossy(&field[..len]).into_owned())
}

/// Compare the name field at `offset` with `name` without allocating a
/// `String` for the stored name.
pub(crate) fn name_eq(mapping: &Mapping, offset: ArenaOffset, max: usize, name: &str) -> Result<bool> {
    let bytes = name.as_bytes();
    // No stored name can contain NUL, so such a filter matches nothing.
    if bytes.len() > max || bytes.contains(&0) {
        return Ok(false);
    }
    // One extra byte checks the stored name ends where `name` does.
    let probe = (bytes.len() + 1).min(max);
    let stored = mapping.read_bytes(offset, probe)?;
    if &stored[..bytes.len()] != bytes {
        return Ok(false);
    }
    Ok(bytes.len() == max || stored[bytes.len()] == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_full_width() {
        assert!(validate_name("abcd", 4).is_ok());
        assert!(validate_name("", 4).is_ok());
    }

    #[test]
    fn validate_rejects_long_and_nul() {
        let err = validate_name("abcde", 4).unwrap_err();
        assert_eq!(err.code(), "E302");

        let err = validate_name("a\0b", 8).unwrap_err();
        assert_eq!(err.code(), "E302");
    }

    #[test]
    fn write_read_compare() {
        let mapping = Mapping::anonymous(4096).unwrap();
        let at = ArenaOffset::new(256);

        write_name(&mapping, at, 16, "spindle").unwrap();
        assert_eq!(read_name(&mapping, at, 16).unwrap(), "spindle");
        assert!(name_eq(&mapping, at, 16, "spindle").unwrap());
        assert!(!name_eq(&mapping, at, 16, "spin").unwrap());
        assert!(!name_eq(&mapping, at, 16, "spindles").unwrap());

        // Overwriting with a shorter name must clear the old tail.
        write_name(&mapping, at, 16, "x").unwrap();
        assert_eq!(read_name(&mapping, at, 16).unwrap(), "x");
        assert!(name_eq(&mapping, at, 16, "x").unwrap());
    }

    #[test]
    fn full_width_name_has_no_terminator() {
        let mapping = Mapping::anonymous(4096).unwrap();
        let at = ArenaOffset::new(512);

        write_name(&mapping, at, 4, "abcd").unwrap();
        assert_eq!(read_name(&mapping, at, 4).unwrap(), "abcd");
        assert!(name_eq(&mapping, at, 4, "abcd").unwrap());
        assert!(!name_eq(&mapping, at, 4, "abc").unwrap());
    }

    #[test]
    fn nul_in_filter_matches_nothing() {
        let mapping = Mapping::anonymous(4096).unwrap();
        let at = ArenaOffset::new(256);

        write_name(&mapping, at, 16, "a").unwrap();
        assert!(!name_eq(&mapping, at, 16, "a\0").unwrap());
        assert!(!name_eq(&mapping, at, 16, "a\0\0").unwrap());
        assert!(!name_eq(&mapping, at, 16, "\0").unwrap());
    }
}
