//! Key and upload id validation shared by all backends.
//!
//! Keys are path-like. Both backends accept the same set so that an object
//! written through one can always be addressed through the other.

use crate::error::{Result, StoreError};

/// Strip a leading `/` and reject keys that could escape a store root.
pub fn normalize_key(key: &str) -> Result<&str> {
    let key = key.trim_start_matches('/');
    if key.is_empty() {
        return Err(StoreError::invalid("object key must not be empty"));
    }
    if key.contains('\0') {
        return Err(StoreError::invalid(format!("object key contains NUL: {:?}", key)));
    }
    if key.ends_with('/') {
        return Err(StoreError::invalid(format!("object key must name an object, not a directory: {}", key)));
    }
    if key.split('/').any(|seg| seg == ".." || seg == "." || seg.is_empty()) {
        return Err(StoreError::invalid(format!("object key has an invalid path segment: {}", key)));
    }
    Ok(key)
}

/// Upload ids become directory names in the local backend.
pub fn validate_upload_id(upload_id: &str) -> Result<()> {
    if upload_id.is_empty()
        || upload_id == "."
        || upload_id.contains("..")
        || upload_id.contains(['/', '\\', '\0'])
    {
        return Err(StoreError::invalid(format!("malformed upload id: {:?}", upload_id)));
    }
    Ok(())
}

pub fn validate_part_number(part_number: u32) -> Result<()> {
    if part_number == 0 {
        return Err(StoreError::invalid("part numbers start at 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("a/b/c.txt").unwrap(), "a/b/c.txt");
        assert_eq!(normalize_key("/a/b").unwrap(), "a/b");
        assert!(normalize_key("").is_err());
        assert!(normalize_key("/").is_err());
        assert!(normalize_key("../../etc/passwd").is_err());
        assert!(normalize_key("a/./b").is_err());
        assert!(normalize_key("a//b").is_err());
        assert!(normalize_key("dir/").is_err());
        assert!(normalize_key("a\0b").is_err());
        // Dots inside a name are fine.
        assert_eq!(normalize_key("archive..tar").unwrap(), "archive..tar");
    }

    #[test]
    fn test_validate_upload_id() {
        assert!(validate_upload_id("0b6c3c9e-5d43-4c1e-9a57-0d1f8e7b2a10").is_ok());
        assert!(validate_upload_id("").is_err());
        assert!(validate_upload_id("../x").is_err());
        assert!(validate_upload_id("a/b").is_err());
    }

    #[test]
    fn test_validate_part_number() {
        assert!(validate_part_number(0).is_err());
        assert!(validate_part_number(1).is_ok());
    }
}
