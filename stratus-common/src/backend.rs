use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncSeek};

use crate::error::Result;

/// Longest lifetime a temporary URL may be issued for.
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Page size used by `list_parts` when the caller passes `max_parts = 0`.
pub const DEFAULT_MAX_PARTS: u32 = 1000;

/// Readable object body handed back by `download`. Dropping it releases the
/// underlying file handle or HTTP connection.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Part payloads must be rewindable: backends seek to offset 0 before reading.
pub trait PartReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> PartReader for T {}

/// One uploaded part of a multipart session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedPart {
    pub part_number: u32,
    /// Backend-defined integrity token. Empty for backends that do not compute one.
    pub etag: String,
}

/// Trait implemented by every object storage backend.
///
/// Callers pick a backend once at construction time and only talk to it
/// through this trait. Upload sessions are never tracked in memory: a session
/// is whatever the medium currently holds under its upload id (part files on
/// disk, or the remote store's own multipart state).
///
/// No operation retries and none spawns background work. Completing,
/// aborting, and uploading parts for the same upload id must be serialized
/// by the caller.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for log fields.
    fn name(&self) -> &'static str;

    /// Store the whole stream under `key`, replacing any existing object.
    async fn upload(&self, key: &str, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()>;

    /// Open the object stored under `key`.
    async fn download(&self, key: &str) -> Result<ObjectReader>;

    /// Delete the object under `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// `Ok(false)` only when the object is confirmed absent.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Time-limited access URL. `expiry` above [`MAX_PRESIGN_EXPIRY`] is
    /// rejected by backends that can actually expire links.
    async fn generate_temporary_url(&self, key: &str, expiry: Duration) -> Result<String>;

    /// Stable access URL. May make the object publicly readable, which is
    /// not undone by anything in this trait.
    async fn generate_permanent_url(&self, key: &str) -> Result<String>;

    /// Begin a multipart session for `key` and return its upload id. The
    /// target object is not created until completion.
    async fn create_multipart_upload(&self, key: &str) -> Result<String>;

    /// Store one part (1-based). Re-uploading a part number replaces it.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        reader: &mut dyn PartReader,
    ) -> Result<String>;

    /// Discard a session and all of its parts. Unknown sessions succeed.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;

    /// Assemble parts `1..=declared_parts` into the final object and destroy
    /// the session. Fails with `MissingParts` without touching anything when
    /// the stored parts are not exactly that range.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        declared_parts: u32,
    ) -> Result<String>;

    /// Parts currently stored for a session, ascending by part number.
    /// `max_parts = 0` means [`DEFAULT_MAX_PARTS`].
    async fn list_parts(&self, key: &str, upload_id: &str, max_parts: u32)
        -> Result<Vec<CompletedPart>>;
}

/// Resolve the caller's `max_parts` argument.
pub fn effective_max_parts(max_parts: u32) -> u32 {
    if max_parts == 0 {
        DEFAULT_MAX_PARTS
    } else {
        max_parts
    }
}

/// Check that a listing holds exactly parts `1..=declared_parts`.
///
/// `parts` must already be sorted by part number.
pub fn check_complete(parts: &[CompletedPart], declared_parts: u32) -> Result<()> {
    let contiguous = parts
        .iter()
        .enumerate()
        .all(|(i, p)| p.part_number as usize == i + 1);
    if parts.len() != declared_parts as usize || !contiguous {
        return Err(crate::error::StoreError::MissingParts {
            expected: declared_parts,
            found: parts.iter().map(|p| p.part_number).collect(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn parts(numbers: &[u32]) -> Vec<CompletedPart> {
        numbers
            .iter()
            .map(|&n| CompletedPart { part_number: n, etag: String::new() })
            .collect()
    }

    #[test]
    fn test_effective_max_parts() {
        assert_eq!(effective_max_parts(0), 1000);
        assert_eq!(effective_max_parts(4), 4);
    }

    #[test]
    fn test_check_complete() {
        assert!(check_complete(&parts(&[1, 2, 3]), 3).is_ok());

        let err = check_complete(&parts(&[1, 2, 4]), 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingParts);

        // Right count, wrong numbers.
        let err = check_complete(&parts(&[1, 2, 5]), 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingParts);

        // Extra parts beyond the declared total.
        let err = check_complete(&parts(&[1, 2, 3]), 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingParts);
    }

    #[test]
    fn test_max_presign_expiry_is_seven_days() {
        assert_eq!(MAX_PRESIGN_EXPIRY.as_secs(), 604_800);
    }
}
