//! Local filesystem backend.
//!
//! Completed objects live at `<store_path>/<key>`. Multipart sessions live
//! outside the object namespace at `<tmp_path>/<upload_id>/part_<n>.tmp`, so
//! an unfinished session can never be read back as an object. Every write
//! goes to a temp sibling first (temp file → fsync → rename), which keeps
//! objects and parts whole even when a write fails half way.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncSeekExt};
use tracing::{debug, warn};
use uuid::Uuid;

use stratus_common::backend::{check_complete, effective_max_parts};
use stratus_common::key::{normalize_key, validate_part_number, validate_upload_id};
use stratus_common::{CompletedPart, ObjectReader, ObjectStore, PartReader, Result, StoreError};

#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    pub store_path: PathBuf,
    /// Where in-flight multipart parts are kept.
    #[serde(default)]
    pub tmp_path: Option<PathBuf>,
    /// Public prefix for generated URLs. Without one, URLs are on-disk paths.
    #[serde(default)]
    pub url_prefix: Option<String>,
}

impl LocalConfig {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            tmp_path: None,
            url_prefix: None,
        }
    }
}

pub fn default_tmp_path() -> PathBuf {
    std::env::temp_dir().join("stratus-multipart")
}

pub struct LocalAdapter {
    store_path: PathBuf,
    tmp_path: PathBuf,
    url_prefix: Option<String>,
}

impl LocalAdapter {
    /// Creates the store directory if it does not exist yet.
    pub fn new(config: LocalConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.store_path)?;
        Ok(Self {
            store_path: config.store_path,
            tmp_path: config.tmp_path.unwrap_or_else(default_tmp_path),
            url_prefix: config.url_prefix,
        })
    }

    fn full_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.store_path.join(normalize_key(key)?))
    }

    fn session_dir(&self, upload_id: &str) -> PathBuf {
        self.tmp_path.join(upload_id)
    }

    fn part_path(&self, upload_id: &str, part_number: u32) -> PathBuf {
        self.session_dir(upload_id).join(part_file_name(part_number))
    }

    fn locator(&self, key: &str) -> Result<String> {
        let path = self.full_path(key)?;
        Ok(match &self.url_prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), normalize_key(key)?),
            None => path.to_string_lossy().into_owned(),
        })
    }

    /// Parts present on disk with a number no greater than `limit`, ascending.
    async fn scan_parts(&self, upload_id: &str, limit: u32) -> Result<Vec<CompletedPart>> {
        let dir = self.session_dir(upload_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut numbers = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(n) = name.to_str().and_then(parse_part_file_name) else {
                continue;
            };
            if n <= limit && entry.file_type().await?.is_file() {
                numbers.push(n);
            }
        }
        numbers.sort_unstable();

        Ok(numbers
            .into_iter()
            .map(|part_number| CompletedPart { part_number, etag: String::new() })
            .collect())
    }
}

/// The key cannot name an object: nothing is there, a path component is an
/// object file, or the key itself is a directory of other objects.
fn is_absent(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::NotFound
            | std::io::ErrorKind::NotADirectory
            | std::io::ErrorKind::IsADirectory
    )
}

fn part_file_name(part_number: u32) -> String {
    format!("part_{}.tmp", part_number)
}

fn parse_part_file_name(name: &str) -> Option<u32> {
    let n: u32 = name.strip_prefix("part_")?.strip_suffix(".tmp")?.parse().ok()?;
    // Reject spellings like part_01.tmp that would alias part 1
    (n >= 1 && part_file_name(n) == name).then_some(n)
}

/// Open a uniquely named temp file in the directory of `dest`, creating
/// parent directories.
async fn stage(dest: &Path) -> Result<(PathBuf, File)> {
    let parent = dest
        .parent()
        .ok_or_else(|| StoreError::invalid(format!("no parent directory for {}", dest.display())))?;
    fs::create_dir_all(parent).await?;

    // Fixed length, so any name that fits on disk can also be staged.
    let tmp = parent.join(format!(".{}.partial", Uuid::new_v4()));
    let file = File::create(&tmp).await?;
    Ok((tmp, file))
}

/// fsync the staged file and move it over `dest`.
async fn publish(tmp: &Path, file: File, dest: &Path) -> Result<()> {
    file.sync_all().await?;
    drop(file);
    fs::rename(tmp, dest).await?;
    Ok(())
}

async fn discard(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %tmp.display(), error = %e, "Failed to remove partial file");
        }
    }
}

/// Publish the staged file at `dest` if `written` succeeded, otherwise drop it.
async fn finish(tmp: PathBuf, file: File, dest: &Path, written: Result<()>) -> Result<()> {
    let result = match written {
        Ok(()) => publish(&tmp, file, dest).await,
        Err(e) => {
            drop(file);
            Err(e)
        }
    };
    if result.is_err() {
        discard(&tmp).await;
    }
    result
}

async fn copy_into<R>(reader: &mut R, file: &mut File) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    tokio::io::copy(reader, file).await?;
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalAdapter {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn upload(&self, key: &str, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        let dest = self.full_path(key)?;
        let (tmp, mut file) = stage(&dest).await?;
        let written = copy_into(reader, &mut file).await;
        finish(tmp, file, &dest, written).await?;

        debug!(key = %key, "Local upload complete");
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<ObjectReader> {
        let src = self.full_path(key)?;
        let file = match File::open(&src).await {
            Ok(file) => file,
            Err(e) if is_absent(&e) => return Err(StoreError::NotFound(key.to_string())),
            Err(e) => return Err(e.into()),
        };
        // Opening a directory succeeds on Unix.
        if !file.metadata().await?.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(Box::new(file))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.full_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if is_absent(&e) => {}
            Err(e) => return Err(e.into()),
        }
        debug!(key = %key, "Local delete complete");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.full_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn generate_temporary_url(&self, key: &str, expiry: Duration) -> Result<String> {
        // Local paths cannot expire; the locator is the same as the permanent one.
        debug!(key = %key, expiry_secs = expiry.as_secs(), "Local temporary URL requested");
        self.locator(key)
    }

    async fn generate_permanent_url(&self, key: &str) -> Result<String> {
        self.locator(key)
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String> {
        normalize_key(key)?;
        // The session directory appears with the first part.
        let upload_id = Uuid::new_v4().to_string();
        debug!(key = %key, upload_id = %upload_id, "Local multipart upload created");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        reader: &mut dyn PartReader,
    ) -> Result<String> {
        normalize_key(key)?;
        validate_upload_id(upload_id)?;
        validate_part_number(part_number)?;

        reader
            .seek(std::io::SeekFrom::Start(0))
            .await
            .map_err(|e| StoreError::invalid(format!("part stream is not seekable: {}", e)))?;

        let dest = self.part_path(upload_id, part_number);
        let (tmp, mut file) = stage(&dest).await?;
        let written = copy_into(reader, &mut file).await;
        finish(tmp, file, &dest, written).await?;

        debug!(upload_id = %upload_id, part_number, "Local part stored");
        Ok(String::new())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        normalize_key(key)?;
        validate_upload_id(upload_id)?;

        match fs::remove_dir_all(self.session_dir(upload_id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(key = %key, upload_id = %upload_id, "Local multipart upload aborted");
        Ok(())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        declared_parts: u32,
    ) -> Result<String> {
        let dest = self.full_path(key)?;
        validate_upload_id(upload_id)?;
        if declared_parts == 0 {
            return Err(StoreError::invalid("declared part count must be at least 1"));
        }

        // Check everything before the destination is touched.
        let parts = self.scan_parts(upload_id, u32::MAX).await?;
        check_complete(&parts, declared_parts)?;

        let (tmp, mut file) = stage(&dest).await?;
        let mut written = Ok(());
        for part in &parts {
            written = match File::open(self.part_path(upload_id, part.part_number)).await {
                Ok(mut src) => copy_into(&mut src, &mut file).await,
                Err(e) => Err(e.into()),
            };
            if written.is_err() {
                break;
            }
        }
        finish(tmp, file, &dest, written).await?;

        fs::remove_dir_all(self.session_dir(upload_id)).await?;

        debug!(key = %key, upload_id = %upload_id, parts = parts.len(), "Local multipart upload complete");
        Ok(String::new())
    }

    async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
        max_parts: u32,
    ) -> Result<Vec<CompletedPart>> {
        normalize_key(key)?;
        validate_upload_id(upload_id)?;
        self.scan_parts(upload_id, effective_max_parts(max_parts)).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use stratus_common::ErrorKind;
    use tokio::io::{AsyncReadExt, AsyncSeek, ReadBuf};

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: PathBuf,
        tmp: PathBuf,
        adapter: LocalAdapter,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");
        let tmp = dir.path().join("tmp");
        let adapter = LocalAdapter::new(LocalConfig {
            store_path: store.clone(),
            tmp_path: Some(tmp.clone()),
            url_prefix: None,
        })
        .unwrap();
        Fixture { _dir: dir, store, tmp, adapter }
    }

    async fn read_all(adapter: &LocalAdapter, key: &str) -> Vec<u8> {
        let mut reader = adapter.download(key).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        buf
    }

    async fn put_part(adapter: &LocalAdapter, key: &str, id: &str, n: u32, data: &[u8]) {
        let mut cursor = Cursor::new(data.to_vec());
        adapter.upload_part(key, id, n, &mut cursor).await.unwrap();
    }

    /// Seekable reader that yields some bytes and then fails.
    struct BrokenReader {
        sent: bool,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "client went away",
                )));
            }
            self.sent = true;
            buf.put_slice(b"half a part");
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncSeek for BrokenReader {
        fn start_seek(self: Pin<&mut Self>, _position: std::io::SeekFrom) -> std::io::Result<()> {
            Ok(())
        }

        fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<u64>> {
            Poll::Ready(Ok(0))
        }
    }

    #[tokio::test]
    async fn test_upload_download_roundtrip() {
        let f = fixture();
        let data = b"hello world".to_vec();
        f.adapter.upload("test/subdir/file.txt", &mut data.as_slice()).await.unwrap();

        assert_eq!(read_all(&f.adapter, "test/subdir/file.txt").await, data);
        assert!(f.store.join("test/subdir/file.txt").is_file());
    }

    #[tokio::test]
    async fn test_upload_replaces_existing_object() {
        let f = fixture();
        f.adapter.upload("k", &mut &b"a much longer first version"[..]).await.unwrap();
        f.adapter.upload("k", &mut &b"short"[..]).await.unwrap();
        assert_eq!(read_all(&f.adapter, "k").await, b"short");

        // No staging leftovers next to the object.
        let names: Vec<_> = std::fs::read_dir(&f.store).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names, vec![std::ffi::OsString::from("k")]);
    }

    #[tokio::test]
    async fn test_exists_toggles_with_upload_and_delete() {
        let f = fixture();
        assert!(!f.adapter.exists("test-local").await.unwrap());

        f.adapter.upload("test-local", &mut &b"123"[..]).await.unwrap();
        assert!(f.adapter.exists("test-local").await.unwrap());

        f.adapter.delete("test-local").await.unwrap();
        assert!(!f.adapter.exists("test-local").await.unwrap());

        // Deleting again is fine.
        f.adapter.delete("test-local").await.unwrap();
    }

    #[tokio::test]
    async fn test_download_missing_is_not_found() {
        let f = fixture();
        let err = f.adapter.download("nope").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_directory_key_is_not_an_object() {
        let f = fixture();
        f.adapter.upload("photos/cat.jpg", &mut &b"meow"[..]).await.unwrap();

        assert!(!f.adapter.exists("photos").await.unwrap());
        let err = f.adapter.download("photos").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Deleting it is a no-op that leaves the objects below alone.
        f.adapter.delete("photos").await.unwrap();
        assert_eq!(read_all(&f.adapter, "photos/cat.jpg").await, b"meow");
    }

    #[tokio::test]
    async fn test_key_below_an_object_is_absent() {
        let f = fixture();
        f.adapter.upload("k", &mut &b"file"[..]).await.unwrap();

        assert!(!f.adapter.exists("k/x").await.unwrap());
        let err = f.adapter.download("k/x").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        f.adapter.delete("k/x").await.unwrap();

        assert_eq!(read_all(&f.adapter, "k").await, b"file");
    }

    #[tokio::test]
    async fn test_upload_long_key_segment() {
        let f = fixture();
        let key = format!("long/{}", "n".repeat(230));
        f.adapter.upload(&key, &mut &b"data"[..]).await.unwrap();
        assert_eq!(read_all(&f.adapter, &key).await, b"data");
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let f = fixture();
        let err = f.adapter.upload("../../../etc/passwd", &mut &b"malicious"[..]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = f.adapter.exists("a/../../b").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_urls_are_local_paths() {
        let f = fixture();
        let temp = f
            .adapter
            .generate_temporary_url("a/b.txt", Duration::from_secs(30 * 24 * 3600))
            .await
            .unwrap();
        let permanent = f.adapter.generate_permanent_url("a/b.txt").await.unwrap();
        assert_eq!(temp, permanent);
        assert_eq!(PathBuf::from(temp), f.store.join("a/b.txt"));
    }

    #[tokio::test]
    async fn test_urls_use_prefix_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(LocalConfig {
            store_path: dir.path().to_path_buf(),
            tmp_path: Some(dir.path().join("tmp")),
            url_prefix: Some("https://files.example.com/static/".into()),
        })
        .unwrap();
        let url = adapter.generate_permanent_url("/img/cat.png").await.unwrap();
        assert_eq!(url, "https://files.example.com/static/img/cat.png");
    }

    #[tokio::test]
    async fn test_create_multipart_is_lazy() {
        let f = fixture();
        let a = f.adapter.create_multipart_upload("big.zip").await.unwrap();
        let b = f.adapter.create_multipart_upload("big.zip").await.unwrap();
        assert_ne!(a, b);
        assert!(!f.tmp.join(&a).exists());
        assert!(!f.adapter.exists("big.zip").await.unwrap());
    }

    #[tokio::test]
    async fn test_multipart_out_of_order_reconstruction() {
        let f = fixture();
        let id = f.adapter.create_multipart_upload("big.zip").await.unwrap();

        put_part(&f.adapter, "big.zip", &id, 3, b"ccc").await;
        put_part(&f.adapter, "big.zip", &id, 1, b"a").await;
        put_part(&f.adapter, "big.zip", &id, 2, b"bb").await;

        // Nothing at the key until completion.
        assert!(!f.adapter.exists("big.zip").await.unwrap());

        f.adapter.complete_multipart_upload("big.zip", &id, 3).await.unwrap();
        assert_eq!(read_all(&f.adapter, "big.zip").await, b"abbccc");
        assert!(!f.tmp.join(&id).exists());
    }

    #[tokio::test]
    async fn test_complete_rejects_missing_parts() {
        let f = fixture();
        let id = f.adapter.create_multipart_upload("gap.bin").await.unwrap();
        for n in [1, 2, 4] {
            put_part(&f.adapter, "gap.bin", &id, n, b"x").await;
        }

        let err = f.adapter.complete_multipart_upload("gap.bin", &id, 4).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingParts);
        assert!(!f.adapter.exists("gap.bin").await.unwrap());

        // Session is intact for a retry.
        let parts = f.adapter.list_parts("gap.bin", &id, 0).await.unwrap();
        assert_eq!(parts.len(), 3);

        put_part(&f.adapter, "gap.bin", &id, 3, b"y").await;
        f.adapter.complete_multipart_upload("gap.bin", &id, 4).await.unwrap();
        assert_eq!(read_all(&f.adapter, "gap.bin").await, b"xxyx");
    }

    #[tokio::test]
    async fn test_complete_rejects_zero_declared_parts() {
        let f = fixture();
        let id = f.adapter.create_multipart_upload("k").await.unwrap();
        let err = f.adapter.complete_multipart_upload("k", &id, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_list_parts_exact_and_ordered() {
        let f = fixture();
        let id = f.adapter.create_multipart_upload("k").await.unwrap();
        for n in [5, 1, 3] {
            put_part(&f.adapter, "k", &id, n, b"p").await;
        }
        // Same number twice still counts once.
        put_part(&f.adapter, "k", &id, 3, b"q").await;

        let parts = f.adapter.list_parts("k", &id, 0).await.unwrap();
        let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 3, 5]);
        assert!(parts.iter().all(|p| p.etag.is_empty()));

        // max_parts bounds the scanned range.
        let parts = f.adapter.list_parts("k", &id, 3).await.unwrap();
        assert_eq!(parts.len(), 2);

        // Listing is repeatable.
        assert_eq!(f.adapter.list_parts("k", &id, 0).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_reupload_part_overwrites() {
        let f = fixture();
        let id = f.adapter.create_multipart_upload("k").await.unwrap();
        put_part(&f.adapter, "k", &id, 1, b"first version").await;
        put_part(&f.adapter, "k", &id, 1, b"v2").await;
        f.adapter.complete_multipart_upload("k", &id, 1).await.unwrap();
        assert_eq!(read_all(&f.adapter, "k").await, b"v2");
    }

    #[tokio::test]
    async fn test_concurrent_same_part_keeps_one_version() {
        let f = fixture();
        let id = f.adapter.create_multipart_upload("k").await.unwrap();
        let a = vec![b'a'; 64 * 1024];
        let b = vec![b'b'; 48 * 1024];

        let mut ra = Cursor::new(a.clone());
        let mut rb = Cursor::new(b.clone());
        let (ea, eb) = tokio::join!(
            f.adapter.upload_part("k", &id, 1, &mut ra),
            f.adapter.upload_part("k", &id, 1, &mut rb),
        );
        ea.unwrap();
        eb.unwrap();

        assert_eq!(f.adapter.list_parts("k", &id, 0).await.unwrap().len(), 1);
        f.adapter.complete_multipart_upload("k", &id, 1).await.unwrap();
        let got = read_all(&f.adapter, "k").await;
        assert!(got == a || got == b);
    }

    #[tokio::test]
    async fn test_upload_part_rewinds_stream() {
        let f = fixture();
        let id = f.adapter.create_multipart_upload("k").await.unwrap();
        let mut cursor = Cursor::new(b"rewind me".to_vec());
        cursor.set_position(6);
        f.adapter.upload_part("k", &id, 1, &mut cursor).await.unwrap();
        f.adapter.complete_multipart_upload("k", &id, 1).await.unwrap();
        assert_eq!(read_all(&f.adapter, "k").await, b"rewind me");
    }

    #[tokio::test]
    async fn test_upload_part_rejects_part_zero() {
        let f = fixture();
        let id = f.adapter.create_multipart_upload("k").await.unwrap();
        let mut cursor = Cursor::new(b"x".to_vec());
        let err = f.adapter.upload_part("k", &id, 0, &mut cursor).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_failed_part_upload_leaves_no_partial_file() {
        let f = fixture();
        let id = f.adapter.create_multipart_upload("k").await.unwrap();
        put_part(&f.adapter, "k", &id, 1, b"good").await;

        let mut broken = BrokenReader { sent: false };
        let err = f.adapter.upload_part("k", &id, 1, &mut broken).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        let err = f.adapter.upload_part("k", &id, 2, &mut BrokenReader { sent: false }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        // Only the earlier complete part remains.
        let names: Vec<_> = std::fs::read_dir(f.tmp.join(&id))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["part_1.tmp".to_string()]);

        f.adapter.complete_multipart_upload("k", &id, 1).await.unwrap();
        assert_eq!(read_all(&f.adapter, "k").await, b"good");
    }

    #[tokio::test]
    async fn test_abort_removes_session() {
        let f = fixture();
        let id = f.adapter.create_multipart_upload("k").await.unwrap();
        put_part(&f.adapter, "k", &id, 1, b"a").await;
        put_part(&f.adapter, "k", &id, 2, b"b").await;

        f.adapter.abort_multipart_upload("k", &id).await.unwrap();
        assert!(!f.tmp.join(&id).exists());
        assert!(f.adapter.list_parts("k", &id, 0).await.unwrap().is_empty());

        // Aborting an unknown session is fine, and the id behaves as fresh.
        f.adapter.abort_multipart_upload("k", &id).await.unwrap();
        put_part(&f.adapter, "k", &id, 1, b"fresh").await;
        f.adapter.complete_multipart_upload("k", &id, 1).await.unwrap();
        assert_eq!(read_all(&f.adapter, "k").await, b"fresh");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let f = fixture();
        let a = f.adapter.create_multipart_upload("a").await.unwrap();
        let b = f.adapter.create_multipart_upload("b").await.unwrap();
        put_part(&f.adapter, "a", &a, 1, b"A").await;
        put_part(&f.adapter, "b", &b, 1, b"B").await;
        put_part(&f.adapter, "b", &b, 2, b"B").await;

        f.adapter.abort_multipart_upload("a", &a).await.unwrap();
        assert_eq!(f.adapter.list_parts("b", &b, 0).await.unwrap().len(), 2);
    }

    #[test]
    fn test_parse_part_file_name() {
        assert_eq!(parse_part_file_name("part_1.tmp"), Some(1));
        assert_eq!(parse_part_file_name("part_1000.tmp"), Some(1000));
        assert_eq!(parse_part_file_name("part_0.tmp"), None);
        assert_eq!(parse_part_file_name("part_01.tmp"), None);
        assert_eq!(parse_part_file_name(".part_1.tmp.1234.partial"), None);
        assert_eq!(parse_part_file_name("part_x.tmp"), None);
    }
}
