//! S3-compatible backend.
//!
//! Talks to AWS S3, MinIO, and other S3-compatible services with path-style
//! addressing (`<endpoint>/<bucket>/<key>`). Uses reqwest with manual AWS
//! Signature V4 signing so no SDK dependency is needed. Multipart sessions
//! are owned entirely by the remote store.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::TryStreamExt;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use stratus_common::backend::{check_complete, effective_max_parts};
use stratus_common::key::{normalize_key, validate_part_number};
use stratus_common::{
    CompletedPart, ObjectReader, ObjectStore, PartReader, Result, StoreError, DEFAULT_MAX_PARTS,
    MAX_PRESIGN_EXPIRY,
};

use super::sigv4::{self, Signer};
use super::xml;

/// Hard stop for ListParts page following. S3 caps a session at 10,000
/// parts, so a well-behaved store never needs more pages than this.
const MAX_LIST_PAGES: usize = 10_000;

const ACL_PUBLIC_READ: &str = "public-read";

#[derive(Clone, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for MinIO or other S3-compatible APIs
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Public host that replaces the endpoint in generated URLs (e.g. a CDN)
    #[serde(default)]
    pub endpoint_alias: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

pub struct S3Adapter {
    config: S3Config,
    endpoint: String,
    client: Client,
}

/// One page of a ListParts response.
#[derive(Debug, Default)]
struct PartsPage {
    parts: Vec<CompletedPart>,
    is_truncated: bool,
    next_marker: Option<u32>,
}

impl S3Adapter {
    pub fn new(config: S3Config) -> Result<Self> {
        let endpoint = match &config.endpoint {
            Some(ep) if !ep.is_empty() => ep.trim_end_matches('/').to_string(),
            _ => format!("https://s3.{}.amazonaws.com", config.region),
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, endpoint, client })
    }

    fn signer(&self) -> Signer<'_> {
        Signer {
            access_key_id: &self.config.access_key_id,
            secret_access_key: &self.config.secret_access_key,
            region: &self.config.region,
        }
    }

    /// Canonical URI of an object: `[/<endpoint path>]/<bucket>/<key>`.
    fn object_path(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            sigv4::url_path(&self.endpoint),
            urlencoding::encode(&self.config.bucket),
            sigv4::encode_key(key)
        )
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            urlencoding::encode(&self.config.bucket),
            sigv4::encode_key(key)
        )
    }

    /// Swap the endpoint prefix of a generated URL for the configured alias.
    fn rewrite_url(&self, url: String) -> String {
        let alias = match self.config.endpoint_alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias.trim_end_matches('/'),
            _ => return url,
        };
        match url.strip_prefix(self.endpoint.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') => {
                format!("{}{}", alias, rest)
            }
            _ => url,
        }
    }

    /// Sign and send one request against an object key.
    async fn send(
        &self,
        method: Method,
        key: &str,
        query: &[(&str, String)],
        extra_headers: &[(&str, String)],
        body: Bytes,
    ) -> Result<Response> {
        let (date_time, date) = sigv4::amz_dates(Utc::now());
        let payload_hash = sigv4::body_hash(&body);
        let canonical_query = sigv4::canonical_query(query);

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), sigv4::url_host(&self.endpoint).to_string());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        headers.insert("x-amz-date".to_string(), date_time.clone());
        for (name, value) in extra_headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }

        let auth = self.signer().authorization(
            method.as_str(),
            &self.object_path(key),
            &canonical_query,
            &headers,
            &payload_hash,
            &date_time,
            &date,
        )?;

        let mut url = self.object_url(key);
        if !canonical_query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query);
        }

        let mut req = self.client.request(method, &url).header("Authorization", auth);
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            req = req.header(name.as_str(), value.as_str());
        }

        Ok(req.body(body).send().await?)
    }

    async fn fetch_parts_page(
        &self,
        key: &str,
        upload_id: &str,
        max_parts: u32,
        marker: Option<u32>,
    ) -> Result<PartsPage> {
        let mut query = vec![
            ("uploadId", upload_id.to_string()),
            ("max-parts", max_parts.to_string()),
        ];
        if let Some(marker) = marker {
            query.push(("part-number-marker", marker.to_string()));
        }

        let resp = self.send(Method::GET, key, &query, &[], Bytes::new()).await?;
        let resp = check(resp, "S3 ListParts").await?;
        let body = resp.text().await?;
        parse_parts_page(&body)
    }

    /// Every part of a session, following pagination to the end.
    async fn all_parts(&self, key: &str, upload_id: &str, page_size: u32) -> Result<Vec<CompletedPart>> {
        collect_pages(move |marker| self.fetch_parts_page(key, upload_id, page_size, marker)).await
    }
}

/// Turn a non-success response into a `Remote` error.
async fn check(resp: Response, operation: &'static str) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    Err(StoreError::Remote { operation, status, message })
}

fn malformed(operation: &'static str, message: impl Into<String>) -> StoreError {
    StoreError::Remote {
        operation,
        status: StatusCode::OK.as_u16(),
        message: message.into(),
    }
}

fn parse_parts_page(body: &str) -> Result<PartsPage> {
    let mut parts = Vec::new();
    for part in xml::elements(body, "Part") {
        let part_number = xml::element(part, "PartNumber")
            .and_then(|n| n.trim().parse::<u32>().ok())
            .ok_or_else(|| malformed("S3 ListParts", format!("bad <Part> entry: {}", part)))?;
        let etag = xml::element(part, "ETag").map(xml::unescape).unwrap_or_default();
        parts.push(CompletedPart { part_number, etag });
    }

    let is_truncated = xml::element(body, "IsTruncated")
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let next_marker = xml::element(body, "NextPartNumberMarker").and_then(|v| v.trim().parse().ok());

    Ok(PartsPage { parts, is_truncated, next_marker })
}

/// Follow part-number markers until the store stops reporting truncation.
///
/// Bounded by [`MAX_LIST_PAGES`], and stops early if the store hands back a
/// marker that does not move forward.
async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<CompletedPart>>
where
    F: FnMut(Option<u32>) -> Fut,
    Fut: Future<Output = Result<PartsPage>>,
{
    let mut parts: Vec<CompletedPart> = Vec::new();
    let mut marker: Option<u32> = None;

    for _ in 0..MAX_LIST_PAGES {
        let page = fetch(marker).await?;
        parts.extend(page.parts);

        if !page.is_truncated {
            break;
        }
        match page.next_marker {
            Some(next) if marker.map_or(true, |m| next > m) => marker = Some(next),
            other => {
                warn!(marker = ?marker, next = ?other, "ListParts marker did not advance, stopping");
                break;
            }
        }
    }

    parts.sort_by_key(|p| p.part_number);
    parts.dedup_by_key(|p| p.part_number);
    Ok(parts)
}

fn complete_manifest(parts: &[CompletedPart]) -> String {
    let mut body = String::from("<CompleteMultipartUpload>");
    for part in parts {
        body.push_str(&format!(
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            part.part_number,
            xml::escape(&part.etag)
        ));
    }
    body.push_str("</CompleteMultipartUpload>");
    body
}

fn content_type(key: &str) -> String {
    mime_guess::from_path(key).first_or_octet_stream().to_string()
}

#[async_trait]
impl ObjectStore for S3Adapter {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn upload(&self, key: &str, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        let key = normalize_key(key)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;

        let headers = [("content-type", content_type(key))];
        let resp = self.send(Method::PUT, key, &[], &headers, Bytes::from(data)).await?;
        check(resp, "S3 PUT").await?;

        debug!(key = %key, "S3 upload complete");
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<ObjectReader> {
        let key = normalize_key(key)?;
        let resp = self.send(Method::GET, key, &[], &[], Bytes::new()).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let resp = check(resp, "S3 GET").await?;

        let stream = resp
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = normalize_key(key)?;
        let resp = self.send(Method::DELETE, key, &[], &[], Bytes::new()).await?;
        if resp.status() != StatusCode::NOT_FOUND {
            check(resp, "S3 DELETE").await?;
        }

        debug!(key = %key, "S3 delete complete");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = normalize_key(key)?;
        let resp = self.send(Method::HEAD, key, &[], &[], Bytes::new()).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(resp, "S3 HEAD").await?;
        Ok(true)
    }

    async fn generate_temporary_url(&self, key: &str, expiry: Duration) -> Result<String> {
        let key = normalize_key(key)?;
        if expiry > MAX_PRESIGN_EXPIRY {
            return Err(StoreError::ExpiryTooLong {
                requested: expiry,
                max: MAX_PRESIGN_EXPIRY,
            });
        }
        if expiry.as_secs() == 0 {
            return Err(StoreError::invalid("expiry must be at least one second"));
        }

        let (date_time, date) = sigv4::amz_dates(Utc::now());
        let query = self.signer().presign(
            "GET",
            sigv4::url_host(&self.endpoint),
            &self.object_path(key),
            expiry.as_secs(),
            &date_time,
            &date,
        )?;
        Ok(self.rewrite_url(format!("{}?{}", self.object_url(key), query)))
    }

    async fn generate_permanent_url(&self, key: &str) -> Result<String> {
        let key = normalize_key(key)?;
        let query = [("acl", String::new())];
        let headers = [("x-amz-acl", ACL_PUBLIC_READ.to_string())];
        let resp = self.send(Method::PUT, key, &query, &headers, Bytes::new()).await?;
        check(resp, "S3 PutObjectAcl").await?;

        debug!(key = %key, "S3 object made public-read");
        Ok(self.rewrite_url(self.object_url(key)))
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String> {
        let key = normalize_key(key)?;
        let query = [("uploads", String::new())];
        let headers = [("content-type", content_type(key))];
        let resp = self.send(Method::POST, key, &query, &headers, Bytes::new()).await?;
        let resp = check(resp, "S3 CreateMultipartUpload").await?;

        let body = resp.text().await?;
        let upload_id = xml::element(&body, "UploadId")
            .map(|id| xml::unescape(id.trim()))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| malformed("S3 CreateMultipartUpload", format!("no UploadId in response: {}", body)))?;

        debug!(key = %key, upload_id = %upload_id, "S3 multipart upload created");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        reader: &mut dyn PartReader,
    ) -> Result<String> {
        let key = normalize_key(key)?;
        validate_part_number(part_number)?;
        if upload_id.is_empty() {
            return Err(StoreError::invalid("upload id must not be empty"));
        }

        reader
            .seek(std::io::SeekFrom::Start(0))
            .await
            .map_err(|e| StoreError::invalid(format!("part stream is not seekable: {}", e)))?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;

        let query = [
            ("partNumber", part_number.to_string()),
            ("uploadId", upload_id.to_string()),
        ];
        let resp = self.send(Method::PUT, key, &query, &[], Bytes::from(data)).await?;
        let resp = check(resp, "S3 UploadPart").await?;

        let etag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        debug!(key = %key, upload_id = %upload_id, part_number, etag = %etag, "S3 part uploaded");
        Ok(etag)
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let key = normalize_key(key)?;
        let query = [("uploadId", upload_id.to_string())];
        let resp = self.send(Method::DELETE, key, &query, &[], Bytes::new()).await?;
        // NoSuchUpload: already gone
        if resp.status() != StatusCode::NOT_FOUND {
            check(resp, "S3 AbortMultipartUpload").await?;
        }

        debug!(key = %key, upload_id = %upload_id, "S3 multipart upload aborted");
        Ok(())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        declared_parts: u32,
    ) -> Result<String> {
        let key = normalize_key(key)?;
        if declared_parts == 0 {
            return Err(StoreError::invalid("declared part count must be at least 1"));
        }

        // Nothing is sent to the complete endpoint unless the listing checks out.
        let parts = self.all_parts(key, upload_id, DEFAULT_MAX_PARTS).await?;
        check_complete(&parts, declared_parts)?;

        let query = [("uploadId", upload_id.to_string())];
        let headers = [("content-type", "application/xml".to_string())];
        let manifest = complete_manifest(&parts);
        let resp = self
            .send(Method::POST, key, &query, &headers, Bytes::from(manifest))
            .await?;
        let resp = check(resp, "S3 CompleteMultipartUpload").await?;

        // S3 can report a failed completion inside a 200 response.
        let body = resp.text().await?;
        if body.contains("<Error>") {
            return Err(malformed("S3 CompleteMultipartUpload", body));
        }
        let etag = xml::element(&body, "ETag").map(xml::unescape).unwrap_or_default();

        debug!(key = %key, upload_id = %upload_id, parts = parts.len(), "S3 multipart upload complete");
        Ok(etag)
    }

    async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
        max_parts: u32,
    ) -> Result<Vec<CompletedPart>> {
        let key = normalize_key(key)?;
        self.all_parts(key, upload_id, effective_max_parts(max_parts)).await
    }
}
