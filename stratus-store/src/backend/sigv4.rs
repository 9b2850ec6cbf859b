//! AWS Signature Version 4 for S3-compatible stores.
//!
//! Covers the two forms the S3 backend needs: an `Authorization` header for
//! regular requests and query-string signing for presigned GET URLs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use stratus_common::{Result, StoreError};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// `(x-amz-date, credential scope date)` for a signing instant.
pub fn amz_dates(now: DateTime<Utc>) -> (String, String) {
    (
        now.format("%Y%m%dT%H%M%SZ").to_string(),
        now.format("%Y%m%d").to_string(),
    )
}

pub struct Signer<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub region: &'a str,
}

impl Signer<'_> {
    fn credential_scope(&self, date: &str) -> String {
        format!("{}/{}/s3/aws4_request", date, self.region)
    }

    fn signature(&self, canonical_request: &str, date_time: &str, date: &str) -> Result<String> {
        let cr_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            date_time,
            self.credential_scope(date),
            cr_hash
        );

        let signing_key = derive_signing_key(self.secret_access_key, date, self.region)?;
        Ok(hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?))
    }

    /// `Authorization` header value for a request.
    ///
    /// `headers` must use lowercase names and include every header to be
    /// signed (at least `host`, `x-amz-content-sha256`, and `x-amz-date`).
    #[allow(clippy::too_many_arguments)]
    pub fn authorization(
        &self,
        method: &str,
        canonical_uri: &str,
        canonical_query: &str,
        headers: &BTreeMap<String, String>,
        payload_hash: &str,
        date_time: &str,
        date: &str,
    ) -> Result<String> {
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();
        let signed_headers: String = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
        );
        let signature = self.signature(&canonical_request, date_time, date)?;

        Ok(format!(
            "{} Credential={}/{},SignedHeaders={},Signature={}",
            ALGORITHM,
            self.access_key_id,
            self.credential_scope(date),
            signed_headers,
            signature
        ))
    }

    /// Signed query string (without the leading `?`) for a presigned request
    /// that only signs the `host` header.
    pub fn presign(
        &self,
        method: &str,
        host: &str,
        canonical_uri: &str,
        expires_secs: u64,
        date_time: &str,
        date: &str,
    ) -> Result<String> {
        let credential = format!("{}/{}", self.access_key_id, self.credential_scope(date));
        let params = [
            ("X-Amz-Algorithm", ALGORITHM.to_string()),
            ("X-Amz-Credential", credential),
            ("X-Amz-Date", date_time.to_string()),
            ("X-Amz-Expires", expires_secs.to_string()),
            ("X-Amz-SignedHeaders", "host".to_string()),
        ];
        let query = canonical_query(&params);

        let canonical_request = format!(
            "{}\n{}\n{}\nhost:{}\n\nhost\n{}",
            method, canonical_uri, query, host, UNSIGNED_PAYLOAD
        );
        let signature = self.signature(&canonical_request, date_time, date)?;

        Ok(format!("{}&X-Amz-Signature={}", query, signature))
    }
}

fn derive_signing_key(secret: &str, date: &str, region: &str) -> Result<Vec<u8>> {
    let key = format!("AWS4{}", secret);
    let k_date = hmac_sha256(key.as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, b"s3")?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StoreError::invalid(format!("bad signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn body_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Query parameters encoded and sorted the way SigV4 expects.
pub fn canonical_query(params: &[(&str, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode each segment of an object key, keeping `/` separators.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Extract the host part from a URL for use in signing.
pub fn url_host(url: &str) -> &str {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    without_scheme.split('/').next().unwrap_or(without_scheme)
}

/// Path component of a URL after the host, without a trailing `/`.
pub fn url_path(url: &str) -> &str {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    match without_scheme.find('/') {
        Some(idx) => without_scheme[idx..].trim_end_matches('/'),
        None => "",
    }
}
