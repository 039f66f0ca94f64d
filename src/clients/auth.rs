//! Request signing for the calling platform (HMAC-SHA256 headers) and for
//! blob storage (service SAS tokens). Both sign with a base64 account key.

use super::RemoteError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Storage service version the SAS string-to-sign layout belongs to.
pub const SAS_VERSION: &str = "2019-12-12";

/// HMAC-SHA256 over `payload` with a base64-encoded key, base64 result.
pub fn sign(key_b64: &str, payload: &str) -> Result<String, RemoteError> {
    let key = STANDARD
        .decode(key_b64.trim())
        .map_err(|e| RemoteError::Credentials(format!("access key is not base64: {}", e)))?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| RemoteError::Credentials(e.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub fn content_hash(body: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(body))
}

/// Headers that authenticate one calling platform request.
#[derive(Debug, Clone)]
pub struct HmacHeaders {
    pub date: String,
    pub content_hash: String,
    pub authorization: String,
}

impl HmacHeaders {
    /// Sign `method url` with the given body.
    ///
    /// The signed string is `METHOD\npath?query\ndate;host;content-hash`.
    pub fn new(
        access_key: &str,
        method: &str,
        url: &Url,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Self, RemoteError> {
        let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let content_hash = content_hash(body);
        let string_to_sign = format!(
            "{}\n{}\n{};{};{}",
            method.to_ascii_uppercase(),
            path_and_query(url),
            date,
            host_header(url)?,
            content_hash
        );
        let signature = sign(access_key, &string_to_sign)?;

        Ok(Self {
            date,
            content_hash,
            authorization: format!(
                "HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature={}",
                signature
            ),
        })
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn host_header(url: &Url) -> Result<String, RemoteError> {
    let host = url
        .host_str()
        .ok_or_else(|| RemoteError::InvalidResponse(format!("url has no host: {}", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Parameters of a blob-scoped service SAS.
#[derive(Debug, Clone)]
pub struct BlobSas<'a> {
    pub account_name: &'a str,
    pub container: &'a str,
    pub blob_name: &'a str,
    /// Permission letters in canonical order, e.g. `r` or `cw`
    pub permissions: &'a str,
    pub expiry: DateTime<Utc>,
    /// `https` or `https,http`
    pub protocol: &'a str,
}

impl BlobSas<'_> {
    fn expiry_text(&self) -> String {
        self.expiry.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Newline-joined fields in the order the storage service verifies them.
    pub fn string_to_sign(&self) -> String {
        let expiry = self.expiry_text();
        let resource = format!(
            "/blob/{}/{}/{}",
            self.account_name, self.container, self.blob_name
        );
        let fields: [&str; 15] = [
            self.permissions,
            "", // start
            &expiry,
            &resource,
            "", // stored access policy
            "", // ip range
            self.protocol,
            SAS_VERSION,
            "b",
            "", // snapshot time
            "", // cache-control
            "", // content-disposition
            "", // content-encoding
            "", // content-language
            "", // content-type
        ];
        fields.join("\n")
    }

    /// Query string (without the leading `?`) granting the permissions.
    pub fn token(&self, account_key: &str) -> Result<String, RemoteError> {
        let signature = sign(account_key, &self.string_to_sign())?;
        Ok(url::form_urlencoded::Serializer::new(String::new())
            .append_pair("sv", SAS_VERSION)
            .append_pair("sr", "b")
            .append_pair("sp", self.permissions)
            .append_pair("se", &self.expiry_text())
            .append_pair("spr", self.protocol)
            .append_pair("sig", &signature)
            .finish())
    }
}
