//! Request descriptors
//!
//! A descriptor is the immutable description of one S3 call. It is built
//! once and may be sent several times by the retry layer, so its body is a
//! cheaply clonable [`Bytes`] buffer rather than a one-shot stream.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, AUTHORIZATION, CONNECTION, CONTENT_TYPE, DATE, HOST};
use hyper::Request;
use std::borrow::Cow;

use super::error::{Result, S3Error};
use super::types::{ListObjectsRequest, MAX_DELETE_KEYS};
use crate::auth::signer::HEADER_SECURITY_TOKEN;
use crate::auth::{Operation, SignedHeaders, SigningInput};

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Not among the `http` crate's predefined names
pub const HEADER_CONTENT_MD5: &str = "content-md5";

/// Immutable description of one S3 request
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    operation: Operation,
    /// Path plus optional `?query`
    path: String,
    bucket: String,
    body: Bytes,
    content_type: Option<String>,
    content_md5: Option<String>,
}

impl RequestDescriptor {
    pub fn new(operation: Operation, bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            operation,
            path: path.into(),
            bucket: bucket.into(),
            body: Bytes::new(),
            content_type: None,
            content_md5: None,
        }
    }

    pub fn get(bucket: &str, key: &str) -> Self {
        Self::new(Operation::Get, bucket, object_path(key))
    }

    pub fn put(bucket: &str, key: &str, body: impl Into<Bytes>) -> Self {
        Self::new(Operation::Put, bucket, object_path(key)).with_body(body)
    }

    pub fn delete(bucket: &str, key: &str) -> Self {
        Self::new(Operation::Delete, bucket, object_path(key))
    }

    pub fn list(request: &ListObjectsRequest) -> Self {
        Self::new(Operation::List, request.bucket.as_str(), request.path())
    }

    /// Multi-object delete. The XML body carries a `Content-MD5` as the
    /// service requires.
    pub fn bulk_delete<S: AsRef<str>>(bucket: &str, keys: &[S]) -> Result<Self> {
        if keys.is_empty() {
            return Err(S3Error::InvalidRequest("bulk delete needs at least one key".to_string()));
        }
        if keys.len() > MAX_DELETE_KEYS {
            return Err(S3Error::InvalidRequest(format!(
                "cannot delete more than {} objects at once, got {}",
                MAX_DELETE_KEYS,
                keys.len()
            )));
        }

        let mut xml = String::with_capacity(keys.len() * 60 + 80);
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Delete>");
        for key in keys {
            xml.push_str("<Object><Key>");
            xml_escape_into(&mut xml, key.as_ref());
            xml.push_str("</Key></Object>");
        }
        xml.push_str("</Delete>");

        let body = Bytes::from(xml.into_bytes());
        let md5 = BASE64.encode(md5::compute(&body).0);

        Ok(Self::new(Operation::BulkDelete, bucket, "/?delete")
            .with_body(body)
            .with_content_type("application/xml")
            .with_content_md5(md5))
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_md5(mut self, content_md5: impl Into<String>) -> Self {
        self.content_md5 = Some(content_md5.into());
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_md5(&self) -> Option<&str> {
        self.content_md5.as_deref()
    }

    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    pub fn signing_input(&self) -> SigningInput<'_> {
        SigningInput {
            operation: self.operation,
            path: &self.path,
            content_md5: self.content_md5.as_deref().unwrap_or(""),
            content_type: self.content_type.as_deref().unwrap_or(""),
            bucket: &self.bucket,
        }
    }

    /// Virtual-host style `Host` header for this request's bucket
    pub fn virtual_host(&self, endpoint_host: &str, port: u16) -> String {
        if port == 80 {
            format!("{}.{}", self.bucket, endpoint_host)
        } else {
            format!("{}.{}:{}", self.bucket, endpoint_host, port)
        }
    }

    /// Build the wire request. The body is shared, not copied.
    pub fn to_http_request(&self, host: &str, signed: &SignedHeaders) -> Result<Request<Full<Bytes>>> {
        let mut builder = Request::builder()
            .method(self.operation.method())
            .uri(self.path.as_str())
            .header(HOST, host)
            .header(CONNECTION, HeaderValue::from_static("keep-alive"))
            .header(DATE, signed.date.as_str())
            .header(AUTHORIZATION, signed.authorization.as_str());

        if let Some(token) = &signed.security_token {
            builder = builder.header(HEADER_SECURITY_TOKEN, token.as_str());
        }
        if let Some(content_type) = &self.content_type {
            builder = builder.header(CONTENT_TYPE, content_type.as_str());
        }
        if let Some(content_md5) = &self.content_md5 {
            builder = builder.header(HEADER_CONTENT_MD5, content_md5.as_str());
        }

        builder
            .body(Full::new(self.body.clone()))
            .map_err(|e| S3Error::InvalidRequest(e.to_string()))
    }
}

/// `/<key>` with every byte outside the unreserved set (and `/`)
/// percent-encoded
pub fn object_path(key: &str) -> String {
    let encoded = encode_s3_key(key.trim_start_matches('/'));
    let mut path = String::with_capacity(encoded.len() + 1);
    path.push('/');
    path.push_str(&encoded);
    path
}

/// Encode an S3 key, preserving forward slashes
fn encode_s3_key(key: &str) -> Cow<'_, str> {
    let unreserved =
        |b: u8| matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/');

    if key.bytes().all(unreserved) {
        return Cow::Borrowed(key);
    }

    let mut result = String::with_capacity(key.len() + 32);
    for byte in key.bytes() {
        if unreserved(byte) {
            result.push(byte as char);
        } else {
            result.push('%');
            result.push(HEX_UPPER[(byte >> 4) as usize] as char);
            result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
        }
    }
    Cow::Owned(result)
}

fn xml_escape_into(buf: &mut String, s: &str) {
    for ch in s.chars() {
        match ch {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            '"' => buf.push_str("&quot;"),
            '\'' => buf.push_str("&apos;"),
            _ => buf.push(ch),
        }
    }
}
