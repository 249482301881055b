//! S3 request and response value types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::HeaderMap;
use serde::{Deserialize, Serialize};

/// Maximum number of keys accepted by a single bulk delete
pub const MAX_DELETE_KEYS: usize = 1000;

/// Owner of a listed object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub display_name: String,
}

/// One entry of an object listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Bucket the object lives in
    pub bucket_name: String,
    /// Object key
    pub key: String,
    /// ETag with surrounding quotes removed
    pub etag: Option<String>,
    /// Object size in bytes
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// Storage class (STANDARD, STANDARD_IA, GLACIER, etc.)
    pub storage_class: Option<String>,
    pub owner: Option<Owner>,
}

impl ObjectSummary {
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            ..Default::default()
        }
    }
}

/// One page of a bucket listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectListing {
    pub bucket_name: String,
    /// Prefix used in the request
    pub prefix: Option<String>,
    /// Marker used in the request
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    /// Max keys requested
    pub max_keys: Option<u32>,
    /// Whether more results are available
    pub truncated: bool,
    /// Marker for the next page; always `None` when not truncated
    pub next_marker: Option<String>,
    pub object_summaries: Vec<ObjectSummary>,
    /// Common prefixes (subdirectories when using delimiter)
    pub common_prefixes: Vec<String>,
}

impl ObjectListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request for the page following this one, or `None` when this is the
    /// last page
    pub fn next_request(&self) -> Option<ListObjectsRequest> {
        if !self.truncated {
            return None;
        }
        Some(ListObjectsRequest {
            bucket: self.bucket_name.clone(),
            prefix: self.prefix.clone(),
            marker: self.next_marker.clone(),
            delimiter: self.delimiter.clone(),
            max_keys: self.max_keys,
        })
    }
}

/// Parameters of a listing call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsRequest {
    pub bucket: String,
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    pub max_keys: Option<u32>,
}

impl ListObjectsRequest {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn with_max_keys(mut self, max_keys: u32) -> Self {
        self.max_keys = Some(max_keys);
        self
    }

    /// Request path with query parameters in the order
    /// `prefix`, `marker`, `delimiter`, `max-keys`
    pub fn path(&self) -> String {
        let mut path = String::from("/");
        let mut sep = '?';
        let params = [
            ("prefix", self.prefix.as_deref().map(std::borrow::Cow::Borrowed)),
            ("marker", self.marker.as_deref().map(std::borrow::Cow::Borrowed)),
            ("delimiter", self.delimiter.as_deref().map(std::borrow::Cow::Borrowed)),
            ("max-keys", self.max_keys.map(|n| std::borrow::Cow::Owned(n.to_string()))),
        ];
        for (name, value) in params {
            if let Some(value) = value {
                path.push(sep);
                path.push_str(name);
                path.push('=');
                path.push_str(&urlencoding::encode(&value));
                sep = '&';
            }
        }
        path
    }
}

/// Body and metadata of a downloaded object
#[derive(Debug, Clone)]
pub struct GetObjectResponse {
    pub content: Bytes,
    /// Value of `Content-Length`, or the body size when absent
    pub length: u64,
    pub etag: Option<String>,
    pub headers: HeaderMap,
}

/// Optional headers of an upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    /// Base64 MD5 of the body, checked by the service
    pub content_md5: Option<String>,
}

impl ObjectMetadata {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_content_md5(mut self, content_md5: impl Into<String>) -> Self {
        self.content_md5 = Some(content_md5.into());
        self
    }
}

/// Result of an upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutObjectResponse {
    pub etag: Option<String>,
}

/// Response from a bulk delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteObjectsResult {
    /// Successfully deleted objects
    pub deleted: Vec<DeletedObject>,
    /// Per-key failures
    pub errors: Vec<DeleteError>,
}

impl DeleteObjectsResult {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Deleted object information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedObject {
    pub key: String,
    pub version_id: Option<String>,
}

/// Delete error information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteError {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// Strip the quotes S3 puts around ETag values
pub(crate) fn unquote_etag(etag: &str) -> &str {
    etag.trim().trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_path_query_order() {
        let request = ListObjectsRequest::new("bucket")
            .with_max_keys(10)
            .with_delimiter("/")
            .with_marker("k 1")
            .with_prefix("COUNTRY/");
        assert_eq!(
            request.path(),
            "/?prefix=COUNTRY%2F&marker=k%201&delimiter=%2F&max-keys=10"
        );
        assert_eq!(ListObjectsRequest::new("bucket").path(), "/");
    }

    #[test]
    fn test_next_request() {
        let mut listing = ObjectListing {
            bucket_name: "bucket".to_string(),
            prefix: Some("p/".to_string()),
            max_keys: Some(2),
            truncated: true,
            next_marker: Some("p/b".to_string()),
            ..Default::default()
        };
        let next = listing.next_request().unwrap();
        assert_eq!(next.marker.as_deref(), Some("p/b"));
        assert_eq!(next.prefix.as_deref(), Some("p/"));

        listing.truncated = false;
        assert!(listing.next_request().is_none());
    }

    #[test]
    fn test_unquote_etag() {
        assert_eq!(unquote_etag("\"abc\""), "abc");
        assert_eq!(unquote_etag("abc"), "abc");
    }
}
