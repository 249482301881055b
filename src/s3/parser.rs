//! Operation-specific response parsers
//!
//! A parser turns a successful (200/204) response into the operation's typed
//! result. It owns the response, so the body buffer is released exactly once
//! whichever way parsing ends.

use hyper::header::{CONTENT_LENGTH, ETAG};
use std::sync::Arc;

use super::error::Result;
use super::types::{unquote_etag, DeleteObjectsResult, GetObjectResponse, ObjectListing, PutObjectResponse};
use crate::http::RawResponse;
use crate::xml::{DeleteResultDecoder, ListingDecoder};

pub trait ResponseParser: Send + Sync + 'static {
    type Output: Send + 'static;

    fn parse(&self, response: RawResponse) -> Result<Self::Output>;
}

/// LIST: streams the `ListBucketResult` document into an [`ObjectListing`]
#[derive(Debug, Clone)]
pub struct ListingParser {
    decoder: Arc<ListingDecoder>,
}

impl ListingParser {
    pub fn new(decoder: Arc<ListingDecoder>) -> Self {
        Self { decoder }
    }
}

impl ResponseParser for ListingParser {
    type Output = ObjectListing;

    fn parse(&self, response: RawResponse) -> Result<ObjectListing> {
        Ok(self.decoder.decode(&response.body)?)
    }
}

/// GET: hands the body over as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumeBytesParser;

impl ResponseParser for ConsumeBytesParser {
    type Output = GetObjectResponse;

    fn parse(&self, response: RawResponse) -> Result<GetObjectResponse> {
        let length = response
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(response.body.len() as u64);
        let etag = header_etag(&response);

        Ok(GetObjectResponse {
            content: response.body,
            length,
            etag,
            headers: response.headers,
        })
    }
}

/// PUT: keeps only the ETag
#[derive(Debug, Clone, Copy, Default)]
pub struct PutObjectParser;

impl ResponseParser for PutObjectParser {
    type Output = PutObjectResponse;

    fn parse(&self, response: RawResponse) -> Result<PutObjectResponse> {
        Ok(PutObjectResponse {
            etag: header_etag(&response),
        })
    }
}

/// DELETE: success carries no payload
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardParser;

impl ResponseParser for DiscardParser {
    type Output = ();

    fn parse(&self, _response: RawResponse) -> Result<()> {
        Ok(())
    }
}

/// BULK_DELETE: decodes the `DeleteResult` document
#[derive(Debug, Clone, Default)]
pub struct DeleteResultParser {
    decoder: DeleteResultDecoder,
}

impl ResponseParser for DeleteResultParser {
    type Output = DeleteObjectsResult;

    fn parse(&self, response: RawResponse) -> Result<DeleteObjectsResult> {
        Ok(self.decoder.decode(&response.body)?)
    }
}

fn header_etag(response: &RawResponse) -> Option<String> {
    response
        .headers
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(|value| unquote_etag(value).to_string())
}
