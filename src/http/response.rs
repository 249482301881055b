//! Fully aggregated responses

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::CONNECTION;
use hyper::{HeaderMap, Response, StatusCode, Version};

use crate::s3::S3Error;

/// Response with its whole body in memory
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    /// Whether the channel may carry another request after this response
    pub fn keep_alive(&self) -> bool {
        let connection = self
            .headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim);

        let mut keep_alive = self.version >= Version::HTTP_11;
        for token in connection {
            if token.eq_ignore_ascii_case("close") {
                return false;
            }
            if token.eq_ignore_ascii_case("keep-alive") {
                keep_alive = true;
            }
        }
        keep_alive
    }

    /// Statuses handed to the operation parser; everything else is an error
    /// document
    pub fn is_success(&self) -> bool {
        matches!(self.status, StatusCode::OK | StatusCode::NO_CONTENT)
    }
}

/// Read the whole body, failing once it exceeds `max_content_length`
pub async fn aggregate(response: Response<Incoming>, max_content_length: usize) -> Result<RawResponse, S3Error> {
    let (parts, body) = response.into_parts();
    let body = Limited::new(body, max_content_length)
        .collect()
        .await
        .map_err(|err| {
            if err.is::<LengthLimitError>() {
                return S3Error::BodyTooLarge {
                    limit: max_content_length,
                };
            }
            match err.downcast::<hyper::Error>() {
                Ok(err) => S3Error::from_hyper(*err),
                Err(_) => S3Error::ChannelInactive,
            }
        })?
        .to_bytes();

    Ok(RawResponse {
        status: parts.status,
        version: parts.version,
        headers: parts.headers,
        body,
    })
}
