//! S3 `<Error>` document handlers

use super::{DecodeError, HandlerStack, HandlerTable, ResponseDecoder, TagHandler};
use crate::s3::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTag {
    Error,
    Code,
    Message,
    Resource,
    RequestId,
    Unknown,
}

impl TagHandler for ErrorTag {
    type Context = ServiceError;

    fn on_text(self, ctx: &mut ServiceError, text: &str, stack: &HandlerStack<Self>) -> Result<(), DecodeError> {
        if stack.top_minus_one() != Some(ErrorTag::Error) {
            return Ok(());
        }
        match self {
            ErrorTag::Code => ctx.code.push_str(text),
            ErrorTag::Message => ctx.message.push_str(text),
            ErrorTag::Resource => ctx.resource.get_or_insert_with(String::new).push_str(text),
            ErrorTag::RequestId => ctx.request_id.get_or_insert_with(String::new).push_str(text),
            ErrorTag::Error | ErrorTag::Unknown => {}
        }
        Ok(())
    }
}

pub fn error_handlers() -> HandlerTable<ErrorTag> {
    HandlerTable::new(ErrorTag::Unknown)
        .with("Error", ErrorTag::Error)
        .with("Code", ErrorTag::Code)
        .with("Message", ErrorTag::Message)
        .with("Resource", ErrorTag::Resource)
        .with("RequestId", ErrorTag::RequestId)
}

/// Decodes error documents returned with non-success statuses
#[derive(Debug, Clone)]
pub struct ErrorDecoder {
    decoder: ResponseDecoder<ErrorTag>,
}

impl ErrorDecoder {
    pub fn new() -> Self {
        Self {
            decoder: ResponseDecoder::new(error_handlers()),
        }
    }

    pub fn decode(&self, status: u16, body: &[u8]) -> Result<ServiceError, DecodeError> {
        let mut error = ServiceError::new(status);
        self.decoder.decode(body, &mut error)?;
        Ok(error)
    }

    /// Decode `body`, falling back to a status-only error when the body is
    /// empty or not an error document
    pub fn decode_or_status(&self, status: u16, body: &[u8]) -> ServiceError {
        if body.is_empty() {
            return ServiceError::new(status);
        }
        match self.decode(status, body) {
            Ok(error) => error,
            Err(e) => {
                tracing::debug!("Undecodable error body for status {}: {}", status, e);
                ServiceError::new(status)
            }
        }
    }
}

impl Default for ErrorDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_DENIED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
  <Code>AccessDenied</Code>
  <Message>Access Denied</Message>
  <Resource>/bucket/key</Resource>
  <RequestId>656c76696e6727732072657175657374</RequestId>
  <HostId>Uuag1LuByRx9e6j5Onimru9pO4ZVKnJ2Qz7/C1NPcfTWAtRPfTaOFg==</HostId>
</Error>"#;

    #[test]
    fn test_decode_access_denied() {
        let error = ErrorDecoder::new().decode(403, ACCESS_DENIED.as_bytes()).unwrap();
        assert_eq!(error.status, 403);
        assert_eq!(error.code, "AccessDenied");
        assert_eq!(error.message, "Access Denied");
        assert_eq!(error.resource.as_deref(), Some("/bucket/key"));
        assert_eq!(error.request_id.as_deref(), Some("656c76696e6727732072657175657374"));
    }

    #[test]
    fn test_fallback_to_status() {
        let decoder = ErrorDecoder::new();

        let error = decoder.decode_or_status(500, b"");
        assert_eq!(error.status, 500);
        assert!(error.code.is_empty());

        let error = decoder.decode_or_status(502, b"<html><body>Bad Gateway");
        assert_eq!(error.status, 502);
        assert!(error.code.is_empty());
    }

    #[test]
    fn test_nested_code_is_ignored() {
        let body = "<Error><Code>SlowDown</Code><Detail><Code>inner</Code></Detail></Error>";
        let error = ErrorDecoder::new().decode(503, body.as_bytes()).unwrap();
        assert_eq!(error.code, "SlowDown");
    }
}
