//! S3 operations over the channel pool
//!
//! This module provides:
//! - The request descriptor for GET, PUT, LIST, DELETE and bulk delete
//! - Response parsers and the exactly-once completion handler
//! - Bounded retry with linear backoff
//! - The asynchronous [`S3Client`] tying them together

pub mod client;
pub mod completion;
pub mod error;
pub mod parser;
pub mod request;
pub mod retry;
pub mod types;

pub use client::{ResponseFuture, S3Client};
pub use completion::CompletionHandler;
pub use error::{Result, RetryClass, S3Error, ServiceError};
pub use parser::{
    ConsumeBytesParser, DeleteResultParser, DiscardParser, ListingParser, PutObjectParser, ResponseParser,
};
pub use request::{object_path, RequestDescriptor};
pub use retry::RetryPolicy;
pub use types::{
    DeleteError, DeleteObjectsResult, DeletedObject, GetObjectResponse, ListObjectsRequest, ObjectListing,
    ObjectMetadata, ObjectSummary, Owner, PutObjectResponse, MAX_DELETE_KEYS,
};
