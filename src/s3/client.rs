//! Asynchronous S3 client
//!
//! The client owns a small multi-threaded runtime. Every operation is spawned
//! onto it and returns a [`ResponseFuture`] immediately, so callers never
//! block on I/O and may await the result from any executor. Dropping the
//! future cancels the operation.
//!
//! Per operation:
//! - the retry policy drives attempts
//! - each attempt passes admission control, leases a channel, is signed and
//!   sent, and is completed by a [`CompletionHandler`]
//! - the handler parses 200/204 responses with the operation's parser and
//!   decodes every other status as an S3 error document

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::completion::CompletionHandler;
use super::error::{Result, S3Error};
use super::parser::{
    ConsumeBytesParser, DeleteResultParser, DiscardParser, ListingParser, PutObjectParser, ResponseParser,
};
use super::request::RequestDescriptor;
use super::retry::RetryPolicy;
use super::types::{
    DeleteObjectsResult, GetObjectResponse, ListObjectsRequest, ObjectListing, ObjectMetadata, PutObjectResponse,
};
use crate::auth::CredentialsProvider;
use crate::config::ClientConfig;
use crate::http::Transport;
use crate::pool::{AdmissionLimiter, AdmissionStats, PoolStats};
use crate::xml::{ErrorDecoder, ListingDecoder};

/// Handle to the eventual result of an operation.
///
/// Dropping it before completion cancels the operation: no result is
/// delivered and the channel in use is closed.
#[must_use = "dropping a ResponseFuture cancels the operation"]
pub struct ResponseFuture<T> {
    receiver: oneshot::Receiver<Result<T>>,
    cancel: CancellationToken,
}

impl<T> ResponseFuture<T> {
    fn ready(result: Result<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self {
            receiver: rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Withdraw the operation. The future then resolves to
    /// [`S3Error::Cancelled`] unless a result was already delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(S3Error::Closed)))
    }
}

impl<T> Drop for ResponseFuture<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ClientInner {
    transport: Transport,
    limiter: Arc<AdmissionLimiter>,
    retry: RetryPolicy,
    errors: Arc<ErrorDecoder>,
    listing: Arc<ListingDecoder>,
    closed: AtomicBool,
}

impl ClientInner {
    async fn execute<P: ResponseParser>(
        &self,
        request: &RequestDescriptor,
        parser: Arc<P>,
        cancel: &CancellationToken,
    ) -> Result<P::Output> {
        self.retry
            .run(cancel, |attempt| self.attempt(request, &parser, cancel, attempt))
            .await
    }

    async fn attempt<P: ResponseParser>(
        &self,
        request: &RequestDescriptor,
        parser: &Arc<P>,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> Result<P::Output> {
        let permit = self.limiter.try_acquire()?;
        if attempt > 1 {
            debug!(attempt, operation = %request.operation(), path = request.path(), "Reissuing request");
        }

        let (handler, result) = CompletionHandler::new(Arc::clone(parser), Arc::clone(&self.errors));
        self.transport.dispatch(request, handler, cancel).await;
        let result = result.await.unwrap_or_else(|_| Err(S3Error::Cancelled));

        match &result {
            Ok(_) => permit.success(),
            Err(_) => permit.ignore(),
        }
        result
    }
}

/// Asynchronous S3 client over a bounded channel pool
pub struct S3Client {
    inner: Arc<ClientInner>,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
}

impl S3Client {
    /// Create a client and start its worker threads. No connection is
    /// opened until the first request.
    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialsProvider>) -> Result<Self> {
        config.validate()?;
        let transport = Transport::new(&config, credentials)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("s3conduit-worker")
            .enable_all()
            .build()
            .map_err(S3Error::Runtime)?;
        let handle = runtime.handle().clone();
        handle.spawn(transport.pool().clone().run_idle_reaper());

        let inner = ClientInner {
            transport,
            limiter: AdmissionLimiter::new(config.max_in_flight),
            retry: RetryPolicy::from_config(&config),
            errors: Arc::new(ErrorDecoder::new()),
            listing: Arc::new(ListingDecoder::new(config.parse)),
            closed: AtomicBool::new(false),
        };

        info!(
            endpoint = %config.endpoint,
            max_connections = config.max_connections,
            max_idle_ms = config.max_idle_time_ms,
            worker_threads = config.worker_threads,
            max_retries = config.max_retries,
            "S3 client started"
        );

        Ok(Self {
            inner: Arc::new(inner),
            runtime: Mutex::new(Some(runtime)),
            handle,
        })
    }

    /// Send `request` and parse a successful response with `parser`
    pub fn send<P: ResponseParser>(&self, request: RequestDescriptor, parser: P) -> ResponseFuture<P::Output> {
        if self.is_closed() {
            return ResponseFuture::ready(Err(S3Error::Closed));
        }

        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let inner = Arc::clone(&self.inner);
        let parser = Arc::new(parser);

        self.handle.spawn(async move {
            let result = inner.execute(&request, parser, &token).await;
            if tx.send(result).is_err() {
                debug!(operation = %request.operation(), path = request.path(), "Caller went away before completion");
            }
        });

        ResponseFuture { receiver: rx, cancel }
    }

    pub fn get_object(&self, bucket: &str, key: &str) -> ResponseFuture<GetObjectResponse> {
        self.send(RequestDescriptor::get(bucket, key), ConsumeBytesParser)
    }

    pub fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: impl Into<Bytes>,
        metadata: ObjectMetadata,
    ) -> ResponseFuture<PutObjectResponse> {
        let mut request = RequestDescriptor::put(bucket, key, body);
        if let Some(content_type) = metadata.content_type {
            request = request.with_content_type(content_type);
        }
        if let Some(content_md5) = metadata.content_md5 {
            request = request.with_content_md5(content_md5);
        }
        self.send(request, PutObjectParser)
    }

    pub fn list_objects(&self, request: &ListObjectsRequest) -> ResponseFuture<ObjectListing> {
        let parser = ListingParser::new(Arc::clone(&self.inner.listing));
        self.send(RequestDescriptor::list(request), parser)
    }

    /// Fetch the page after `previous`. A listing that was not truncated
    /// yields an empty, non-truncated page without a request.
    pub fn list_next_batch(&self, previous: &ObjectListing) -> ResponseFuture<ObjectListing> {
        match previous.next_request() {
            Some(request) => self.list_objects(&request),
            None => ResponseFuture::ready(Ok(ObjectListing {
                bucket_name: previous.bucket_name.clone(),
                prefix: previous.prefix.clone(),
                delimiter: previous.delimiter.clone(),
                max_keys: previous.max_keys,
                ..Default::default()
            })),
        }
    }

    pub fn delete_object(&self, bucket: &str, key: &str) -> ResponseFuture<()> {
        self.send(RequestDescriptor::delete(bucket, key), DiscardParser)
    }

    /// Delete up to 1000 keys in one request
    pub fn delete_objects<S: AsRef<str>>(&self, bucket: &str, keys: &[S]) -> ResponseFuture<DeleteObjectsResult> {
        match RequestDescriptor::bulk_delete(bucket, keys) {
            Ok(request) => self.send(request, DeleteResultParser::default()),
            Err(e) => ResponseFuture::ready(Err(e)),
        }
    }

    /// Number of channels currently leased by in-flight requests
    pub fn acquired_connections(&self) -> usize {
        self.inner.transport.pool().acquired_connections()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.transport.pool().stats()
    }

    pub fn admission_stats(&self) -> AdmissionStats {
        self.inner.limiter.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close pooled channels and stop the workers. Operations still in
    /// flight resolve to [`S3Error::Closed`]; later calls fail immediately.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.transport.pool().close();
        let runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
        info!("S3 client closed");
    }
}

impl Drop for S3Client {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("pool", &self.pool_stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credentials, StaticCredentialsProvider};

    fn client() -> S3Client {
        let credentials = Credentials::new("AKID", "secret").unwrap();
        let config = ClientConfig::new("127.0.0.1:1").with_worker_threads(1);
        S3Client::new(config, Arc::new(StaticCredentialsProvider::new(credentials))).unwrap()
    }

    #[tokio::test]
    async fn test_closed_client_fails_fast() {
        let client = client();
        client.close();
        client.close();
        assert!(client.is_closed());
        assert!(matches!(client.get_object("b", "k").await, Err(S3Error::Closed)));
        assert_eq!(client.acquired_connections(), 0);
    }

    #[tokio::test]
    async fn test_list_next_batch_after_last_page() {
        let client = client();
        let last = ObjectListing {
            bucket_name: "bucket".to_string(),
            prefix: Some("p/".to_string()),
            truncated: false,
            object_summaries: vec![Default::default()],
            ..Default::default()
        };
        let next = client.list_next_batch(&last).await.unwrap();
        assert_eq!(next.bucket_name, "bucket");
        assert_eq!(next.prefix.as_deref(), Some("p/"));
        assert!(!next.truncated);
        assert!(next.object_summaries.is_empty());
        assert_eq!(client.pool_stats().total_created, 0);
    }

    #[tokio::test]
    async fn test_bulk_delete_validation() {
        let client = client();
        let keys: Vec<String> = Vec::new();
        assert!(matches!(
            client.delete_objects("bucket", &keys).await,
            Err(S3Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let credentials = Credentials::new("AKID", "secret").unwrap();
        let config = ClientConfig::new("host:notaport");
        let result = S3Client::new(config, Arc::new(StaticCredentialsProvider::new(credentials)));
        assert!(matches!(result, Err(S3Error::Config(_))));
    }
}
