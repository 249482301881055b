//! Per-attempt completion handler
//!
//! A handler receives at most one of success, error or cancel. The first one
//! to arrive trips an atomic guard and is delivered; later arrivals are
//! dropped after giving back the channel they carry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::error::{Result, S3Error};
use super::parser::ResponseParser;
use crate::http::{CompletionSink, RawResponse};
use crate::pool::AcquiredChannel;
use crate::xml::ErrorDecoder;

pub struct CompletionHandler<P: ResponseParser> {
    parser: Arc<P>,
    errors: Arc<ErrorDecoder>,
    sender: Mutex<Option<oneshot::Sender<Result<P::Output>>>>,
    notified: AtomicBool,
}

impl<P: ResponseParser> CompletionHandler<P> {
    pub fn new(parser: Arc<P>, errors: Arc<ErrorDecoder>) -> (Arc<Self>, oneshot::Receiver<Result<P::Output>>) {
        let (tx, rx) = oneshot::channel();
        let handler = Arc::new(Self {
            parser,
            errors,
            sender: Mutex::new(Some(tx)),
            notified: AtomicBool::new(false),
        });
        (handler, rx)
    }

    /// Claim the right to notify. Succeeds exactly once.
    fn claim(&self) -> bool {
        self.notified
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn deliver(&self, result: Result<P::Output>) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sender) = sender {
            if sender.send(result).is_err() {
                trace!("Result receiver already gone");
            }
        }
    }

    /// Turn a response into the attempt's result: 200/204 go to the
    /// operation parser, anything else is decoded as an error document
    fn complete(&self, response: RawResponse) -> Result<P::Output> {
        if response.is_success() {
            return self.parser.parse(response);
        }
        let error = self.errors.decode_or_status(response.status.as_u16(), &response.body);
        debug!(status = error.status, code = %error.code, "S3 returned an error");
        Err(S3Error::Service(error))
    }

    fn finish_channel(channel: AcquiredChannel, keep_alive: bool) {
        if keep_alive {
            channel.release();
        } else {
            channel.close();
        }
    }
}

impl<P: ResponseParser> CompletionSink for CompletionHandler<P> {
    fn on_success(&self, response: RawResponse, channel: AcquiredChannel) {
        let keep_alive = response.keep_alive();
        if !self.claim() {
            debug!(channel = channel.id(), "Dropping late response");
            Self::finish_channel(channel, keep_alive);
            return;
        }

        // The body is fully read, so the channel is free before parsing
        Self::finish_channel(channel, keep_alive);

        let result = self.complete(response);
        self.deliver(result);
    }

    fn on_error(&self, error: S3Error, channel: Option<AcquiredChannel>) {
        if let Some(channel) = channel {
            warn!(channel = channel.id(), error = %error, "Force-closing channel after failure");
            channel.close();
        }
        if self.claim() {
            self.deliver(Err(error));
        } else {
            trace!(error = %error, "Dropping late error");
        }
    }

    fn on_cancel(&self) {
        if self.claim() {
            self.deliver(Err(S3Error::Cancelled));
        }
    }

    fn is_done(&self) -> bool {
        self.notified.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::parser::DiscardParser;
    use crate::pool::{ChannelPool, PoolConfig};
    use bytes::Bytes;
    use hyper::header::{HeaderValue, CONNECTION};
    use hyper::{HeaderMap, StatusCode, Version};
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn response(status: StatusCode, body: &'static str) -> RawResponse {
        RawResponse {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn handler() -> (Arc<CompletionHandler<DiscardParser>>, oneshot::Receiver<Result<()>>) {
        CompletionHandler::new(Arc::new(DiscardParser), Arc::new(ErrorDecoder::new()))
    }

    #[test]
    fn test_first_error_wins() {
        let (handler, mut rx) = handler();
        handler.on_error(S3Error::ChannelInactive, None);
        handler.on_cancel();
        handler.on_error(S3Error::Timeout(std::time::Duration::from_secs(1)), None);

        assert!(handler.is_done());
        assert!(matches!(rx.try_recv().unwrap(), Err(S3Error::ChannelInactive)));
    }

    #[test]
    fn test_cancel_then_error_delivers_cancel() {
        let (handler, mut rx) = handler();
        handler.on_cancel();
        handler.on_error(S3Error::ChannelInactive, None);
        assert!(matches!(rx.try_recv().unwrap(), Err(S3Error::Cancelled)));
    }

    #[test]
    fn test_concurrent_notifications_deliver_once() {
        for _ in 0..100 {
            let (handler, mut rx) = handler();
            let threads: Vec<_> = (0..4)
                .map(|i| {
                    let handler = Arc::clone(&handler);
                    std::thread::spawn(move || match i % 2 {
                        0 => handler.on_cancel(),
                        _ => handler.on_error(S3Error::ChannelInactive, None),
                    })
                })
                .collect();
            for thread in threads {
                thread.join().unwrap();
            }
            assert!(rx.try_recv().is_ok());
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_error_status_decodes_error_document() {
        let (handler, _rx) = handler();
        let body = "<Error><Code>AccessDenied</Code><Message>m</Message><RequestId>r</RequestId></Error>";

        match handler.complete(response(StatusCode::FORBIDDEN, body)) {
            Err(S3Error::Service(e)) => {
                assert_eq!(e.status, 403);
                assert_eq!(e.code, "AccessDenied");
                assert_eq!(e.message, "m");
                assert_eq!(e.request_id.as_deref(), Some("r"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_success_statuses_reach_parser() {
        let (handler, _rx) = handler();
        assert!(handler.complete(response(StatusCode::OK, "")).is_ok());
        assert!(handler.complete(response(StatusCode::NO_CONTENT, "")).is_ok());

        match handler.complete(response(StatusCode::INTERNAL_SERVER_ERROR, "")) {
            Err(S3Error::Service(e)) => {
                assert_eq!(e.status, 500);
                assert!(e.code.is_empty());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    /// Pool over a listener that accepts and never answers
    async fn pool(max_connections: usize) -> (ChannelPool, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let pool = ChannelPool::new(PoolConfig {
            host: "127.0.0.1".to_string(),
            port,
            max_connections,
            max_pending_acquires: 8,
            acquire_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
            max_idle_time: None,
        });
        (pool, server)
    }

    #[tokio::test]
    async fn test_late_successes_after_cancel_are_dropped() {
        let (pool, _server) = pool(2).await;
        let (handler, mut rx) = handler();

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        assert_eq!(pool.acquired_connections(), 2);

        handler.on_cancel();
        handler.on_success(response(StatusCode::OK, ""), first);
        handler.on_success(response(StatusCode::OK, ""), second);

        assert!(matches!(rx.try_recv().unwrap(), Err(S3Error::Cancelled)));
        assert!(rx.try_recv().is_err());
        assert_eq!(pool.acquired_connections(), 0);
        // keep-alive channels go back to the pool even when the result is dropped
        assert_eq!(pool.stats().idle, 2);
    }

    #[tokio::test]
    async fn test_success_after_error_is_dropped() {
        let (pool, _server) = pool(2).await;
        let (handler, mut rx) = handler();

        handler.on_error(S3Error::ChannelInactive, Some(pool.acquire().await.unwrap()));
        assert_eq!(pool.stats().total_closed, 1);

        handler.on_success(response(StatusCode::OK, ""), pool.acquire().await.unwrap());

        assert!(matches!(rx.try_recv().unwrap(), Err(S3Error::ChannelInactive)));
        assert_eq!(pool.acquired_connections(), 0);
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn test_duplicate_success_delivers_first() {
        let (pool, _server) = pool(2).await;
        let (handler, mut rx) = handler();

        handler.on_success(response(StatusCode::OK, ""), pool.acquire().await.unwrap());
        handler.on_success(response(StatusCode::FORBIDDEN, ""), pool.acquire().await.unwrap());
        handler.on_cancel();

        assert!(matches!(rx.try_recv().unwrap(), Ok(())));
        assert!(rx.try_recv().is_err());
        assert_eq!(pool.acquired_connections(), 0);
    }

    #[tokio::test]
    async fn test_late_success_without_keep_alive_closes_channel() {
        let (pool, _server) = pool(1).await;
        let (handler, mut rx) = handler();
        handler.on_cancel();

        let mut late = response(StatusCode::OK, "");
        late.headers.insert(CONNECTION, HeaderValue::from_static("close"));
        handler.on_success(late, pool.acquire().await.unwrap());

        assert!(matches!(rx.try_recv().unwrap(), Err(S3Error::Cancelled)));
        assert_eq!(pool.acquired_connections(), 0);
        assert_eq!(pool.stats().idle, 0);
        assert_eq!(pool.stats().total_closed, 1);
    }
}
