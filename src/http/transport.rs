//! Dispatch of a single attempt over a pooled channel

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::demux::{CompletionSink, Demultiplexer};
use super::response::{aggregate, RawResponse};
use crate::auth::CredentialsProvider;
use crate::config::{ClientConfig, ConfigError};
use crate::pool::{ChannelPool, PoolConfig, PooledConnection};
use crate::s3::{RequestDescriptor, S3Error};

enum Outcome {
    Response(RawResponse),
    Failed(S3Error),
    Cancelled,
}

/// Sends signed requests to one endpoint over the channel pool
pub struct Transport {
    pool: ChannelPool,
    demux: Demultiplexer,
    credentials: Arc<dyn CredentialsProvider>,
    endpoint_host: String,
    endpoint_port: u16,
    request_timeout: Duration,
    max_content_length: usize,
}

impl Transport {
    pub fn new(config: &ClientConfig, credentials: Arc<dyn CredentialsProvider>) -> Result<Self, ConfigError> {
        let pool_config = PoolConfig::from_client_config(config)?;
        Ok(Self {
            endpoint_host: pool_config.host.clone(),
            endpoint_port: pool_config.port,
            pool: ChannelPool::new(pool_config),
            demux: Demultiplexer::new(),
            credentials,
            request_timeout: config.request_timeout(),
            max_content_length: config.max_content_length,
        })
    }

    pub fn pool(&self) -> &ChannelPool {
        &self.pool
    }

    pub fn demux(&self) -> &Demultiplexer {
        &self.demux
    }

    /// Run one attempt of `request`. The outcome, including cancellation,
    /// is always reported to `sink`, and the channel is released or closed
    /// before this returns.
    pub async fn dispatch(&self, request: &RequestDescriptor, sink: Arc<dyn CompletionSink>, cancel: &CancellationToken) {
        let acquired = tokio::select! {
            _ = cancel.cancelled() => {
                sink.on_cancel();
                return;
            }
            acquired = self.pool.acquire() => acquired,
        };
        let mut channel = match acquired {
            Ok(channel) => channel,
            Err(e) => {
                sink.on_error(e.into(), None);
                return;
            }
        };

        if sink.is_done() {
            channel.release();
            return;
        }

        let credentials = self.credentials.credentials();
        let signed = channel
            .connection()
            .signer()
            .sign(request.signing_input(), &credentials);
        let host = request.virtual_host(&self.endpoint_host, self.endpoint_port);
        let http_request = match request.to_http_request(&host, &signed) {
            Ok(http_request) => http_request,
            Err(e) => {
                sink.on_error(e, Some(channel));
                return;
            }
        };

        let channel_id = channel.id();
        let _attached = self.demux.attach(channel_id, Arc::clone(&sink));
        debug!(
            channel = channel_id,
            operation = %request.operation(),
            bucket = request.bucket(),
            path = request.path(),
            "Sending request"
        );

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Outcome::Cancelled,
            result = tokio::time::timeout(
                self.request_timeout,
                exchange(channel.connection(), http_request, self.max_content_length),
            ) => match result {
                Ok(Ok(response)) => Outcome::Response(response),
                Ok(Err(e)) => Outcome::Failed(e),
                Err(_) => Outcome::Failed(S3Error::Timeout(self.request_timeout)),
            },
        };

        match outcome {
            Outcome::Response(response) => {
                trace!(channel = channel_id, status = response.status.as_u16(), body = ?response.body, "Response received");
                self.demux.route_response(channel, response);
            }
            Outcome::Failed(S3Error::ChannelInactive) => self.demux.route_inactive(channel),
            Outcome::Failed(e) => self.demux.route_error(channel, e),
            Outcome::Cancelled => {
                debug!(channel = channel_id, "Request cancelled mid-flight, closing channel");
                if let Some(sink) = self.demux.detach(channel_id) {
                    sink.on_cancel();
                }
                channel.close();
            }
        }
    }
}

/// Write the request and read the complete response
async fn exchange(
    connection: &mut PooledConnection,
    request: hyper::Request<http_body_util::Full<bytes::Bytes>>,
    max_content_length: usize,
) -> Result<RawResponse, S3Error> {
    let response = connection.send(request).await.map_err(S3Error::from_hyper)?;
    aggregate(response, max_content_length).await
}
