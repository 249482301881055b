//! Routing of channel events to the request that owns the channel
//!
//! While a request is on the wire its completion sink is attached to the
//! channel id in a side table. Whoever reads the channel routes the outcome
//! through [`Demultiplexer`] without knowing which request it belongs to.
//! Routing detaches the sink, so a channel is never owned by two requests
//! and a channel with no owner is closed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, trace};

use super::RawResponse;
use crate::pool::{AcquiredChannel, ChannelId};
use crate::s3::S3Error;

/// Receiver of the terminal outcome of one attempt.
///
/// Every method consumes the channel it is handed: the sink decides whether
/// it goes back to the pool or is closed.
pub trait CompletionSink: Send + Sync {
    fn on_success(&self, response: RawResponse, channel: AcquiredChannel);

    fn on_error(&self, error: S3Error, channel: Option<AcquiredChannel>);

    fn on_cancel(&self);

    /// Whether a terminal notification was already delivered
    fn is_done(&self) -> bool;
}

#[derive(Default)]
pub struct Demultiplexer {
    routes: Mutex<HashMap<ChannelId, Arc<dyn CompletionSink>>>,
}

impl Demultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    fn routes(&self) -> MutexGuard<'_, HashMap<ChannelId, Arc<dyn CompletionSink>>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `sink` the owner of `channel` until the returned guard is
    /// dropped or an outcome is routed
    pub fn attach(&self, channel: ChannelId, sink: Arc<dyn CompletionSink>) -> Attachment<'_> {
        if self.routes().insert(channel, sink).is_some() {
            error!(channel, "Channel was still attached to another request");
        }
        trace!(channel, "Attached completion handler");
        Attachment { demux: self, channel }
    }

    pub fn detach(&self, channel: ChannelId) -> Option<Arc<dyn CompletionSink>> {
        self.routes().remove(&channel)
    }

    pub fn route_response(&self, channel: AcquiredChannel, response: RawResponse) {
        match self.detach(channel.id()) {
            Some(sink) => sink.on_success(response, channel),
            None => {
                error!(
                    channel = channel.id(),
                    status = response.status.as_u16(),
                    "Response on a channel with no owning handler"
                );
                channel.close();
            }
        }
    }

    pub fn route_error(&self, channel: AcquiredChannel, err: S3Error) {
        match self.detach(channel.id()) {
            Some(sink) => sink.on_error(err, Some(channel)),
            None => {
                error!(channel = channel.id(), error = %err, "Error on a channel with no owning handler");
                channel.close();
            }
        }
    }

    /// The channel went inactive before a response arrived
    pub fn route_inactive(&self, channel: AcquiredChannel) {
        self.route_error(channel, S3Error::ChannelInactive);
    }

    /// Number of channels with an attached handler
    pub fn len(&self) -> usize {
        self.routes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Detaches the channel's sink when the attempt is abandoned
pub struct Attachment<'a> {
    demux: &'a Demultiplexer,
    channel: ChannelId,
}

impl Drop for Attachment<'_> {
    fn drop(&mut self) {
        if self.demux.detach(self.channel).is_some() {
            trace!(channel = self.channel, "Detached abandoned completion handler");
        }
    }
}
