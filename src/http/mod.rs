//! HTTP plumbing between the channel pool and completion handlers
//!
//! - [`Transport`] signs and sends one attempt over a leased channel
//! - [`Demultiplexer`] routes the channel's outcome to its owner
//! - [`RawResponse`] is the aggregated response handed to parsers

pub mod demux;
pub mod response;
pub mod transport;

pub use demux::{Attachment, CompletionSink, Demultiplexer};
pub use response::{aggregate, RawResponse};
pub use transport::Transport;
