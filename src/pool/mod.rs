//! Channel pooling and admission control
//!
//! This module provides:
//! - A bounded pool of persistent HTTP/1.1 channels to one endpoint
//! - Exclusive, consume-once channel leases
//! - An admission limiter that rejects attempts before they reach the pool

pub mod connection;
pub mod limiter;

pub use connection::{AcquiredChannel, ChannelId, ChannelPool, PoolConfig, PoolError, PoolStats, PooledConnection};
pub use limiter::{AdmissionError, AdmissionLimiter, AdmissionPermit, AdmissionStats};
