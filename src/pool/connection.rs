//! Bounded HTTP/1.1 channel pool
//!
//! Every channel is a persistent connection to the single configured
//! endpoint. A channel carries at most one request at a time, so the pool
//! hands out exclusive leases ([`AcquiredChannel`]):
//!
//! - capacity is a semaphore with `max_connections` permits; a lease owns one
//! - callers that find no free permit wait up to `acquire_timeout`, and at
//!   most `max_pending_acquires` of them may wait at once
//! - channels are created lazily, idle ones are reused first
//! - idle channels unused for longer than `max_idle_time` are closed, on
//!   acquire and by the periodic sweep of [`ChannelPool::run_idle_reaper`]
//! - a lease ends exactly once, by `release` (back to the idle set) or by
//!   `close`/drop (connection torn down)

use bytes::Bytes;
use http_body_util::Full;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

use crate::auth::SignatureCalculator;
use crate::config::{ClientConfig, ConfigError};

/// Identifier of a pooled channel, unique for the lifetime of a pool
pub type ChannelId = u64;

/// Error types for channel pool operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Timed out after {0:?} waiting for a free channel")]
    AcquireTimeout(Duration),

    #[error("Too many pending acquires (limit {0})")]
    TooManyPendingAcquires(usize),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("HTTP handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("Channel pool is closed")]
    Closed,
}

/// Configuration for pool behavior
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Endpoint host
    pub host: String,

    /// Endpoint port
    pub port: u16,

    /// Maximum number of channels, idle or acquired
    pub max_connections: usize,

    /// Maximum number of callers waiting for a channel
    pub max_pending_acquires: usize,

    /// How long a caller waits for a channel
    pub acquire_timeout: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Idle channels older than this are closed (`None` keeps them)
    pub max_idle_time: Option<Duration>,
}

impl PoolConfig {
    pub fn from_client_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let (host, port) = config.endpoint_address()?;
        Ok(Self {
            host,
            port,
            max_connections: config.max_connections,
            max_pending_acquires: config.max_pending_acquires,
            acquire_timeout: config.acquire_timeout(),
            connect_timeout: config.connect_timeout(),
            max_idle_time: config.max_idle_time(),
        })
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Statistics for a channel pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total channels created
    pub total_created: u64,

    /// Total leases served by an idle channel
    pub total_reused: u64,

    /// Total channels torn down
    pub total_closed: u64,

    /// Channels currently leased
    pub acquired: usize,

    /// Channels waiting in the pool
    pub idle: usize,

    /// Callers waiting for a channel
    pub pending: usize,
}

/// A live connection plus its per-channel signing state
pub struct PooledConnection {
    id: ChannelId,

    /// The underlying HTTP/1.1 sender; dropping it shuts the connection down
    sender: http1::SendRequest<Full<Bytes>>,

    /// Signer owned by this channel, never shared
    signer: SignatureCalculator,

    created_at: Instant,

    last_used: Instant,

    /// Number of requests sent on this channel
    use_count: u64,
}

impl PooledConnection {
    fn new(id: ChannelId, sender: http1::SendRequest<Full<Bytes>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            sender,
            signer: SignatureCalculator::new(),
            created_at: now,
            last_used: now,
            use_count: 0,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    /// Idle channels are only reusable while the peer keeps them open
    fn is_healthy(&self) -> bool {
        !self.sender.is_closed()
    }

    fn is_reusable(&self, max_idle_time: Option<Duration>) -> bool {
        self.is_healthy() && max_idle_time.map_or(true, |max| self.last_used.elapsed() <= max)
    }

    pub fn signer(&mut self) -> &mut SignatureCalculator {
        &mut self.signer
    }

    /// Send one request. The caller must hold the channel's lease.
    pub async fn send(
        &mut self,
        request: hyper::Request<Full<Bytes>>,
    ) -> Result<hyper::Response<hyper::body::Incoming>, hyper::Error> {
        self.last_used = Instant::now();
        self.use_count += 1;
        self.sender.ready().await?;
        self.sender.send_request(request).await
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("use_count", &self.use_count)
            .field("age", &self.created_at.elapsed())
            .finish()
    }
}

struct PoolInner {
    config: PoolConfig,
    capacity: Arc<Semaphore>,
    idle: Mutex<Vec<PooledConnection>>,
    pending: AtomicUsize,
    acquired: AtomicUsize,
    next_id: AtomicU64,
    closed: AtomicBool,
    total_created: AtomicU64,
    total_reused: AtomicU64,
    total_closed: AtomicU64,
}

impl PoolInner {
    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<PooledConnection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the most recently used reusable idle channel, discarding dead
    /// and expired ones
    fn take_idle(&self) -> Option<PooledConnection> {
        let mut idle = self.idle();
        while let Some(conn) = idle.pop() {
            if conn.is_reusable(self.config.max_idle_time) {
                return Some(conn);
            }
            debug!(channel = conn.id, idle_for = ?conn.last_used.elapsed(), "Discarding stale idle channel");
            self.total_closed.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    fn return_idle(&self, mut conn: PooledConnection) {
        if self.closed.load(Ordering::Acquire) || !conn.is_healthy() {
            debug!(channel = conn.id, "Closing channel instead of pooling it");
            self.total_closed.fetch_add(1, Ordering::Relaxed);
            return;
        }
        debug!(channel = conn.id, use_count = conn.use_count, "Channel returned to pool");
        conn.last_used = Instant::now();
        self.idle().push(conn);
    }
}

/// Exclusive lease on one channel.
///
/// The lease is consumed by [`release`](Self::release) or
/// [`close`](Self::close). Dropping it without either closes the channel.
pub struct AcquiredChannel {
    connection: PooledConnection,
    guard: LeaseGuard,
}

impl AcquiredChannel {
    pub fn id(&self) -> ChannelId {
        self.connection.id
    }

    pub fn connection(&mut self) -> &mut PooledConnection {
        &mut self.connection
    }

    /// Return the channel to the pool for reuse
    pub fn release(self) {
        let AcquiredChannel { connection, mut guard } = self;
        guard.returned = true;
        guard.pool.return_idle(connection);
    }

    /// Tear the channel down
    pub fn close(self) {
        let AcquiredChannel { connection, guard } = self;
        debug!(channel = connection.id, "Closing channel");
        drop(connection);
        drop(guard);
    }
}

impl std::fmt::Debug for AcquiredChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquiredChannel")
            .field("connection", &self.connection)
            .finish()
    }
}

/// Holds the capacity permit and the acquired count for one lease
struct LeaseGuard {
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
    returned: bool,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if !self.returned {
            self.pool.total_closed.fetch_add(1, Ordering::Relaxed);
        }
        self.pool.acquired.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Decrements the pending-acquire count when a waiter leaves
struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Bounded pool of channels to one endpoint
#[derive(Clone)]
pub struct ChannelPool {
    inner: Arc<PoolInner>,
}

impl ChannelPool {
    /// Create a new pool. No connection is opened until the first acquire.
    pub fn new(config: PoolConfig) -> Self {
        info!(
            endpoint = %config.addr(),
            max_connections = config.max_connections,
            max_pending_acquires = config.max_pending_acquires,
            "Creating channel pool"
        );
        let capacity = Arc::new(Semaphore::new(config.max_connections));
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::with_capacity(config.max_connections)),
                config,
                capacity,
                pending: AtomicUsize::new(0),
                acquired: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                total_created: AtomicU64::new(0),
                total_reused: AtomicU64::new(0),
                total_closed: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Lease a channel, reusing an idle one or connecting a new one
    pub async fn acquire(&self) -> Result<AcquiredChannel, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let permit = match Arc::clone(&self.inner.capacity).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
            Err(TryAcquireError::NoPermits) => self.wait_for_permit().await?,
        };

        let connection = match self.inner.take_idle() {
            Some(conn) => {
                self.inner.total_reused.fetch_add(1, Ordering::Relaxed);
                debug!(channel = conn.id, use_count = conn.use_count, "Reusing channel");
                conn
            }
            None => self.connect().await?,
        };

        self.inner.acquired.fetch_add(1, Ordering::AcqRel);
        Ok(AcquiredChannel {
            connection,
            guard: LeaseGuard {
                pool: Arc::clone(&self.inner),
                _permit: permit,
                returned: false,
            },
        })
    }

    async fn wait_for_permit(&self) -> Result<OwnedSemaphorePermit, PoolError> {
        let max_pending = self.inner.config.max_pending_acquires;
        let pending = self.inner.pending.fetch_add(1, Ordering::AcqRel) + 1;
        let _pending = PendingGuard(&self.inner.pending);
        if pending > max_pending {
            warn!(pending, max_pending, "Rejecting acquire: too many pending");
            return Err(PoolError::TooManyPendingAcquires(max_pending));
        }

        let timeout = self.inner.config.acquire_timeout;
        match tokio::time::timeout(timeout, Arc::clone(&self.inner.capacity).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(PoolError::Closed),
            Err(_) => Err(PoolError::AcquireTimeout(timeout)),
        }
    }

    /// Open a new channel to the endpoint
    async fn connect(&self) -> Result<PooledConnection, PoolError> {
        let config = &self.inner.config;
        let addr = config.addr();

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| PoolError::ConnectTimeout {
                addr: addr.clone(),
                timeout: config.connect_timeout,
            })?
            .map_err(|source| PoolError::Connect {
                addr: addr.clone(),
                source,
            })?;

        // TCP_NODELAY + SO_KEEPALIVE
        let socket = socket2::SockRef::from(&stream);
        socket
            .set_nodelay(true)
            .and_then(|_| socket.set_keepalive(true))
            .map_err(|source| PoolError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let (sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(PoolError::Handshake)?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        // Spawn connection driver task
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(channel = id, error = %e, "Channel connection ended with error");
            }
        });

        let total_created = self.inner.total_created.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(channel = id, endpoint = %addr, total_created, "Created new channel");

        Ok(PooledConnection::new(id, sender))
    }

    /// Close idle channels that are dead or unused for longer than
    /// `max_idle_time`. Returns how many were closed.
    pub fn evict_idle(&self) -> usize {
        let max_idle_time = self.inner.config.max_idle_time;
        let evicted: Vec<PooledConnection> = {
            let mut idle = self.inner.idle();
            let (keep, evict): (Vec<_>, Vec<_>) = idle.drain(..).partition(|conn| conn.is_reusable(max_idle_time));
            *idle = keep;
            evict
        };

        let removed = evicted.len();
        if removed > 0 {
            self.inner.total_closed.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, remaining = self.inner.idle().len(), "Closed idle channels");
        }
        removed
    }

    /// Sweep idle channels every `max_idle_time` until the pool closes.
    /// Returns at once when idle channels never expire.
    pub async fn run_idle_reaper(self) {
        let Some(period) = self.inner.config.max_idle_time else {
            return;
        };

        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if self.is_closed() {
                break;
            }
            self.evict_idle();
        }
        debug!("Idle reaper stopped");
    }

    /// Number of channels currently leased
    pub fn acquired_connections(&self) -> usize {
        self.inner.acquired.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close all idle channels and refuse further acquires. Leased channels
    /// are closed as their leases end.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.capacity.close();
        let drained: Vec<PooledConnection> = self.inner.idle().drain(..).collect();
        self.inner
            .total_closed
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        info!(
            closed_idle = drained.len(),
            acquired = self.acquired_connections(),
            "Channel pool closed"
        );
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_created: self.inner.total_created.load(Ordering::Relaxed),
            total_reused: self.inner.total_reused.load(Ordering::Relaxed),
            total_closed: self.inner.total_closed.load(Ordering::Relaxed),
            acquired: self.acquired_connections(),
            idle: self.inner.idle().len(),
            pending: self.inner.pending.load(Ordering::Acquire),
        }
    }
}

impl std::fmt::Debug for ChannelPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}
