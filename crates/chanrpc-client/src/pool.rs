use async_trait::async_trait;
use chanrpc_common::{Channel, ChannelFactory, ChannelState, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Source of channels for the dispatcher.
///
/// The pool knows nothing about failure classification. It only obeys the
/// `healthy` flag passed to [`release_channel`](Self::release_channel).
///
/// # Contract
///
/// - A channel handed out by [`get_channel`](Self::get_channel) is owned by
///   the caller until it is passed back to `release_channel`, exactly once.
/// - `get_channel` never waits for another caller to release a channel; the
///   pool grows to meet demand.
/// - [`pool_size`](Self::pool_size) counts live channels: created and not yet
///   discarded, whether idle or checked out.
#[async_trait]
pub trait ChannelPool: Send + Sync + 'static {
    type Channel: Channel;

    /// Returns an idle open channel, or opens a new one.
    ///
    /// # Errors
    ///
    /// Returns the factory's communication error if a new channel cannot be
    /// opened. Pool accounting is left untouched in that case.
    async fn get_channel(&self) -> Result<Self::Channel>;

    /// Returns a channel to the pool.
    ///
    /// Healthy channels go back to the idle set. Unhealthy channels are
    /// aborted and removed from the live count; they are never reused.
    fn release_channel(&self, channel: Self::Channel, healthy: bool);

    /// Number of live channels.
    fn pool_size(&self) -> usize;

    /// Closes every idle channel.
    async fn close(&self) {}
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Live channels (idle + checked out)
    pub live: usize,
    /// Channels waiting in the idle set
    pub idle: usize,
    /// Channels opened since the pool was created
    pub created: u64,
    /// Channels aborted or closed since the pool was created
    pub discarded: u64,
}

/// Demand-driven channel pool for one service endpoint.
///
/// # Architecture
///
/// - Channels are opened lazily through the [`ChannelFactory`]
/// - LIFO (last-in-first-out) reuse of idle channels
/// - Idle channels that are no longer `Open` are discarded on acquisition
/// - No upper bound: under N concurrent callers the pool settles at N channels
///
/// # Thread Safety
///
/// The idle set lives behind a mutex that is never held across an await;
/// counters are atomics. Channel creation happens outside the lock.
///
/// # Example
///
/// ```rust,no_run
/// use chanrpc_client::{ChannelPool, DefaultChannelPool};
/// use chanrpc_common::transport::{TcpChannelConfig, TcpChannelFactory};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = DefaultChannelPool::new(TcpChannelFactory::new(TcpChannelConfig::new("127.0.0.1:20001")));
///
/// let channel = pool.get_channel().await?;
/// // Use the channel...
/// pool.release_channel(channel, true);
///
/// assert_eq!(pool.pool_size(), 1);
/// assert_eq!(pool.idle_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct DefaultChannelPool<F: ChannelFactory> {
    factory: F,
    idle: Mutex<Vec<F::Channel>>,
    live: AtomicUsize,
    created: AtomicU64,
    discarded: AtomicU64,
}

impl<F: ChannelFactory> DefaultChannelPool<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            idle: Mutex::new(Vec::new()),
            live: AtomicUsize::new(0),
            created: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live: self.live.load(Ordering::SeqCst),
            idle: self.idle_count(),
            created: self.created.load(Ordering::SeqCst),
            discarded: self.discarded.load(Ordering::SeqCst),
        }
    }

    fn discard(&self, mut channel: F::Channel) {
        channel.abort();
        self.forget_live();
    }

    /// Drops one channel from the live count.
    ///
    /// The count saturates at zero: a channel this pool never opened leaves
    /// it untouched and is reported.
    fn forget_live(&self) {
        if self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
        {
            warn!("Discarded a channel the pool was not tracking; live count already zero");
        }
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<F: ChannelFactory> ChannelPool for DefaultChannelPool<F> {
    type Channel = F::Channel;

    async fn get_channel(&self) -> Result<F::Channel> {
        loop {
            let candidate = self.idle.lock().pop();
            match candidate {
                Some(channel) if channel.state() == ChannelState::Open => return Ok(channel),
                Some(channel) => {
                    debug!(state = ?channel.state(), "Removing stale channel from pool");
                    self.discard(channel);
                }
                None => break,
            }
        }

        // No idle channel - open a new one (without holding the lock)
        let channel = self.factory.create_channel().await?;
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.created.fetch_add(1, Ordering::SeqCst);
        debug!(live, "Opened new channel");

        Ok(channel)
    }

    fn release_channel(&self, channel: F::Channel, healthy: bool) {
        if healthy && channel.state() == ChannelState::Open {
            self.idle.lock().push(channel);
            return;
        }

        if healthy {
            debug!(state = ?channel.state(), "Channel released as healthy but no longer open, discarding");
        }
        self.discard(channel);
        debug!(live = self.live.load(Ordering::SeqCst), "Discarded channel");
    }

    fn pool_size(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        let drained: Vec<F::Channel> = std::mem::take(&mut *self.idle.lock());
        let count = drained.len();

        for mut channel in drained {
            if let Err(e) = channel.close().await {
                warn!(error = %e, "Failed to close idle channel gracefully, aborting");
                channel.abort();
            }
            self.forget_live();
        }

        info!(closed = count, live = self.live.load(Ordering::SeqCst), "Channel pool closed");
    }
}
