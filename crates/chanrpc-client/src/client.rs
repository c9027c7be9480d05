use chanrpc_common::{ChanrpcError, ChannelFactory, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::pool::{ChannelPool, DefaultChannelPool};
use crate::retry::{NoRetryPolicy, RetryDecision, RetryPolicy};

/// Client-side call settings.
///
/// # Default Configuration
///
/// - `call_timeout_ms`: `None` (deadlines are left to the channel)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Deadline for a single attempt, in milliseconds
    ///
    /// An attempt that misses the deadline is a communication failure and its
    /// channel is discarded.
    pub call_timeout_ms: Option<u64>,
}

impl ClientConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// Pooled RPC client.
///
/// Every call borrows a channel from the pool, runs the caller's operation on
/// it, and hands the channel back according to how the operation ended:
///
/// | outcome                  | channel                     | retry?            |
/// |--------------------------|-----------------------------|-------------------|
/// | success                  | released healthy            | no                |
/// | application failure      | released healthy            | only if the policy opts in |
/// | communication failure    | discarded                   | per policy, on a fresh channel |
///
/// When the policy gives up, the last failure is returned unchanged so the
/// caller can tell transport problems from business problems with
/// [`ChanrpcError::fault_kind`].
///
/// # Example
///
/// ```no_run
/// use chanrpc_client::RpcClient;
/// use chanrpc_common::transport::{TcpChannelConfig, TcpChannelFactory};
/// use futures::FutureExt;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RpcClient::new(TcpChannelFactory::new(TcpChannelConfig::new("127.0.0.1:20001")));
///
/// let reply = client
///     .call(|channel| channel.invoke("echo_int", json!(42)).boxed())
///     .await?;
/// assert_eq!(reply, json!(42));
/// # Ok(())
/// # }
/// ```
pub struct RpcClient<P: ChannelPool> {
    pool: Arc<P>,
    retry_policy: Arc<dyn RetryPolicy>,
    config: ClientConfig,
}

impl<P: ChannelPool> Clone for RpcClient<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            retry_policy: self.retry_policy.clone(),
            config: self.config.clone(),
        }
    }
}

impl<F: ChannelFactory> RpcClient<DefaultChannelPool<F>> {
    /// Creates a client with a fresh [`DefaultChannelPool`] and no retries.
    pub fn new(factory: F) -> Self {
        Self::with_pool(DefaultChannelPool::new(factory), NoRetryPolicy)
    }
}

impl<P: ChannelPool> RpcClient<P> {
    pub fn with_pool(pool: P, retry_policy: impl RetryPolicy + 'static) -> Self {
        Self::with_shared_pool(Arc::new(pool), Arc::new(retry_policy))
    }

    /// Creates a client over a pool that other clients or observers also hold.
    pub fn with_shared_pool(pool: Arc<P>, retry_policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            pool,
            retry_policy,
            config: ClientConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn pool_size(&self) -> usize {
        self.pool.pool_size()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Closes the idle channels of the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Runs `op` against a pooled channel, retrying per the retry policy.
    ///
    /// `op` may run several times (once per attempt), each time on a channel
    /// freshly acquired from the pool. A retried operation that is not
    /// idempotent may take effect on the remote side more than once.
    ///
    /// # Errors
    ///
    /// Returns the failure of the last attempt once the policy gives up:
    /// - a communication error if the channel could not be opened or broke
    /// - the application error raised by the remote operation
    pub async fn call<T, Op>(&self, mut op: Op) -> Result<T>
    where
        T: Send,
        Op: for<'c> FnMut(&'c mut P::Channel) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let error = match self.attempt(&mut op).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let fault = error.fault_kind();
            match self.retry_policy.should_retry(fault, attempt) {
                RetryDecision::GiveUp => {
                    debug!(attempt, %fault, error = %error, "Call failed");
                    return Err(error);
                }
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "Call failed with {} error (attempt {}): {}, retrying in {}ms",
                        fault,
                        attempt,
                        error,
                        delay.as_millis()
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// One acquire / invoke / release cycle.
    async fn attempt<T, Op>(&self, op: &mut Op) -> Result<T>
    where
        T: Send,
        Op: for<'c> FnMut(&'c mut P::Channel) -> BoxFuture<'c, Result<T>> + Send,
    {
        let channel = self.pool.get_channel().await?;
        let mut lease = ChannelLease::new(self.pool.as_ref(), channel);

        let outcome = match lease.channel.as_mut() {
            Some(channel) => match self.config.call_timeout_ms {
                Some(timeout_ms) => {
                    match tokio::time::timeout(Duration::from_millis(timeout_ms), op(channel)).await {
                        Ok(result) => result,
                        Err(_) => Err(ChanrpcError::Timeout(timeout_ms)),
                    }
                }
                None => op(channel).await,
            },
            None => Err(ChanrpcError::ChannelFaulted("lease holds no channel".to_string())),
        };

        let healthy = match &outcome {
            Ok(_) => true,
            Err(e) => e.is_application(),
        };
        lease.release(healthy);

        outcome
    }
}

/// A checked-out channel.
///
/// Released exactly once: explicitly through [`release`](Self::release), or
/// as unhealthy when dropped while still holding the channel (the call future
/// was cancelled or the operation panicked).
struct ChannelLease<'p, P: ChannelPool> {
    pool: &'p P,
    channel: Option<P::Channel>,
}

impl<'p, P: ChannelPool> ChannelLease<'p, P> {
    fn new(pool: &'p P, channel: P::Channel) -> Self {
        Self {
            pool,
            channel: Some(channel),
        }
    }

    fn release(mut self, healthy: bool) {
        if let Some(channel) = self.channel.take() {
            self.pool.release_channel(channel, healthy);
        }
    }
}

impl<P: ChannelPool> Drop for ChannelLease<'_, P> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            warn!("Call abandoned while holding a channel, discarding it");
            self.pool.release_channel(channel, false);
        }
    }
}
