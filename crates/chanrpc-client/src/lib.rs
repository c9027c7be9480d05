//! ChanRPC Client
//!
//! A pooled RPC client that reuses channels across calls and discards them
//! only when the transport underneath breaks.
//!
//! - [`RpcClient`]: the call dispatcher (acquire, invoke, classify, release or
//!   discard, retry or propagate)
//! - [`ChannelPool`] / [`DefaultChannelPool`]: demand-driven channel pool
//! - [`RetryPolicy`]: pluggable retry strategies ([`NoRetryPolicy`],
//!   [`FixedRetryPolicy`], [`ExponentialBackoffPolicy`])

pub mod client;
pub mod pool;
pub mod retry;


pub use client::{ClientConfig, RpcClient};
pub use pool::{ChannelPool, DefaultChannelPool, PoolStats};
pub use retry::{
    ExponentialBackoffPolicy, FixedRetryPolicy, NoRetryPolicy, RetryConfig, RetryDecision, RetryPolicy,
};
