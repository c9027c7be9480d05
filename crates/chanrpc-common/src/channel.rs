//! Channel capability contract.
//!
//! A channel is an opened session to a remote service. Whatever operations the
//! service contract declares live on the concrete channel type; this module only
//! describes the lifecycle every channel shares and how new ones are opened.
//!
//! # Lifecycle
//!
//! ```text
//! create_channel() ──> Open ──(transport error)──> Faulted ──abort()──> Closed
//!                       │
//!                       └──────────close()────────────────────────────> Closed
//! ```

use async_trait::async_trait;

use crate::protocol::error::Result;

/// Health state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Usable for further calls
    Open,
    /// The underlying connection broke; the channel must be aborted
    Faulted,
    /// Closed or aborted; no further use
    Closed,
}

/// A pooled session to a remote service.
///
/// Implementors expose the service contract's operations as their own methods.
/// A channel is owned by exactly one holder at a time, so operations take
/// `&mut self`.
#[async_trait]
pub trait Channel: Send + 'static {
    /// Current health state.
    fn state(&self) -> ChannelState;

    /// Gracefully closes a healthy channel that is no longer needed.
    async fn close(&mut self) -> Result<()>;

    /// Tears the channel down immediately without any further I/O.
    ///
    /// Used for faulted channels and from drop paths, so it must not block.
    fn abort(&mut self);
}

/// Opens new channels to one remote endpoint.
#[async_trait]
pub trait ChannelFactory: Send + Sync + 'static {
    type Channel: Channel;

    /// Opens a new channel.
    ///
    /// # Errors
    ///
    /// Returns a communication-level error (typically
    /// [`ChanrpcError::EndpointNotFound`](crate::ChanrpcError::EndpointNotFound))
    /// when the endpoint cannot be reached or the channel cannot be opened.
    async fn create_channel(&self) -> Result<Self::Channel>;
}
