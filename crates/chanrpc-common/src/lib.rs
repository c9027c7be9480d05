//! ChanRPC Common Types
//!
//! Shared building blocks for the ChanRPC pooled client:
//!
//! - **Error taxonomy**: [`ChanrpcError`] and its [`FaultKind`] classification
//!   (application vs communication failures)
//! - **Channel capability**: the [`Channel`] / [`ChannelFactory`] contract the
//!   pool consumes
//! - **Reference transport**: a TCP [`Channel`] implementation in [`transport`]
//!
//! # Fault classification
//!
//! ```
//! use chanrpc_common::{ChanrpcError, FaultKind};
//!
//! let business = ChanrpcError::application("insufficient funds");
//! assert_eq!(business.fault_kind(), FaultKind::Application);
//!
//! let broken = ChanrpcError::Connection("reset by peer".into());
//! assert_eq!(broken.fault_kind(), FaultKind::Communication);
//! ```

pub mod channel;
pub mod protocol;
pub mod transport;

pub use channel::{Channel, ChannelFactory, ChannelState};
pub use protocol::*;
