//! Reference TCP channel adapter.
//!
//! Adapts a keep-alive TCP connection to the [`Channel`](crate::channel::Channel)
//! contract so the pool and dispatcher can be exercised against a real socket.
//!
//! # Wire Format
//!
//! `[4-byte length prefix as u32 big-endian] + [JSON data]`, one
//! [`Request`](crate::protocol::Request) per frame answered by one
//! [`Response`](crate::protocol::Response) frame. Frames above 100 MB are
//! rejected.
//!
//! # Components
//!
//! - **[`JsonCodec`]**: Encode/decode envelopes
//! - **[`TcpChannelFactory`]**: Opens channels to one endpoint
//! - **[`TcpChannel`]**: One open session; exposes [`TcpChannel::invoke`]
//! - **[`read_frame`] / [`write_frame`]**: Framing helpers shared with peers

pub mod codec;
pub mod tcp;

pub use codec::JsonCodec;
pub use tcp::{read_frame, write_frame, TcpChannel, TcpChannelConfig, TcpChannelFactory, MAX_MESSAGE_SIZE};
