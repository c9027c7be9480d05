use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::channel::{Channel, ChannelFactory, ChannelState};
use crate::protocol::{Request, RpcArgs, RpcResult};
use crate::protocol::error::{ChanrpcError, Result};
use crate::transport::codec::JsonCodec;

/// Maximum frame size (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Configuration for TCP channels.
///
/// # Default Configuration
///
/// - `addr`: `127.0.0.1:8080`
/// - `connect_timeout_ms`: 5000
/// - `call_timeout_ms`: 30000
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpChannelConfig {
    /// Remote endpoint address (e.g., "127.0.0.1:8080")
    pub addr: String,
    /// Maximum time to establish the connection, in milliseconds
    pub connect_timeout_ms: u64,
    /// Deadline for one request/response round trip, in milliseconds
    pub call_timeout_ms: u64,
}

impl Default for TcpChannelConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            connect_timeout_ms: 5000,
            call_timeout_ms: 30000,
        }
    }
}

impl TcpChannelConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Opens [`TcpChannel`]s to a single endpoint.
///
/// # Example
///
/// ```no_run
/// use chanrpc_common::channel::ChannelFactory;
/// use chanrpc_common::transport::{TcpChannelConfig, TcpChannelFactory};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let factory = TcpChannelFactory::new(TcpChannelConfig::new("127.0.0.1:20001"));
/// let mut channel = factory.create_channel().await?;
/// let reply = channel.invoke("echo_int", json!(42)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TcpChannelFactory {
    config: TcpChannelConfig,
}

impl TcpChannelFactory {
    pub fn new(config: TcpChannelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpChannelConfig {
        &self.config
    }
}

#[async_trait]
impl ChannelFactory for TcpChannelFactory {
    type Channel = TcpChannel;

    async fn create_channel(&self) -> Result<TcpChannel> {
        let addr = self.config.addr.as_str();
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);

        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ChanrpcError::Timeout(self.config.connect_timeout_ms))?
            .map_err(|e| ChanrpcError::EndpointNotFound(format!("{}: {}", addr, e)))?;

        stream
            .set_nodelay(true)
            .map_err(|e| ChanrpcError::Connection(format!("Failed to set TCP_NODELAY: {}", e)))?;

        tracing::debug!(addr = %addr, "TCP channel opened");

        Ok(TcpChannel {
            stream: Some(stream),
            addr: addr.to_string(),
            state: ChannelState::Open,
            call_timeout: Duration::from_millis(self.config.call_timeout_ms),
        })
    }
}

/// A keep-alive TCP session carrying length-prefixed JSON envelopes.
///
/// Wire format: `[4-byte length as u32 big-endian] + [JSON data]`
///
/// Any I/O failure, decode failure or missed deadline flips the channel to
/// [`ChannelState::Faulted`]. A remote error response does not: the exchange
/// completed and the stream is still in sync.
pub struct TcpChannel {
    stream: Option<TcpStream>,
    addr: String,
    state: ChannelState,
    call_timeout: Duration,
}

impl TcpChannel {
    /// The endpoint this channel is connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Invokes `method` on the remote service and waits for its reply.
    ///
    /// # Errors
    ///
    /// - [`ChanrpcError::Application`] if the remote operation failed
    /// - [`ChanrpcError::Timeout`] if the round trip exceeded the call deadline
    /// - [`ChanrpcError::ChannelFaulted`] if the channel is no longer open
    /// - any other communication error if the stream broke
    pub async fn invoke(&mut self, method: &str, args: RpcArgs) -> Result<RpcResult> {
        if self.state != ChannelState::Open {
            return Err(ChanrpcError::ChannelFaulted(format!(
                "channel to {} is {:?}",
                self.addr, self.state
            )));
        }
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => {
                self.state = ChannelState::Faulted;
                return Err(ChanrpcError::ChannelFaulted(format!("channel to {} has no stream", self.addr)));
            }
        };

        let request = Request::new(method, args);
        let exchange = async {
            let encoded = JsonCodec::encode_request(&request)?;
            write_frame(stream, &encoded).await?;
            let data = read_frame(stream)
                .await?
                .ok_or_else(|| ChanrpcError::Connection("Connection closed by peer".to_string()))?;
            JsonCodec::decode_response(&data)
        };

        let response = match tokio::time::timeout(self.call_timeout, exchange).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.state = ChannelState::Faulted;
                return Err(e);
            }
            Err(_) => {
                self.state = ChannelState::Faulted;
                return Err(ChanrpcError::Timeout(u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX)));
            }
        };

        if response.id != request.id {
            self.state = ChannelState::Faulted;
            return Err(ChanrpcError::InvalidResponse(format!(
                "response id {} does not match request id {}",
                response.id, request.id
            )));
        }

        response.into_result()
    }
}

#[async_trait]
impl Channel for TcpChannel {
    fn state(&self) -> ChannelState {
        self.state
    }

    async fn close(&mut self) -> Result<()> {
        self.state = ChannelState::Closed;
        if let Some(mut stream) = self.stream.take() {
            stream
                .shutdown()
                .await
                .map_err(|e| map_io_error(e, "shutting down stream"))?;
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.state = ChannelState::Closed;
        // Dropping the stream closes the socket without a graceful shutdown
        self.stream = None;
    }
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(stream: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ChanrpcError::Transport(format!(
            "Message too large: {} bytes (max {} bytes)",
            data.len(),
            MAX_MESSAGE_SIZE
        )));
    }
    let len = data.len() as u32;

    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| map_io_error(e, "writing length prefix"))?;
    stream
        .write_all(data)
        .await
        .map_err(|e| map_io_error(e, "writing data"))?;
    stream
        .flush()
        .await
        .map_err(|e| map_io_error(e, "flushing stream"))?;

    Ok(())
}

/// Reads one length-prefixed frame.
///
/// Returns `Ok(None)` if the peer closed the connection cleanly before a new
/// frame started.
pub async fn read_frame<R>(stream: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(map_io_error(e, "reading length prefix")),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ChanrpcError::InvalidResponse(format!(
            "Message too large: {} bytes (max {} bytes)",
            len, MAX_MESSAGE_SIZE
        )));
    }

    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| map_io_error(e, "reading data"))?;

    Ok(Some(buf))
}

/// Maps I/O errors onto the error taxonomy.
///
/// - Connection errors and socket timeouts -> `Connection`
/// - Other I/O errors -> `Io`
fn map_io_error(err: std::io::Error, context: &str) -> ChanrpcError {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            ChanrpcError::Connection(format!("{}: socket timed out", context))
        }
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::UnexpectedEof => {
            ChanrpcError::Connection(format!("{}: Connection lost", context))
        }
        _ => ChanrpcError::Io(err),
    }
}
