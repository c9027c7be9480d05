//! Shared harness for the client integration tests.
//!
//! - [`EchoService`]: the service contract the tests call through
//! - [`CountingPool`]: wraps a real pool and counts acquire/release traffic
//! - [`MockEndpoint`] / [`MockFactory`]: in-memory endpoint that can go down,
//!   come back, and restart (breaking every open channel)
//! - [`EchoServer`]: a real TCP echo service for the reference transport

#![allow(dead_code)]

use async_trait::async_trait;
use chanrpc_client::ChannelPool;
use chanrpc_common::transport::{read_frame, write_frame, JsonCodec, TcpChannel};
use chanrpc_common::{ChanrpcError, Channel, ChannelFactory, ChannelState, Response, Result};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

/// Installs a fmt subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Service contract
// ============================================================================

#[async_trait]
pub trait EchoService {
    async fn echo_int(&mut self, value: i64) -> Result<i64>;

    /// Always raises an application error.
    async fn fail(&mut self) -> Result<i64>;
}

#[async_trait]
impl EchoService for TcpChannel {
    async fn echo_int(&mut self, value: i64) -> Result<i64> {
        let reply = self.invoke("echo_int", json!(value)).await?;
        Ok(serde_json::from_value(reply)?)
    }

    async fn fail(&mut self) -> Result<i64> {
        let reply = self.invoke("fail", json!(null)).await?;
        Ok(serde_json::from_value(reply)?)
    }
}

// ============================================================================
// Counting pool double
// ============================================================================

/// Delegates to a real pool and records every acquire and release.
pub struct CountingPool<P> {
    inner: P,
    gets: AtomicUsize,
    healthy_releases: AtomicUsize,
    unhealthy_releases: AtomicUsize,
}

impl<P: ChannelPool> CountingPool<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            healthy_releases: AtomicUsize::new(0),
            unhealthy_releases: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn healthy_releases(&self) -> usize {
        self.healthy_releases.load(Ordering::SeqCst)
    }

    pub fn unhealthy_releases(&self) -> usize {
        self.unhealthy_releases.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.healthy_releases() + self.unhealthy_releases()
    }
}

#[async_trait]
impl<P: ChannelPool> ChannelPool for CountingPool<P> {
    type Channel = P::Channel;

    async fn get_channel(&self) -> Result<P::Channel> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_channel().await
    }

    fn release_channel(&self, channel: P::Channel, healthy: bool) {
        if healthy {
            self.healthy_releases.fetch_add(1, Ordering::SeqCst);
        } else {
            self.unhealthy_releases.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.release_channel(channel, healthy);
    }

    fn pool_size(&self) -> usize {
        self.inner.pool_size()
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

// ============================================================================
// In-memory endpoint
// ============================================================================

pub struct MockEndpoint {
    reachable: AtomicBool,
    generation: AtomicU64,
    opened: AtomicUsize,
    side_effects: AtomicUsize,
    drop_replies: AtomicBool,
    latency_ms: AtomicU64,
}

impl MockEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            opened: AtomicUsize::new(0),
            side_effects: AtomicUsize::new(0),
            drop_replies: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        })
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Breaks every channel opened before the restart.
    pub fn restart(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// When set, side-effecting operations run but their reply is lost.
    pub fn set_drop_replies(&self, drop: bool) {
        self.drop_replies.store(drop, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    pub fn channels_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn side_effects(&self) -> usize {
        self.side_effects.load(Ordering::SeqCst)
    }
}

pub struct MockChannel {
    id: u64,
    state: ChannelState,
    generation: u64,
    endpoint: Arc<MockEndpoint>,
}

impl MockChannel {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Increments a remote counter. Not idempotent.
    pub async fn deposit(&mut self) -> Result<usize> {
        self.check_link()?;
        let total = self.endpoint.side_effects.fetch_add(1, Ordering::SeqCst) + 1;
        if self.endpoint.drop_replies.load(Ordering::SeqCst) {
            self.state = ChannelState::Faulted;
            return Err(ChanrpcError::Connection("connection reset before reply".to_string()));
        }
        Ok(total)
    }

    async fn round_trip(&mut self) -> Result<()> {
        self.check_link()?;
        let latency = self.endpoint.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        } else {
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    fn check_link(&mut self) -> Result<()> {
        if self.state != ChannelState::Open {
            return Err(ChanrpcError::ChannelFaulted(format!("mock channel {} is {:?}", self.id, self.state)));
        }
        let reachable = self.endpoint.reachable.load(Ordering::SeqCst);
        if !reachable || self.endpoint.generation.load(Ordering::SeqCst) != self.generation {
            self.state = ChannelState::Faulted;
            return Err(ChanrpcError::Connection("connection aborted by remote host".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EchoService for MockChannel {
    async fn echo_int(&mut self, value: i64) -> Result<i64> {
        self.round_trip().await?;
        Ok(value)
    }

    async fn fail(&mut self) -> Result<i64> {
        self.round_trip().await?;
        Err(ChanrpcError::application("mock service failure"))
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn state(&self) -> ChannelState {
        self.state
    }

    async fn close(&mut self) -> Result<()> {
        self.state = ChannelState::Closed;
        Ok(())
    }

    fn abort(&mut self) {
        self.state = ChannelState::Closed;
    }
}

pub struct MockFactory {
    endpoint: Arc<MockEndpoint>,
    next_id: AtomicU64,
}

impl MockFactory {
    pub fn new(endpoint: Arc<MockEndpoint>) -> Self {
        Self {
            endpoint,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl ChannelFactory for MockFactory {
    type Channel = MockChannel;

    async fn create_channel(&self) -> Result<MockChannel> {
        if !self.endpoint.reachable.load(Ordering::SeqCst) {
            return Err(ChanrpcError::EndpointNotFound("mock://endpoint".to_string()));
        }
        self.endpoint.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockChannel {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            state: ChannelState::Open,
            generation: self.endpoint.generation.load(Ordering::SeqCst),
            endpoint: self.endpoint.clone(),
        })
    }
}

// ============================================================================
// TCP echo server
// ============================================================================

/// Echo service over the reference TCP framing.
///
/// Methods: `echo_int` (returns its argument), `fail` (application error),
/// `sleep` (waits `args` milliseconds, then echoes).
pub struct EchoServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl EchoServer {
    /// Starts a server on a random loopback port.
    pub async fn start() -> Self {
        Self::bind("127.0.0.1:0".parse().unwrap()).await
    }

    pub async fn bind(addr: SocketAddr) -> Self {
        let socket = TcpSocket::new_v4().unwrap();
        socket.set_reuseaddr(true).unwrap();
        socket.bind(addr).unwrap();
        let listener = socket.listen(1024).unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => {
                        if let Ok((stream, _)) = accepted {
                            connections.spawn(handle_connection(stream));
                        }
                    }
                }
            }
            // Drops every open connection, breaking the clients' channels
            connections.shutdown().await;
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// Stops accepting and closes every open connection.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    /// Stops the server and starts a new one on the same port.
    pub async fn restart(mut self) -> Self {
        let addr = self.addr;
        self.stop().await;
        Self::bind(addr).await
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn handle_connection(mut stream: TcpStream) {
    while let Ok(Some(frame)) = read_frame(&mut stream).await {
        let response = match JsonCodec::decode_request(&frame) {
            Ok(request) => match request.method.as_str() {
                "echo_int" => Response::success(request.id, request.args),
                "fail" => Response::error(request.id, "mock service failure"),
                "sleep" => {
                    let ms = request.args.as_u64().unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Response::success(request.id, request.args)
                }
                other => Response::error(request.id, format!("unknown method: {}", other)),
            },
            Err(e) => Response::error(0, e.to_string()),
        };

        let encoded = match JsonCodec::encode_response(&response) {
            Ok(encoded) => encoded,
            Err(_) => return,
        };
        if write_frame(&mut stream, &encoded).await.is_err() {
            return;
        }
    }
}
