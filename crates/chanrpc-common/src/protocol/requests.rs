use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

pub type RequestId = u64;
pub type MethodName = String;
pub type RpcArgs = serde_json::Value;

/// A single operation invocation sent over a channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: MethodName,
    pub args: RpcArgs,
}

impl Request {
    pub fn new(method: impl Into<String>, args: RpcArgs) -> Self {
        Request {
            id: next_request_id(),
            method: method.into(),
            args,
        }
    }
}

/// Process-unique request id.
///
/// High word: the second the process issued its first request.
/// Low word: a wrapping sequence number.
fn next_request_id() -> RequestId {
    static PROCESS_EPOCH: OnceLock<u64> = OnceLock::new();
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let epoch = *PROCESS_EPOCH.get_or_init(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    });
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed) & u64::from(u32::MAX);

    (epoch << 32) | sequence
}
