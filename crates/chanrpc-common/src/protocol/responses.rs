//! Response envelope.

use serde::{Deserialize, Serialize};
use super::error::{ChanrpcError, Result};
use super::RequestId;

/// RPC method result (JSON value)
pub type RpcResult = serde_json::Value;

/// Reply to a [`Request`](super::Request).
///
/// A response with `success == false` carries the message of an error raised
/// by the remote operation. That is an application-level outcome: the
/// exchange itself completed and the channel that carried it is still sound.
///
/// # Example
///
/// ```
/// use chanrpc_common::protocol::Response;
/// use serde_json::json;
///
/// let ok = Response::success(7, json!(42));
/// assert_eq!(ok.into_result().unwrap(), json!(42));
///
/// let failed = Response::error(7, "insufficient funds");
/// assert!(failed.into_result().unwrap_err().is_application());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Request identifier this response corresponds to
    pub id: RequestId,
    /// Result value (present on success)
    pub result: Option<RpcResult>,
    /// Error message (present on failure)
    pub error: Option<String>,
    /// Whether the request succeeded
    pub success: bool,
}

impl Response {
    /// Creates a successful response.
    pub fn success(id: RequestId, result: RpcResult) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
            success: true,
        }
    }

    /// Creates an error response carrying a remote business error.
    pub fn error(id: RequestId, error: impl Into<String>) -> Self {
        Response {
            id,
            result: None,
            error: Some(error.into()),
            success: false,
        }
    }

    /// Converts the envelope into the operation's outcome.
    ///
    /// # Errors
    ///
    /// - [`ChanrpcError::Application`] when the remote operation failed
    /// - [`ChanrpcError::InvalidResponse`] when a success response has no result
    pub fn into_result(self) -> Result<RpcResult> {
        if self.success {
            self.result.ok_or_else(|| {
                ChanrpcError::InvalidResponse("Missing result in success response".to_string())
            })
        } else {
            Err(ChanrpcError::Application(
                self.error.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }
}
