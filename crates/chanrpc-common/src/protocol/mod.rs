pub mod error;
pub mod requests;
pub mod responses;


pub use error::{ChanrpcError, FaultKind, Result};
pub use requests::{Request, RequestId, MethodName, RpcArgs};
pub use responses::{Response, RpcResult};
