use thiserror::Error;

/// Which side of the wire a failure came from.
///
/// The dispatcher decides what to do with a channel purely from this tag:
/// application failures leave the channel reusable, communication failures
/// mean the channel is broken and must be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The remote operation itself reported an error as part of its business logic.
    Application,
    /// The channel or the connection underneath it is broken.
    Communication,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultKind::Application => write!(f, "application"),
            FaultKind::Communication => write!(f, "communication"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ChanrpcError {
    #[error("Application error: {0}")]
    Application(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Channel faulted: {0}")]
    ChannelFaulted(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChanrpcError {
    /// Shorthand for an application-level error raised by remote business logic.
    pub fn application(message: impl Into<String>) -> Self {
        ChanrpcError::Application(message.into())
    }

    /// Classifies this error.
    ///
    /// Only [`ChanrpcError::Application`] is an application failure. Everything
    /// else, including codec errors, means the stream can no longer be trusted.
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            ChanrpcError::Application(_) => FaultKind::Application,
            ChanrpcError::Connection(_)
            | ChanrpcError::EndpointNotFound(_)
            | ChanrpcError::Timeout(_)
            | ChanrpcError::ChannelFaulted(_)
            | ChanrpcError::Transport(_)
            | ChanrpcError::InvalidResponse(_)
            | ChanrpcError::JsonSerialization(_)
            | ChanrpcError::Io(_) => FaultKind::Communication,
        }
    }

    pub fn is_application(&self) -> bool {
        self.fault_kind() == FaultKind::Application
    }

    pub fn is_communication(&self) -> bool {
        self.fault_kind() == FaultKind::Communication
    }
}

pub type Result<T> = std::result::Result<T, ChanrpcError>;
