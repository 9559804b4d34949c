use std::fmt::{self, Display, Formatter};
use std::io;

/// Errors arising from the line-delimited JSON transport itself: malformed frames, stdio
/// failures, or misuse of the RPC/type-handler registry.
#[derive(Debug)]
pub enum TransportError {
    /// A line on stdin was not valid JSON, or not a valid `Envelope`.
    MalformedFrame(serde_json::Error),
    /// Writing a frame to stdout failed.
    Io(io::Error),
    /// `on(type, ..)` was registered twice for the same message type.
    DuplicateHandler(String),
    /// An inbound frame had neither a matching pending RPC nor a registered type handler.
    Unhandled(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedFrame(e) => write!(f, "malformed frame: {}", e),
            Self::Io(e) => write!(f, "transport I/O error: {}", e),
            Self::DuplicateHandler(ty) => write!(f, "duplicate handler registered for type {}", ty),
            Self::Unhandled(ty) => write!(f, "no handler for message type {}", ty),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedFrame(err)
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Errors in the node's handling of the Raft/client protocol once a frame has been decoded.
#[derive(Debug)]
pub enum ProtocolError {
    /// `raft_init` arrived more than once.
    AlreadyInitialized,
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "node received raft_init more than once"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<raft::core::AlreadyInitialized> for ProtocolError {
    fn from(_: raft::core::AlreadyInitialized) -> Self {
        Self::AlreadyInitialized
    }
}
