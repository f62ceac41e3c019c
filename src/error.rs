//! Error kinds surfaced by the adapter.

use thiserror::Error;

/// Errors the adapter can produce.
///
/// Mirrors the error kinds from the design: config problems are caught
/// before a connection is attempted, transport/auth errors come from the
/// XMPP stream, decode errors are logged and dropped rather than
/// propagated, and the remaining variants cover outbound/pairing/dispatch
/// failure paths.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Missing or invalid account configuration (e.g. empty JID/password).
    #[error("config error: {0}")]
    Config(String),

    /// Transport-level failure: connect, timeout, or an unexpected close.
    #[error("transport error: {0}")]
    Transport(String),

    /// SASL authentication failed.
    #[error("authentication error: {0}")]
    Auth(String),

    /// A stanza failed to decode. Never fatal; the stanza is dropped.
    #[error("stanza decode error: {0}")]
    StanzaDecode(String),

    /// An outbound send was rejected because the target was not a valid JID.
    #[error("invalid outbound target: {0}")]
    InvalidTarget(String),

    /// The pairing store failed; the inbound message is still dropped.
    #[error("pairing store error: {0}")]
    PairingStore(String),

    /// A reply-delivery callback failed.
    #[error("dispatch error ({kind}): {source}")]
    Dispatch {
        /// Whether the failure happened delivering a stream chunk or a block.
        kind: DispatchKind,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
}

/// Which delivery mode failed during dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// Failed while streaming an incremental chunk.
    Stream,
    /// Failed while delivering a complete block.
    Block,
}

impl std::fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream => write!(f, "stream"),
            Self::Block => write!(f, "block"),
        }
    }
}

impl From<tokio_xmpp::Error> for AdapterError {
    fn from(err: tokio_xmpp::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
