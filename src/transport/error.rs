// Transport Errors - Connection establishment and per-channel I/O failures

use thiserror::Error;

/// Errors raised while binding, dialing or negotiating a channel
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Address has no /p2p peer id: {0}")]
    MissingPeerId(String),

    #[error("Unsupported address: {0}")]
    UnsupportedAddress(String),

    #[error("No known address for peer {0}")]
    NoKnownAddress(String),

    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to {address} failed: {source}")]
    ConnectionFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation timed out")]
    Timeout,

    #[error("Cancelled by shutdown")]
    Cancelled,

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol mismatch: expected {expected}, got {got}")]
    ProtocolMismatch { expected: String, got: String },

    #[error("Peer id mismatch: expected {expected}, got {got}")]
    PeerIdMismatch { expected: String, got: String },

    #[error("Secure channel mismatch: local secure={local}, remote secure={remote}")]
    SecureMismatch { local: bool, remote: bool },

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Errors on an established channel
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Frame encoding failed: {0}")]
    EncodeFailed(String),
}

impl ChannelError {
    /// Whether the reader may skip this frame and keep going
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChannelError::MalformedFrame(_) | ChannelError::FrameTooLarge { .. }
        )
    }
}
