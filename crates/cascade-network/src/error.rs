//! Network error types

use cascade_storage::StorageError;
use thiserror::Error;

/// Network errors
#[derive(Debug, Error)]
pub enum NetworkError {
    /// IO error, including a listen address already in use
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer store error
    #[error("peer store error: {0}")]
    Storage(#[from] StorageError),

    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Already connected
    #[error("already connected to peer: {0}")]
    AlreadyConnected(String),

    /// Invalid message
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timeout
    #[error("timeout: {0}")]
    Timeout(String),

    /// Network has been closed
    #[error("network closed")]
    Closed,

    /// Channel closed
    #[error("channel closed")]
    ChannelClosed,
}

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err: NetworkError = io_err.into();
        let msg = format!("{}", err);
        assert!(msg.contains("IO error"));
        assert!(msg.contains("address in use"));
    }

    #[test]
    fn test_error_storage() {
        let err: NetworkError = StorageError::NotOpen.into();
        assert!(format!("{}", err).contains("peer store"));
    }

    #[test]
    fn test_error_protocol() {
        let err = NetworkError::Protocol("version mismatch".into());
        let msg = format!("{}", err);
        assert!(msg.contains("protocol error"));
        assert!(msg.contains("version mismatch"));
    }

    #[test]
    fn test_error_closed() {
        assert_eq!(format!("{}", NetworkError::Closed), "network closed");
    }
}
