//! The daemon as seen by client use cases.

use async_trait::async_trait;
use pasteboard_core::protocol::messages::MessageType;
use pasteboard_core::{PasteData, PasteboardError};
use thiserror::Error;

/// Errors a client call can end with.
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connection to the daemon failed.
    #[error("failed to connect to pasteboard daemon at {addr}: {source}")]
    ConnectFailed {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred on the established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The daemon closed the connection.
    #[error("connection closed by daemon")]
    Closed,
    /// The daemon answered with a reply of the wrong kind.
    #[error("unexpected reply {0:?}")]
    UnexpectedReply(MessageType),
    /// The daemon rejected the request.
    #[error("pasteboard error {}: {0}", .0.code())]
    Service(PasteboardError),
}

/// Requests a client can make of the daemon.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PasteboardPort: Send {
    async fn set_paste_data(&mut self, data: &PasteData) -> Result<(), ClientError>;

    async fn get_paste_data(&mut self) -> Result<PasteData, ClientError>;

    async fn has_paste_data(&mut self) -> Result<bool, ClientError>;

    async fn has_data_type(&mut self, mime_type: &str) -> Result<bool, ClientError>;

    async fn get_mime_types(&mut self) -> Result<Vec<String>, ClientError>;

    async fn clear(&mut self) -> Result<(), ClientError>;

    async fn get_change_count(&mut self) -> Result<u32, ClientError>;

    async fn is_remote_data(&mut self) -> Result<bool, ClientError>;

    async fn get_data_source(&mut self) -> Result<String, ClientError>;

    async fn get_remote_device_name(&mut self) -> Result<String, ClientError>;

    /// Round trip with no side effects; returns the echoed nonce.
    async fn ping(&mut self, nonce: u64) -> Result<u64, ClientError>;
}
