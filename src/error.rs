//! Error types for the KageControl client

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur when using the KageControl client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection to the server failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The login endpoint rejected the credentials or answered with garbage
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Server answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response (DNS, TLS, timeout, ...)
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// WebSocket transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Failed to serialize/deserialize a payload
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credential storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A base URL or path could not be turned into a URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The reconnect policy gave up
    #[error("Gave up after {0} reconnect attempts")]
    RetriesExhausted(u32),
}

impl ClientError {
    /// HTTP status carried by this error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the server rejected the bearer credential
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Result type for KageControl operations
pub type Result<T> = std::result::Result<T, ClientError>;
