//! Error types for the RelayMQ client library

/// Main error type for RelayMQ client operations
#[derive(Debug, thiserror::Error)]
pub enum BusClientError {
    /// Connection-related errors
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Wire protocol errors
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A subscription for the topic already exists on this client
    #[error("Already subscribed to topic {topic}")]
    AlreadySubscribed { topic: relaymq::TopicId },

    /// The connection or subscription was closed
    #[error("Closed: {message}")]
    Closed { message: String },
}

impl BusClientError {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new invalid config error
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a new closed error
    pub fn closed<S: Into<String>>(message: S) -> Self {
        Self::Closed {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Io(_)
        )
    }

    /// Check if this error is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Io(_) | Self::Closed { .. })
    }

    /// Check if this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<relaymq::BusError> for BusClientError {
    fn from(err: relaymq::BusError) -> Self {
        match err {
            relaymq::BusError::Io(e) => Self::Io(e),
            other => Self::Protocol {
                message: other.to_string(),
            },
        }
    }
}
