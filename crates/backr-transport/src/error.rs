use thiserror::Error;

/// Failures raised by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer did not answer within the configured deadline.
    #[error("operation timed out")]
    Timeout,

    /// The peer closed the connection mid-message.
    #[error("connection closed by peer")]
    Closed,

    /// A protocol token grew past [`crate::MAX_TOKEN`] without a separator.
    #[error("token exceeds {0} bytes")]
    TokenTooLong(usize),

    /// A protocol token contained bytes outside of UTF-8.
    #[error("token is not valid UTF-8")]
    NotUtf8,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
