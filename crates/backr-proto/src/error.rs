use thiserror::Error;

/// Failures while parsing or validating protocol data.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// A field failed validation; the payload names the field.
    #[error("malformed {0}")]
    Malformed(&'static str),

    /// A reply status was none of `OK`, `NOK`, `ERR`.
    #[error("unrecognized status {0:?}")]
    BadStatus(String),

    /// A timestamp did not match `DD.MM.YYYY HH:MM:SS`.
    #[error("unparseable timestamp")]
    BadTimestamp,

    /// A listing announced more entries than it carried.
    #[error("listing shorter than its announced count")]
    BadCount,

    /// A reply started with the wrong verb for the request sent.
    #[error("expected a {expected} reply, got {got:?}")]
    UnexpectedReply {
        expected: &'static str,
        got: String,
    },
}
