//! Error taxonomy for the match server.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Bad credentials, an unknown user, or a user id already signed in.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// A read or write exhausted its retry budget. Mid-match this is treated
    /// as an implicit forfeit; in the idle state it ends the session.
    #[error("timed out waiting on the connection")]
    ProtocolTimeout,

    /// Admission or match-slot capacity reached.
    #[error("server at capacity")]
    CapacityExceeded,

    /// A protocol invariant broke. Fatal to the affected match or session
    /// only, never to the process.
    #[error("invariant violated: {0}")]
    InvariantViolation(&'static str),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// A request line did not carry the fields its state requires.
    #[error("malformed request line")]
    MalformedRequest,

    #[error("bad accounts file: {0}")]
    BadAccountsFile(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
