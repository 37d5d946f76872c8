use thiserror::Error;

#[derive(Debug, Error)]
pub enum GimbalError {
    #[error("rotator I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out waiting for rotator reply")]
    Timeout,
    #[error("cannot connect to rotator at {address}: {message}")]
    ConnectionFailed { address: String, message: String },
    #[error("malformed rotator reply: {0}")]
    Malformed(String),
    /// Nonzero `RPRT` status.
    #[error("rotator rejected `{command}` with code {code}")]
    Rejected { command: String, code: i32 },
    #[error("rotator not connected")]
    NotConnected,
}

impl GimbalError {
    /// Errors after which the link can no longer be trusted.
    pub fn is_transport(&self) -> bool {
        !matches!(self, GimbalError::Rejected { .. })
    }
}
