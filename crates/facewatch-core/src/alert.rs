use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("alert notification failed: {0}")]
    Failed(String),
    #[error("alert I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Audible notification fired once per accepted match.
///
/// Best-effort: the loop logs failures and carries on.
pub trait AlertSink: Send + Sync {
    fn notify(&self) -> Result<(), AlertError>;
}
