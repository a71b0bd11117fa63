//! Browser gateway error types.

use thiserror::Error;

/// Errors surfaced at the job boundary.
///
/// Failures below the boundary (per-selector classification errors,
/// per-field extraction errors, snippet-enrichment fetch errors, soft
/// selector-wait timeouts) are recovered locally and never appear here.
/// A BLOCKED outcome is not an error either; it travels in [`crate::types::JobOutput`].
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The shared session could not be created or relaunched.
    #[error("session unavailable: {0}")]
    SessionUnavailable(String),

    /// The shared session died while a job was holding it.
    #[error("session crashed: {0}")]
    SessionCrashed(String),

    #[error("navigation timed out after {0}ms")]
    NavigationTimeout(u64),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("JavaScript evaluation failed: {0}")]
    EvalFailed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("job queue closed")]
    QueueClosed,

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Cdp(err.to_string())
    }
}

pub type Error = BrowserError;
pub type Result<T> = std::result::Result<T, BrowserError>;

impl lantern_common::FromMessage for BrowserError {
    fn from_message(message: String) -> Self {
        BrowserError::Other(anyhow::anyhow!(message))
    }
}

lantern_common::impl_context!();
