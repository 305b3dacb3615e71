use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures the pipeline converts into a structured `FrameResult`.
///
/// None of these cross the pipeline boundary as an `Err`; they only decide the
/// message, the `ErrorKind` tag and which counter is bumped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("invalid frame data: {0}")]
    InvalidInput(String),

    #[error("rate limit exceeded for client '{0}'")]
    RateLimited(String),

    #[error("processing failed: {0}")]
    ProcessingFailure(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput(_) => ErrorKind::InvalidInput,
            PipelineError::RateLimited(_) => ErrorKind::RateLimited,
            PipelineError::ProcessingFailure(_) => ErrorKind::ProcessingFailure,
            PipelineError::InternalError(_) => ErrorKind::InternalError,
        }
    }

    /// Short translation text shown to callers in place of a sign.
    pub fn headline(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "Invalid frame",
            PipelineError::RateLimited(_) => "Rate limit exceeded",
            PipelineError::ProcessingFailure(_) | PipelineError::InternalError(_) => {
                "Processing error"
            }
        }
    }

    /// Rate-limit rejections are tracked on their own counter, never as failures.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, PipelineError::RateLimited(_))
    }
}

/// Serializable tag for the error carried by a `FrameResult`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    RateLimited,
    ProcessingFailure,
    InternalError,
}
