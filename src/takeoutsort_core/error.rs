use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TakeoutError>;

#[derive(Error, Debug)]
pub enum TakeoutError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walker error: {0}")]
    Walkdir(#[from] walkdir::Error),

    #[error("Argument error: {0}")]
    Argument(String),

    #[error("Missing required path: {0}")]
    MissingRequiredPath(String),

    #[error("Input path not found: {0}")]
    InputNotFound(PathBuf),

    #[error("No Google Photos folder could be located under {0}")]
    PathResolutionFailed(PathBuf),

    #[error("Output directory is not writable: {0}")]
    OutputNotWritable(PathBuf),

    #[error("Insufficient disk space on the output volume (need ~{needed_mb} MB, have {available_mb} MB)")]
    InsufficientDiskSpace { needed_mb: u64, available_mb: u64 },

    #[error("Path sanitization produced an empty name from {0:?}")]
    InvalidPath(String),

    #[error("Exiftool error: {0}")]
    Exiftool(String),

    #[error("Date parsing error: {0}")]
    InvalidDateFormat(String),

    #[error("Link creation unsupported for {path}: {reason}")]
    LinkUnsupported { path: PathBuf, reason: String },

    #[error("Pipeline step '{0}' failed: {1}")]
    StepFailed(String, String),
}

impl TakeoutError {
    /// Process exit code for this error when it escapes to `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            TakeoutError::Argument(_) => 2,
            TakeoutError::MissingRequiredPath(_) => 10,
            TakeoutError::InputNotFound(_) => 11,
            TakeoutError::PathResolutionFailed(_) => 12,
            TakeoutError::OutputNotWritable(_) => 13,
            TakeoutError::InsufficientDiskSpace { .. } => 69,
            _ => 1,
        }
    }
}

impl PartialEq for TakeoutError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TakeoutError::Io(_), TakeoutError::Io(_)) => true,
            (TakeoutError::Walkdir(_), TakeoutError::Walkdir(_)) => true,
            (TakeoutError::Argument(a), TakeoutError::Argument(b)) => a == b,
            (TakeoutError::MissingRequiredPath(a), TakeoutError::MissingRequiredPath(b)) => a == b,
            (TakeoutError::InputNotFound(a), TakeoutError::InputNotFound(b)) => a == b,
            (TakeoutError::PathResolutionFailed(a), TakeoutError::PathResolutionFailed(b)) => {
                a == b
            }
            (TakeoutError::OutputNotWritable(a), TakeoutError::OutputNotWritable(b)) => a == b,
            (
                TakeoutError::InsufficientDiskSpace { .. },
                TakeoutError::InsufficientDiskSpace { .. },
            ) => true,
            (TakeoutError::InvalidPath(a), TakeoutError::InvalidPath(b)) => a == b,
            (TakeoutError::Exiftool(a), TakeoutError::Exiftool(b)) => a == b,
            (TakeoutError::InvalidDateFormat(a), TakeoutError::InvalidDateFormat(b)) => a == b,
            (
                TakeoutError::LinkUnsupported { path: a, .. },
                TakeoutError::LinkUnsupported { path: b, .. },
            ) => a == b,
            (TakeoutError::StepFailed(a, _), TakeoutError::StepFailed(b, _)) => a == b,
            _ => false,
        }
    }
}
