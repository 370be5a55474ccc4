use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExifPipeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("ExifTool executable not found: {0}")]
    ExecutableNotFound(std::io::Error),

    /// The reply's `SourceFile` does not name the file we asked about.
    ///
    /// This means the request and reply streams have desynchronized, so it
    /// is never downgraded to a warning.
    #[error("reply is for '{got}' but the request was for '{expected}'")]
    SourceFileMismatch { expected: String, got: String },

    #[error("worker process terminated before replying")]
    ProcessTerminated,

    #[error("supervisor is closed, no further commands accepted")]
    SupervisorClosed,

    #[error("stderr channel for the worker disconnected")]
    StderrDisconnected,

    /// The worker did not confirm the write. Carries its reply verbatim
    /// since the tool's own diagnostic text is the useful part.
    #[error("write rejected by worker: {output}")]
    WriteRejected { output: String },

    #[error("value for tag '{tag}' cannot be encoded: {reason}")]
    InvalidWriteValue { tag: String, reason: String },

    #[error("unexpected reply shape for {path}. command={command_args}")]
    UnexpectedFormat { path: String, command_args: String },

    #[error("tag '{tag}' not found in {path}")]
    TagNotFound { path: PathBuf, tag: String },

    #[error("deserialization error at path '{path}': {source}")]
    Deserialization {
        path: String,
        source: serde_json::Error,
    },
}

impl From<serde_path_to_error::Error<serde_json::Error>> for ExifPipeError {
    fn from(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        ExifPipeError::Deserialization {
            path: err.path().to_string(),
            source: err.into_inner(),
        }
    }
}

impl ExifPipeError {
    /// Whether the failure is plausibly cured by replacing the worker and
    /// retrying, as opposed to a permanent problem with the request itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExifPipeError::ProcessTerminated
                | ExifPipeError::SupervisorClosed
                | ExifPipeError::StderrDisconnected
        )
    }
}
