use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Archive rejected the request: {0}")]
    BadRequest(String),

    #[error("Archive credentials missing or invalid: {0}")]
    Credentials(String),

    #[error("Archive job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Archive job returned no result assets")]
    NoResults,

    #[error("Retrieval attempt timed out after {0} seconds")]
    AttemptTimeout(u64),

    #[error("Unexpected response from archive: {0}")]
    Protocol(String),

    #[error("I/O error writing downloaded file '{0}'")]
    DownloadIo(PathBuf, #[source] std::io::Error),

    #[error("Download stream failed")]
    StreamIo(#[from] std::io::Error),
}

impl RetrievalError {
    /// Whether the orchestrator should retry the chunk. Network hiccups,
    /// server-side status codes, queue timeouts and transient job failures
    /// are retryable; malformed requests and bad credentials are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            RetrievalError::NetworkRequest(..)
            | RetrievalError::AttemptTimeout(_)
            | RetrievalError::JobFailed { .. }
            | RetrievalError::StreamIo(_)
            | RetrievalError::DownloadIo(..) => true,
            RetrievalError::HttpStatus { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            RetrievalError::BadRequest(_)
            | RetrievalError::Credentials(_)
            | RetrievalError::NoResults
            | RetrievalError::Protocol(_) => false,
        }
    }
}
