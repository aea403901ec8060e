use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    /// The resource changed between being read and being written.
    #[error("conflicting update: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed rule: {0}")]
    Malformed(String),

    #[error("failed to serialize rules document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Kube(kube::Error),
}

// === impl Error ===

impl Error {
    /// Permission errors will not go away by trying again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Forbidden(_))
    }
}

impl From<kube::Error> for Error {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(rsp) if rsp.code == 404 => Self::NotFound(rsp.message),
            kube::Error::Api(rsp) if rsp.code == 409 => Self::Conflict(rsp.message),
            kube::Error::Api(rsp) if rsp.code == 403 => Self::Forbidden(rsp.message),
            kube::Error::SerdeError(error) => Self::Malformed(error.to_string()),
            error => Self::Kube(error),
        }
    }
}
