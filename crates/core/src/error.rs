use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = EdgeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("cannot access image {}: {}", .path.display(), .source)]
    ImageAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("cannot decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("enrollment of device {device} is not complete yet ({reason}); wait a few minutes and try again")]
    EnrollmentIncomplete { device: String, reason: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("inventory request failed: {0}")]
    Api(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("refused: {0}")]
    Refused(String),
    #[error("playbook {playbook} failed: {reason}")]
    Playbook { playbook: String, reason: String },
    #[error("{what}: {source}")]
    Io {
        what: String,
        #[source]
        source: io::Error,
    },
}

impl EdgeError {
    pub fn not_found(what: impl Into<String>) -> Self {
        EdgeError::NotFound { what: what.into() }
    }

    pub fn image_access(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EdgeError::ImageAccess {
            path: path.into(),
            source,
        }
    }

    pub fn io(what: impl Into<String>, source: io::Error) -> Self {
        EdgeError::Io {
            what: what.into(),
            source,
        }
    }

    /// Only an unfinished upstream enrollment clears up on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EdgeError::EnrollmentIncomplete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_enrollment_is_retryable() {
        let pending = EdgeError::EnrollmentIncomplete {
            device: "pi".to_string(),
            reason: "no balena worker".to_string(),
        };
        assert!(pending.is_retryable());
        assert!(!EdgeError::not_found("device pi").is_retryable());
        assert!(!EdgeError::Auth("no token".to_string()).is_retryable());
    }

    #[test]
    fn enrollment_message_tells_operator_to_retry() {
        let err = EdgeError::EnrollmentIncomplete {
            device: "pi".to_string(),
            reason: "no balena worker".to_string(),
        };
        assert!(err.to_string().contains("try again"));
    }

    #[test]
    fn image_access_names_the_path() {
        let err = EdgeError::image_access(
            "/tmp/missing.img",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing.img"));
    }
}
