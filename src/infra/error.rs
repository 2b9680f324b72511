//! Error types and result definitions for signing operations.

use thiserror::Error;

/// Result type for signing operations
pub type SigningResult<T> = Result<T, SigningError>;

/// Error kinds surfaced by the signing pipeline.
///
/// Each variant corresponds to one failure boundary: a failure is reported
/// once, where it is first observed, and aborts the run. The payload carries
/// the human-readable detail plus any diagnostics the underlying library or
/// provider supplied.
#[derive(Error, Debug, miette::Diagnostic)]
pub enum SigningError {
    #[error("invalid PE image: {0}")]
    InvalidImage(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("failed to load signing key: {0}")]
    KeyLoad(String),

    #[error("failed to load certificate: {0}")]
    CertificateLoad(String),

    #[error("signature operation failed: {0}")]
    Signing(String),

    #[error("DER encoding failed: {0}")]
    Encoding(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SigningError {
    fn from(error: std::io::Error) -> Self {
        SigningError::Io(error.to_string())
    }
}

impl From<der::Error> for SigningError {
    fn from(error: der::Error) -> Self {
        SigningError::Encoding(error.to_string())
    }
}

impl From<goblin::error::Error> for SigningError {
    fn from(error: goblin::error::Error) -> Self {
        SigningError::InvalidImage(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let error = SigningError::InvalidImage("missing MZ signature".to_string());
        assert_eq!(
            error.to_string(),
            "invalid PE image: missing MZ signature"
        );

        let error = SigningError::UnsupportedAlgorithm("md2".to_string());
        assert_eq!(error.to_string(), "unsupported algorithm: md2");
    }

    #[test]
    fn io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: SigningError = io.into();
        assert!(matches!(error, SigningError::Io(_)));
    }
}
