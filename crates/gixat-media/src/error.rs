use thiserror::Error;

/// Media pipeline errors
#[derive(Error, Debug)]
pub enum MediaError {
    /// The file name, extension, content type or size was rejected
    #[error("{0}")]
    InvalidFile(String),

    /// The scanner reported a threat, or could not vouch for the file
    #[error("{0}")]
    Infected(String),

    /// The object key lies outside the caller's namespace
    #[error("{0}")]
    Forbidden(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Virus scan error: {0}")]
    Scan(String),

    #[error("Image processing error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type MediaResult<T> = Result<T, MediaError>;

impl From<MediaError> for gixat_core::Error {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::InvalidFile(msg) | MediaError::Infected(msg) => {
                gixat_core::Error::InvalidRequest(msg)
            }
            MediaError::Forbidden(msg) => gixat_core::Error::Forbidden(msg),
            MediaError::NotFound(key) => {
                gixat_core::Error::NotFound(format!("File '{}' not found", key))
            }
            MediaError::Storage(msg) => gixat_core::Error::Storage(msg),
            MediaError::Http(e) => gixat_core::Error::Storage(e.to_string()),
            MediaError::Scan(msg) => gixat_core::Error::Scan(msg),
            MediaError::Image(msg) => gixat_core::Error::Internal(msg),
            MediaError::Io(e) => gixat_core::Error::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_to_core_codes() {
        let err: gixat_core::Error = MediaError::InvalidFile("File is empty".into()).into();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.to_string(), "File is empty");

        let err: gixat_core::Error = MediaError::Storage("bucket unreachable".into()).into();
        assert_eq!(err.code(), "EXTERNAL_SERVICE_ERROR");

        let err: gixat_core::Error = MediaError::Forbidden("nope".into()).into();
        assert_eq!(err.code(), "FORBIDDEN");
    }
}
