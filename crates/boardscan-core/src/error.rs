//! Error types for BoardScan

/// Result type alias using BoardScan's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for BoardScan operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Model manifest or weights missing, unreachable, or unparseable
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Input bytes are not a decodable image
    #[error("image decode error: {0}")]
    ImageDecode(String),

    /// Forward pass or output decoding failed
    #[error("inference error: {0}")]
    Inference(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors outside the model artifact (e.g. reading an input file)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new model-unavailable error
    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Create a new image decode error
    pub fn image_decode(msg: impl Into<String>) -> Self {
        Self::ImageDecode(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short, stable name of the error category, used for metric labels
    /// and machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::ImageDecode(_) => "image_decode",
            Self::Inference(_) => "inference",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let err = Error::model_unavailable("GET /model/model.json returned 404");
        assert_eq!(
            err.to_string(),
            "model unavailable: GET /model/model.json returned 404"
        );
        assert_eq!(err.kind(), "model_unavailable");

        assert_eq!(Error::image_decode("x").kind(), "image_decode");
        assert_eq!(Error::inference("x").kind(), "inference");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "board.png");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), "io");
    }
}
