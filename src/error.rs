use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The image resource could not be read or produced no bytes.
    #[error("Read error: {0}")]
    ReadError(String),

    /// Pre-flight check failed: missing image, missing instruction, non-image file.
    #[error("{0}")]
    Validation(String),

    #[error("Request error: {0}")]
    RequestError(String),

    #[error("Response error: {0}")]
    ResponseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Gemini API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Another edit is still outstanding for this session.
    #[error("An edit is already in progress")]
    Busy,

    /// Any failure inside the edit adapter, normalized to one message.
    #[error("{0}")]
    Adapter(String),
}

impl EditError {
    pub fn is_validation(&self) -> bool {
        matches!(self, EditError::Validation(_))
    }
}

impl From<reqwest::Error> for EditError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EditError::RequestError(format!("request timed out: {}", e))
        } else if e.is_decode() {
            EditError::ResponseError(e.to_string())
        } else {
            EditError::RequestError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for EditError {
    fn from(e: serde_json::Error) -> Self {
        EditError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EditError>;
