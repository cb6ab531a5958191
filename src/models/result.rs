use crate::error::{EditError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

pub const EMPTY_RESULT_MESSAGE: &str =
    "The AI didn't return an image or text. Please try a different prompt.";

/// What came back from one edit: an inline image reference and/or a note.
/// Both may be absent; that is a valid, empty result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResult {
    pub image_url: Option<String>,
    pub text: Option<String>,
}

impl EditResult {
    pub fn is_empty(&self) -> bool {
        self.image_url.is_none() && self.text.is_none()
    }

    /// Splits `data:<mime>;base64,<payload>` back into media type and bytes.
    pub fn decode_image(&self) -> Result<Option<(String, Vec<u8>)>> {
        let Some(url) = self.image_url.as_deref() else {
            return Ok(None);
        };
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| EditError::ResponseError("image reference is not a data URL".into()))?;
        let (mime_type, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| EditError::ResponseError("image reference is not base64".into()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| EditError::ResponseError(format!("invalid base64 image: {}", e)))?;
        Ok(Some((mime_type.to_string(), bytes)))
    }
}

pub fn data_url(mime_type: &str, payload: &str) -> String {
    format!("data:{};base64,{}", mime_type, payload)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OperationState {
    #[default]
    Idle,
    InFlight,
    Succeeded(EditResult),
    Failed(String),
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Idle => "idle",
            OperationState::InFlight => "in_flight",
            OperationState::Succeeded(_) => "succeeded",
            OperationState::Failed(_) => "failed",
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, OperationState::InFlight)
    }
}

/// The three visible outcomes of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Edited(EditResult),
    Empty,
    Failed(String),
}

impl Outcome {
    pub fn from_result(result: EditResult) -> Self {
        if result.is_empty() {
            Outcome::Empty
        } else {
            Outcome::Edited(result)
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Edited(_) => "edited",
            Outcome::Empty => "empty",
            Outcome::Failed(_) => "failed",
        }
    }

    /// Message shown to the user, if the outcome calls for one.
    pub fn message(&self) -> Option<String> {
        match self {
            Outcome::Edited(_) => None,
            Outcome::Empty => Some(EMPTY_RESULT_MESSAGE.to_string()),
            Outcome::Failed(message) => Some(format!("An error occurred: {}", message)),
        }
    }
}
