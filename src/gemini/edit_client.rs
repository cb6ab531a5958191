use crate::{
    error::{EditError, Result},
    gemini::{encoder::BinaryEncoder, transport::ContentGenerator},
    logger,
    models::{
        data_url,
        gemini::{GenerateContentRequest, GenerateContentResponse},
        EditResult, ImageResource, ModelCategory, ModelInfo,
    },
};
use async_trait::async_trait;
use std::sync::Arc;

const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred while editing the image.";

const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "IMAGE_PROHIBITED_CONTENT",
    "PROHIBITED_CONTENT",
    "RECITATION",
    "IMAGE_RECITATION",
    "BLOCKLIST",
];

/// Contract consumed by sessions and the HTTP layer.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    async fn submit_edit(&self, image: &ImageResource, instruction: &str) -> Result<EditResult>;
}

/// Stateless adapter: encode, call `generateContent` once, decode the parts.
#[derive(Clone)]
pub struct EditClient {
    transport: Arc<dyn ContentGenerator>,
    encoder: BinaryEncoder,
    model: String,
}

impl EditClient {
    pub fn new(
        transport: Arc<dyn ContentGenerator>,
        encoder: BinaryEncoder,
        model: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            encoder,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn supported_models() -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                id: "gemini-2.5-flash-image-preview".into(),
                name: "Gemini 2.5 Flash Image (preview)".into(),
                provider: "Google".into(),
                category: ModelCategory::ImageEdit,
                description: "Nano Banana preview; returns an edited image and an optional note"
                    .into(),
            },
            ModelInfo {
                id: "gemini-2.5-flash-image".into(),
                name: "Gemini 2.5 Flash Image".into(),
                provider: "Google".into(),
                category: ModelCategory::ImageEdit,
                description: "Fast, economical image editing and generation".into(),
            },
            ModelInfo {
                id: "gemini-2.0-flash-preview-image-generation".into(),
                name: "Gemini 2.0 Flash Image Generation".into(),
                provider: "Google".into(),
                category: ModelCategory::ImageGeneration,
                description: "Earlier conversational image generation model".into(),
            },
        ]
    }

    async fn edit_once(&self, image: &ImageResource, instruction: &str) -> Result<EditResult> {
        let encoded = self.encoder.encode(image).await?;
        let request = GenerateContentRequest::image_edit(encoded.into(), instruction);

        log::info!("Editing image with model: {}", self.model);
        let response = self.transport.generate_content(&self.model, &request).await?;

        Ok(collect_parts(response))
    }
}

#[async_trait]
impl ImageEditor for EditClient {
    async fn submit_edit(&self, image: &ImageResource, instruction: &str) -> Result<EditResult> {
        let _timer = logger::timer("gemini image edit");

        self.edit_once(image, instruction).await.map_err(|e| {
            log::error!("Error calling Gemini API: {}", e);
            normalize_error(e)
        })
    }
}

/// Collapses any failure into one adapter error carrying the cause's message.
pub fn normalize_error(error: EditError) -> EditError {
    match error {
        EditError::Adapter(_) => error,
        other => {
            let cause = other.to_string();
            if cause.trim().is_empty() {
                EditError::Adapter(UNKNOWN_ERROR_MESSAGE.into())
            } else {
                EditError::Adapter(format!("Failed to edit image with Gemini: {}", cause))
            }
        }
    }
}

/// Single ordered pass over the first candidate's parts. Text overwrites
/// text; inline data with a media type overwrites the image reference.
pub fn collect_parts(response: GenerateContentResponse) -> EditResult {
    if let Some(feedback) = response.prompt_feedback.as_ref() {
        if let Some(reason) = feedback.block_reason.as_deref() {
            match feedback.block_reason_message.as_deref() {
                Some(detail) => log::warn!("Gemini blocked the prompt: {} ({})", reason, detail),
                None => log::warn!("Gemini blocked the prompt: {}", reason),
            }
        }
    }

    let mut result = EditResult::default();

    let Some(candidate) = response.candidates.into_iter().next() else {
        return result;
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if BLOCKING_FINISH_REASONS.contains(&reason) {
            log::warn!("Gemini stopped with finish reason {}", reason);
        }
    }

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    for part in parts {
        match (part.text, part.inline_data) {
            (Some(text), _) if !text.is_empty() => result.text = Some(text),
            (_, Some(blob)) => {
                if let (Some(data), Some(mime_type)) = (blob.data, blob.mime_type) {
                    if !data.is_empty() && !mime_type.is_empty() {
                        result.image_url = Some(data_url(&mime_type, &data));
                    }
                }
            }
            _ => {}
        }
    }

    result
}
