use crate::{
    config::GeminiConfig,
    error::{EditError, Result},
    models::gemini::{ApiErrorBody, GenerateContentRequest, GenerateContentResponse},
};
use async_trait::async_trait;
use reqwest::Client;

/// The remote `generateContent` call, abstracted so the adapter can be
/// exercised without a network.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    async fn health_check(&self, model: &str) -> Result<bool>;
}

pub struct HttpTransport {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| EditError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url().to_string(),
        })
    }

    fn build_headers(&self) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        let key = reqwest::header::HeaderValue::from_str(&self.api_key)
            .map_err(|_| EditError::ConfigError("API key is not a valid header value".into()))?;
        headers.insert("x-goog-api-key", key);
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        Ok(headers)
    }
}

/// Pulls the human-readable message out of a Google error body, falling
/// back to the raw text.
pub fn parse_error_body(status: u16, body: &str) -> EditError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no response body".to_string()
            } else {
                trimmed.chars().take(500).collect()
            }
        });
    EditError::ApiError { status, message }
}

#[async_trait]
impl ContentGenerator for HttpTransport {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        log::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log::error!("Gemini returned {}: {}", status, text);
            return Err(parse_error_body(status.as_u16(), &text));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| EditError::ResponseError(format!("malformed Gemini response: {}", e)))
    }

    async fn health_check(&self, model: &str) -> Result<bool> {
        let url = format!("{}/models/{}", self.base_url, model);
        let response = self
            .client
            .get(&url)
            .headers(self.build_headers()?)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        let text = response.text().await.unwrap_or_default();
        Err(parse_error_body(status.as_u16(), &text))
    }
}
