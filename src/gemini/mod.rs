pub mod edit_client;
pub mod encoder;
pub mod transport;

use crate::{config::GeminiConfig, error::Result};
use std::sync::Arc;

pub use edit_client::{EditClient, ImageEditor};
pub use encoder::{BinaryEncoder, EncodedImage};
pub use transport::{ContentGenerator, HttpTransport};

/// Explicitly constructed Gemini client. Construction fails when the
/// credential is missing, so a running process always has one.
#[derive(Clone)]
pub struct GeminiClient {
    transport: Arc<dyn ContentGenerator>,
    edit_client: EditClient,
    model: String,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let transport: Arc<dyn ContentGenerator> = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Builds a client over any transport; the config's credential is not
    /// consulted here.
    pub fn with_transport(config: GeminiConfig, transport: Arc<dyn ContentGenerator>) -> Self {
        let model = config.model().to_string();
        let encoder = BinaryEncoder::new(config.encode_policy);

        Self {
            edit_client: EditClient::new(transport.clone(), encoder, model.clone()),
            transport,
            model,
        }
    }

    pub fn edit(&self) -> &EditClient {
        &self.edit_client
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.transport.health_check(&self.model).await
    }
}
