//! Natural-language image editing on top of Gemini multimodal models.
//!
//! ```no_run
//! use rgenedit::{GeminiClient, GeminiConfig, ImageEditor, ImageResource};
//!
//! #[tokio::main]
//! async fn main() -> rgenedit::Result<()> {
//!     let client = GeminiClient::new(GeminiConfig::from_env())?;
//!     let image = ImageResource::open("cat.png").await;
//!     let result = client.edit().submit_edit(&image, "Add a wizard hat").await?;
//!     if let Some(note) = result.text {
//!         println!("{}", note);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod gemini;
pub mod logger;
pub mod models;
pub mod session;

#[cfg(feature = "server")]
pub mod server;

pub use config::{Config, EncodePolicy, GeminiConfig};
pub use error::{EditError, Result};
pub use gemini::{BinaryEncoder, EditClient, EncodedImage, GeminiClient, ImageEditor};
pub use models::{EditRequest, EditResult, ImageResource, ImageSource, OperationState, Outcome};
pub use session::{EditSession, SessionRegistry};
