pub mod routes;

use crate::{
    config::Config,
    gemini::{GeminiClient, ImageEditor},
    session::SessionRegistry,
};
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;

pub struct AppState {
    pub client: GeminiClient,
    pub registry: SessionRegistry,
}

impl AppState {
    pub fn new(client: GeminiClient, config: &Config) -> Self {
        let editor: Arc<dyn ImageEditor> = Arc::new(client.edit().clone());
        Self {
            client,
            registry: SessionRegistry::from_config(editor, config),
        }
    }
}

/// JSON bodies carry base64, which is about a third larger than the file.
pub fn json_limit(config: &Config) -> usize {
    config.max_upload_bytes() / 3 * 4 + 64 * 1024
}

pub async fn run(config: Config, client: GeminiClient) -> std::io::Result<()> {
    let port = config.port();
    let limit = json_limit(&config);
    let state = web::Data::new(AppState::new(client, &config));

    crate::logger::log_startup_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), port);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(limit))
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
