use crate::{
    error::EditError,
    gemini::EditClient,
    models::{EditPayload, ImageResource, Outcome},
    server::AppState,
};
use actix_web::{
    get,
    http::header::{HeaderName, HeaderValue},
    post, web, HttpRequest, HttpResponse,
};
use base64::Engine;
use serde::{Deserialize, Serialize};

pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResponse {
    pub status: String,
    pub image_url: Option<String>,
    pub text: Option<String>,
    pub message: Option<String>,
}

impl EditResponse {
    fn from_outcome(outcome: &Outcome) -> Self {
        let (image_url, text) = match outcome {
            Outcome::Edited(result) => (result.image_url.clone(), result.text.clone()),
            Outcome::Empty | Outcome::Failed(_) => (None, None),
        };
        Self {
            status: outcome.status().to_string(),
            image_url,
            text,
            message: outcome.message(),
        }
    }

    fn rejected(status: &str, message: String) -> Self {
        Self {
            status: status.to_string(),
            image_url: None,
            text: None,
            message: Some(message),
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(upstream_health)
        .service(models)
        .service(edit);
}

#[get("/health")]
async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "model": state.client.model(),
    }))
}

#[get("/health/upstream")]
async fn upstream_health(state: web::Data<AppState>) -> HttpResponse {
    match state.client.health_check().await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })),
        Err(e) => {
            log::warn!("Upstream health check failed: {}", e);
            HttpResponse::ServiceUnavailable()
                .json(serde_json::json!({ "status": "unavailable", "message": e.to_string() }))
        }
    }
}

#[get("/api/models")]
async fn models() -> HttpResponse {
    HttpResponse::Ok().json(EditClient::supported_models())
}

#[post("/api/edit")]
async fn edit(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<EditPayload>,
) -> HttpResponse {
    let provided = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string);
    let anonymous = provided.is_none();
    let session_id = provided.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let payload = payload.into_inner();
    let bytes = match base64::engine::general_purpose::STANDARD.decode(payload.image.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            return HttpResponse::BadRequest()
                .insert_header((SESSION_HEADER, session_id))
                .json(EditResponse::rejected(
                    "invalid",
                    format!("Image is not valid base64: {}", e),
                ));
        }
    };

    let image = ImageResource::from_bytes(bytes, payload.mime_type);
    let edited = if anonymous {
        state
            .registry
            .detached(&session_id)
            .edit(image, &payload.instruction)
            .await
    } else {
        state
            .registry
            .session(&session_id)
            .await
            .edit(image, &payload.instruction)
            .await
    };

    let mut response = match edited {
        Ok(outcome @ Outcome::Failed(_)) => {
            HttpResponse::BadGateway().json(EditResponse::from_outcome(&outcome))
        }
        Ok(outcome) => HttpResponse::Ok().json(EditResponse::from_outcome(&outcome)),
        Err(EditError::Validation(message)) => {
            HttpResponse::BadRequest().json(EditResponse::rejected("invalid", message))
        }
        Err(EditError::Busy) => HttpResponse::Conflict().json(EditResponse::rejected(
            "busy",
            EditError::Busy.to_string(),
        )),
        Err(e) => {
            log::error!("Unexpected session error: {}", e);
            HttpResponse::InternalServerError()
                .json(EditResponse::rejected("failed", e.to_string()))
        }
    };

    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, GeminiConfig},
        error::Result,
        gemini::{ContentGenerator, GeminiClient},
        models::gemini::{
            Candidate, GenerateContentRequest, GenerateContentResponse, ResponseBlob,
            ResponseContent, ResponsePart,
        },
    };
    use actix_web::{http::StatusCode, test, App};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct StubGenerator {
        parts: Option<Vec<ResponsePart>>,
    }

    #[async_trait]
    impl ContentGenerator for StubGenerator {
        async fn generate_content(
            &self,
            _model: &str,
            _request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse> {
            match &self.parts {
                Some(parts) => Ok(GenerateContentResponse {
                    candidates: vec![Candidate {
                        content: Some(ResponseContent {
                            parts: parts.clone(),
                        }),
                        finish_reason: Some("STOP".into()),
                    }],
                    prompt_feedback: None,
                }),
                None => Err(EditError::RequestError("connection reset".into())),
            }
        }

        async fn health_check(&self, _model: &str) -> Result<bool> {
            Ok(true)
        }
    }

    /// Parks every call until `release` is notified.
    #[derive(Default)]
    struct GatedGenerator {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ContentGenerator for GatedGenerator {
        async fn generate_content(
            &self,
            _model: &str,
            _request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(GenerateContentResponse::default())
        }

        async fn health_check(&self, _model: &str) -> Result<bool> {
            Ok(true)
        }
    }

    fn state_with(generator: Arc<dyn ContentGenerator>, config: &Config) -> web::Data<AppState> {
        let client = GeminiClient::with_transport(GeminiConfig::new(), generator);
        web::Data::new(AppState::new(client, config))
    }

    fn state(parts: Option<Vec<ResponsePart>>) -> web::Data<AppState> {
        state_with(Arc::new(StubGenerator { parts }), &Config::new())
    }

    fn named_edit(session: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/edit")
            .insert_header((SESSION_HEADER, session.to_string()))
            .set_json(payload("image/png", "add a hat"))
    }

    fn payload(mime_type: &str, instruction: &str) -> EditPayload {
        EditPayload {
            image: "aGVsbG8=".into(),
            mime_type: mime_type.into(),
            instruction: instruction.into(),
        }
    }

    #[actix_web::test]
    async fn test_edit_returns_image_and_text() {
        let parts = vec![
            ResponsePart {
                text: Some("Added a hat".into()),
                inline_data: None,
            },
            ResponsePart {
                text: None,
                inline_data: Some(ResponseBlob {
                    mime_type: Some("image/png".into()),
                    data: Some("QUJD".into()),
                }),
            },
        ];
        let app = test::init_service(
            App::new().app_data(state(Some(parts))).configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/edit")
            .insert_header((SESSION_HEADER, "alice"))
            .set_json(payload("image/png", "add a hat"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(SESSION_HEADER).unwrap(), "alice");

        let body: EditResponse = test::read_body_json(resp).await;
        assert_eq!(body.status, "edited");
        assert_eq!(body.image_url.as_deref(), Some("data:image/png;base64,QUJD"));
        assert_eq!(body.text.as_deref(), Some("Added a hat"));
    }

    #[actix_web::test]
    async fn test_empty_result_is_reported_distinctly() {
        let data = state(Some(vec![]));
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/edit")
            .set_json(payload("image/png", "add a hat"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: EditResponse = test::read_body_json(resp).await;
        assert_eq!(body.status, "empty");
        assert!(body.image_url.is_none());
        assert!(body.message.unwrap().contains("try a different prompt"));
        assert!(data.registry.is_empty().await);
    }

    #[actix_web::test]
    async fn test_transport_failure_is_bad_gateway() {
        let app = test::init_service(App::new().app_data(state(None)).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/edit")
            .set_json(payload("image/png", "add a hat"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let body: EditResponse = test::read_body_json(resp).await;
        assert_eq!(body.status, "failed");
        assert!(body.message.unwrap().contains("connection reset"));
    }

    #[actix_web::test]
    async fn test_non_image_and_blank_instruction_rejected() {
        let app =
            test::init_service(App::new().app_data(state(Some(vec![]))).configure(configure))
                .await;

        let req = test::TestRequest::post()
            .uri("/api/edit")
            .set_json(payload("text/plain", "add a hat"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/edit")
            .set_json(payload("image/png", "  "))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let mut bad = payload("image/png", "add a hat");
        bad.image = "not base64!".into();
        let req = test::TestRequest::post().uri("/api/edit").set_json(bad).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_health_and_models() {
        let app =
            test::init_service(App::new().app_data(state(Some(vec![]))).configure(configure))
                .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], crate::config::DEFAULT_MODEL);

        let req = test::TestRequest::get().uri("/api/models").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(!body.as_array().unwrap().is_empty());

        let req = test::TestRequest::get().uri("/health/upstream").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_concurrent_edit_in_same_session_is_conflict() {
        let generator = Arc::new(GatedGenerator::default());
        let app = test::init_service(
            App::new()
                .app_data(state_with(generator.clone(), &Config::new()))
                .configure(configure),
        )
        .await;

        let first = test::call_service(&app, named_edit("alice").to_request());
        let second = async {
            generator.entered.notified().await;
            let resp = test::call_service(&app, named_edit("alice").to_request()).await;
            generator.release.notify_one();
            resp
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(second.status(), StatusCode::CONFLICT);
        let body: EditResponse = test::read_body_json(second).await;
        assert_eq!(body.status, "busy");

        assert_eq!(first.status(), StatusCode::OK);
        let body: EditResponse = test::read_body_json(first).await;
        assert_eq!(body.status, "empty");
    }

    #[actix_web::test]
    async fn test_named_sessions_are_bounded() {
        let data = state_with(
            Arc::new(StubGenerator { parts: Some(vec![]) }),
            &Config::new().with_session_limits(60, 5),
        );
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        for i in 0..50 {
            let req = named_edit(&format!("caller-{}", i)).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }
        assert!(data.registry.len().await <= 5);
    }

    #[actix_web::test]
    async fn test_cancelled_anonymous_edit_leaves_no_session() {
        let data = state_with(Arc::new(GatedGenerator::default()), &Config::new());
        let app =
            test::init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/edit")
            .set_json(payload("image/png", "add a hat"))
            .to_request();
        let call = test::call_service(&app, req);
        assert!(tokio::time::timeout(Duration::from_millis(50), call)
            .await
            .is_err());

        assert!(data.registry.is_empty().await);
    }
}
