pub mod auth;
mod email;
pub mod error;
mod validation;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use email::{HealthResponse, SendEmailResponse, TestEmailResponse};
pub use error::{ApiError, ErrorCode, ErrorResponse};

pub fn create_router(state: Arc<AppState>) -> Router {
    // Sending endpoints, guarded by the shared secret when one is configured
    let send_routes = Router::new()
        .route("/send-email", post(email::send_email))
        .route("/test-email", post(email::test_email))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(email::health))
        .merge(send_routes)
        .fallback(not_found)
        .layer(cors_layer(state.config.frontend.base_url()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS restricted to the frontend origin
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ]);

    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(url = %frontend_url, "Frontend URL is not a valid origin, allowing any origin");
            cors.allow_origin(Any)
        }
    }
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::notifications::testing::{service, RecordingMailer};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tokio_test::assert_ok;
    use tower::ServiceExt;

    fn app_with(mailer: Arc<RecordingMailer>, api_key: Option<&str>) -> Router {
        let mut config = Config::default();
        config.auth.api_key = api_key.map(str::to_string);
        let notifications = Arc::new(service(mailer, None));
        create_router(Arc::new(AppState::new(config, notifications, false)))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = assert_ok!(to_bytes(response.into_body(), usize::MAX).await);
        assert_ok!(serde_json::from_slice(&bytes))
    }

    fn welcome_request() -> Value {
        json!({
            "type": "welcome",
            "data": {"email": "ada@example.com", "full_name": "Ada Lovelace", "role": "job_seeker"}
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = app_with(Arc::new(RecordingMailer::new()), Some("secret"));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "jobboard-relay");
        assert_eq!(body["environment"], "development");
        assert_eq!(body["realtime"], false);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_send_welcome_email() {
        let mailer = Arc::new(RecordingMailer::new());
        let app = app_with(mailer.clone(), None);

        let response = app
            .oneshot(post_json("/send-email", welcome_request()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["type"], "welcome");
        assert_eq!(body["message_id"], "<test-1@example.com>");

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");
        assert!(sent[0].subject.contains("Welcome"));
    }

    #[tokio::test]
    async fn test_send_email_accepts_unknown_role() {
        let mailer = Arc::new(RecordingMailer::new());
        let app = app_with(mailer.clone(), None);

        let response = app
            .oneshot(post_json(
                "/send-email",
                json!({
                    "type": "welcome",
                    "data": {"email": "ada@example.com", "full_name": "Ada", "role": "recruiter"}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let sent = mailer.sent_to("ada@example.com");
        assert_eq!(sent.len(), 1);
        // Unknown roles get the job seeker welcome
        assert!(sent[0].text.contains("/jobs"));
        assert!(!sent[0].text.contains("/post-job"));
    }

    #[tokio::test]
    async fn test_send_email_rejects_unknown_type() {
        let mailer = Arc::new(RecordingMailer::new());
        let app = app_with(mailer.clone(), None);

        let response = app
            .oneshot(post_json(
                "/send-email",
                json!({"type": "newsletter", "data": {"email": "ada@example.com"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["code"], "bad_request");
        assert_eq!(body["error"], "Invalid request body");
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_email_rejects_invalid_recipient() {
        let mailer = Arc::new(RecordingMailer::new());
        let app = app_with(mailer.clone(), None);

        let response = app
            .oneshot(post_json(
                "/send-email",
                json!({"type": "welcome", "data": {"email": "not-an-address"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["code"], "validation_error");
        assert_eq!(body["details"], "field: email");
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_email_reports_delivery_failure() {
        let mailer = Arc::new(RecordingMailer::failing_for(&["ada@example.com"]));
        let app = app_with(mailer, None);

        let response = app
            .oneshot(post_json("/send-email", welcome_request()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        assert_eq!(body["code"], "internal_error");
        assert_eq!(body["error"], "Failed to send welcome email to ada@example.com");
    }

    #[tokio::test]
    async fn test_test_email() {
        let mailer = Arc::new(RecordingMailer::new());
        let app = app_with(mailer.clone(), None);

        let response = app
            .oneshot(post_json("/test-email", json!({"to": " ops@example.com "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["to"], "ops@example.com");
        assert_eq!(mailer.sent_to("ops@example.com").len(), 1);
    }

    #[tokio::test]
    async fn test_test_email_requires_recipient() {
        let app = app_with(Arc::new(RecordingMailer::new()), None);

        let response = app
            .oneshot(post_json("/test-email", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_api_key_required_when_configured() {
        let mailer = Arc::new(RecordingMailer::new());
        let app = app_with(mailer.clone(), Some("secret"));

        let response = app
            .clone()
            .oneshot(post_json("/send-email", welcome_request()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "unauthorized");

        let mut wrong = post_json("/send-email", welcome_request());
        wrong
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        let response = app.clone().oneshot(wrong).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(mailer.sent().is_empty());

        let mut right = post_json("/send-email", welcome_request());
        right
            .headers_mut()
            .insert("x-api-key", HeaderValue::from_static("secret"));
        let response = app.oneshot(right).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = app_with(Arc::new(RecordingMailer::new()), None);

        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "not_found");
    }
}
