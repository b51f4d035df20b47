//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` and `/ws`
//! live at the root.

pub mod dto;
pub mod handlers;

use std::any::Any;

use axum::Router;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::error::GatewayError;
use crate::ws::handler::ws_handler;

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "relay-gateway", description = "WebSocket event relay with a user REST API"),
    paths(
        handlers::system::health_handler,
        handlers::users::get_user,
        handlers::users::create_user,
    ),
    components(schemas(
        crate::domain::User,
        dto::CreateUserRequest,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "System", description = "Liveness"),
        (name = "Users", description = "User storage"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the gateway application: REST routes, the `/ws` upgrade, and
/// the tracing, CORS, and panic-recovery middleware.
pub fn build_app(state: AppState) -> Router {
    let router = build_router().route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Converts a handler panic into the standard 500 error body.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| (*s).to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(panic = %detail, "request handler panicked");
    GatewayError::Internal("request handler panicked".to_string()).into_response()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::domain::SessionRegistry;
    use crate::eventlog::EventProducer;
    use crate::service::UserOperations;
    use crate::service::dispatcher::tests::FakeUsers;

    #[derive(Debug)]
    struct NullProducer;

    #[async_trait]
    impl EventProducer for NullProducer {
        async fn send(&self, _topic: &str, _key: &str, _value: &[u8]) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn app() -> Router {
        build_app(AppState {
            users: Arc::new(FakeUsers::default()) as Arc<dyn UserOperations>,
            sessions: Arc::new(SessionRegistry::new()),
            producer: Arc::new(NullProducer) as Arc<dyn EventProducer>,
            session_write_timeout: Duration::from_secs(1),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body readable");
        };
        let Ok(value) = serde_json::from_slice(&bytes) else {
            panic!("body is JSON");
        };
        value
    }

    async fn call(request: Request<Body>) -> Response {
        match app().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        let Ok(request) = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
        else {
            panic!("request builds");
        };
        request
    }

    fn get(uri: &str) -> Request<Body> {
        let Ok(request) = Request::get(uri).body(Body::empty()) else {
            panic!("request builds");
        };
        request
    }

    #[tokio::test]
    async fn health_reports_session_count() {
        let response = call(get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["sessions"], 0);
    }

    #[tokio::test]
    async fn create_returns_201_with_user() {
        let response = call(post_json(
            "/api/v1/users/create",
            r#"{"first_name":"Ada","last_name":"Lovelace"}"#,
        ))
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["first_name"], "Ada");
        assert_eq!(body["created_at"], "2024-01-01 00:00:00");
    }

    #[tokio::test]
    async fn create_with_empty_name_is_400() {
        let response = call(post_json(
            "/api/v1/users/create",
            r#"{"first_name":"","last_name":"Lovelace"}"#,
        ))
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], 1001);
    }

    #[tokio::test]
    async fn missing_user_is_404() {
        let response = call(get("/api/v1/users/42")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], 2001);
    }

    #[test]
    fn panic_becomes_internal_error() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn openapi_lists_user_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/users/{id}"));
        assert!(doc.paths.paths.contains_key("/api/v1/users/create"));
        assert!(doc.paths.paths.contains_key("/health"));
    }

    #[tokio::test]
    async fn served_over_http() {
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind ephemeral port");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("local addr");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app()).await;
        });

        let client = reqwest::Client::new();
        let created = client
            .post(format!("http://{addr}/api/v1/users/create"))
            .json(&serde_json::json!({"first_name": "Grace", "last_name": "Hopper"}))
            .send()
            .await;
        let Ok(created) = created else {
            panic!("server reachable");
        };
        assert_eq!(created.status(), reqwest::StatusCode::CREATED);

        let fetched = client
            .get(format!("http://{addr}/api/v1/users/1"))
            .send()
            .await;
        let Ok(fetched) = fetched else {
            panic!("server reachable");
        };
        let Ok(user) = fetched.json::<crate::domain::User>().await else {
            panic!("user body");
        };
        assert_eq!(user.full_name(), "Grace Hopper");

        let bad = client
            .get(format!("http://{addr}/api/v1/users/0"))
            .send()
            .await;
        let bad = tokio_test::assert_ok!(bad);
        assert_eq!(bad.status(), reqwest::StatusCode::BAD_REQUEST);
    }
}
