//! Router assembly

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::api::handlers::AppState;
use crate::api::{auth, handlers};

/// Request bodies are small JSON documents; anything larger is abuse.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the application router.
///
/// /health, /metrics and /api/v1/docs are public; everything else under
/// /api/v1 requires the X-API-Key header when a key is configured.
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_snapshot))
        .route("/api/v1/docs", get(handlers::get_docs));

    let protected = Router::new()
        .route("/api/v1/search", post(handlers::search_articles))
        .route("/api/v1/retrieve", post(handlers::retrieve_articles))
        .route("/api/v1/article/:pmid", get(handlers::get_article))
        .route("/api/v1/summarize", post(handlers::summarize_articles))
        .route("/api/v1/stats", get(handlers::get_stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, NcbiConfig};
    use crate::pubmed::PubMedClient;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(api_key: Option<&str>) -> AppState {
        let mut config = Config::default();
        config.server.api_key = api_key.map(|k| SecretString::new(k.to_string()));
        AppState {
            config: Arc::new(config),
            pubmed: Arc::new(PubMedClient::new(&NcbiConfig::default()).unwrap()),
            llm: None,
        }
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = build_router(test_state(Some("secret")));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_the_key() {
        let app = build_router(test_state(Some("secret")));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_routes_get_the_fallback() {
        let app = build_router(test_state(None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v2/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_bodies_are_rejected() {
        let app = build_router(test_state(None));
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/search")
            .header("content-type", "application/json")
            .body(Body::from(vec![b'x'; MAX_BODY_BYTES + 1]))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
