// src/routes.rs

use axum::{
    Router,
    http::{Method, header},
    middleware,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{comments, votes},
    state::AppState,
    utils::jwt::session_middleware,
};

/// Assembles the main application router.
///
/// * Merges the comment and vote sub-routers.
/// * Resolves the acting session for every request.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let post_routes = Router::new()
        .route(
            "/{post_id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route("/{post_id}/votes", post(votes::cast_post_vote))
        .route("/{post_id}/votes/{vote_id}", delete(votes::retract_post_vote));

    let comment_routes = Router::new()
        .route(
            "/{id}",
            get(comments::get_comment)
                .put(comments::update_comment)
                .delete(comments::delete_comment),
        )
        .route("/{id}/replies", get(comments::list_replies))
        .route("/{id}/votes", post(votes::cast_comment_vote))
        .route("/{id}/votes/{vote_id}", delete(votes::retract_comment_vote));

    Router::new()
        .nest("/api/posts", post_routes)
        .nest("/api/comments", comment_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{config::Config, services::Forum, store::MemoryStore};

    fn app() -> Router {
        let store = Arc::new(MemoryStore::new());
        store.seed_post(1);
        let config = Config {
            jwt_secret: "router_test_secret".to_string(),
            ..Config::default()
        };
        create_router(AppState {
            forum: Forum::new(store, 16, 8),
            config,
        })
    }

    #[tokio::test]
    async fn test_anonymous_reads_pass_through() {
        let response = app()
            .oneshot(
                Request::get("/api/posts/1/comments")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(Request::get("/api/comments/5").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected_before_handlers() {
        let response = app()
            .oneshot(
                Request::get("/api/posts/1/comments")
                    .header(header::AUTHORIZATION, "Bearer nonsense")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cors_preflight_passes_trace_layer() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/comments/1/votes")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
