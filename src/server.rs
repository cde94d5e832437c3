//! The webhook surface. Everything answers 200: the delivery platform retries
//! on any other status, and a retry storm of a failing update helps no one.

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use teloxide::types::Update;
use tracing::{error, info, warn};

use crate::handlers::dispatch::process_update;
use crate::state::AppState;

pub const READY_BODY: &str = "FocusCoachBot is ready.";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_liveness).post(handle_update))
        .with_state(state)
}

async fn handle_liveness() -> (StatusCode, &'static str) {
    (StatusCode::OK, READY_BODY)
}

async fn handle_update(
    State(state): State<AppState>,
    body: Result<Json<Update>, JsonRejection>,
) -> (StatusCode, &'static str) {
    let update = match body {
        Ok(Json(update)) => update,
        Err(err) => {
            warn!("Discarding undecodable update payload: {err}");
            return (StatusCode::OK, "Ignored");
        }
    };

    tracing::debug!("Update received: id={}", update.id.0);

    if let Err(err) = process_update(&state, update).await {
        error!("Update processing failed: {err:#}");
        return (StatusCode::OK, "Error");
    }

    (StatusCode::OK, "OK")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
    }
}

pub async fn run(state: AppState) -> Result<()> {
    let addr = state.config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::FakeProvider;
    use crate::state::testing::test_state;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn liveness_probe_answers_without_touching_llm_or_database() {
        let provider = FakeProvider::replying("unused");
        let (state, _scheduler, _dir) = test_state(provider.clone(), false).await;

        let response = build_router(state)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], READY_BODY.as_bytes());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn undecodable_payload_is_still_acknowledged_with_200() {
        let provider = FakeProvider::replying("unused");
        let (state, _scheduler, _dir) = test_state(provider, false).await;

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from("this is not json"))
            .unwrap();

        let response = build_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn non_message_update_is_acknowledged_without_processing() {
        let provider = FakeProvider::replying("unused");
        let (state, _scheduler, _dir) = test_state(provider.clone(), false).await;

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from("{\"update_id\": 7}"))
            .unwrap();

        let response = build_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(provider.calls(), 0);
    }
}
