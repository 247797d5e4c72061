//! HTTP+SSE collaborator surface (spec §6), grounded in
//! `original_source/transport/http_sse.py`'s raw ASGI app.

use std::sync::Arc;
use std::time::Duration;

use aggregator_core::protocol::{Envelope, JsonRpcId, JsonRpcResponse};
use aggregator_core::AggregationController;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use futures::StreamExt;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub fn router(controller: Arc<AggregationController>) -> Router {
    Router::new()
        .route("/rpc", post(rpc))
        .route("/events", get(events))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(controller)
}

/// `POST /rpc`: always HTTP 200, echoing the request `id` with exactly one
/// of `result`/`error` — application errors never escalate to a 4xx/5xx.
async fn rpc(State(controller): State<Arc<AggregationController>>, body: axum::body::Bytes) -> impl IntoResponse {
    let parsed: Result<Value, _> = serde_json::from_slice(&body);
    let Ok(value) = parsed else {
        let response = JsonRpcResponse::error(None, aggregator_core::JsonRpcError::new(-32000, "Malformed request body"));
        return Json(response);
    };

    let id = value.get("id").cloned();
    let method = value.get("method").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let params = value.get("params").cloned();

    let envelope = if method == "initialize" {
        let capabilities = controller.initialize_capabilities().await;
        Envelope::ok(serde_json::json!({
            "capabilities": capabilities,
            "serverInfo": { "name": "mcp-aggregator", "version": env!("CARGO_PKG_VERSION") },
        }))
    } else {
        controller.route_request(&method, params).await
    };

    let id: Option<JsonRpcId> = id.map(|v| serde_json::from_value(v).unwrap_or(JsonRpcId::Null));
    let response = match envelope.error {
        Some(err) => JsonRpcResponse::error(id, err),
        None => JsonRpcResponse::success(id, envelope.result.unwrap_or(Value::Null)),
    };
    Json(response)
}

/// `GET /events`: an initial `: connected` comment, then a `: keepalive`
/// comment every 15 seconds, matching the original's `asyncio.sleep(15)`
/// loop.
async fn events() -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let connected = stream::once(async { Ok(Event::default().comment("connected")) });
    let keepalive = stream::unfold((), |_| async {
        tokio::time::sleep(KEEPALIVE_INTERVAL).await;
        Some((Ok(Event::default().comment("keepalive")), ()))
    });
    Sse::new(connected.chain(keepalive)).keep_alive(KeepAlive::new().interval(KEEPALIVE_INTERVAL))
}

/// `GET /health`: lightweight, synchronous controller stats.
async fn health(State(controller): State<Arc<AggregationController>>) -> impl IntoResponse {
    let stats = controller.stats();
    Json(serde_json::json!({
        "status": "ok",
        "session_count": stats.session_count,
        "started": stats.started,
    }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn empty_controller() -> Arc<AggregationController> {
        Arc::new(AggregationController::new(vec![]))
    }

    #[tokio::test]
    async fn health_reports_session_count() {
        let app = router(empty_controller());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rpc_with_no_upstreams_is_still_http_200() {
        let app = router(empty_controller());
        let body = serde_json::json!({"jsonrpc":"2.0","id":1,"method":"tools/list"}).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/rpc")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], -32000);
    }

    #[tokio::test]
    async fn rpc_with_malformed_body_is_still_http_200() {
        let app = router(empty_controller());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/rpc")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
