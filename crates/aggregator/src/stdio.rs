//! Downstream stdio server loop (spec §4.5).

use std::sync::Arc;

use aggregator_core::protocol::{Capabilities, Envelope, JsonRpcId, JsonRpcResponse};
use aggregator_core::{AggregationController, ClientProfile};
use serde_json::Value;
use tokio::io::{AsyncWrite, BufReader};
use tracing::{debug, warn};

use aggregator_core::frame::{self, Frame, FrameError};

pub async fn run(controller: Arc<AggregationController>) {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut stdout = tokio::io::stdout();

    loop {
        match frame::read_message(&mut reader).await {
            Ok(Frame::Message(value)) => {
                if let Err(e) = handle_message(&controller, &mut stdout, value).await {
                    warn!(error = %e, "failed to write response frame, shutting down");
                    break;
                }
            }
            Ok(Frame::Closed) => {
                debug!("client closed stdin, shutting down");
                break;
            }
            Err(e) => {
                warn!(error = %e, "fatal frame error on stdio, shutting down");
                break;
            }
        }
    }

    controller.close().await;
}

async fn handle_message<W: AsyncWrite + Unpin>(
    controller: &AggregationController,
    writer: &mut W,
    value: Value,
) -> Result<(), FrameError> {
    let Some(obj) = value.as_object() else {
        warn!("dropping non-object request");
        return Ok(());
    };

    let id = obj.get("id").cloned();
    let method = obj.get("method").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let params = obj.get("params").cloned();

    let envelope = if method == "initialize" {
        let capabilities = controller.initialize_capabilities().await;
        let capabilities = shape_for_client_profile(capabilities);
        Envelope::ok(serde_json::json!({
            "capabilities": capabilities,
            "serverInfo": { "name": "mcp-aggregator", "version": env!("CARGO_PKG_VERSION") },
        }))
    } else {
        controller.route_request(&method, params).await
    };

    // Notifications (no id) are dispatched but never get a reply.
    let Some(id) = id else { return Ok(()) };
    let id: JsonRpcId = serde_json::from_value(id).unwrap_or(JsonRpcId::Null);

    let response = match envelope.error {
        Some(err) => JsonRpcResponse::error(Some(id), err),
        None => JsonRpcResponse::success(Some(id), envelope.result.unwrap_or(Value::Null)),
    };
    let response_value = match serde_json::to_value(&response) {
        Ok(v) => v,
        Err(e) => return Err(FrameError::Io(std::io::Error::other(e.to_string()))),
    };
    frame::write_message(writer, &response_value).await
}

/// Client-profile capability shaping (spec §4.5, S6): `cursor` retains only
/// `tools`.
fn shape_for_client_profile(caps: Capabilities) -> Capabilities {
    match aggregator_core::env::client_profile() {
        Some(ClientProfile::Cursor) => Capabilities {
            tools: caps.tools,
            prompts: Default::default(),
            resources: Default::default(),
        },
        _ => caps,
    }
}
