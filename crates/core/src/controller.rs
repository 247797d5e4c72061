//! Aggregation controller (spec §4.4): owns all upstream sessions,
//! builds/refreshes the catalog, and dispatches inbound requests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::catalog::{presented_name, sanitize, Catalog};
use crate::config::AggregatorConfig;
use crate::env;
use crate::error::SessionError;
use crate::merge::{merge_capabilities, tool_allowed};
use crate::protocol::{Capabilities, Envelope, JsonRpcError, Prompt, PromptsListResult, Resource, ResourcesListResult, Tool, ToolCallParams, ToolsListResult};
use crate::session::{UpstreamSession, DEFAULT_TIMEOUT};

#[derive(Debug, Clone, serde::Serialize)]
pub struct ControllerStats {
    pub session_count: usize,
    pub started: bool,
}

pub struct AggregationController {
    sessions: Vec<Arc<UpstreamSession>>,
    catalog: Mutex<Catalog>,
    round_robin: AtomicUsize,
    started: AtomicBool,
    request_timeout: Duration,
}

impl AggregationController {
    pub fn new(sessions: Vec<Arc<UpstreamSession>>) -> Self {
        Self {
            sessions,
            catalog: Mutex::new(Catalog::new()),
            round_robin: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &AggregatorConfig) -> Self {
        let sessions = config
            .upstream
            .iter()
            .cloned()
            .map(|cfg| Arc::new(UpstreamSession::new(cfg)))
            .collect();
        Self::new(sessions)
    }

    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            session_count: self.sessions.len(),
            started: self.started.load(Ordering::SeqCst),
        }
    }

    /// The first request requiring upstreams starts all sessions
    /// concurrently; subsequent calls are no-ops.
    async fn ensure_started(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let starts = self.sessions.iter().map(|s| async move {
            if let Err(e) = s.start().await {
                warn!(upstream = %s.id, error = %e, "failed to start upstream session");
            }
        });
        futures::future::join_all(starts).await;
    }

    /// Starts sessions, sends `initialize` to each concurrently
    /// (`return_exceptions=true` semantics: one failure does not cancel the
    /// others), and merges successful capability dictionaries.
    pub async fn initialize_capabilities(&self) -> Capabilities {
        self.ensure_started().await;
        let inits = self.sessions.iter().map(|s| s.initialize());
        let results = futures::future::join_all(inits).await;

        let mut caps_list = Vec::with_capacity(self.sessions.len());
        for (session, result) in self.sessions.iter().zip(results) {
            match result {
                Ok(envelope) => {
                    if let Some(err) = envelope.error {
                        warn!(upstream = %session.id, code = err.code, message = %err.message, "upstream initialize returned an error");
                        continue;
                    }
                    let caps = envelope
                        .result
                        .as_ref()
                        .and_then(|v| v.get("capabilities"))
                        .and_then(|v| serde_json::from_value::<Capabilities>(v.clone()).ok())
                        .unwrap_or_default();
                    caps_list.push(caps);
                }
                Err(e) => {
                    warn!(upstream = %session.id, error = %e, "upstream initialize failed");
                }
            }
        }
        merge_capabilities(caps_list.iter())
    }

    /// The central dispatcher (spec §4.4).
    pub async fn route_request(&self, method: &str, params: Option<Value>) -> Envelope {
        if self.sessions.is_empty() {
            return Envelope::err(JsonRpcError::no_upstreams());
        }
        self.ensure_started().await;
        match method {
            "tools/list" => self.discover_tools().await,
            "prompts/list" => self.discover_prompts().await,
            "resources/list" => self.discover_resources().await,
            "tools/call" => self.handle_tool_call(params).await,
            other => self.send_round_robin(other, params).await,
        }
    }

    /// Closes all sessions concurrently, swallowing individual errors.
    pub async fn close(&self) {
        let closers = self.sessions.iter().map(|s| s.close());
        futures::future::join_all(closers).await;
    }

    async fn fan_out(&self, method: &str) -> Vec<(Arc<UpstreamSession>, Result<Envelope, SessionError>)> {
        let timeout = self.request_timeout;
        let futures = self.sessions.iter().cloned().map(|session| {
            let method = method.to_string();
            async move {
                let result = session.send(&method, None, timeout, 0).await;
                (session, result)
            }
        });
        futures::future::join_all(futures).await
    }

    async fn discover_tools(&self) -> Envelope {
        let replies = self.fan_out("tools/list").await;
        let mut catalog = self.catalog.lock().await;
        catalog.clear_tools();

        for (session, reply) in replies {
            let envelope = match reply {
                Ok(e) => e,
                Err(e) => {
                    warn!(upstream = %session.id, error = %e, "tools/list failed");
                    continue;
                }
            };
            if let Some(err) = envelope.error {
                warn!(upstream = %session.id, code = err.code, "upstream returned an error for tools/list");
                continue;
            }
            let Some(result) = envelope.result else { continue };
            let tools: Vec<Tool> = match serde_json::from_value::<ToolsListResult>(result) {
                Ok(r) => r.tools,
                Err(e) => {
                    warn!(upstream = %session.id, error = %e, "malformed tools/list result");
                    continue;
                }
            };

            for tool in tools {
                let sanitized_original = sanitize(&tool.name);
                if !tool_allowed(&sanitized_original, session.include_tools(), session.exclude_tools()) {
                    continue;
                }
                let presented = presented_name(&session.id, &tool.name);
                let descriptor = presented_tool_descriptor(&tool, &presented, &session.id);
                if !catalog.set_tool(presented.clone(), descriptor, session.id.clone(), tool.name.clone()) {
                    warn!(presented = %presented, "dropping duplicate presented tool name");
                }
            }
        }

        let tools: Vec<Value> = catalog.tools().map(|t| t.descriptor.clone()).collect();
        Envelope::ok(serde_json::json!({ "tools": tools }))
    }

    async fn discover_prompts(&self) -> Envelope {
        let replies = self.fan_out("prompts/list").await;
        let mut catalog = self.catalog.lock().await;
        catalog.clear_prompts();

        for (session, reply) in replies {
            let envelope = match reply {
                Ok(e) => e,
                Err(e) => {
                    warn!(upstream = %session.id, error = %e, "prompts/list failed");
                    continue;
                }
            };
            if envelope.error.is_some() {
                continue;
            }
            let Some(result) = envelope.result else { continue };
            let prompts: Vec<Prompt> = match serde_json::from_value::<PromptsListResult>(result) {
                Ok(r) => r.prompts,
                Err(_) => continue,
            };
            for prompt in prompts {
                let descriptor = serde_json::to_value(&prompt).unwrap_or(Value::Null);
                catalog.set_prompt(prompt.name, descriptor, session.id.clone());
            }
        }

        let prompts: Vec<Value> = catalog.prompts().map(|(_, e)| e.descriptor.clone()).collect();
        Envelope::ok(serde_json::json!({ "prompts": prompts }))
    }

    async fn discover_resources(&self) -> Envelope {
        let replies = self.fan_out("resources/list").await;
        let mut catalog = self.catalog.lock().await;
        catalog.clear_resources();

        for (session, reply) in replies {
            let envelope = match reply {
                Ok(e) => e,
                Err(e) => {
                    warn!(upstream = %session.id, error = %e, "resources/list failed");
                    continue;
                }
            };
            if envelope.error.is_some() {
                continue;
            }
            let Some(result) = envelope.result else { continue };
            let resources: Vec<Resource> = match serde_json::from_value::<ResourcesListResult>(result) {
                Ok(r) => r.resources,
                Err(_) => continue,
            };
            for resource in resources {
                let descriptor = serde_json::to_value(&resource).unwrap_or(Value::Null);
                catalog.set_resource(resource.name.clone(), descriptor, session.id.clone());
            }
        }

        let resources: Vec<Value> = catalog.resources().map(|(_, e)| e.descriptor.clone()).collect();
        Envelope::ok(serde_json::json!({ "resources": resources }))
    }

    async fn handle_tool_call(&self, params: Option<Value>) -> Envelope {
        let Some(params) = params else {
            return Envelope::err(JsonRpcError::invalid_params("tools/call requires params"));
        };
        let call: ToolCallParams = match serde_json::from_value(params) {
            Ok(c) => c,
            Err(e) => return Envelope::err(JsonRpcError::invalid_params(e.to_string())),
        };

        let catalog_empty = self.catalog.lock().await.tools().next().is_none();
        if catalog_empty {
            self.discover_tools().await;
        }

        if let Some(include) = env::include_tools() {
            if !include.iter().any(|n| n == &call.name) {
                return Envelope::err(JsonRpcError::tool_not_allowed(&call.name));
            }
        }
        if let Some(exclude) = env::exclude_tools() {
            if exclude.iter().any(|n| n == &call.name) {
                return Envelope::err(JsonRpcError::tool_excluded(&call.name));
            }
        }

        let lookup = {
            let catalog = self.catalog.lock().await;
            catalog.lookup_tool(&call.name).map(|(u, o)| (u.to_string(), o.to_string()))
        };

        if let Some((upstream_id, original)) = lookup {
            if let Some(session) = self.sessions.iter().find(|s| s.id == upstream_id).cloned() {
                let rewritten = serde_json::json!({ "name": original, "arguments": call.arguments });
                return match session.send("tools/call", Some(rewritten), self.request_timeout, 0).await {
                    Ok(envelope) => envelope,
                    Err(e) => Envelope::err(JsonRpcError::upstream_request_failed(e)),
                };
            }
        }

        let params = serde_json::json!({ "name": call.name, "arguments": call.arguments });
        self.send_round_robin("tools/call", Some(params)).await
    }

    async fn send_round_robin(&self, method: &str, params: Option<Value>) -> Envelope {
        let idx = self.round_robin.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let session = self.sessions[idx].clone();
        match session.send(method, params, self.request_timeout, 0).await {
            Ok(envelope) => envelope,
            Err(e) => Envelope::err(JsonRpcError::upstream_request_failed(e)),
        }
    }
}

/// Copies `tool` into a presented descriptor: `name` replaced with the
/// presented name, `description` (if present and non-empty) prefixed with
/// `"[<upstream_id>] "`.
fn presented_tool_descriptor(tool: &Tool, presented: &str, upstream_id: &str) -> Value {
    let mut value = serde_json::to_value(tool).unwrap_or(Value::Null);
    if let Some(obj) = value.as_object_mut() {
        obj.insert("name".to_string(), Value::String(presented.to_string()));
        if let Some(desc) = obj.get("description").and_then(|v| v.as_str()).filter(|d| !d.is_empty()) {
            let prefixed = format!("[{upstream_id}] {desc}");
            obj.insert("description".to_string(), Value::String(prefixed));
        }
    }
    value
}
