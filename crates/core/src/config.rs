//! Configuration schema (spec §3, §6) and normalization of its two
//! alternative surface forms.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One configured upstream MCP server (spec §3's "Upstream configuration").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamServer {
    pub id: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub include_tools: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_tools: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Stdio,
    #[serde(rename = "http-sse")]
    HttpSse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    #[serde(default)]
    pub mode: TransportMode,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_sse_path")]
    pub sse_path: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7332
}

fn default_sse_path() -> String {
    "/events".to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            host: default_host(),
            port: default_port(),
            sse_path: default_sse_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientProfile {
    Cursor,
    Windsurf,
}

/// The canonical, normalized configuration every surface form reduces to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatorConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub upstream: Vec<UpstreamServer>,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub include_tools: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_tools: Option<Vec<String>>,
    #[serde(default)]
    pub client_profile: Option<ClientProfile>,
}

fn default_name() -> String {
    "orchestrator-mcp-aggregator".to_string()
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            upstream: Vec::new(),
            transport: TransportConfig::default(),
            include_tools: None,
            exclude_tools: None,
            client_profile: None,
        }
    }
}

// ---------------------------------------------------------------------
// Alternative surface forms (spec §6)
// ---------------------------------------------------------------------

/// Form 1: `{ "servers": [...] }`, already close to canonical shape.
#[derive(Debug, Deserialize)]
struct ServersForm {
    #[serde(default)]
    name: Option<String>,
    servers: Vec<ServerEntry>,
    #[serde(default)]
    transport: Option<TransportConfig>,
    #[serde(default)]
    include_tools: Option<Vec<String>>,
    #[serde(default)]
    exclude_tools: Option<Vec<String>>,
    #[serde(default)]
    client_profile: Option<ClientProfile>,
}

#[derive(Debug, Deserialize)]
struct ServerEntry {
    #[serde(alias = "name")]
    id: String,
    command: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    include_tools: Option<Vec<String>>,
    #[serde(default)]
    exclude_tools: Option<Vec<String>>,
}

/// Form 2: Cursor/Claude-Desktop-style `{ "mcpServers": { name: {...} } }`.
#[derive(Debug, Deserialize)]
struct McpServersForm {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "mcpServers")]
    mcp_servers: indexmap::IndexMap<String, McpServerEntry>,
    #[serde(default)]
    transport: Option<TransportConfig>,
    #[serde(default)]
    include_tools: Option<Vec<String>>,
    #[serde(default)]
    exclude_tools: Option<Vec<String>>,
    #[serde(default)]
    client_profile: Option<ClientProfile>,
}

#[derive(Debug, Deserialize)]
struct McpServerEntry {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    tools: Option<McpServerTools>,
}

#[derive(Debug, Deserialize)]
struct McpServerTools {
    #[serde(default)]
    allowed: Option<Vec<String>>,
}

/// Parse raw config text into the normalized schema, trying form 1, then
/// form 2. Returns an error describing both parse failures if neither
/// matches, since a config author needs to know which shape was expected.
pub fn normalize(raw: &serde_json::Value) -> Result<AggregatorConfig, String> {
    if raw.get("servers").is_some() {
        let form: ServersForm = serde_json::from_value(raw.clone()).map_err(|e| format!("invalid `servers` config: {e}"))?;
        return Ok(AggregatorConfig {
            name: form.name.unwrap_or_else(default_name),
            upstream: form
                .servers
                .into_iter()
                .map(|s| UpstreamServer {
                    id: s.id,
                    command: s.command,
                    env: s.env,
                    include_tools: s.include_tools,
                    exclude_tools: s.exclude_tools,
                })
                .collect(),
            transport: form.transport.unwrap_or_default(),
            include_tools: form.include_tools,
            exclude_tools: form.exclude_tools,
            client_profile: form.client_profile,
        });
    }

    if raw.get("mcpServers").is_some() {
        let form: McpServersForm = serde_json::from_value(raw.clone()).map_err(|e| format!("invalid `mcpServers` config: {e}"))?;
        let upstream = form
            .mcp_servers
            .into_iter()
            .filter(|(_, entry)| !entry.disabled)
            .map(|(name, entry)| {
                let mut command = vec![entry.command];
                command.extend(entry.args);
                UpstreamServer {
                    id: name,
                    command,
                    env: entry.env,
                    include_tools: entry.tools.and_then(|t| t.allowed),
                    exclude_tools: None,
                }
            })
            .collect();
        return Ok(AggregatorConfig {
            name: form.name.unwrap_or_else(default_name),
            upstream,
            transport: form.transport.unwrap_or_default(),
            include_tools: form.include_tools,
            exclude_tools: form.exclude_tools,
            client_profile: form.client_profile,
        });
    }

    Err("config must contain either a `servers` list or an `mcpServers` map".to_string())
}

/// Parse a config file's contents, selecting JSON or YAML by file extension.
pub fn load_str(text: &str, is_yaml: bool) -> Result<AggregatorConfig, String> {
    let raw: serde_json::Value = if is_yaml {
        serde_yaml::from_str(text).map_err(|e| format!("invalid YAML: {e}"))?
    } else {
        serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?
    };
    normalize(&raw)
}
