//! Routing catalog (spec §4.3): presented name -> {upstream, original name, descriptor}.

use indexmap::IndexMap;
use serde_json::Value;

/// `sanitize(s) = replace '-' with '_'` (spec §3).
pub fn sanitize(s: &str) -> String {
    s.replace('-', "_")
}

/// `presented_name = sanitize(upstream_id) + "_" + sanitize(original_name)`.
pub fn presented_name(upstream_id: &str, original_name: &str) -> String {
    format!("{}_{}", sanitize(upstream_id), sanitize(original_name))
}

#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub presented_name: String,
    pub original_name: String,
    pub upstream_id: String,
    pub descriptor: Value,
}

#[derive(Debug, Clone)]
pub struct NamedEntry {
    pub upstream_id: String,
    pub descriptor: Value,
}

/// In-memory routing table, rebuilt on every discovery request. Iteration
/// order is insertion order, which tracks upstream configuration order.
#[derive(Debug, Default)]
pub struct Catalog {
    tools: IndexMap<String, ToolEntry>,
    prompts: IndexMap<String, NamedEntry>,
    resources: IndexMap<String, NamedEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each discovery method (`tools/list`, `prompts/list`, `resources/list`)
    /// rebuilds only its own section of the catalog.
    pub fn clear_tools(&mut self) {
        self.tools.clear();
    }

    pub fn clear_prompts(&mut self) {
        self.prompts.clear();
    }

    pub fn clear_resources(&mut self) {
        self.resources.clear();
    }

    /// Inserts a tool under `presented`. Returns `false` on collision,
    /// meaning the entry was dropped and the existing (earlier, by
    /// configuration order) entry is kept.
    pub fn set_tool(&mut self, presented: String, descriptor: Value, upstream_id: String, original: String) -> bool {
        if self.tools.contains_key(&presented) {
            return false;
        }
        self.tools.insert(
            presented.clone(),
            ToolEntry {
                presented_name: presented,
                original_name: original,
                upstream_id,
                descriptor,
            },
        );
        true
    }

    /// First occurrence wins (configuration order) — union semantics for
    /// prompts/resources rather than the tool catalog's per-name routing.
    pub fn set_prompt(&mut self, name: String, descriptor: Value, upstream_id: String) -> bool {
        if self.prompts.contains_key(&name) {
            return false;
        }
        self.prompts.insert(name, NamedEntry { upstream_id, descriptor });
        true
    }

    pub fn set_resource(&mut self, name: String, descriptor: Value, upstream_id: String) -> bool {
        if self.resources.contains_key(&name) {
            return false;
        }
        self.resources.insert(name, NamedEntry { upstream_id, descriptor });
        true
    }

    pub fn lookup_tool(&self, presented: &str) -> Option<(&str, &str)> {
        self.tools.get(presented).map(|e| (e.upstream_id.as_str(), e.original_name.as_str()))
    }

    pub fn tools(&self) -> impl Iterator<Item = &ToolEntry> {
        self.tools.values()
    }

    pub fn prompts(&self) -> impl Iterator<Item = (&String, &NamedEntry)> {
        self.prompts.iter()
    }

    pub fn resources(&self) -> impl Iterator<Item = (&String, &NamedEntry)> {
        self.resources.iter()
    }
}
