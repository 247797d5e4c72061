//! Capability merge and tool-name filtering (spec §3, §4.4).

use crate::protocol::Capabilities;

/// Merge capability dictionaries from multiple upstreams. Last-writer-wins
/// across upstreams in configuration order for each of the three sub-maps.
pub fn merge_capabilities<'a>(results: impl IntoIterator<Item = &'a Capabilities>) -> Capabilities {
    let mut merged = Capabilities::default();
    for caps in results {
        for (k, v) in &caps.tools {
            merged.tools.insert(k.clone(), v.clone());
        }
        for (k, v) in &caps.prompts {
            merged.prompts.insert(k.clone(), v.clone());
        }
        for (k, v) in &caps.resources {
            merged.resources.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// Per-upstream `include_tools`/`exclude_tools` filter, applied to the
/// sanitized original tool name (spec §4.4): include, if set, restricts
/// membership; exclude removes membership.
pub fn tool_allowed(name: &str, include: Option<&[String]>, exclude: Option<&[String]>) -> bool {
    if let Some(include) = include {
        if !include.iter().any(|n| n == name) {
            return false;
        }
    }
    if let Some(exclude) = exclude {
        if exclude.iter().any(|n| n == name) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn caps(tools: &[(&str, i64)]) -> Capabilities {
        let mut c = Capabilities::default();
        for (name, v) in tools {
            c.tools.insert(name.to_string(), serde_json::json!(v));
        }
        c
    }

    #[test]
    fn merge_is_last_writer_wins_by_configuration_order() {
        let a = caps(&[("t1", 1), ("shared", 1)]);
        let b = caps(&[("t2", 2), ("shared", 2)]);
        let merged = merge_capabilities([&a, &b]);
        assert_eq!(merged.tools.get("t1"), Some(&serde_json::json!(1)));
        assert_eq!(merged.tools.get("t2"), Some(&serde_json::json!(2)));
        assert_eq!(merged.tools.get("shared"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn tool_allowed_respects_include_and_exclude() {
        let include = vec!["a".to_string()];
        assert!(tool_allowed("a", Some(&include), None));
        assert!(!tool_allowed("b", Some(&include), None));

        let exclude = vec!["c".to_string()];
        assert!(!tool_allowed("c", None, Some(&exclude)));
        assert!(tool_allowed("d", None, Some(&exclude)));

        assert!(tool_allowed("anything", None, None));
    }
}
