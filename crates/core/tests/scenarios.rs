//! End-to-end scenarios (spec §8 S1-S7), exercised through real child
//! processes speaking the length-prefixed frame protocol, not just unit
//! tests of the pure helper functions.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aggregator_core::config::UpstreamServer;
use aggregator_core::{AggregationController, JsonRpcError, UpstreamSession};
use serial_test::serial;

/// A tiny upstream MCP server: replies to `initialize`/`tools/list`/
/// `tools/call` using the frame protocol. `$TOOLS_JSON` supplies the
/// `tools/list` result so the same script serves every upstream in a
/// scenario with a different tool set.
const FAKE_UPSTREAM: &str = r#"
while true; do
  header=""
  while IFS= read -r line; do
    line="${line%$'\r'}"
    if [[ -z "$line" ]]; then break; fi
    header="$line"
  done
  [[ -z "$header" ]] && break
  cl="${header#Content-Length: }"
  body=$(dd bs=1 count="$cl" 2>/dev/null)
  id=$(echo "$body" | grep -o '"id":[0-9]*' | head -1 | grep -o '[0-9]*$')
  method=$(echo "$body" | grep -o '"method":"[^"]*"' | head -1 | cut -d'"' -f4)
  case "$method" in
    initialize) result='{"capabilities":{"tools":{},"prompts":{},"resources":{}},"serverInfo":{"name":"fake","version":"0"}}' ;;
    tools/list) result="$TOOLS_JSON" ;;
    resources/list) result="$RESOURCES_JSON" ;;
    tools/call)
      name=$(echo "$body" | grep -o '"name":"[^"]*"' | tail -1 | cut -d'"' -f4)
      result="{\"echoed_name\":\"$name\"}"
      ;;
    *) result='{}' ;;
  esac
  resp="{\"jsonrpc\":\"2.0\",\"id\":${id:-null},\"result\":${result}}"
  printf "Content-Length: %d\r\n\r\n%s" "${#resp}" "$resp"
done
"#;

/// Like `FAKE_UPSTREAM`, but the first request it reads is delayed past any
/// reasonable client timeout before it replies (S5: the late reply must be
/// dropped harmlessly once the client has already retried with a fresh id).
const SLOW_FIRST_REQUEST_UPSTREAM: &str = r#"
count=0
while true; do
  header=""
  while IFS= read -r line; do
    line="${line%$'\r'}"
    if [[ -z "$line" ]]; then break; fi
    header="$line"
  done
  [[ -z "$header" ]] && break
  cl="${header#Content-Length: }"
  body=$(dd bs=1 count="$cl" 2>/dev/null)
  id=$(echo "$body" | grep -o '"id":[0-9]*' | head -1 | grep -o '[0-9]*$')
  count=$((count+1))
  if [[ $count -eq 1 ]]; then
    sleep 0.3
  fi
  resp="{\"jsonrpc\":\"2.0\",\"id\":${id:-null},\"result\":{\"attempt\":$count}}"
  printf "Content-Length: %d\r\n\r\n%s" "${#resp}" "$resp"
done
"#;

/// An upstream with a tool named `t1` in its `initialize` capabilities, used
/// for S7 (the partner's failure must not affect this upstream's merge).
const INIT_WITH_CAPABILITIES_UPSTREAM: &str = r#"
while true; do
  header=""
  while IFS= read -r line; do
    line="${line%$'\r'}"
    if [[ -z "$line" ]]; then break; fi
    header="$line"
  done
  [[ -z "$header" ]] && break
  cl="${header#Content-Length: }"
  body=$(dd bs=1 count="$cl" 2>/dev/null)
  id=$(echo "$body" | grep -o '"id":[0-9]*' | head -1 | grep -o '[0-9]*$')
  result='{"capabilities":{"tools":{"t1":{}},"prompts":{},"resources":{}},"serverInfo":{"name":"fake","version":"0"}}'
  resp="{\"jsonrpc\":\"2.0\",\"id\":${id:-null},\"result\":${result}}"
  printf "Content-Length: %d\r\n\r\n%s" "${#resp}" "$resp"
done
"#;

fn upstream(id: &str, script: &str, env: HashMap<String, String>, include: Option<Vec<String>>) -> Arc<UpstreamSession> {
    Arc::new(UpstreamSession::new(UpstreamServer {
        id: id.to_string(),
        command: vec!["bash".to_string(), "-c".to_string(), script.to_string()],
        env,
        include_tools: include,
        exclude_tools: None,
    }))
}

fn tools_env(json: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("TOOLS_JSON".to_string(), json.to_string());
    env
}

fn resources_env(json: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("RESOURCES_JSON".to_string(), json.to_string());
    env
}

#[tokio::test]
async fn s1_discovery_union_with_name_prefixing() {
    let u1 = upstream("u1", FAKE_UPSTREAM, tools_env(r#"{"tools":[{"name":"a"},{"name":"b"}]}"#), None);
    let u2 = upstream("u2", FAKE_UPSTREAM, tools_env(r#"{"tools":[{"name":"b"},{"name":"c"}]}"#), None);
    let controller = AggregationController::new(vec![u1, u2]);

    let envelope = controller.route_request("tools/list", None).await;
    let tools = envelope.result.unwrap();
    let names: Vec<&str> = tools["tools"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["u1_a", "u1_b", "u2_b", "u2_c"]);

    controller.close().await;
}

#[tokio::test]
async fn resources_dedup_by_name_first_occurrence_wins() {
    let u1 = upstream(
        "u1",
        FAKE_UPSTREAM,
        resources_env(r#"{"resources":[{"uri":"file:///u1/doc","name":"readme"}]}"#),
        None,
    );
    let u2 = upstream(
        "u2",
        FAKE_UPSTREAM,
        resources_env(r#"{"resources":[{"uri":"file:///u2/doc","name":"readme"}]}"#),
        None,
    );
    let controller = AggregationController::new(vec![u1, u2]);

    let envelope = controller.route_request("resources/list", None).await;
    let resources = envelope.result.unwrap();
    let list = resources["resources"].as_array().unwrap();

    // Same name from two upstreams with different URIs: first occurrence wins.
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["uri"], "file:///u1/doc");

    controller.close().await;
}

#[tokio::test]
async fn s2_routing_by_catalog() {
    let u1 = upstream("u1", FAKE_UPSTREAM, tools_env(r#"{"tools":[{"name":"a"},{"name":"b"}]}"#), None);
    let u2 = upstream("u2", FAKE_UPSTREAM, tools_env(r#"{"tools":[{"name":"b"},{"name":"c"}]}"#), None);
    let controller = AggregationController::new(vec![u1, u2]);

    controller.route_request("tools/list", None).await;
    let envelope = controller
        .route_request("tools/call", Some(serde_json::json!({"name": "u2_b", "arguments": {}})))
        .await;

    // u2's original name is "b"; a request reaching u1 would echo "a" or "c".
    assert_eq!(envelope.result.unwrap()["echoed_name"], "b");
    controller.close().await;
}

#[tokio::test]
async fn s3_per_upstream_include_filter() {
    let u1 = upstream(
        "u1",
        FAKE_UPSTREAM,
        tools_env(r#"{"tools":[{"name":"a"},{"name":"b"}]}"#),
        Some(vec!["a".to_string()]),
    );
    let u2 = upstream("u2", FAKE_UPSTREAM, tools_env(r#"{"tools":[{"name":"b"},{"name":"c"}]}"#), None);
    let controller = AggregationController::new(vec![u1, u2]);

    let envelope = controller.route_request("tools/list", None).await;
    let tools = envelope.result.unwrap();
    let names: Vec<&str> = tools["tools"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["u1_a", "u2_b", "u2_c"]);

    controller.close().await;
}

#[tokio::test]
#[serial]
async fn s4_global_exclude_at_call() {
    std::env::set_var("ORCH_EXCLUDE_TOOLS", "u2_c");
    let u1 = upstream("u1", FAKE_UPSTREAM, tools_env(r#"{"tools":[{"name":"a"}]}"#), None);
    let u2 = upstream("u2", FAKE_UPSTREAM, tools_env(r#"{"tools":[{"name":"c"}]}"#), None);
    let controller = AggregationController::new(vec![u1, u2]);

    let envelope = controller
        .route_request("tools/call", Some(serde_json::json!({"name": "u2_c", "arguments": {}})))
        .await;

    let error = envelope.error.unwrap();
    assert_eq!(error.code, JsonRpcError::METHOD_NOT_FOUND);
    assert_eq!(error.message, "Tool excluded: u2_c");

    std::env::remove_var("ORCH_EXCLUDE_TOOLS");
    controller.close().await;
}

#[tokio::test]
async fn s5_timeout_with_retry_drops_late_reply() {
    let u1 = upstream("u1", SLOW_FIRST_REQUEST_UPSTREAM, HashMap::new(), None);
    let envelope = u1
        .send("x", None, Duration::from_millis(150), 1)
        .await
        .expect("second attempt succeeds after the first times out");

    // The reply that won is the second attempt's, not the late first one.
    assert_eq!(envelope.result.unwrap()["attempt"], 2);
    u1.close().await;
}

#[tokio::test]
async fn s7_initialization_resilience() {
    let healthy = upstream("healthy", INIT_WITH_CAPABILITIES_UPSTREAM, HashMap::new(), None);
    // A process that exits immediately never replies to `initialize`.
    let dead = upstream("dead", "exit 0", HashMap::new(), None);
    let controller = AggregationController::new(vec![healthy, dead]);

    let capabilities = controller.initialize_capabilities().await;
    assert!(capabilities.tools.contains_key("t1"));

    controller.close().await;
}
