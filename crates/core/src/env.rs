//! Process-global environment variables recognized by the core (spec §6).
//!
//! Centralized here per the design note on process-wide side channels:
//! read points are not scattered across the controller/session modules.

use crate::config::ClientProfile;

pub const CLIENT_PROFILE: &str = "ORCH_CLIENT_PROFILE";
pub const INCLUDE_TOOLS: &str = "ORCH_INCLUDE_TOOLS";
pub const EXCLUDE_TOOLS: &str = "ORCH_EXCLUDE_TOOLS";

pub fn client_profile() -> Option<ClientProfile> {
    match std::env::var(CLIENT_PROFILE).ok()?.as_str() {
        "cursor" => Some(ClientProfile::Cursor),
        "windsurf" => Some(ClientProfile::Windsurf),
        _ => None,
    }
}

fn comma_list(var: &str) -> Option<Vec<String>> {
    let raw = std::env::var(var).ok()?;
    Some(raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
}

pub fn include_tools() -> Option<Vec<String>> {
    comma_list(INCLUDE_TOOLS)
}

pub fn exclude_tools() -> Option<Vec<String>> {
    comma_list(EXCLUDE_TOOLS)
}
