//! Utility functions

use serde::{Deserialize, Serialize};

/// Version information for the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Build the deployment ID for an instance or a binding.
///
/// The format is stored alongside existing records and must not change.
pub fn deployment_id(instance_id: &str, binding_id: &str) -> String {
    format!("tf:{}:{}", instance_id, binding_id)
}

/// Split a deployment ID into its instance and binding parts
pub fn parse_deployment_id(id: &str) -> Option<(&str, &str)> {
    let rest = id.strip_prefix("tf:")?;
    rest.split_once(':')
}

/// Collapse multi-line process output onto a single line
pub fn flatten_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a boolean environment value
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Parse an engine version, accepting a leading `v` and missing minor/patch parts
pub fn parse_version(text: &str) -> Result<semver::Version, semver::Error> {
    let text = text.trim();
    let text = text.strip_prefix('v').unwrap_or(text);

    let (core, rest) = match text.find(['-', '+']) {
        Some(index) => text.split_at(index),
        None => (text, ""),
    };
    let mut parts: Vec<&str> = core.split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    semver::Version::parse(&format!("{}{}", parts.join("."), rest))
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
