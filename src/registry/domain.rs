//! Registry domain selection

use crate::config::{GetterConfig, TerraformImplementation};

/// Picks the registry host to query: explicit host, then the environment
/// override, then the dialect default.
pub fn resolve_registry_domain(
    explicit_host: Option<&str>,
    env_override: Option<&str>,
    implementation: TerraformImplementation,
) -> String {
    if let Some(host) = explicit_host.filter(|h| !h.is_empty()) {
        return host.to_string();
    }

    if let Some(host) = env_override.filter(|h| !h.is_empty()) {
        return host.to_string();
    }

    implementation.default_registry_domain().to_string()
}

/// Default registry domain for a configuration, ignoring any explicit host.
pub fn default_registry_domain(config: &GetterConfig) -> String {
    resolve_registry_domain(
        None,
        config.default_registry_host.as_deref(),
        config.implementation,
    )
}
