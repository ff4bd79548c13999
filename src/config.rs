//! Configuration for registry resolution, read once from the environment

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REGISTRY_DOMAIN: &str = "registry.terraform.io";
pub const DEFAULT_OPENTOFU_REGISTRY_DOMAIN: &str = "registry.opentofu.org";
pub const AUTH_TOKEN_ENV_NAME: &str = "TG_TF_REGISTRY_TOKEN";
pub const DEFAULT_REGISTRY_ENV_NAME: &str = "TG_TF_DEFAULT_REGISTRY_HOST";
pub const CLI_CONFIG_FILE_ENV_NAME: &str = "TF_CLI_CONFIG_FILE";

/// Which registry ecosystem is in effect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerraformImplementation {
    #[default]
    Terraform,
    OpenTofu,
}

impl TerraformImplementation {
    pub fn default_registry_domain(&self) -> &'static str {
        match self {
            TerraformImplementation::Terraform => DEFAULT_REGISTRY_DOMAIN,
            TerraformImplementation::OpenTofu => DEFAULT_OPENTOFU_REGISTRY_DOMAIN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetterConfig {
    pub implementation: TerraformImplementation,
    /// Overrides the dialect default registry host
    pub default_registry_host: Option<String>,
    /// Bearer token used when no host-scoped credentials exist
    pub registry_token: Option<String>,
    /// Scheme used to qualify discovery and download request URLs
    pub registry_scheme: String,
    pub timeout: Option<Duration>,
    pub cli_config_file: Option<PathBuf>,
}

impl Default for GetterConfig {
    fn default() -> Self {
        Self {
            implementation: TerraformImplementation::Terraform,
            default_registry_host: None,
            registry_token: None,
            registry_scheme: "https".to_string(),
            timeout: None,
            cli_config_file: None,
        }
    }
}

impl GetterConfig {
    pub fn from_env() -> Self {
        Self {
            default_registry_host: non_empty_env(DEFAULT_REGISTRY_ENV_NAME),
            registry_token: non_empty_env(AUTH_TOKEN_ENV_NAME),
            cli_config_file: non_empty_env(CLI_CONFIG_FILE_ENV_NAME).map(PathBuf::from),
            ..Self::default()
        }
    }

    pub fn with_implementation(mut self, implementation: TerraformImplementation) -> Self {
        self.implementation = implementation;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_registry_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.registry_scheme = scheme.into();
        self
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}
