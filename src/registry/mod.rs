//! Module registry protocol
//!
//! This module implements the client side of the Terraform module registry protocol:
//! registry domain selection, service discovery, download request construction and
//! resolution of the `X-Terraform-Get` redirect, all over an authenticated HTTP client.

pub mod auth;
pub mod client;
pub mod discovery;
pub mod domain;
pub mod download;

pub use auth::{BearerToken, CliConfigCredentials, CredentialStore, HostCredentials, NoCredentials, StaticCredentials};
pub use client::{RegistryHttpClient, RegistryHttpClientBuilder};
pub use discovery::get_module_registry_base_path;
pub use domain::{default_registry_domain, resolve_registry_domain};
pub use download::{build_request_url, get_download_url_from_location, resolve_download_location};
