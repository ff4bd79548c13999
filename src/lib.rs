//! Terraform Registry Getter Library
//!
//! This file serves as the library root for the tfr-getter crate, organizing and
//! exposing the modules that resolve `tfr://` module sources through the module
//! registry protocol and download them.

pub mod cli;
pub mod common;
pub mod config;
pub mod error;
pub mod getter;
pub mod logging;
pub mod registry;

pub use config::{GetterConfig, TerraformImplementation};
pub use error::{GetterError, Result};
pub use getter::{DefaultFetcher, FetchEngine, FetchOptions, ModuleReference, RegistryGetter};
pub use logging::Logger;
pub use registry::{CredentialStore, RegistryHttpClient};
