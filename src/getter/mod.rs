//! Registry getter
//!
//! [`RegistryGetter`] downloads modules addressed as
//!
//! ```text
//! tfr://REGISTRY_DOMAIN/MODULE_PATH?version=VERSION
//! ```
//!
//! where `REGISTRY_DOMAIN` is the registry endpoint (e.g. `registry.terraform.io`),
//! `MODULE_PATH` is the registry path of the module (e.g. `terraform-aws-modules/vpc/aws`)
//! and `VERSION` is the exact version to download. An empty domain selects the default
//! registry for the configured implementation.
//!
//! The module registry protocol is used to find where the module source lives: the
//! registry's service discovery document gives the modules API base path, the versioned
//! download endpoint answers with an `X-Terraform-Get` header (or a `location` JSON field),
//! and the result is handed to a [`FetchEngine`]. When either the reference or the
//! returned location carries a `//subdir`, the whole source is staged first and only the
//! subdirectory is copied into the destination.
//!
//! Private registries are authenticated with host-scoped credentials when the credential
//! store has them, otherwise with the `TG_TF_REGISTRY_TOKEN` bearer token.

pub mod fetch;
pub mod reference;
pub mod source;
pub mod subdir;

pub use fetch::{ClientMode, DefaultFetcher, FetchEngine, FetchOptions};
pub use reference::ModuleReference;
pub use subdir::materialize_subdir;

use crate::config::GetterConfig;
use crate::error::{GetterError, Result};
use crate::logging::Logger;
use crate::registry::client::RegistryHttpClient;
use crate::registry::{discovery, domain, download};
use std::path::Path;
use std::sync::Arc;
use url::Url;

pub struct RegistryGetter {
    config: GetterConfig,
    http: RegistryHttpClient,
    engine: Arc<dyn FetchEngine>,
    options: Option<FetchOptions>,
    logger: Logger,
}

impl RegistryGetter {
    pub fn new(config: GetterConfig, http: RegistryHttpClient, engine: Arc<dyn FetchEngine>) -> Self {
        let logger = http.logger().clone();
        Self {
            config,
            http,
            engine,
            options: None,
            logger,
        }
    }

    /// Client-level options passed through to the fetch engine
    pub fn set_client_options(&mut self, options: FetchOptions) {
        self.options = Some(options);
    }

    /// The registry is only able to serve whole module trees
    pub fn client_mode(&self, _src: &Url) -> ClientMode {
        ClientMode::Dir
    }

    /// Registry domain used when the source URL names none
    pub fn registry_domain(&self) -> String {
        domain::default_registry_domain(&self.config)
    }

    /// Download the module at `src` into `dst`.
    pub async fn get(&self, dst: &Path, src: &Url) -> Result<()> {
        let reference = ModuleReference::from_url(src)?;
        self.get_module(dst, &reference).await
    }

    /// Download an already parsed reference into `dst`.
    pub async fn get_module(&self, dst: &Path, reference: &ModuleReference) -> Result<()> {
        reference.validate()?;

        let registry_domain = domain::resolve_registry_domain(
            reference.registry_host.as_deref(),
            self.config.default_registry_host.as_deref(),
            self.config.implementation,
        );
        let scheme = self.config.registry_scheme.as_str();

        self.logger.step(&format!(
            "Resolving {} {} from {}",
            reference.module_path.trim_matches('/'),
            reference.version,
            registry_domain
        ));

        let base_path = discovery::get_module_registry_base_path(&self.http, scheme, &registry_domain).await?;

        let request_url = download::build_request_url(
            scheme,
            &registry_domain,
            &base_path,
            &reference.module_path,
            &reference.version,
        )?;
        self.logger.detail(&format!("Module download request URL: {}", request_url));

        let download_url = download::resolve_download_location(&self.http, &request_url).await?;

        let (source, source_subdir) = self.engine.split_source_and_subdir(&download_url);
        let options = self.options.clone().unwrap_or_default();

        if source_subdir.is_empty() && reference.requested_subdir.is_empty() {
            self.logger.detail(&format!("Fetching {} into {}", source, dst.display()));
            return self.engine.fetch(dst, &source, &options).await;
        }

        let subdir = source::join_subdirs(&source_subdir, &reference.requested_subdir);
        materialize_subdir(self.engine.as_ref(), &options, &self.logger, dst, &source, &subdir).await
    }

    /// Single files are not served by the module registry.
    pub async fn get_file(&self, _dst: &Path, _src: &Url) -> Result<()> {
        Err(GetterError::NotImplemented(
            "GetFile is not implemented for the Terraform Registry Getter".to_string(),
        ))
    }
}
