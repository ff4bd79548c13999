//! Runner that executes a parsed command line

use crate::cli::args::{Args, Command};
use crate::config::{GetterConfig, TerraformImplementation};
use crate::error::{GetterError, Result};
use crate::getter::{DefaultFetcher, FetchOptions, RegistryGetter};
use crate::logging::Logger;
use crate::registry::auth::CliConfigCredentials;
use crate::registry::client::RegistryHttpClient;
use crate::registry::{discovery, domain};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

pub struct Runner {
    args: Args,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Result<Self> {
        let output = if args.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(args.verbose)
        };

        Ok(Self { args, output })
    }

    pub async fn run(&self) -> Result<()> {
        let start_time = Instant::now();

        self.args.validate().map_err(GetterError::Config)?;

        let config = self.build_config();
        let http = self.build_http_client(&config)?;

        match &self.args.command {
            Command::Get { source, destination } => {
                self.output.section("Terraform Registry Getter");
                self.get(config, http, source, destination).await?;
            }
            Command::Discover { host } => {
                let registry_domain = domain::resolve_registry_domain(
                    host.as_deref(),
                    config.default_registry_host.as_deref(),
                    config.implementation,
                );
                let base_path =
                    discovery::get_module_registry_base_path(&http, &config.registry_scheme, &registry_domain)
                        .await?;
                self.output.summary_kv(
                    "Service discovery",
                    &[("Registry", registry_domain), ("modules.v1", base_path)],
                );
            }
        }

        self.output.success(&format!(
            "Operation completed successfully in {}",
            self.output.format_duration(start_time.elapsed())
        ));
        Ok(())
    }

    fn build_config(&self) -> GetterConfig {
        let implementation = if self.args.opentofu {
            TerraformImplementation::OpenTofu
        } else {
            TerraformImplementation::Terraform
        };

        let mut config = GetterConfig::from_env()
            .with_implementation(implementation)
            .with_timeout(Some(Duration::from_secs(self.args.timeout)));

        if let Some(host) = &self.args.registry_host {
            config.default_registry_host = Some(host.clone());
        }
        if let Some(path) = &self.args.credentials_file {
            config.cli_config_file = Some(path.clone());
        }
        config
    }

    fn build_http_client(&self, config: &GetterConfig) -> Result<RegistryHttpClient> {
        let credentials = CliConfigCredentials::load(config.cli_config_file.as_deref())?;
        self.output
            .detail(&format!("Loaded credentials for {} registry hosts", credentials.len()));

        RegistryHttpClient::builder()
            .with_config(config)
            .with_credentials(Arc::new(credentials))
            .with_logger(self.output.clone())
            .build()
    }

    async fn get(&self, config: GetterConfig, http: RegistryHttpClient, source: &str, destination: &Path) -> Result<()> {
        let src = Url::parse(source)?;
        let timeout = config.timeout;

        let engine = Arc::new(DefaultFetcher::with_timeout(&self.output, timeout)?);
        let mut getter = RegistryGetter::new(config, http, engine);
        getter.set_client_options(FetchOptions {
            mode: getter.client_mode(&src),
            timeout,
        });

        self.output.info(&format!("Source: {}", source));
        self.output.info(&format!("Destination: {}", destination.display()));

        getter.get(destination, &src).await
    }
}
