//! Command-line argument parsing

use crate::getter::reference::TFR_SCHEME;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tfr-getter")]
#[command(about = "Download Terraform/OpenTofu modules from a module registry")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Use the OpenTofu registry as the default registry
    #[arg(
        long = "opentofu",
        global = true,
        help = "Default to registry.opentofu.org instead of registry.terraform.io"
    )]
    pub opentofu: bool,

    /// Default registry host
    #[arg(
        long = "registry-host",
        global = true,
        help = "Registry host used when the source names none (overrides TG_TF_DEFAULT_REGISTRY_HOST)"
    )]
    pub registry_host: Option<String>,

    /// Credentials file
    #[arg(
        long = "credentials-file",
        global = true,
        help = "Path to a credentials.tfrc.json file"
    )]
    pub credentials_file: Option<PathBuf>,

    /// Timeout in seconds for network operations
    #[arg(
        long = "timeout",
        short = 't',
        global = true,
        default_value = "300",
        help = "Timeout for network operations in seconds"
    )]
    pub timeout: u64,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Quiet output
    #[arg(long = "quiet", short = 'q', global = true, help = "Only print errors")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a module into a directory
    Get {
        /// Module source, e.g. tfr://registry.terraform.io/terraform-aws-modules/vpc/aws?version=3.3.0
        source: String,
        /// Destination directory
        destination: PathBuf,
    },
    /// Print the modules API base path advertised by a registry
    Discover {
        /// Registry host, e.g. registry.terraform.io
        host: Option<String>,
    },
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        if self.verbose && self.quiet {
            return Err("--verbose and --quiet cannot be used together".to_string());
        }

        if let Command::Get { source, .. } = &self.command {
            if !source.starts_with(&format!("{}://", TFR_SCHEME)) {
                return Err(format!("Source must use the {}:// scheme: {}", TFR_SCHEME, source));
            }
        }

        Ok(())
    }
}
