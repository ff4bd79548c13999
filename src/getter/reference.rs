//! Parsed `tfr://` module references

use crate::error::{GetterError, Result};
use crate::getter::source::split_source_and_subdir;
use url::Url;

pub const TFR_SCHEME: &str = "tfr";
const VERSION_QUERY_KEY: &str = "version";

/// A registry module reference:
/// `tfr://REGISTRY_DOMAIN/NAMESPACE/NAME/SYSTEM[//SUBDIR]?version=VERSION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    /// Empty host means "use the default registry domain"
    pub registry_host: Option<String>,
    pub module_path: String,
    pub version: String,
    pub requested_subdir: String,
}

impl ModuleReference {
    /// Parse and validate a source URL. The version is checked before anything
    /// else touches the network.
    pub fn from_url(src: &Url) -> Result<Self> {
        let registry_host = src
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| match src.port() {
                Some(port) => format!("{}:{}", h, port),
                None => h.to_string(),
            });

        let (module_path, requested_subdir) = split_source_and_subdir(src.path());

        let mut versions = src
            .query_pairs()
            .filter(|(key, _)| key == VERSION_QUERY_KEY)
            .map(|(_, value)| value.into_owned());

        let version = match (versions.next(), versions.next()) {
            (None, _) => return Err(GetterError::malformed("missing version query")),
            (Some(_), Some(_)) => return Err(GetterError::malformed("more than one version query")),
            (Some(version), None) => version,
        };

        let reference = Self {
            registry_host,
            module_path,
            version,
            requested_subdir,
        };
        reference.validate()?;
        Ok(reference)
    }

    /// Reject references that cannot name a download endpoint
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(GetterError::malformed("empty version query"));
        }
        if self.module_path.trim_matches('/').is_empty() {
            return Err(GetterError::malformed("missing module path"));
        }
        Ok(())
    }

    pub fn parse(src: &str) -> Result<Self> {
        let url = Url::parse(src)?;
        Self::from_url(&url)
    }
}
