//! Remote service discovery
//!
//! Resolves a registry host to the base path of its module API by reading the
//! host's `/.well-known/terraform.json` document.

use crate::error::{GetterError, Result};
use crate::registry::client::RegistryHttpClient;
use serde::Deserialize;
use url::Url;

pub const SERVICE_DISCOVERY_PATH: &str = "/.well-known/terraform.json";

/// The part of the discovery document this getter cares about
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RegistryServicePath {
    #[serde(rename = "modules.v1")]
    pub modules_path: String,
}

pub fn discovery_url(scheme: &str, domain: &str) -> Result<Url> {
    let url = Url::parse(&format!("{}://{}{}", scheme, domain, SERVICE_DISCOVERY_PATH))?;
    Ok(url)
}

/// Parse a discovery document body. The `modules.v1` key must be present and
/// non-empty.
pub fn parse_discovery_document(body: &[u8]) -> Result<RegistryServicePath> {
    let parsed: RegistryServicePath = serde_json::from_slice(body).map_err(|e| {
        GetterError::ServiceDiscovery {
            reason: format!(
                "Error parsing response body {}: {}",
                String::from_utf8_lossy(body),
                e
            ),
        }
    })?;

    if parsed.modules_path.is_empty() {
        return Err(GetterError::ServiceDiscovery {
            reason: "discovery document has an empty modules.v1 entry".to_string(),
        });
    }

    Ok(parsed)
}

/// Returns the modules base path advertised by `domain`, verbatim. It may be
/// absolute or host-relative.
pub async fn get_module_registry_base_path(
    client: &RegistryHttpClient,
    scheme: &str,
    domain: &str,
) -> Result<String> {
    let url = discovery_url(scheme, domain)?;
    let (body, _) = client.get(&url).await?;
    let service_path = parse_discovery_document(&body)?;

    client
        .logger()
        .detail(&format!("Module registry base path for {}: {}", domain, service_path.modules_path));

    Ok(service_path.modules_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_url() {
        let url = discovery_url("https", "registry.terraform.io").unwrap();
        assert_eq!(url.as_str(), "https://registry.terraform.io/.well-known/terraform.json");

        let url = discovery_url("http", "127.0.0.1:8080").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/.well-known/terraform.json");
    }

    #[test]
    fn test_parse_relative_and_absolute_paths() {
        let doc = parse_discovery_document(br#"{"modules.v1": "/v1/modules/", "providers.v1": "/v1/providers/"}"#)
            .unwrap();
        assert_eq!(doc.modules_path, "/v1/modules/");

        let doc = parse_discovery_document(br#"{"modules.v1": "https://modules.example.com/api/"}"#).unwrap();
        assert_eq!(doc.modules_path, "https://modules.example.com/api/");
    }

    #[test]
    fn test_missing_key_is_discovery_error() {
        let err = parse_discovery_document(br#"{"providers.v1": "/v1/providers/"}"#).unwrap_err();
        assert!(matches!(err, GetterError::ServiceDiscovery { .. }));
    }

    #[test]
    fn test_invalid_json_is_discovery_error() {
        let err = parse_discovery_document(b"<html>not json</html>").unwrap_err();
        assert!(matches!(err, GetterError::ServiceDiscovery { .. }));

        let err = parse_discovery_document(br#"["modules.v1"]"#).unwrap_err();
        assert!(matches!(err, GetterError::ServiceDiscovery { .. }));
    }
}
