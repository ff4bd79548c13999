//! Module download request construction and redirect resolution

use crate::error::{GetterError, Result};
use crate::registry::client::RegistryHttpClient;
use reqwest::header::HeaderMap;
use url::Url;

pub const TERRAFORM_GET_HEADER: &str = "X-Terraform-Get";
const LOCATION_FIELD: &str = "location";

/// Build the versioned download URL for a module.
///
/// An absolute `base_path` is used as-is; a relative one is qualified with
/// `scheme` and `domain`.
pub fn build_request_url(
    scheme: &str,
    domain: &str,
    base_path: &str,
    module_path: &str,
    version: &str,
) -> Result<Url> {
    let base_path = base_path.strip_suffix('/').unwrap_or(base_path);
    let module_path = module_path.strip_suffix('/').unwrap_or(module_path);
    let module_path = module_path.strip_prefix('/').unwrap_or(module_path);

    let full_path = format!("{}/{}/{}/download", base_path, module_path, version);

    match Url::parse(&full_path) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let mut url = Url::parse(&format!("{}://{}/", scheme, domain))?;
            url.set_path(&full_path);
            Ok(url)
        }
        Err(e) => Err(e.into()),
    }
}

/// Pick the download location out of a download response. The header wins
/// over the JSON body.
pub fn extract_download_location(request_url: &Url, headers: &HeaderMap, body: &[u8]) -> Result<String> {
    let header_value = headers
        .get(TERRAFORM_GET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !header_value.is_empty() {
        return Ok(header_value.to_string());
    }

    let json: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
        GetterError::module_download(
            request_url.as_str(),
            format!(
                "Error parsing response body {}: {}",
                String::from_utf8_lossy(body),
                e
            ),
        )
    })?;

    match json.get(LOCATION_FIELD).and_then(|v| v.as_str()) {
        Some(location) if !location.is_empty() => Ok(location.to_string()),
        _ => Err(GetterError::module_download(
            request_url.as_str(),
            "no source URL was returned in header X-Terraform-Get and in location response from download URL",
        )),
    }
}

pub fn is_relative_location(location: &str) -> bool {
    location.starts_with('/') || location.starts_with("./") || location.starts_with("../")
}

/// Anchor a relative download location to the URL that was actually requested.
/// Registries behind a proxy may not know their public origin.
pub fn get_download_url_from_location(request_url: &Url, location: &str) -> Result<String> {
    if !is_relative_location(location) {
        return Ok(location.to_string());
    }

    let resolved = request_url.join(location)?;
    Ok(resolved.to_string())
}

/// GET the download endpoint and return the absolute source location.
pub async fn resolve_download_location(client: &RegistryHttpClient, request_url: &Url) -> Result<String> {
    let (body, headers) = client.get(request_url).await?;
    let location = extract_download_location(request_url, &headers, &body)?;
    let source = get_download_url_from_location(request_url, &location)?;

    client
        .logger()
        .detail(&format!("Registry returned download location {}", source));

    Ok(source)
}
