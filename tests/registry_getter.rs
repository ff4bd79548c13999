use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use httpmock::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tfr_getter::getter::{DefaultFetcher, FetchEngine, FetchOptions, ModuleReference, RegistryGetter};
use tfr_getter::registry::{RegistryHttpClient, StaticCredentials};
use tfr_getter::{GetterConfig, GetterError};
use url::Url;

const DOWNLOAD_PATH: &str = "/v1/modules/terraform-aws-modules/vpc/aws/3.3.0/download";

fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, content.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn test_config() -> GetterConfig {
    GetterConfig::default().with_registry_scheme("http")
}

fn http_client(config: &GetterConfig) -> RegistryHttpClient {
    RegistryHttpClient::builder().with_config(config).build().unwrap()
}

fn default_getter(config: GetterConfig) -> RegistryGetter {
    let http = http_client(&config);
    let engine = Arc::new(DefaultFetcher::new(http.logger()).unwrap());
    RegistryGetter::new(config, http, engine)
}

fn source_url(server: &MockServer, suffix: &str) -> Url {
    Url::parse(&format!(
        "tfr://{}/terraform-aws-modules/vpc/aws{}",
        server.address(),
        suffix
    ))
    .unwrap()
}

fn mock_discovery(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/terraform.json");
        then.status(200)
            .json_body(serde_json::json!({"modules.v1": "/v1/modules/", "providers.v1": "/v1/providers/"}));
    })
}

/// Engine that writes a fixed tree into whatever directory it is asked to fill
struct RecordingFetcher {
    files: Vec<(&'static str, &'static str)>,
    destinations: Mutex<Vec<PathBuf>>,
}

impl RecordingFetcher {
    fn new(files: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            files,
            destinations: Mutex::new(Vec::new()),
        }
    }

    fn destinations(&self) -> Vec<PathBuf> {
        self.destinations.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchEngine for RecordingFetcher {
    async fn fetch(&self, dst: &Path, _source: &str, _options: &FetchOptions) -> tfr_getter::Result<()> {
        self.destinations.lock().unwrap().push(dst.to_path_buf());
        for (path, content) in &self.files {
            let target = dst.join(path);
            std::fs::create_dir_all(target.parent().unwrap())?;
            std::fs::write(target, content)?;
        }
        Ok(())
    }
}

/// Engine that starts filling its destination and then never finishes
struct StalledFetcher {
    destinations: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl FetchEngine for StalledFetcher {
    async fn fetch(&self, dst: &Path, _source: &str, _options: &FetchOptions) -> tfr_getter::Result<()> {
        self.destinations.lock().unwrap().push(dst.to_path_buf());
        std::fs::create_dir_all(dst.join("modules"))?;
        std::fs::write(dst.join("modules/main.tf"), "partial")?;
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

fn has_no_authorization(req: &HttpMockRequest) -> bool {
    req.headers
        .as_ref()
        .map_or(true, |headers| headers.iter().all(|(name, _)| !name.eq_ignore_ascii_case("authorization")))
}

#[tokio::test]
async fn test_get_with_relative_header_location() {
    let server = MockServer::start();
    let discovery = mock_discovery(&server);
    let download = server.mock(|when, then| {
        when.method(GET).path(DOWNLOAD_PATH);
        then.status(204).header("X-Terraform-Get", "/archives/vpc.tar.gz");
    });
    let archive = server.mock(|when, then| {
        when.method(GET).path("/archives/vpc.tar.gz");
        then.status(200).body(tar_gz(&[("main.tf", "module vpc"), ("modules/nat/main.tf", "nat")]));
    });

    let dst = TempDir::new().unwrap();
    let target = dst.path().join("vpc");
    let getter = default_getter(test_config());
    getter
        .get(&target, &source_url(&server, "?version=3.3.0"))
        .await
        .unwrap();

    discovery.assert();
    download.assert();
    archive.assert();
    assert_eq!(std::fs::read_to_string(target.join("main.tf")).unwrap(), "module vpc");
    assert_eq!(std::fs::read_to_string(target.join("modules/nat/main.tf")).unwrap(), "nat");
}

#[tokio::test]
async fn test_get_with_body_location_and_combined_subdirs() {
    let server = MockServer::start();
    mock_discovery(&server);
    server.mock(|when, then| {
        when.method(GET).path(DOWNLOAD_PATH);
        then.status(200)
            .json_body(serde_json::json!({"location": "./repo.tar.gz//modules"}));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/v1/modules/terraform-aws-modules/vpc/aws/3.3.0/repo.tar.gz");
        then.status(200).body(tar_gz(&[
            ("README.md", "root"),
            ("modules/nat/main.tf", "nat"),
            ("modules/nat/outputs.tf", "outputs"),
            ("modules/other/main.tf", "other"),
        ]));
    });

    let dst = TempDir::new().unwrap();
    let target = dst.path().join("nat");
    std::fs::create_dir_all(target.join("stale")).unwrap();
    std::fs::write(target.join("stale/old.tf"), "old").unwrap();

    let getter = default_getter(test_config());
    getter
        .get(&target, &source_url(&server, "//nat?version=3.3.0"))
        .await
        .unwrap();

    let mut names: Vec<String> = std::fs::read_dir(&target)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["main.tf", "outputs.tf"]);
    assert!(!target.join(".tgmanifest").exists());
}

#[tokio::test]
async fn test_header_takes_precedence_over_body() {
    let server = MockServer::start();
    mock_discovery(&server);
    server.mock(|when, then| {
        when.method(GET).path(DOWNLOAD_PATH);
        then.status(200)
            .header("X-Terraform-Get", "/archives/from-header.tgz")
            .json_body(serde_json::json!({"location": "/archives/from-body.tgz"}));
    });
    let header_archive = server.mock(|when, then| {
        when.method(GET).path("/archives/from-header.tgz");
        then.status(200).body(tar_gz(&[("main.tf", "header")]));
    });
    let body_archive = server.mock(|when, then| {
        when.method(GET).path("/archives/from-body.tgz");
        then.status(200).body(tar_gz(&[("main.tf", "body")]));
    });

    let dst = TempDir::new().unwrap();
    default_getter(test_config())
        .get(dst.path(), &source_url(&server, "?version=3.3.0"))
        .await
        .unwrap();

    header_archive.assert();
    body_archive.assert_hits(0);
    assert_eq!(std::fs::read_to_string(dst.path().join("main.tf")).unwrap(), "header");
}

#[tokio::test]
async fn test_missing_or_duplicate_version_fails_before_network() {
    let server = MockServer::start();
    let discovery = mock_discovery(&server);
    let getter = default_getter(test_config());
    let dst = TempDir::new().unwrap();

    let err = getter.get(dst.path(), &source_url(&server, "")).await.unwrap_err();
    assert!(matches!(err, GetterError::MalformedRegistryUrl { .. }));

    let err = getter
        .get(dst.path(), &source_url(&server, "?version=1.0.0&version=2.0.0"))
        .await
        .unwrap_err();
    assert!(matches!(err, GetterError::MalformedRegistryUrl { .. }));

    discovery.assert_hits(0);
}

#[tokio::test]
async fn test_discovery_failure_status_is_registry_api_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/terraform.json");
        then.status(404);
    });

    let dst = TempDir::new().unwrap();
    let err = default_getter(test_config())
        .get(dst.path(), &source_url(&server, "?version=3.3.0"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GetterError::RegistryApi {
            url: format!("http://{}/.well-known/terraform.json", server.address()),
            status_code: 404,
        }
    );
}

#[tokio::test]
async fn test_download_failure_status_is_registry_api_error() {
    let server = MockServer::start();
    mock_discovery(&server);
    server.mock(|when, then| {
        when.method(GET).path(DOWNLOAD_PATH);
        then.status(500);
    });

    let dst = TempDir::new().unwrap();
    let err = default_getter(test_config())
        .get(dst.path(), &source_url(&server, "?version=3.3.0"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GetterError::RegistryApi {
            url: format!("http://{}{}", server.address(), DOWNLOAD_PATH),
            status_code: 500,
        }
    );
}

#[tokio::test]
async fn test_bad_discovery_document_and_missing_location() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/terraform.json");
        then.status(200).json_body(serde_json::json!({"providers.v1": "/v1/providers/"}));
    });

    let dst = TempDir::new().unwrap();
    let err = default_getter(test_config())
        .get(dst.path(), &source_url(&server, "?version=3.3.0"))
        .await
        .unwrap_err();
    assert!(matches!(err, GetterError::ServiceDiscovery { .. }));

    let server = MockServer::start();
    mock_discovery(&server);
    server.mock(|when, then| {
        when.method(GET).path(DOWNLOAD_PATH);
        then.status(200).json_body(serde_json::json!({}));
    });
    let err = default_getter(test_config())
        .get(dst.path(), &source_url(&server, "?version=3.3.0"))
        .await
        .unwrap_err();
    assert!(matches!(err, GetterError::ModuleDownload { .. }));
}

#[tokio::test]
async fn test_absolute_modules_base_path() {
    let server = MockServer::start();
    let base = server.url("/api/registry/modules/");
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/terraform.json");
        then.status(200).json_body(serde_json::json!({ "modules.v1": base }));
    });
    let download = server.mock(|when, then| {
        when.method(GET)
            .path("/api/registry/modules/terraform-aws-modules/vpc/aws/3.3.0/download");
        then.status(204).header("X-Terraform-Get", "../../archive.tgz");
    });
    let archive = server.mock(|when, then| {
        when.method(GET)
            .path("/api/registry/modules/terraform-aws-modules/vpc/archive.tgz");
        then.status(200).body(tar_gz(&[("main.tf", "abs")]));
    });

    let dst = TempDir::new().unwrap();
    default_getter(test_config())
        .get(dst.path(), &source_url(&server, "?version=3.3.0"))
        .await
        .unwrap();

    download.assert();
    archive.assert();
}

#[tokio::test]
async fn test_fallback_token_is_sent() {
    let server = MockServer::start();
    let discovery = server.mock(|when, then| {
        when.method(GET)
            .path("/.well-known/terraform.json")
            .header("authorization", "Bearer env-token");
        then.status(200).json_body(serde_json::json!({"modules.v1": "/v1/modules/"}));
    });
    let download = server.mock(|when, then| {
        when.method(GET)
            .path(DOWNLOAD_PATH)
            .header("authorization", "Bearer env-token");
        then.status(204).header("X-Terraform-Get", "/archives/vpc.tgz");
    });
    server.mock(|when, then| {
        when.method(GET).path("/archives/vpc.tgz");
        then.status(200).body(tar_gz(&[("main.tf", "private")]));
    });

    let mut config = test_config();
    config.registry_token = Some("env-token".to_string());

    let dst = TempDir::new().unwrap();
    default_getter(config)
        .get(dst.path(), &source_url(&server, "?version=3.3.0"))
        .await
        .unwrap();

    discovery.assert();
    download.assert();
}

#[tokio::test]
async fn test_host_credentials_take_precedence_over_token() {
    let server = MockServer::start();
    let discovery = server.mock(|when, then| {
        when.method(GET)
            .path("/.well-known/terraform.json")
            .header("authorization", "Bearer host-token");
        then.status(200).json_body(serde_json::json!({"modules.v1": "/v1/modules/"}));
    });

    let mut config = test_config();
    config.registry_token = Some("env-token".to_string());
    let store = StaticCredentials::new().with_token(&server.host(), "host-token");
    let http = RegistryHttpClient::builder()
        .with_config(&config)
        .with_credentials(Arc::new(store))
        .build()
        .unwrap();

    let base = tfr_getter::registry::get_module_registry_base_path(&http, "http", &server.address().to_string())
        .await
        .unwrap();

    discovery.assert();
    assert_eq!(base, "/v1/modules/");
}

#[tokio::test]
async fn test_staging_directory_removed_on_success_and_failure() {
    let server = MockServer::start();
    mock_discovery(&server);
    server.mock(|when, then| {
        when.method(GET).path(DOWNLOAD_PATH);
        then.status(204)
            .header("X-Terraform-Get", "https://example.com/repo.tar.gz//modules");
    });

    let config = test_config();
    let http = http_client(&config);
    let engine = Arc::new(RecordingFetcher::new(vec![
        ("modules/vpc/main.tf", "vpc"),
        ("modules/vpc/nested/data.tf", "data"),
    ]));
    let getter = RegistryGetter::new(config, http, engine.clone());

    let dst = TempDir::new().unwrap();
    let target = dst.path().join("vpc");
    getter
        .get(&target, &source_url(&server, "//vpc?version=3.3.0"))
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(target.join("nested/data.tf")).unwrap(), "data");

    let err = getter
        .get(&target, &source_url(&server, "//missing?version=3.3.0"))
        .await
        .unwrap_err();
    assert!(matches!(err, GetterError::ModuleDownload { ref source_url, .. } if source_url == "https://example.com/repo.tar.gz"));

    let staged = engine.destinations();
    assert_eq!(staged.len(), 2);
    for path in staged {
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());
    }
    // a failed extraction leaves the previous destination untouched
    assert!(target.join("main.tf").exists());
}

#[tokio::test]
async fn test_ambiguous_glob_subdir_is_an_error() {
    let server = MockServer::start();
    mock_discovery(&server);
    server.mock(|when, then| {
        when.method(GET).path(DOWNLOAD_PATH);
        then.status(204)
            .header("X-Terraform-Get", "https://example.com/repo.tar.gz//*/modules");
    });

    let config = test_config();
    let http = http_client(&config);
    let engine = Arc::new(RecordingFetcher::new(vec![
        ("one/modules/main.tf", "one"),
        ("two/modules/main.tf", "two"),
    ]));
    let getter = RegistryGetter::new(config, http, engine.clone());

    let dst = TempDir::new().unwrap();
    let err = getter
        .get(dst.path(), &source_url(&server, "?version=3.3.0"))
        .await
        .unwrap_err();
    assert!(matches!(err, GetterError::Fetch(_)));
    assert!(engine.destinations().iter().all(|p| !p.exists()));
}

#[tokio::test]
async fn test_get_file_is_not_supported() {
    let getter = default_getter(test_config());
    let dst = TempDir::new().unwrap();
    let src = Url::parse("tfr://registry.terraform.io/terraform-aws-modules/vpc/aws?version=3.3.0").unwrap();

    let err = getter.get_file(&dst.path().join("main.tf"), &src).await.unwrap_err();
    assert!(matches!(err, GetterError::NotImplemented(_)));
}

#[tokio::test]
async fn test_archive_download_does_not_carry_registry_credentials() {
    let registry = MockServer::start();
    let archive_host = MockServer::start();
    let discovery = registry.mock(|when, then| {
        when.method(GET)
            .path("/.well-known/terraform.json")
            .header("authorization", "Bearer registry-secret");
        then.status(200).json_body(serde_json::json!({"modules.v1": "/v1/modules/"}));
    });
    let download = registry.mock(|when, then| {
        when.method(GET)
            .path(DOWNLOAD_PATH)
            .header("authorization", "Bearer registry-secret");
        then.status(204).header("X-Terraform-Get", archive_host.url("/vpc.tgz"));
    });
    let leaked = archive_host.mock(|when, then| {
        when.method(GET).path("/vpc.tgz").header_exists("authorization");
        then.status(403);
    });
    let archive = archive_host.mock(|when, then| {
        when.method(GET).path("/vpc.tgz").matches(has_no_authorization);
        then.status(200).body(tar_gz(&[("main.tf", "public")]));
    });

    let mut config = test_config();
    config.registry_token = Some("registry-secret".to_string());

    let dst = TempDir::new().unwrap();
    default_getter(config)
        .get(dst.path(), &source_url(&registry, "?version=3.3.0"))
        .await
        .unwrap();

    discovery.assert();
    download.assert();
    archive.assert();
    leaked.assert_hits(0);
    assert_eq!(std::fs::read_to_string(dst.path().join("main.tf")).unwrap(), "public");
}

#[tokio::test]
async fn test_subdir_resolving_to_file_leaves_destination_untouched() {
    let server = MockServer::start();
    mock_discovery(&server);
    server.mock(|when, then| {
        when.method(GET).path(DOWNLOAD_PATH);
        then.status(204).header("X-Terraform-Get", "/archives/vpc.tgz");
    });
    server.mock(|when, then| {
        when.method(GET).path("/archives/vpc.tgz");
        then.status(200)
            .body(tar_gz(&[("main.tf", "module vpc"), ("modules/nat/main.tf", "nat")]));
    });

    let dst = TempDir::new().unwrap();
    let target = dst.path().join("vpc");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("keep.tf"), "keep").unwrap();

    let getter = default_getter(test_config());
    for suffix in ["//main.tf?version=3.3.0", "//mai*.tf?version=3.3.0"] {
        let err = getter
            .get(&target, &source_url(&server, suffix))
            .await
            .unwrap_err();
        assert!(
            matches!(err, GetterError::ModuleDownload { ref details, .. } if details.contains("is not a directory")),
            "{} gave {:?}",
            suffix,
            err
        );
        assert_eq!(std::fs::read_to_string(target.join("keep.tf")).unwrap(), "keep");
    }
}

#[tokio::test]
async fn test_cancelled_get_removes_staging_directory() {
    let server = MockServer::start();
    mock_discovery(&server);
    server.mock(|when, then| {
        when.method(GET).path(DOWNLOAD_PATH);
        then.status(204)
            .header("X-Terraform-Get", "https://example.com/repo.tar.gz//modules");
    });

    let config = test_config();
    let http = http_client(&config);
    let engine = Arc::new(StalledFetcher {
        destinations: Mutex::new(Vec::new()),
    });
    let getter = RegistryGetter::new(config, http, engine.clone());

    let dst = TempDir::new().unwrap();
    let target = dst.path().join("vpc");
    let outcome = tokio::time::timeout(
        Duration::from_millis(500),
        getter.get(&target, &source_url(&server, "?version=3.3.0")),
    )
    .await;
    assert!(outcome.is_err());

    let staged = engine.destinations.lock().unwrap().clone();
    assert_eq!(staged.len(), 1);
    assert!(!staged[0].parent().unwrap().exists());
    assert!(!target.exists());
}

#[tokio::test]
async fn test_unreachable_registry_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let http = http_client(&test_config());
    let err = tfr_getter::registry::get_module_registry_base_path(&http, "http", &address.to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, GetterError::Transport(_)), "{:?}", err);

    let dst = TempDir::new().unwrap();
    let src = Url::parse(&format!("tfr://{}/terraform-aws-modules/vpc/aws?version=3.3.0", address)).unwrap();
    let err = default_getter(test_config()).get(dst.path(), &src).await.unwrap_err();
    assert!(matches!(err, GetterError::Transport(_)), "{:?}", err);
}

#[tokio::test]
async fn test_get_module_rejects_incomplete_reference() {
    let server = MockServer::start();
    let discovery = mock_discovery(&server);
    let getter = default_getter(test_config());
    let dst = TempDir::new().unwrap();

    let mut reference = ModuleReference {
        registry_host: Some(server.address().to_string()),
        module_path: "terraform-aws-modules/vpc/aws".to_string(),
        version: String::new(),
        requested_subdir: String::new(),
    };
    let err = getter.get_module(dst.path(), &reference).await.unwrap_err();
    assert!(matches!(err, GetterError::MalformedRegistryUrl { .. }));

    reference.version = "3.3.0".to_string();
    reference.module_path = "/".to_string();
    let err = getter.get_module(dst.path(), &reference).await.unwrap_err();
    assert!(matches!(err, GetterError::MalformedRegistryUrl { .. }));

    discovery.assert_hits(0);
}
