// Authenticated HTTP access to registry endpoints. Every request gets either
// host-scoped credentials from the credential store or, failing that, the
// fallback bearer token from the environment.

use crate::config::GetterConfig;
use crate::error::{GetterError, Result};
use crate::logging::Logger;
use crate::registry::auth::{CredentialStore, NoCredentials};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Request};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub struct RegistryHttpClientBuilder {
    credentials: Arc<dyn CredentialStore>,
    fallback_token: Option<String>,
    timeout: Option<Duration>,
    client: Option<Client>,
    logger: Logger,
}

impl RegistryHttpClientBuilder {
    pub fn new() -> Self {
        Self {
            credentials: Arc::new(NoCredentials),
            fallback_token: None,
            timeout: None,
            client: None,
            logger: Logger::default(),
        }
    }

    pub fn with_config(self, config: &GetterConfig) -> Self {
        self.with_fallback_token(config.registry_token.clone())
            .with_timeout(config.timeout)
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_fallback_token(mut self, token: Option<String>) -> Self {
        self.fallback_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share an existing connection pool instead of building a new one
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<RegistryHttpClient> {
        let client = match self.client {
            Some(client) => client,
            None => {
                let mut builder = Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build().map_err(|e| {
                    GetterError::Transport(format!("Failed to create HTTP client: {}", e))
                })?
            }
        };

        Ok(RegistryHttpClient {
            client,
            credentials: self.credentials,
            fallback_token: self.fallback_token,
            logger: self.logger,
        })
    }
}

impl Default for RegistryHttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct RegistryHttpClient {
    client: Client,
    credentials: Arc<dyn CredentialStore>,
    fallback_token: Option<String>,
    logger: Logger,
}

impl RegistryHttpClient {
    pub fn builder() -> RegistryHttpClientBuilder {
        RegistryHttpClientBuilder::new()
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Authenticate an outgoing request. Host-scoped credentials take
    /// precedence; the fallback token is only used when there are none.
    pub fn authorize(&self, request: &mut Request) {
        let host = request.url().host_str().unwrap_or_default().to_string();

        match self.credentials.credentials_for_host(&host) {
            Some(creds) => {
                self.logger
                    .debug(&format!("Using host credentials for {}", host));
                creds.prepare_request(request);
            }
            None => {
                if let Some(token) = &self.fallback_token {
                    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                        request.headers_mut().insert(AUTHORIZATION, value);
                    }
                }
            }
        }
    }

    /// Issue one authenticated GET and buffer the whole response.
    ///
    /// Non-2xx responses become [`GetterError::RegistryApi`] carrying the
    /// requested URL and status code.
    pub async fn get(&self, url: &Url) -> Result<(Vec<u8>, HeaderMap)> {
        let mut request = Request::new(Method::GET, url.clone());
        self.authorize(&mut request);

        self.logger.debug(&format!("GET {}", url));
        let response = self.client.execute(request).await.map_err(|e| {
            GetterError::Transport(format!("GET {} failed: {}", url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GetterError::RegistryApi {
                url: url.to_string(),
                status_code: status.as_u16(),
            });
        }

        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            GetterError::Transport(format!("Failed to read response body from {}: {}", url, e))
        })?;

        self.logger.debug(&format!(
            "GET {} -> {} ({})",
            url,
            status,
            self.logger.format_size(body.len() as u64)
        ));

        Ok((body.to_vec(), headers))
    }
}
