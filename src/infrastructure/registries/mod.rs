/*
 Infrastructure: Package Registry Clients

 Public package indexes (npm registry, Maven Central search) queried for the
 published versions of a package. Only used to recommend a stable release for
 dependencies pinned to a pre-release.
*/

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::application::errors::{ApiError, VulnerabilityError};
use crate::config::RegistryConfig;
use crate::domain::{Ecosystem, VersionComparator, is_prerelease};

/// Information about a single published version in a package registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    /// Whether this is a pre-release (alpha/beta/rc/snapshot/milestone).
    pub is_prerelease: bool,
}

impl VersionInfo {
    pub fn new(version: impl Into<String>) -> Self {
        let version = version.into();
        let is_prerelease = is_prerelease(&version);
        Self {
            version,
            is_prerelease,
        }
    }
}

/// Error type for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// HTTP/network-level error (optional status code).
    #[error("registry HTTP error: {message}, status={status:?}")]
    Http {
        message: String,
        status: Option<u16>,
    },

    /// Package not found (or deleted).
    #[error("package not found")]
    NotFound,

    /// Unexpected response body.
    #[error("registry parse error: {0}")]
    Parse(String),

    /// This registry does not support the requested ecosystem.
    #[error("unsupported ecosystem: {0}")]
    UnsupportedEcosystem(Ecosystem),
}

impl From<RegistryError> for VulnerabilityError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::Http {
                message,
                status: Some(status),
            } => VulnerabilityError::Api(ApiError::Http { status, message }),
            other => VulnerabilityError::MalformedResponse {
                source_name: "package registry".to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Trait for querying package registries for available versions.
#[async_trait]
pub trait PackageRegistryClient: Send + Sync {
    /// List published versions of a package.
    async fn list_versions(
        &self,
        ecosystem: Ecosystem,
        name: &str,
    ) -> Result<Vec<VersionInfo>, RegistryError>;

    /// Highest published version that is not a pre-release. `None` when a
    /// package has never had a stable release.
    async fn latest_stable_version(
        &self,
        ecosystem: Ecosystem,
        name: &str,
    ) -> Result<Option<String>, RegistryError> {
        let versions = self.list_versions(ecosystem, name).await?;
        let comparator = VersionComparator::new();
        Ok(comparator
            .find_latest(
                versions
                    .iter()
                    .filter(|info| !info.is_prerelease)
                    .map(|info| info.version.as_str()),
            )
            .map(str::to_string))
    }
}

fn build_client(timeout_seconds: u64) -> Result<Client, RegistryError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(concat!("vultra/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RegistryError::Http {
            message: e.to_string(),
            status: None,
        })
}

async fn fetch_json(request: reqwest::RequestBuilder) -> Result<Value, RegistryError> {
    let resp = request.send().await.map_err(|e| RegistryError::Http {
        message: e.to_string(),
        status: None,
    })?;

    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(RegistryError::NotFound);
    }
    if !resp.status().is_success() {
        return Err(RegistryError::Http {
            message: format!("status {}", resp.status()),
            status: Some(resp.status().as_u16()),
        });
    }

    resp.json()
        .await
        .map_err(|e| RegistryError::Parse(e.to_string()))
}

/// NPM Registry client (`{npm_url}/{name}`)
pub struct NpmRegistryClient {
    client: Client,
    base_url: String,
}

impl NpmRegistryClient {
    pub fn new(base_url: impl Into<String>, timeout_seconds: u64) -> Result<Self, RegistryError> {
        Ok(Self {
            client: build_client(timeout_seconds)?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl PackageRegistryClient for NpmRegistryClient {
    async fn list_versions(
        &self,
        ecosystem: Ecosystem,
        name: &str,
    ) -> Result<Vec<VersionInfo>, RegistryError> {
        if ecosystem != Ecosystem::Npm {
            return Err(RegistryError::UnsupportedEcosystem(ecosystem));
        }
        // scoped packages keep the @ but escape the slash
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            name.replace('/', "%2F")
        );
        debug!(url = %url, "Listing npm versions");

        let json = fetch_json(self.client.get(&url)).await?;
        let versions_obj = json
            .get("versions")
            .and_then(|v| v.as_object())
            .ok_or_else(|| RegistryError::Parse("missing versions object".to_string()))?;

        Ok(versions_obj.keys().map(VersionInfo::new).collect())
    }
}

/// Maven Central search client (`{maven_search_url}?q=g:..+AND+a:..`)
pub struct MavenCentralRegistryClient {
    client: Client,
    search_url: String,
}

impl MavenCentralRegistryClient {
    pub fn new(search_url: impl Into<String>, timeout_seconds: u64) -> Result<Self, RegistryError> {
        Ok(Self {
            client: build_client(timeout_seconds)?,
            search_url: search_url.into(),
        })
    }
}

#[async_trait]
impl PackageRegistryClient for MavenCentralRegistryClient {
    async fn list_versions(
        &self,
        ecosystem: Ecosystem,
        name: &str,
    ) -> Result<Vec<VersionInfo>, RegistryError> {
        if ecosystem != Ecosystem::Maven {
            return Err(RegistryError::UnsupportedEcosystem(ecosystem));
        }
        let (group, artifact) = name.split_once(':').ok_or_else(|| {
            RegistryError::Parse("maven package name must be 'group:artifact'".to_string())
        })?;

        let query = format!("g:\"{}\" AND a:\"{}\"", group, artifact);
        let request = self.client.get(&self.search_url).query(&[
            ("q", query.as_str()),
            ("core", "gav"),
            ("rows", "200"),
            ("wt", "json"),
        ]);
        let json = fetch_json(request).await?;

        let docs = json
            .get("response")
            .and_then(|r| r.get("docs"))
            .and_then(|d| d.as_array())
            .ok_or_else(|| RegistryError::Parse("missing response.docs".to_string()))?;
        if docs.is_empty() {
            return Err(RegistryError::NotFound);
        }

        // gav documents carry "v"; artifact documents only "latestVersion"
        Ok(docs
            .iter()
            .filter_map(|doc| {
                doc.get("v")
                    .or_else(|| doc.get("latestVersion"))
                    .and_then(|v| v.as_str())
            })
            .map(VersionInfo::new)
            .collect())
    }
}

/// Delegates to the registry of each ecosystem.
pub struct MultiplexRegistryClient {
    npm: NpmRegistryClient,
    maven_central: MavenCentralRegistryClient,
}

impl MultiplexRegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        Ok(Self {
            npm: NpmRegistryClient::new(&config.npm_url, config.timeout_seconds)?,
            maven_central: MavenCentralRegistryClient::new(
                &config.maven_search_url,
                config.timeout_seconds,
            )?,
        })
    }
}

#[async_trait]
impl PackageRegistryClient for MultiplexRegistryClient {
    async fn list_versions(
        &self,
        ecosystem: Ecosystem,
        name: &str,
    ) -> Result<Vec<VersionInfo>, RegistryError> {
        match ecosystem {
            Ecosystem::Npm => self.npm.list_versions(ecosystem, name).await,
            Ecosystem::Maven => self.maven_central.list_versions(ecosystem, name).await,
        }
    }
}
