//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable consulted when no GHSA token is configured
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_ACCESS_TOKEN";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub apis: ApiConfig,
    pub resolution: ResolutionConfig,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}

/// External API configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub ghsa: GhsaConfig,
    pub nvd: NvdConfig,
    pub registries: RegistryConfig,
}

/// GitHub Security Advisories configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GhsaConfig {
    pub graphql_url: String,
    pub token: Option<String>,
    pub timeout_seconds: u64,
    /// Advisories requested per page (the API allows at most 100)
    pub page_size: u32,
    /// Pages followed per package before the feed is considered broken
    pub max_pages: usize,
    /// Requests started per minute across all workers; 0 disables throttling
    pub rate_limit_per_minute: u32,
}

/// NVD API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NvdConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub rate_limit_per_30s: u32,
}

/// Public package index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub npm_url: String,
    pub maven_search_url: String,
    pub timeout_seconds: u64,
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    pub max_concurrent_queries: usize,
    /// Per-dependency deadline; unset means wait for every source
    pub query_timeout_seconds: Option<u64>,
    pub retry_attempts: u32,
}

/// Package manager invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub mvn_command: String,
    pub npm_command: String,
    pub maven_tree_goal: String,
    /// Run `npm install` before `npm list` so the tree is fully resolved
    pub npm_install_first: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for GhsaConfig {
    fn default() -> Self {
        Self {
            graphql_url: "https://api.github.com/graphql".to_string(),
            token: None,
            timeout_seconds: 30,
            page_size: 100,
            max_pages: 50,
            rate_limit_per_minute: 60,
        }
    }
}

impl Default for NvdConfig {
    fn default() -> Self {
        Self {
            base_url: "https://services.nvd.nist.gov/rest/json".to_string(),
            api_key: None,
            timeout_seconds: 30,
            rate_limit_per_30s: 5, // Without API key
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            npm_url: "https://registry.npmjs.org".to_string(),
            maven_search_url: "https://search.maven.org/solrsearch/select".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: 4,
            query_timeout_seconds: None,
            retry_attempts: 3,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mvn_command: "mvn".to_string(),
            npm_command: "npm".to_string(),
            maven_tree_goal: "org.apache.maven.plugins:maven-dependency-plugin:3.8.1:tree"
                .to_string(),
            npm_install_first: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `config/` files and environment variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut config = Self::load_from(Path::new("config"))?;

        if config.apis.ghsa.token.is_none() {
            config.apis.ghsa.token = std::env::var(GITHUB_TOKEN_ENV)
                .ok()
                .filter(|token| !token.trim().is_empty());
        }

        Ok(config)
    }

    /// Layer `default`, `local` and `$ENV` files from `dir`, then `VULTRA__*` variables
    pub fn load_from(dir: &Path) -> Result<Self, config::ConfigError> {
        let source = |name: &str| {
            config::File::from(dir.join(name)).required(false)
        };

        let mut builder = config::Config::builder()
            .add_source(source("default"))
            .add_source(source("local"));

        // Override with environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder.add_source(source(&env));
        }

        builder
            .add_source(config::Environment::with_prefix("VULTRA").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.resolution.max_concurrent_queries == 0 {
            return Err("resolution.max_concurrent_queries must be at least 1".to_string());
        }
        if self.apis.ghsa.max_pages == 0 {
            return Err("apis.ghsa.max_pages must be at least 1".to_string());
        }
        if !(1..=100).contains(&self.apis.ghsa.page_size) {
            return Err("apis.ghsa.page_size must be between 1 and 100".to_string());
        }
        Ok(())
    }
}
