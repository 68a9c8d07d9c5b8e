//! GitHub Security Advisories API client implementation

use super::traits::AdvisorySource;
use crate::application::errors::{ApiError, VulnerabilityError};
use crate::config::GhsaConfig;
use crate::domain::{
    Cwe, Ecosystem, RangeMatcher, Severity, VersionRange, VulnerabilityRecord,
    VulnerabilitySource,
};
use crate::infrastructure::resilience::{RateLimiter, RetryConfig, retry_with_backoff};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Window the configured GHSA request rate applies to
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// GraphQL query request structure
#[derive(Debug, Serialize)]
struct GraphQLRequest {
    query: String,
    variables: serde_json::Value,
}

/// GraphQL response structure
#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl GraphQLError {
    fn is_rate_limit(&self) -> bool {
        self.kind.as_deref() == Some("RATE_LIMITED") || mentions_rate_limit(&self.message)
    }
}

fn mentions_rate_limit(text: &str) -> bool {
    text.to_lowercase().contains("rate limit")
}

#[derive(Debug, Deserialize)]
struct SecurityVulnerabilitiesResponse {
    #[serde(rename = "securityVulnerabilities")]
    security_vulnerabilities: SecurityVulnerabilityConnection,
}

/// One page of the `securityVulnerabilities` connection
#[derive(Debug, Deserialize)]
pub struct SecurityVulnerabilityConnection {
    #[serde(default)]
    edges: Vec<SecurityVulnerabilityEdge>,
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SecurityVulnerabilityEdge {
    node: SecurityVulnerability,
}

#[derive(Debug, Deserialize)]
struct SecurityVulnerability {
    advisory: Advisory,
    #[serde(rename = "vulnerableVersionRange")]
    vulnerable_version_range: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(rename = "firstPatchedVersion")]
    first_patched_version: Option<FirstPatchedVersion>,
}

#[derive(Debug, Deserialize)]
struct Advisory {
    #[serde(default)]
    identifiers: Vec<Identifier>,
    #[serde(default)]
    cwes: Option<CweConnection>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Identifier {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct CweConnection {
    #[serde(default)]
    edges: Vec<CweEdge>,
}

#[derive(Debug, Deserialize)]
struct CweEdge {
    node: CweNode,
}

#[derive(Debug, Deserialize)]
struct CweNode {
    #[serde(rename = "cweId")]
    cwe_id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct FirstPatchedVersion {
    identifier: String,
}

/// Client for GitHub Security Advisories GraphQL API
pub struct GhsaClient {
    client: Client,
    config: GhsaConfig,
    retry: RetryConfig,
    limiter: Arc<RateLimiter>,
    matcher: RangeMatcher,
}

impl GhsaClient {
    /// Create a new GHSA client. The token in `config` is fixed for the client's lifetime.
    pub fn new(config: GhsaConfig, retry: RetryConfig) -> Result<Self, VulnerabilityError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("vultra/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_per_minute,
            RATE_LIMIT_WINDOW,
        ));

        info!(
            graphql_url = %config.graphql_url,
            min_interval_ms = limiter.interval().as_millis() as u64,
            "Initialized GhsaClient"
        );

        Ok(Self {
            client,
            config,
            retry,
            limiter,
            matcher: RangeMatcher::new(),
        })
    }

    fn query_document(ecosystem: Ecosystem) -> String {
        format!(
            r#"query SecurityVulnerabilities($package: String!, $first: Int!, $after: String) {{
  securityVulnerabilities(ecosystem: {ecosystem}, package: $package, first: $first, after: $after) {{
    edges {{
      node {{
        advisory {{
          identifiers {{ type value }}
          cwes(first: 100) {{ edges {{ node {{ cweId name description }} }} }}
          publishedAt
        }}
        vulnerableVersionRange
        severity
        firstPatchedVersion {{ identifier }}
      }}
    }}
    pageInfo {{ hasNextPage endCursor }}
  }}
}}"#,
            ecosystem = ecosystem.ghsa_name()
        )
    }

    /// Execute a GraphQL query
    async fn execute_query<T>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, VulnerabilityError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let token = self
            .config
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(VulnerabilityError::Api(ApiError::Authentication))?;

        let request_body = GraphQLRequest {
            query: query.to_string(),
            variables,
        };

        self.limiter.acquire().await;
        let response = self
            .client
            .post(&self.config.graphql_url)
            .header("Authorization", format!("Bearer {}", token))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| VulnerabilityError::request(e, self.config.timeout_seconds))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(VulnerabilityError::Api(ApiError::Authentication));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::FORBIDDEN
        {
            // GitHub signals both primary and secondary limits with 403
            let headers = response.headers();
            let exhausted = headers
                .get("x-ratelimit-remaining")
                .and_then(|value| value.to_str().ok())
                == Some("0")
                || headers.contains_key(reqwest::header::RETRY_AFTER);
            let error_text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || exhausted
                || mentions_rate_limit(&error_text)
            {
                warn!(status = status.as_u16(), "GitHub rate limit reached");
                return Err(VulnerabilityError::RateLimit {
                    api: VulnerabilitySource::GHSA.to_string(),
                });
            }
            return Err(VulnerabilityError::Api(ApiError::Http {
                status: status.as_u16(),
                message: format!("GitHub GraphQL API error: {}", error_text),
            }));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VulnerabilityError::Api(ApiError::Http {
                status: status.as_u16(),
                message: format!("GitHub GraphQL API error: {}", error_text),
            }));
        }

        let graphql_response: GraphQLResponse<T> = response.json().await?;

        if let Some(errors) = graphql_response.errors.filter(|errors| !errors.is_empty()) {
            if errors.iter().any(GraphQLError::is_rate_limit) {
                return Err(VulnerabilityError::RateLimit {
                    api: VulnerabilitySource::GHSA.to_string(),
                });
            }
            let error_messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(VulnerabilityError::Api(ApiError::Http {
                status: 400,
                message: format!("GraphQL errors: {}", error_messages.join(", ")),
            }));
        }

        graphql_response
            .data
            .ok_or_else(|| VulnerabilityError::MalformedResponse {
                source_name: VulnerabilitySource::GHSA.to_string(),
                message: "No data in GraphQL response".to_string(),
            })
    }

    /// Fetch one page of vulnerabilities for a package
    pub async fn security_vulnerabilities(
        &self,
        package_name: &str,
        ecosystem: Ecosystem,
        after: Option<&str>,
    ) -> Result<SecurityVulnerabilityConnection, VulnerabilityError> {
        let query = Self::query_document(ecosystem);
        let variables = serde_json::json!({
            "package": package_name,
            "first": self.config.page_size,
            "after": after,
        });

        let response: SecurityVulnerabilitiesResponse = retry_with_backoff(&self.retry, || {
            self.execute_query(&query, variables.clone())
        })
        .await?;
        Ok(response.security_vulnerabilities)
    }

    /// Turn a matching edge into a record
    fn to_record(
        &self,
        package_name: &str,
        version: &str,
        node: SecurityVulnerability,
        next_safe_version: Option<String>,
    ) -> VulnerabilityRecord {
        let cve_id = node
            .advisory
            .identifiers
            .iter()
            .find(|identifier| identifier.kind.eq_ignore_ascii_case("CVE"))
            .or_else(|| node.advisory.identifiers.first())
            .map(|identifier| identifier.value.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let mut cwes: Vec<Cwe> = node
            .advisory
            .cwes
            .map(|connection| connection.edges)
            .unwrap_or_default()
            .into_iter()
            .map(|edge| Cwe::new(edge.node.cwe_id, edge.node.name, edge.node.description))
            .collect();
        if cwes.is_empty() {
            cwes.push(Cwe::unknown());
        }

        let published_at = node
            .advisory
            .published_at
            .as_deref()
            .and_then(|value| chrono::DateTime::parse_from_rfc3339(value).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));

        VulnerabilityRecord {
            package_name: package_name.to_string(),
            version: version.to_string(),
            cve_id,
            severity: node
                .severity
                .as_deref()
                .map(Severity::from_feed)
                .unwrap_or(Severity::Unknown),
            cwes,
            first_patched_version: node
                .first_patched_version
                .map(|patched| patched.identifier)
                .or(next_safe_version),
            published_at,
            source: VulnerabilitySource::GHSA,
        }
    }
}

#[async_trait]
impl AdvisorySource for GhsaClient {
    fn source(&self) -> VulnerabilitySource {
        VulnerabilitySource::GHSA
    }

    #[instrument(skip(self), fields(source = "GHSA"))]
    async fn query(
        &self,
        package_name: &str,
        version: &str,
        ecosystem: Ecosystem,
    ) -> Result<Vec<VulnerabilityRecord>, VulnerabilityError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0;

        loop {
            if pages >= self.config.max_pages {
                return Err(VulnerabilityError::PaginationOverrun {
                    package: package_name.to_string(),
                    pages,
                });
            }
            pages += 1;

            let connection = self
                .security_vulnerabilities(package_name, ecosystem, cursor.as_deref())
                .await?;
            debug!(page = pages, edges = connection.edges.len(), "Fetched advisory page");

            for edge in connection.edges {
                let range = VersionRange::expression(edge.node.vulnerable_version_range.clone());
                let outcome = self.matcher.evaluate(version, &range);
                if !outcome.vulnerable {
                    continue;
                }
                debug!(range = %range, "Version inside vulnerable range");
                records.push(self.to_record(
                    package_name,
                    version,
                    edge.node,
                    outcome.next_safe_version,
                ));
            }

            if !connection.page_info.has_next_page {
                break;
            }
            match connection.page_info.end_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    return Err(VulnerabilityError::MalformedResponse {
                        source_name: VulnerabilitySource::GHSA.to_string(),
                        message: "hasNextPage is set without an endCursor".to_string(),
                    });
                }
            }
        }

        if !records.is_empty() {
            info!(matches = records.len(), pages, "GHSA advisories matched");
        }
        Ok(records)
    }
}
