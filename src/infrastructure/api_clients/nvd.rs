//! NVD CVE 2.0 REST client

use super::cwe;
use super::traits::AdvisorySource;
use crate::application::errors::{ApiError, VulnerabilityError};
use crate::config::NvdConfig;
use crate::domain::{
    Cwe, Ecosystem, RangeMatch, RangeMatcher, Severity, UpdateRecommendation, VersionBounds,
    VersionRange, VulnerabilityRecord, VulnerabilitySource, is_prerelease,
};
use crate::infrastructure::registries::PackageRegistryClient;
use crate::infrastructure::resilience::{RateLimiter, RetryConfig, retry_with_backoff};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// NVD rate limits are expressed per rolling 30 second window
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(30);
/// Requests per window allowed without an API key
pub const PUBLIC_RATE_LIMIT: u32 = 5;
/// Requests per window allowed with an API key
pub const KEYED_RATE_LIMIT: u32 = 50;
/// Result pages followed per keyword before the remainder is dropped
pub const MAX_RESULT_PAGES: usize = 5;

/// The vendor and product an application CPE must name to belong to a package.
///
/// Maven coordinates search for the artifact id. A scoped npm name searches for the
/// bare name and requires the CPE vendor to match the scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpeTarget<'a> {
    pub vendor: Option<&'a str>,
    pub product: &'a str,
}

impl<'a> CpeTarget<'a> {
    pub fn for_package(package_name: &'a str, ecosystem: Ecosystem) -> Self {
        match ecosystem {
            Ecosystem::Maven => Self {
                vendor: None,
                product: package_name
                    .rsplit_once(':')
                    .map(|(_, artifact)| artifact)
                    .unwrap_or(package_name),
            },
            Ecosystem::Npm => match package_name
                .strip_prefix('@')
                .and_then(|scoped| scoped.split_once('/'))
            {
                Some((scope, name)) => Self {
                    vendor: Some(scope),
                    product: name,
                },
                None => Self {
                    vendor: None,
                    product: package_name,
                },
            },
        }
    }

    /// Value sent as `keywordSearch`; NVD requires every word to appear
    pub fn keyword(&self) -> String {
        match self.vendor {
            Some(vendor) => format!("{} {}", vendor, self.product),
            None => self.product.to_string(),
        }
    }

    /// An application CPE whose product loosely names the target, and whose
    /// vendor matches the scope when there is one
    pub fn matches(&self, criteria: &str) -> bool {
        let parts: Vec<&str> = criteria.split(':').collect();
        if parts.len() < 5 || parts[2] != "a" {
            return false;
        }
        if !loosely_equal(parts[4], self.product) {
            return false;
        }
        self.vendor.is_none_or(|vendor| loosely_equal(parts[3], vendor))
    }
}

/// Case-insensitive containment in either direction
fn loosely_equal(cpe_field: &str, target: &str) -> bool {
    let cpe_field = cpe_field.to_lowercase();
    let target = target.to_lowercase();
    if cpe_field.is_empty() || target.is_empty() {
        return false;
    }
    cpe_field.contains(&target) || target.contains(&cpe_field)
}

#[derive(Debug, Deserialize)]
struct CveSearchResponse {
    #[serde(rename = "totalResults", default)]
    total_results: usize,
    #[serde(default)]
    vulnerabilities: Vec<CveItem>,
}

#[derive(Debug, Deserialize)]
struct CveItem {
    cve: Cve,
}

#[derive(Debug, Deserialize)]
struct Cve {
    id: String,
    published: Option<String>,
    #[serde(default)]
    configurations: Vec<Configuration>,
    #[serde(default)]
    weaknesses: Vec<Weakness>,
    #[serde(default)]
    metrics: Metrics,
}

#[derive(Debug, Deserialize)]
struct Configuration {
    #[serde(default)]
    nodes: Vec<ConfigurationNode>,
}

#[derive(Debug, Deserialize)]
struct ConfigurationNode {
    #[serde(rename = "cpeMatch", default)]
    cpe_match: Vec<CpeMatch>,
}

#[derive(Debug, Deserialize)]
struct CpeMatch {
    #[serde(default)]
    vulnerable: bool,
    criteria: String,
    #[serde(rename = "versionStartIncluding")]
    version_start_including: Option<String>,
    #[serde(rename = "versionStartExcluding")]
    version_start_excluding: Option<String>,
    #[serde(rename = "versionEndIncluding")]
    version_end_including: Option<String>,
    #[serde(rename = "versionEndExcluding")]
    version_end_excluding: Option<String>,
}

impl CpeMatch {
    fn bounds(&self) -> VersionBounds {
        VersionBounds {
            start: self
                .version_start_including
                .clone()
                .or_else(|| self.version_start_excluding.clone()),
            start_inclusive: self.version_start_including.is_some(),
            end: self
                .version_end_including
                .clone()
                .or_else(|| self.version_end_excluding.clone()),
            end_inclusive: self.version_end_including.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Weakness {
    #[serde(default)]
    description: Vec<LangString>,
}

#[derive(Debug, Deserialize)]
struct LangString {
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct Metrics {
    #[serde(rename = "cvssMetricV31", default)]
    cvss_v31: Vec<CvssMetric>,
    #[serde(rename = "cvssMetricV30", default)]
    cvss_v30: Vec<CvssMetric>,
    #[serde(rename = "cvssMetricV2", default)]
    cvss_v2: Vec<CvssMetric>,
}

#[derive(Debug, Deserialize)]
struct CvssMetric {
    #[serde(rename = "cvssData")]
    cvss_data: Option<CvssData>,
    /// CVSS v2 keeps the severity next to the data rather than inside it
    #[serde(rename = "baseSeverity")]
    base_severity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CvssData {
    #[serde(rename = "baseSeverity")]
    base_severity: Option<String>,
}

impl Metrics {
    /// CVSS v3.1, then v3.0, then v2
    fn severity(&self) -> Severity {
        [&self.cvss_v31, &self.cvss_v30, &self.cvss_v2]
            .into_iter()
            .filter_map(|metrics| metrics.first())
            .find_map(|metric| {
                metric
                    .cvss_data
                    .as_ref()
                    .and_then(|data| data.base_severity.as_deref())
                    .or(metric.base_severity.as_deref())
            })
            .map(Severity::from_feed)
            .unwrap_or(Severity::Unknown)
    }
}

/// Client for the NVD CVE API v2.0
pub struct NvdClient {
    client: Client,
    config: NvdConfig,
    retry: RetryConfig,
    limiter: Arc<RateLimiter>,
    registry: Arc<dyn PackageRegistryClient>,
    matcher: RangeMatcher,
}

impl NvdClient {
    /// Create a client. The registry is consulted for pre-release versions only.
    pub fn new(
        config: NvdConfig,
        retry: RetryConfig,
        registry: Arc<dyn PackageRegistryClient>,
    ) -> Result<Self, VulnerabilityError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("vultra/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let has_api_key = config.api_key.as_deref().is_some_and(|key| !key.is_empty());
        // the public default is raised when a key unlocks the higher tier
        let requests = if has_api_key && config.rate_limit_per_30s == PUBLIC_RATE_LIMIT {
            KEYED_RATE_LIMIT
        } else {
            config.rate_limit_per_30s
        };
        let limiter = Arc::new(RateLimiter::new(requests, RATE_LIMIT_WINDOW));

        info!(
            base_url = %config.base_url,
            has_api_key,
            min_interval_ms = limiter.interval().as_millis() as u64,
            "Initialized NvdClient"
        );

        Ok(Self {
            client,
            config,
            retry,
            limiter,
            registry,
            matcher: RangeMatcher::new(),
        })
    }

    /// Every CVE the keyword search returns, following `startIndex` pages
    async fn keyword_search(&self, keyword: &str) -> Result<Vec<CveItem>, VulnerabilityError> {
        let url = format!("{}/cves/2.0", self.config.base_url.trim_end_matches('/'));
        let mut items = Vec::new();
        let mut total = 0;

        for page in 1..=MAX_RESULT_PAGES {
            let start_index = items.len();
            let response =
                retry_with_backoff(&self.retry, || self.search_once(&url, keyword, start_index))
                    .await?;
            let returned = response.vulnerabilities.len();
            total = response.total_results;
            items.extend(response.vulnerabilities);

            if returned == 0 || items.len() >= total {
                return Ok(items);
            }
            debug!(page, fetched = items.len(), total, "Following NVD result page");
        }

        warn!(
            keyword,
            fetched = items.len(),
            total,
            pages = MAX_RESULT_PAGES,
            "NVD results truncated at the page ceiling"
        );
        Ok(items)
    }

    async fn search_once(
        &self,
        url: &str,
        keyword: &str,
        start_index: usize,
    ) -> Result<CveSearchResponse, VulnerabilityError> {
        self.limiter.acquire().await;

        let start_index = start_index.to_string();
        let mut request = self
            .client
            .get(url)
            .query(&[("keywordSearch", keyword), ("startIndex", start_index.as_str())]);
        if let Some(key) = self.config.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.header("apiKey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VulnerabilityError::request(e, self.config.timeout_seconds))?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(VulnerabilityError::RateLimit {
                api: VulnerabilitySource::NVD.to_string(),
            });
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            // NVD answers 403 when the rate limit or the key is rejected
            return Err(VulnerabilityError::Api(ApiError::Http {
                status: 403,
                message: "NVD rejected the request".to_string(),
            }));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VulnerabilityError::Api(ApiError::Http {
                status: status.as_u16(),
                message: format!("NVD API error: {}", error_text),
            }));
        }

        let body = response.text().await?;
        serde_json::from_str::<CveSearchResponse>(&body).map_err(|e| {
            VulnerabilityError::MalformedResponse {
                source_name: VulnerabilitySource::NVD.to_string(),
                message: e.to_string(),
            }
        })
    }

    /// First vulnerable CPE boundary of a CVE that applies to `version`
    fn match_cve(&self, cve: &Cve, target: &CpeTarget<'_>, version: &str) -> Option<RangeMatch> {
        cve.configurations
            .iter()
            .flat_map(|configuration| configuration.nodes.iter())
            .flat_map(|node| node.cpe_match.iter())
            .filter(|cpe| cpe.vulnerable && target.matches(&cpe.criteria))
            .find_map(|cpe| {
                let bounds = cpe.bounds();
                if bounds.is_unbounded() {
                    return None;
                }
                let outcome = self.matcher.evaluate(version, &VersionRange::from(bounds));
                if outcome.vulnerable {
                    debug!(cve = %cve.id, criteria = %cpe.criteria, "CPE boundary matched");
                    Some(outcome)
                } else {
                    None
                }
            })
    }

    fn weaknesses(cve: &Cve) -> Vec<Cwe> {
        let mut ids: Vec<&str> = cve
            .weaknesses
            .iter()
            .flat_map(|weakness| weakness.description.iter())
            .map(|description| description.value.as_str())
            .collect();
        ids.dedup();

        let mut cwes: Vec<Cwe> = Vec::with_capacity(ids.len());
        for id in ids {
            if !cwes.iter().any(|cwe| cwe.id == id) {
                cwes.push(cwe::lookup(id));
            }
        }
        if cwes.is_empty() {
            cwes.push(Cwe::unknown());
        }
        cwes
    }

    /// NVD timestamps come without an offset and are UTC
    fn parse_published(value: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }
}

#[async_trait]
impl AdvisorySource for NvdClient {
    fn source(&self) -> VulnerabilitySource {
        VulnerabilitySource::NVD
    }

    #[instrument(skip(self), fields(source = "NVD"))]
    async fn query(
        &self,
        package_name: &str,
        version: &str,
        ecosystem: Ecosystem,
    ) -> Result<Vec<VulnerabilityRecord>, VulnerabilityError> {
        if is_prerelease(version) {
            debug!("Pre-release version, skipping CVE matching");
            return Ok(Vec::new());
        }

        let target = CpeTarget::for_package(package_name, ecosystem);
        let items = self.keyword_search(&target.keyword()).await?;

        let records: Vec<VulnerabilityRecord> = items
            .into_iter()
            .filter_map(|item| {
                let outcome = self.match_cve(&item.cve, &target, version)?;
                Some(VulnerabilityRecord {
                    package_name: package_name.to_string(),
                    version: version.to_string(),
                    severity: item.cve.metrics.severity(),
                    cwes: Self::weaknesses(&item.cve),
                    first_patched_version: outcome.next_safe_version,
                    published_at: item
                        .cve
                        .published
                        .as_deref()
                        .and_then(Self::parse_published),
                    cve_id: item.cve.id,
                    source: VulnerabilitySource::NVD,
                })
            })
            .collect();

        if !records.is_empty() {
            info!(matches = records.len(), "NVD CVEs matched");
        }
        Ok(records)
    }

    async fn recommend_update(
        &self,
        package_name: &str,
        version: &str,
        ecosystem: Ecosystem,
    ) -> Result<Option<UpdateRecommendation>, VulnerabilityError> {
        if !is_prerelease(version) {
            return Ok(None);
        }

        let latest = self
            .registry
            .latest_stable_version(ecosystem, package_name)
            .await?;

        Ok(latest
            .filter(|latest| latest != version)
            .map(|recommended_version| UpdateRecommendation {
                package_name: package_name.to_string(),
                current_version: version.to_string(),
                recommended_version,
                source: VulnerabilitySource::NVD,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::registries::{RegistryError, VersionInfo};
    use mockito::{Matcher, Server};
    use serde_json::json;

    struct FixedRegistry(Vec<&'static str>);

    #[async_trait]
    impl PackageRegistryClient for FixedRegistry {
        async fn list_versions(
            &self,
            _ecosystem: Ecosystem,
            _name: &str,
        ) -> Result<Vec<VersionInfo>, RegistryError> {
            Ok(self.0.iter().map(|v| VersionInfo::new(*v)).collect())
        }
    }

    fn client_for(server: &Server, api_key: Option<&str>) -> NvdClient {
        let config = NvdConfig {
            base_url: server.url(),
            api_key: api_key.map(str::to_string),
            timeout_seconds: 5,
            rate_limit_per_30s: 0,
        };
        NvdClient::new(
            config,
            RetryConfig::with_attempts(1),
            Arc::new(FixedRegistry(vec!["4.17.20", "4.17.21", "5.0.0-rc.1"])),
        )
        .unwrap()
    }

    fn lodash_cve() -> serde_json::Value {
        json!({
            "cve": {
                "id": "CVE-2021-23337",
                "published": "2021-02-15T13:15:12.560",
                "weaknesses": [
                    { "source": "nvd@nist.gov", "type": "Primary",
                      "description": [{ "lang": "en", "value": "CWE-94" }] }
                ],
                "configurations": [{
                    "nodes": [{
                        "operator": "OR",
                        "negate": false,
                        "cpeMatch": [
                            { "vulnerable": true,
                              "criteria": "cpe:2.3:a:lodash:lodash:*:*:*:*:*:node.js:*:*",
                              "versionEndExcluding": "4.17.21" }
                        ]
                    }]
                }],
                "metrics": {
                    "cvssMetricV31": [{ "cvssData": { "baseScore": 7.2, "baseSeverity": "HIGH" } }]
                }
            }
        })
    }

    fn search_body(items: Vec<serde_json::Value>) -> String {
        json!({
            "resultsPerPage": items.len(),
            "startIndex": 0,
            "totalResults": items.len(),
            "vulnerabilities": items
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_keyword_search_matches_cpe_boundary() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::UrlEncoded("keywordSearch".into(), "lodash".into()))
            .with_status(200)
            .with_body(search_body(vec![lodash_cve()]))
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let records = client.query("lodash", "4.17.20", Ecosystem::Npm).await.unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.cve_id, "CVE-2021-23337");
        assert_eq!(record.severity, Severity::High);
        assert_eq!(record.first_patched_version.as_deref(), Some("4.17.21"));
        assert_eq!(record.cwes[0].name, "Code Injection");
        assert_eq!(record.source, VulnerabilitySource::NVD);
        assert!(record.published_at.is_some());
    }

    #[tokio::test]
    async fn test_patched_version_is_not_reported() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(search_body(vec![lodash_cve()]))
            .create_async()
            .await;

        let client = client_for(&server, None);
        let records = client.query("lodash", "4.17.21", Ecosystem::Npm).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_product_and_unbounded_cpes_are_ignored() {
        let mut server = Server::new_async().await;
        let cve = json!({
            "cve": {
                "id": "CVE-2020-0002",
                "configurations": [{
                    "nodes": [{
                        "cpeMatch": [
                            { "vulnerable": true,
                              "criteria": "cpe:2.3:a:acme:other-product:*:*:*:*:*:*:*:*",
                              "versionEndExcluding": "9.0.0" },
                            { "vulnerable": true,
                              "criteria": "cpe:2.3:a:lodash:lodash:4.17.20:*:*:*:*:*:*:*" },
                            { "vulnerable": false,
                              "criteria": "cpe:2.3:a:lodash:lodash:*:*:*:*:*:*:*:*",
                              "versionEndExcluding": "9.0.0" },
                            { "vulnerable": true,
                              "criteria": "cpe:2.3:o:lodash:lodash:*:*:*:*:*:*:*:*",
                              "versionEndExcluding": "9.0.0" }
                        ]
                    }]
                }]
            }
        });
        let _mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(search_body(vec![cve]))
            .create_async()
            .await;

        let client = client_for(&server, None);
        let records = client.query("lodash", "4.17.20", Ecosystem::Npm).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_maven_searches_by_artifact_with_api_key() {
        let mut server = Server::new_async().await;
        let cve = json!({
            "cve": {
                "id": "CVE-2022-22965",
                "published": "2022-04-01T23:15:13.870",
                "configurations": [{
                    "nodes": [{
                        "cpeMatch": [
                            { "vulnerable": true,
                              "criteria": "cpe:2.3:a:vmware:spring_framework:*:*:*:*:*:*:*:*",
                              "versionStartIncluding": "5.3.0",
                              "versionEndIncluding": "5.3.17" }
                        ]
                    }]
                }],
                "metrics": {
                    "cvssMetricV2": [{ "cvssData": { "baseScore": 7.5 }, "baseSeverity": "HIGH" }]
                }
            }
        });
        let mock = server
            .mock("GET", "/cves/2.0")
            .match_header("apiKey", "secret")
            .match_query(Matcher::UrlEncoded(
                "keywordSearch".into(),
                "spring_framework".into(),
            ))
            .with_status(200)
            .with_body(search_body(vec![cve]))
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, Some("secret"));
        let records = client
            .query("org.springframework:spring_framework", "5.3.10", Ecosystem::Maven)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::High);
        assert_eq!(records[0].cwes, vec![Cwe::unknown()]);
        // inclusive end bound: next patch release
        assert_eq!(records[0].first_patched_version.as_deref(), Some("5.3.18"));
    }

    #[tokio::test]
    async fn test_prerelease_skips_search_and_recommends_stable() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let records = client
            .query("lodash", "4.18.0-beta.1", Ecosystem::Npm)
            .await
            .unwrap();
        let recommendation = client
            .recommend_update("lodash", "4.18.0-beta.1", Ecosystem::Npm)
            .await
            .unwrap()
            .unwrap();

        mock.assert_async().await;
        assert!(records.is_empty());
        assert_eq!(recommendation.recommended_version, "4.17.21");
        assert_eq!(recommendation.current_version, "4.18.0-beta.1");

        let stable = client
            .recommend_update("lodash", "4.17.20", Ecosystem::Npm)
            .await
            .unwrap();
        assert!(stable.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = client_for(&server, None);
        let error = client.query("lodash", "4.17.20", Ecosystem::Npm).await.unwrap_err();
        assert!(matches!(
            error,
            VulnerabilityError::Api(ApiError::Http { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_unexpected_body_is_malformed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"vulnerabilities": "nope"}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let error = client.query("lodash", "4.17.20", Ecosystem::Npm).await.unwrap_err();
        assert!(matches!(error, VulnerabilityError::MalformedResponse { .. }));
    }

    #[test]
    fn test_api_key_raises_default_rate_limit() {
        let registry: Arc<dyn PackageRegistryClient> = Arc::new(FixedRegistry(vec![]));
        let mut config = NvdConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            timeout_seconds: 5,
            rate_limit_per_30s: PUBLIC_RATE_LIMIT,
        };
        let public =
            NvdClient::new(config.clone(), RetryConfig::default(), registry.clone()).unwrap();
        assert_eq!(public.limiter.interval(), Duration::from_secs(6));

        config.api_key = Some("secret".to_string());
        let keyed = NvdClient::new(config, RetryConfig::default(), registry).unwrap();
        assert_eq!(keyed.limiter.interval(), Duration::from_millis(600));
    }

    #[test]
    fn test_cpe_target_matches() {
        let lodash = CpeTarget::for_package("lodash", Ecosystem::Npm);
        assert!(lodash.matches("cpe:2.3:a:lodash:lodash:*:*:*:*:*:node.js:*:*"));
        assert!(!lodash.matches("cpe:2.3:a"));

        let commons = CpeTarget::for_package("org.apache.commons:Commons-Text", Ecosystem::Maven);
        assert!(commons.matches("cpe:2.3:a:apache:commons-text:*:*:*:*:*:*:*:*"));

        // containment works in both directions
        let jackson = CpeTarget::for_package("jackson-databind", Ecosystem::Npm);
        assert!(jackson.matches("cpe:2.3:a:x:jackson:*"));

        let kernel = CpeTarget::for_package("linux_kernel", Ecosystem::Npm);
        assert!(!kernel.matches("cpe:2.3:o:linux:linux_kernel:*"));
    }

    #[test]
    fn test_scoped_package_requires_scope_as_vendor() {
        let babel = CpeTarget::for_package("@babel/core", Ecosystem::Npm);
        assert!(babel.matches("cpe:2.3:a:babel:core:*:*:*:*:*:node.js:*:*"));
        assert!(!babel.matches("cpe:2.3:a:microsoft:asp.net_core:*:*:*:*:*:*:*:*"));
        assert!(!babel.matches("cpe:2.3:a:babel:traverse:*:*:*:*:*:*:*:*"));
    }

    #[test]
    fn test_cpe_target_for_package() {
        let maven =
            CpeTarget::for_package("com.fasterxml.jackson.core:jackson-databind", Ecosystem::Maven);
        assert_eq!(maven.vendor, None);
        assert_eq!(maven.product, "jackson-databind");
        assert_eq!(maven.keyword(), "jackson-databind");

        let scoped = CpeTarget::for_package("@babel/core", Ecosystem::Npm);
        assert_eq!(scoped.vendor, Some("babel"));
        assert_eq!(scoped.product, "core");
        assert_eq!(scoped.keyword(), "babel core");

        let plain = CpeTarget::for_package("express", Ecosystem::Npm);
        assert_eq!(plain.vendor, None);
        assert_eq!(plain.keyword(), "express");
    }

    #[tokio::test]
    async fn test_scoped_package_ignores_unrelated_core_product() {
        let mut server = Server::new_async().await;
        let cve = json!({
            "cve": {
                "id": "CVE-2099-0001",
                "configurations": [{
                    "nodes": [{
                        "cpeMatch": [
                            { "vulnerable": true,
                              "criteria": "cpe:2.3:a:microsoft:asp.net_core:*:*:*:*:*:*:*:*",
                              "versionEndExcluding": "8.0.0" }
                        ]
                    }]
                }]
            }
        });
        let mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::UrlEncoded("keywordSearch".into(), "babel core".into()))
            .with_status(200)
            .with_body(search_body(vec![cve]))
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let records = client.query("@babel/core", "7.20.0", Ecosystem::Npm).await.unwrap();

        mock.assert_async().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_follows_start_index_pages() {
        let mut server = Server::new_async().await;
        let mut second_cve = lodash_cve();
        second_cve["cve"]["id"] = json!("CVE-2020-8203");
        let page = |items: Vec<serde_json::Value>, start: usize| {
            json!({
                "resultsPerPage": items.len(),
                "startIndex": start,
                "totalResults": 2,
                "vulnerabilities": items
            })
            .to_string()
        };

        let first = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("keywordSearch".into(), "lodash".into()),
                Matcher::UrlEncoded("startIndex".into(), "0".into()),
            ]))
            .with_status(200)
            .with_body(page(vec![lodash_cve()], 0))
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("keywordSearch".into(), "lodash".into()),
                Matcher::UrlEncoded("startIndex".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(page(vec![second_cve], 1))
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let records = client.query("lodash", "4.17.20", Ecosystem::Npm).await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        let ids: Vec<&str> = records.iter().map(|record| record.cve_id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-2021-23337", "CVE-2020-8203"]);
    }

    #[tokio::test]
    async fn test_page_ceiling_keeps_partial_results() {
        let mut server = Server::new_async().await;
        // claims far more results than it ever returns
        let mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({ "totalResults": 100, "vulnerabilities": [lodash_cve()] }).to_string(),
            )
            .expect(MAX_RESULT_PAGES)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let records = client.query("lodash", "4.17.20", Ecosystem::Npm).await.unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), MAX_RESULT_PAGES);
    }

    #[tokio::test]
    async fn test_client_timeout_is_reported_as_timeout() {
        // accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = NvdConfig {
            base_url: format!("http://{}", address),
            api_key: None,
            timeout_seconds: 1,
            rate_limit_per_30s: 0,
        };
        let client = NvdClient::new(
            config,
            RetryConfig::with_attempts(1),
            Arc::new(FixedRegistry(vec![])),
        )
        .unwrap();
        let error = client.query("lodash", "4.17.20", Ecosystem::Npm).await.unwrap_err();

        assert!(matches!(error, VulnerabilityError::Timeout { seconds: 1 }));
    }

    #[test]
    fn test_parse_published() {
        assert!(NvdClient::parse_published("2021-02-15T13:15:12.560").is_some());
        assert!(NvdClient::parse_published("2021-02-15T13:15:12Z").is_some());
        assert!(NvdClient::parse_published("yesterday").is_none());
    }
}
