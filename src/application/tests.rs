// Resolution pipeline tests
use super::{ApplicationError, ResolutionPipeline, VulnerabilityError};
use crate::application::errors::ApiError;
use crate::domain::{
    Cwe, DependencyNode, Ecosystem, Severity, UNKNOWN_VERSION, UpdateRecommendation,
    VulnerabilityRecord, VulnerabilitySource,
};
use crate::infrastructure::api_clients::AdvisorySource;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ErrorFactory = fn() -> VulnerabilityError;

struct MockSource {
    kind: VulnerabilitySource,
    findings: HashMap<String, Vec<(&'static str, &'static str)>>,
    errors: HashMap<String, ErrorFactory>,
    panics: HashSet<String>,
    recommendations: HashMap<String, &'static str>,
    delay: Option<Duration>,
    log: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockSource {
    fn new(kind: VulnerabilitySource, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            kind,
            findings: HashMap::new(),
            errors: HashMap::new(),
            panics: HashSet::new(),
            recommendations: HashMap::new(),
            delay: None,
            log,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `(cve, cwe name)` pairs reported for `name@version`
    fn finds(mut self, coordinate: &str, records: Vec<(&'static str, &'static str)>) -> Self {
        self.findings.insert(coordinate.to_string(), records);
        self
    }

    fn fails(mut self, coordinate: &str, error: ErrorFactory) -> Self {
        self.errors.insert(coordinate.to_string(), error);
        self
    }

    fn panics_on(mut self, coordinate: &str) -> Self {
        self.panics.insert(coordinate.to_string());
        self
    }

    fn recommends(mut self, coordinate: &str, version: &'static str) -> Self {
        self.recommendations.insert(coordinate.to_string(), version);
        self
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl AdvisorySource for MockSource {
    fn source(&self) -> VulnerabilitySource {
        self.kind
    }

    async fn query(
        &self,
        package_name: &str,
        version: &str,
        _ecosystem: Ecosystem,
    ) -> Result<Vec<VulnerabilityRecord>, VulnerabilityError> {
        let coordinate = format!("{}@{}", package_name, version);
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.kind, coordinate));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panics.contains(&coordinate) {
            panic!("advisory source crashed on {}", coordinate);
        }
        if let Some(error) = self.errors.get(&coordinate) {
            return Err(error());
        }
        Ok(self
            .findings
            .get(&coordinate)
            .map(|records| {
                records
                    .iter()
                    .map(|(cve, cwe)| VulnerabilityRecord {
                        package_name: package_name.to_string(),
                        version: version.to_string(),
                        cve_id: cve.to_string(),
                        severity: Severity::High,
                        cwes: vec![Cwe::new("CWE-0", *cwe, "")],
                        first_patched_version: None,
                        published_at: None,
                        source: self.kind,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn recommend_update(
        &self,
        package_name: &str,
        version: &str,
        _ecosystem: Ecosystem,
    ) -> Result<Option<UpdateRecommendation>, VulnerabilityError> {
        let coordinate = format!("{}@{}", package_name, version);
        Ok(self
            .recommendations
            .get(&coordinate)
            .map(|recommended| UpdateRecommendation {
                package_name: package_name.to_string(),
                current_version: version.to_string(),
                recommended_version: recommended.to_string(),
                source: self.kind,
            }))
    }
}

fn node(name: &str, version: &str, children: Vec<DependencyNode>) -> DependencyNode {
    DependencyNode::new(name, version).with_children(children)
}

fn log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn pipeline(sources: Vec<MockSource>) -> ResolutionPipeline {
    let sources: Vec<Arc<dyn AdvisorySource>> = sources
        .into_iter()
        .map(|source| Arc::new(source) as Arc<dyn AdvisorySource>)
        .collect();
    ResolutionPipeline::new(Ecosystem::Npm, sources)
}

#[tokio::test]
async fn test_direct_dependency_is_counted_as_direct() {
    let log = log();
    let ghsa = MockSource::new(VulnerabilitySource::GHSA, log.clone())
        .finds("left-pad@1.3.0", vec![("CVE-2020-0001", "Denial of Service")]);
    let root = node("app", "1.0.0", vec![node("left-pad", "1.3.0", vec![])]);

    let report = pipeline(vec![ghsa]).resolve(&root).await.unwrap();

    assert_eq!(report.summary.direct_dependencies, 1);
    assert_eq!(report.summary.transitive_dependencies, 0);
    assert_eq!(report.summary.direct_vulnerabilities, 1);
    assert_eq!(report.summary.transitive_vulnerabilities, 0);
    assert_eq!(report.total_records(), 1);
    assert!(report.vulnerable_dependencies[0].paths.is_empty());
    assert_eq!(report.sources_queried, vec!["GHSA".to_string()]);
}

#[tokio::test]
async fn test_transitive_dependency_reports_every_path() {
    let log = log();
    let ghsa = MockSource::new(VulnerabilitySource::GHSA, log.clone())
        .finds("c@3.0", vec![("CVE-2021-0002", "Prototype Pollution")]);
    let root = node(
        "app",
        "1.0.0",
        vec![
            node("a", "1.0", vec![node("c", "3.0", vec![])]),
            node("b", "2.0", vec![node("c", "3.0", vec![])]),
        ],
    );

    let report = pipeline(vec![ghsa]).resolve(&root).await.unwrap();

    assert_eq!(report.summary.direct_dependencies, 2);
    assert_eq!(report.summary.transitive_dependencies, 1);
    assert_eq!(report.summary.transitive_vulnerabilities, 1);
    assert_eq!(report.summary.vuln_type_counts.get("Prototype Pollution"), Some(&1));
    let vulnerable = &report.vulnerable_dependencies[0];
    assert_eq!(vulnerable.paths, vec!["app -> a -> c", "app -> b -> c"]);
    // each unique dependency is queried once
    assert_eq!(log.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_tree_without_dependencies_is_an_error() {
    let ghsa = MockSource::new(VulnerabilitySource::GHSA, log());
    let result = pipeline(vec![ghsa])
        .resolve(&node("empty", "0.1.0", vec![]))
        .await;
    assert!(matches!(
        result,
        Err(ApplicationError::NoDependencies { root }) if root == "empty"
    ));
}

#[tokio::test]
async fn test_unknown_versions_are_counted_but_not_queried() {
    let log = log();
    let ghsa = MockSource::new(VulnerabilitySource::GHSA, log.clone());
    let root = node(
        "app",
        "1.0.0",
        vec![
            node("ghost", UNKNOWN_VERSION, vec![]),
            node("lodash", "4.17.21", vec![]),
        ],
    );

    let report = pipeline(vec![ghsa]).resolve(&root).await.unwrap();

    assert_eq!(report.summary.direct_dependencies, 2);
    assert!(!report.has_vulnerabilities());
    assert_eq!(*log.lock().unwrap(), vec!["GHSA:lodash@4.17.21".to_string()]);
}

#[tokio::test]
async fn test_sources_are_queried_in_order_and_merged() {
    let log = log();
    let ghsa = MockSource::new(VulnerabilitySource::GHSA, log.clone()).finds(
        "minimist@1.2.0",
        vec![("CVE-2020-7598", "Prototype Pollution")],
    );
    let nvd = MockSource::new(VulnerabilitySource::NVD, log.clone()).finds(
        "minimist@1.2.0",
        vec![
            ("CVE-2020-7598", "Prototype Pollution"),
            ("CVE-2021-44906", "Improper Input Validation"),
        ],
    );
    let root = node(
        "app",
        "1.0.0",
        vec![node("minimist", "1.2.0", vec![]), node("ms", "2.1.3", vec![])],
    );

    let report = pipeline(vec![ghsa, nvd]).resolve(&root).await.unwrap();

    let records = &report.vulnerable_dependencies[0].vulnerabilities;
    let ids: Vec<&str> = records.iter().map(|r| r.cve_id.as_str()).collect();
    assert_eq!(ids, vec!["CVE-2020-7598", "CVE-2021-44906"]);
    assert_eq!(records[0].source, VulnerabilitySource::GHSA);
    assert_eq!(records[1].source, VulnerabilitySource::NVD);

    let calls = log.lock().unwrap().clone();
    for package in ["minimist@1.2.0", "ms@2.1.3"] {
        let ghsa_at = calls.iter().position(|c| *c == format!("GHSA:{}", package));
        let nvd_at = calls.iter().position(|c| *c == format!("NVD:{}", package));
        assert!(ghsa_at.unwrap() < nvd_at.unwrap());
    }
}

#[tokio::test]
async fn test_recoverable_source_failure_is_recorded() {
    let log = log();
    let ghsa = MockSource::new(VulnerabilitySource::GHSA, log.clone()).fails("qs@6.7.0", || {
        VulnerabilityError::MalformedResponse {
            source_name: "GHSA".to_string(),
            message: "missing data".to_string(),
        }
    });
    let nvd = MockSource::new(VulnerabilitySource::NVD, log.clone())
        .finds("qs@6.7.0", vec![("CVE-2022-24999", "Prototype Pollution")]);
    let root = node("app", "1.0.0", vec![node("qs", "6.7.0", vec![])]);

    let report = pipeline(vec![ghsa, nvd]).resolve(&root).await.unwrap();

    assert_eq!(report.summary.direct_vulnerabilities, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source, VulnerabilitySource::GHSA);
    assert_eq!(report.failures[0].package_name, "qs");
}

#[tokio::test]
async fn test_service_errors_do_not_abort_the_run() {
    let ghsa = MockSource::new(VulnerabilitySource::GHSA, log()).fails("a@1.0", || {
        VulnerabilityError::Api(ApiError::Http {
            status: 503,
            message: "Service Unavailable".to_string(),
        })
    });
    let root = node(
        "app",
        "1.0.0",
        vec![node("a", "1.0", vec![]), node("b", "1.0", vec![])],
    );

    let report = pipeline(vec![ghsa]).resolve(&root).await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(!report.has_vulnerabilities());
}

#[tokio::test]
async fn test_crashed_query_task_is_reported_unresolved() {
    let ghsa = MockSource::new(VulnerabilitySource::GHSA, log())
        .panics_on("boom@1.0")
        .finds("ok@1.0", vec![("CVE-2021-0001", "Code Injection")]);
    let nvd = MockSource::new(VulnerabilitySource::NVD, log());
    let root = node(
        "app",
        "1.0.0",
        vec![node("boom", "1.0", vec![]), node("ok", "1.0", vec![])],
    );

    let report = pipeline(vec![ghsa, nvd]).resolve(&root).await.unwrap();

    assert_eq!(report.summary.direct_vulnerabilities, 1);
    assert_eq!(report.summary.unresolved_dependencies, 1);
    assert_eq!(report.unresolved[0].name, "boom");
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|failure| failure.package_name == "boom"));
    assert!(
        report
            .failures
            .iter()
            .any(|failure| failure.source == VulnerabilitySource::NVD)
    );
}

#[tokio::test]
async fn test_pagination_overrun_aborts_resolution() {
    let ghsa = MockSource::new(VulnerabilitySource::GHSA, log()).fails("a@1.0", || {
        VulnerabilityError::PaginationOverrun {
            package: "a".to_string(),
            pages: 50,
        }
    });
    let root = node(
        "app",
        "1.0.0",
        vec![node("a", "1.0", vec![]), node("b", "1.0", vec![])],
    );

    let result = pipeline(vec![ghsa]).resolve(&root).await;
    assert!(matches!(
        result,
        Err(ApplicationError::Vulnerability(
            VulnerabilityError::PaginationOverrun { pages: 50, .. }
        ))
    ));
}

#[tokio::test]
async fn test_query_deadline_marks_dependency_unresolved() {
    let ghsa = MockSource::new(VulnerabilitySource::GHSA, log())
        .finds("slow@1.0.0", vec![("CVE-2020-0003", "Information Exposure")])
        .delayed(Duration::from_millis(500));
    let root = node("app", "1.0.0", vec![node("slow", "1.0.0", vec![])]);

    let report = pipeline(vec![ghsa])
        .with_query_timeout(Some(Duration::from_millis(20)))
        .resolve(&root)
        .await
        .unwrap();

    assert!(!report.has_vulnerabilities());
    assert_eq!(report.summary.unresolved_dependencies, 1);
    assert_eq!(report.unresolved[0].coordinate(), "slow@1.0.0");
}

#[tokio::test]
async fn test_worker_pool_bounds_concurrency() {
    let ghsa =
        MockSource::new(VulnerabilitySource::GHSA, log()).delayed(Duration::from_millis(20));
    let max_in_flight = ghsa.max_in_flight.clone();
    let children = (0..8)
        .map(|i| node(&format!("pkg-{}", i), "1.0.0", vec![]))
        .collect();
    let root = node("app", "1.0.0", children);

    let report = pipeline(vec![ghsa])
        .with_concurrency(2)
        .resolve(&root)
        .await
        .unwrap();

    assert_eq!(report.summary.direct_dependencies, 8);
    assert!(max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_update_recommendations_are_collected() {
    let nvd = MockSource::new(VulnerabilitySource::NVD, log())
        .recommends("react@19.0.0-rc.1", "18.3.1");
    let root = node("app", "1.0.0", vec![node("react", "19.0.0-rc.1", vec![])]);

    let report = pipeline(vec![nvd]).resolve(&root).await.unwrap();

    assert!(!report.has_vulnerabilities());
    assert_eq!(report.update_recommendations.len(), 1);
    assert_eq!(report.update_recommendations[0].recommended_version, "18.3.1");
}
