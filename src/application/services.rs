//! Application services for orchestrating dependency resolution

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use super::errors::{ApplicationError, VulnerabilityError};
use crate::config::ResolutionConfig;
use crate::domain::{
    DependencyNode, Ecosystem, FlatDependency, ResolutionReport, SourceFailure, UNKNOWN_VERSION,
    UpdateRecommendation, VulnerabilityRecord,
};
use crate::infrastructure::api_clients::AdvisorySource;

/// Everything the advisory sources reported for one dependency
#[derive(Debug, Default)]
struct SourceFindings {
    records: Vec<VulnerabilityRecord>,
    failures: Vec<SourceFailure>,
    recommendations: Vec<UpdateRecommendation>,
}

impl SourceFindings {
    /// Keep records in source order, dropping a CVE a previous source already reported
    fn merge_records(&mut self, records: Vec<VulnerabilityRecord>) {
        let mut seen: HashSet<String> = self
            .records
            .iter()
            .map(|record| record.cve_id.clone())
            .collect();
        for record in records {
            if record.cve_id == "Unknown" || seen.insert(record.cve_id.clone()) {
                self.records.push(record);
            }
        }
    }
}

enum QueryOutcome {
    Resolved(SourceFindings),
    TimedOut,
    Fatal(VulnerabilityError),
}

/// Resolves every dependency of a tree against an ordered list of advisory sources.
///
/// Sources are queried in order for each dependency and their findings merged.
/// Dependencies are processed by a bounded pool of tasks; results flow back to the
/// calling task, which is the only writer of the report.
pub struct ResolutionPipeline {
    ecosystem: Ecosystem,
    sources: Arc<Vec<Arc<dyn AdvisorySource>>>,
    max_concurrent: usize,
    query_timeout: Option<Duration>,
}

impl ResolutionPipeline {
    pub fn new(ecosystem: Ecosystem, sources: Vec<Arc<dyn AdvisorySource>>) -> Self {
        Self {
            ecosystem,
            sources: Arc::new(sources),
            max_concurrent: ResolutionConfig::default().max_concurrent_queries,
            query_timeout: None,
        }
    }

    pub fn from_config(
        ecosystem: Ecosystem,
        sources: Vec<Arc<dyn AdvisorySource>>,
        config: &ResolutionConfig,
    ) -> Self {
        Self::new(ecosystem, sources)
            .with_concurrency(config.max_concurrent_queries)
            .with_query_timeout(config.query_timeout_seconds.map(Duration::from_secs))
    }

    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Deadline for all source queries of a single dependency
    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    pub fn sources_queried(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|source| source.source().to_string())
            .collect()
    }

    /// Flatten the tree, query every dependency and aggregate the findings.
    ///
    /// A tree without dependencies is an error, not an empty report.
    pub async fn resolve(&self, root: &DependencyNode) -> Result<ResolutionReport, ApplicationError> {
        let start_time = Instant::now();
        let dependencies = root.flatten();
        if dependencies.is_empty() {
            warn!(root = %root.name, "No dependencies found");
            return Err(ApplicationError::NoDependencies {
                root: root.name.clone(),
            });
        }

        let mut report = ResolutionReport::new(
            root.name.clone(),
            self.ecosystem,
            &dependencies,
            self.sources_queried(),
        );
        info!(
            root = %root.name,
            ecosystem = %self.ecosystem,
            direct = report.summary.direct_dependencies,
            transitive = report.summary.transitive_dependencies,
            "Starting dependency resolution"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut join_set: JoinSet<(FlatDependency, QueryOutcome)> = JoinSet::new();
        let mut pending: HashMap<task::Id, FlatDependency> = HashMap::new();

        for dependency in dependencies {
            if dependency.version == UNKNOWN_VERSION {
                debug!(package = %dependency.name, "Version unknown, not queried");
                continue;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ApplicationError::Configuration {
                    message: format!("worker pool closed: {}", e),
                })?;
            let sources = self.sources.clone();
            let ecosystem = self.ecosystem;
            let query_timeout = self.query_timeout;
            let tracked = dependency.clone();

            let handle = join_set.spawn(async move {
                let _permit = permit;
                let query = query_sources(&sources, &dependency, ecosystem);
                let outcome = match query_timeout {
                    Some(limit) => match tokio::time::timeout(limit, query).await {
                        Ok(result) => result,
                        Err(_) => return (dependency, QueryOutcome::TimedOut),
                    },
                    None => query.await,
                };
                let outcome = match outcome {
                    Ok(findings) => QueryOutcome::Resolved(findings),
                    Err(e) => QueryOutcome::Fatal(e),
                };
                (dependency, outcome)
            });
            pending.insert(handle.id(), tracked);
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            let (dependency, outcome) = match joined {
                Ok((id, result)) => {
                    pending.remove(&id);
                    result
                }
                Err(join_err) => {
                    let Some(dependency) = pending.remove(&join_err.id()) else {
                        error!(error = %join_err, "Untracked query task failed");
                        continue;
                    };
                    error!(
                        package = %dependency.name,
                        version = %dependency.version,
                        error = %join_err,
                        "Dependency query task failed"
                    );
                    // none of the chain's results survive the task
                    for source in self.sources.iter() {
                        report.record_failure(SourceFailure {
                            source: source.source(),
                            package_name: dependency.name.clone(),
                            version: dependency.version.clone(),
                            message: format!("query task failed: {}", join_err),
                        });
                    }
                    report.record_unresolved(dependency);
                    continue;
                }
            };

            match outcome {
                QueryOutcome::Resolved(findings) => {
                    for failure in findings.failures {
                        report.record_failure(failure);
                    }
                    for recommendation in findings.recommendations {
                        report.record_recommendation(recommendation);
                    }
                    if findings.records.is_empty() {
                        continue;
                    }

                    let paths = if dependency.is_direct {
                        Vec::new()
                    } else {
                        root.find_paths(&dependency.name, &dependency.version)
                    };
                    info!(
                        package = %dependency.name,
                        version = %dependency.version,
                        direct = dependency.is_direct,
                        records = findings.records.len(),
                        "Vulnerable dependency"
                    );
                    report.record_vulnerable(&dependency, findings.records, paths);
                }
                QueryOutcome::TimedOut => {
                    warn!(
                        package = %dependency.name,
                        version = %dependency.version,
                        "Advisory queries missed their deadline"
                    );
                    report.record_unresolved(dependency);
                }
                QueryOutcome::Fatal(e) => {
                    error!(
                        package = %dependency.name,
                        version = %dependency.version,
                        error = %e,
                        "Aborting resolution"
                    );
                    join_set.abort_all();
                    return Err(e.into());
                }
            }
        }

        report.finish(start_time.elapsed());
        info!(
            duration_ms = report.analysis_duration.as_millis() as u64,
            failures = report.failures.len(),
            "{}",
            report.summary_line()
        );
        Ok(report)
    }
}

/// Query every source in order. Only fatal errors are returned; the rest become failures.
async fn query_sources(
    sources: &[Arc<dyn AdvisorySource>],
    dependency: &FlatDependency,
    ecosystem: Ecosystem,
) -> Result<SourceFindings, VulnerabilityError> {
    let mut findings = SourceFindings::default();
    let name = dependency.name.as_str();
    let version = dependency.version.as_str();

    for source in sources {
        let source_kind = source.source();
        let failure = |e: &VulnerabilityError| {
            warn!(
                source = %source_kind,
                package = name,
                version,
                error = %e,
                "Advisory source failed, continuing"
            );
            SourceFailure {
                source: source_kind,
                package_name: name.to_string(),
                version: version.to_string(),
                message: e.to_string(),
            }
        };

        match source.query(name, version, ecosystem).await {
            Ok(records) => findings.merge_records(records),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => findings.failures.push(failure(&e)),
        }

        match source.recommend_update(name, version, ecosystem).await {
            Ok(Some(recommendation)) => findings.recommendations.push(recommendation),
            Ok(None) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => findings.failures.push(failure(&e)),
        }
    }

    Ok(findings)
}
