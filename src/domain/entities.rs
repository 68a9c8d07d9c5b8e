//! Domain entities representing core business concepts

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dependency_tree::FlatDependency;
use super::value_objects::*;

/// A weakness classification attached to an advisory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cwe {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Cwe {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }

    /// Placeholder used when a feed publishes no weakness for an advisory
    pub fn unknown() -> Self {
        Self::new("Unknown", "Unknown", "Unknown")
    }
}

/// One advisory matched against one `(package, version)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub package_name: String,
    pub version: String,
    pub cve_id: String,
    pub severity: Severity,
    pub cwes: Vec<Cwe>,
    pub first_patched_version: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source: VulnerabilitySource,
}

impl VulnerabilityRecord {
    /// Weakness names used as vulnerability types in the report
    pub fn vuln_types(&self) -> Vec<String> {
        self.cwes.iter().map(|cwe| cwe.name.clone()).collect()
    }
}

/// A newer stable release suggested for a dependency pinned to a pre-release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecommendation {
    pub package_name: String,
    pub current_version: String,
    pub recommended_version: String,
    pub source: VulnerabilitySource,
}

/// A recoverable feed failure recorded for visibility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: VulnerabilitySource,
    pub package_name: String,
    pub version: String,
    pub message: String,
}

/// A dependency with at least one matched advisory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerableDependency {
    pub package_name: String,
    pub version: String,
    pub is_direct: bool,
    /// Tree paths to the dependency; empty for direct dependencies
    pub paths: Vec<String>,
    pub vulnerabilities: Vec<VulnerabilityRecord>,
}

impl VulnerableDependency {
    pub fn highest_severity(&self) -> Severity {
        self.vulnerabilities
            .iter()
            .map(|record| record.severity)
            .max()
            .unwrap_or(Severity::Unknown)
    }
}

/// Dependency and vulnerability counters of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub direct_dependencies: usize,
    pub transitive_dependencies: usize,
    pub direct_vulnerabilities: usize,
    pub transitive_vulnerabilities: usize,
    pub unresolved_dependencies: usize,
    pub vuln_type_counts: BTreeMap<String, usize>,
}

/// Result of resolving one manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub id: Uuid,
    pub root: String,
    pub ecosystem: Ecosystem,
    pub summary: ResolutionSummary,
    pub vulnerable_dependencies: Vec<VulnerableDependency>,
    pub update_recommendations: Vec<UpdateRecommendation>,
    /// Dependencies whose query missed its deadline; neither clean nor vulnerable
    pub unresolved: Vec<FlatDependency>,
    pub failures: Vec<SourceFailure>,
    pub sources_queried: Vec<String>,
    pub analysis_duration: std::time::Duration,
    pub created_at: DateTime<Utc>,
}

impl ResolutionReport {
    /// Create an empty report with dependency counts taken from the flattened tree
    pub fn new(
        root: impl Into<String>,
        ecosystem: Ecosystem,
        dependencies: &[FlatDependency],
        sources_queried: Vec<String>,
    ) -> Self {
        let direct = dependencies.iter().filter(|dep| dep.is_direct).count();

        Self {
            id: Uuid::new_v4(),
            root: root.into(),
            ecosystem,
            summary: ResolutionSummary {
                direct_dependencies: direct,
                transitive_dependencies: dependencies.len() - direct,
                ..ResolutionSummary::default()
            },
            vulnerable_dependencies: Vec::new(),
            update_recommendations: Vec::new(),
            unresolved: Vec::new(),
            failures: Vec::new(),
            sources_queried,
            analysis_duration: std::time::Duration::ZERO,
            created_at: Utc::now(),
        }
    }

    /// Append the records found for a dependency. Empty record lists are ignored.
    pub fn record_vulnerable(
        &mut self,
        dependency: &FlatDependency,
        records: Vec<VulnerabilityRecord>,
        paths: Vec<String>,
    ) {
        if records.is_empty() {
            return;
        }

        if dependency.is_direct {
            self.summary.direct_vulnerabilities += 1;
        } else {
            self.summary.transitive_vulnerabilities += 1;
        }

        for record in &records {
            for vuln_type in record.vuln_types() {
                *self.summary.vuln_type_counts.entry(vuln_type).or_insert(0) += 1;
            }
        }

        self.vulnerable_dependencies.push(VulnerableDependency {
            package_name: dependency.name.clone(),
            version: dependency.version.clone(),
            is_direct: dependency.is_direct,
            paths,
            vulnerabilities: records,
        });
    }

    pub fn record_unresolved(&mut self, dependency: FlatDependency) {
        self.summary.unresolved_dependencies += 1;
        self.unresolved.push(dependency);
    }

    pub fn record_failure(&mut self, failure: SourceFailure) {
        self.failures.push(failure);
    }

    pub fn record_recommendation(&mut self, recommendation: UpdateRecommendation) {
        self.update_recommendations.push(recommendation);
    }

    /// Stamp the duration and put every list in a stable order
    pub fn finish(&mut self, analysis_duration: std::time::Duration) {
        self.analysis_duration = analysis_duration;
        self.vulnerable_dependencies.sort_by(|a, b| {
            (&a.package_name, &a.version).cmp(&(&b.package_name, &b.version))
        });
        self.update_recommendations.sort_by(|a, b| {
            (&a.package_name, &a.current_version).cmp(&(&b.package_name, &b.current_version))
        });
        self.unresolved.sort();
        self.failures.sort_by(|a, b| {
            (&a.package_name, &a.version, a.source.to_string())
                .cmp(&(&b.package_name, &b.version, b.source.to_string()))
        });
    }

    pub fn has_vulnerabilities(&self) -> bool {
        !self.vulnerable_dependencies.is_empty()
    }

    pub fn total_records(&self) -> usize {
        self.vulnerable_dependencies
            .iter()
            .map(|dep| dep.vulnerabilities.len())
            .sum()
    }

    pub fn severity_breakdown(&self) -> SeverityBreakdown {
        SeverityBreakdown::from_records(
            self.vulnerable_dependencies
                .iter()
                .flat_map(|dep| dep.vulnerabilities.iter()),
        )
    }

    /// One-line summary of the run
    pub fn summary_line(&self) -> String {
        format!(
            "Resolved {} dependencies ({} direct, {} transitive): {} direct and {} transitive vulnerable, {} unresolved",
            self.summary.direct_dependencies + self.summary.transitive_dependencies,
            self.summary.direct_dependencies,
            self.summary.transitive_dependencies,
            self.summary.direct_vulnerabilities,
            self.summary.transitive_vulnerabilities,
            self.summary.unresolved_dependencies
        )
    }
}

/// Breakdown of matched records by severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unknown: usize,
}

impl SeverityBreakdown {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a VulnerabilityRecord>,
    {
        let mut breakdown = Self::default();
        for record in records {
            match record.severity {
                Severity::Critical => breakdown.critical += 1,
                Severity::High => breakdown.high += 1,
                Severity::Medium => breakdown.medium += 1,
                Severity::Low => breakdown.low += 1,
                Severity::Unknown => breakdown.unknown += 1,
            }
        }
        breakdown
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(package: &str, severity: Severity, cwes: Vec<Cwe>) -> VulnerabilityRecord {
        VulnerabilityRecord {
            package_name: package.to_string(),
            version: "1.0.0".to_string(),
            cve_id: "CVE-2020-0001".to_string(),
            severity,
            cwes,
            first_patched_version: Some("1.0.1".to_string()),
            published_at: None,
            source: VulnerabilitySource::GHSA,
        }
    }

    fn dependencies() -> Vec<FlatDependency> {
        vec![
            FlatDependency::new("a", "1.0.0", true),
            FlatDependency::new("b", "1.0.0", true),
            FlatDependency::new("c", "1.0.0", false),
        ]
    }

    #[test]
    fn test_new_report_counts_dependencies() {
        let report = ResolutionReport::new("app", Ecosystem::Npm, &dependencies(), vec![]);
        assert_eq!(report.summary.direct_dependencies, 2);
        assert_eq!(report.summary.transitive_dependencies, 1);
        assert!(!report.has_vulnerabilities());
    }

    #[test]
    fn test_record_vulnerable_updates_counters() {
        let deps = dependencies();
        let mut report = ResolutionReport::new("app", Ecosystem::Npm, &deps, vec![]);

        let xss = Cwe::new("CWE-79", "Cross-site Scripting", "XSS");
        report.record_vulnerable(
            &deps[0],
            vec![
                record("a", Severity::High, vec![xss.clone()]),
                record("a", Severity::Low, vec![Cwe::unknown()]),
            ],
            vec![],
        );
        report.record_vulnerable(
            &deps[2],
            vec![record("c", Severity::Critical, vec![xss])],
            vec!["app -> b -> c".to_string()],
        );
        // no records means clean
        report.record_vulnerable(&deps[1], vec![], vec![]);

        assert_eq!(report.summary.direct_vulnerabilities, 1);
        assert_eq!(report.summary.transitive_vulnerabilities, 1);
        assert_eq!(report.summary.vuln_type_counts.get("Cross-site Scripting"), Some(&2));
        assert_eq!(report.summary.vuln_type_counts.get("Unknown"), Some(&1));
        assert_eq!(report.total_records(), 3);
        assert_eq!(report.vulnerable_dependencies[0].highest_severity(), Severity::High);
    }

    #[test]
    fn test_finish_sorts_results() {
        let deps = dependencies();
        let mut report = ResolutionReport::new("app", Ecosystem::Maven, &deps, vec![]);
        report.record_vulnerable(&deps[2], vec![record("c", Severity::Low, vec![])], vec![]);
        report.record_vulnerable(&deps[0], vec![record("a", Severity::Low, vec![])], vec![]);
        report.record_unresolved(deps[1].clone());

        report.finish(std::time::Duration::from_millis(10));

        let names: Vec<_> = report
            .vulnerable_dependencies
            .iter()
            .map(|dep| dep.package_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(report.summary.unresolved_dependencies, 1);
        assert_eq!(report.analysis_duration, std::time::Duration::from_millis(10));
    }

    #[test]
    fn test_severity_breakdown() {
        let records = vec![
            record("a", Severity::High, vec![]),
            record("a", Severity::Critical, vec![]),
            record("b", Severity::Unknown, vec![]),
        ];
        let breakdown = SeverityBreakdown::from_records(&records);
        assert_eq!(breakdown.critical, 1);
        assert_eq!(breakdown.high, 1);
        assert_eq!(breakdown.unknown, 1);
        assert_eq!(breakdown.total(), 3);
    }

    #[test]
    fn test_summary_line() {
        let report = ResolutionReport::new("app", Ecosystem::Npm, &dependencies(), vec![]);
        assert!(report.summary_line().starts_with("Resolved 3 dependencies (2 direct, 1 transitive)"));
    }
}
