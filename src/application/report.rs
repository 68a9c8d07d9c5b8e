//! Report documents produced from a finished resolution

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    ResolutionReport, SeverityBreakdown, SourceFailure, UpdateRecommendation, VulnerabilityRecord,
    VulnerableDependency,
};

/// Output document of a resolution run
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument<'a> {
    pub id: Uuid,
    pub root: &'a str,
    pub ecosystem: String,
    pub created_at: DateTime<Utc>,
    pub analysis_duration_ms: u64,
    pub direct_dependencies: usize,
    pub transitive_dependencies: usize,
    pub direct_vulnerabilities: usize,
    pub transitive_vulnerabilities: usize,
    pub unresolved_dependencies: usize,
    pub vuln_type_counts: &'a BTreeMap<String, usize>,
    pub severity_breakdown: SeverityBreakdown,
    pub sources_queried: &'a [String],
    pub vulnerable_dependencies: Vec<DependencyEntry<'a>>,
    pub update_recommendations: &'a [UpdateRecommendation],
    pub unresolved: Vec<String>,
    pub failures: &'a [SourceFailure],
}

/// One vulnerable dependency with its tree paths
#[derive(Debug, Clone, Serialize)]
pub struct DependencyEntry<'a> {
    pub package_name: &'a str,
    pub version: &'a str,
    pub is_direct: bool,
    pub highest_severity: String,
    pub paths: &'a [String],
    pub vulnerabilities: Vec<VulnerabilityEntry<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VulnerabilityEntry<'a> {
    pub cve: &'a str,
    pub severity: String,
    #[serde(rename = "firstPatchedVersion")]
    pub first_patched_version: Option<&'a str>,
    pub vuln_types: Vec<String>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a VulnerabilityRecord> for VulnerabilityEntry<'a> {
    fn from(record: &'a VulnerabilityRecord) -> Self {
        Self {
            cve: &record.cve_id,
            severity: record.severity.to_string(),
            first_patched_version: record.first_patched_version.as_deref(),
            vuln_types: record.vuln_types(),
            source: record.source.to_string(),
            published_at: record.published_at,
        }
    }
}

impl<'a> From<&'a VulnerableDependency> for DependencyEntry<'a> {
    fn from(dependency: &'a VulnerableDependency) -> Self {
        Self {
            package_name: &dependency.package_name,
            version: &dependency.version,
            is_direct: dependency.is_direct,
            highest_severity: dependency.highest_severity().to_string(),
            paths: &dependency.paths,
            vulnerabilities: dependency
                .vulnerabilities
                .iter()
                .map(VulnerabilityEntry::from)
                .collect(),
        }
    }
}

impl<'a> ReportDocument<'a> {
    pub fn new(report: &'a ResolutionReport) -> Self {
        let summary = &report.summary;
        Self {
            id: report.id,
            root: &report.root,
            ecosystem: report.ecosystem.canonical_name().to_string(),
            created_at: report.created_at,
            analysis_duration_ms: report.analysis_duration.as_millis() as u64,
            direct_dependencies: summary.direct_dependencies,
            transitive_dependencies: summary.transitive_dependencies,
            direct_vulnerabilities: summary.direct_vulnerabilities,
            transitive_vulnerabilities: summary.transitive_vulnerabilities,
            unresolved_dependencies: summary.unresolved_dependencies,
            vuln_type_counts: &summary.vuln_type_counts,
            severity_breakdown: report.severity_breakdown(),
            sources_queried: &report.sources_queried,
            vulnerable_dependencies: report
                .vulnerable_dependencies
                .iter()
                .map(DependencyEntry::from)
                .collect(),
            update_recommendations: &report.update_recommendations,
            unresolved: report.unresolved.iter().map(|dep| dep.coordinate()).collect(),
            failures: &report.failures,
        }
    }
}

/// Pretty JSON document of a finished report
pub fn render_json(report: &ResolutionReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ReportDocument::new(report))
}

/// Human-readable summary of a finished report
pub struct TextReport<'a>(pub &'a ResolutionReport);

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let breakdown = report.severity_breakdown();

        writeln!(f, "Vulnerability report for {} ({})", report.root, report.ecosystem)?;
        writeln!(f, "{}", report.summary_line())?;
        writeln!(
            f,
            "Records: {} (critical {}, high {}, medium {}, low {}, unknown {})",
            breakdown.total(),
            breakdown.critical,
            breakdown.high,
            breakdown.medium,
            breakdown.low,
            breakdown.unknown
        )?;

        for dependency in &report.vulnerable_dependencies {
            writeln!(
                f,
                "\n{}@{} [{}]",
                dependency.package_name,
                dependency.version,
                if dependency.is_direct { "direct" } else { "transitive" }
            )?;
            for path in &dependency.paths {
                writeln!(f, "  via {}", path)?;
            }
            for record in &dependency.vulnerabilities {
                writeln!(
                    f,
                    "  - {} {} fixed in {} ({})",
                    record.cve_id,
                    record.severity,
                    record.first_patched_version.as_deref().unwrap_or("n/a"),
                    record.vuln_types().join(", ")
                )?;
            }
        }

        if !report.update_recommendations.is_empty() {
            writeln!(f, "\nRecommended updates:")?;
            for rec in &report.update_recommendations {
                writeln!(
                    f,
                    "  {} {} -> {}",
                    rec.package_name, rec.current_version, rec.recommended_version
                )?;
            }
        }
        if !report.unresolved.is_empty() {
            writeln!(f, "\nUnresolved (no complete answer from the sources):")?;
            for dep in &report.unresolved {
                writeln!(f, "  {}", dep.coordinate())?;
            }
        }
        if !report.failures.is_empty() {
            writeln!(f, "\nSource failures: {}", report.failures.len())?;
        }
        Ok(())
    }
}

pub fn render_text(report: &ResolutionReport) -> String {
    TextReport(report).to_string()
}
