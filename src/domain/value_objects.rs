//! Domain value objects representing immutable concepts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::DomainError;

/// Version string used when the package manager output omits a version or group.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Represents vulnerability severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map a feed severity label (GHSA `MODERATE`, NVD `MEDIUM`, ...) to a severity level
    pub fn from_feed(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "LOW" => Severity::Low,
            "MODERATE" | "MEDIUM" => Severity::Medium,
            "HIGH" => Severity::High,
            "CRITICAL" => Severity::Critical,
            _ => Severity::Unknown,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Unknown => write!(f, "Unknown"),
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

/// Package ecosystems the resolver understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    Maven,
}

impl Ecosystem {
    /// Get all supported ecosystems
    pub fn all() -> Vec<Ecosystem> {
        vec![Ecosystem::Npm, Ecosystem::Maven]
    }

    /// Get the canonical name for this ecosystem
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Maven => "maven",
        }
    }

    /// Ecosystem enum value expected by the GitHub advisory GraphQL schema
    pub fn ghsa_name(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "NPM",
            Ecosystem::Maven => "MAVEN",
        }
    }

    /// Manifest file the ecosystem's package manager reads
    pub fn manifest_file(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "package.json",
            Ecosystem::Maven => "pom.xml",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ecosystem::Npm => write!(f, "npm"),
            Ecosystem::Maven => write!(f, "Maven"),
        }
    }
}

impl FromStr for Ecosystem {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "npm" | "node" => Ok(Ecosystem::Npm),
            "mvn" | "maven" | "java" => Ok(Ecosystem::Maven),
            _ => Err(DomainError::InvalidEcosystem {
                ecosystem: s.to_string(),
            }),
        }
    }
}

/// Represents vulnerability data sources
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VulnerabilitySource {
    GHSA,
    NVD,
}

impl fmt::Display for VulnerabilitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VulnerabilitySource::GHSA => write!(f, "GHSA"),
            VulnerabilitySource::NVD => write!(f, "NVD"),
        }
    }
}

/// Pre-release words with a fixed ordering. Anything else is unranked.
const SUFFIX_RANKS: [(&str, u8); 7] = [
    ("ALPHA", 0),
    ("BETA", 1),
    ("RC", 2),
    ("RELEASE", 3),
    ("SR", 4),
    ("SP", 5),
    ("SEC", 6),
];

/// One component of a tokenized version string.
///
/// `"2.5.7.SR0"` tokenizes to `[2, 5, 7, SR0]` where `SR0` is a word with the
/// trailing number `0` attached. Digit runs are kept as written so very long
/// build numbers never overflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuffixToken {
    Numeric(String),
    Word {
        text: String,
        trailing: Option<String>,
    },
}

impl SuffixToken {
    /// Split a version into alternating digit and letter runs.
    ///
    /// Never fails: anything that is neither a digit nor a letter acts as a
    /// separator, and a leading `v` before a digit is dropped.
    pub fn tokenize(version: &str) -> Vec<SuffixToken> {
        let trimmed = version.trim();
        let trimmed = match trimmed.strip_prefix(['v', 'V']) {
            Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
            _ => trimmed,
        };

        let chars: Vec<char> = trimmed.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c.is_ascii_digit() {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                tokens.push(SuffixToken::Numeric(chars[start..i].iter().collect()));
            } else if c.is_alphabetic() {
                let start = i;
                while i < chars.len() && chars[i].is_alphabetic() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();

                let trailing = if i < chars.len() && chars[i].is_ascii_digit() {
                    let digits_start = i;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    Some(chars[digits_start..i].iter().collect())
                } else {
                    None
                };
                tokens.push(SuffixToken::Word { text, trailing });
            } else {
                i += 1;
            }
        }

        tokens
    }

    /// Position of a word in the suffix table, `None` for numbers and unranked words
    pub fn rank(&self) -> Option<u8> {
        match self {
            SuffixToken::Numeric(_) => None,
            SuffixToken::Word { text, .. } => {
                let upper = text.to_uppercase();
                SUFFIX_RANKS
                    .iter()
                    .find(|(word, _)| *word == upper)
                    .map(|(_, rank)| *rank)
            }
        }
    }
}

impl fmt::Display for SuffixToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuffixToken::Numeric(digits) => write!(f, "{}", digits),
            SuffixToken::Word {
                text,
                trailing: Some(n),
            } => write!(f, "{}{}", text, n),
            SuffixToken::Word { text, trailing: None } => write!(f, "{}", text),
        }
    }
}

/// Comparison operator of a single free-text range condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Comparator::Lt),
            "<=" => Ok(Comparator::Le),
            ">" => Ok(Comparator::Gt),
            ">=" => Ok(Comparator::Ge),
            "=" | "==" => Ok(Comparator::Eq),
            other => Err(format!("Unknown comparator: {}", other)),
        }
    }
}

/// Structured CPE boundaries; either side may be open
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionBounds {
    pub start: Option<String>,
    pub start_inclusive: bool,
    pub end: Option<String>,
    pub end_inclusive: bool,
}

impl VersionBounds {
    /// Range with only an upper bound
    pub fn below(end: impl Into<String>, inclusive: bool) -> Self {
        Self {
            end: Some(end.into()),
            end_inclusive: inclusive,
            ..Self::default()
        }
    }

    /// Range with only a lower bound
    pub fn from_start(start: impl Into<String>, inclusive: bool) -> Self {
        Self {
            start: Some(start.into()),
            start_inclusive: inclusive,
            ..Self::default()
        }
    }

    /// Range bounded on both sides
    pub fn between(
        start: impl Into<String>,
        start_inclusive: bool,
        end: impl Into<String>,
        end_inclusive: bool,
    ) -> Self {
        Self {
            start: Some(start.into()),
            start_inclusive,
            end: Some(end.into()),
            end_inclusive,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

impl fmt::Display for VersionBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(start) = &self.start {
            let op = if self.start_inclusive { ">=" } else { ">" };
            parts.push(format!("{} {}", op, start));
        }
        if let Some(end) = &self.end {
            let op = if self.end_inclusive { "<=" } else { "<" };
            parts.push(format!("{} {}", op, end));
        }
        if parts.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Vulnerable version range as published by an advisory feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionRange {
    /// Comma-joined conjunction such as `>= 5.2.0, <= 5.2.17`
    Expression(String),
    /// CPE match boundaries
    Bounds(VersionBounds),
}

impl VersionRange {
    pub fn expression(expr: impl Into<String>) -> Self {
        VersionRange::Expression(expr.into())
    }
}

impl From<VersionBounds> for VersionRange {
    fn from(bounds: VersionBounds) -> Self {
        VersionRange::Bounds(bounds)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRange::Expression(expr) => write!(f, "{}", expr),
            VersionRange::Bounds(bounds) => write!(f, "{}", bounds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, trailing: Option<&str>) -> SuffixToken {
        SuffixToken::Word {
            text: text.to_string(),
            trailing: trailing.map(str::to_string),
        }
    }

    fn num(digits: &str) -> SuffixToken {
        SuffixToken::Numeric(digits.to_string())
    }

    #[test]
    fn test_tokenize_spring_style_version() {
        assert_eq!(
            SuffixToken::tokenize("2.5.7.SR0"),
            vec![num("2"), num("5"), num("7"), word("SR", Some("0"))]
        );
    }

    #[test]
    fn test_tokenize_separators_and_prefix() {
        assert_eq!(
            SuffixToken::tokenize("v1.0.0-RC1"),
            vec![num("1"), num("0"), num("0"), word("RC", Some("1"))]
        );
        assert_eq!(
            SuffixToken::tokenize("2.0.0Alpha"),
            vec![num("2"), num("0"), num("0"), word("Alpha", None)]
        );
        // a bare word starting with v is not a prefix
        assert_eq!(SuffixToken::tokenize("vendor"), vec![word("vendor", None)]);
    }

    #[test]
    fn test_tokenize_never_fails() {
        assert!(SuffixToken::tokenize("").is_empty());
        assert!(SuffixToken::tokenize("...").is_empty());
        assert_eq!(SuffixToken::tokenize("unknown"), vec![word("unknown", None)]);
    }

    #[test]
    fn test_suffix_ranks() {
        assert_eq!(word("alpha", None).rank(), Some(0));
        assert_eq!(word("Beta", Some("2")).rank(), Some(1));
        assert_eq!(word("RELEASE", None).rank(), Some(3));
        assert_eq!(word("SEC", Some("1")).rank(), Some(6));
        assert_eq!(word("Final", None).rank(), None);
        assert_eq!(num("3").rank(), None);
    }

    #[test]
    fn test_token_display() {
        assert_eq!(word("SR", Some("2")).to_string(), "SR2");
        assert_eq!(num("17").to_string(), "17");
    }

    #[test]
    fn test_severity_from_feed() {
        assert_eq!(Severity::from_feed("MODERATE"), Severity::Medium);
        assert_eq!(Severity::from_feed("medium"), Severity::Medium);
        assert_eq!(Severity::from_feed("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::from_feed(""), Severity::Unknown);
        assert!(Severity::Unknown < Severity::Low);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_ecosystem_parsing() {
        assert_eq!(Ecosystem::from_str("npm").unwrap(), Ecosystem::Npm);
        assert_eq!(Ecosystem::from_str("mvn").unwrap(), Ecosystem::Maven);
        assert_eq!(Ecosystem::from_str("MAVEN").unwrap(), Ecosystem::Maven);
        assert!(Ecosystem::from_str("pip").is_err());

        assert_eq!(Ecosystem::Maven.ghsa_name(), "MAVEN");
        assert_eq!(Ecosystem::Npm.manifest_file(), "package.json");
    }

    #[test]
    fn test_comparator_parsing() {
        assert_eq!(Comparator::from_str("<=").unwrap(), Comparator::Le);
        assert_eq!(Comparator::from_str("=").unwrap(), Comparator::Eq);
        assert!(Comparator::from_str("~>").is_err());
    }

    #[test]
    fn test_bounds_display() {
        let bounds = VersionBounds::between("1.0", true, "2.0", false);
        assert_eq!(bounds.to_string(), ">= 1.0, < 2.0");
        assert_eq!(VersionBounds::default().to_string(), "*");
        assert!(VersionBounds::default().is_unbounded());
    }
}
