//! Domain services containing business logic

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::{Comparator, SuffixToken, VersionBounds, VersionRange};

static CONDITION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(<=|>=|==|<|>|=)\s*([0-9A-Za-z][0-9A-Za-z.\-_+]*)$")
        .expect("condition pattern is valid")
});

static PRERELEASE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(rc|beta|alpha|preview|snapshot|nightly|m\d+)")
        .expect("pre-release pattern is valid")
});

/// Whether a version string looks like a pre-release (`rc`, `beta`, `SNAPSHOT`, `M2`, ...)
pub fn is_prerelease(version: &str) -> bool {
    PRERELEASE_PATTERN.is_match(version)
}

/// Suffix-aware ordering of version strings.
///
/// Versions are split into digit and letter runs and compared pairwise.
/// Numbers compare as integers, words compare through the suffix table
/// (`ALPHA < BETA < RC < RELEASE < SR < SP < SEC`, unknown words below all of
/// them), and a number next to a word falls back to plain string comparison.
/// When the shared prefix ties, the version with more tokens is greater.
///
/// This is only a partial order in truth: `1.0.0-RC1` sorts *after* `1.0.0`
/// because it has more tokens, and mixed number/word positions compare as text.
pub struct VersionComparator;

impl VersionComparator {
    pub fn new() -> Self {
        Self
    }

    /// Compare two versions
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let left = SuffixToken::tokenize(a);
        let right = SuffixToken::tokenize(b);

        for (l, r) in left.iter().zip(right.iter()) {
            let ordering = Self::compare_tokens(l, r);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        left.len().cmp(&right.len())
    }

    /// Check if version1 is greater than version2
    pub fn is_greater(&self, version1: &str, version2: &str) -> bool {
        self.compare(version1, version2) == Ordering::Greater
    }

    /// Check if version1 is less than version2
    pub fn is_less(&self, version1: &str, version2: &str) -> bool {
        self.compare(version1, version2) == Ordering::Less
    }

    /// Find the latest version from a list
    pub fn find_latest<'a, I>(&self, versions: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        versions
            .into_iter()
            .max_by(|a, b| self.compare(a, b))
    }

    fn compare_tokens(left: &SuffixToken, right: &SuffixToken) -> Ordering {
        match (left, right) {
            (SuffixToken::Numeric(a), SuffixToken::Numeric(b)) => compare_numeric(a, b),
            (
                SuffixToken::Word {
                    text: a_text,
                    trailing: a_trailing,
                },
                SuffixToken::Word {
                    text: b_text,
                    trailing: b_trailing,
                },
            ) => {
                let by_rank = match (left.rank(), right.rank()) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (None, None) => a_text.to_lowercase().cmp(&b_text.to_lowercase()),
                };
                if by_rank != Ordering::Equal {
                    return by_rank;
                }

                match (a_trailing, b_trailing) {
                    (Some(a), Some(b)) => compare_numeric(a, b),
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            }
            _ => left.to_string().cmp(&right.to_string()),
        }
    }
}

impl Default for VersionComparator {
    fn default() -> Self {
        Self::new()
    }
}

/// Integer comparison of two digit runs without parsing them
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Outcome of matching one version against one range
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RangeMatch {
    pub vulnerable: bool,
    /// Best-effort suggestion for a version outside the range; it may not exist
    pub next_safe_version: Option<String>,
}

impl RangeMatch {
    fn safe() -> Self {
        Self::default()
    }
}

/// Service deciding whether a version falls inside a vulnerable range
pub struct RangeMatcher {
    comparator: VersionComparator,
}

impl RangeMatcher {
    pub fn new() -> Self {
        Self {
            comparator: VersionComparator::new(),
        }
    }

    /// Check if a version falls within a vulnerable range
    pub fn is_vulnerable(&self, version: &str, range: &VersionRange) -> bool {
        self.evaluate(version, range).vulnerable
    }

    /// Match a version against a range and compute the next-safe-version hint
    pub fn evaluate(&self, version: &str, range: &VersionRange) -> RangeMatch {
        match range {
            VersionRange::Expression(expr) => self.evaluate_expression(version, expr),
            VersionRange::Bounds(bounds) => self.evaluate_bounds(version, bounds),
        }
    }

    /// Parse one condition such as `>= 5.2.0`. Returns `None` when it does not fit the grammar.
    pub fn parse_condition(condition: &str) -> Option<(Comparator, String)> {
        let captures = CONDITION_PATTERN.captures(condition.trim())?;
        let comparator = captures.get(1)?.as_str().parse().ok()?;
        Some((comparator, captures.get(2)?.as_str().to_string()))
    }

    /// Synthesize `major.minor.(patch+1)` from the leading numeric components of a version
    pub fn next_patch_version(version: &str) -> Option<String> {
        let tokens = SuffixToken::tokenize(version);
        let mut numbers = Vec::with_capacity(3);
        for token in tokens.iter().take(3) {
            match token {
                SuffixToken::Numeric(digits) => numbers.push(digits.parse::<u64>().ok()?),
                SuffixToken::Word { .. } => break,
            }
        }
        if numbers.is_empty() {
            return None;
        }
        numbers.resize(3, 0);
        Some(format!(
            "{}.{}.{}",
            numbers[0],
            numbers[1],
            numbers[2].checked_add(1)?
        ))
    }

    fn evaluate_expression(&self, version: &str, expression: &str) -> RangeMatch {
        let mut conditions = Vec::new();
        for raw in expression.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            match Self::parse_condition(raw) {
                Some(condition) => conditions.push(condition),
                None => debug!(condition = raw, range = expression, "Skipping unparsable range condition"),
            }
        }

        // Nothing usable left: no constraint, nothing to assert
        if conditions.is_empty() {
            return RangeMatch::safe();
        }

        let vulnerable = conditions
            .iter()
            .all(|(comparator, bound)| self.holds(version, *comparator, bound));
        if !vulnerable {
            return RangeMatch::safe();
        }

        let next_safe_version = conditions.iter().find_map(|(comparator, bound)| match comparator {
            Comparator::Lt => Some(bound.clone()),
            Comparator::Le | Comparator::Eq => Self::next_patch_version(bound),
            Comparator::Gt | Comparator::Ge => None,
        });

        RangeMatch {
            vulnerable,
            next_safe_version,
        }
    }

    fn evaluate_bounds(&self, version: &str, bounds: &VersionBounds) -> RangeMatch {
        if bounds.is_unbounded() {
            return RangeMatch::safe();
        }

        let above_start = match &bounds.start {
            None => true,
            Some(start) if bounds.start_inclusive => self.holds(version, Comparator::Ge, start),
            Some(start) => self.holds(version, Comparator::Gt, start),
        };
        let below_end = match &bounds.end {
            None => true,
            Some(end) if bounds.end_inclusive => self.holds(version, Comparator::Le, end),
            Some(end) => self.holds(version, Comparator::Lt, end),
        };

        if !(above_start && below_end) {
            return RangeMatch::safe();
        }

        let next_safe_version = bounds.end.as_ref().and_then(|end| {
            if bounds.end_inclusive {
                Self::next_patch_version(end)
            } else {
                Some(end.clone())
            }
        });

        RangeMatch {
            vulnerable: true,
            next_safe_version,
        }
    }

    fn holds(&self, version: &str, comparator: Comparator, bound: &str) -> bool {
        let ordering = self.comparator.compare(version, bound);
        match comparator {
            Comparator::Lt => ordering == Ordering::Less,
            Comparator::Le => ordering != Ordering::Greater,
            Comparator::Gt => ordering == Ordering::Greater,
            Comparator::Ge => ordering != Ordering::Less,
            Comparator::Eq => ordering == Ordering::Equal,
        }
    }
}

impl Default for RangeMatcher {
    fn default() -> Self {
        Self::new()
    }
}
