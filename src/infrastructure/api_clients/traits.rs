//! Traits for advisory feed clients

use crate::application::errors::VulnerabilityError;
use crate::domain::{Ecosystem, UpdateRecommendation, VulnerabilitySource, VulnerabilityRecord};
use async_trait::async_trait;

/// One external advisory feed queried per `(package, version)` pair.
///
/// Sources are held as an ordered list and every source is asked for every
/// dependency; results from all of them are merged.
#[async_trait]
pub trait AdvisorySource: Send + Sync {
    fn source(&self) -> VulnerabilitySource;

    /// Advisories that match `version` of `package_name`
    async fn query(
        &self,
        package_name: &str,
        version: &str,
        ecosystem: Ecosystem,
    ) -> Result<Vec<VulnerabilityRecord>, VulnerabilityError>;

    /// Suggested stable release for a version the source chose not to match
    async fn recommend_update(
        &self,
        _package_name: &str,
        _version: &str,
        _ecosystem: Ecosystem,
    ) -> Result<Option<UpdateRecommendation>, VulnerabilityError> {
        Ok(None)
    }
}
