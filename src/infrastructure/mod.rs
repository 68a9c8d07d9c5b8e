//! Infrastructure Layer - External concerns and implementations
//!
//! Advisory feeds, package indexes and package-manager processes.

pub mod api_clients;
pub mod parsers;
pub mod registries;
pub mod resilience;

pub use api_clients::{AdvisorySource, GhsaClient, NvdClient};
pub use parsers::{AdapterFactory, EcosystemAdapter};
pub use registries::{MultiplexRegistryClient, PackageRegistryClient};
pub use resilience::{RateLimiter, RetryConfig};
