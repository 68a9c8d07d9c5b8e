//! API clients for external vulnerability databases

pub mod cwe;
pub mod ghsa;
pub mod nvd;
pub mod traits;

pub use ghsa::GhsaClient;
pub use nvd::NvdClient;
pub use traits::AdvisorySource;
