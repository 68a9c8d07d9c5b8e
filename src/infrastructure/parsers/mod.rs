//! Ecosystem adapters turning package-manager output into dependency trees

pub mod maven;
pub mod npm;
pub mod traits;

pub use maven::MavenAdapter;
pub use npm::NpmAdapter;
pub use traits::{
    AdapterFactory, CommandOutput, CommandRunner, EcosystemAdapter, SystemCommandRunner,
};
