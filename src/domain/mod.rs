//! Domain Layer - Core business logic and entities
//!
//! Version ordering, range matching, the dependency tree model and the
//! report entities. Nothing here performs I/O.

pub mod dependency_tree;
pub mod entities;
pub mod errors;
pub mod services;
pub mod value_objects;

pub use dependency_tree::*;
pub use entities::*;
pub use errors::*;
pub use services::*;
pub use value_objects::*;
