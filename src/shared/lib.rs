// Declare modules at the root level
pub mod aggregate;
pub mod domain;
pub mod error;
pub mod generator;
pub mod id_generator;
pub mod producer;
pub mod record;
pub mod snapshot;
pub mod store;
pub mod time;

// Test utilities module (available in test and integration test builds)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export everything under a shared namespace for external access
pub mod shared {
    pub use super::aggregate;
    pub use super::domain;
    pub use super::error;
    pub use super::generator;
    pub use super::id_generator;
    pub use super::producer;
    pub use super::record;
    pub use super::snapshot;
    pub use super::store;
    pub use super::time;
}

// Also re-export at root for convenience
pub use aggregate::*;
pub use domain::*;
pub use error::*;
pub use generator::*;
pub use id_generator::*;
pub use producer::*;
pub use record::*;
pub use snapshot::*;
pub use store::*;
pub use time::*;
