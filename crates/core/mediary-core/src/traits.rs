//! Cross-cutting traits shared across Mediary crates.

use crate::error::MediaryResult;
use uuid::Uuid;

/// Trait for components that carry a stable identity.
pub trait Identifiable {
    /// Get the unique identifier for this component
    fn id(&self) -> Uuid;

    /// Get a human-readable name for this component
    fn name(&self) -> &str;
}

/// Trait for values that can check their own consistency.
///
/// Validation runs before a value is acted on, so errors surface at
/// configuration time rather than mid-operation.
pub trait Validatable {
    /// Validate this value, returning an error describing the first
    /// inconsistency found.
    fn validate(&self) -> MediaryResult<()>;
}
