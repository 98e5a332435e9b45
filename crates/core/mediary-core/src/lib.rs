//! # Mediary Core
//!
//! Core error types, configuration loading, and shared traits for the
//! Mediary workspace. Every other Mediary crate builds on the pieces
//! defined here.
//!
//! ## Features
//!
//! - **Error Handling**: a standardized error enum and result alias
//! - **Configuration**: layered configuration loading (environment over files)
//! - **Observability**: an idempotent tracing bootstrap
//! - **Traits**: small cross-cutting traits (`Identifiable`, `Validatable`)
//!
//! ## Quick Start
//!
//! ```rust
//! use mediary_core::{MediaryResult, MediaryError};
//!
//! fn example_function() -> MediaryResult<String> {
//!     Ok("Hello Mediary!".to_string())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod observability;
pub mod traits;

// Re-export commonly used items
pub use error::{MediaryError, MediaryResult};
pub use traits::{Identifiable, Validatable};

/// Version information for the Mediary Core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of the Mediary Core library
pub const NAME: &str = env!("CARGO_PKG_NAME");
