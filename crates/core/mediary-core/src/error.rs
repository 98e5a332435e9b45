//! Error handling types and utilities for the Mediary workspace.
//!
//! This module provides the standardized error type used throughout
//! all Mediary crates to keep error handling consistent.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for the Mediary workspace.
///
/// This enum covers the error scenarios shared by all Mediary components.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaryError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// An operation was attempted in a state that does not permit it
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Internal system errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic application errors with context
    #[error("Application error: {message} (context: {context})")]
    Application {
        /// Error message
        message: String,
        /// Error context
        context: String,
    },
}

impl MediaryError {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Self::Configuration(msg.to_string())
    }

    /// Create a new invalid input error
    pub fn invalid_input<T: fmt::Display>(msg: T) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    /// Create a new not found error
    pub fn not_found<T: fmt::Display>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Create a new illegal state error
    pub fn illegal_state<T: fmt::Display>(msg: T) -> Self {
        Self::IllegalState(msg.to_string())
    }

    /// Create a new internal error
    pub fn internal<T: fmt::Display>(msg: T) -> Self {
        Self::Internal(msg.to_string())
    }

    /// Create a new serialization error
    pub fn serialization<T: fmt::Display>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Create a new application error with context
    pub fn application<T: fmt::Display, U: fmt::Display>(message: T, context: U) -> Self {
        Self::Application {
            message: message.to_string(),
            context: context.to_string(),
        }
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Check if this error is a caller error (bad input or misuse)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::NotFound(_) | Self::IllegalState(_)
        )
    }

    /// Check if this error is an environment/system error
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Configuration(_))
    }
}

/// Result type alias for Mediary operations
pub type MediaryResult<T> = Result<T, MediaryError>;

// Standard error conversions
impl From<std::io::Error> for MediaryError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for MediaryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for MediaryError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<uuid::Error> for MediaryError {
    fn from(err: uuid::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
