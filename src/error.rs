//! Error types for nagstack.
//!
//! This module defines the error types used while declaring, checking and
//! synthesizing stacks, providing rich error information for debugging and
//! user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nagstack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for nagstack.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Declaration Errors
    // ========================================================================
    /// No SSH public key was supplied for the instance boot script.
    #[error("An SSH public key is required (set SSH_PUB_KEY)")]
    MissingPublicKey,

    /// The SSH public key cannot be placed inside a double-quoted shell string.
    #[error("SSH public key contains forbidden character {found:?}")]
    UnsafePublicKey {
        /// Offending character
        found: char,
    },

    /// A construct id is empty or contains a path separator.
    #[error("Invalid construct id '{0}'")]
    InvalidConstructId(String),

    /// Two constructs share an id within the same scope.
    #[error("There is already a construct with id '{id}' in '{scope}'")]
    DuplicateConstruct {
        /// Path of the enclosing scope
        scope: String,
        /// Conflicting id
        id: String,
    },

    /// Two resources were allocated the same logical id.
    #[error("Duplicate logical id '{logical_id}' at '{path}'")]
    DuplicateLogicalId {
        /// Logical id
        logical_id: String,
        /// Construct path of the second resource
        path: String,
    },

    /// A construct, stack or handle could not be located.
    #[error("Construct '{0}' not found")]
    ConstructNotFound(String),

    /// A resource property refers to something that was never declared.
    #[error("'{from}' references '{to}' which is not declared in the stack")]
    UnresolvedReference {
        /// Path of the referencing construct
        from: String,
        /// Referenced logical id
        to: String,
    },

    /// Resources reference each other in a loop.
    #[error("Dependency cycle between resources: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// The machine image cannot be resolved for the stack's region.
    #[error("Unable to resolve machine image: {0}")]
    MachineImage(String),

    /// A construct was given a combination of properties that is not modelled.
    #[error("Unsupported configuration for '{construct}': {message}")]
    Unsupported {
        /// Construct path
        construct: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Suppression Errors
    // ========================================================================
    /// A suppression record failed validation.
    #[error("Invalid suppression on '{path}': {message}")]
    InvalidSuppression {
        /// Target construct path
        path: String,
        /// Error message
        message: String,
    },

    /// A suppression points at a construct that does not exist.
    #[error("Suppression path \"{0}\" did not match any resource")]
    DanglingSuppression(String),

    // ========================================================================
    // Synthesis Errors
    // ========================================================================
    /// Error annotations were recorded and synthesis refused to complete.
    #[error("Found {} error(s) during synthesis:\n{}", .0.len(), .0.join("\n"))]
    SynthesisBlocked(Vec<String>),

    /// Stack not found in the app.
    #[error("Stack '{0}' not found")]
    StackNotFound(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // IO and Serialization Errors
    // ========================================================================
    /// Failed to write an assembly file.
    #[error("Failed to write '{path}': {source}")]
    AssemblyWrite {
        /// File path
        path: PathBuf,
        /// Source error
        #[source]
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid regular expression in a suppression.
    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Creates a new unresolved reference error.
    pub fn unresolved(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Creates a new invalid suppression error.
    pub fn invalid_suppression(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSuppression {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new unsupported configuration error.
    pub fn unsupported(construct: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unsupported {
            construct: construct.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::SynthesisBlocked(_) => 2,
            Error::MissingPublicKey | Error::UnsafePublicKey { .. } => 3,
            Error::Config(_) | Error::InvalidConfig { .. } => 4,
            Error::InvalidSuppression { .. } | Error::DanglingSuppression(_) => 5,
            _ => 1,
        }
    }
}
