// src/error.rs

//! Error types for the release manager
//!
//! Every library operation returns [`Result`]. Constraint and conflict errors
//! are raised eagerly and abort the whole enclosing operation, so callers see
//! either a fully applied command or nothing written.

use thiserror::Error;

/// Errors produced by the release manager core
#[derive(Error, Debug)]
pub enum Error {
    /// A release, group, experiment or package does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Something with this name already exists
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The name is reserved (e.g. `default`)
    #[error("'{0}' is a reserved name")]
    ReservedName(String),

    /// Unrecognized package metadata or a malformed record
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Stored content does not match its recorded hash
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// Two overrides resolve to the same device, package and architecture
    #[error("Conflicting assignment: {0}")]
    ConflictingAssignment(String),

    /// A referential-integrity check failed
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// An external tool (signer, transfer) exited unsuccessfully
    #[error("External tool error: {0}")]
    ExternalToolError(String),

    /// A file has unsafe permissions (e.g. a group-readable signing key)
    #[error("Permission error: {0}")]
    PermissionError(String),

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP download failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
