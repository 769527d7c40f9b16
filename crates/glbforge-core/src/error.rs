//! Unified error handling for glbforge
//!
//! This module provides the error type shared by the scene graph and the
//! exporter. Exporter-specific failures wrap it in their own enum.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all glbforge operations
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ==================== Parse Errors ====================

    /// Invalid magic bytes at file start
    #[error("Invalid magic bytes: expected {expected:?}, found {found:?}")]
    InvalidMagic {
        expected: Vec<u8>,
        found: Vec<u8>,
    },

    /// Unsupported format version
    #[error("Unsupported version: {version} (supported: {supported})")]
    UnsupportedVersion {
        version: String,
        supported: String,
    },

    /// Unexpected end of data
    #[error("Unexpected end of file at offset {offset}")]
    UnexpectedEof {
        offset: u64,
    },

    /// Invalid data structure
    #[error("Invalid data: {message}")]
    InvalidData {
        message: String,
    },

    // ==================== Scene Graph Errors ====================

    /// A keyed registry already holds an entry with this name
    #[error("Duplicate {kind}: {name}")]
    Duplicate {
        kind: &'static str,
        name: String,
    },

    /// A reference names an entity that does not exist
    #[error("Unknown {kind}: {name}")]
    UnknownReference {
        kind: &'static str,
        name: String,
    },

    /// A reparent operation would make a bone its own ancestor
    #[error("Reparenting {child} under {parent} would create a cycle")]
    HierarchyCycle {
        child: String,
        parent: String,
    },

    // ==================== General Errors ====================

    /// Internal error (should not happen)
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },

    /// Custom error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Error::InvalidData {
            message: message.into(),
        }
    }

    /// Create a duplicate-key error
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Error::Duplicate {
            kind,
            name: name.into(),
        }
    }

    /// Create an unknown-reference error
    pub fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Error::UnknownReference {
            kind,
            name: name.into(),
        }
    }

    /// Check if this is a "not found" type error
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::FileNotFound(_) | Error::UnknownReference { .. } => true,
            Error::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this is a parse/format error
    pub fn is_parse_error(&self) -> bool {
        match self {
            Error::InvalidMagic { .. }
            | Error::UnsupportedVersion { .. }
            | Error::UnexpectedEof { .. }
            | Error::InvalidData { .. } => true,
            Error::WithContext { source, .. } => source.is_parse_error(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
