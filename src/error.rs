//! Centralized error handling for keepsake.
//!
//! The error categories mirror how a preservation run reacts to them:
//!
//! - **Fatal** errors ([`KeepsakeError::Argument`], [`KeepsakeError::Catalog`],
//!   [`KeepsakeError::Config`]) abort the whole run before or while records are
//!   selected. No partial progress is assumed safe.
//! - **Per-record** errors (everything else) are caught at the record boundary,
//!   written back onto that record's status fields and counted in the run report.
//!
//! ```
//! use keepsake::error::KeepsakeError;
//!
//! let err = KeepsakeError::RequiredField("missing value for 'Catalog Name'".to_owned());
//! assert!(!err.is_fatal());
//! assert!(KeepsakeError::Catalog("connection refused".to_owned()).is_fatal());
//! ```
//!
//! ## Context Extension Trait
//!
//! [`ResultExt`] adds `.context()` to any `Result` whose error converts into
//! [`KeepsakeError`]. Unlike a plain string wrap, the category is kept, so a
//! catalog failure with context is still fatal:
//!
//! ```no_run
//! use keepsake::error::ResultExt as _;
//! use std::fs;
//!
//! fn load_catalog() -> keepsake::error::Result<String> {
//!     let raw = fs::read_to_string("catalog.json").context("Failed to load catalog")?;
//!     Ok(raw)
//! }
//! ```

use std::fmt;

/// Main error type for keepsake operations.
#[derive(Debug)]
pub enum KeepsakeError {
    /// I/O errors (content files, scratch files, staging)
    Io(std::io::Error),

    /// Bad configuration or selection arguments; aborts the run
    Argument(String),

    /// Catalog could not execute a query or is unreachable; aborts the run
    Catalog(String),

    /// Configuration file could not be read or parsed
    Config(String),

    /// A record precondition is unmet (missing, empty or read-only field)
    RequiredField(String),

    /// Metadata transformation or schema validation failed
    Transformation(String),

    /// Packager or archive store unreachable, or object not found
    ArchiveIo(String),

    /// Checksum or size mismatch discovered during validation
    IntegrityMismatch(String),

    /// Generic error with context
    Other(String),
}

impl KeepsakeError {
    /// Whether this error must abort the current run instead of failing a single record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Argument(_) | Self::Catalog(_) | Self::Config(_))
    }

    /// Prefix the message with `msg`, keeping the error category.
    #[must_use]
    pub fn with_prefix(self, msg: &str) -> Self {
        match self {
            Self::Io(e) => Self::Other(format!("{msg}: I/O error: {e}")),
            Self::Argument(m) => Self::Argument(format!("{msg}: {m}")),
            Self::Catalog(m) => Self::Catalog(format!("{msg}: {m}")),
            Self::Config(m) => Self::Config(format!("{msg}: {m}")),
            Self::RequiredField(m) => Self::RequiredField(format!("{msg}: {m}")),
            Self::Transformation(m) => Self::Transformation(format!("{msg}: {m}")),
            Self::ArchiveIo(m) => Self::ArchiveIo(format!("{msg}: {m}")),
            Self::IntegrityMismatch(m) => Self::IntegrityMismatch(format!("{msg}: {m}")),
            Self::Other(m) => Self::Other(format!("{msg}: {m}")),
        }
    }
}

impl fmt::Display for KeepsakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Argument(msg) => write!(f, "Invalid argument: {msg}"),
            Self::Catalog(msg) => write!(f, "Catalog error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::RequiredField(msg) => write!(f, "Required field error: {msg}"),
            Self::Transformation(msg) => write!(f, "Transformation error: {msg}"),
            Self::ArchiveIo(msg) => write!(f, "Archive error: {msg}"),
            Self::IntegrityMismatch(msg) => write!(f, "Integrity mismatch: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for KeepsakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeepsakeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for KeepsakeError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for KeepsakeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<quick_xml::Error> for KeepsakeError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Transformation(format!("XML error: {err}"))
    }
}

impl From<quick_xml::events::attributes::AttrError> for KeepsakeError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Transformation(format!("XML attribute error: {err}"))
    }
}

impl From<KeepsakeError> for String {
    fn from(err: KeepsakeError) -> Self {
        err.to_string()
    }
}

/// Result type alias for keepsake operations.
pub type Result<T> = std::result::Result<T, KeepsakeError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<KeepsakeError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_prefix(&msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_prefix(&f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KeepsakeError::IntegrityMismatch("payload checksum differs".to_owned());
        assert_eq!(err.to_string(), "Integrity mismatch: payload checksum differs");
    }

    #[test]
    fn test_fatal_categories() {
        assert!(KeepsakeError::Argument("x".to_owned()).is_fatal());
        assert!(KeepsakeError::Catalog("x".to_owned()).is_fatal());
        assert!(KeepsakeError::Config("x".to_owned()).is_fatal());
        assert!(!KeepsakeError::Transformation("x".to_owned()).is_fatal());
        assert!(!KeepsakeError::ArchiveIo("x".to_owned()).is_fatal());
        assert!(!KeepsakeError::RequiredField("x".to_owned()).is_fatal());
    }

    #[test]
    fn test_context_keeps_category() {
        let result: Result<()> = Err(KeepsakeError::Catalog("timeout".to_owned()));
        let err = result.context("Selecting records").unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Catalog error: Selecting records: timeout");
    }

    #[test]
    fn test_io_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "asset.tif",
        ));

        let err = result.context("Failed to open content file").unwrap_err();
        assert!(err.to_string().contains("Failed to open content file"));
        assert!(!err.is_fatal());
    }
}
