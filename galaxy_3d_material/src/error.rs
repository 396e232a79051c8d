//! Error types for the Galaxy3D material system
//!
//! This module defines the error type used throughout the crate, covering
//! caller mistakes (bad index, wrong value kind, material not resolved),
//! broken internal invariants and failures reported by the renderer backend.

use std::fmt;

/// Result type for Galaxy3D material operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D material errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (buffer creation, poisoned renderer lock, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Operation not allowed in the current state (e.g. material without a resolved technique)
    InvalidState(String),

    /// Invalid argument supplied by the caller (bad pass index, struct size mismatch, etc.)
    InvalidArgument(String),

    /// Requested parameter does not exist
    NotFound(String),

    /// Array index past the declared array size
    OutOfRange(String),

    /// Internal invariant violated while resolving a shader
    InternalError(String),

    /// Feature not implemented yet
    NotImplemented(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::OutOfRange(msg) => write!(f, "Out of range: {}", msg),
            Error::InternalError(msg) => write!(f, "Internal error: {}", msg),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Build an `Error` variant from a formatted message and log it as ERROR
///
/// # Example
///
/// ```no_run
/// use galaxy_3d_material::engine_err;
///
/// let err = engine_err!("galaxy3d::Material", NotFound, "No parameter named '{}'", "tint");
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $variant:ident, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::galaxy3d::Error::$variant(message)
    }};
}

/// Log and return an error from the current function
///
/// # Example
///
/// ```no_run
/// use galaxy_3d_material::engine_bail;
///
/// fn check(index: usize) -> galaxy_3d_material::galaxy3d::Result<()> {
///     if index > 3 {
///         engine_bail!("galaxy3d::Material", InvalidArgument, "Invalid pass index {}", index);
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $variant:ident, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $variant, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
