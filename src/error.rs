//! Error types for conversion operations.

use thiserror::Error;

/// Result type alias using `ConvertirError`
pub type Result<T> = std::result::Result<T, ConvertirError>;

/// Main error type for conversion operations
///
/// Every error is fatal for the run: the converter never retries and never
/// writes a partial output file.
#[derive(Debug, Error)]
pub enum ConvertirError {
    /// Unparseable version line or numeric token in the text input
    #[error("Format error: {reason}")]
    FormatError {
        /// Error description with line/token context
        reason: String,
    },

    /// Vector count does not decompose into a valid network structure
    #[error("Structural error: {reason}")]
    StructuralError {
        /// Error description
        reason: String,
    },

    /// Source unreadable or destination unwritable
    #[error("IO error: {message}")]
    IoError {
        /// Error description
        message: String,
    },
}
