//! Domain error types.

use thiserror::Error;

/// Errors raised while validating user-supplied input.
///
/// All of these are detected before any side effect happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The declared content type is not an accepted image format.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The file extension is not accepted for previews or outfit images.
    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),

    /// Upload exceeds the configured size cap.
    #[error("File too large: {size} bytes exceeds limit of {max} bytes")]
    FileTooLarge { size: usize, max: usize },

    /// Upload carried no bytes.
    #[error("File is empty")]
    EmptyFile,

    /// File name is unusable as a storage path component.
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    /// Post type discriminator is not recognized.
    #[error("Unknown post type: {0}")]
    UnknownPostType(String),
}
