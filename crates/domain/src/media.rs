//! Media rules shared by every adapter that touches image files.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DomainError;

/// Upload size cap used when no configuration overrides it (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 << 20;

/// Extension of images produced by the background cutter.
pub const STORED_IMAGE_EXT: &str = "webp";

/// Image formats accepted for garment uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    /// Resolves a declared MIME type against the allow-list.
    ///
    /// Parameters after `;` are ignored and matching is case-insensitive.
    pub fn from_content_type(content_type: &str) -> Result<Self, DomainError> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            "image/png" => Ok(Self::Png),
            "image/webp" => Ok(Self::Webp),
            _ => Err(DomainError::UnsupportedContentType(
                content_type.to_string(),
            )),
        }
    }

    /// Returns the canonical MIME type.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }
}

/// Top-level media folders, one per kind of stored image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Garments,
    Masks,
    Outfits,
    Posts,
    Avatars,
}

impl MediaKind {
    /// Returns the folder name under the media root.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Garments => "garments",
            Self::Masks => "masks",
            Self::Outfits => "outfits",
            Self::Posts => "posts",
            Self::Avatars => "avatars",
        }
    }
}

/// Relative path of a stored file inside the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobPath(String);

impl BlobPath {
    /// Wraps an already-built relative path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Builds `<kind>/<folder>/<file_name>`.
    pub fn join(kind: MediaKind, folder: &str, file_name: &str) -> Self {
        Self(format!("{}/{folder}/{file_name}", kind.as_str()))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the final path component.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for BlobPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rejects empty uploads and uploads above `max` bytes.
pub fn validate_size(size: usize, max: usize) -> Result<(), DomainError> {
    if size == 0 {
        return Err(DomainError::EmptyFile);
    }
    if size > max {
        return Err(DomainError::FileTooLarge { size, max });
    }
    Ok(())
}

/// Validates a client-supplied image file name and returns its extension.
///
/// Only `jpg`, `jpeg` and `png` are accepted. Names containing path
/// separators or starting with a dot are rejected.
pub fn validate_image_name(file_name: &str) -> Result<String, DomainError> {
    if file_name.is_empty()
        || file_name.starts_with('.')
        || file_name.contains('/')
        || file_name.contains('\\')
    {
        return Err(DomainError::InvalidFileName(file_name.to_string()));
    }

    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .ok_or_else(|| DomainError::UnsupportedExtension(String::new()))?;

    match ext.as_str() {
        "jpg" | "jpeg" | "png" => Ok(ext),
        _ => Err(DomainError::UnsupportedExtension(ext)),
    }
}

/// Per-account folder name: hex-encoded SHA-256 of the login.
pub fn account_folder(login: &str) -> String {
    hex::encode(Sha256::digest(login.as_bytes()))
}

/// Per-day folder name: hex-encoded SHA-256 of the ISO date.
pub fn dated_folder(date: NaiveDate) -> String {
    hex::encode(Sha256::digest(date.format("%Y-%m-%d").to_string().as_bytes()))
}

/// Generates a collision-resistant file name `<prefix>_<uuid>_<millis>.<ext>`.
pub fn generate_file_name(prefix: &str, ext: &str, now: DateTime<Utc>) -> String {
    format!(
        "{prefix}_{}_{}.{ext}",
        uuid::Uuid::new_v4().simple(),
        now.timestamp_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_content_types() {
        assert_eq!(
            ImageFormat::from_content_type("image/jpeg").unwrap(),
            ImageFormat::Jpeg
        );
        assert_eq!(
            ImageFormat::from_content_type("image/jpg").unwrap(),
            ImageFormat::Jpeg
        );
        assert_eq!(
            ImageFormat::from_content_type("IMAGE/PNG").unwrap(),
            ImageFormat::Png
        );
        assert_eq!(
            ImageFormat::from_content_type("image/webp; charset=binary").unwrap(),
            ImageFormat::Webp
        );
    }

    #[test]
    fn test_rejected_content_types() {
        assert!(matches!(
            ImageFormat::from_content_type("image/gif"),
            Err(DomainError::UnsupportedContentType(_))
        ));
        assert!(ImageFormat::from_content_type("application/pdf").is_err());
        assert!(ImageFormat::from_content_type("").is_err());
    }

    #[test]
    fn test_validate_size() {
        assert_eq!(validate_size(0, 10), Err(DomainError::EmptyFile));
        assert!(validate_size(10, 10).is_ok());
        assert_eq!(
            validate_size(11, 10),
            Err(DomainError::FileTooLarge { size: 11, max: 10 })
        );
    }

    #[test]
    fn test_validate_image_name() {
        assert_eq!(validate_image_name("front.JPG").unwrap(), "jpg");
        assert_eq!(validate_image_name("a.b.png").unwrap(), "png");
        assert!(matches!(
            validate_image_name("look.webp"),
            Err(DomainError::UnsupportedExtension(ext)) if ext == "webp"
        ));
        assert!(validate_image_name("noext").is_err());
        assert!(matches!(
            validate_image_name("../etc/passwd.png"),
            Err(DomainError::InvalidFileName(_))
        ));
        assert!(validate_image_name(".png").is_err());
    }

    #[test]
    fn test_account_folder_is_stable_hex() {
        let a = account_folder("alice@example.com");
        assert_eq!(a, account_folder("alice@example.com"));
        assert_ne!(a, account_folder("bob@example.com"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_names_are_unique() {
        let now = Utc::now();
        let first = generate_file_name("garment", STORED_IMAGE_EXT, now);
        let second = generate_file_name("garment", STORED_IMAGE_EXT, now);
        assert_ne!(first, second);
        assert!(first.starts_with("garment_"));
        assert!(first.ends_with(".webp"));
    }

    #[test]
    fn test_blob_path_join() {
        let path = BlobPath::join(MediaKind::Masks, "abc", "mask_1.webp");
        assert_eq!(path.as_str(), "masks/abc/mask_1.webp");
        assert_eq!(path.file_name(), "mask_1.webp");
    }
}
