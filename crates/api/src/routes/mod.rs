//! Request handlers, one module per resource.

pub mod accounts;
pub mod garments;
pub mod health;
pub mod metrics;
pub mod outfits;
pub mod posts;

use axum::extract::Multipart;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use saga::ImageUpload;
use serde::Deserialize;
use store::Page;

use crate::error::ApiError;

/// `?limit=&offset=` query parameters of list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        let default = Page::default();
        Page::new(
            self.limit.unwrap_or(default.limit),
            self.offset.unwrap_or(default.offset),
        )
    }
}

/// Multipart field holding an uploaded photo.
pub const FILE_FIELD: &str = "file";

/// Reads the first `file` field of a multipart body.
pub async fn read_upload(mut multipart: Multipart) -> Result<ImageUpload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        return Ok(ImageUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Err(ApiError::BadRequest(format!("missing `{FILE_FIELD}` field")))
}

/// An image sent inside a JSON body, base64 encoded.
#[derive(Debug, Deserialize)]
pub struct EncodedImage {
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub data: String,
}

impl EncodedImage {
    pub fn decode(self) -> Result<ImageUpload, ApiError> {
        let bytes = BASE64
            .decode(self.data.as_bytes())
            .map_err(|e| ApiError::BadRequest(format!("{}: invalid base64: {e}", self.file_name)))?;
        Ok(ImageUpload {
            file_name: self.file_name,
            content_type: self
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_defaults_and_clamps() {
        let page = PageQuery::default().page();
        assert_eq!(page, Page::default());

        let page = PageQuery {
            limit: Some(5000),
            offset: Some(10),
        }
        .page();
        assert_eq!(page.limit, store::MAX_PAGE_SIZE);
        assert_eq!(page.offset, 10);
    }

    #[test]
    fn test_encoded_image_decodes() {
        let upload = EncodedImage {
            file_name: "look.png".to_string(),
            content_type: None,
            data: BASE64.encode(b"png bytes"),
        }
        .decode()
        .unwrap();
        assert_eq!(upload.bytes, b"png bytes");
        assert_eq!(upload.content_type, "application/octet-stream");
    }

    #[test]
    fn test_encoded_image_rejects_bad_base64() {
        let err = EncodedImage {
            file_name: "look.png".to_string(),
            content_type: None,
            data: "%%%".to_string(),
        }
        .decode()
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
