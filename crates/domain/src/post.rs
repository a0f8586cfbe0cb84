//! Post records.

use chrono::{DateTime, Utc};
use common::{AccountId, GarmentId, OutfitId, PostId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::media::BlobPath;

/// Type discriminator of the element a post shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Garment,
    Outfit,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Garment => "garment",
            Self::Outfit => "outfit",
        }
    }
}

impl std::str::FromStr for PostKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "garment" => Ok(Self::Garment),
            "outfit" => Ok(Self::Outfit),
            other => Err(DomainError::UnknownPostType(other.to_string())),
        }
    }
}

/// The single element a post references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "element_id", rename_all = "lowercase")]
pub enum PostElement {
    Garment(GarmentId),
    Outfit(OutfitId),
}

impl PostElement {
    /// Builds an element from a discriminator and a raw id.
    pub fn from_parts(kind: PostKind, element_id: uuid::Uuid) -> Self {
        match kind {
            PostKind::Garment => Self::Garment(GarmentId::from_uuid(element_id)),
            PostKind::Outfit => Self::Outfit(OutfitId::from_uuid(element_id)),
        }
    }

    pub fn kind(&self) -> PostKind {
        match self {
            Self::Garment(_) => PostKind::Garment,
            Self::Outfit(_) => PostKind::Outfit,
        }
    }

    pub fn element_uuid(&self) -> uuid::Uuid {
        match self {
            Self::Garment(id) => id.as_uuid(),
            Self::Outfit(id) => id.as_uuid(),
        }
    }
}

/// A published post with its stored preview images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub creator_id: AccountId,
    pub description: String,
    pub element: PostElement,
    pub preview_paths: Vec<BlobPath>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Returns true if `account` created this post.
    pub fn is_created_by(&self, account: AccountId) -> bool {
        self.creator_id == account
    }
}
