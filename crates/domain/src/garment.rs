//! Garment records and similarity bindings.

use chrono::{DateTime, Utc};
use common::{AccountId, GarmentId, SimilarityId};
use serde::{Deserialize, Serialize};

use crate::media::BlobPath;

/// An uploaded garment after background removal and classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Garment {
    pub id: GarmentId,
    pub owner_id: AccountId,
    /// Garment type as reported by the classifier (e.g. `Hoodie`).
    pub label: String,
    pub brand: String,
    pub color: String,
    /// Target sex, set by the owner after upload. Similarity scans only
    /// compare garments that share both label and sex.
    pub sex: Option<String>,
    pub image_path: BlobPath,
    pub mask_path: BlobPath,
    pub created_at: DateTime<Utc>,
}

impl Garment {
    /// Returns true if `account` uploaded this garment.
    pub fn is_owned_by(&self, account: AccountId) -> bool {
        self.owner_id == account
    }

    /// Display label shown next to the garment inside an outfit.
    pub fn display_label(&self) -> String {
        if self.brand.is_empty() {
            self.label.clone()
        } else {
            format!("{} {}", self.label, self.brand)
        }
    }

    /// Returns a copy with the patch applied. Absent fields are kept; an
    /// explicit `"sex": null` clears the sex.
    pub fn patched(&self, patch: &GarmentPatch) -> Self {
        let mut next = self.clone();
        if let Some(label) = &patch.label {
            next.label = label.clone();
        }
        if let Some(brand) = &patch.brand {
            next.brand = brand.clone();
        }
        if let Some(color) = &patch.color {
            next.color = color.clone();
        }
        if let Some(sex) = &patch.sex {
            next.sex = sex.clone();
        }
        next
    }
}

/// Owner-editable garment fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarmentPatch {
    pub label: Option<String>,
    pub brand: Option<String>,
    pub color: Option<String>,
    /// `None` keeps the current value, `Some(None)` clears it.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub sex: Option<Option<String>>,
}

/// Maps a present field to `Some`, so a JSON `null` becomes `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Association between two visually similar garments.
///
/// Stored once, queryable from either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityBinding {
    pub id: SimilarityId,
    pub subject_id: GarmentId,
    pub candidate_id: GarmentId,
    pub score: i32,
}

impl SimilarityBinding {
    /// Returns true if either side of the binding is `garment`.
    pub fn involves(&self, garment: GarmentId) -> bool {
        self.subject_id == garment || self.candidate_id == garment
    }

    /// Returns the garment on the other side of the binding.
    pub fn other(&self, garment: GarmentId) -> Option<GarmentId> {
        if self.subject_id == garment {
            Some(self.candidate_id)
        } else if self.candidate_id == garment {
            Some(self.subject_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn garment() -> Garment {
        Garment {
            id: GarmentId::new(),
            owner_id: AccountId::new(),
            label: "Hoodie".to_string(),
            brand: String::new(),
            color: String::new(),
            sex: None,
            image_path: BlobPath::new("garments/a/g.webp"),
            mask_path: BlobPath::new("masks/a/m.webp"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_ownership() {
        let g = garment();
        assert!(g.is_owned_by(g.owner_id));
        assert!(!g.is_owned_by(AccountId::new()));
    }

    #[test]
    fn test_display_label() {
        let mut g = garment();
        assert_eq!(g.display_label(), "Hoodie");
        g.brand = "Acme".to_string();
        assert_eq!(g.display_label(), "Hoodie Acme");
    }

    #[test]
    fn test_patch_keeps_absent_fields() {
        let g = garment();
        let patched = g.patched(&GarmentPatch {
            sex: Some(Some("female".to_string())),
            ..GarmentPatch::default()
        });
        assert_eq!(patched.label, "Hoodie");
        assert_eq!(patched.sex.as_deref(), Some("female"));
        assert_eq!(patched.id, g.id);
    }

    #[test]
    fn test_patch_null_sex_clears_it() {
        let mut g = garment();
        g.sex = Some("male".to_string());

        let absent: GarmentPatch = serde_json::from_str(r#"{"brand":"Acme"}"#).unwrap();
        assert_eq!(absent.sex, None);
        assert_eq!(g.patched(&absent).sex.as_deref(), Some("male"));

        let cleared: GarmentPatch = serde_json::from_str(r#"{"sex":null}"#).unwrap();
        assert_eq!(cleared.sex, Some(None));
        assert_eq!(g.patched(&cleared).sex, None);
    }

    #[test]
    fn test_binding_other_side() {
        let a = GarmentId::new();
        let b = GarmentId::new();
        let binding = SimilarityBinding {
            id: SimilarityId::new(),
            subject_id: a,
            candidate_id: b,
            score: 90,
        };
        assert_eq!(binding.other(a), Some(b));
        assert_eq!(binding.other(b), Some(a));
        assert_eq!(binding.other(GarmentId::new()), None);
        assert!(binding.involves(b));
    }
}
