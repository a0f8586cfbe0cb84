//! Outfit (look) records and garment placements.

use chrono::{DateTime, Utc};
use common::{AccountId, GarmentId, OutfitId, PlacementId};
use serde::{Deserialize, Serialize};

use crate::media::BlobPath;

/// A composed outfit image owned by its creator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outfit {
    pub id: OutfitId,
    pub creator_id: AccountId,
    pub description: String,
    pub image_path: BlobPath,
    pub created_at: DateTime<Utc>,
}

impl Outfit {
    /// Returns true if `account` created this outfit.
    pub fn is_created_by(&self, account: AccountId) -> bool {
        self.creator_id == account
    }
}

/// Position of a garment on the outfit canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coords {
    pub x: i32,
    pub y: i32,
}

/// Client-supplied placement of a garment, before it is bound to an outfit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementSpec {
    pub garment_id: GarmentId,
    #[serde(default)]
    pub coords: Coords,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_scale() -> f32 {
    1.0
}

/// A stored garment placement, owned by its outfit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub id: PlacementId,
    pub outfit_id: OutfitId,
    pub garment_id: GarmentId,
    pub coords: Coords,
    pub rotation: f32,
    pub scale: f32,
    /// Order of the placement inside the outfit, starting at zero.
    pub position: u32,
}

impl Placement {
    /// Binds a spec to an outfit at the given position.
    pub fn from_spec(outfit_id: OutfitId, position: u32, spec: &PlacementSpec) -> Self {
        Self {
            id: PlacementId::new(),
            outfit_id,
            garment_id: spec.garment_id,
            coords: spec.coords,
            rotation: spec.rotation,
            scale: spec.scale,
            position,
        }
    }
}

/// A placement enriched with the garment's display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedGarment {
    pub garment_id: GarmentId,
    pub label: String,
    pub placement: Placement,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_from_spec() {
        let outfit_id = OutfitId::new();
        let spec = PlacementSpec {
            garment_id: GarmentId::new(),
            coords: Coords { x: 10, y: -4 },
            rotation: 15.0,
            scale: 0.5,
        };
        let placement = Placement::from_spec(outfit_id, 2, &spec);
        assert_eq!(placement.outfit_id, outfit_id);
        assert_eq!(placement.garment_id, spec.garment_id);
        assert_eq!(placement.coords, spec.coords);
        assert_eq!(placement.position, 2);
    }

    #[test]
    fn test_spec_defaults() {
        let garment_id = GarmentId::new();
        let json = format!("{{\"garment_id\":\"{garment_id}\"}}");
        let spec: PlacementSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec.coords, Coords::default());
        assert_eq!(spec.scale, 1.0);
        assert_eq!(spec.rotation, 0.0);
    }
}
