//! Walks the profile and wardrobe slots, encoding items into one ordered part list

use std::collections::BTreeMap;
use std::fmt;

use tracing::{info, warn};

use crate::encoder::ImageEncoder;
use crate::models::{ClothingItem, EncodedBlock, ImageSource, NO_IMAGE_PROVIDED, Slot, Wardrobe};

/// What the instruction text says about one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotReference {
    /// Slot was empty, or every item in it failed to encode
    Missing,
    /// 1-based positions of the slot's images in the request part list
    Images(Vec<usize>),
}

impl SlotReference {
    pub fn positions(&self) -> &[usize] {
        match self {
            Self::Missing => &[],
            Self::Images(positions) => positions,
        }
    }

    /// Placeholder tokens, one per image, or the single sentinel
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Self::Missing => vec![NO_IMAGE_PROVIDED.to_string()],
            Self::Images(positions) => positions.iter().map(|n| format!("[IMAGE_{n}]")).collect(),
        }
    }
}

impl fmt::Display for SlotReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens().join(", "))
    }
}

/// References for the profile and every wardrobe slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutfitReferences {
    pub profile: SlotReference,
    pub slots: BTreeMap<Slot, SlotReference>,
}

static MISSING: SlotReference = SlotReference::Missing;

impl OutfitReferences {
    pub fn slot(&self, slot: Slot) -> &SlotReference {
        self.slots.get(&slot).unwrap_or(&MISSING)
    }
}

/// Encoded blocks in request order, plus the references pointing into them
#[derive(Debug, Clone)]
pub struct ResolvedOutfit {
    pub references: OutfitReferences,
    pub blocks: Vec<EncodedBlock>,
}

/// Accumulates encoded blocks across slots so positions are global, not per slot.
///
/// Items are encoded one after another. Positions are assigned in slot-then-item
/// order, so the numbering never depends on which download finishes first.
pub struct SlotResolver<'a> {
    encoder: &'a ImageEncoder,
    blocks: Vec<EncodedBlock>,
}

impl<'a> SlotResolver<'a> {
    pub fn new(encoder: &'a ImageEncoder) -> Self {
        Self {
            encoder,
            blocks: Vec::new(),
        }
    }

    async fn push(&mut self, source: &ImageSource) -> Option<usize> {
        match self.encoder.encode(source).await {
            Ok(block) => {
                self.blocks.push(block);
                Some(self.blocks.len())
            }
            Err(e) => {
                warn!("Skipping image {}: {}", source.describe(), e);
                None
            }
        }
    }

    pub async fn resolve_profile(&mut self, profile: Option<&ImageSource>) -> SlotReference {
        let Some(source) = profile else {
            return SlotReference::Missing;
        };

        match self.push(source).await {
            Some(position) => SlotReference::Images(vec![position]),
            None => SlotReference::Missing,
        }
    }

    /// Encodes a slot's items in order. Failed items are dropped; if none survive
    /// the slot is reported as missing.
    pub async fn resolve_slot(&mut self, items: &[ClothingItem]) -> SlotReference {
        let mut positions = Vec::with_capacity(items.len());
        for item in items {
            if let Some(position) = self.push(&item.source).await {
                positions.push(position);
            }
        }

        if positions.is_empty() {
            SlotReference::Missing
        } else {
            SlotReference::Images(positions)
        }
    }

    pub fn into_blocks(self) -> Vec<EncodedBlock> {
        self.blocks
    }
}

/// Resolves the profile first, then each slot in [`Slot::ALL`] order.
pub async fn resolve_outfit(
    encoder: &ImageEncoder,
    profile: Option<&ImageSource>,
    wardrobe: &Wardrobe,
) -> ResolvedOutfit {
    let mut resolver = SlotResolver::new(encoder);

    let profile = resolver.resolve_profile(profile).await;
    let mut slots = BTreeMap::new();
    for slot in Slot::ALL {
        let reference = resolver.resolve_slot(wardrobe.items(slot)).await;
        slots.insert(slot, reference);
    }

    let blocks = resolver.into_blocks();
    info!("Resolved outfit into {} image parts", blocks.len());

    ResolvedOutfit {
        references: OutfitReferences { profile, slots },
        blocks,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::encoder::tests::StubFetcher;

    fn encoder(fetcher: StubFetcher) -> ImageEncoder {
        ImageEncoder::new(Arc::new(fetcher))
    }

    #[tokio::test]
    async fn empty_slot_yields_sentinel_and_no_parts() {
        let encoder = encoder(StubFetcher::default());
        let mut resolver = SlotResolver::new(&encoder);

        let reference = resolver.resolve_slot(&[]).await;

        assert_eq!(reference, SlotReference::Missing);
        assert_eq!(reference.to_string(), NO_IMAGE_PROVIDED);
        assert!(resolver.into_blocks().is_empty());
    }

    #[tokio::test]
    async fn slot_where_every_item_fails_degrades_to_sentinel() {
        let encoder = encoder(StubFetcher::default());
        let mut resolver = SlotResolver::new(&encoder);
        let items = [
            ClothingItem::remote("https://cdn/gone1.png"),
            ClothingItem::remote("https://cdn/gone2.png"),
        ];

        let reference = resolver.resolve_slot(&items).await;

        assert_eq!(reference, SlotReference::Missing);
        assert!(resolver.into_blocks().is_empty());
    }

    #[tokio::test]
    async fn positions_are_global_across_slots() {
        let fetcher = StubFetcher::default()
            .with("https://cdn/profile.png", b"p", Some("image/png"))
            .with("https://cdn/jacket.png", b"j", Some("image/png"))
            .with("https://cdn/jeans.png", b"l", Some("image/png"));
        let encoder = encoder(fetcher);

        let mut wardrobe = Wardrobe::default();
        wardrobe.add(Slot::UpperBody, ClothingItem::uploaded(vec![1, 2, 3], "image/jpeg"));
        wardrobe.add(Slot::UpperBody, ClothingItem::remote("https://cdn/jacket.png"));
        wardrobe.add(Slot::LowerBody, ClothingItem::remote("https://cdn/jeans.png"));

        let profile = ImageSource::remote("https://cdn/profile.png");
        let resolved = resolve_outfit(&encoder, Some(&profile), &wardrobe).await;

        assert_eq!(resolved.blocks.len(), 4);
        assert_eq!(resolved.references.profile, SlotReference::Images(vec![1]));
        assert_eq!(resolved.references.slot(Slot::UpperBody), &SlotReference::Images(vec![2, 3]));
        assert_eq!(resolved.references.slot(Slot::LowerBody), &SlotReference::Images(vec![4]));
        assert_eq!(resolved.references.slot(Slot::Footwear), &SlotReference::Missing);
        assert_eq!(
            resolved.references.slot(Slot::UpperBody).to_string(),
            "[IMAGE_2], [IMAGE_3]"
        );
        assert_eq!(resolved.blocks[1].mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn one_failed_layer_keeps_the_rest_of_the_request() {
        let fetcher = StubFetcher::default()
            .with("https://cdn/shirt.png", b"s", None)
            .with("https://cdn/jeans.png", b"l", None);
        let encoder = encoder(fetcher);

        let mut wardrobe = Wardrobe::default();
        wardrobe.add(Slot::UpperBody, ClothingItem::remote("https://cdn/shirt.png"));
        wardrobe.add(Slot::UpperBody, ClothingItem::remote("https://cdn/broken.png"));
        wardrobe.add(Slot::LowerBody, ClothingItem::remote("https://cdn/jeans.png"));

        let profile = ImageSource::uploaded(vec![9], "image/png");
        let resolved = resolve_outfit(&encoder, Some(&profile), &wardrobe).await;

        assert_eq!(resolved.references.slot(Slot::UpperBody).positions(), &[2]);
        assert_eq!(resolved.references.slot(Slot::LowerBody).positions(), &[3]);
        assert_eq!(resolved.blocks.len(), 3);
    }

    #[tokio::test]
    async fn failed_profile_download_falls_back_to_sentinel() {
        let encoder = encoder(StubFetcher::default());
        let mut resolver = SlotResolver::new(&encoder);

        let reference = resolver
            .resolve_profile(Some(&ImageSource::remote("https://cdn/nope.png")))
            .await;

        assert_eq!(reference, SlotReference::Missing);
        assert_eq!(resolver.resolve_profile(None).await, SlotReference::Missing);
    }
}
