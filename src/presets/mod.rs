//! Preset image pools used to randomise an outfit

use rand::Rng;

use crate::models::{ClothingItem, ImageSource, Slot, Wardrobe};

const LIBRARY_BASE: &str = "https://github.com/AAAlexanderS/AI-TRYON/raw/main/Library";

/// Pool a preset belongs to: the profile, or one of the wardrobe slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Profile,
    Slot(Slot),
}

/// Preset URLs per category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLibrary {
    pub profile: Vec<String>,
    pub headwear: Vec<String>,
    pub upper_body: Vec<String>,
    pub lower_body: Vec<String>,
    pub footwear: Vec<String>,
    pub accessories: Vec<String>,
}

fn numbered(prefix: &str, count: usize) -> Vec<String> {
    (1..=count)
        .map(|n| format!("{LIBRARY_BASE}/{prefix}{n}.png"))
        .collect()
}

impl Default for AssetLibrary {
    fn default() -> Self {
        Self {
            profile: numbered("Profile", 7),
            headwear: numbered("Headware", 3),
            upper_body: numbered("Upper", 7),
            lower_body: numbered("Lower", 6),
            footwear: numbered("Shoes", 6),
            accessories: numbered("Bag", 6),
        }
    }
}

impl AssetLibrary {
    pub fn pool(&self, category: Category) -> &[String] {
        match category {
            Category::Profile => &self.profile,
            Category::Slot(Slot::Headwear) => &self.headwear,
            Category::Slot(Slot::UpperBody) => &self.upper_body,
            Category::Slot(Slot::LowerBody) => &self.lower_body,
            Category::Slot(Slot::Footwear) => &self.footwear,
            Category::Slot(Slot::Accessories) => &self.accessories,
        }
    }

    fn pool_mut(&mut self, category: Category) -> &mut Vec<String> {
        match category {
            Category::Profile => &mut self.profile,
            Category::Slot(Slot::Headwear) => &mut self.headwear,
            Category::Slot(Slot::UpperBody) => &mut self.upper_body,
            Category::Slot(Slot::LowerBody) => &mut self.lower_body,
            Category::Slot(Slot::Footwear) => &mut self.footwear,
            Category::Slot(Slot::Accessories) => &mut self.accessories,
        }
    }

    /// Newly added presets go to the front of the pool
    pub fn add_front(&mut self, category: Category, urls: impl IntoIterator<Item = String>) {
        let pool = self.pool_mut(category);
        let mut added: Vec<String> = urls.into_iter().collect();
        added.append(pool);
        *pool = added;
    }

    pub fn remove_at(&mut self, category: Category, index: usize) -> Option<String> {
        let pool = self.pool_mut(category);
        (index < pool.len()).then(|| pool.remove(index))
    }

    /// A profile plus one preset per slot, skipping empty pools
    pub fn randomize<R: Rng + ?Sized>(&self, rng: &mut R) -> (Option<ImageSource>, Wardrobe) {
        let mut profile = None;
        let mut wardrobe = Wardrobe::default();

        self.randomize_slot(Category::Profile, &mut profile, &mut wardrobe, rng);
        for slot in Slot::ALL {
            self.randomize_slot(Category::Slot(slot), &mut profile, &mut wardrobe, rng);
        }

        (profile, wardrobe)
    }

    /// Re-rolls a single category, leaving everything else as it was.
    ///
    /// A slot ends up holding exactly the picked preset. An empty pool changes
    /// nothing and returns `false`.
    pub fn randomize_slot<R: Rng + ?Sized>(
        &self,
        category: Category,
        profile: &mut Option<ImageSource>,
        wardrobe: &mut Wardrobe,
        rng: &mut R,
    ) -> bool {
        let Some(url) = pick_random(self.pool(category), rng) else {
            return false;
        };

        match category {
            Category::Profile => *profile = Some(ImageSource::remote(url)),
            Category::Slot(slot) => wardrobe.replace(slot, ClothingItem::remote(url)),
        }
        true
    }
}

/// Uniformly picks one entry, or `None` for an empty pool
pub fn pick_random<'a, R: Rng + ?Sized>(pool: &'a [String], rng: &mut R) -> Option<&'a str> {
    if pool.is_empty() {
        return None;
    }
    pool.get(rng.gen_range(0..pool.len())).map(String::as_str)
}
