//! Data models for wardrobe composition, generation requests and Gemini payloads

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, GenerationError};

/// Sentinel rendered into the instruction text for a slot with no usable image
pub const NO_IMAGE_PROVIDED: &str = "NO_IMAGE_PROVIDED";

static ITEM_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Where the bytes of an image come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// A file the user supplied, already read into memory
    Uploaded { bytes: Vec<u8>, mime_type: String },
    /// A preset image that has to be downloaded
    Remote { url: String },
}

impl ImageSource {
    pub fn uploaded(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self::Uploaded {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote { url: url.into() }
    }

    /// Reads a local image file in one go, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, GenerationError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| GenerationError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream");

        Ok(Self::uploaded(bytes, mime_type))
    }

    /// Interprets a command-line argument: http(s) URLs are remote, anything else is a file path.
    pub async fn parse(arg: &str) -> Result<Self, GenerationError> {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            Ok(Self::remote(arg))
        } else {
            Self::from_path(arg).await
        }
    }

    /// Short human-readable description used in logs
    pub fn describe(&self) -> String {
        match self {
            Self::Uploaded { bytes, mime_type } => {
                format!("upload ({mime_type}, {} bytes)", bytes.len())
            }
            Self::Remote { url } => url.clone(),
        }
    }
}

/// One garment placed in a wardrobe slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClothingItem {
    /// Opaque identifier, only used to remove the item again
    pub id: String,
    pub source: ImageSource,
}

impl ClothingItem {
    pub fn new(source: ImageSource) -> Self {
        let seq = ITEM_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let id = format!("{:x}", md5::compute(format!("{seq}:{}", source.describe())));

        Self { id, source }
    }

    pub fn uploaded(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self::new(ImageSource::uploaded(bytes, mime_type))
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self::new(ImageSource::remote(url))
    }
}

/// Wardrobe slots, in the order they are sent to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Headwear,
    UpperBody,
    LowerBody,
    Footwear,
    Accessories,
}

impl Slot {
    pub const ALL: [Slot; 5] = [
        Slot::Headwear,
        Slot::UpperBody,
        Slot::LowerBody,
        Slot::Footwear,
        Slot::Accessories,
    ];

    /// Maximum number of items the slot holds. Upper and lower body items are layered.
    pub const fn capacity(self) -> usize {
        match self {
            Slot::Headwear | Slot::Footwear => 1,
            Slot::UpperBody | Slot::LowerBody => 2,
            Slot::Accessories => 3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Slot::Headwear => "headwear",
            Slot::UpperBody => "upper_body",
            Slot::LowerBody => "lower_body",
            Slot::Footwear => "footwear",
            Slot::Accessories => "accessories",
        }
    }
}

/// Items per slot, each list kept in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wardrobe {
    headwear: Vec<ClothingItem>,
    upper_body: Vec<ClothingItem>,
    lower_body: Vec<ClothingItem>,
    footwear: Vec<ClothingItem>,
    accessories: Vec<ClothingItem>,
}

impl Wardrobe {
    pub fn items(&self, slot: Slot) -> &[ClothingItem] {
        match slot {
            Slot::Headwear => &self.headwear,
            Slot::UpperBody => &self.upper_body,
            Slot::LowerBody => &self.lower_body,
            Slot::Footwear => &self.footwear,
            Slot::Accessories => &self.accessories,
        }
    }

    fn items_mut(&mut self, slot: Slot) -> &mut Vec<ClothingItem> {
        match slot {
            Slot::Headwear => &mut self.headwear,
            Slot::UpperBody => &mut self.upper_body,
            Slot::LowerBody => &mut self.lower_body,
            Slot::Footwear => &mut self.footwear,
            Slot::Accessories => &mut self.accessories,
        }
    }

    /// Appends an item. A full slot is left untouched and `false` is returned.
    pub fn add(&mut self, slot: Slot, item: ClothingItem) -> bool {
        let items = self.items_mut(slot);
        if items.len() >= slot.capacity() {
            return false;
        }
        items.push(item);
        true
    }

    pub fn remove(&mut self, slot: Slot, id: &str) -> bool {
        let items = self.items_mut(slot);
        let before = items.len();
        items.retain(|item| item.id != id);
        items.len() != before
    }

    pub fn clear(&mut self, slot: Slot) {
        self.items_mut(slot).clear();
    }

    /// Swaps whatever the slot held for a single item
    pub fn replace(&mut self, slot: Slot, item: ClothingItem) {
        let items = self.items_mut(slot);
        items.clear();
        items.push(item);
    }

    pub fn is_empty(&self) -> bool {
        Slot::ALL.iter().all(|slot| self.items(*slot).is_empty())
    }
}

/// Base64 image payload ready to be embedded in a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlock {
    pub data: String,
    pub mime_type: String,
}

/// One part of a multimodal request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPart {
    InlineImage(EncodedBlock),
    Text(String),
}

/// Ordered parts sent in a single generation call: images first, instruction last
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub parts: Vec<RequestPart>,
}

impl GenerationRequest {
    pub fn new(blocks: Vec<EncodedBlock>, instruction: String) -> Self {
        let mut parts: Vec<RequestPart> = blocks.into_iter().map(RequestPart::InlineImage).collect();
        parts.push(RequestPart::Text(instruction));
        Self { parts }
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, RequestPart::InlineImage(_)))
            .count()
    }

    pub fn instruction(&self) -> Option<&str> {
        self.parts.iter().rev().find_map(|part| match part {
            RequestPart::Text(text) => Some(text.as_str()),
            RequestPart::InlineImage(_) => None,
        })
    }
}

/// Persisted daily usage counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub date: NaiveDate,
    pub count: u32,
}

/// Observable lifecycle of the single generation slot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenerationState {
    #[default]
    Idle,
    Validating,
    InFlight {
        remaining_secs: u32,
    },
    Succeeded {
        image_data_url: String,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl GenerationState {
    /// `true` while a generation owns the slot and new starts must be refused
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Validating | Self::InFlight { .. })
    }
}

/// Gemini `generateContent` request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    pub response_modalities: Vec<String>,
}

/// A list of parts, used both in requests and in response candidates
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

/// Either text or inline binary data. Unknown response fields are ignored.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", alias = "inline_data")]
    pub inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiInlineData {
    #[serde(default, alias = "mime_type")]
    pub mime_type: String,
    pub data: String,
}

/// Gemini `generateContent` response body
#[derive(Debug, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    pub content: Option<GeminiContent>,
}
