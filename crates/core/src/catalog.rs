//! Read-only image catalog: item id to file name and pixel size.
//!
//! The catalog is an external collaborator of the annotation store. Only the
//! lookup interface matters here; [`StaticCatalog`] is the in-process
//! implementation loaded from a JSON image index.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Catalog entry for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: DbId,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    /// Canonical relative path stored in records: `"/<file_name>"`.
    pub fn relative_path(&self) -> String {
        format!("/{}", self.file_name.trim_start_matches('/'))
    }

    /// Resolution string stored in records: `"WxH"`.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Lookup interface used by the annotation service.
pub trait ImageCatalog: Send + Sync {
    fn get(&self, id: DbId) -> Option<ImageInfo>;

    /// All known ids in ascending order.
    fn ids(&self) -> Vec<DbId>;
}

/// Accepted index layouts: a bare array of entries, or an object with an
/// `images` array (extra top-level keys are ignored).
#[derive(Deserialize)]
#[serde(untagged)]
enum IndexFile {
    Flat(Vec<ImageInfo>),
    Wrapped { images: Vec<ImageInfo> },
}

/// Immutable in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    images: BTreeMap<DbId, ImageInfo>,
}

impl StaticCatalog {
    pub fn new(images: impl IntoIterator<Item = ImageInfo>) -> Self {
        Self {
            images: images.into_iter().map(|i| (i.id, i)).collect(),
        }
    }

    /// Parse an image index from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let file: IndexFile = serde_json::from_str(json)
            .map_err(|e| CoreError::Validation(format!("Invalid image index: {e}")))?;
        let images = match file {
            IndexFile::Flat(images) | IndexFile::Wrapped { images } => images,
        };
        Ok(Self::new(images))
    }

    /// Load an image index file from disk.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Internal(format!("Failed to read image index {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ImageCatalog for StaticCatalog {
    fn get(&self, id: DbId) -> Option<ImageInfo> {
        self.images.get(&id).cloned()
    }

    fn ids(&self) -> Vec<DbId> {
        self.images.keys().copied().collect()
    }
}
