//! Annotation records and the two storage partitions (exo / ego views).
//!
//! An [`AnnotationRecord`] is one finished annotation unit. Its JSON shape is
//! consumed directly by export tooling, so field names follow the on-disk
//! format (`image_id`, `image_path`, `view`, `bbox`, ...), not the Rust names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::ImageInfo;
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// A single `[x, y, width, height]` box in image pixel coordinates.
pub type BoundingBox = [f64; 4];

// ---------------------------------------------------------------------------
// Partition
// ---------------------------------------------------------------------------

/// The two mutually exclusive storage partitions, one per camera viewpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Exocentric (third-person) view.
    Exo,
    /// Egocentric (first-person) view.
    Ego,
}

/// All valid partition strings.
const VALID_PARTITION_STRINGS: &[&str] = &["exo", "ego"];

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Exo, Partition::Ego];

    /// Return the partition as a lowercase string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exo => "exo",
            Self::Ego => "ego",
        }
    }

    /// The partition an item must be evicted from when written to `self`.
    pub fn other(self) -> Partition {
        match self {
            Self::Exo => Self::Ego,
            Self::Ego => Self::Exo,
        }
    }

    /// Parse a partition from user input. Surrounding whitespace and case are ignored.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exo" => Ok(Self::Exo),
            "ego" => Ok(Self::Ego),
            _ => Err(CoreError::Validation(format!(
                "Invalid view '{s}'. Must be one of: {}",
                VALID_PARTITION_STRINGS.join(", ")
            ))),
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// Bounding-box payload of a record.
///
/// On disk this is either a single 4-number array or an array of 4-number
/// arrays. A single selected box is always stored unwrapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Region {
    Single(BoundingBox),
    Multiple(Vec<BoundingBox>),
}

impl Region {
    /// Build a region from the boxes an annotator selected.
    ///
    /// No boxes yields `None`; exactly one box is stored unwrapped.
    pub fn from_boxes(mut boxes: Vec<BoundingBox>) -> Option<Region> {
        match boxes.len() {
            0 => None,
            1 => Some(Region::Single(boxes.remove(0))),
            _ => Some(Region::Multiple(boxes)),
        }
    }

    /// Collapse legacy shapes: `[[x,y,w,h]]` becomes `[x,y,w,h]`, `[]` becomes `None`.
    pub fn normalized(self) -> Option<Region> {
        match self {
            Region::Single(b) => Some(Region::Single(b)),
            Region::Multiple(boxes) => Region::from_boxes(boxes),
        }
    }

    /// Whether [`Region::normalized`] would change this value.
    pub fn needs_normalizing(&self) -> bool {
        matches!(self, Region::Multiple(boxes) if boxes.len() < 2)
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        match self {
            Region::Single(b) => std::slice::from_ref(b),
            Region::Multiple(boxes) => boxes,
        }
    }
}

// ---------------------------------------------------------------------------
// AnnotationRecord
// ---------------------------------------------------------------------------

/// One finished annotation, as stored in a partition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    #[serde(rename = "image_id")]
    pub item_id: DbId,

    #[serde(rename = "image_path", default)]
    pub path: String,

    #[serde(rename = "image_resolution", default)]
    pub resolution: String,

    /// Question text, including inline span markers and the choice block.
    #[serde(default)]
    pub question: String,

    #[serde(default)]
    pub response: String,

    #[serde(default)]
    pub rationale: String,

    /// Pre-translation question, kept for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_source: Option<String>,

    /// Pre-translation rationale, kept for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale_source: Option<String>,

    #[serde(rename = "view")]
    pub partition: Partition,

    #[serde(rename = "bbox", default)]
    pub region: Option<Region>,

    /// Stamped by the store on every successful put.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<Timestamp>,

    /// Fields written by other tools. Carried through rewrites untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// AnnotationDraft
// ---------------------------------------------------------------------------

/// An annotation as submitted by the annotator, before catalog enrichment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotationDraft {
    pub image_id: DbId,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub view: String,
    #[serde(default)]
    pub selected_bboxes: Vec<BoundingBox>,
    #[serde(default)]
    pub question_source: Option<String>,
    #[serde(default)]
    pub rationale_source: Option<String>,
    /// Worker whose sheet receives the mirrored row. No mirroring when absent.
    #[serde(default)]
    pub worker_id: Option<String>,
}

impl AnnotationDraft {
    /// Check required fields and parse the view.
    ///
    /// `question`, `response` and `view` must be non-blank; every missing
    /// field is reported at once.
    pub fn validate(&self) -> Result<Partition, CoreError> {
        let mut missing = Vec::new();
        if self.question.trim().is_empty() {
            missing.push("question");
        }
        if self.response.trim().is_empty() {
            missing.push("response");
        }
        if self.view.trim().is_empty() {
            missing.push("view");
        }
        if !missing.is_empty() {
            return Err(CoreError::MissingFields(missing));
        }

        for (i, b) in self.selected_bboxes.iter().enumerate() {
            validate_box(b).map_err(|msg| {
                CoreError::Validation(format!("selected_bboxes[{i}]: {msg}"))
            })?;
        }

        Partition::from_str(&self.view)
    }

    /// Validate and turn the draft into a record for `image`.
    pub fn into_record(self, image: &ImageInfo) -> Result<AnnotationRecord, CoreError> {
        let partition = self.validate()?;
        if image.id != self.image_id {
            return Err(CoreError::Internal(format!(
                "catalog returned image {} for draft {}",
                image.id, self.image_id
            )));
        }

        Ok(AnnotationRecord {
            item_id: self.image_id,
            path: image.relative_path(),
            resolution: image.resolution(),
            question: self.question,
            response: self.response,
            rationale: self.rationale,
            question_source: self.question_source.filter(|s| !s.trim().is_empty()),
            rationale_source: self.rationale_source.filter(|s| !s.trim().is_empty()),
            partition,
            region: Region::from_boxes(self.selected_bboxes),
            saved_at: None,
            extra: serde_json::Map::new(),
        })
    }
}

fn validate_box(b: &BoundingBox) -> Result<(), String> {
    if b.iter().any(|v| !v.is_finite()) {
        return Err("coordinates must be finite numbers".to_string());
    }
    if b[2] < 0.0 || b[3] < 0.0 {
        return Err("width and height must not be negative".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn image() -> ImageInfo {
        ImageInfo {
            id: 42,
            file_name: "000000000042.jpg".to_string(),
            width: 640,
            height: 480,
        }
    }

    fn draft() -> AnnotationDraft {
        AnnotationDraft {
            image_id: 42,
            question: "<attr>빨간</attr> 컵은 어디에 있나요?".to_string(),
            response: "(A)".to_string(),
            view: "exo".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn partition_parse_and_other() {
        assert_eq!(Partition::from_str(" EXO ").unwrap(), Partition::Exo);
        assert_eq!(Partition::from_str("ego").unwrap(), Partition::Ego);
        assert!(Partition::from_str("top").is_err());
        assert_eq!(Partition::Exo.other(), Partition::Ego);
        assert_eq!(Partition::Ego.other(), Partition::Exo);
    }

    #[test]
    fn single_box_is_stored_unwrapped() {
        let region = Region::from_boxes(vec![[1.0, 2.0, 3.0, 4.0]]).unwrap();
        assert_eq!(serde_json::to_value(&region).unwrap(), json!([1.0, 2.0, 3.0, 4.0]));
        assert!(Region::from_boxes(vec![]).is_none());
    }

    #[test]
    fn region_accepts_both_disk_shapes() {
        let single: Region = serde_json::from_value(json!([1, 2, 3, 4])).unwrap();
        assert_eq!(single, Region::Single([1.0, 2.0, 3.0, 4.0]));

        let many: Region = serde_json::from_value(json!([[1, 2, 3, 4], [5, 6, 7, 8]])).unwrap();
        assert_eq!(many.boxes().len(), 2);
    }

    #[test]
    fn legacy_single_element_list_is_normalized() {
        let legacy: Region = serde_json::from_value(json!([[1, 2, 3, 4]])).unwrap();
        assert!(legacy.needs_normalizing());
        assert_eq!(legacy.normalized(), Some(Region::Single([1.0, 2.0, 3.0, 4.0])));
    }

    #[test]
    fn record_uses_disk_field_names_and_keeps_unknown_fields() {
        let raw = json!({
            "image_id": 7,
            "image_path": "/7.jpg",
            "image_resolution": "10x20",
            "question": "q",
            "response": "r",
            "rationale": "",
            "view": "ego",
            "bbox": null,
            "reviewer": "kim"
        });
        let record: AnnotationRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.item_id, 7);
        assert_eq!(record.partition, Partition::Ego);
        assert!(record.region.is_none());
        assert_eq!(record.extra["reviewer"], "kim");

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["reviewer"], "kim");
        assert!(back["bbox"].is_null());
        assert!(back.get("question_source").is_none());
    }

    #[test]
    fn draft_reports_all_missing_fields() {
        let d = AnnotationDraft {
            image_id: 1,
            question: "   ".to_string(),
            ..Default::default()
        };
        assert_matches!(
            d.validate(),
            Err(CoreError::MissingFields(fields)) if fields == vec!["question", "response", "view"]
        );
    }

    #[test]
    fn draft_rejects_bad_boxes() {
        let mut d = draft();
        d.selected_bboxes = vec![[0.0, 0.0, -1.0, 5.0]];
        assert_matches!(d.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn draft_becomes_record_with_catalog_fields() {
        let mut d = draft();
        d.selected_bboxes = vec![[1.0, 2.0, 3.0, 4.0]];
        d.question_source = Some("  ".to_string());
        let record = d.into_record(&image()).unwrap();
        assert_eq!(record.path, "/000000000042.jpg");
        assert_eq!(record.resolution, "640x480");
        assert_eq!(record.partition, Partition::Exo);
        assert_eq!(record.region, Some(Region::Single([1.0, 2.0, 3.0, 4.0])));
        assert!(record.question_source.is_none());
    }
}
