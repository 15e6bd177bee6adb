use std::path::Path;

use serde::Deserialize;

use crate::foundation::error::{FactoryError, FactoryResult};

/// On-disk script document. Segment entries stay untyped here so that one malformed entry fails
/// only that segment.
#[derive(Debug, Deserialize)]
struct ScriptDocument {
    segments: Vec<serde_json::Value>,
    #[serde(default)]
    bgm_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    text: String,
    #[serde(default)]
    image_path: Option<String>,
    #[serde(default)]
    image_paths: Option<Vec<String>>,
    #[serde(default)]
    id: Option<RawId>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

/// One narration unit: text plus the ordered image hints shown while it is spoken.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Position in the script; the only ordering key.
    pub index: usize,
    pub id: Option<String>,
    pub text: String,
    /// Image hints in display order. Empty means the segment will be dropped at plan time.
    pub images: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SegmentEntry {
    Valid(Segment),
    Invalid { index: usize, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Script {
    pub entries: Vec<SegmentEntry>,
    pub bgm_path: Option<String>,
}

impl Script {
    pub fn load(path: &Path) -> FactoryResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FactoryError::validation(format!("read script '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> FactoryResult<Self> {
        let doc: ScriptDocument =
            serde_json::from_str(text).map_err(|e| FactoryError::serde(format!("script: {e}")))?;
        if doc.segments.is_empty() {
            return Err(FactoryError::validation("script has no segments"));
        }
        let entries = doc
            .segments
            .into_iter()
            .enumerate()
            .map(|(index, value)| parse_segment(index, value))
            .collect();
        let bgm_path = doc.bgm_path.filter(|p| !p.trim().is_empty());
        Ok(Self { entries, bgm_path })
    }
}

fn parse_segment(index: usize, value: serde_json::Value) -> SegmentEntry {
    let raw: RawSegment = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            return SegmentEntry::Invalid {
                index,
                reason: e.to_string(),
            };
        }
    };
    if raw.text.trim().is_empty() {
        return SegmentEntry::Invalid {
            index,
            reason: "text is empty".to_owned(),
        };
    }

    let list: Vec<String> = raw
        .image_paths
        .unwrap_or_default()
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect();
    let images = if !list.is_empty() {
        list
    } else {
        raw.image_path
            .filter(|p| !p.trim().is_empty())
            .into_iter()
            .collect()
    };

    let id = raw.id.map(|id| match id {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    });

    SegmentEntry::Valid(Segment {
        index,
        id,
        text: raw.text.trim().to_owned(),
        images,
    })
}
