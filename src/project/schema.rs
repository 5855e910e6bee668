//! Edit plan schema definitions
//!
//! These types match the `edit_plan_v2.json` records produced by the
//! analysis step. Only the fields the renderer needs are modelled; role,
//! narrative and quality metadata are ignored on load.

use crate::export::types::{ClipEdit, ExportError, SegmentError, SpeedSegment, TimeRange};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

// =============================================================================
// Plan Records
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrimWindow {
    #[serde(default)]
    pub start_ms: i64,
    pub end_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedSegment {
    pub start_ms: i64,
    pub end_ms: i64,
    #[serde(default = "default_speed")]
    pub speed: f64,
}

fn default_speed() -> f64 {
    1.0
}

/// Precision-cut results for one clip
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phase2Edit {
    #[serde(default)]
    pub trim: Option<TrimWindow>,
    #[serde(default)]
    pub speed_segments: Vec<PlannedSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedClip {
    pub order: u32,
    pub filename: String,
    #[serde(default)]
    pub phase2: Phase2Edit,
}

// =============================================================================
// Plan
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EditPlan {
    pub clip_sequence: Vec<PlannedClip>,
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl<'de> Deserialize<'de> for EditPlan {
    /// Accepts `{"clip_sequence": [...]}` or a bare array of clip records.
    /// A malformed record is reported with its index and `order`.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = match Value::deserialize(deserializer)? {
            Value::Array(records) => records,
            Value::Object(mut fields) => match fields.remove("clip_sequence") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(records)) => records,
                Some(other) => {
                    return Err(D::Error::custom(format!(
                        "clip_sequence must be an array, found {}",
                        value_kind(&other)
                    )))
                }
            },
            other => {
                return Err(D::Error::custom(format!(
                    "edit plan must be an object or an array, found {}",
                    value_kind(&other)
                )))
            }
        };

        let clip_sequence = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| {
                let order = record.get("order").and_then(Value::as_u64);
                PlannedClip::deserialize(record).map_err(|e| match order {
                    Some(order) => {
                        D::Error::custom(format!("clip_sequence[{}] (order {}): {}", i, order, e))
                    }
                    None => D::Error::custom(format!("clip_sequence[{}]: {}", i, e)),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { clip_sequence })
    }
}

impl EditPlan {
    /// Validate the plan and convert it into clips sorted by `order`
    ///
    /// Runs before any process is spawned; the first malformed record
    /// aborts the conversion.
    pub fn to_clips(&self, video_dir: &Path) -> Result<Vec<ClipEdit>, ExportError> {
        if self.clip_sequence.is_empty() {
            return Err(ExportError::InvalidPlan(
                "edit plan contains no clips".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut clips = Vec::with_capacity(self.clip_sequence.len());
        for planned in &self.clip_sequence {
            if !seen.insert(planned.order) {
                return Err(ExportError::InvalidPlan(format!(
                    "order {} is used by more than one clip",
                    planned.order
                )));
            }
            clips.push(planned.to_clip(video_dir)?);
        }

        clips.sort_by_key(|c| c.order());
        Ok(clips)
    }
}

impl PlannedClip {
    fn invalid(&self, source: SegmentError) -> ExportError {
        ExportError::InvalidSegment {
            order: self.order,
            filename: self.filename.clone(),
            source,
        }
    }

    /// Convert to a validated clip; missing segments become one 1.0x
    /// segment spanning the trim window
    pub fn to_clip(&self, video_dir: &Path) -> Result<ClipEdit, ExportError> {
        if self.filename.trim().is_empty() {
            return Err(ExportError::InvalidPlan(format!(
                "clip {} has no filename",
                self.order
            )));
        }

        let segments = self
            .phase2
            .speed_segments
            .iter()
            .map(|s| SpeedSegment::new(s.start_ms, s.end_ms, s.speed))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.invalid(e))?;

        let trim = match &self.phase2.trim {
            Some(trim) => TimeRange::new(trim.start_ms, trim.end_ms).map_err(|e| self.invalid(e))?,
            None => {
                let (Some(start), Some(end)) = (
                    segments.iter().map(|s| s.start_ms()).min(),
                    segments.iter().map(|s| s.end_ms()).max(),
                ) else {
                    return Err(ExportError::InvalidPlan(format!(
                        "clip {} ({}) has neither a trim window nor speed segments",
                        self.order, self.filename
                    )));
                };
                TimeRange::new(start as i64, end as i64).map_err(|e| self.invalid(e))?
            }
        };

        let segments = if segments.is_empty() {
            vec![SpeedSegment::unchanged(trim)]
        } else {
            segments
        };

        ClipEdit::new(
            self.filename.clone(),
            video_dir.join(&self.filename),
            self.order,
            trim,
            segments,
        )
        .map_err(|e| self.invalid(e))
    }
}

impl From<&ClipEdit> for PlannedClip {
    /// Normalized record with the trim window and every segment explicit
    fn from(clip: &ClipEdit) -> Self {
        let trim = clip.trim();
        Self {
            order: clip.order(),
            filename: clip.filename().to_string(),
            phase2: Phase2Edit {
                trim: Some(TrimWindow {
                    start_ms: trim.start_ms() as i64,
                    end_ms: trim.end_ms() as i64,
                }),
                speed_segments: clip
                    .segments()
                    .iter()
                    .map(|s| PlannedSegment {
                        start_ms: s.start_ms() as i64,
                        end_ms: s.end_ms() as i64,
                        speed: s.speed(),
                    })
                    .collect(),
            },
        }
    }
}

impl EditPlan {
    pub fn from_clips(clips: &[ClipEdit]) -> Self {
        Self {
            clip_sequence: clips.iter().map(PlannedClip::from).collect(),
        }
    }
}
