//! Export types and configuration
//!
//! This module defines the segment and clip model consumed by the command
//! compiler, the encoder settings, and the error taxonomy for a run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a segment or clip definition is rejected before any work starts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentError {
    #[error("start {start_ms}ms is negative")]
    NegativeStart { start_ms: i64 },

    #[error("end {end_ms}ms must be after start {start_ms}ms")]
    EmptyRange { start_ms: i64, end_ms: i64 },

    #[error("speed {0} must be a positive finite number no greater than 20000")]
    InvalidSpeed(f64),

    #[error("clip has no segments")]
    NoSegments,
}

/// A validated `[start_ms, end_ms)` window in source media time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    start_ms: u64,
    end_ms: u64,
}

impl TimeRange {
    pub fn new(start_ms: i64, end_ms: i64) -> Result<Self, SegmentError> {
        if start_ms < 0 {
            return Err(SegmentError::NegativeStart { start_ms });
        }
        if end_ms <= start_ms {
            return Err(SegmentError::EmptyRange { start_ms, end_ms });
        }
        Ok(Self {
            start_ms: start_ms as u64,
            end_ms: end_ms as u64,
        })
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn end_ms(&self) -> u64 {
        self.end_ms
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }

    fn contains(&self, other: &TimeRange) -> bool {
        other.start_ms >= self.start_ms && other.end_ms <= self.end_ms
    }
}

/// Smallest `setpts` factor that survives 4-decimal formatting
const MIN_PTS_FACTOR: f64 = 0.00005;
const RECOMMENDED_SPEED_MIN: f64 = 0.5;
const RECOMMENDED_SPEED_MAX: f64 = 5.0;

/// A contiguous range of one source clip played back at a fixed speed
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedSegment {
    range: TimeRange,
    /// Playback multiplier (2.0 = twice as fast, 0.5 = half speed)
    speed: f64,
}

impl SpeedSegment {
    pub fn new(start_ms: i64, end_ms: i64, speed: f64) -> Result<Self, SegmentError> {
        let range = TimeRange::new(start_ms, end_ms)?;
        // setpts is rendered with 4 decimals; a factor that rounds to zero
        // collapses every frame onto one timestamp
        if !speed.is_finite() || speed <= 0.0 || 1.0 / speed < MIN_PTS_FACTOR {
            return Err(SegmentError::InvalidSpeed(speed));
        }
        if !(RECOMMENDED_SPEED_MIN..=RECOMMENDED_SPEED_MAX).contains(&speed) {
            tracing::warn!(
                "speed {} for {}-{}ms is outside the recommended {}-{}x range",
                speed,
                start_ms,
                end_ms,
                RECOMMENDED_SPEED_MIN,
                RECOMMENDED_SPEED_MAX
            );
        }
        Ok(Self { range, speed })
    }

    /// A 1.0x segment covering a whole window
    pub fn unchanged(range: TimeRange) -> Self {
        Self { range, speed: 1.0 }
    }

    pub fn start_ms(&self) -> u64 {
        self.range.start_ms
    }

    pub fn end_ms(&self) -> u64 {
        self.range.end_ms
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// Start time in seconds for FFmpeg
    pub fn start_sec(&self) -> f64 {
        self.range.start_ms as f64 / 1000.0
    }

    /// End time in seconds for FFmpeg
    pub fn end_sec(&self) -> f64 {
        self.range.end_ms as f64 / 1000.0
    }

    /// Duration in the source media (seconds)
    pub fn duration_sec(&self) -> f64 {
        self.range.duration_ms() as f64 / 1000.0
    }

    /// Duration in the output after the speed change (seconds)
    pub fn output_duration_sec(&self) -> f64 {
        self.duration_sec() / self.speed
    }

    /// Multiplier applied to presentation timestamps by `setpts`
    pub fn pts_factor(&self) -> f64 {
        1.0 / self.speed
    }

    pub fn is_unchanged(&self) -> bool {
        self.speed == 1.0
    }
}

/// Edit instructions for one source video
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipEdit {
    filename: String,
    source: PathBuf,
    order: u32,
    trim: TimeRange,
    segments: Vec<SpeedSegment>,
}

impl ClipEdit {
    /// Build a clip, sorting segments by start time.
    ///
    /// An empty segment list is rejected; callers that only have a trim
    /// window pass a single [`SpeedSegment::unchanged`] segment.
    pub fn new(
        filename: impl Into<String>,
        source: PathBuf,
        order: u32,
        trim: TimeRange,
        mut segments: Vec<SpeedSegment>,
    ) -> Result<Self, SegmentError> {
        if segments.is_empty() {
            return Err(SegmentError::NoSegments);
        }
        segments.sort_by_key(|s| s.start_ms());

        let filename = filename.into();
        for pair in segments.windows(2) {
            if pair[1].start_ms() < pair[0].end_ms() {
                tracing::warn!(
                    "{}: segments {}-{}ms and {}-{}ms overlap",
                    filename,
                    pair[0].start_ms(),
                    pair[0].end_ms(),
                    pair[1].start_ms(),
                    pair[1].end_ms()
                );
            }
        }
        for seg in &segments {
            if !trim.contains(&seg.range()) {
                tracing::warn!(
                    "{}: segment {}-{}ms lies outside trim window {}-{}ms",
                    filename,
                    seg.start_ms(),
                    seg.end_ms(),
                    trim.start_ms(),
                    trim.end_ms()
                );
            }
        }

        Ok(Self {
            filename,
            source,
            order,
            trim,
            segments,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn source(&self) -> &std::path::Path {
        &self.source
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn trim(&self) -> TimeRange {
        self.trim
    }

    pub fn segments(&self) -> &[SpeedSegment] {
        &self.segments
    }

    /// Whether any segment plays at something other than 1.0x
    pub fn has_speed_change(&self) -> bool {
        self.segments.iter().any(|s| !s.is_unchanged())
    }

    /// Expected duration of this clip's rendered output (milliseconds)
    pub fn output_duration_ms(&self) -> u64 {
        if self.has_speed_change() {
            let secs: f64 = self.segments.iter().map(|s| s.output_duration_sec()).sum();
            (secs * 1000.0).round() as u64
        } else {
            self.trim.duration_ms()
        }
    }

    /// File name of the intermediate render, zero padded so lexical order
    /// matches numeric order
    pub fn segment_file_name(&self, extension: &str) -> String {
        format!("segment_{:03}.{}", self.order, extension)
    }
}

/// Named output presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputPreset {
    Douyin,
    #[serde(alias = "youtube_shorts")]
    #[value(alias = "youtube_shorts")]
    YoutubeShorts,
    #[serde(alias = "weixin_vertical")]
    #[value(alias = "weixin_vertical")]
    WeixinVertical,
}

impl OutputPreset {
    pub fn settings(&self) -> EncodeSettings {
        match self {
            OutputPreset::Douyin | OutputPreset::WeixinVertical => EncodeSettings::default(),
            OutputPreset::YoutubeShorts => EncodeSettings {
                video_bitrate: "8M".to_string(),
                audio_bitrate: "192k".to_string(),
                ..EncodeSettings::default()
            },
        }
    }
}

/// Codec configuration passed through to every FFmpeg invocation of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeSettings {
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_video_bitrate")]
    pub video_bitrate: String,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    #[serde(default = "default_include_audio")]
    pub include_audio: bool,
    /// Container extension for intermediate segment files
    #[serde(default = "default_container")]
    pub container: String,
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_video_bitrate() -> String {
    "4M".to_string()
}

fn default_audio_bitrate() -> String {
    "128k".to_string()
}

fn default_include_audio() -> bool {
    true
}

fn default_container() -> String {
    "mp4".to_string()
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            video_bitrate: default_video_bitrate(),
            audio_bitrate: default_audio_bitrate(),
            include_audio: default_include_audio(),
            container: default_container(),
        }
    }
}

/// Export errors
///
/// Every variant aborts the whole run; a skipped clip would break the
/// one-segment-per-clip ordering of the output.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid segment in clip {order} ({filename}): {source}")]
    InvalidSegment {
        order: u32,
        filename: String,
        #[source]
        source: SegmentError,
    },

    #[error("Invalid edit plan: {0}")]
    InvalidPlan(String),

    #[error("Source for clip {order} ({filename}) not found: {path:?}")]
    SourceMissing {
        order: u32,
        filename: String,
        path: PathBuf,
    },

    #[error("{tool} is not available ({detail}); install it and make sure it is on PATH")]
    ToolUnavailable { tool: String, detail: String },

    #[error("Encoding clip {order} ({filename}) failed: {stderr}")]
    EncodeFailure {
        order: u32,
        filename: String,
        stderr: String,
    },

    #[error("Concatenation failed.\nstream copy: {copy_stderr}\nre-encode: {reencode_stderr}")]
    ConcatFailure {
        copy_stderr: String,
        reencode_stderr: String,
    },

    #[error("Probe error: {0}")]
    Probe(String),
}
