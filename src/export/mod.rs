//! Video export module
//!
//! This module compiles speed-ramped clip edits into FFmpeg commands,
//! runs them clip by clip and concatenates the results.

pub mod concat;
pub mod ffmpeg;
pub mod pipeline;
pub mod process;
pub mod state;
pub mod types;

pub use concat::{concat_clips, ConcatMode};
pub use ffmpeg::{check_tool, probe_media, MediaInfo};
pub use pipeline::ExportPipeline;
pub use process::{CommandRunner, SystemRunner, ToolCommand, ToolOutput};
pub use state::{ClipReport, ClipState, RunSummary};
pub use types::{
    ClipEdit, EncodeSettings, ExportError, OutputPreset, SegmentError, SpeedSegment, TimeRange,
};
