//! System-related command handlers
//!
//! Tool availability checks and media introspection.

use crate::export::{check_tool, probe_media, CommandRunner};
use crate::utils::error::AppResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tools every run depends on
pub const REQUIRED_TOOLS: [&str; 2] = ["ffmpeg", "ffprobe"];

/// Availability of one external tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatus {
    pub name: String,
    /// First line of `-version` output when the tool responds
    pub version: Option<String>,
    pub error: Option<String>,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        self.version.is_some()
    }
}

/// System information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub tools: Vec<ToolStatus>,
}

impl SystemInfo {
    pub fn all_tools_available(&self) -> bool {
        self.tools.iter().all(ToolStatus::is_available)
    }
}

/// Report the platform and whether ffmpeg and ffprobe respond
pub fn check<R: CommandRunner>(runner: &R) -> SystemInfo {
    let tools = REQUIRED_TOOLS
        .iter()
        .map(|tool| match check_tool(runner, tool) {
            Ok(version) => ToolStatus {
                name: tool.to_string(),
                version: Some(version),
                error: None,
            },
            Err(e) => {
                tracing::warn!("{}", e);
                ToolStatus {
                    name: tool.to_string(),
                    version: None,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();

    SystemInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        tools,
    }
}

/// Condensed view of a probed file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSummary {
    pub format: String,
    pub duration_ms: Option<u64>,
    pub has_audio: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<String>,
    pub streams: Vec<String>,
}

/// Probe a media file and summarize its streams
pub fn probe<R: CommandRunner>(runner: &R, path: &Path) -> AppResult<ProbeSummary> {
    let info = probe_media(runner, path)?;
    let video = info.video_stream();

    Ok(ProbeSummary {
        format: info.format.format_name.clone(),
        duration_ms: info.duration_ms(),
        has_audio: info.has_audio(),
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
        frame_rate: video.and_then(|v| v.r_frame_rate.clone()),
        streams: info
            .streams
            .iter()
            .map(|s| format!("#{} {} ({})", s.index, s.codec_type, s.codec_name))
            .collect(),
    })
}
