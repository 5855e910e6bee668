//! FFmpeg command synthesis
//!
//! Turns clip edits into FFmpeg argument vectors: timestamp formatting,
//! the video and audio speed-ramp filter graphs, the per-clip encode
//! command and the concat commands. Nothing here spawns a process except
//! [`check_tool`] and [`probe_media`], which go through a [`CommandRunner`].

use crate::export::process::{CommandRunner, ToolCommand};
use crate::export::types::{ClipEdit, EncodeSettings, ExportError, SpeedSegment};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lowest multiplier a single `atempo` stage accepts
const ATEMPO_MIN: f64 = 0.5;
/// Highest multiplier a single `atempo` stage accepts
const ATEMPO_MAX: f64 = 2.0;

/// Format milliseconds as an FFmpeg timestamp `HH:MM:SS.mmm`
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

/// Split a target speed into `atempo` stage multipliers
///
/// Each stage lies within 0.5-2.0 and the stages multiply to `speed`.
/// Non-positive or non-finite speeds have no staging and yield no stages.
pub fn atempo_stages(speed: f64) -> Vec<f64> {
    let mut stages = Vec::new();
    if !speed.is_finite() || speed <= 0.0 {
        return stages;
    }
    let mut remaining = speed;

    if speed < ATEMPO_MIN {
        while remaining < ATEMPO_MIN {
            stages.push(ATEMPO_MIN);
            remaining *= 2.0;
        }
    } else if speed > ATEMPO_MAX {
        while remaining > ATEMPO_MAX {
            stages.push(ATEMPO_MAX);
            remaining /= 2.0;
        }
    }

    stages.push(remaining);
    stages
}

/// Build atempo filter chain for arbitrary speed changes
/// atempo only accepts 0.5-2.0, so chain multiple for larger changes
pub fn build_atempo_chain(speed: f64) -> String {
    let stages = atempo_stages(speed);
    let last = stages.len().saturating_sub(1);
    stages
        .iter()
        .enumerate()
        .map(|(i, stage)| {
            if i < last {
                format!("atempo={:.1}", stage)
            } else {
                format!("atempo={:.4}", stage)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Build the video half of a speed-ramp filter graph
///
/// The input is split once per segment; each copy is trimmed, its
/// timestamps reset to zero and scaled by `1/speed`, and the results are
/// concatenated into `[vout]`. Returns an empty string for no segments.
pub fn build_video_filter(segments: &[SpeedSegment]) -> String {
    let n = segments.len();
    if n == 0 {
        return String::new();
    }

    let mut filters = Vec::with_capacity(n + 2);

    let split_outputs: String = (0..n).map(|i| format!("[v{}]", i)).collect();
    filters.push(format!("[0:v]split={}{}", n, split_outputs));

    for (i, seg) in segments.iter().enumerate() {
        filters.push(format!(
            "[v{}]trim=start={:.3}:end={:.3},setpts={:.4}*(PTS-STARTPTS)[seg{}]",
            i,
            seg.start_sec(),
            seg.end_sec(),
            seg.pts_factor(),
            i
        ));
    }

    let concat_inputs: String = (0..n).map(|i| format!("[seg{}]", i)).collect();
    filters.push(format!("{}concat=n={}:v=1:a=0[vout]", concat_inputs, n));

    filters.join(";")
}

/// Build the audio half of a speed-ramp filter graph, ending in `[aout]`
pub fn build_audio_filter(segments: &[SpeedSegment]) -> String {
    let n = segments.len();
    if n == 0 {
        return String::new();
    }

    let mut filters = Vec::with_capacity(n + 2);

    let split_outputs: String = (0..n).map(|i| format!("[a{}]", i)).collect();
    filters.push(format!("[0:a]asplit={}{}", n, split_outputs));

    for (i, seg) in segments.iter().enumerate() {
        filters.push(format!(
            "[a{}]atrim=start={:.3}:end={:.3},asetpts=PTS-STARTPTS,{}[aseg{}]",
            i,
            seg.start_sec(),
            seg.end_sec(),
            build_atempo_chain(seg.speed()),
            i
        ));
    }

    let concat_inputs: String = (0..n).map(|i| format!("[aseg{}]", i)).collect();
    filters.push(format!("{}concat=n={}:v=0:a=1[aout]", concat_inputs, n));

    filters.join(";")
}

fn push_video_codec(cmd: ToolCommand, settings: &EncodeSettings) -> ToolCommand {
    cmd.args([
        "-c:v",
        settings.video_codec.as_str(),
        "-b:v",
        settings.video_bitrate.as_str(),
    ])
}

fn push_audio_codec(cmd: ToolCommand, settings: &EncodeSettings) -> ToolCommand {
    if settings.include_audio {
        cmd.args([
            "-c:a",
            settings.audio_codec.as_str(),
            "-b:a",
            settings.audio_bitrate.as_str(),
        ])
    } else {
        cmd.arg("-an")
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Plain trim at constant speed, used when no segment changes speed
pub fn trim_command(
    input: &Path,
    output: &Path,
    start_ms: u64,
    end_ms: u64,
    settings: &EncodeSettings,
) -> ToolCommand {
    let cmd = ToolCommand::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(path_arg(input))
        .arg("-ss")
        .arg(format_timestamp(start_ms))
        .arg("-to")
        .arg(format_timestamp(end_ms));
    let cmd = push_video_codec(cmd, settings);
    push_audio_codec(cmd, settings).arg(path_arg(output))
}

/// Segmented variable-speed render through `-filter_complex`
///
/// Filter outputs are unnamed to the muxer, so `[vout]`/`[aout]` are
/// always mapped explicitly.
pub fn speed_ramp_command(
    input: &Path,
    output: &Path,
    segments: &[SpeedSegment],
    settings: &EncodeSettings,
) -> ToolCommand {
    let video_filter = build_video_filter(segments);

    let (filter_complex, maps) = if settings.include_audio {
        let audio_filter = build_audio_filter(segments);
        (
            format!("{};{}", video_filter, audio_filter),
            vec!["-map", "[vout]", "-map", "[aout]"],
        )
    } else {
        (video_filter, vec!["-map", "[vout]"])
    };

    let cmd = ToolCommand::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(path_arg(input))
        .arg("-filter_complex")
        .arg(filter_complex)
        .args(maps);
    let cmd = push_video_codec(cmd, settings);
    push_audio_codec(cmd, settings).arg(path_arg(output))
}

/// Pick the simple trim or the filter-graph path for one clip
pub fn assemble_clip_command(
    clip: &ClipEdit,
    output: &Path,
    settings: &EncodeSettings,
) -> ToolCommand {
    if clip.has_speed_change() {
        speed_ramp_command(clip.source(), output, clip.segments(), settings)
    } else {
        let trim = clip.trim();
        trim_command(
            clip.source(),
            output,
            trim.start_ms(),
            trim.end_ms(),
            settings,
        )
    }
}

fn concat_base(manifest: &Path) -> ToolCommand {
    ToolCommand::new("ffmpeg")
        .args(["-y", "-f", "concat", "-safe", "0", "-i"])
        .arg(path_arg(manifest))
}

/// Lossless concat; fails when segment codec parameters differ
pub fn concat_copy_command(manifest: &Path, output: &Path) -> ToolCommand {
    concat_base(manifest)
        .args(["-c", "copy"])
        .arg(path_arg(output))
}

/// Re-encoding concat used after a stream copy failure
pub fn concat_reencode_command(
    manifest: &Path,
    output: &Path,
    settings: &EncodeSettings,
) -> ToolCommand {
    let cmd = push_video_codec(concat_base(manifest), settings);
    push_audio_codec(cmd, settings).arg(path_arg(output))
}

/// Render the concat demuxer manifest for the given files
///
/// Paths use forward slashes (FFmpeg accepts them on Windows too) and
/// single quotes are escaped as `'\''`.
pub fn concat_manifest(paths: &[std::path::PathBuf]) -> String {
    paths
        .iter()
        .map(|p| {
            let path = p.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
            format!("file '{}'\n", path.replace('\'', r"'\''"))
        })
        .collect()
}

/// Confirm a tool responds to `-version`, returning its first output line
pub fn check_tool<R: CommandRunner>(runner: &R, tool: &str) -> Result<String, ExportError> {
    let cmd = ToolCommand::new(tool).arg("-version");
    let output = runner.run(&cmd).map_err(|e| ExportError::ToolUnavailable {
        tool: tool.to_string(),
        detail: e.to_string(),
    })?;

    if !output.success {
        return Err(ExportError::ToolUnavailable {
            tool: tool.to_string(),
            detail: format!("`{} -version` exited with {:?}", tool, output.code),
        });
    }

    let version = output
        .stdout_lossy()
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    tracing::debug!("Found {}: {}", tool, version);
    Ok(version)
}

/// Container-level details reported by ffprobe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatInfo {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub format_name: String,
    /// Seconds, as the decimal string ffprobe emits
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
}

/// One stream reported by ffprobe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: u32,
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub codec_name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub r_frame_rate: Option<String>,
    pub sample_rate: Option<String>,
    pub duration: Option<String>,
}

/// Parsed `ffprobe -show_format -show_streams` output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub format: FormatInfo,
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    pub fn duration_ms(&self) -> Option<u64> {
        self.format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .map(|secs| (secs * 1000.0).round() as u64)
    }

    pub fn has_audio(&self) -> bool {
        self.streams.iter().any(|s| s.codec_type == "audio")
    }

    pub fn video_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.codec_type == "video")
    }
}

/// Probe a media file with ffprobe
pub fn probe_media<R: CommandRunner>(runner: &R, path: &Path) -> Result<MediaInfo, ExportError> {
    let cmd = ToolCommand::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path_arg(path));

    let output = runner
        .run(&cmd)
        .map_err(|e| ExportError::Probe(format!("Failed to run ffprobe: {}", e)))?;

    if !output.success {
        return Err(ExportError::Probe(format!(
            "ffprobe failed on {:?}: {}",
            path, output.stderr
        )));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| ExportError::Probe(format!("Unexpected ffprobe output for {:?}: {}", path, e)))
}
