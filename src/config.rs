//! Encoder settings resolution
//!
//! Settings start from a named preset, or from a JSON settings file when
//! one is given (missing fields take the built-in defaults), and individual
//! command-line overrides are applied last.

use crate::export::{EncodeSettings, OutputPreset};
use crate::utils::error::{AppError, AppResult};
use std::fs;
use std::path::Path;

/// Per-field overrides from the command line
#[derive(Debug, Clone, Default, clap::Args)]
pub struct SettingsOverrides {
    /// Video encoder passed to -c:v
    #[arg(long)]
    pub video_codec: Option<String>,

    /// Audio encoder passed to -c:a
    #[arg(long)]
    pub audio_codec: Option<String>,

    /// Video bitrate passed to -b:v (e.g. 4M)
    #[arg(long)]
    pub video_bitrate: Option<String>,

    /// Audio bitrate passed to -b:a (e.g. 128k)
    #[arg(long)]
    pub audio_bitrate: Option<String>,

    /// Drop the audio stream from every clip
    #[arg(long)]
    pub no_audio: bool,

    /// Container extension for intermediate segments
    #[arg(long)]
    pub container: Option<String>,
}

/// Build the settings for a run
pub fn resolve_settings(
    preset: OutputPreset,
    settings_file: Option<&Path>,
    overrides: &SettingsOverrides,
) -> AppResult<EncodeSettings> {
    let mut settings = match settings_file {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|e| {
                AppError::Config(format!("cannot read settings file {:?}: {}", path, e))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                AppError::Config(format!("invalid settings file {:?}: {}", path, e))
            })?
        }
        None => preset.settings(),
    };

    let replace = |field: &mut String, value: &Option<String>| {
        if let Some(value) = value {
            *field = value.clone();
        }
    };
    replace(&mut settings.video_codec, &overrides.video_codec);
    replace(&mut settings.audio_codec, &overrides.audio_codec);
    replace(&mut settings.video_bitrate, &overrides.video_bitrate);
    replace(&mut settings.audio_bitrate, &overrides.audio_bitrate);
    replace(&mut settings.container, &overrides.container);
    if overrides.no_audio {
        settings.include_audio = false;
    }

    for (name, value) in [
        ("video codec", &settings.video_codec),
        ("audio codec", &settings.audio_codec),
        ("video bitrate", &settings.video_bitrate),
        ("audio bitrate", &settings.audio_bitrate),
        ("container", &settings.container),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Config(format!("{} must not be empty", name)));
        }
    }

    tracing::debug!("Resolved encode settings: {:?}", settings);
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_preset_then_overrides() {
        let overrides = SettingsOverrides {
            video_codec: Some("libx265".to_string()),
            no_audio: true,
            ..SettingsOverrides::default()
        };
        let settings = resolve_settings(OutputPreset::YoutubeShorts, None, &overrides).unwrap();
        assert_eq!(settings.video_codec, "libx265");
        assert_eq!(settings.video_bitrate, "8M");
        assert!(!settings.include_audio);
    }

    #[test]
    fn test_settings_file_replaces_preset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"videoBitrate": "2M", "container": "mov"}"#).unwrap();

        let overrides = SettingsOverrides {
            audio_bitrate: Some("96k".to_string()),
            ..SettingsOverrides::default()
        };
        let settings = resolve_settings(OutputPreset::YoutubeShorts, Some(&path), &overrides).unwrap();
        assert_eq!(settings.video_bitrate, "2M");
        assert_eq!(settings.container, "mov");
        assert_eq!(settings.audio_bitrate, "96k");
        assert_eq!(settings.video_codec, "libx264");
    }

    #[test]
    fn test_rejects_empty_values() {
        let overrides = SettingsOverrides {
            video_bitrate: Some(" ".to_string()),
            ..SettingsOverrides::default()
        };
        let err = resolve_settings(OutputPreset::Douyin, None, &overrides).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_bad_settings_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "[1, 2]").unwrap();
        let err = resolve_settings(OutputPreset::Douyin, Some(&path), &SettingsOverrides::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
