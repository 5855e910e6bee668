//! Final concatenation of processed clips
//!
//! Stream copy through the concat demuxer first, one re-encode attempt
//! when that fails. The demuxer manifest lives in a temporary file that is
//! removed on every exit path.

use crate::export::ffmpeg::{concat_copy_command, concat_manifest, concat_reencode_command};
use crate::export::process::{CommandRunner, ToolCommand, ToolOutput};
use crate::export::types::{EncodeSettings, ExportError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// How the final file was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatMode {
    /// Single input copied directly
    Copied,
    StreamCopy,
    Reencoded,
}

fn run_logged<R: CommandRunner>(runner: &R, cmd: &ToolCommand) -> ToolOutput {
    tracing::debug!("Concat command: {}", cmd);
    match runner.run(cmd) {
        Ok(output) => output,
        Err(e) => ToolOutput {
            success: false,
            stderr: format!("failed to start {}: {}", cmd.program, e),
            ..ToolOutput::default()
        },
    }
}

/// Concatenate `clips` in the given order into `output`
pub fn concat_clips<R, F>(
    runner: &R,
    clips: &[PathBuf],
    output: &Path,
    settings: &EncodeSettings,
    progress: F,
) -> Result<ConcatMode, ExportError>
where
    R: CommandRunner,
    F: Fn(&str),
{
    match clips {
        [] => Err(ExportError::InvalidPlan(
            "nothing to concatenate".to_string(),
        )),
        [only] => {
            // The concat demuxer misbehaves with a single entry
            fs::copy(only, output)?;
            tracing::info!("Single clip copied to {:?}", output);
            Ok(ConcatMode::Copied)
        }
        _ => concat_many(runner, clips, output, settings, progress),
    }
}

fn concat_many<R, F>(
    runner: &R,
    clips: &[PathBuf],
    output: &Path,
    settings: &EncodeSettings,
    progress: F,
) -> Result<ConcatMode, ExportError>
where
    R: CommandRunner,
    F: Fn(&str),
{
    let absolute = clips
        .iter()
        .map(std::path::absolute)
        .collect::<Result<Vec<_>, _>>()?;

    let mut manifest = tempfile::Builder::new()
        .prefix("rampcut-concat-")
        .suffix(".txt")
        .tempfile()?;
    manifest.write_all(concat_manifest(&absolute).as_bytes())?;
    manifest.flush()?;

    tracing::info!(
        "Concatenating {} clips into {:?} (manifest {:?})",
        clips.len(),
        output,
        manifest.path()
    );

    let copy = run_logged(runner, &concat_copy_command(manifest.path(), output));
    if copy.success {
        return Ok(ConcatMode::StreamCopy);
    }

    tracing::warn!("Stream copy concat failed, retrying with re-encode");
    progress("Stream copy failed, re-encoding (this may take longer)...");

    let reencode = run_logged(
        runner,
        &concat_reencode_command(manifest.path(), output, settings),
    );
    if reencode.success {
        return Ok(ConcatMode::Reencoded);
    }

    // Never leave a partial file behind
    if output.exists() {
        if let Err(e) = fs::remove_file(output) {
            tracing::warn!("Failed to remove partial output {:?}: {}", output, e);
        }
    }

    Err(ExportError::ConcatFailure {
        copy_stderr: copy.stderr,
        reencode_stderr: reencode.stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::process::testing::ScriptedRunner;
    use std::cell::RefCell;
    use tempfile::tempdir;

    fn write_clips(dir: &Path, contents: &[&str]) -> Vec<PathBuf> {
        contents
            .iter()
            .enumerate()
            .map(|(i, content)| {
                let path = dir.join(format!("segment_{:03}.mp4", i + 1));
                fs::write(&path, content).unwrap();
                path
            })
            .collect()
    }

    fn manifest_of(runner: &ScriptedRunner) -> PathBuf {
        PathBuf::from(runner.calls()[0].value_of("-i").unwrap())
    }

    #[test]
    fn test_single_clip_is_copied() {
        let dir = tempdir().unwrap();
        let clips = write_clips(dir.path(), &["only"]);
        let output = dir.path().join("final.mp4");
        let runner = ScriptedRunner::new();

        let mode = concat_clips(&runner, &clips, &output, &EncodeSettings::default(), |_| {}).unwrap();

        assert_eq!(mode, ConcatMode::Copied);
        assert_eq!(runner.call_count(), 0);
        assert_eq!(fs::read_to_string(&output).unwrap(), "only");
    }

    #[test]
    fn test_stream_copy_preserves_order() {
        let dir = tempdir().unwrap();
        let clips = write_clips(dir.path(), &["A", "B", "C"]);
        let output = dir.path().join("final.mp4");
        let runner = ScriptedRunner::new();

        let mode = concat_clips(&runner, &clips, &output, &EncodeSettings::default(), |_| {}).unwrap();

        assert_eq!(mode, ConcatMode::StreamCopy);
        assert_eq!(runner.call_count(), 1);
        assert_eq!(fs::read_to_string(&output).unwrap(), "ABC");
        assert!(!manifest_of(&runner).exists());
    }

    #[test]
    fn test_falls_back_to_reencode() {
        let dir = tempdir().unwrap();
        let clips = write_clips(dir.path(), &["A", "B"]);
        let output = dir.path().join("final.mp4");
        let runner = ScriptedRunner::failing_when(|cmd| cmd.value_of("-c") == Some("copy"));
        let messages = RefCell::new(Vec::new());

        let mode = concat_clips(&runner, &clips, &output, &EncodeSettings::default(), |m| {
            messages.borrow_mut().push(m.to_string())
        })
        .unwrap();

        assert_eq!(mode, ConcatMode::Reencoded);
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].value_of("-c:v"), Some("libx264"));
        assert_eq!(calls[0].value_of("-i"), calls[1].value_of("-i"));
        assert_eq!(fs::read_to_string(&output).unwrap(), "AB");
        assert_eq!(messages.borrow().len(), 1);
        assert!(!manifest_of(&runner).exists());
    }

    #[test]
    fn test_double_failure_reports_both_stderrs() {
        let dir = tempdir().unwrap();
        let clips = write_clips(dir.path(), &["A", "B"]);
        let output = dir.path().join("final.mp4");
        let runner = ScriptedRunner::failing_when(|_| true);

        let err = concat_clips(&runner, &clips, &output, &EncodeSettings::default(), |_| {}).unwrap_err();

        match err {
            ExportError::ConcatFailure {
                copy_stderr,
                reencode_stderr,
            } => {
                assert!(copy_stderr.contains("copy"));
                assert!(reencode_stderr.contains("libx264"));
            }
            other => panic!("expected ConcatFailure, got {:?}", other),
        }
        assert!(!output.exists());
        assert!(!manifest_of(&runner).exists());
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let result = concat_clips(
            &runner,
            &[],
            &dir.path().join("final.mp4"),
            &EncodeSettings::default(),
            |_| {},
        );
        assert!(matches!(result, Err(ExportError::InvalidPlan(_))));
    }
}
