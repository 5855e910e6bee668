//! Export pipeline orchestration
//!
//! This module coordinates a full run: validation, per-clip rendering into
//! a scratch directory, and the final concatenation.

use crate::export::concat::{concat_clips, ConcatMode};
use crate::export::ffmpeg::{assemble_clip_command, check_tool};
use crate::export::process::CommandRunner;
use crate::export::state::{ClipReport, RunSummary};
use crate::export::types::{ClipEdit, EncodeSettings, ExportError};
use crate::project::schema::EditPlan;
use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of the per-run scratch directory
const SCRATCH_PREFIX: &str = ".rampcut-";

/// Export pipeline for rendering an edit plan into one video
pub struct ExportPipeline<R> {
    runner: R,
    settings: EncodeSettings,
    scratch_root: PathBuf,
}

impl<R: CommandRunner> ExportPipeline<R> {
    /// Create a new export pipeline
    ///
    /// Each run creates its own scratch directory under `scratch_root`.
    pub fn new(runner: R, settings: EncodeSettings, scratch_root: PathBuf) -> Self {
        Self {
            runner,
            settings,
            scratch_root,
        }
    }

    pub fn settings(&self) -> &EncodeSettings {
        &self.settings
    }

    /// Validate `plan` against `video_dir` and run it
    pub fn run_plan<F>(
        &self,
        plan: &EditPlan,
        video_dir: &Path,
        output: &Path,
        progress_callback: F,
    ) -> Result<RunSummary, ExportError>
    where
        F: Fn(&str),
    {
        let clips = plan.to_clips(video_dir)?;
        self.run(&clips, output, progress_callback)
    }

    /// Run the export pipeline
    ///
    /// Clips are rendered one at a time in ascending `order`. Any failure
    /// aborts the run; the scratch directory is removed either way.
    pub fn run<F>(
        &self,
        clips: &[ClipEdit],
        output: &Path,
        progress_callback: F,
    ) -> Result<RunSummary, ExportError>
    where
        F: Fn(&str),
    {
        let (summary, result) = self.run_recorded(clips, output, progress_callback);
        result.map(|()| summary)
    }

    /// Run the export pipeline, returning the summary even when the run fails
    ///
    /// On failure the summary lists finished clips as `done`, the clip that
    /// broke as `failed` and the rest as `pending`, and carries the error
    /// message.
    pub fn run_recorded<F>(
        &self,
        clips: &[ClipEdit],
        output: &Path,
        progress_callback: F,
    ) -> (RunSummary, Result<(), ExportError>)
    where
        F: Fn(&str),
    {
        let started_at = Utc::now();
        let mut reports = Vec::new();
        let result = self.execute_run(clips, output, &progress_callback, &mut reports);

        let summary = RunSummary {
            output: output.to_path_buf(),
            clips: reports,
            reencoded_concat: matches!(result, Ok(ConcatMode::Reencoded)),
            error: result.as_ref().err().map(ToString::to_string),
            started_at,
            finished_at: Utc::now(),
        };

        match result {
            Ok(_) => {
                progress_callback(&format!("Done! Output file: {}", output.display()));
                tracing::info!(
                    "Export complete: {} clips, expected duration {}ms",
                    summary.clips.len(),
                    summary.expected_duration_ms()
                );
                (summary, Ok(()))
            }
            Err(e) => (summary, Err(e)),
        }
    }

    fn execute_run<F>(
        &self,
        clips: &[ClipEdit],
        output: &Path,
        progress_callback: &F,
        reports: &mut Vec<ClipReport>,
    ) -> Result<ConcatMode, ExportError>
    where
        F: Fn(&str),
    {
        let clips = ordered(clips)?;
        reports.extend(clips.iter().map(|clip| {
            ClipReport::new(
                clip.order(),
                clip.filename(),
                clip.has_speed_change(),
                clip.output_duration_ms(),
            )
        }));

        for clip in &clips {
            if !clip.source().is_file() {
                return Err(ExportError::SourceMissing {
                    order: clip.order(),
                    filename: clip.filename().to_string(),
                    path: clip.source().to_path_buf(),
                });
            }
        }

        check_tool(&self.runner, "ffmpeg")?;

        fs::create_dir_all(&self.scratch_root)?;
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&self.scratch_root)?;

        tracing::info!(
            "Starting export of {} clips to {:?} (scratch {:?})",
            clips.len(),
            output,
            scratch.path()
        );

        let result = self.render(&clips, reports, scratch.path(), output, progress_callback);

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            tracing::warn!("Failed to remove scratch directory {:?}: {}", scratch_path, e);
        }

        result
    }

    fn render<F>(
        &self,
        clips: &[&ClipEdit],
        reports: &mut [ClipReport],
        scratch_dir: &Path,
        output: &Path,
        progress_callback: &F,
    ) -> Result<ConcatMode, ExportError>
    where
        F: Fn(&str),
    {
        let total = clips.len();
        let mut rendered = Vec::with_capacity(total);

        for (i, (clip, report)) in clips.iter().zip(reports.iter_mut()).enumerate() {
            progress_callback(&format!(
                "Processing clip [{}/{}]: {}",
                i + 1,
                total,
                clip.filename()
            ));

            report.start();
            match self.process_clip(clip, scratch_dir) {
                Ok(path) => {
                    rendered.push(path.clone());
                    report.finish(path);
                }
                Err(e) => {
                    report.fail();
                    tracing::error!("Clip {} ({}) failed", clip.order(), clip.filename());
                    return Err(e);
                }
            }
        }

        progress_callback("Concatenating final video...");
        concat_clips(
            &self.runner,
            &rendered,
            output,
            &self.settings,
            progress_callback,
        )
    }

    /// Render one clip into the scratch directory (single attempt)
    pub fn process_clip(&self, clip: &ClipEdit, scratch_dir: &Path) -> Result<PathBuf, ExportError> {
        let output = scratch_dir.join(clip.segment_file_name(&self.settings.container));
        let cmd = assemble_clip_command(clip, &output, &self.settings);

        tracing::debug!("Clip {} command: {}", clip.order(), cmd);

        let encode_failure = |stderr: String| ExportError::EncodeFailure {
            order: clip.order(),
            filename: clip.filename().to_string(),
            stderr,
        };

        let result = self
            .runner
            .run(&cmd)
            .map_err(|e| encode_failure(format!("failed to start ffmpeg: {}", e)))?;

        if !result.success {
            return Err(encode_failure(result.stderr));
        }

        Ok(output)
    }
}

/// Sort clips by `order`, rejecting empty input and duplicate orders
fn ordered(clips: &[ClipEdit]) -> Result<Vec<&ClipEdit>, ExportError> {
    if clips.is_empty() {
        return Err(ExportError::InvalidPlan(
            "edit plan contains no clips".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = clips.iter().find(|c| !seen.insert(c.order())) {
        return Err(ExportError::InvalidPlan(format!(
            "order {} is used by more than one clip",
            dup.order()
        )));
    }

    let mut sorted: Vec<&ClipEdit> = clips.iter().collect();
    sorted.sort_by_key(|c| c.order());
    Ok(sorted)
}
