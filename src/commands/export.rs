//! Export command handlers
//!
//! `execute` renders an edit plan into one video; `dry_run` prints what
//! would be run without spawning anything.

use crate::export::ffmpeg::assemble_clip_command;
use crate::export::{probe_media, CommandRunner, EncodeSettings, ExportPipeline, RunSummary};
use crate::project::{read_plan, write_plan, EditPlan};
use crate::utils::error::{AppError, AppResult};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Output durations further than this from the plan are reported
const DURATION_TOLERANCE: f64 = 0.05;

/// Inputs for one `execute` run
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub video_dir: PathBuf,
    pub plan_path: PathBuf,
    /// Resolved against `video_dir` unless absolute
    pub output_name: String,
    pub settings: EncodeSettings,
    pub scratch_dir: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub verify: bool,
}

impl ExecuteRequest {
    pub fn output_path(&self) -> PathBuf {
        self.video_dir.join(&self.output_name)
    }
}

fn check_inputs(video_dir: &Path, plan_path: &Path) -> AppResult<EditPlan> {
    if !video_dir.is_dir() {
        return Err(AppError::Config(format!(
            "video directory {:?} does not exist",
            video_dir
        )));
    }
    Ok(read_plan(plan_path)?)
}

/// Run an edit plan to completion
///
/// With `report_path` set, the run summary is written whether or not the
/// run succeeds.
pub fn execute<R, F>(runner: &R, request: &ExecuteRequest, progress: F) -> AppResult<RunSummary>
where
    R: CommandRunner,
    F: Fn(&str),
{
    let plan = check_inputs(&request.video_dir, &request.plan_path)?;
    let output = request.output_path();
    let scratch_root = request
        .scratch_dir
        .clone()
        .unwrap_or_else(|| request.video_dir.clone());

    tracing::info!("Executing plan {:?} into {:?}", request.plan_path, output);

    let clips = plan.to_clips(&request.video_dir)?;
    let pipeline = ExportPipeline::new(runner, request.settings.clone(), scratch_root);
    let (summary, result) = pipeline.run_recorded(&clips, &output, progress);

    // Failed runs are reported too; the run error takes precedence
    if let Some(report_path) = &request.report_path {
        let written = write_report(&summary, report_path);
        result?;
        written?;
    } else {
        result?;
    }

    if request.verify {
        verify_output(runner, &summary)?;
    }

    Ok(summary)
}

fn write_report(summary: &RunSummary, path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(summary)?)?;
    tracing::info!("Run report written to {:?}", path);
    Ok(())
}

/// Result of comparing the rendered file against the plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub expected_ms: u64,
    pub actual_ms: Option<u64>,
    pub within_tolerance: bool,
}

/// Probe the output and compare its duration with the expected total
pub fn verify_output<R: CommandRunner>(runner: &R, summary: &RunSummary) -> AppResult<Verification> {
    let expected_ms = summary.expected_duration_ms();
    let info = probe_media(runner, &summary.output)?;
    let actual_ms = info.duration_ms();

    let within_tolerance = match actual_ms {
        Some(actual) if expected_ms > 0 => {
            let drift = (actual as f64 - expected_ms as f64).abs() / expected_ms as f64;
            drift <= DURATION_TOLERANCE
        }
        Some(_) => true,
        None => false,
    };

    if within_tolerance {
        tracing::info!(
            "Output duration {:?}ms matches expected {}ms",
            actual_ms,
            expected_ms
        );
    } else {
        tracing::warn!(
            "Output duration {:?}ms differs from expected {}ms by more than {:.0}%",
            actual_ms,
            expected_ms,
            DURATION_TOLERANCE * 100.0
        );
    }

    Ok(Verification {
        expected_ms,
        actual_ms,
        within_tolerance,
    })
}

/// One clip as it would be rendered
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedRender {
    pub order: u32,
    pub filename: String,
    pub speed_ramped: bool,
    pub expected_duration_ms: u64,
    pub command: String,
}

/// Everything a dry run reports
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRun {
    pub clips: Vec<PlannedRender>,
    pub expected_duration_ms: u64,
}

/// Validate a plan and assemble its commands without running them
///
/// When `save_path` is given the normalized plan (explicit trim windows
/// and segments, sorted by order) is written there.
pub fn dry_run(
    video_dir: &Path,
    plan_path: &Path,
    settings: &EncodeSettings,
    save_path: Option<&Path>,
) -> AppResult<DryRun> {
    let plan = check_inputs(video_dir, plan_path)?;
    let clips = plan.to_clips(video_dir)?;

    let renders: Vec<PlannedRender> = clips
        .iter()
        .map(|clip| {
            let placeholder = PathBuf::from(clip.segment_file_name(&settings.container));
            PlannedRender {
                order: clip.order(),
                filename: clip.filename().to_string(),
                speed_ramped: clip.has_speed_change(),
                expected_duration_ms: clip.output_duration_ms(),
                command: assemble_clip_command(clip, &placeholder, settings).to_string(),
            }
        })
        .collect();

    if let Some(save_path) = save_path {
        write_plan(&EditPlan::from_clips(&clips), save_path)?;
        tracing::info!("Normalized plan written to {:?}", save_path);
    }

    Ok(DryRun {
        expected_duration_ms: renders.iter().map(|r| r.expected_duration_ms).sum(),
        clips: renders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::process::testing::ScriptedRunner;
    use crate::export::{ExportError, ToolCommand, ToolOutput};
    use crate::project::PlanError;
    use std::cell::RefCell;
    use std::io;
    use tempfile::tempdir;

    const PLAN: &str = r#"{"clip_sequence": [
        {"order": 2, "filename": "b.mp4", "phase2": {"speed_segments": [
            {"start_ms": 0, "end_ms": 1000, "speed": 1.0},
            {"start_ms": 1000, "end_ms": 3000, "speed": 2.0}
        ]}},
        {"order": 1, "filename": "a.mp4", "phase2": {"trim": {"start_ms": 0, "end_ms": 1500}}}
    ]}"#;

    fn write_inputs(dir: &Path) -> PathBuf {
        fs::write(dir.join("a.mp4"), b"A").unwrap();
        fs::write(dir.join("b.mp4"), b"B").unwrap();
        let plan = dir.join("edit_plan_v2.json");
        fs::write(&plan, PLAN).unwrap();
        plan
    }

    fn request(video_dir: &Path, plan_path: PathBuf) -> ExecuteRequest {
        ExecuteRequest {
            video_dir: video_dir.to_path_buf(),
            plan_path,
            output_name: "output.mp4".to_string(),
            settings: EncodeSettings::default(),
            scratch_dir: None,
            report_path: None,
            verify: false,
        }
    }

    #[test]
    fn test_execute_writes_output_and_report() {
        let dir = tempdir().unwrap();
        let plan = write_inputs(dir.path());
        let mut req = request(dir.path(), plan);
        req.report_path = Some(dir.path().join("reports/run.json"));

        let lines = RefCell::new(Vec::new());
        let runner = ScriptedRunner::new();
        let summary = execute(&runner, &req, |line| lines.borrow_mut().push(line.to_string()))
            .unwrap();

        assert_eq!(fs::read(dir.path().join("output.mp4")).unwrap(), b"AB");
        assert_eq!(summary.expected_duration_ms(), 1500 + 2000);

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("reports/run.json")).unwrap())
                .unwrap();
        assert_eq!(report["clips"].as_array().unwrap().len(), 2);
        assert_eq!(report["clips"][0]["filename"], "a.mp4");

        let lines = lines.into_inner();
        assert!(lines[0].starts_with("Processing clip [1/2]: a.mp4"));
        assert!(lines.last().unwrap().starts_with("Done! Output file:"));
    }

    #[test]
    fn test_failed_execute_still_writes_report() {
        let dir = tempdir().unwrap();
        let plan = write_inputs(dir.path());
        let mut req = request(dir.path(), plan);
        let report_path = dir.path().join("run.json");
        req.report_path = Some(report_path.clone());

        let runner = ScriptedRunner::failing_when(|cmd| {
            cmd.value_of("-i").is_some_and(|input| input.ends_with("b.mp4"))
        });
        let err = execute(&runner, &req, |_| {}).unwrap_err();
        assert!(matches!(
            err,
            AppError::Export(ExportError::EncodeFailure { order: 2, .. })
        ));

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(report["clips"][0]["state"], "done");
        assert_eq!(report["clips"][1]["state"], "failed");
        assert_eq!(report["clips"][1]["filename"], "b.mp4");
        assert!(report["error"].as_str().unwrap().contains("b.mp4"));
        assert!(!dir.path().join("output.mp4").exists());
    }

    #[test]
    fn test_missing_video_dir_is_reported_first() {
        let dir = tempdir().unwrap();
        let req = request(&dir.path().join("nope"), dir.path().join("plan.json"));
        let runner = ScriptedRunner::new();

        let err = execute(&runner, &req, |_| {}).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn test_missing_plan_is_reported_first() {
        let dir = tempdir().unwrap();
        let req = request(dir.path(), dir.path().join("plan.json"));
        let runner = ScriptedRunner::new();

        let err = execute(&runner, &req, |_| {}).unwrap_err();
        assert!(matches!(err, AppError::Plan(PlanError::MissingFile(_))));
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn test_missing_source_spawns_nothing() {
        let dir = tempdir().unwrap();
        let plan = write_inputs(dir.path());
        fs::remove_file(dir.path().join("b.mp4")).unwrap();
        let runner = ScriptedRunner::new();

        let err = execute(&runner, &request(dir.path(), plan), |_| {}).unwrap_err();
        assert!(matches!(
            err,
            AppError::Export(ExportError::SourceMissing { order: 2, .. })
        ));
        assert_eq!(runner.call_count(), 0);
    }

    /// Answers ffprobe with a fixed duration
    struct ProbeRunner(&'static str);

    impl CommandRunner for ProbeRunner {
        fn run(&self, command: &ToolCommand) -> io::Result<ToolOutput> {
            assert_eq!(command.program, "ffprobe");
            Ok(ToolOutput {
                success: true,
                code: Some(0),
                stdout: format!(r#"{{"format": {{"duration": "{}"}}, "streams": []}}"#, self.0)
                    .into_bytes(),
                stderr: String::new(),
            })
        }
    }

    fn summary_with_clip(expected_ms: u64) -> RunSummary {
        let now = chrono::Utc::now();
        RunSummary {
            output: PathBuf::from("output.mp4"),
            clips: vec![crate::export::ClipReport::new(1, "a.mp4", true, expected_ms)],
            reencoded_concat: false,
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_verify_within_tolerance() {
        let check = verify_output(&ProbeRunner("10.300000"), &summary_with_clip(10_000)).unwrap();
        assert_eq!(check.actual_ms, Some(10_300));
        assert!(check.within_tolerance);
    }

    #[test]
    fn test_verify_flags_drift() {
        let check = verify_output(&ProbeRunner("12.0"), &summary_with_clip(10_000)).unwrap();
        assert!(!check.within_tolerance);
    }

    #[test]
    fn test_dry_run_lists_commands_in_order() {
        let dir = tempdir().unwrap();
        let plan = write_inputs(dir.path());
        let saved = dir.path().join("normalized.json");

        let dry = dry_run(dir.path(), &plan, &EncodeSettings::default(), Some(&saved)).unwrap();

        assert_eq!(dry.clips.len(), 2);
        assert_eq!(dry.clips[0].filename, "a.mp4");
        assert!(!dry.clips[0].speed_ramped);
        assert!(dry.clips[0].command.contains("-ss 00:00:00.000 -to 00:00:01.500"));
        assert!(dry.clips[0].command.ends_with("segment_001.mp4"));
        assert!(dry.clips[1].speed_ramped);
        assert!(dry.clips[1].command.contains("-filter_complex"));
        assert_eq!(dry.expected_duration_ms, 3500);

        let normalized = read_plan(&saved).unwrap();
        assert_eq!(normalized.clip_sequence[0].order, 1);
        assert_eq!(normalized.clip_sequence[1].phase2.speed_segments.len(), 2);
    }
}
