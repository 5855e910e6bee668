//! Clip processing state
//!
//! Tracks each clip through `pending -> running -> done | failed` and
//! collects the per-run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Processing state of a single clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipState {
    Pending,
    Running,
    Done,
    Failed,
}

impl Default for ClipState {
    fn default() -> Self {
        Self::Pending
    }
}

/// Outcome record for one clip of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipReport {
    pub order: u32,
    pub filename: String,
    pub state: ClipState,
    /// Whether the filter-graph path was used
    pub speed_ramped: bool,
    /// Expected rendered duration in milliseconds
    pub expected_duration_ms: u64,
    /// Intermediate render (removed with the scratch directory)
    pub output: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ClipReport {
    pub fn new(order: u32, filename: &str, speed_ramped: bool, expected_duration_ms: u64) -> Self {
        Self {
            order,
            filename: filename.to_string(),
            state: ClipState::Pending,
            speed_ramped,
            expected_duration_ms,
            output: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self) {
        self.transition(ClipState::Running);
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self, output: PathBuf) {
        self.transition(ClipState::Done);
        self.output = Some(output);
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self) {
        self.transition(ClipState::Failed);
        self.finished_at = Some(Utc::now());
    }

    fn transition(&mut self, next: ClipState) {
        debug_assert!(
            matches!(
                (self.state, next),
                (ClipState::Pending, ClipState::Running)
                    | (ClipState::Running, ClipState::Done)
                    | (ClipState::Running, ClipState::Failed)
            ),
            "illegal clip transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(
            "Clip {} ({}): {:?} -> {:?}",
            self.order,
            self.filename,
            self.state,
            next
        );
        self.state = next;
    }
}

/// Summary of a run, complete or not
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub output: PathBuf,
    pub clips: Vec<ClipReport>,
    /// Whether concatenation had to fall back to re-encoding
    pub reencoded_concat: bool,
    /// Why the run stopped, when it did not complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Sum of each clip's post-speed duration (milliseconds)
    pub fn expected_duration_ms(&self) -> u64 {
        self.clips.iter().map(|c| c.expected_duration_ms).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.clips.iter().all(|c| c.state == ClipState::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_lifecycle() {
        let mut report = ClipReport::new(2, "b.mp4", true, 1500);
        assert_eq!(report.state, ClipState::Pending);

        report.start();
        assert_eq!(report.state, ClipState::Running);
        assert!(report.started_at.is_some());

        report.finish(PathBuf::from("segment_002.mp4"));
        assert_eq!(report.state, ClipState::Done);
        assert_eq!(report.output, Some(PathBuf::from("segment_002.mp4")));
    }

    #[test]
    fn test_report_failure() {
        let mut report = ClipReport::new(1, "a.mp4", false, 1000);
        report.start();
        report.fail();
        assert_eq!(report.state, ClipState::Failed);
        assert!(report.output.is_none());
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ClipState::Done).unwrap(), "\"done\"");
    }
}
