//! Edit plan file read/write operations

use super::schema::EditPlan;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Plan file errors
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required file: {0}")]
    MissingFile(String),
}

/// Read an edit plan from a JSON file
pub fn read_plan(plan_path: &Path) -> Result<EditPlan, PlanError> {
    if !plan_path.is_file() {
        return Err(PlanError::MissingFile(plan_path.display().to_string()));
    }

    let content = fs::read_to_string(plan_path)?;
    let plan: EditPlan = serde_json::from_str(&content)?;

    tracing::debug!(
        "Loaded edit plan with {} clips from {:?}",
        plan.clip_sequence.len(),
        plan_path
    );

    Ok(plan)
}

/// Write an edit plan as pretty-printed JSON
pub fn write_plan(plan: &EditPlan, plan_path: &Path) -> Result<(), PlanError> {
    if let Some(parent) = plan_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let content = serde_json::to_string_pretty(plan)?;
    fs::write(plan_path, content)?;

    tracing::debug!("Saved edit plan to {:?}", plan_path);

    Ok(())
}
