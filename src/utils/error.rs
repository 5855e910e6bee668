//! Error types and handling
//!
//! Common error types used across the application.

use crate::export::ExportError;
use crate::project::PlanError;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Stable error code for the CLI transcript
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Plan(_) => "PLAN_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Export(e) => match e {
                ExportError::InvalidSegment { .. }
                | ExportError::InvalidPlan(_)
                | ExportError::SourceMissing { .. } => "INVALID_PLAN",
                ExportError::ToolUnavailable { .. } => "TOOL_UNAVAILABLE",
                ExportError::EncodeFailure { .. } => "ENCODE_FAILURE",
                ExportError::ConcatFailure { .. } => "CONCAT_FAILURE",
                ExportError::Probe(_) => "PROBE_ERROR",
                ExportError::Io(_) => "IO_ERROR",
            },
        }
    }

    /// Process exit code: 2 for bad input, 3 for missing tools, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        match self.code() {
            "PLAN_ERROR" | "CONFIG_ERROR" | "INVALID_PLAN" => 2,
            "TOOL_UNAVAILABLE" => 3,
            _ => 1,
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_distinguish_stages() {
        let encode: AppError = ExportError::EncodeFailure {
            order: 2,
            filename: "b.mp4".to_string(),
            stderr: "boom".to_string(),
        }
        .into();
        assert_eq!(encode.code(), "ENCODE_FAILURE");
        assert_eq!(encode.exit_code(), 1);
        assert!(encode.to_string().contains("clip 2 (b.mp4)"));

        let tool: AppError = ExportError::ToolUnavailable {
            tool: "ffmpeg".to_string(),
            detail: "not found".to_string(),
        }
        .into();
        assert_eq!(tool.exit_code(), 3);

        let plan: AppError = PlanError::MissingFile("plan.json".to_string()).into();
        assert_eq!(plan.exit_code(), 2);
    }
}
