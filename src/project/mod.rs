//! Edit plan module
//!
//! Typed edit-plan records and plan file loading.

pub mod bundle;
pub mod schema;

pub use bundle::{read_plan, write_plan, PlanError};
pub use schema::{EditPlan, Phase2Edit, PlannedClip, PlannedSegment, TrimWindow};
