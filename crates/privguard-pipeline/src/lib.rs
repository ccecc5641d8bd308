//! # privguard-pipeline
//!
//! The five-stage analysis pipeline (scan → AI-enhance → compliance →
//! fix-suggest → report) and its orchestrator. Stages share one skeleton
//! (validate, compute, deterministic fallback, best-effort persistence,
//! metrics), so every stage is fail-open by construction: the caller always
//! receives a structurally complete result, and the only conditions visible
//! in the final status are an invalid request and the global deadline.

mod framework;
mod orchestrator;
pub mod stages;

pub use framework::{run_stage, Stage, StageContext};
pub use orchestrator::{Orchestrator, PipelineOutcome};
