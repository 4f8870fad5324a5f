//! Core orchestration logic.
//!
//! This module contains:
//! - Pipeline: Bot filter, dedup and sink behind one detector callback
//! - Orchestrator: Detector lifecycle management

pub mod orchestrator;
pub mod pipeline;

// Re-export commonly used types
pub use orchestrator::{DetectorHandle, Orchestrator, Sources};
pub use pipeline::{EventPipeline, PipelineStats, Verdict};
