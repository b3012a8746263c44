//! Pipeline module.
//!
//! This module provides the ingestion orchestrator and progress reporting.

mod ingestion;
pub mod progress;

pub use ingestion::{
    DataIngestionPipeline, DataIngestionPipelineBuilder, LABEL_MAPPINGS_FILE, PROCESSED_DIR,
    SPLIT_DIR, SPLIT_INDICES_FILE,
};
pub use progress::{ClosureProgressReporter, IngestionStage, ProgressReporter, ProgressUpdate};
