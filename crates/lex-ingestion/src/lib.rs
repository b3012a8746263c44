//! Data Ingestion Pipeline Library
//!
//! Prepares annotated single-cell style datasets for model training.
//!
//! # Overview
//!
//! The [`DataIngestionPipeline`] runs three phases over an experiment
//! directory, threading a [`DataConfig`] through them so that each phase
//! finds the outputs of the previous one:
//!
//! - **Split**: assign every record to `train`, `val` or `test` with a
//!   pluggable [`Splitter`] and write the partitions in chunks
//! - **Preprocess**: an ordered chain of [`Preprocessor`]s, each fitted on
//!   `train` only and applied to all three partitions
//! - **Label mapping**: dense, sorted `id <-> label` mappings for every
//!   metadata column
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lex_ingestion::{DataConfig, DataIngestionPipeline, StrategyConfig};
//!
//! let config = DataConfig::builder()
//!     .full_datapath("data/pbmc")
//!     .target("cell_type")
//!     .sample_chunksize(10_000)
//!     .preprocess(StrategyConfig::new("SampleNorm").with_param("scaling_factor", 1e4))
//!     .preprocess(StrategyConfig::new("StandardScaler"))
//!     .build()?;
//!
//! let mut pipeline = DataIngestionPipeline::builder()
//!     .config(config)
//!     .dirpath("experiments/pbmc")
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?;
//!
//! let updated = pipeline.run()?;
//! updated.to_path("experiments/pbmc/config.yaml")?;
//! ```
//!
//! # Strategies
//!
//! Splitters and preprocessors are selected by name through a
//! [`StrategyRegistry`]. Built-ins:
//!
//! - [`SimpleSplitter`], [`GroupSplitter`]
//! - [`StandardScaler`], [`SampleNorm`]
//!
//! Custom strategies are registered on a registry and passed to
//! [`DataIngestionPipeline::builder`].
//!
//! # Artifacts
//!
//! ```text
//! <dirpath>/train_val_test_split.json
//! <dirpath>/train_val_test_split/{train,val,test}/<chunk>/
//! <dirpath>/processed_data/<step>_<name>/{train,val,test}/<chunk>/
//! <dirpath>/label_mappings.json
//! ```
//!
//! Each preprocessing step writes to its own directory under
//! `processed_data`, numbered by its position in the chain, and reads the
//! output of the step before it. The last step's directory becomes
//! `final_datapaths`.

pub mod config;
pub mod error;
pub mod io;
pub mod labels;
pub mod pipeline;
pub mod preprocess;
pub mod registry;
pub mod split;
pub mod utils;

// Re-exports for convenient access
pub use config::{DEFAULT_SPLITTER, DataConfig, DataConfigBuilder, StrategyConfig, TrainValTestConfig};
pub use error::{IngestionError, Result as IngestionResult, ResultExt};
pub use io::{Dataset, DatasetReader, read_data, write_data};
pub use labels::{ColumnLabelMapping, LabelMappings, build_label_mappings};
pub use pipeline::{
    ClosureProgressReporter, DataIngestionPipeline, DataIngestionPipelineBuilder, IngestionStage,
    ProgressReporter, ProgressUpdate,
};
pub use preprocess::{Preprocessor, SampleNorm, StandardScaler};
pub use registry::StrategyRegistry;
pub use split::{GroupSplitter, Partition, SimpleSplitter, SplitIndices, Splitter};
