//! The data ingestion orchestrator.
//!
//! [`DataIngestionPipeline`] sequences three phases over an experiment
//! directory:
//!
//! 1. **Split** the full dataset into `train`/`val`/`test`
//! 2. **Preprocess** the partitions with an ordered chain of transforms,
//!    each fitted on `train` only
//! 3. **Map labels** of every metadata column to dense integer ids
//!
//! Every phase reads the paths produced by the previous one from the
//! evolving [`DataConfig`] and records its own outputs there. A phase works
//! on a copy of the config which is committed only when the phase succeeds,
//! so a failed phase leaves the config as it was.

use crate::config::{DataConfig, StrategyConfig};
use crate::error::{IngestionError, Result, ResultExt};
use crate::io::{DatasetReader, read_data, read_obs, write_data};
use crate::labels::{LabelMappings, build_label_mappings};
use crate::pipeline::progress::{
    ClosureProgressReporter, IngestionStage, ProgressReporter, ProgressUpdate,
};
use crate::registry::StrategyRegistry;
use crate::split::Partition;
use crate::utils::normalize_label_dtypes;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Split indices artifact, relative to the experiment directory.
pub const SPLIT_INDICES_FILE: &str = "train_val_test_split.json";

/// Directory receiving the split partitions.
pub const SPLIT_DIR: &str = "train_val_test_split";

/// Directory receiving the output of each preprocessing step.
pub const PROCESSED_DIR: &str = "processed_data";

/// Label mappings artifact, relative to the experiment directory.
pub const LABEL_MAPPINGS_FILE: &str = "label_mappings.json";

/// Orchestrates splitting, preprocessing and label mapping.
///
/// # Example
///
/// ```rust,ignore
/// use lex_ingestion::{DataConfig, DataIngestionPipeline};
///
/// let config = DataConfig::from_path("experiment.yaml")?;
/// let mut pipeline = DataIngestionPipeline::new(&config, "experiments/pbmc");
///
/// pipeline.generate_train_val_test_split()?;
/// pipeline.preprocess_data()?;
/// pipeline.generate_mappings()?;
///
/// pipeline.get_updated_config().to_path("experiments/pbmc/config.yaml")?;
/// ```
pub struct DataIngestionPipeline {
    data_config: DataConfig,
    dirpath: PathBuf,
    registry: StrategyRegistry,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

// The pipeline may be handed to a worker thread.
static_assertions::assert_impl_all!(DataIngestionPipeline: Send);

impl DataIngestionPipeline {
    /// Create a pipeline over a copy of `data_config`, writing artifacts
    /// into `dirpath`, with the built-in strategies.
    pub fn new(data_config: &DataConfig, dirpath: impl Into<PathBuf>) -> Self {
        Self::from_parts(data_config.clone(), dirpath.into(), StrategyRegistry::default(), None)
    }

    /// Create a new pipeline builder.
    pub fn builder() -> DataIngestionPipelineBuilder {
        DataIngestionPipelineBuilder::default()
    }

    fn from_parts(
        data_config: DataConfig,
        dirpath: PathBuf,
        registry: StrategyRegistry,
        progress_reporter: Option<Arc<dyn ProgressReporter>>,
    ) -> Self {
        if data_config.target().is_none() {
            warn!("`target` is not given; splits will not be checked against the target column");
        }
        if data_config.sample_chunksize().is_none() {
            warn!("`sample_chunksize` is not given; whole partitions will be loaded into memory");
        }

        Self {
            data_config,
            dirpath,
            registry,
            progress_reporter,
        }
    }

    /// Experiment directory receiving all artifacts.
    pub fn dirpath(&self) -> &Path {
        &self.dirpath
    }

    /// The configuration, including every field derived so far.
    pub fn get_updated_config(&self) -> &DataConfig {
        &self.data_config
    }

    /// Run all three phases in order.
    pub fn run(&mut self) -> Result<&DataConfig> {
        let start_time = Instant::now();
        match self.run_internal() {
            Ok(()) => {
                info!(
                    "Data ingestion completed in {:.2}s",
                    start_time.elapsed().as_secs_f64()
                );
                self.report_progress(ProgressUpdate::complete("Data ingestion completed"));
                Ok(&self.data_config)
            }
            Err(e) => {
                error!("Data ingestion failed: {}", e);
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                Err(e)
            }
        }
    }

    fn run_internal(&mut self) -> Result<()> {
        self.report_progress(ProgressUpdate::new(
            IngestionStage::Initializing,
            0.0,
            "Starting data ingestion...",
        ));
        self.generate_train_val_test_split()?;
        self.preprocess_data()?;
        self.generate_mappings()?;
        Ok(())
    }

    /// Split the full dataset into `train`, `val` and `test`.
    ///
    /// Sets `train_val_test.split_datapaths`. If only `split_datapaths` is
    /// configured, the existing partitions are used as they are.
    pub fn generate_train_val_test_split(&mut self) -> Result<()> {
        let updated = self.split_phase(self.data_config.clone())?;
        self.data_config = updated;
        Ok(())
    }

    /// Fit and apply the preprocessing chain.
    ///
    /// Sets `train_val_test.final_datapaths`. Requires the split phase.
    pub fn preprocess_data(&mut self) -> Result<()> {
        let updated = self.preprocess_phase(self.data_config.clone())?;
        self.data_config = updated;
        Ok(())
    }

    /// Derive label mappings for every metadata column.
    ///
    /// Sets `label_mappings`. Requires the preprocess phase.
    pub fn generate_mappings(&mut self) -> Result<()> {
        let updated = self.mapping_phase(self.data_config.clone())?;
        self.data_config = updated;
        Ok(())
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    // =========================================================================
    // Split
    // =========================================================================

    fn split_phase(&self, mut config: DataConfig) -> Result<DataConfig> {
        config.validate()?;

        let tvt = &config.train_val_test;
        let full_datapath = match (tvt.full_datapath(), tvt.split_datapaths()) {
            (Some(full), Some(split)) => {
                warn!(
                    "Both `full_datapath` and `split_datapaths` are given; splitting {} and ignoring {}",
                    full.display(),
                    split.display()
                );
                full.to_path_buf()
            }
            (Some(full), None) => full.to_path_buf(),
            (None, Some(split)) => {
                info!("Using existing splits at {}", split.display());
                return Ok(config);
            }
            (None, None) => return Err(IngestionError::NoDataProvided),
        };

        self.report_progress(ProgressUpdate::new(
            IngestionStage::Splitting,
            0.0,
            format!("Splitting {}", full_datapath.display()),
        ));
        info!("Generating train/val/test split from {}", full_datapath.display());

        let full_data = read_data(&full_datapath).context("Failed to read full dataset")?;

        let splitter_config = config.train_val_test.splitter_config.clone().unwrap_or_default();
        let (splitter, resolved) = self.registry.build_splitter(&splitter_config)?;
        config.train_val_test.splitter_config = Some(resolved);

        let target = config.target();
        let indices = splitter.generate_train_val_test_split_indices(&full_datapath, target)?;
        indices.validate(full_data.n_obs())?;
        write_data(&indices, self.dirpath.join(SPLIT_INDICES_FILE))?;

        match target {
            Some(target) => splitter.check_splits(&full_datapath, &indices, target)?,
            None => warn!("No target given; skipping split check"),
        }

        let split_dir = self.dirpath.join(SPLIT_DIR);
        fs::create_dir_all(&split_dir)?;
        splitter.write_splits(&full_data, &indices, config.sample_chunksize(), &split_dir)?;
        drop(full_data);

        info!(
            "Split {} records with {}: train={}, val={}, test={}",
            indices.len(),
            splitter.name(),
            indices.train.len(),
            indices.val.len(),
            indices.test.len()
        );
        self.report_progress(ProgressUpdate::new(
            IngestionStage::Splitting,
            1.0,
            "Train/val/test split complete",
        ));

        config.train_val_test.split_datapaths = Some(split_dir);
        Ok(config)
    }

    // =========================================================================
    // Preprocess
    // =========================================================================

    fn preprocess_phase(&self, mut config: DataConfig) -> Result<DataConfig> {
        let split_datapaths = config
            .train_val_test
            .split_datapaths()
            .map(Path::to_path_buf)
            .ok_or(IngestionError::MissingPhaseOutput {
                field: "split_datapaths",
                phase: "split",
            })?;

        config.train_val_test.final_datapaths = Some(split_datapaths.clone());
        if config.preprocess.is_empty() {
            info!("No preprocessing steps configured");
            return Ok(config);
        }

        let n_steps = config.preprocess.len();
        let sample_chunksize = config.sample_chunksize();
        let mut input_dir = split_datapaths;

        for (i, step) in config.preprocess.iter_mut().enumerate() {
            input_dir = self.run_preprocess_step(i, n_steps, step, &input_dir, sample_chunksize)?;
        }

        config.train_val_test.final_datapaths = Some(input_dir);
        Ok(config)
    }

    /// Resolve, fit and apply one step; returns its output directory.
    fn run_preprocess_step(
        &self,
        index: usize,
        n_steps: usize,
        step: &mut StrategyConfig,
        input_dir: &Path,
        sample_chunksize: Option<usize>,
    ) -> Result<PathBuf> {
        let (mut preprocessor, resolved) = self.registry.build_preprocessor(step)?;
        *step = resolved;

        let name = preprocessor.name().to_string();
        let sub_stage = format!("Step {}/{}: {}", index + 1, n_steps, name);
        self.report_progress(ProgressUpdate::with_items(
            IngestionStage::Preprocessing,
            &sub_stage,
            index,
            n_steps,
            format!("Fitting {name}"),
        ));

        info!("Fitting {} on {}", name, input_dir.join(Partition::Train.as_str()).display());
        let train = DatasetReader::open(input_dir.join(Partition::Train.as_str()))?;
        preprocessor
            .fit(&train, sample_chunksize)
            .context(format!("Failed to fit {name}"))?;

        let output_dir = self.dirpath.join(PROCESSED_DIR).join(format!("{index}_{name}"));
        for partition in Partition::ALL {
            let reader = DatasetReader::open(input_dir.join(partition.as_str()))?;
            preprocessor
                .process_data(&reader, sample_chunksize, &output_dir.join(partition.as_str()))
                .context(format!("Failed to apply {name} to {partition}"))?;
        }
        debug!("{} output written to {}", name, output_dir.display());

        self.report_progress(ProgressUpdate::with_items(
            IngestionStage::Preprocessing,
            sub_stage,
            index + 1,
            n_steps,
            format!("Applied {name}"),
        ));
        Ok(output_dir)
    }

    // =========================================================================
    // Label mappings
    // =========================================================================

    fn mapping_phase(&self, mut config: DataConfig) -> Result<DataConfig> {
        let final_datapaths = config
            .train_val_test
            .final_datapaths()
            .map(Path::to_path_buf)
            .ok_or(IngestionError::MissingPhaseOutput {
                field: "final_datapaths",
                phase: "preprocess",
            })?;

        self.report_progress(ProgressUpdate::new(
            IngestionStage::LabelMapping,
            0.0,
            "Generating label mappings",
        ));
        info!("Generating label mappings for all metadata columns");

        // The val partition's metadata schema stands for all partitions.
        let column_names = DatasetReader::open(final_datapaths.join(Partition::Val.as_str()))?
            .obs_column_names()?;

        let full_obs = concat_obs(&final_datapaths, &column_names)?;
        let label_mappings: LabelMappings = build_label_mappings(&full_obs, &column_names)?;
        drop(full_obs);

        let path = self.dirpath.join(LABEL_MAPPINGS_FILE);
        write_data(&label_mappings, &path)?;
        info!(
            "Wrote label mappings for {} column(s) to {}",
            label_mappings.len(),
            path.display()
        );
        self.report_progress(ProgressUpdate::new(
            IngestionStage::LabelMapping,
            1.0,
            "Label mappings complete",
        ));

        config.label_mappings = Some(path);
        Ok(config)
    }
}

/// Stack the metadata of all partitions, restricted to `columns`.
fn concat_obs(datapath: &Path, columns: &[String]) -> Result<DataFrame> {
    let mut frames = Vec::with_capacity(Partition::ALL.len());

    for partition in Partition::ALL {
        let obs = read_obs(datapath.join(partition.as_str()))?;
        if let Some(missing) = columns.iter().find(|name| obs.column(name.as_str()).is_err()) {
            return Err(IngestionError::ColumnNotFound(missing.clone()).with_context(format!(
                "Metadata of {partition} differs from val"
            )));
        }
        frames.push(obs.select(columns.iter().cloned())?);
    }

    let mut frames = normalize_label_dtypes(&frames)?.into_iter();
    let mut stacked = frames
        .next()
        .ok_or_else(|| IngestionError::DatasetNotFound(datapath.to_path_buf()))?;
    for obs in frames {
        stacked.vstack_mut(&obs)?;
    }
    Ok(stacked)
}

/// Builder for [`DataIngestionPipeline`].
#[derive(Default)]
pub struct DataIngestionPipelineBuilder {
    config: Option<DataConfig>,
    dirpath: Option<PathBuf>,
    registry: Option<StrategyRegistry>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(DataIngestionPipelineBuilder: Send);

impl DataIngestionPipelineBuilder {
    /// Set the data configuration (required).
    pub fn config(mut self, config: DataConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the experiment directory (required).
    pub fn dirpath(mut self, dirpath: impl Into<PathBuf>) -> Self {
        self.dirpath = Some(dirpath.into());
        self
    }

    /// Use a custom strategy registry instead of the built-ins.
    pub fn registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set a progress reporter for receiving updates during the run.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Result<DataIngestionPipeline> {
        let config = self
            .config
            .ok_or_else(|| IngestionError::InvalidConfig("no data config given".to_string()))?;
        let dirpath = self
            .dirpath
            .ok_or_else(|| IngestionError::InvalidConfig("no experiment directory given".to_string()))?;

        Ok(DataIngestionPipeline::from_parts(
            config,
            dirpath,
            self.registry.unwrap_or_default(),
            self.progress_reporter,
        ))
    }
}
