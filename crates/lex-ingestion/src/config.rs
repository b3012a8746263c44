//! Configuration types for the data ingestion pipeline.
//!
//! [`DataConfig`] mirrors the `data` section of an experiment config file.
//! Users supply the data sources, the splitter and the preprocessing chain;
//! the pipeline writes the derived fields (`split_datapaths`,
//! `final_datapaths`, `label_mappings`) back as it runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_ingestion::config::{DataConfig, StrategyConfig};
//!
//! let config = DataConfig::builder()
//!     .full_datapath("data/pbmc")
//!     .target("cell_type")
//!     .sample_chunksize(20_000)
//!     .splitter(StrategyConfig::new("GroupSplitter").with_param("split_by", "donor"))
//!     .preprocess(StrategyConfig::new("StandardScaler"))
//!     .build()?;
//! ```

use crate::error::{IngestionError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Name of the splitter used when `splitter_config` is omitted.
pub const DEFAULT_SPLITTER: &str = "SimpleSplitter";

/// A strategy selected by name plus its parameters.
///
/// Used for both splitters and preprocessors. Resolving a strategy fills in
/// defaults for omitted parameters, and the resolved config is written back
/// so the persisted experiment config is fully explicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Registered strategy name (e.g. "StandardScaler").
    pub name: String,

    /// Strategy parameters.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl StrategyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    /// Set a parameter, replacing any previous value.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SPLITTER)
    }
}

/// Paths and splitter settings for the train/val/test stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainValTestConfig {
    /// Raw dataset to be split.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_datapath: Option<PathBuf>,

    /// Directory holding pre-split `train`, `val` and `test` partitions.
    ///
    /// Overwritten by the pipeline when `full_datapath` is split.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_datapaths: Option<PathBuf>,

    /// Splitter used with `full_datapath`. Defaults to [`DEFAULT_SPLITTER`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splitter_config: Option<StrategyConfig>,

    /// Reserved: owned by the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_subset_datapaths: Option<PathBuf>,

    /// Reserved: owned by the pipeline. Points at the data after the last
    /// preprocessing step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_datapaths: Option<PathBuf>,

    /// Keys this crate does not interpret, preserved across a run.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TrainValTestConfig {
    /// `full_datapath`, treating an empty path as absent.
    pub fn full_datapath(&self) -> Option<&Path> {
        non_empty(&self.full_datapath)
    }

    /// `split_datapaths`, treating an empty path as absent.
    pub fn split_datapaths(&self) -> Option<&Path> {
        non_empty(&self.split_datapaths)
    }

    /// `final_datapaths`, treating an empty path as absent.
    pub fn final_datapaths(&self) -> Option<&Path> {
        non_empty(&self.final_datapaths)
    }

    /// Returns the first pipeline-owned field present in the config, if any.
    pub fn reserved_field(&self) -> Option<&'static str> {
        if non_empty(&self.feature_subset_datapaths).is_some() {
            Some("feature_subset_datapaths")
        } else if non_empty(&self.final_datapaths).is_some() {
            Some("final_datapaths")
        } else {
            None
        }
    }
}

fn non_empty(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|p| !p.as_os_str().is_empty())
}

/// Data configuration for an experiment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Target column in the metadata table. Used to check splits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Maximum number of records held in memory per chunk.
    /// If None, whole partitions are materialized at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_chunksize: Option<usize>,

    /// Data sources, splitter and derived paths.
    #[serde(default)]
    pub train_val_test: TrainValTestConfig,

    /// Ordered preprocessing chain.
    #[serde(default)]
    pub preprocess: Vec<StrategyConfig>,

    /// Path of the label mappings artifact (derived).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_mappings: Option<PathBuf>,

    /// Keys this crate does not interpret, preserved across a run.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataConfig {
    /// Create a new configuration builder.
    pub fn builder() -> DataConfigBuilder {
        DataConfigBuilder::default()
    }

    /// Load a configuration from a YAML or JSON file.
    ///
    /// If the file holds a full experiment config, the `data` section is used.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let document: Value = crate::io::read_structured(path.as_ref())?;
        Self::from_document(document)
    }

    /// Extract the configuration from a parsed document, using its `data`
    /// section when present.
    pub fn from_document(document: Value) -> Result<Self> {
        let section = match document {
            Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or_default(),
            other => other,
        };
        Ok(serde_json::from_value(section)?)
    }

    /// Write this configuration back into the document it was loaded from.
    ///
    /// A document with a `data` section keeps every other section and gets
    /// its `data` replaced. Otherwise the document was the data section
    /// itself and is replaced entirely.
    pub fn merge_into(&self, document: Value) -> Result<Value> {
        let section = serde_json::to_value(self)?;
        Ok(match document {
            Value::Object(mut map) if map.contains_key("data") => {
                map.insert("data".to_string(), section);
                Value::Object(map)
            }
            _ => section,
        })
    }

    /// `target`, treating an empty column name as absent.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref().filter(|t| !t.is_empty())
    }

    /// `sample_chunksize`, treating 0 as absent (no chunking).
    pub fn sample_chunksize(&self) -> Option<usize> {
        self.sample_chunksize.filter(|&size| size > 0)
    }

    /// Write the configuration as YAML or JSON, chosen by extension.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        crate::io::write_data(self, path.as_ref())
    }

    /// Check the constraints that can be verified without touching data.
    ///
    /// Reserved fields are checked first so that supplying one is always
    /// reported, regardless of the other fields. A missing target or chunk
    /// size is not an error.
    pub fn validate(&self) -> Result<()> {
        if let Some(field) = self.train_val_test.reserved_field() {
            return Err(IngestionError::ReservedField(field.to_string()));
        }

        if self.train_val_test.full_datapath().is_none()
            && self.train_val_test.split_datapaths().is_none()
        {
            return Err(IngestionError::NoDataProvided);
        }

        Ok(())
    }
}

/// Builder for [`DataConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct DataConfigBuilder {
    config: DataConfig,
}

impl DataConfigBuilder {
    /// Set the target column.
    pub fn target(mut self, column: impl Into<String>) -> Self {
        self.config.target = Some(column.into());
        self
    }

    /// Set the number of records per chunk.
    pub fn sample_chunksize(mut self, size: usize) -> Self {
        self.config.sample_chunksize = Some(size);
        self
    }

    /// Set the raw dataset to split.
    pub fn full_datapath(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.train_val_test.full_datapath = Some(path.into());
        self
    }

    /// Set the directory holding pre-split partitions.
    pub fn split_datapaths(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.train_val_test.split_datapaths = Some(path.into());
        self
    }

    /// Set the splitter.
    pub fn splitter(mut self, splitter: StrategyConfig) -> Self {
        self.config.train_val_test.splitter_config = Some(splitter);
        self
    }

    /// Append a preprocessing step.
    pub fn preprocess(mut self, step: StrategyConfig) -> Self {
        self.config.preprocess.push(step);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<DataConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_defaults() {
        let config = DataConfig::builder().full_datapath("data/full").build().unwrap();
        assert_eq!(config.target, None);
        assert_eq!(config.sample_chunksize, None);
        assert!(config.preprocess.is_empty());
        assert!(config.train_val_test.splitter_config.is_none());
    }

    #[test]
    fn test_validation_no_data() {
        let result = DataConfig::builder().target("cell_type").build();
        assert!(matches!(result.unwrap_err(), IngestionError::NoDataProvided));
    }

    #[test]
    fn test_validation_reserved_fields() {
        let mut config = DataConfig::default();
        config.train_val_test.final_datapaths = Some(PathBuf::from("processed"));
        assert!(matches!(
            config.validate().unwrap_err(),
            IngestionError::ReservedField(field) if field == "final_datapaths"
        ));

        let mut config = DataConfig::default();
        config.train_val_test.full_datapath = Some(PathBuf::from("data/full"));
        config.train_val_test.feature_subset_datapaths = Some(PathBuf::from("subset"));
        assert!(matches!(
            config.validate().unwrap_err(),
            IngestionError::ReservedField(field) if field == "feature_subset_datapaths"
        ));
    }

    #[test]
    fn test_empty_target_and_zero_chunksize_are_absent() {
        let config: DataConfig = serde_yaml::from_str(
            "target: ''\nsample_chunksize: 0\ntrain_val_test:\n  full_datapath: data/full\n",
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.target(), None);
        assert_eq!(config.sample_chunksize(), None);

        let config = DataConfig::builder()
            .full_datapath("data/full")
            .target("cell_type")
            .sample_chunksize(0)
            .build()
            .unwrap();
        assert_eq!(config.target(), Some("cell_type"));
        assert_eq!(config.sample_chunksize(), None);
    }

    #[test]
    fn test_empty_paths_are_absent() {
        let config: DataConfig = serde_json::from_str(
            r#"{"train_val_test": {"full_datapath": "", "split_datapaths": ""}}"#,
        )
        .unwrap();
        assert!(config.train_val_test.full_datapath().is_none());
        assert!(matches!(config.validate().unwrap_err(), IngestionError::NoDataProvided));
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
target: cell_type
sample_chunksize: 1000
train_val_test:
  full_datapath: data/pbmc
  splitter_config:
    name: GroupSplitter
    params:
      split_by: donor
      split_ratio: [7, 1, 2]
preprocess:
  - name: SampleNorm
  - name: StandardScaler
    params:
      with_mean: false
"#;
        let config: DataConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.target.as_deref(), Some("cell_type"));
        assert_eq!(config.sample_chunksize, Some(1000));
        assert_eq!(
            config.train_val_test.full_datapath(),
            Some(Path::new("data/pbmc"))
        );
        let splitter = config.train_val_test.splitter_config.as_ref().unwrap();
        assert_eq!(splitter.name, "GroupSplitter");
        assert_eq!(splitter.params["split_by"], Value::from("donor"));
        assert_eq!(config.preprocess.len(), 2);
        assert_eq!(config.preprocess[0], StrategyConfig::new("SampleNorm"));
        assert_eq!(config.preprocess[1].params["with_mean"], Value::Bool(false));
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let json = r#"{
            "target": "cell_type",
            "notes": "keep me",
            "train_val_test": {"split_datapaths": "splits", "comment": 3}
        }"#;
        let config: DataConfig = serde_json::from_str(json).unwrap();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["notes"], Value::from("keep me"));
        assert_eq!(value["train_val_test"]["comment"], Value::from(3));
        assert!(value["train_val_test"].get("final_datapaths").is_none());
    }

    #[test]
    fn test_merge_into_keeps_other_sections() {
        let document = serde_json::json!({
            "model": {"layers": [16, 8]},
            "data": {"target": "cell_type", "train_val_test": {"full_datapath": "data/full"}}
        });
        let mut config = DataConfig::from_document(document.clone()).unwrap();
        assert_eq!(config.target(), Some("cell_type"));

        config.train_val_test.split_datapaths = Some(PathBuf::from("exp/train_val_test_split"));
        let merged = config.merge_into(document).unwrap();
        assert_eq!(merged["model"]["layers"], serde_json::json!([16, 8]));
        assert_eq!(
            merged["data"]["train_val_test"]["split_datapaths"],
            Value::from("exp/train_val_test_split")
        );
        assert_eq!(DataConfig::from_document(merged).unwrap(), config);

        let bare = serde_json::json!({"train_val_test": {"full_datapath": "data/full"}});
        let config = DataConfig::from_document(bare.clone()).unwrap();
        let merged = config.merge_into(bare).unwrap();
        assert!(merged.get("data").is_none());
        assert_eq!(merged["train_val_test"]["full_datapath"], Value::from("data/full"));
    }
}
