//! Custom error types for the data ingestion pipeline.
//!
//! This module provides the error hierarchy used throughout the crate,
//! built with `thiserror`. Configuration errors are fatal and raised before
//! any I/O happens; storage and strategy failures propagate to the caller
//! unchanged.
//!
//! Errors are serializable so the CLI can report them as JSON.

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the ingestion pipeline.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// Neither `full_datapath` nor `split_datapaths` was supplied.
    #[error("No data provided. Please provide `full_datapath` or `split_datapaths`")]
    NoDataProvided,

    /// A pipeline-owned field was supplied by the user.
    #[error("`{0}` can not be provided by the user in the config; it is generated by the pipeline")]
    ReservedField(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A phase ran before the phase that produces its input.
    #[error("`{field}` is not set; run the {phase} phase first")]
    MissingPhaseOutput {
        field: &'static str,
        phase: &'static str,
    },

    /// No strategy registered under the requested name.
    #[error("Unknown {kind} '{name}'")]
    UnknownStrategy { kind: &'static str, name: String },

    /// Strategy parameters could not be resolved.
    #[error("Invalid parameters for '{strategy}': {reason}")]
    InvalidParams { strategy: String, reason: String },

    /// Column was not found in the metadata table.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// No dataset stored at the given path.
    #[error("No dataset found at '{}'", .0.display())]
    DatasetNotFound(PathBuf),

    /// Features and metadata disagree, or a chunk is malformed.
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    /// Split indices are not a partition of the record set.
    #[error("Invalid train/val/test split: {0}")]
    InvalidSplit(String),

    /// A preprocessor was applied before being fitted.
    #[error("Preprocessor '{0}' must be fitted before transforming data")]
    NotFitted(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<IngestionError>,
    },
}

impl IngestionError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        IngestionError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code, e.g. for JSON output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoDataProvided => "NO_DATA_PROVIDED",
            Self::ReservedField(_) => "RESERVED_FIELD",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::MissingPhaseOutput { .. } => "MISSING_PHASE_OUTPUT",
            Self::UnknownStrategy { .. } => "UNKNOWN_STRATEGY",
            Self::InvalidParams { .. } => "INVALID_PARAMS",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::DatasetNotFound(_) => "DATASET_NOT_FOUND",
            Self::InvalidDataset(_) => "INVALID_DATASET",
            Self::InvalidSplit(_) => "INVALID_SPLIT",
            Self::NotFitted(_) => "NOT_FITTED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Yaml(_) => "YAML_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error is a configuration error.
    ///
    /// Configuration errors are raised before any data is touched and
    /// are never worth retrying with the same config.
    pub fn is_config_error(&self) -> bool {
        match self {
            Self::NoDataProvided
            | Self::ReservedField(_)
            | Self::InvalidConfig(_)
            | Self::MissingPhaseOutput { .. }
            | Self::UnknownStrategy { .. }
            | Self::InvalidParams { .. } => true,
            Self::WithContext { source, .. } => source.is_config_error(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for IngestionError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("IngestionError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| IngestionError::Polars(e).with_context(context))
    }
}
