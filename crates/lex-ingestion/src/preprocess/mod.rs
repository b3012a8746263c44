//! Preprocessing transforms.
//!
//! A [`Preprocessor`] is fitted on the `train` partition only and then
//! applied independently to `train`, `val` and `test`. Both steps stream the
//! data in chunks so partitions never have to fit in memory.
//!
//! Built-in preprocessors:
//! - [`StandardScaler`] - per-feature standardization
//! - [`SampleNorm`] - per-record normalization to a fixed total

mod sample_norm;
mod standard_scaler;

pub use sample_norm::{SampleNorm, SampleNormParams};
pub use standard_scaler::{StandardScaler, StandardScalerParams};

use crate::error::Result;
use crate::io::{ChunkWriter, Dataset, DatasetReader};
use crate::utils::float_values;
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

/// Strategy fitted on train data and applied to every partition.
pub trait Preprocessor {
    /// Registered name of the preprocessor.
    fn name(&self) -> &str;

    /// Learn the transform's state from the train partition.
    ///
    /// Stateless transforms keep the default no-op.
    fn fit(&mut self, _train: &DatasetReader, _sample_chunksize: Option<usize>) -> Result<()> {
        Ok(())
    }

    /// Transform one chunk of records.
    fn transform(&self, data: Dataset) -> Result<Dataset>;

    /// Transform every chunk of `data` and write the results to `dirpath`.
    fn process_data(
        &self,
        data: &DatasetReader,
        sample_chunksize: Option<usize>,
        dirpath: &Path,
    ) -> Result<()> {
        let mut writer = ChunkWriter::create(dirpath)?;
        for chunk in data.chunks(sample_chunksize) {
            let transformed = self.transform(chunk?)?;
            writer.write(&transformed)?;
        }
        let n_chunks = writer.finish()?;
        debug!(
            "{}: {} -> {} ({} chunk(s))",
            self.name(),
            data.path().display(),
            dirpath.display(),
            n_chunks
        );
        Ok(())
    }
}

/// Rebuild a feature table by mapping every column's values as `f64`.
///
/// The closure receives the column name and its values and returns the
/// new values; the output keeps the input column order.
pub(crate) fn map_feature_columns<F>(features: &DataFrame, mut f: F) -> Result<DataFrame>
where
    F: FnMut(&str, Vec<Option<f64>>) -> Result<Vec<Option<f64>>>,
{
    let mut columns: Vec<Column> = Vec::with_capacity(features.width());
    for column in features.get_columns() {
        let values = float_values(column.as_materialized_series())?;
        let mapped = f(column.name().as_str(), values)?;
        columns.push(Series::new(column.name().clone(), mapped).into());
    }
    Ok(DataFrame::new(columns)?)
}
