//! In-memory representation of an annotated dataset.

use crate::error::{IngestionError, Result};
use polars::prelude::*;

/// A block of records: a numeric feature matrix plus a metadata table.
///
/// Row `i` of `features` and row `i` of `obs` describe the same record
/// (e.g. one cell). Either table may have no columns.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: DataFrame,
    obs: DataFrame,
}

impl Dataset {
    /// Create a dataset, checking that both tables describe the same records.
    pub fn new(features: DataFrame, obs: DataFrame) -> Result<Self> {
        if features.width() > 0 && obs.width() > 0 && features.height() != obs.height() {
            return Err(IngestionError::InvalidDataset(format!(
                "features have {} rows but metadata has {}",
                features.height(),
                obs.height()
            )));
        }
        Ok(Self { features, obs })
    }

    /// Numeric feature matrix.
    pub fn features(&self) -> &DataFrame {
        &self.features
    }

    /// Metadata (observations) table.
    pub fn obs(&self) -> &DataFrame {
        &self.obs
    }

    /// Consume the dataset, returning `(features, obs)`.
    pub fn into_parts(self) -> (DataFrame, DataFrame) {
        (self.features, self.obs)
    }

    /// Number of records.
    pub fn n_obs(&self) -> usize {
        if self.obs.width() > 0 {
            self.obs.height()
        } else {
            self.features.height()
        }
    }

    /// Select records by position, in the given order.
    pub fn take(&self, indices: &[usize]) -> Result<Self> {
        let n_obs = self.n_obs();
        if let Some(&bad) = indices.iter().find(|&&i| i >= n_obs) {
            return Err(IngestionError::InvalidSplit(format!(
                "index {bad} out of bounds for {n_obs} records"
            )));
        }

        let idx = IdxCa::from_vec(
            "idx".into(),
            indices.iter().map(|&i| i as IdxSize).collect(),
        );
        Ok(Self {
            features: self.features.take(&idx)?,
            obs: self.obs.take(&idx)?,
        })
    }

    /// Contiguous slice of records.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        Self {
            features: self.features.slice(offset as i64, len),
            obs: self.obs.slice(offset as i64, len),
        }
    }

    /// Append the records of `other` below this dataset's records.
    pub fn vstack(&self, other: &Dataset) -> Result<Self> {
        Ok(Self {
            features: self.features.vstack(&other.features)?,
            obs: self.obs.vstack(&other.obs)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let features = df!("g1" => [1.0, 2.0, 3.0, 4.0], "g2" => [0.0, 1.0, 0.0, 1.0]).unwrap();
        let obs = df!("cell_type" => ["T", "B", "T", "NK"]).unwrap();
        Dataset::new(features, obs).unwrap()
    }

    #[test]
    fn test_row_count_mismatch_rejected() {
        let features = df!("g1" => [1.0, 2.0]).unwrap();
        let obs = df!("cell_type" => ["T"]).unwrap();
        assert!(matches!(
            Dataset::new(features, obs).unwrap_err(),
            IngestionError::InvalidDataset(_)
        ));
    }

    #[test]
    fn test_take_keeps_rows_aligned() {
        let data = sample();
        let taken = data.take(&[3, 0]).unwrap();
        assert_eq!(taken.n_obs(), 2);

        let g1: Vec<Option<f64>> = taken
            .features()
            .column("g1")
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(g1, vec![Some(4.0), Some(1.0)]);

        let labels: Vec<Option<&str>> = taken
            .obs()
            .column("cell_type")
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(labels, vec![Some("NK"), Some("T")]);
    }

    #[test]
    fn test_take_out_of_bounds() {
        assert!(matches!(
            sample().take(&[4]).unwrap_err(),
            IngestionError::InvalidSplit(_)
        ));
    }

    #[test]
    fn test_slice_and_vstack() {
        let data = sample();
        let head = data.slice(0, 1);
        let tail = data.slice(1, 3);
        assert_eq!(head.n_obs(), 1);
        assert_eq!(tail.n_obs(), 3);

        let joined = head.vstack(&tail).unwrap();
        assert!(joined.features().equals(data.features()));
        assert!(joined.obs().equals(data.obs()));
    }
}
