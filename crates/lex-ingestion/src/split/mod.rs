//! Train/validation/test splitting.
//!
//! A [`Splitter`] assigns every record of a dataset to exactly one
//! [`Partition`], checks the assignment against the target column and
//! writes the physically split partitions to disk.
//!
//! Built-in splitters:
//! - [`SimpleSplitter`] - seeded random split by ratio
//! - [`GroupSplitter`] - keeps every group (e.g. a donor) inside one partition
//!
//! New splitters are added by implementing [`Splitter`] and registering a
//! constructor with [`StrategyRegistry`](crate::registry::StrategyRegistry).

mod group;
mod simple;

pub use group::{GroupSplitter, GroupSplitterParams};
pub use simple::{SimpleSplitter, SimpleSplitterParams};

use crate::error::{IngestionError, Result};
use crate::io::{Dataset, read_obs, write_chunked};
use crate::utils::string_values;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// One of the three record subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Train,
    Val,
    Test,
}

impl Partition {
    /// All partitions, in the order they are processed.
    pub const ALL: [Partition; 3] = [Partition::Train, Partition::Val, Partition::Test];

    /// Directory name of the partition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assignment of record positions to partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitIndices {
    /// Indices assigned to `partition`.
    pub fn get(&self, partition: Partition) -> &[usize] {
        match partition {
            Partition::Train => &self.train,
            Partition::Val => &self.val,
            Partition::Test => &self.test,
        }
    }

    /// Total number of assigned indices.
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that the partitions are disjoint and jointly cover `0..n_obs`.
    pub fn validate(&self, n_obs: usize) -> Result<()> {
        let mut seen = vec![false; n_obs];

        for partition in Partition::ALL {
            for &index in self.get(partition) {
                if index >= n_obs {
                    return Err(IngestionError::InvalidSplit(format!(
                        "index {index} in {partition} is out of bounds for {n_obs} records"
                    )));
                }
                if seen[index] {
                    return Err(IngestionError::InvalidSplit(format!(
                        "index {index} is assigned more than once (again in {partition})"
                    )));
                }
                seen[index] = true;
            }
        }

        let missing = seen.iter().filter(|assigned| !**assigned).count();
        if missing > 0 {
            return Err(IngestionError::InvalidSplit(format!(
                "{missing} of {n_obs} records are not assigned to any partition"
            )));
        }

        Ok(())
    }
}

/// Strategy producing and validating train/val/test assignments.
pub trait Splitter {
    /// Registered name of the splitter.
    fn name(&self) -> &str;

    /// Assign every record of the dataset at `full_datapath` to a partition.
    fn generate_train_val_test_split_indices(
        &self,
        full_datapath: &Path,
        target: Option<&str>,
    ) -> Result<SplitIndices>;

    /// Check the assignment against the target column.
    ///
    /// Logs the class distribution of every partition and warns about
    /// classes that appear in `val` or `test` but never in `train`.
    fn check_splits(&self, full_datapath: &Path, indices: &SplitIndices, target: &str) -> Result<()> {
        let obs = read_obs(full_datapath)?;
        let column = obs
            .column(target)
            .map_err(|_| IngestionError::ColumnNotFound(target.to_string()))?;
        let labels = string_values(column.as_materialized_series())?;

        let mut train_classes: BTreeSet<String> = BTreeSet::new();
        for partition in Partition::ALL {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for &index in indices.get(partition) {
                if let Some(Some(label)) = labels.get(index) {
                    *counts.entry(label.as_str()).or_insert(0) += 1;
                }
            }
            info!("{partition} distribution of '{target}': {counts:?}");

            if partition == Partition::Train {
                train_classes = counts.keys().map(|k| k.to_string()).collect();
                continue;
            }

            let unseen: Vec<&str> = counts
                .keys()
                .copied()
                .filter(|class| !train_classes.contains(*class))
                .collect();
            if !unseen.is_empty() {
                warn!("Classes in {partition} that never appear in train: {unseen:?}");
            }
        }

        Ok(())
    }

    /// Write the partitions of `full_data` to `dirpath/{train,val,test}`,
    /// in chunks of at most `sample_chunksize` records.
    fn write_splits(
        &self,
        full_data: &Dataset,
        indices: &SplitIndices,
        sample_chunksize: Option<usize>,
        dirpath: &Path,
    ) -> Result<()> {
        for partition in Partition::ALL {
            let part = full_data.take(indices.get(partition))?;
            write_chunked(&part, sample_chunksize, dirpath.join(partition.as_str()))?;
            info!("Wrote {} records to {partition}", part.n_obs());
        }
        Ok(())
    }
}

/// Default `[train, val, test]` ratio.
pub(crate) fn default_split_ratio() -> Vec<f64> {
    vec![7.0, 1.0, 2.0]
}

pub(crate) fn default_seed() -> u64 {
    42
}

/// Validate a `[train, val, test]` ratio.
pub(crate) fn check_split_ratio(strategy: &str, ratio: &[f64]) -> Result<[f64; 3]> {
    let invalid = |reason: String| IngestionError::InvalidParams {
        strategy: strategy.to_string(),
        reason,
    };

    let ratio: [f64; 3] = ratio.try_into().map_err(|_| {
        invalid(format!(
            "`split_ratio` needs 3 entries (train, val, test), got {}",
            ratio.len()
        ))
    })?;
    if ratio.iter().any(|r| !r.is_finite() || *r < 0.0) {
        return Err(invalid(format!("`split_ratio` entries must be >= 0, got {ratio:?}")));
    }
    if ratio.iter().sum::<f64>() <= 0.0 {
        return Err(invalid("`split_ratio` must not sum to 0".to_string()));
    }
    Ok(ratio)
}

/// Number of items for `(train, val)`; `test` takes the remainder.
pub(crate) fn partition_sizes(n: usize, ratio: [f64; 3]) -> (usize, usize) {
    let total: f64 = ratio.iter().sum();
    let n_train = ((n as f64) * ratio[0] / total).floor() as usize;
    let n_val = ((n as f64) * ratio[1] / total).floor() as usize;
    let n_train = n_train.min(n);
    (n_train, n_val.min(n - n_train))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_names() {
        let names: Vec<&str> = Partition::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["train", "val", "test"]);
        assert_eq!(serde_json::to_string(&Partition::Val).unwrap(), "\"val\"");
    }

    #[test]
    fn test_validate_accepts_partition() {
        let indices = SplitIndices {
            train: vec![0, 3],
            val: vec![2],
            test: vec![1, 4],
        };
        assert!(indices.validate(5).is_ok());
        assert_eq!(indices.len(), 5);
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let indices = SplitIndices {
            train: vec![0, 1],
            val: vec![1],
            test: vec![2],
        };
        assert!(matches!(indices.validate(3).unwrap_err(), IngestionError::InvalidSplit(_)));
    }

    #[test]
    fn test_validate_rejects_missing_and_out_of_bounds() {
        let missing = SplitIndices {
            train: vec![0],
            val: vec![],
            test: vec![2],
        };
        assert!(missing.validate(3).is_err());

        let out_of_bounds = SplitIndices {
            train: vec![0, 1, 2],
            val: vec![],
            test: vec![3],
        };
        assert!(out_of_bounds.validate(3).is_err());
    }

    #[test]
    fn test_partition_sizes() {
        assert_eq!(partition_sizes(10, [7.0, 1.0, 2.0]), (7, 1));
        assert_eq!(partition_sizes(3, [1.0, 1.0, 1.0]), (1, 1));
        assert_eq!(partition_sizes(0, [7.0, 1.0, 2.0]), (0, 0));
        assert_eq!(partition_sizes(5, [1.0, 0.0, 0.0]), (5, 0));
    }

    #[test]
    fn test_check_split_ratio() {
        assert_eq!(
            check_split_ratio("SimpleSplitter", &[7.0, 1.0, 2.0]).unwrap(),
            [7.0, 1.0, 2.0]
        );
        assert!(check_split_ratio("SimpleSplitter", &[0.8, 0.2]).is_err());
        assert!(check_split_ratio("SimpleSplitter", &[1.0, -1.0, 1.0]).is_err());
        assert!(check_split_ratio("SimpleSplitter", &[0.0, 0.0, 0.0]).is_err());
    }
}
