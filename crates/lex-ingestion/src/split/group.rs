//! Group-aware splitting.

use super::{SplitIndices, Splitter, check_split_ratio, default_seed, default_split_ratio, partition_sizes};
use crate::config::StrategyConfig;
use crate::error::{IngestionError, Result};
use crate::io::read_obs;
use crate::registry::resolve_params;
use crate::utils::string_values;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Parameters of [`GroupSplitter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSplitterParams {
    /// Metadata column whose values define the groups (e.g. `donor`).
    pub split_by: String,

    /// Relative number of groups in `[train, val, test]`.
    #[serde(default = "default_split_ratio")]
    pub split_ratio: Vec<f64>,

    /// Seed for the group shuffle.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Splits whole groups so no group is shared between partitions.
///
/// Used when records from the same source (donor, sample, batch) must not
/// leak across partitions. The ratio applies to the number of groups, not
/// the number of records. Records with a null group form their own group.
#[derive(Debug, Clone)]
pub struct GroupSplitter {
    split_by: String,
    ratio: [f64; 3],
    seed: u64,
}

impl GroupSplitter {
    pub const NAME: &'static str = "GroupSplitter";

    pub fn new(split_by: impl Into<String>, ratio: [f64; 3], seed: u64) -> Result<Self> {
        let ratio = check_split_ratio(Self::NAME, &ratio)?;
        Ok(Self {
            split_by: split_by.into(),
            ratio,
            seed,
        })
    }

    /// Build from a config, returning the config with defaults filled in.
    pub fn from_config(config: &StrategyConfig) -> Result<(Self, StrategyConfig)> {
        let (params, resolved): (GroupSplitterParams, _) = resolve_params(config)?;
        let ratio = check_split_ratio(Self::NAME, &params.split_ratio)?;
        Ok((
            Self {
                split_by: params.split_by,
                ratio,
                seed: params.seed,
            },
            resolved,
        ))
    }

    /// Split records given the group label of each record.
    pub fn split_groups(&self, groups: &[Option<String>]) -> SplitIndices {
        let mut members: BTreeMap<Option<&str>, Vec<usize>> = BTreeMap::new();
        for (index, group) in groups.iter().enumerate() {
            members.entry(group.as_deref()).or_default().push(index);
        }

        let mut keys: Vec<Option<&str>> = members.keys().copied().collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        keys.shuffle(&mut rng);

        let (n_train, n_val) = partition_sizes(keys.len(), self.ratio);
        let mut indices = SplitIndices::default();
        for (position, key) in keys.iter().enumerate() {
            let target = if position < n_train {
                &mut indices.train
            } else if position < n_train + n_val {
                &mut indices.val
            } else {
                &mut indices.test
            };
            target.extend_from_slice(&members[key]);
        }

        indices.train.sort_unstable();
        indices.val.sort_unstable();
        indices.test.sort_unstable();
        indices
    }
}

impl Splitter for GroupSplitter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn generate_train_val_test_split_indices(
        &self,
        full_datapath: &Path,
        _target: Option<&str>,
    ) -> Result<SplitIndices> {
        let obs = read_obs(full_datapath)?;
        let column = obs
            .column(&self.split_by)
            .map_err(|_| IngestionError::ColumnNotFound(self.split_by.clone()))?;
        let groups = string_values(column.as_materialized_series())?;
        drop(obs);

        let indices = self.split_groups(&groups);
        if indices.val.is_empty() || indices.test.is_empty() {
            warn!(
                "Too few '{}' groups for ratio {:?}: val={} and test={} records",
                self.split_by,
                self.ratio,
                indices.val.len(),
                indices.test.len()
            );
        }
        debug!(
            "Group split by '{}': train={}, val={}, test={}",
            self.split_by,
            indices.train.len(),
            indices.val.len(),
            indices.test.len()
        );
        Ok(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::Partition;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn donors(n: usize, n_groups: usize) -> Vec<Option<String>> {
        (0..n).map(|i| Some(format!("donor{}", i % n_groups))).collect()
    }

    fn groups_of(indices: &[usize], groups: &[Option<String>]) -> BTreeSet<Option<String>> {
        indices.iter().map(|&i| groups[i].clone()).collect()
    }

    #[test]
    fn test_groups_do_not_cross_partitions() {
        let groups = donors(200, 10);
        let splitter = GroupSplitter::new("donor", [7.0, 1.0, 2.0], 3).unwrap();
        let indices = splitter.split_groups(&groups);
        indices.validate(200).unwrap();

        let train = groups_of(&indices.train, &groups);
        let val = groups_of(&indices.val, &groups);
        let test = groups_of(&indices.test, &groups);
        assert_eq!(train.len(), 7);
        assert_eq!(val.len(), 1);
        assert_eq!(test.len(), 2);
        assert!(train.is_disjoint(&val));
        assert!(train.is_disjoint(&test));
        assert!(val.is_disjoint(&test));
    }

    #[test]
    fn test_null_groups_stay_together() {
        let mut groups = donors(9, 3);
        groups.push(None);
        groups.push(None);
        let splitter = GroupSplitter::new("donor", [1.0, 1.0, 2.0], 1).unwrap();
        let indices = splitter.split_groups(&groups);
        indices.validate(11).unwrap();

        let holder = Partition::ALL
            .into_iter()
            .filter(|p| indices.get(*p).contains(&9))
            .collect::<Vec<_>>();
        assert_eq!(holder.len(), 1);
        assert!(indices.get(holder[0]).contains(&10));
    }

    #[test]
    fn test_from_config_requires_split_by() {
        assert!(GroupSplitter::from_config(&StrategyConfig::new("GroupSplitter")).is_err());

        let config = StrategyConfig::new("GroupSplitter").with_param("split_by", "donor");
        let (splitter, resolved) = GroupSplitter::from_config(&config).unwrap();
        assert_eq!(splitter.split_by, "donor");
        assert_eq!(resolved.params["split_ratio"], json!([7.0, 1.0, 2.0]));
        assert_eq!(resolved.params["seed"], json!(42));
    }
}
