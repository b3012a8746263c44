//! Random splitting by ratio.

use super::{SplitIndices, Splitter, check_split_ratio, default_seed, default_split_ratio, partition_sizes};
use crate::config::StrategyConfig;
use crate::error::Result;
use crate::io::DatasetReader;
use crate::registry::resolve_params;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Parameters of [`SimpleSplitter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimpleSplitterParams {
    /// Relative sizes of `[train, val, test]`.
    #[serde(default = "default_split_ratio")]
    pub split_ratio: Vec<f64>,

    /// Seed for the shuffle.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Shuffles record positions with a seeded RNG and cuts them by ratio.
///
/// The same dataset, ratio and seed always yield the same split.
#[derive(Debug, Clone)]
pub struct SimpleSplitter {
    ratio: [f64; 3],
    seed: u64,
}

impl SimpleSplitter {
    pub const NAME: &'static str = "SimpleSplitter";

    pub fn new(ratio: [f64; 3], seed: u64) -> Result<Self> {
        let ratio = check_split_ratio(Self::NAME, &ratio)?;
        Ok(Self { ratio, seed })
    }

    /// Build from a config, returning the config with defaults filled in.
    pub fn from_config(config: &StrategyConfig) -> Result<(Self, StrategyConfig)> {
        let (params, resolved): (SimpleSplitterParams, _) = resolve_params(config)?;
        let ratio = check_split_ratio(Self::NAME, &params.split_ratio)?;
        Ok((Self { ratio, seed: params.seed }, resolved))
    }

    /// Split `n_obs` record positions.
    pub fn split_positions(&self, n_obs: usize) -> SplitIndices {
        let mut positions: Vec<usize> = (0..n_obs).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        positions.shuffle(&mut rng);

        let (n_train, n_val) = partition_sizes(n_obs, self.ratio);
        let mut test = positions.split_off(n_train + n_val);
        let mut val = positions.split_off(n_train);
        let mut train = positions;

        train.sort_unstable();
        val.sort_unstable();
        test.sort_unstable();
        SplitIndices { train, val, test }
    }
}

impl Splitter for SimpleSplitter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn generate_train_val_test_split_indices(
        &self,
        full_datapath: &Path,
        _target: Option<&str>,
    ) -> Result<SplitIndices> {
        let n_obs = DatasetReader::open(full_datapath)?.n_obs()?;
        let indices = self.split_positions(n_obs);
        debug!(
            "Random split of {} records: train={}, val={}, test={}",
            n_obs,
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
    use crate::error::IngestionError;
    use serde_json::json;

    #[test]
    fn test_split_sizes_and_partition() {
        let splitter = SimpleSplitter::new([7.0, 1.0, 2.0], 0).unwrap();
        let indices = splitter.split_positions(100);
        assert_eq!(indices.train.len(), 70);
        assert_eq!(indices.val.len(), 10);
        assert_eq!(indices.test.len(), 20);
        indices.validate(100).unwrap();
    }

    #[test]
    fn test_split_is_deterministic_per_seed() {
        let a = SimpleSplitter::new([7.0, 1.0, 2.0], 7).unwrap().split_positions(50);
        let b = SimpleSplitter::new([7.0, 1.0, 2.0], 7).unwrap().split_positions(50);
        let c = SimpleSplitter::new([7.0, 1.0, 2.0], 8).unwrap().split_positions(50);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_from_config_fills_defaults() {
        let (splitter, resolved) = SimpleSplitter::from_config(&StrategyConfig::new("SimpleSplitter")).unwrap();
        assert_eq!(splitter.ratio, [7.0, 1.0, 2.0]);
        assert_eq!(resolved.params["seed"], json!(42));
        assert_eq!(resolved.params["split_ratio"], json!([7.0, 1.0, 2.0]));
    }

    #[test]
    fn test_from_config_rejects_bad_params() {
        let config = StrategyConfig::new("SimpleSplitter").with_param("split_ratio", json!([1, 2]));
        assert!(matches!(
            SimpleSplitter::from_config(&config).unwrap_err(),
            IngestionError::InvalidParams { .. }
        ));

        let config = StrategyConfig::new("SimpleSplitter").with_param("ratio", json!([1, 2, 3]));
        assert!(SimpleSplitter::from_config(&config).is_err());
    }
}
