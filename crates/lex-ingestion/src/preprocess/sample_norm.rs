//! Per-record normalization.

use super::{Preprocessor, map_feature_columns};
use crate::config::StrategyConfig;
use crate::error::{IngestionError, Result};
use crate::io::Dataset;
use crate::registry::resolve_params;
use crate::utils::float_values;
use serde::{Deserialize, Serialize};

fn default_scaling_factor() -> f64 {
    1.0
}

/// Parameters of [`SampleNorm`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleNormParams {
    /// Total each record's features are scaled to.
    #[serde(default = "default_scaling_factor")]
    pub scaling_factor: f64,
}

/// Scales every record so its features sum to `scaling_factor`
/// (library-size normalization). Stateless: fitting is a no-op.
///
/// Records whose features sum to zero are left unchanged.
#[derive(Debug, Clone)]
pub struct SampleNorm {
    scaling_factor: f64,
}

impl SampleNorm {
    pub const NAME: &'static str = "SampleNorm";

    pub fn new(scaling_factor: f64) -> Result<Self> {
        if !scaling_factor.is_finite() || scaling_factor <= 0.0 {
            return Err(IngestionError::InvalidParams {
                strategy: Self::NAME.to_string(),
                reason: format!("`scaling_factor` must be positive, got {scaling_factor}"),
            });
        }
        Ok(Self { scaling_factor })
    }

    /// Build from a config, returning the config with defaults filled in.
    pub fn from_config(config: &StrategyConfig) -> Result<(Self, StrategyConfig)> {
        let (params, resolved): (SampleNormParams, _) = resolve_params(config)?;
        Ok((Self::new(params.scaling_factor)?, resolved))
    }
}

impl Preprocessor for SampleNorm {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn transform(&self, data: Dataset) -> Result<Dataset> {
        let (features, obs) = data.into_parts();

        let mut row_sums = vec![0.0; features.height()];
        for column in features.get_columns() {
            let values = float_values(column.as_materialized_series())?;
            for (sum, value) in row_sums.iter_mut().zip(values) {
                *sum += value.unwrap_or(0.0);
            }
        }

        let normalized = map_feature_columns(&features, |_, values| {
            Ok(values
                .into_iter()
                .zip(&row_sums)
                .map(|(v, &sum)| {
                    v.map(|v| if sum != 0.0 { v * self.scaling_factor / sum } else { v })
                })
                .collect())
        })?;
        drop(features);

        Dataset::new(normalized, obs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn column(data: &Dataset, name: &str) -> Vec<Option<f64>> {
        float_values(data.features().column(name).unwrap().as_materialized_series()).unwrap()
    }

    #[test]
    fn test_rows_sum_to_scaling_factor() {
        let features = df!("g1" => [1.0, 0.0, 3.0], "g2" => [3.0, 0.0, 1.0]).unwrap();
        let obs = df!("cell_type" => ["a", "b", "c"]).unwrap();
        let data = Dataset::new(features, obs).unwrap();

        let out = SampleNorm::new(100.0).unwrap().transform(data).unwrap();
        assert_eq!(column(&out, "g1"), vec![Some(25.0), Some(0.0), Some(75.0)]);
        assert_eq!(column(&out, "g2"), vec![Some(75.0), Some(0.0), Some(25.0)]);
    }

    #[test]
    fn test_invalid_scaling_factor() {
        let config = StrategyConfig::new("SampleNorm").with_param("scaling_factor", 0.0);
        assert!(matches!(
            SampleNorm::from_config(&config).unwrap_err(),
            IngestionError::InvalidParams { .. }
        ));
    }

    #[test]
    fn test_from_config_fills_defaults() {
        let (norm, resolved) = SampleNorm::from_config(&StrategyConfig::new("SampleNorm")).unwrap();
        assert_eq!(norm.scaling_factor, 1.0);
        assert_eq!(resolved.params["scaling_factor"], serde_json::json!(1.0));
    }
}
