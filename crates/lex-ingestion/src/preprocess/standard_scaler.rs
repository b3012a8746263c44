//! Per-feature standardization.

use super::{Preprocessor, map_feature_columns};
use crate::config::StrategyConfig;
use crate::error::{IngestionError, Result};
use crate::io::{Dataset, DatasetReader};
use crate::registry::resolve_params;
use crate::utils::float_values;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

fn enabled() -> bool {
    true
}

/// Parameters of [`StandardScaler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandardScalerParams {
    /// Subtract the per-feature mean.
    #[serde(default = "enabled")]
    pub with_mean: bool,

    /// Divide by the per-feature standard deviation.
    #[serde(default = "enabled")]
    pub with_std: bool,
}

/// Running mean/variance of one feature (Welford).
#[derive(Debug, Clone, Copy, Default)]
struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Population standard deviation; constant features scale by 1.
    fn std(&self) -> f64 {
        if self.count == 0 {
            return 1.0;
        }
        let std = (self.m2 / self.count as f64).sqrt();
        if std > 0.0 { std } else { 1.0 }
    }
}

/// Fitted per-feature `(mean, std)`.
#[derive(Debug, Clone)]
struct FittedScale {
    by_column: HashMap<String, (f64, f64)>,
}

/// Standardizes every feature to zero mean and unit variance, using
/// statistics computed on the train partition.
///
/// Missing values are ignored while fitting and stay missing.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    params: StandardScalerParams,
    fitted: Option<FittedScale>,
}

impl StandardScaler {
    pub const NAME: &'static str = "StandardScaler";

    pub fn new(params: StandardScalerParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    /// Build from a config, returning the config with defaults filled in.
    pub fn from_config(config: &StrategyConfig) -> Result<(Self, StrategyConfig)> {
        let (params, resolved) = resolve_params(config)?;
        Ok((Self::new(params), resolved))
    }

    /// Fitted `(mean, std)` of a feature.
    pub fn feature_scale(&self, column: &str) -> Option<(f64, f64)> {
        self.fitted.as_ref()?.by_column.get(column).copied()
    }
}

impl Preprocessor for StandardScaler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fit(&mut self, train: &DatasetReader, sample_chunksize: Option<usize>) -> Result<()> {
        let mut stats: Vec<(String, RunningStats)> = Vec::new();

        for chunk in train.chunks(sample_chunksize) {
            let chunk = chunk?;
            let features = chunk.features();
            if stats.is_empty() {
                stats = features
                    .get_column_names()
                    .into_iter()
                    .map(|name| (name.to_string(), RunningStats::default()))
                    .collect();
            }

            for (name, running) in stats.iter_mut() {
                let column = features
                    .column(name)
                    .map_err(|_| IngestionError::ColumnNotFound(name.clone()))?;
                for value in float_values(column.as_materialized_series())?.into_iter().flatten() {
                    running.push(value);
                }
            }
        }

        let by_column: HashMap<String, (f64, f64)> = stats
            .into_iter()
            .map(|(name, running)| (name, (running.mean, running.std())))
            .collect();
        debug!("StandardScaler fitted on {} features", by_column.len());
        self.fitted = Some(FittedScale { by_column });
        Ok(())
    }

    fn transform(&self, data: Dataset) -> Result<Dataset> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| IngestionError::NotFitted(Self::NAME.to_string()))?;
        let StandardScalerParams { with_mean, with_std } = self.params;

        let (features, obs) = data.into_parts();
        let scaled = map_feature_columns(&features, |name, values| {
            let (mean, std) = *fitted
                .by_column
                .get(name)
                .ok_or_else(|| IngestionError::ColumnNotFound(name.to_string()))?;
            let shift = if with_mean { mean } else { 0.0 };
            let scale = if with_std { std } else { 1.0 };
            Ok(values
                .into_iter()
                .map(|v| v.map(|v| (v - shift) / scale))
                .collect())
        })?;
        drop(features);

        Dataset::new(scaled, obs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::write_chunked;
    use polars::prelude::*;

    fn write_train(dir: &std::path::Path) {
        let features = df!("g1" => [1.0, 2.0, 3.0, 4.0], "g2" => [5.0, 5.0, 5.0, 5.0]).unwrap();
        let obs = df!("cell_type" => ["a", "b", "a", "b"]).unwrap();
        write_chunked(&Dataset::new(features, obs).unwrap(), Some(3), dir).unwrap();
    }

    fn column(data: &Dataset, name: &str) -> Vec<Option<f64>> {
        float_values(data.features().column(name).unwrap().as_materialized_series()).unwrap()
    }

    #[test]
    fn test_fit_streams_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        write_train(dir.path());
        let reader = DatasetReader::open(dir.path()).unwrap();

        let mut scaler = StandardScaler::new(StandardScalerParams { with_mean: true, with_std: true });
        scaler.fit(&reader, Some(2)).unwrap();

        let (mean, std) = scaler.feature_scale("g1").unwrap();
        assert!((mean - 2.5).abs() < 1e-12);
        assert!((std - 1.25f64.sqrt()).abs() < 1e-12);
        // constant feature
        assert_eq!(scaler.feature_scale("g2"), Some((5.0, 1.0)));
    }

    #[test]
    fn test_transform_standardizes() {
        let dir = tempfile::tempdir().unwrap();
        write_train(dir.path());
        let reader = DatasetReader::open(dir.path()).unwrap();

        let mut scaler = StandardScaler::new(StandardScalerParams { with_mean: true, with_std: false });
        scaler.fit(&reader, None).unwrap();

        let out = scaler.transform(reader.read_all().unwrap()).unwrap();
        assert_eq!(column(&out, "g1"), vec![Some(-1.5), Some(-0.5), Some(0.5), Some(1.5)]);
        assert_eq!(column(&out, "g2"), vec![Some(0.0); 4]);
        assert_eq!(out.obs().height(), 4);
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let scaler = StandardScaler::from_config(&StrategyConfig::new("StandardScaler")).unwrap().0;
        let data = Dataset::new(df!("g1" => [1.0]).unwrap(), df!("c" => ["a"]).unwrap()).unwrap();
        assert!(matches!(
            scaler.transform(data).unwrap_err(),
            IngestionError::NotFitted(_)
        ));
    }

    #[test]
    fn test_from_config_fills_defaults() {
        let config = StrategyConfig::new("StandardScaler").with_param("with_mean", false);
        let (scaler, resolved) = StandardScaler::from_config(&config).unwrap();
        assert!(!scaler.params.with_mean);
        assert!(scaler.params.with_std);
        assert_eq!(resolved.params["with_std"], serde_json::Value::Bool(true));
    }
}
