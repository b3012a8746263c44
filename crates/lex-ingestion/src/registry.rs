//! Name-based resolution of splitters and preprocessors.
//!
//! Config files select strategies by name (`{name, params}`). The
//! [`StrategyRegistry`] maps each name to a constructor that parses the
//! params, applies defaults and returns the strategy together with the
//! fully resolved config, which the pipeline writes back.

use crate::config::StrategyConfig;
use crate::error::{IngestionError, Result};
use crate::preprocess::{Preprocessor, SampleNorm, StandardScaler};
use crate::split::{GroupSplitter, SimpleSplitter, Splitter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Constructor of a splitter from its config.
pub type SplitterFactory =
    Box<dyn Fn(&StrategyConfig) -> Result<(Box<dyn Splitter>, StrategyConfig)> + Send + Sync>;

/// Constructor of a preprocessor from its config.
pub type PreprocessorFactory =
    Box<dyn Fn(&StrategyConfig) -> Result<(Box<dyn Preprocessor>, StrategyConfig)> + Send + Sync>;

/// Parse a strategy's params into `P`, filling in defaults.
///
/// Returns the parsed params and a copy of `config` whose params are the
/// re-serialized, fully explicit values.
pub fn resolve_params<P>(config: &StrategyConfig) -> Result<(P, StrategyConfig)>
where
    P: DeserializeOwned + Serialize,
{
    let params: P = serde_json::from_value(Value::Object(config.params.clone())).map_err(|e| {
        IngestionError::InvalidParams {
            strategy: config.name.clone(),
            reason: e.to_string(),
        }
    })?;

    let resolved = match serde_json::to_value(&params)? {
        Value::Object(map) => map,
        other => {
            return Err(IngestionError::InvalidParams {
                strategy: config.name.clone(),
                reason: format!("params must serialize to a map, got {other}"),
            });
        }
    };

    Ok((
        params,
        StrategyConfig {
            name: config.name.clone(),
            params: resolved,
        },
    ))
}

/// Registry of strategy constructors keyed by name.
///
/// `StrategyRegistry::default()` knows every built-in strategy. Entries
/// registered later replace earlier ones with the same name.
pub struct StrategyRegistry {
    splitters: HashMap<String, SplitterFactory>,
    preprocessors: HashMap<String, PreprocessorFactory>,
}

impl StrategyRegistry {
    /// Registry without any strategies.
    pub fn empty() -> Self {
        Self {
            splitters: HashMap::new(),
            preprocessors: HashMap::new(),
        }
    }

    /// Register a splitter constructor under `name`.
    pub fn register_splitter<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&StrategyConfig) -> Result<(Box<dyn Splitter>, StrategyConfig)> + Send + Sync + 'static,
    {
        self.splitters.insert(name.into(), Box::new(factory));
        self
    }

    /// Register a preprocessor constructor under `name`.
    pub fn register_preprocessor<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&StrategyConfig) -> Result<(Box<dyn Preprocessor>, StrategyConfig)>
            + Send
            + Sync
            + 'static,
    {
        self.preprocessors.insert(name.into(), Box::new(factory));
        self
    }

    /// Build the splitter named in `config`.
    pub fn build_splitter(
        &self,
        config: &StrategyConfig,
    ) -> Result<(Box<dyn Splitter>, StrategyConfig)> {
        let factory = self
            .splitters
            .get(&config.name)
            .ok_or_else(|| IngestionError::UnknownStrategy {
                kind: "splitter",
                name: config.name.clone(),
            })?;
        factory(config)
    }

    /// Build the preprocessor named in `config`.
    pub fn build_preprocessor(
        &self,
        config: &StrategyConfig,
    ) -> Result<(Box<dyn Preprocessor>, StrategyConfig)> {
        let factory = self
            .preprocessors
            .get(&config.name)
            .ok_or_else(|| IngestionError::UnknownStrategy {
                kind: "preprocessor",
                name: config.name.clone(),
            })?;
        factory(config)
    }

    /// Registered splitter names, sorted.
    pub fn splitter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.splitters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered preprocessor names, sorted.
    pub fn preprocessor_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.preprocessors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register_splitter(SimpleSplitter::NAME, |config| {
                let (splitter, resolved) = SimpleSplitter::from_config(config)?;
                Ok((Box::new(splitter) as Box<dyn Splitter>, resolved))
            })
            .register_splitter(GroupSplitter::NAME, |config| {
                let (splitter, resolved) = GroupSplitter::from_config(config)?;
                Ok((Box::new(splitter) as Box<dyn Splitter>, resolved))
            })
            .register_preprocessor(StandardScaler::NAME, |config| {
                let (preprocessor, resolved) = StandardScaler::from_config(config)?;
                Ok((Box::new(preprocessor) as Box<dyn Preprocessor>, resolved))
            })
            .register_preprocessor(SampleNorm::NAME, |config| {
                let (preprocessor, resolved) = SampleNorm::from_config(config)?;
                Ok((Box::new(preprocessor) as Box<dyn Preprocessor>, resolved))
            });
        registry
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("splitters", &self.splitter_names())
            .field("preprocessors", &self.preprocessor_names())
            .finish()
    }
}
