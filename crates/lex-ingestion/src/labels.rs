//! Integer label mappings for metadata columns.
//!
//! Every metadata column gets a dense `id <-> label` mapping derived from
//! its distinct values across all partitions. Labels are sorted before ids
//! are assigned, so the mapping does not depend on row order or on how
//! records were split.

use crate::error::{IngestionError, Result};
use crate::utils::{float_values, is_numeric_dtype, string_values};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Mapping for a single column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLabelMapping {
    /// Sorted distinct labels; a label's position is its id.
    pub id2label: Vec<String>,

    /// Inverse of `id2label`.
    pub label2id: BTreeMap<String, usize>,
}

impl ColumnLabelMapping {
    /// Build a mapping from labels that are already sorted and distinct.
    pub fn from_sorted(id2label: Vec<String>) -> Self {
        let label2id = id2label
            .iter()
            .enumerate()
            .map(|(id, label)| (label.clone(), id))
            .collect();
        Self { id2label, label2id }
    }

    /// Number of distinct labels.
    pub fn len(&self) -> usize {
        self.id2label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2label.is_empty()
    }
}

/// Mappings keyed by column name.
pub type LabelMappings = BTreeMap<String, ColumnLabelMapping>;

/// Build mappings for `columns` of the metadata table `obs`.
///
/// Nulls are skipped. Numeric columns are ordered by value, all other
/// columns lexicographically by their string form.
pub fn build_label_mappings(obs: &DataFrame, columns: &[String]) -> Result<LabelMappings> {
    let mut mappings = LabelMappings::new();

    for name in columns {
        let column = obs
            .column(name)
            .map_err(|_| IngestionError::ColumnNotFound(name.clone()))?;
        let series = column.as_materialized_series();

        let id2label = if is_numeric_dtype(series.dtype()) {
            sorted_numeric_labels(series)?
        } else {
            string_values(series)?
                .into_iter()
                .flatten()
                .collect::<BTreeSet<String>>()
                .into_iter()
                .collect()
        };

        mappings.insert(name.clone(), ColumnLabelMapping::from_sorted(id2label));
    }

    Ok(mappings)
}

fn sorted_numeric_labels(series: &Series) -> Result<Vec<String>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut labels: Vec<(f64, String)> = float_values(series)?
        .into_iter()
        .zip(string_values(series)?)
        .filter_map(|(value, label)| Some((value?, label?)))
        .filter(|(_, label)| seen.insert(label.clone()))
        .collect();
    labels.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(labels.into_iter().map(|(_, label)| label).collect())
}
