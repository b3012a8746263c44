//! Shared helpers for working with Polars columns.

use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

// =============================================================================
// Series Conversion Utilities
// =============================================================================

/// Values of a Series as `f64`, casting if needed.
pub fn float_values(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let casted = series.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

/// Values of a Series rendered as strings; nulls stay `None`.
pub fn string_values(series: &Series) -> PolarsResult<Vec<Option<String>>> {
    let casted = series.cast(&DataType::String)?;
    Ok(casted
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Common dtype for one label column seen across several partitions.
///
/// Equal numeric dtypes are kept. Mixed numeric dtypes widen to `Float64` if
/// any side is a float and to `Int64` otherwise. Anything non-numeric falls
/// back to `String`.
fn common_label_dtype<'a>(dtypes: impl IntoIterator<Item = &'a DataType>) -> DataType {
    let mut common: Option<DataType> = None;
    for dtype in dtypes {
        if !is_numeric_dtype(dtype) {
            return DataType::String;
        }
        common = Some(match common {
            None => dtype.clone(),
            Some(current) if &current == dtype => current,
            Some(current) if current.is_float() || dtype.is_float() => DataType::Float64,
            Some(_) => DataType::Int64,
        });
    }
    common.unwrap_or(DataType::String)
}

/// Cast the label columns of several partition tables to a shared dtype so
/// they can be stacked (e.g. `Int64` in train and `Float64` in val, or
/// categorical in one and string in another).
///
/// Every frame must carry the columns of the first one.
pub fn normalize_label_dtypes(frames: &[DataFrame]) -> PolarsResult<Vec<DataFrame>> {
    let Some(first) = frames.first() else {
        return Ok(Vec::new());
    };

    let mut targets = Vec::with_capacity(first.width());
    for name in first.get_column_names() {
        let dtypes = frames
            .iter()
            .map(|df| df.column(name.as_str()).map(|col| col.dtype().clone()))
            .collect::<PolarsResult<Vec<DataType>>>()?;
        targets.push((name.clone(), common_label_dtype(&dtypes)));
    }

    frames
        .iter()
        .map(|df| {
            let columns = targets
                .iter()
                .map(|(name, dtype)| {
                    let col = df.column(name.as_str())?;
                    if col.dtype() == dtype {
                        Ok(col.clone())
                    } else {
                        col.cast(dtype)
                    }
                })
                .collect::<PolarsResult<Vec<Column>>>()?;
            DataFrame::new(columns)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float32));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_float_values_casts_integers() {
        let series = Series::new("n_genes".into(), &[Some(1i64), None, Some(3)]);
        assert_eq!(
            float_values(&series).unwrap(),
            vec![Some(1.0), None, Some(3.0)]
        );
    }

    #[test]
    fn test_normalize_label_dtypes() {
        let frames = [
            df!("donor" => ["d1", "d2"], "batch" => [1i32, 2]).unwrap(),
            df!("donor" => ["d3"], "batch" => [3i32]).unwrap(),
        ];
        let normalized = normalize_label_dtypes(&frames).unwrap();
        for df in &normalized {
            assert_eq!(df.column("donor").unwrap().dtype(), &DataType::String);
            assert_eq!(df.column("batch").unwrap().dtype(), &DataType::Int32);
        }
    }

    #[test]
    fn test_normalize_label_dtypes_widens_mixed_numerics() {
        let frames = [
            df!("batch" => [1i64, 2], "plate" => [1i32, 2], "lane" => [1i64]).unwrap(),
            df!("batch" => [1.0f64, 3.0], "plate" => [3i64, 4], "lane" => ["L2"]).unwrap(),
        ];
        let normalized = normalize_label_dtypes(&frames).unwrap();
        for df in &normalized {
            assert_eq!(df.column("batch").unwrap().dtype(), &DataType::Float64);
            assert_eq!(df.column("plate").unwrap().dtype(), &DataType::Int64);
            assert_eq!(df.column("lane").unwrap().dtype(), &DataType::String);
        }

        let stacked = normalized[0].vstack(&normalized[1]).unwrap();
        assert_eq!(stacked.height(), 4);
    }
}
