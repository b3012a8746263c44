//! On-disk storage for datasets and structured artifacts.
//!
//! A dataset is a directory holding `features.parquet` and `obs.parquet`.
//! A partitioned dataset is a directory of numbered chunk directories
//! (`0/`, `1/`, ...), each a dataset. Readers accept either form.

use super::Dataset;
use crate::error::{IngestionError, Result, ResultExt};
use polars::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File holding the feature matrix of a dataset.
pub const FEATURES_FILE: &str = "features.parquet";

/// File holding the metadata table of a dataset.
pub const OBS_FILE: &str = "obs.parquet";

// =============================================================================
// Datasets
// =============================================================================

/// Read a whole dataset (single or chunked) into memory.
pub fn read_data(path: impl AsRef<Path>) -> Result<Dataset> {
    DatasetReader::open(path)?.read_all()
}

/// Read only the metadata tables of a dataset.
pub fn read_obs(path: impl AsRef<Path>) -> Result<DataFrame> {
    DatasetReader::open(path)?.read_obs()
}

/// Write a dataset into `dir` as a single (unchunked) dataset directory.
pub fn write_dataset(data: &Dataset, dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    write_parquet(data.features(), &dir.join(FEATURES_FILE))?;
    write_parquet(data.obs(), &dir.join(OBS_FILE))?;
    Ok(())
}

/// Write a dataset into `dir` as chunks of at most `chunksize` records.
///
/// With no chunk size the dataset is written as the single chunk `0/`.
pub fn write_chunked(data: &Dataset, chunksize: Option<usize>, dir: impl AsRef<Path>) -> Result<()> {
    let mut writer = ChunkWriter::create(dir)?;
    let n_obs = data.n_obs();

    match chunksize {
        Some(size) if size > 0 && n_obs > 0 => {
            for offset in (0..n_obs).step_by(size) {
                writer.write(&data.slice(offset, size.min(n_obs - offset)))?;
            }
        }
        _ => writer.write(data)?,
    }

    writer.finish()?;
    Ok(())
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    ParquetWriter::new(&mut file)
        .finish(&mut df.clone())
        .context(format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(IngestionError::DatasetNotFound(path.to_path_buf()));
    }
    ParquetReader::new(File::open(path)?)
        .finish()
        .context(format!("Failed to read {}", path.display()))
}

fn read_dataset_dir(dir: &Path) -> Result<Dataset> {
    let features = read_parquet(&dir.join(FEATURES_FILE))?;
    let obs = read_parquet(&dir.join(OBS_FILE))?;
    Dataset::new(features, obs).context(format!("In {}", dir.display()))
}

fn is_dataset_dir(dir: &Path) -> bool {
    dir.join(OBS_FILE).is_file() && dir.join(FEATURES_FILE).is_file()
}

/// Numbered chunk directories of `dir`, in chunk order.
fn chunk_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut chunks: Vec<(usize, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(index) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<usize>().ok())
        {
            chunks.push((index, entry.path()));
        }
    }
    chunks.sort_by_key(|(index, _)| *index);
    Ok(chunks.into_iter().map(|(_, path)| path).collect())
}

/// Chunked reader over a stored dataset.
///
/// Opening a reader only lists the chunks; data is read lazily through
/// [`chunks`](Self::chunks), [`read_all`](Self::read_all) or
/// [`read_obs`](Self::read_obs).
#[derive(Debug, Clone)]
pub struct DatasetReader {
    path: PathBuf,
    sources: Vec<PathBuf>,
}

impl DatasetReader {
    /// Open a single dataset directory or a directory of chunks.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(IngestionError::DatasetNotFound(path));
        }

        let sources = if is_dataset_dir(&path) {
            vec![path.clone()]
        } else {
            chunk_dirs(&path)?
        };

        if sources.is_empty() {
            return Err(IngestionError::DatasetNotFound(path));
        }

        debug!("Opened {} with {} chunk(s)", path.display(), sources.len());
        Ok(Self { path, sources })
    }

    /// Path the reader was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of chunks stored on disk.
    pub fn n_stored_chunks(&self) -> usize {
        self.sources.len()
    }

    /// Total number of records, reading metadata only.
    pub fn n_obs(&self) -> Result<usize> {
        let mut total = 0;
        for source in &self.sources {
            total += read_parquet(&source.join(OBS_FILE))?.height();
        }
        Ok(total)
    }

    /// Column names of the metadata table (taken from the first chunk).
    pub fn obs_column_names(&self) -> Result<Vec<String>> {
        let first = read_parquet(&self.sources[0].join(OBS_FILE))?;
        Ok(first
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect())
    }

    /// Iterate over the dataset in chunks of at most `chunksize` records.
    ///
    /// Stored chunks are re-batched to the requested size. With no chunk
    /// size the whole dataset is yielded at once. An empty dataset yields a
    /// single empty chunk so the schema is preserved downstream.
    pub fn chunks(&self, chunksize: Option<usize>) -> DatasetChunks<'_> {
        DatasetChunks {
            sources: self.sources.iter(),
            chunksize: chunksize.filter(|&size| size > 0),
            buffer: None,
            yielded: false,
        }
    }

    /// Read the whole dataset into memory.
    pub fn read_all(&self) -> Result<Dataset> {
        let mut chunks = self.chunks(None);
        chunks
            .next()
            .unwrap_or_else(|| Err(IngestionError::DatasetNotFound(self.path.clone())))
    }

    /// Read the metadata tables of all chunks.
    pub fn read_obs(&self) -> Result<DataFrame> {
        let mut obs: Option<DataFrame> = None;
        for source in &self.sources {
            let chunk = read_parquet(&source.join(OBS_FILE))?;
            obs = Some(match obs {
                Some(acc) => acc.vstack(&chunk)?,
                None => chunk,
            });
        }
        obs.ok_or_else(|| IngestionError::DatasetNotFound(self.path.clone()))
    }
}

/// Iterator returned by [`DatasetReader::chunks`].
pub struct DatasetChunks<'a> {
    sources: std::slice::Iter<'a, PathBuf>,
    chunksize: Option<usize>,
    buffer: Option<Dataset>,
    yielded: bool,
}

impl DatasetChunks<'_> {
    fn split_buffer(&mut self, size: usize) -> Option<Dataset> {
        let buffer = self.buffer.take()?;
        let n_obs = buffer.n_obs();
        if n_obs < size {
            self.buffer = Some(buffer);
            return None;
        }
        if n_obs > size {
            self.buffer = Some(buffer.slice(size, n_obs - size));
        }
        Some(buffer.slice(0, size))
    }
}

impl Iterator for DatasetChunks<'_> {
    type Item = Result<Dataset>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(size) = self.chunksize
                && let Some(chunk) = self.split_buffer(size)
            {
                self.yielded = true;
                return Some(Ok(chunk));
            }

            let Some(source) = self.sources.next() else {
                let rest = self.buffer.take()?;
                if rest.n_obs() == 0 && self.yielded {
                    return None;
                }
                self.yielded = true;
                return Some(Ok(rest));
            };

            let chunk = match read_dataset_dir(source) {
                Ok(chunk) => chunk,
                Err(e) => return Some(Err(e)),
            };

            self.buffer = Some(match self.buffer.take() {
                Some(buffer) => match buffer.vstack(&chunk) {
                    Ok(stacked) => stacked,
                    Err(e) => return Some(Err(e)),
                },
                None => chunk,
            });
        }
    }
}

/// Writes numbered chunk directories into a partition directory.
///
/// Creating the writer removes chunks left over from a previous run so a
/// rewritten partition never mixes old and new records.
pub struct ChunkWriter {
    dir: PathBuf,
    next_index: usize,
}

impl ChunkWriter {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        for stale in chunk_dirs(&dir)? {
            fs::remove_dir_all(stale)?;
        }
        Ok(Self { dir, next_index: 0 })
    }

    /// Write the next chunk.
    pub fn write(&mut self, chunk: &Dataset) -> Result<()> {
        write_dataset(chunk, self.dir.join(self.next_index.to_string()))?;
        self.next_index += 1;
        Ok(())
    }

    /// Finish writing, returning the number of chunks written.
    pub fn finish(self) -> Result<usize> {
        debug!("Wrote {} chunk(s) to {}", self.next_index, self.dir.display());
        Ok(self.next_index)
    }
}

// =============================================================================
// Structured artifacts (configs, split indices, label mappings)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StructuredFormat {
    Json,
    Yaml,
}

impl StructuredFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => Err(IngestionError::InvalidConfig(format!(
                "unsupported file type for '{}' (expected .json, .yaml or .yml)",
                path.display()
            ))),
        }
    }
}

/// Write any serializable structure as JSON or YAML, chosen by extension.
pub fn write_data<T: Serialize + ?Sized>(data: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let format = StructuredFormat::from_path(path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let contents = match format {
        StructuredFormat::Json => serde_json::to_string_pretty(data)?,
        StructuredFormat::Yaml => serde_yaml::to_string(data)?,
    };
    fs::write(path, contents)?;
    debug!("Saved {}", path.display());
    Ok(())
}

/// Read a structure written by [`write_data`].
pub fn read_structured<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let format = StructuredFormat::from_path(path)?;
    let contents = fs::read_to_string(path)?;

    Ok(match format {
        StructuredFormat::Json => serde_json::from_str(&contents)?,
        StructuredFormat::Yaml => serde_yaml::from_str(&contents)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn sample(n: usize) -> Dataset {
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let labels: Vec<String> = (0..n).map(|i| format!("c{}", i % 3)).collect();
        let features = DataFrame::new(vec![Series::new("g1".into(), values).into()]).unwrap();
        let obs = DataFrame::new(vec![Series::new("cell_type".into(), labels).into()]).unwrap();
        Dataset::new(features, obs).unwrap()
    }

    fn chunk_sizes(reader: &DatasetReader, chunksize: Option<usize>) -> Vec<usize> {
        reader
            .chunks(chunksize)
            .map(|chunk| chunk.unwrap().n_obs())
            .collect()
    }

    #[test]
    fn test_write_chunked_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample(10);

        write_chunked(&data, Some(4), dir.path()).unwrap();

        let reader = DatasetReader::open(dir.path()).unwrap();
        assert_eq!(reader.n_stored_chunks(), 3);
        assert_eq!(reader.n_obs().unwrap(), 10);

        let back = reader.read_all().unwrap();
        assert!(back.features().equals(data.features()));
        assert!(back.obs().equals(data.obs()));
    }

    #[test]
    fn test_unchunked_write_is_single_chunk() {
        let dir = tempfile::tempdir().unwrap();
        write_chunked(&sample(7), None, dir.path()).unwrap();
        assert_eq!(DatasetReader::open(dir.path()).unwrap().n_stored_chunks(), 1);
    }

    #[test]
    fn test_chunks_are_rebatched() {
        let dir = tempfile::tempdir().unwrap();
        write_chunked(&sample(10), Some(4), dir.path()).unwrap();
        let reader = DatasetReader::open(dir.path()).unwrap();

        assert_eq!(chunk_sizes(&reader, Some(3)), vec![3, 3, 3, 1]);
        assert_eq!(chunk_sizes(&reader, Some(5)), vec![5, 5]);
        assert_eq!(chunk_sizes(&reader, None), vec![10]);
    }

    #[test]
    fn test_empty_dataset_yields_one_empty_chunk() {
        let dir = tempfile::tempdir().unwrap();
        write_chunked(&sample(0), Some(4), dir.path()).unwrap();
        let reader = DatasetReader::open(dir.path()).unwrap();
        assert_eq!(chunk_sizes(&reader, Some(4)), vec![0]);
    }

    #[test]
    fn test_rewrite_removes_stale_chunks() {
        let dir = tempfile::tempdir().unwrap();
        write_chunked(&sample(10), Some(2), dir.path()).unwrap();
        write_chunked(&sample(3), None, dir.path()).unwrap();

        let reader = DatasetReader::open(dir.path()).unwrap();
        assert_eq!(reader.n_stored_chunks(), 1);
        assert_eq!(reader.n_obs().unwrap(), 3);
    }

    #[test]
    fn test_single_dataset_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(&sample(5), dir.path()).unwrap();

        let reader = DatasetReader::open(dir.path()).unwrap();
        assert_eq!(reader.n_stored_chunks(), 1);
        assert_eq!(reader.obs_column_names().unwrap(), vec!["cell_type".to_string()]);
        assert_eq!(read_obs(dir.path()).unwrap().height(), 5);
    }

    #[test]
    fn test_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_data(dir.path().join("nope")).unwrap_err(),
            IngestionError::DatasetNotFound(_)
        ));
        assert!(matches!(
            DatasetReader::open(dir.path()).unwrap_err(),
            IngestionError::DatasetNotFound(_)
        ));
    }

    #[test]
    fn test_write_data_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = BTreeMap::new();
        data.insert("a".to_string(), vec![1, 2]);

        let json_path = dir.path().join("nested/data.json");
        write_data(&data, &json_path).unwrap();
        let back: BTreeMap<String, Vec<i32>> = read_structured(&json_path).unwrap();
        assert_eq!(back, data);

        let yaml_path = dir.path().join("data.yaml");
        write_data(&data, &yaml_path).unwrap();
        let back: BTreeMap<String, Vec<i32>> = read_structured(&yaml_path).unwrap();
        assert_eq!(back, data);

        assert!(matches!(
            write_data(&data, dir.path().join("data.bin")).unwrap_err(),
            IngestionError::InvalidConfig(_)
        ));
    }
}
