//! Generic read/write collaborators.
//!
//! The orchestrator only talks to storage through this module:
//! [`read_data`] / [`DatasetReader`] for tabular data and [`write_data`]
//! for serializable artifacts such as split indices and label mappings.

mod dataset;
mod store;

pub use dataset::Dataset;
pub use store::{
    ChunkWriter, DatasetChunks, DatasetReader, FEATURES_FILE, OBS_FILE, read_data, read_obs,
    read_structured, write_chunked, write_data, write_dataset,
};
