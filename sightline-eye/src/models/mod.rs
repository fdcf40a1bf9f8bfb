//! Model acquisition and detector lifecycle

pub mod cache;
pub mod fetcher;
pub mod manager;

pub use cache::ModelCache;
pub use fetcher::{
    collect_chunks, ChannelObserver, DownloadProgress, HttpModelFetcher, ModelFetcher, NoProgress,
    ProgressObserver, MAX_MODEL_SIZE,
};
pub use manager::{ActiveDetector, DetectorManager, ModelParameters, RebuildOutcome};
