//! On-demand urban heat analysis of satellite imagery.
//!
//! `(lat, lon, radius)` -> covering tiles fetched concurrently -> stitched
//! mosaic -> tiled segmentation into building / vegetation masks -> heat
//! influence field. The raster work lives in `heatgrid`; this crate owns
//! the network, the model contract and the orchestration.

pub mod config;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod inference;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod registry;

pub use error::{AnalysisError, InferenceError, ModelError, TileError};
pub use fetcher::{FetchedRegion, TileFetcher};
pub use inference::{ClassMapping, Segmentation, TileInferenceEngine};
pub use metrics::Metrics;
pub use model::{ClassProbabilities, ColorIndexModel, ColorIndexParams, SegmentationModel, TileBatch};
pub use pipeline::{RegionAnalysis, RegionAnalyzer, RegionImagery, TemperatureScale};
pub use provider::{HttpTileProvider, TileProvider};
pub use registry::ResultRegistry;
