use heatgrid::TileCoordinate;

/// Failure of a single tile request. Recovered locally by the fetcher: the
/// tile's area of the mosaic stays blank.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TileError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("provider answered with HTTP {0}")]
    Status(u16),

    #[error("could not decode tile image: {0}")]
    Decode(String),

    #[error("tile is {width}x{height}, expected {expected}x{expected}")]
    UnexpectedSize {
        width: u32,
        height: u32,
        expected: u32,
    },
}

/// Errors raised while loading or running a segmentation model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read model parameters: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed model parameters: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid model parameters: {0}")]
    InvalidParams(String),

    #[error("model expects {expected}x{expected} tiles, batch has {actual}x{actual}")]
    InputSize { expected: usize, actual: usize },

    #[error("prediction failed: {0}")]
    Predict(String),
}

/// Fatal errors of the tiled segmentation pass.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("mosaic is {width}x{height}, smaller than the {tile}x{tile} model input")]
    MosaicSmallerThanTile {
        width: usize,
        height: usize,
        tile: usize,
    },

    #[error("model output shape {actual:?} does not match batch shape {expected:?}")]
    BatchShapeMismatch {
        expected: [usize; 4],
        actual: [usize; 4],
    },

    #[error("class index {class} is outside the model's {num_classes} classes")]
    ClassOutOfRange { class: usize, num_classes: usize },

    #[error(transparent)]
    Prediction(#[from] ModelError),

    #[error(transparent)]
    Raster(#[from] heatgrid::Error),
}

/// Request-level outcome of a region analysis.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Bad coordinates, radius, zoom or heat parameters. Never retried.
    #[error("invalid configuration: {0}")]
    Config(#[from] heatgrid::Error),

    /// Every tile of the region failed.
    #[error("no imagery available: all {tiles_total} tiles failed (first: {first_missing:?})")]
    NoImagery {
        tiles_total: usize,
        first_missing: Option<TileCoordinate>,
    },

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl AnalysisError {
    /// True for transient conditions (tile provider outage) where retrying
    /// the same request can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::NoImagery { .. })
    }
}

impl From<tokio::task::JoinError> for AnalysisError {
    fn from(e: tokio::task::JoinError) -> Self {
        AnalysisError::Worker(e.to_string())
    }
}
