//! HEATGRID: raster core for on-demand urban heat analysis.
//!
//! - Spherical Mercator projection of geodetic coordinates into the global
//!   tile/pixel grid at a zoom level (`geo`).
//! - Pixel-exact stitching of fixed-size map tiles into a region mosaic,
//!   cropping partial edge tiles (`stitch`).
//! - Crop-to-multiple, row-major tiling and untiling for fixed-input
//!   segmentation models (`tiling`).
//! - Synthesis of a signed heat influence field from building and vegetation
//!   masks (`heat`), plus region statistics (`summary`).
//!
//! Raster layout (all containers):
//!   row-major, `data[(y * width + x) * channels + c]`
//!   Mosaic / TileImage : u8, 3 channels (RGB)
//!   Mask               : u8, 1 channel, values {0, 1}
//!   HeatField          : f32, 1 channel, nominally [-1, 1]
//!
//! Nothing in this crate performs I/O; every function is a pure transform of
//! its inputs.

pub mod geo;
pub mod heat;
pub mod raster;
pub mod stitch;
pub mod summary;
pub mod tiling;

pub use geo::{project_with_scale, GeoBoundingBox, ProjectedPoint, RegionGeometry, TileCoordinate};
pub use heat::{synthesize_heat_field, temperature_map, HeatField, HeatMethod, HeatParams, EPS};
pub use raster::{Grid, Mask, Mosaic, PixelRect, TileImage};
pub use stitch::{stitch, StitchReport};
pub use summary::{FieldStats, RegionSummary};
pub use tiling::{crop_to_multiple, split_into_tiles, untile};

/// Errors produced by the raster core.
///
/// All variants are configuration or contract errors: retrying with the same
/// input reproduces them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("zoom level {0} is outside the supported range 0..=30")]
    InvalidZoom(u8),

    #[error("unknown heat field method `{0}` (expected weighted, ndui or signed_distance)")]
    UnknownHeatMethod(String),

    #[error("invalid heat parameters: {0}")]
    InvalidHeatParams(String),

    #[error("raster shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("tile size must be positive")]
    InvalidTileSize,
}

pub type Result<T> = std::result::Result<T, Error>;
