//! Assembles fetched tiles into a single region mosaic.

use crate::geo::{RegionGeometry, TileCoordinate};
use crate::raster::{Mosaic, TileImage};
use crate::{Error, Result};

/// Outcome of a stitch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StitchReport {
    pub tiles_total: usize,
    pub tiles_placed: usize,
    /// Tiles whose area was left zero-filled because no image was available.
    pub tiles_missing: Vec<TileCoordinate>,
}

impl StitchReport {
    pub fn any_placed(&self) -> bool {
        self.tiles_placed > 0
    }
}

/// Copies the visible part of every available tile into a zero-filled canvas
/// sized from `geometry`.
///
/// The canvas is allocated before any tile is placed, so partial edge tiles
/// are cropped against it and areas of missing tiles stay zero.
pub fn stitch<I>(geometry: &RegionGeometry, tiles: I) -> Result<(Mosaic, StitchReport)>
where
    I: IntoIterator<Item = (TileCoordinate, Option<TileImage>)>,
{
    let ts = geometry.tile_size as usize;
    let mut canvas = Mosaic::rgb(geometry.width, geometry.height);
    let mut report = StitchReport::default();

    for (coord, image) in tiles {
        report.tiles_total += 1;

        let Some(image) = image else {
            report.tiles_missing.push(coord);
            continue;
        };

        if image.width() != ts || image.height() != ts || image.channels() != 3 {
            return Err(Error::ShapeMismatch {
                expected: (ts, ts),
                actual: image.shape(),
            });
        }

        let Some((src, dst)) = geometry.placement(coord) else {
            continue;
        };

        canvas.blit(&image, src, dst.x, dst.y)?;
        report.tiles_placed += 1;
    }

    Ok((canvas, report))
}
