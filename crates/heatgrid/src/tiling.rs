//! Fixed-size square tiling for models with a fixed input resolution.
//!
//! Cropping keeps the top-left of the raster and discards the right/bottom
//! remainder strips. The loss is intentional and keeps results reproducible
//! across runs on the same region.

use crate::raster::{Grid, PixelRect};
use crate::{Error, Result};

/// Crops `grid` from the top-left so both dimensions are multiples of `tile`.
pub fn crop_to_multiple<T: Copy>(grid: &Grid<T>, tile: usize) -> Result<Grid<T>> {
    if tile == 0 {
        return Err(Error::InvalidTileSize);
    }
    let width = grid.width() - grid.width() % tile;
    let height = grid.height() - grid.height() % tile;
    grid.crop(PixelRect::new(0, 0, width, height))
}

/// Splits `grid` into `tile x tile` pieces in row-major order.
///
/// Both dimensions must already be multiples of `tile`.
pub fn split_into_tiles<T: Copy>(grid: &Grid<T>, tile: usize) -> Result<Vec<Grid<T>>> {
    if tile == 0 {
        return Err(Error::InvalidTileSize);
    }
    if grid.width() % tile != 0 || grid.height() % tile != 0 {
        return Err(Error::ShapeMismatch {
            expected: (
                grid.height() - grid.height() % tile,
                grid.width() - grid.width() % tile,
            ),
            actual: grid.shape(),
        });
    }

    let mut tiles = Vec::with_capacity((grid.width() / tile) * (grid.height() / tile));
    for y in (0..grid.height()).step_by(tile) {
        for x in (0..grid.width()).step_by(tile) {
            tiles.push(grid.crop(PixelRect::new(x, y, tile, tile))?);
        }
    }
    Ok(tiles)
}

/// Reassembles row-major `tiles` into a `height x width` raster.
pub fn untile<T: Copy + Default>(
    tiles: &[Grid<T>],
    height: usize,
    width: usize,
    tile: usize,
) -> Result<Grid<T>> {
    if tile == 0 {
        return Err(Error::InvalidTileSize);
    }
    let tiles_x = width / tile;
    let tiles_y = height / tile;
    if tiles_x * tile != width || tiles_y * tile != height || tiles.len() != tiles_x * tiles_y {
        return Err(Error::ShapeMismatch {
            expected: (tiles_y * tile, tiles_x * tile),
            actual: (height, width),
        });
    }

    let channels = tiles.first().map_or(1, Grid::channels);
    let mut out = Grid::filled(width, height, channels, T::default());

    for (i, t) in tiles.iter().enumerate() {
        if t.width() != tile || t.height() != tile {
            return Err(Error::ShapeMismatch {
                expected: (tile, tile),
                actual: t.shape(),
            });
        }
        let (ty, tx) = (i / tiles_x, i % tiles_x);
        out.blit(t, PixelRect::new(0, 0, tile, tile), tx * tile, ty * tile)?;
    }

    Ok(out)
}
