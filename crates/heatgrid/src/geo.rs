//! Spherical Mercator projection and region geometry in the global tile grid.
//!
//! Projected coordinates are expressed in *tile units*: at zoom `z` the world
//! spans `[0, 2^z)` on both axes, and multiplying by the tile size gives the
//! continuous pixel position in the global raster.

use crate::raster::PixelRect;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// `sin(lat)` is clamped to this magnitude to keep the Mercator log finite.
pub const MERCATOR_SIN_CLAMP: f64 = 0.9999;

/// Highest zoom level whose tile indices still fit in a `u32`.
pub const MAX_ZOOM: u8 = 30;

/// Largest canvas a single region may stitch, in pixels (8192 x 8192).
pub const MAX_REGION_PIXELS: usize = 1 << 26;

/// Largest number of covering tiles a single region may request.
pub const MAX_REGION_TILES: usize = 4096;

/// Geographic rectangle in degrees, stored as (north, west, south, east).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBoundingBox {
    pub north_lat: f64,
    pub west_lon: f64,
    pub south_lat: f64,
    pub east_lon: f64,
}

impl GeoBoundingBox {
    /// Builds a bounding box from its four edges, normalising longitudes into
    /// `[-180, 180]` first.
    pub fn new(north_lat: f64, west_lon: f64, south_lat: f64, east_lon: f64) -> Result<Self> {
        let bbox = Self {
            north_lat,
            west_lon: normalize_lon(west_lon),
            south_lat,
            east_lon: normalize_lon(east_lon),
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Square box of half-size `radius_deg` centred on `(lat, lon)`.
    pub fn around(lat: f64, lon: f64, radius_deg: f64) -> Result<Self> {
        if !(radius_deg.is_finite() && radius_deg > 0.0) {
            return Err(Error::InvalidBoundingBox(format!(
                "analysis radius must be a positive number of degrees, got {radius_deg}"
            )));
        }
        Self::new(lat + radius_deg, lon - radius_deg, lat - radius_deg, lon + radius_deg)
    }

    fn validate(&self) -> Result<()> {
        let finite = [self.north_lat, self.west_lon, self.south_lat, self.east_lon]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(Error::InvalidBoundingBox(format!("non-finite edge in {self:?}")));
        }
        if self.north_lat <= self.south_lat {
            return Err(Error::InvalidBoundingBox(format!(
                "north_lat {} must exceed south_lat {}",
                self.north_lat, self.south_lat
            )));
        }
        if self.east_lon <= self.west_lon {
            return Err(Error::InvalidBoundingBox(format!(
                "east_lon {} must exceed west_lon {} (antimeridian crossing is unsupported)",
                self.east_lon, self.west_lon
            )));
        }
        Ok(())
    }
}

/// Wraps a longitude into `[-180, 180]`, leaving in-range values untouched.
pub fn normalize_lon(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// Integer tile index in the global grid at a given zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoordinate {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TileCoordinate {
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }
}

impl std::fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Continuous position in the global grid, in tile units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
}

impl ProjectedPoint {
    /// Position in global pixels for the given tile size.
    #[inline]
    pub fn to_pixels(self, tile_size: u32) -> (i64, i64) {
        let ts = tile_size as f64;
        ((self.x * ts).floor() as i64, (self.y * ts).floor() as i64)
    }
}

/// Spherical Mercator forward transform for a world of `scale` tiles per side.
#[inline]
pub fn project_with_scale(lat: f64, lon: f64, scale: f64) -> ProjectedPoint {
    let siny = (lat * std::f64::consts::PI / 180.0)
        .sin()
        .clamp(-MERCATOR_SIN_CLAMP, MERCATOR_SIN_CLAMP);

    let x = scale * (0.5 + lon / 360.0);
    let y = scale * (0.5 - ((1.0 + siny) / (1.0 - siny)).ln() / (4.0 * std::f64::consts::PI));

    ProjectedPoint { x, y }
}

/// `2^zoom` as a float, rejecting zooms whose tile indices overflow `u32`.
pub fn zoom_scale(zoom: u8) -> Result<f64> {
    if zoom > MAX_ZOOM {
        return Err(Error::InvalidZoom(zoom));
    }
    Ok((1u64 << zoom) as f64)
}

/// Pixel extent of a region in the global raster and the tiles covering it.
///
/// `origin_*` is the global pixel of the region's top-left corner; the region
/// spans `[origin_x, origin_x + width) x [origin_y, origin_y + height)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionGeometry {
    pub zoom: u8,
    pub tile_size: u32,
    pub origin_x: i64,
    pub origin_y: i64,
    pub width: usize,
    pub height: usize,
    pub tile_x_min: u32,
    pub tile_x_max: u32,
    pub tile_y_min: u32,
    pub tile_y_max: u32,
}

impl RegionGeometry {
    /// Projects the north-west and south-east corners of `bbox` and derives
    /// the canvas size and tile range from their pixel offsets.
    pub fn from_bbox(bbox: &GeoBoundingBox, zoom: u8, tile_size: u32) -> Result<Self> {
        let scale = zoom_scale(zoom)?;
        let top_left = project_with_scale(bbox.north_lat, bbox.west_lon, scale);
        let bottom_right = project_with_scale(bbox.south_lat, bbox.east_lon, scale);

        let (left, top) = top_left.to_pixels(tile_size);
        let (right, bottom) = bottom_right.to_pixels(tile_size);

        Self::from_pixels(zoom, tile_size, left, top, right, bottom)
    }

    /// Region spanning global pixels `[left, right) x [top, bottom)`.
    ///
    /// The region must overlap the world raster `[0, 2^zoom * tile_size)` on
    /// both axes and stay within [`MAX_REGION_PIXELS`] and [`MAX_REGION_TILES`].
    pub fn from_pixels(
        zoom: u8,
        tile_size: u32,
        left: i64,
        top: i64,
        right: i64,
        bottom: i64,
    ) -> Result<Self> {
        if tile_size == 0 {
            return Err(Error::InvalidTileSize);
        }
        let scale = zoom_scale(zoom)? as i64;

        let width = right - left;
        let height = bottom - top;
        if width <= 0 || height <= 0 {
            return Err(Error::InvalidBoundingBox(format!(
                "region is {width}x{height} px at zoom {zoom}"
            )));
        }

        let ts = tile_size as i64;
        let world = scale * ts;
        if right <= 0 || bottom <= 0 || left >= world || top >= world {
            return Err(Error::InvalidBoundingBox(format!(
                "region [{left}, {right}) x [{top}, {bottom}) px lies outside the {world} px world at zoom {zoom}"
            )));
        }

        let pixels = width.checked_mul(height).and_then(|p| usize::try_from(p).ok());
        if !pixels.is_some_and(|p| p <= MAX_REGION_PIXELS) {
            return Err(Error::InvalidBoundingBox(format!(
                "region is {width}x{height} px at zoom {zoom}, limit is {MAX_REGION_PIXELS} px"
            )));
        }

        let clamp_tile = |v: i64| v.clamp(0, scale - 1) as u32;
        let geometry = Self {
            zoom,
            tile_size,
            origin_x: left,
            origin_y: top,
            width: width as usize,
            height: height as usize,
            tile_x_min: clamp_tile(left.div_euclid(ts)),
            tile_x_max: clamp_tile((right - 1).div_euclid(ts)),
            tile_y_min: clamp_tile(top.div_euclid(ts)),
            tile_y_max: clamp_tile((bottom - 1).div_euclid(ts)),
        };
        if geometry.tile_count() > MAX_REGION_TILES {
            return Err(Error::InvalidBoundingBox(format!(
                "region needs {} tiles at zoom {zoom}, limit is {MAX_REGION_TILES}",
                geometry.tile_count()
            )));
        }
        Ok(geometry)
    }

    pub fn tiles_wide(&self) -> usize {
        (self.tile_x_max - self.tile_x_min + 1) as usize
    }

    pub fn tiles_high(&self) -> usize {
        (self.tile_y_max - self.tile_y_min + 1) as usize
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_wide() * self.tiles_high()
    }

    /// Covering tiles in row-major order (top-to-bottom, left-to-right).
    pub fn tiles(&self) -> impl Iterator<Item = TileCoordinate> + '_ {
        (self.tile_y_min..=self.tile_y_max).flat_map(move |y| {
            (self.tile_x_min..=self.tile_x_max).map(move |x| TileCoordinate::new(x, y, self.zoom))
        })
    }

    /// Source rectangle inside `tile` and destination rectangle in the canvas
    /// for the visible part of the tile, or `None` if nothing is visible.
    pub fn placement(&self, tile: TileCoordinate) -> Option<(PixelRect, PixelRect)> {
        let ts = self.tile_size as i64;

        // Tile's placement rectangle relative to the canvas origin.
        let rel_left = tile.x as i64 * ts - self.origin_x;
        let rel_top = tile.y as i64 * ts - self.origin_y;

        let dst_left = rel_left.max(0);
        let dst_right = (rel_left + ts).min(self.width as i64);
        let dst_top = rel_top.max(0);
        let dst_bottom = (rel_top + ts).min(self.height as i64);

        if dst_right <= dst_left || dst_bottom <= dst_top {
            return None;
        }

        let dst = PixelRect::new(
            dst_left as usize,
            dst_top as usize,
            (dst_right - dst_left) as usize,
            (dst_bottom - dst_top) as usize,
        );
        let src = PixelRect::new(
            (dst_left - rel_left) as usize,
            (dst_top - rel_top) as usize,
            dst.width,
            dst.height,
        );

        Some((src, dst))
    }
}
