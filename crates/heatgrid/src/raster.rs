//! Row-major raster containers shared by every stage of the pipeline.

use crate::{Error, Result};

/// Axis-aligned pixel rectangle `[x, x + width) x [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelRect {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn right(&self) -> usize {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> usize {
        self.y + self.height
    }
}

/// Interleaved `height x width x channels` raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<T>,
}

/// RGB mosaic assembled from map tiles.
pub type Mosaic = Grid<u8>;

/// A single decoded square map tile (RGB).
pub type TileImage = Grid<u8>;

/// Binary single-channel mask with values in `{0, 1}`.
pub type Mask = Grid<u8>;

impl<T: Copy> Grid<T> {
    /// Raster of the given shape with every sample set to `fill`.
    pub fn filled(width: usize, height: usize, channels: usize, fill: T) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![fill; width * height * channels],
        }
    }

    /// Wraps an existing buffer, checking its length against the shape.
    pub fn from_vec(width: usize, height: usize, channels: usize, data: Vec<T>) -> Result<Self> {
        let want = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(channels))
            .ok_or(Error::ShapeMismatch {
                expected: (height, width),
                actual: (data.len(), 1),
            })?;
        if data.len() != want {
            return Err(Error::ShapeMismatch {
                expected: (want, 1),
                actual: (data.len(), 1),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// `(height, width)`, matching the order used in error messages.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        (y * self.width + x) * self.channels
    }

    /// All channels of the pixel at `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[T] {
        let i = self.index(x, y);
        &self.data[i..i + self.channels]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [T] {
        let i = self.index(x, y);
        let c = self.channels;
        &mut self.data[i..i + c]
    }

    /// First channel of the pixel at `(x, y)`.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let i = self.index(x, y);
        self.data[i] = value;
    }

    /// Copies `rect` out into a new raster.
    pub fn crop(&self, rect: PixelRect) -> Result<Self> {
        if rect.right() > self.width || rect.bottom() > self.height {
            return Err(Error::ShapeMismatch {
                expected: (self.height, self.width),
                actual: (rect.bottom(), rect.right()),
            });
        }

        let c = self.channels;
        let mut data = Vec::with_capacity(rect.width * rect.height * c);
        for y in rect.y..rect.bottom() {
            let start = self.index(rect.x, y);
            data.extend_from_slice(&self.data[start..start + rect.width * c]);
        }

        Ok(Self {
            width: rect.width,
            height: rect.height,
            channels: c,
            data,
        })
    }

    /// Copies `src_rect` of `src` into `self` with its top-left at
    /// `(dst_x, dst_y)`. Both rectangles must lie inside their rasters.
    pub fn blit(&mut self, src: &Self, src_rect: PixelRect, dst_x: usize, dst_y: usize) -> Result<()> {
        if src.channels != self.channels {
            return Err(Error::ShapeMismatch {
                expected: (self.channels, 1),
                actual: (src.channels, 1),
            });
        }
        if src_rect.right() > src.width
            || src_rect.bottom() > src.height
            || dst_x + src_rect.width > self.width
            || dst_y + src_rect.height > self.height
        {
            return Err(Error::ShapeMismatch {
                expected: (self.height, self.width),
                actual: (dst_y + src_rect.height, dst_x + src_rect.width),
            });
        }

        let span = src_rect.width * self.channels;
        for row in 0..src_rect.height {
            let s = src.index(src_rect.x, src_rect.y + row);
            let d = self.index(dst_x, dst_y + row);
            self.data[d..d + span].copy_from_slice(&src.data[s..s + span]);
        }
        Ok(())
    }

    /// Applies `f` to every sample, keeping the shape.
    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Grid<U> {
        Grid {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }
}

impl Grid<u8> {
    /// Zero-filled RGB raster.
    pub fn rgb(width: usize, height: usize) -> Self {
        Self::filled(width, height, 3, 0)
    }

    /// Zero-filled single-channel mask.
    pub fn mask(width: usize, height: usize) -> Self {
        Self::filled(width, height, 1, 0)
    }

    /// Number of non-zero samples.
    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}
