//! Segmentation model contract and the built-in colour-index model.

use crate::error::ModelError;
use rayon::prelude::*;
use serde::Deserialize;
use std::path::Path;

/// `N x T x T x 3` batch of RGB tiles, values in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct TileBatch {
    data: Vec<f32>,
    len: usize,
    tile_size: usize,
}

impl TileBatch {
    /// Normalises `tiles` (RGB, `tile_size` square) into a single batch.
    pub fn from_tiles(tiles: &[heatgrid::TileImage], tile_size: usize) -> Result<Self, ModelError> {
        let mut data = Vec::with_capacity(tiles.len() * tile_size * tile_size * 3);
        for t in tiles {
            if t.width() != tile_size || t.height() != tile_size || t.channels() != 3 {
                return Err(ModelError::InputSize {
                    expected: tile_size,
                    actual: t.width().max(t.height()),
                });
            }
            data.extend(t.data().iter().map(|&v| v as f32 / 255.0));
        }
        Ok(Self {
            data,
            len: tiles.len(),
            tile_size,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// `[N, T, T, 3]`
    pub fn shape(&self) -> [usize; 4] {
        [self.len, self.tile_size, self.tile_size, 3]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// `N x T x T x C` per-pixel class probabilities.
#[derive(Debug, Clone)]
pub struct ClassProbabilities {
    data: Vec<f32>,
    shape: [usize; 4],
}

impl ClassProbabilities {
    pub fn new(data: Vec<f32>, shape: [usize; 4]) -> Result<Self, ModelError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(ModelError::Predict(format!(
                "{} probabilities do not fill shape {shape:?}",
                data.len()
            )));
        }
        Ok(Self { data, shape })
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn num_classes(&self) -> usize {
        self.shape[3]
    }

    /// Arg-max class index of every pixel of tile `n`, row-major.
    pub fn argmax_tile(&self, n: usize) -> Vec<usize> {
        let [_, h, w, c] = self.shape;
        let tile = &self.data[n * h * w * c..(n + 1) * h * w * c];
        tile.chunks_exact(c)
            .map(|p| {
                p.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                    .0
            })
            .collect()
    }
}

/// A loaded, read-only segmentation model with a fixed square input size.
pub trait SegmentationModel: Send + Sync {
    fn input_size(&self) -> usize;
    fn num_classes(&self) -> usize;
    fn predict(&self, batch: &TileBatch) -> Result<ClassProbabilities, ModelError>;
}

/// Label set of [`ColorIndexModel`], indexed by class id.
pub const COLOR_INDEX_LABELS: [&str; 6] = ["building", "road", "water", "vegetation", "bare_soil", "shadow"];

/// Thresholds of the colour-index classifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColorIndexParams {
    pub input_size: usize,
    /// Logit scale; larger values give sharper probabilities.
    pub sharpness: f32,
    pub excess_green_threshold: f32,
    pub saturation_threshold: f32,
    pub brightness_threshold: f32,
    pub water_margin: f32,
    pub soil_margin: f32,
    pub shadow_threshold: f32,
}

impl Default for ColorIndexParams {
    fn default() -> Self {
        Self {
            input_size: 512,
            sharpness: 12.0,
            excess_green_threshold: 0.1,
            saturation_threshold: 0.15,
            brightness_threshold: 0.55,
            water_margin: 0.08,
            soil_margin: 0.1,
            shadow_threshold: 0.2,
        }
    }
}

/// Per-pixel classifier over spectral indices of RGB imagery.
///
/// Vegetation is excess green (`2g - r - b`), built surfaces are bright and
/// unsaturated, roads dark and unsaturated, water blue-dominant. Outputs a
/// softmax over [`COLOR_INDEX_LABELS`].
#[derive(Debug, Clone)]
pub struct ColorIndexModel {
    params: ColorIndexParams,
}

impl ColorIndexModel {
    pub fn new(params: ColorIndexParams) -> Result<Self, ModelError> {
        if params.input_size == 0 {
            return Err(ModelError::InvalidParams("input_size must be positive".into()));
        }
        if !(params.sharpness.is_finite() && params.sharpness > 0.0) {
            return Err(ModelError::InvalidParams(format!(
                "sharpness must be positive, got {}",
                params.sharpness
            )));
        }
        Ok(Self { params })
    }

    /// Loads thresholds from a JSON file, or uses the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ModelError> {
        let params = match path {
            Some(p) => serde_json::from_slice(&std::fs::read(p)?)?,
            None => ColorIndexParams::default(),
        };
        Self::new(params)
    }

    pub fn params(&self) -> &ColorIndexParams {
        &self.params
    }

    fn logits(&self, rgb: &[f32], out: &mut [f32]) {
        let p = &self.params;
        let (r, g, b) = (rgb[0], rgb[1], rgb[2]);
        let hi = r.max(g).max(b);
        let lo = r.min(g).min(b);
        let saturation = hi - lo;
        let brightness = (r + g + b) / 3.0;

        let flat = p.saturation_threshold - saturation;
        out[0] = flat + (brightness - p.brightness_threshold);
        out[1] = flat + (p.brightness_threshold - brightness);
        out[2] = b - r.max(g) - p.water_margin;
        out[3] = (2.0 * g - r - b) - p.excess_green_threshold;
        out[4] = (r - b) - p.soil_margin;
        out[5] = p.shadow_threshold - brightness;

        let max = out.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v * p.sharpness));
        let mut sum = 0.0;
        for v in out.iter_mut() {
            *v = (*v * p.sharpness - max).exp();
            sum += *v;
        }
        out.iter_mut().for_each(|v| *v /= sum);
    }
}

impl SegmentationModel for ColorIndexModel {
    fn input_size(&self) -> usize {
        self.params.input_size
    }

    fn num_classes(&self) -> usize {
        COLOR_INDEX_LABELS.len()
    }

    fn predict(&self, batch: &TileBatch) -> Result<ClassProbabilities, ModelError> {
        if batch.tile_size() != self.params.input_size {
            return Err(ModelError::InputSize {
                expected: self.params.input_size,
                actual: batch.tile_size(),
            });
        }
        let c = self.num_classes();
        let mut out = vec![0.0f32; batch.data().len() / 3 * c];
        out.par_chunks_mut(c)
            .zip(batch.data().par_chunks(3))
            .for_each(|(probs, rgb)| self.logits(rgb, probs));

        let [n, h, w, _] = batch.shape();
        ClassProbabilities::new(out, [n, h, w, c])
    }
}
