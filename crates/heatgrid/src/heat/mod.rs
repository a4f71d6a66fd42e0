//! Heat influence field synthesis from building and vegetation masks.
//!
//! Every method consumes the same two `{0,1}` masks and produces a signed
//! field nominally bounded to `[-1, 1]`: positive where built surfaces
//! dominate, negative where vegetation does.

mod blur;
mod distance;

pub use blur::gaussian_blur;
pub use distance::distance_transform;

use crate::raster::{Grid, Mask};
use crate::summary::FieldStats;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Regulariser for every division in this module.
pub const EPS: f32 = 1e-6;

/// Field synthesis algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatMethod {
    /// Weighted difference of blurred masks, rescaled by its peak magnitude.
    Weighted,
    /// Normalised difference of blurred masks, `(B - V) / (B + V + eps)`.
    Ndui,
    /// `tanh` of the difference between nearest-vegetation and
    /// nearest-building distances.
    SignedDistance,
}

impl HeatMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HeatMethod::Weighted => "weighted",
            HeatMethod::Ndui => "ndui",
            HeatMethod::SignedDistance => "signed_distance",
        }
    }
}

impl std::fmt::Display for HeatMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeatMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "weighted" => Ok(HeatMethod::Weighted),
            "ndui" => Ok(HeatMethod::Ndui),
            "signed_distance" => Ok(HeatMethod::SignedDistance),
            other => Err(Error::UnknownHeatMethod(other.to_owned())),
        }
    }
}

/// Parameters of a heat field synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatParams {
    pub method: HeatMethod,
    /// Spatial influence radius of buildings, in pixels.
    pub sigma_build: f64,
    /// Spatial influence radius of vegetation, in pixels.
    pub sigma_veg: f64,
    pub w_build: f32,
    pub w_veg: f32,
}

impl Default for HeatParams {
    fn default() -> Self {
        Self {
            method: HeatMethod::Ndui,
            sigma_build: 20.0,
            sigma_veg: 20.0,
            w_build: 1.0,
            w_veg: 0.9,
        }
    }
}

impl HeatParams {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("sigma_build", self.sigma_build), ("sigma_veg", self.sigma_veg)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(Error::InvalidHeatParams(format!("{name} must be finite and >= 0, got {v}")));
            }
        }
        for (name, v) in [("w_build", self.w_build), ("w_veg", self.w_veg)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(Error::InvalidHeatParams(format!("{name} must be finite and >= 0, got {v}")));
            }
        }
        Ok(())
    }

    /// Parameters with the roles of buildings and vegetation exchanged.
    pub fn swapped(&self) -> Self {
        Self {
            method: self.method,
            sigma_build: self.sigma_veg,
            sigma_veg: self.sigma_build,
            w_build: self.w_veg,
            w_veg: self.w_build,
        }
    }
}

/// Immutable signed heat influence raster.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatField {
    grid: Grid<f32>,
    method: HeatMethod,
}

impl HeatField {
    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.grid.shape()
    }

    pub fn method(&self) -> HeatMethod {
        self.method
    }

    pub fn values(&self) -> &[f32] {
        self.grid.data()
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.grid.get(x, y)
    }

    pub fn as_grid(&self) -> &Grid<f32> {
        &self.grid
    }

    /// Min / max / mean of the field; all zero for an empty field.
    pub fn stats(&self) -> FieldStats {
        FieldStats::of(self.values())
    }
}

/// Combines `building` and `vegetation` masks into a heat influence field.
pub fn synthesize_heat_field(building: &Mask, vegetation: &Mask, params: &HeatParams) -> Result<HeatField> {
    params.validate()?;
    if building.shape() != vegetation.shape() {
        return Err(Error::ShapeMismatch {
            expected: building.shape(),
            actual: vegetation.shape(),
        });
    }

    let (width, height) = (building.width(), building.height());
    let values = match params.method {
        HeatMethod::Weighted => {
            let (b, v) = blurred_pair(building, vegetation, params);
            let mut h: Vec<f32> = b
                .iter()
                .zip(&v)
                .map(|(b, v)| params.w_build * b - params.w_veg * v)
                .collect();
            let peak = h.iter().fold(0.0f32, |m, x| m.max(x.abs()));
            let norm = peak + EPS;
            h.iter_mut().for_each(|x| *x /= norm);
            h
        }
        HeatMethod::Ndui => {
            let (b, v) = blurred_pair(building, vegetation, params);
            b.iter()
                .zip(&v)
                .map(|(b, v)| {
                    let (wb, wv) = (params.w_build * b, params.w_veg * v);
                    (wb - wv) / (wb + wv + EPS)
                })
                .collect()
        }
        HeatMethod::SignedDistance => {
            // Missing classes count as farther away than any real pixel.
            let cap = ((width * width + height * height) as f32).sqrt();
            let capped = |d: f32| if d.is_finite() { d } else { cap };

            let to_build = distance_transform(building.data(), width, height);
            let to_veg = distance_transform(vegetation.data(), width, height);
            let gamma = ((params.sigma_build + params.sigma_veg) / 2.0) as f32;

            to_veg
                .iter()
                .zip(&to_build)
                .map(|(&dv, &db)| ((capped(dv) - capped(db)) / (gamma + EPS)).tanh())
                .collect()
        }
    };

    Ok(HeatField {
        grid: Grid::from_vec(width, height, 1, values)?,
        method: params.method,
    })
}

fn blurred_pair(building: &Mask, vegetation: &Mask, params: &HeatParams) -> (Vec<f32>, Vec<f32>) {
    let (w, h) = (building.width(), building.height());
    let b: Vec<f32> = building.data().iter().map(|&m| f32::from(m != 0)).collect();
    let v: Vec<f32> = vegetation.data().iter().map(|&m| f32::from(m != 0)).collect();
    rayon::join(
        || gaussian_blur(&b, w, h, params.sigma_build),
        || gaussian_blur(&v, w, h, params.sigma_veg),
    )
}

/// Affine map of a heat field to pseudo-temperature: `base + delta * H`.
pub fn temperature_map(field: &HeatField, base: f32, delta: f32) -> Grid<f32> {
    field.as_grid().map(|h| base + delta * h)
}
