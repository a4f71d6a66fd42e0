use crate::heat::{temperature_map, HeatField};
use crate::raster::Mask;
use crate::{Error, Result};
use serde::Serialize;

/// Min / max / mean of a scalar raster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

impl FieldStats {
    pub fn of(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self { min: 0.0, max: 0.0, mean: 0.0 };
        }
        let (min, max, sum) = values.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY, 0.0f64),
            |(lo, hi, s), &v| (lo.min(v), hi.max(v), s + v as f64),
        );
        Self {
            min,
            max,
            mean: (sum / values.len() as f64) as f32,
        }
    }
}

/// Per-region statistics reported alongside an analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSummary {
    pub width: usize,
    pub height: usize,
    pub building_pct: f32,
    pub vegetation_pct: f32,
    /// Share of pixels with a positive heat influence.
    pub heating_pct: f32,
    pub heat: FieldStats,
    pub temperature: FieldStats,
}

impl RegionSummary {
    pub fn compute(
        building: &Mask,
        vegetation: &Mask,
        field: &HeatField,
        base_temp: f32,
        delta_temp: f32,
    ) -> Result<Self> {
        for shape in [vegetation.shape(), field.shape()] {
            if shape != building.shape() {
                return Err(Error::ShapeMismatch {
                    expected: building.shape(),
                    actual: shape,
                });
            }
        }

        let pixels = building.width() * building.height();
        let pct = |n: usize| if pixels == 0 { 0.0 } else { (n as f64 * 100.0 / pixels as f64) as f32 };
        let heating = field.values().iter().filter(|&&v| v > 0.0).count();
        let temps = temperature_map(field, base_temp, delta_temp);

        Ok(Self {
            width: building.width(),
            height: building.height(),
            building_pct: pct(building.count_nonzero()),
            vegetation_pct: pct(vegetation.count_nonzero()),
            heating_pct: pct(heating),
            heat: field.stats(),
            temperature: FieldStats::of(temps.data()),
        })
    }
}
