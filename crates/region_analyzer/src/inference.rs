//! Tiled segmentation of a region mosaic into building and vegetation masks.

use crate::error::InferenceError;
use crate::model::{SegmentationModel, TileBatch};
use heatgrid::{crop_to_multiple, split_into_tiles, untile, Mask, Mosaic};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Class ids of the two labels the heat analysis consumes. Depends on how
/// the model was trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMapping {
    pub building: usize,
    pub vegetation: usize,
}

impl Default for ClassMapping {
    fn default() -> Self {
        Self {
            building: 0,
            vegetation: 3,
        }
    }
}

/// Output of a segmentation pass. All three rasters share one shape.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// The mosaic cropped to a multiple of the model input size.
    pub mosaic: Mosaic,
    pub building_mask: Mask,
    pub vegetation_mask: Mask,
    pub tiles: usize,
}

pub struct TileInferenceEngine {
    model: Arc<dyn SegmentationModel>,
    mapping: ClassMapping,
}

impl TileInferenceEngine {
    pub fn new(model: Arc<dyn SegmentationModel>, mapping: ClassMapping) -> Result<Self, InferenceError> {
        let num_classes = model.num_classes();
        for class in [mapping.building, mapping.vegetation] {
            if class >= num_classes {
                return Err(InferenceError::ClassOutOfRange { class, num_classes });
            }
        }
        if model.input_size() == 0 {
            return Err(heatgrid::Error::InvalidTileSize.into());
        }
        Ok(Self { model, mapping })
    }

    pub fn tile_size(&self) -> usize {
        self.model.input_size()
    }

    /// Crops `mosaic` to whole model tiles, runs them through the model as
    /// one batch and reassembles per-tile class masks.
    ///
    /// Right and bottom remainder strips narrower than one tile are dropped.
    pub fn segment(&self, mosaic: &Mosaic) -> Result<Segmentation, InferenceError> {
        let ts = self.tile_size();
        if mosaic.width() < ts || mosaic.height() < ts {
            return Err(InferenceError::MosaicSmallerThanTile {
                width: mosaic.width(),
                height: mosaic.height(),
                tile: ts,
            });
        }

        let cropped = crop_to_multiple(mosaic, ts)?;
        let tiles = split_into_tiles(&cropped, ts)?;
        let batch = TileBatch::from_tiles(&tiles, ts)?;

        let probs = self.model.predict(&batch)?;
        let expected = [batch.len(), ts, ts, self.model.num_classes()];
        if probs.shape() != expected {
            return Err(InferenceError::BatchShapeMismatch {
                expected,
                actual: probs.shape(),
            });
        }

        let mut building_tiles = Vec::with_capacity(tiles.len());
        let mut vegetation_tiles = Vec::with_capacity(tiles.len());
        for n in 0..batch.len() {
            let classes = probs.argmax_tile(n);
            let pick = |id: usize| classes.iter().map(|&c| u8::from(c == id)).collect::<Vec<_>>();
            building_tiles.push(Mask::from_vec(ts, ts, 1, pick(self.mapping.building))?);
            vegetation_tiles.push(Mask::from_vec(ts, ts, 1, pick(self.mapping.vegetation))?);
        }

        let (h, w) = cropped.shape();
        let building_mask = untile(&building_tiles, h, w, ts)?;
        let vegetation_mask = untile(&vegetation_tiles, h, w, ts)?;

        Ok(Segmentation {
            mosaic: cropped,
            building_mask,
            vegetation_mask,
            tiles: batch.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::model::ClassProbabilities;

    /// Class = red channel / 64, certain (one-hot) output.
    struct RedBandModel {
        size: usize,
        shape_override: Option<[usize; 4]>,
    }

    impl SegmentationModel for RedBandModel {
        fn input_size(&self) -> usize {
            self.size
        }

        fn num_classes(&self) -> usize {
            4
        }

        fn predict(&self, batch: &TileBatch) -> Result<ClassProbabilities, ModelError> {
            let mut out = Vec::with_capacity(batch.data().len() / 3 * 4);
            for rgb in batch.data().chunks_exact(3) {
                let class = ((rgb[0] * 255.0).round() as usize / 64).min(3);
                out.extend((0..4).map(|c| if c == class { 1.0 } else { 0.0 }));
            }
            let [n, h, w, _] = batch.shape();
            if let Some(shape) = self.shape_override {
                return Ok(ClassProbabilities::new(vec![0.0; shape.iter().product()], shape)?);
            }
            ClassProbabilities::new(out, [n, h, w, 4])
        }
    }

    fn engine(size: usize) -> TileInferenceEngine {
        let model = Arc::new(RedBandModel { size, shape_override: None });
        TileInferenceEngine::new(model, ClassMapping { building: 0, vegetation: 3 }).unwrap()
    }

    /// Red channel encodes the class: x < 10 building, x >= 20 vegetation.
    fn banded_mosaic(width: usize, height: usize) -> Mosaic {
        let mut m = Mosaic::rgb(width, height);
        for y in 0..height {
            for x in 0..width {
                let red = match x {
                    0..=9 => 10,
                    10..=19 => 100,
                    _ => 250,
                };
                m.pixel_mut(x, y).copy_from_slice(&[red, 0, 0]);
            }
        }
        m
    }

    #[test]
    fn masks_follow_class_ids_and_cropped_shape() {
        let seg = engine(8).segment(&banded_mosaic(30, 21)).unwrap();
        assert_eq!(seg.mosaic.shape(), (16, 24));
        assert_eq!(seg.building_mask.shape(), (16, 24));
        assert_eq!(seg.vegetation_mask.shape(), (16, 24));
        assert_eq!(seg.tiles, 6);

        for y in 0..16 {
            for x in 0..24 {
                assert_eq!(seg.building_mask.get(x, y), u8::from(x < 10), "({x}, {y})");
                assert_eq!(seg.vegetation_mask.get(x, y), u8::from(x >= 20), "({x}, {y})");
            }
        }
    }

    #[test]
    fn small_mosaic_is_rejected() {
        let err = engine(16).segment(&Mosaic::rgb(20, 10)).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::MosaicSmallerThanTile { width: 20, height: 10, tile: 16 }
        ));
    }

    #[test]
    fn class_mapping_is_validated() {
        let model = Arc::new(RedBandModel { size: 8, shape_override: None });
        let err = TileInferenceEngine::new(model, ClassMapping { building: 0, vegetation: 4 }).err();
        assert!(matches!(
            err,
            Some(InferenceError::ClassOutOfRange { class: 4, num_classes: 4 })
        ));
    }

    #[test]
    fn malformed_model_output_is_fatal() {
        let model = Arc::new(RedBandModel {
            size: 8,
            shape_override: Some([1, 8, 8, 4]),
        });
        let engine = TileInferenceEngine::new(model, ClassMapping::default()).unwrap();
        let err = engine.segment(&banded_mosaic(16, 8)).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::BatchShapeMismatch { expected: [2, 8, 8, 4], actual: [1, 8, 8, 4] }
        ));
    }
}
