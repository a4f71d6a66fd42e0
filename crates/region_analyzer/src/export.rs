//! PNG and JSON artefacts of an analysis.

use crate::pipeline::RegionAnalysis;
use anyhow::{Context, Result};
use heatgrid::{GeoBoundingBox, Grid, HeatParams, Mask, Mosaic, RegionSummary, TileCoordinate};
use image::{GrayImage, RgbImage};
use serde::Serialize;
use std::path::{Path, PathBuf};

const VEGETATION_TINT: [u8; 3] = [0, 200, 0];
const BUILDING_TINT: [u8; 3] = [0, 80, 255];
const TINT_ALPHA: f32 = 0.5;

#[derive(Serialize)]
struct SummaryDocument<'a> {
    id: String,
    created_at: String,
    lat: f64,
    lon: f64,
    radius_deg: f64,
    zoom: u8,
    bbox: &'a GeoBoundingBox,
    params: &'a HeatParams,
    tiles_total: usize,
    tiles_placed: usize,
    tiles_missing: &'a [TileCoordinate],
    summary: &'a RegionSummary,
}

/// Writes every artefact of `analysis` into `dir/<id>/` and returns the
/// written paths.
pub fn write_analysis(analysis: &RegionAnalysis, dir: &Path) -> Result<Vec<PathBuf>> {
    let out = dir.join(analysis.id.to_string());
    std::fs::create_dir_all(&out).with_context(|| format!("creating {}", out.display()))?;

    let img = &analysis.imagery;
    let mut written = Vec::new();
    let mut save_rgb = |name: &str, grid: &Mosaic| -> Result<()> {
        let path = out.join(name);
        to_rgb_image(grid)?
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
        Ok(())
    };

    save_rgb("mosaic.png", &img.mosaic)?;
    save_rgb("vegetation_overlay.png", &overlay(&img.mosaic, &img.vegetation_mask, VEGETATION_TINT))?;
    save_rgb("building_overlay.png", &overlay(&img.mosaic, &img.building_mask, BUILDING_TINT))?;
    save_rgb("heat_field.png", &colorize(analysis.heat.as_grid()))?;

    for (name, mask) in [
        ("building_mask.png", &img.building_mask),
        ("vegetation_mask.png", &img.vegetation_mask),
    ] {
        let path = out.join(name);
        mask_image(mask)?
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }

    let doc = SummaryDocument {
        id: analysis.id.to_string(),
        created_at: analysis.created_at.to_rfc3339(),
        lat: analysis.lat,
        lon: analysis.lon,
        radius_deg: analysis.radius_deg,
        zoom: analysis.zoom,
        bbox: &img.bbox,
        params: &analysis.params,
        tiles_total: img.stitch.tiles_total,
        tiles_placed: img.stitch.tiles_placed,
        tiles_missing: &img.stitch.tiles_missing,
        summary: &analysis.summary,
    };
    let path = out.join("summary.json");
    let file = std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, &doc).context("serializing summary")?;
    written.push(path);

    Ok(written)
}

fn to_rgb_image(grid: &Mosaic) -> Result<RgbImage> {
    RgbImage::from_raw(grid.width() as u32, grid.height() as u32, grid.data().to_vec())
        .context("mosaic buffer does not match its dimensions")
}

fn mask_image(mask: &Mask) -> Result<GrayImage> {
    let data = mask.data().iter().map(|&v| if v != 0 { 255 } else { 0 }).collect();
    GrayImage::from_raw(mask.width() as u32, mask.height() as u32, data)
        .context("mask buffer does not match its dimensions")
}

/// Blends `tint` over `mosaic` wherever `mask` is set.
pub fn overlay(mosaic: &Mosaic, mask: &Mask, tint: [u8; 3]) -> Mosaic {
    let mut out = mosaic.clone();
    for y in 0..mask.height().min(mosaic.height()) {
        for x in 0..mask.width().min(mosaic.width()) {
            if mask.get(x, y) == 0 {
                continue;
            }
            for (c, t) in out.pixel_mut(x, y).iter_mut().zip(tint) {
                *c = (*c as f32 * (1.0 - TINT_ALPHA) + t as f32 * TINT_ALPHA).round() as u8;
            }
        }
    }
    out
}

/// Diverging blue-white-red colour map of a field in `[-1, 1]`.
pub fn colorize(field: &Grid<f32>) -> Mosaic {
    let mut out = Mosaic::rgb(field.width(), field.height());
    for (px, &h) in out.data_mut().chunks_exact_mut(3).zip(field.data()) {
        let h = h.clamp(-1.0, 1.0);
        let fade = |t: f32| (255.0 * (1.0 - t)).round() as u8;
        let rgb = if h >= 0.0 { [255, fade(h), fade(h)] } else { [fade(-h), fade(-h), 255] };
        px.copy_from_slice(&rgb);
    }
    out
}
