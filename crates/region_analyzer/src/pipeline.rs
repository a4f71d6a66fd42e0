use crate::error::AnalysisError;
use crate::fetcher::TileFetcher;
use crate::inference::TileInferenceEngine;
use crate::metrics::Metrics;
use crate::provider::TileProvider;
use chrono::{DateTime, Utc};
use heatgrid::{
    synthesize_heat_field, temperature_map, GeoBoundingBox, Grid, HeatField, HeatParams, Mask, Mosaic,
    RegionGeometry, RegionSummary, StitchReport,
};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Imagery and class masks of one region. All rasters share one shape.
#[derive(Debug, Clone)]
pub struct RegionImagery {
    pub bbox: GeoBoundingBox,
    pub geometry: RegionGeometry,
    /// Stitched mosaic cropped to whole model tiles.
    pub mosaic: Mosaic,
    pub building_mask: Mask,
    pub vegetation_mask: Mask,
    pub stitch: StitchReport,
}

/// Complete result of one analysis request.
#[derive(Debug, Clone)]
pub struct RegionAnalysis {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub radius_deg: f64,
    pub zoom: u8,
    pub params: HeatParams,
    pub imagery: RegionImagery,
    pub heat: HeatField,
    pub temperature: Grid<f32>,
    pub summary: RegionSummary,
}

/// Pseudo-temperature mapping applied to the heat field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureScale {
    pub base: f32,
    pub delta: f32,
}

impl Default for TemperatureScale {
    fn default() -> Self {
        Self { base: 25.0, delta: 5.0 }
    }
}

/// Runs fetch, segmentation and heat synthesis for a point and radius.
pub struct RegionAnalyzer<P> {
    fetcher: TileFetcher<P>,
    engine: Arc<TileInferenceEngine>,
    metrics: Arc<Metrics>,
}

impl<P: TileProvider> RegionAnalyzer<P> {
    pub fn new(fetcher: TileFetcher<P>, engine: TileInferenceEngine, metrics: Arc<Metrics>) -> Self {
        Self {
            fetcher,
            engine: Arc::new(engine),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Fetches the region around `(lat, lon)` and segments it.
    pub async fn get_region(&self, lat: f64, lon: f64, radius_deg: f64, zoom: u8) -> Result<RegionImagery, AnalysisError> {
        let result = self.get_region_inner(lat, lon, radius_deg, zoom).await;
        if result.is_err() {
            self.metrics.region_failures_total.inc();
        }
        result
    }

    async fn get_region_inner(&self, lat: f64, lon: f64, radius_deg: f64, zoom: u8) -> Result<RegionImagery, AnalysisError> {
        let bbox = GeoBoundingBox::around(lat, lon, radius_deg)?;
        // Fail on bad geometry before any tile is requested.
        RegionGeometry::from_bbox(&bbox, zoom, self.fetcher.tile_size())?;

        let fetched = self.fetcher.fetch_region(&bbox, zoom).await?;

        let started = Instant::now();
        let engine = self.engine.clone();
        let mosaic = fetched.mosaic;
        let seg = tokio::task::spawn_blocking(move || engine.segment(&mosaic)).await??;
        self.metrics.inference_tiles_total.inc_by(seg.tiles as u64);
        tracing::debug!(
            tiles = seg.tiles,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Segmentation finished"
        );

        Ok(RegionImagery {
            bbox,
            geometry: fetched.geometry,
            mosaic: seg.mosaic,
            building_mask: seg.building_mask,
            vegetation_mask: seg.vegetation_mask,
            stitch: fetched.report,
        })
    }

    /// Full analysis: region imagery, heat field, temperature map and summary.
    pub async fn analyze(
        &self,
        lat: f64,
        lon: f64,
        radius_deg: f64,
        zoom: u8,
        params: HeatParams,
        scale: TemperatureScale,
    ) -> Result<RegionAnalysis, AnalysisError> {
        let timer = self.metrics.analysis_seconds.start_timer();

        if let Err(e) = params.validate() {
            self.metrics.region_failures_total.inc();
            return Err(e.into());
        }
        let imagery = self.get_region(lat, lon, radius_deg, zoom).await?;

        let started = Instant::now();
        let building = imagery.building_mask.clone();
        let vegetation = imagery.vegetation_mask.clone();
        let synthesized = tokio::task::spawn_blocking(move || {
            let heat = synthesize_heat_field(&building, &vegetation, &params)?;
            let temperature = temperature_map(&heat, scale.base, scale.delta);
            let summary = RegionSummary::compute(&building, &vegetation, &heat, scale.base, scale.delta)?;
            Ok::<_, heatgrid::Error>((heat, temperature, summary))
        })
        .await;

        let (heat, temperature, summary) = match synthesized {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                self.metrics.region_failures_total.inc();
                return Err(e.into());
            }
            Err(e) => {
                self.metrics.region_failures_total.inc();
                return Err(e.into());
            }
        };
        tracing::debug!(
            method = %params.method,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Heat field synthesized"
        );

        let analysis = RegionAnalysis {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            lat,
            lon,
            radius_deg,
            zoom,
            params,
            imagery,
            heat,
            temperature,
            summary,
        };
        let elapsed = timer.stop_and_record();

        tracing::info!(
            id = %analysis.id,
            lat,
            lon,
            width = analysis.summary.width,
            height = analysis.summary.height,
            tiles_placed = analysis.imagery.stitch.tiles_placed,
            tiles_missing = analysis.imagery.stitch.tiles_missing.len(),
            building_pct = analysis.summary.building_pct,
            vegetation_pct = analysis.summary.vegetation_pct,
            heat_mean = analysis.summary.heat.mean,
            temp_mean = analysis.summary.temperature.mean,
            elapsed_s = elapsed,
            "Region analysis complete"
        );
        Ok(analysis)
    }
}
