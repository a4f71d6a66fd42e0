use bytes::Bytes;
use heatgrid::{GeoBoundingBox, HeatMethod, HeatParams, RegionGeometry, TileCoordinate};
use region_analyzer::{
    export, AnalysisError, ClassMapping, ColorIndexModel, ColorIndexParams, Metrics, RegionAnalyzer,
    ResultRegistry, TemperatureScale, TileError, TileFetcher, TileInferenceEngine, TileProvider,
};
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const TS: u32 = 256;
const MODEL_TILE: usize = 128;
const LAT: f64 = 39.9526;
const LON: f64 = -75.1652;
const RADIUS: f64 = 0.001;
const ZOOM: u8 = 18;

const GREEN: [u8; 3] = [30, 170, 40];
const ROOF: [u8; 3] = [190, 190, 195];

/// Tiles whose left half is vegetation and right half a bright roof.
struct SyntheticProvider {
    failing: HashSet<(u32, u32)>,
    fail_all: bool,
    calls: AtomicUsize,
    encoded: Bytes,
}

impl SyntheticProvider {
    fn new() -> Self {
        let img = image::RgbImage::from_fn(TS, TS, |x, _| image::Rgb(if x < TS / 2 { GREEN } else { ROOF }));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        Self {
            failing: HashSet::new(),
            fail_all: false,
            calls: AtomicUsize::new(0),
            encoded: Bytes::from(out.into_inner()),
        }
    }
}

impl TileProvider for SyntheticProvider {
    async fn fetch(&self, tile: TileCoordinate) -> Result<Bytes, TileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all || self.failing.contains(&(tile.x, tile.y)) {
            return Err(TileError::Status(500));
        }
        Ok(self.encoded.clone())
    }
}

struct Harness {
    analyzer: RegionAnalyzer<SyntheticProvider>,
    provider: Arc<SyntheticProvider>,
    metrics: Arc<Metrics>,
}

fn harness(provider: SyntheticProvider) -> Harness {
    let provider = Arc::new(provider);
    let metrics = Arc::new(Metrics::new().unwrap());
    let model = ColorIndexModel::new(ColorIndexParams {
        input_size: MODEL_TILE,
        ..ColorIndexParams::default()
    })
    .unwrap();
    let engine = TileInferenceEngine::new(Arc::new(model), ClassMapping::default()).unwrap();
    let fetcher = TileFetcher::new(provider.clone(), TS, metrics.clone());
    Harness {
        analyzer: RegionAnalyzer::new(fetcher, engine, metrics.clone()),
        provider,
        metrics,
    }
}

fn geometry() -> RegionGeometry {
    let bbox = GeoBoundingBox::around(LAT, LON, RADIUS).unwrap();
    RegionGeometry::from_bbox(&bbox, ZOOM, TS).unwrap()
}

fn small_sigma(method: HeatMethod) -> HeatParams {
    HeatParams {
        method,
        sigma_build: 4.0,
        sigma_veg: 4.0,
        ..HeatParams::default()
    }
}

#[tokio::test]
async fn masks_follow_imagery_and_field_is_bounded() {
    let h = harness(SyntheticProvider::new());
    let geom = geometry();

    let analysis = h
        .analyzer
        .analyze(LAT, LON, RADIUS, ZOOM, small_sigma(HeatMethod::Ndui), TemperatureScale::default())
        .await
        .unwrap();
    let img = &analysis.imagery;

    // Cropped to whole model tiles from the top-left.
    let (height, width) = img.mosaic.shape();
    assert_eq!(width, geom.width / MODEL_TILE * MODEL_TILE);
    assert_eq!(height, geom.height / MODEL_TILE * MODEL_TILE);
    assert_eq!(img.building_mask.shape(), (height, width));
    assert_eq!(img.vegetation_mask.shape(), (height, width));
    assert_eq!(analysis.heat.shape(), (height, width));

    for y in 0..height {
        for x in 0..width {
            let green = (geom.origin_x as usize + x) % (TS as usize) < (TS as usize) / 2;
            assert_eq!(img.vegetation_mask.get(x, y), u8::from(green), "({x}, {y})");
            assert_eq!(img.building_mask.get(x, y), u8::from(!green), "({x}, {y})");
        }
    }

    let s = &analysis.summary;
    assert!((s.building_pct + s.vegetation_pct - 100.0).abs() < 1e-3);
    assert!(s.building_pct > 10.0 && s.vegetation_pct > 10.0);
    assert!(analysis.heat.values().iter().all(|v| (-1.0..=1.0).contains(v)));
    assert!(s.temperature.min >= 20.0 && s.temperature.max <= 30.0);

    assert_eq!(img.stitch.tiles_total, geom.tile_count());
    assert!(img.stitch.tiles_missing.is_empty());
    assert_eq!(h.metrics.tiles_requested_total.get() as usize, geom.tile_count());
    assert_eq!(
        h.metrics.inference_tiles_total.get() as usize,
        (width / MODEL_TILE) * (height / MODEL_TILE)
    );
    assert_eq!(h.metrics.region_failures_total.get(), 0);
}

#[tokio::test]
async fn single_tile_failure_is_tolerated() {
    let geom = geometry();
    let mut provider = SyntheticProvider::new();
    provider.failing.insert((geom.tile_x_max, geom.tile_y_max));
    let h = harness(provider);

    let imagery = h.analyzer.get_region(LAT, LON, RADIUS, ZOOM).await.unwrap();
    assert_eq!(
        imagery.stitch.tiles_missing,
        vec![TileCoordinate::new(geom.tile_x_max, geom.tile_y_max, ZOOM)]
    );
    assert_eq!(imagery.stitch.tiles_placed, geom.tile_count() - 1);
    assert_eq!(h.metrics.tiles_failed_total.get(), 1);
    assert_eq!(h.metrics.regions_fetched_total.get(), 1);
}

#[tokio::test]
async fn total_outage_is_retryable_no_imagery() {
    let mut provider = SyntheticProvider::new();
    provider.fail_all = true;
    let h = harness(provider);

    let err = h
        .analyzer
        .analyze(LAT, LON, RADIUS, ZOOM, HeatParams::default(), TemperatureScale::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::NoImagery { tiles_total, .. } if tiles_total == geometry().tile_count()));
    assert!(err.is_retryable());
    assert_eq!(h.metrics.region_failures_total.get(), 1);
}

#[tokio::test]
async fn configuration_errors_fail_before_any_request() {
    let h = harness(SyntheticProvider::new());

    let err = h.analyzer.get_region(LAT, LON, 0.0, ZOOM).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Config(_)));
    assert!(!err.is_retryable());

    let bad = HeatParams {
        sigma_veg: f64::NAN,
        ..HeatParams::default()
    };
    let err = h
        .analyzer
        .analyze(LAT, LON, RADIUS, ZOOM, bad, TemperatureScale::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Config(heatgrid::Error::InvalidHeatParams(_))));

    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.metrics.region_failures_total.get(), 2);
}

#[tokio::test]
async fn regions_beyond_mercator_limit_fail_before_any_request() {
    let h = harness(SyntheticProvider::new());

    let err = h.analyzer.get_region(88.0, 10.0, 0.002, ZOOM).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Config(heatgrid::Error::InvalidBoundingBox(_))));
    assert!(!err.is_retryable());
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.metrics.region_failures_total.get(), 1);
}

#[tokio::test]
async fn oversized_regions_fail_before_any_request() {
    let h = harness(SyntheticProvider::new());

    for (lat, lon, radius) in [(LAT, LON, 1.0), (89.0, 10.0, 0.5)] {
        let err = h.analyzer.get_region(lat, lon, radius, ZOOM).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Config(heatgrid::Error::InvalidBoundingBox(_))));
        assert!(!err.is_retryable());
    }
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.metrics.tiles_requested_total.get(), 0);
}

#[tokio::test]
async fn region_smaller_than_model_tile_is_an_inference_error() {
    let h = harness(SyntheticProvider::new());
    let err = h.analyzer.get_region(LAT, LON, 0.0001, ZOOM).await.unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::Inference(region_analyzer::InferenceError::MosaicSmallerThanTile { .. })
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn analyses_are_registered_and_exported() {
    let h = harness(SyntheticProvider::new());
    let registry = ResultRegistry::new(4);

    let analysis = h
        .analyzer
        .analyze(
            LAT,
            LON,
            RADIUS,
            ZOOM,
            small_sigma(HeatMethod::SignedDistance),
            TemperatureScale::default(),
        )
        .await
        .unwrap();
    let (stored, evicted) = registry.insert(analysis);
    assert!(evicted.is_none());
    assert!(registry.get(&stored.id).is_some());

    let dir = tempfile::tempdir().unwrap();
    let written = export::write_analysis(&stored, dir.path()).unwrap();
    assert_eq!(written.len(), 7);
    assert!(written.iter().all(|p| p.exists()));

    let summary_path = dir.path().join(stored.id.to_string()).join("summary.json");
    let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(summary_path).unwrap()).unwrap();
    assert_eq!(doc["params"]["method"], "signed_distance");
    assert_eq!(doc["zoom"], 18);
    assert!(doc["summary"]["building_pct"].as_f64().unwrap() > 10.0);

    let mosaic = image::open(dir.path().join(stored.id.to_string()).join("mosaic.png")).unwrap();
    assert_eq!(
        (mosaic.width() as usize, mosaic.height() as usize),
        (stored.imagery.mosaic.width(), stored.imagery.mosaic.height())
    );
}
