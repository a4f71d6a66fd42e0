//! Concurrent acquisition of every tile covering a region.
//!
//! One task per tile is spawned into a `JoinSet` and the set is drained to
//! completion before stitching. The set is owned by the `fetch_region`
//! future, so dropping that future aborts every tile still in flight.

use crate::error::{AnalysisError, TileError};
use crate::metrics::Metrics;
use crate::provider::TileProvider;
use heatgrid::{GeoBoundingBox, Mosaic, RegionGeometry, StitchReport, TileCoordinate, TileImage};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// A stitched region and how it was assembled.
#[derive(Debug, Clone)]
pub struct FetchedRegion {
    pub geometry: RegionGeometry,
    pub mosaic: Mosaic,
    pub report: StitchReport,
}

pub struct TileFetcher<P> {
    provider: Arc<P>,
    tile_size: u32,
    retries: u32,
    metrics: Arc<Metrics>,
}

impl<P: TileProvider> TileFetcher<P> {
    pub fn new(provider: Arc<P>, tile_size: u32, metrics: Arc<Metrics>) -> Self {
        Self {
            provider,
            tile_size,
            retries: 0,
            metrics,
        }
    }

    /// Extra attempts per failed tile. Zero keeps a single attempt.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Fetches and stitches the region covering `bbox` at `zoom`.
    ///
    /// Individual tile failures leave their area zero-filled. The call fails
    /// with `NoImagery` only when no tile at all could be placed.
    pub async fn fetch_region(&self, bbox: &GeoBoundingBox, zoom: u8) -> Result<FetchedRegion, AnalysisError> {
        let geometry = RegionGeometry::from_bbox(bbox, zoom, self.tile_size)?;
        tracing::debug!(
            zoom,
            width = geometry.width,
            height = geometry.height,
            tiles = geometry.tile_count(),
            "Fetching region"
        );

        let started = Instant::now();
        let tiles = self.fetch_tiles(&geometry).await;
        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Tile fan-out settled");

        let stitch_geometry = geometry.clone();
        let (mosaic, report) =
            tokio::task::spawn_blocking(move || heatgrid::stitch(&stitch_geometry, tiles)).await??;

        if !report.any_placed() {
            return Err(AnalysisError::NoImagery {
                tiles_total: report.tiles_total,
                first_missing: report.tiles_missing.first().copied(),
            });
        }

        self.metrics.regions_fetched_total.inc();
        tracing::debug!(
            placed = report.tiles_placed,
            missing = report.tiles_missing.len(),
            "Region stitched"
        );

        Ok(FetchedRegion {
            geometry,
            mosaic,
            report,
        })
    }

    /// Requests every tile of `geometry` concurrently and waits for all of
    /// them to settle. Results come back in row-major tile order.
    pub async fn fetch_tiles(&self, geometry: &RegionGeometry) -> Vec<(TileCoordinate, Option<TileImage>)> {
        let coords: Vec<TileCoordinate> = geometry.tiles().collect();
        let mut slots: Vec<Option<TileImage>> = vec![None; coords.len()];

        let mut set = JoinSet::new();
        for (idx, &coord) in coords.iter().enumerate() {
            let provider = self.provider.clone();
            let metrics = self.metrics.clone();
            let (tile_size, retries) = (self.tile_size, self.retries);
            set.spawn(async move {
                let result = fetch_one(provider.as_ref(), coord, tile_size, retries, &metrics).await;
                (idx, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            let (idx, result) = match joined {
                Ok(v) => v,
                Err(e) => {
                    // Panicked or aborted; the slot stays empty.
                    self.metrics.tiles_failed_total.inc();
                    tracing::warn!(error = %e, "Tile task did not complete");
                    continue;
                }
            };
            match result {
                Ok(img) => slots[idx] = Some(img),
                Err(e) => {
                    let coord = coords[idx];
                    self.metrics.tiles_failed_total.inc();
                    tracing::warn!(tile_x = coord.x, tile_y = coord.y, zoom = coord.zoom, error = %e, "Tile fetch failed");
                }
            }
        }

        coords.into_iter().zip(slots).collect()
    }
}

async fn fetch_one<P: TileProvider>(
    provider: &P,
    coord: TileCoordinate,
    tile_size: u32,
    retries: u32,
    metrics: &Metrics,
) -> Result<TileImage, TileError> {
    let mut attempt = 0;
    loop {
        metrics.tiles_requested_total.inc();
        let result = match provider.fetch(coord).await {
            Ok(bytes) => decode_tile(&bytes, tile_size),
            Err(e) => Err(e),
        };
        match result {
            Ok(img) => return Ok(img),
            Err(e) if attempt < retries => {
                attempt += 1;
                tracing::debug!(tile = %coord, attempt, error = %e, "Retrying tile");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Decodes an encoded tile into an RGB raster of `tile_size x tile_size`.
pub fn decode_tile(bytes: &[u8], tile_size: u32) -> Result<TileImage, TileError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| TileError::Decode(e.to_string()))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    if width != tile_size || height != tile_size {
        return Err(TileError::UnexpectedSize {
            width,
            height,
            expected: tile_size,
        });
    }
    TileImage::from_vec(width as usize, height as usize, 3, img.into_raw()).map_err(|e| TileError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const TS: u32 = 16;

    fn png(color: [u8; 3], size: u32) -> Bytes {
        let img = image::RgbImage::from_pixel(size, size, image::Rgb(color));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        Bytes::from(out.into_inner())
    }

    /// Serves a fixed response per tile; unknown tiles answer 404.
    struct StaticProvider {
        tiles: HashMap<(u32, u32), Result<Bytes, TileError>>,
        calls: AtomicUsize,
    }

    impl TileProvider for StaticProvider {
        async fn fetch(&self, tile: TileCoordinate) -> Result<Bytes, TileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tiles
                .get(&(tile.x, tile.y))
                .cloned()
                .unwrap_or(Err(TileError::Status(404)))
        }
    }

    fn fetcher<P: TileProvider>(p: P) -> (TileFetcher<P>, Arc<P>, Arc<Metrics>) {
        let p = Arc::new(p);
        let m = Arc::new(Metrics::new().unwrap());
        (TileFetcher::new(p.clone(), TS, m.clone()), p, m)
    }

    fn geometry_2x2() -> RegionGeometry {
        RegionGeometry::from_pixels(18, TS, 0, 0, 2 * TS as i64, 2 * TS as i64).unwrap()
    }

    #[tokio::test]
    async fn failed_tiles_are_reported_not_fatal() {
        let mut tiles = HashMap::new();
        tiles.insert((0, 0), Ok(png([10, 20, 30], TS)));
        tiles.insert((1, 0), Err(TileError::Timeout));
        tiles.insert((0, 1), Ok(png([1, 2, 3], 8)));
        tiles.insert((1, 1), Ok(Bytes::from_static(b"not an image")));
        let (f, p, m) = fetcher(StaticProvider { tiles, calls: AtomicUsize::new(0) });

        let result = f.fetch_tiles(&geometry_2x2()).await;
        let present: Vec<bool> = result.iter().map(|(_, t)| t.is_some()).collect();
        assert_eq!(present, vec![true, false, false, false]);
        assert_eq!(result[0].1.as_ref().unwrap().pixel(3, 3), &[10, 20, 30]);
        assert_eq!(p.calls.load(Ordering::SeqCst), 4);
        assert_eq!(m.tiles_failed_total.get(), 3);
    }

    #[test]
    fn decode_checks_tile_size() {
        assert_eq!(
            decode_tile(&png([0, 0, 0], 8), TS).unwrap_err(),
            TileError::UnexpectedSize { width: 8, height: 8, expected: TS }
        );
        assert!(matches!(decode_tile(b"garbage", TS), Err(TileError::Decode(_))));
    }

    #[tokio::test]
    async fn region_with_no_tiles_is_no_imagery() {
        let (f, _, m) = fetcher(StaticProvider { tiles: HashMap::new(), calls: AtomicUsize::new(0) });
        let bbox = GeoBoundingBox::around(48.8584, 2.2945, 0.0005).unwrap();
        let err = f.fetch_region(&bbox, 18).await.unwrap_err();
        assert!(matches!(err, AnalysisError::NoImagery { .. }));
        assert!(err.is_retryable());
        assert_eq!(m.regions_fetched_total.get(), 0);
    }

    /// Fails the first `failures` attempts of every tile.
    struct FlakyProvider {
        failures: usize,
        attempts: parking_lot::Mutex<HashMap<(u32, u32), usize>>,
    }

    impl TileProvider for FlakyProvider {
        async fn fetch(&self, tile: TileCoordinate) -> Result<Bytes, TileError> {
            let n = {
                let mut a = self.attempts.lock();
                let n = a.entry((tile.x, tile.y)).or_default();
                *n += 1;
                *n
            };
            if n <= self.failures {
                Err(TileError::Status(503))
            } else {
                Ok(png([200, 200, 200], TS))
            }
        }
    }

    #[tokio::test]
    async fn retries_recover_transient_failures() {
        let provider = FlakyProvider { failures: 2, attempts: Default::default() };
        let (f, _, m) = fetcher(provider);

        let single = f.fetch_tiles(&geometry_2x2()).await;
        assert!(single.iter().all(|(_, t)| t.is_none()));

        let f = f.with_retries(1);
        let retried = f.fetch_tiles(&geometry_2x2()).await;
        assert!(retried.iter().all(|(_, t)| t.is_some()));
        assert_eq!(m.tiles_requested_total.get(), 4 + 2 * 4);
    }

    /// Counts tasks that started and futures that were dropped before finishing.
    struct HangingProvider {
        started: Arc<AtomicUsize>,
        dropped: Arc<AtomicUsize>,
    }

    struct DropGuard(Arc<AtomicUsize>);

    impl Drop for DropGuard {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl TileProvider for HangingProvider {
        async fn fetch(&self, _tile: TileCoordinate) -> Result<Bytes, TileError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let _guard = DropGuard(self.dropped.clone());
            std::future::pending::<()>().await;
            Err(TileError::Timeout)
        }
    }

    #[tokio::test]
    async fn dropping_the_region_future_aborts_every_tile() {
        let started = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicUsize::new(0));
        let (f, _, _) = fetcher(HangingProvider {
            started: started.clone(),
            dropped: dropped.clone(),
        });
        let bbox = GeoBoundingBox::around(40.0, -75.0, 0.0002).unwrap();
        let expected = RegionGeometry::from_bbox(&bbox, 18, TS).unwrap().tile_count();

        let outcome = tokio::time::timeout(Duration::from_millis(100), f.fetch_region(&bbox, 18)).await;
        assert!(outcome.is_err());

        // Aborted tasks are dropped by the runtime shortly after the set is.
        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(started.load(Ordering::SeqCst), expected);
        assert_eq!(dropped.load(Ordering::SeqCst), expected);
    }
}
