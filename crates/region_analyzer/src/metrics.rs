use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};

/// Prometheus collectors for the region analyzer.
///
/// Wrapped in an `Arc` and shared by the fetcher, the analyzer and the
/// `/metrics` endpoint.
pub struct Metrics {
    pub registry: Registry,
    /// Tile requests issued, including retries.
    pub tiles_requested_total: IntCounter,
    /// Tiles that were left blank after every attempt failed.
    pub tiles_failed_total: IntCounter,
    /// Regions for which at least one tile was stitched.
    pub regions_fetched_total: IntCounter,
    /// Regions that ended in an error of any kind.
    pub region_failures_total: IntCounter,
    /// Model input tiles pushed through segmentation.
    pub inference_tiles_total: IntCounter,
    /// Wall-clock time of a full analysis.
    pub analysis_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        // Custom registry so several analyzers can coexist in one process.
        let registry = Registry::new_custom(Some("region_analyzer".into()), None)?;

        macro_rules! reg {
            ($metric:expr) => {{
                let collector = $metric;
                registry.register(Box::new(collector.clone()))?;
                collector
            }};
        }

        Ok(Self {
            tiles_requested_total: reg!(IntCounter::new(
                "tiles_requested_total",
                "Total number of tile requests sent to the provider"
            )?),
            tiles_failed_total: reg!(IntCounter::new(
                "tiles_failed_total",
                "Total number of tiles that could not be fetched or decoded"
            )?),
            regions_fetched_total: reg!(IntCounter::new(
                "regions_fetched_total",
                "Total number of regions stitched from at least one tile"
            )?),
            region_failures_total: reg!(IntCounter::new(
                "region_failures_total",
                "Total number of region analyses that failed"
            )?),
            inference_tiles_total: reg!(IntCounter::new(
                "inference_tiles_total",
                "Total number of model input tiles segmented"
            )?),
            analysis_seconds: reg!(Histogram::with_opts(
                HistogramOpts::new("analysis_seconds", "Duration of a full region analysis")
                    .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            )?),
            registry,
        })
    }

    /// Text exposition of every registered collector.
    pub fn render(&self) -> prometheus::Result<String> {
        encode(&self.registry)
    }

    /// Creates an `axum::Router` that serves the metrics on `/metrics`.
    pub fn router(&self) -> Router {
        let registry = self.registry.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let registry = registry.clone();
                async move {
                    match encode(&registry) {
                        Ok(body) => body.into_response(),
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to encode metrics");
                            StatusCode::INTERNAL_SERVER_ERROR.into_response()
                        }
                    }
                }
            }),
        )
    }
}

fn encode(registry: &Registry) -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
