use anyhow::Context;
use clap::Parser;
use region_analyzer::config::Config;
use region_analyzer::{
    export, ColorIndexModel, HttpTileProvider, Metrics, RegionAnalyzer, ResultRegistry, TileFetcher,
    TileInferenceEngine,
};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Initialization ---
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();
    let config = Config::parse();
    tracing::info!(config = ?config, "Region analyzer starting with configuration");

    let params = config.heat_params();
    if let Err(e) = params.validate() {
        tracing::error!(error = %e, "Invalid heat field parameters");
        return Err(e.into());
    }

    let metrics = Arc::new(Metrics::new().context("creating metrics registry")?);

    // Model is loaded once and shared read-only by every request.
    let model = ColorIndexModel::load(config.model_config.as_deref()).context("loading segmentation model")?;
    let engine = TileInferenceEngine::new(Arc::new(model), config.class_mapping())
        .context("configuring inference engine")?;

    let provider = HttpTileProvider::new(&config.tile_url, &config.user_agent, config.tile_timeout())
        .context("building tile client")?;
    let fetcher = TileFetcher::new(Arc::new(provider), config.tile_size, metrics.clone())
        .with_retries(config.tile_retries);
    let analyzer = RegionAnalyzer::new(fetcher, engine, metrics.clone());
    let registry = ResultRegistry::new(config.registry_capacity);

    // --- 2. Start Metrics Server ---
    if let Some(addr) = &config.metrics_listen_addr {
        let metrics_addr: std::net::SocketAddr = addr.parse().context("parsing metrics listen address")?;
        let listener = tokio::net::TcpListener::bind(metrics_addr)
            .await
            .with_context(|| format!("binding metrics server to {metrics_addr}"))?;
        let router = metrics.router();
        tokio::spawn(async move {
            tracing::info!(addr = %metrics_addr, "Metrics server started");
            if let Err(e) = axum::serve(listener, router.into_make_service()).await {
                tracing::error!(error = %e, "Metrics server exited with an error");
            }
        });
    }

    // --- 3. Analyze Every Location ---
    let scale = config.temperature_scale();
    let (mut analyzed, mut failures) = (0usize, 0usize);
    for &(lat, lon) in &config.locations {
        let outcome = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, cancelling analysis.");
                return Ok(());
            },
            outcome = analyzer.analyze(lat, lon, config.radius, config.zoom, params, scale) => outcome,
        };

        let analysis = match outcome {
            Ok(a) => a,
            Err(e) => {
                failures += 1;
                tracing::error!(lat, lon, error = %e, retryable = e.is_retryable(), "Region analysis failed");
                continue;
            }
        };

        analyzed += 1;
        let (analysis, _) = registry.insert(analysis);

        if let Some(dir) = &config.output_dir {
            let written = export::write_analysis(&analysis, dir)
                .with_context(|| format!("exporting analysis {}", analysis.id))?;
            tracing::info!(id = %analysis.id, files = written.len(), dir = %dir.display(), "Analysis exported");
        }
    }

    tracing::info!(
        analyzed,
        retained = registry.len(),
        failed = failures,
        "All locations processed"
    );

    // Keep serving metrics until interrupted.
    if config.metrics_listen_addr.is_some() {
        tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
        tracing::info!("Shutdown signal received.");
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} locations failed", config.locations.len());
    }
    Ok(())
}
