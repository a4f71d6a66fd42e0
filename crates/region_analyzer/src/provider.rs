//! Sources of encoded map tiles.

use crate::error::TileError;
use bytes::Bytes;
use heatgrid::TileCoordinate;
use std::future::Future;
use std::time::Duration;

/// Default satellite tile endpoint.
pub const DEFAULT_TILE_URL: &str = "https://mt.google.com/vt/lyrs=s&x={x}&y={y}&z={z}";

/// Browser user agent; public tile endpoints reject unknown clients.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Anything that can return the encoded image of a tile.
///
/// One call is one attempt; the fetcher owns retry policy.
pub trait TileProvider: Send + Sync + 'static {
    fn fetch(&self, tile: TileCoordinate) -> impl Future<Output = Result<Bytes, TileError>> + Send;
}

/// Fetches tiles over HTTP from a `{x}`/`{y}`/`{z}` URL template.
pub struct HttpTileProvider {
    client: reqwest::Client,
    url_template: String,
}

impl HttpTileProvider {
    pub fn new(url_template: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self, TileError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| TileError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }

    pub fn url(&self, tile: TileCoordinate) -> String {
        expand_template(&self.url_template, tile)
    }
}

impl TileProvider for HttpTileProvider {
    async fn fetch(&self, tile: TileCoordinate) -> Result<Bytes, TileError> {
        let url = self.url(tile);
        let resp = self.client.get(&url).send().await.map_err(classify)?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(%url, status = status.as_u16(), "Tile provider returned error status");
            return Err(TileError::Status(status.as_u16()));
        }

        resp.bytes().await.map_err(classify)
    }
}

fn classify(e: reqwest::Error) -> TileError {
    if e.is_timeout() {
        TileError::Timeout
    } else {
        TileError::Transport(e.to_string())
    }
}

/// Substitutes `{x}`, `{y}` and `{z}` in a tile URL template.
pub fn expand_template(template: &str, tile: TileCoordinate) -> String {
    template
        .replace("{x}", &tile.x.to_string())
        .replace("{y}", &tile.y.to_string())
        .replace("{z}", &tile.zoom.to_string())
}
