use crate::inference::ClassMapping;
use crate::pipeline::TemperatureScale;
use crate::provider::{DEFAULT_TILE_URL, DEFAULT_USER_AGENT};
use clap::Parser;
use heatgrid::{HeatMethod, HeatParams};
use std::path::PathBuf;
use std::time::Duration;

/// `region_analyzer` - Urban heat analysis of satellite imagery around a point.
///
/// For every location, the covering map tiles are fetched and stitched, the
/// mosaic is segmented into building and vegetation masks, and a signed heat
/// influence field is synthesized from the two masks.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Centre of a region to analyze, as `LAT,LON` in degrees. Repeatable.
    #[arg(long = "location", required = true, allow_hyphen_values = true, value_parser = parse_location)]
    pub locations: Vec<(f64, f64)>,

    /// Half-size of the analyzed square, in degrees.
    #[arg(long, env = "ANALYSIS_RADIUS", default_value_t = 0.002)]
    pub radius: f64,

    /// Map zoom level of the fetched tiles.
    #[arg(long, env = "TILE_ZOOM", default_value_t = 18)]
    pub zoom: u8,

    /// Tile URL template with `{x}`, `{y}` and `{z}` placeholders.
    #[arg(long, env = "TILE_URL_TEMPLATE", default_value = DEFAULT_TILE_URL)]
    pub tile_url: String,

    /// Edge length of provider tiles, in pixels.
    #[arg(long, env = "TILE_SIZE", default_value_t = 256)]
    pub tile_size: u32,

    /// Per-request timeout of a single tile.
    #[arg(long, env = "TILE_TIMEOUT_MS", default_value_t = 5000)]
    pub tile_timeout_ms: u64,

    /// Extra attempts for a failed tile. `0` keeps a single attempt.
    #[arg(long, env = "TILE_RETRIES", default_value_t = 0)]
    pub tile_retries: u32,

    /// User agent sent with tile requests.
    #[arg(long, env = "TILE_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// JSON file with colour-index model parameters.
    ///
    /// Defaults are used when omitted.
    #[arg(long, env = "MODEL_CONFIG")]
    pub model_config: Option<PathBuf>,

    /// Model class id of buildings.
    #[arg(long, env = "BUILDING_CLASS", default_value_t = 0)]
    pub building_class: usize,

    /// Model class id of vegetation.
    #[arg(long, env = "VEGETATION_CLASS", default_value_t = 3)]
    pub vegetation_class: usize,

    /// Heat field method: `weighted`, `ndui` or `signed_distance`.
    #[arg(long, env = "HEAT_METHOD", default_value = "ndui")]
    pub heat_method: HeatMethod,

    /// Gaussian influence radius of buildings, in pixels.
    #[arg(long, default_value_t = 20.0)]
    pub sigma_build: f64,

    /// Gaussian influence radius of vegetation, in pixels.
    #[arg(long, default_value_t = 20.0)]
    pub sigma_veg: f64,

    #[arg(long, default_value_t = 1.0)]
    pub w_build: f32,

    #[arg(long, default_value_t = 0.9)]
    pub w_veg: f32,

    /// Pseudo-temperature at zero heat influence, in degrees Celsius.
    #[arg(long, default_value_t = 25.0)]
    pub base_temp: f32,

    /// Pseudo-temperature swing at full heat influence.
    #[arg(long, default_value_t = 5.0)]
    pub delta_temp: f32,

    /// Directory receiving PNG and JSON artefacts of each analysis.
    #[arg(long, env = "OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Listen address of the Prometheus metrics server. Disabled when unset.
    #[arg(long, env = "METRICS_LISTEN_ADDR")]
    pub metrics_listen_addr: Option<String>,

    /// Number of finished analyses kept in memory.
    #[arg(long, env = "REGISTRY_CAPACITY", default_value_t = 16)]
    pub registry_capacity: usize,
}

impl Config {
    pub fn heat_params(&self) -> HeatParams {
        HeatParams {
            method: self.heat_method,
            sigma_build: self.sigma_build,
            sigma_veg: self.sigma_veg,
            w_build: self.w_build,
            w_veg: self.w_veg,
        }
    }

    pub fn class_mapping(&self) -> ClassMapping {
        ClassMapping {
            building: self.building_class,
            vegetation: self.vegetation_class,
        }
    }

    pub fn temperature_scale(&self) -> TemperatureScale {
        TemperatureScale {
            base: self.base_temp,
            delta: self.delta_temp,
        }
    }

    pub fn tile_timeout(&self) -> Duration {
        Duration::from_millis(self.tile_timeout_ms)
    }
}

fn parse_location(s: &str) -> Result<(f64, f64), String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got `{s}`"))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude `{lat}`: {e}"))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("bad longitude `{lon}`: {e}"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("location {lat},{lon} is out of range"));
    }
    Ok((lat, lon))
}
