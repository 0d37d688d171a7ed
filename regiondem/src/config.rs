//! Pipeline configuration.
//!
//! Every knob has a working default; [`PipelineConfig::from_env`] reads
//! `REGIONDEM_*` variables on top of those defaults.
//!
//! # Environment Variables
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `REGIONDEM_OUTPUT_DIR` | Output directory (required) |
//! | `REGIONDEM_CACHE_DIR` | Directory holding raw `.hgt` tiles |
//! | `REGIONDEM_TARGET_EPSG` | Projected CRS for the final rasters |
//! | `REGIONDEM_ADMIN_URL` | WFS endpoint of the administrative service |
//! | `REGIONDEM_ARCHIVE_URL` | ZIP with the official boundary layers |
//! | `REGIONDEM_GEOCODER_URL` | Nominatim-compatible search endpoint |
//! | `REGIONDEM_COUNTRY` | Country appended to geocoder queries |
//! | `REGIONDEM_MIRRORS` | Comma-separated tile URL templates |
//! | `REGIONDEM_CATALOG_URL` | STAC API root |
//! | `REGIONDEM_TIMEOUT_SECS` | Default per-request timeout |

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DemError, Result};
use crate::fetch::mirror::{default_mirrors, skadi, Mirror};
use crate::transport::DEFAULT_TIMEOUT_SECS;

pub const DEFAULT_ADMIN_URL: &str = "https://www.ide.cl/geoserver/wfs";
pub const DEFAULT_ARCHIVE_URL: &str =
    "https://www.geoportal.cl/geoportal/catalog/download/912598ad-ac92-35f6-8045-098f214bd9c2";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_CATALOG_URL: &str = "https://planetarycomputer.microsoft.com/api/stac/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/token";
pub const DEFAULT_COLLECTION: &str = "cop-dem-glo-30";

/// Where and how the region boundary is looked up.
#[derive(Debug, Clone)]
pub struct BoundaryConfig {
    /// WFS endpoint.
    pub admin_url: String,
    /// WFS feature type holding the regions.
    pub admin_layer: String,
    /// Attribute compared in the CQL filter.
    pub admin_name_field: String,
    /// Skip the administrative service entirely.
    pub skip_admin: bool,
    /// ZIP with the official shapefile layers.
    pub archive_url: String,
    /// Substring that marks the region-level layer inside the archive.
    pub archive_marker: String,
    /// Lower-case substrings identifying the name column.
    pub name_columns: Vec<String>,
    /// CRS of the archive layer when its `.prj` is missing or unrecognised.
    pub archive_epsg: Option<u32>,
    /// Nominatim-compatible search endpoint.
    pub geocoder_url: String,
    /// Appended to geocoder queries as `"<name>, <country>"`.
    pub country: String,
    pub timeout: Duration,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            admin_url: DEFAULT_ADMIN_URL.to_string(),
            admin_layer: "division_comunal".to_string(),
            admin_name_field: "comuna".to_string(),
            skip_admin: false,
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            archive_marker: "com".to_string(),
            name_columns: vec!["comuna".to_string(), "nom_com".to_string()],
            archive_epsg: None,
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            country: "Chile".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Tile mirrors, retries and the on-disk tile cache.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Mirrors tried in order for every tile.
    pub mirrors: Vec<Mirror>,
    /// Mirror for the last-resort single-tile retry; `None` disables it.
    pub forced_mirror: Option<Mirror>,
    pub timeout: Duration,
    pub forced_timeout: Duration,
    /// Minimum decompressed size accepted from the forced retry.
    pub forced_min_bytes: usize,
    /// Directory of raw `.hgt` files, read before and written after downloads.
    pub cache_dir: Option<PathBuf>,
    /// Maximum number of decoded tiles kept in memory.
    pub cache_size: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mirrors: default_mirrors(),
            forced_mirror: Some(skadi()),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            forced_timeout: Duration::from_secs(180),
            forced_min_bytes: 1_000_000,
            cache_dir: None,
            cache_size: 64,
        }
    }
}

/// STAC catalog used for the satellite DEM fallback.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub enabled: bool,
    /// STAC API root; `/search` is appended.
    pub url: String,
    pub collection: String,
    /// SAS token endpoint; `None` leaves hrefs unsigned.
    pub token_url: Option<String>,
    /// Degrees added around the boundary bbox.
    pub buffer_deg: f64,
    pub limit: u32,
    /// Timeout of search and token requests.
    pub timeout: Duration,
    /// Timeout of the asset download.
    pub download_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: DEFAULT_CATALOG_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            token_url: Some(DEFAULT_TOKEN_URL.to_string()),
            buffer_deg: 0.05,
            limit: 10,
            timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Complete configuration of a pipeline run.
///
/// # Example
///
/// ```
/// use regiondem::PipelineConfig;
///
/// let config = PipelineConfig::new("/tmp/out")
///     .with_target_epsg(32719)
///     .with_skip_admin(true)
///     .with_cache_dir("/tmp/tiles");
/// assert_eq!(config.target_epsg, Some(32719));
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    /// Projected CRS of the final raster; `None` picks the UTM zone of the boundary.
    pub target_epsg: Option<u32>,
    /// Also write the unclipped geographic mosaic.
    pub write_mosaic: bool,
    pub boundary: BoundaryConfig,
    pub fetch: FetchConfig,
    pub catalog: CatalogConfig,
}

impl PipelineConfig {
    /// Defaults with the given output directory.
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            target_epsg: None,
            write_mosaic: true,
            boundary: BoundaryConfig::default(),
            fetch: FetchConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }

    /// Build a configuration from `REGIONDEM_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `REGIONDEM_OUTPUT_DIR` is not set or a numeric
    /// variable does not parse.
    pub fn from_env() -> Result<Self> {
        let output_dir = std::env::var("REGIONDEM_OUTPUT_DIR").map_err(|_| {
            DemError::Config("REGIONDEM_OUTPUT_DIR environment variable not set".to_string())
        })?;
        Self::new(output_dir).with_env()
    }

    /// Apply the optional `REGIONDEM_*` variables on top of `self`.
    ///
    /// `REGIONDEM_OUTPUT_DIR` is not read here.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse.
    pub fn with_env(self) -> Result<Self> {
        let mut config = self;

        if let Ok(dir) = std::env::var("REGIONDEM_CACHE_DIR") {
            config.fetch.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(epsg) = parse_env::<u32>("REGIONDEM_TARGET_EPSG")? {
            config.target_epsg = Some(epsg);
        }
        if let Ok(url) = std::env::var("REGIONDEM_ADMIN_URL") {
            config.boundary.admin_url = url;
        }
        if let Ok(url) = std::env::var("REGIONDEM_ARCHIVE_URL") {
            config.boundary.archive_url = url;
        }
        if let Ok(url) = std::env::var("REGIONDEM_GEOCODER_URL") {
            config.boundary.geocoder_url = url;
        }
        if let Ok(country) = std::env::var("REGIONDEM_COUNTRY") {
            config.boundary.country = country;
        }
        if let Ok(list) = std::env::var("REGIONDEM_MIRRORS") {
            let mirrors: Vec<Mirror> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Mirror::new)
                .collect();
            if !mirrors.is_empty() {
                config.fetch.mirrors = mirrors;
            }
        }
        if let Ok(url) = std::env::var("REGIONDEM_CATALOG_URL") {
            config.catalog.url = url;
        }
        if let Some(secs) = parse_env::<u64>("REGIONDEM_TIMEOUT_SECS")? {
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn with_output_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn with_target_epsg(mut self, epsg: u32) -> Self {
        self.target_epsg = Some(epsg);
        self
    }

    pub fn with_cache_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.fetch.cache_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_skip_admin(mut self, skip: bool) -> Self {
        self.boundary.skip_admin = skip;
        self
    }

    pub fn with_admin_url(mut self, url: impl Into<String>) -> Self {
        self.boundary.admin_url = url.into();
        self
    }

    pub fn with_archive_url(mut self, url: impl Into<String>) -> Self {
        self.boundary.archive_url = url.into();
        self
    }

    pub fn with_geocoder_url(mut self, url: impl Into<String>) -> Self {
        self.boundary.geocoder_url = url.into();
        self
    }

    pub fn with_mirrors(mut self, mirrors: Vec<Mirror>) -> Self {
        self.fetch.mirrors = mirrors;
        self
    }

    pub fn with_forced_mirror(mut self, mirror: Option<Mirror>) -> Self {
        self.fetch.forced_mirror = mirror;
        self
    }

    pub fn with_catalog_url(mut self, url: impl Into<String>) -> Self {
        self.catalog.url = url.into();
        self
    }

    /// Disable SAS signing of catalog asset hrefs.
    pub fn without_signing(mut self) -> Self {
        self.catalog.token_url = None;
        self
    }

    pub fn with_write_mosaic(mut self, write: bool) -> Self {
        self.write_mosaic = write;
        self
    }

    /// Set the default timeout of boundary, tile and asset requests.
    ///
    /// The forced tile retry and catalog search keep their own timeouts.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.boundary.timeout = timeout;
        self.fetch.timeout = timeout;
        self.catalog.download_timeout = timeout;
        self
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DemError::Config(format!("{name}={value} is not a valid number"))),
        Err(_) => Ok(None),
    }
}
