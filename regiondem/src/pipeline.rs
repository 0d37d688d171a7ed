//! End-to-end orchestration.
//!
//! [`Pipeline::run`] resolves the boundary, acquires elevation (tiles first,
//! satellite DEM when every tile tier failed), clips and reprojects, and only
//! then writes every artifact. A failed run leaves the output directory as it
//! found it.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::boundary::geojson::to_feature_collection;
use crate::boundary::{BoundaryGeometry, BoundaryResolver, BoundarySource};
use crate::config::PipelineConfig;
use crate::crs::utm_epsg_for;
use crate::error::{DemError, FailureReason, Result, Stage};
use crate::fetch::{FetchStats, TileFetcher};
use crate::normalize::sanitize_region_name;
use crate::output::StagedOutputs;
use crate::raster::{clip, geotiff, mosaic, reproject, RasterDataset};
use crate::satellite;
use crate::transport::Transport;

/// File name of the boundary artifact.
pub const BOUNDARY_FILE: &str = "boundary.geojson";
/// File name of the unclipped tile mosaic.
pub const MOSAIC_FILE: &str = "srtm_mosaic.tif";
/// Stem of the clipped tile rasters.
pub const SRTM_STEM: &str = "srtm_dem";
/// Stem of the clipped satellite rasters.
pub const SATELLITE_STEM: &str = "copernicus_dem";

/// Which product the elevation raster came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElevationSource {
    SrtmTiles,
    SatelliteDem,
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineFailure {
    /// Stage that ran out of sources, when the failure is an exhaustion.
    pub stage: Option<Stage>,
    pub reason: FailureReason,
    /// Reason of the last attempt behind an exhaustion.
    pub last_reason: FailureReason,
    pub message: String,
}

impl PipelineFailure {
    fn from_error(error: &DemError) -> Self {
        let stage = match error {
            DemError::Exhausted { stage, .. } => Some(*stage),
            _ => None,
        };
        Self {
            stage,
            reason: error.reason(),
            last_reason: error.root_reason(),
            message: error.to_string(),
        }
    }
}

/// Outcome of [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    /// Region name after flag sanitization.
    pub region: String,
    pub success: bool,
    /// Files written, in write order. Empty on failure.
    pub outputs: Vec<PathBuf>,
    pub elevation_source: Option<ElevationSource>,
    pub boundary_source: Option<BoundarySource>,
    /// Tiles that went into the mosaic.
    pub tiles: Vec<String>,
    /// CRS of the projected raster.
    pub target_epsg: Option<u32>,
    pub fetch_stats: FetchStats,
    pub failure: Option<PipelineFailure>,
}

impl PipelineResult {
    fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            success: false,
            outputs: Vec::new(),
            elevation_source: None,
            boundary_source: None,
            tiles: Vec::new(),
            target_epsg: None,
            fetch_stats: FetchStats::default(),
            failure: None,
        }
    }
}

/// The boundary-to-raster cascade over one transport.
///
/// # Example
///
/// ```no_run
/// use regiondem::{HttpTransport, Pipeline, PipelineConfig};
///
/// let transport = HttpTransport::new()?;
/// let config = PipelineConfig::new("./out").with_cache_dir("./tiles");
/// let pipeline = Pipeline::new(transport, config);
///
/// let result = pipeline.run("Ñuñoa");
/// if result.success {
///     for path in &result.outputs {
///         println!("{}", path.display());
///     }
/// }
/// # Ok::<(), regiondem::DemError>(())
/// ```
pub struct Pipeline<T> {
    fetcher: TileFetcher<T>,
    config: PipelineConfig,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(transport: T, config: PipelineConfig) -> Self {
        let fetcher = TileFetcher::new(transport, config.fetch.clone());
        Self { fetcher, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &TileFetcher<T> {
        &self.fetcher
    }

    /// Run the whole cascade for `region`. Never panics on source failures;
    /// inspect [`PipelineResult::failure`].
    pub fn run(&self, region: &str) -> PipelineResult {
        let region = sanitize_region_name(region);
        let mut result = PipelineResult::new(&region);

        let outcome = self.execute(&region, &mut result).and_then(|staged| {
            tracing::debug!(files = ?staged.paths(), "Committing outputs");
            staged.commit()
        });
        match outcome {
            Ok(paths) => {
                result.success = true;
                result.outputs = paths;
                tracing::info!(
                    region = %region,
                    outputs = result.outputs.len(),
                    elevation = ?result.elevation_source,
                    "Pipeline finished"
                );
            }
            Err(e) => {
                tracing::error!(region = %region, error = %e, "Pipeline failed");
                result.failure = Some(PipelineFailure::from_error(&e));
            }
        }
        result.fetch_stats = self.fetcher.stats();
        result
    }

    /// Resolve the boundary only.
    pub fn resolve_boundary(&self, region: &str) -> Result<BoundaryGeometry> {
        BoundaryResolver::new(self.fetcher.transport(), &self.config.boundary).resolve(region)
    }

    /// Resolve the boundary and write it to `boundary.geojson`.
    pub fn write_boundary(&self, region: &str) -> Result<(BoundaryGeometry, PathBuf)> {
        let boundary = self.resolve_boundary(&sanitize_region_name(region))?;
        let mut staged = StagedOutputs::new();
        staged.stage(
            self.output_path(BOUNDARY_FILE),
            to_feature_collection(&boundary).into_bytes(),
        );
        let path = staged.commit()?.remove(0);
        Ok((boundary, path))
    }

    fn execute(&self, region: &str, result: &mut PipelineResult) -> Result<StagedOutputs> {
        let boundary = self.resolve_boundary(region)?;
        result.boundary_source = Some(boundary.source());

        let target = self.target_epsg(&boundary);
        result.target_epsg = Some(target);

        let mut staged = StagedOutputs::new();
        staged.stage(
            self.output_path(BOUNDARY_FILE),
            to_feature_collection(&boundary).into_bytes(),
        );

        match self.fetcher.fetch_all(&boundary.bbox()) {
            Ok(tiles) => {
                result.tiles = tiles.ids().iter().map(ToString::to_string).collect();
                let merged = mosaic::assemble(&tiles.rasters())?;
                tracing::info!(
                    tiles = result.tiles.len(),
                    width = merged.width(),
                    height = merged.height(),
                    "Mosaic assembled"
                );
                if self.config.write_mosaic {
                    staged.stage(self.output_path(MOSAIC_FILE), geotiff::encode(&merged)?);
                }
                self.stage_elevation(&merged, &boundary, target, SRTM_STEM, &mut staged)?;
                result.elevation_source = Some(ElevationSource::SrtmTiles);
            }
            Err(DemError::Exhausted { stage: Stage::Tiles, last }) if self.config.catalog.enabled => {
                tracing::warn!(error = %last, "No elevation tiles available, trying satellite DEM");
                let dem = satellite::fetch_dem(
                    self.fetcher.transport(),
                    &self.config.catalog,
                    &boundary.bbox(),
                )?;
                self.stage_elevation(&dem, &boundary, target, SATELLITE_STEM, &mut staged)?;
                result.elevation_source = Some(ElevationSource::SatelliteDem);
            }
            Err(e) => return Err(e),
        }

        Ok(staged)
    }

    /// Clip and reproject `raster`, staging `<stem>.tif` and `<stem>_<epsg>.tif`.
    fn stage_elevation(
        &self,
        raster: &RasterDataset,
        boundary: &BoundaryGeometry,
        target: u32,
        stem: &str,
        staged: &mut StagedOutputs,
    ) -> Result<()> {
        let clipped = clip::clip(raster, boundary)?;
        let projected = reproject::reproject(&clipped, target)?;

        let stats = projected.stats();
        tracing::info!(
            epsg = target,
            width = projected.width(),
            height = projected.height(),
            cell_size = projected.transform().pixel_width,
            min = stats.min,
            max = stats.max,
            "Elevation raster ready"
        );

        staged.stage(self.output_path(&format!("{stem}.tif")), geotiff::encode(&clipped)?);
        staged.stage(
            self.output_path(&format!("{stem}_{target}.tif")),
            geotiff::encode(&projected)?,
        );
        Ok(())
    }

    fn target_epsg(&self, boundary: &BoundaryGeometry) -> u32 {
        match self.config.target_epsg {
            Some(epsg) => epsg,
            None => {
                let (lat, lon) = boundary.centroid();
                let epsg = utm_epsg_for(lat, lon);
                tracing::debug!(epsg, lat, lon, "Target CRS from boundary centroid");
                epsg
            }
        }
    }

    fn output_path(&self, name: &str) -> PathBuf {
        Path::new(&self.config.output_dir).join(name)
    }
}
