//! # regiondem - Region boundaries and elevation rasters
//!
//! Resolves the outline of a named administrative region from unreliable,
//! inconsistently named sources and produces a clipped, projected elevation
//! raster for it.
//!
//! ## Features
//!
//! - **Boundary cascade**: WFS service, official shapefile archive, then a geocoder
//! - **Tile planning**: minimal set of 1°×1° SRTM cells covering a bounding box
//! - **Resilient fetching**: ordered mirrors with raw, gzip and zip payloads,
//!   an exhaustive second pass and a forced retry
//! - **Satellite fallback**: STAC catalog search when no tile can be obtained
//! - **All-or-nothing output**: rasters are written only once every stage succeeded
//!
//! ## Quick Start
//!
//! ```
//! use regiondem::{plan, BoundingBox, PlanMode, TileId};
//!
//! // 34.5°S 71.5°W lies in the cell whose south-west corner is 35°S 72°W
//! let id = TileId::from_lat_lon(-34.5, -71.5);
//! assert_eq!(id.to_string(), "S35W072");
//!
//! // A box inside one cell needs exactly that tile
//! let bbox = BoundingBox::new(-34.9, -71.9, -34.1, -71.1);
//! let tiles = plan(&bbox, PlanMode::Corners);
//! assert_eq!(tiles.into_iter().collect::<Vec<_>>(), vec![id]);
//! ```
//!
//! Running the whole pipeline:
//!
//! ```no_run
//! use regiondem::{HttpTransport, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::new("./out").with_cache_dir("./tiles");
//! let pipeline = Pipeline::new(HttpTransport::new()?, config);
//! let result = pipeline.run("San Joaquín");
//! println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
//! # Ok::<(), regiondem::DemError>(())
//! ```
//!
//! ## SRTM Data Format
//!
//! - **SRTM1**: 3601×3601 samples, 1 arc-second (~30m) resolution
//! - **SRTM3**: 1201×1201 samples, 3 arc-second (~90m) resolution
//!
//! Each sample is a 16-bit big-endian signed integer in meters; -32768 marks a void.

pub mod boundary;
pub mod config;
pub mod crs;
pub mod error;
pub mod fetch;
pub mod hgt;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod planner;
pub mod raster;
pub mod satellite;
pub mod tile_id;
pub mod transport;

// Re-export main types at crate root for convenience
pub use boundary::{BoundaryGeometry, BoundaryResolver, BoundarySource};
pub use config::{BoundaryConfig, CatalogConfig, FetchConfig, PipelineConfig};
pub use error::{DemError, FailureReason, Result, Stage};
pub use fetch::{Mirror, TileFetcher};
pub use normalize::normalize_name;
pub use pipeline::{ElevationSource, Pipeline, PipelineFailure, PipelineResult};
pub use planner::{plan, BoundingBox, PlanMode};
pub use raster::{GeoTransform, RasterDataset};
pub use tile_id::TileId;
pub use transport::{HttpResponse, HttpTransport, Transport};
