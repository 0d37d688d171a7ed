//! Region boundary resolution.
//!
//! A boundary is looked up from three sources in strict priority order:
//!
//! 1. the administrative WFS service ([`admin`]),
//! 2. the official bulk shapefile archive ([`archive`]),
//! 3. a Nominatim-compatible geocoder ([`geocode`]).
//!
//! The first source that yields a valid polygon wins. Whatever CRS the
//! source used, the resulting [`BoundaryGeometry`] is in WGS84.

pub mod admin;
pub mod archive;
pub mod geocode;
pub mod geojson;

use std::fmt;

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, BoundingRect, Centroid, Coord, Line, LineString, MultiPolygon};
use serde::Serialize;

use crate::config::BoundaryConfig;
use crate::crs::{Projector, WGS84};
use crate::error::{DemError, Result, Stage};
use crate::normalize::normalize_name;
use crate::planner::BoundingBox;
use crate::transport::Transport;

/// Where a boundary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundarySource {
    /// Administrative WFS service.
    AdminService,
    /// Official bulk shapefile archive.
    OfficialArchive,
    /// Geocoder polygon or bounding box.
    Geocoder,
}

impl fmt::Display for BoundarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BoundarySource::AdminService => "administrative service",
            BoundarySource::OfficialArchive => "official archive",
            BoundarySource::Geocoder => "geocoder",
        };
        f.write_str(s)
    }
}

/// A validated region polygon in WGS84.
///
/// Created once per run and only read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryGeometry {
    shape: MultiPolygon<f64>,
    source: BoundarySource,
    name: String,
}

impl BoundaryGeometry {
    /// Validate `shape` (given in `epsg`) and normalize it to WGS84.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::Geometry`] for an empty or invalid polygon and
    /// [`DemError::Projection`] when `epsg` cannot be transformed.
    pub fn new(
        shape: MultiPolygon<f64>,
        epsg: u32,
        source: BoundarySource,
        name: impl Into<String>,
    ) -> Result<Self> {
        let shape = if epsg == WGS84 {
            shape
        } else {
            Projector::new(epsg, WGS84)?.transform_multipolygon(&shape)?
        };
        validate(&shape)?;
        Ok(Self {
            shape,
            source,
            name: name.into(),
        })
    }

    /// The polygon(s), in WGS84 longitude/latitude.
    pub fn shape(&self) -> &MultiPolygon<f64> {
        &self.shape
    }

    /// Always [`WGS84`].
    pub fn epsg(&self) -> u32 {
        WGS84
    }

    pub fn source(&self) -> BoundarySource {
        self.source
    }

    /// Region name as matched at the source.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Geographic bounding box.
    pub fn bbox(&self) -> BoundingBox {
        // validate() guarantees a non-empty shape
        match self.shape.bounding_rect() {
            Some(rect) => BoundingBox::new(rect.min().y, rect.min().x, rect.max().y, rect.max().x),
            None => BoundingBox::new(0.0, 0.0, 0.0, 0.0),
        }
    }

    /// Centroid as `(lat, lon)`.
    pub fn centroid(&self) -> (f64, f64) {
        match self.shape.centroid() {
            Some(p) => (p.y(), p.x()),
            None => self.bbox().center(),
        }
    }
}

/// Check that every polygon is non-degenerate and no ring crosses itself.
pub fn validate(shape: &MultiPolygon<f64>) -> Result<()> {
    if shape.0.is_empty() {
        return Err(DemError::Geometry("boundary has no polygons".to_string()));
    }
    for (i, polygon) in shape.0.iter().enumerate() {
        check_ring(polygon.exterior(), i, "exterior")?;
        for ring in polygon.interiors() {
            check_ring(ring, i, "interior")?;
        }
        if polygon.unsigned_area() <= 0.0 {
            return Err(DemError::Geometry(format!("polygon {i} has zero area")));
        }
    }
    Ok(())
}

fn check_ring(ring: &LineString<f64>, polygon: usize, kind: &str) -> Result<()> {
    let coords = &ring.0;
    if coords.len() < 4 {
        return Err(DemError::Geometry(format!(
            "polygon {polygon} {kind} ring has {} positions, need at least 4",
            coords.len()
        )));
    }
    if coords.first() != coords.last() {
        return Err(DemError::Geometry(format!(
            "polygon {polygon} {kind} ring is not closed"
        )));
    }
    if coords.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(DemError::Geometry(format!(
            "polygon {polygon} {kind} ring has non-finite coordinates"
        )));
    }
    if ring_self_intersects(coords) {
        return Err(DemError::Geometry(format!(
            "polygon {polygon} {kind} ring intersects itself"
        )));
    }
    Ok(())
}

/// Sweep over segments sorted by their west edge, testing only pairs whose
/// x-ranges overlap. Segments sharing a vertex in ring order are skipped.
fn ring_self_intersects(coords: &[Coord<f64>]) -> bool {
    let mut points: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in coords {
        if points.last() != Some(c) {
            points.push(*c);
        }
    }
    let segments: Vec<Line<f64>> = points.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let n = segments.len();
    if n < 3 {
        return n > 0;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let ax = segments[a].start.x.min(segments[a].end.x);
        let bx = segments[b].start.x.min(segments[b].end.x);
        ax.total_cmp(&bx)
    });

    let mut active: Vec<usize> = Vec::new();
    for &i in &order {
        let seg = segments[i];
        let min_x = seg.start.x.min(seg.end.x);
        active.retain(|&j| segments[j].start.x.max(segments[j].end.x) >= min_x);

        for &j in &active {
            let adjacent = i.abs_diff(j) == 1 || (i.min(j) == 0 && i.max(j) == n - 1);
            if adjacent {
                if let Some(LineIntersection::Collinear { intersection }) =
                    line_intersection(seg, segments[j])
                {
                    // Adjacent segments folding back over each other.
                    if intersection.start != intersection.end {
                        return true;
                    }
                }
                continue;
            }
            if line_intersection(seg, segments[j]).is_some() {
                return true;
            }
        }
        active.push(i);
    }
    false
}

/// One boundary source of the cascade.
type Fetch<T> = fn(&T, &BoundaryConfig, &str) -> Result<BoundaryGeometry>;

/// Runs the boundary cascade against one transport.
pub struct BoundaryResolver<'a, T> {
    transport: &'a T,
    config: &'a BoundaryConfig,
}

impl<'a, T: Transport> BoundaryResolver<'a, T> {
    pub fn new(transport: &'a T, config: &'a BoundaryConfig) -> Self {
        Self { transport, config }
    }

    /// Resolve `region` to a boundary; the first source that succeeds wins.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::Exhausted`] for [`Stage::Boundary`] carrying the
    /// error of the last source tried.
    pub fn resolve(&self, region: &str) -> Result<BoundaryGeometry> {
        let normalized = normalize_name(region);
        if normalized.is_empty() {
            return Err(DemError::Config(format!(
                "region name {region:?} is empty after normalization"
            )));
        }
        tracing::info!(region, normalized = %normalized, "Resolving boundary");

        let cascade: [(BoundarySource, Fetch<T>); 3] = [
            (BoundarySource::AdminService, admin::fetch::<T>),
            (BoundarySource::OfficialArchive, archive::fetch::<T>),
            (BoundarySource::Geocoder, geocode::fetch::<T>),
        ];

        let mut last_error = None;
        for (source, fetch) in cascade {
            if source == BoundarySource::AdminService && self.config.skip_admin {
                tracing::info!("Administrative service skipped by configuration");
                continue;
            }
            match fetch(self.transport, self.config, region) {
                Ok(boundary) => return Ok(self.accept(boundary)),
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "Boundary source failed");
                    last_error = Some(e);
                }
            }
        }

        Err(DemError::Exhausted {
            stage: Stage::Boundary,
            last: Box::new(
                last_error.unwrap_or_else(|| DemError::empty("boundary", "no sources configured")),
            ),
        })
    }

    fn accept(&self, boundary: BoundaryGeometry) -> BoundaryGeometry {
        let bbox = boundary.bbox();
        tracing::info!(
            source = %boundary.source(),
            name = boundary.name(),
            polygons = boundary.shape().0.len(),
            min_lon = bbox.min_lon,
            min_lat = bbox.min_lat,
            max_lon = bbox.max_lon,
            max_lat = bbox.max_lat,
            "Boundary resolved"
        );
        boundary
    }
}
