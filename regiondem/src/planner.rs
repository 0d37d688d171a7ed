//! Tile grid planning.
//!
//! Maps a geographic bounding box onto the set of 1° × 1° tiles that cover it.
//! Planning is pure: the same box and mode always produce the same ordered set.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::tile_id::TileId;

/// Upper edges are nudged down by this amount so a box ending exactly on a
/// whole degree does not pull in the cell beyond it.
const EDGE_EPSILON: f64 = 1e-9;

/// A geographic bounding box.
///
/// Coordinates are in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    /// Minimum latitude (southern boundary).
    pub min_lat: f64,
    /// Minimum longitude (western boundary).
    pub min_lon: f64,
    /// Maximum latitude (northern boundary).
    pub max_lat: f64,
    /// Maximum longitude (eastern boundary).
    pub max_lon: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    ///
    /// # Arguments
    ///
    /// * `min_lat` - Southern boundary latitude
    /// * `min_lon` - Western boundary longitude
    /// * `max_lat` - Northern boundary latitude
    /// * `max_lon` - Eastern boundary longitude
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Parse `minx,miny,maxx,maxy` (lon/lat order, as on the command line).
    pub fn parse_xy(s: &str) -> Option<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [minx, miny, maxx, maxy] if minx <= maxx && miny <= maxy => {
                Some(Self::new(*miny, *minx, *maxy, *maxx))
            }
            _ => None,
        }
    }

    /// Grow the box by `degrees` on every side.
    pub fn buffered(&self, degrees: f64) -> Self {
        Self::new(
            self.min_lat - degrees,
            self.min_lon - degrees,
            self.max_lat + degrees,
            self.max_lon + degrees,
        )
    }

    /// Centre point as `(lat, lon)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// Check if this bounding box overlaps with a 1°×1° tile.
    ///
    /// A tile at `(tile_lat, tile_lon)` covers the area
    /// `[tile_lat, tile_lat+1) × [tile_lon, tile_lon+1)`.
    pub fn overlaps_tile(&self, tile: TileId) -> bool {
        let tile_lat = tile.lat() as f64;
        let tile_lon = tile.lon() as f64;

        self.min_lat < tile_lat + 1.0
            && self.max_lat > tile_lat
            && self.min_lon < tile_lon + 1.0
            && self.max_lon > tile_lon
    }
}

/// How aggressively to enumerate cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    /// The cells holding the box corners, plus any cells between them.
    Corners,
    /// Every cell from `floor(min)` through `ceil(max)` on both axes.
    Exhaustive,
}

/// Compute the tiles covering `bbox`.
///
/// ```
/// use regiondem::{plan, BoundingBox, PlanMode};
///
/// // A box inside one cell needs exactly one tile.
/// let bbox = BoundingBox::new(-34.8, -71.8, -34.2, -71.2);
/// let tiles = plan(&bbox, PlanMode::Corners);
/// assert_eq!(tiles.len(), 1);
/// assert_eq!(tiles.iter().next().unwrap().to_string(), "S35W072");
/// ```
pub fn plan(bbox: &BoundingBox, mode: PlanMode) -> BTreeSet<TileId> {
    let (lat_lo, lat_hi, lon_lo, lon_hi) = match mode {
        PlanMode::Corners => {
            let lat_lo = bbox.min_lat.floor() as i32;
            let lon_lo = bbox.min_lon.floor() as i32;
            // A degenerate box still gets the cell it sits in.
            let lat_hi = ((bbox.max_lat - EDGE_EPSILON).floor() as i32).max(lat_lo);
            let lon_hi = ((bbox.max_lon - EDGE_EPSILON).floor() as i32).max(lon_lo);
            (lat_lo, lat_hi, lon_lo, lon_hi)
        }
        PlanMode::Exhaustive => (
            bbox.min_lat.floor() as i32,
            bbox.max_lat.ceil() as i32,
            bbox.min_lon.floor() as i32,
            bbox.max_lon.ceil() as i32,
        ),
    };

    let mut tiles = BTreeSet::new();
    for lat in lat_lo..=lat_hi {
        for lon in lon_lo..=lon_hi {
            tiles.insert(TileId::new(lat, lon));
        }
    }
    tiles
}
