//! Geocoder fallback.
//!
//! Queries a Nominatim-compatible search endpoint for `"<name>, <country>"`.
//! A returned polygon is used as is; a point result is widened to the
//! feature's bounding box.

use geo::{MultiPolygon, Polygon, Rect};
use geojson::GeoJson;

use crate::boundary::geojson::feature_polygons;
use crate::boundary::{BoundaryGeometry, BoundarySource};
use crate::config::BoundaryConfig;
use crate::crs::WGS84;
use crate::error::{DemError, Result};
use crate::normalize::normalize_name;
use crate::transport::{get_ok, Transport};

const SOURCE: &str = "geocoder";

/// Geocode `region`, retrying with its normalized form when that differs.
pub fn fetch<T: Transport + ?Sized>(
    transport: &T,
    config: &BoundaryConfig,
    region: &str,
) -> Result<BoundaryGeometry> {
    let mut attempts = vec![region.trim().to_string()];
    let normalized = normalize_name(region);
    if !attempts.contains(&normalized) && !normalized.is_empty() {
        attempts.push(normalized);
    }

    let mut last_error = None;
    for name in &attempts {
        match query(transport, config, name) {
            Ok(shape) => {
                return BoundaryGeometry::new(shape, WGS84, BoundarySource::Geocoder, name.as_str())
            }
            Err(e) => {
                tracing::debug!(query = %name, error = %e, "Geocoder attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| DemError::empty(SOURCE, "no query to send")))
}

fn query<T: Transport + ?Sized>(
    transport: &T,
    config: &BoundaryConfig,
    name: &str,
) -> Result<MultiPolygon<f64>> {
    let q = if config.country.is_empty() {
        name.to_string()
    } else {
        format!("{name}, {}", config.country)
    };
    tracing::info!(url = %config.geocoder_url, query = %q, "Geocoding region");

    let body = get_ok(
        transport,
        SOURCE,
        &config.geocoder_url,
        &[
            ("q", q.as_str()),
            ("format", "geojson"),
            ("polygon_geojson", "1"),
            ("limit", "1"),
        ],
        config.timeout,
    )?;
    let text = String::from_utf8_lossy(&body);
    parse_response(&text)
}

/// Shape of the first usable result: its polygon, else its bounding box.
pub fn parse_response(text: &str) -> Result<MultiPolygon<f64>> {
    let document: GeoJson = text
        .parse()
        .map_err(|e| DemError::malformed(SOURCE, format!("invalid GeoJSON: {e}")))?;
    let features = match document {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(DemError::malformed(SOURCE, "expected features, got a bare geometry"))
        }
    };
    if features.is_empty() {
        return Err(DemError::empty(SOURCE, "no matching place"));
    }

    for feature in &features {
        let polygons = feature_polygons(feature)?;
        if !polygons.is_empty() {
            return Ok(MultiPolygon(polygons));
        }
    }

    let bbox = features
        .iter()
        .find_map(|f| f.bbox.as_ref().filter(|b| b.len() >= 4))
        .ok_or_else(|| DemError::empty(SOURCE, "result has neither polygon nor bounding box"))?;
    tracing::warn!("Geocoder returned no polygon, using the bounding box");
    Ok(MultiPolygon(vec![bbox_polygon(bbox[0], bbox[1], bbox[2], bbox[3])]))
}

fn bbox_polygon(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
    Rect::new((min_x, min_y), (max_x, max_y)).to_polygon()
}
