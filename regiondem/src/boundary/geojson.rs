//! GeoJSON reading and writing for boundaries.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value as GeoJsonValue};
use serde_json::json;

use crate::boundary::BoundaryGeometry;
use crate::crs::{epsg_from_name, WGS84};
use crate::error::{DemError, Result};

/// Polygons pulled out of a GeoJSON document.
#[derive(Debug, Clone)]
pub struct ParsedPolygons {
    /// Every polygonal geometry found, merged.
    pub shape: MultiPolygon<f64>,
    /// CRS from the legacy `crs` member, WGS84 when absent.
    pub epsg: u32,
    /// Number of features that contributed at least one polygon.
    pub features: usize,
}

/// Parse `text` as a FeatureCollection, Feature or bare Geometry.
///
/// Non-polygonal geometries are skipped.
///
/// # Errors
///
/// - [`DemError::MalformedPayload`] when `text` is not GeoJSON or names an unknown CRS
/// - [`DemError::EmptyResult`] when no polygon is present
pub fn parse_polygons(source_name: &str, text: &str) -> Result<ParsedPolygons> {
    let document: GeoJson = text
        .parse()
        .map_err(|e| DemError::malformed(source_name, format!("invalid GeoJSON: {e}")))?;

    let mut polygons = Vec::new();
    let mut features = 0;
    let members = match &document {
        GeoJson::FeatureCollection(collection) => {
            for feature in &collection.features {
                if collect_feature(feature, &mut polygons)? {
                    features += 1;
                }
            }
            collection.foreign_members.as_ref()
        }
        GeoJson::Feature(feature) => {
            if collect_feature(feature, &mut polygons)? {
                features += 1;
            }
            feature.foreign_members.as_ref()
        }
        GeoJson::Geometry(geometry) => {
            let before = polygons.len();
            collect_geometry(geometry, &mut polygons)?;
            if polygons.len() > before {
                features += 1;
            }
            geometry.foreign_members.as_ref()
        }
    };

    if polygons.is_empty() {
        return Err(DemError::empty(source_name, "no polygon features"));
    }

    let epsg = match members.and_then(crs_name) {
        Some(name) => epsg_from_name(&name).ok_or_else(|| {
            DemError::malformed(source_name, format!("unsupported CRS {name:?}"))
        })?,
        None => WGS84,
    };

    Ok(ParsedPolygons {
        shape: MultiPolygon(polygons),
        epsg,
        features,
    })
}

fn crs_name(members: &JsonObject) -> Option<String> {
    members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// Polygons of a single feature, empty when it has none.
pub(crate) fn feature_polygons(feature: &Feature) -> Result<Vec<Polygon<f64>>> {
    let mut out = Vec::new();
    collect_feature(feature, &mut out)?;
    Ok(out)
}

fn collect_feature(feature: &Feature, out: &mut Vec<Polygon<f64>>) -> Result<bool> {
    let Some(geometry) = &feature.geometry else {
        return Ok(false);
    };
    let before = out.len();
    collect_geometry(geometry, out)?;
    Ok(out.len() > before)
}

fn collect_geometry(geometry: &Geometry, out: &mut Vec<Polygon<f64>>) -> Result<()> {
    match &geometry.value {
        GeoJsonValue::Polygon(rings) => out.push(to_polygon(rings)?),
        GeoJsonValue::MultiPolygon(polygons) => {
            for rings in polygons {
                out.push(to_polygon(rings)?);
            }
        }
        GeoJsonValue::GeometryCollection(geometries) => {
            for inner in geometries {
                collect_geometry(inner, out)?;
            }
        }
        GeoJsonValue::Point(_)
        | GeoJsonValue::MultiPoint(_)
        | GeoJsonValue::LineString(_)
        | GeoJsonValue::MultiLineString(_) => {}
    }
    Ok(())
}

fn to_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| to_line_string(ring));
    let exterior = match rings.next() {
        Some(ring) => ring?,
        None => return Err(DemError::Geometry("polygon without rings".to_string())),
    };
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn to_line_string(positions: &[Vec<f64>]) -> Result<LineString<f64>> {
    positions
        .iter()
        .map(|p| {
            if p.len() < 2 {
                return Err(DemError::Geometry(format!(
                    "position needs at least 2 elements, got {}",
                    p.len()
                )));
            }
            Ok(Coord { x: p[0], y: p[1] })
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString)
}

fn ring_positions(ring: &LineString<f64>) -> Vec<Vec<f64>> {
    ring.0.iter().map(|c| vec![c.x, c.y]).collect()
}

/// Serialize `boundary` as a one-feature FeatureCollection.
pub fn to_feature_collection(boundary: &BoundaryGeometry) -> String {
    let polygons = boundary
        .shape()
        .0
        .iter()
        .map(|polygon| {
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(ring_positions)
                .collect()
        })
        .collect();

    let mut properties = JsonObject::new();
    properties.insert("name".to_string(), json!(boundary.name()));
    properties.insert("source".to_string(), json!(boundary.source()));

    let feature = Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoJsonValue::MultiPolygon(polygons))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    };
    let collection = FeatureCollection {
        bbox: None,
        features: vec![feature],
        foreign_members: None,
    };
    GeoJson::FeatureCollection(collection).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::tests::square;
    use crate::boundary::BoundarySource;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"comuna": "NUNOA"},
             "geometry": {"type": "Polygon", "coordinates":
                [[[-70.62, -33.47], [-70.57, -33.47], [-70.57, -33.44], [-70.62, -33.44], [-70.62, -33.47]]]}},
            {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [0, 0]}},
            {"type": "Feature", "properties": {}, "geometry": null}
        ]
    }"#;

    #[test]
    fn test_collection_polygons_only() {
        let parsed = parse_polygons("test", COLLECTION).unwrap();
        assert_eq!(parsed.shape.0.len(), 1);
        assert_eq!(parsed.features, 1);
        assert_eq!(parsed.epsg, 4326);
    }

    #[test]
    fn test_legacy_crs_member() {
        let text = r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32719"}},
            "features": [{"type": "Feature", "properties": {}, "geometry":
                {"type": "MultiPolygon", "coordinates": [[[[0,0],[10,0],[10,10],[0,0]]], [[[20,20],[30,20],[30,30],[20,20]]]]}}]
        }"#;
        let parsed = parse_polygons("test", text).unwrap();
        assert_eq!(parsed.epsg, 32719);
        assert_eq!(parsed.shape.0.len(), 2);
    }

    #[test]
    fn test_bare_geometry_and_collection() {
        let text = r#"{"type": "GeometryCollection", "geometries": [
            {"type": "LineString", "coordinates": [[0,0],[1,1]]},
            {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]], [[0.1,0.05],[0.2,0.05],[0.2,0.1],[0.1,0.05]]]}
        ]}"#;
        let parsed = parse_polygons("test", text).unwrap();
        assert_eq!(parsed.shape.0[0].interiors().len(), 1);
    }

    #[test]
    fn test_empty_collection() {
        let err = parse_polygons("wfs", r#"{"type": "FeatureCollection", "features": []}"#)
            .unwrap_err();
        assert!(matches!(err, DemError::EmptyResult { .. }));
    }

    #[test]
    fn test_not_geojson() {
        let err = parse_polygons("wfs", "<ServiceException/>").unwrap_err();
        assert!(matches!(err, DemError::MalformedPayload { .. }));
    }

    #[test]
    fn test_written_collection_parses_back() {
        let boundary = BoundaryGeometry::new(
            MultiPolygon(vec![square(-70.6, -33.5, 0.1)]),
            4326,
            BoundarySource::Geocoder,
            "NUNOA",
        )
        .unwrap();
        let text = to_feature_collection(&boundary);
        assert!(text.contains("\"source\":\"geocoder\""));

        let parsed = parse_polygons("file", &text).unwrap();
        assert_eq!(&parsed.shape, boundary.shape());
    }
}
