//! Coordinate reference systems.
//!
//! Projection is pure Rust: PROJ strings come from the `crs-definitions`
//! EPSG database and are evaluated with `proj4rs`. proj4rs works in radians
//! for geographic systems, so degree conversion happens at the edges.

use std::sync::OnceLock;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use proj4rs::proj::Proj;
use regex::Regex;

use crate::error::{DemError, Result};

/// EPSG code of WGS84 longitude/latitude.
pub const WGS84: u32 = 4326;

/// PROJ string for an EPSG code, if the code is known.
pub fn proj_string(epsg: u32) -> Option<&'static str> {
    u16::try_from(epsg)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

/// Whether an EPSG code is a longitude/latitude system.
pub fn is_geographic(epsg: u32) -> bool {
    match proj_string(epsg) {
        Some(proj) => proj.contains("+proj=longlat"),
        None => epsg == WGS84,
    }
}

/// WGS84 UTM zone EPSG code for a coordinate (326NN north, 327NN south).
///
/// ```
/// use regiondem::crs::utm_epsg_for;
///
/// assert_eq!(utm_epsg_for(-34.5, -71.5), 32719);
/// assert_eq!(utm_epsg_for(52.0, 15.0), 32633);
/// ```
pub fn utm_epsg_for(lat: f64, lon: f64) -> u32 {
    let zone = (((lon + 180.0) / 6.0).floor() as i64 + 1).clamp(1, 60) as u32;
    if lat >= 0.0 {
        32600 + zone
    } else {
        32700 + zone
    }
}

/// EPSG code named by a GeoJSON `crs` member or a WFS `srsName`.
///
/// Understands `EPSG:32719`, `urn:ogc:def:crs:EPSG::32719` and the CRS84 URN.
pub fn epsg_from_name(name: &str) -> Option<u32> {
    let trimmed = name.trim();
    if trimmed.to_ascii_uppercase().ends_with("CRS84") {
        return Some(WGS84);
    }
    let digits: String = trimmed
        .rsplit(|c| c == ':' || c == '/')
        .next()?
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    if !trimmed.to_ascii_uppercase().contains("EPSG") || digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// EPSG code described by the WKT of a shapefile `.prj` sidecar.
///
/// Only the cases the official layers use are recognised: a bare geographic
/// system maps to WGS84 and any `UTM zone NN[N|S]` projection maps to the
/// matching WGS84 UTM code. Anything else returns `None`.
pub fn epsg_from_wkt(wkt: &str) -> Option<u32> {
    static UTM: OnceLock<Option<Regex>> = OnceLock::new();
    let utm = UTM.get_or_init(|| Regex::new(r"(?i)UTM[ _]zone[ _](\d{1,2})\s*([NS])").ok());

    let upper = wkt.trim_start().to_ascii_uppercase();
    if upper.starts_with("PROJCS") {
        let caps = utm.as_ref()?.captures(wkt)?;
        let zone: u32 = caps.get(1)?.as_str().parse().ok()?;
        if !(1..=60).contains(&zone) {
            return None;
        }
        return match caps.get(2)?.as_str().to_ascii_uppercase().as_str() {
            "N" => Some(32600 + zone),
            _ => Some(32700 + zone),
        };
    }
    if upper.starts_with("GEOGCS") {
        return Some(WGS84);
    }
    None
}

/// A reusable transform between two EPSG codes.
///
/// Both projections are parsed once; [`Projector::transform`] is cheap enough
/// to call per pixel.
pub struct Projector {
    source_epsg: u32,
    target_epsg: u32,
    pair: Option<(Proj, Proj)>,
    source_is_geographic: bool,
    target_is_geographic: bool,
}

impl Projector {
    /// Build a transform from `source_epsg` to `target_epsg`.
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self> {
        if source_epsg == target_epsg {
            return Ok(Self {
                source_epsg,
                target_epsg,
                pair: None,
                source_is_geographic: false,
                target_is_geographic: false,
            });
        }

        let source = Self::load(source_epsg)?;
        let target = Self::load(target_epsg)?;
        Ok(Self {
            source_epsg,
            target_epsg,
            pair: Some((source, target)),
            source_is_geographic: is_geographic(source_epsg),
            target_is_geographic: is_geographic(target_epsg),
        })
    }

    fn load(epsg: u32) -> Result<Proj> {
        let definition = proj_string(epsg)
            .ok_or_else(|| DemError::Projection(format!("EPSG:{epsg} is not a known code")))?;
        Proj::from_proj_string(definition)
            .map_err(|e| DemError::Projection(format!("Invalid projection EPSG:{epsg}: {e:?}")))
    }

    /// Source EPSG code.
    pub fn source_epsg(&self) -> u32 {
        self.source_epsg
    }

    /// Target EPSG code.
    pub fn target_epsg(&self) -> u32 {
        self.target_epsg
    }

    /// True when source and target are the same system.
    pub fn is_identity(&self) -> bool {
        self.pair.is_none()
    }

    /// Transform one `(x, y)` pair.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let Some((source, target)) = &self.pair else {
            return Ok((x, y));
        };

        let mut point = if self.source_is_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        proj4rs::transform::transform(source, target, &mut point).map_err(|e| {
            DemError::Projection(format!(
                "EPSG:{} -> EPSG:{} failed at ({x}, {y}): {e:?}",
                self.source_epsg, self.target_epsg
            ))
        })?;

        let out = if self.target_is_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        if !out.0.is_finite() || !out.1.is_finite() {
            return Err(DemError::Projection(format!(
                "EPSG:{} -> EPSG:{} produced a non-finite coordinate for ({x}, {y})",
                self.source_epsg, self.target_epsg
            )));
        }
        Ok(out)
    }

    /// Transform every vertex of a multipolygon.
    pub fn transform_multipolygon(&self, shape: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        if self.is_identity() {
            return Ok(shape.clone());
        }
        let polygons = shape
            .0
            .iter()
            .map(|polygon| {
                let exterior = self.transform_ring(polygon.exterior())?;
                let interiors = polygon
                    .interiors()
                    .iter()
                    .map(|ring| self.transform_ring(ring))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Polygon::new(exterior, interiors))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MultiPolygon(polygons))
    }

    fn transform_ring(&self, ring: &LineString<f64>) -> Result<LineString<f64>> {
        ring.0
            .iter()
            .map(|c| self.transform(c.x, c.y).map(|(x, y)| Coord { x, y }))
            .collect::<Result<Vec<_>>>()
            .map(LineString)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::polygon;

    #[test]
    fn test_known_codes() {
        assert!(proj_string(4326).is_some());
        assert!(proj_string(32719).is_some());
        assert!(is_geographic(4326));
        assert!(!is_geographic(32719));
        assert!(!is_geographic(3857));
    }

    #[test]
    fn test_utm_zone_selection() {
        assert_eq!(utm_epsg_for(-34.5, -71.5), 32719);
        assert_eq!(utm_epsg_for(-33.4, -70.6), 32719);
        assert_eq!(utm_epsg_for(35.6, 139.7), 32654);
        assert_eq!(utm_epsg_for(0.0, -180.0), 32601);
        assert_eq!(utm_epsg_for(-1.0, 180.0), 32760);
    }

    #[test]
    fn test_epsg_from_name() {
        assert_eq!(epsg_from_name("EPSG:32719"), Some(32719));
        assert_eq!(epsg_from_name("urn:ogc:def:crs:EPSG::4326"), Some(4326));
        assert_eq!(epsg_from_name("urn:ogc:def:crs:OGC:1.3:CRS84"), Some(4326));
        assert_eq!(epsg_from_name("http://www.opengis.net/def/crs/EPSG/0/3857"), Some(3857));
        assert_eq!(epsg_from_name("garbage"), None);
    }

    #[test]
    fn test_epsg_from_wkt() {
        let geographic = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
        assert_eq!(epsg_from_wkt(geographic), Some(4326));

        let utm = r#"PROJCS["WGS_1984_UTM_Zone_19S",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]]],PROJECTION["Transverse_Mercator"]]"#;
        assert_eq!(epsg_from_wkt(utm), Some(32719));

        let north = r#"PROJCS["WGS 84 / UTM zone 33N",GEOGCS["WGS 84"]]"#;
        assert_eq!(epsg_from_wkt(north), Some(32633));

        let lambert = r#"PROJCS["Lambert_Conformal_Conic",GEOGCS["GCS_WGS_1984"]]"#;
        assert_eq!(epsg_from_wkt(lambert), None);
    }

    #[test]
    fn test_identity_projector() {
        let p = Projector::new(4326, 4326).unwrap();
        assert!(p.is_identity());
        assert_eq!(p.transform(-71.5, -34.5).unwrap(), (-71.5, -34.5));
    }

    #[test]
    fn test_utm_roundtrip() {
        let forward = Projector::new(4326, 32719).unwrap();
        let back = Projector::new(32719, 4326).unwrap();

        let (x, y) = forward.transform(-69.0, -34.5).unwrap();
        // -69 is the central meridian of zone 19
        assert_abs_diff_eq!(x, 500_000.0, epsilon = 1.0);
        assert!(y > 6_000_000.0 && y < 6_300_000.0, "northing {y}");

        let (lon, lat) = back.transform(x, y).unwrap();
        assert_abs_diff_eq!(lon, -69.0, epsilon = 1e-6);
        assert_abs_diff_eq!(lat, -34.5, epsilon = 1e-6);
    }

    #[test]
    fn test_unknown_code() {
        assert!(matches!(
            Projector::new(4326, 1),
            Err(DemError::Projection(_))
        ));
    }

    #[test]
    fn test_transform_multipolygon_keeps_structure() {
        let shape = MultiPolygon(vec![polygon![
            exterior: [
                (x: -71.9, y: -34.9),
                (x: -71.1, y: -34.9),
                (x: -71.1, y: -34.1),
                (x: -71.9, y: -34.1),
                (x: -71.9, y: -34.9),
            ],
            interiors: [[
                (x: -71.6, y: -34.6),
                (x: -71.4, y: -34.6),
                (x: -71.4, y: -34.4),
                (x: -71.6, y: -34.6),
            ]],
        ]]);

        let projected = Projector::new(4326, 32719)
            .unwrap()
            .transform_multipolygon(&shape)
            .unwrap();
        assert_eq!(projected.0.len(), 1);
        assert_eq!(projected.0[0].exterior().0.len(), 5);
        assert_eq!(projected.0[0].interiors().len(), 1);
        assert!(projected.0[0].exterior().0[0].x > 100_000.0);
    }
}
