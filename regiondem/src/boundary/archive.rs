//! Official bulk boundary archive.
//!
//! The archive is a ZIP holding several shapefile layers. The region-level
//! layer is picked by name and size, its sidecars are unpacked next to it and
//! the rows whose name matches the requested region are merged.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use dbase::encoding::LossyCodePage;
use dbase::yore::code_pages::{
    CP1250, CP1251, CP1252, CP1253, CP1254, CP1255, CP1256, CP866, CP874,
};
use dbase::FieldValue;
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon};
use shapefile::{PolygonRing, Shape};
use zip::ZipArchive;

use crate::boundary::{BoundaryGeometry, BoundarySource};
use crate::config::BoundaryConfig;
use crate::crs::{epsg_from_wkt, WGS84};
use crate::error::{DemError, Result};
use crate::normalize::{closest_match, normalize_name};
use crate::transport::{get_ok, Transport};

const SOURCE: &str = "official archive";

/// Extensions unpacked alongside the selected `.shp`.
const SIDECARS: [&str; 4] = ["shx", "dbf", "prj", "cpg"];

/// A `.shp` entry of the archive with its ranking inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerCandidate {
    /// Entry path inside the ZIP.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Whether the file name contains the region-layer marker.
    pub marked: bool,
}

/// List `.shp` entries, best candidate first.
///
/// Entries whose file name contains `marker` rank above the rest; ties go to
/// the larger file.
pub fn rank_layers<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    marker: &str,
) -> Vec<LayerCandidate> {
    let marker = marker.to_lowercase();
    let mut candidates: Vec<LayerCandidate> = (0..archive.len())
        .filter_map(|i| {
            let entry = archive.by_index(i).ok()?;
            let name = entry.name().to_string();
            let file_name = name.rsplit('/').next().unwrap_or(&name).to_lowercase();
            if !file_name.ends_with(".shp") {
                return None;
            }
            Some(LayerCandidate {
                marked: file_name.contains(&marker),
                size: entry.size(),
                name,
            })
        })
        .collect();
    candidates.sort_by(|a, b| b.marked.cmp(&a.marked).then(b.size.cmp(&a.size)));
    candidates
}

/// Download the archive and pull out `region`.
pub fn fetch<T: Transport + ?Sized>(
    transport: &T,
    config: &BoundaryConfig,
    region: &str,
) -> Result<BoundaryGeometry> {
    tracing::info!(url = %config.archive_url, "Downloading official boundary archive");
    let bytes = get_ok(transport, SOURCE, &config.archive_url, &[], config.timeout)?;
    tracing::debug!(size = bytes.len(), "Archive downloaded");
    extract_region(&bytes, config, region)
}

/// Select the region layer from archive `bytes` and build the boundary of `region`.
pub fn extract_region(
    bytes: &[u8],
    config: &BoundaryConfig,
    region: &str,
) -> Result<BoundaryGeometry> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DemError::malformed(SOURCE, format!("not a ZIP archive: {e}")))?;

    let ranked = rank_layers(&mut archive, &config.archive_marker);
    for candidate in &ranked {
        tracing::debug!(
            name = %candidate.name,
            size_kb = candidate.size / 1024,
            marked = candidate.marked,
            "Shapefile candidate"
        );
    }
    let layer = ranked
        .first()
        .ok_or_else(|| DemError::malformed(SOURCE, "archive contains no .shp layer"))?;
    tracing::info!(layer = %layer.name, "Selected boundary layer");

    let dir = tempfile::tempdir()?;
    let shp_path = unpack_layer(&mut archive, &layer.name, dir.path())?;
    let prj = std::fs::read_to_string(shp_path.with_extension("prj")).ok();

    let rows = read_rows(&shp_path)?;
    let column = name_column(&rows, &config.name_columns).ok_or_else(|| {
        DemError::malformed(
            SOURCE,
            format!("no name column matching {:?}", config.name_columns),
        )
    })?;
    tracing::debug!(column = %column, rows = rows.len(), "Name column detected");

    let target = normalize_name(region);
    let names: Vec<String> = rows
        .iter()
        .map(|row| normalize_name(row.names.get(&column).map(String::as_str).unwrap_or("")))
        .collect();

    let mut matched = matching_rows(&names, &target);
    if matched.is_empty() {
        if let Some(best) = closest_match(&target, names.iter().map(String::as_str)) {
            tracing::info!(requested = %target, matched = best, "Using closest name in archive");
            let best = best.to_string();
            matched = matching_rows(&names, &best);
        }
    }
    if matched.is_empty() {
        return Err(DemError::empty(
            SOURCE,
            format!("region {target:?} not found in {}", layer.name),
        ));
    }

    let polygons: Vec<Polygon<f64>> = matched
        .iter()
        .flat_map(|&i| rows[i].polygons.iter().cloned())
        .collect();
    let shape = MultiPolygon(polygons);
    let epsg = layer_epsg(prj.as_deref(), config.archive_epsg, &shape)?;
    let name = names[matched[0]].clone();

    BoundaryGeometry::new(shape, epsg, BoundarySource::OfficialArchive, name)
}

fn matching_rows(names: &[String], target: &str) -> Vec<usize> {
    names
        .iter()
        .enumerate()
        .filter(|(_, n)| n.as_str() == target)
        .map(|(i, _)| i)
        .collect()
}

/// Write the `.shp` entry and its sidecars into `dir` with lower-case extensions.
fn unpack_layer<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    shp_name: &str,
    dir: &Path,
) -> Result<std::path::PathBuf> {
    let stem = shp_name[..shp_name.len() - 4].to_lowercase();
    let wanted: HashMap<String, &str> = std::iter::once("shp")
        .chain(SIDECARS)
        .map(|ext| (format!("{stem}.{ext}"), ext))
        .collect();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| DemError::malformed(SOURCE, format!("bad ZIP entry: {e}")))?;
        let Some(ext) = wanted.get(&entry.name().to_lowercase()) else {
            continue;
        };
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents)?;
        std::fs::write(dir.join(format!("layer.{ext}")), contents)?;
    }

    let shp = dir.join("layer.shp");
    for required in ["shp", "shx", "dbf"] {
        if !shp.with_extension(required).exists() {
            return Err(DemError::malformed(
                SOURCE,
                format!("layer {shp_name} has no .{required} file"),
            ));
        }
    }
    Ok(shp)
}

/// One shapefile record: its polygons and its text attributes.
struct Row {
    polygons: Vec<Polygon<f64>>,
    names: HashMap<String, String>,
}

fn read_rows(shp: &Path) -> Result<Vec<Row>> {
    let unreadable = |e: String| DemError::malformed(SOURCE, format!("unreadable shapefile: {e}"));
    let shapes = shapefile::ShapeReader::from_path(shp).map_err(|e| unreadable(e.to_string()))?;
    let mut table = dbase::Reader::from_path(shp.with_extension("dbf"))
        .map_err(|e| unreadable(e.to_string()))?;

    // The .cpg sidecar wins over the code page byte of the DBF header.
    if let Ok(label) = std::fs::read_to_string(shp.with_extension("cpg")) {
        match code_page(&label) {
            Some(encoding) if set_code_page(&mut table, encoding) => {
                tracing::debug!(code_page = encoding.name(), "Decoding attributes with .cpg code page");
            }
            _ => {
                tracing::warn!(label = label.trim(), "Unsupported .cpg code page, using the DBF header");
            }
        }
    }
    let mut reader = shapefile::Reader::new(shapes, table);

    let mut rows = Vec::new();
    for item in reader.iter_shapes_and_records() {
        let (shape, record) =
            item.map_err(|e| DemError::malformed(SOURCE, format!("bad shapefile record: {e}")))?;

        let polygons = match shape {
            Shape::Polygon(p) => rings_to_polygons(p.rings(), |pt| Coord { x: pt.x, y: pt.y }),
            Shape::PolygonM(p) => rings_to_polygons(p.rings(), |pt| Coord { x: pt.x, y: pt.y }),
            Shape::PolygonZ(p) => rings_to_polygons(p.rings(), |pt| Coord { x: pt.x, y: pt.y }),
            _ => Vec::new(),
        };

        let fields: HashMap<String, FieldValue> = record.into();
        let names = fields
            .into_iter()
            .filter_map(|(key, value)| match value {
                FieldValue::Character(Some(text)) => Some((key, text)),
                _ => None,
            })
            .collect();
        rows.push(Row { polygons, names });
    }
    Ok(rows)
}

/// Resolve a `.cpg` label such as `UTF-8`, `ISO-8859-1`, `1252` or `ANSI 1251`.
fn code_page(label: &str) -> Option<&'static encoding_rs::Encoding> {
    let lower = label.trim().to_ascii_lowercase();
    let label = lower.strip_prefix("ansi").unwrap_or(lower.as_str()).trim();
    if !label.is_empty() && label.chars().all(|c| c.is_ascii_digit()) {
        let expanded = match label {
            "866" => "ibm866".to_string(),
            n if n.starts_with("8859") => format!("iso-8859-{}", &n[4..]),
            n => format!("windows-{n}"),
        };
        return encoding_rs::Encoding::for_label(expanded.as_bytes());
    }
    encoding_rs::Encoding::for_label(label.replace(' ', "").as_bytes())
}

/// Switch `table` to `encoding`; false when the DBF reader has no such code page.
fn set_code_page<D: Read + Seek>(
    table: &mut dbase::Reader<D>,
    encoding: &'static encoding_rs::Encoding,
) -> bool {
    match encoding.name() {
        "UTF-8" => table.set_encoding(dbase::UnicodeLossy),
        "windows-1252" => table.set_encoding(LossyCodePage(CP1252)),
        "windows-1250" => table.set_encoding(LossyCodePage(CP1250)),
        "windows-1251" => table.set_encoding(LossyCodePage(CP1251)),
        "windows-1253" => table.set_encoding(LossyCodePage(CP1253)),
        "windows-1254" => table.set_encoding(LossyCodePage(CP1254)),
        "windows-1255" => table.set_encoding(LossyCodePage(CP1255)),
        "windows-1256" => table.set_encoding(LossyCodePage(CP1256)),
        "windows-874" => table.set_encoding(LossyCodePage(CP874)),
        "IBM866" => table.set_encoding(LossyCodePage(CP866)),
        _ => return false,
    }
    true
}

/// Outer rings start a polygon; inner rings attach to the latest one.
fn rings_to_polygons<P>(rings: &[PolygonRing<P>], xy: impl Fn(&P) -> Coord<f64>) -> Vec<Polygon<f64>> {
    let mut out: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => {
                out.push((points.iter().map(&xy).collect(), Vec::new()));
            }
            PolygonRing::Inner(points) => {
                if let Some((_, holes)) = out.last_mut() {
                    holes.push(points.iter().map(&xy).collect());
                }
            }
        }
    }
    out.into_iter()
        .map(|(exterior, holes)| Polygon::new(exterior, holes))
        .collect()
}

/// First attribute whose lower-cased name contains a pattern, patterns in priority order.
fn name_column(rows: &[Row], patterns: &[String]) -> Option<String> {
    let mut keys: Vec<&String> = rows.iter().flat_map(|r| r.names.keys()).collect();
    keys.sort();
    keys.dedup();
    patterns.iter().find_map(|pattern| {
        let pattern = pattern.to_lowercase();
        keys.iter()
            .find(|k| k.to_lowercase().contains(&pattern))
            .map(|k| k.to_string())
    })
}

fn layer_epsg(prj: Option<&str>, configured: Option<u32>, shape: &MultiPolygon<f64>) -> Result<u32> {
    if let Some(epsg) = prj.and_then(epsg_from_wkt) {
        return Ok(epsg);
    }
    if let Some(epsg) = configured {
        return Ok(epsg);
    }
    let looks_geographic = shape.bounding_rect().is_some_and(|r| {
        r.min().x >= -180.0 && r.max().x <= 180.0 && r.min().y >= -90.0 && r.max().y <= 90.0
    });
    if looks_geographic {
        tracing::warn!("Archive layer has no usable .prj, assuming WGS84");
        return Ok(WGS84);
    }
    Err(DemError::Geometry(
        "archive layer CRS is unknown and coordinates are not geographic".to_string(),
    ))
}
