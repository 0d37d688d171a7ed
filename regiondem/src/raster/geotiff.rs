//! GeoTIFF encoding and decoding.
//!
//! Output rasters are single-band, uncompressed `Float32` strips carrying
//! the GeoTIFF georeferencing tags plus `GDAL_NODATA`. The decoder accepts
//! whatever sample format the satellite catalog serves and reads the CRS
//! back from the GeoKey directory.

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

use crate::crs::{is_geographic, proj_string, WGS84};
use crate::error::{DemError, Result};
use crate::raster::{GeoTransform, RasterDataset, DEFAULT_NODATA};

// GeoTIFF tag IDs
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

// GeoKey IDs
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

// GeoKey values
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Encode a single-band raster as GeoTIFF bytes.
pub fn encode(raster: &RasterDataset) -> Result<Vec<u8>> {
    if raster.bands() != 1 {
        return Err(DemError::malformed(
            "geotiff",
            format!("only single-band output is supported, got {}", raster.bands()),
        ));
    }

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer)?;
        let mut image =
            encoder.new_image::<Gray32Float>(raster.width() as u32, raster.height() as u32)?;

        let t = raster.transform();
        let dir = image.encoder();
        dir.write_tag(
            Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE),
            &[t.pixel_width, -t.pixel_height, 0.0][..],
        )?;
        dir.write_tag(
            Tag::from_u16_exhaustive(MODEL_TIEPOINT),
            &[0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0][..],
        )?;
        dir.write_tag(
            Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY),
            &geokey_directory(raster.epsg())[..],
        )?;
        if let Some(proj) = proj_string(raster.epsg()) {
            dir.write_tag(Tag::from_u16_exhaustive(GEO_ASCII_PARAMS), format!("{proj}|").as_str())?;
        }
        dir.write_tag(
            Tag::from_u16_exhaustive(GDAL_NODATA),
            format_nodata(raster.nodata()).as_str(),
        )?;

        image.write_data(raster.band(0))?;
    }
    Ok(buffer.into_inner())
}

fn format_nodata(nodata: f32) -> String {
    if nodata.is_nan() {
        "nan".to_string()
    } else if nodata.fract() == 0.0 {
        format!("{}", nodata as i64)
    } else {
        format!("{nodata}")
    }
}

fn geokey_directory(epsg: u32) -> Vec<u16> {
    let geographic = is_geographic(epsg);
    let mut keys = vec![
        1, // KeyDirectoryVersion
        1, // KeyRevision
        0, // MinorRevision
        3, // NumberOfKeys
    ];
    keys.extend_from_slice(&[
        GT_MODEL_TYPE_GEO_KEY,
        0,
        1,
        if geographic {
            MODEL_TYPE_GEOGRAPHIC
        } else {
            MODEL_TYPE_PROJECTED
        },
    ]);
    keys.extend_from_slice(&[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
    let code = u16::try_from(epsg).unwrap_or(u16::MAX);
    if geographic {
        keys.extend_from_slice(&[GEOGRAPHIC_TYPE_GEO_KEY, 0, 1, code]);
    } else {
        keys.extend_from_slice(&[PROJECTED_CS_TYPE_GEO_KEY, 0, 1, code]);
    }
    keys
}

/// Write a raster to `path` atomically.
pub fn write<P: AsRef<Path>>(raster: &RasterDataset, path: P) -> Result<()> {
    let bytes = encode(raster)?;
    crate::output::write_atomic(path.as_ref(), &bytes)
}

/// Decode GeoTIFF bytes.
pub fn decode(bytes: &[u8]) -> Result<RasterDataset> {
    decode_from(Cursor::new(bytes))
}

/// Read a GeoTIFF file.
pub fn read<P: AsRef<Path>>(path: P) -> Result<RasterDataset> {
    let file = std::fs::File::open(path)?;
    decode_from(std::io::BufReader::new(file))
}

fn decode_from<R: Read + Seek>(reader: R) -> Result<RasterDataset> {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024; // 1 GB
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;
    let mut decoder = Decoder::new(reader)?.with_limits(limits);

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let keys: Vec<u16> = decoder
        .get_tag_u32_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))
        .map(|v| v.into_iter().map(|k| k as u16).collect())
        .unwrap_or_default();
    let epsg = geokey(&keys, PROJECTED_CS_TYPE_GEO_KEY)
        .or_else(|| geokey(&keys, GEOGRAPHIC_TYPE_GEO_KEY))
        .filter(|code| *code != 0 && *code != 32767)
        .map(u32::from)
        .unwrap_or(WGS84);
    let pixel_is_point = geokey(&keys, GT_RASTER_TYPE_GEO_KEY) == Some(RASTER_PIXEL_IS_POINT);

    let transform = read_transform(&mut decoder, pixel_is_point)?;

    let nodata = decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f32>().ok())
        .unwrap_or(DEFAULT_NODATA);

    let values = decode_samples(decoder.read_image()?);
    let pixels = width * height;
    if pixels == 0 || values.len() % pixels != 0 {
        return Err(DemError::malformed(
            "geotiff",
            format!("{} samples for a {}x{} image", values.len(), width, height),
        ));
    }
    let bands = values.len() / pixels;
    let data = if bands == 1 {
        values
    } else {
        // Chunky to band-sequential.
        let mut planar = vec![0.0f32; values.len()];
        for (i, v) in values.into_iter().enumerate() {
            let (pixel, band) = (i / bands, i % bands);
            planar[band * pixels + pixel] = v;
        }
        planar
    };

    RasterDataset::from_data(width, height, bands, data, transform, epsg, nodata)
}

fn geokey(keys: &[u16], id: u16) -> Option<u16> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;
    keys[4..]
        .chunks_exact(4)
        .take(count)
        .find(|entry| entry[0] == id && entry[1] == 0)
        .map(|entry| entry[3])
}

fn read_transform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    pixel_is_point: bool,
) -> Result<GeoTransform> {
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT));
    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE));

    match (tiepoint, scale) {
        (Ok(tie), Ok(scale)) if tie.len() >= 6 && scale.len() >= 2 => {
            let (sx, sy) = (scale[0], scale[1]);
            let mut origin_x = tie[3] - tie[0] * sx;
            let mut origin_y = tie[4] + tie[1] * sy;
            if pixel_is_point {
                origin_x -= sx / 2.0;
                origin_y += sy / 2.0;
            }
            Ok(GeoTransform::new(origin_x, origin_y, sx, -sy))
        }
        _ => Err(DemError::malformed(
            "geotiff",
            "missing ModelTiepoint/ModelPixelScale tags",
        )),
    }
}

fn decode_samples(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}
