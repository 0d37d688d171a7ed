//! Elevation tile mirrors.
//!
//! A [`Mirror`] is a URL template plus the transport format of what it serves.
//! Templates use these placeholders:
//!
//! - `{filename}`: the tile code, e.g. `S35W072`
//! - `{lat_prefix}`, `{lat}`: `S`, `35`
//! - `{lon_prefix}`, `{lon}`: `W`, `072`
//! - `{continent}`: SRTM continent directory, e.g. `South_America`
//!
//! # Example
//!
//! ```
//! use regiondem::fetch::{Compression, Mirror};
//! use regiondem::TileId;
//!
//! let mirror = Mirror::new("https://example.com/{lat_prefix}{lat}/{filename}.hgt.gz");
//! assert_eq!(mirror.compression(), Compression::Gzip);
//! assert_eq!(
//!     mirror.url_for(TileId::new(-35, -72)).unwrap(),
//!     "https://example.com/S35/S35W072.hgt.gz"
//! );
//! ```

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::error::{DemError, Result};
use crate::tile_id::{continent_for, TileId};

/// Compression format of a mirror's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression - raw .hgt file
    #[default]
    None,
    /// Gzip compression (.hgt.gz)
    Gzip,
    /// ZIP archive (.hgt.zip)
    Zip,
}

impl Compression {
    /// Detect compression format from a URL or filename.
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_lowercase();
        if lower.ends_with(".gz") {
            Compression::Gzip
        } else if lower.ends_with(".zip") {
            Compression::Zip
        } else {
            Compression::None
        }
    }
}

/// One network location serving `.hgt` tiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    url_template: String,
    compression: Compression,
}

impl Mirror {
    /// Create a mirror; compression is detected from the template's extension.
    pub fn new(url_template: impl Into<String>) -> Self {
        let url_template = url_template.into();
        let compression = Compression::from_url(&url_template);
        Self {
            url_template,
            compression,
        }
    }

    pub fn url_template(&self) -> &str {
        &self.url_template
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Host part of the template, used in logs and error messages.
    pub fn name(&self) -> &str {
        let rest = self
            .url_template
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url_template);
        rest.split('/').next().unwrap_or(rest)
    }

    /// Expand the template for one tile.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::Config`] for an empty template and
    /// [`DemError::SourceUnreachable`] when `{continent}` is used for a tile
    /// outside every continent directory.
    pub fn url_for(&self, id: TileId) -> Result<String> {
        if self.url_template.is_empty() {
            return Err(DemError::Config(
                "No download URL template configured".to_string(),
            ));
        }

        let continent = if self.url_template.contains("{continent}") {
            continent_for(id.lat() as f64 + 0.5, id.lon() as f64 + 0.5).ok_or_else(|| {
                DemError::unreachable(
                    self.name(),
                    format!("{} does not map to a known continent", id),
                )
            })?
        } else {
            ""
        };

        Ok(self
            .url_template
            .replace("{filename}", &id.to_string())
            .replace("{lat_prefix}", &id.lat_prefix().to_string())
            .replace("{lat}", &id.lat_digits())
            .replace("{lon_prefix}", &id.lon_prefix().to_string())
            .replace("{lon}", &id.lon_digits())
            .replace("{continent}", continent))
    }

    /// Turn a downloaded payload into raw `.hgt` bytes.
    pub fn decompress(&self, bytes: &[u8], id: TileId) -> Result<Vec<u8>> {
        match self.compression {
            Compression::None => Ok(bytes.to_vec()),
            Compression::Gzip => {
                let mut decoder = GzDecoder::new(bytes);
                let mut data = Vec::new();
                decoder.read_to_end(&mut data).map_err(|e| {
                    DemError::malformed(
                        self.name(),
                        format!("Failed to decompress gzip for {}: {}", id, e),
                    )
                })?;
                Ok(data)
            }
            Compression::Zip => extract_hgt_from_zip(bytes, self.name(), id),
        }
    }
}

/// Extract the first `.hgt` entry (case-insensitive) of a ZIP archive.
fn extract_hgt_from_zip(data: &[u8], source_name: &str, id: TileId) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(data)).map_err(|e| {
        DemError::malformed(source_name, format!("Failed to read ZIP for {}: {}", id, e))
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| {
            DemError::malformed(source_name, format!("Failed to read ZIP entry: {}", e))
        })?;

        if entry.name().to_lowercase().ends_with(".hgt") {
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).map_err(|e| {
                DemError::malformed(
                    source_name,
                    format!("Failed to extract .hgt from ZIP: {}", e),
                )
            })?;
            return Ok(contents);
        }
    }

    Err(DemError::malformed(
        source_name,
        format!("No .hgt file found in ZIP archive for {}", id),
    ))
}

/// The public SRTM3 mirrors, in the order they are tried.
pub fn default_mirrors() -> Vec<Mirror> {
    vec![
        Mirror::new("https://srtm.kurviger.de/SRTM3/{filename}.hgt.gz"),
        Mirror::new("https://dds.cr.usgs.gov/srtm/version2_1/SRTM3/{continent}/{filename}.hgt.zip"),
        Mirror::new("https://srtm.kurviger.de/SRTM3/{filename}.hgt"),
        Mirror::new("https://srtmtiles.s3.amazonaws.com/{filename}.hgt.gz"),
        skadi(),
    ]
}

/// Mapzen Skadi tiles on AWS, laid out as `{lat_prefix}{lat}/{filename}.hgt.gz`.
pub fn skadi() -> Mirror {
    Mirror::new(
        "https://s3.amazonaws.com/elevation-tiles-prod/skadi/{lat_prefix}{lat}/{filename}.hgt.gz",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    #[test]
    fn test_compression_from_url() {
        assert_eq!(Compression::from_url("file.hgt.gz"), Compression::Gzip);
        assert_eq!(Compression::from_url("FILE.HGT.ZIP"), Compression::Zip);
        assert_eq!(Compression::from_url("file.hgt"), Compression::None);
    }

    #[test]
    fn test_url_expansion() {
        let id = TileId::new(-35, -72);
        let mirrors = default_mirrors();
        assert_eq!(
            mirrors[0].url_for(id).unwrap(),
            "https://srtm.kurviger.de/SRTM3/S35W072.hgt.gz"
        );
        assert_eq!(
            mirrors[1].url_for(id).unwrap(),
            "https://dds.cr.usgs.gov/srtm/version2_1/SRTM3/South_America/S35W072.hgt.zip"
        );
        assert_eq!(mirrors[2].compression(), Compression::None);
        assert_eq!(
            skadi().url_for(TileId::new(-34, -71)).unwrap(),
            "https://s3.amazonaws.com/elevation-tiles-prod/skadi/S34/S34W071.hgt.gz"
        );
    }

    #[test]
    fn test_continent_missing() {
        let mirror = Mirror::new("https://example.com/{continent}/{filename}.hgt.zip");
        let err = mirror.url_for(TileId::new(-70, 0)).unwrap_err();
        assert!(matches!(err, DemError::SourceUnreachable { .. }));
    }

    #[test]
    fn test_empty_template() {
        assert!(matches!(
            Mirror::new("").url_for(TileId::new(0, 0)),
            Err(DemError::Config(_))
        ));
    }

    #[test]
    fn test_name() {
        assert_eq!(default_mirrors()[0].name(), "srtm.kurviger.de");
        assert_eq!(Mirror::new("local/{filename}.hgt").name(), "local");
    }

    #[test]
    fn test_decompress_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&[1, 2, 3, 4]).unwrap();
        let gz = encoder.finish().unwrap();

        let mirror = Mirror::new("https://x/{filename}.hgt.gz");
        assert_eq!(mirror.decompress(&gz, TileId::new(0, 0)).unwrap(), vec![1, 2, 3, 4]);

        let err = mirror.decompress(b"not gzip", TileId::new(0, 0)).unwrap_err();
        assert!(matches!(err, DemError::MalformedPayload { .. }));
    }

    #[test]
    fn test_decompress_zip_picks_hgt_entry() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            let options = SimpleFileOptions::default();
            zip.start_file("README.txt", options).unwrap();
            zip.write_all(b"readme").unwrap();
            zip.start_file("S35W072.HGT", options).unwrap();
            zip.write_all(&[9, 9]).unwrap();
            zip.finish().unwrap();
        }

        let mirror = Mirror::new("https://x/{filename}.hgt.zip");
        let raw = mirror
            .decompress(buffer.get_ref(), TileId::new(-35, -72))
            .unwrap();
        assert_eq!(raw, vec![9, 9]);
    }

    #[test]
    fn test_decompress_zip_without_hgt() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            zip.start_file("other.txt", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"nothing").unwrap();
            zip.finish().unwrap();
        }

        let mirror = Mirror::new("https://x/{filename}.hgt.zip");
        let err = mirror
            .decompress(buffer.get_ref(), TileId::new(0, 0))
            .unwrap_err();
        assert!(err.to_string().contains("No .hgt file"));
    }
}
