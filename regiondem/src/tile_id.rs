//! Elevation tile identifiers.
//!
//! Tiles are named after the **southwest corner** of the 1° × 1° cell they cover:
//! `{N|S}{lat}{E|W}{lon}`, with a two-digit latitude and a three-digit longitude
//! (e.g. `N35E138`, `S35W072`). The same code names the `.hgt` file on every mirror.

use std::fmt;
use std::str::FromStr;

use crate::error::DemError;

/// Identifier of a 1° × 1° elevation tile, keyed by its southwest corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    lat: i32,
    lon: i32,
}

impl TileId {
    /// Create an identifier from integer southwest-corner degrees.
    pub fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// The tile containing the given coordinate.
    ///
    /// ```
    /// use regiondem::TileId;
    ///
    /// assert_eq!(TileId::from_lat_lon(35.5, 138.7).to_string(), "N35E138");
    /// assert_eq!(TileId::from_lat_lon(-34.5, -71.5).to_string(), "S35W072");
    /// assert_eq!(TileId::from_lat_lon(0.5, -0.5).to_string(), "N00W001");
    /// ```
    pub fn from_lat_lon(lat: f64, lon: f64) -> Self {
        Self::new(lat.floor() as i32, lon.floor() as i32)
    }

    /// Southwest-corner latitude.
    pub fn lat(&self) -> i32 {
        self.lat
    }

    /// Southwest-corner longitude.
    pub fn lon(&self) -> i32 {
        self.lon
    }

    /// `N` or `S`.
    pub fn lat_prefix(&self) -> char {
        if self.lat >= 0 {
            'N'
        } else {
            'S'
        }
    }

    /// `E` or `W`.
    pub fn lon_prefix(&self) -> char {
        if self.lon >= 0 {
            'E'
        } else {
            'W'
        }
    }

    /// Zero-padded latitude magnitude, e.g. `"35"`.
    pub fn lat_digits(&self) -> String {
        format!("{:02}", self.lat.abs())
    }

    /// Zero-padded longitude magnitude, e.g. `"072"`.
    pub fn lon_digits(&self) -> String {
        format!("{:03}", self.lon.abs())
    }

    /// File name of the raw tile, e.g. `S35W072.hgt`.
    pub fn hgt_filename(&self) -> String {
        format!("{}.hgt", self)
    }

    /// Parse a tile code from a file name.
    ///
    /// Accepts an optional directory prefix and `.hgt` extension and is
    /// case-insensitive.
    ///
    /// ```
    /// use regiondem::TileId;
    ///
    /// let id = TileId::parse("/data/tiles/s12w077.hgt").unwrap();
    /// assert_eq!((id.lat(), id.lon()), (-12, -77));
    /// assert!(TileId::parse("invalid").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self, DemError> {
        let base = name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(name);
        let lower = base.to_ascii_lowercase();
        let code = match lower.strip_suffix(".hgt") {
            Some(stripped) => &base[..stripped.len()],
            None => base,
        };

        if code.len() != 7 || !code.is_ascii() {
            return Err(DemError::InvalidTileId(name.to_string()));
        }

        let bytes = code.as_bytes();
        let lat_sign = match bytes[0].to_ascii_uppercase() {
            b'N' => 1,
            b'S' => -1,
            _ => return Err(DemError::InvalidTileId(name.to_string())),
        };
        let lon_sign = match bytes[3].to_ascii_uppercase() {
            b'E' => 1,
            b'W' => -1,
            _ => return Err(DemError::InvalidTileId(name.to_string())),
        };

        let lat: i32 = code[1..3]
            .parse()
            .map_err(|_| DemError::InvalidTileId(name.to_string()))?;
        let lon: i32 = code[4..7]
            .parse()
            .map_err(|_| DemError::InvalidTileId(name.to_string()))?;

        if lat > 90 || lon > 180 {
            return Err(DemError::InvalidTileId(name.to_string()));
        }

        Ok(Self::new(lat * lat_sign, lon * lon_sign))
    }

    /// Geographic extent `(min_lon, min_lat, max_lon, max_lat)` of the cell.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (
            self.lon as f64,
            self.lat as f64,
            (self.lon + 1) as f64,
            (self.lat + 1) as f64,
        )
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:02}{}{:03}",
            self.lat_prefix(),
            self.lat.abs(),
            self.lon_prefix(),
            self.lon.abs()
        )
    }
}

impl FromStr for TileId {
    type Err = DemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Map coordinates to the continent subdirectory used by SRTM mirrors.
///
/// Returns `None` for islands, Antarctica and open ocean.
///
/// Regions overlap; they are tested in a fixed priority order:
/// - North_America: 15°N to 60°N, 170°W to 50°W
/// - South_America: 60°S to 15°N, 90°W to 30°W
/// - Australia: 50°S to 10°S, 110°E to 180°E
/// - Africa: 35°S to 35°N, 20°W to 55°E
/// - Eurasia: 0°N to 60°N, 15°W to 180°E
pub fn continent_for(lat: f64, lon: f64) -> Option<&'static str> {
    if (15.0..=60.0).contains(&lat) && (-170.0..=-50.0).contains(&lon) {
        return Some("North_America");
    }
    if (-60.0..=15.0).contains(&lat) && (-90.0..=-30.0).contains(&lon) {
        return Some("South_America");
    }
    if (-50.0..=-10.0).contains(&lat) && (110.0..=180.0).contains(&lon) {
        return Some("Australia");
    }
    if (-35.0..=35.0).contains(&lat) && (-20.0..=55.0).contains(&lon) {
        return Some("Africa");
    }
    if (0.0..=60.0).contains(&lat) && (-15.0..=180.0).contains(&lon) {
        return Some("Eurasia");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_hemispheres() {
        assert_eq!(TileId::from_lat_lon(35.5, 138.7).to_string(), "N35E138");
        assert_eq!(TileId::from_lat_lon(-12.3, -77.1).to_string(), "S13W078");
        assert_eq!(TileId::from_lat_lon(-34.5, -71.5).to_string(), "S35W072");
        assert_eq!(TileId::from_lat_lon(-33.9, 151.2).to_string(), "S34E151");
        assert_eq!(TileId::from_lat_lon(19.4, -99.1).to_string(), "N19W100");
    }

    #[test]
    fn test_encode_whole_degree_boundaries() {
        assert_eq!(TileId::from_lat_lon(35.0, 138.0).to_string(), "N35E138");
        assert_eq!(TileId::from_lat_lon(-35.0, -138.0).to_string(), "S35W138");
        assert_eq!(TileId::from_lat_lon(0.0, 0.0).to_string(), "N00E000");
        // floor(-0.1) = -1
        assert_eq!(TileId::from_lat_lon(-0.1, -0.1).to_string(), "S01W001");
    }

    #[test]
    fn test_code_is_seven_characters() {
        for (lat, lon) in [(0.5, 0.5), (-59.9, -179.9), (59.9, 179.9), (-1.0, 10.0)] {
            assert_eq!(TileId::from_lat_lon(lat, lon).to_string().len(), 7);
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(TileId::parse("N35E138.hgt").unwrap(), TileId::new(35, 138));
        assert_eq!(TileId::parse("S12W077").unwrap(), TileId::new(-12, -77));
        assert_eq!(TileId::parse("n35e138.HGT").unwrap(), TileId::new(35, 138));
        assert_eq!(
            TileId::parse("C:\\data\\S12W077.hgt").unwrap(),
            TileId::new(-12, -77)
        );
        assert_eq!("S35W072".parse::<TileId>().unwrap(), TileId::new(-35, -72));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(TileId::parse("invalid").is_err());
        assert!(TileId::parse("N35E13.hgt").is_err());
        assert!(TileId::parse("X35E138.hgt").is_err());
        assert!(TileId::parse("N35X138.hgt").is_err());
        assert!(TileId::parse("NAAE138.hgt").is_err());
        assert!(TileId::parse("N95E000").is_err());
    }

    #[test]
    fn test_roundtrip_reproduces_floored_degrees() {
        let coords = [
            (35.5, 138.7),
            (-12.3, -77.1),
            (0.5, -0.5),
            (-0.5, 0.5),
            (59.9, 179.9),
            (-59.9, -179.9),
            (-34.5, -71.5),
        ];

        for (lat, lon) in coords {
            let code = TileId::from_lat_lon(lat, lon).to_string();
            let parsed = TileId::parse(&code).unwrap();
            assert_eq!(parsed.lat(), lat.floor() as i32);
            assert_eq!(parsed.lon(), lon.floor() as i32);
        }
    }

    #[test]
    fn test_components() {
        let id = TileId::new(-35, -72);
        assert_eq!(id.lat_prefix(), 'S');
        assert_eq!(id.lat_digits(), "35");
        assert_eq!(id.lon_prefix(), 'W');
        assert_eq!(id.lon_digits(), "072");
        assert_eq!(id.hgt_filename(), "S35W072.hgt");
        assert_eq!(id.bounds(), (-72.0, -35.0, -71.0, -34.0));
    }

    #[test]
    fn test_continent_for() {
        assert_eq!(continent_for(40.0, -100.0), Some("North_America"));
        assert_eq!(continent_for(-35.0, -72.0), Some("South_America"));
        assert_eq!(continent_for(-34.0, 151.0), Some("Australia"));
        assert_eq!(continent_for(-34.0, 18.0), Some("Africa"));
        assert_eq!(continent_for(35.0, 138.0), Some("Eurasia"));
        assert_eq!(continent_for(-70.0, 0.0), None);
        assert_eq!(continent_for(0.0, -150.0), None);
    }
}
