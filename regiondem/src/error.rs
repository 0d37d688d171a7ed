//! Error types for the regiondem library.

use std::fmt;

use thiserror::Error;

/// Failure classification reported to the caller of a pipeline run.
///
/// Every [`DemError`] maps onto exactly one reason via [`DemError::reason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Network error, timeout or non-success HTTP status.
    SourceUnreachable,
    /// Payload could not be decoded (wrong archive type, missing column, bad raster).
    MalformedPayload,
    /// The source answered but matched nothing.
    EmptyResult,
    /// CRS mismatch that cannot be resolved, or a degenerate/empty polygon.
    GeometricInconsistency,
    /// Every source of a stage failed.
    TotalExhaustion,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::SourceUnreachable => "source unreachable",
            FailureReason::MalformedPayload => "malformed payload",
            FailureReason::EmptyResult => "empty result",
            FailureReason::GeometricInconsistency => "geometric inconsistency",
            FailureReason::TotalExhaustion => "total exhaustion",
        };
        f.write_str(s)
    }
}

/// Pipeline stage that ran out of sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Boundary resolution (admin service, bulk archive, geocoder).
    Boundary,
    /// Elevation tiles (planned mirrors, exhaustive pass, forced retry).
    Tiles,
    /// Satellite DEM catalog fallback.
    SatelliteDem,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Boundary => "boundary",
            Stage::Tiles => "elevation tiles",
            Stage::SatelliteDem => "satellite DEM",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while resolving boundaries or acquiring elevation rasters.
#[derive(Error, Debug)]
pub enum DemError {
    /// IO error when reading or writing files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error (connection refused, timeout, TLS).
    #[error("HTTP error for {url}: {reason}")]
    Http { url: String, reason: String },

    /// The source answered with a non-success status.
    #[error("{source_name} unreachable: {reason}")]
    SourceUnreachable { source_name: String, reason: String },

    /// The source answered but the payload could not be used.
    #[error("Malformed payload from {source_name}: {reason}")]
    MalformedPayload { source_name: String, reason: String },

    /// The source answered with zero matching features, tiles or items.
    #[error("{source_name} returned no results: {reason}")]
    EmptyResult { source_name: String, reason: String },

    /// Degenerate polygon or non-overlapping geometry.
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// A coordinate transform could not be built or evaluated.
    #[error("Projection error: {0}")]
    Projection(String),

    /// Every source of a stage failed.
    #[error("All {stage} sources exhausted; last error: {last}")]
    Exhausted { stage: Stage, last: Box<DemError> },

    /// Tile code does not follow the `N00E000` convention.
    #[error("Invalid tile identifier: {0}")]
    InvalidTileId(String),

    /// GeoTIFF encoding or decoding error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DemError {
    pub(crate) fn unreachable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        DemError::SourceUnreachable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        DemError::MalformedPayload {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn empty(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        DemError::EmptyResult {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error for reporting.
    ///
    /// `Exhausted` reports [`FailureReason::TotalExhaustion`]; use
    /// [`DemError::root_reason`] for the reason of the last attempt.
    pub fn reason(&self) -> FailureReason {
        match self {
            DemError::Io(_) | DemError::Http { .. } | DemError::SourceUnreachable { .. } => {
                FailureReason::SourceUnreachable
            }
            DemError::MalformedPayload { .. }
            | DemError::Tiff(_)
            | DemError::InvalidTileId(_)
            | DemError::Config(_) => FailureReason::MalformedPayload,
            DemError::EmptyResult { .. } => FailureReason::EmptyResult,
            DemError::Geometry(_) | DemError::Projection(_) => {
                FailureReason::GeometricInconsistency
            }
            DemError::Exhausted { .. } => FailureReason::TotalExhaustion,
        }
    }

    /// Reason of the innermost error, looking through `Exhausted` wrappers.
    pub fn root_reason(&self) -> FailureReason {
        match self {
            DemError::Exhausted { last, .. } => last.root_reason(),
            other => other.reason(),
        }
    }
}

/// Result type alias using [`DemError`].
pub type Result<T> = std::result::Result<T, DemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DemError::InvalidTileId("X35E138".to_string());
        assert!(err.to_string().contains("X35E138"));

        let err = DemError::unreachable("admin service", "HTTP 500");
        assert!(err.to_string().contains("HTTP 500"));

        let err = DemError::Exhausted {
            stage: Stage::Boundary,
            last: Box::new(DemError::empty("geocoder", "no features")),
        };
        let msg = err.to_string();
        assert!(msg.contains("boundary"));
        assert!(msg.contains("no features"));
    }

    #[test]
    fn test_reason_mapping() {
        assert_eq!(
            DemError::unreachable("mirror", "timeout").reason(),
            FailureReason::SourceUnreachable
        );
        assert_eq!(
            DemError::malformed("archive", "no .shp").reason(),
            FailureReason::MalformedPayload
        );
        assert_eq!(
            DemError::Geometry("empty polygon".into()).reason(),
            FailureReason::GeometricInconsistency
        );

        let err = DemError::Exhausted {
            stage: Stage::SatelliteDem,
            last: Box::new(DemError::empty("catalog", "no items")),
        };
        assert_eq!(err.reason(), FailureReason::TotalExhaustion);
        assert_eq!(err.root_reason(), FailureReason::EmptyResult);
    }
}
