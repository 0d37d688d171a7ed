//! Administrative WFS service.

use crate::boundary::geojson::parse_polygons;
use crate::boundary::{BoundaryGeometry, BoundarySource};
use crate::config::BoundaryConfig;
use crate::error::{DemError, Result};
use crate::transport::Transport;

const SOURCE: &str = "administrative service";

/// CQL filter selecting `region` by exact upper-cased name.
///
/// Single quotes are doubled as CQL requires.
///
/// ```
/// use regiondem::boundary::admin::cql_filter;
///
/// assert_eq!(cql_filter("comuna", "Ñuñoa"), "comuna='ÑUÑOA'");
/// assert_eq!(cql_filter("comuna", "O'Higgins"), "comuna='O''HIGGINS'");
/// ```
pub fn cql_filter(field: &str, region: &str) -> String {
    format!("{field}='{}'", region.to_uppercase().replace('\'', "''"))
}

/// Query the WFS endpoint for `region`.
///
/// Any status other than 200 counts as unreachable.
pub fn fetch<T: Transport + ?Sized>(
    transport: &T,
    config: &BoundaryConfig,
    region: &str,
) -> Result<BoundaryGeometry> {
    let filter = cql_filter(&config.admin_name_field, region);
    let query = [
        ("service", "WFS"),
        ("version", "2.0.0"),
        ("request", "GetFeature"),
        ("typeName", config.admin_layer.as_str()),
        ("outputFormat", "application/json"),
        ("CQL_FILTER", filter.as_str()),
    ];
    tracing::info!(url = %config.admin_url, filter = %filter, "Querying administrative service");

    let response = transport
        .get(&config.admin_url, &query, config.timeout)
        .map_err(|e| match e {
            DemError::Http { reason, .. } => DemError::unreachable(SOURCE, reason),
            other => other,
        })?;
    if response.status != 200 {
        return Err(DemError::unreachable(
            SOURCE,
            format!("HTTP {} from {}", response.status, config.admin_url),
        ));
    }

    let parsed = parse_polygons(SOURCE, &response.text())?;
    tracing::debug!(features = parsed.features, epsg = parsed.epsg, "WFS features parsed");
    BoundaryGeometry::new(parsed.shape, parsed.epsg, BoundarySource::AdminService, region)
}
