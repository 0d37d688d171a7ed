//! Satellite DEM fallback through a STAC catalog.
//!
//! Used only when no elevation tile could be obtained. The catalog is searched
//! for the configured collection over the (buffered) boundary box, the first
//! item's elevation asset is optionally signed and then downloaded as a GeoTIFF.

use serde::Deserialize;

use crate::config::CatalogConfig;
use crate::error::{DemError, Result, Stage};
use crate::planner::BoundingBox;
use crate::raster::{geotiff, RasterDataset};
use crate::transport::{get_ok, Transport};

const SOURCE: &str = "satellite catalog";

/// Asset keys tried in order before falling back to the first key alphabetically.
const ASSET_KEYS: [&str; 2] = ["data", "DEM"];

#[derive(Debug, Deserialize)]
struct ItemCollection {
    #[serde(default)]
    features: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    id: String,
    #[serde(default)]
    assets: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SasToken {
    token: String,
}

/// Elevation asset chosen from a catalog item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedAsset {
    pub item_id: String,
    pub key: String,
    pub href: String,
}

/// Search the catalog over `bbox` and download the first item's DEM.
///
/// # Errors
///
/// Any failure is wrapped in [`DemError::Exhausted`] for
/// [`Stage::SatelliteDem`]: an empty search reports
/// [`DemError::EmptyResult`], an item without a usable asset
/// [`DemError::MalformedPayload`].
pub fn fetch_dem<T: Transport + ?Sized>(
    transport: &T,
    config: &CatalogConfig,
    bbox: &BoundingBox,
) -> Result<RasterDataset> {
    fetch_inner(transport, config, bbox).map_err(|e| DemError::Exhausted {
        stage: Stage::SatelliteDem,
        last: Box::new(e),
    })
}

fn fetch_inner<T: Transport + ?Sized>(
    transport: &T,
    config: &CatalogConfig,
    bbox: &BoundingBox,
) -> Result<RasterDataset> {
    if !config.enabled {
        return Err(DemError::Config("satellite catalog is disabled".to_string()));
    }

    let asset = search(transport, config, bbox)?;
    tracing::info!(item = %asset.item_id, asset = %asset.key, "Satellite DEM item selected");

    let href = match &config.token_url {
        Some(token_url) => sign(transport, config, token_url, &asset.href)?,
        None => asset.href.clone(),
    };

    let bytes = get_ok(transport, SOURCE, &href, &[], config.download_timeout)?;
    tracing::info!(size = bytes.len(), "Satellite DEM downloaded");
    geotiff::decode(&bytes).map_err(|e| match e {
        DemError::Tiff(inner) => DemError::malformed(SOURCE, format!("unreadable GeoTIFF: {inner}")),
        other => other,
    })
}

/// Run the STAC search and pick the asset of the first item.
pub fn search<T: Transport + ?Sized>(
    transport: &T,
    config: &CatalogConfig,
    bbox: &BoundingBox,
) -> Result<SelectedAsset> {
    let buffered = bbox.buffered(config.buffer_deg);
    let bbox_param = format!(
        "{},{},{},{}",
        buffered.min_lon, buffered.min_lat, buffered.max_lon, buffered.max_lat
    );
    let limit = config.limit.to_string();
    let url = format!("{}/search", config.url.trim_end_matches('/'));
    tracing::info!(url = %url, collection = %config.collection, bbox = %bbox_param, "Searching satellite catalog");

    let body = get_ok(
        transport,
        SOURCE,
        &url,
        &[
            ("collections", config.collection.as_str()),
            ("bbox", bbox_param.as_str()),
            ("limit", limit.as_str()),
        ],
        config.timeout,
    )?;
    let collection: ItemCollection = serde_json::from_slice(&body)
        .map_err(|e| DemError::malformed(SOURCE, format!("invalid search response: {e}")))?;

    let item = collection
        .features
        .into_iter()
        .next()
        .ok_or_else(|| DemError::empty(SOURCE, format!("no {} items over {bbox_param}", config.collection)))?;
    select_asset(item)
}

fn select_asset(item: Item) -> Result<SelectedAsset> {
    let key = ASSET_KEYS
        .iter()
        .map(|k| k.to_string())
        .find(|k| item.assets.contains_key(k))
        .or_else(|| item.assets.keys().min().cloned())
        .ok_or_else(|| DemError::malformed(SOURCE, format!("item {} has no assets", item.id)))?;

    let href = item
        .assets
        .get(&key)
        .and_then(|asset| asset.get("href"))
        .and_then(|href| href.as_str())
        .ok_or_else(|| {
            DemError::malformed(SOURCE, format!("asset {key} of item {} has no href", item.id))
        })?
        .to_string();

    Ok(SelectedAsset {
        item_id: item.id,
        key,
        href,
    })
}

/// Append a SAS token for the collection to `href`.
fn sign<T: Transport + ?Sized>(
    transport: &T,
    config: &CatalogConfig,
    token_url: &str,
    href: &str,
) -> Result<String> {
    let url = format!("{}/{}", token_url.trim_end_matches('/'), config.collection);
    let body = get_ok(transport, SOURCE, &url, &[], config.timeout)?;
    let token: SasToken = serde_json::from_slice(&body)
        .map_err(|e| DemError::malformed(SOURCE, format!("invalid token response: {e}")))?;
    Ok(append_token(href, &token.token))
}

fn append_token(href: &str, token: &str) -> String {
    let separator = if href.contains('?') { '&' } else { '?' };
    format!("{href}{separator}{token}")
}
