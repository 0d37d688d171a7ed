//! Resilient tile acquisition.
//!
//! [`TileFetcher`] resolves a [`TileId`] to a decoded raster by trying, in
//! order: the in-memory cache, the on-disk tile cache, then every configured
//! mirror. [`TileFetcher::fetch_all`] adds the escalation tiers used when a
//! whole region comes back empty.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde::Serialize;

use crate::config::FetchConfig;
use crate::error::{DemError, Result, Stage};
use crate::fetch::mirror::Mirror;
use crate::hgt;
use crate::output::write_atomic;
use crate::planner::{plan, BoundingBox, PlanMode};
use crate::raster::RasterDataset;
use crate::tile_id::TileId;
use crate::transport::{get_ok, Transport};

/// Uncompressed payloads below this size are logged as suspicious.
const SIZE_WARNING_BYTES: usize = 2_000_000;

/// Counters describing where tiles came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    /// Tiles served from the in-memory cache.
    pub memory_hits: u64,
    /// Tiles read from the on-disk cache directory.
    pub disk_hits: u64,
    /// Tiles downloaded from a mirror.
    pub downloads: u64,
    /// Mirror attempts that failed.
    pub failed_attempts: u64,
}

/// Which escalation tier produced the tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTier {
    /// The planned corner cells.
    Corners,
    /// The exhaustive cell range with halo.
    Exhaustive,
    /// The single forced retry against the known-good mirror.
    Forced,
}

/// Result of [`TileFetcher::fetch_all`].
#[derive(Debug, Clone)]
pub struct FetchedTiles {
    /// Tiles in fetch order, which is also mosaic priority order.
    pub tiles: Vec<(TileId, Arc<RasterDataset>)>,
    pub tier: FetchTier,
}

impl FetchedTiles {
    /// Decoded rasters in fetch order.
    pub fn rasters(&self) -> Vec<Arc<RasterDataset>> {
        self.tiles.iter().map(|(_, r)| Arc::clone(r)).collect()
    }

    /// Tile codes in fetch order.
    pub fn ids(&self) -> Vec<TileId> {
        self.tiles.iter().map(|(id, _)| *id).collect()
    }
}

/// Fetches and caches elevation tiles.
///
/// # Example
///
/// ```ignore
/// use regiondem::{BoundingBox, FetchConfig, HttpTransport, TileFetcher};
///
/// let fetcher = TileFetcher::new(HttpTransport::new()?, FetchConfig::default());
/// let tiles = fetcher.fetch_all(&BoundingBox::new(-34.9, -71.9, -34.1, -71.1))?;
/// println!("{} tiles via {:?}", tiles.tiles.len(), tiles.tier);
/// ```
pub struct TileFetcher<T> {
    transport: T,
    config: FetchConfig,
    cache: Cache<TileId, Arc<RasterDataset>>,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    downloads: AtomicU64,
    failed_attempts: AtomicU64,
}

impl<T: Transport> TileFetcher<T> {
    /// Create a fetcher over `transport`.
    pub fn new(transport: T, config: FetchConfig) -> Self {
        let cache = Cache::builder().max_capacity(config.cache_size).build();
        Self {
            transport,
            config,
            cache,
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the fetch counters.
    pub fn stats(&self) -> FetchStats {
        FetchStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
        }
    }

    /// Fetch one tile through the mirror list.
    ///
    /// Mirrors are tried in order; the first that answers with a decodable
    /// payload wins and the rest are skipped.
    ///
    /// # Errors
    ///
    /// Returns the error of the last mirror attempted, or
    /// [`DemError::EmptyResult`] when no mirrors are configured.
    pub fn fetch(&self, id: TileId) -> Result<Arc<RasterDataset>> {
        if let Some(tile) = self.cache.get(&id) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(tile);
        }

        if let Some(tile) = self.read_cached(id) {
            return Ok(tile);
        }

        let mut last_error = None;
        for mirror in &self.config.mirrors {
            match self.fetch_from(mirror, id, self.config.timeout) {
                Ok(raw) => match hgt::decode(id, &raw) {
                    Ok(raster) => return Ok(self.accept(id, &raw, raster, mirror)),
                    Err(e) => {
                        self.record_failure(id, mirror, &e);
                        last_error = Some(e);
                    }
                },
                Err(e) => {
                    self.record_failure(id, mirror, &e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DemError::empty("mirrors", "no tile mirrors configured")))
    }

    /// Fetch every tile needed for `bbox`, escalating when a tier yields nothing.
    ///
    /// 1. Corner plan.
    /// 2. Exhaustive plan restricted to cells overlapping `bbox`, skipping
    ///    tiles that already failed.
    /// 3. One forced retry of the south-west tile against the forced mirror.
    ///
    /// # Errors
    ///
    /// Returns [`DemError::Exhausted`] for [`Stage::Tiles`] when all tiers fail.
    pub fn fetch_all(&self, bbox: &BoundingBox) -> Result<FetchedTiles> {
        let mut failed = HashSet::new();
        let mut last_error = None;

        let corners = plan(bbox, PlanMode::Corners);
        tracing::info!(
            tiles = ?corners.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            "Fetching planned tiles"
        );
        let tiles = self.fetch_set(&corners, &mut failed, &mut last_error);
        if !tiles.is_empty() {
            return Ok(FetchedTiles {
                tiles,
                tier: FetchTier::Corners,
            });
        }

        // Halo cells outside the box would leave nothing to clip.
        let exhaustive: BTreeSet<TileId> = plan(bbox, PlanMode::Exhaustive)
            .into_iter()
            .filter(|id| bbox.overlaps_tile(*id))
            .collect();
        tracing::warn!(
            tiles = exhaustive.len(),
            "No planned tile could be fetched, retrying with the exhaustive cell range"
        );
        let tiles = self.fetch_set(&exhaustive, &mut failed, &mut last_error);
        if !tiles.is_empty() {
            return Ok(FetchedTiles {
                tiles,
                tier: FetchTier::Exhaustive,
            });
        }

        match self.forced_retry(bbox) {
            Ok(Some(tile)) => {
                return Ok(FetchedTiles {
                    tiles: vec![tile],
                    tier: FetchTier::Forced,
                })
            }
            Ok(None) => {}
            Err(e) => last_error = Some(e),
        }

        Err(DemError::Exhausted {
            stage: Stage::Tiles,
            last: Box::new(
                last_error.unwrap_or_else(|| DemError::empty("mirrors", "no tiles planned")),
            ),
        })
    }

    fn fetch_set(
        &self,
        ids: &BTreeSet<TileId>,
        failed: &mut HashSet<TileId>,
        last_error: &mut Option<DemError>,
    ) -> Vec<(TileId, Arc<RasterDataset>)> {
        let mut tiles = Vec::new();
        for &id in ids {
            if failed.contains(&id) {
                continue;
            }
            match self.fetch(id) {
                Ok(tile) => tiles.push((id, tile)),
                Err(e) => {
                    tracing::warn!(tile = %id, error = %e, "Tile unavailable from every mirror");
                    failed.insert(id);
                    *last_error = Some(e);
                }
            }
        }
        tiles
    }

    /// Single attempt at the south-west tile with a longer timeout and a size floor.
    fn forced_retry(&self, bbox: &BoundingBox) -> Result<Option<(TileId, Arc<RasterDataset>)>> {
        let Some(mirror) = &self.config.forced_mirror else {
            return Ok(None);
        };
        let id = TileId::from_lat_lon(bbox.min_lat, bbox.min_lon);
        tracing::warn!(tile = %id, mirror = mirror.name(), "Forcing download from fallback mirror");

        let raw = self.fetch_from(mirror, id, self.config.forced_timeout)?;
        tracing::info!(tile = %id, size = raw.len(), "Forced tile downloaded");
        if raw.len() <= self.config.forced_min_bytes {
            return Err(DemError::malformed(
                mirror.name(),
                format!(
                    "forced tile {} is only {} bytes (need more than {})",
                    id,
                    raw.len(),
                    self.config.forced_min_bytes
                ),
            ));
        }
        let raster = hgt::decode(id, &raw)?;
        Ok(Some((id, self.accept(id, &raw, raster, mirror))))
    }

    /// Download from one mirror and return raw `.hgt` bytes.
    fn fetch_from(&self, mirror: &Mirror, id: TileId, timeout: Duration) -> Result<Vec<u8>> {
        let url = mirror.url_for(id)?;
        tracing::debug!(tile = %id, url = %url, "Trying mirror");

        let body = get_ok(&self.transport, mirror.name(), &url, &[], timeout)?;
        let raw = mirror.decompress(&body, id)?;
        if raw.len() < SIZE_WARNING_BYTES {
            tracing::warn!(tile = %id, size = raw.len(), url = %url, "Unexpected tile size");
        }
        Ok(raw)
    }

    fn accept(
        &self,
        id: TileId,
        raw: &[u8],
        raster: RasterDataset,
        mirror: &Mirror,
    ) -> Arc<RasterDataset> {
        tracing::info!(tile = %id, mirror = mirror.name(), "Tile downloaded");
        self.downloads.fetch_add(1, Ordering::Relaxed);

        if let Some(dir) = &self.config.cache_dir {
            if let Err(e) = write_atomic(&dir.join(id.hgt_filename()), raw) {
                tracing::warn!(tile = %id, error = %e, "Could not store tile in cache directory");
            }
        }

        let tile = Arc::new(raster);
        self.cache.insert(id, Arc::clone(&tile));
        tile
    }

    fn read_cached(&self, id: TileId) -> Option<Arc<RasterDataset>> {
        let path = self.config.cache_dir.as_ref()?.join(id.hgt_filename());
        if !path.exists() {
            return None;
        }
        match hgt::read_file(&path, id) {
            Ok(raster) => {
                tracing::debug!(tile = %id, path = %path.display(), "Tile read from cache directory");
                self.disk_hits.fetch_add(1, Ordering::Relaxed);
                let tile = Arc::new(raster);
                self.cache.insert(id, Arc::clone(&tile));
                Some(tile)
            }
            Err(e) => {
                tracing::warn!(tile = %id, error = %e, "Ignoring unreadable cached tile");
                None
            }
        }
    }

    fn record_failure(&self, id: TileId, mirror: &Mirror, error: &DemError) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(tile = %id, mirror = mirror.name(), error = %error, "Mirror failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hgt::tests::synthetic_hgt;
    use crate::transport::HttpResponse;
    use flate2::write::GzEncoder;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io::Write;

    /// Serves fixed bodies by URL and records every request.
    #[derive(Default)]
    struct MapTransport {
        routes: HashMap<String, Vec<u8>>,
        requests: RefCell<Vec<String>>,
    }

    impl MapTransport {
        fn with(mut self, url: &str, body: Vec<u8>) -> Self {
            self.routes.insert(url.to_string(), body);
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.borrow().clone()
        }
    }

    impl Transport for MapTransport {
        fn get(&self, url: &str, _: &[(&str, &str)], _: Duration) -> Result<HttpResponse> {
            self.requests.borrow_mut().push(url.to_string());
            Ok(match self.routes.get(url) {
                Some(body) => HttpResponse {
                    status: 200,
                    body: body.clone(),
                },
                None => HttpResponse {
                    status: 404,
                    body: Vec::new(),
                },
            })
        }
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn config(mirrors: &[&str]) -> FetchConfig {
        FetchConfig {
            mirrors: mirrors.iter().map(|m| Mirror::new(*m)).collect(),
            forced_mirror: None,
            ..FetchConfig::default()
        }
    }

    #[test]
    fn test_first_successful_mirror_wins() {
        let tile = synthetic_hgt(11, |_, _| 500);
        let transport = MapTransport::default()
            .with("http://b/S35W072.hgt.gz", gzip(&tile))
            .with("http://c/S35W072.hgt", tile.clone());
        let fetcher = TileFetcher::new(
            transport,
            config(&[
                "http://a/{filename}.hgt",
                "http://b/{filename}.hgt.gz",
                "http://c/{filename}.hgt",
            ]),
        );

        let raster = fetcher.fetch(TileId::new(-35, -72)).unwrap();
        assert_eq!(raster.width(), 11);
        assert_eq!(raster.get(0, 5, 5), Some(500.0));
        assert_eq!(
            fetcher.transport().requests(),
            vec!["http://a/S35W072.hgt", "http://b/S35W072.hgt.gz"]
        );
        assert_eq!(fetcher.stats().downloads, 1);
        assert_eq!(fetcher.stats().failed_attempts, 1);
    }

    #[test]
    fn test_memory_cache_avoids_second_request() {
        let transport =
            MapTransport::default().with("http://a/N10E010.hgt", synthetic_hgt(3, |_, _| 1));
        let fetcher = TileFetcher::new(transport, config(&["http://a/{filename}.hgt"]));

        fetcher.fetch(TileId::new(10, 10)).unwrap();
        fetcher.fetch(TileId::new(10, 10)).unwrap();
        assert_eq!(fetcher.transport().requests().len(), 1);
        assert_eq!(fetcher.stats().memory_hits, 1);
    }

    #[test]
    fn test_malformed_payload_falls_through() {
        let transport = MapTransport::default()
            .with("http://a/N10E010.hgt.gz", b"not gzip".to_vec())
            .with("http://b/N10E010.hgt", vec![0u8; 3])
            .with("http://c/N10E010.hgt", synthetic_hgt(3, |_, _| 2));
        let fetcher = TileFetcher::new(
            transport,
            config(&[
                "http://a/{filename}.hgt.gz",
                "http://b/{filename}.hgt",
                "http://c/{filename}.hgt",
            ]),
        );

        let raster = fetcher.fetch(TileId::new(10, 10)).unwrap();
        assert_eq!(raster.get(0, 0, 0), Some(2.0));
        assert_eq!(fetcher.stats().failed_attempts, 2);
    }

    #[test]
    fn test_all_mirrors_fail() {
        let fetcher = TileFetcher::new(MapTransport::default(), config(&["http://a/{filename}.hgt"]));
        let err = fetcher.fetch(TileId::new(0, 0)).unwrap_err();
        assert!(matches!(err, DemError::SourceUnreachable { .. }));
    }

    #[test]
    fn test_disk_cache_read_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let transport =
            MapTransport::default().with("http://a/S35W072.hgt", synthetic_hgt(3, |_, _| 42));
        let mut cfg = config(&["http://a/{filename}.hgt"]);
        cfg.cache_dir = Some(dir.path().to_path_buf());

        let fetcher = TileFetcher::new(transport, cfg.clone());
        fetcher.fetch(TileId::new(-35, -72)).unwrap();
        assert!(dir.path().join("S35W072.hgt").exists());

        // A fresh fetcher with no routes is served from disk.
        let offline = TileFetcher::new(MapTransport::default(), cfg);
        let raster = offline.fetch(TileId::new(-35, -72)).unwrap();
        assert_eq!(raster.get(0, 1, 1), Some(42.0));
        assert!(offline.transport().requests().is_empty());
        assert_eq!(offline.stats().disk_hits, 1);
    }

    #[test]
    fn test_fetch_all_corners() {
        let transport = MapTransport::default()
            .with("http://a/S35W072.hgt", synthetic_hgt(3, |_, _| 1))
            .with("http://a/S35W071.hgt", synthetic_hgt(3, |_, _| 2));
        let fetcher = TileFetcher::new(transport, config(&["http://a/{filename}.hgt"]));

        let bbox = BoundingBox::new(-34.9, -71.5, -34.1, -70.5);
        let fetched = fetcher.fetch_all(&bbox).unwrap();
        assert_eq!(fetched.tier, FetchTier::Corners);
        assert_eq!(
            fetched.ids(),
            vec![TileId::new(-35, -72), TileId::new(-35, -71)]
        );
    }

    #[test]
    fn test_fetch_all_exhaustive_ignores_halo_cells() {
        // Only the halo cell north-east of the box exists.
        let transport =
            MapTransport::default().with("http://a/S34W071.hgt", synthetic_hgt(3, |_, _| 9));
        let fetcher = TileFetcher::new(transport, config(&["http://a/{filename}.hgt"]));

        let bbox = BoundingBox::new(-34.9, -71.9, -34.1, -71.1);
        let err = fetcher.fetch_all(&bbox).unwrap_err();
        assert!(matches!(
            err,
            DemError::Exhausted {
                stage: Stage::Tiles,
                ..
            }
        ));

        // The failed corner tile is not retried and the halo is never requested.
        let requests = fetcher.transport().requests();
        assert_eq!(requests, vec!["http://a/S35W072.hgt"]);
    }

    #[test]
    fn test_fetch_all_forced_retry() {
        let tile = synthetic_hgt(801, |_, _| 3);
        assert!(tile.len() > 1_000_000);
        let transport = MapTransport::default().with("http://forced/S35/S35W072.hgt.gz", gzip(&tile));
        let mut cfg = config(&["http://a/{filename}.hgt"]);
        cfg.forced_mirror = Some(Mirror::new(
            "http://forced/{lat_prefix}{lat}/{filename}.hgt.gz",
        ));
        let fetcher = TileFetcher::new(transport, cfg);

        let fetched = fetcher
            .fetch_all(&BoundingBox::new(-34.9, -71.9, -34.1, -71.1))
            .unwrap();
        assert_eq!(fetched.tier, FetchTier::Forced);
        assert_eq!(fetched.ids(), vec![TileId::new(-35, -72)]);
    }

    #[test]
    fn test_forced_retry_rejects_small_tile() {
        let transport = MapTransport::default()
            .with("http://forced/S35/S35W072.hgt.gz", gzip(&synthetic_hgt(3, |_, _| 3)));
        let mut cfg = config(&["http://a/{filename}.hgt"]);
        cfg.forced_mirror = Some(Mirror::new(
            "http://forced/{lat_prefix}{lat}/{filename}.hgt.gz",
        ));
        let fetcher = TileFetcher::new(transport, cfg);

        let err = fetcher
            .fetch_all(&BoundingBox::new(-34.9, -71.9, -34.1, -71.1))
            .unwrap_err();
        assert_eq!(err.reason(), crate::error::FailureReason::TotalExhaustion);
        assert_eq!(err.root_reason(), crate::error::FailureReason::MalformedPayload);
    }

    #[test]
    fn test_fetch_all_exhausted() {
        let fetcher = TileFetcher::new(MapTransport::default(), config(&["http://a/{filename}.hgt"]));
        let err = fetcher
            .fetch_all(&BoundingBox::new(-34.9, -71.9, -34.1, -71.1))
            .unwrap_err();
        assert!(matches!(
            err,
            DemError::Exhausted {
                stage: Stage::Tiles,
                ..
            }
        ));
    }
}
