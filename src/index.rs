//! Zoom-aware spatial index over the listing point set
//!
//! Built once per input set, queried on every viewport settle. The index holds
//! one pre-clustered level per discrete zoom, so a query
//! is a grid lookup plus containment filtering instead of a re-clustering
//! pass.
//!
//! # Render-mode rule
//!
//! At or below the cluster zoom threshold, queries return the clustering
//! result as-is, merged nodes included. Above it, queries run against the
//! finest level and discard anything still flagged as a merged cluster, so no
//! aggregation is ever shown even for pixel-adjacent listings. Below the
//! threshold users manage density; above it they expect precision.

use crate::cluster::{self, ClusterNode, Level, LevelEntry, LevelNode};
use crate::point::ListingPoint;
use crate::utils::{self, GeoBounds};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Configuration for index construction and querying
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapConfig {
    /// Coarsest discrete zoom level of the cluster ladder
    pub min_zoom: u8,
    /// Finest discrete zoom level; the level that holds raw points.
    /// Cluster expansion zooms are clamped to this value.
    pub max_zoom: u8,
    /// Clustering radius in screen pixels, converted to a geo distance per level
    pub cluster_radius_px: f64,
    /// Zoom above which only individual markers are ever shown
    pub cluster_zoom_threshold: f64,
    /// Fraction of the viewport added on each side when querying, so markers
    /// do not pop right at the screen edge
    pub query_margin_fraction: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 18,
            cluster_radius_px: 60.0,
            cluster_zoom_threshold: 10.0,
            query_margin_fraction: 0.05,
        }
    }
}

/// Whether a query returns aggregated clusters or only individual points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Use the clustering result as-is, merged nodes included
    Clustered,
    /// Only genuine individual points, never an aggregate
    Individual,
}

impl RenderMode {
    /// Decide the mode for a zoom against the fixed threshold
    #[inline]
    pub fn for_zoom(zoom: f64, threshold: f64) -> Self {
        if zoom <= threshold {
            RenderMode::Clustered
        } else {
            RenderMode::Individual
        }
    }
}

/// One item of a query result
#[derive(Clone, Debug)]
pub enum MapEntity {
    /// A merged cluster with its count
    Cluster(ClusterNode),
    /// An individual listing
    Listing(Arc<ListingPoint>),
}

impl MapEntity {
    /// Stable diffing key: `cluster:{id}` or `point:{id}`
    pub fn key(&self) -> String {
        match self {
            MapEntity::Cluster(node) => format!("cluster:{}", node.id),
            MapEntity::Listing(point) => format!("point:{}", point.id),
        }
    }

    /// Position of the marker in WGS84 degrees
    #[inline]
    pub fn position(&self) -> (f64, f64) {
        match self {
            MapEntity::Cluster(node) => (node.lat, node.lng),
            MapEntity::Listing(point) => (point.lat, point.lng),
        }
    }

    /// Number of listing points represented
    #[inline]
    pub fn point_count(&self) -> u32 {
        match self {
            MapEntity::Cluster(node) => node.point_count,
            MapEntity::Listing(_) => 1,
        }
    }
}

/// Summary information about a built index
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexInfo {
    /// Valid points indexed
    pub point_count: usize,
    /// Points dropped for non-finite coordinates
    pub dropped_point_count: usize,
    /// Discrete zoom levels in the ladder
    pub level_count: usize,
    /// Merged cluster nodes across all levels
    pub cluster_count: usize,
}

/// Immutable, zoom-aware spatial index over a listing point set
///
/// Built synchronously by [`SpatialIndex::build`]; a newer point set replaces
/// the whole index rather than patching it.
pub struct SpatialIndex {
    points: Vec<Arc<ListingPoint>>,
    /// Ladder ordered `min_zoom..=max_zoom`
    levels: Vec<Level>,
    /// Point id to index into `points` (last occurrence wins)
    id_lookup: HashMap<String, u32>,
    /// Cluster id to (level index, entry index) of its formation level
    cluster_lookup: HashMap<u64, (usize, u32)>,
    bounding_box: Option<GeoBounds>,
    dropped: usize,
    config: MapConfig,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SpatialIndex {
    /// Build an index over an empty point set
    pub fn empty(config: &MapConfig) -> Self {
        Self::build(Vec::new(), config)
    }

    /// Build the cluster ladder for the given points
    ///
    /// Deterministic, pure function of the order-preserved input. Points with
    /// non-finite coordinates are dropped (and counted) before indexing; the
    /// remaining valid points still index and render.
    pub fn build(points: Vec<ListingPoint>, config: &MapConfig) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::build");

        let mut config = config.clone();
        if config.max_zoom < config.min_zoom {
            config.max_zoom = config.min_zoom;
        }

        let total = points.len();
        let valid: Vec<Arc<ListingPoint>> = points
            .into_iter()
            .filter(|p| {
                if p.has_finite_coordinates() {
                    true
                } else {
                    tracing::warn!(
                        id = %p.id,
                        lat = p.lat,
                        lng = p.lng,
                        "dropping listing with non-finite coordinates"
                    );
                    false
                }
            })
            .map(Arc::new)
            .collect();
        let dropped = total - valid.len();

        // Order-preserving parallel projection into world space
        let projected: Vec<geo::Coord<f64>> = valid
            .par_iter()
            .map(|p| utils::project(p.lat, p.lng))
            .collect();

        let mut bounding_box: Option<GeoBounds> = None;
        for point in &valid {
            bounding_box = Some(match bounding_box {
                None => GeoBounds::new(point.lng, point.lat, point.lng, point.lat),
                Some(bb) => GeoBounds::new(
                    bb.west.min(point.lng),
                    bb.south.min(point.lat),
                    bb.east.max(point.lng),
                    bb.north.max(point.lat),
                ),
            });
        }

        let id_lookup: HashMap<String, u32> = valid
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i as u32))
            .collect();

        // Finest level holds the raw points; every coarser level is a greedy
        // clustering pass over the next-finer one.
        let finest_entries: Vec<LevelEntry> = valid
            .iter()
            .enumerate()
            .map(|(i, _)| LevelEntry {
                pos: projected[i],
                node: LevelNode::Point(i as u32),
            })
            .collect();

        let span = usize::from(config.max_zoom - config.min_zoom) + 1;
        let mut levels: Vec<Level> = Vec::with_capacity(span);
        levels.push(Level::from_entries(
            config.max_zoom,
            utils::pixel_radius_to_world(config.cluster_radius_px, config.max_zoom),
            finest_entries,
        ));

        let mut next_cluster_id: u64 = 1;
        for zoom in (config.min_zoom..config.max_zoom).rev() {
            let radius = utils::pixel_radius_to_world(config.cluster_radius_px, zoom);
            let coarser = cluster::build_coarser_level(
                levels.last().expect("ladder is never empty"),
                zoom,
                radius,
                config.max_zoom,
                &mut next_cluster_id,
            );
            levels.push(coarser);
        }
        levels.reverse(); // now ordered min_zoom..=max_zoom

        // Map each cluster id to the (finest) level where it formed, so
        // expansion lookups and member resolution are O(1).
        let mut cluster_lookup: HashMap<u64, (usize, u32)> = HashMap::new();
        for (level_idx, level) in levels.iter().enumerate().rev() {
            for (entry_idx, entry) in level.entries.iter().enumerate() {
                if let LevelNode::Cluster { node, .. } = &entry.node {
                    cluster_lookup
                        .entry(node.id)
                        .or_insert((level_idx, entry_idx as u32));
                }
            }
        }

        tracing::debug!(
            points = valid.len(),
            dropped,
            levels = levels.len(),
            clusters = cluster_lookup.len(),
            "built spatial index"
        );

        Self {
            points: valid,
            levels,
            id_lookup,
            cluster_lookup,
            bounding_box,
            dropped,
            config,
        }
    }

    /// Query the clusters and points visible in `bounds` at `zoom`
    ///
    /// Pure read; an empty index yields an empty result. The output order is
    /// deterministic for a given index.
    pub fn query(&self, bounds: &GeoBounds, zoom: f64) -> Vec<MapEntity> {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::query");

        if self.points.is_empty() {
            return Vec::new();
        }

        let mode = RenderMode::for_zoom(zoom, self.config.cluster_zoom_threshold);
        let level = self.level_for(zoom, mode);

        let padded = bounds.expanded(self.config.query_margin_fraction);
        let (y0, y1) = padded.world_y_range();

        let mut hits: Vec<u32> = Vec::new();
        for (x0, x1) in padded.world_x_ranges() {
            level.collect_in_rect(x0, x1, y0, y1, &mut hits);
        }
        hits.sort_unstable();
        tracing::trace!(zoom = level.zoom, hits = hits.len(), "viewport query");

        hits.iter()
            .filter_map(|&idx| {
                let entry = &level.entries[idx as usize];
                match &entry.node {
                    LevelNode::Point(point_idx) => Some(MapEntity::Listing(
                        self.points[*point_idx as usize].clone(),
                    )),
                    LevelNode::Cluster { node, .. } => match mode {
                        RenderMode::Clustered => Some(MapEntity::Cluster(node.clone())),
                        // The no-aggregation guarantee above the threshold.
                        RenderMode::Individual => None,
                    },
                }
            })
            .collect()
    }

    /// Look up a cluster by id
    pub fn cluster(&self, cluster_id: u64) -> Option<ClusterNode> {
        let &(level_idx, entry_idx) = self.cluster_lookup.get(&cluster_id)?;
        match &self.levels[level_idx].entries[entry_idx as usize].node {
            LevelNode::Cluster { node, .. } => Some(node.clone()),
            LevelNode::Point(_) => None,
        }
    }

    /// Resolve the listing points aggregated under a cluster
    pub fn cluster_members(&self, cluster_id: u64) -> Option<Vec<Arc<ListingPoint>>> {
        let &(level_idx, entry_idx) = self.cluster_lookup.get(&cluster_id)?;
        let mut indices = Vec::new();
        self.levels[level_idx].entries[entry_idx as usize]
            .node
            .collect_point_indices(&mut indices);
        Some(
            indices
                .into_iter()
                .map(|i| self.points[i as usize].clone())
                .collect(),
        )
    }

    /// Look up a listing point by id
    pub fn point_by_id(&self, id: &str) -> Option<Arc<ListingPoint>> {
        self.id_lookup
            .get(id)
            .map(|&i| self.points[i as usize].clone())
    }

    /// Number of valid points indexed
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Points dropped during the build for non-finite coordinates
    #[inline]
    pub fn dropped_point_count(&self) -> usize {
        self.dropped
    }

    /// Whether the index holds no points
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// WGS84 bounding box of all valid points
    ///
    /// O(1); cached during the build. `None` for an empty index.
    #[inline]
    pub fn bounding_box(&self) -> Option<GeoBounds> {
        self.bounding_box
    }

    /// Summary information about the index
    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            point_count: self.points.len(),
            dropped_point_count: self.dropped,
            level_count: self.levels.len(),
            cluster_count: self.levels.iter().map(Level::cluster_count).sum(),
        }
    }

    /// The configuration this index was built with
    #[inline]
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    fn level_for(&self, zoom: f64, mode: RenderMode) -> &Level {
        match mode {
            RenderMode::Individual => self.levels.last().expect("ladder is never empty"),
            RenderMode::Clustered => {
                let floored = zoom.floor();
                let discrete = if floored.is_finite() {
                    floored.clamp(f64::from(self.config.min_zoom), f64::from(self.config.max_zoom))
                        as u8
                } else {
                    self.config.min_zoom
                };
                &self.levels[usize::from(discrete - self.config.min_zoom)]
            }
        }
    }
}
