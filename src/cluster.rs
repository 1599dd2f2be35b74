//! Greedy per-zoom-level marker aggregation
//!
//! Each discrete zoom level holds a flat list of entries (individual points or
//! count-labeled clusters) plus a uniform grid over their world-space
//! positions. A coarser level is built from the next-finer one by a single
//! greedy pass: an item within the clustering radius of an existing
//! aggregate's centroid merges into it, otherwise it seeds a new aggregate.
//! Centroids are running averages weighted by member count, so merging two
//! clusters biases the result toward the larger one.
//!
//! The pass iterates items in a fixed order and resolves radius ties by
//! aggregate age, which makes the whole ladder a deterministic, pure function
//! of the input ordering.

use crate::utils;
use geo::Coord;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// An aggregate marker representing several nearby listings at some zoom level
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterNode {
    /// Build-order identifier, stable across queries for the same input
    pub id: u64,
    /// Centroid latitude (count-weighted)
    pub lat: f64,
    /// Centroid longitude (count-weighted)
    pub lng: f64,
    /// Number of listing points aggregated under this node
    pub point_count: u32,
    /// Minimum zoom at which this cluster splits into its members
    pub expansion_zoom: u8,
}

/// One indexed item at a given zoom level
#[derive(Clone, Debug)]
pub(crate) enum LevelNode {
    /// An individual listing, by index into the valid point list
    Point(u32),
    /// A merged cluster together with the indices of its member points
    Cluster {
        node: ClusterNode,
        members: Arc<[u32]>,
    },
}

impl LevelNode {
    /// Listing points represented by this node
    #[inline]
    pub(crate) fn point_count(&self) -> u32 {
        match self {
            LevelNode::Point(_) => 1,
            LevelNode::Cluster { node, .. } => node.point_count,
        }
    }

    /// Append the indices of all member points to `out`
    pub(crate) fn collect_point_indices(&self, out: &mut Vec<u32>) {
        match self {
            LevelNode::Point(idx) => out.push(*idx),
            LevelNode::Cluster { members, .. } => out.extend_from_slice(members),
        }
    }
}

/// An entry with its world-space position
#[derive(Clone, Debug)]
pub(crate) struct LevelEntry {
    pub pos: Coord<f64>,
    pub node: LevelNode,
}

/// All entries of one discrete zoom level plus their spatial grid
#[derive(Clone, Debug)]
pub(crate) struct Level {
    pub zoom: u8,
    cell_size: f64,
    pub entries: Vec<LevelEntry>,
    grid: HashMap<(i64, i64), SmallVec<[u32; 4]>>,
}

impl Level {
    /// Build a level from already-clustered entries
    pub(crate) fn from_entries(zoom: u8, cell_size: f64, entries: Vec<LevelEntry>) -> Self {
        let cell_size = cell_size.max(f64::MIN_POSITIVE);
        let mut grid: HashMap<(i64, i64), SmallVec<[u32; 4]>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            grid.entry(cell_of(entry.pos, cell_size))
                .or_default()
                .push(idx as u32);
        }
        Self {
            zoom,
            cell_size,
            entries,
            grid,
        }
    }

    /// Collect indices of entries whose position falls inside the world rect
    ///
    /// Scans the covered grid cells when the viewport spans few of them,
    /// otherwise falls back to scanning the occupied buckets. Either path is
    /// bounded by the number of occupied cells, never by the raw cell count.
    pub(crate) fn collect_in_rect(&self, x0: f64, x1: f64, y0: f64, y1: f64, out: &mut Vec<u32>) {
        if self.entries.is_empty() || x1 < x0 || y1 < y0 {
            return;
        }

        let cs = self.cell_size;
        let cx0 = (x0 / cs).floor() as i64;
        let cx1 = (x1 / cs).floor() as i64;
        let cy0 = (y0 / cs).floor() as i64;
        let cy1 = (y1 / cs).floor() as i64;

        let in_rect = |pos: Coord<f64>| pos.x >= x0 && pos.x <= x1 && pos.y >= y0 && pos.y <= y1;

        let spanned = (i128::from(cx1 - cx0) + 1) * (i128::from(cy1 - cy0) + 1);
        if spanned > self.grid.len() as i128 {
            for (cell, bucket) in &self.grid {
                if cell.0 < cx0 || cell.0 > cx1 || cell.1 < cy0 || cell.1 > cy1 {
                    continue;
                }
                for &idx in bucket {
                    if in_rect(self.entries[idx as usize].pos) {
                        out.push(idx);
                    }
                }
            }
        } else {
            for cx in cx0..=cx1 {
                for cy in cy0..=cy1 {
                    let Some(bucket) = self.grid.get(&(cx, cy)) else {
                        continue;
                    };
                    for &idx in bucket {
                        if in_rect(self.entries[idx as usize].pos) {
                            out.push(idx);
                        }
                    }
                }
            }
        }
    }

    /// Number of merged clusters at this level
    pub(crate) fn cluster_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.node, LevelNode::Cluster { .. }))
            .count()
    }
}

#[inline]
fn cell_of(pos: Coord<f64>, cell_size: f64) -> (i64, i64) {
    (
        (pos.x / cell_size).floor() as i64,
        (pos.y / cell_size).floor() as i64,
    )
}

#[inline]
fn dist2(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// An in-progress aggregate during one clustering pass
struct Aggregate {
    pos: Coord<f64>,
    count: u32,
    /// Indices into the finer level's entry list
    children: SmallVec<[u32; 4]>,
}

/// Build the level for `zoom` by clustering the next-finer level's entries
///
/// `radius_world` is the clustering radius already converted to world units at
/// `zoom`. New cluster ids are drawn from `next_cluster_id` in pass order.
pub(crate) fn build_coarser_level(
    finer: &Level,
    zoom: u8,
    radius_world: f64,
    max_zoom: u8,
    next_cluster_id: &mut u64,
) -> Level {
    #[cfg(feature = "profiling")]
    profiling::scope!("cluster::build_coarser_level");

    let cell_size = radius_world.max(f64::MIN_POSITIVE);
    let r2 = radius_world * radius_world;

    let mut aggregates: Vec<Aggregate> = Vec::new();
    let mut grid: HashMap<(i64, i64), SmallVec<[u32; 4]>> = HashMap::new();

    for (child_idx, entry) in finer.entries.iter().enumerate() {
        let pos = entry.pos;
        let cell = cell_of(pos, cell_size);

        // Nearest aggregate within the radius; ties go to the older aggregate
        // so the pass stays deterministic regardless of bucket layout.
        let mut best: Option<(u32, f64)> = None;
        for dx in -1i64..=1 {
            for dy in -1i64..=1 {
                let Some(bucket) = grid.get(&(cell.0 + dx, cell.1 + dy)) else {
                    continue;
                };
                for &agg_idx in bucket {
                    let d2 = dist2(aggregates[agg_idx as usize].pos, pos);
                    if d2 > r2 {
                        continue;
                    }
                    match best {
                        None => best = Some((agg_idx, d2)),
                        Some((best_idx, best_d2)) => {
                            if d2 < best_d2 || (d2 == best_d2 && agg_idx < best_idx) {
                                best = Some((agg_idx, d2));
                            }
                        }
                    }
                }
            }
        }

        match best {
            Some((agg_idx, _)) => {
                let agg = &mut aggregates[agg_idx as usize];
                let old_cell = cell_of(agg.pos, cell_size);

                // Running centroid weighted by member count
                let added = entry.node.point_count();
                let total = agg.count + added;
                agg.pos.x =
                    (agg.pos.x * f64::from(agg.count) + pos.x * f64::from(added)) / f64::from(total);
                agg.pos.y =
                    (agg.pos.y * f64::from(agg.count) + pos.y * f64::from(added)) / f64::from(total);
                agg.count = total;
                agg.children.push(child_idx as u32);

                let new_cell = cell_of(agg.pos, cell_size);
                if new_cell != old_cell {
                    if let Some(bucket) = grid.get_mut(&old_cell) {
                        if let Some(slot) = bucket.iter().position(|&i| i == agg_idx) {
                            bucket.swap_remove(slot);
                        }
                    }
                    grid.entry(new_cell).or_default().push(agg_idx);
                }
            }
            None => {
                let agg_idx = aggregates.len() as u32;
                aggregates.push(Aggregate {
                    pos,
                    count: entry.node.point_count(),
                    children: SmallVec::from_slice(&[child_idx as u32]),
                });
                grid.entry(cell).or_default().push(agg_idx);
            }
        }
    }

    // Aggregates that absorbed a single child pass that child's node through
    // unchanged: same id, same position, same expansion zoom.
    let entries: Vec<LevelEntry> = aggregates
        .into_iter()
        .map(|agg| {
            if agg.children.len() == 1 {
                finer.entries[agg.children[0] as usize].clone()
            } else {
                let mut members = Vec::with_capacity(agg.count as usize);
                for &child in &agg.children {
                    finer.entries[child as usize]
                        .node
                        .collect_point_indices(&mut members);
                }
                let id = *next_cluster_id;
                *next_cluster_id += 1;
                LevelEntry {
                    pos: agg.pos,
                    node: LevelNode::Cluster {
                        node: ClusterNode {
                            id,
                            lat: utils::world_y_to_lat(agg.pos.y),
                            lng: utils::world_x_to_lng(agg.pos.x),
                            point_count: agg.count,
                            expansion_zoom: (zoom + 1).min(max_zoom),
                        },
                        members: members.into(),
                    },
                }
            }
        })
        .collect();

    Level::from_entries(zoom, cell_size, entries)
}
