// THEORY:
// The `SegmentationIndex` is the owner of the live partition. Where the `GridManager`
// of a motion pipeline owns a grid of analyzers, this index owns a grid of segment
// memberships, and it is the only component allowed to change them.
//
// Key architectural principles:
// 1.  **Direct membership**: A `Vec<SegmentId>` indexed by linear pixel position
//     answers "which segment owns this pixel" in O(1). It is rewritten for the
//     members of every new segment, never rebuilt by scanning.
// 2.  **Derived adjacency**: Neighbor segments are always computed from the current
//     membership table by walking the 4-connected neighbors of every member pixel.
//     Nothing about adjacency is cached across merges.
// 3.  **Single writer**: `apply_merge` is the only mutation. It validates both
//     operands before touching anything, so no caller can observe a half-applied
//     merge.
// 4.  **Ordered sets**: Query results are `BTreeSet`s. When the merge engine picks
//     "any" member it takes the first, i.e. the oldest segment, which keeps runs
//     reproducible.
//
// Partition invariants held after every public call:
// - every coordinate maps to exactly one live segment;
// - the live segments are pairwise disjoint and together cover the grid;
// - each merge removes two live segments and adds one.

use crate::core_modules::coordinate::Coordinate;
use crate::core_modules::error::{Result, SegmentationError};
use crate::core_modules::pixel_grid::PixelGrid;
use crate::core_modules::segment::{MergeCost, Segment, SegmentId};
use log::trace;
use std::collections::{BTreeSet, HashMap};

/// Owns the pixel grid and the current partition of it into segments.
#[derive(Debug)]
pub struct SegmentationIndex {
    /// The immutable source raster for this run.
    grid: PixelGrid,
    /// Owning segment of each pixel, indexed by linear row-major position.
    membership: Vec<SegmentId>,
    /// Every live segment by identifier.
    live: HashMap<SegmentId, Segment>,
    /// Identifier handed to the next segment created by a merge.
    next_id: SegmentId,
}

impl SegmentationIndex {
    /// Populates the index with one singleton segment per pixel. Pixel `i` (row-major)
    /// starts in segment `i`.
    pub fn new(grid: PixelGrid) -> Self {
        let pixel_count = grid.pixel_count();
        let mut membership = Vec::with_capacity(pixel_count);
        let mut live = HashMap::with_capacity(pixel_count);

        for index in 0..pixel_count {
            let id = index as SegmentId;
            let coordinate = grid.coordinate_of(index);
            live.insert(id, Segment::singleton(id, coordinate, grid.color_at_index(index)));
            membership.push(id);
        }

        Self {
            grid,
            membership,
            live,
            next_id: pixel_count as SegmentId,
        }
    }

    pub fn grid(&self) -> &PixelGrid {
        &self.grid
    }

    pub fn segment_count(&self) -> usize {
        self.live.len()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.live.values()
    }

    /// Owning segment id of each pixel, row-major.
    pub fn labels(&self) -> &[SegmentId] {
        &self.membership
    }

    pub fn segment(&self, id: SegmentId) -> Result<&Segment> {
        self.live.get(&id).ok_or(SegmentationError::UnknownSegment(id))
    }

    pub fn contains_segment(&self, id: SegmentId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn segment_id_of(&self, coordinate: Coordinate) -> Result<SegmentId> {
        self.grid
            .index_of(coordinate)
            .map(|index| self.membership[index])
            .ok_or(SegmentationError::NotFound(coordinate))
    }

    pub fn segment_of(&self, coordinate: Coordinate) -> Result<&Segment> {
        let id = self.segment_id_of(coordinate)?;
        self.segment(id)
    }

    /// Distinct live segments sharing a 4-connected edge with segment `id`.
    pub fn neighbors_of(&self, id: SegmentId) -> Result<BTreeSet<SegmentId>> {
        let segment = self.segment(id)?;
        let mut neighbors = BTreeSet::new();

        for &coordinate in segment.pixels() {
            let index = self
                .grid
                .index_of(coordinate)
                .ok_or(SegmentationError::NotFound(coordinate))?;
            for neighbor in self.grid.neighbor_indices(index) {
                let owner = self.membership[neighbor];
                if owner != id {
                    neighbors.insert(owner);
                }
            }
        }

        Ok(neighbors)
    }

    /// Cost of merging two live segments.
    pub fn merge_cost(&self, first: SegmentId, second: SegmentId) -> Result<MergeCost> {
        self.segment(first)?.merge_cost(self.segment(second)?)
    }

    /// Every neighbor whose merge cost with `id` is at most `threshold`. This is the
    /// full set under the threshold, not only the cheapest neighbor.
    pub fn eligible_neighbors(&self, id: SegmentId, threshold: MergeCost) -> Result<BTreeSet<SegmentId>> {
        let segment = self.segment(id)?;
        let mut eligible = BTreeSet::new();
        for neighbor in self.neighbors_of(id)? {
            if segment.merge_cost(self.segment(neighbor)?)? <= threshold {
                eligible.insert(neighbor);
            }
        }
        Ok(eligible)
    }

    /// Keeps the candidates that also list `id` among their own eligible neighbors.
    pub fn mutual_eligible_neighbors(
        &self,
        id: SegmentId,
        candidates: BTreeSet<SegmentId>,
        threshold: MergeCost,
    ) -> Result<BTreeSet<SegmentId>> {
        let mut mutual = BTreeSet::new();
        for candidate in candidates {
            if self.eligible_neighbors(candidate, threshold)?.contains(&id) {
                mutual.insert(candidate);
            }
        }
        Ok(mutual)
    }

    /// Replaces two live segments with their union under a fresh identifier and
    /// returns that identifier.
    pub fn apply_merge(&mut self, first: SegmentId, second: SegmentId) -> Result<SegmentId> {
        // --- 1. Validation ---
        // Everything that can fail is checked before the partition is touched.
        if first == second {
            return Err(SegmentationError::InvalidState(format!(
                "segment #{first} cannot be merged with itself"
            )));
        }
        for id in [first, second] {
            if self.segment(id)?.is_empty() {
                return Err(SegmentationError::InvalidState(format!(
                    "live segment #{id} has no pixels"
                )));
            }
        }

        // --- 2. Replace ---
        let (Some(a), Some(b)) = (self.live.remove(&first), self.live.remove(&second)) else {
            return Err(SegmentationError::InvalidState(format!(
                "segments #{first} and #{second} vanished during merge"
            )));
        };
        let merged_id = self.next_id;
        self.next_id += 1;
        let merged = a.into_merged(b, merged_id)?;

        // --- 3. Remap membership ---
        for &coordinate in merged.pixels() {
            let index = self
                .grid
                .index_of(coordinate)
                .ok_or_else(|| {
                    SegmentationError::InvalidState(format!(
                        "segment #{merged_id} holds off-grid pixel {coordinate}"
                    ))
                })?;
            self.membership[index] = merged_id;
        }

        trace!(
            "merged #{first} + #{second} -> #{merged_id} ({} pixels, {} live)",
            merged.len(),
            self.live.len() + 1
        );
        self.live.insert(merged_id, merged);
        Ok(merged_id)
    }

    /// Checks the partition invariants, reporting the first violation as `InvalidState`.
    pub fn verify_partition(&self) -> Result<()> {
        let mut covered = 0usize;
        for (&id, segment) in &self.live {
            if segment.id() != id || segment.is_empty() {
                return Err(SegmentationError::InvalidState(format!(
                    "live entry #{id} holds segment #{} with {} pixels",
                    segment.id(),
                    segment.len()
                )));
            }
            for &coordinate in segment.pixels() {
                let owner = self.segment_id_of(coordinate)?;
                if owner != id {
                    return Err(SegmentationError::InvalidState(format!(
                        "pixel {coordinate} listed in #{id} but mapped to #{owner}"
                    )));
                }
            }
            covered += segment.len();
        }

        // Every listed pixel maps back to its lister, so equal totals mean no overlap and no gap.
        if covered != self.grid.pixel_count() {
            return Err(SegmentationError::InvalidState(format!(
                "live segments cover {covered} pixels of {}",
                self.grid.pixel_count()
            )));
        }
        if let Some(orphan) = self.membership.iter().find(|&id| !self.live.contains_key(id)) {
            return Err(SegmentationError::InvalidState(format!(
                "membership refers to dead segment #{orphan}"
            )));
        }
        Ok(())
    }
}
