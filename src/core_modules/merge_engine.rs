// THEORY:
// The `MergeEngine` decides, for one segment at a time, whether and with whom it
// merges. It is a stateless utility holding only its parameters: the cost
// threshold and the bound on how far it may chase one-sided preferences.
//
// The grow procedure on a segment `S`:
// 1.  **Eligible**: collect every neighbor of `S` whose merge cost is within the
//     threshold. None -> nothing to do.
// 2.  **Mutual**: keep the eligible neighbors that also consider `S` eligible.
// 3.  **Merge**: if a mutual partner exists, merge `S` with the first one.
// 4.  **Chase**: otherwise move on to an eligible neighbor and repeat from step 1
//     for that neighbor, looking for a mutual pair further along the chain.
//
// The chase does not shrink the partition, so on its own it has no reason to stop.
// It is run as a loop with a visited set: it only ever steps to a segment it has
// not seen in this attempt, and it gives up after `max_chase_steps` segments. A
// give-up is reported as `ChaseAbandoned`, which the driver treats as "no change
// here" before carrying on with the sweep.
//
// The engine talks to the partition through the `RegionGraph` trait, so the
// decision rule can be exercised against hand-built preference graphs.

use crate::core_modules::error::{Result, SegmentationError};
use crate::core_modules::segment::{MergeCost, SegmentId};
use crate::core_modules::segmentation_index::SegmentationIndex;
use log::{trace, warn};
use std::collections::{BTreeSet, HashSet};

pub const DEFAULT_MAX_CHASE_STEPS: usize = 64;

/// The queries and the single mutation the grow procedure needs from a partition.
pub trait RegionGraph {
    fn eligible_neighbors(&self, id: SegmentId, threshold: MergeCost) -> Result<BTreeSet<SegmentId>>;

    fn mutual_eligible_neighbors(
        &self,
        id: SegmentId,
        candidates: BTreeSet<SegmentId>,
        threshold: MergeCost,
    ) -> Result<BTreeSet<SegmentId>>;

    fn apply_merge(&mut self, first: SegmentId, second: SegmentId) -> Result<SegmentId>;
}

impl RegionGraph for SegmentationIndex {
    fn eligible_neighbors(&self, id: SegmentId, threshold: MergeCost) -> Result<BTreeSet<SegmentId>> {
        SegmentationIndex::eligible_neighbors(self, id, threshold)
    }

    fn mutual_eligible_neighbors(
        &self,
        id: SegmentId,
        candidates: BTreeSet<SegmentId>,
        threshold: MergeCost,
    ) -> Result<BTreeSet<SegmentId>> {
        SegmentationIndex::mutual_eligible_neighbors(self, id, candidates, threshold)
    }

    fn apply_merge(&mut self, first: SegmentId, second: SegmentId) -> Result<SegmentId> {
        SegmentationIndex::apply_merge(self, first, second)
    }
}

/// What a single grow attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowOutcome {
    /// `first` and `second` were replaced by `merged_into`.
    Merged {
        first: SegmentId,
        second: SegmentId,
        merged_into: SegmentId,
    },
    /// The segment reached had no neighbor within the threshold.
    NoEligibleNeighbor,
    /// The chase ran out of unvisited segments or hit its step bound.
    ChaseAbandoned,
}

impl GrowOutcome {
    pub fn is_change(&self) -> bool {
        matches!(self, GrowOutcome::Merged { .. })
    }
}

#[derive(Debug, Clone)]
pub struct MergeEngine {
    threshold: MergeCost,
    max_chase_steps: usize,
}

impl MergeEngine {
    pub fn new(threshold: MergeCost, max_chase_steps: usize) -> Result<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(SegmentationError::InvalidConfig(format!(
                "merge threshold must be a non-negative number, got {threshold}"
            )));
        }
        if max_chase_steps == 0 {
            return Err(SegmentationError::InvalidConfig(
                "the neighbor chase needs at least one step".to_string(),
            ));
        }
        Ok(Self {
            threshold,
            max_chase_steps,
        })
    }

    pub fn threshold(&self) -> MergeCost {
        self.threshold
    }

    pub fn max_chase_steps(&self) -> usize {
        self.max_chase_steps
    }

    /// Runs the grow procedure starting at segment `start`.
    pub fn grow<G: RegionGraph>(&self, graph: &mut G, start: SegmentId) -> Result<GrowOutcome> {
        let mut current = start;
        let mut visited = HashSet::new();

        loop {
            visited.insert(current);

            let eligible = graph.eligible_neighbors(current, self.threshold)?;
            if eligible.is_empty() {
                return Ok(GrowOutcome::NoEligibleNeighbor);
            }

            let mutual = graph.mutual_eligible_neighbors(current, eligible.clone(), self.threshold)?;
            if let Some(&partner) = mutual.first() {
                let merged_into = graph.apply_merge(current, partner)?;
                return Ok(GrowOutcome::Merged {
                    first: current,
                    second: partner,
                    merged_into,
                });
            }

            if visited.len() >= self.max_chase_steps {
                warn!(
                    "neighbor chase from #{start} gave up after {} segments",
                    visited.len()
                );
                return Ok(GrowOutcome::ChaseAbandoned);
            }

            match eligible.into_iter().find(|id| !visited.contains(id)) {
                Some(next) => {
                    trace!("no mutual partner for #{current}, chasing #{next}");
                    current = next;
                }
                None => {
                    warn!("neighbor chase from #{start} looped back at #{current}");
                    return Ok(GrowOutcome::ChaseAbandoned);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::coordinate::Coordinate;
    use crate::core_modules::pixel_grid::PixelGrid;
    use std::collections::HashMap;

    /// One-sided preferences: `prefers[a]` are the segments `a` finds eligible.
    struct PreferenceGraph {
        prefers: HashMap<SegmentId, BTreeSet<SegmentId>>,
        merges: Vec<(SegmentId, SegmentId)>,
    }

    impl PreferenceGraph {
        fn new(edges: &[(SegmentId, SegmentId)]) -> Self {
            let mut prefers: HashMap<SegmentId, BTreeSet<SegmentId>> = HashMap::new();
            for &(from, to) in edges {
                prefers.entry(from).or_default().insert(to);
            }
            Self {
                prefers,
                merges: Vec::new(),
            }
        }
    }

    impl RegionGraph for PreferenceGraph {
        fn eligible_neighbors(&self, id: SegmentId, _: MergeCost) -> Result<BTreeSet<SegmentId>> {
            Ok(self.prefers.get(&id).cloned().unwrap_or_default())
        }

        fn mutual_eligible_neighbors(
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

        fn apply_merge(&mut self, first: SegmentId, second: SegmentId) -> Result<SegmentId> {
            self.merges.push((first, second));
            Ok(100 + self.merges.len() as SegmentId)
        }
    }

    fn engine() -> MergeEngine {
        MergeEngine::new(10.0, DEFAULT_MAX_CHASE_STEPS).unwrap()
    }

    #[test]
    fn isolated_segment_reports_no_change() {
        let grid = PixelGrid::new(1, 1, vec![0, 80, 160, 240]).unwrap();
        let mut index = SegmentationIndex::new(grid);

        let outcome = engine().grow(&mut index, 0).unwrap();
        assert_eq!(outcome, GrowOutcome::NoEligibleNeighbor);
        assert!(!outcome.is_change());
        assert_eq!(index.segment_count(), 4);
        index.verify_partition().unwrap();
    }

    #[test]
    fn mutual_pair_merges_with_lowest_id_partner() {
        let grid = PixelGrid::new(1, 1, vec![5, 5, 5, 240]).unwrap();
        let mut index = SegmentationIndex::new(grid);

        let outcome = engine().grow(&mut index, 0).unwrap();
        assert_eq!(
            outcome,
            GrowOutcome::Merged {
                first: 0,
                second: 1,
                merged_into: 4
            }
        );
        assert_eq!(index.segment_count(), 3);
        assert_eq!(index.segment_id_of(Coordinate::new(1, 0)).unwrap(), 4);
        index.verify_partition().unwrap();
    }

    #[test]
    fn chase_finds_mutual_pair_down_the_chain() {
        // 1 -> 2 -> 3 <-> 4
        let mut graph = PreferenceGraph::new(&[(1, 2), (2, 3), (3, 4), (4, 3)]);
        let outcome = engine().grow(&mut graph, 1).unwrap();
        assert!(outcome.is_change());
        assert_eq!(graph.merges, vec![(3, 4)]);
    }

    #[test]
    fn chase_around_a_cycle_is_abandoned() {
        // 1 -> 2 -> 3 -> 1, nobody reciprocates.
        let mut graph = PreferenceGraph::new(&[(1, 2), (2, 3), (3, 1)]);
        let outcome = engine().grow(&mut graph, 1).unwrap();
        assert_eq!(outcome, GrowOutcome::ChaseAbandoned);
        assert!(graph.merges.is_empty());
    }

    #[test]
    fn chase_respects_step_bound() {
        let edges: Vec<_> = (0..20).map(|i| (i, i + 1)).chain([(21, 20), (20, 21)]).collect();
        let mut graph = PreferenceGraph::new(&edges);

        let short = MergeEngine::new(1.0, 5).unwrap();
        assert_eq!(short.grow(&mut graph, 0).unwrap(), GrowOutcome::ChaseAbandoned);

        let long = MergeEngine::new(1.0, 32).unwrap();
        assert!(long.grow(&mut graph, 0).unwrap().is_change());
        assert_eq!(graph.merges, vec![(20, 21)]);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(matches!(MergeEngine::new(-1.0, 4), Err(SegmentationError::InvalidConfig(_))));
        assert!(matches!(MergeEngine::new(f64::NAN, 4), Err(SegmentationError::InvalidConfig(_))));
        assert!(matches!(MergeEngine::new(1.0, 0), Err(SegmentationError::InvalidConfig(_))));
    }
}
