// THEORY:
// The `pipeline` module is the top-level API of the segmentation engine. It wires
// the grid, the index and the merge engine together and drives them to a fixed
// point:
//
//     repeat
//         for each coordinate in the configured traversal order
//             grow the segment that currently owns it
//     until a whole sweep performs no merge
//
// Every step is sequential. A merge rewrites memberships that later lookups in the
// same sweep depend on, so the order of visits decides which merges happen. The
// visit order is computed once per pipeline and reused on every sweep.
//
// The run always terminates: each merge removes one live segment, and a sweep
// without merges ends the loop. Chases that give up are counted but do not keep
// the loop alive.

use crate::core_modules::coordinate::Coordinate;
use crate::core_modules::error::{Result, SegmentationError};
use crate::core_modules::merge_engine::{DEFAULT_MAX_CHASE_STEPS, MergeEngine};
use crate::core_modules::pixel_grid::{MAX_ORDER, PixelGrid};
use crate::core_modules::segment::{MergeCost, Segment};
use crate::core_modules::segmentation_index::SegmentationIndex;
use crate::core_modules::utils::image_helper;
use image::{DynamicImage, RgbImage};
use log::{debug, info};

// Re-export key data structures for the public API.
pub use crate::core_modules::merge_engine::GrowOutcome;
pub use crate::core_modules::segment::SegmentId;
pub use crate::core_modules::traversal::TraversalOrder;

pub const DEFAULT_ORDER: u32 = 5;
pub const DEFAULT_THRESHOLD: MergeCost = 800.0;

/// Configuration for the SegmentationPipeline.
#[derive(Debug, Clone)]
pub struct SegmentationConfig {
    /// The grid side is `2^order` pixels.
    pub order: u32,
    /// Largest merge cost at which two neighbors still count as compatible.
    pub threshold: MergeCost,
    /// Visit order used by every sweep.
    pub traversal: TraversalOrder,
    /// How many segments one neighbor chase may visit before giving up.
    pub max_chase_steps: usize,
    /// Optional hard cap on sweeps. `None` runs to the fixed point.
    pub max_sweeps: Option<usize>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            threshold: DEFAULT_THRESHOLD,
            traversal: TraversalOrder::default(),
            max_chase_steps: DEFAULT_MAX_CHASE_STEPS,
            max_sweeps: None,
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.order > MAX_ORDER {
            return Err(SegmentationError::InvalidConfig(format!(
                "grid order {} exceeds the supported maximum of {MAX_ORDER}",
                self.order
            )));
        }
        if self.max_sweeps == Some(0) {
            return Err(SegmentationError::InvalidConfig(
                "max_sweeps must allow at least one sweep".to_string(),
            ));
        }
        MergeEngine::new(self.threshold, self.max_chase_steps).map(|_| ())
    }
}

/// Counters for a single sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub merges: usize,
    pub abandoned_chases: usize,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationReport {
    pub sweeps: usize,
    pub merges: usize,
    pub abandoned_chases: usize,
    pub initial_segments: usize,
    pub final_segments: usize,
    /// `false` only when `max_sweeps` stopped the run before a merge-free sweep.
    pub converged: bool,
}

/// The final partition of a run plus its report.
#[derive(Debug)]
pub struct Segmentation {
    index: SegmentationIndex,
    report: SegmentationReport,
}

impl Segmentation {
    pub fn index(&self) -> &SegmentationIndex {
        &self.index
    }

    pub fn report(&self) -> &SegmentationReport {
        &self.report
    }

    pub fn segment_count(&self) -> usize {
        self.index.segment_count()
    }

    pub fn segment_of(&self, coordinate: Coordinate) -> Result<&Segment> {
        self.index.segment_of(coordinate)
    }

    /// Owning segment id of each pixel, row-major.
    pub fn labels(&self) -> &[SegmentId] {
        self.index.labels()
    }

    pub fn overlay(&self) -> Result<RgbImage> {
        image_helper::render_overlay(&self.index)
    }

    pub fn into_index(self) -> SegmentationIndex {
        self.index
    }
}

/// The main, top-level struct for the segmentation engine.
#[derive(Debug)]
pub struct SegmentationPipeline {
    config: SegmentationConfig,
    engine: MergeEngine,
    visit_order: Vec<Coordinate>,
}

impl SegmentationPipeline {
    pub fn new(config: SegmentationConfig) -> Result<Self> {
        config.validate()?;
        let engine = MergeEngine::new(config.threshold, config.max_chase_steps)?;
        let visit_order = config.traversal.coordinates(config.order);
        Ok(Self {
            config,
            engine,
            visit_order,
        })
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Reads the top-left `2^order` square of a decoded image and segments it.
    pub fn segment_image(&self, image: &DynamicImage) -> Result<Segmentation> {
        let grid = image_helper::grid_from_image(image, self.config.order)?;
        self.segment(grid)
    }

    /// Runs sweeps over `grid` until one of them performs no merge.
    pub fn segment(&self, grid: PixelGrid) -> Result<Segmentation> {
        if grid.order() != self.config.order {
            return Err(SegmentationError::InvalidInput(format!(
                "pipeline expects a {0}x{0} grid, got {1}x{1}",
                1u32 << self.config.order,
                grid.side()
            )));
        }

        let mut index = SegmentationIndex::new(grid);
        let initial_segments = index.segment_count();
        info!(
            "segmenting {0}x{0} grid, threshold {1}, {2:?} order",
            index.grid().side(),
            self.config.threshold,
            self.config.traversal
        );

        let mut report = SegmentationReport {
            sweeps: 0,
            merges: 0,
            abandoned_chases: 0,
            initial_segments,
            final_segments: initial_segments,
            converged: false,
        };

        loop {
            if self.config.max_sweeps.is_some_and(|max| report.sweeps >= max) {
                info!("stopping after {} sweeps without reaching a fixed point", report.sweeps);
                break;
            }

            let summary = self.sweep(&mut index)?;
            report.sweeps += 1;
            report.merges += summary.merges;
            report.abandoned_chases += summary.abandoned_chases;
            debug!(
                "sweep {}: {} merges, {} abandoned chases, {} segments left",
                report.sweeps,
                summary.merges,
                summary.abandoned_chases,
                index.segment_count()
            );

            if summary.merges == 0 {
                report.converged = true;
                break;
            }
        }

        if cfg!(debug_assertions) {
            index.verify_partition()?;
        }

        report.final_segments = index.segment_count();
        info!(
            "segmentation finished: {} segments after {} sweeps and {} merges",
            report.final_segments, report.sweeps, report.merges
        );
        Ok(Segmentation { index, report })
    }

    /// One pass over every coordinate in the configured order.
    pub fn sweep(&self, index: &mut SegmentationIndex) -> Result<SweepSummary> {
        let mut summary = SweepSummary::default();
        for &coordinate in &self.visit_order {
            let segment = index.segment_id_of(coordinate)?;
            match self.engine.grow(index, segment)? {
                GrowOutcome::Merged { .. } => summary.merges += 1,
                GrowOutcome::ChaseAbandoned => summary.abandoned_chases += 1,
                GrowOutcome::NoEligibleNeighbor => {}
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(order: u32, threshold: MergeCost) -> SegmentationConfig {
        SegmentationConfig {
            order,
            threshold,
            ..SegmentationConfig::default()
        }
    }

    #[test_log::test]
    fn identical_pixels_collapse_into_one_segment() {
        let pipeline = SegmentationPipeline::new(config(1, 0.0)).unwrap();
        let grid = PixelGrid::new(1, 3, vec![42; 12]).unwrap();

        let segmentation = pipeline.segment(grid).unwrap();
        assert_eq!(segmentation.segment_count(), 1);
        assert_eq!(segmentation.report().merges, 3);
        assert!(segmentation.report().converged);

        let segment = segmentation.segment_of(Coordinate::new(1, 1)).unwrap();
        assert_eq!(segment.len(), 4);
        assert!(segmentation.labels().iter().all(|&id| id == segment.id()));
    }

    #[test]
    fn nothing_merges_under_a_zero_threshold_on_distinct_colors() {
        let pipeline = SegmentationPipeline::new(config(1, 0.0)).unwrap();
        let grid = PixelGrid::new(1, 1, vec![0, 50, 100, 150]).unwrap();

        let segmentation = pipeline.segment(grid).unwrap();
        assert_eq!(segmentation.segment_count(), 4);
        assert_eq!(segmentation.report().sweeps, 1);
        assert_eq!(segmentation.report().merges, 0);
    }

    #[test]
    fn sweep_cap_stops_early() {
        let mut capped = config(2, 1.0e9);
        capped.max_sweeps = Some(1);
        capped.traversal = TraversalOrder::RowMajor;
        let pipeline = SegmentationPipeline::new(capped).unwrap();
        let grid = PixelGrid::from_fn(2, 1, |c| vec![(c.x * 60 + c.y) as u8]).unwrap();

        let segmentation = pipeline.segment(grid).unwrap();
        assert_eq!(segmentation.report().sweeps, 1);
        assert!(!segmentation.report().converged);
        assert!(segmentation.report().merges > 0);
    }

    #[test]
    fn grid_of_wrong_order_is_invalid_input() {
        let pipeline = SegmentationPipeline::new(config(2, 10.0)).unwrap();
        let grid = PixelGrid::new(1, 1, vec![0; 4]).unwrap();
        assert!(matches!(pipeline.segment(grid), Err(SegmentationError::InvalidInput(_))));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert!(SegmentationPipeline::new(config(MAX_ORDER + 1, 1.0)).is_err());
        assert!(SegmentationPipeline::new(config(2, -0.5)).is_err());
        let mut no_sweeps = config(2, 1.0);
        no_sweeps.max_sweeps = Some(0);
        assert!(matches!(no_sweeps.validate(), Err(SegmentationError::InvalidConfig(_))));
    }
}
