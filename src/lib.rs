// THEORY:
// This file is the main entry point for the `region_segmenter` library crate.
// It exports the `SegmentationPipeline` and its associated data structures
// (`SegmentationConfig`, `Segmentation`, `SegmentationReport`) as the high-level
// interface of the engine, plus the `ParallelSegmenter` for batches of images.
//
// The building blocks live in `core_modules`, leaves first:
// - `pixel_grid`: the immutable `2^N x 2^N` raster and its 4-connectivity;
// - `segment`: regions with running per-band statistics and the merge cost;
// - `segmentation_index`: the live partition with O(1) pixel -> segment lookup;
// - `merge_engine`: the mutual-best-neighbor decision rule and bounded chase;
// - `traversal`, `overlay`, `utils::image_helper`: visit orders, boundary
//   classification and codec glue.

pub mod core_modules;
pub mod parallel_pipeline;
pub mod pipeline;
