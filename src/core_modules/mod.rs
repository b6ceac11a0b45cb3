pub mod coordinate;
pub mod error;
pub mod merge_engine;
pub mod overlay;
pub mod pixel_grid;
pub mod segment;
pub mod segmentation_index;
pub mod traversal;
pub mod utils;
