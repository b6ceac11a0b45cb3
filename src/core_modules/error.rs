// THEORY:
// Every failure the segmentation engine can report lives in one enum. The
// variants split into two families:
//
// 1.  **Caller errors** (`OutOfBounds`, `NotFound`, `UnknownSegment`,
//     `InvalidInput`, `InvalidConfig`): a query or an input that does not fit
//     the grid. These are never retried; they are handed back to whoever asked.
// 2.  **Corruption** (`InvalidState`): statistics or merges on an empty segment.
//     Under the partition invariants this cannot happen, so seeing it means the
//     run is broken and must be aborted.
//
// Codec failures from the `image` crate and worker-pool channel failures are
// wrapped so the whole crate speaks a single `Result` type.

use crate::core_modules::coordinate::Coordinate;
use crate::core_modules::segment::SegmentId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error("coordinate {0} lies outside the pixel grid")]
    OutOfBounds(Coordinate),
    #[error("no segment owns coordinate {0}")]
    NotFound(Coordinate),
    #[error("segment #{0} is not live in the index")]
    UnknownSegment(SegmentId),
    #[error("invalid segment state: {0}")]
    InvalidState(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("worker pool failure: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, SegmentationError>;
