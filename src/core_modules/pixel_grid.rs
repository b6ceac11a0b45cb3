// THEORY:
// The `PixelGrid` is the immutable foundation of the segmentation engine. It is a
// "dumb" data container: one fixed-length color vector per coordinate of a square
// `2^N x 2^N` raster, plus the geometry needed to walk that raster.
//
// Key architectural principles:
// 1.  **Owned, not global**: Each run owns exactly one grid. It is handed to the
//     `SegmentationIndex` at construction and never mutated afterwards.
// 2.  **Flat storage**: Channels are stored in a single row-major `Vec<Channel>`
//     (`bands` values per pixel). A coordinate maps to a linear pixel index with
//     one multiply and one add, which is what the index uses on its hot path.
// 3.  **4-connectivity**: Neighbors are the cells directly left, right, above and
//     below, clipped at the border. Corners have 2, edges 3, interior cells 4.

use crate::core_modules::coordinate::Coordinate;
use crate::core_modules::error::{Result, SegmentationError};

pub type Channel = u8;
pub type ColorVector = Vec<Channel>;

/// Largest supported grid order. `4^order` pixel indices must fit comfortably in memory.
pub const MAX_ORDER: u32 = 15;

/// An immutable `2^order x 2^order` raster of color vectors.
#[derive(Debug, Clone)]
pub struct PixelGrid {
    /// The grid side is `2^order`.
    order: u32,
    /// Cached `1 << order`.
    side: u32,
    /// Number of channels per pixel (3 for RGB).
    bands: usize,
    /// Row-major channel values, `bands` per pixel.
    channels: Vec<Channel>,
}

impl PixelGrid {
    /// Builds a grid from a flat row-major buffer holding exactly `bands` values per pixel.
    pub fn new(order: u32, bands: usize, channels: Vec<Channel>) -> Result<Self> {
        let side = Self::side_for(order)?;
        if bands == 0 {
            return Err(SegmentationError::InvalidInput(
                "a pixel needs at least one color band".to_string(),
            ));
        }

        let expected = side as usize * side as usize * bands;
        if channels.len() != expected {
            return Err(SegmentationError::InvalidInput(format!(
                "pixel source holds {} channel values, a {side}x{side} grid with {bands} bands needs {expected}",
                channels.len()
            )));
        }

        Ok(Self {
            order,
            side,
            bands,
            channels,
        })
    }

    /// Builds a grid by asking `color` for the vector of every coordinate, row by row.
    pub fn from_fn<F>(order: u32, bands: usize, mut color: F) -> Result<Self>
    where
        F: FnMut(Coordinate) -> ColorVector,
    {
        let side = Self::side_for(order)?;
        let mut channels = Vec::with_capacity(side as usize * side as usize * bands);
        for y in 0..side {
            for x in 0..side {
                let coordinate = Coordinate::new(x, y);
                let vector = color(coordinate);
                if vector.len() != bands {
                    return Err(SegmentationError::InvalidInput(format!(
                        "pixel {coordinate} has {} bands, expected {bands}",
                        vector.len()
                    )));
                }
                channels.extend_from_slice(&vector);
            }
        }
        Self::new(order, bands, channels)
    }

    fn side_for(order: u32) -> Result<u32> {
        if order > MAX_ORDER {
            return Err(SegmentationError::InvalidConfig(format!(
                "grid order {order} exceeds the supported maximum of {MAX_ORDER}"
            )));
        }
        Ok(1u32 << order)
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn pixel_count(&self) -> usize {
        self.side as usize * self.side as usize
    }

    pub fn contains(&self, coordinate: Coordinate) -> bool {
        coordinate.x < self.side && coordinate.y < self.side
    }

    /// Linear row-major index of an in-bounds coordinate.
    pub fn index_of(&self, coordinate: Coordinate) -> Option<usize> {
        self.contains(coordinate)
            .then(|| coordinate.y as usize * self.side as usize + coordinate.x as usize)
    }

    pub fn coordinate_of(&self, index: usize) -> Coordinate {
        let side = self.side as usize;
        Coordinate::new((index % side) as u32, (index / side) as u32)
    }

    /// The color vector stored at `coordinate`.
    pub fn color_at(&self, coordinate: Coordinate) -> Result<&[Channel]> {
        let index = self
            .index_of(coordinate)
            .ok_or(SegmentationError::OutOfBounds(coordinate))?;
        Ok(self.color_at_index(index))
    }

    pub(crate) fn color_at_index(&self, index: usize) -> &[Channel] {
        let start = index * self.bands;
        &self.channels[start..start + self.bands]
    }

    /// The in-bounds 4-connected neighbors of `coordinate`: left, right, up, down.
    pub fn neighbors_of(&self, coordinate: Coordinate) -> Result<Vec<Coordinate>> {
        let index = self
            .index_of(coordinate)
            .ok_or(SegmentationError::OutOfBounds(coordinate))?;
        Ok(self
            .neighbor_indices(index)
            .map(|neighbor| self.coordinate_of(neighbor))
            .collect())
    }

    pub(crate) fn neighbor_indices(&self, index: usize) -> impl Iterator<Item = usize> + use<> {
        let side = self.side as usize;
        let (x, y) = (index % side, index / side);
        [
            (x > 0).then(|| index - 1),
            (x + 1 < side).then(|| index + 1),
            (y > 0).then(|| index - side),
            (y + 1 < side).then(|| index + side),
        ]
        .into_iter()
        .flatten()
    }

    /// Every coordinate in row-major order.
    pub fn coordinates(&self) -> impl Iterator<Item = Coordinate> + '_ {
        (0..self.pixel_count()).map(|index| self.coordinate_of(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_grid(order: u32) -> PixelGrid {
        PixelGrid::from_fn(order, 3, |c| vec![c.x as u8, c.y as u8, 7]).expect("valid grid")
    }

    #[test]
    fn color_at_reads_row_major_storage() {
        let grid = gradient_grid(2);
        assert_eq!(grid.side(), 4);
        assert_eq!(grid.pixel_count(), 16);
        assert_eq!(grid.color_at(Coordinate::new(3, 1)).unwrap(), &[3, 1, 7]);
        assert_eq!(grid.color_at(Coordinate::new(0, 2)).unwrap(), &[0, 2, 7]);
    }

    #[test]
    fn color_at_outside_grid_is_out_of_bounds() {
        let grid = gradient_grid(1);
        let result = grid.color_at(Coordinate::new(2, 0));
        assert!(matches!(result, Err(SegmentationError::OutOfBounds(c)) if c == Coordinate::new(2, 0)));
    }

    #[test]
    fn neighbor_counts_follow_position() {
        let grid = gradient_grid(2);

        let corner = grid.neighbors_of(Coordinate::new(0, 0)).unwrap();
        assert_eq!(corner, vec![Coordinate::new(1, 0), Coordinate::new(0, 1)]);

        let edge = grid.neighbors_of(Coordinate::new(3, 2)).unwrap();
        assert_eq!(edge.len(), 3);
        assert!(edge.contains(&Coordinate::new(2, 2)));
        assert!(edge.contains(&Coordinate::new(3, 1)));
        assert!(edge.contains(&Coordinate::new(3, 3)));

        let interior = grid.neighbors_of(Coordinate::new(1, 2)).unwrap();
        assert_eq!(
            interior,
            vec![
                Coordinate::new(0, 2),
                Coordinate::new(2, 2),
                Coordinate::new(1, 1),
                Coordinate::new(1, 3),
            ]
        );
    }

    #[test]
    fn single_pixel_grid_has_no_neighbors() {
        let grid = gradient_grid(0);
        assert!(grid.neighbors_of(Coordinate::new(0, 0)).unwrap().is_empty());
    }

    #[test]
    fn short_buffer_is_invalid_input() {
        let result = PixelGrid::new(1, 3, vec![0; 11]);
        assert!(matches!(result, Err(SegmentationError::InvalidInput(_))));
    }

    #[test]
    fn oversized_order_is_rejected() {
        let result = PixelGrid::new(MAX_ORDER + 1, 1, Vec::new());
        assert!(matches!(result, Err(SegmentationError::InvalidConfig(_))));
    }

    #[test]
    fn mismatched_band_count_is_invalid_input() {
        let result = PixelGrid::from_fn(1, 3, |c| if c.x == 1 { vec![1, 2] } else { vec![1, 2, 3] });
        assert!(matches!(result, Err(SegmentationError::InvalidInput(_))));
    }
}
