// THEORY:
// The overlay step turns a finished partition into something a person can look at.
// It is a per-pixel comparison against already-computed memberships: a pixel is a
// boundary pixel when it sits on the outer border of the grid, or when any of its
// 4-connected neighbors belongs to a different segment. Everything else shows the
// original color. Painting is left to `image_helper`; this module only classifies.

use crate::core_modules::segmentation_index::SegmentationIndex;

/// Row-major flags, `true` where a boundary should be drawn.
pub fn boundary_mask(index: &SegmentationIndex) -> Vec<bool> {
    let grid = index.grid();
    let labels = index.labels();
    let last = grid.side() - 1;

    (0..grid.pixel_count())
        .map(|pixel| {
            let coordinate = grid.coordinate_of(pixel);
            let on_border =
                coordinate.x == 0 || coordinate.y == 0 || coordinate.x == last || coordinate.y == last;
            on_border
                || grid
                    .neighbor_indices(pixel)
                    .any(|neighbor| labels[neighbor] != labels[pixel])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel_grid::PixelGrid;

    #[test]
    fn unsegmented_interior_is_all_boundary() {
        let grid = PixelGrid::new(2, 1, vec![0; 16]).unwrap();
        let index = SegmentationIndex::new(grid);
        assert!(boundary_mask(&index).into_iter().all(|flag| flag));
    }

    #[test]
    fn single_region_marks_only_the_border() {
        let grid = PixelGrid::new(2, 1, vec![0; 16]).unwrap();
        let mut index = SegmentationIndex::new(grid);
        let mut survivor = 0;
        for other in 1..16 {
            survivor = index.apply_merge(survivor, other).unwrap();
        }

        let mask = boundary_mask(&index);
        let interior = [5, 6, 9, 10];
        for (pixel, flag) in mask.iter().enumerate() {
            assert_eq!(*flag, !interior.contains(&pixel), "pixel {pixel}");
        }
    }
}
