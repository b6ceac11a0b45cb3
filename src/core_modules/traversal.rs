// THEORY:
// The sweep driver visits every coordinate once per sweep, and the order matters:
// a merge changes adjacency for every coordinate visited after it in the same
// sweep. The order is therefore part of the configuration, and it must be exactly
// the same on every sweep so that a run is reproducible.
//
// `Dither` is the default. It is the ordered-dither (Bayer) visiting order: at every
// scale the four cells of a 2x2 block are visited in Bayer rank order
// `(0,0) (1,1) (1,0) (0,1)`, with the finest scale varying slowest. Consecutive
// visits land far apart, so early merges are spread over the whole image instead
// of growing one region along the first row.

use crate::core_modules::coordinate::Coordinate;

/// Deterministic coordinate visiting order for one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalOrder {
    /// Left to right, top to bottom.
    RowMajor,
    /// Top to bottom, left to right.
    ColumnMajor,
    /// Ordered-dither (Bayer) order.
    #[default]
    Dither,
}

impl TraversalOrder {
    /// Every coordinate of a `2^order x 2^order` grid exactly once.
    pub fn coordinates(self, order: u32) -> Vec<Coordinate> {
        let side = 1u32 << order;
        let pixel_count = side as usize * side as usize;
        match self {
            TraversalOrder::RowMajor => (0..side)
                .flat_map(|y| (0..side).map(move |x| Coordinate::new(x, y)))
                .collect(),
            TraversalOrder::ColumnMajor => (0..side)
                .flat_map(|x| (0..side).map(move |y| Coordinate::new(x, y)))
                .collect(),
            TraversalOrder::Dither => (0..pixel_count as u64)
                .map(|rank| bayer_coordinate(rank, order))
                .collect(),
        }
    }
}

/// Position of the `rank`-th cell in a `2^order` Bayer matrix.
fn bayer_coordinate(rank: u64, order: u32) -> Coordinate {
    let (mut x, mut y) = (0u32, 0u32);
    for level in 0..order {
        let low = ((rank >> (2 * level)) & 1) as u32;
        let high = ((rank >> (2 * level + 1)) & 1) as u32;
        // Rank pair 0,1,2,3 -> cell (0,0),(1,1),(1,0),(0,1).
        let shift = order - 1 - level;
        x |= (low ^ high) << shift;
        y |= low << shift;
    }
    Coordinate::new(x, y)
}
