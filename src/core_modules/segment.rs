// THEORY:
// A `Segment` is a region of the grid treated as one statistical unit. It is the
// spatial counterpart of a blob: a set of coordinates plus a summary of the colors
// found there.
//
// Key architectural principles:
// 1.  **Identity, not structure**: Two segments are equal when their identifiers
//     match. A merge always produces a fresh identifier, so a segment that has been
//     consumed can never be confused with the one that replaced it.
// 2.  **Running aggregates**: Instead of re-reading every member color on each cost
//     query, a segment carries per-band integer sums and sums of squares
//     (`BandStatistics`). A merge adds them; nothing is recomputed. Because the
//     channels are integers the aggregates are exact, so the result is identical to
//     a full recomputation from the member colors.
// 3.  **Purity**: `merge` and `merge_cost` never mutate their operands. The cost of
//     a candidate merge is evaluated from the combined aggregates alone, without
//     building the merged coordinate list.
//
// The merge cost is the increase in size-weighted dispersion:
//
//     cost = sum over bands of  sd(m) * |m| - (sd(a) * |a| + sd(b) * |b|)
//
// With population statistics `sd * n == sqrt(n * sum_sq - sum^2)`, which is what
// `weighted_standard_deviation` computes. The pair of operand terms is added
// before subtracting so that `cost(a, b)` and `cost(b, a)` are bit-for-bit equal.

use crate::core_modules::coordinate::Coordinate;
use crate::core_modules::error::{Result, SegmentationError};
use crate::core_modules::pixel_grid::Channel;
use std::hash::{Hash, Hasher};

pub type SegmentId = u64;
pub type StandardDeviation = f64;
pub type MergeCost = f64;

/// Per-band running aggregates of the colors in a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandStatistics {
    count: u64,
    sums: Vec<u64>,
    sums_of_squares: Vec<u64>,
}

impl BandStatistics {
    pub fn new(bands: usize) -> Self {
        Self {
            count: 0,
            sums: vec![0; bands],
            sums_of_squares: vec![0; bands],
        }
    }

    pub fn push(&mut self, color: &[Channel]) {
        debug_assert_eq!(color.len(), self.sums.len());
        for ((sum, sum_sq), &channel) in self
            .sums
            .iter_mut()
            .zip(self.sums_of_squares.iter_mut())
            .zip(color)
        {
            let value = channel as u64;
            *sum += value;
            *sum_sq += value * value;
        }
        self.count += 1;
    }

    /// Aggregates of the union of two disjoint pixel sets.
    pub fn combined(&self, other: &BandStatistics) -> Result<BandStatistics> {
        if self.sums.len() != other.sums.len() {
            return Err(SegmentationError::InvalidState(format!(
                "cannot combine statistics over {} and {} bands",
                self.sums.len(),
                other.sums.len()
            )));
        }
        Ok(Self {
            count: self.count + other.count,
            sums: self.sums.iter().zip(&other.sums).map(|(a, b)| a + b).collect(),
            sums_of_squares: self
                .sums_of_squares
                .iter()
                .zip(&other.sums_of_squares)
                .map(|(a, b)| a + b)
                .collect(),
        })
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn bands(&self) -> usize {
        self.sums.len()
    }

    pub fn mean(&self) -> Result<Vec<f64>> {
        self.ensure_populated()?;
        Ok(self
            .sums
            .iter()
            .map(|&sum| sum as f64 / self.count as f64)
            .collect())
    }

    /// Per-band population standard deviation.
    pub fn standard_deviation(&self) -> Result<Vec<StandardDeviation>> {
        self.ensure_populated()?;
        Ok(self
            .weighted_standard_deviation()
            .map(|weighted| weighted / self.count as f64)
            .collect())
    }

    /// Per-band `sd * count`, evaluated as `sqrt(count * sum_sq - sum^2)`.
    fn weighted_standard_deviation(&self) -> impl Iterator<Item = f64> + '_ {
        let count = self.count as u128;
        self.sums
            .iter()
            .zip(&self.sums_of_squares)
            .map(move |(&sum, &sum_sq)| {
                let sum = sum as u128;
                // Cauchy-Schwarz keeps this non-negative for exact integer aggregates.
                let numerator = count * sum_sq as u128 - sum * sum;
                (numerator as f64).sqrt()
            })
    }

    fn ensure_populated(&self) -> Result<()> {
        if self.count == 0 {
            return Err(SegmentationError::InvalidState(
                "statistics requested for an empty segment".to_string(),
            ));
        }
        Ok(())
    }
}

/// An identified set of grid coordinates plus cached color statistics.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Stable identifier assigned at creation. Equality and hashing use only this.
    id: SegmentId,
    /// Member coordinates. Disjoint from every other live segment.
    pixels: Vec<Coordinate>,
    /// Running per-band aggregates of the member colors.
    statistics: BandStatistics,
}

impl Segment {
    /// An empty segment. Only useful as a starting point for `push`.
    pub fn new(id: SegmentId, bands: usize) -> Self {
        Self {
            id,
            pixels: Vec::new(),
            statistics: BandStatistics::new(bands),
        }
    }

    pub fn singleton(id: SegmentId, coordinate: Coordinate, color: &[Channel]) -> Self {
        let mut segment = Self::new(id, color.len());
        segment.push(coordinate, color);
        segment
    }

    pub fn from_pixels<'a, I>(id: SegmentId, bands: usize, pixels: I) -> Self
    where
        I: IntoIterator<Item = (Coordinate, &'a [Channel])>,
    {
        let mut segment = Self::new(id, bands);
        for (coordinate, color) in pixels {
            segment.push(coordinate, color);
        }
        segment
    }

    pub fn push(&mut self, coordinate: Coordinate, color: &[Channel]) {
        self.pixels.push(coordinate);
        self.statistics.push(color);
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn pixels(&self) -> &[Coordinate] {
        &self.pixels
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn statistics(&self) -> &BandStatistics {
        &self.statistics
    }

    pub fn standard_deviation(&self) -> Result<Vec<StandardDeviation>> {
        self.statistics.standard_deviation()
    }

    /// A new segment holding the pixels of both operands. Neither operand changes.
    pub fn merge(&self, other: &Segment, id: SegmentId) -> Result<Segment> {
        let statistics = self.merged_statistics(other)?;
        let mut pixels = Vec::with_capacity(self.len() + other.len());
        pixels.extend_from_slice(&self.pixels);
        pixels.extend_from_slice(&other.pixels);
        Ok(Segment {
            id,
            pixels,
            statistics,
        })
    }

    /// Same result as `merge`, reusing the operands' storage.
    pub(crate) fn into_merged(self, other: Segment, id: SegmentId) -> Result<Segment> {
        let statistics = self.merged_statistics(&other)?;
        let mut pixels = self.pixels;
        pixels.extend(other.pixels);
        Ok(Segment {
            id,
            pixels,
            statistics,
        })
    }

    /// Increase in size-weighted standard deviation caused by merging `self` with `other`.
    pub fn merge_cost(&self, other: &Segment) -> Result<MergeCost> {
        let merged = self.merged_statistics(other)?;
        let cost: MergeCost = merged
            .weighted_standard_deviation()
            .zip(self.statistics.weighted_standard_deviation())
            .zip(other.statistics.weighted_standard_deviation())
            .map(|((merged, own), theirs)| merged - (own + theirs))
            .sum();
        Ok(cost)
    }

    fn merged_statistics(&self, other: &Segment) -> Result<BandStatistics> {
        for operand in [self, other] {
            if operand.is_empty() {
                return Err(SegmentationError::InvalidState(format!(
                    "segment #{} is empty and cannot be merged",
                    operand.id
                )));
            }
        }
        self.statistics.combined(&other.statistics)
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Segment {}

impl Hash for Segment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
