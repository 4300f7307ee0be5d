use tracing::debug;

use crate::encoding::Geometry;
use crate::error::{ConfigError, IndexError};

/// Hard ceiling on the number of lex scans a single query may issue. The
/// exponent is widened until the cell count drops below this, trading more
/// false-positive filtering for fewer scans.
pub const DEFAULT_MAX_CELLS: usize = 20;

/// Appended to every range's stop bound. Stored elements continue their key
/// with `":coords:id"`, which sorts after the bare key; the sentinel sorts
/// after `:` in turn, so `<end key><SENTINEL>` still admits each element
/// carrying the range's final key while staying below the next key.
const STOP_SENTINEL: char = ';';

/// One lex range over the encoded key order: `start` is the lowest key of a
/// cell, `stop` the highest key extended by [`STOP_SENTINEL`] so that every
/// element string on that key is inside the inclusive scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexRange {
    pub start: String,
    pub stop: String,
}

/// The scans answering one box query, along with the normalized box they
/// were planned for so results can be filtered without re-deriving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub bounds: Vec<(u64, u64)>,
    pub exponent: u32,
    pub ranges: Vec<LexRange>,
}

impl QueryPlan {
    /// True when every coordinate lies inside the planned box. Used to drop
    /// the false positives a covering cell necessarily sweeps up.
    pub fn contains(&self, pos: &[u64]) -> bool {
        pos.len() == self.bounds.len() && pos.iter().zip(&self.bounds).all(|(v, (lo, hi))| lo <= v && v <= hi)
    }
}

/// Decomposes an axis-aligned box into lex ranges over the interleaved key
/// order. Pure CPU; issuing the scans is the caller's business.
#[derive(Debug, Clone, Copy)]
pub struct Planner {
    geometry: Geometry,
    max_cells: usize,
}

impl Planner {
    pub fn new(geometry: Geometry) -> Self { Self { geometry, max_cells: DEFAULT_MAX_CELLS } }

    pub fn with_max_cells(mut self, max_cells: usize) -> Result<Self, ConfigError> {
        if max_cells <= 1 {
            return Err(ConfigError::MaxCells(max_cells));
        }
        self.max_cells = max_cells;
        Ok(self)
    }

    pub fn max_cells(&self) -> usize { self.max_cells }

    /// Plan the scans for an axis-aligned box given as `[lo, hi]` pairs.
    /// Endpoints may arrive swapped; they are normalized first.
    pub fn plan(&self, query: &[(u64, u64)]) -> Result<QueryPlan, IndexError> {
        self.geometry.check_arity(query.len())?;
        let mut bounds = Vec::with_capacity(query.len());
        for &(a, b) in query {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            if hi > self.geometry.max_coord() {
                return Err(IndexError::CoordinateOutOfRange { value: hi, bits: self.geometry.bits() });
            }
            bounds.push((lo, hi));
        }

        let exponent = self.choose_exponent(&bounds);
        let ranges = self.enumerate_cells(&bounds, exponent);
        debug!(exponent, scans = ranges.len(), "planned box query");
        Ok(QueryPlan { bounds, exponent, ranges })
    }

    /// Start from the smallest dimension spanning about two cells, then
    /// widen while the cell count stays at or above the ceiling. At
    /// `exponent == bits` every dimension collapses into a single cell, so
    /// the loop always terminates.
    fn choose_exponent(&self, bounds: &[(u64, u64)]) -> u32 {
        let min_span = bounds.iter().map(|&(lo, hi)| (hi - lo) as u128 + 1).min().unwrap_or(1);
        let mut exponent = (1 + min_span.ilog2()).min(self.geometry.bits());
        while exponent < self.geometry.bits() && self.cell_count(bounds, exponent) >= self.max_cells as u128 {
            exponent += 1;
        }
        exponent
    }

    fn cell_count(&self, bounds: &[(u64, u64)], exponent: u32) -> u128 {
        bounds.iter().map(|&(lo, hi)| (cell_of(hi, exponent) - cell_of(lo, exponent)) as u128 + 1).fold(1, u128::saturating_mul)
    }

    /// Walk the cartesian product of cell indices covering the box, first
    /// dimension varying fastest, emitting one inclusive lex range per cell.
    fn enumerate_cells(&self, bounds: &[(u64, u64)], exponent: u32) -> Vec<LexRange> {
        let dims = bounds.len();
        let cell_start: Vec<u64> = bounds.iter().map(|&(lo, _)| cell_of(lo, exponent)).collect();
        let cell_end: Vec<u64> = bounds.iter().map(|&(_, hi)| cell_of(hi, exponent)).collect();
        let low_mask = if exponent >= u64::BITS { u64::MAX } else { (1u64 << exponent) - 1 };

        let mut ranges = Vec::new();
        let mut current = cell_start.clone();
        let mut start_pos = vec![0u64; dims];
        let mut end_pos = vec![0u64; dims];
        'cells: loop {
            for i in 0..dims {
                start_pos[i] = cell_floor(current[i], exponent);
                end_pos[i] = start_pos[i] | low_mask;
            }
            let mut stop = self.geometry.encode(&end_pos);
            stop.push(STOP_SENTINEL);
            ranges.push(LexRange { start: self.geometry.encode(&start_pos), stop });

            for i in 0..dims {
                if current[i] != cell_end[i] {
                    current[i] += 1;
                    continue 'cells;
                }
                if i == dims - 1 {
                    break 'cells;
                }
                current[i] = cell_start[i];
            }
        }
        ranges
    }
}

fn cell_of(value: u64, exponent: u32) -> u64 {
    if exponent >= u64::BITS { 0 } else { value >> exponent }
}

fn cell_floor(cell: u64, exponent: u32) -> u64 {
    if exponent >= u64::BITS { 0 } else { cell << exponent }
}
