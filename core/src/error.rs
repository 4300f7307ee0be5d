use thiserror::Error;

use crate::storage::StoreError;

/// Errors surfaced by index operations. Nothing is recovered internally;
/// every failure propagates to the caller.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("expected {expected} coordinates, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("coordinate {value} does not fit in {bits} bits")]
    CoordinateOutOfRange { value: u64, bits: u32 },
    #[error("id {0:?} must not contain the field separator ':'")]
    InvalidId(String),
    #[error("malformed element string {0:?}")]
    MalformedEntry(String),
    #[error("id {0:?} not found")]
    NotFound(String),
    #[error("batch arity mismatch: {ids} ids, {positions} positions")]
    BatchMismatch { ids: usize, positions: usize },
    #[error("range scan [{start}, {stop}] failed: {source}")]
    ScanFailed { start: String, stop: String, source: StoreError },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Construction-time validation failures. The shape of an index is fixed for
/// its whole life, so these never occur past `new`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("dimensions must be at least 1")]
    Dimensions,
    #[error("precision must be between 1 and 64 bits, got {0}")]
    Precision(u32),
    #[error("{dims} dimensions at {bits} bits is not a whole number of hex digits")]
    OddHexWidth { dims: usize, bits: u32 },
    #[error("max cells per query must be greater than 1, got {0}")]
    MaxCells(usize),
}
