//! Error types for termlog

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("log buffer capacity {capacity} is not a positive power of two")]
    CapacityNotPowerOfTwo { capacity: usize },

    #[error("log buffer capacity {capacity} outside allowed range {min}..={max}")]
    CapacityOutOfRange {
        capacity: usize,
        min: usize,
        max: usize,
    },

    #[error("state buffer too small: length {length}, required {required}")]
    StateBufferTooSmall { length: usize, required: usize },

    #[error("buffer address {address:#x} not aligned to {alignment} bytes")]
    Misaligned { address: usize, alignment: usize },

    #[error("shared memory error: {0}")]
    SharedMemory(String),

    #[error("invalid idle strategy configuration: {0}")]
    InvalidIdleConfig(String),

    #[error("unknown idle strategy: {0}")]
    UnknownIdleStrategy(String),
}

pub type Result<T> = std::result::Result<T, Error>;
