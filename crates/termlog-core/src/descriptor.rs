//! Log buffer layout and validation
//!
//! The offsets here are the shared-memory wire format: every process that
//! maps the same state buffer must agree on them exactly. Counters are padded
//! to two cache lines each so that the writer's tail and the readers'
//! interest in the status never share a line.
//!
//! ```text
//!   0                 128              256              384         512
//!   +-----------------+----------------+----------------+-----------+
//!   |    reserved     | tail counter   | high-water mark|  status   |
//!   +-----------------+----------------+----------------+-----------+
//! ```

use crate::atomic_buffer::AtomicBuffer;
use crate::{Error, Result};
use std::fmt;

pub const CACHE_LINE_LENGTH: usize = 64;

/// Offset of the writer's tail counter (i32)
pub const TAIL_COUNTER_OFFSET: usize = CACHE_LINE_LENGTH * 2;

/// Offset of the high-water mark (i32)
pub const HIGH_WATER_MARK_OFFSET: usize = TAIL_COUNTER_OFFSET + CACHE_LINE_LENGTH * 2;

/// Offset of the buffer status (i32)
pub const STATUS_OFFSET: usize = HIGH_WATER_MARK_OFFSET + CACHE_LINE_LENGTH * 2;

/// Minimum length of a state buffer
pub const STATE_BUFFER_LENGTH: usize = STATUS_OFFSET + CACHE_LINE_LENGTH * 2;

/// Smallest accepted log buffer capacity; keeps a state buffer placed
/// directly after the log word aligned
pub const MIN_TERM_LENGTH: usize = WORD_ALIGNMENT;

/// Largest accepted log buffer capacity
pub const MAX_TERM_LENGTH: usize = 1 << 30;

/// Required alignment of the state buffer base address
pub const WORD_ALIGNMENT: usize = 8;

/// Log buffer status stored at [`STATUS_OFFSET`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    /// Zero-filled and ready to be activated
    Clean = 0,
    /// Fully consumed; must be cleaned before reuse
    NeedsCleaning = 1,
    /// A recycler has won the right to clean
    InCleaning = 2,
    /// In use by a writer and its readers
    Active = 3,
}

impl Status {
    /// Raw value as stored in shared memory
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Convert from the raw stored value
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Status::Clean),
            1 => Some(Status::NeedsCleaning),
            2 => Some(Status::InCleaning),
            3 => Some(Status::Active),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Clean => "CLEAN",
            Status::NeedsCleaning => "NEEDS_CLEANING",
            Status::InCleaning => "IN_CLEANING",
            Status::Active => "ACTIVE",
        };
        f.write_str(name)
    }
}

/// Validate a log (data) buffer
pub fn check_log_buffer(buffer: &AtomicBuffer<'_>) -> Result<()> {
    check_term_length(buffer.capacity())
}

/// Validate a term length before anything is mapped
pub fn check_term_length(capacity: usize) -> Result<()> {
    if !(MIN_TERM_LENGTH..=MAX_TERM_LENGTH).contains(&capacity) {
        tracing::warn!(capacity, "log buffer capacity out of range");
        return Err(Error::CapacityOutOfRange {
            capacity,
            min: MIN_TERM_LENGTH,
            max: MAX_TERM_LENGTH,
        });
    }

    if !capacity.is_power_of_two() {
        tracing::warn!(capacity, "log buffer capacity not a power of two");
        return Err(Error::CapacityNotPowerOfTwo { capacity });
    }

    Ok(())
}

/// Validate a state (metadata) buffer
pub fn check_state_buffer(buffer: &AtomicBuffer<'_>) -> Result<()> {
    let length = buffer.capacity();
    if length < STATE_BUFFER_LENGTH {
        tracing::warn!(length, required = STATE_BUFFER_LENGTH, "state buffer too small");
        return Err(Error::StateBufferTooSmall {
            length,
            required: STATE_BUFFER_LENGTH,
        });
    }

    let address = buffer.as_ptr() as usize;
    if address % WORD_ALIGNMENT != 0 {
        tracing::warn!(address, "state buffer misaligned");
        return Err(Error::Misaligned {
            address,
            alignment: WORD_ALIGNMENT,
        });
    }

    Ok(())
}
