//! Shared log regions
//!
//! A region is one named segment holding a log buffer followed by its state
//! buffer:
//!
//! ```text
//!   0                      term_length        term_length + STATE_BUFFER_LENGTH
//!   +----------------------+------------------+
//!   |      log buffer      |   state buffer   |
//!   +----------------------+------------------+
//! ```
//!
//! Segments are page aligned and term lengths are powers of two no smaller
//! than [`WORD_ALIGNMENT`](crate::descriptor::WORD_ALIGNMENT), so the state
//! buffer always has the alignment the ordered accessors need.

use crate::descriptor::{self, STATE_BUFFER_LENGTH};
use crate::log_buffer::LogBuffer;
use crate::shm::SharedMemory;
use crate::{Error, Result};

/// Named shared memory holding one log buffer and its state
#[derive(Debug)]
pub struct LogRegion {
    shm: SharedMemory,
    term_length: usize,
}

impl LogRegion {
    /// Size of the segment needed for `term_length`
    pub fn region_length(term_length: usize) -> usize {
        term_length + STATE_BUFFER_LENGTH
    }

    /// Create a new region; contents start zeroed, so status reads `CLEAN`
    pub fn create(name: &str, term_length: usize) -> Result<Self> {
        descriptor::check_term_length(term_length)?;

        let shm = SharedMemory::create(name, Self::region_length(term_length))?;
        tracing::info!(name, term_length, "log region created");

        Ok(Self { shm, term_length })
    }

    /// Open a region created elsewhere
    pub fn open(name: &str) -> Result<Self> {
        let shm = SharedMemory::open(name)?;

        let term_length = shm.size().checked_sub(STATE_BUFFER_LENGTH).ok_or_else(|| {
            Error::StateBufferTooSmall {
                length: shm.size(),
                required: STATE_BUFFER_LENGTH,
            }
        })?;
        descriptor::check_term_length(term_length)?;
        tracing::info!(name, term_length, "log region opened");

        Ok(Self { shm, term_length })
    }

    pub fn name(&self) -> &str {
        self.shm.name()
    }

    pub fn term_length(&self) -> usize {
        self.term_length
    }

    /// Log buffer over this region
    pub fn log_buffer(&self) -> Result<LogBuffer<'_>> {
        let whole = self.shm.atomic_buffer();
        let log = whole.view(0, self.term_length);
        let state = whole.view(self.term_length, STATE_BUFFER_LENGTH);
        LogBuffer::new(log, state)
    }
}
