//! Named shared memory segments

use crate::atomic_buffer::AtomicBuffer;
use crate::{Error, Result};
use shared_memory::{Shmem, ShmemConf};

/// Shared memory segment; unlinked on drop by the creating handle
pub struct SharedMemory {
    inner: Shmem,
    name: String,
    size: usize,
}

impl SharedMemory {
    /// Create a new zero-filled segment
    pub fn create(name: &str, size: usize) -> Result<Self> {
        let shmem = ShmemConf::new()
            .size(size)
            .os_id(name)
            .create()
            .map_err(|e| Error::SharedMemory(e.to_string()))?;

        tracing::debug!(name, size, "shared memory created");
        Ok(Self {
            inner: shmem,
            name: name.to_string(),
            size,
        })
    }

    /// Open an existing segment
    pub fn open(name: &str) -> Result<Self> {
        let shmem = ShmemConf::new()
            .os_id(name)
            .open()
            .map_err(|e| Error::SharedMemory(e.to_string()))?;

        let size = shmem.len();
        tracing::debug!(name, size, "shared memory opened");

        Ok(Self {
            inner: shmem,
            name: name.to_string(),
            size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether dropping this handle removes the segment
    pub fn is_owner(&self) -> bool {
        self.inner.is_owner()
    }

    /// View over the whole mapping
    pub fn atomic_buffer(&self) -> AtomicBuffer<'_> {
        // Safety: the mapping stays valid and writable while `self` is
        // borrowed, and no Rust reference into it is handed out.
        unsafe { AtomicBuffer::from_raw_parts(self.inner.as_ptr(), self.size) }
    }
}

impl std::fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemory")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("owner", &self.is_owner())
            .finish()
    }
}
