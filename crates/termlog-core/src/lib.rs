//! termlog - lock-free shared memory log buffers
//!
//! One writer and any number of readers exchange bytes through a log buffer
//! (data region) and its state buffer (status, tail, high-water mark). The
//! only synchronisation is ordered access to the state fields; there are no
//! locks on the hot path. Poll loops pace themselves with an
//! [`IdleStrategy`].

pub mod atomic_buffer;
pub mod descriptor;
pub mod error;
pub mod idle;
pub mod log_buffer;
pub mod region;
pub mod shm;

pub use atomic_buffer::{AccessMode, AtomicBuffer};
pub use descriptor::Status;
pub use error::{Error, Result};
pub use idle::{
    BackoffIdleStrategy, BusySpinIdleStrategy, CpuPause, IdleStrategy, IdleStrategyKind,
    NoOpIdleStrategy, SleepingIdleStrategy, WaitPrimitive, YieldingIdleStrategy,
};
pub use log_buffer::LogBuffer;
pub use region::LogRegion;
pub use shm::SharedMemory;
