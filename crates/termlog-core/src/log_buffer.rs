//! Log buffer: a data region plus its state region

use crate::atomic_buffer::AtomicBuffer;
use crate::descriptor::{
    self, Status, HIGH_WATER_MARK_OFFSET, STATUS_OFFSET, TAIL_COUNTER_OFFSET,
};
use crate::Result;

const STATUS_LENGTH: usize = std::mem::size_of::<i32>();

/// A log buffer borrowing its data and state regions
///
/// Owns no memory. Both views must stay valid for `'a`, which the
/// [`AtomicBuffer`] lifetime enforces.
#[derive(Debug, Clone)]
pub struct LogBuffer<'a> {
    log_buffer: AtomicBuffer<'a>,
    state_buffer: AtomicBuffer<'a>,
    capacity: i32,
}

impl<'a> LogBuffer<'a> {
    /// Validate both regions and wrap them
    pub fn new(log_buffer: AtomicBuffer<'a>, state_buffer: AtomicBuffer<'a>) -> Result<Self> {
        descriptor::check_log_buffer(&log_buffer)?;
        descriptor::check_state_buffer(&state_buffer)?;

        // bounded by MAX_TERM_LENGTH
        let capacity = log_buffer.capacity() as i32;
        tracing::debug!(
            capacity,
            state_length = state_buffer.capacity(),
            "log buffer attached"
        );

        Ok(Self {
            log_buffer,
            state_buffer,
            capacity,
        })
    }

    /// The log of messages
    pub fn log_buffer(&self) -> &AtomicBuffer<'a> {
        &self.log_buffer
    }

    /// The state describing the log
    pub fn state_buffer(&self) -> &AtomicBuffer<'a> {
        &self.state_buffer
    }

    /// Capacity of the log region in bytes
    #[inline]
    pub fn capacity(&self) -> i32 {
        self.capacity
    }

    /// Current status, or `None` if the region holds an unknown value
    #[inline]
    pub fn status(&self) -> Option<Status> {
        Status::from_i32(self.status_raw())
    }

    /// Current status as stored, with acquire ordering
    #[inline]
    pub fn status_raw(&self) -> i32 {
        self.state_buffer.get_i32_ordered(STATUS_OFFSET)
    }

    /// Atomically move from `expected` to `updated`
    ///
    /// Exactly one of several racing callers wins. Losing is not an error.
    #[inline]
    pub fn compare_and_set_status(&self, expected: Status, updated: Status) -> bool {
        self.state_buffer
            .compare_and_set_i32(STATUS_OFFSET, expected.as_i32(), updated.as_i32())
    }

    /// Publish `status` unconditionally with release ordering
    #[inline]
    pub fn status_ordered(&self, status: Status) {
        self.state_buffer.put_i32_ordered(STATUS_OFFSET, status.as_i32());
    }

    /// Zero both regions and publish [`Status::Clean`]
    ///
    /// No reader or writer may be using the buffer while this runs; callers
    /// arrange that by winning a status transition first.
    pub fn clean(&self) {
        self.log_buffer.set_memory(0, self.log_buffer.capacity(), 0);

        // status only changes through CAS or ordered store, so the fill
        // skips it; it keeps its prior value until CLEAN is published
        let status_end = STATUS_OFFSET + STATUS_LENGTH;
        self.state_buffer.set_memory(0, STATUS_OFFSET, 0);
        self.state_buffer
            .set_memory(status_end, self.state_buffer.capacity() - status_end, 0);

        self.status_ordered(Status::Clean);
        tracing::trace!(capacity = self.capacity, "log buffer cleaned");
    }

    /// Clean the buffer if this caller wins `NEEDS_CLEANING -> IN_CLEANING`
    ///
    /// Returns `false` when the buffer did not need cleaning or another
    /// thread got there first.
    pub fn try_clean(&self) -> bool {
        if !self.compare_and_set_status(Status::NeedsCleaning, Status::InCleaning) {
            return false;
        }
        self.clean();
        true
    }

    /// Writer's tail with acquire ordering, clamped to capacity
    #[inline]
    pub fn tail_volatile(&self) -> i32 {
        self.state_buffer
            .get_i32_ordered(TAIL_COUNTER_OFFSET)
            .min(self.capacity)
    }

    /// Writer's tail, clamped to capacity
    #[inline]
    pub fn tail(&self) -> i32 {
        self.state_buffer.get_i32(TAIL_COUNTER_OFFSET).min(self.capacity)
    }

    /// High-water mark with acquire ordering
    #[inline]
    pub fn high_water_mark_volatile(&self) -> i32 {
        self.state_buffer.get_i32_ordered(HIGH_WATER_MARK_OFFSET)
    }

    #[inline]
    pub fn high_water_mark(&self) -> i32 {
        self.state_buffer.get_i32(HIGH_WATER_MARK_OFFSET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::STATE_BUFFER_LENGTH;
    use crate::Error;

    #[repr(C, align(64))]
    struct Region([u8; 1024 + STATE_BUFFER_LENGTH]);

    impl Region {
        fn new() -> Self {
            Region([0; 1024 + STATE_BUFFER_LENGTH])
        }

        fn split(&mut self) -> (AtomicBuffer<'_>, AtomicBuffer<'_>) {
            let whole = AtomicBuffer::new(&mut self.0);
            (whole.view(0, 1024), whole.view(1024, STATE_BUFFER_LENGTH))
        }
    }

    #[test]
    fn test_new_validates() {
        let mut region = Region::new();
        let (log, state) = region.split();

        let err = LogBuffer::new(log.view(0, 768), state.clone()).unwrap_err();
        assert_eq!(err, Error::CapacityNotPowerOfTwo { capacity: 768 });

        let err = LogBuffer::new(log.clone(), state.view(0, 64)).unwrap_err();
        assert!(matches!(err, Error::StateBufferTooSmall { length: 64, .. }));

        let lb = LogBuffer::new(log, state).unwrap();
        assert_eq!(lb.capacity(), 1024);
    }

    #[test]
    fn test_status_transitions() {
        let mut region = Region::new();
        let (log, state) = region.split();
        let lb = LogBuffer::new(log, state).unwrap();

        lb.status_ordered(Status::NeedsCleaning);
        assert_eq!(lb.status(), Some(Status::NeedsCleaning));

        assert!(!lb.compare_and_set_status(Status::Active, Status::Clean));
        assert!(lb.compare_and_set_status(Status::NeedsCleaning, Status::Clean));
        assert_eq!(lb.status(), Some(Status::Clean));

        assert!(lb.compare_and_set_status(Status::Clean, Status::Active));
        assert_eq!(lb.status(), Some(Status::Active));
    }

    #[test]
    fn test_unknown_status_is_reported() {
        let mut region = Region::new();
        let (log, state) = region.split();
        let lb = LogBuffer::new(log, state).unwrap();

        lb.state_buffer().put_i32_ordered(STATUS_OFFSET, 77);
        assert_eq!(lb.status(), None);
        assert_eq!(lb.status_raw(), 77);
    }

    #[test]
    fn test_clean_zeroes_everything() {
        let mut region = Region::new();
        let (log, state) = region.split();
        let lb = LogBuffer::new(log, state).unwrap();

        lb.log_buffer().set_memory(0, 1024, 0xFF);
        lb.state_buffer().put_i32_ordered(TAIL_COUNTER_OFFSET, 512);
        lb.state_buffer().put_i32_ordered(HIGH_WATER_MARK_OFFSET, 900);
        lb.status_ordered(Status::Active);

        lb.clean();

        assert_eq!(lb.status(), Some(Status::Clean));
        assert_eq!(lb.tail(), 0);
        assert_eq!(lb.high_water_mark(), 0);
        drop(lb);
        assert!(region.0.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_try_clean_requires_needs_cleaning() {
        let mut region = Region::new();
        let (log, state) = region.split();
        let lb = LogBuffer::new(log, state).unwrap();

        lb.status_ordered(Status::Active);
        assert!(!lb.try_clean());
        assert_eq!(lb.status(), Some(Status::Active));

        lb.log_buffer().put_i32(0, 5);
        lb.status_ordered(Status::NeedsCleaning);
        assert!(lb.try_clean());
        assert_eq!(lb.status(), Some(Status::Clean));
        assert_eq!(lb.log_buffer().get_i32(0), 0);
        assert!(!lb.try_clean());
    }

    #[test]
    fn test_tail_is_clamped() {
        let mut region = Region::new();
        let (log, state) = region.split();
        let lb = LogBuffer::new(log, state).unwrap();

        lb.state_buffer().put_i32_ordered(TAIL_COUNTER_OFFSET, 100);
        assert_eq!(lb.tail(), 100);
        assert_eq!(lb.tail_volatile(), 100);

        lb.state_buffer().put_i32_ordered(TAIL_COUNTER_OFFSET, 4096);
        assert_eq!(lb.tail(), 1024);
        assert_eq!(lb.tail_volatile(), 1024);

        // high-water mark is reported as stored
        lb.state_buffer().put_i32(HIGH_WATER_MARK_OFFSET, 2048);
        assert_eq!(lb.high_water_mark_volatile(), 2048);
    }
}
