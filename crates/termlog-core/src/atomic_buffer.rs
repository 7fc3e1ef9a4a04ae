//! Bounds-checked view over shared memory
//!
//! An [`AtomicBuffer`] never owns the bytes it points at. It borrows them from
//! whoever mapped or allocated the region (a `&mut [u8]`, a
//! [`SharedMemory`](crate::shm::SharedMemory) mapping, ...) and every access is
//! checked against the view length. Out-of-range offsets are programming
//! errors and panic.
//!
//! Each accessor comes in two flavours selected by [`AccessMode`]:
//!
//! - `Plain`: program order only. Aligned locations use relaxed atomics,
//!   unaligned ones fall back to unaligned reads/writes.
//! - `Ordered`: acquire on load, release on store. The location must be
//!   aligned to the value width.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

const I32_SIZE: usize = std::mem::size_of::<i32>();
const I64_SIZE: usize = std::mem::size_of::<i64>();

/// Memory ordering applied to a single access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Plain,
    Ordered,
}

/// Non-owning view over a contiguous byte region
#[derive(Clone)]
pub struct AtomicBuffer<'a> {
    ptr: NonNull<u8>,
    capacity: usize,
    _marker: PhantomData<&'a UnsafeCell<[u8]>>,
}

// Safety: all accesses go through raw pointers into memory that is shared by
// design; cross-thread visibility is governed by the access mode.
unsafe impl Send for AtomicBuffer<'_> {}
unsafe impl Sync for AtomicBuffer<'_> {}

impl<'a> AtomicBuffer<'a> {
    /// Wrap a mutable byte slice
    pub fn new(bytes: &'a mut [u8]) -> Self {
        let capacity = bytes.len();
        Self {
            ptr: NonNull::from(bytes).cast(),
            capacity,
            _marker: PhantomData,
        }
    }

    /// Wrap a raw region
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `capacity` bytes for the
    /// whole of `'a`, and nothing may hold a Rust reference into the region
    /// while the view is in use.
    pub unsafe fn from_raw_parts(ptr: *mut u8, capacity: usize) -> Self {
        assert!(!ptr.is_null(), "null buffer pointer");
        Self {
            ptr: NonNull::new_unchecked(ptr),
            capacity,
            _marker: PhantomData,
        }
    }

    /// Sub-view of `length` bytes starting at `offset`
    #[track_caller]
    pub fn view(&self, offset: usize, length: usize) -> AtomicBuffer<'a> {
        self.bounds_check(offset, length);
        AtomicBuffer {
            ptr: unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) },
            capacity: length,
            _marker: PhantomData,
        }
    }

    /// Length of the view in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Base address of the view
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    // ---- i32 -----------------------------------------------------------

    #[inline]
    #[track_caller]
    pub fn load_i32(&self, offset: usize, mode: AccessMode) -> i32 {
        match mode {
            AccessMode::Plain => {
                let ptr = self.checked_ptr(offset, I32_SIZE);
                if is_aligned(ptr, I32_SIZE) {
                    unsafe { &*(ptr as *const AtomicI32) }.load(Ordering::Relaxed)
                } else {
                    unsafe { ptr::read_unaligned(ptr as *const i32) }
                }
            }
            AccessMode::Ordered => self.atomic_i32(offset).load(Ordering::Acquire),
        }
    }

    #[inline]
    #[track_caller]
    pub fn store_i32(&self, offset: usize, value: i32, mode: AccessMode) {
        match mode {
            AccessMode::Plain => {
                let ptr = self.checked_ptr(offset, I32_SIZE);
                if is_aligned(ptr, I32_SIZE) {
                    unsafe { &*(ptr as *const AtomicI32) }.store(value, Ordering::Relaxed)
                } else {
                    unsafe { ptr::write_unaligned(ptr as *mut i32, value) }
                }
            }
            AccessMode::Ordered => self.atomic_i32(offset).store(value, Ordering::Release),
        }
    }

    #[inline]
    #[track_caller]
    pub fn get_i32(&self, offset: usize) -> i32 {
        self.load_i32(offset, AccessMode::Plain)
    }

    #[inline]
    #[track_caller]
    pub fn put_i32(&self, offset: usize, value: i32) {
        self.store_i32(offset, value, AccessMode::Plain)
    }

    #[inline]
    #[track_caller]
    pub fn get_i32_ordered(&self, offset: usize) -> i32 {
        self.load_i32(offset, AccessMode::Ordered)
    }

    #[inline]
    #[track_caller]
    pub fn put_i32_ordered(&self, offset: usize, value: i32) {
        self.store_i32(offset, value, AccessMode::Ordered)
    }

    /// Atomically replace `expected` with `updated`, returning whether the
    /// swap happened
    #[inline]
    #[track_caller]
    pub fn compare_and_set_i32(&self, offset: usize, expected: i32, updated: i32) -> bool {
        self.atomic_i32(offset)
            .compare_exchange(expected, updated, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Atomically add `delta`, returning the previous value
    #[inline]
    #[track_caller]
    pub fn get_and_add_i32(&self, offset: usize, delta: i32) -> i32 {
        self.atomic_i32(offset).fetch_add(delta, Ordering::AcqRel)
    }

    // ---- i64 -----------------------------------------------------------

    #[inline]
    #[track_caller]
    pub fn load_i64(&self, offset: usize, mode: AccessMode) -> i64 {
        match mode {
            AccessMode::Plain => {
                let ptr = self.checked_ptr(offset, I64_SIZE);
                if is_aligned(ptr, I64_SIZE) {
                    unsafe { &*(ptr as *const AtomicI64) }.load(Ordering::Relaxed)
                } else {
                    unsafe { ptr::read_unaligned(ptr as *const i64) }
                }
            }
            AccessMode::Ordered => self.atomic_i64(offset).load(Ordering::Acquire),
        }
    }

    #[inline]
    #[track_caller]
    pub fn store_i64(&self, offset: usize, value: i64, mode: AccessMode) {
        match mode {
            AccessMode::Plain => {
                let ptr = self.checked_ptr(offset, I64_SIZE);
                if is_aligned(ptr, I64_SIZE) {
                    unsafe { &*(ptr as *const AtomicI64) }.store(value, Ordering::Relaxed)
                } else {
                    unsafe { ptr::write_unaligned(ptr as *mut i64, value) }
                }
            }
            AccessMode::Ordered => self.atomic_i64(offset).store(value, Ordering::Release),
        }
    }

    #[inline]
    #[track_caller]
    pub fn get_i64(&self, offset: usize) -> i64 {
        self.load_i64(offset, AccessMode::Plain)
    }

    #[inline]
    #[track_caller]
    pub fn put_i64(&self, offset: usize, value: i64) {
        self.store_i64(offset, value, AccessMode::Plain)
    }

    #[inline]
    #[track_caller]
    pub fn get_i64_ordered(&self, offset: usize) -> i64 {
        self.load_i64(offset, AccessMode::Ordered)
    }

    #[inline]
    #[track_caller]
    pub fn put_i64_ordered(&self, offset: usize, value: i64) {
        self.store_i64(offset, value, AccessMode::Ordered)
    }

    #[inline]
    #[track_caller]
    pub fn compare_and_set_i64(&self, offset: usize, expected: i64, updated: i64) -> bool {
        self.atomic_i64(offset)
            .compare_exchange(expected, updated, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    #[track_caller]
    pub fn get_and_add_i64(&self, offset: usize, delta: i64) -> i64 {
        self.atomic_i64(offset).fetch_add(delta, Ordering::AcqRel)
    }

    // ---- bulk ----------------------------------------------------------

    /// Fill `length` bytes from `offset` with `value`
    ///
    /// Not atomic as a whole. Concurrent readers must be excluded by the
    /// caller (the log buffer status protocol does this).
    #[track_caller]
    pub fn set_memory(&self, offset: usize, length: usize, value: u8) {
        let ptr = self.checked_ptr(offset, length);
        unsafe { ptr::write_bytes(ptr, value, length) }
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`
    #[track_caller]
    pub fn get_bytes(&self, offset: usize, dst: &mut [u8]) {
        let ptr = self.checked_ptr(offset, dst.len());
        unsafe { ptr::copy_nonoverlapping(ptr as *const u8, dst.as_mut_ptr(), dst.len()) }
    }

    /// Copy `src` into the view starting at `offset`
    #[track_caller]
    pub fn put_bytes(&self, offset: usize, src: &[u8]) {
        let ptr = self.checked_ptr(offset, src.len());
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), ptr, src.len()) }
    }

    // ---- internals -----------------------------------------------------

    #[inline]
    #[track_caller]
    fn bounds_check(&self, offset: usize, length: usize) {
        match offset.checked_add(length) {
            Some(end) if end <= self.capacity => {}
            _ => out_of_bounds(offset, length, self.capacity),
        }
    }

    #[inline]
    #[track_caller]
    fn checked_ptr(&self, offset: usize, length: usize) -> *mut u8 {
        self.bounds_check(offset, length);
        unsafe { self.ptr.as_ptr().add(offset) }
    }

    #[inline]
    #[track_caller]
    fn atomic_i32(&self, offset: usize) -> &AtomicI32 {
        let ptr = self.checked_ptr(offset, I32_SIZE);
        if !is_aligned(ptr, I32_SIZE) {
            misaligned(ptr, I32_SIZE);
        }
        unsafe { &*(ptr as *const AtomicI32) }
    }

    #[inline]
    #[track_caller]
    fn atomic_i64(&self, offset: usize) -> &AtomicI64 {
        let ptr = self.checked_ptr(offset, I64_SIZE);
        if !is_aligned(ptr, I64_SIZE) {
            misaligned(ptr, I64_SIZE);
        }
        unsafe { &*(ptr as *const AtomicI64) }
    }
}

impl fmt::Debug for AtomicBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicBuffer")
            .field("address", &self.ptr)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[inline(always)]
fn is_aligned(ptr: *const u8, alignment: usize) -> bool {
    (ptr as usize) & (alignment - 1) == 0
}

#[cold]
#[inline(never)]
#[track_caller]
fn out_of_bounds(offset: usize, length: usize, capacity: usize) -> ! {
    panic!("access out of bounds: offset={offset} length={length} capacity={capacity}")
}

#[cold]
#[inline(never)]
#[track_caller]
fn misaligned(ptr: *const u8, alignment: usize) -> ! {
    panic!("misaligned atomic access: address={:#x} alignment={alignment}", ptr as usize)
}
