//! Log buffer scenarios and cross-thread behaviour

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;

use termlog_core::descriptor::{
    HIGH_WATER_MARK_OFFSET, STATE_BUFFER_LENGTH, STATUS_OFFSET, TAIL_COUNTER_OFFSET,
};
use termlog_core::{AtomicBuffer, BusySpinIdleStrategy, IdleStrategy, LogBuffer, Status};

const TERM_LENGTH: usize = 64 * 1024;
const THREADS: usize = 8;

#[repr(C, align(64))]
struct Region {
    log: [u8; TERM_LENGTH],
    state: [u8; STATE_BUFFER_LENGTH],
}

impl Region {
    fn boxed() -> Box<Self> {
        Box::new(Region {
            log: [0; TERM_LENGTH],
            state: [0; STATE_BUFFER_LENGTH],
        })
    }

    fn log_buffer(&mut self) -> LogBuffer<'_> {
        LogBuffer::new(
            AtomicBuffer::new(&mut self.log),
            AtomicBuffer::new(&mut self.state),
        )
        .unwrap()
    }
}

fn as_bytes(words: &mut [u64]) -> &mut [u8] {
    let len = std::mem::size_of_val(words);
    unsafe { std::slice::from_raw_parts_mut(words.as_mut_ptr().cast(), len) }
}

/// 1 KiB log with a minimum-size state buffer
#[test]
fn test_clean_small_buffer() {
    #[repr(C, align(64))]
    struct Small {
        log: [u8; 1024],
        state: [u8; STATE_BUFFER_LENGTH],
    }

    let mut mem = Small {
        log: [0x5A; 1024],
        state: [0x11; STATE_BUFFER_LENGTH],
    };
    let lb = LogBuffer::new(
        AtomicBuffer::new(&mut mem.log),
        AtomicBuffer::new(&mut mem.state),
    )
    .unwrap();

    // whatever the region held before cleaning
    assert_eq!(lb.status_raw(), 0x1111_1111);
    assert_eq!(lb.status(), None);
    assert_eq!(lb.tail(), 1024);

    lb.clean();
    assert_eq!(lb.status(), Some(Status::Clean));
    assert_eq!(lb.tail(), 0);
    assert_eq!(lb.high_water_mark(), 0);

    drop(lb);
    assert!(mem.log.iter().all(|&b| b == 0));
    assert!(mem.state.iter().all(|&b| b == 0));
}

#[test]
fn test_clean_is_idempotent() {
    let mut region = Region::boxed();
    {
        let lb = region.log_buffer();
        lb.clean();
        lb.clean();
        assert_eq!(lb.status(), Some(Status::Clean));
        assert_eq!(lb.tail_volatile(), 0);
        assert_eq!(lb.high_water_mark_volatile(), 0);
    }
    assert!(region.log.iter().all(|&b| b == 0));
    assert!(region.state.iter().all(|&b| b == 0));
}

#[test]
fn test_status_cas_single_winner() {
    let mut region = Region::boxed();
    let lb = region.log_buffer();

    for _ in 0..100 {
        lb.status_ordered(Status::NeedsCleaning);
        let barrier = Barrier::new(THREADS);
        let wins = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    if lb.compare_and_set_status(Status::NeedsCleaning, Status::Clean) {
                        wins.fetch_add(1, Ordering::Relaxed);
                    }
                    assert_eq!(lb.status(), Some(Status::Clean));
                });
            }
        });

        assert_eq!(wins.load(Ordering::Relaxed), 1);
        assert_eq!(lb.status(), Some(Status::Clean));
    }
}

#[test]
fn test_two_threads_race_to_clean() {
    let mut region = Region::boxed();
    let lb = region.log_buffer();
    lb.status_ordered(Status::NeedsCleaning);

    let barrier = &Barrier::new(2);
    let lb = &lb;
    let results: Vec<bool> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(move || {
                    barrier.wait();
                    lb.compare_and_set_status(Status::NeedsCleaning, Status::Clean)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|&&won| won).count(), 1);
    assert_eq!(lb.status(), Some(Status::Clean));
}

#[test]
fn test_try_clean_single_winner() {
    let mut region = Region::boxed();
    let lb = region.log_buffer();

    for round in 0..50 {
        lb.log_buffer().set_memory(0, TERM_LENGTH, round as u8 + 1);
        lb.status_ordered(Status::NeedsCleaning);

        let barrier = Barrier::new(THREADS);
        let wins = AtomicUsize::new(0);
        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    let mut idle = BusySpinIdleStrategy::new();
                    if lb.try_clean() {
                        wins.fetch_add(1, Ordering::Relaxed);
                    } else {
                        // loser backs off until the winner publishes CLEAN
                        while lb.status() != Some(Status::Clean) {
                            idle.idle(0);
                        }
                    }
                });
            }
        });

        assert_eq!(wins.load(Ordering::Relaxed), 1);
        assert_eq!(lb.status(), Some(Status::Clean));
        assert_eq!(lb.log_buffer().get_i64(TERM_LENGTH / 2), 0);
    }
}

/// A thread activating the buffer as soon as it reads CLEAN must not have
/// its ACTIVE overwritten by a clean still in progress.
#[test]
fn test_activation_during_clean_is_not_lost() {
    const STATE_LENGTH: usize = 16 * 1024 * 1024;
    let mut log_words = vec![0u64; 1024 / 8];
    let mut state_words = vec![0u64; STATE_LENGTH / 8];
    let lb = LogBuffer::new(
        AtomicBuffer::new(as_bytes(&mut log_words)),
        AtomicBuffer::new(as_bytes(&mut state_words)),
    )
    .unwrap();

    for _ in 0..5 {
        lb.status_ordered(Status::NeedsCleaning);
        let done = AtomicBool::new(false);

        let activated = thread::scope(|s| {
            let activator = s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    if lb.compare_and_set_status(Status::Clean, Status::Active) {
                        return true;
                    }
                    std::hint::spin_loop();
                }
                false
            });

            assert!(lb.try_clean());
            done.store(true, Ordering::Release);
            activator.join().unwrap()
        });

        let expected = if activated { Status::Active } else { Status::Clean };
        assert_eq!(lb.status(), Some(expected));
    }
}

#[test]
fn test_tail_never_exceeds_capacity() {
    let mut region = Region::boxed();
    let lb = region.log_buffer();
    let capacity = lb.capacity();

    for raw in [0, 1, capacity - 1, capacity, capacity + 1, i32::MAX] {
        lb.state_buffer().put_i32_ordered(TAIL_COUNTER_OFFSET, raw);
        assert_eq!(lb.tail(), raw.min(capacity));
        assert_eq!(lb.tail_volatile(), raw.min(capacity));
        assert!(lb.tail() <= capacity);
    }
}

/// Writer publishes i64 entries then advances the tail with release
/// ordering; the reader must see every entry below the tail it acquires.
#[test]
fn test_ordered_tail_publishes_payload() {
    const ENTRY: usize = std::mem::size_of::<i64>();
    let mut region = Region::boxed();
    let lb = region.log_buffer();
    lb.clean();
    lb.status_ordered(Status::Active);
    let entries = TERM_LENGTH / ENTRY;

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..entries {
                let offset = i * ENTRY;
                lb.log_buffer().put_i64(offset, i as i64 + 1);
                let tail = (offset + ENTRY) as i32;
                lb.state_buffer().put_i32_ordered(TAIL_COUNTER_OFFSET, tail);
                lb.state_buffer().put_i32_ordered(HIGH_WATER_MARK_OFFSET, tail);
            }
            lb.status_ordered(Status::NeedsCleaning);
        });

        s.spawn(|| {
            let mut idle = BusySpinIdleStrategy::new();
            let mut consumed = 0usize;
            let mut last_tail = 0;
            while consumed < entries {
                let tail = lb.tail_volatile();
                assert!(tail >= last_tail, "tail went backwards");
                assert!(tail <= lb.capacity());
                last_tail = tail;

                let mut work = 0;
                while (consumed + 1) * ENTRY <= tail as usize {
                    let value = lb.log_buffer().get_i64(consumed * ENTRY);
                    assert_eq!(value, consumed as i64 + 1, "stale entry at {consumed}");
                    consumed += 1;
                    work += 1;
                }
                idle.idle(work);
            }
            while lb.status() != Some(Status::NeedsCleaning) {
                idle.idle(0);
            }
            assert_eq!(lb.high_water_mark_volatile(), TERM_LENGTH as i32);
        });
    });

    assert_eq!(lb.tail(), lb.capacity());
    assert!(lb.try_clean());
    assert_eq!(lb.state_buffer().get_i32(STATUS_OFFSET), Status::Clean.as_i32());
}
