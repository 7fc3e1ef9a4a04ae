//! Consumer - polls a shared log region for messages
//!
//! Opens the region written by the producer and drains messages as the tail
//! advances. The idle strategy comes from `TERMLOG_IDLE_STRATEGY`
//! (busy-spin, noop, yielding, sleeping, backoff).
//!
//! Usage:
//! ```bash
//! TERMLOG_IDLE_STRATEGY=backoff cargo run --example consumer
//! ```

use termlog_core::{IdleStrategyKind, LogRegion, Status};
use tracing_subscriber::EnvFilter;

const REGION_NAME: &str = "/termlog_demo";
const HEADER_LENGTH: usize = 4;
const ALIGNMENT: usize = 8;

fn align(value: usize) -> usize {
    (value + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Payload length of a frame, if the prefix fits in the `available` bytes
/// that follow the header
fn frame_length(raw: i32, available: usize) -> Option<usize> {
    usize::try_from(raw).ok().filter(|&length| length <= available)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let kind = IdleStrategyKind::from_env()?;
    let mut idle = kind.build();

    let region = LogRegion::open(REGION_NAME)?;
    let lb = region.log_buffer()?;
    println!(
        "Opened region {} ({} bytes), idle strategy {}",
        region.name(),
        lb.capacity(),
        kind.name()
    );

    let mut position = 0usize;
    loop {
        if lb.status() != Some(Status::Active) {
            idle.idle(0);
            continue;
        }

        let tail = lb.tail_volatile() as usize;
        if tail < position {
            // term was recycled underneath us
            position = 0;
        }

        let mut work_count = 0;
        while position + HEADER_LENGTH <= tail {
            let raw = lb.log_buffer().get_i32(position);
            let Some(length) = frame_length(raw, tail - position - HEADER_LENGTH) else {
                tracing::warn!(position, raw, tail, "bad frame length, skipping to tail");
                position = tail;
                break;
            };
            let mut payload = vec![0u8; length];
            lb.log_buffer().get_bytes(position + HEADER_LENGTH, &mut payload);
            println!("Received: {}", String::from_utf8_lossy(&payload));

            position += align(HEADER_LENGTH + length);
            work_count += 1;
        }

        idle.idle(work_count);
    }
}
