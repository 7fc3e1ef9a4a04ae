//! Producer - writes length-prefixed messages into a shared log region
//!
//! Creates the region, activates it and appends one message per second.
//! When the term fills up it is recycled in place.
//!
//! Usage:
//! ```bash
//! RUST_LOG=debug cargo run --example producer
//! ```

use std::thread;
use std::time::Duration;

use termlog_core::descriptor::{HIGH_WATER_MARK_OFFSET, TAIL_COUNTER_OFFSET};
use termlog_core::{LogRegion, Status};
use tracing_subscriber::EnvFilter;

const REGION_NAME: &str = "/termlog_demo";
const TERM_LENGTH: usize = 64 * 1024;
const HEADER_LENGTH: usize = 4;
const ALIGNMENT: usize = 8;

fn align(value: usize) -> usize {
    (value + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let region = LogRegion::create(REGION_NAME, TERM_LENGTH)?;
    let lb = region.log_buffer()?;
    lb.clean();
    lb.status_ordered(Status::Active);
    println!("Created region {} ({} bytes)", region.name(), lb.capacity());

    let mut tail = 0usize;
    for seq in 0u64.. {
        let message = format!("Hello World! {}", seq);
        let frame_length = align(HEADER_LENGTH + message.len());

        if tail + frame_length > TERM_LENGTH {
            // single writer: recycle the term ourselves
            lb.status_ordered(Status::NeedsCleaning);
            if lb.try_clean() {
                lb.status_ordered(Status::Active);
            }
            tail = 0;
            println!("Term recycled");
        }

        lb.log_buffer().put_bytes(tail + HEADER_LENGTH, message.as_bytes());
        lb.log_buffer().put_i32(tail, message.len() as i32);
        tail += frame_length;
        lb.state_buffer().put_i32_ordered(TAIL_COUNTER_OFFSET, tail as i32);
        lb.state_buffer().put_i32_ordered(HIGH_WATER_MARK_OFFSET, tail as i32);

        println!("Offered: {}", message);
        thread::sleep(Duration::from_secs(1));
    }

    Ok(())
}
