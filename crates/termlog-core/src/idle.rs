//! Idle strategies for poll loops
//!
//! A poll loop calls [`IdleStrategy::idle`] once per iteration with the amount
//! of work it just did. Strategies decide whether to poll again immediately
//! or wait first. All of them share the one-method contract so they can be
//! swapped without touching the loop:
//!
//! ```
//! use termlog_core::{BusySpinIdleStrategy, IdleStrategy};
//!
//! let mut idle = BusySpinIdleStrategy::new();
//! let mut remaining = 3;
//! while remaining > 0 {
//!     let work_count = 1; // drain something here
//!     remaining -= work_count;
//!     idle.idle(work_count);
//! }
//! ```
//!
//! Instances are thread-confined: each polling thread owns its own.

use crate::{Error, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_SPINS: u64 = 10;
pub const DEFAULT_MAX_YIELDS: u64 = 20;
pub const DEFAULT_MIN_PARK_PERIOD: Duration = Duration::from_micros(1);
pub const DEFAULT_MAX_PARK_PERIOD: Duration = Duration::from_millis(1);
pub const DEFAULT_SLEEP_PERIOD: Duration = Duration::from_millis(1);

/// Environment variable read by [`IdleStrategyKind::from_env`]
pub const IDLE_STRATEGY_ENV: &str = "TERMLOG_IDLE_STRATEGY";

/// Wait policy invoked between poll-loop iterations
pub trait IdleStrategy {
    /// Called after each iteration; `work_count == 0` means nothing was done
    fn idle(&mut self, work_count: i32);

    /// Forget any accumulated backoff state
    fn reset(&mut self) {}
}

impl<S: IdleStrategy + ?Sized> IdleStrategy for Box<S> {
    #[inline]
    fn idle(&mut self, work_count: i32) {
        (**self).idle(work_count)
    }

    #[inline]
    fn reset(&mut self) {
        (**self).reset()
    }
}

impl<S: IdleStrategy + ?Sized> IdleStrategy for &mut S {
    #[inline]
    fn idle(&mut self, work_count: i32) {
        (**self).idle(work_count)
    }

    #[inline]
    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Low-level wait used by spinning strategies
pub trait WaitPrimitive {
    fn wait(&mut self);
}

/// CPU pause/yield hint (`pause` on x86, `yield` on aarch64)
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuPause;

impl WaitPrimitive for CpuPause {
    #[inline(always)]
    fn wait(&mut self) {
        std::hint::spin_loop();
    }
}

/// Spins with a CPU hint when idle; never sleeps
#[derive(Debug, Clone, Default)]
pub struct BusySpinIdleStrategy<W = CpuPause> {
    wait: W,
}

impl BusySpinIdleStrategy {
    pub fn new() -> Self {
        Self { wait: CpuPause }
    }
}

impl<W: WaitPrimitive> BusySpinIdleStrategy<W> {
    /// Spin with a custom wait primitive
    pub fn with_wait(wait: W) -> Self {
        Self { wait }
    }

    pub fn wait_primitive(&self) -> &W {
        &self.wait
    }
}

impl<W: WaitPrimitive> IdleStrategy for BusySpinIdleStrategy<W> {
    #[inline]
    fn idle(&mut self, work_count: i32) {
        if work_count > 0 {
            return;
        }
        self.wait.wait();
    }
}

/// Never waits
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpIdleStrategy;

impl IdleStrategy for NoOpIdleStrategy {
    #[inline]
    fn idle(&mut self, _work_count: i32) {}
}

/// Yields the thread when idle
#[derive(Debug, Clone, Copy, Default)]
pub struct YieldingIdleStrategy;

impl IdleStrategy for YieldingIdleStrategy {
    #[inline]
    fn idle(&mut self, work_count: i32) {
        if work_count > 0 {
            return;
        }
        std::thread::yield_now();
    }
}

/// Sleeps for a fixed period when idle
#[derive(Debug, Clone, Copy)]
pub struct SleepingIdleStrategy {
    period: Duration,
}

impl SleepingIdleStrategy {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for SleepingIdleStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_SLEEP_PERIOD)
    }
}

impl IdleStrategy for SleepingIdleStrategy {
    #[inline]
    fn idle(&mut self, work_count: i32) {
        if work_count > 0 {
            return;
        }
        std::thread::sleep(self.period);
    }
}

/// Phase of a [`BackoffIdleStrategy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffState {
    NotIdle,
    Spinning,
    Yielding,
    Parking,
}

/// Spin, then yield, then park with exponentially growing periods
///
/// Any iteration that does work drops back to the start.
#[derive(Debug, Clone)]
pub struct BackoffIdleStrategy<W = CpuPause> {
    max_spins: u64,
    max_yields: u64,
    min_park_period: Duration,
    max_park_period: Duration,
    state: BackoffState,
    spins: u64,
    yields: u64,
    park_period: Duration,
    wait: W,
}

impl BackoffIdleStrategy {
    pub fn new(
        max_spins: u64,
        max_yields: u64,
        min_park_period: Duration,
        max_park_period: Duration,
    ) -> Result<Self> {
        Self::with_wait(max_spins, max_yields, min_park_period, max_park_period, CpuPause)
    }
}

impl Default for BackoffIdleStrategy {
    fn default() -> Self {
        Self::from_parts(
            DEFAULT_MAX_SPINS,
            DEFAULT_MAX_YIELDS,
            DEFAULT_MIN_PARK_PERIOD,
            DEFAULT_MAX_PARK_PERIOD,
            CpuPause,
        )
    }
}

impl<W: WaitPrimitive> BackoffIdleStrategy<W> {
    pub fn with_wait(
        max_spins: u64,
        max_yields: u64,
        min_park_period: Duration,
        max_park_period: Duration,
        wait: W,
    ) -> Result<Self> {
        if min_park_period > max_park_period {
            return Err(Error::InvalidIdleConfig(format!(
                "min park period {:?} exceeds max park period {:?}",
                min_park_period, max_park_period
            )));
        }
        Ok(Self::from_parts(
            max_spins,
            max_yields,
            min_park_period,
            max_park_period,
            wait,
        ))
    }

    fn from_parts(
        max_spins: u64,
        max_yields: u64,
        min_park_period: Duration,
        max_park_period: Duration,
        wait: W,
    ) -> Self {
        Self {
            max_spins,
            max_yields,
            min_park_period,
            max_park_period,
            state: BackoffState::NotIdle,
            spins: 0,
            yields: 0,
            park_period: min_park_period,
            wait,
        }
    }

    pub fn state(&self) -> BackoffState {
        self.state
    }

    /// Period the next park will use
    pub fn park_period(&self) -> Duration {
        self.park_period
    }

    pub fn wait_primitive(&self) -> &W {
        &self.wait
    }

    /// Doubled park period, saturating at the maximum
    fn next_park_period(&self) -> Duration {
        self.park_period
            .checked_mul(2)
            .map_or(self.max_park_period, |p| p.min(self.max_park_period))
    }
}

impl<W: WaitPrimitive> IdleStrategy for BackoffIdleStrategy<W> {
    fn idle(&mut self, work_count: i32) {
        if work_count > 0 {
            self.reset();
            return;
        }

        match self.state {
            BackoffState::NotIdle => {
                self.state = BackoffState::Spinning;
                self.spins = 1;
                self.wait.wait();
            }
            BackoffState::Spinning => {
                self.wait.wait();
                self.spins += 1;
                if self.spins > self.max_spins {
                    self.state = BackoffState::Yielding;
                    self.yields = 0;
                }
            }
            BackoffState::Yielding => {
                self.yields += 1;
                if self.yields > self.max_yields {
                    self.state = BackoffState::Parking;
                    self.park_period = self.min_park_period;
                } else {
                    std::thread::yield_now();
                }
            }
            BackoffState::Parking => {
                std::thread::park_timeout(self.park_period);
                self.park_period = self.next_park_period();
            }
        }
    }

    fn reset(&mut self) {
        self.spins = 0;
        self.yields = 0;
        self.park_period = self.min_park_period;
        self.state = BackoffState::NotIdle;
    }
}

/// Named idle strategy, for picking one from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdleStrategyKind {
    #[default]
    BusySpin,
    NoOp,
    Yielding,
    Sleeping,
    Backoff,
}

impl IdleStrategyKind {
    /// Build the strategy with default parameters
    pub fn build(self) -> Box<dyn IdleStrategy + Send> {
        match self {
            IdleStrategyKind::BusySpin => Box::new(BusySpinIdleStrategy::new()),
            IdleStrategyKind::NoOp => Box::new(NoOpIdleStrategy),
            IdleStrategyKind::Yielding => Box::new(YieldingIdleStrategy),
            IdleStrategyKind::Sleeping => Box::new(SleepingIdleStrategy::default()),
            IdleStrategyKind::Backoff => Box::new(BackoffIdleStrategy::default()),
        }
    }

    /// Read [`IDLE_STRATEGY_ENV`], defaulting to busy spin when unset
    pub fn from_env() -> Result<Self> {
        match std::env::var(IDLE_STRATEGY_ENV) {
            Ok(name) => name.parse(),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IdleStrategyKind::BusySpin => "busy-spin",
            IdleStrategyKind::NoOp => "noop",
            IdleStrategyKind::Yielding => "yielding",
            IdleStrategyKind::Sleeping => "sleeping",
            IdleStrategyKind::Backoff => "backoff",
        }
    }
}

impl FromStr for IdleStrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "busy-spin" | "busy_spin" | "busyspin" => Ok(IdleStrategyKind::BusySpin),
            "noop" | "no-op" => Ok(IdleStrategyKind::NoOp),
            "yielding" | "yield" => Ok(IdleStrategyKind::Yielding),
            "sleeping" | "sleep" => Ok(IdleStrategyKind::Sleeping),
            "backoff" => Ok(IdleStrategyKind::Backoff),
            _ => Err(Error::UnknownIdleStrategy(s.to_string())),
        }
    }
}
