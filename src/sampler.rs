use std::thread;
use std::time::Duration;

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};

use crate::clock::{self, Clock};
use crate::config::TimerConfig;
use crate::cpustat::{self, CpuAccounting, CpuSnapshot};
use crate::report::WindowReport;
use crate::window::Window;

/// Yield decisions are drawn uniformly from `0..YIELD_DRAW_RANGE`.
const YIELD_DRAW_RANGE: u32 = 10_000;

/// Probabilistic sleep injected on timer firings.
pub struct SyntheticYield {
    duration: Option<Duration>,
    threshold: u32,
    rng: ChaCha20Rng,
}

impl SyntheticYield {
    pub fn new(duration: Option<Duration>, pct: u32, seed: u64) -> Self {
        Self {
            duration,
            threshold: pct.min(100) * 100,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, 0, 0)
    }

    /// Whether this firing should yield.
    pub fn roll(&mut self) -> bool {
        if self.duration.is_none() {
            return false;
        }
        self.rng.next_u32() % YIELD_DRAW_RANGE < self.threshold
    }

    pub fn maybe_yield(&mut self) -> bool {
        if !self.roll() {
            return false;
        }
        if let Some(d) = self.duration {
            thread::sleep(d);
        }
        true
    }
}

/// Seed for one process's yield RNG.
///
/// A configured base seed gives reproducible, still distinct, streams per
/// process index; otherwise the seed mixes the pid with the current time.
pub fn process_seed(base: Option<u64>, index: usize) -> u64 {
    match base {
        Some(b) => b ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
        None => clock::realtime_micros() ^ ((std::process::id() as u64) << 32),
    }
}

struct OpenWindow {
    last_time: u64,
    start: Option<CpuSnapshot>,
    gaps: Window,
}

/// Per-process timer sampler: turns firings into gaps and gaps into
/// window reports.
///
/// Idle until the first firing opens a window; that firing only sets the
/// baseline. Every later firing adds one gap, and the W-th gap closes the
/// window, yields a report and returns the sampler to idle.
pub struct PeriodicSampler<C: CpuAccounting> {
    iterations: u64,
    period_us: u64,
    pid: u32,
    clock: Clock,
    accounting: C,
    yielder: SyntheticYield,
    open: Option<OpenWindow>,
    accounting_warned: bool,
}

impl<C: CpuAccounting> PeriodicSampler<C> {
    pub fn new(config: &TimerConfig, accounting: C, yielder: SyntheticYield) -> Self {
        Self {
            iterations: config.iterations,
            period_us: config.period_us,
            pid: std::process::id(),
            clock: Clock::new(),
            accounting,
            yielder,
            open: None,
            accounting_warned: false,
        }
    }

    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        self.open.is_none()
    }

    /// Gaps accumulated in the open window.
    pub fn pending_gaps(&self) -> u64 {
        self.open.as_ref().map_or(0, |w| w.gaps.count())
    }

    /// Handle a firing observed now.
    pub fn on_firing(&mut self) -> Option<WindowReport> {
        let ts = self.clock.now();
        self.on_sample(ts)
    }

    /// Handle a firing whose raw wall-clock time was captured elsewhere.
    pub fn on_raw_firing(&mut self, raw_us: u64) -> Option<WindowReport> {
        let ts = self.clock.observe(raw_us);
        self.on_sample(ts)
    }

    pub fn on_sample(&mut self, timestamp: u64) -> Option<WindowReport> {
        if self.open.is_none() {
            let start = self.snapshot();
            self.open = Some(OpenWindow {
                last_time: timestamp,
                start,
                gaps: Window::new(),
            });
            self.yielder.maybe_yield();
            return None;
        }

        self.yielder.maybe_yield();

        let open = self.open.as_mut()?;
        open.gaps.add_gap(timestamp.saturating_sub(open.last_time));
        open.last_time = timestamp;

        if open.gaps.count() < self.iterations {
            return None;
        }

        let closed = self.open.take()?;
        let stats = closed.gaps.stats()?;
        let end = match closed.start {
            Some(_) => self.snapshot(),
            None => None,
        };

        Some(WindowReport {
            pid: self.pid,
            stats,
            period_us: self.period_us,
            steal_pct: cpustat::steal_percent(closed.start.as_ref(), end.as_ref()),
        })
    }

    fn snapshot(&mut self) -> Option<CpuSnapshot> {
        match self.accounting.read_snapshot() {
            Ok(snap) => Some(snap),
            Err(e) => {
                if !self.accounting_warned {
                    log::warn!(
                        target: "timer_stability::sampler",
                        "{}; steal percentage reported as {}",
                        e, cpustat::STEAL_UNAVAILABLE,
                    );
                    self.accounting_warned = true;
                }
                None
            }
        }
    }
}
