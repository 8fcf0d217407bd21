use std::io::{self, Write};
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crate::clock;
use crate::config::{Config, SamplingMode};
use crate::cpustat::{CpuAccounting, ProcStat};
use crate::error::Error;
use crate::report::ReportEmitter;
use crate::sampler::{self, PeriodicSampler, SyntheticYield};

static FIRINGS: AtomicU64 = AtomicU64::new(0);
static LAST_FIRING_US: AtomicU64 = AtomicU64::new(0);

/// Real-time signal the periodic timer is delivered on.
pub fn timer_signal() -> libc::c_int {
    libc::SIGRTMAX() - 2
}

extern "C" fn on_timer_signal(_sig: libc::c_int) {
    LAST_FIRING_US.store(clock::realtime_micros(), Ordering::Release);
    FIRINGS.fetch_add(1, Ordering::Release);
}

fn install_timer_handler(sig: libc::c_int) -> Result<(), Error> {
    unsafe {
        let mut sa: libc::sigaction = mem::zeroed();
        sa.sa_sigaction = on_timer_signal as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaddset(&mut sa.sa_mask, sig);
        if libc::sigaction(sig, &sa, ptr::null_mut()) != 0 {
            return Err(Error::Timer(format!(
                "sigaction: {}",
                io::Error::last_os_error()
            )));
        }
    }
    Ok(())
}

/// Block `sig` for this thread and return the mask to wait with, which
/// has `sig` unblocked.
fn block_timer_signal(sig: libc::c_int) -> Result<libc::sigset_t, Error> {
    unsafe {
        let mut set: libc::sigset_t = mem::zeroed();
        let mut old: libc::sigset_t = mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, sig);
        let rc = libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut old);
        if rc != 0 {
            return Err(Error::Timer(format!(
                "pthread_sigmask: {}",
                io::Error::from_raw_os_error(rc)
            )));
        }
        libc::sigdelset(&mut old, sig);
        Ok(old)
    }
}

fn to_timespec(d: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    }
}

/// Repeating CLOCK_REALTIME timer; deleted on drop.
pub struct PosixTimer {
    id: libc::timer_t,
}

impl PosixTimer {
    /// Create a timer that first fires after `period` and then every `period`.
    pub fn arm(signo: libc::c_int, period: Duration) -> Result<Self, Error> {
        let mut sev: libc::sigevent = unsafe { mem::zeroed() };
        sev.sigev_notify = libc::SIGEV_SIGNAL;
        sev.sigev_signo = signo;

        let mut id: libc::timer_t = ptr::null_mut();
        if unsafe { libc::timer_create(libc::CLOCK_REALTIME, &mut sev, &mut id) } != 0 {
            return Err(Error::Timer(format!(
                "timer_create: {}",
                io::Error::last_os_error()
            )));
        }
        let timer = PosixTimer { id };

        let ts = to_timespec(period);
        let spec = libc::itimerspec {
            it_interval: ts,
            it_value: ts,
        };
        if unsafe { libc::timer_settime(timer.id, 0, &spec, ptr::null_mut()) } != 0 {
            return Err(Error::Timer(format!(
                "timer_settime: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(timer)
    }
}

impl Drop for PosixTimer {
    fn drop(&mut self) {
        unsafe {
            libc::timer_delete(self.id);
        }
    }
}

/// A firing picked up from the signal handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Firing {
    raw_us: u64,
    /// Firings folded into this one because the loop was busy.
    coalesced: u64,
}

/// Read a (count, timestamp) pair that belongs to the same firing.
///
/// The handler stores the timestamp before bumping the count, so a firing
/// landing between the two loads shows up as a count change and the pair is
/// read again.
fn read_consistent(count: impl Fn() -> u64, stamp: impl Fn() -> u64) -> (u64, u64) {
    loop {
        let before = count();
        let raw_us = stamp();
        if count() == before {
            return (before, raw_us);
        }
    }
}

struct FiringWatch {
    seen: u64,
}

impl FiringWatch {
    fn new() -> Self {
        Self {
            seen: FIRINGS.load(Ordering::Acquire),
        }
    }

    fn poll(&mut self) -> Option<Firing> {
        let current = read_consistent(
            || FIRINGS.load(Ordering::Acquire),
            || LAST_FIRING_US.load(Ordering::Acquire),
        );
        self.observe(current)
    }

    fn observe(&mut self, (fired, raw_us): (u64, u64)) -> Option<Firing> {
        if fired == self.seen {
            return None;
        }
        let coalesced = fired.wrapping_sub(self.seen).saturating_sub(1);
        self.seen = fired;
        Some(Firing { raw_us, coalesced })
    }
}

/// Sample on every timer signal. Never returns unless setup or output fails.
///
/// With `busy_loop` the process spins between firings; otherwise it sleeps
/// in `sigsuspend` with the timer signal blocked everywhere else, so a
/// firing can't slip in between the check and the wait.
pub fn run_signal_driven<C: CpuAccounting, W: Write>(
    sampler: &mut PeriodicSampler<C>,
    emitter: &mut ReportEmitter<W>,
    period: Duration,
    busy_loop: bool,
) -> Result<(), Error> {
    let sig = timer_signal();
    install_timer_handler(sig)?;
    let wait_mask = if busy_loop {
        None
    } else {
        Some(block_timer_signal(sig)?)
    };

    let mut watch = FiringWatch::new();
    let _timer = PosixTimer::arm(sig, period)?;
    log::info!(
        target: "timer_stability::timer",
        "armed {}us timer on signal {} ({})",
        period.as_micros(),
        sig,
        if busy_loop { "busy loop" } else { "blocking" },
    );

    loop {
        let firing = match watch.poll() {
            Some(f) => f,
            None => {
                match wait_mask {
                    Some(ref mask) => unsafe {
                        libc::sigsuspend(mask);
                    },
                    None => std::hint::spin_loop(),
                }
                continue;
            }
        };

        if firing.coalesced > 0 {
            log::debug!(
                target: "timer_stability::timer",
                "{} firings coalesced while sampling ({} gaps in window)",
                firing.coalesced,
                sampler.pending_gaps(),
            );
        }

        if let Some(report) = sampler.on_raw_firing(firing.raw_us) {
            emitter.window(&report)?;
        }
    }
}

fn sleep_poll_once<C: CpuAccounting, W: Write>(
    sampler: &mut PeriodicSampler<C>,
    emitter: &mut ReportEmitter<W>,
    period: Duration,
) -> Result<(), Error> {
    if let Some(report) = sampler.on_firing() {
        emitter.window(&report)?;
    }
    thread::sleep(period);
    Ok(())
}

/// Sample once per period using plain sleeps. Never returns unless output fails.
pub fn run_sleep_polled<C: CpuAccounting, W: Write>(
    sampler: &mut PeriodicSampler<C>,
    emitter: &mut ReportEmitter<W>,
    period: Duration,
) -> Result<(), Error> {
    log::info!(
        target: "timer_stability::timer",
        "sleep-polling every {}us",
        period.as_micros(),
    );
    loop {
        sleep_poll_once(sampler, emitter, period)?;
    }
}

/// Work loop of a timer-sampler process.
pub fn run(config: &Config, index: usize) -> Result<(), Error> {
    let t = &config.timer;
    let yielder = SyntheticYield::new(
        t.yield_duration(),
        t.yield_pct,
        sampler::process_seed(t.seed, index),
    );
    let mut sampler = PeriodicSampler::new(t, ProcStat::new(), yielder);
    let mut emitter = ReportEmitter::stdout();

    match t.mode {
        SamplingMode::Signal => {
            run_signal_driven(&mut sampler, &mut emitter, t.period(), t.busy_loop)
        }
        SamplingMode::Sleep => run_sleep_polled(&mut sampler, &mut emitter, t.period()),
    }
}
