/// Reads CLOCK_REALTIME in microseconds.
///
/// Only calls `clock_gettime`, so it is safe to use from a signal handler.
pub fn realtime_micros() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
    }
    (ts.tv_sec as u64)
        .wrapping_mul(1_000_000)
        .wrapping_add(ts.tv_nsec as u64 / 1_000)
}

/// Wall clock that never goes backwards within one process.
///
/// A reading earlier than the previous one is clamped to the previous
/// value so a clock step-back shows up as a zero gap, never a negative one.
#[derive(Debug, Default)]
pub struct Clock {
    last: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&mut self) -> u64 {
        self.observe(realtime_micros())
    }

    /// Feed a raw reading taken elsewhere (e.g. in the signal handler).
    pub fn observe(&mut self, raw: u64) -> u64 {
        if raw < self.last {
            return self.last;
        }
        self.last = raw;
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_clamps_step_back() {
        let mut clock = Clock::new();
        assert_eq!(clock.observe(1_000), 1_000);
        assert_eq!(clock.observe(2_500), 2_500);
        assert_eq!(clock.observe(2_000), 2_500);
        assert_eq!(clock.observe(2_500), 2_500);
        assert_eq!(clock.observe(3_000), 3_000);
    }

    #[test]
    fn test_now_is_non_decreasing() {
        let mut clock = Clock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let t = clock.now();
            assert!(t >= prev);
            prev = t;
        }
    }

    #[test]
    fn test_now_after_step_back_holds_last() {
        let mut clock = Clock::new();
        let far_future = realtime_micros() + 3_600_000_000;
        clock.observe(far_future);
        assert_eq!(clock.now(), far_future);
    }

    #[test]
    fn test_realtime_is_plausible() {
        // 2020-01-01 in microseconds since the epoch.
        assert!(realtime_micros() > 1_577_836_800_000_000);
    }
}
