/// Summary statistics of one completed window of gaps (microseconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Running aggregates over the gaps of one window.
///
/// Gaps are folded in one at a time; nothing but the five aggregates is kept.
#[derive(Debug, Clone)]
pub struct Window {
    count: u64,
    sum: u64,
    sum_sq: u128,
    min: u64,
    max: u64,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0,
            sum_sq: 0,
            min: u64::MAX,
            max: 0,
        }
    }
}

impl Window {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn add_gap(&mut self, gap: u64) {
        self.count += 1;
        self.sum = self.sum.wrapping_add(gap);
        self.sum_sq = self.sum_sq.wrapping_add(gap as u128 * gap as u128);
        self.min = self.min.min(gap);
        self.max = self.max.max(gap);
    }

    /// Statistics for the gaps seen so far, `None` if there are none.
    pub fn stats(&self) -> Option<WindowStats> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(WindowStats {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.sum as f64 / n,
            std_dev: population_std_dev(self.count, self.sum, self.sum_sq),
        })
    }
}

/// Population standard deviation as `sqrt(n·Σx² − (Σx)²) / n`.
///
/// The radicand is evaluated in exact integer arithmetic while it fits in
/// u128, where it is never negative. Beyond that it falls back to f64 and a
/// negative cancellation residue is treated as zero.
fn population_std_dev(n: u64, sum: u64, sum_sq: u128) -> f64 {
    let n128 = n as u128;
    let sum128 = sum as u128;
    let exact = n128
        .checked_mul(sum_sq)
        .zip(sum128.checked_mul(sum128))
        .map(|(a, b)| a.saturating_sub(b));

    let radicand = match exact {
        Some(r) => r as f64,
        None => {
            let r = n as f64 * sum_sq as f64 - sum as f64 * sum as f64;
            r.max(0.0)
        }
    };
    radicand.sqrt() / n as f64
}
