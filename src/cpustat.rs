use std::fs;

use crate::error::Error;

/// Printed in place of the steal percentage when accounting is unavailable.
pub const STEAL_UNAVAILABLE: f64 = -0.1;

/// Cumulative CPU tick counters from the aggregate `cpu` line of /proc/stat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuSnapshot {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuSnapshot {
    /// Parse the first line of /proc/stat: `cpu` followed by at least eight counters.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let line = content
            .lines()
            .next()
            .ok_or_else(|| Error::Accounting("empty accounting source".into()))?;
        let mut fields = line.split_whitespace();
        if fields.next() != Some("cpu") {
            return Err(Error::Accounting("missing aggregate cpu line".into()));
        }

        let mut vals = [0u64; 8];
        for (i, slot) in vals.iter_mut().enumerate() {
            let field = fields.next().ok_or_else(|| {
                Error::Accounting(format!("expected 8 fields, got {}", i))
            })?;
            *slot = field
                .parse()
                .map_err(|_| Error::Accounting(format!("bad counter {:?}", field)))?;
        }

        Ok(Self {
            user: vals[0],
            nice: vals[1],
            system: vals[2],
            idle: vals[3],
            iowait: vals[4],
            irq: vals[5],
            softirq: vals[6],
            steal: vals[7],
        })
    }

    pub fn total(&self) -> u64 {
        self.user
            .wrapping_add(self.nice)
            .wrapping_add(self.system)
            .wrapping_add(self.idle)
            .wrapping_add(self.iowait)
            .wrapping_add(self.irq)
            .wrapping_add(self.softirq)
            .wrapping_add(self.steal)
    }
}

/// Percentage of elapsed CPU time stolen by the hypervisor between two
/// snapshots, or [`STEAL_UNAVAILABLE`] if either snapshot is missing or no
/// ticks elapsed.
pub fn steal_percent(start: Option<&CpuSnapshot>, end: Option<&CpuSnapshot>) -> f64 {
    let (start, end) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => return STEAL_UNAVAILABLE,
    };
    let elapsed = end.total().saturating_sub(start.total());
    if elapsed == 0 {
        return STEAL_UNAVAILABLE;
    }
    let stolen = end.steal.saturating_sub(start.steal).min(elapsed);
    100.0 * stolen as f64 / elapsed as f64
}

/// Source of CPU accounting snapshots.
pub trait CpuAccounting {
    fn read_snapshot(&mut self) -> Result<CpuSnapshot, Error>;
}

/// Reads snapshots from /proc/stat.
pub struct ProcStat {
    path: &'static str,
}

impl ProcStat {
    pub fn new() -> Self {
        Self { path: "/proc/stat" }
    }
}

impl CpuAccounting for ProcStat {
    fn read_snapshot(&mut self) -> Result<CpuSnapshot, Error> {
        let content = fs::read_to_string(self.path)
            .map_err(|e| Error::Accounting(format!("can not open {}: {}", self.path, e)))?;
        CpuSnapshot::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "cpu  4705 356 584 3699176 23060 0 277 12 0 0\n\
                          cpu0 1393 280 290 924254 8170 0 106 3 0 0\n\
                          intr 114930548 113199788 3 0 5 263 0 4 [... lots more numbers ...]\n";

    #[test]
    fn test_parse_aggregate_line() {
        let s = CpuSnapshot::parse(SAMPLE).unwrap();
        assert_eq!(s.user, 4705);
        assert_eq!(s.nice, 356);
        assert_eq!(s.system, 584);
        assert_eq!(s.idle, 3699176);
        assert_eq!(s.iowait, 23060);
        assert_eq!(s.irq, 0);
        assert_eq!(s.softirq, 277);
        assert_eq!(s.steal, 12);
        assert_eq!(s.total(), 4705 + 356 + 584 + 3699176 + 23060 + 277 + 12);
    }

    #[test]
    fn test_parse_too_few_fields() {
        let err = CpuSnapshot::parse("cpu 1 2 3 4 5\n").unwrap_err();
        match err {
            Error::Accounting(msg) => assert!(msg.contains("got 5")),
            other => panic!("expected Error::Accounting, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_non_cpu_or_empty() {
        assert!(CpuSnapshot::parse("").is_err());
        assert!(CpuSnapshot::parse("cpu0 1 2 3 4 5 6 7 8\n").is_err());
        assert!(CpuSnapshot::parse("cpu 1 2 3 x 5 6 7 8\n").is_err());
    }

    #[test]
    fn test_steal_percent() {
        let start = CpuSnapshot {
            user: 100,
            idle: 800,
            steal: 100,
            ..Default::default()
        };
        let end = CpuSnapshot {
            user: 150,
            idle: 1000,
            steal: 150,
            ..Default::default()
        };
        // 50 stolen out of 300 elapsed ticks.
        let pct = steal_percent(Some(&start), Some(&end));
        assert!((pct - 50.0 / 3.0).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&pct));
    }

    #[test]
    fn test_steal_percent_sentinel() {
        let snap = CpuSnapshot {
            user: 5,
            steal: 1,
            ..Default::default()
        };
        assert_eq!(steal_percent(None, Some(&snap)), STEAL_UNAVAILABLE);
        assert_eq!(steal_percent(Some(&snap), None), STEAL_UNAVAILABLE);
        // No ticks elapsed must not divide by zero.
        assert_eq!(steal_percent(Some(&snap), Some(&snap)), STEAL_UNAVAILABLE);
    }

    #[test]
    fn test_read_proc_stat() {
        let mut reader = ProcStat::new();
        match reader.read_snapshot() {
            Ok(snap) => assert!(snap.total() > 0),
            // Restricted environments may hide or truncate /proc/stat.
            Err(Error::Accounting(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}
