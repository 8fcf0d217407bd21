use std::fmt;
use std::io::{self, Write};

use crate::window::WindowStats;

/// One completed timer window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowReport {
    pub pid: u32,
    pub stats: WindowStats,
    pub period_us: u64,
    /// Steal percentage, or the -0.1 sentinel when accounting was unavailable.
    pub steal_pct: f64,
}

impl WindowReport {
    pub fn dev_pct(&self) -> f64 {
        self.stats.std_dev / self.period_us as f64 * 100.0
    }
}

impl fmt::Display for WindowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T> P: {}, I: {}, Min: {}, Max: {}, Avg: {:7.1}, Dev: {:5.1}% ({:4.2}), Steal pct: {:5.1}%",
            self.pid,
            self.stats.count,
            self.stats.min,
            self.stats.max,
            self.stats.mean,
            self.dev_pct(),
            self.stats.std_dev,
            self.steal_pct
        )
    }
}

/// One load-generator pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub pid: u32,
    pub bytes: u64,
    pub elapsed_us: u64,
}

impl PassReport {
    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / 1_000_000.0
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_us as f64 / 1_000_000.0
    }

    /// Bytes per microsecond is numerically MB/s.
    pub fn mb_per_sec(&self) -> f64 {
        if self.elapsed_us == 0 {
            return 0.0;
        }
        self.bytes as f64 / self.elapsed_us as f64
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "I> P: {}, MBytes: {:5.1}, Time (s): {:4.1}, MB/s: {:5.1}",
            self.pid,
            self.megabytes(),
            self.elapsed_secs(),
            self.mb_per_sec()
        )
    }
}

/// Writes report lines, flushing after each so forked processes never
/// share or lose buffered output.
pub struct ReportEmitter<W: Write> {
    out: W,
}

impl ReportEmitter<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ReportEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn line(&mut self, line: &dyn fmt::Display) -> io::Result<()> {
        writeln!(self.out, "{}", line)?;
        self.out.flush()
    }

    pub fn window(&mut self, report: &WindowReport) -> io::Result<()> {
        self.line(report)
    }

    pub fn pass(&mut self, report: &PassReport) -> io::Result<()> {
        self.line(report)
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_window() -> WindowReport {
        WindowReport {
            pid: 4242,
            stats: WindowStats {
                count: 3,
                min: 9600,
                max: 10200,
                mean: 29800.0 / 3.0,
                std_dev: 249.4438,
            },
            period_us: 10_000,
            steal_pct: 1.3,
        }
    }

    #[test]
    fn test_window_line_format() {
        let line = sample_window().to_string();
        assert_eq!(
            line,
            "T> P: 4242, I: 3, Min: 9600, Max: 10200, Avg:  9933.3, Dev:   2.5% (249.44), Steal pct:   1.3%"
        );
    }

    #[test]
    fn test_window_line_sentinel() {
        let mut r = sample_window();
        r.steal_pct = crate::cpustat::STEAL_UNAVAILABLE;
        assert!(r.to_string().ends_with("Steal pct:  -0.1%"));
    }

    #[test]
    fn test_pass_line_format() {
        let r = PassReport {
            pid: 7,
            bytes: 100 * 4096,
            elapsed_us: 200_000,
        };
        assert_eq!(r.megabytes(), 0.4096);
        assert_eq!(r.elapsed_secs(), 0.2);
        assert!((r.mb_per_sec() - 2.048).abs() < 1e-12);
        assert_eq!(
            r.to_string(),
            "I> P: 7, MBytes:   0.4, Time (s):  0.2, MB/s:   2.0"
        );
    }

    #[test]
    fn test_pass_zero_elapsed() {
        let r = PassReport {
            pid: 1,
            bytes: 4096,
            elapsed_us: 0,
        };
        assert_eq!(r.mb_per_sec(), 0.0);
    }

    #[test]
    fn test_emitter_writes_one_line_per_report() {
        let mut emitter = ReportEmitter::new(Vec::new());
        emitter.window(&sample_window()).unwrap();
        emitter
            .pass(&PassReport {
                pid: 7,
                bytes: 1_000_000,
                elapsed_us: 1_000_000,
            })
            .unwrap();
        emitter.line(&"Spawning 1 timer processes...").unwrap();
        let text = String::from_utf8(emitter.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("T> P: 4242"));
        assert!(lines[1].starts_with("I> P: 7, MBytes:   1.0"));
        assert_eq!(lines[2], "Spawning 1 timer processes...");
    }
}
