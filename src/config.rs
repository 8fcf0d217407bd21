use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

/// How timer firings reach the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// Repeating POSIX timer delivering a real-time signal.
    Signal,
    /// Sleep for one period between samples.
    Sleep,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Samples per report window.
    pub iterations: u64,
    pub period_us: u64,
    pub processes: usize,
    /// Synthetic yield duration; `None` disables yielding.
    pub yield_us: Option<u64>,
    pub yield_pct: u32,
    pub mode: SamplingMode,
    pub busy_loop: bool,
    pub seed: Option<u64>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            period_us: 10_000,
            processes: 1,
            yield_us: None,
            yield_pct: 100,
            mode: SamplingMode::Signal,
            busy_loop: true,
            seed: None,
        }
    }
}

impl TimerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_micros(self.period_us)
    }

    pub fn yield_duration(&self) -> Option<Duration> {
        self.yield_us.map(Duration::from_micros)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub processes: usize,
    pub block_size: usize,
    /// Blocks transferred per pass.
    pub block_count: u64,
    pub wait_secs: u64,
    pub scratch_dir: PathBuf,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            processes: 0,
            block_size: 16_384,
            block_count: 20_000,
            wait_secs: 4,
            scratch_dir: PathBuf::from("/tmp"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timer: TimerConfig,
    pub load: LoadConfig,
}

impl Config {
    /// Reject settings the measurement cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        let t = &self.timer;
        if t.iterations == 0 {
            return Err(Error::InvalidArgs("iterations must be at least 1".into()));
        }
        if t.period_us == 0 {
            return Err(Error::InvalidArgs("timer period must be greater than 0".into()));
        }
        if t.processes == 0 {
            return Err(Error::InvalidArgs(format!(
                "invalid proc count: {}",
                t.processes
            )));
        }
        if t.yield_pct > 100 {
            return Err(Error::InvalidArgs(format!(
                "yield percentage value invalid: {}",
                t.yield_pct
            )));
        }
        if t.mode == SamplingMode::Sleep && t.yield_us.is_some() {
            return Err(Error::InvalidArgs(
                "yield time can not be used with sleep mode".into(),
            ));
        }
        if self.load.block_size == 0 {
            return Err(Error::InvalidArgs("I/O blocksize must be greater than 0".into()));
        }
        if (self.load.block_size as u64)
            .checked_mul(self.load.block_count)
            .is_none()
        {
            return Err(Error::InvalidArgs(format!(
                "I/O pass size overflows: {} x {} bytes",
                self.load.block_count, self.load.block_size
            )));
        }
        Ok(())
    }
}

/// Load configuration from a TOML file.
///
/// - If `explicit_path` is `Some` and the file is missing, returns an error.
/// - If `explicit_path` is `None`, tries `/etc/timer-stability.toml`; if missing, returns defaults.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config, Error> {
    let path = match explicit_path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::InvalidArgs(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => {
            let default = Path::new("/etc/timer-stability.toml");
            if !default.exists() {
                return Ok(Config::default());
            }
            default.to_path_buf()
        }
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| {
        Error::InvalidArgs(format!("failed to read config {}: {}", path.display(), e))
    })?;

    toml::from_str(&contents).map_err(|e| {
        Error::InvalidArgs(format!("failed to parse config {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.timer.iterations, 1000);
        assert_eq!(cfg.timer.period_us, 10_000);
        assert_eq!(cfg.timer.processes, 1);
        assert_eq!(cfg.timer.yield_us, None);
        assert_eq!(cfg.timer.yield_pct, 100);
        assert_eq!(cfg.timer.mode, SamplingMode::Signal);
        assert!(cfg.timer.busy_loop);
        assert_eq!(cfg.load.processes, 0);
        assert_eq!(cfg.load.block_size, 16_384);
        assert_eq!(cfg.load.block_count, 20_000);
        assert_eq!(cfg.load.wait_secs, 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut cfg = Config::default();
        cfg.timer.iterations = 0;
        assert!(matches!(cfg.validate(), Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn test_validate_rejects_zero_period_and_procs() {
        let mut cfg = Config::default();
        cfg.timer.period_us = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.timer.processes = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_yield_pct_bounds() {
        let mut cfg = Config::default();
        cfg.timer.yield_pct = 100;
        assert!(cfg.validate().is_ok());
        cfg.timer.yield_pct = 0;
        assert!(cfg.validate().is_ok());
        cfg.timer.yield_pct = 101;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_yield_in_sleep_mode() {
        let mut cfg = Config::default();
        cfg.timer.mode = SamplingMode::Sleep;
        assert!(cfg.validate().is_ok());
        cfg.timer.yield_us = Some(500);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_block_size() {
        let mut cfg = Config::default();
        cfg.load.block_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overflowing_pass_size() {
        let mut cfg = Config::default();
        cfg.load.block_size = 1 << 20;
        cfg.load.block_count = u64::MAX / 2;
        assert!(matches!(cfg.validate(), Err(Error::InvalidArgs(_))));

        cfg.load.block_count = 1 << 20;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_durations() {
        let mut cfg = TimerConfig::default();
        assert_eq!(cfg.period(), Duration::from_millis(10));
        assert_eq!(cfg.yield_duration(), None);
        cfg.yield_us = Some(1_500);
        assert_eq!(cfg.yield_duration(), Some(Duration::from_micros(1_500)));
    }

    #[test]
    fn test_toml_parsing() {
        let dir = std::env::temp_dir();
        let path = dir.join("timer_stability_test_config.toml");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            write!(
                f,
                r#"
[timer]
iterations = 50
period_us = 2000
mode = "sleep"

[load]
processes = 2
scratch_dir = "/var/tmp"
"#
            )
            .unwrap();
        }
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.timer.iterations, 50);
        assert_eq!(config.timer.period_us, 2000);
        assert_eq!(config.timer.mode, SamplingMode::Sleep);
        assert_eq!(config.load.processes, 2);
        assert_eq!(config.load.scratch_dir, PathBuf::from("/var/tmp"));
        // Unset fields should get defaults
        assert_eq!(config.timer.processes, 1);
        assert_eq!(config.load.block_size, 16_384);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_explicit_config_errors() {
        let path = std::path::Path::new("/tmp/timer_stability_nonexistent_config.toml");
        let result = load_config(Some(path));
        assert!(result.is_err());
    }
}
