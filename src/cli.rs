use std::path::PathBuf;

use clap::Parser;

use crate::logging::LogArgs;

#[derive(Debug, Parser)]
#[command(
    name = "timer-stability",
    about = "Measure periodic timer jitter across processes, optionally under I/O load"
)]
pub struct Cli {
    /// Timer firings per report line (default: 1000)
    #[arg(long = "iterations")]
    pub iterations: Option<u64>,

    /// Timer period in microseconds (default: 10000)
    #[arg(long = "freq")]
    pub freq: Option<u64>,

    /// Number of timer processes
    #[arg(long = "nprocs")]
    pub nprocs: Option<usize>,

    /// Sleep this long (us) on each timer firing
    #[arg(long = "yield")]
    pub yield_us: Option<u64>,

    /// Percentage of firings that yield (0-100, default: 100)
    #[arg(long = "yieldpct")]
    pub yield_pct: Option<u32>,

    /// Drive samples with a sleep loop instead of a signal timer
    #[arg(long = "use-sleep")]
    pub use_sleep: bool,

    /// Block between timer signals instead of spinning
    #[arg(long = "no-busy-loop")]
    pub no_busy_loop: bool,

    /// Number of I/O load generator processes (default: 0)
    #[arg(long = "io-procs")]
    pub io_procs: Option<usize>,

    /// I/O block size in bytes (default: 16384)
    #[arg(long = "io-bs")]
    pub io_bs: Option<usize>,

    /// Blocks written per I/O pass (default: 20000)
    #[arg(long = "io-count")]
    pub io_count: Option<u64>,

    /// Seconds to wait between I/O passes (default: 4)
    #[arg(long = "io-wait")]
    pub io_wait: Option<u64>,

    /// Directory for the I/O scratch files (default: /tmp)
    #[arg(long = "io-dir")]
    pub io_dir: Option<PathBuf>,

    /// Base seed for the yield decision RNG (default: derived from pid and time)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Configuration file path (default: /etc/timer-stability.toml)
    #[arg(long = "config")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,
}
