mod cli;
mod clock;
mod config;
mod cpustat;
mod error;
mod fanout;
mod loadgen;
mod logging;
mod report;
mod sampler;
mod timer;
mod window;

use std::process;

use clap::Parser;

use cli::Cli;
use config::{Config, SamplingMode};
use error::Error;
use fanout::{Assignment, ForkSpawner, ProcessRole};
use report::ReportEmitter;

/// Build the run configuration by layering: defaults → TOML file → CLI overrides.
fn build_config(cli: &Cli) -> Result<Config, Error> {
    let mut cfg = match config::load_config(cli.config_file.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("{}", e);
            Config::default()
        }
    };

    // Apply CLI overrides (only if explicitly set)
    if let Some(v) = cli.iterations {
        cfg.timer.iterations = v;
    }
    if let Some(v) = cli.freq {
        cfg.timer.period_us = v;
    }
    if let Some(v) = cli.nprocs {
        cfg.timer.processes = v;
    }
    if let Some(v) = cli.yield_us {
        cfg.timer.yield_us = Some(v);
    }
    if let Some(v) = cli.yield_pct {
        cfg.timer.yield_pct = v;
    }
    if cli.use_sleep {
        cfg.timer.mode = SamplingMode::Sleep;
    }
    if cli.no_busy_loop {
        cfg.timer.busy_loop = false;
    }
    if let Some(v) = cli.seed {
        cfg.timer.seed = Some(v);
    }
    if let Some(v) = cli.io_procs {
        cfg.load.processes = v;
    }
    if let Some(v) = cli.io_bs {
        cfg.load.block_size = v;
    }
    if let Some(v) = cli.io_count {
        cfg.load.block_count = v;
    }
    if let Some(v) = cli.io_wait {
        cfg.load.wait_secs = v;
    }
    if let Some(ref v) = cli.io_dir {
        cfg.load.scratch_dir = v.clone();
    }

    cfg.validate()?;
    Ok(cfg)
}

fn dispatch(assignment: Assignment, config: &Config) -> Result<(), Error> {
    match assignment.role {
        ProcessRole::TimerSampler => timer::run(config, assignment.index),
        ProcessRole::LoadGenerator => loadgen::run(config, assignment.index),
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log);

    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    let assignment = match fanout::fan_out(&config, &mut ForkSpawner, &mut ReportEmitter::stdout()) {
        Ok(a) => a,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = dispatch(assignment, &config) {
        log::error!("{} (pid {}): {}", assignment, process::id(), e);
        process::exit(1);
    }
}
