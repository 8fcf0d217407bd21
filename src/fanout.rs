use std::fmt;
use std::io::{self, Write};

use crate::config::Config;
use crate::error::Error;
use crate::report::ReportEmitter;

/// Work a forked process does for the rest of its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    TimerSampler,
    LoadGenerator,
}

impl ProcessRole {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessRole::TimerSampler => "Timer",
            ProcessRole::LoadGenerator => "I/O Load",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub role: ProcessRole,
    pub index: usize,
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.role.name(), self.index)
    }
}

/// Roles for every process forked off the original one, in fork order.
/// The original process itself stays timer #0 and is not listed.
pub fn plan(config: &Config) -> Vec<Assignment> {
    let timers = (1..config.timer.processes).map(|index| Assignment {
        role: ProcessRole::TimerSampler,
        index,
    });
    let loads = (0..config.load.processes).map(|index| Assignment {
        role: ProcessRole::LoadGenerator,
        index,
    });
    timers.chain(loads).collect()
}

/// Which side of a fork the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forked {
    Parent(libc::pid_t),
    Child,
}

pub trait Spawner {
    fn spawn(&mut self) -> Result<Forked, Error>;
    fn terminate(&mut self, pid: libc::pid_t);
}

/// Forks real processes.
pub struct ForkSpawner;

impl Spawner for ForkSpawner {
    fn spawn(&mut self) -> Result<Forked, Error> {
        match unsafe { libc::fork() } {
            -1 => Err(Error::Fork(io::Error::last_os_error().to_string())),
            0 => Ok(Forked::Child),
            pid => Ok(Forked::Parent(pid)),
        }
    }

    fn terminate(&mut self, pid: libc::pid_t) {
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
    }
}

/// Fork every planned process and return the assignment of the calling
/// process: a child gets its planned role, the parent stays timer #0.
///
/// A failed fork terminates the children already started and is returned
/// as an error, so the run never continues short-handed.
pub fn fan_out<S: Spawner, W: Write>(
    config: &Config,
    spawner: &mut S,
    emitter: &mut ReportEmitter<W>,
) -> Result<Assignment, Error> {
    let mut children = Vec::new();
    let mut announced_loads = false;

    emitter.line(&format_args!(
        "Spawning {} timer processes...",
        config.timer.processes
    ))?;

    for assignment in plan(config) {
        if assignment.role == ProcessRole::LoadGenerator && !announced_loads {
            emitter.line(&format_args!(
                "Spawning {} I/O processes...",
                config.load.processes
            ))?;
            announced_loads = true;
        }

        match spawner.spawn() {
            Ok(Forked::Child) => return Ok(assignment),
            Ok(Forked::Parent(pid)) => {
                log::debug!("forked {} as pid {}", assignment, pid);
                children.push(pid);
            }
            Err(e) => {
                log::error!(
                    "{} while starting {}; stopping {} started processes",
                    e,
                    assignment,
                    children.len(),
                );
                for &pid in &children {
                    spawner.terminate(pid);
                }
                return Err(e);
            }
        }
    }

    Ok(Assignment {
        role: ProcessRole::TimerSampler,
        index: 0,
    })
}
