use std::ffi::CString;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::FromRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::{Config, LoadConfig};
use crate::error::Error;
use crate::report::{PassReport, ReportEmitter};

/// Fill `buf` completely from `src`. EOF or any read error is a hard failure.
pub fn read_full<R: Read>(src: &mut R, buf: &mut [u8]) -> Result<(), Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(Error::ShortTransfer(format!(
                    "read returned 0 after {} of {} bytes",
                    filled,
                    buf.len()
                )))
            }
            Ok(n) => filled += n,
            Err(e) => {
                return Err(Error::ShortTransfer(format!(
                    "read failed after {} of {} bytes: {}",
                    filled,
                    buf.len(),
                    e
                )))
            }
        }
    }
    Ok(())
}

/// Write all of `buf` to `dst`. A zero-length write or any error is a hard failure.
pub fn write_full<W: Write>(dst: &mut W, buf: &[u8]) -> Result<(), Error> {
    let mut written = 0;
    while written < buf.len() {
        match dst.write(&buf[written..]) {
            Ok(0) => {
                return Err(Error::ShortTransfer(format!(
                    "write returned 0 after {} of {} bytes",
                    written,
                    buf.len()
                )))
            }
            Ok(n) => written += n,
            Err(e) => {
                return Err(Error::ShortTransfer(format!(
                    "write failed after {} of {} bytes: {}",
                    written,
                    buf.len(),
                    e
                )))
            }
        }
    }
    Ok(())
}

/// Create a scratch file in `dir` and unlink it straight away, so it
/// disappears as soon as the descriptor is closed.
pub fn scratch_file(dir: &Path) -> Result<File, Error> {
    let template = CString::new(dir.join("tmpXXXXXXXXXX").as_os_str().as_bytes())
        .map_err(|_| Error::InvalidArgs(format!("bad scratch dir: {}", dir.display())))?;
    let mut path = template.into_bytes_with_nul();

    let fd = unsafe { libc::mkstemp(path.as_mut_ptr() as *mut libc::c_char) };
    if fd == -1 {
        let e = io::Error::last_os_error();
        return Err(Error::Io(io::Error::new(
            e.kind(),
            format!("failed to open tempfile in {}: {}", dir.display(), e),
        )));
    }
    // SAFETY: mkstemp returned a fresh descriptor that nothing else owns.
    let file = unsafe { File::from_raw_fd(fd) };
    unsafe {
        libc::unlink(path.as_ptr() as *const libc::c_char);
    }
    Ok(file)
}

/// Copies zeroes into scratch files in fixed-size blocks to keep the CPU
/// and the block layer busy.
pub struct LoadGenerator {
    block_count: u64,
    wait: Duration,
    scratch_dir: PathBuf,
    pid: u32,
    buf: Vec<u8>,
    clock: Clock,
}

impl LoadGenerator {
    pub fn new(config: &LoadConfig) -> Self {
        Self {
            block_count: config.block_count,
            wait: Duration::from_secs(config.wait_secs),
            scratch_dir: config.scratch_dir.clone(),
            pid: std::process::id(),
            buf: vec![0u8; config.block_size],
            clock: Clock::new(),
        }
    }

    /// Copy `block_count` blocks from `src` into `dst`, timing the whole
    /// pass including the close of `dst`.
    pub fn transfer<R: Read, W: Write>(&mut self, src: &mut R, mut dst: W) -> Result<PassReport, Error> {
        let start = self.clock.now();
        for _ in 0..self.block_count {
            read_full(src, &mut self.buf)?;
            write_full(&mut dst, &self.buf)?;
        }
        dst.flush()?;
        drop(dst);
        let end = self.clock.now();

        Ok(PassReport {
            pid: self.pid,
            bytes: (self.buf.len() as u64).saturating_mul(self.block_count),
            elapsed_us: end - start,
        })
    }

    /// One pass from /dev/zero into a fresh scratch file.
    pub fn pass(&mut self) -> Result<PassReport, Error> {
        let mut zero = File::open("/dev/zero").map_err(|e| {
            Error::Io(io::Error::new(
                e.kind(),
                format!("failed to open /dev/zero: {}", e),
            ))
        })?;
        let out = scratch_file(&self.scratch_dir)?;
        self.transfer(&mut zero, out)
    }

    fn cycle<W: Write>(&mut self, emitter: &mut ReportEmitter<W>) -> Result<(), Error> {
        let report = self.pass()?;
        emitter.pass(&report)?;
        if !self.wait.is_zero() {
            thread::sleep(self.wait);
        }
        Ok(())
    }

    /// Run passes until the process is killed or a transfer fails.
    pub fn run_forever<W: Write>(&mut self, emitter: &mut ReportEmitter<W>) -> Result<(), Error> {
        log::info!(
            target: "timer_stability::loadgen",
            "{} x {}B per pass into {}, {}s between passes",
            self.block_count,
            self.buf.len(),
            self.scratch_dir.display(),
            self.wait.as_secs(),
        );
        loop {
            self.cycle(emitter)?;
        }
    }
}

/// Work loop of a load-generator process.
pub fn run(config: &Config, index: usize) -> Result<(), Error> {
    log::debug!(target: "timer_stability::loadgen", "I/O load #{} starting", index);
    let mut generator = LoadGenerator::new(&config.load);
    generator.run_forever(&mut ReportEmitter::stdout())
}
