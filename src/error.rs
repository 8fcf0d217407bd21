use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    InvalidArgs(String),
    Timer(String),
    Fork(String),
    ShortTransfer(String),
    Accounting(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::InvalidArgs(msg) => write!(f, "invalid arguments: {}", msg),
            Error::Timer(msg) => write!(f, "timer setup failed: {}", msg),
            Error::Fork(msg) => write!(f, "fork failed: {}", msg),
            Error::ShortTransfer(msg) => write!(f, "short transfer: {}", msg),
            Error::Accounting(msg) => write!(f, "cpu accounting unavailable: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_io() {
        let err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let msg = format!("{}", err);
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_display_invalid_args() {
        let err = Error::InvalidArgs("bad value".into());
        let msg = format!("{}", err);
        assert!(msg.contains("invalid arguments"));
        assert!(msg.contains("bad value"));
    }

    #[test]
    fn test_display_timer_and_fork() {
        let msg = format!("{}", Error::Timer("timer_create: EAGAIN".into()));
        assert!(msg.contains("timer setup failed"));
        assert!(msg.contains("EAGAIN"));

        let msg = format!("{}", Error::Fork("EAGAIN".into()));
        assert!(msg.starts_with("fork failed"));
    }

    #[test]
    fn test_display_short_transfer() {
        let err = Error::ShortTransfer("read returned 0 after 512 of 4096 bytes".into());
        let msg = format!("{}", err);
        assert!(msg.contains("short transfer"));
        assert!(msg.contains("512 of 4096"));
    }

    #[test]
    fn test_display_accounting() {
        let err = Error::Accounting("expected 8 fields, got 4".into());
        assert!(format!("{}", err).contains("cpu accounting unavailable"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            _ => panic!("expected Error::Io"),
        }
    }
}
