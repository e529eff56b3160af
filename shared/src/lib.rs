// shared/src/lib.rs

use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("empty input")]
    EmptyInput,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("connection: {0}")]
    Connection(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("io: {0}")]
    Io(String),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Entry lifetime in seconds. Zero means the backend keeps the entry until it is
/// deleted or flushed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TtlSecs(pub u64);

impl TtlSecs {
    pub fn is_unbounded(&self) -> bool {
        self.0 == 0
    }

    pub fn as_duration(&self) -> Option<Duration> {
        if self.is_unbounded() {
            None
        } else {
            Some(Duration::from_secs(self.0))
        }
    }
}

pub mod config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_zero_is_unbounded() {
        assert!(TtlSecs(0).is_unbounded());
        assert_eq!(TtlSecs(0).as_duration(), None);
        assert_eq!(TtlSecs(90).as_duration(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_io_error_converts() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert!(matches!(err, Error::Io(ref msg) if msg.contains("disk gone")));
    }
}
