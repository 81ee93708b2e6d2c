use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Permission denied: cannot access {}. Please check file permissions.", path.display())]
    Permission { path: PathBuf },

    #[error("Credentials file is corrupt: {0}")]
    CorruptData(String),

    #[error("Credentials '{0}' not found")]
    ProfileNotFound(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

/// Coarse classification of [`Error`], used by callers that branch on the
/// failure class rather than the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Connection,
    Query,
    Permission,
    CorruptData,
    NotFound,
    Io,
    Settings,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Connection(_) => ErrorKind::Connection,
            Error::Query(_) => ErrorKind::Query,
            Error::Permission { .. } => ErrorKind::Permission,
            Error::CorruptData(_) => ErrorKind::CorruptData,
            Error::ProfileNotFound(_) => ErrorKind::NotFound,
            Error::Io { .. } => ErrorKind::Io,
            Error::Settings(_) => ErrorKind::Settings,
        }
    }

    /// Maps a filesystem error on `path`, singling out permission failures.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            Error::Permission {
                path: path.to_path_buf(),
            }
        } else {
            Error::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_maps_to_permission_kind() {
        let err = Error::from_io(
            Path::new("/tmp/creds.json"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert!(err.to_string().contains("/tmp/creds.json"));
    }

    #[test]
    fn test_other_io_errors_keep_source() {
        let err = Error::from_io(
            Path::new("/tmp/creds.json"),
            io::Error::new(io::ErrorKind::Other, "disk on fire"),
        );
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("disk on fire"));
    }
}
