//! Error taxonomy for the bridge core.
//!
//! Collaborator failures are classified into [`FsError`] at the bridge
//! boundary and converted into host-native error identifiers exactly once,
//! when a callback reply leaves through the host binding.

use thiserror::Error;

use crate::path::PathError;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FsError {
    /// The host-native error identifier for this error.
    ///
    /// Unrecognized errors ([`Io`](Self::Io)/[`Internal`](Self::Internal))
    /// pass through as generic I/O failures rather than being swallowed.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::AccessDenied(_) => libc::EACCES,
            Self::AlreadyExists(_) => libc::EEXIST,
            Self::InvalidArgument(_) => libc::EINVAL,
            Self::Unsupported(_) => libc::ENOSYS,
            Self::Io(_) | Self::Internal(_) => libc::EIO,
        }
    }

    /// Whether this error carries no recognized classification and is
    /// passed through (and logged) rather than translated.
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Internal(_))
    }
}

impl From<PathError> for FsError {
    fn from(e: PathError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

#[expect(
    clippy::wildcard_enum_match_arm,
    reason = "ErrorKind is non_exhaustive; Io is the safe default"
)]
impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::AccessDenied(e.to_string()),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(e.to_string()),
            std::io::ErrorKind::InvalidInput => Self::InvalidArgument(e.to_string()),
            std::io::ErrorKind::Unsupported => Self::Unsupported(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_host_errnos() {
        assert_eq!(FsError::NotFound(String::new()).errno(), libc::ENOENT);
        assert_eq!(FsError::AccessDenied(String::new()).errno(), libc::EACCES);
        assert_eq!(FsError::AlreadyExists(String::new()).errno(), libc::EEXIST);
        assert_eq!(FsError::InvalidArgument(String::new()).errno(), libc::EINVAL);
        assert_eq!(FsError::Unsupported(String::new()).errno(), libc::ENOSYS);
        assert_eq!(FsError::Io(String::new()).errno(), libc::EIO);
    }

    #[test]
    fn io_errors_classify_by_kind() {
        let not_found = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(FsError::from(not_found), FsError::NotFound(_)));
        let other = std::io::Error::other("odd");
        let converted = FsError::from(other);
        assert!(converted.is_passthrough());
    }
}
