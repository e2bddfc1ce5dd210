use common::RemoteError;

/// Errors surfaced by filesystem operations
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Path absent from the index at lookup time
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    /// Handle id with no live write session
    #[error("bad file handle: {0}")]
    BadHandle(u64),
    #[error("cannot rename {from} to {to}")]
    InvalidRename { from: String, to: String },
    /// A file cannot replace a directory
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    /// Local staging file operation failed
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Download, export or upload failed
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    /// A page fetch failed during an index rebuild
    #[error("failed to list remote store: {0}")]
    RemoteList(RemoteError),
}

impl FsError {
    /// Status code reported to the host
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::BadHandle(_) => libc::EBADF,
            FsError::InvalidRename { .. } => libc::EINVAL,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
            FsError::Io(_) | FsError::Remote(_) | FsError::RemoteList(_) => libc::EIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FsError::NotFound("a".into()).errno(), libc::ENOENT);
        assert_eq!(FsError::NotADirectory("a".into()).errno(), libc::ENOTDIR);
        assert_eq!(FsError::BadHandle(7).errno(), libc::EBADF);
        assert_eq!(FsError::IsADirectory("a".into()).errno(), libc::EISDIR);
        assert_eq!(FsError::DirectoryNotEmpty("a".into()).errno(), libc::ENOTEMPTY);
        assert_eq!(
            FsError::Remote(RemoteError::Transport("down".into())).errno(),
            libc::EIO
        );
        assert_eq!(
            FsError::RemoteList(RemoteError::Transport("down".into())).errno(),
            libc::EIO
        );
        assert_eq!(
            FsError::Io(std::io::Error::other("disk")).errno(),
            libc::EIO
        );
    }
}
