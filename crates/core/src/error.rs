use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a file's capture moment could not be determined.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no DateTimeOriginal metadata")]
    MissingTimestamp,
    #[error("unparsable capture time: {value:?}")]
    MalformedTimestamp { value: String },
    #[error("file could not be read: {source}")]
    Unreadable {
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("input directory does not exist or is not a directory: {}", path.display())]
    InvalidDirectory { path: PathBuf },
    #[error("failed to list directory {}: {source}", path.display())]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("rename failed: {} -> {}: {source}", from.display(), to.display())]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no free temporary name in {} after {attempts} attempts", dir.display())]
    TempNameExhausted { dir: PathBuf, attempts: usize },
}
