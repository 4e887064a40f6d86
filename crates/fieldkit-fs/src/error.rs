use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {path}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to move {from} to {to}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {from} to {to}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source file {path} is missing or empty")]
    EmptySource { path: PathBuf },

    #[error("destination {path} is missing or empty after commit")]
    MissingDestination { path: PathBuf },

    #[error("failed to query free space for {path}")]
    SpaceQuery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("insufficient space: {required} bytes required, {available} available")]
    InsufficientSpace { required: u64, available: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_insufficient_space(&self) -> bool {
        matches!(self, Error::InsufficientSpace { .. })
    }
}
