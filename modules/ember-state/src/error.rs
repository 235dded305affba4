use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("no snapshot at {0}")]
    NotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("snapshot does not match template: missing {missing:?}, unexpected {unexpected:?}")]
    ShapeMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

impl StateStoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StateStoreError::NotFound(path)
        } else {
            StateStoreError::Io { path, source }
        }
    }
}
