use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DedupError {
    #[error("missing required configuration: {}", .0.join(", "))]
    MissingConfig(Vec<&'static str>),

    #[error("invalid configuration {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    #[error("could not parse job list {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("{action} {}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job {name:?} has folder {stamp:?}, which is not a plain directory name")]
    UnsafeFolder { name: String, stamp: String },

    #[error("serialize job list: {0}")]
    Serialize(String),

    #[error("controller {action} failed: {reason}")]
    Controller { action: &'static str, reason: String },
}

impl DedupError {
    pub(crate) fn filesystem(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DedupError>;
