use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    General(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),
    #[error("could not parse XML: {0}")]
    Xml(String),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("zarr error: {0}")]
    Zarr(String),
    #[error("output path {0} already exists; remove it before converting again")]
    OutputExists(PathBuf),
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("no TIFF images found in {0}")]
    NoImages(PathBuf),
    #[error("scaling parameter {0} was not found")]
    MissingScaling(&'static str),
    #[error("{path} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        expected: Vec<u64>,
        found: Vec<u64>,
        path: PathBuf,
    },
    #[error("{0} is not an OME-TIFF file")]
    NotOmeTiff(PathBuf),
    #[error(transparent)]
    Wrapped(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn wrap(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Wrapped(Box::new(error))
    }

    /// Flatten any zarrs error into a message.
    pub fn zarr(error: impl std::fmt::Display) -> Self {
        Self::Zarr(error.to_string())
    }

    pub fn xml(error: impl std::fmt::Display) -> Self {
        Self::Xml(error.to_string())
    }
}
