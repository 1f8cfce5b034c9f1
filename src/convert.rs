//! Inputs and output handling shared by the TIFF conversions.
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::{
    Result,
    frames::{ChannelMap, FrameFiles, discover},
    scan_info::Scaling,
};

/// What to convert, and where to.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub image_dir: PathBuf,
    pub label_dir: Option<PathBuf>,
    pub output: PathBuf,
    pub channel_map: ChannelMap,
    pub scaling: Scaling,
}

impl ConversionRequest {
    pub fn discover(&self) -> Result<FrameFiles> {
        discover(
            &self.image_dir,
            self.label_dir.as_deref(),
            &self.channel_map,
        )
    }
}

/// Remove what a failed conversion left at `path`, file or directory.
pub(crate) fn discard_partial(path: &Path) {
    let res = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match res {
        Ok(()) => log::debug!("removed partial output {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not remove {}: {e}", path.display()),
    }
}
