//! Discovery of per-slice image files and label volumes on disk.
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::{
    Error, Result,
    scan_info::extract_z_slice_number,
};

/// Filename code (e.g. `405`) to channel name (e.g. `Hoechst 33342`).
pub type ChannelMap = BTreeMap<String, String>;

/// Suffix which distinguishes label volumes from image channels.
pub const LABELS_SUFFIX: &str = "(labels)";

/// Composite images exported alongside the channels.
const MERGE_CODE: &str = "Merge";

/// Image and label files found for a single field of view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameFiles {
    /// Channel name and its files in z order; ordered by filename code.
    pub images: Vec<(String, Vec<PathBuf>)>,
    /// Label name (`"<compartment> (labels)"`) and its volume file; ordered by compartment.
    pub labels: Vec<(String, PathBuf)>,
}

impl FrameFiles {
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.images.iter().map(|(name, _)| name.as_str())
    }

    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|(name, _)| name.as_str())
    }
}

fn is_tiff(name: &str) -> bool {
    name.ends_with(".tif") || name.ends_with(".tiff")
}

/// Sorted TIFF file names in a directory.
fn tiff_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Err(Error::NotADirectory(dir.to_path_buf()));
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            log::warn!("skipping non-UTF-8 file name in {}", dir.display());
            continue;
        };
        if is_tiff(&name) {
            out.push((name, entry.path()));
        }
    }
    out.sort();
    Ok(out)
}

/// Display name for a label file prefix: extension dropped, labels suffix added.
pub fn label_name(prefix: &str) -> String {
    let stem = Path::new(prefix)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(prefix);
    format!("{stem} {LABELS_SUFFIX}")
}

/// Group image slices by channel and pick one volume per label compartment.
///
/// Image files are named `<well>_<code>_ZS<z>_<fov>.tif`; the code is looked up
/// in `channel_map`, falling back to `Unknown_<code>`.
/// Label files are named `<compartment>_<anything>.tiff`; the first file per
/// compartment is used.
pub fn discover(
    image_dir: &Path,
    label_dir: Option<&Path>,
    channel_map: &ChannelMap,
) -> Result<FrameFiles> {
    let mut by_code: BTreeMap<String, Vec<(String, PathBuf)>> = BTreeMap::new();
    for (name, path) in tiff_files(image_dir)? {
        let Some(code) = name.split('_').nth(1) else {
            log::warn!("skipping {name}: no channel code in file name");
            continue;
        };
        if code == MERGE_CODE {
            log::debug!("skipping merged image {name}");
            continue;
        }
        by_code
            .entry(code.to_owned())
            .or_default()
            .push((name, path));
    }
    if by_code.is_empty() {
        return Err(Error::NoImages(image_dir.to_path_buf()));
    }

    let images = by_code
        .into_iter()
        .map(|(code, mut files)| {
            // names are already sorted, so the stable sort keeps them as a tie-break
            files.sort_by_key(|(name, _)| extract_z_slice_number(name));
            let channel = match channel_map.get(&code) {
                Some(c) => c.clone(),
                None => {
                    log::warn!("no channel name for filename code {code:?}");
                    format!("Unknown_{code}")
                }
            };
            log::info!("channel {channel}: {} slices", files.len());
            for (name, _) in &files {
                log::debug!("  {name}");
            }
            (channel, files.into_iter().map(|(_, p)| p).collect())
        })
        .collect();

    let mut labels = Vec::new();
    if let Some(dir) = label_dir {
        let mut by_prefix: BTreeMap<String, PathBuf> = BTreeMap::new();
        for (name, path) in tiff_files(dir)? {
            let prefix = name.split('_').next().unwrap_or(&name).to_owned();
            by_prefix.entry(prefix).or_insert(path);
        }
        labels = by_prefix
            .into_iter()
            .map(|(prefix, path)| (label_name(&prefix), path))
            .collect();
        log::info!("found {} label volumes", labels.len());
    }

    Ok(FrameFiles { images, labels })
}
