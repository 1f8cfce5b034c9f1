//! What a viewer should open for a converted file.
//!
//! A napari session built from these plans adds image layers first and label
//! layers on top of them, each scaled to physical units.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    frames::LABELS_SUFFIX,
    ome_tiff::OmeTiff,
    ome_zarr::{IMAGES_GROUP, LABELS_GROUP, OmeZarr},
    scan_info::Scaling,
    storage::child_path,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Image,
    Labels,
}

/// Where a layer's voxels live in the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "format")]
pub enum LayerSource {
    /// Channel index within an OME-TIFF.
    OmeTiff { channel: u64 },
    /// Image group within an OME-Zarr hierarchy; data is its `0` array.
    OmeZarr { group: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
    /// `[z, y, x]` in micrometers.
    pub scale: [f64; 3],
    /// `[z, y, x]`
    pub shape: [u64; 3],
    pub source: LayerSource,
}

/// Layers for every channel of an OME-TIFF: images first, then channels whose
/// name marks them as labels.
pub fn layers_from_ometiff(path: impl AsRef<Path>, scaling: Option<Scaling>) -> Result<Vec<Layer>> {
    let tiff = OmeTiff::open(path.as_ref())?;
    let scaling = match scaling {
        Some(s) => s,
        None => tiff.scaling()?.ok_or_else(|| {
            Error::general(format!(
                "{} has no physical sizes; pass a scale",
                path.as_ref().display()
            ))
        })?,
    };
    let [_, z, y, x] = tiff.shape()?;

    let (labels, images): (Vec<_>, Vec<_>) = tiff
        .channel_names()?
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let kind = if name.contains(LABELS_SUFFIX) {
                LayerKind::Labels
            } else {
                LayerKind::Image
            };
            Layer {
                name,
                kind,
                scale: scaling.to_zyx(),
                shape: [z, y, x],
                source: LayerSource::OmeTiff {
                    channel: idx as u64,
                },
            }
        })
        .partition(|l| l.kind == LayerKind::Labels);

    Ok(images.into_iter().chain(labels).collect())
}

fn zarr_layer(
    zarr: &OmeZarr,
    group: String,
    name: String,
    kind: LayerKind,
    scaling: Option<Scaling>,
) -> Result<Layer> {
    let scale = match scaling {
        Some(s) => s,
        None => zarr.scale(&group)?,
    };
    Ok(Layer {
        name,
        kind,
        scale: scale.to_zyx(),
        shape: zarr.shape(&group)?,
        source: LayerSource::OmeZarr { group },
    })
}

/// Layers for an OME-Zarr hierarchy: `images/*` then `labels/*`, each in
/// reverse name order. Hierarchies without those groups (such as synthetic
/// output) expose their root-level images instead.
pub fn layers_from_omezarr(path: impl AsRef<Path>, scaling: Option<Scaling>) -> Result<Vec<Layer>> {
    let zarr = OmeZarr::open(path)?;
    let mut images = zarr.image_names()?;
    let mut labels = zarr.label_names()?;

    let mut out = Vec::new();
    if images.is_empty() && labels.is_empty() {
        let mut root = zarr.root_image_names()?;
        root.reverse();
        for name in root {
            let group = child_path("/", &name);
            out.push(zarr_layer(&zarr, group, name, LayerKind::Image, scaling)?);
        }
        return Ok(out);
    }

    images.reverse();
    labels.reverse();
    for name in images {
        let group = child_path(IMAGES_GROUP, &name);
        out.push(zarr_layer(&zarr, group, name, LayerKind::Image, scaling)?);
    }
    for name in labels {
        let group = child_path(LABELS_GROUP, &name);
        out.push(zarr_layer(&zarr, group, name, LayerKind::Labels, scaling)?);
    }
    Ok(out)
}
