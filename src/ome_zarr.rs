//! OME-Zarr output and input.
//!
//! Layout written by [tiff_to_omezarr]:
//!
//! ```text
//! /
//! ├── images
//! │   └── <channel>      group, NGFF multiscales
//! │       └── 0          uint16 (z, y, x)
//! └── labels
//!     └── <label>        group, NGFF multiscales
//!         └── 0          uint16 (z, y, x)
//! ```

use std::path::{Path, PathBuf};

use zarrs::{array::Array, storage::ReadableWritableListableStorage};

use crate::{
    Error, Result,
    convert::{ConversionRequest, discard_partial},
    frames::FrameFiles,
    metadata::{
        Compression, FULL_RESOLUTION_PATH, Multiscale, multiscales_from_attributes,
        ngff_attributes, uint16_array_metadata,
    },
    scan_info::Scaling,
    stack::{ZStack, read_tiff, stack_slices},
    storage::{self, child_path, put_array_metadata, put_group},
};

pub const IMAGES_GROUP: &str = "/images";
pub const LABELS_GROUP: &str = "/labels";

/// How arrays are chunked and compressed.
#[derive(Debug, Clone, PartialEq)]
pub struct ZarrOptions {
    /// Number of z-slices per chunk; each chunk spans the full y/x plane.
    pub chunk_z: u64,
    pub compression: Compression,
}

impl Default for ZarrOptions {
    fn default() -> Self {
        Self {
            chunk_z: 1,
            compression: Compression::Raw,
        }
    }
}

/// Write one single-resolution image: a group carrying NGFF metadata with the
/// stack stored as its `0` array.
pub fn write_image(
    store: &ReadableWritableListableStorage,
    group_path: &str,
    stack: ZStack,
    scaling: Scaling,
    options: &ZarrOptions,
) -> Result<()> {
    let name = group_path.rsplit('/').next().filter(|n| !n.is_empty());
    put_group(
        store,
        group_path,
        ngff_attributes(Multiscale::micrometer_zyx(name, scaling))?,
    )?;

    let shape = stack.shape();
    let chunk_shape = [options.chunk_z, shape[1], shape[2]];
    let array_path = child_path(group_path, FULL_RESOLUTION_PATH);
    put_array_metadata(
        store,
        &array_path,
        uint16_array_metadata(&shape, &chunk_shape, &options.compression)?,
    )?;

    let array = Array::open(store.clone(), &array_path).map_err(Error::zarr)?;
    array
        .store_array_subset(&array.subset_all(), stack.into_vec())
        .map_err(Error::zarr)?;
    log::info!("wrote {array_path} with shape {shape:?}");
    Ok(())
}

/// Convert per-slice image TIFFs (and optional label volumes) to an OME-Zarr hierarchy.
///
/// Fails without writing anything if the output already exists. If any
/// channel or label fails, the partial hierarchy is removed.
pub fn tiff_to_omezarr(request: &ConversionRequest, options: &ZarrOptions) -> Result<PathBuf> {
    if request.output.exists() {
        return Err(Error::OutputExists(request.output.clone()));
    }
    let frames = request.discover()?;
    if let Some(parent) = request.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::create_dir(&request.output) {
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(Error::OutputExists(request.output.clone()));
        }
        res => res?,
    }

    match write_hierarchy(request, &frames, options) {
        Ok(()) => {
            log::info!("OME-Zarr written to {}", request.output.display());
            Ok(request.output.clone())
        }
        Err(e) => {
            discard_partial(&request.output);
            Err(e)
        }
    }
}

fn write_hierarchy(
    request: &ConversionRequest,
    frames: &FrameFiles,
    options: &ZarrOptions,
) -> Result<()> {
    let store = storage::filesystem_store(&request.output)?;
    put_group(&store, "/", Default::default())?;

    put_group(&store, IMAGES_GROUP, Default::default())?;
    for (channel, files) in &frames.images {
        let stack = stack_slices(files)?;
        log::info!("channel {channel}: stack shape {:?}", stack.shape());
        write_image(
            &store,
            &child_path(IMAGES_GROUP, channel),
            stack,
            request.scaling,
            options,
        )?;
    }

    if request.label_dir.is_some() {
        put_group(&store, LABELS_GROUP, Default::default())?;
        for (label, file) in &frames.labels {
            let stack = read_tiff(file)?;
            write_image(
                &store,
                &child_path(LABELS_GROUP, label),
                stack,
                request.scaling,
                options,
            )?;
        }
    }
    Ok(())
}

/// Read access to an OME-Zarr hierarchy on disk.
pub struct OmeZarr {
    path: PathBuf,
    store: ReadableWritableListableStorage,
}

impl OmeZarr {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(Error::NotADirectory(path.to_path_buf()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            store: storage::filesystem_store(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &ReadableWritableListableStorage {
        &self.store
    }

    fn children_if_present(&self, group_path: &str) -> Result<Vec<String>> {
        if storage::node_metadata(&self.store, group_path)?.is_none() {
            return Ok(Vec::new());
        }
        storage::children(&self.store, group_path)
    }

    /// Channel names under `images/`, sorted.
    pub fn image_names(&self) -> Result<Vec<String>> {
        self.children_if_present(IMAGES_GROUP)
    }

    /// Label names under `labels/`, sorted.
    pub fn label_names(&self) -> Result<Vec<String>> {
        self.children_if_present(LABELS_GROUP)
    }

    /// Image groups directly under the root, as written for synthetic data.
    pub fn root_image_names(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for name in storage::children(&self.store, "/")? {
            if !self.multiscales(&child_path("/", &name))?.is_empty() {
                out.push(name);
            }
        }
        Ok(out)
    }

    pub fn multiscales(&self, group_path: &str) -> Result<Vec<Multiscale>> {
        multiscales_from_attributes(&storage::node_attributes(&self.store, group_path)?)
    }

    /// Scale of the full-resolution dataset of an image group.
    pub fn scale(&self, group_path: &str) -> Result<Scaling> {
        let multiscales = self.multiscales(group_path)?;
        let scale = multiscales
            .first()
            .and_then(Multiscale::scale)
            .ok_or_else(|| Error::general(format!("{group_path} has no scale metadata")))?;
        Scaling::from_zyx(scale)
    }

    pub fn shape(&self, group_path: &str) -> Result<[u64; 3]> {
        let array = self.array(group_path)?;
        zyx_shape(array.shape())
    }

    /// Read the full-resolution array of an image group.
    pub fn read(&self, group_path: &str) -> Result<ZStack> {
        let array = self.array(group_path)?;
        let shape = zyx_shape(array.shape())?;
        let data: Vec<u16> = array
            .retrieve_array_subset(&array.subset_all())
            .map_err(Error::zarr)?;
        ZStack::new(shape, data)
    }

    fn array(
        &self,
        group_path: &str,
    ) -> Result<Array<dyn zarrs::storage::ReadableWritableListableStorageTraits>> {
        let array_path = child_path(group_path, FULL_RESOLUTION_PATH);
        Array::open(self.store.clone(), &array_path).map_err(Error::zarr)
    }

    pub fn tree(&self) -> Result<String> {
        storage::tree(&self.store)
    }
}

fn zyx_shape(shape: &[u64]) -> Result<[u64; 3]> {
    shape
        .try_into()
        .map_err(|_| Error::general(format!("expected a (z, y, x) array, found shape {shape:?}")))
}
