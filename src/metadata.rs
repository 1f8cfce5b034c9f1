//! Zarr V3 array metadata and OME-NGFF group attributes for written images.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use zarrs::{
    array::{ArrayMetadataV3, FillValueMetadata},
    metadata::v3::MetadataV3,
};

use crate::scan_info::Scaling;

/// OME-NGFF version written to new hierarchies.
pub const NGFF_VERSION: &str = "0.5";

/// Path of the full-resolution dataset within each image group.
pub const FULL_RESOLUTION_PATH: &str = "0";

/// One entry of the OME-NGFF `multiscales` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multiscale {
    /// Present in NGFF <= 0.4, where there is no `ome` wrapper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub axes: Vec<Axis>,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Axis {
    fn space_micrometer(name: &str) -> Self {
        Self {
            name: name.into(),
            kind: Some("space".into()),
            unit: Some("micrometer".into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub path: String,
    pub coordinate_transformations: Vec<CoordinateTransformation>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum CoordinateTransformation {
    Scale { scale: Vec<f64> },
    Translation { translation: Vec<f64> },
}

impl Multiscale {
    /// Single-resolution z/y/x multiscale with a micrometer scale transform.
    pub fn micrometer_zyx(name: Option<&str>, scaling: Scaling) -> Self {
        Self {
            version: None,
            name: name.map(str::to_owned),
            axes: ["z", "y", "x"].map(Axis::space_micrometer).to_vec(),
            datasets: vec![Dataset {
                path: FULL_RESOLUTION_PATH.into(),
                coordinate_transformations: vec![CoordinateTransformation::Scale {
                    scale: scaling.to_zyx().to_vec(),
                }],
            }],
        }
    }

    /// The first scale transform of the first dataset.
    pub fn scale(&self) -> Option<&[f64]> {
        self.datasets
            .first()?
            .coordinate_transformations
            .iter()
            .find_map(|t| match t {
                CoordinateTransformation::Scale { scale } => Some(scale.as_slice()),
                _ => None,
            })
    }

    pub fn axis_names(&self) -> Vec<&str> {
        self.axes.iter().map(|a| a.name.as_str()).collect()
    }
}

/// The `ome` attribute of an NGFF 0.5 group.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OmeAttributes {
    version: String,
    #[serde(default)]
    multiscales: Vec<Multiscale>,
}

/// Group attributes for an image with the given multiscale.
///
/// Also carries a plain `units` attribute for readers which predate NGFF axes.
pub fn ngff_attributes(multiscale: Multiscale) -> crate::Result<Map<String, Value>> {
    let ome = OmeAttributes {
        version: NGFF_VERSION.into(),
        multiscales: vec![multiscale],
    };
    let mut attrs = Map::new();
    attrs.insert("ome".into(), serde_json::to_value(ome)?);
    attrs.insert("units".into(), Value::String("micrometers".into()));
    Ok(attrs)
}

/// Extract multiscales from group attributes, whether nested under `ome`
/// (NGFF 0.5) or at the top level (NGFF 0.4).
pub fn multiscales_from_attributes(attrs: &Map<String, Value>) -> crate::Result<Vec<Multiscale>> {
    let raw = attrs
        .get("ome")
        .and_then(|ome| ome.get("multiscales"))
        .or_else(|| attrs.get("multiscales"));
    match raw {
        Some(v) => Ok(serde_json::from_value(v.clone())?),
        None => Ok(Vec::new()),
    }
}

/// Blosc shuffle mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloscShuffle {
    NoShuffle,
    #[default]
    Shuffle,
    BitShuffle,
}

/// Chunk compression for written arrays.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Compression {
    /// Uncompressed.
    #[default]
    Raw,
    Gzip {
        /// Default 6. Must be in the range 0..=9.
        #[serde(default = "default_gzip_level")]
        level: u32,
    },
    Zstd {
        /// Default 3.
        #[serde(default = "default_zstd_level")]
        level: i32,
        #[serde(default)]
        checksum: bool,
    },
    Blosc {
        /// Internal compressor, e.g. `lz4`, `zstd`, `zlib`. Default `zstd`.
        #[serde(default = "default_blosc_cname")]
        cname: String,
        /// Default 5. Must be in the range 0..=9.
        #[serde(default = "default_blosc_clevel")]
        clevel: u8,
        #[serde(default)]
        shuffle: BloscShuffle,
    },
}

fn default_gzip_level() -> u32 {
    6
}

fn default_zstd_level() -> i32 {
    3
}

fn default_blosc_cname() -> String {
    "zstd".into()
}

fn default_blosc_clevel() -> u8 {
    5
}

impl Compression {
    /// Convert to bytes-to-bytes codec metadata, if any.
    pub fn to_codec_metadata(&self) -> crate::Result<Option<MetadataV3>> {
        let meta = match self {
            Compression::Raw => return Ok(None),
            Compression::Gzip { level } => {
                if *level > 9 {
                    return Err(crate::Error::general(format!(
                        "invalid gzip compression level {level}"
                    )));
                }
                MetadataV3::new_with_serializable_configuration(
                    "gzip".to_string(),
                    &json!({ "level": level }),
                )?
            }
            Compression::Zstd { level, checksum } => {
                MetadataV3::new_with_serializable_configuration(
                    "zstd".to_string(),
                    &json!({ "level": level, "checksum": checksum }),
                )?
            }
            Compression::Blosc {
                cname,
                clevel,
                shuffle,
            } => {
                if *clevel > 9 {
                    return Err(crate::Error::general(format!(
                        "invalid blosc compression level {clevel}"
                    )));
                }
                MetadataV3::new_with_serializable_configuration(
                    "blosc".to_string(),
                    &json!({
                        "cname": cname,
                        "clevel": clevel,
                        "shuffle": shuffle,
                        "typesize": size_of::<u16>(),
                        "blocksize": 0,
                    }),
                )?
            }
        };
        Ok(Some(meta))
    }
}

/// Clamp each chunk dimension to `1..=shape`.
fn clamp_chunk_shape(shape: &[u64], chunk_shape: &[u64]) -> crate::Result<Vec<u64>> {
    if shape.len() != chunk_shape.len() {
        return Err(crate::Error::general(format!(
            "chunk shape {chunk_shape:?} does not match array shape {shape:?}"
        )));
    }
    Ok(shape
        .iter()
        .zip(chunk_shape)
        .map(|(&s, &c)| c.min(s).max(1))
        .collect())
}

fn regular_chunk_grid(chunk_shape: &[u64]) -> crate::Result<MetadataV3> {
    Ok(MetadataV3::new_with_serializable_configuration(
        "regular".to_string(),
        &json!({ "chunk_shape": chunk_shape }),
    )?)
}

fn bytes_codec() -> crate::Result<MetadataV3> {
    Ok(MetadataV3::new_with_serializable_configuration(
        "bytes".to_string(),
        &json!({ "endian": "little" }),
    )?)
}

/// Zarr V3 metadata for a uint16 array with fill value 0.
pub fn uint16_array_metadata(
    shape: &[u64],
    chunk_shape: &[u64],
    compression: &Compression,
) -> crate::Result<ArrayMetadataV3> {
    let chunk_shape = clamp_chunk_shape(shape, chunk_shape)?;
    let chunk_grid = regular_chunk_grid(&chunk_shape)?;
    let data_type = MetadataV3::new("uint16".to_string());
    let fill_value = FillValueMetadata::Number(serde_json::Number::from(0));
    let mut codecs = vec![bytes_codec()?];
    codecs.extend(compression.to_codec_metadata()?);
    Ok(ArrayMetadataV3::new(
        shape.to_vec(),
        chunk_grid,
        data_type,
        fill_value,
        codecs,
    ))
}
