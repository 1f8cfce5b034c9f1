//! The subset of the OME-XML schema needed to describe a CZYX uint16 image.
//!
//! See <https://www.openmicroscopy.org/Schemas/Documentation/Generated/OME-2016-06/ome.html>.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, scan_info::Scaling};

pub const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";

/// TIFF descriptions are 7-bit ASCII, so "um" is used rather than "µm".
pub const MICROMETER_UNIT: &str = "um";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

fn default_namespace() -> String {
    OME_NAMESPACE.into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "OME")]
pub struct OmeXml {
    #[serde(rename = "@xmlns", default = "default_namespace")]
    pub xmlns: String,
    #[serde(rename = "Image", default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(rename = "@ID")]
    pub id: String,
    #[serde(rename = "@Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Pixels")]
    pub pixels: Pixels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pixels {
    #[serde(rename = "@ID")]
    pub id: String,
    /// Fastest-varying first; `XYZCT` for CZYX data.
    #[serde(rename = "@DimensionOrder")]
    pub dimension_order: String,
    #[serde(rename = "@Type")]
    pub pixel_type: String,
    #[serde(rename = "@SizeX")]
    pub size_x: u64,
    #[serde(rename = "@SizeY")]
    pub size_y: u64,
    #[serde(rename = "@SizeZ")]
    pub size_z: u64,
    #[serde(rename = "@SizeC")]
    pub size_c: u64,
    #[serde(rename = "@SizeT", default = "one")]
    pub size_t: u64,
    #[serde(
        rename = "@PhysicalSizeX",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub physical_size_x: Option<f64>,
    #[serde(
        rename = "@PhysicalSizeXUnit",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub physical_size_x_unit: Option<String>,
    #[serde(
        rename = "@PhysicalSizeY",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub physical_size_y: Option<f64>,
    #[serde(
        rename = "@PhysicalSizeYUnit",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub physical_size_y_unit: Option<String>,
    #[serde(
        rename = "@PhysicalSizeZ",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub physical_size_z: Option<f64>,
    #[serde(
        rename = "@PhysicalSizeZUnit",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub physical_size_z_unit: Option<String>,
    #[serde(rename = "Channel", default)]
    pub channels: Vec<Channel>,
    #[serde(rename = "TiffData", default)]
    pub tiff_data: Vec<TiffData>,
}

fn one() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "@ID")]
    pub id: String,
    #[serde(rename = "@Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "@SamplesPerPixel",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub samples_per_pixel: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiffData {
    #[serde(rename = "@IFD", default, skip_serializing_if = "Option::is_none")]
    pub ifd: Option<u64>,
    #[serde(
        rename = "@PlaneCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub plane_count: Option<u64>,
}

impl OmeXml {
    /// Metadata for a single CZYX uint16 image stored one plane per IFD.
    pub fn new(size: [u64; 4], scaling: Scaling, channel_names: &[impl AsRef<str>]) -> Self {
        let [size_c, size_z, size_y, size_x] = size;
        let channels = channel_names
            .iter()
            .enumerate()
            .map(|(idx, name)| Channel {
                id: format!("Channel:0:{idx}"),
                name: Some(name.as_ref().to_owned()),
                samples_per_pixel: Some(1),
            })
            .collect();
        let unit = || Some(MICROMETER_UNIT.to_owned());
        let pixels = Pixels {
            id: "Pixels:0".into(),
            dimension_order: "XYZCT".into(),
            pixel_type: "uint16".into(),
            size_x,
            size_y,
            size_z,
            size_c,
            size_t: 1,
            physical_size_x: Some(scaling.x),
            physical_size_x_unit: unit(),
            physical_size_y: Some(scaling.y),
            physical_size_y_unit: unit(),
            physical_size_z: Some(scaling.z),
            physical_size_z_unit: unit(),
            channels,
            tiff_data: vec![TiffData {
                ifd: Some(0),
                plane_count: Some(size_c * size_z),
            }],
        };
        Self {
            xmlns: default_namespace(),
            images: vec![Image {
                id: "Image:0".into(),
                name: None,
                pixels,
            }],
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let body = quick_xml::se::to_string(self).map_err(Error::xml)?;
        Ok(format!("{XML_DECLARATION}\n{body}"))
    }

    pub fn from_xml(text: &str) -> Result<Self> {
        quick_xml::de::from_str(text).map_err(Error::xml)
    }

    /// The first image; OME-TIFFs written here only ever contain one.
    pub fn image(&self) -> Result<&Image> {
        self.images
            .first()
            .ok_or_else(|| Error::general("OME-XML contains no Image"))
    }

    pub fn pixels(&self) -> Result<&Pixels> {
        Ok(&self.image()?.pixels)
    }

    /// Channel names, falling back to `Channel <n>` where unnamed.
    pub fn channel_names(&self) -> Result<Vec<String>> {
        Ok(self
            .pixels()?
            .channels
            .iter()
            .enumerate()
            .map(|(idx, c)| c.name.clone().unwrap_or_else(|| format!("Channel {idx}")))
            .collect())
    }

    /// Physical sizes, if all three are present.
    pub fn scaling(&self) -> Result<Option<Scaling>> {
        let p = self.pixels()?;
        let scaling = match (p.physical_size_z, p.physical_size_y, p.physical_size_x) {
            (Some(z), Some(y), Some(x)) => Some(Scaling::new(z, y, x)),
            _ => None,
        };
        Ok(scaling)
    }
}

/// Whether a TIFF ImageDescription holds OME-XML.
pub fn is_ome_description(description: &str) -> bool {
    let text = description.trim();
    text.starts_with("<?xml") && text.contains("<OME")
}
