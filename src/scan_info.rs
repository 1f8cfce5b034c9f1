//! Acquisition metadata from microscope exports.
//!
//! Naming and metadata conventions follow images produced by a ZEISS LSM 880
//! with Airyscan: one TIFF per channel and z-slice, named like
//! `C10-1_405_ZS034_FOV-1.tif`, next to a `ScanInfo.xml` holding the
//! calibration settings.

use std::{path::Path, sync::LazyLock};

use quick_xml::{Reader, events::Event};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

static Z_SLICE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_ZS(\d+)_").expect("z-slice pattern should compile"));

/// Extract the zero-padded z-slice number from a filename such as
/// `C10-1_405_ZS034_FOV-1.tif`.
///
/// Returns 0 if there is no `_ZS###_` section.
pub fn extract_z_slice_number(filename: &str) -> u32 {
    Z_SLICE_PATTERN
        .captures(filename)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Physical voxel size in micrometers, in z, y, x order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    pub z: f64,
    pub y: f64,
    pub x: f64,
}

impl Scaling {
    pub fn new(z: f64, y: f64, x: f64) -> Self {
        Self { z, y, x }
    }

    pub fn to_zyx(self) -> [f64; 3] {
        [self.z, self.y, self.x]
    }

    pub fn from_zyx(zyx: &[f64]) -> Result<Self> {
        match zyx {
            [z, y, x] => Ok(Self::new(*z, *y, *x)),
            other => Err(Error::general(format!(
                "expected 3 scale values (z, y, x), got {}",
                other.len()
            ))),
        }
    }
}

impl std::str::FromStr for Scaling {
    type Err = Error;

    /// Parse `Z,Y,X`.
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|e| Error::general(format!("invalid scale value {v:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_zyx(&values)
    }
}

/// Scaling as found in a ScanInfo file, where any value may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialScaling {
    pub z: Option<f64>,
    pub y: Option<f64>,
    pub x: Option<f64>,
}

impl TryFrom<PartialScaling> for Scaling {
    type Error = Error;

    fn try_from(value: PartialScaling) -> Result<Self> {
        Ok(Scaling {
            z: value.z.ok_or(Error::MissingScaling(Z_SPACING))?,
            y: value.y.ok_or(Error::MissingScaling(MICRONS_PER_PIXEL_Y))?,
            x: value.x.ok_or(Error::MissingScaling(MICRONS_PER_PIXEL_X))?,
        })
    }
}

const Z_SPACING: &str = "ZStackSpacingMicrons";
const MICRONS_PER_PIXEL_Y: &str = "MicronsPerPixelY";
const MICRONS_PER_PIXEL_X: &str = "MicronsPerPixelX";

/// Read `ZStackSpacingMicrons`, `MicronsPerPixelY` and `MicronsPerPixelX`
/// from the `<Setting Parameter="...">` elements of a ScanInfo.xml file.
pub fn gather_scaling_info(path: impl AsRef<Path>) -> Result<PartialScaling> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_scaling_info(&text)
}

/// Parse ScanInfo XML content; `Setting` elements may appear at any depth.
pub fn parse_scaling_info(text: &str) -> Result<PartialScaling> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut out = PartialScaling::default();
    loop {
        match reader.read_event().map_err(Error::xml)? {
            Event::Start(e) if e.name().as_ref() == b"Setting" => {
                let parameter = match e.try_get_attribute("Parameter").map_err(Error::xml)? {
                    Some(attr) => attr.unescape_value().map_err(Error::xml)?.into_owned(),
                    None => continue,
                };
                let end = e.to_end().into_owned();
                let value = reader.read_text(end.name()).map_err(Error::xml)?;
                let slot = match parameter.as_str() {
                    Z_SPACING => &mut out.z,
                    MICRONS_PER_PIXEL_Y => &mut out.y,
                    MICRONS_PER_PIXEL_X => &mut out.x,
                    _ => continue,
                };
                let parsed = value.trim().parse::<f64>().map_err(|e| {
                    Error::general(format!("invalid value {value:?} for {parameter}: {e}"))
                })?;
                *slot = Some(parsed);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    log::debug!("scaling from ScanInfo: {out:?}");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_slice_numbers() {
        for (name, expected) in [
            ("C10-1_405_ZS034_FOV-1.tif", 34),
            ("C10-1_405_ZS018_FOV-1.tif", 18),
            ("C10-1_405_ZS006_FOV-1.tif", 6),
            ("C10-1_405_FOV-1.tif", 0),
            ("C10-1_405_ZS_FOV-1.tif", 0),
        ] {
            assert_eq!(extract_z_slice_number(name), expected, "{name}");
        }
    }

    #[test]
    fn full_scaninfo() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <ScanInfo>
                <Group Name="Calibration">
                    <Settings>
                        <Setting Parameter="MicronsPerPixelX">0.1006</Setting>
                        <Setting Parameter="MicronsPerPixelY">0.1006</Setting>
                    </Settings>
                </Group>
                <Group Name="Experiment">
                    <Settings>
                        <Setting Parameter="ZStackSpacingMicrons">1.000</Setting>
                        <Setting Parameter="Objective">40x</Setting>
                    </Settings>
                </Group>
            </ScanInfo>"#;
        let partial = parse_scaling_info(xml).unwrap();
        assert_eq!(
            partial,
            PartialScaling {
                z: Some(1.0),
                y: Some(0.1006),
                x: Some(0.1006)
            }
        );
        let scaling = Scaling::try_from(partial).unwrap();
        assert_eq!(scaling.to_zyx(), [1.0, 0.1006, 0.1006]);
    }

    #[test]
    fn missing_y() {
        let xml = r#"<ScanInfo>
                <Group Name="Calibration"><Settings>
                    <Setting Parameter="MicronsPerPixelX">0.300</Setting>
                </Settings></Group>
                <Group Name="Experiment"><Settings>
                    <Setting Parameter="ZStackSpacingMicrons">3.000</Setting>
                </Settings></Group>
            </ScanInfo>"#;
        let partial = parse_scaling_info(xml).unwrap();
        assert_eq!(partial.z, Some(3.0));
        assert_eq!(partial.y, None);
        assert_eq!(partial.x, Some(0.3));
        assert!(matches!(
            Scaling::try_from(partial),
            Err(Error::MissingScaling("MicronsPerPixelY"))
        ));
    }

    #[test]
    fn unparseable_value_is_an_error() {
        let xml = r#"<ScanInfo><Settings>
                <Setting Parameter="MicronsPerPixelX">abc</Setting>
            </Settings></ScanInfo>"#;
        assert!(parse_scaling_info(xml).is_err());
    }

    #[test]
    fn repeated_parameter_keeps_last() {
        let xml = r#"<ScanInfo><Settings>
                <Setting Parameter="ZStackSpacingMicrons">2.0</Setting>
                <Setting Parameter="ZStackSpacingMicrons">5.0</Setting>
            </Settings></ScanInfo>"#;
        assert_eq!(parse_scaling_info(xml).unwrap().z, Some(5.0));
    }

    #[test]
    fn gather_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ScanInfo.xml");
        let xml = r#"<ScanInfo><Settings>
                <Setting Parameter="MicronsPerPixelX">0.2</Setting>
                <Setting Parameter="MicronsPerPixelY">0.25</Setting>
                <Setting Parameter="ZStackSpacingMicrons">1.5</Setting>
            </Settings></ScanInfo>"#;
        std::fs::write(&path, xml).unwrap();

        let partial = gather_scaling_info(&path).unwrap();
        let scaling = Scaling::try_from(partial).unwrap();
        assert_eq!(scaling, Scaling::new(1.5, 0.25, 0.2));

        assert!(gather_scaling_info(tmp.path().join("missing.xml")).is_err());
    }

    #[test]
    fn scale_from_cli_string() {
        let s: Scaling = "1.0, 0.1,0.1".parse().unwrap();
        assert_eq!(s, Scaling::new(1.0, 0.1, 0.1));
        assert!("1.0,0.1".parse::<Scaling>().is_err());
    }
}
