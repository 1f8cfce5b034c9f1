#![allow(dead_code)]

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use nviz::{frames::ChannelMap, scan_info::Scaling};
use tiff::encoder::{TiffEncoder, colortype};

pub const DEPTH: u64 = 3;
pub const HEIGHT: u64 = 4;
pub const WIDTH: u64 = 5;

pub const CODES: [&str; 2] = ["111", "222"];

pub fn init_logging() {
    env_logger::try_init().ok();
}

pub fn channel_map() -> ChannelMap {
    [("111", "Channel A"), ("222", "Channel B")]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

pub fn scaling() -> Scaling {
    Scaling::new(1.0, 0.1, 0.1)
}

/// Deterministic value for a voxel of an image channel.
pub fn image_value(channel: usize, z: u64, y: u64, x: u64) -> u16 {
    (channel as u64 * 1000 + z * 100 + y * WIDTH + x) as u16
}

/// Deterministic value for a voxel of the label volume.
pub fn label_value(z: u64, y: u64, x: u64) -> u8 {
    ((z + y + x) % 4) as u8
}

pub fn expected_channel(channel: usize) -> Vec<u16> {
    let mut out = Vec::new();
    for z in 0..DEPTH {
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                out.push(image_value(channel, z, y, x));
            }
        }
    }
    out
}

pub fn expected_labels() -> Vec<u16> {
    let mut out = Vec::new();
    for z in 0..DEPTH {
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                out.push(label_value(z, y, x) as u16);
            }
        }
    }
    out
}

pub fn write_gray16(path: &Path, planes: &[Vec<u16>]) {
    let mut encoder = TiffEncoder::new(File::create(path).expect("create tiff")).expect("encoder");
    for plane in planes {
        encoder
            .write_image::<colortype::Gray16>(WIDTH as u32, HEIGHT as u32, plane)
            .expect("write plane");
    }
}

pub fn write_gray8(path: &Path, planes: &[Vec<u8>]) {
    let mut encoder = TiffEncoder::new(File::create(path).expect("create tiff")).expect("encoder");
    for plane in planes {
        encoder
            .write_image::<colortype::Gray8>(WIDTH as u32, HEIGHT as u32, plane)
            .expect("write plane");
    }
}

pub struct Dataset {
    pub root: tempfile::TempDir,
    pub images: PathBuf,
    pub labels: PathBuf,
}

/// Per-slice images for two channels (plus a merged image which should be
/// ignored) and one multi-page label volume.
pub fn dataset() -> Dataset {
    init_logging();
    let root = tempfile::tempdir().expect("tempdir");
    let images = root.path().join("C10-1");
    let labels = root.path().join("masks");
    std::fs::create_dir_all(&images).expect("images dir");
    std::fs::create_dir_all(&labels).expect("labels dir");

    for (channel, code) in CODES.iter().enumerate() {
        // written back to front so ordering has to come from the z-slice number
        for z in (0..DEPTH).rev() {
            let plane = (0..HEIGHT)
                .flat_map(|y| (0..WIDTH).map(move |x| image_value(channel, z, y, x)))
                .collect();
            let name = format!("C10-1_{code}_ZS{:03}_FOV-1.tif", z + 1);
            write_gray16(&images.join(name), &[plane]);
        }
    }
    write_gray16(
        &images.join("C10-1_Merge_ZS001_FOV-1.tif"),
        &[vec![u16::MAX; (HEIGHT * WIDTH) as usize]],
    );

    let label_planes: Vec<Vec<u8>> = (0..DEPTH)
        .map(|z| {
            (0..HEIGHT)
                .flat_map(|y| (0..WIDTH).map(move |x| label_value(z, y, x)))
                .collect()
        })
        .collect();
    write_gray8(&labels.join("compartment_masks.tiff"), &label_planes);

    Dataset {
        root,
        images,
        labels,
    }
}
