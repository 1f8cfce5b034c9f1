mod common;

use std::fs::File;

use common::*;
use nviz::{
    Error,
    convert::ConversionRequest,
    ome_tiff::{OmeTiff, OmeTiffWriter, tiff_to_ometiff, verify_ome_tiff},
};
use tiff::encoder::{TiffEncoder, colortype};

fn request(data: &Dataset, with_labels: bool) -> ConversionRequest {
    ConversionRequest {
        image_dir: data.images.clone(),
        label_dir: with_labels.then(|| data.labels.clone()),
        output: data.root.path().join("example_output.ome.tiff"),
        channel_map: channel_map(),
        scaling: scaling(),
    }
}

#[test]
fn test_images_and_labels() {
    let data = dataset();
    let out = tiff_to_ometiff(&request(&data, true)).expect("convert");
    verify_ome_tiff(&out).expect("verify");

    let tiff = OmeTiff::open(&out).expect("open");
    assert_eq!(
        tiff.channel_names().expect("names"),
        ["Channel A", "Channel B", "compartment (labels)"]
    );
    assert_eq!(tiff.shape().expect("shape"), [3, DEPTH, HEIGHT, WIDTH]);
    assert_eq!(tiff.scaling().expect("scaling"), Some(scaling()));

    for channel in 0..2 {
        let stack = tiff.read_channel(channel).expect("read channel");
        assert_eq!(
            stack.as_slice(),
            expected_channel(channel as usize).as_slice()
        );
    }
    let labels = tiff.read_channel(2).expect("read labels");
    assert_eq!(labels.as_slice(), expected_labels().as_slice());
    assert!(tiff.read_channel(3).is_err());
}

#[test]
fn test_images_only() {
    let data = dataset();
    let out = tiff_to_ometiff(&request(&data, false)).expect("convert");
    let tiff = OmeTiff::open(&out).expect("open");
    assert_eq!(
        tiff.channel_names().expect("names"),
        ["Channel A", "Channel B"]
    );
    let pixels = tiff.metadata().pixels().expect("pixels");
    assert_eq!(pixels.dimension_order, "XYZCT");
    assert_eq!(pixels.physical_size_z_unit.as_deref(), Some("um"));
}

#[test]
fn test_existing_output_is_refused() {
    let data = dataset();
    let req = request(&data, false);
    std::fs::write(&req.output, b"keep me").expect("pre-create output");
    let err = tiff_to_ometiff(&req).expect_err("should refuse");
    assert!(matches!(err, Error::OutputExists(_)));
    assert_eq!(std::fs::read(&req.output).expect("read"), b"keep me");
}

#[test]
fn test_writer_never_replaces_a_file() {
    let data = dataset();
    let path = data.root.path().join("taken.ome.tiff");
    std::fs::write(&path, b"keep me").expect("pre-create output");
    let shape = [DEPTH, HEIGHT, WIDTH];
    let created = OmeTiffWriter::create(&path, shape, scaling(), &["Channel A"]);
    assert!(matches!(created, Err(Error::OutputExists(_))));
    assert_eq!(std::fs::read(&path).expect("read"), b"keep me");
}

#[test]
fn test_mismatched_label_shape_leaves_no_file() {
    let data = dataset();
    // a 1x3 label volume cannot share the 4x5 planes
    let tiny = data.labels.join("aaa_masks.tiff");
    let mut encoder = TiffEncoder::new(File::create(&tiny).expect("create")).expect("encoder");
    encoder
        .write_image::<colortype::Gray8>(3, 1, &[0, 1, 2])
        .expect("write");
    drop(encoder);

    let req = request(&data, true);
    let err = tiff_to_ometiff(&req).expect_err("should fail");
    assert!(matches!(err, Error::ShapeMismatch { .. }));
    assert!(!req.output.exists());
}

#[test]
fn test_plain_tiff_is_not_ome() {
    let data = dataset();
    let plain = data.images.join("C10-1_111_ZS001_FOV-1.tif");
    let err = verify_ome_tiff(&plain).expect_err("not OME");
    assert!(matches!(err, Error::NotOmeTiff(_)));
}
