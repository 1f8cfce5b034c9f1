//! In-memory z-stacks and reading them from grayscale TIFFs.
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use tiff::{
    ColorType,
    decoder::{Decoder, DecodingResult, Limits},
};

use crate::{Error, Result};

/// A uint16 volume in C order, with shape `[z, y, x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ZStack {
    shape: [u64; 3],
    data: Vec<u16>,
}

impl ZStack {
    pub fn new(shape: [u64; 3], data: Vec<u16>) -> Result<Self> {
        let expected: u64 = shape.iter().product();
        if expected != data.len() as u64 {
            return Err(Error::general(format!(
                "stack of shape {shape:?} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> [u64; 3] {
        self.shape
    }

    pub fn depth(&self) -> u64 {
        self.shape[0]
    }

    /// Number of values in one z-plane.
    pub fn plane_len(&self) -> usize {
        (self.shape[1] * self.shape[2]) as usize
    }

    /// The `z`th plane, or `None` past the end of the stack.
    pub fn plane(&self, z: u64) -> Option<&[u16]> {
        let n = self.plane_len();
        let start = usize::try_from(z).ok()?.checked_mul(n)?;
        self.data.get(start..start.checked_add(n)?)
    }

    pub fn planes(&self) -> impl Iterator<Item = &[u16]> {
        (0..self.depth()).filter_map(|z| self.plane(z))
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u16> {
        self.data
    }
}

/// Cast decoded samples to u16 the way numpy's `astype(uint16)` does for
/// integers; floats saturate.
fn samples_to_u16(result: DecodingResult) -> Result<Vec<u16>> {
    let out = match result {
        DecodingResult::U8(v) => v.into_iter().map(u16::from).collect(),
        DecodingResult::U16(v) => v,
        DecodingResult::U32(v) => v.into_iter().map(|n| n as u16).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|n| n as u16).collect(),
        DecodingResult::I8(v) => v.into_iter().map(|n| n as u16).collect(),
        DecodingResult::I16(v) => v.into_iter().map(|n| n as u16).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|n| n as u16).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|n| n as u16).collect(),
        DecodingResult::F32(v) => v.into_iter().map(|n| n as u16).collect(),
        DecodingResult::F64(v) => v.into_iter().map(|n| n as u16).collect(),
        #[allow(unreachable_patterns)]
        _ => return Err(Error::general("unsupported TIFF sample format")),
    };
    Ok(out)
}

pub(crate) fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited()))
}

/// Decode the current page of `decoder` as a grayscale plane.
pub(crate) fn read_plane(
    decoder: &mut Decoder<BufReader<File>>,
    path: &Path,
) -> Result<([u64; 2], Vec<u16>)> {
    let color = decoder.colortype()?;
    if !matches!(color, ColorType::Gray(_)) {
        return Err(Error::general(format!(
            "{}: only grayscale TIFFs are supported, found {color:?}",
            path.display()
        )));
    }
    let (width, height) = decoder.dimensions()?;
    let plane = samples_to_u16(decoder.read_image()?)?;
    Ok(([height as u64, width as u64], plane))
}

/// Read every page of a grayscale TIFF into a stack.
///
/// A single-page TIFF gives a stack of depth 1.
pub fn read_tiff(path: impl AsRef<Path>) -> Result<ZStack> {
    let path = path.as_ref();
    let mut decoder = open_decoder(path)?;
    let mut yx: Option<[u64; 2]> = None;
    let mut depth = 0;
    let mut data = Vec::new();
    loop {
        let (shape, plane) = read_plane(&mut decoder, path)?;
        match yx {
            None => yx = Some(shape),
            Some(expected) if expected != shape => {
                return Err(Error::ShapeMismatch {
                    expected: expected.to_vec(),
                    found: shape.to_vec(),
                    path: path.to_path_buf(),
                });
            }
            Some(_) => {}
        }
        data.extend_from_slice(&plane);
        depth += 1;
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    let [y, x] = yx.unwrap_or_default();
    log::debug!("read {} as ({depth}, {y}, {x})", path.display());
    ZStack::new([depth, y, x], data)
}

/// Concatenate the planes of several TIFF files along z.
pub fn stack_slices<P: AsRef<Path>>(paths: &[P]) -> Result<ZStack> {
    let mut yx: Option<([u64; 2], PathBuf)> = None;
    let mut depth = 0;
    let mut data = Vec::new();
    for p in paths {
        let stack = read_tiff(p)?;
        let [z, y, x] = stack.shape();
        match &yx {
            None => yx = Some(([y, x], p.as_ref().to_path_buf())),
            Some((expected, _)) if *expected != [y, x] => {
                return Err(Error::ShapeMismatch {
                    expected: expected.to_vec(),
                    found: vec![y, x],
                    path: p.as_ref().to_path_buf(),
                });
            }
            Some(_) => {}
        }
        depth += z;
        data.extend(stack.into_vec());
    }
    let Some(([y, x], _)) = yx else {
        return Err(Error::general("cannot build a stack from zero files"));
    };
    ZStack::new([depth, y, x], data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planes_are_views() {
        let stack = ZStack::new([2, 2, 3], (0..12).collect()).unwrap();
        assert_eq!(stack.plane_len(), 6);
        assert_eq!(stack.plane(1), Some([6, 7, 8, 9, 10, 11].as_slice()));
        assert_eq!(stack.plane(2), None);
        assert_eq!(stack.planes().count(), 2);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(ZStack::new([2, 2, 2], vec![0; 7]).is_err());
    }

    #[test]
    fn numpy_like_casts() {
        assert_eq!(
            samples_to_u16(DecodingResult::I8(vec![-1, 5])).unwrap(),
            [65535, 5]
        );
        assert_eq!(
            samples_to_u16(DecodingResult::U32(vec![65536 + 7])).unwrap(),
            [7]
        );
        assert_eq!(
            samples_to_u16(DecodingResult::F32(vec![-3.0, 1e9, 12.7])).unwrap(),
            [0, 65535, 12]
        );
    }
}
