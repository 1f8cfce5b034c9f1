//! OME-TIFF output and input.
//!
//! Files are BigTIFF with one uint16 grayscale page per (channel, z) plane in
//! CZYX order; the first page's ImageDescription holds the OME-XML.

use std::{
    fs::File,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tiff::{
    encoder::{TiffEncoder, TiffKindBig, colortype::Gray16},
    tags::Tag,
};

use crate::{
    Error, Result,
    convert::{ConversionRequest, discard_partial},
    ome_xml::{OmeXml, is_ome_description},
    scan_info::Scaling,
    stack::{ZStack, open_decoder, read_plane, read_tiff, stack_slices},
};

/// Streams channel volumes into an OME-TIFF, one channel at a time.
pub struct OmeTiffWriter {
    path: PathBuf,
    encoder: TiffEncoder<File, TiffKindBig>,
    description: Option<String>,
    shape: [u64; 3],
    expected_channels: usize,
    written_channels: usize,
}

impl OmeTiffWriter {
    /// Create the file, refusing to replace an existing one; every channel
    /// written must have shape `[z, y, x]`.
    pub fn create(
        path: impl AsRef<Path>,
        shape: [u64; 3],
        scaling: Scaling,
        channel_names: &[impl AsRef<str>],
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let [z, y, x] = shape;
        let size = [channel_names.len() as u64, z, y, x];
        let description = OmeXml::new(size, scaling, channel_names).to_xml()?;
        let file = File::create_new(&path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => Error::OutputExists(path.clone()),
            _ => Error::Io(e),
        })?;
        let encoder = match TiffEncoder::new_big(file) {
            Ok(encoder) => encoder,
            Err(e) => {
                discard_partial(&path);
                return Err(e.into());
            }
        };
        Ok(Self {
            path,
            encoder,
            description: Some(description),
            shape,
            expected_channels: channel_names.len(),
            written_channels: 0,
        })
    }

    pub fn write_channel(&mut self, name: &str, stack: &ZStack) -> Result<()> {
        if stack.shape() != self.shape {
            return Err(Error::ShapeMismatch {
                expected: self.shape.to_vec(),
                found: stack.shape().to_vec(),
                path: PathBuf::from(name),
            });
        }
        if self.written_channels == self.expected_channels {
            return Err(Error::general(format!(
                "{}: all {} channels already written",
                self.path.display(),
                self.expected_channels
            )));
        }
        let [_, y, x] = self.shape;
        for plane in stack.planes() {
            let mut image = self.encoder.new_image::<Gray16>(x as u32, y as u32)?;
            if let Some(description) = self.description.take() {
                image
                    .encoder()
                    .write_tag(Tag::ImageDescription, description.as_str())?;
            }
            image.write_data(plane)?;
        }
        self.written_channels += 1;
        log::debug!("wrote channel {name} to {}", self.path.display());
        Ok(())
    }

    pub fn finish(self) -> Result<PathBuf> {
        if self.written_channels != self.expected_channels {
            return Err(Error::general(format!(
                "{}: wrote {} of {} channels",
                self.path.display(),
                self.written_channels,
                self.expected_channels
            )));
        }
        Ok(self.path)
    }
}

/// Convert per-slice image TIFFs (and optional label volumes) to a single
/// CZYX OME-TIFF. Image channels come first, then labels.
pub fn tiff_to_ometiff(request: &ConversionRequest) -> Result<PathBuf> {
    if request.output.exists() {
        return Err(Error::OutputExists(request.output.clone()));
    }
    let frames = request.discover()?;

    let mut names: Vec<String> = frames.channel_names().map(str::to_owned).collect();
    let labels = if request.label_dir.is_some() {
        names.extend(frames.label_names().map(str::to_owned));
        frames.labels.as_slice()
    } else {
        &[]
    };

    // the first stack fixes the shape recorded in the OME-XML
    let mut images = frames.images.iter();
    let Some((first_name, first_files)) = images.next() else {
        return Err(Error::NoImages(request.image_dir.clone()));
    };
    let first = stack_slices(first_files)?;

    let mut writer =
        OmeTiffWriter::create(&request.output, first.shape(), request.scaling, &names)?;
    let result = (move || {
        writer.write_channel(first_name, &first)?;
        for (channel, files) in images {
            writer.write_channel(channel, &stack_slices(files)?)?;
        }
        for (label, file) in labels {
            writer.write_channel(label, &read_tiff(file)?)?;
        }
        writer.finish()
    })();

    match result {
        Ok(path) => {
            log::info!("OME-TIFF written to {}", path.display());
            Ok(path)
        }
        Err(e) => {
            discard_partial(&request.output);
            Err(e)
        }
    }
}

/// Read access to an OME-TIFF written as one page per plane.
pub struct OmeTiff {
    path: PathBuf,
    metadata: OmeXml,
}

impl OmeTiff {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut decoder = open_decoder(&path)?;
        let description = decoder
            .get_tag_ascii_string(Tag::ImageDescription)
            .map_err(|_| Error::NotOmeTiff(path.clone()))?;
        if !is_ome_description(&description) {
            return Err(Error::NotOmeTiff(path));
        }
        let metadata = OmeXml::from_xml(&description)?;
        Ok(Self { path, metadata })
    }

    pub fn metadata(&self) -> &OmeXml {
        &self.metadata
    }

    pub fn channel_names(&self) -> Result<Vec<String>> {
        self.metadata.channel_names()
    }

    pub fn scaling(&self) -> Result<Option<Scaling>> {
        self.metadata.scaling()
    }

    /// `[c, z, y, x]`
    pub fn shape(&self) -> Result<[u64; 4]> {
        let p = self.metadata.pixels()?;
        Ok([p.size_c, p.size_z, p.size_y, p.size_x])
    }

    /// Read the z-stack of one channel.
    pub fn read_channel(&self, channel: u64) -> Result<ZStack> {
        let pixels = self.metadata.pixels()?;
        let [size_c, size_z, size_y, size_x] = self.shape()?;
        if channel >= size_c {
            return Err(Error::general(format!(
                "channel {channel} out of range for {size_c} channels"
            )));
        }
        if pixels.dimension_order != "XYZCT" && size_z > 1 && size_c > 1 {
            return Err(Error::general(format!(
                "unsupported dimension order {}",
                pixels.dimension_order
            )));
        }
        let first_ifd = pixels.tiff_data.first().and_then(|t| t.ifd).unwrap_or(0);

        let mut decoder = open_decoder(&self.path)?;
        let mut data = Vec::with_capacity((size_z * size_y * size_x) as usize);
        for z in 0..size_z {
            let ifd = first_ifd + channel * size_z + z;
            decoder.seek_to_image(ifd as usize)?;
            let (yx, plane) = read_plane(&mut decoder, &self.path)?;
            if yx != [size_y, size_x] {
                return Err(Error::ShapeMismatch {
                    expected: vec![size_y, size_x],
                    found: yx.to_vec(),
                    path: self.path.clone(),
                });
            }
            data.extend(plane);
        }
        ZStack::new([size_z, size_y, size_x], data)
    }
}

/// Check that the first IFD of a file carries OME-XML.
pub fn verify_ome_tiff(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    OmeTiff::open(path)?;
    log::info!("{} is OME-TIFF: true", path.display());
    Ok(())
}
