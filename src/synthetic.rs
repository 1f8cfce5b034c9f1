//! Randomized z-stacks, for exercising the OME-Zarr path without real data.
use std::path::PathBuf;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    Result,
    ome_zarr::{ZarrOptions, write_image},
    scan_info::Scaling,
    stack::ZStack,
    storage::{self, child_path, put_group},
};

#[derive(Debug, Clone, PartialEq)]
pub struct RandomizedOptions {
    pub output: PathBuf,
    pub channels: Vec<String>,
    /// `[z, y, x]`
    pub shape: [u64; 3],
    pub scaling: Scaling,
    /// Fixed seed for reproducible output; entropy-seeded if absent.
    pub seed: Option<u64>,
}

impl RandomizedOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            channels: ["A", "B", "C", "D", "E"]
                .map(|c| format!("Channel {c}"))
                .to_vec(),
            shape: [45, 1537, 1540],
            scaling: Scaling::new(1.0, 0.1, 0.1),
            seed: None,
        }
    }
}

/// Uniform values in `[0, 65535)`.
fn random_stack(rng: &mut StdRng, shape: [u64; 3]) -> Result<ZStack> {
    let len = shape.iter().product::<u64>() as usize;
    let data = (0..len).map(|_| rng.gen_range(0..u16::MAX)).collect();
    ZStack::new(shape, data)
}

/// Write one randomized image per channel directly under the root group.
///
/// Any existing output is removed first.
pub fn randomized_to_omezarr(options: &RandomizedOptions, zarr: &ZarrOptions) -> Result<PathBuf> {
    if options.output.exists() {
        log::info!("removing previous output {}", options.output.display());
        std::fs::remove_dir_all(&options.output)?;
    }
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let store = storage::filesystem_store(&options.output)?;
    put_group(&store, "/", Default::default())?;
    for channel in &options.channels {
        let stack = random_stack(&mut rng, options.shape)?;
        log::info!("channel {channel}: stack shape {:?}", stack.shape());
        write_image(
            &store,
            &child_path("/", channel),
            stack,
            options.scaling,
            zarr,
        )?;
    }
    log::info!("OME-Zarr written to {}", options.output.display());
    Ok(options.output.clone())
}
