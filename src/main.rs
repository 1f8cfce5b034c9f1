use std::{path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};

use nviz::{
    config::Settings,
    convert::ConversionRequest,
    layers::{layers_from_ometiff, layers_from_omezarr},
    ome_tiff::{tiff_to_ometiff, verify_ome_tiff},
    ome_zarr::{OmeZarr, ZarrOptions, tiff_to_omezarr},
    scan_info::{Scaling, gather_scaling_info},
    synthetic::{RandomizedOptions, randomized_to_omezarr},
    viewer::{self, ServeOptions},
};

/// Convert microscopy TIFF z-stacks to OME-Zarr / OME-TIFF for 3D viewers.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML settings file.
    #[arg(long, global = true, env = "NVIZ_CONFIG")]
    config: Option<PathBuf>,

    /// More logging; repeat for more detail.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct ScaleArgs {
    /// ScanInfo.xml providing the voxel size.
    #[arg(long, conflicts_with = "scale")]
    scaninfo: Option<PathBuf>,

    /// Voxel size in micrometers as `Z,Y,X`.
    #[arg(long)]
    scale: Option<Scaling>,
}

impl ScaleArgs {
    fn resolve(&self) -> anyhow::Result<Option<Scaling>> {
        if let Some(s) = self.scale {
            return Ok(Some(s));
        }
        match &self.scaninfo {
            Some(path) => {
                let partial = gather_scaling_info(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Ok(Some(Scaling::try_from(partial)?))
            }
            None => Ok(None),
        }
    }

    fn require(&self) -> anyhow::Result<Scaling> {
        match self.resolve()? {
            Some(s) => Ok(s),
            None => bail!("one of --scaninfo or --scale is required"),
        }
    }
}

#[derive(Debug, Args)]
struct ConvertArgs {
    /// Directory of per-slice image TIFFs.
    #[arg(long)]
    images: PathBuf,

    /// Directory of label (mask) volumes.
    #[arg(long)]
    labels: Option<PathBuf>,

    #[arg(long, short)]
    output: PathBuf,

    #[command(flatten)]
    scale: ScaleArgs,
}

impl ConvertArgs {
    fn request(&self, settings: &Settings) -> anyhow::Result<ConversionRequest> {
        Ok(ConversionRequest {
            image_dir: self.images.clone(),
            label_dir: self.labels.clone(),
            output: self.output.clone(),
            channel_map: settings.channel_map(),
            scaling: self.scale.require()?,
        })
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Ometiff,
    Zarr,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Viewer {
    Avivator,
    Neuroglancer,
    None,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert TIFF slices to an OME-Zarr hierarchy.
    TiffToZarr {
        #[command(flatten)]
        convert: ConvertArgs,

        /// z-slices per chunk; overrides the settings file.
        #[arg(long)]
        chunk_z: Option<u64>,
    },
    /// Convert TIFF slices to a single CZYX OME-TIFF.
    TiffToOmetiff {
        #[command(flatten)]
        convert: ConvertArgs,
    },
    /// Write randomized channels to an OME-Zarr hierarchy.
    RandomizedToZarr {
        #[arg(long, short)]
        output: PathBuf,
        #[arg(long, default_value_t = 45)]
        depth: u64,
        #[arg(long, default_value_t = 1537)]
        height: u64,
        #[arg(long, default_value_t = 1540)]
        width: u64,
        /// Comma-separated channel names.
        #[arg(long, value_delimiter = ',')]
        channels: Option<Vec<String>>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the hierarchy of a Zarr store.
    Tree { path: PathBuf },
    /// Check that a file is an OME-TIFF.
    VerifyOmetiff { path: PathBuf },
    /// Print the viewer layers (as JSON) for a converted file.
    Layers {
        #[arg(value_enum)]
        format: Format,
        path: PathBuf,
        #[command(flatten)]
        scale: ScaleArgs,
    },
    /// Serve a data directory over HTTP with CORS and print a viewer link.
    Serve {
        /// Directory to serve.
        #[arg(long)]
        root: PathBuf,
        /// File or hierarchy within the root to open in the viewer.
        #[arg(long)]
        file: Option<String>,
        #[arg(long, value_enum, default_value = "none")]
        viewer: Viewer,
        #[arg(long)]
        port: Option<u16>,
        /// Seconds to keep serving.
        #[arg(long)]
        duration: Option<u64>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match cli.command {
        Command::TiffToZarr { convert, chunk_z } => {
            let options = ZarrOptions {
                chunk_z: chunk_z.unwrap_or(settings.chunk_z),
                compression: settings.compression.clone(),
            };
            let output = tiff_to_omezarr(&convert.request(&settings)?, &options)?;
            print!("{}", OmeZarr::open(&output)?.tree()?);
        }
        Command::TiffToOmetiff { convert } => {
            let output = tiff_to_ometiff(&convert.request(&settings)?)?;
            verify_ome_tiff(&output)?;
        }
        Command::RandomizedToZarr {
            output,
            depth,
            height,
            width,
            channels,
            seed,
        } => {
            let mut options = RandomizedOptions::new(output);
            options.shape = [depth, height, width];
            options.seed = seed;
            if let Some(channels) = channels {
                options.channels = channels;
            }
            let zarr = ZarrOptions {
                chunk_z: settings.chunk_z,
                compression: settings.compression.clone(),
            };
            let output = randomized_to_omezarr(&options, &zarr)?;
            print!("{}", OmeZarr::open(&output)?.tree()?);
        }
        Command::Tree { path } => {
            print!("{}", OmeZarr::open(&path)?.tree()?);
        }
        Command::VerifyOmetiff { path } => {
            verify_ome_tiff(&path)?;
        }
        Command::Layers {
            format,
            path,
            scale,
        } => {
            let scaling = scale.resolve()?;
            let layers = match format {
                Format::Ometiff => layers_from_ometiff(&path, scaling)?,
                Format::Zarr => layers_from_omezarr(&path, scaling)?,
            };
            println!("{}", serde_json::to_string_pretty(&layers)?);
        }
        Command::Serve {
            root,
            file,
            viewer,
            port,
            duration,
        } => {
            let port = port.unwrap_or(settings.serve.port);
            let base = viewer::data_base_url(&settings.serve.host, port)?;
            let link = match (viewer, &file) {
                (Viewer::None, _) => None,
                (_, None) => bail!("--file is required to open a viewer"),
                (Viewer::Avivator, Some(file)) => {
                    Some(viewer::avivator_url(&viewer::served_url(&base, file)?)?)
                }
                (Viewer::Neuroglancer, Some(file)) => {
                    let layers = layers_from_omezarr(root.join(file), None)?;
                    Some(viewer::neuroglancer_url(
                        &layers,
                        &viewer::served_url(&base, file)?,
                    )?)
                }
            };
            if let Some(link) = link {
                println!("Open in a web browser: {link}");
            }
            let options = ServeOptions {
                root,
                host: settings.serve.host.clone(),
                port,
                duration: Duration::from_secs(duration.unwrap_or(settings.serve.duration_secs)),
            };
            tokio::runtime::Runtime::new()?.block_on(viewer::serve(options))?;
        }
    }
    Ok(())
}
