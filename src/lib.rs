//! Convert microscopy TIFF z-stacks to OME-Zarr and OME-TIFF, and hand the
//! results to 3D viewers.
pub mod config;
pub mod convert;
mod error;
pub mod frames;
pub mod layers;
pub mod metadata;
pub mod ome_tiff;
pub mod ome_xml;
pub mod ome_zarr;
pub mod scan_info;
pub mod stack;
pub mod storage;
pub mod synthetic;
pub mod viewer;

pub use zarrs;

pub use error::{Error, Result};
