//! h5j-io: External collaborators for the H5J pipeline.
//!
//! This crate connects the pipeline to the outside world: an HDF5-backed
//! [`h5j_core::ContainerStore`], a [`h5j_core::FrameDecoder`] that shells out
//! to `ffmpeg`/`ffprobe`, the [`H5jReader`] entry point, and export of a
//! reassembled stack to plain HDF5. Everything touching HDF5 sits behind the
//! `hdf5` feature.
//!

mod error;
#[cfg(feature = "hdf5")]
pub mod export;
pub mod ffmpeg;
#[cfg(feature = "hdf5")]
mod reader;
#[cfg(feature = "hdf5")]
pub mod store;

pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use export::{read_stack_hdf5, write_stack_hdf5, StackWriteOptions, StoredStack};
pub use ffmpeg::{FfmpegConfig, FfmpegDecoder, StreamInfo};
#[cfg(feature = "hdf5")]
pub use reader::H5jReader;
#[cfg(feature = "hdf5")]
pub use store::Hdf5Store;
