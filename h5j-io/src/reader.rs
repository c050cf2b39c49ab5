//! Entry points over an H5J file on disk.

use crate::store::Hdf5Store;
use crate::Result;
use h5j_core::{list_channels, ContainerAttributes, FrameDecoder, CHANNELS_PATH};
use h5j_stack::{AssembledStack, AssemblyConfig, CancelToken, StackReassembler};
use std::path::Path;

/// An open H5J file.
///
/// The reader only holds the container; the video decoder is passed per
/// call so a caller can swap it (e.g. for a scripted decoder in tests).
#[derive(Debug)]
pub struct H5jReader {
    store: Hdf5Store,
    config: AssemblyConfig,
    cancel: CancelToken,
}

impl H5jReader {
    /// Opens an H5J file with the default assembly configuration.
    ///
    /// # Errors
    /// Returns an error if the file is not readable HDF5.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            store: Hdf5Store::open(path)?,
            config: AssemblyConfig::default(),
            cancel: CancelToken::default(),
        })
    }

    #[must_use]
    pub fn with_config(mut self, config: AssemblyConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares a cancellation token with every pipeline run from this reader.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    #[must_use]
    pub fn store(&self) -> &Hdf5Store {
        &self.store
    }

    /// Channel member ids in stack order.
    ///
    /// # Errors
    /// Returns an error if the channel group is missing.
    pub fn channel_names(&self) -> Result<Vec<String>> {
        Ok(list_channels(&self.store, CHANNELS_PATH)?
            .into_iter()
            .map(|c| c.id)
            .collect())
    }

    /// Number of channels.
    ///
    /// # Errors
    /// Returns an error if the channel group is missing.
    pub fn channel_count(&self) -> Result<usize> {
        Ok(list_channels(&self.store, CHANNELS_PATH)?.len())
    }

    /// Padding, declared geometry and calibration, without decoding.
    ///
    /// # Errors
    /// Returns an error if an attribute has an unreadable type.
    pub fn attributes(&self) -> Result<ContainerAttributes> {
        Ok(ContainerAttributes::read(&self.store, self.config.convention)?)
    }

    /// Decodes and reassembles every channel.
    ///
    /// # Errors
    /// Returns any fatal pipeline error.
    pub fn load_stack(&self, decoder: &dyn FrameDecoder) -> Result<AssembledStack> {
        Ok(self.reassembler(decoder).assemble()?)
    }

    /// Decodes a single channel by member id.
    ///
    /// # Errors
    /// Returns any fatal pipeline error, or a container error for an unknown id.
    pub fn extract_channel(&self, id: &str, decoder: &dyn FrameDecoder) -> Result<AssembledStack> {
        Ok(self.reassembler(decoder).extract_channel(id)?)
    }

    fn reassembler<'a>(&'a self, decoder: &'a dyn FrameDecoder) -> StackReassembler<'a> {
        log::debug!(
            "{}: decoding with {}",
            self.store.path().display(),
            decoder.name()
        );
        StackReassembler::new(&self.store, decoder)
            .with_config(self.config.clone())
            .with_cancel(self.cancel.clone())
    }
}
