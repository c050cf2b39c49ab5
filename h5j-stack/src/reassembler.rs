//! Stack reassembly: channel 0 fixes bit depth, geometry and depth; the
//! remaining channels are decoded (optionally in parallel) and folded in
//! channel order.

use crate::cancel::CancelToken;
use crate::config::{AssemblyConfig, MismatchPolicy};
use h5j_core::{
    list_channels, resolve_bit_depth, BitDepth, CalibrationMetadata, ChannelDescriptor,
    ContainerAttributes, ContainerStore, DisplayHint, Error, Frame, FrameDecoder,
    LogicalGeometry, PixelFormat, Result, Stack, CHANNELS_PATH, PACKED_12BIT_DIVISOR,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A condition recovered from without failing the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssemblyWarning {
    /// A channel produced a different depth than channel 0. The stack was
    /// truncated to `kept_depth` and `dropped_channels` later channels were
    /// not included.
    #[allow(missing_docs)]
    ChannelDepthMismatch {
        channel: String,
        expected: usize,
        found: usize,
        kept_depth: usize,
        dropped_channels: usize,
    },
}

impl std::fmt::Display for AssemblyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChannelDepthMismatch {
                channel,
                expected,
                found,
                kept_depth,
                dropped_channels,
            } => write!(
                f,
                "channel {channel} has {found} frames, expected {expected}; \
                 stack truncated to depth {kept_depth}, {dropped_channels} channel(s) dropped"
            ),
        }
    }
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct AssembledStack {
    /// Reassembled frames.
    pub stack: Stack,
    /// Spacing, unit, padding and bit depth.
    pub calibration: CalibrationMetadata,
    /// Presentation hint for the caller's viewer.
    pub display: DisplayHint,
    /// Channels included in `stack`, in stack order.
    pub channels: Vec<ChannelDescriptor>,
    /// Pixel format reported for channel 0.
    pub pixel_format: PixelFormat,
    /// Recovered conditions, e.g. a truncated depth.
    pub warnings: Vec<AssemblyWarning>,
}

impl AssembledStack {
    /// True if any condition was recovered from.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Channel 0 outcome: everything later channels depend on.
struct Reference {
    frames: Vec<Frame>,
    bit_depth: BitDepth,
    geometry: LogicalGeometry,
    pixel_format: PixelFormat,
}

/// Orchestrates decode, normalization and reassembly over a container.
pub struct StackReassembler<'a> {
    store: &'a dyn ContainerStore,
    decoder: &'a dyn FrameDecoder,
    config: AssemblyConfig,
    cancel: CancelToken,
}

impl<'a> StackReassembler<'a> {
    /// Creates a reassembler with default configuration.
    #[must_use]
    pub fn new(store: &'a dyn ContainerStore, decoder: &'a dyn FrameDecoder) -> Self {
        Self {
            store,
            decoder,
            config: AssemblyConfig::default(),
            cancel: CancelToken::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: AssemblyConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Runs the full pipeline over every channel.
    ///
    /// # Errors
    /// Returns [`Error::Container`], [`Error::Decode`], [`Error::Geometry`] or
    /// [`Error::FrameShape`] on fatal conditions, [`Error::Cancelled`] if cancelled, and
    /// [`Error::ChannelDepthMismatch`] under [`MismatchPolicy::Fail`].
    pub fn assemble(&self) -> Result<AssembledStack> {
        self.cancel.check()?;
        let attrs = ContainerAttributes::read(self.store, self.config.convention)?;
        let channels = list_channels(self.store, CHANNELS_PATH)?;
        let Some((first, rest)) = channels.split_first() else {
            return Err(Error::container(CHANNELS_PATH, "container has no channels"));
        };
        log::debug!(
            "{} channel(s), padding {}x{}",
            channels.len(),
            attrs.pad_right,
            attrs.pad_bottom
        );

        let reference = self.decode_reference(first, &attrs)?;
        let depth0 = reference.frames.len();
        log::debug!(
            "{}: {} frames, pixel format {}, {}-bit",
            first.id,
            depth0,
            reference.pixel_format,
            reference.bit_depth.bits()
        );

        let mut per_channel = vec![(first.id.clone(), reference.frames)];
        let mut kept = vec![first.clone()];
        let mut depth = depth0;
        let mut warnings = Vec::new();

        for (channel, frames) in rest
            .iter()
            .zip(self.decode_remaining(rest, reference.bit_depth, &reference.geometry)?)
        {
            let mut frames = frames?;
            if frames.len() == depth0 {
                per_channel.push((channel.id.clone(), frames));
                kept.push(channel.clone());
                continue;
            }

            if self.config.mismatch_policy == MismatchPolicy::Fail {
                return Err(Error::ChannelDepthMismatch {
                    channel: channel.id.clone(),
                    expected: depth0,
                    found: frames.len(),
                });
            }

            depth = depth0.min(frames.len());
            let warning = AssemblyWarning::ChannelDepthMismatch {
                channel: channel.id.clone(),
                expected: depth0,
                found: frames.len(),
                kept_depth: depth,
                dropped_channels: channels.len() - channel.index - 1,
            };
            log::warn!("{warning}");
            warnings.push(warning);

            frames.truncate(depth);
            per_channel.push((channel.id.clone(), frames));
            kept.push(channel.clone());
            for (_, earlier) in &mut per_channel {
                earlier.truncate(depth);
            }
            break;
        }

        let mut stack = Stack::from_channels(per_channel, reference.bit_depth)?;
        if reference.bit_depth == BitDepth::Sixteen {
            stack.rescale(PACKED_12BIT_DIVISOR);
        }
        log::info!(
            "assembled {} channel(s) x {} slices of {}x{}",
            stack.channels(),
            depth,
            stack.width(),
            stack.height()
        );

        Ok(AssembledStack {
            display: DisplayHint::for_stack(stack.channels(), reference.bit_depth),
            calibration: attrs.calibration(reference.bit_depth),
            stack,
            channels: kept,
            pixel_format: reference.pixel_format,
            warnings,
        })
    }

    /// Decodes a single channel by member id, probing its own bit depth.
    ///
    /// # Errors
    /// Same fatal conditions as [`StackReassembler::assemble`].
    pub fn extract_channel(&self, id: &str) -> Result<AssembledStack> {
        self.cancel.check()?;
        let attrs = ContainerAttributes::read(self.store, self.config.convention)?;
        let channel = list_channels(self.store, CHANNELS_PATH)?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::container(format!("{CHANNELS_PATH}/{id}"), "no such channel"))?;

        let reference = self.decode_reference(&channel, &attrs)?;
        let frames = vec![(channel.id.clone(), reference.frames)];
        let mut stack = Stack::from_channels(frames, reference.bit_depth)?;
        if reference.bit_depth == BitDepth::Sixteen {
            stack.rescale(PACKED_12BIT_DIVISOR);
        }

        Ok(AssembledStack {
            display: DisplayHint::for_stack(1, reference.bit_depth),
            calibration: attrs.calibration(reference.bit_depth),
            stack,
            channels: vec![channel],
            pixel_format: reference.pixel_format,
            warnings: Vec::new(),
        })
    }

    fn decode_reference(
        &self,
        channel: &ChannelDescriptor,
        attrs: &ContainerAttributes,
    ) -> Result<Reference> {
        let blob = self.store.read_opaque(&channel.path_in(CHANNELS_PATH))?;
        self.cancel.check()?;
        let pixel_format = self.decoder.probe(&channel.id, &blob)?;
        let bit_depth = resolve_bit_depth(&pixel_format);

        let mut decoded = self.decoder.decode(&channel.id, &blob, bit_depth)?;
        let first = decoded
            .next()
            .transpose()?
            .ok_or_else(|| Error::decode(&channel.id, "decoder produced no frames"))?;

        let geometry = match attrs.declared_size() {
            Some((width, height)) => {
                LogicalGeometry::new(width, height, attrs.pad_right, attrs.pad_bottom)
            }
            None => LogicalGeometry::from_decoded(&first, attrs.pad_right, attrs.pad_bottom),
        };
        if first.width != geometry.width + geometry.pad_right
            || first.height != geometry.height + geometry.pad_bottom
        {
            log::debug!(
                "{}: decoded {}x{} does not equal logical {}x{} plus padding {}x{}",
                channel.id,
                first.width,
                first.height,
                geometry.width,
                geometry.height,
                geometry.pad_right,
                geometry.pad_bottom
            );
        }

        let mut frames = vec![geometry.normalize(&first, &channel.id, 0)?];
        for (index, raw) in decoded.enumerate() {
            self.cancel.check()?;
            frames.push(geometry.normalize(&raw?, &channel.id, index + 1)?);
        }

        Ok(Reference {
            frames,
            bit_depth,
            geometry,
            pixel_format,
        })
    }

    fn decode_channel(
        &self,
        channel: &ChannelDescriptor,
        bit_depth: BitDepth,
        geometry: &LogicalGeometry,
    ) -> Result<Vec<Frame>> {
        self.cancel.check()?;
        let blob = self.store.read_opaque(&channel.path_in(CHANNELS_PATH))?;
        let decoded = self.decoder.decode(&channel.id, &blob, bit_depth)?;
        if decoded.pixel_format().is_packed_12bit() != (bit_depth == BitDepth::Sixteen) {
            log::debug!(
                "{} reports {}, decoding as {}-bit from channel 0",
                channel.id,
                decoded.pixel_format(),
                bit_depth.bits()
            );
        }

        let mut frames = Vec::new();
        for (index, raw) in decoded.enumerate() {
            self.cancel.check()?;
            frames.push(geometry.normalize(&raw?, &channel.id, index)?);
        }
        if frames.is_empty() {
            return Err(Error::decode(&channel.id, "decoder produced no frames"));
        }
        log::debug!("{}: {} frames", channel.id, frames.len());
        Ok(frames)
    }

    /// Fan-out over channels after channel 0. Results come back in channel
    /// order; the sequential path is lazy so the fold can stop early.
    fn decode_remaining<'s>(
        &'s self,
        channels: &'s [ChannelDescriptor],
        bit_depth: BitDepth,
        geometry: &'s LogicalGeometry,
    ) -> Result<Box<dyn Iterator<Item = Result<Vec<Frame>>> + 's>> {
        if !self.config.parallel || channels.len() < 2 {
            return Ok(Box::new(
                channels
                    .iter()
                    .map(move |c| self.decode_channel(c, bit_depth, geometry)),
            ));
        }

        let run = || -> Vec<Result<Vec<Frame>>> {
            channels
                .par_iter()
                .map(|c| self.decode_channel(c, bit_depth, geometry))
                .collect()
        };
        let results = match self.config.threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| Error::Config(format!("cannot build decode pool: {e}")))?
                .install(run),
            None => run(),
        };
        self.cancel.check()?;
        Ok(Box::new(results.into_iter()))
    }
}
