//! Frame decoder boundary.
//!
//! The video decode step is external. Implementations turn a channel's opaque
//! byte blob into a sequence of [`RawFrame`]s and report the stream's pixel
//! format; nothing downstream looks at codec internals.

use crate::error::Result;
use crate::frame::{BitDepth, PixelFormat, RawFrame};

/// Lazy frame sequence for one channel. Consumed once.
pub struct DecodedFrames {
    pixel_format: PixelFormat,
    frames: Box<dyn Iterator<Item = Result<RawFrame>> + Send>,
}

impl DecodedFrames {
    pub fn new<I>(pixel_format: PixelFormat, frames: I) -> Self
    where
        I: Iterator<Item = Result<RawFrame>> + Send + 'static,
    {
        Self {
            pixel_format,
            frames: Box::new(frames),
        }
    }

    /// Pixel format the decoder detected for this stream.
    #[must_use]
    pub fn pixel_format(&self) -> &PixelFormat {
        &self.pixel_format
    }
}

impl Iterator for DecodedFrames {
    type Item = Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.frames.next()
    }
}

impl std::fmt::Debug for DecodedFrames {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedFrames")
            .field("pixel_format", &self.pixel_format)
            .finish_non_exhaustive()
    }
}

/// External video-decode capability.
pub trait FrameDecoder: Send + Sync {
    /// Decoder name, for logging.
    fn name(&self) -> &'static str;

    /// Reports the pixel format of an embedded stream without decoding frames.
    ///
    /// # Errors
    /// Returns [`crate::Error::Decode`] if the decoder cannot be invoked.
    fn probe(&self, channel: &str, stream: &[u8]) -> Result<PixelFormat>;

    /// Decodes every frame of `stream` as grayscale samples of width `depth`.
    ///
    /// Frames may carry codec block-alignment padding. An implementation may
    /// fail eagerly or yield an `Err` item mid-stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::Decode`] if the decoder cannot be invoked.
    fn decode(&self, channel: &str, stream: &[u8], depth: BitDepth) -> Result<DecodedFrames>;
}
