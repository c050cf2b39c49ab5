//! Error types for h5j-core.

use crate::frame::BitDepth;
use thiserror::Error;

/// Result type alias for h5j operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for container interpretation.
#[derive(Error, Debug)]
pub enum Error {
    /// Attribute store unreadable, or a required group/path is missing.
    #[error("container error at {path}: {reason}")]
    Container { path: String, reason: String },

    /// The external decoder could not be run or produced no frames.
    #[error("decode error for channel {channel}: {reason}")]
    Decode { channel: String, reason: String },

    /// A decoded frame is smaller than the declared logical geometry.
    #[error(
        "frame {frame} of channel {channel} is {}x{}, smaller than logical geometry {}x{}",
        found.0, found.1, expected.0, expected.1
    )]
    Geometry {
        channel: String,
        frame: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A frame's dimensions differ from channel 0's normalized frames.
    #[error(
        "frame {frame} of channel {channel} is {}x{}, channel 0 frames are {}x{}",
        found.0, found.1, expected.0, expected.1
    )]
    FrameShape {
        channel: String,
        frame: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A frame carries samples of a different width than the stack's bit depth.
    #[error(
        "frame {frame} of channel {channel} has {}-bit samples, stack is {}-bit",
        found.bits(), expected.bits()
    )]
    SampleWidth {
        channel: String,
        frame: usize,
        expected: BitDepth,
        found: BitDepth,
    },

    /// A channel produced a different depth than channel 0 under the fail-fast policy.
    #[error("channel {channel} has {found} frames, expected {expected}")]
    ChannelDepthMismatch {
        channel: String,
        expected: usize,
        found: usize,
    },

    /// The pipeline was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Index outside the stack's bounds.
    #[error("{what} index {index} out of range (len {len})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a [`Error::Container`] error.
    pub fn container(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Container {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Error::Decode`] error.
    pub fn decode(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error aborts the pipeline because of caller cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
