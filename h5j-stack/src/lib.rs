//! h5j-stack: Channel decoding and stack reassembly for H5J containers.
//!
//! The pipeline runs in a fixed order:
//!
//! 1. Read structural attributes and enumerate channels.
//! 2. Decode channel 0: its pixel format fixes the bit depth and its frame
//!    count fixes the depth for the whole stack.
//! 3. Decode the remaining channels, on rayon workers when enabled. Results
//!    are joined before the consistency check, so completion order never
//!    affects the output.
//! 4. Fold channels in order, applying the [`MismatchPolicy`] to any
//!    channel whose depth differs from channel 0.
//! 5. Rescale 12-bit-in-16-bit samples and attach calibration.
//!
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]

mod cancel;
mod config;
mod reassembler;

pub use cancel::CancelToken;
pub use config::{AssemblyConfig, MismatchPolicy};
pub use reassembler::{AssembledStack, AssemblyWarning, StackReassembler};
