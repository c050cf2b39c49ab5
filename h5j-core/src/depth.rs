//! Bit-depth resolution from the decoder-reported pixel format.

use crate::frame::{BitDepth, PixelFormat};

/// Divisor that maps 12-bit-in-16-bit samples into the displayable 12-bit range.
pub const PACKED_12BIT_DIVISOR: u16 = 16;

/// Resolves the sample width for a whole stack from channel 0's pixel format.
///
/// Only the first channel is probed; every other channel is decoded with the
/// returned width regardless of what its own stream reports.
#[must_use]
pub fn resolve_bit_depth(channel0: &PixelFormat) -> BitDepth {
    if channel0.is_packed_12bit() {
        BitDepth::Sixteen
    } else {
        BitDepth::Eight
    }
}
