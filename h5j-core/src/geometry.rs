//! Logical frame geometry and padding removal.

use crate::error::{Error, Result};
use crate::frame::{BitDepth, ByteOrder, Frame, Pixels, RawFrame};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unpadded image geometry plus the codec block-alignment padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LogicalGeometry {
    pub width: usize,
    pub height: usize,
    pub pad_right: usize,
    pub pad_bottom: usize,
}

impl LogicalGeometry {
    #[must_use]
    pub fn new(width: usize, height: usize, pad_right: usize, pad_bottom: usize) -> Self {
        Self {
            width,
            height,
            pad_right,
            pad_bottom,
        }
    }

    /// Derives the logical geometry from a decoded frame when the container
    /// does not declare one: decoded size minus padding.
    #[must_use]
    pub fn from_decoded(frame: &RawFrame, pad_right: usize, pad_bottom: usize) -> Self {
        Self {
            width: frame.width.saturating_sub(pad_right),
            height: frame.height.saturating_sub(pad_bottom),
            pad_right,
            pad_bottom,
        }
    }

    /// True if any padding has to be stripped.
    #[must_use]
    pub fn is_padded(&self) -> bool {
        self.pad_right > 0 || self.pad_bottom > 0
    }

    /// Converts a raw frame to native samples and crops it to the logical geometry.
    ///
    /// Unpadded frames pass through with their decoded dimensions.
    ///
    /// # Errors
    /// Returns [`Error::Geometry`] if the frame is smaller than the logical size,
    /// or [`Error::Decode`] if its buffer is shorter than its dimensions require.
    pub fn normalize(&self, raw: &RawFrame, channel: &str, index: usize) -> Result<Frame> {
        if raw.width < self.width || raw.height < self.height {
            return Err(Error::Geometry {
                channel: channel.to_string(),
                frame: index,
                expected: (self.width, self.height),
                found: (raw.width, raw.height),
            });
        }
        if raw.width == 0 || raw.height == 0 {
            return Err(Error::decode(channel, format!("frame {index} is empty")));
        }
        if raw.data.len() < raw.expected_len() {
            return Err(Error::decode(
                channel,
                format!(
                    "frame {index} holds {} bytes, {}x{} needs {}",
                    raw.data.len(),
                    raw.width,
                    raw.height,
                    raw.expected_len()
                ),
            ));
        }

        let (out_w, out_h) = if self.is_padded() {
            (self.width, self.height)
        } else {
            (raw.width, raw.height)
        };

        let pixels = match raw.depth {
            BitDepth::Eight => {
                let mut out = Vec::with_capacity(out_w * out_h);
                for row in raw.data.chunks_exact(raw.width).take(out_h) {
                    out.extend_from_slice(&row[..out_w]);
                }
                Pixels::Gray8(out)
            }
            BitDepth::Sixteen => {
                let mut out = Vec::with_capacity(out_w * out_h);
                for row in raw.data.chunks_exact(raw.width * 2).take(out_h) {
                    out.extend(
                        row[..out_w * 2]
                            .chunks_exact(2)
                            .map(|b| read_u16([b[0], b[1]], raw.byte_order)),
                    );
                }
                Pixels::Gray16(out)
            }
        };

        Ok(Frame {
            width: out_w,
            height: out_h,
            pixels,
        })
    }
}

#[inline]
fn read_u16(bytes: [u8; 2], order: ByteOrder) -> u16 {
    match order {
        ByteOrder::Little => u16::from_le_bytes(bytes),
        ByteOrder::Big => u16::from_be_bytes(bytes),
    }
}
