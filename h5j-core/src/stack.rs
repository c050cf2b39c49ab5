//! The reassembled multi-channel stack.
//!
//! Frames are stored grouped per channel (channel-major, depth-minor). The
//! exposed multi-dimensional view is channel-fastest: `view[z][c]` is
//! `storage[c][z]`.

use crate::error::{Error, Result};
use crate::frame::{BitDepth, Frame, Pixels};

/// Normalized frames for `channels x depth` slices with uniform geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    width: usize,
    height: usize,
    channels: usize,
    depth: usize,
    bit_depth: BitDepth,
    frames: Vec<Frame>,
}

impl Stack {
    /// Builds a stack from `(channel id, frames)` pairs in channel order.
    ///
    /// # Errors
    /// Returns [`Error::ChannelDepthMismatch`] if channels differ in frame count,
    /// [`Error::FrameShape`] if a frame's size differs from the first frame, or
    /// [`Error::SampleWidth`] if its samples do not match `bit_depth`.
    pub fn from_channels(
        per_channel: Vec<(String, Vec<Frame>)>,
        bit_depth: BitDepth,
    ) -> Result<Self> {
        let channels = per_channel.len();
        let depth = per_channel.first().map_or(0, |(_, frames)| frames.len());
        let (width, height) = per_channel
            .first()
            .and_then(|(_, frames)| frames.first())
            .map_or((0, 0), |f| (f.width, f.height));

        let mut frames = Vec::with_capacity(channels * depth);
        for (id, channel_frames) in per_channel {
            if channel_frames.len() != depth {
                return Err(Error::ChannelDepthMismatch {
                    channel: id,
                    expected: depth,
                    found: channel_frames.len(),
                });
            }
            for (z, frame) in channel_frames.into_iter().enumerate() {
                if (frame.width, frame.height) != (width, height) {
                    return Err(Error::FrameShape {
                        channel: id,
                        frame: z,
                        expected: (width, height),
                        found: (frame.width, frame.height),
                    });
                }
                if frame.pixels.depth() != bit_depth {
                    return Err(Error::SampleWidth {
                        channel: id,
                        frame: z,
                        expected: bit_depth,
                        found: frame.pixels.depth(),
                    });
                }
                frames.push(frame);
            }
        }

        Ok(Self {
            width,
            height,
            channels,
            depth,
            bit_depth,
            frames,
        })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of channels.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of z-slices per channel.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    /// Total number of frames (`channels * depth`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame at depth `z` of channel `c`, i.e. `view[z][c]`.
    #[must_use]
    pub fn frame(&self, z: usize, c: usize) -> Option<&Frame> {
        if z >= self.depth || c >= self.channels {
            return None;
        }
        self.frames.get(c * self.depth + z)
    }

    /// All frames of channel `c` in depth order.
    #[must_use]
    pub fn channel(&self, c: usize) -> Option<&[Frame]> {
        if c >= self.channels {
            return None;
        }
        Some(&self.frames[c * self.depth..(c + 1) * self.depth])
    }

    /// Position of `(z, c)` in the channel-fastest linear view.
    #[must_use]
    pub fn view_position(&self, z: usize, c: usize) -> usize {
        z * self.channels + c
    }

    /// Iterates `(z, c, frame)` in view order: channel fastest, then depth.
    pub fn iter_view(&self) -> impl Iterator<Item = (usize, usize, &Frame)> + '_ {
        (0..self.depth).flat_map(move |z| {
            (0..self.channels).map(move |c| (z, c, &self.frames[c * self.depth + z]))
        })
    }

    /// Divides every 16-bit sample by `divisor`.
    pub fn rescale(&mut self, divisor: u16) {
        for frame in &mut self.frames {
            frame.rescale(divisor);
        }
    }

    /// Drops every slice at depth `>= depth`.
    pub fn truncate_depth(&mut self, depth: usize) {
        if depth >= self.depth {
            return;
        }
        let old = self.depth;
        let mut kept = Vec::with_capacity(self.channels * depth);
        for (i, frame) in std::mem::take(&mut self.frames).into_iter().enumerate() {
            if i % old < depth {
                kept.push(frame);
            }
        }
        self.frames = kept;
        self.depth = depth;
    }

    /// Packs `count` channels starting at `first` at depth `z` into one
    /// pixel-interleaved buffer (e.g. RGB for three channels).
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `z` or the channel range exceeds the stack.
    pub fn interleave(&self, z: usize, first: usize, count: usize) -> Result<Pixels> {
        if z >= self.depth {
            return Err(Error::OutOfRange {
                what: "depth",
                index: z,
                len: self.depth,
            });
        }
        let end = first
            .checked_add(count)
            .filter(|&end| count > 0 && end <= self.channels)
            .ok_or(Error::OutOfRange {
                what: "channel",
                index: first.saturating_add(count.saturating_sub(1)),
                len: self.channels,
            })?;

        let planes: Vec<&Pixels> = (first..end)
            .map(|c| &self.frames[c * self.depth + z].pixels)
            .collect();
        let pixel_count = self.width * self.height;

        Ok(match self.bit_depth {
            BitDepth::Eight => {
                let mut out = Vec::with_capacity(pixel_count * count);
                for i in 0..pixel_count {
                    for plane in &planes {
                        if let Pixels::Gray8(v) = plane {
                            out.push(v[i]);
                        }
                    }
                }
                Pixels::Gray8(out)
            }
            BitDepth::Sixteen => {
                let mut out = Vec::with_capacity(pixel_count * count);
                for i in 0..pixel_count {
                    for plane in &planes {
                        if let Pixels::Gray16(v) = plane {
                            out.push(v[i]);
                        }
                    }
                }
                Pixels::Gray16(out)
            }
        })
    }

    /// Samples in view order `(z, c, y, x)`, widened to `u16`.
    #[must_use]
    pub fn to_view_samples(&self) -> Vec<u16> {
        let mut out = Vec::with_capacity(self.len() * self.width * self.height);
        for (_, _, frame) in self.iter_view() {
            match &frame.pixels {
                Pixels::Gray8(v) => out.extend(v.iter().map(|&s| u16::from(s))),
                Pixels::Gray16(v) => out.extend_from_slice(v),
            }
        }
        out
    }

    /// Consumes the stack, returning frames in storage order.
    #[must_use]
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}
