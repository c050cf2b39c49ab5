//! Decoded frame types.
//!
//! A [`RawFrame`] is what the external decoder hands back: possibly padded
//! dimensions and a byte buffer in the decoder's sample layout. A [`Frame`]
//! is the normalized result with logical dimensions and native samples.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Byte order of 16-bit samples in a raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Sample width of the whole stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BitDepth {
    #[default]
    Eight,
    Sixteen,
}

impl BitDepth {
    /// Number of bits per stored sample.
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
        }
    }

    /// Number of bytes per stored sample.
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Eight => 1,
            Self::Sixteen => 2,
        }
    }

    /// Upper bound of the displayable range once 16-bit samples are rescaled to 12 bits.
    #[must_use]
    pub fn display_max(self) -> f64 {
        match self {
            Self::Eight => 255.0,
            Self::Sixteen => 4095.0,
        }
    }
}

/// Pixel format string reported by the decoder for an embedded stream
/// (e.g. `gray`, `yuv420p`, `gray12le`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelFormat(String);

impl PixelFormat {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the stream stores 12-bit samples padded into 16-bit words, in either byte order.
    #[must_use]
    pub fn is_packed_12bit(&self) -> bool {
        self.0.contains("12le") || self.0.contains("12be")
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A frame as produced by the decoder. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Decoded width, including any codec padding.
    pub width: usize,
    /// Decoded height, including any codec padding.
    pub height: usize,
    /// Sample width of `data`.
    pub depth: BitDepth,
    /// Byte order of 16-bit samples; ignored for 8-bit frames.
    pub byte_order: ByteOrder,
    /// Row-major sample bytes.
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Creates an 8-bit raw frame.
    #[must_use]
    pub fn gray8(width: usize, height: usize, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            depth: BitDepth::Eight,
            byte_order: ByteOrder::Little,
            data,
        }
    }

    /// Creates a 16-bit raw frame from native samples, serialized in `byte_order`.
    #[must_use]
    pub fn gray16(width: usize, height: usize, samples: &[u16], byte_order: ByteOrder) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for &value in samples {
            match byte_order {
                ByteOrder::Little => data.extend_from_slice(&value.to_le_bytes()),
                ByteOrder::Big => data.extend_from_slice(&value.to_be_bytes()),
            }
        }
        Self {
            width,
            height,
            depth: BitDepth::Sixteen,
            byte_order,
            data,
        }
    }

    /// Number of bytes a complete frame of these dimensions occupies.
    #[must_use]
    pub fn expected_len(&self) -> usize {
        self.width * self.height * self.depth.bytes_per_sample()
    }
}

/// Samples of a normalized frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Pixels {
    Gray8(Vec<u8>),
    Gray16(Vec<u16>),
}

impl Pixels {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Gray8(v) => v.len(),
            Self::Gray16(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn depth(&self) -> BitDepth {
        match self {
            Self::Gray8(_) => BitDepth::Eight,
            Self::Gray16(_) => BitDepth::Sixteen,
        }
    }

    /// Sample at `index` widened to `u16`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<u16> {
        match self {
            Self::Gray8(v) => v.get(index).map(|&s| u16::from(s)),
            Self::Gray16(v) => v.get(index).copied(),
        }
    }
}

/// A frame cropped to logical geometry with samples in native representation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub pixels: Pixels,
}

impl Frame {
    /// Sample at `(x, y)` widened to `u16`.
    #[must_use]
    pub fn sample(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x)
    }

    /// Divides every 16-bit sample by `divisor`; 8-bit frames are left unchanged.
    pub fn rescale(&mut self, divisor: u16) {
        if let Pixels::Gray16(samples) = &mut self.pixels {
            for s in samples.iter_mut() {
                *s /= divisor;
            }
        }
    }
}
