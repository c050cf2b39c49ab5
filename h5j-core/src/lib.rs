//! h5j-core: Core types and traits for H5J container interpretation.
//!
//! An H5J file is an HDF5 container whose per-channel pixel data is stored as
//! opaque blobs holding a compressed video stream. This crate defines the
//! pieces that do not depend on a particular HDF5 binding or video decoder:
//! attribute access, channel enumeration, bit-depth resolution, padding
//! removal, and the reassembled [`Stack`].
//!

pub mod attributes;
pub mod calibration;
pub mod channel;
pub mod decoder;
pub mod depth;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod stack;
pub mod store;

pub use attributes::{AttributeAccessor, CHANNELS_PATH, CHANNEL_PREFIX, ROOT_PATH};
pub use calibration::{
    CalibrationConvention, CalibrationMetadata, ContainerAttributes, DisplayHint, DisplayMode,
};
pub use channel::{list_channels, ChannelDescriptor};
pub use decoder::{DecodedFrames, FrameDecoder};
pub use depth::{resolve_bit_depth, PACKED_12BIT_DIVISOR};
pub use error::{Error, Result};
pub use frame::{BitDepth, ByteOrder, Frame, PixelFormat, Pixels, RawFrame};
pub use geometry::LogicalGeometry;
pub use stack::Stack;
pub use store::{AttrValue, ContainerStore, MemoryStore};
