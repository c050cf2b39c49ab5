//! Calibration metadata and presentation hints.

use crate::attributes::{
    AttributeAccessor, CHANNELS_PATH, HEIGHT_ATTR, PAD_BOTTOM_ATTR, PAD_RIGHT_ATTR, ROOT_PATH,
    SPC_X_ATTR, SPC_Y_ATTR, SPC_Z_ATTR, UNIT_ATTR, VOXEL_SIZE_ATTR, WIDTH_ATTR,
};
use crate::error::{Error, Result};
use crate::frame::BitDepth;
use crate::store::ContainerStore;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where a container keeps its voxel spacing and unit.
///
/// Both layouts exist in deployed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum CalibrationConvention {
    /// `voxel_size` (array) and `unit` on the root group.
    RootVoxelSize,
    /// `spcx`/`spcy`/`spcz` and `unit` on the channel group.
    ChannelGroup,
    /// Root `voxel_size` when present, channel-group scalars otherwise.
    #[default]
    Auto,
}

impl FromStr for CalibrationConvention {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "root" | "root-voxel-size" => Ok(Self::RootVoxelSize),
            "channel-group" | "channels" => Ok(Self::ChannelGroup),
            "auto" => Ok(Self::Auto),
            other => Err(Error::Config(format!("unknown calibration convention: {other}"))),
        }
    }
}

/// Physical calibration attached to a stack.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationMetadata {
    /// Voxel spacing `(x, y, z)`.
    pub voxel_spacing: [f64; 3],
    pub unit: Option<String>,
    pub bit_depth: BitDepth,
    pub pad_right: usize,
    pub pad_bottom: usize,
}

impl Default for CalibrationMetadata {
    fn default() -> Self {
        Self {
            voxel_spacing: [1.0, 1.0, 1.0],
            unit: None,
            bit_depth: BitDepth::Eight,
            pad_right: 0,
            pad_bottom: 0,
        }
    }
}

/// Structural attributes read from a container before any decoding.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContainerAttributes {
    pub voxel_spacing: [f64; 3],
    pub unit: Option<String>,
    pub pad_right: usize,
    pub pad_bottom: usize,
    /// Declared unpadded width, if present.
    pub width: Option<usize>,
    /// Declared unpadded height, if present.
    pub height: Option<usize>,
}

impl Default for ContainerAttributes {
    fn default() -> Self {
        Self {
            voxel_spacing: [1.0, 1.0, 1.0],
            unit: None,
            pad_right: 0,
            pad_bottom: 0,
            width: None,
            height: None,
        }
    }
}

impl ContainerAttributes {
    /// Reads padding, declared geometry, spacing and unit.
    ///
    /// Absent attributes fall back to defaults: zero padding, unit spacing, no unit.
    ///
    /// # Errors
    /// Returns an error only if the store fails or an attribute has the wrong type.
    pub fn read(store: &dyn ContainerStore, convention: CalibrationConvention) -> Result<Self> {
        let attrs = AttributeAccessor::new(store);

        let pad_right = attrs.read_usize(CHANNELS_PATH, PAD_RIGHT_ATTR)?.unwrap_or(0);
        let pad_bottom = attrs.read_usize(CHANNELS_PATH, PAD_BOTTOM_ATTR)?.unwrap_or(0);
        let width = attrs.read_usize(CHANNELS_PATH, WIDTH_ATTR)?;
        let height = attrs.read_usize(CHANNELS_PATH, HEIGHT_ATTR)?;

        let (voxel_spacing, unit) = match convention {
            CalibrationConvention::RootVoxelSize => (
                root_spacing(&attrs)?.unwrap_or([1.0; 3]),
                attrs.read_string(ROOT_PATH, UNIT_ATTR)?,
            ),
            CalibrationConvention::ChannelGroup => (
                channel_group_spacing(&attrs)?,
                attrs.read_string(CHANNELS_PATH, UNIT_ATTR)?,
            ),
            CalibrationConvention::Auto => {
                let spacing = match root_spacing(&attrs)? {
                    Some(spacing) => spacing,
                    None => channel_group_spacing(&attrs)?,
                };
                let unit = match attrs.read_string(ROOT_PATH, UNIT_ATTR)? {
                    Some(unit) => Some(unit),
                    None => attrs.read_string(CHANNELS_PATH, UNIT_ATTR)?,
                };
                (spacing, unit)
            }
        };

        Ok(Self {
            voxel_spacing,
            unit: unit.filter(|u| !u.is_empty()),
            pad_right,
            pad_bottom,
            width,
            height,
        })
    }

    /// Declared `(width, height)` if both attributes are present.
    #[must_use]
    pub fn declared_size(&self) -> Option<(usize, usize)> {
        self.width.zip(self.height)
    }

    /// Builds the calibration for a stack of the given sample width.
    #[must_use]
    pub fn calibration(&self, bit_depth: BitDepth) -> CalibrationMetadata {
        CalibrationMetadata {
            voxel_spacing: self.voxel_spacing,
            unit: self.unit.clone(),
            bit_depth,
            pad_right: self.pad_right,
            pad_bottom: self.pad_bottom,
        }
    }
}

fn root_spacing(attrs: &AttributeAccessor<'_>) -> Result<Option<[f64; 3]>> {
    let Some(values) = attrs.read_array(ROOT_PATH, VOXEL_SIZE_ATTR)? else {
        return Ok(None);
    };
    if values.len() < 3 {
        log::debug!(
            "{VOXEL_SIZE_ATTR} has {} entries, padding with 1.0",
            values.len()
        );
    }
    let mut spacing = [1.0; 3];
    for (slot, value) in spacing.iter_mut().zip(values) {
        *slot = value;
    }
    Ok(Some(spacing))
}

fn channel_group_spacing(attrs: &AttributeAccessor<'_>) -> Result<[f64; 3]> {
    Ok([
        attrs.read_f64(CHANNELS_PATH, SPC_X_ATTR)?.unwrap_or(1.0),
        attrs.read_f64(CHANNELS_PATH, SPC_Y_ATTR)?.unwrap_or(1.0),
        attrs.read_f64(CHANNELS_PATH, SPC_Z_ATTR)?.unwrap_or(1.0),
    ])
}

/// How a presentation layer should combine channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DisplayMode {
    /// One display range per channel, channels overlaid.
    Composite,
    /// One display range for the whole stack.
    Single,
}

/// Presentation hint for a stack; the core never evaluates it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisplayHint {
    pub mode: DisplayMode,
    /// Recommended display range, applied per channel in composite mode.
    pub range: (f64, f64),
}

impl DisplayHint {
    /// More than two channels render as a composite.
    #[must_use]
    pub fn for_stack(channels: usize, bit_depth: BitDepth) -> Self {
        let mode = if channels > 2 {
            DisplayMode::Composite
        } else {
            DisplayMode::Single
        };
        Self {
            mode,
            range: (0.0, bit_depth.display_max()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AttrValue, MemoryStore};
    use approx::assert_relative_eq;

    #[test]
    fn test_missing_attributes_use_defaults() {
        let mut store = MemoryStore::new();
        store.add_group(CHANNELS_PATH);

        for convention in [
            CalibrationConvention::RootVoxelSize,
            CalibrationConvention::ChannelGroup,
            CalibrationConvention::Auto,
        ] {
            let attrs = ContainerAttributes::read(&store, convention).unwrap();
            assert_eq!(attrs, ContainerAttributes::default());
        }
    }

    #[test]
    fn test_root_convention() {
        let mut store = MemoryStore::new();
        store
            .set_array_attr(ROOT_PATH, VOXEL_SIZE_ATTR, &[0.52, 0.52, 1.0])
            .set_attr(ROOT_PATH, UNIT_ATTR, AttrValue::Text("um".into()))
            .set_attr(CHANNELS_PATH, PAD_RIGHT_ATTR, AttrValue::Int(4))
            .set_attr(CHANNELS_PATH, PAD_BOTTOM_ATTR, AttrValue::Int(8))
            .set_attr(CHANNELS_PATH, WIDTH_ATTR, AttrValue::Int(100))
            .set_attr(CHANNELS_PATH, HEIGHT_ATTR, AttrValue::Int(200));

        let attrs =
            ContainerAttributes::read(&store, CalibrationConvention::RootVoxelSize).unwrap();
        assert_relative_eq!(attrs.voxel_spacing[0], 0.52);
        assert_relative_eq!(attrs.voxel_spacing[2], 1.0);
        assert_eq!(attrs.unit.as_deref(), Some("um"));
        assert_eq!((attrs.pad_right, attrs.pad_bottom), (4, 8));
        assert_eq!(attrs.declared_size(), Some((100, 200)));
    }

    #[test]
    fn test_channel_group_convention() {
        let mut store = MemoryStore::new();
        store
            .set_attr(CHANNELS_PATH, SPC_X_ATTR, AttrValue::Float(0.38))
            .set_attr(CHANNELS_PATH, SPC_Z_ATTR, AttrValue::Int(2))
            .set_attr(CHANNELS_PATH, UNIT_ATTR, AttrValue::Text("micron".into()))
            .set_array_attr(ROOT_PATH, VOXEL_SIZE_ATTR, &[9.0, 9.0, 9.0]);

        let attrs = ContainerAttributes::read(&store, CalibrationConvention::ChannelGroup).unwrap();
        assert_relative_eq!(attrs.voxel_spacing[0], 0.38);
        assert_relative_eq!(attrs.voxel_spacing[1], 1.0);
        assert_relative_eq!(attrs.voxel_spacing[2], 2.0);
        assert_eq!(attrs.unit.as_deref(), Some("micron"));
    }

    #[test]
    fn test_auto_falls_back_to_channel_group() {
        let mut store = MemoryStore::new();
        store
            .set_attr(CHANNELS_PATH, SPC_Y_ATTR, AttrValue::Float(0.5))
            .set_attr(CHANNELS_PATH, UNIT_ATTR, AttrValue::Text("nm".into()));

        let attrs = ContainerAttributes::read(&store, CalibrationConvention::Auto).unwrap();
        assert_relative_eq!(attrs.voxel_spacing[1], 0.5);
        assert_eq!(attrs.unit.as_deref(), Some("nm"));
    }

    #[test]
    fn test_short_voxel_size_is_padded() {
        let mut store = MemoryStore::new();
        store.set_array_attr(ROOT_PATH, VOXEL_SIZE_ATTR, &[0.25]);
        let attrs = ContainerAttributes::read(&store, CalibrationConvention::Auto).unwrap();
        assert_eq!(attrs.voxel_spacing, [0.25, 1.0, 1.0]);
    }

    #[test]
    fn test_display_hint() {
        let hint = DisplayHint::for_stack(3, BitDepth::Sixteen);
        assert_eq!(hint.mode, DisplayMode::Composite);
        assert_relative_eq!(hint.range.1, 4095.0);

        let hint = DisplayHint::for_stack(2, BitDepth::Eight);
        assert_eq!(hint.mode, DisplayMode::Single);
        assert_relative_eq!(hint.range.1, 255.0);
    }

    #[test]
    fn test_convention_from_str() {
        assert_eq!(
            "root".parse::<CalibrationConvention>().unwrap(),
            CalibrationConvention::RootVoxelSize
        );
        assert_eq!(
            "channel-group".parse::<CalibrationConvention>().unwrap(),
            CalibrationConvention::ChannelGroup
        );
        assert!("bogus".parse::<CalibrationConvention>().is_err());
    }
}
