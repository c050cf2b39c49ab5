//! Typed, default-tolerant attribute reads.

use crate::error::{Error, Result};
use crate::store::{AttrValue, ContainerStore};

/// Root group path.
pub const ROOT_PATH: &str = "/";
/// Group holding one opaque video blob per channel.
pub const CHANNELS_PATH: &str = "/Channels";
/// Prefix of per-channel member names (`Channel_<index>`).
pub const CHANNEL_PREFIX: &str = "Channel_";

pub const PAD_RIGHT_ATTR: &str = "pad_right";
pub const PAD_BOTTOM_ATTR: &str = "pad_bottom";
pub const WIDTH_ATTR: &str = "width";
pub const HEIGHT_ATTR: &str = "height";
pub const VOXEL_SIZE_ATTR: &str = "voxel_size";
pub const UNIT_ATTR: &str = "unit";
pub const SPC_X_ATTR: &str = "spcx";
pub const SPC_Y_ATTR: &str = "spcy";
pub const SPC_Z_ATTR: &str = "spcz";

/// Typed reader over a [`ContainerStore`].
///
/// Every read returns `Ok(None)` when the attribute is absent; callers
/// supply defaults.
#[derive(Clone, Copy)]
pub struct AttributeAccessor<'s> {
    store: &'s dyn ContainerStore,
}

impl<'s> AttributeAccessor<'s> {
    #[must_use]
    pub fn new(store: &'s dyn ContainerStore) -> Self {
        Self { store }
    }

    /// Returns true if the attribute exists.
    ///
    /// # Errors
    /// Returns an error on store I/O failure.
    pub fn has_attribute(&self, path: &str, name: &str) -> Result<bool> {
        self.store.has_attribute(path, name)
    }

    /// Reads a scalar attribute of any type.
    ///
    /// # Errors
    /// Returns an error on store I/O failure.
    pub fn read_scalar(&self, path: &str, name: &str) -> Result<Option<AttrValue>> {
        self.store.read_scalar(path, name)
    }

    /// Reads an integer attribute.
    ///
    /// # Errors
    /// Returns [`Error::Container`] if the attribute exists but is not numeric.
    pub fn read_i64(&self, path: &str, name: &str) -> Result<Option<i64>> {
        match self.store.read_scalar(path, name)? {
            None => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| Error::container(path, format!("attribute {name} is not numeric"))),
        }
    }

    /// Reads a non-negative size attribute. Negative values count as absent.
    ///
    /// # Errors
    /// Returns [`Error::Container`] if the attribute exists but is not numeric.
    pub fn read_usize(&self, path: &str, name: &str) -> Result<Option<usize>> {
        Ok(self
            .read_i64(path, name)?
            .and_then(|v| usize::try_from(v).ok()))
    }

    /// Reads a floating-point attribute.
    ///
    /// # Errors
    /// Returns [`Error::Container`] if the attribute exists but is not numeric.
    pub fn read_f64(&self, path: &str, name: &str) -> Result<Option<f64>> {
        match self.store.read_scalar(path, name)? {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| Error::container(path, format!("attribute {name} is not numeric"))),
        }
    }

    /// Reads a numeric array attribute.
    ///
    /// # Errors
    /// Returns an error on store I/O failure.
    pub fn read_array(&self, path: &str, name: &str) -> Result<Option<Vec<f64>>> {
        self.store.read_array(path, name)
    }

    /// Reads a string attribute.
    ///
    /// # Errors
    /// Returns an error on store I/O failure.
    pub fn read_string(&self, path: &str, name: &str) -> Result<Option<String>> {
        self.store.read_string(path, name)
    }
}
