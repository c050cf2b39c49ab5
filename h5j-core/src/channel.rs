//! Channel enumeration.

use crate::attributes::CHANNEL_PREFIX;
use crate::error::Result;
use crate::store::ContainerStore;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A channel member of the channel group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelDescriptor {
    /// Member name, e.g. `Channel_0`.
    pub id: String,
    /// 0-based position in enumeration order; this is the output channel order.
    pub index: usize,
}

impl ChannelDescriptor {
    /// Full store path of this channel's payload under `group`.
    #[must_use]
    pub fn path_in(&self, group: &str) -> String {
        format!("{}/{}", group.trim_end_matches('/'), self.id)
    }
}

/// Lists the channels under `group` in the store's native member order.
///
/// # Errors
/// Returns [`crate::Error::Container`] if the group does not exist.
pub fn list_channels(store: &dyn ContainerStore, group: &str) -> Result<Vec<ChannelDescriptor>> {
    let members = store.list_group_members(group)?;
    for id in members.iter().filter(|id| !id.starts_with(CHANNEL_PREFIX)) {
        log::debug!("member {id} of {group} does not follow the {CHANNEL_PREFIX}<n> naming");
    }
    Ok(members
        .into_iter()
        .enumerate()
        .map(|(index, id)| ChannelDescriptor { id, index })
        .collect())
}
