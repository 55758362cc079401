//! Packet header discrimination.
//!
//! Every headed packet starts with its tag byte repeated twice. Fragments of the
//! daily-usage history carry no header at all, so the dispatcher only trusts a
//! header when both bytes agree.

use crate::constants::{TAG_HANDSHAKE, TAG_KEEPALIVE, TAG_SETTINGS, TAG_STATISTICS, TAG_STATUS};

/// Packet family identified by a two-byte header.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum PacketTag {
    /// `tt`: session handshake.
    Handshake,
    /// `uu`: real-time and brine status.
    Status,
    /// `vv`: configuration and cycle times.
    Settings,
    /// `ww`: lifetime counters and usage history.
    Statistics,
    /// `xx`: keepalive echo.
    Keepalive,
}

impl PacketTag {
    /// Maps a single tag byte to its packet family.
    ///
    /// # Returns
    /// The family, or `None` if `byte` is not a tag.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            TAG_HANDSHAKE => Some(PacketTag::Handshake),
            TAG_STATUS => Some(PacketTag::Status),
            TAG_SETTINGS => Some(PacketTag::Settings),
            TAG_STATISTICS => Some(PacketTag::Statistics),
            TAG_KEEPALIVE => Some(PacketTag::Keepalive),
            _ => None,
        }
    }

    /// Identifies a header from its first two bytes. Both must be the same tag.
    pub const fn from_header(first: u8, second: u8) -> Option<Self> {
        if first != second {
            return None;
        }
        Self::from_byte(first)
    }

    /// Tag byte for this family.
    pub const fn as_byte(self) -> u8 {
        match self {
            PacketTag::Handshake => TAG_HANDSHAKE,
            PacketTag::Status => TAG_STATUS,
            PacketTag::Settings => TAG_SETTINGS,
            PacketTag::Statistics => TAG_STATISTICS,
            PacketTag::Keepalive => TAG_KEEPALIVE,
        }
    }

    /// Returns `true` if `byte` is any packet tag.
    pub const fn is_tag_byte(byte: u8) -> bool {
        Self::from_byte(byte).is_some()
    }

    /// Returns `true` for the keepalive family, which is shorter than the
    /// general dispatch minimum.
    pub fn is_keepalive(&self) -> bool {
        matches!(self, PacketTag::Keepalive)
    }
}
