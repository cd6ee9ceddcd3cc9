//! Channel identifiers and the OS resource names derived from them.
//!
//! Two processes that agree on a [`ChannelId`] derive identical names, so
//! the formatting here is part of the wire contract.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 128-bit channel identifier, displayed as a braced GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u128);

/// Error returned when a string is not a valid channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid channel id: {0:?}")]
pub struct ParseChannelIdError(String);

impl ChannelId {
    /// Well-known identifier for the client-to-server channel.
    pub const CLIENT_TO_SERVER: Self = Self(0x03c9c797_c924_415e_a6f9_9112ae75e56f);

    /// Creates an identifier from its 128-bit value.
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// Returns the 128-bit value.
    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    /// Creates a random identifier (version 4 layout).
    pub fn random() -> Self {
        let mut value: u128 = rand::random();
        value = (value & !(0xF << 76)) | (0x4 << 76);
        value = (value & !(0x3 << 62)) | (0x2 << 62);
        Self(value)
    }

    /// Name of a single channel's region.
    pub fn region_name(&self) -> String {
        self.to_string()
    }

    /// Name of data region `index` of a multi-slot channel.
    pub fn data_region_name(&self, index: usize) -> String {
        format!("{}-Channel{}", self, index)
    }

    /// Name of the exclusive claim token for slot `index`.
    pub fn claim_token_name(&self, index: usize) -> String {
        format!("{}-Mutex{}", self, index)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{{{:08x}-{:04x}-{:04x}-{:04x}-{:012x}}}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xFFFF_FFFF_FFFF
        )
    }
}

impl FromStr for ChannelId {
    type Err = ParseChannelIdError;

    /// Accepts `{xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx}` or the same without
    /// braces, in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseChannelIdError(s.to_string());
        let body = match s.strip_prefix('{') {
            Some(rest) => rest.strip_suffix('}').ok_or_else(err)?,
            None => s,
        };

        let groups: Vec<&str> = body.split('-').collect();
        let lengths = [8, 4, 4, 4, 12];
        if groups.len() != lengths.len()
            || groups.iter().zip(lengths).any(|(g, len)| g.len() != len)
        {
            return Err(err());
        }

        let mut value = 0u128;
        for group in groups {
            if !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(err());
            }
            let part = u64::from_str_radix(group, 16).map_err(|_| err())?;
            value = (value << (group.len() * 4)) | part as u128;
        }
        Ok(Self(value))
    }
}
