//! # bankcache-types
//!
//! Record types for the bank cache: the `Cache` aggregate and the bank, event and
//! parameter records it owns, plus the descriptors a bank reader hands back.
//! This crate is plain data; the synchronization engine lives in bankcache-core.

mod bank;
mod cache;
mod descriptor;
mod event;
mod parameter;

pub use bank::{BankRecord, BankRole, LoadOutcome};
pub use cache::{Cache, CACHE_SCHEMA_VERSION};
pub use descriptor::{BankManifest, EventDescriptor, ParameterDescriptor};
pub use event::EventRecord;
pub use parameter::{ParameterKind, ParameterRecord};

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// 128-bit identity of a bank, event or global parameter.
///
/// Formats as `{xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx}` and parses with or
/// without the braces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Guid(u128);

impl Guid {
    pub const NIL: Guid = Guid(0);

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn get(self) -> u128 {
        self.0
    }

    pub fn is_nil(self) -> bool {
        self.0 == 0
    }

    /// Parse a braced or bare hyphenated GUID string.
    pub fn parse(s: &str) -> Option<Guid> {
        let s = s.trim();
        let inner = match (s.strip_prefix('{'), s.ends_with('}')) {
            (Some(rest), true) => &rest[..rest.len() - 1],
            (None, false) => s,
            _ => return None,
        };

        let groups: Vec<&str> = inner.split('-').collect();
        let widths = [8, 4, 4, 4, 12];
        if groups.len() != widths.len()
            || groups.iter().zip(widths).any(|(g, w)| g.len() != w)
        {
            return None;
        }

        let hex: String = groups.concat();
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u128::from_str_radix(&hex, 16).ok().map(Guid)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{{{:08x}-{:04x}-{:04x}-{:04x}-{:012x}}}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xffff_ffff_ffff
        )
    }
}

impl FromStr for Guid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Guid::parse(s).ok_or_else(|| format!("invalid GUID: {}", s))
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Guid::parse(&s).ok_or_else(|| de::Error::custom(format!("invalid GUID: {}", s)))
    }
}
