//! Nearby peers: identity, advertisement, connection state.

use std::fmt;

use serde::{Deserialize, Serialize};

const AVATAR_BASE: &str = "https://i.pravatar.cc/100?u=";
const UNKNOWN_DEVICE_NAME: &str = "Unknown device";

/// Opaque peer identity as reported by the discovery source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        PeerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First four characters, used to label devices that advertise no name.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(4) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.to_string())
    }
}

/// What a discovery probe surfaces: an id and, if the device has one, its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: PeerId,
    pub name: Option<String>,
}

impl Advertisement {
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: PeerId::new(id),
            name: name.map(str::to_string),
        }
    }
}

/// A discovered peer. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub display_name: String,
    pub raw_advertised_name: String,
    pub avatar_ref: String,
}

impl Peer {
    /// Build a peer from an advertisement, filling in labels for nameless devices.
    pub fn from_advertisement(ad: Advertisement) -> Self {
        let name = ad.name.filter(|n| !n.trim().is_empty());
        let display_name = match &name {
            Some(n) => n.clone(),
            None => format!("Device {}", ad.id.short()),
        };
        let raw_advertised_name = name.unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());
        let avatar_ref = format!("{}{}", AVATAR_BASE, ad.id);
        Self {
            id: ad.id,
            display_name,
            raw_advertised_name,
            avatar_ref,
        }
    }
}

/// Per-peer handshake progress. There is no way back to `Discovered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Discovered,
    Connecting,
    Connected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_advertisement_keeps_name() {
        let p = Peer::from_advertisement(Advertisement::new("a1b2c3", Some("Sara's phone")));
        assert_eq!(p.display_name, "Sara's phone");
        assert_eq!(p.raw_advertised_name, "Sara's phone");
        assert_eq!(p.avatar_ref, "https://i.pravatar.cc/100?u=a1b2c3");
    }

    #[test]
    fn nameless_advertisement_gets_labels() {
        let p = Peer::from_advertisement(Advertisement::new("a1b2c3", None));
        assert_eq!(p.display_name, "Device a1b2");
        assert_eq!(p.raw_advertised_name, "Unknown device");
    }

    #[test]
    fn short_id_handles_tiny_ids() {
        assert_eq!(PeerId::from("ab").short(), "ab");
        assert_eq!(PeerId::from("abcdef").short(), "abcd");
    }
}
