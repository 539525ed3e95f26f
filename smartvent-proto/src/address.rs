//! Address of the device on the local network

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Dotted-quad address of the vent's control plane.
///
/// `0.0.0.0` is the sentinel for "not known yet": the device reports it over
/// BLE before it has joined a network, and it is the default before anything
/// has been persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerAddress(Ipv4Addr);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a dotted-quad address: {0:?}")]
pub struct AddressParseError(pub String);

impl ServerAddress {
    pub const UNKNOWN: ServerAddress = ServerAddress(Ipv4Addr::UNSPECIFIED);

    pub fn new(ip: Ipv4Addr) -> Self {
        Self(ip)
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_unspecified()
    }

    /// The address to dial, `None` while it is the sentinel
    pub fn ip(&self) -> Option<Ipv4Addr> {
        (!self.is_unknown()).then_some(self.0)
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ServerAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Ipv4Addr>()
            .map(Self)
            .map_err(|_| AddressParseError(s.to_string()))
    }
}

impl TryFrom<String> for ServerAddress {
    type Error = AddressParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ServerAddress> for String {
    fn from(a: ServerAddress) -> Self {
        a.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::ServerAddress;

    #[test]
    fn sentinel_is_unknown() {
        let a: ServerAddress = "0.0.0.0".parse().unwrap();
        assert!(a.is_unknown());
        assert_eq!(a, ServerAddress::default());
        assert_eq!(a.ip(), None);
    }

    #[test]
    fn parses_dotted_quad() {
        let a: ServerAddress = " 192.168.1.50\n".parse().unwrap();
        assert!(!a.is_unknown());
        assert_eq!(a.to_string(), "192.168.1.50");
    }

    #[test]
    fn rejects_garbage() {
        assert!("192.168.1".parse::<ServerAddress>().is_err());
        assert!("not-an-ip".parse::<ServerAddress>().is_err());
    }

    #[test]
    fn serializes_as_string() {
        let a: ServerAddress = "10.0.0.7".parse().unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"10.0.0.7\"");
        let back: ServerAddress = serde_json::from_str("\"10.0.0.7\"").unwrap();
        assert_eq!(back, a);
    }
}
