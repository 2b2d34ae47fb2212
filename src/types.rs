//!
//! Shared value types for the runtime host: namespaces, hashes, roots and versions.
//!
//! Everything in here is plain data. Hashes are BLAKE3-256 content addresses; the
//! distinguished `Hash::EMPTY` sentinel denotes "no content" and is never produced
//! by hashing real input.

use std::fmt;
use std::str::FromStr;

/// Size in bytes of a `Namespace`.
pub const NAMESPACE_SIZE: usize = 32;

/// Size in bytes of a `Hash`.
pub const HASH_SIZE: usize = 32;

/// Block height of a runtime. A batch execution always targets `previous + 1`.
pub type Round = u64;

/// Fixed-width identifier of a runtime instance, assigned at registration.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Namespace(#[serde(with = "serde_bytes")] pub [u8; NAMESPACE_SIZE]);

impl Namespace {
    /// Parses a namespace from its hex representation.
    pub fn from_hex(s: &str) -> Result<Self, String> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid namespace hex: {}", e))?;
        let inner: [u8; NAMESPACE_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| format!("namespace must be {} bytes, got {}", NAMESPACE_SIZE, bytes.len()))?;
        Ok(Namespace(inner))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({})", self.to_hex())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A 32-byte content address.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Hash(#[serde(with = "serde_bytes")] pub [u8; HASH_SIZE]);

impl Hash {
    /// The "no content" sentinel. Distinct from `Hash::digest(b"")`.
    pub const EMPTY: Hash = Hash([0u8; HASH_SIZE]);

    /// Hashes a single byte string.
    pub fn digest(data: &[u8]) -> Hash {
        Hash(*blake3::hash(data).as_bytes())
    }

    /// Hashes a domain tag followed by length-prefixed parts.
    ///
    /// Length prefixes keep `["ab", "c"]` and `["a", "bc"]` apart.
    pub fn digest_parts(domain: &[u8], parts: &[&[u8]]) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(domain.len() as u32).to_be_bytes());
        hasher.update(domain);
        for part in parts {
            hasher.update(&(part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        Hash(*hasher.finalize().as_bytes())
    }

    pub fn is_empty(&self) -> bool {
        *self == Hash::EMPTY
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Hash(<empty>)");
        }
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Which authenticated tree a `Root` refers to.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RootKind {
    /// Transaction inputs only, known at admission time.
    Input = 1,
    /// Transaction inputs together with their outputs.
    Output = 2,
    /// Runtime state.
    State = 3,
}

/// Identifies one snapshot of an authenticated tree.
///
/// Two roots are equal iff namespace, round, kind and hash all match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Root {
    pub namespace: Namespace,
    pub round: Round,
    pub kind: RootKind,
    pub hash: Hash,
}

impl Root {
    /// A root pointing at an empty tree.
    pub fn empty(namespace: Namespace, round: Round, kind: RootKind) -> Self {
        Root { namespace, round, kind, hash: Hash::EMPTY }
    }

    pub fn is_empty(&self) -> bool {
        self.hash.is_empty()
    }
}

/// Semantic version triple used for both the host protocol and runtime versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Version { major, minor, patch }
    }

    /// Whether a peer speaking `other` can talk to us. Only the major component must match.
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(format!("invalid version '{}': expected major.minor.patch", s));
        }
        let parse = |p: &str| {
            p.parse::<u16>()
                .map_err(|e| format!("invalid version component '{}' in '{}': {}", p, s, e))
        };
        Ok(Version {
            major: parse(parts[0])?,
            minor: parse(parts[1])?,
            patch: parse(parts[2])?,
        })
    }
}

/// Version of the host <-> runtime protocol implemented by this crate.
pub const RUNTIME_HOST_PROTOCOL: Version = Version::new(5, 0, 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hash_is_not_digest_of_empty_input() {
        assert!(Hash::EMPTY.is_empty());
        assert_ne!(Hash::digest(b""), Hash::EMPTY);
        assert_eq!(Hash::default(), Hash::EMPTY);
    }

    #[test]
    fn test_digest_parts_is_length_delimited() {
        let a = Hash::digest_parts(b"d", &[&b"ab"[..], &b"c"[..]]);
        let b = Hash::digest_parts(b"d", &[&b"a"[..], &b"bc"[..]]);
        assert_ne!(a, b);
        assert_ne!(Hash::digest_parts(b"d1", &[&b"x"[..]]), Hash::digest_parts(b"d2", &[&b"x"[..]]));
    }

    #[test]
    fn test_root_equality_requires_all_fields() {
        let ns = Namespace([1u8; NAMESPACE_SIZE]);
        let r = Root { namespace: ns, round: 3, kind: RootKind::Input, hash: Hash::digest(b"x") };
        assert_eq!(r, r);
        assert_ne!(r, Root { round: 4, ..r });
        assert_ne!(r, Root { kind: RootKind::Output, ..r });
        assert_ne!(r, Root { namespace: Namespace::default(), ..r });
        assert_ne!(r, Root { hash: Hash::EMPTY, ..r });
    }

    #[test]
    fn test_namespace_hex() {
        let ns = Namespace([0xab; NAMESPACE_SIZE]);
        assert_eq!(Namespace::from_hex(&ns.to_hex()).unwrap(), ns);
        assert!(Namespace::from_hex("abcd").is_err());
        assert!(Namespace::from_hex("zz").is_err());
    }

    #[test]
    fn test_version_parse() {
        assert_eq!("1.2.3".parse::<Version>().unwrap(), Version::new(1, 2, 3));
        assert_eq!(Version::new(0, 0, 0).to_string(), "0.0.0");
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.x.3".parse::<Version>().is_err());
        assert!(RUNTIME_HOST_PROTOCOL.is_compatible_with(&Version::new(5, 9, 1)));
        assert!(!RUNTIME_HOST_PROTOCOL.is_compatible_with(&Version::new(4, 0, 0)));
    }
}
