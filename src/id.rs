use rand::{
    distributions::{Distribution, Standard},
    Rng,
};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::{
    convert::{TryFrom, TryInto},
    fmt,
    str::FromStr,
};
use thiserror::Error;

/// Length of `InfoHash` in bytes.
pub const INFO_HASH_LEN: usize = 20;

/// 20-byte long identifier of nodes and objects on the DHT
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct InfoHash(#[serde(with = "byte_array")] [u8; INFO_HASH_LEN]);

impl InfoHash {
    /// Create an InfoHash by hashing the given bytes using SHA-1.
    pub fn sha1(bytes: &[u8]) -> Self {
        let hash = Sha1::digest(bytes);
        Self(hash.into())
    }
}

impl AsRef<[u8]> for InfoHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<InfoHash> for [u8; INFO_HASH_LEN] {
    fn from(hash: InfoHash) -> [u8; INFO_HASH_LEN] {
        hash.0
    }
}

impl From<[u8; INFO_HASH_LEN]> for InfoHash {
    fn from(hash: [u8; INFO_HASH_LEN]) -> InfoHash {
        Self(hash)
    }
}

#[derive(Debug, Error)]
#[error("invalid id length")]
pub struct LengthError;

impl<'a> TryFrom<&'a [u8]> for InfoHash {
    type Error = LengthError;

    fn try_from(slice: &'a [u8]) -> Result<Self, Self::Error> {
        Ok(Self(slice.try_into().map_err(|_| LengthError)?))
    }
}

/// Error returned when parsing an `InfoHash` from its hex representation.
#[derive(Debug, Error)]
pub enum ParseInfoHashError {
    #[error("info hash is not valid hex")]
    Hex(#[from] hex::FromHexError),
    #[error(transparent)]
    Length(#[from] LengthError),
}

/// Parses the 40 character hex form, in either case.
impl FromStr for InfoHash {
    type Err = ParseInfoHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())?;
        Ok(Self::try_from(bytes.as_ref())?)
    }
}

impl Distribution<InfoHash> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> InfoHash {
        InfoHash(rng.gen())
    }
}

impl fmt::LowerHex for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:x}")
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:x}")
    }
}

mod byte_array {
    use super::INFO_HASH_LEN;
    use serde::{
        de::{Deserialize, Deserializer, Error},
        ser::{Serialize, Serializer},
    };
    use serde_bytes::{ByteBuf, Bytes};
    use std::convert::TryInto;

    pub(super) fn serialize<S: Serializer>(
        bytes: &[u8; INFO_HASH_LEN],
        s: S,
    ) -> Result<S::Ok, S::Error> {
        Bytes::new(bytes.as_ref()).serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<[u8; INFO_HASH_LEN], D::Error> {
        let buf = ByteBuf::deserialize(d)?;
        let buf = buf.into_vec();
        let len = buf.len();

        buf.try_into().map_err(|_| {
            let expected = format!("{INFO_HASH_LEN}");
            D::Error::invalid_length(len, &expected.as_ref())
        })
    }
}

// ----------------------------------------------------------------------------//

/// Bittorrent `NodeId`.
pub type NodeId = InfoHash;

/// Length of a `NodeId`.
pub const NODE_ID_LEN: usize = INFO_HASH_LEN;

// ----------------------------------------------------------------------------//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_any_case() {
        let lower: InfoHash = "8ca378dbc8f62e04df4a4a0114b66018666c17cd".parse().unwrap();
        let upper: InfoHash = "8CA378DBC8F62E04DF4A4A0114B66018666C17CD".parse().unwrap();

        assert_eq!(lower, upper);
        assert_eq!(
            lower.to_string(),
            "8ca378dbc8f62e04df4a4a0114b66018666c17cd"
        );
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(
            "not hex at all".parse::<InfoHash>(),
            Err(ParseInfoHashError::Hex(_))
        ));
        assert!(matches!(
            "8ca378db".parse::<InfoHash>(),
            Err(ParseInfoHashError::Length(_))
        ));
    }

    #[test]
    fn sha1_is_stable() {
        assert_eq!(InfoHash::sha1(b"foo"), InfoHash::sha1(b"foo"));
        assert_ne!(InfoHash::sha1(b"foo"), InfoHash::sha1(b"bar"));
        assert_eq!(
            InfoHash::sha1(b"foo").to_string(),
            "0beec7b5ea3f0fdbc95d0dd47f3c5bc275da8a33"
        );
    }

    #[test]
    fn random_ids_differ() {
        let a: NodeId = rand::random();
        let b: NodeId = rand::random();

        assert_ne!(a, b);
    }
}
