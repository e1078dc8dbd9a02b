use crate::error::{Error, ErrorKind};
use std::fmt;
use std::str::FromStr;

/// A 128-bit file identity.
///
/// Either the (truncated) BLAKE3 hash of a file's contents, or an encoding of
/// its last write time; see [`HashMethod`](crate::HashMethod). All zeros is
/// reserved for "unknown or absent".
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; Self::LEN]);
impl Digest {
    pub const LEN: usize = 16;
    /// The "nothing was hashed" sentinel.
    pub const EMPTY: Self = Self([0; Self::LEN]);

    pub const fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    pub(crate) fn from_blake3(hash: blake3::Hash) -> Self {
        let mut bytes = [0; Self::LEN];
        bytes.copy_from_slice(&hash.as_bytes()[..Self::LEN]);
        Self(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{b:02X}"))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

impl FromStr for Digest {
    type Err = Error;

    /// Parses 32 hex digits (any case). The empty string is [`Digest::EMPTY`],
    /// which is what records that were never hashed get written out as.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::EMPTY);
        }
        if s.len() != Self::LEN * 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            exn::bail!(ErrorKind::InvalidDigest(s.to_string()));
        }
        let mut bytes = [0; Self::LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| ErrorKind::InvalidDigest(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_display_is_upper_hex() {
        let digest = Digest::from_bytes([0xAB, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0x10]);
        assert_eq!(digest.to_string(), "AB01000000000000000000000000FF10");
        assert_eq!(Digest::EMPTY.to_string(), "0".repeat(32));
    }

    #[rstest]
    #[case("00000000000000000000000000000000", Digest::EMPTY)]
    #[case("", Digest::EMPTY)]
    #[case("  ", Digest::EMPTY)]
    #[case("0102030405060708090a0b0c0d0e0f10", Digest::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]))]
    #[case("0102030405060708090A0B0C0D0E0F10", Digest::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]))]
    fn test_parse(#[case] input: &str, #[case] expected: Digest) {
        assert_eq!(input.parse::<Digest>().unwrap(), expected);
    }

    #[rstest]
    #[case("0102")]
    #[case("0102030405060708090a0b0c0d0e0f1011")]
    #[case("zz02030405060708090a0b0c0d0e0f10")]
    #[case("+102030405060708090a0b0c0d0e0f10")]
    fn test_parse_invalid(#[case] input: &str) {
        assert!(input.parse::<Digest>().is_err());
    }

    #[test]
    fn test_empty() {
        assert!(Digest::EMPTY.is_empty());
        assert!(Digest::default().is_empty());
        assert!(!Digest::from_bytes([1; 16]).is_empty());
    }
}
