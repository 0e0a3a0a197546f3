//! Hashing and ABI-encoding primitives used throughout the slot finder.
//!
//! Only three facilities are needed to compute mapping storage keys:
//! `keccak256`, left-padding a `uint256`, and left-padding an `address`.

use {
    alloy::primitives::{keccak256, Address, B256, U256},
    serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer},
    std::{fmt, str::FromStr},
};

/// Hashes arbitrary bytes with Keccak-256.
pub fn keccak(bytes: &[u8]) -> B256 {
    keccak256(bytes)
}

/// ABI-encodes a `uint256` as its big-endian 32-byte word.
pub fn abi_pad_uint(value: U256) -> B256 {
    B256::from(value.to_be_bytes())
}

/// ABI-encodes an `address` as a 32-byte word: 12 zero bytes followed by the
/// 20 address bytes.
pub fn abi_pad_addr(address: Address) -> B256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    B256::new(word)
}

/// An address that always round-trips through its EIP-55 checksum casing.
///
/// Every address stored in an archive record is checksum-canonical: this
/// wrapper serializes as the checksummed string and accepts either casing on
/// the way in, so archives written by hand or by older runs still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChecksumAddress(pub Address);

impl From<Address> for ChecksumAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl From<ChecksumAddress> for Address {
    fn from(value: ChecksumAddress) -> Self {
        value.0
    }
}

impl fmt::Display for ChecksumAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_checksum(None))
    }
}

impl FromStr for ChecksumAddress {
    type Err = alloy::primitives::AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_str(s).map(Self)
    }
}

impl Serialize for ChecksumAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChecksumAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(D::Error::custom)
    }
}
