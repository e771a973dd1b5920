//! 32 byte identifiers: account/contract addresses and transaction hashes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::{field_bytes, hex_bytes, Field};
use crate::{OracleError, Result};

/// address identifier (fixed-width, canonical form `0x` + 64 hex digits)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0u8; 32]);

    /// convert a raw field value into an address
    pub fn from_field(value: Field) -> Self {
        Self(field_bytes(value))
    }

    pub fn to_field(&self) -> Field {
        Field::from_big_endian(&self.0)
    }

    /// parse `0x`-prefixed (or bare) hex, left-padding short input
    pub fn parse(input: &str) -> Result<Self> {
        parse_bytes32(input)
            .map(Self)
            .map_err(OracleError::InvalidAddress)
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes[1..]);
        Self(bytes)
    }

    /// `0x1234...cdef` form used in tables
    pub fn short(&self) -> String {
        short_address(&self.to_string())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short())
    }
}

impl FromStr for Address {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<Field> for Address {
    fn from(value: Field) -> Self {
        Self::from_field(value)
    }
}

/// transaction hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn parse(input: &str) -> Result<Self> {
        parse_bytes32(input)
            .map(Self)
            .map_err(|reason| OracleError::Config(format!("invalid tx hash: {}", reason)))
    }

    pub fn short(&self) -> String {
        short_address(&self.to_string())
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.short())
    }
}

/// shorten a long identifier to its first 6 and last 4 characters
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn parse_bytes32(input: &str) -> std::result::Result<[u8; 32], String> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(format!("'{}' has no hex digits", input));
    }
    if digits.len() > 64 {
        return Err(format!("'{}' is longer than 32 bytes", input));
    }
    let bytes = hex_bytes(digits)?;
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_canonical() {
        let addr = Address::parse("0x2a").unwrap();
        assert_eq!(
            addr.to_string(),
            format!("0x{}2a", "0".repeat(62))
        );
        assert_eq!(Address::parse(&addr.to_string()).unwrap(), addr);
    }

    #[test]
    fn test_field_and_string_forms_converge() {
        let from_field = Address::from_field(Field::from(0xbeefu64));
        let from_str: Address = "0xBEEF".parse().unwrap();
        assert_eq!(from_field, from_str);
        assert_eq!(from_field.to_field(), Field::from(0xbeefu64));
    }

    #[test]
    fn test_invalid_address() {
        assert!(matches!(Address::parse("0x"), Err(OracleError::InvalidAddress(_))));
        assert!(Address::parse("0xnothex").is_err());
        assert!(Address::parse(&format!("0x{}", "1".repeat(65))).is_err());
    }

    #[test]
    fn test_short_address() {
        assert_eq!(short_address("0x1234"), "0x1234");
        assert_eq!(short_address("0x123456789abcdef"), "0x1234...cdef");
        assert_eq!(short_address("-"), "-");
        let addr = Address::parse("0xabcdef").unwrap();
        assert_eq!(addr.short(), "0x0000...cdef");
    }

    #[test]
    fn test_random_addresses_differ() {
        assert_ne!(Address::random(), Address::random());
    }

    #[test]
    fn test_tx_hash_parse() {
        let hash = TxHash::parse("0x01").unwrap();
        assert_eq!(hash.0[31], 1);
        assert!(matches!(TxHash::parse("zz"), Err(OracleError::Config(_))));
    }
}
