//! text <-> field packing
//!
//! question and answer text is stored on-chain as a single field element: the
//! big-endian integer whose bytes are the utf-8 bytes of the text, unpadded.
//!
//! known limitation: leading NUL bytes vanish in the integer form, so
//! `"\0abc"` decodes back as `"abc"`.

use primitive_types::U256;

use crate::{OracleError, Result};

/// on-chain numeric value
pub type Field = U256;

/// largest byte length that always stays below the rollup field modulus
pub const FIELD_TEXT_CAPACITY: usize = 31;

/// shown for absent or zero values
pub const PLACEHOLDER: &str = "-";

/// pack text into a field
pub fn encode_text(text: &str) -> Result<Field> {
    let bytes = text.as_bytes();
    if bytes.len() > FIELD_TEXT_CAPACITY {
        return Err(OracleError::Codec(format!(
            "text is {} bytes, at most {} fit in a field",
            bytes.len(),
            FIELD_TEXT_CAPACITY
        )));
    }
    Ok(Field::from_big_endian(bytes))
}

/// unpack a field into text
///
/// equivalent to hex-rendering the integer, left-padding an odd digit count
/// with one zero nibble and reading the bytes back. invalid utf-8 is replaced
/// lossily.
pub fn decode_text(value: Field) -> String {
    let bytes = field_bytes(value);
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

/// decoded text for display, `-` for absent or zero values
pub fn display_text(value: Option<Field>) -> String {
    match value {
        Some(v) if !v.is_zero() => decode_text(v),
        _ => PLACEHOLDER.to_string(),
    }
}

/// big-endian 32 byte form
pub fn field_bytes(value: Field) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes
}

/// `0x`-prefixed lowercase hex of a field
pub fn field_hex(value: Field) -> String {
    format!("0x{:x}", value)
}

/// parse user supplied numeric input: `0x` hex or decimal
pub fn parse_field(input: &str) -> Result<Field> {
    let trimmed = input.trim();
    if let Some(digits) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        let bytes = hex_bytes(digits).map_err(OracleError::InvalidField)?;
        if bytes.len() > 32 {
            return Err(OracleError::InvalidField(format!(
                "{} does not fit in 256 bits",
                trimmed
            )));
        }
        return Ok(Field::from_big_endian(&bytes));
    }

    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(OracleError::InvalidField(format!(
            "'{}' is neither 0x-hex nor decimal",
            input
        )));
    }
    Field::from_dec_str(trimmed)
        .map_err(|e| OracleError::InvalidField(format!("{}: {:?}", trimmed, e)))
}

/// hex digits (no prefix) to bytes, tolerating an odd digit count
pub(crate) fn hex_bytes(digits: &str) -> std::result::Result<Vec<u8>, String> {
    if digits.is_empty() {
        return Ok(Vec::new());
    }
    let padded;
    let even = if digits.len() % 2 == 1 {
        padded = format!("0{}", digits);
        padded.as_str()
    } else {
        digits
    };
    hex::decode(even).map_err(|e| format!("invalid hex '{}': {}", digits, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_is_big_endian_bytes() {
        let value = encode_text("ab").unwrap();
        assert_eq!(value, Field::from(0x6162u64));
    }

    #[test]
    fn test_empty_text_is_zero() {
        assert_eq!(encode_text("").unwrap(), Field::zero());
        assert_eq!(decode_text(Field::zero()), "");
    }

    #[test]
    fn test_odd_nibble_count_decodes() {
        // 0x161 -> "01 61"
        let decoded = decode_text(Field::from(0x161u64));
        assert_eq!(decoded.as_bytes(), &[0x01, 0x61]);
    }

    #[test]
    fn test_default_question_roundtrip() {
        let text = "What's the ratio for fernet?";
        assert_eq!(decode_text(encode_text(text).unwrap()), text);
    }

    #[test]
    fn test_too_long_rejected() {
        let text = "x".repeat(FIELD_TEXT_CAPACITY + 1);
        assert!(matches!(encode_text(&text), Err(OracleError::Codec(_))));
        assert!(encode_text(&"x".repeat(FIELD_TEXT_CAPACITY)).is_ok());
    }

    #[test]
    fn test_leading_nul_is_lost() {
        let value = encode_text("\0abc").unwrap();
        assert_eq!(decode_text(value), "abc");
    }

    #[test]
    fn test_display_placeholder() {
        assert_eq!(display_text(None), PLACEHOLDER);
        assert_eq!(display_text(Some(Field::zero())), PLACEHOLDER);
        assert_eq!(display_text(Some(encode_text("yes").unwrap())), "yes");
    }

    #[test]
    fn test_parse_field_forms() {
        assert_eq!(parse_field("0x2a").unwrap(), Field::from(42u64));
        assert_eq!(parse_field("0xa").unwrap(), Field::from(10u64));
        assert_eq!(parse_field("42").unwrap(), Field::from(42u64));
        assert!(parse_field("forty-two").is_err());
        assert!(parse_field("0xzz").is_err());
        assert!(parse_field(&format!("0x{}", "f".repeat(66))).is_err());
    }

    #[test]
    fn test_field_hex() {
        assert_eq!(field_hex(Field::from(255u64)), "0xff");
    }

    proptest! {
        #[test]
        fn prop_printable_ascii_roundtrip(text in "[ -~]{0,31}") {
            let value = encode_text(&text).unwrap();
            prop_assert_eq!(decode_text(value), text);
        }
    }
}
