//! Beacon identifier parsing
//!
//! Accepted forms, checked in order:
//! - `0x` prefixed hex (byte string)
//! - canonical UUID (`8-4-4-4-12`)
//! - decimal without leading zeros, 0..=65535
//! - bare hex digits (byte string)

use thiserror::Error;
use uuid::Uuid;

/// Largest value a 16-bit beacon field can carry
const MAX_U16_VALUE: u32 = 65535;
/// Digits in the largest 16-bit decimal value
const MAX_U16_DIGITS: usize = 5;
/// Byte width of a 16-bit beacon field
const U16_BYTES: usize = 2;
/// Byte width of a proximity UUID
const UUID_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,
    #[error("\"{0}\" is not a hex, decimal or uuid identifier")]
    Malformed(String),
    #[error("decimal identifier {0} is larger than 65535")]
    OutOfRange(String),
    #[error("identifier \"{value}\" is {actual} bytes, at most {max} allowed")]
    TooLong { value: String, actual: usize, max: usize },
}

/// A parsed beacon identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Uuid(Uuid),
    Integer(u16),
    Bytes(Vec<u8>),
}

impl Identifier {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(IdentifierError::Empty);
        }

        if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            if digits.is_empty() || !is_hex(digits) {
                return Err(IdentifierError::Malformed(raw.to_string()));
            }
            return decode_hex(digits, raw);
        }

        if s.len() == 36 && s.contains('-') {
            return Uuid::parse_str(s)
                .map(Identifier::Uuid)
                .map_err(|_| IdentifierError::Malformed(raw.to_string()));
        }

        if is_decimal(s) {
            // Longer digit strings cannot fit and would overflow the parse
            if s.len() > MAX_U16_DIGITS {
                return Err(IdentifierError::OutOfRange(raw.to_string()));
            }
            let value: u32 =
                s.parse().map_err(|_| IdentifierError::Malformed(raw.to_string()))?;
            if value > MAX_U16_VALUE {
                return Err(IdentifierError::OutOfRange(raw.to_string()));
            }
            return Ok(Identifier::Integer(value as u16));
        }

        if is_hex(s) {
            return decode_hex(s, raw);
        }

        Err(IdentifierError::Malformed(raw.to_string()))
    }

    /// Parse an identifier that must fit a 16-bit major/minor field
    pub fn parse_u16(raw: &str) -> Result<Self, IdentifierError> {
        let id = Self::parse(raw)?;
        id.check_width(raw, U16_BYTES)?;
        Ok(id)
    }

    /// Parse an identifier used as a proximity uuid
    pub fn parse_uuid(raw: &str) -> Result<Self, IdentifierError> {
        let id = Self::parse(raw)?;
        id.check_width(raw, UUID_BYTES)?;
        Ok(id)
    }

    pub fn byte_len(&self) -> usize {
        match self {
            Identifier::Uuid(_) => UUID_BYTES,
            Identifier::Integer(_) => U16_BYTES,
            Identifier::Bytes(bytes) => bytes.len(),
        }
    }

    fn check_width(&self, raw: &str, max: usize) -> Result<(), IdentifierError> {
        let actual = self.byte_len();
        if actual > max {
            return Err(IdentifierError::TooLong { value: raw.to_string(), actual, max });
        }
        Ok(())
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identifier::Uuid(uuid) => write!(f, "{}", uuid.hyphenated()),
            Identifier::Integer(value) => write!(f, "{}", value),
            Identifier::Bytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
        }
    }
}

/// `0` or digits without a leading zero; zero-padded digit strings are hex
fn is_decimal(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit()) && (s == "0" || !s.starts_with('0'))
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn decode_hex(digits: &str, raw: &str) -> Result<Identifier, IdentifierError> {
    // Odd digit counts are padded on the left
    let padded =
        if digits.len() % 2 == 1 { format!("0{}", digits) } else { digits.to_string() };
    hex::decode(padded)
        .map(Identifier::Bytes)
        .map_err(|_| IdentifierError::Malformed(raw.to_string()))
}
