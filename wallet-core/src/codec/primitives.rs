//! Felt-level encoding shared by every contract call.
//!
//! Calldata travels as an array of field elements. Numbers wider than a felt
//! (u256) are split into two 128-bit limbs, short identifiers are packed
//! big-endian into one felt, and arbitrary strings use the Cairo `ByteArray`
//! layout of 31-byte words plus a pending word.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use starknet_core::codec::{Decode, Encode};
use starknet_core::types::ByteArray;
use starknet_core::utils::{
    cairo_short_string_to_felt, get_selector_from_name, parse_cairo_short_string,
};
use starknet_crypto::Felt;

use crate::errors::{WalletError, WalletResult};

/// Maximum number of bytes a short string or a ByteArray word can hold.
pub const BYTES_PER_WORD: usize = 31;

/// Parse a felt from `0x`-prefixed (or bare) hex, rejecting values that do
/// not fit in 32 bytes.
pub fn felt_from_hex(value: &str) -> WalletResult<Felt> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || digits.len() > 64 {
        return Err(WalletError::ValidationError(format!(
            "Invalid felt hex '{}'",
            value
        )));
    }
    let padded = format!("{:0>64}", digits);
    let bytes = hex::decode(&padded)
        .map_err(|_| WalletError::ValidationError(format!("Invalid felt hex '{}'", value)))?;
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&bytes);
    Ok(Felt::from_bytes_be(&buf))
}

/// Parse a felt from a base-10 string.
pub fn felt_from_decimal(value: &str) -> WalletResult<Felt> {
    let parsed = BigUint::from_str(value.trim())
        .map_err(|_| WalletError::ValidationError(format!("Invalid decimal felt '{}'", value)))?;
    let bytes = parsed.to_bytes_be();
    if bytes.len() > 32 {
        return Err(WalletError::ValidationError(format!(
            "Decimal value '{}' does not fit in a felt",
            value
        )));
    }
    let mut buf = [0u8; 32];
    buf[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(Felt::from_bytes_be(&buf))
}

/// Canonical lowercase `0x` form without leading zeros (`0x0` for zero).
pub fn felt_to_hex(felt: &Felt) -> String {
    let full = hex::encode(felt.to_bytes_be());
    let trimmed = full.trim_start_matches('0');
    if trimmed.is_empty() {
        "0x0".to_string()
    } else {
        format!("0x{}", trimmed)
    }
}

/// 64-digit zero-padded hex, as used for key material.
pub fn felt_to_padded_hex(felt: &Felt) -> String {
    format!("0x{}", hex::encode(felt.to_bytes_be()))
}

pub fn felt_to_biguint(felt: &Felt) -> BigUint {
    BigUint::from_bytes_be(&felt.to_bytes_be())
}

pub fn felt_to_decimal(felt: &Felt) -> String {
    felt_to_biguint(felt).to_str_radix(10)
}

/// Render calldata the way the JSON transport expects it: base-10 strings.
pub fn to_decimal_strings(felts: &[Felt]) -> Vec<String> {
    felts.iter().map(felt_to_decimal).collect()
}

/// Low 128 bits of a felt. Values above `u128::MAX` are truncated.
pub fn felt_to_u128(felt: &Felt) -> u128 {
    let bytes = felt.to_bytes_be();
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&bytes[16..32]);
    u128::from_be_bytes(buf)
}

/// Felt to u64, or `None` if it does not fit.
pub fn felt_to_u64(felt: &Felt) -> Option<u64> {
    let bytes = felt.to_bytes_be();
    if bytes[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[24..32]);
    Some(u64::from_be_bytes(buf))
}

pub fn felt_to_u8(felt: &Felt) -> Option<u8> {
    felt_to_u64(felt).and_then(|v| u8::try_from(v).ok())
}

pub fn felt_to_u16(felt: &Felt) -> Option<u16> {
    felt_to_u64(felt).and_then(|v| u16::try_from(v).ok())
}

pub fn felt_to_u32(felt: &Felt) -> Option<u32> {
    felt_to_u64(felt).and_then(|v| u32::try_from(v).ok())
}

/// Entrypoint selector for `name`.
pub fn selector_from_name(name: &str) -> WalletResult<Felt> {
    get_selector_from_name(name)
        .map_err(|e| WalletError::ValidationError(format!("Entrypoint '{}': {}", name, e)))
}

/// Unsigned 256-bit integer as the two 128-bit limbs Cairo uses on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct U256 {
    pub low: u128,
    pub high: u128,
}

impl U256 {
    pub const ZERO: U256 = U256 { low: 0, high: 0 };
    pub const MAX: U256 = U256 {
        low: u128::MAX,
        high: u128::MAX,
    };

    pub const fn from_limbs(low: u128, high: u128) -> Self {
        Self { low, high }
    }

    /// Calldata form: low limb first, then high limb.
    pub fn to_felts(&self) -> [Felt; 2] {
        [Felt::from(self.low), Felt::from(self.high)]
    }

    /// Calldata form rendered as base-10 strings.
    pub fn to_decimal_limbs(&self) -> [String; 2] {
        [self.low.to_string(), self.high.to_string()]
    }

    /// Rebuild from a `[low, high]` felt pair. Limbs wider than 128 bits are
    /// rejected instead of silently truncated.
    pub fn from_felts(low: &Felt, high: &Felt) -> WalletResult<Self> {
        let low_bytes = low.to_bytes_be();
        let high_bytes = high.to_bytes_be();
        if low_bytes[..16].iter().any(|b| *b != 0) || high_bytes[..16].iter().any(|b| *b != 0) {
            return Err(WalletError::ValidationError(
                "u256 limb exceeds 128 bits".to_string(),
            ));
        }
        Ok(Self {
            low: felt_to_u128(low),
            high: felt_to_u128(high),
        })
    }

    /// Rebuild from `0x` hex limbs as returned by view calls.
    pub fn from_hex_limbs(low: &str, high: &str) -> WalletResult<Self> {
        Self::from_felts(&felt_from_hex(low)?, &felt_from_hex(high)?)
    }

    pub fn to_biguint(&self) -> BigUint {
        (BigUint::from(self.high) << 128u32) + BigUint::from(self.low)
    }

    pub fn from_biguint(value: &BigUint) -> WalletResult<Self> {
        let bytes = value.to_bytes_be();
        if bytes.len() > 32 {
            return Err(WalletError::ValidationError(
                "Value does not fit in u256".to_string(),
            ));
        }
        let mut buf = [0u8; 32];
        buf[32 - bytes.len()..].copy_from_slice(&bytes);
        let mut high = [0u8; 16];
        let mut low = [0u8; 16];
        high.copy_from_slice(&buf[..16]);
        low.copy_from_slice(&buf[16..]);
        Ok(Self {
            low: u128::from_be_bytes(low),
            high: u128::from_be_bytes(high),
        })
    }

    pub fn from_dec_str(value: &str) -> WalletResult<Self> {
        let parsed = BigUint::from_str(value.trim())
            .map_err(|_| WalletError::ValidationError(format!("Invalid u256 '{}'", value)))?;
        Self::from_biguint(&parsed)
    }

    pub fn is_zero(&self) -> bool {
        self.low == 0 && self.high == 0
    }
}

impl From<u128> for U256 {
    fn from(value: u128) -> Self {
        Self {
            low: value,
            high: 0,
        }
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        Self::from(value as u128)
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_biguint())
    }
}

impl FromStr for U256 {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_dec_str(s)
    }
}

/// Pack up to 31 ASCII bytes into one felt.
pub fn encode_short_string(value: &str) -> WalletResult<Felt> {
    cairo_short_string_to_felt(value)
        .map_err(|e| WalletError::ValidationError(format!("Short string '{}': {}", value, e)))
}

/// Unpack a felt produced by [`encode_short_string`]. Leading zero bytes are
/// padding and are dropped.
pub fn decode_short_string(felt: &Felt) -> WalletResult<String> {
    parse_cairo_short_string(felt)
        .map_err(|e| WalletError::ValidationError(format!("Short string: {}", e)))
}

/// Cairo `ByteArray` serialization:
/// `[num_full_words, word_0 .. word_n, pending_word, pending_word_len]`.
pub fn encode_byte_array(value: &str) -> Vec<Felt> {
    let mut out = Vec::with_capacity(value.len() / BYTES_PER_WORD + 3);
    if let Err(e) = ByteArray::from(value).encode(&mut out) {
        // Encoding into a Vec cannot fail.
        log::error!("ByteArray encoding failed: {}", e);
    }
    out
}

/// Result of reading a `ByteArray` out of a felt stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedByteArray {
    pub value: String,
    /// Number of felts the array occupied.
    pub consumed: usize,
}

/// Number of felts the `ByteArray` at `felts[0]` declares, if its length
/// prefix is readable and the stream holds all of them.
pub fn byte_array_span(felts: &[Felt]) -> Option<usize> {
    let word_count = usize::try_from(felts.first().and_then(felt_to_u64)?).ok()?;
    let span = word_count.checked_add(3)?;
    (felts.len() >= span).then_some(span)
}

/// Decode a `ByteArray` starting at `felts[0]`. Full words and the first
/// `pending_word_len` bytes of the pending word are joined, then decoded as
/// UTF-8 once, so a character may straddle two words. Returns an error if
/// the stream is truncated, a word is wider than its declared length, or the
/// bytes are not UTF-8.
pub fn decode_byte_array(felts: &[Felt]) -> WalletResult<DecodedByteArray> {
    let consumed = byte_array_span(felts).ok_or_else(|| {
        WalletError::ValidationError("ByteArray is truncated or has no length".to_string())
    })?;
    let words = &felts[..consumed];
    let word_count = consumed - 3;

    for word in &words[1..=word_count] {
        check_word_width(word, BYTES_PER_WORD)?;
    }
    let pending_len = felt_to_u64(&words[word_count + 2])
        .filter(|len| *len < BYTES_PER_WORD as u64)
        .ok_or_else(|| WalletError::ValidationError("Invalid pending word length".to_string()))?;
    check_word_width(&words[word_count + 1], pending_len as usize)?;

    let bytes = ByteArray::decode(words)
        .map_err(|e| WalletError::ValidationError(format!("ByteArray: {}", e)))?;
    let value = String::try_from(bytes)
        .map_err(|_| WalletError::ValidationError("ByteArray is not valid UTF-8".to_string()))?;
    Ok(DecodedByteArray { value, consumed })
}

/// Encode a list of felts as a Cairo `Array`: length prefix then items.
pub fn encode_felt_array(items: &[Felt]) -> Vec<Felt> {
    let mut out = Vec::with_capacity(items.len() + 1);
    out.push(Felt::from(items.len() as u64));
    out.extend_from_slice(items);
    out
}

/// Rejects a word with non-zero bytes above its trailing `len`.
fn check_word_width(word: &Felt, len: usize) -> WalletResult<()> {
    let bytes = word.to_bytes_be();
    if bytes[..32 - len].iter().any(|b| *b != 0) {
        return Err(WalletError::ValidationError(format!(
            "ByteArray word wider than {} bytes",
            len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn u256_split_matches_mask_and_shift() {
        let value = BigUint::from(7u8) << 130u32;
        let split = U256::from_biguint(&(value.clone() + BigUint::from(5u8))).unwrap();
        assert_eq!(split.low, 5);
        assert_eq!(split.high, 4);
        assert_eq!(split.to_biguint(), value + BigUint::from(5u8));
    }

    #[test]
    fn u256_round_trips_through_felts() {
        let mut rng = rand::thread_rng();
        let mut samples = vec![U256::ZERO, U256::MAX, U256::from(1u64)];
        for _ in 0..256 {
            samples.push(U256::from_limbs(rng.gen(), rng.gen()));
        }
        for value in samples {
            let [low, high] = value.to_felts();
            assert_eq!(U256::from_felts(&low, &high).unwrap(), value);
            let [lo_str, hi_str] = value.to_decimal_limbs();
            let lo_hex = felt_to_hex(&felt_from_decimal(&lo_str).unwrap());
            let hi_hex = felt_to_hex(&felt_from_decimal(&hi_str).unwrap());
            assert_eq!(U256::from_hex_limbs(&lo_hex, &hi_hex).unwrap(), value);
        }
    }

    #[test]
    fn u256_decimal_display_and_parse() {
        let max = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        assert_eq!(U256::MAX.to_string(), max);
        assert_eq!(U256::from_dec_str(max).unwrap(), U256::MAX);
        assert!(U256::from_dec_str(
            "115792089237316195423570985008687907853269984665640564039457584007913129639936"
        )
        .is_err());
    }

    #[test]
    fn u256_rejects_wide_limbs() {
        let wide = Felt::from(u128::MAX) + Felt::ONE;
        assert!(U256::from_felts(&wide, &Felt::ZERO).is_err());
    }

    #[test]
    fn u8_values_round_trip() {
        for v in 0u8..=255 {
            let felt = felt_from_decimal(&v.to_string()).unwrap();
            assert_eq!(felt_to_u8(&felt), Some(v));
        }
        assert_eq!(felt_to_u8(&Felt::from(256u64)), None);
    }

    #[test]
    fn short_string_round_trip() {
        let felt = encode_short_string("starknet").unwrap();
        assert_eq!(felt_to_hex(&felt), "0x737461726b6e6574");
        assert_eq!(decode_short_string(&felt).unwrap(), "starknet");
        assert_eq!(decode_short_string(&Felt::ZERO).unwrap(), "");
    }

    #[test]
    fn short_string_limits() {
        assert!(encode_short_string(&"a".repeat(31)).is_ok());
        assert!(encode_short_string(&"a".repeat(32)).is_err());
        assert!(encode_short_string("héllo").is_err());
    }

    #[test]
    fn byte_array_layout() {
        let encoded = encode_byte_array("hello");
        assert_eq!(encoded.len(), 3);
        assert_eq!(encoded[0], Felt::ZERO);
        assert_eq!(encoded[1], encode_short_string("hello").unwrap());
        assert_eq!(encoded[2], Felt::from(5u64));

        let exact = "x".repeat(31);
        let encoded = encode_byte_array(&exact);
        assert_eq!(encoded.len(), 4);
        assert_eq!(encoded[0], Felt::ONE);
        assert_eq!(encoded[2], Felt::ZERO);
        assert_eq!(encoded[3], Felt::ZERO);
    }

    #[test]
    fn byte_array_round_trip_for_long_uri() {
        let uri = "ipfs://bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi/meal.jpg";
        let mut encoded = encode_byte_array(uri);
        encoded.push(Felt::from(99u64));
        let decoded = decode_byte_array(&encoded).unwrap();
        assert_eq!(decoded.value, uri);
        assert_eq!(decoded.consumed, encoded.len() - 1);
    }

    #[test]
    fn byte_array_truncation_is_an_error() {
        let encoded = encode_byte_array(&"y".repeat(70));
        assert!(decode_byte_array(&encoded[..encoded.len() - 1]).is_err());
        assert!(decode_byte_array(&[]).is_err());
    }

    #[test]
    fn multibyte_character_may_straddle_words() {
        let uri = format!("{}é/x", "a".repeat(30));
        let encoded = encode_byte_array(&uri);
        assert_eq!(encoded[0], Felt::ONE);
        assert_eq!(encoded[3], Felt::from(3u64));
        assert_eq!(decode_byte_array(&encoded).unwrap().value, uri);
    }

    #[test]
    fn byte_array_rejects_malformed_words() {
        let mut encoded = encode_byte_array(&"z".repeat(40));
        encoded[1] = Felt::from_bytes_be(&[0xff; 32]);
        assert!(decode_byte_array(&encoded).is_err());

        let mut invalid_utf8 = encode_byte_array("ok");
        invalid_utf8[1] = Felt::from(0xfffeu64);
        assert!(decode_byte_array(&invalid_utf8).is_err());

        let mut overlong_pending = encode_byte_array("abc");
        overlong_pending[2] = Felt::from(2u64);
        assert!(decode_byte_array(&overlong_pending).is_err());

        let mut bad_pending_len = encode_byte_array("abc");
        bad_pending_len[2] = Felt::from(31u64);
        assert!(decode_byte_array(&bad_pending_len).is_err());
    }

    #[test]
    fn byte_array_span_counts_declared_words() {
        let encoded = encode_byte_array(&"q".repeat(62));
        assert_eq!(byte_array_span(&encoded), Some(5));
        assert_eq!(byte_array_span(&encoded[..4]), None);
        assert_eq!(byte_array_span(&[Felt::MAX, Felt::ZERO, Felt::ZERO]), None);
    }

    #[test]
    fn selector_matches_known_value() {
        assert_eq!(
            felt_to_hex(&selector_from_name("transfer").unwrap()),
            "0x83afd3f4caedc6eebf44246fe54e38c95e3179a5ec9ea81740eca5b482d12e"
        );
        assert_eq!(
            felt_to_hex(&selector_from_name("__execute__").unwrap()),
            "0x15d40a3d6ca2ac30f4031e42be28da9b056fef9bb7357ac5e85627ee876e5ad"
        );
        assert!(selector_from_name("mangé").is_err());
    }

    #[test]
    fn felt_hex_parsing() {
        assert_eq!(felt_from_hex("0x1").unwrap(), Felt::ONE);
        assert_eq!(felt_from_hex("1").unwrap(), Felt::ONE);
        assert!(felt_from_hex("0x").is_err());
        assert!(felt_from_hex(&format!("0x{}", "1".repeat(65))).is_err());
        assert!(felt_from_hex("0xzz").is_err());
        assert_eq!(felt_to_hex(&Felt::ZERO), "0x0");
    }
}
