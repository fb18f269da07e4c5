//! Synthetic cross-match identifier minting: `TXV-{year}-{base36(n, width)}`.

use crate::error::{Error, Result};

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Encode `num` as an `n`-character base-36 string using `0-9A-Z`,
/// left zero-padded to `n`.
///
/// Mirrors the original `int_to_alphanumeric`: the digit string is built
/// least-significant-digit-first, reversed, left-padded with `'0'` to width
/// `n`, and then truncated to the first `n` characters. For any `num` in the
/// documented range `0 <= num < 36^n` the pad-then-truncate step is a no-op;
/// it only bites (by dropping the *most significant* digits) if `num` does
/// not fit in `n` digits, so callers must keep `num` in range.
#[must_use]
pub fn base36_encode(num: u64, n: usize) -> String {
    if num == 0 {
        return "0".repeat(n);
    }

    let mut digits = Vec::new();
    let mut rem = num;
    while rem > 0 {
        let d = (rem % 36) as usize;
        digits.push(ALPHABET[d] as char);
        rem /= 36;
    }
    digits.reverse();
    let mut s: String = digits.into_iter().collect();
    if s.len() < n {
        s = format!("{}{}", "0".repeat(n - s.len()), s);
    }
    s.chars().take(n).collect()
}

/// Decode a base-36 string (as produced by [`base36_encode`]) back to its
/// integer value.
///
/// # Errors
/// Returns an error if the string contains a character outside `0-9A-Z`.
pub fn base36_decode(s: &str) -> Result<u64> {
    let mut value: u64 = 0;
    for c in s.chars() {
        let digit = ALPHABET
            .iter()
            .position(|&b| b as char == c.to_ascii_uppercase())
            .ok_or(Error::Base36Overflow(0, s.len()))?;
        value = value * 36 + digit as u64;
    }
    Ok(value)
}

/// Format a synthetic cross-match identifier: `TXV-{year}-{base36(idx, width)}`.
#[must_use]
pub fn format_xmatch_id(year: i32, idx: u64, width: usize) -> String {
    format!("TXV-{year}-{}", base36_encode(idx, width))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_for_values_in_range() {
        let width = 6;
        let max = 36u64.pow(width as u32);
        for n in [0u64, 1, 35, 36, 999, 46655, max - 1] {
            let encoded = base36_encode(n, width);
            assert_eq!(encoded.len(), width);
            assert_eq!(base36_decode(&encoded).unwrap(), n);
        }
    }

    #[test]
    fn zero_pads_to_width() {
        assert_eq!(base36_encode(1, 6), "000001");
        assert_eq!(base36_encode(0, 6), "000000");
    }

    #[test]
    fn xmatch_id_format() {
        assert_eq!(format_xmatch_id(2025, 1, 6), "TXV-2025-000001");
    }
}
