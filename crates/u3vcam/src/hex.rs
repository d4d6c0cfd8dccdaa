//! Hex text helpers for the codec commands.

use std::fmt::Write;

use crate::exit::{CliError, CliResult, USAGE};

/// Lowercase hex, no separators.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Parse hex text. Whitespace, `:` and `-` separators and a leading `0x`
/// are accepted.
pub fn decode(input: &str) -> CliResult<Vec<u8>> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<u8> = body
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':' && *b != b'-')
        .collect();

    if digits.is_empty() {
        return Err(CliError::new(USAGE, "hex input must not be empty"));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("hex input has an odd number of digits ({})", digits.len()),
        ));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let hi = nibble(pair[0])?;
            let lo = nibble(pair[1])?;
            Ok((hi << 4) | lo)
        })
        .collect()
}

/// Parse a decimal or `0x`-prefixed integer.
pub fn parse_u64(input: &str) -> Result<u64, String> {
    let input = input.trim();
    let parsed = match input.get(..2) {
        Some("0x" | "0X") => u64::from_str_radix(&input[2..], 16),
        _ => input.parse(),
    };
    parsed.map_err(|err| format!("invalid number {input:?}: {err}"))
}

/// Like [`parse_u64`], also accepting negative decimals that fit an i32.
pub fn parse_i32(input: &str) -> Result<i32, String> {
    let input = input.trim();
    if input.starts_with('-') {
        return input
            .parse()
            .map_err(|err| format!("invalid number {input:?}: {err}"));
    }
    let value = parse_u64(input)?;
    // Register values are raw 32-bit words, so 0xFFFFFFFF is accepted.
    u32::try_from(value)
        .map(|v| v as i32)
        .map_err(|_| format!("{input} does not fit a 32-bit register"))
}

fn nibble(digit: u8) -> CliResult<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        other => Err(CliError::new(
            USAGE,
            format!("invalid hex digit {:?}", char::from(other)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_accepts_separators() {
        assert_eq!(decode("55 33 56 43").unwrap(), vec![0x55, 0x33, 0x56, 0x43]);
        assert_eq!(decode("0x0a:FF-10").unwrap(), vec![0x0a, 0xff, 0x10]);
        assert_eq!(encode(&[0x00, 0xab]), "00ab");
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert_eq!(decode("").unwrap_err().code, USAGE);
        assert_eq!(decode("abc").unwrap_err().code, USAGE);
        assert_eq!(decode("zz").unwrap_err().code, USAGE);
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_u64("0x40024").unwrap(), 0x40024);
        assert_eq!(parse_u64("263268").unwrap(), 263_268);
        assert!(parse_u64("0xZZ").is_err());
        assert_eq!(parse_i32("-1").unwrap(), -1);
        assert_eq!(parse_i32("0xFFFFFFFF").unwrap(), -1);
        assert!(parse_i32("0x100000000").is_err());
    }
}
