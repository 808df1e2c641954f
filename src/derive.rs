//! UID Derivation — pure computation of a tag's "Key A" from its UID.
//!
//! Bit-exact: a fixed prefix and suffix are concatenated around the raw
//! UID bytes, hashed with SHA-1, and six bytes of the digest are
//! permuted into the output. `sector` is validated but, matching the
//! reference this was ported from, does not affect the result.

use sha1::{Digest, Sha1};

use crate::error::ToyPadError;

const PRE: [u8; 16] = hex_literal(b"0a14fd0507ff4bcd026ba83f0a3b89a9");
const POST: [u8; 15] = hex_literal_15(b"286329204469736e65792032303133");

const MAX_SECTOR: u8 = 4;

/// Decode a hex string known at compile time into a fixed-size array.
/// Used only for the two protocol constants above; panics (at const-eval
/// time, so effectively a compile error) if `HEX` isn't valid.
const fn hex_literal(hex: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    let mut i = 0;
    while i < 16 {
        out[i] = hex_byte(hex[i * 2], hex[i * 2 + 1]);
        i += 1;
    }
    out
}

const fn hex_literal_15(hex: &[u8]) -> [u8; 15] {
    let mut out = [0u8; 15];
    let mut i = 0;
    while i < 15 {
        out[i] = hex_byte(hex[i * 2], hex[i * 2 + 1]);
        i += 1;
    }
    out
}

const fn hex_nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        _ => panic!("invalid hex digit in protocol constant"),
    }
}

const fn hex_byte(hi: u8, lo: u8) -> u8 {
    (hex_nibble(hi) << 4) | hex_nibble(lo)
}

/// Validate a 14-character lowercase-hex UID string against
/// `^04[0-9a-f]{12}$` and decode it to 7 bytes.
fn validate_and_decode_uid(uid_hex: &str) -> Result<[u8; 7], ToyPadError> {
    let bytes = uid_hex.as_bytes();
    let valid = bytes.len() == 14
        && bytes[0] == b'0'
        && bytes[1] == b'4'
        && bytes[2..].iter().all(|&c| c.is_ascii_digit() || (b'a'..=b'f').contains(&c));

    if !valid {
        return Err(ToyPadError::InvalidUid(uid_hex.to_string()));
    }

    let mut out = [0u8; 7];
    for (i, chunk) in bytes.chunks(2).enumerate() {
        out[i] = hex_byte(chunk[0], chunk[1]);
    }
    Ok(out)
}

/// Derive the 6-byte "Key A" for a tag UID, rendered as 12 lowercase
/// hex characters.
///
/// `uid_hex` must be 14 lowercase hex characters matching
/// `^04[0-9a-f]{12}$`. `sector` must be in `0..=4`; it is validated but
/// does not influence the output.
pub fn derive_key_a(uid_hex: &str, sector: u8) -> Result<String, ToyPadError> {
    if sector > MAX_SECTOR {
        return Err(ToyPadError::InvalidSector(sector));
    }
    let uid = validate_and_decode_uid(uid_hex)?;

    let mut message = Vec::with_capacity(PRE.len() + uid.len() + POST.len());
    message.extend_from_slice(&PRE);
    message.extend_from_slice(&uid);
    message.extend_from_slice(&POST);

    let digest = Sha1::digest(&message);

    let key = [digest[3], digest[2], digest[1], digest[0], digest[7], digest[6]];
    Ok(hex::encode(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Property 6 — bit-exact derivation vectors.
    #[test]
    fn known_vectors() {
        let vectors: &[(&str, &str)] = &[
            ("0456263a873a80", "29564af75805"),
            ("049c0bb2a03784", "c0b423c8e4c2"),
            ("04a0f02a3d2d80", "1e0615823120"),
            ("04b40c12a13780", "2737629f2ebe"),
            ("04d9fb8a763b80", "edb56de8a9fe"),
        ];

        for &(uid, expected) in vectors {
            assert_eq!(derive_key_a(uid, 0).unwrap(), expected, "uid={uid}");
        }
    }

    #[test]
    fn sector_does_not_affect_output() {
        let uid = "0456263a873a80";
        let base = derive_key_a(uid, 0).unwrap();
        for sector in 1..=MAX_SECTOR {
            assert_eq!(derive_key_a(uid, sector).unwrap(), base);
        }
    }

    #[test]
    fn rejects_invalid_sector() {
        assert_eq!(
            derive_key_a("0456263a873a80", 5),
            Err(ToyPadError::InvalidSector(5))
        );
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(derive_key_a("0456263a873a8", 0).is_err());
        assert!(derive_key_a("0456263a873a8000", 0).is_err());
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert!(derive_key_a("0556263a873a80", 0).is_err());
    }

    #[test]
    fn rejects_uppercase_hex() {
        assert!(derive_key_a("0456263A873A80", 0).is_err());
    }

    #[test]
    fn rejects_non_hex_chars() {
        assert!(derive_key_a("0456263a873a8g", 0).is_err());
    }
}
