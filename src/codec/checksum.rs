//! Frame integrity check.
//!
//! Only the checked status layout carries an integrity byte: the XOR of every
//! payload byte. The algorithm is not confirmed against vendor documentation,
//! so it is kept behind [`verify`] alone.

use super::DecodeError;

/// XOR of all bytes in `payload`.
pub fn xor8(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, byte| acc ^ byte)
}

/// Check that `expected` (the byte carried by the frame) matches `payload`.
pub fn verify(payload: &[u8], expected: u8) -> Result<(), DecodeError> {
    let actual = xor8(payload);
    if actual == expected {
        Ok(())
    } else {
        Err(DecodeError::ChecksumMismatch { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xor8() {
        assert_eq!(xor8(&[]), 0);
        assert_eq!(xor8(&[0x5A]), 0x5A);
        assert_eq!(xor8(&[0xFF, 0x0F]), 0xF0);
        assert_eq!(xor8(&[0x12, 0x12]), 0);
    }

    #[test]
    fn test_verify() {
        assert!(verify(&[0x01, 0x02, 0x04], 0x07).is_ok());
        assert_eq!(
            verify(&[0x01, 0x02, 0x04], 0x06),
            Err(DecodeError::ChecksumMismatch {
                expected: 0x06,
                actual: 0x07
            })
        );
    }
}
