//! CRC-16 engine (C1).
//!
//! CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF, no input/
//! output reflection, xorout 0. Frozen per DESIGN.md — both ends of the
//! wire link must agree bit-for-bit, so this is a pure from-scratch
//! computation rather than a crate dependency.

const POLYNOMIAL: u16 = 0x1021;
const INITIAL: u16 = 0xffff;

/// Compute the CRC-16/CCITT-FALSE checksum over `bytes`.
pub fn crc(bytes: &[u8]) -> u16 {
    let mut reg = INITIAL;
    for &byte in bytes {
        reg ^= (byte as u16) << 8;
        for _ in 0..8 {
            reg = if reg & 0x8000 != 0 { (reg << 1) ^ POLYNOMIAL } else { reg << 1 };
        }
    }
    reg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_initial_value() {
        assert_eq!(crc(&[]), INITIAL);
    }

    #[test]
    fn known_vector_matches_ccitt_false() {
        // CRC-16/CCITT-FALSE check value for ASCII "123456789" is 0x29B1.
        assert_eq!(crc(b"123456789"), 0x29b1);
    }

    #[test]
    fn single_bit_flip_changes_crc() {
        let a = crc(b"Hello, world!");
        let mut corrupted = b"Hello, world!".to_vec();
        corrupted[0] ^= 0x01;
        let b = crc(&corrupted);
        assert_ne!(a, b);
    }

    #[test]
    fn deterministic_for_same_input() {
        let data = b"repeat me";
        assert_eq!(crc(data), crc(data));
    }
}
