// SPDX-License-Identifier: MIT

//! CRC-16 as used by the FIT file format (trailing checksum and the
//! optional header checksum). Nibble-at-a-time table variant.

const CRC_TABLE: [u16; 16] = [
    0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401,
    0xA001, 0x6C00, 0x7800, 0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
];

/// Compute the FIT CRC-16 over a byte slice.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        let tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc = crc ^ tmp ^ CRC_TABLE[(byte & 0xF) as usize];

        let tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc = crc ^ tmp ^ CRC_TABLE[((byte >> 4) & 0xF) as usize];
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn test_known_vector() {
        // Reference value for "123456789" under the FIT polynomial
        // (reflected CRC-16/ARC).
        assert_eq!(crc16(b"123456789"), 0xBB3D);
    }

    #[test]
    fn test_crc_detects_corruption() {
        let original = b"\x0e\x20\x56\x08\x10\x00\x00\x00.FIT";
        let mut corrupted = original.to_vec();
        corrupted[4] ^= 0x01;
        assert_ne!(crc16(original), crc16(&corrupted));
    }
}
