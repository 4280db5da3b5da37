//! Sub-byte field packing for the one byte in each packet shape that
//! carries more than one field (the discriminant byte of long headers,
//! short headers, and ACK packets).
//!
//! Everything past the first byte is byte-granular and big-endian; only
//! this byte ever needs bit-level packing, so this is two free functions
//! rather than a generic bit-level view over arbitrary integers.

/// Splits `source` into groups of bits, most-significant group first,
/// matching the field order fields are documented in (e.g. `header_form`
/// then `fixed` then `packet_type` ...). `lens` must sum to 8.
pub fn decompose_bits(source: u8, lens: &[u8]) -> Vec<u8> {
    debug_assert_eq!(lens.iter().sum::<u8>(), 8, "bit groups must cover a byte");
    let mut groups = Vec::with_capacity(lens.len());
    let mut shift = 8;
    for &len in lens {
        shift -= len;
        let mask = ((1u16 << len) - 1) as u8;
        groups.push((source >> shift) & mask);
    }
    groups
}

/// Inverse of [`decompose_bits`]: packs `(value, width)` pairs back into a
/// single byte, most-significant group first.
pub fn compose_bits(groups: &[(u8, u8)]) -> u8 {
    debug_assert_eq!(
        groups.iter().map(|(_, len)| *len).sum::<u8>(),
        8,
        "bit groups must cover a byte"
    );
    let mut byte = 0u8;
    for &(value, len) in groups {
        byte <<= len;
        let mask = ((1u16 << len) - 1) as u8;
        byte |= value & mask;
    }
    byte
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_long_header_byte() {
        // header_form(1) fixed(1) packet_type(2) reserved(2) pn_length(2)
        let lens = [1u8, 1, 2, 2, 2];
        for byte in 0u8..=255 {
            let groups = decompose_bits(byte, &lens);
            let paired: Vec<(u8, u8)> = groups.iter().copied().zip(lens.iter().copied()).collect();
            assert_eq!(compose_bits(&paired), byte);
        }
    }

    #[test]
    fn splits_known_value() {
        // 0b1_1_01_00_10 -> header_form=1 fixed=1 packet_type=01 reserved=00 pn_length=10
        let byte = 0b1101_0010;
        let groups = decompose_bits(byte, &[1, 1, 2, 2, 2]);
        assert_eq!(groups, vec![1, 1, 0b01, 0b00, 0b10]);
    }
}
