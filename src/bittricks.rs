// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
bit packing and alignment.

Shared by the sub-allocators and the version words.
*/

/// Rounds `value` up to a multiple of `alignment`.  An alignment of 0 or 1 is a no-op.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Smallest power of two that is `>= value`, with 1 for 0.
pub fn next_power_of_two(value: u32) -> u32 {
    value.max(1).next_power_of_two()
}

/// Packs a 3-bit field above a 60-bit field, with a flag in the top bit.
pub fn pack_flag_field_id(flag: bool, field: u64, id: u64) -> u64 {
    (if flag { 1 << 63 } else { 0 }) | ((field & 0x7) << 60) | (id & 0x0FFF_FFFF_FFFF_FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(13, 1), 13);
        assert_eq!(align_up(13, 0), 13);
    }

    #[test]
    fn pow2() {
        assert_eq!(next_power_of_two(0), 1);
        assert_eq!(next_power_of_two(5), 8);
        assert_eq!(next_power_of_two(1024), 1024);
    }

    #[test]
    fn pack() {
        assert_eq!(pack_flag_field_id(true, 0, 0), 0x8000_0000_0000_0000);
        assert_eq!(pack_flag_field_id(false, 2, 7), 0x2000_0000_0000_0007);
    }
}
