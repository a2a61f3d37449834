//! Pure helpers behind computed fields.

/// Seconds between the Unix epoch and the Garmin epoch (1989-12-31T00:00:00Z).
pub const GARMIN_EPOCH_OFFSET: u32 = 631_065_600;

/// Mask with the low `bits` bits set.
pub const fn low_mask(bits: u8) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Reconstruct a truncated rolling value against a known absolute value.
///
/// The low `bits` of `absolute` are replaced by the low `bits` of `short`;
/// the high-order bits of `absolute` are kept unchanged.
pub const fn reconstruct_rolling(absolute: u64, short: u64, bits: u8) -> u64 {
    let mask = low_mask(bits);
    (absolute & !mask) | (short & mask)
}

/// Extract `width` bits of `raw` starting at bit `shift`.
pub const fn bit_slice(raw: u64, shift: u8, width: u8) -> u64 {
    if shift >= 64 {
        return 0;
    }
    (raw >> shift) & low_mask(width)
}

/// Convert a Garmin timestamp to Unix seconds.
pub const fn garmin_to_unix(garmin: u32) -> u32 {
    garmin.wrapping_add(GARMIN_EPOCH_OFFSET)
}

/// Convert Unix seconds to a Garmin timestamp.
pub const fn unix_to_garmin(unix: u32) -> u32 {
    unix.wrapping_sub(GARMIN_EPOCH_OFFSET)
}
