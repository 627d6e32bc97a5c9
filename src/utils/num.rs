//! Narrowing/widening helpers used at the frame-length boundaries in the
//! WAL and UArr codecs, so casts are checked once instead of scattered
//! `as` conversions through the I/O paths.

#[must_use]
pub fn usize_to_u64(v: usize) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

#[must_use]
pub fn u64_to_usize(v: u64) -> Option<usize> {
    usize::try_from(v).ok()
}

#[must_use]
pub fn u32_to_usize(v: u32) -> usize {
    v as usize
}
