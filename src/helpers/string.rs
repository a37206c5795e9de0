//! Little-endian conversion utilities for binary spreadsheet parsing.

/// Converts a byte slice into an iterator of 32-bit unsigned integers,
/// consuming the input in 4-byte little-endian chunks. A ragged tail, as
/// left by a sector truncated mid-entry, is dropped rather than decoded.
pub(crate) fn to_u32_iter(bytes: &[u8]) -> impl ExactSizeIterator<Item = u32> + '_ {
    bytes
        .chunks_exact(4)
        .map(|chunk| chunk.try_into().expect("[u8; 4]"))
        .map(u32::from_le_bytes)
}

/// Like [`to_u32_iter`] but widened to `usize`.
pub(crate) fn to_usize_iter(bytes: &[u8]) -> impl ExactSizeIterator<Item = usize> + '_ {
    to_u32_iter(bytes).map(|value| value.try_into().expect("usize"))
}

#[inline]
pub(crate) fn to_f64(s: &[u8]) -> f64 {
    f64::from_le_bytes(s[..8].try_into().expect("f64"))
}

#[inline]
pub(crate) fn to_u64(s: &[u8]) -> u64 {
    u64::from_le_bytes(s[..8].try_into().expect("u64"))
}

#[inline]
pub(crate) fn to_u32(s: &[u8]) -> u32 {
    u32::from_le_bytes(s[..4].try_into().expect("u32"))
}

#[inline]
pub(crate) fn to_u16(s: &[u8]) -> u16 {
    u16::from_le_bytes(s[..2].try_into().expect("u16"))
}

#[inline]
pub(crate) fn to_usize(s: &[u8]) -> usize {
    to_u32(s).try_into().expect("usize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_scalars() {
        assert_eq!(to_u16(&[0x01, 0x02]), 0x0201);
        assert_eq!(to_u32(&[0x01, 0x02, 0x03, 0x04]), 0x0403_0201);
        assert_eq!(to_u64(&[1, 0, 0, 0, 0, 0, 0, 0]), 1);
        assert_eq!(to_f64(&2.5f64.to_le_bytes()), 2.5);
    }

    #[test]
    fn iterators_chunk_in_fours() {
        let values: Vec<usize> = to_usize_iter(&[1, 0, 0, 0, 2, 0, 0, 0]).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn iterators_drop_a_ragged_tail() {
        let values: Vec<u32> = to_u32_iter(&[1, 0, 0, 0, 2, 0]).collect();
        assert_eq!(values, vec![1]);
    }
}
