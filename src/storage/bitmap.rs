//! Fixed-length bitmaps for row liveness and null tracking.
//!
//! Bit `i` lives in byte `i / 8` under mask `1 << (i % 8)`, the same packing
//! the existence table and column-store null maps are persisted with.
//! In a null bitmap a set bit means NULL.

/// A fixed-length bit vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    /// Packed bits, LSB-first within each byte.
    bytes: Vec<u8>,
    /// Number of valid bits.
    len: usize,
}

impl Bitmap {
    /// Create a bitmap of `len` bits, all clear.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len.div_ceil(8)],
            len,
        }
    }

    /// Create a bitmap of `len` bits, all set.
    pub fn filled(len: usize) -> Self {
        let mut bitmap = Self {
            bytes: vec![0xFFu8; len.div_ceil(8)],
            len,
        };
        bitmap.mask_tail();
        bitmap
    }

    /// Build from packed bytes. Bits beyond `len` are ignored; missing bytes
    /// are treated as clear.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Self {
        let mut packed = vec![0u8; len.div_ceil(8)];
        let n = packed.len().min(bytes.len());
        packed[..n].copy_from_slice(&bytes[..n]);
        let mut bitmap = Self { bytes: packed, len };
        bitmap.mask_tail();
        bitmap
    }

    /// Build a bitmap of `len` bits with the given positions set.
    ///
    /// # Panics
    /// Panics if a position is `>= len`.
    pub fn from_positions(len: usize, positions: &[usize]) -> Self {
        let mut bitmap = Self::new(len);
        for &pos in positions {
            bitmap.set(pos);
        }
        bitmap
    }

    fn mask_tail(&mut self) {
        let rem = self.len % 8;
        if rem != 0 {
            if let Some(last) = self.bytes.last_mut() {
                *last &= (1u8 << rem) - 1;
            }
        }
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length bitmap.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether bit `i` is set.
    ///
    /// # Panics
    /// Panics if `i >= len`.
    pub fn get(&self, i: usize) -> bool {
        assert!(i < self.len, "bit {} out of bounds ({})", i, self.len);
        self.bytes[i / 8] & (1u8 << (i % 8)) != 0
    }

    /// Set bit `i`.
    ///
    /// # Panics
    /// Panics if `i >= len`.
    pub fn set(&mut self, i: usize) {
        assert!(i < self.len, "bit {} out of bounds ({})", i, self.len);
        self.bytes[i / 8] |= 1u8 << (i % 8);
    }

    /// Clear bit `i`.
    ///
    /// # Panics
    /// Panics if `i >= len`.
    pub fn clear(&mut self, i: usize) {
        assert!(i < self.len, "bit {} out of bounds ({})", i, self.len);
        self.bytes[i / 8] &= !(1u8 << (i % 8));
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Position of the first set bit at or after `from`.
    pub fn next_set(&self, from: usize) -> Option<usize> {
        if from >= self.len {
            return None;
        }
        let mut byte_idx = from / 8;
        // Mask off bits below `from` in the first byte.
        let mut byte = self.bytes[byte_idx] & (0xFFu8 << (from % 8));
        loop {
            if byte != 0 {
                let pos = byte_idx * 8 + byte.trailing_zeros() as usize;
                return (pos < self.len).then_some(pos);
            }
            byte_idx += 1;
            if byte_idx >= self.bytes.len() {
                return None;
            }
            byte = self.bytes[byte_idx];
        }
    }

    /// Iterate set bit positions in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        let mut next = self.next_set(0);
        std::iter::from_fn(move || {
            let cur = next?;
            next = self.next_set(cur + 1);
            Some(cur)
        })
    }

    /// OR `other` into this bitmap starting at bit `offset`.
    ///
    /// Bits of `other` that would land beyond `len` are dropped.
    pub fn union_at(&mut self, offset: usize, other: &Bitmap) {
        if offset % 8 == 0 {
            let start = offset / 8;
            for (i, b) in other.bytes.iter().enumerate() {
                match self.bytes.get_mut(start + i) {
                    Some(dst) => *dst |= *b,
                    None => break,
                }
            }
            self.mask_tail();
        } else {
            for pos in other.iter_ones() {
                if offset + pos < self.len {
                    self.set(offset + pos);
                }
            }
        }
    }

    /// Set every bit in `range`.
    pub fn set_range(&mut self, range: std::ops::Range<usize>) {
        for i in range.start..range.end.min(self.len) {
            self.set(i);
        }
    }

    /// AND `other` into this bitmap. Bits past `other.len()` are cleared.
    pub fn intersect(&mut self, other: &Bitmap) {
        for (i, b) in self.bytes.iter_mut().enumerate() {
            *b &= other.bytes.get(i).copied().unwrap_or(0);
        }
        if other.len < self.len {
            for i in other.len..self.len {
                self.clear(i);
            }
        }
    }

    /// Packed byte representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_clear() {
        let bm = Bitmap::new(64);
        assert_eq!(bm.len(), 64);
        assert_eq!(bm.count_ones(), 0);
        assert_eq!(bm.next_set(0), None);
    }

    #[test]
    fn test_filled_masks_tail() {
        let bm = Bitmap::filled(10);
        assert_eq!(bm.count_ones(), 10);
        assert_eq!(bm.as_bytes(), &[0xFF, 0x03]);
    }

    #[test]
    fn test_lsb_first_packing() {
        let bm = Bitmap::from_positions(16, &[0, 5, 9]);
        assert_eq!(bm.as_bytes(), &[0b0010_0001, 0b0000_0010]);
        assert!(bm.get(5));
        assert!(!bm.get(4));
    }

    #[test]
    fn test_next_set_and_iter() {
        let bm = Bitmap::from_positions(64, &[0, 5, 63]);
        assert_eq!(bm.next_set(0), Some(0));
        assert_eq!(bm.next_set(1), Some(5));
        assert_eq!(bm.next_set(6), Some(63));
        assert_eq!(bm.next_set(64), None);
        assert_eq!(bm.iter_ones().collect::<Vec<_>>(), vec![0, 5, 63]);
    }

    #[test]
    fn test_union_at_aligned_and_unaligned() {
        let mut bm = Bitmap::new(32);
        bm.union_at(8, &Bitmap::from_positions(8, &[0, 7]));
        assert!(bm.get(8));
        assert!(bm.get(15));

        bm.union_at(3, &Bitmap::from_positions(4, &[1]));
        assert!(bm.get(4));
        assert_eq!(bm.count_ones(), 3);
    }

    #[test]
    fn test_union_at_drops_overflow() {
        let mut bm = Bitmap::new(8);
        bm.union_at(8, &Bitmap::filled(8));
        assert_eq!(bm.count_ones(), 0);
    }

    #[test]
    fn test_intersect() {
        let mut bm = Bitmap::from_positions(16, &[1, 2, 3, 12]);
        bm.intersect(&Bitmap::from_positions(16, &[2, 12, 13]));
        assert_eq!(bm.iter_ones().collect::<Vec<_>>(), vec![2, 12]);
    }

    #[test]
    fn test_from_bytes_short_input() {
        let bm = Bitmap::from_bytes(&[0x01], 16);
        assert_eq!(bm.len(), 16);
        assert_eq!(bm.iter_ones().collect::<Vec<_>>(), vec![0]);
    }
}
