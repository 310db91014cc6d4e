//! Per-submission record of which chunks the server has confirmed.

/// One bit per chunk (LSB of byte 0 = chunk 0), set when a chunk's test
/// reports it present or its upload is accepted.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChunkBitmap {
    bytes: Vec<u8>,
    len: usize,
    set: usize,
}

impl ChunkBitmap {
    pub(crate) fn new(len: usize) -> Self {
        ChunkBitmap {
            bytes: vec![0u8; (len + 7) / 8],
            len,
            set: 0,
        }
    }

    /// Set bit `index`. Returns true if it was not set before.
    pub(crate) fn confirm(&mut self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        let mask = 1u8 << (index % 8);
        let byte = &mut self.bytes[index / 8];
        if *byte & mask != 0 {
            return false;
        }
        *byte |= mask;
        self.set += 1;
        true
    }

    pub(crate) fn all_confirmed(&self) -> bool {
        self.len > 0 && self.set == self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_confirmed_after_every_bit() {
        let mut b = ChunkBitmap::new(10);
        for i in 0..10 {
            assert!(!b.all_confirmed());
            assert!(b.confirm(i));
        }
        assert!(b.all_confirmed());
        assert!(!b.confirm(9));
    }

    #[test]
    fn confirm_is_idempotent_and_bounded() {
        let mut b = ChunkBitmap::new(3);
        assert!(b.confirm(1));
        assert!(!b.confirm(1));
        assert!(!b.confirm(3));
        assert!(!b.all_confirmed());
        b.confirm(0);
        b.confirm(2);
        assert!(b.all_confirmed());
    }

    #[test]
    fn empty_bitmap_is_never_confirmed() {
        assert!(!ChunkBitmap::new(0).all_confirmed());
    }
}
