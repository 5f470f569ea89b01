use bytes::Bytes;

/// A bitfield over piece indices.
///
/// Bit `i` set means the owning party has piece `i`. Bits are numbered from
/// the high bit of the first byte, matching the wire layout. Spare bits in
/// the last byte are always kept clear so that counting and complementing
/// stay exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    piece_count: usize,
}

impl Bitfield {
    /// Creates an empty bitfield for the given number of pieces.
    pub fn new(piece_count: usize) -> Self {
        let byte_count = piece_count.div_ceil(8);
        Self {
            bits: vec![0; byte_count],
            piece_count,
        }
    }

    /// Creates a full bitfield (every piece available).
    pub fn full(piece_count: usize) -> Self {
        let byte_count = piece_count.div_ceil(8);
        let mut bf = Self {
            bits: vec![0xFF; byte_count],
            piece_count,
        };
        bf.clear_spare_bits();
        bf
    }

    /// Creates a bitfield from raw wire bytes.
    ///
    /// Short input is zero-extended; excess bits beyond `piece_count` are
    /// cleared.
    pub fn from_bytes(bytes: Bytes, piece_count: usize) -> Self {
        let mut bits = bytes.to_vec();
        let expected_bytes = piece_count.div_ceil(8);

        bits.resize(expected_bytes, 0);

        let mut bf = Self { bits, piece_count };
        bf.clear_spare_bits();
        bf
    }

    /// Returns true if the piece at `index` is available.
    pub fn has_piece(&self, index: usize) -> bool {
        if index >= self.piece_count {
            return false;
        }
        let byte_index = index / 8;
        let bit_index = 7 - (index % 8);
        (self.bits[byte_index] >> bit_index) & 1 == 1
    }

    /// Sets the bit for the piece at `index`. Out-of-range indices are ignored.
    pub fn set_piece(&mut self, index: usize) {
        if index >= self.piece_count {
            return;
        }
        let byte_index = index / 8;
        let bit_index = 7 - (index % 8);
        self.bits[byte_index] |= 1 << bit_index;
    }

    /// Clears the bit for the piece at `index`.
    pub fn clear_piece(&mut self, index: usize) {
        if index >= self.piece_count {
            return;
        }
        let byte_index = index / 8;
        let bit_index = 7 - (index % 8);
        self.bits[byte_index] &= !(1 << bit_index);
    }

    /// Sets every piece bit.
    pub fn set_all(&mut self) {
        self.bits.fill(0xFF);
        self.clear_spare_bits();
    }

    /// Returns the number of available pieces.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Returns true if every piece is available.
    pub fn is_complete(&self) -> bool {
        self.count() == self.piece_count
    }

    /// Returns true if no piece is available.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    /// Returns the total number of pieces this bitfield covers.
    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    /// Returns the bitwise AND of two bitfields over the same piece count.
    pub fn intersection(&self, other: &Bitfield) -> Bitfield {
        debug_assert_eq!(self.piece_count, other.piece_count);
        let bits = self
            .bits
            .iter()
            .zip(&other.bits)
            .map(|(a, b)| a & b)
            .collect();
        Bitfield {
            bits,
            piece_count: self.piece_count,
        }
    }

    /// Returns the bitfield of pieces *not* available here.
    pub fn complement(&self) -> Bitfield {
        let mut bf = Bitfield {
            bits: self.bits.iter().map(|b| !b).collect(),
            piece_count: self.piece_count,
        };
        bf.clear_spare_bits();
        bf
    }

    /// Iterates the set piece indices in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.piece_count)
            .filter(|&i| self.has_piece(i))
            .map(|i| i as u32)
    }

    /// Returns the raw bytes of the bitfield.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Converts the bitfield to owned bytes.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bits)
    }

    /// Clears any spare bits in the last byte that don't correspond to pieces.
    fn clear_spare_bits(&mut self) {
        let spare = (self.bits.len() * 8) - self.piece_count;
        if spare > 0 && spare < 8 && !self.bits.is_empty() {
            let mask = 0xFFu8 << spare;
            let last = self.bits.len() - 1;
            self.bits[last] &= mask;
        }
    }
}
