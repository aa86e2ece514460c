//! Dynamic bit vector with rank/select and position updates.
//!
//! Bits live in bounded chunks of packed words; two Fenwick trees (bits
//! per chunk, ones per chunk) answer locate queries in O(log chunks).
//! Inserting or removing a bit touches one chunk; chunks split when they
//! outgrow their bound and merge when they shrink, so updates stay
//! amortised-bounded while rank and select stay logarithmic.

use crate::fenwick::Fenwick;

const MAX_BITS: usize = 4096;
const MIN_BITS: usize = 512;

#[derive(Debug, Clone, Default)]
struct Chunk {
    words: Vec<u64>,
    len: usize,
}

fn select_in_word(mut word: u64, k: usize) -> usize {
    for _ in 0..k {
        word &= word - 1;
    }
    word.trailing_zeros() as usize
}

impl Chunk {
    fn new() -> Self {
        Chunk { words: Vec::new(), len: 0 }
    }

    fn get(&self, i: usize) -> bool {
        (self.words[i / 64] >> (i % 64)) & 1 == 1
    }

    fn set(&mut self, i: usize, bit: bool) {
        let mask = 1u64 << (i % 64);
        if bit {
            self.words[i / 64] |= mask;
        } else {
            self.words[i / 64] &= !mask;
        }
    }

    fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Ones in `[0, i)` within the chunk.
    fn rank1(&self, i: usize) -> usize {
        let w = i / 64;
        let off = i % 64;
        let mut ones: usize = self.words[..w].iter().map(|x| x.count_ones() as usize).sum();
        if off > 0 {
            ones += (self.words[w] & ((1u64 << off) - 1)).count_ones() as usize;
        }
        ones
    }

    /// Position of the k-th one within the chunk; the caller guarantees
    /// the chunk holds more than k ones.
    fn select1(&self, mut k: usize) -> usize {
        for (w, &word) in self.words.iter().enumerate() {
            let ones = word.count_ones() as usize;
            if k < ones {
                return w * 64 + select_in_word(word, k);
            }
            k -= ones;
        }
        unreachable!("select1 out of range within chunk")
    }

    /// Position of the k-th zero within the chunk.
    fn select0(&self, mut k: usize) -> usize {
        for (w, &word) in self.words.iter().enumerate() {
            let valid = (self.len - w * 64).min(64);
            let mask = if valid == 64 { !0u64 } else { (1u64 << valid) - 1 };
            let inverted = !word & mask;
            let zeros = inverted.count_ones() as usize;
            if k < zeros {
                return w * 64 + select_in_word(inverted, k);
            }
            k -= zeros;
        }
        unreachable!("select0 out of range within chunk")
    }

    fn insert(&mut self, i: usize, bit: bool) {
        if self.len % 64 == 0 {
            self.words.push(0);
        }
        let w = i / 64;
        let off = i % 64;
        let low_mask = if off == 0 { 0 } else { (1u64 << off) - 1 };
        let mut carry = self.words[w] >> 63;
        let low = self.words[w] & low_mask;
        let high = self.words[w] & !low_mask;
        self.words[w] = low | (high << 1) | ((bit as u64) << off);
        for word in self.words.iter_mut().skip(w + 1) {
            let next_carry = *word >> 63;
            *word = (*word << 1) | carry;
            carry = next_carry;
        }
        self.len += 1;
    }

    fn remove(&mut self, i: usize) -> bool {
        let bit = self.get(i);
        let w = i / 64;
        let off = i % 64;
        let low_mask = if off == 0 { 0 } else { (1u64 << off) - 1 };
        self.words[w] = (self.words[w] & low_mask) | ((self.words[w] >> 1) & !low_mask);
        for j in w + 1..self.words.len() {
            self.words[j - 1] |= (self.words[j] & 1) << 63;
            self.words[j] >>= 1;
        }
        self.len -= 1;
        if self.words.len() > (self.len + 63) / 64 {
            self.words.pop();
        }
        bit
    }

    fn push(&mut self, bit: bool) {
        let i = self.len;
        if i % 64 == 0 {
            self.words.push(0);
        }
        if bit {
            self.words[i / 64] |= 1u64 << (i % 64);
        }
        self.len += 1;
    }

    /// Split off the upper half at a word boundary.
    fn split(&mut self) -> Chunk {
        let mid_words = self.words.len() / 2;
        let mid = mid_words * 64;
        let upper_words = self.words.split_off(mid_words);
        let upper = Chunk {
            words: upper_words,
            len: self.len - mid,
        };
        self.len = mid;
        upper
    }
}

#[derive(Debug, Clone)]
pub struct DynBitVec {
    chunks: Vec<Chunk>,
    /// Bits per chunk.
    lens: Fenwick,
    /// Ones per chunk.
    ones: Fenwick,
    len: usize,
    num_ones: usize,
}

impl Default for DynBitVec {
    fn default() -> Self {
        Self::new()
    }
}

impl DynBitVec {
    pub fn new() -> Self {
        DynBitVec {
            chunks: vec![Chunk::new()],
            lens: Fenwick::from_slice(&[0]),
            ones: Fenwick::from_slice(&[0]),
            len: 0,
            num_ones: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn count_ones(&self) -> usize {
        self.num_ones
    }

    pub fn clear(&mut self) {
        *self = DynBitVec::new();
    }

    fn rebuild_index(&mut self) {
        let lens: Vec<u64> = self.chunks.iter().map(|c| c.len as u64).collect();
        let ones: Vec<u64> = self.chunks.iter().map(|c| c.count_ones() as u64).collect();
        self.lens = Fenwick::from_slice(&lens);
        self.ones = Fenwick::from_slice(&ones);
    }

    fn locate(&self, i: usize) -> (usize, usize) {
        let c = self.lens.search(i as u64).expect("bit index out of range");
        (c, i - self.lens.prefix(c) as usize)
    }

    pub fn get(&self, i: usize) -> bool {
        assert!(i < self.len, "bit index {} out of range (len {})", i, self.len);
        let (c, off) = self.locate(i);
        self.chunks[c].get(off)
    }

    pub fn set(&mut self, i: usize, bit: bool) {
        assert!(i < self.len, "bit index {} out of range (len {})", i, self.len);
        let (c, off) = self.locate(i);
        let old = self.chunks[c].get(off);
        if old == bit {
            return;
        }
        self.chunks[c].set(off, bit);
        let delta = if bit { 1 } else { -1 };
        self.ones.add(c, delta);
        self.num_ones = (self.num_ones as i64 + delta as i64) as usize;
    }

    pub fn insert(&mut self, i: usize, bit: bool) {
        assert!(i <= self.len, "bit index {} out of range (len {})", i, self.len);
        let (c, off) = if i == self.len {
            let c = self.chunks.len() - 1;
            (c, self.chunks[c].len)
        } else {
            self.locate(i)
        };
        self.chunks[c].insert(off, bit);
        self.lens.add(c, 1);
        if bit {
            self.ones.add(c, 1);
            self.num_ones += 1;
        }
        self.len += 1;
        if self.chunks[c].len > MAX_BITS {
            let upper = self.chunks[c].split();
            self.chunks.insert(c + 1, upper);
            self.rebuild_index();
        }
    }

    pub fn push(&mut self, bit: bool) {
        self.insert(self.len, bit);
    }

    pub fn remove(&mut self, i: usize) -> bool {
        assert!(i < self.len, "bit index {} out of range (len {})", i, self.len);
        let (c, off) = self.locate(i);
        let bit = self.chunks[c].remove(off);
        self.lens.add(c, -1);
        if bit {
            self.ones.add(c, -1);
            self.num_ones -= 1;
        }
        self.len -= 1;
        if self.chunks[c].len < MIN_BITS && self.chunks.len() > 1 {
            self.merge_at(c);
        }
        bit
    }

    /// Fold chunk `c` together with a neighbour, re-splitting if the
    /// result is too large.
    fn merge_at(&mut self, c: usize) {
        let (a, b) = if c + 1 < self.chunks.len() { (c, c + 1) } else { (c - 1, c) };
        let mut merged = Chunk::new();
        for i in 0..self.chunks[a].len {
            merged.push(self.chunks[a].get(i));
        }
        for i in 0..self.chunks[b].len {
            merged.push(self.chunks[b].get(i));
        }
        self.chunks.remove(b);
        if merged.len > MAX_BITS {
            let upper = merged.split();
            self.chunks[a] = merged;
            self.chunks.insert(a + 1, upper);
        } else {
            self.chunks[a] = merged;
        }
        self.rebuild_index();
    }

    /// Ones in `[0, i)`.
    pub fn rank1(&self, i: usize) -> usize {
        assert!(i <= self.len, "rank index {} out of range (len {})", i, self.len);
        if i == self.len {
            return self.num_ones;
        }
        let (c, off) = self.locate(i);
        self.ones.prefix(c) as usize + self.chunks[c].rank1(off)
    }

    /// Zeros in `[0, i)`.
    pub fn rank0(&self, i: usize) -> usize {
        i - self.rank1(i)
    }

    /// Position of the k-th one (0-based).
    pub fn select1(&self, k: usize) -> Option<usize> {
        if k >= self.num_ones {
            return None;
        }
        let c = self.ones.search(k as u64).expect("ones index desynced");
        let within = k - self.ones.prefix(c) as usize;
        Some(self.lens.prefix(c) as usize + self.chunks[c].select1(within))
    }

    /// Position of the k-th zero (0-based).
    pub fn select0(&self, k: usize) -> Option<usize> {
        if k >= self.len - self.num_ones {
            return None;
        }
        // Zeros per chunk are derived from the two indexes, so binary
        // search over chunk boundaries instead of keeping a third tree.
        let (mut lo, mut hi) = (0, self.chunks.len());
        while lo < hi {
            let mid = (lo + hi) / 2;
            let zeros_before = self.lens.prefix(mid) as usize - self.ones.prefix(mid) as usize;
            if zeros_before > k {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        let c = lo - 1;
        let within = k - (self.lens.prefix(c) as usize - self.ones.prefix(c) as usize);
        Some(self.lens.prefix(c) as usize + self.chunks[c].select0(within))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_push_get_rank() {
        let mut bv = DynBitVec::new();
        let pattern = [true, false, false, true, true, false, true];
        for &b in &pattern {
            bv.push(b);
        }
        assert_eq!(bv.len(), 7);
        assert_eq!(bv.count_ones(), 4);
        for (i, &b) in pattern.iter().enumerate() {
            assert_eq!(bv.get(i), b);
        }
        assert_eq!(bv.rank1(0), 0);
        assert_eq!(bv.rank1(4), 2);
        assert_eq!(bv.rank1(7), 4);
        assert_eq!(bv.rank0(7), 3);
    }

    #[test]
    fn test_select() {
        let mut bv = DynBitVec::new();
        for &b in &[true, false, false, true, true, false, true] {
            bv.push(b);
        }
        assert_eq!(bv.select1(0), Some(0));
        assert_eq!(bv.select1(1), Some(3));
        assert_eq!(bv.select1(2), Some(4));
        assert_eq!(bv.select1(3), Some(6));
        assert_eq!(bv.select1(4), None);
        assert_eq!(bv.select0(0), Some(1));
        assert_eq!(bv.select0(1), Some(2));
        assert_eq!(bv.select0(2), Some(5));
        assert_eq!(bv.select0(3), None);
    }

    #[test]
    fn test_insert_remove_middle() {
        let mut bv = DynBitVec::new();
        for _ in 0..10 {
            bv.push(false);
        }
        bv.insert(5, true);
        assert_eq!(bv.len(), 11);
        assert!(bv.get(5));
        assert_eq!(bv.rank1(11), 1);
        assert!(bv.remove(5));
        assert_eq!(bv.len(), 10);
        assert_eq!(bv.rank1(10), 0);
    }

    #[test]
    fn test_set_updates_rank() {
        let mut bv = DynBitVec::new();
        for _ in 0..100 {
            bv.push(false);
        }
        bv.set(42, true);
        bv.set(7, true);
        assert_eq!(bv.count_ones(), 2);
        assert_eq!(bv.rank1(43), 2);
        bv.set(42, false);
        assert_eq!(bv.count_ones(), 1);
    }

    #[test]
    fn test_against_reference_model() {
        let mut rng = StdRng::seed_from_u64(0xb17_5eed);
        let mut bv = DynBitVec::new();
        let mut model: Vec<bool> = Vec::new();
        for _ in 0..20_000 {
            let op = rng.gen_range(0..4);
            match op {
                0 => {
                    let i = rng.gen_range(0..=model.len());
                    let b = rng.gen_bool(0.5);
                    bv.insert(i, b);
                    model.insert(i, b);
                }
                1 if !model.is_empty() => {
                    let i = rng.gen_range(0..model.len());
                    assert_eq!(bv.remove(i), model.remove(i));
                }
                2 if !model.is_empty() => {
                    let i = rng.gen_range(0..model.len());
                    let b = rng.gen_bool(0.5);
                    bv.set(i, b);
                    model[i] = b;
                }
                _ => {
                    let b = rng.gen_bool(0.5);
                    bv.push(b);
                    model.push(b);
                }
            }
        }
        assert_eq!(bv.len(), model.len());
        let ones: Vec<usize> = model
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect();
        assert_eq!(bv.count_ones(), ones.len());
        let mut running = 0;
        for (i, &b) in model.iter().enumerate() {
            assert_eq!(bv.get(i), b);
            assert_eq!(bv.rank1(i), running);
            if b {
                running += 1;
            }
        }
        for (k, &pos) in ones.iter().enumerate() {
            assert_eq!(bv.select1(k), Some(pos));
        }
        let zeros: Vec<usize> = model
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| (!b).then_some(i))
            .collect();
        for (k, &pos) in zeros.iter().enumerate().step_by(17) {
            assert_eq!(bv.select0(k), Some(pos));
        }
    }
}
