//! Dynamic wavelet tree over `u64` symbols.
//!
//! The tree partitions symbols bit by bit from the most significant bit
//! of the current symbol width down to bit 0; each level stores one
//! [`DynBitVec`]. Access, rank, select, insert, and remove all walk one
//! root-to-leaf path, so every operation costs O(width · log n). The
//! width grows on demand: inserting a symbol outside the current range
//! rebuilds the tree with roughly twice the bits, which amortises away.

use crate::bitvec::DynBitVec;

#[derive(Debug, Clone, Default)]
struct Node {
    bv: DynBitVec,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn child(&self, bit: bool) -> Option<&Node> {
        if bit {
            self.right.as_deref()
        } else {
            self.left.as_deref()
        }
    }

    fn child_mut(&mut self, bit: bool) -> &mut Node {
        let slot = if bit { &mut self.right } else { &mut self.left };
        slot.get_or_insert_with(Box::default)
    }
}

#[derive(Debug, Clone)]
pub struct DynWavelet {
    root: Node,
    /// Bits per symbol; symbols must satisfy `c < 1 << width`.
    width: u32,
}

impl Default for DynWavelet {
    fn default() -> Self {
        Self::new()
    }
}

impl DynWavelet {
    pub fn new() -> Self {
        DynWavelet { root: Node::default(), width: 4 }
    }

    pub fn len(&self) -> usize {
        self.root.bv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.root = Node::default();
        self.width = 4;
    }

    /// Symbol at position `i`.
    pub fn access(&self, i: usize) -> u64 {
        assert!(i < self.len(), "wavelet index {} out of range (len {})", i, self.len());
        let mut node = &self.root;
        let mut pos = i;
        let mut symbol = 0u64;
        for level in (0..self.width).rev() {
            let bit = node.bv.get(pos);
            symbol |= (bit as u64) << level;
            pos = if bit { node.bv.rank1(pos) } else { node.bv.rank0(pos) };
            if level > 0 {
                node = node.child(bit).expect("wavelet child missing on occupied path");
            }
        }
        symbol
    }

    /// `true` if `c` is representable at the current symbol width.
    fn fits(&self, c: u64) -> bool {
        self.width >= 64 || c >> self.width == 0
    }

    /// Occurrences of `c` in `[0, i)`.
    pub fn rank(&self, c: u64, i: usize) -> usize {
        assert!(i <= self.len(), "rank index {} out of range (len {})", i, self.len());
        if !self.fits(c) {
            return 0;
        }
        let mut node = &self.root;
        let mut pos = i;
        for level in (0..self.width).rev() {
            let bit = (c >> level) & 1 == 1;
            pos = if bit { node.bv.rank1(pos) } else { node.bv.rank0(pos) };
            if pos == 0 {
                return 0;
            }
            if level > 0 {
                match node.child(bit) {
                    Some(child) => node = child,
                    None => return 0,
                }
            }
        }
        pos
    }

    /// Total occurrences of `c`.
    pub fn count(&self, c: u64) -> usize {
        self.rank(c, self.len())
    }

    /// Position of the k-th occurrence of `c` (0-based).
    pub fn select(&self, c: u64, k: usize) -> Option<usize> {
        if !self.fits(c) {
            return None;
        }
        Self::select_in(&self.root, self.width - 1, c, k)
    }

    fn select_in(node: &Node, level: u32, c: u64, k: usize) -> Option<usize> {
        let bit = (c >> level) & 1 == 1;
        let k = if level == 0 {
            k
        } else {
            Self::select_in(node.child(bit)?, level - 1, c, k)?
        };
        if bit {
            node.bv.select1(k)
        } else {
            node.bv.select0(k)
        }
    }

    /// Insert `c` before position `i`.
    pub fn insert(&mut self, i: usize, c: u64) {
        assert!(i <= self.len(), "wavelet index {} out of range (len {})", i, self.len());
        if !self.fits(c) {
            self.grow(c);
        }
        let mut node = &mut self.root;
        let mut pos = i;
        for level in (0..self.width).rev() {
            let bit = (c >> level) & 1 == 1;
            let child_pos = if bit { node.bv.rank1(pos) } else { node.bv.rank0(pos) };
            node.bv.insert(pos, bit);
            pos = child_pos;
            if level > 0 {
                node = node.child_mut(bit);
            }
        }
    }

    pub fn push(&mut self, c: u64) {
        self.insert(self.len(), c);
    }

    /// Remove and return the symbol at position `i`.
    pub fn remove(&mut self, i: usize) -> u64 {
        assert!(i < self.len(), "wavelet index {} out of range (len {})", i, self.len());
        let mut node = &mut self.root;
        let mut pos = i;
        let mut symbol = 0u64;
        for level in (0..self.width).rev() {
            let bit = node.bv.remove(pos);
            symbol |= (bit as u64) << level;
            pos = if bit { node.bv.rank1(pos) } else { node.bv.rank0(pos) };
            if level > 0 {
                node = node.child_mut(bit);
            }
        }
        symbol
    }

    /// Overwrite position `i` with `c`.
    pub fn set(&mut self, i: usize, c: u64) {
        self.remove(i);
        self.insert(i, c);
    }

    /// Widen the symbol range to cover `c`, rebuilding the tree.
    fn grow(&mut self, c: u64) {
        let needed = 64 - c.leading_zeros();
        let new_width = needed.max(self.width * 2).min(64);
        let symbols: Vec<u64> = (0..self.len()).map(|i| self.access(i)).collect();
        self.root = Node::default();
        self.width = new_width;
        for (i, &s) in symbols.iter().enumerate() {
            self.insert(i, s);
        }
    }
}
