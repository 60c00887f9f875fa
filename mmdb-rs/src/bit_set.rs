//! Small-universe integer sets used for the variable bookkeeping of the
//! verifier.
//!
//! Each proof step carries the set of frame variables occurring in its
//! formula, so that disjoint-variable conditions can be checked without
//! rescanning substituted formulas.  Variable indices are dense and almost
//! always below the word size, so the first word is stored inline and only
//! larger indices spill into a boxed tail.

use std::ops::BitOrAssign;
use std::slice;

const WORD_BITS: usize = usize::BITS as usize;

/// A set of variable indices.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Bitset {
    head: usize,
    #[allow(clippy::box_collection)]
    tail: Option<Box<Vec<usize>>>,
}

impl Bitset {
    /// Creates a new empty `Bitset`.  Does not allocate.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: 0,
            tail: None,
        }
    }

    fn tail(&self) -> &[usize] {
        self.tail.as_deref().map_or(&[], Vec::as_slice)
    }

    fn tail_mut(&mut self) -> &mut Vec<usize> {
        self.tail.get_or_insert_with(Box::default)
    }

    /// Adds a single index to the set.
    pub fn set_bit(&mut self, bit: usize) {
        if bit < WORD_BITS {
            self.head |= 1 << bit;
        } else {
            let word = bit / WORD_BITS - 1;
            let tail = self.tail_mut();
            if word >= tail.len() {
                tail.resize(word + 1, 0);
            }
            tail[word] |= 1 << (bit % WORD_BITS);
        }
    }

    /// Tests the set for a specific index.
    #[must_use]
    pub fn has_bit(&self, bit: usize) -> bool {
        if bit < WORD_BITS {
            (self.head & (1 << bit)) != 0
        } else {
            let word = bit / WORD_BITS - 1;
            let tail = self.tail();
            word < tail.len() && (tail[word] & (1 << (bit % WORD_BITS))) != 0
        }
    }

    /// Returns an iterator over the indices in the set, in increasing order.
    #[must_use]
    pub fn iter(&self) -> BitsetIter<'_> {
        self.into_iter()
    }
}

impl<'a> BitOrAssign<&'a Bitset> for Bitset {
    fn bitor_assign(&mut self, rhs: &'a Bitset) {
        self.head |= rhs.head;
        let rtail = rhs.tail();
        if !rtail.is_empty() {
            let stail = self.tail_mut();
            if rtail.len() > stail.len() {
                stail.resize(rtail.len(), 0);
            }
            for (dst, src) in stail.iter_mut().zip(rtail) {
                *dst |= *src;
            }
        }
    }
}

impl<'a> IntoIterator for &'a Bitset {
    type Item = usize;
    type IntoIter = BitsetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        BitsetIter {
            bits: self.head,
            offset: 0,
            buffer: self.tail().iter(),
        }
    }
}

/// Iterator for the indices of a bitset.
#[derive(Debug)]
pub struct BitsetIter<'a> {
    bits: usize,
    offset: usize,
    buffer: slice::Iter<'a, usize>,
}

impl Iterator for BitsetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        while self.bits == 0 {
            self.bits = *self.buffer.next()?;
            self.offset += WORD_BITS;
        }
        let tz = self.bits.trailing_zeros() as usize;
        self.bits &= self.bits - 1;
        Some(tz + self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::Bitset;

    #[test]
    fn spills_into_tail() {
        let mut set = Bitset::new();
        assert_eq!(set.iter().next(), None);
        set.set_bit(3);
        set.set_bit(200);
        assert!(set.has_bit(200));
        assert!(!set.has_bit(199));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 200]);

        let mut other = Bitset::new();
        other.set_bit(70);
        other |= &set;
        assert_eq!(other.iter().collect::<Vec<_>>(), vec![3, 70, 200]);
    }
}
