//! A persistent, content-addressed store of symbol strings.
//!
//! This follows the "dynamic strings" of Alstrup, Brodal and Rauhe.  Every
//! string is a balanced tree whose shape is a function of its contents alone,
//! and every node is interned.  Two strings with the same contents built from
//! the same store are the same [`NodeRef`], no matter which sequence of
//! [`StringStore::concat`] and [`StringStore::split`] calls produced them, so
//! equality is a single integer comparison.
//!
//! # Levels
//!
//! A string is processed bottom-up.  At level 0 the sequence is the string's
//! symbols.  At each level, maximal runs of equal elements are first replaced
//! by `Run` nodes, so adjacent elements always differ; the sequence is then
//! cut into blocks of at least two elements, and each block becomes a `Seg`
//! node of the next level.  The process stops at the first level with a
//! single element, which is the root.
//!
//! Where blocks start is decided by three rounds of deterministic coin
//! tossing.  Every node gets a 31-bit codeword of weight 15 when it is
//! created.  Round one maps each element to the lowest bit set in its code but
//! clear in its left neighbor's, a number below 31; round two does the same
//! with those numbers written as 3-of-7 codewords, giving a number below 7;
//! adjacent results differ after each round.  A block starts at every local
//! maximum of the second round.  The decision for an element thus depends on
//! three elements to its left and one to its right, and nothing else.
//!
//! # Concatenation and splitting
//!
//! Because block starts are local, joining two strings only changes the
//! blocks near the junction.  [`StringStore::concat`] walks up the levels with
//! the spines of both operands: at each level it unpacks just enough nodes at
//! the inner edges to find a block start which cannot have moved, re-cuts the
//! elements between the two, and carries the new blocks to the next level.
//! Splitting collects the nodes left and right of the cut on the way down and
//! then rebuilds both halves the same way.  Both touch a bounded number of
//! nodes per level.
//!
//! Lengths and repeat counts are [`BigUint`], so a string doubled a hundred
//! times costs a few hundred nodes.

use crate::util::HashMap;
use num::{BigUint, Integer, One, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::fmt::Write;
use tinyvec::TinyVec;

/// Elements to the left of a position which decide whether a block starts
/// there.
const LEFT_CONTEXT: usize = 3;
/// Elements to the right of a position which decide whether a block starts
/// there.
const RIGHT_CONTEXT: usize = 1;
/// Trailing elements of a left operand which are re-cut on concatenation.
const TAIL_WINDOW: usize = 2 + RIGHT_CONTEXT;
/// Leading elements of a right operand which are re-cut on concatenation.
const HEAD_WINDOW: usize = 1 + LEFT_CONTEXT;

/// The smallest 31-bit word of weight 15.
const FIRST_COLOR: u32 = (1 << 15) - 1;
const COLOR_LIMIT: u32 = 1 << 31;

/// The 7-bit words of weight 3, in increasing order.
static CODE37: [u8; 35] = [
    7, 11, 13, 14, 19, 21, 22, 25, 26, 28, 35, 37, 38, 41, 42, 44, 49, 50, 52, 56, 67, 69, 70, 73,
    74, 76, 81, 82, 84, 88, 97, 98, 100, 104, 112,
];

/// A string, or a node of one, in a [`StringStore`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(u32);

impl NodeRef {
    /// The empty string.
    pub const EMPTY: NodeRef = NodeRef(0);

    /// The position of the node in its store.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Shape {
    Empty,
    Leaf(u32),
    /// The child repeated at least twice.  The child is never itself a run.
    Run(NodeRef, BigUint),
    /// A block of at least two elements of the level below.
    Seg(Box<[NodeRef]>),
}

#[derive(Debug)]
struct Node {
    shape: Shape,
    height: u32,
    len: BigUint,
    color: u32,
}

/// Lowest bit set in `cur` and clear in `prev`.
#[allow(clippy::cast_possible_truncation)]
const fn reduce(prev: u32, cur: u32) -> u8 {
    (cur & !prev).trailing_zeros() as u8
}

/// An interning store for strings of `u32` symbols.
///
/// A store only grows; nodes are never freed.  It is meant to live for one
/// verification run.
#[derive(Debug)]
pub struct StringStore {
    nodes: Vec<Node>,
    leaves: HashMap<u32, NodeRef>,
    runs: HashMap<(NodeRef, BigUint), NodeRef>,
    segs: HashMap<Box<[NodeRef]>, NodeRef>,
    next_color: u32,
}

impl Default for StringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StringStore {
    /// Creates a store holding only the empty string.
    #[must_use]
    pub fn new() -> Self {
        let mut store = StringStore {
            nodes: Vec::new(),
            leaves: HashMap::default(),
            runs: HashMap::default(),
            segs: HashMap::default(),
            next_color: FIRST_COLOR,
        };
        store.add(Shape::Empty, 0, BigUint::zero());
        store
    }

    /// Number of nodes created so far.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn add(&mut self, shape: Shape, height: u32, len: BigUint) -> NodeRef {
        let color = self.next_color;
        assert!(color < COLOR_LIMIT, "string store ran out of node codes");
        // Gosper's hack: the next larger word with the same number of bits
        let low = color & color.wrapping_neg();
        let ripple = color + low;
        self.next_color = ripple + (((ripple ^ color) / low) >> 2);
        #[allow(clippy::cast_possible_truncation)]
        let id = NodeRef(self.nodes.len() as u32);
        self.nodes.push(Node {
            shape,
            height,
            len,
            color,
        });
        id
    }

    fn height(&self, node: NodeRef) -> u32 {
        self.nodes[node.index()].height
    }

    fn len(&self, node: NodeRef) -> &BigUint {
        &self.nodes[node.index()].len
    }

    fn color(&self, node: NodeRef) -> u32 {
        self.nodes[node.index()].color
    }

    /// The empty string.
    #[must_use]
    pub const fn empty(&self) -> NodeRef {
        NodeRef::EMPTY
    }

    /// The string of one symbol.
    pub fn singleton(&mut self, value: u32) -> NodeRef {
        if let Some(&node) = self.leaves.get(&value) {
            return node;
        }
        let node = self.add(Shape::Leaf(value), 0, BigUint::one());
        self.leaves.insert(value, node);
        node
    }

    fn run(&mut self, base: NodeRef, count: BigUint) -> NodeRef {
        debug_assert!(!count.is_zero());
        if count.is_one() {
            return base;
        }
        let key = (base, count);
        if let Some(&node) = self.runs.get(&key) {
            return node;
        }
        let len = self.len(base) * &key.1;
        let node = self.add(Shape::Run(base, key.1.clone()), self.height(base), len);
        self.runs.insert(key, node);
        node
    }

    fn seg(&mut self, children: &[NodeRef]) -> NodeRef {
        debug_assert!(children.len() >= 2);
        if let Some(&node) = self.segs.get(children) {
            return node;
        }
        let len: BigUint = children.iter().map(|&child| self.len(child)).sum();
        let node = self.add(
            Shape::Seg(children.into()),
            self.height(children[0]) + 1,
            len,
        );
        self.segs.insert(children.into(), node);
        node
    }

    /// Splits a node into its base and repeat count.
    fn parts(&self, node: NodeRef) -> (NodeRef, BigUint) {
        match &self.nodes[node.index()].shape {
            Shape::Run(base, count) => (*base, count.clone()),
            _ => (node, BigUint::one()),
        }
    }

    fn run_length(&mut self, elements: Vec<NodeRef>) -> Vec<NodeRef> {
        let mut merged: Vec<(NodeRef, BigUint)> = Vec::with_capacity(elements.len());
        for element in elements {
            let (base, count) = self.parts(element);
            match merged.last_mut() {
                Some((last, total)) if *last == base => *total += count,
                _ => merged.push((base, count)),
            }
        }
        merged
            .into_iter()
            .map(|(base, count)| self.run(base, count))
            .collect()
    }

    /// Replaces a node by the elements one level down, or a run by a copy of
    /// its base and the remaining run.
    fn expand(&mut self, piece: NodeRef, front: bool) -> Vec<NodeRef> {
        match &self.nodes[piece.index()].shape {
            Shape::Seg(children) => children.to_vec(),
            Shape::Run(base, count) => {
                let base = *base;
                let rest = count.clone() - 1u32;
                let rest = self.run(base, rest);
                if front {
                    vec![base, rest]
                } else {
                    vec![rest, base]
                }
            }
            Shape::Empty | Shape::Leaf(_) => unreachable!("level 0 elements are never expanded"),
        }
    }

    /// Unpacks the right end of `pieces` until at least `want` elements of
    /// `level` are at its end, or everything is unpacked.  Returns the number
    /// of trailing elements of `level`.
    ///
    /// `pieces` must have non-increasing heights, all at least `level`.
    fn fill_tail(&mut self, pieces: &mut Vec<NodeRef>, level: u32, want: usize) -> usize {
        loop {
            let tail = pieces
                .iter()
                .rev()
                .take_while(|&&piece| self.height(piece) == level)
                .count();
            if tail >= want || tail == pieces.len() {
                return tail;
            }
            let ix = pieces.len() - tail - 1;
            let expanded = self.expand(pieces[ix], false);
            pieces.splice(ix..=ix, expanded);
        }
    }

    /// Mirror image of [`Self::fill_tail`] for the left end.
    fn fill_head(&mut self, pieces: &mut Vec<NodeRef>, level: u32, want: usize) -> usize {
        loop {
            let head = pieces
                .iter()
                .take_while(|&&piece| self.height(piece) == level)
                .count();
            if head >= want || head == pieces.len() {
                return head;
            }
            let expanded = self.expand(pieces[head], true);
            pieces.splice(head..=head, expanded);
        }
    }

    /// The last `count` elements of `level` in the expansion of `pieces`.
    fn peek_back(&mut self, pieces: &[NodeRef], level: u32, count: usize) -> Vec<NodeRef> {
        let mut scratch = pieces[pieces.len().saturating_sub(count)..].to_vec();
        let tail = self.fill_tail(&mut scratch, level, count);
        scratch.split_off(scratch.len() - tail.min(count))
    }

    /// The first element of `level` in the expansion of `pieces`.
    fn peek_front(&mut self, pieces: &[NodeRef], level: u32) -> NodeRef {
        let mut scratch = vec![pieces[0]];
        self.fill_head(&mut scratch, level, 1);
        scratch[0]
    }

    /// Cuts `window` into blocks.  `before` holds the elements preceding the
    /// window, either none at the start of the string or exactly
    /// `LEFT_CONTEXT`; `after` is the element following it, if any.  The
    /// first element of the window always starts a block.
    fn segment(&mut self, before: &[NodeRef], window: &[NodeRef], after: Option<NodeRef>) -> Vec<NodeRef> {
        let full: Vec<NodeRef> = before
            .iter()
            .chain(window)
            .copied()
            .chain(after)
            .collect();
        let mut first: TinyVec<[u8; 32]> = TinyVec::with_capacity(full.len());
        first.push(0);
        for pair in full.windows(2) {
            first.push(reduce(self.color(pair[0]), self.color(pair[1])));
        }
        let mut second: TinyVec<[u8; 32]> = TinyVec::with_capacity(full.len());
        for ix in 0..full.len() {
            second.push(if ix < 2 {
                0
            } else {
                reduce(
                    u32::from(CODE37[first[ix - 1] as usize]),
                    u32::from(CODE37[first[ix] as usize]),
                )
            });
        }

        let offset = before.len();
        let mut blocks = Vec::new();
        let mut block = Vec::new();
        for (ix, &element) in window.iter().enumerate() {
            let at = offset + ix;
            let starts = ix == 0
                || (at >= LEFT_CONTEXT
                    && at + 1 < full.len()
                    && second[at] > second[at - 1]
                    && second[at] > second[at + 1]);
            if starts && !block.is_empty() {
                blocks.push(self.seg(&block));
                block.clear();
            }
            block.push(element);
        }
        if !block.is_empty() {
            blocks.push(self.seg(&block));
        }
        blocks
    }

    /// Builds the string made of the expansion of `left`, then `middle`, then
    /// the expansion of `right`.
    ///
    /// `left` is a prefix of some string's spine: nodes of non-increasing
    /// height whose expansions are whole blocks of that string.  `right` is
    /// the suffix counterpart, with non-decreasing heights.  `middle` holds
    /// elements of level 0.
    fn rebuild(&mut self, mut left: Vec<NodeRef>, mut middle: Vec<NodeRef>, mut right: Vec<NodeRef>) -> NodeRef {
        let mut level = 0;
        loop {
            let tail = self.fill_tail(&mut left, level, TAIL_WINDOW);
            let head = self.fill_head(&mut right, level, HEAD_WINDOW);
            let mut window = left.split_off(left.len() - tail);
            window.append(&mut middle);
            window.extend(right.drain(..head));
            let window = self.run_length(window);
            if left.is_empty() && right.is_empty() && window.len() <= 1 {
                return window.first().copied().unwrap_or(NodeRef::EMPTY);
            }
            let before = if left.is_empty() {
                Vec::new()
            } else {
                self.peek_back(&left, level, LEFT_CONTEXT)
            };
            let after = if right.is_empty() {
                None
            } else {
                Some(self.peek_front(&right, level))
            };
            middle = self.segment(&before, &window, after);
            level += 1;
        }
    }

    /// Builds a string from its symbols.
    pub fn from_array(&mut self, values: &[u32]) -> NodeRef {
        let leaves = values.iter().map(|&value| self.singleton(value)).collect();
        self.rebuild(Vec::new(), leaves, Vec::new())
    }

    /// The symbols of a string.
    #[must_use]
    pub fn to_array(&self, string: NodeRef) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = vec![(string, 1usize)];
        while let Some((node, reps)) = stack.pop() {
            if reps > 1 {
                stack.push((node, reps - 1));
            }
            match &self.nodes[node.index()].shape {
                Shape::Empty => {}
                Shape::Leaf(value) => out.push(*value),
                Shape::Run(base, count) => stack.push((*base, count.to_usize().unwrap_or(usize::MAX))),
                Shape::Seg(children) => stack.extend(children.iter().rev().map(|&child| (child, 1))),
            }
        }
        out
    }

    /// The concatenation of two strings.
    pub fn concat(&mut self, a: NodeRef, b: NodeRef) -> NodeRef {
        if a == NodeRef::EMPTY {
            return b;
        }
        if b == NodeRef::EMPTY {
            return a;
        }
        self.rebuild(vec![a], Vec::new(), vec![b])
    }

    /// Splits a string before the symbol at `index`.
    ///
    /// ## Panics
    /// Panics if `index` is greater than the length of the string.
    pub fn split(&mut self, string: NodeRef, index: usize) -> (NodeRef, NodeRef) {
        self.split_big(string, &BigUint::from(index))
    }

    /// [`Self::split`] for arbitrarily long strings.
    ///
    /// ## Panics
    /// Panics if `index` is greater than the length of the string.
    pub fn split_big(&mut self, string: NodeRef, index: &BigUint) -> (NodeRef, NodeRef) {
        let total = self.len(string);
        assert!(index <= total, "split index {index} out of range for length {total}");
        if index.is_zero() {
            return (NodeRef::EMPTY, string);
        }
        if index == total {
            return (string, NodeRef::EMPTY);
        }

        // `right` is collected back to front
        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut node = string;
        let mut offset = index.clone();
        loop {
            if offset.is_zero() {
                right.push(node);
                break;
            }
            match self.nodes[node.index()].shape.clone() {
                Shape::Run(base, count) => {
                    let (whole, rest) = offset.div_rem(self.len(base));
                    if !whole.is_zero() {
                        let copies = self.run(base, whole.clone());
                        left.push(copies);
                    }
                    if rest.is_zero() {
                        let copies = self.run(base, count - &whole);
                        right.push(copies);
                        break;
                    }
                    let after = count - &whole - 1u32;
                    if !after.is_zero() {
                        let copies = self.run(base, after);
                        right.push(copies);
                    }
                    node = base;
                    offset = rest;
                }
                Shape::Seg(children) => {
                    let mut ix = 0;
                    while offset >= *self.len(children[ix]) {
                        offset -= self.len(children[ix]);
                        left.push(children[ix]);
                        ix += 1;
                    }
                    right.extend(children[ix + 1..].iter().rev());
                    node = children[ix];
                }
                Shape::Empty | Shape::Leaf(_) => unreachable!("split inside a single symbol"),
            }
        }
        right.reverse();
        let prefix = self.rebuild(left, Vec::new(), Vec::new());
        let suffix = self.rebuild(Vec::new(), Vec::new(), right);
        (prefix, suffix)
    }

    /// The length of a string.
    #[must_use]
    pub fn length_big(&self, string: NodeRef) -> &BigUint {
        self.len(string)
    }

    /// The length of a string, if it fits a `usize`.
    #[must_use]
    pub fn length(&self, string: NodeRef) -> Option<usize> {
        self.len(string).to_usize()
    }

    /// Returns true if the strings are equal.
    #[must_use]
    pub fn equal(&self, a: NodeRef, b: NodeRef) -> bool {
        a == b
    }

    fn cursor(&self, string: NodeRef) -> Vec<(NodeRef, BigUint)> {
        if string == NodeRef::EMPTY {
            Vec::new()
        } else {
            vec![self.parts(string)]
        }
    }

    /// Replaces the top of a cursor stack by its children.
    fn descend(&self, stack: &mut Vec<(NodeRef, BigUint)>, from_back: bool) {
        let Some((node, reps)) = stack.pop() else {
            return;
        };
        if !reps.is_one() {
            stack.push((node, reps - 1u32));
        }
        if let Shape::Seg(children) = &self.nodes[node.index()].shape {
            if from_back {
                stack.extend(children.iter().map(|&child| self.parts(child)));
            } else {
                stack.extend(children.iter().rev().map(|&child| self.parts(child)));
            }
        }
    }

    /// Length of the longest common prefix, or suffix.  Shared nodes are
    /// skipped whole; only diverging nodes are opened.
    fn common(&self, a: NodeRef, b: NodeRef, from_back: bool) -> BigUint {
        let mut xs = self.cursor(a);
        let mut ys = self.cursor(b);
        let mut shared = BigUint::zero();
        while let (Some(x), Some(y)) = (xs.last_mut(), ys.last_mut()) {
            if x.0 == y.0 {
                let reps = x.1.clone().min(y.1.clone());
                shared += self.len(x.0) * &reps;
                x.1 -= &reps;
                y.1 -= &reps;
                let (x_done, y_done) = (x.1.is_zero(), y.1.is_zero());
                if x_done {
                    xs.pop();
                }
                if y_done {
                    ys.pop();
                }
                continue;
            }
            let (hx, hy) = (self.height(x.0), self.height(y.0));
            if hx == 0 && hy == 0 {
                break;
            }
            if hx >= hy {
                self.descend(&mut xs, from_back);
            }
            if hy >= hx {
                self.descend(&mut ys, from_back);
            }
        }
        shared
    }

    /// Length of the longest common prefix of two strings.
    #[must_use]
    pub fn lcp(&self, a: NodeRef, b: NodeRef) -> BigUint {
        self.common(a, b, false)
    }

    /// Length of the longest common suffix of two strings.
    #[must_use]
    pub fn lcs(&self, a: NodeRef, b: NodeRef) -> BigUint {
        self.common(a, b, true)
    }

    /// The symbol at a position.
    ///
    /// ## Panics
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn at(&self, string: NodeRef, index: &BigUint) -> u32 {
        assert!(index < self.len(string), "index {index} out of range");
        let mut node = string;
        let mut offset = index.clone();
        loop {
            match &self.nodes[node.index()].shape {
                Shape::Leaf(value) => return *value,
                Shape::Run(base, _) => {
                    offset %= self.len(*base);
                    node = *base;
                }
                Shape::Seg(children) => {
                    for &child in children.iter() {
                        if offset < *self.len(child) {
                            node = child;
                            break;
                        }
                        offset -= self.len(child);
                    }
                }
                Shape::Empty => unreachable!("empty node inside a string"),
            }
        }
    }

    /// Lexicographic comparison of two strings.
    #[must_use]
    pub fn compare(&self, a: NodeRef, b: NodeRef) -> Ordering {
        let shared = self.lcp(a, b);
        let (la, lb) = (self.len(a), self.len(b));
        if shared == *la || shared == *lb {
            return la.cmp(lb);
        }
        self.at(a, &shared).cmp(&self.at(b, &shared))
    }

    /// Renders the tree of a string.
    ///
    /// Symbols are written in decimal, a run as `base*count` and a block as
    /// its elements in parentheses.  Blocks are numbered from 0 in order of
    /// first appearance, and later occurrences of a block are written as
    /// `^number`.  The empty string is `()`.
    #[must_use]
    pub fn dump(&self, string: NodeRef) -> String {
        let mut out = String::new();
        let mut seen = HashMap::default();
        self.dump_node(string, &mut seen, &mut out);
        out
    }

    fn dump_node(&self, node: NodeRef, seen: &mut HashMap<NodeRef, usize>, out: &mut String) {
        // writing into a `String` cannot fail
        match &self.nodes[node.index()].shape {
            Shape::Empty => out.push_str("()"),
            Shape::Leaf(value) => {
                let _ = write!(out, "{value}");
            }
            Shape::Run(base, count) => {
                self.dump_node(*base, seen, out);
                let _ = write!(out, "*{count}");
            }
            Shape::Seg(children) => {
                if let Some(number) = seen.get(&node) {
                    let _ = write!(out, "^{number}");
                    return;
                }
                let number = seen.len();
                seen.insert(node, number);
                out.push('(');
                for (ix, &child) in children.iter().enumerate() {
                    if ix > 0 {
                        out.push(' ');
                    }
                    self.dump_node(child, seen, out);
                }
                out.push(')');
            }
        }
    }
}
