//! `Formula` stores the result of a parsing as the tree of its "syntactic proof".
//!
//! Each node of the tree is a grammar rule; its children are the parses of the
//! rule's nonterminals, in the order in which they appear in the rule.  Leaves
//! are either variables (rules built from `$f` statements) or syntax axioms
//! without nonterminals.

use crate::grammar::{CatId, GSym, Grammar, RuleId};
use crate::scopeck::SymbolId;
use crate::tree::{NodeId, SiblingIter, Tree};
use crate::util::as_str;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

/// A parsed formula, in a tree format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Formula {
    category: CatId,
    tree: Arc<Tree<RuleId>>,
    root: NodeId,
}

impl Formula {
    pub(crate) fn new(category: CatId, tree: Tree<RuleId>, root: NodeId) -> Self {
        Formula {
            category,
            tree: Arc::new(tree),
            root,
        }
    }

    /// The grammar category of the formula.
    #[must_use]
    pub const fn category(&self) -> CatId {
        self.category
    }

    /// The rule applied at the root.
    #[must_use]
    pub fn root_rule(&self) -> RuleId {
        self.tree[self.root]
    }

    /// Returns whether this formula consists in a single token.
    #[must_use]
    pub fn is_singleton(&self) -> bool {
        !self.tree.has_children(self.root)
    }

    /// Number of rule applications in the formula.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.len()
    }

    #[inline]
    /// Iterates through the rules of a formula, depth-first, pre-order.
    #[must_use]
    pub fn labels_iter(&self) -> LabelIter<'_> {
        LabelIter {
            formula: self,
            stack: vec![],
            root: Some(self.root),
        }
    }

    #[inline]
    /// Iterates through the rules of a formula, depth-first, post-order.
    pub fn labels_postorder_iter(&self) -> impl ExactSizeIterator<Item = RuleId> + '_ {
        self.tree.node_iter().copied()
    }

    /// The labels of the rules in pre-order.
    #[must_use]
    pub fn labels<'a>(&self, grammar: &'a Grammar) -> Vec<&'a [u8]> {
        self.labels_iter()
            .map(|rule| &*grammar.rule(rule).label)
            .collect()
    }

    /// Augment a formula with a grammar reference, to produce a [`FormulaRef`].
    /// The resulting object implements [`Display`], [`Debug`], and [`IntoIterator`].
    #[must_use]
    pub const fn as_ref<'a>(&'a self, grammar: &'a Grammar) -> FormulaRef<'a> {
        FormulaRef {
            grammar,
            formula: self,
        }
    }
}

/// An iterator through the rules of a formula.
/// This iterator sequence is depth-first, pre-order.
#[derive(Debug)]
pub struct LabelIter<'a> {
    formula: &'a Formula,
    stack: Vec<SiblingIter<'a, RuleId>>,
    root: Option<NodeId>,
}

impl LabelIter<'_> {
    #[inline]
    fn visit_children(&mut self, node_id: NodeId) -> RuleId {
        self.stack.push(self.formula.tree.children_iter(node_id));
        self.formula.tree[node_id]
    }
}

impl Iterator for LabelIter<'_> {
    type Item = RuleId;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(node_id) = self.root.take() {
            return Some(self.visit_children(node_id));
        }
        loop {
            let iter = self.stack.last_mut()?;
            if let Some(node_id) = iter.next() {
                return Some(self.visit_children(node_id));
            }
            // Last sibling reached, pop and iterate
            self.stack.pop();
        }
    }
}

/// A [`Formula`] reference in the context of a [`Grammar`].
/// This allows the rules in the [`Formula`] to be resolved.
#[derive(Copy, Clone)]
pub struct FormulaRef<'a> {
    grammar: &'a Grammar,
    formula: &'a Formula,
}

impl std::ops::Deref for FormulaRef<'_> {
    type Target = Formula;

    fn deref(&self) -> &Self::Target {
        self.formula
    }
}

impl<'a> FormulaRef<'a> {
    /// Convert the formula back to a flat list of symbols.
    #[must_use]
    pub fn iter(self) -> Flatten<'a> {
        let mut f = Flatten {
            formula: self.formula,
            grammar: self.grammar,
            stack: vec![],
        };
        f.step_into(self.formula.root);
        f
    }

    /// Convert this formula into an s-expression string.
    #[must_use]
    pub fn as_sexpr(&self) -> String {
        let mut s = String::new();
        // writing into a `String` cannot fail
        let _ = self.write_sexpr(&mut s);
        s
    }

    /// Write this formula as an s-expression to the given writer.
    pub fn write_sexpr(&self, w: &mut impl fmt::Write) -> fmt::Result {
        self.write_sub_sexpr(self.formula.root, w)
    }

    fn write_sub_sexpr(&self, node_id: NodeId, w: &mut impl fmt::Write) -> fmt::Result {
        let name = as_str(&self.grammar.rule(self.formula.tree[node_id]).label);
        if self.formula.tree.has_children(node_id) {
            write!(w, "({name}")?;
            for i in self.formula.tree.children_iter(node_id) {
                write!(w, " ")?;
                self.write_sub_sexpr(i, w)?;
            }
            write!(w, ")")
        } else {
            write!(w, "{name}")
        }
    }
}

impl<'a> IntoIterator for FormulaRef<'a> {
    type Item = SymbolId;
    type IntoIter = Flatten<'a>;
    fn into_iter(self) -> Flatten<'a> {
        self.iter()
    }
}

struct SubFormulaRef<'a> {
    node_id: NodeId,
    f_ref: FormulaRef<'a>,
}

impl Debug for SubFormulaRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = &self.f_ref.formula.tree;
        let label_name = as_str(&self.f_ref.grammar.rule(tree[self.node_id]).label);
        let mut dt = f.debug_tuple(label_name);
        for s_id in tree.children_iter(self.node_id) {
            dt.field(&SubFormulaRef {
                node_id: s_id,
                f_ref: self.f_ref,
            });
        }
        dt.finish()
    }
}

/// An iterator going through each symbol in a formula
#[derive(Debug)]
pub struct Flatten<'a> {
    formula: &'a Formula,
    grammar: &'a Grammar,
    stack: Vec<(std::slice::Iter<'a, GSym>, SiblingIter<'a, RuleId>)>,
}

impl Flatten<'_> {
    fn step_into(&mut self, node_id: NodeId) {
        let rule = self.grammar.rule(self.formula.tree[node_id]);
        self.stack
            .push((rule.rhs.iter(), self.formula.tree.children_iter(node_id)));
    }
}

impl Iterator for Flatten<'_> {
    type Item = SymbolId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (rhs, children) = self.stack.last_mut()?;
            match rhs.next() {
                Some(&GSym::Term(symbol)) => return Some(symbol),
                Some(GSym::NonTerm(_)) => {
                    // a well-formed tree has one child per nonterminal
                    let child = children.next()?;
                    self.step_into(child);
                }
                None => {
                    // End of this rule, pop to the parent one
                    self.stack.pop();
                }
            }
        }
    }
}

impl Display for FormulaRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbols = self.grammar.symbols();
        write!(f, "{}", as_str(self.grammar.category_name(self.category)))?;
        for symbol in *self {
            write!(f, " {}", as_str(symbols.name(symbol)))?;
        }
        Ok(())
    }
}

impl Debug for FormulaRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        SubFormulaRef {
            node_id: self.formula.root,
            f_ref: *self,
        }
        .fmt(f)
    }
}
