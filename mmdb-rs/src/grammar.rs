//! Grammar processes a database, extracts a Grammar, which it also
//! validates, and parses statements in the system.
//!
//! # Extraction
//!
//! Grammar categories are typecodes, ordered from the tightest binding to the
//! loosest.  Every `$f` statement whose typecode is a category becomes a leaf
//! rule producing its variable, visible until the end of its block.  Every
//! `$a` statement whose typecode is a category is a syntax axiom: its
//! constants become terminals and its variables become nonterminals of the
//! category of their `$f`.  A syntax axiom may not have logical hypotheses or
//! mandatory `$d` conditions, may use each variable once, and may only start
//! with a nonterminal of a strictly tighter category than its own.  The last
//! rule keeps the parser from looping without any cycle detection.
//!
//! # Factor tree and thread
//!
//! The rules of each category are inserted into a trie keyed by their
//! right-hand sides, so that rules sharing a prefix share the work of matching
//! it.  The trie is then flattened into the *thread*, an arena of decision
//! nodes.  Each node either accepts a rule, matches a terminal, or matches a
//! nonterminal, and carries two links: `next` to continue after a successful
//! match and `alt` to try the next alternative.
//!
//! # Packrat parsing
//!
//! A parse of `(category, position)` walks the category's thread with an
//! explicit stack of alternatives and keeps the longest match.  Results are
//! memoized per `(category, position)` for the duration of one top-level
//! call.  Two different parses ending at the same position make the result
//! ambiguous, and the ambiguity is carried into every enclosing parse.  When
//! nothing matches, the parse is rerun with the first-token pruning disabled
//! to collect every terminal and category that was tried at the furthest
//! position reached.

use crate::bit_set::Bitset;
use crate::database::{Analyzer, Database, DbOptions};
use crate::diag::{Anchor, Category, Diagnostic};
use crate::formula::Formula;
use crate::scopeck::{Hyp, ScopeResult, SymbolId, SymbolTable};
use crate::statement::{Statement, StatementIndex, StatementKind, StatementType, Token};
use crate::tree::{NodeId, Tree};
use crate::util::{as_str, HashMap, HashSet};
use itertools::Itertools;
use log::{debug, warn};
use std::io;
use std::sync::Arc;
use tinyvec::TinyVec;

/// A grammar category.  Categories are numbered from the tightest binding to
/// the loosest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatId(pub(crate) u32);

impl CatId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A grammar rule.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) u32);

impl RuleId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A symbol of a right-hand side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GSym {
    /// A math symbol to be matched literally.
    Term(SymbolId),
    /// A subformula of the given category.
    NonTerm(CatId),
}

/// One production of the grammar.
#[derive(Clone, Debug)]
pub struct Rule {
    /// The label of the `$f` or `$a` statement.
    pub label: Token,
    /// The statement the rule was built from.
    pub stmt: StatementIndex,
    /// The category produced.
    pub category: CatId,
    /// The right-hand side.
    pub rhs: Box<[GSym]>,
    /// First statement at which the rule may be used.
    pub visible_from: StatementIndex,
    /// First statement at which the rule may no longer be used.
    pub visible_until: StatementIndex,
    /// True for rules built from `$f` statements.
    pub floating: bool,
}

impl Rule {
    /// Returns true if the rule may be used at the given statement.
    #[must_use]
    pub const fn is_visible(&self, at: StatementIndex) -> bool {
        self.visible_from <= at && at < self.visible_until
    }
}

const NIL: u32 = u32::MAX;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Op {
    Accept(RuleId),
    Term(SymbolId),
    NonTerm(CatId),
}

/// One decision node of the factor thread.
#[derive(Copy, Clone, Debug)]
struct ThreadNode {
    op: Op,
    /// Where to continue after a successful match.
    next: u32,
    /// The next alternative.
    alt: u32,
}

#[derive(Debug, Default)]
struct TrieNode {
    accepts: Vec<RuleId>,
    edges: Vec<(GSym, usize)>,
}

/// The factor tree: one trie per category over the right-hand sides of its
/// rules.  The first `n` nodes are the roots of the `n` categories.
#[derive(Debug)]
struct FactorTree(Vec<TrieNode>);

impl FactorTree {
    fn new(categories: usize) -> Self {
        FactorTree((0..categories).map(|_| TrieNode::default()).collect())
    }

    fn insert(&mut self, rule_id: RuleId, rule: &Rule) {
        let mut node = rule.category.index();
        for &sym in &*rule.rhs {
            let existing = self.0[node]
                .edges
                .iter()
                .find(|(edge, _)| *edge == sym)
                .map(|&(_, child)| child);
            node = match existing {
                Some(child) => child,
                None => {
                    let child = self.0.len();
                    self.0.push(TrieNode::default());
                    self.0[node].edges.push((sym, child));
                    child
                }
            };
        }
        self.0[node].accepts.push(rule_id);
    }

    /// Flattens the trie into a thread.  The decisions of each trie node are
    /// laid out consecutively: its accepting rules first, then its edges.
    /// Returns the thread and the head of each category.
    #[allow(clippy::cast_possible_truncation)]
    fn thread(&self, categories: usize) -> (Vec<ThreadNode>, Vec<u32>) {
        let mut offsets = Vec::with_capacity(self.0.len());
        let mut running = 0;
        for node in &self.0 {
            offsets.push(running);
            running += node.accepts.len() + node.edges.len();
        }
        let head = |ix: usize| {
            let node = &self.0[ix];
            if node.accepts.is_empty() && node.edges.is_empty() {
                NIL
            } else {
                offsets[ix] as u32
            }
        };

        let mut thread = Vec::with_capacity(running);
        for node in &self.0 {
            let len = node.accepts.len() + node.edges.len();
            let ops = node
                .accepts
                .iter()
                .map(|&rule| (Op::Accept(rule), NIL))
                .chain(node.edges.iter().map(|&(sym, child)| {
                    let op = match sym {
                        GSym::Term(symbol) => Op::Term(symbol),
                        GSym::NonTerm(cat) => Op::NonTerm(cat),
                    };
                    (op, head(child))
                }));
            for (k, (op, next)) in ops.enumerate() {
                let alt = if k + 1 < len {
                    (thread.len() + 1) as u32
                } else {
                    NIL
                };
                thread.push(ThreadNode { op, next, alt });
            }
        }
        let heads = (0..categories).map(head).collect();
        (thread, heads)
    }
}

/// The terminals which can start a formula of a category.
#[derive(Clone, Debug, Default)]
struct Initial {
    first: Bitset,
    nullable: bool,
}

/// Something the parser tried at the highwater position.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Expected {
    /// A terminal.
    Token(SymbolId),
    /// A subformula.
    Category(CatId),
}

/// The result of a top-level parse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The whole token sequence was parsed, in exactly one way.
    Success(Formula),
    /// A parse exists, but stops before the given token.
    Trailing(usize),
    /// Nothing matches.  `highwater` is the furthest token reached, and
    /// `expected` everything which was tried there.
    NoParse {
        /// Index of the furthest token reached.
        highwater: usize,
        /// What would have allowed the parse to continue.
        expected: Vec<Expected>,
    },
    /// The tokens have two different parses.
    Ambiguous {
        /// The rule at the root of the first parse found.
        first: RuleId,
        /// The rule at the root of the second parse.
        second: RuleId,
    },
}

/// The grammar built from the database's syntax axioms.
///
/// It is used to parse the math strings of logical statements into
/// [`Formula`]s.  See [`StmtParse`] for the formulas of all statements.
///
/// Example:
/// ```
/// use mmdb_rs::database::{Database, DbOptions};
///
/// let mut db = Database::new(DbOptions::default());
/// db.parse_with(
///     "demo.mm",
///     vec![("demo.mm".to_owned(), b"$c wff |- T. $. wtru $a wff T. $.".to_vec())],
/// )
/// .unwrap();
/// let grammar = db.grammar_result();
/// assert!(grammar.diagnostics().is_empty());
/// ```
#[derive(Debug)]
pub struct Grammar {
    scope: Arc<ScopeResult>,
    categories: Vec<SymbolId>,
    cat_of: HashMap<SymbolId, CatId>,
    roles: HashMap<SymbolId, CatId>,
    rules: Vec<Rule>,
    thread: Vec<ThreadNode>,
    heads: Vec<u32>,
    initial: Vec<Initial>,
    diagnostics: Vec<(StatementIndex, Diagnostic)>,
}

/// The typecodes of a frame's floating hypotheses, by variable.
fn var_types(hypotheses: &[Hyp]) -> HashMap<SymbolId, SymbolId> {
    hypotheses
        .iter()
        .filter_map(|hyp| match *hyp {
            Hyp::Floating { var, typecode, .. } => Some((var, typecode)),
            Hyp::Essential { .. } => None,
        })
        .collect()
}

/// Orders the candidate categories so that every syntax axiom starting with
/// a variable of another category comes after that category.  Ties are
/// broken by first appearance, and so are cycles.
fn order_categories(candidates: &[SymbolId], edges: &HashSet<(SymbolId, SymbolId)>) -> Vec<SymbolId> {
    let mut remaining: Vec<SymbolId> = candidates.to_vec();
    let mut out = Vec::with_capacity(candidates.len());
    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .position(|&c| {
                !remaining
                    .iter()
                    .any(|&d| d != c && edges.contains(&(d, c)))
            })
            .unwrap_or(0);
        out.push(remaining.remove(ready));
    }
    out
}

impl Grammar {
    #[allow(clippy::cast_possible_truncation)]
    fn build(statements: &[Statement], scope: Arc<ScopeResult>, options: &DbOptions) -> Grammar {
        let symbols = scope.symbols();
        let constant = |name: &str| {
            symbols
                .lookup(name.as_bytes())
                .filter(|&id| !symbols.is_variable(id))
        };
        let role_keys: HashSet<SymbolId> = options
            .roles
            .iter()
            .filter_map(|(typecode, _)| constant(typecode))
            .collect();

        let categories = if options.categories.is_empty() {
            let mut candidates = Vec::new();
            let mut edges = HashSet::default();
            for stmt in statements {
                let ix = stmt.index();
                if let Some(Hyp::Floating { typecode, .. }) = scope.hyp(ix) {
                    if !candidates.contains(typecode) && !role_keys.contains(typecode) {
                        candidates.push(*typecode);
                    }
                }
                if let Some(frame) = scope.frame(ix) {
                    if frame.stype != StatementType::Axiom || role_keys.contains(&frame.typecode) {
                        continue;
                    }
                    if !candidates.contains(&frame.typecode) {
                        candidates.push(frame.typecode);
                    }
                    let first_type = frame
                        .target
                        .first()
                        .and_then(|first| var_types(&frame.hypotheses).get(first).copied());
                    if let Some(first_type) = first_type {
                        if first_type != frame.typecode {
                            edges.insert((first_type, frame.typecode));
                        }
                    }
                }
            }
            edges.retain(|(d, c)| candidates.contains(d) && candidates.contains(c));
            order_categories(&candidates, &edges)
        } else {
            options
                .categories
                .iter()
                .filter_map(|name| {
                    let id = constant(name);
                    if id.is_none() {
                        debug!("category {name} is not a declared constant");
                    }
                    id
                })
                .collect()
        };

        let cat_of: HashMap<SymbolId, CatId> = categories
            .iter()
            .enumerate()
            .map(|(ix, &typecode)| (typecode, CatId(ix as u32)))
            .collect();
        let roles = options
            .roles
            .iter()
            .filter_map(|(typecode, category)| {
                Some((constant(typecode)?, *cat_of.get(&constant(category)?)?))
            })
            .collect();

        let mut grammar = Grammar {
            scope: scope.clone(),
            categories,
            cat_of,
            roles,
            rules: Vec::new(),
            thread: Vec::new(),
            heads: Vec::new(),
            initial: Vec::new(),
            diagnostics: Vec::new(),
        };

        for stmt in statements {
            let ix = stmt.index();
            match stmt.kind() {
                StatementKind::Floating { label, .. } => {
                    if let Some(&Hyp::Floating { typecode, var, .. }) = scope.hyp(ix) {
                        if let Some(&category) = grammar.cat_of.get(&typecode) {
                            let visible_until = scope.label(label).map_or(StatementIndex::MAX, |info| info.end);
                            grammar.rules.push(Rule {
                                label: label.clone(),
                                stmt: ix,
                                category,
                                rhs: Box::new([GSym::Term(var)]),
                                visible_from: ix,
                                visible_until,
                                floating: true,
                            });
                        }
                    }
                }
                StatementKind::Axiom { label, .. } => match grammar.syntax_axiom(ix, label) {
                    Ok(Some(rule)) => grammar.rules.push(rule),
                    Ok(None) => {}
                    Err(diag) => {
                        warn!("syntax axiom {} rejected: {}", as_str(label), diag.message());
                        grammar.diagnostics.push((ix, diag));
                    }
                },
                _ => {}
            }
        }

        let mut tree = FactorTree::new(grammar.categories.len());
        for (ix, rule) in grammar.rules.iter().enumerate() {
            tree.insert(RuleId(ix as u32), rule);
        }
        let (thread, heads) = tree.thread(grammar.categories.len());
        grammar.thread = thread;
        grammar.heads = heads;
        grammar.compute_initial();
        debug!(
            "grammar: {} categories ({}), {} rules, {} thread nodes",
            grammar.categories.len(),
            grammar
                .categories
                .iter()
                .map(|&c| as_str(symbols.name(c)))
                .join(" < "),
            grammar.rules.len(),
            grammar.thread.len()
        );
        grammar
    }

    /// Checks a `$a` statement and builds its rule.  Returns `Ok(None)` for
    /// axioms which are not syntax axioms.
    fn syntax_axiom(&self, ix: StatementIndex, label: &[u8]) -> Result<Option<Rule>, Diagnostic> {
        let symbols = self.scope.symbols();
        let Some(frame) = self.scope.frame(ix) else {
            return Ok(None);
        };
        if self.roles.contains_key(&frame.typecode) {
            return Ok(None);
        }
        let Some(&category) = self.cat_of.get(&frame.typecode) else {
            return Ok(None);
        };
        if let Some(hyp) = frame
            .hypotheses
            .iter()
            .find(|hyp| matches!(hyp, Hyp::Essential { .. }))
        {
            return Err(
                Diagnostic::new(Category::Grammar, "syntax-logical-hypothesis", Anchor::Label)
                    .label("label", label)
                    .label("hyp", hyp.label())
                    .xref("hypothesis", hyp.stmt(), Anchor::Label),
            );
        }
        if !frame.mandatory_dv.is_empty() {
            return Err(
                Diagnostic::new(Category::Grammar, "syntax-mandatory-dv", Anchor::Label)
                    .label("label", label),
            );
        }

        let types = var_types(&frame.hypotheses);
        let mut seen = HashSet::default();
        let mut rhs = Vec::with_capacity(frame.target.len());
        for (pos, &symbol) in frame.target.iter().enumerate() {
            if !symbols.is_variable(symbol) {
                rhs.push(GSym::Term(symbol));
                continue;
            }
            if !seen.insert(symbol) {
                return Err(Diagnostic::new(
                    Category::Grammar,
                    "syntax-repeated-variable",
                    Anchor::Math(pos + 1),
                )
                .label("symbol", symbols.name(symbol))
                .label("label", label));
            }
            let typecode = types.get(&symbol).copied();
            match typecode.and_then(|typecode| self.cat_of.get(&typecode)) {
                Some(&cat) => rhs.push(GSym::NonTerm(cat)),
                None => {
                    let typecode = typecode.map_or(&b"?"[..], |typecode| symbols.name(typecode));
                    return Err(Diagnostic::new(
                        Category::Grammar,
                        "syntax-untyped-variable",
                        Anchor::Math(pos + 1),
                    )
                    .label("symbol", symbols.name(symbol))
                    .label("label", label)
                    .label("typecode", typecode));
                }
            }
        }
        if let Some(&GSym::NonTerm(first)) = rhs.first() {
            if first >= category {
                return Err(Diagnostic::new(
                    Category::Grammar,
                    "syntax-left-recursive",
                    Anchor::Math(1),
                )
                .label("label", label)
                .label("first", self.category_name(first))
                .label("result", self.category_name(category)));
            }
        }

        Ok(Some(Rule {
            label: label.into(),
            stmt: ix,
            category,
            rhs: rhs.into(),
            visible_from: ix,
            visible_until: StatementIndex::MAX,
            floating: false,
        }))
    }

    /// Computes the initial sets by fixpoint iteration.
    fn compute_initial(&mut self) {
        let mut initial = vec![Initial::default(); self.categories.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for rule in &self.rules {
                let cat = rule.category.index();
                let mut nullable = true;
                for sym in &*rule.rhs {
                    match *sym {
                        GSym::Term(symbol) => {
                            if !initial[cat].first.has_bit(symbol.index()) {
                                initial[cat].first.set_bit(symbol.index());
                                changed = true;
                            }
                            nullable = false;
                        }
                        GSym::NonTerm(sub) => {
                            let sub = sub.index();
                            if sub != cat {
                                let missing: Vec<usize> = initial[sub]
                                    .first
                                    .iter()
                                    .filter(|&bit| !initial[cat].first.has_bit(bit))
                                    .collect();
                                for bit in missing {
                                    initial[cat].first.set_bit(bit);
                                    changed = true;
                                }
                            }
                            nullable = initial[sub].nullable;
                        }
                    }
                    if !nullable {
                        break;
                    }
                }
                if nullable && !initial[cat].nullable {
                    initial[cat].nullable = true;
                    changed = true;
                }
            }
        }
        self.initial = initial;
    }

    /// Returns true if a formula of the category can start with the token
    /// (or, for `None`, be empty).
    fn may_start(&self, cat: CatId, token: Option<SymbolId>) -> bool {
        let initial = &self.initial[cat.index()];
        initial.nullable || token.is_some_and(|token| initial.first.has_bit(token.index()))
    }

    /// The symbol table the grammar refers to.
    #[must_use]
    pub fn symbols(&self) -> &SymbolTable {
        self.scope.symbols()
    }

    /// All categories, tightest binding first.
    #[allow(clippy::cast_possible_truncation)]
    pub fn categories(&self) -> impl Iterator<Item = CatId> + '_ {
        (0..self.categories.len()).map(|ix| CatId(ix as u32))
    }

    /// The typecode name of a category.
    #[must_use]
    pub fn category_name(&self, cat: CatId) -> &[u8] {
        self.symbols().name(self.categories[cat.index()])
    }

    /// The category of a typecode, if it is one.
    #[must_use]
    pub fn category_of(&self, typecode: SymbolId) -> Option<CatId> {
        self.cat_of.get(&typecode).copied()
    }

    /// The category by typecode name.
    #[must_use]
    pub fn category(&self, name: &[u8]) -> Option<CatId> {
        self.category_of(self.symbols().lookup(name)?)
    }

    /// The category formulas of a logical typecode are parsed as.
    #[must_use]
    pub fn role(&self, typecode: SymbolId) -> Option<CatId> {
        self.roles.get(&typecode).copied()
    }

    /// Accessor for a rule.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    /// All rules, in statement order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The diagnostics of rejected syntax axioms.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<(StatementIndex, Diagnostic)> {
        self.diagnostics.clone()
    }

    /// Parses a token sequence as a formula of the given category, using the
    /// rules visible at statement `at`.
    #[must_use]
    pub fn parse_tokens(&self, category: CatId, at: StatementIndex, tokens: &[SymbolId]) -> ParseOutcome {
        let mut parser = Parser::new(self, at, tokens, false);
        match parser.parse_cat(category, 0) {
            Some(found) if found.end < tokens.len() => ParseOutcome::Trailing(found.end),
            Some(Match {
                ambiguity: Some((first, second)),
                ..
            }) => ParseOutcome::Ambiguous { first, second },
            Some(found) => {
                let mut tree = Tree::default();
                let root = parser.build_tree(&mut tree, found.node);
                ParseOutcome::Success(Formula::new(category, tree, root))
            }
            None => {
                let mut parser = Parser::new(self, at, tokens, true);
                let _ = parser.parse_cat(category, 0);
                ParseOutcome::NoParse {
                    highwater: parser.highwater,
                    expected: parser.expected,
                }
            }
        }
    }

    fn expected_name(&self, expected: Expected) -> &[u8] {
        match expected {
            Expected::Token(symbol) => self.symbols().name(symbol),
            Expected::Category(cat) => self.category_name(cat),
        }
    }

    /// Lists the categories, the rules and the size of the thread.
    #[allow(clippy::cast_possible_truncation)]
    pub fn dump(&self, out: &mut impl io::Write) -> io::Result<()> {
        writeln!(
            out,
            "Grammar has {} categories, {} rules and {} thread nodes.",
            self.categories.len(),
            self.rules.len(),
            self.thread.len()
        )?;
        for cat in self.categories() {
            let initial = &self.initial[cat.index()];
            let first = initial
                .first
                .iter()
                .map(|bit| as_str(self.symbols().name(SymbolId(bit as u32))))
                .join(" ");
            writeln!(
                out,
                "{} (#{}): starts with {{{first}}}{}",
                as_str(self.category_name(cat)),
                cat.index(),
                if initial.nullable { ", nullable" } else { "" }
            )?;
            for rule in self.rules.iter().filter(|rule| rule.category == cat) {
                let rhs = rule
                    .rhs
                    .iter()
                    .map(|sym| match *sym {
                        GSym::Term(symbol) => as_str(self.symbols().name(symbol)).to_owned(),
                        GSym::NonTerm(sub) => format!("<{}>", as_str(self.category_name(sub))),
                    })
                    .join(" ");
                writeln!(out, "  {}: {rhs}", as_str(&rule.label))?;
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug)]
struct Match {
    end: usize,
    node: u32,
    ambiguity: Option<(RuleId, RuleId)>,
}

#[derive(Copy, Clone, Debug)]
enum Memo {
    Unknown,
    InProgress,
    Done(Option<Match>),
}

#[derive(Debug)]
struct PNode {
    rule: RuleId,
    children: TinyVec<[u32; 4]>,
}

/// An alternative waiting on the explicit stack.
struct Branch {
    node: u32,
    pos: usize,
    children: TinyVec<[u32; 4]>,
    ambiguity: Option<(RuleId, RuleId)>,
}

struct Parser<'a> {
    grammar: &'a Grammar,
    at: StatementIndex,
    tokens: &'a [SymbolId],
    memo: Vec<Memo>,
    nodes: Vec<PNode>,
    diagnose: bool,
    highwater: usize,
    expected: Vec<Expected>,
}

impl<'a> Parser<'a> {
    fn new(grammar: &'a Grammar, at: StatementIndex, tokens: &'a [SymbolId], diagnose: bool) -> Self {
        Parser {
            grammar,
            at,
            tokens,
            memo: vec![Memo::Unknown; grammar.categories.len() * (tokens.len() + 1)],
            nodes: Vec::new(),
            diagnose,
            highwater: 0,
            expected: Vec::new(),
        }
    }

    fn note_expected(&mut self, pos: usize, expected: Expected) {
        if !self.diagnose || pos < self.highwater {
            return;
        }
        if pos > self.highwater {
            self.highwater = pos;
            self.expected.clear();
        }
        if !self.expected.contains(&expected) {
            self.expected.push(expected);
        }
    }

    fn parse_cat(&mut self, cat: CatId, pos: usize) -> Option<Match> {
        let slot = cat.index() * (self.tokens.len() + 1) + pos;
        match self.memo[slot] {
            Memo::Done(found) => return found,
            // a nullable prefix led back here; the outer attempt decides
            Memo::InProgress => return None,
            Memo::Unknown => {}
        }
        self.memo[slot] = Memo::InProgress;
        let found = self.run(cat, pos);
        self.memo[slot] = Memo::Done(found);
        found
    }

    #[allow(clippy::cast_possible_truncation)]
    fn run(&mut self, cat: CatId, pos: usize) -> Option<Match> {
        let mut best: Option<Match> = None;
        let mut stack = vec![Branch {
            node: self.grammar.heads[cat.index()],
            pos,
            children: TinyVec::new(),
            ambiguity: None,
        }];
        while let Some(Branch {
            node,
            pos,
            mut children,
            ambiguity,
        }) = stack.pop()
        {
            if node == NIL {
                continue;
            }
            let ThreadNode { op, next, alt } = self.grammar.thread[node as usize];
            if alt != NIL {
                stack.push(Branch {
                    node: alt,
                    pos,
                    children: children.clone(),
                    ambiguity,
                });
            }
            match op {
                Op::Accept(rule) => {
                    if !self.grammar.rule(rule).is_visible(self.at) {
                        continue;
                    }
                    match &mut best {
                        Some(current) if current.end == pos => {
                            if current.ambiguity.is_none() {
                                let first = self.nodes[current.node as usize].rule;
                                current.ambiguity = Some((first, rule));
                            }
                            continue;
                        }
                        Some(current) if current.end > pos => continue,
                        _ => {}
                    }
                    self.nodes.push(PNode { rule, children });
                    best = Some(Match {
                        end: pos,
                        node: (self.nodes.len() - 1) as u32,
                        ambiguity,
                    });
                }
                Op::Term(symbol) => {
                    if self.tokens.get(pos) == Some(&symbol) {
                        stack.push(Branch {
                            node: next,
                            pos: pos + 1,
                            children,
                            ambiguity,
                        });
                    } else {
                        self.note_expected(pos, Expected::Token(symbol));
                    }
                }
                Op::NonTerm(sub) => {
                    if !self.diagnose && !self.grammar.may_start(sub, self.tokens.get(pos).copied()) {
                        continue;
                    }
                    match self.parse_cat(sub, pos) {
                        Some(found) => {
                            children.push(found.node);
                            stack.push(Branch {
                                node: next,
                                pos: found.end,
                                children,
                                ambiguity: ambiguity.or(found.ambiguity),
                            });
                        }
                        None => self.note_expected(pos, Expected::Category(sub)),
                    }
                }
            }
        }
        best
    }

    fn build_tree(&self, tree: &mut Tree<RuleId>, node: u32) -> NodeId {
        let pnode = &self.nodes[node as usize];
        let children: Vec<NodeId> = pnode
            .children
            .iter()
            .map(|&child| self.build_tree(tree, child))
            .collect();
        tree.add_node(pnode.rule, &children)
    }
}

/// The result of parsing all logical statements of the database with the
/// grammar.
///
/// The parse tree for a given statement can then be obtained through
/// [`StmtParse::get_formula`].
#[derive(Debug)]
pub struct StmtParse {
    grammar: Arc<Grammar>,
    formulas: HashMap<StatementIndex, Formula>,
    diagnostics: Vec<(StatementIndex, Diagnostic)>,
}

impl StmtParse {
    fn build(statements: &[Statement], scope: &ScopeResult, grammar: Arc<Grammar>) -> StmtParse {
        let mut formulas = HashMap::default();
        let mut diagnostics = Vec::new();
        for stmt in statements {
            let ix = stmt.index();
            let stype = stmt.statement_type();
            if !matches!(
                stype,
                StatementType::Essential | StatementType::Axiom | StatementType::Provable
            ) || scope.is_broken(ix)
            {
                continue;
            }
            let Some(math) = scope.lookup_math(stmt.math()) else {
                continue;
            };
            let Some((&typecode, tokens)) = math.split_first() else {
                continue;
            };
            let label = stmt.label().unwrap_or_default();
            let typecode_name = grammar.symbols().name(typecode);
            let Some(category) = grammar.role(typecode) else {
                let code = match (grammar.category_of(typecode), stype) {
                    (Some(_), StatementType::Axiom) => continue,
                    (Some(_), StatementType::Essential) => "syntactic-hypothesis",
                    (Some(_), _) => "syntactic-statement",
                    (None, _) => "unknown-type",
                };
                diagnostics.push((
                    ix,
                    Diagnostic::new(Category::Parse, code, Anchor::Math(0))
                        .label("label", label)
                        .label("typecode", typecode_name),
                ));
                continue;
            };
            let diag = match grammar.parse_tokens(category, ix, tokens) {
                ParseOutcome::Success(formula) => {
                    formulas.insert(ix, formula);
                    continue;
                }
                ParseOutcome::Trailing(pos) => {
                    Diagnostic::new(Category::Parse, "trailing-symbols", Anchor::Math(pos + 1))
                        .label("symbol", grammar.symbols().name(tokens[pos]))
                }
                ParseOutcome::NoParse { highwater, expected } => {
                    let anchor = if highwater < tokens.len() {
                        Anchor::Math(highwater + 1)
                    } else {
                        Anchor::Statement
                    };
                    let expected = expected
                        .iter()
                        .map(|&e| as_str(grammar.expected_name(e)))
                        .join(", ");
                    Diagnostic::new(Category::Parse, "no-parse", anchor).text("expected", expected)
                }
                ParseOutcome::Ambiguous { first, second } => {
                    Diagnostic::new(Category::Parse, "ambiguous", Anchor::Statement)
                        .label("first", &grammar.rule(first).label)
                        .label("second", &grammar.rule(second).label)
                }
            };
            debug!("failed to parse {}: {}", as_str(label), diag.message());
            diagnostics.push((ix, diag));
        }
        StmtParse {
            grammar,
            formulas,
            diagnostics,
        }
    }

    /// Returns a list of errors that were generated when parsing the
    /// database's statements.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<(StatementIndex, Diagnostic)> {
        self.diagnostics.clone()
    }

    /// Returns the formula for a given statement
    #[must_use]
    pub fn get_formula(&self, index: StatementIndex) -> Option<&Formula> {
        self.formulas.get(&index)
    }

    /// The grammar used for parsing.
    #[must_use]
    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    /// Check that printing parsed statements gives back the original formulas
    #[must_use]
    pub fn verify(&self, statements: &[Statement]) -> Vec<(StatementIndex, Diagnostic)> {
        let symbols = self.grammar.symbols();
        let mut diags = vec![];
        for (&ix, formula) in self.formulas.iter().sorted_by_key(|&(&ix, _)| ix) {
            let math = statements[ix].math().iter().skip(1).map(|tok| symbols.lookup(tok));
            let fmla = formula.as_ref(&self.grammar).iter().map(Some);
            if !math.eq(fmla) {
                diags.push((
                    ix,
                    Diagnostic::new(Category::Parse, "formula-mismatch", Anchor::Statement)
                        .text("found", formula.as_ref(&self.grammar).to_string()),
                ));
            }
        }
        diags
    }

    /// Writes down all formulas as s-expressions, in statement order.
    pub fn dump(&self, statements: &[Statement], out: &mut impl io::Write) -> io::Result<()> {
        writeln!(out, "Formula Dump:")?;
        for (&ix, formula) in self.formulas.iter().sorted_by_key(|&(&ix, _)| ix) {
            writeln!(
                out,
                "{}: {}",
                as_str(statements[ix].label().unwrap_or_default()),
                formula.as_ref(&self.grammar).as_sexpr()
            )?;
        }
        Ok(())
    }
}

/// Grammar extraction as a database analyzer.
#[derive(Debug)]
pub struct GrammarPass;

impl Analyzer for GrammarPass {
    type Output = Grammar;
    const NAME: &'static str = "grammar";

    fn compute(db: &mut Database) -> Grammar {
        let scope = db.scope_result();
        Grammar::build(db.statements(), scope, db.options())
    }

    fn diagnostics(output: &Grammar) -> Vec<(StatementIndex, Diagnostic)> {
        output.diagnostics()
    }
}

/// Statement parsing as a database analyzer.
#[derive(Debug)]
pub struct StmtParsePass;

impl Analyzer for StmtParsePass {
    type Output = StmtParse;
    const NAME: &'static str = "stmt_parse";

    fn compute(db: &mut Database) -> StmtParse {
        let grammar = db.grammar_result();
        let scope = db.scope_result();
        StmtParse::build(db.statements(), &scope, grammar)
    }

    fn diagnostics(output: &StmtParse) -> Vec<(StatementIndex, Diagnostic)> {
        output.diagnostics()
    }
}

impl Database {
    /// Checks that every parsed formula prints back as its math string.
    pub fn verify_parse_stmt(&mut self) -> Vec<(StatementIndex, Diagnostic)> {
        let stmt_parse = self.stmt_parse_result();
        stmt_parse.verify(self.statements())
    }

    /// Writes the grammar's categories and rules.
    pub fn dump_grammar(&mut self, out: &mut impl io::Write) -> io::Result<()> {
        self.grammar_result().dump(out)
    }

    /// Writes the parse tree of every logical statement.
    pub fn dump_formula(&mut self, out: &mut impl io::Write) -> io::Result<()> {
        let stmt_parse = self.stmt_parse_result();
        stmt_parse.dump(self.statements(), out)
    }
}
