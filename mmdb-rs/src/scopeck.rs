//! Scope checking: which symbols, hypotheses and labels are active where.
//!
//! The pass walks the statement list once, keeping a stack of `${ $}` blocks.
//! It records, for every math symbol, the statement ranges during which it is
//! active, so that later passes can ask whether a symbol is in scope at a given
//! statement without replaying the walk.  For every `$a` and `$p` statement it
//! builds a [`Frame`]: the mandatory hypotheses in order, the mandatory
//! disjoint variable pairs and the goal, plus the optional hypotheses and
//! disjointness available to a proof.
//!
//! A statement with a scope error gets no frame, and neither does an assertion
//! which depends on a broken hypothesis; the error itself is reported once, at
//! its source.

use crate::bit_set::Bitset;
use crate::database::{Analyzer, Database};
use crate::diag::{Anchor, Category, Diagnostic};
use crate::statement::{Statement, StatementIndex, StatementKind, StatementType, Token};
use crate::util::{HashMap, HashSet};
use std::ops::Range;

/// Interned math symbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub(crate) u32);

impl SymbolId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a variable within a frame's `var_list`.
pub type VarIndex = usize;

/// Whether a symbol was declared by `$c` or `$v`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    /// `$c`
    Constant,
    /// `$v`
    Variable,
}

/// All math symbols ever declared, with their activity ranges.
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: Vec<Token>,
    ids: HashMap<Token, SymbolId>,
    kinds: Vec<SymbolKind>,
    activity: Vec<Vec<Range<StatementIndex>>>,
}

impl SymbolTable {
    /// Finds a symbol by name.
    #[must_use]
    pub fn lookup(&self, name: &[u8]) -> Option<SymbolId> {
        self.ids.get(name).copied()
    }

    /// The name of a symbol.
    #[must_use]
    pub fn name(&self, id: SymbolId) -> &[u8] {
        &self.names[id.index()]
    }

    /// How the symbol was declared.
    #[must_use]
    pub fn kind(&self, id: SymbolId) -> SymbolKind {
        self.kinds[id.index()]
    }

    /// Returns true for variables.
    #[must_use]
    pub fn is_variable(&self, id: SymbolId) -> bool {
        self.kind(id) == SymbolKind::Variable
    }

    /// Returns true if the symbol is declared and in scope at statement `at`.
    #[must_use]
    pub fn is_active(&self, id: SymbolId, at: StatementIndex) -> bool {
        let ranges = &self.activity[id.index()];
        let ix = ranges.partition_point(|range| range.start <= at);
        ix > 0 && ranges[ix - 1].end > at
    }

    /// Number of symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no symbol was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn declare(&mut self, name: &[u8], kind: SymbolKind, at: StatementIndex) -> SymbolId {
        let id = match self.ids.get(name) {
            Some(&id) => id,
            None => {
                #[allow(clippy::cast_possible_truncation)]
                let id = SymbolId(self.names.len() as u32);
                self.names.push(name.into());
                self.ids.insert(name.into(), id);
                self.kinds.push(kind);
                self.activity.push(Vec::new());
                id
            }
        };
        self.activity[id.index()].push(at..StatementIndex::MAX);
        id
    }

    fn close(&mut self, id: SymbolId, at: StatementIndex) {
        if let Some(range) = self.activity[id.index()].last_mut() {
            range.end = at;
        }
    }
}

/// Where a label is defined, and until where it may be referenced.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LabelInfo {
    /// The defining statement.
    pub index: StatementIndex,
    /// The statement closing its block, for hypotheses; `usize::MAX` for
    /// assertions.
    pub end: StatementIndex,
}

/// A hypothesis, as it appears in frames and in proofs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hyp {
    /// A `$f` hypothesis, which is checked against the typecode on the stack
    /// and then used to augment the substitution.
    Floating {
        /// The `$f` statement.
        stmt: StatementIndex,
        /// Its label.
        label: Token,
        /// The typecode.
        typecode: SymbolId,
        /// The variable it types.
        var: SymbolId,
    },
    /// An `$e` hypothesis, which is substituted and then compared to a stack
    /// slot.
    Essential {
        /// The `$e` statement.
        stmt: StatementIndex,
        /// Its label.
        label: Token,
        /// The typecode.
        typecode: SymbolId,
        /// The formula, without the typecode.
        expr: Box<[SymbolId]>,
    },
}

impl Hyp {
    /// The defining statement.
    #[must_use]
    pub const fn stmt(&self) -> StatementIndex {
        match self {
            Hyp::Floating { stmt, .. } | Hyp::Essential { stmt, .. } => *stmt,
        }
    }

    /// The label.
    #[must_use]
    pub fn label(&self) -> &[u8] {
        match self {
            Hyp::Floating { label, .. } | Hyp::Essential { label, .. } => label,
        }
    }

    /// The typecode.
    #[must_use]
    pub const fn typecode(&self) -> SymbolId {
        match self {
            Hyp::Floating { typecode, .. } | Hyp::Essential { typecode, .. } => *typecode,
        }
    }

    /// The formula pushed when the hypothesis is used as a proof step, without
    /// the typecode.
    #[must_use]
    pub fn expr(&self) -> &[SymbolId] {
        match self {
            Hyp::Floating { var, .. } => std::slice::from_ref(var),
            Hyp::Essential { expr, .. } => expr,
        }
    }
}

/// The resolved context of one assertion.
#[derive(Clone, Debug)]
pub struct Frame {
    /// `Axiom` or `Provable`.
    pub stype: StatementType,
    /// The assertion statement.
    pub stmt: StatementIndex,
    /// Its label.
    pub label: Token,
    /// Typecode of the goal.
    pub typecode: SymbolId,
    /// The goal, without the typecode.
    pub target: Box<[SymbolId]>,
    /// Ordered list of mandatory hypotheses.
    ///
    /// The last entry corresponds to the top of the stack at application
    /// time.  The n-th `Floating` entry types the variable with `VarIndex` n.
    pub hypotheses: Box<[Hyp]>,
    /// Mapping from variable indices to the variables.  The mandatory
    /// variables come first, followed by the other variables with an active
    /// `$f`, which a proof may use as dummies.
    pub var_list: Box<[SymbolId]>,
    /// Length of the prefix of `var_list` representing mandatory variables.
    pub mandatory_count: usize,
    /// Pairs of mandatory variables which must be substituted disjointly.
    pub mandatory_dv: Box<[(VarIndex, VarIndex)]>,
    /// Two-dimensional bit array of pairs of variables which can be treated as
    /// disjoint in proofs of this frame.
    pub optional_dv: Box<[Bitset]>,
    /// The `$f` statements of the optional variables.
    pub optional_hyps: Box<[StatementIndex]>,
}

impl Frame {
    /// The mandatory variables.
    #[must_use]
    pub fn mandatory_vars(&self) -> &[SymbolId] {
        &self.var_list[..self.mandatory_count]
    }

    /// The index of a variable in `var_list`.
    #[must_use]
    pub fn var_index(&self, var: SymbolId) -> Option<VarIndex> {
        self.var_list.iter().position(|&v| v == var)
    }

    /// Returns true if a proof of this frame may treat the two variables as
    /// disjoint.
    #[must_use]
    pub fn are_disjoint(&self, a: SymbolId, b: SymbolId) -> bool {
        match (self.var_index(a), self.var_index(b)) {
            (Some(a), Some(b)) => self.optional_dv[a].has_bit(b),
            _ => false,
        }
    }
}

/// The result of scope checking.
#[derive(Debug, Default)]
pub struct ScopeResult {
    symbols: SymbolTable,
    labels: HashMap<Token, LabelInfo>,
    frames: HashMap<StatementIndex, Frame>,
    hyps: HashMap<StatementIndex, Hyp>,
    failed: HashSet<StatementIndex>,
    diagnostics: Vec<(StatementIndex, Diagnostic)>,
}

impl ScopeResult {
    /// The symbol table.
    #[must_use]
    pub const fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// The frame of an assertion, if it was built without errors.
    #[must_use]
    pub fn frame(&self, stmt: StatementIndex) -> Option<&Frame> {
        self.frames.get(&stmt)
    }

    /// The hypothesis defined by a `$f` or `$e` statement.
    #[must_use]
    pub fn hyp(&self, stmt: StatementIndex) -> Option<&Hyp> {
        self.hyps.get(&stmt)
    }

    /// Looks up a label.
    #[must_use]
    pub fn label(&self, name: &[u8]) -> Option<LabelInfo> {
        self.labels.get(name).copied()
    }

    /// Returns true if a scope error was reported for the statement, or it
    /// depends on a hypothesis which had one.
    #[must_use]
    pub fn is_broken(&self, stmt: StatementIndex) -> bool {
        self.failed.contains(&stmt)
    }

    /// Resolves a math string against the symbol table.
    #[must_use]
    pub fn lookup_math(&self, math: &[Token]) -> Option<Vec<SymbolId>> {
        math.iter().map(|tok| self.symbols.lookup(tok)).collect()
    }

    /// All diagnostics of the pass.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<(StatementIndex, Diagnostic)> {
        self.diagnostics.clone()
    }
}

/// One open `${ $}` block.
#[derive(Default)]
struct Block {
    vars: Vec<SymbolId>,
    floats: Vec<SymbolId>,
    hyps: usize,
    dv: usize,
}

struct ScopeState<'a> {
    statements: &'a [Statement],
    result: ScopeResult,
    blocks: Vec<Block>,
    active_hyps: Vec<StatementIndex>,
    active_floats: HashMap<SymbolId, StatementIndex>,
    active_dv: Vec<(SymbolId, SymbolId)>,
}

impl ScopeState<'_> {
    fn diag(&mut self, ix: StatementIndex, diag: Diagnostic) {
        self.result.failed.insert(ix);
        self.result.diagnostics.push((ix, diag));
    }

    /// Registers the label of a `$f $e $a $p` statement.
    fn check_label_dup(&mut self, ix: StatementIndex, label: &[u8]) -> bool {
        if let Some(previous) = self.result.labels.get(label) {
            let previous = previous.index;
            self.diag(
                ix,
                Diagnostic::new(Category::Scope, "duplicate-label", Anchor::Label)
                    .label("label", label)
                    .xref("previous", previous, Anchor::Label),
            );
            return false;
        }
        self.result.labels.insert(
            label.into(),
            LabelInfo {
                index: ix,
                end: StatementIndex::MAX,
            },
        );
        if self.result.symbols.lookup(label).is_some() {
            self.diag(
                ix,
                Diagnostic::new(Category::Scope, "label-is-symbol", Anchor::Label).label("label", label),
            );
            return false;
        }
        true
    }

    /// Checks a `$e $a $p` math string; returns the resolved symbols if all
    /// are active, constants come first and every variable has a `$f`.
    fn check_eap(&mut self, ix: StatementIndex, math: &[Token]) -> Option<Vec<SymbolId>> {
        let mut out = Vec::with_capacity(math.len());
        let mut ok = true;
        for (pos, tok) in math.iter().enumerate() {
            let id = match self.result.symbols.lookup(tok) {
                Some(id) if self.result.symbols.is_active(id, ix) => id,
                _ => {
                    self.diag(
                        ix,
                        Diagnostic::new(Category::Scope, "inactive-symbol", Anchor::Math(pos))
                            .label("symbol", tok),
                    );
                    ok = false;
                    continue;
                }
            };
            if self.result.symbols.is_variable(id) {
                if pos == 0 {
                    self.diag(
                        ix,
                        Diagnostic::new(Category::Scope, "typecode-not-constant", Anchor::Math(0))
                            .label("symbol", tok),
                    );
                    ok = false;
                } else if !self.active_floats.contains_key(&id) {
                    self.diag(
                        ix,
                        Diagnostic::new(Category::Scope, "variable-missing-float", Anchor::Math(pos))
                            .label("symbol", tok),
                    );
                    ok = false;
                }
            }
            out.push(id);
        }
        (ok && !out.is_empty()).then_some(out)
    }

    fn scope_check_open(&mut self) {
        self.blocks.push(Block {
            hyps: self.active_hyps.len(),
            dv: self.active_dv.len(),
            ..Block::default()
        });
    }

    fn scope_check_close(&mut self, ix: StatementIndex) {
        let Some(block) = self.blocks.pop() else {
            self.diag(ix, Diagnostic::new(Category::Scope, "unmatched-close", Anchor::Keyword));
            return;
        };
        for var in block.vars {
            self.result.symbols.close(var, ix);
        }
        for var in block.floats {
            self.active_floats.remove(&var);
        }
        for hyp in self.active_hyps.drain(block.hyps..) {
            if let Some(label) = self.statements[hyp].label() {
                if let Some(info) = self.result.labels.get_mut(label) {
                    info.end = ix;
                }
            }
        }
        self.active_dv.truncate(block.dv);
    }

    fn scope_check_constant(&mut self, ix: StatementIndex, math: &[Token]) {
        if !self.blocks.is_empty() {
            self.diag(
                ix,
                Diagnostic::new(Category::Scope, "constant-not-top-level", Anchor::Keyword),
            );
            return;
        }
        for (pos, tok) in math.iter().enumerate() {
            if self.check_new_symbol(ix, pos, tok) {
                self.result.symbols.declare(tok, SymbolKind::Constant, ix);
            }
        }
    }

    fn scope_check_variable(&mut self, ix: StatementIndex, math: &[Token]) {
        for (pos, tok) in math.iter().enumerate() {
            if self.check_new_symbol(ix, pos, tok) {
                let id = self.result.symbols.declare(tok, SymbolKind::Variable, ix);
                if let Some(block) = self.blocks.last_mut() {
                    block.vars.push(id);
                }
            }
        }
    }

    /// A symbol may be declared if it is not active, was never a constant
    /// and is not a label.
    fn check_new_symbol(&mut self, ix: StatementIndex, pos: usize, tok: &[u8]) -> bool {
        if let Some(id) = self.result.symbols.lookup(tok) {
            if self.result.symbols.is_active(id, ix)
                || self.result.symbols.kind(id) == SymbolKind::Constant
            {
                self.diag(
                    ix,
                    Diagnostic::new(Category::Scope, "symbol-redeclared", Anchor::Math(pos))
                        .label("symbol", tok),
                );
                return false;
            }
        }
        if let Some(info) = self.result.labels.get(tok) {
            let previous = info.index;
            self.diag(
                ix,
                Diagnostic::new(Category::Scope, "symbol-is-label", Anchor::Math(pos))
                    .label("symbol", tok)
                    .xref("previous", previous, Anchor::Label),
            );
            return false;
        }
        true
    }

    fn scope_check_dv(&mut self, ix: StatementIndex, math: &[Token]) {
        let mut vars: Vec<SymbolId> = Vec::with_capacity(math.len());
        for (pos, tok) in math.iter().enumerate() {
            match self.result.symbols.lookup(tok) {
                Some(id)
                    if self.result.symbols.is_variable(id)
                        && self.result.symbols.is_active(id, ix) =>
                {
                    if vars.contains(&id) {
                        self.diag(
                            ix,
                            Diagnostic::new(Category::Scope, "disjoint-repeated", Anchor::Math(pos))
                                .label("symbol", tok),
                        );
                    } else {
                        vars.push(id);
                    }
                }
                _ => self.diag(
                    ix,
                    Diagnostic::new(Category::Scope, "disjoint-not-variable", Anchor::Math(pos))
                        .label("symbol", tok),
                ),
            }
        }
        for (i, &a) in vars.iter().enumerate() {
            for &b in &vars[i + 1..] {
                self.active_dv.push((a.min(b), a.max(b)));
            }
        }
    }

    fn scope_check_float(&mut self, ix: StatementIndex, label: &[u8], math: &[Token]) {
        let label_ok = self.check_label_dup(ix, label);
        if math.len() != 2 {
            self.diag(ix, Diagnostic::new(Category::Scope, "float-shape", Anchor::Statement));
            return;
        }
        let symbols = &self.result.symbols;
        let typecode = symbols
            .lookup(&math[0])
            .filter(|&id| !symbols.is_variable(id) && symbols.is_active(id, ix));
        let var = symbols
            .lookup(&math[1])
            .filter(|&id| symbols.is_variable(id) && symbols.is_active(id, ix));
        let Some(typecode) = typecode else {
            self.diag(
                ix,
                Diagnostic::new(Category::Scope, "float-not-constant", Anchor::Math(0))
                    .label("symbol", &math[0]),
            );
            return;
        };
        let Some(var) = var else {
            self.diag(
                ix,
                Diagnostic::new(Category::Scope, "float-not-variable", Anchor::Math(1))
                    .label("symbol", &math[1]),
            );
            return;
        };
        if let Some(&previous) = self.active_floats.get(&var) {
            self.diag(
                ix,
                Diagnostic::new(Category::Scope, "float-redeclared", Anchor::Math(1))
                    .label("symbol", &math[1])
                    .xref("previous", previous, Anchor::Statement),
            );
            return;
        }
        if !label_ok {
            return;
        }
        self.active_floats.insert(var, ix);
        if let Some(block) = self.blocks.last_mut() {
            block.floats.push(var);
        }
        self.active_hyps.push(ix);
        self.result.hyps.insert(
            ix,
            Hyp::Floating {
                stmt: ix,
                label: label.into(),
                typecode,
                var,
            },
        );
    }

    fn scope_check_essential(&mut self, ix: StatementIndex, label: &[u8], math: &[Token]) {
        let label_ok = self.check_label_dup(ix, label);
        let expr = self.check_eap(ix, math);
        // a broken $e still occupies its place, so that dependent assertions
        // are skipped rather than misreported
        self.active_hyps.push(ix);
        if let (true, Some(expr)) = (label_ok, expr) {
            self.result.hyps.insert(
                ix,
                Hyp::Essential {
                    stmt: ix,
                    label: label.into(),
                    typecode: expr[0],
                    expr: expr[1..].into(),
                },
            );
        } else {
            self.result.failed.insert(ix);
        }
    }

    fn scope_check_assert(
        &mut self,
        ix: StatementIndex,
        stype: StatementType,
        label: &[u8],
        math: &[Token],
    ) {
        let label_ok = self.check_label_dup(ix, label);
        let expr = self.check_eap(ix, math);
        let (true, Some(expr)) = (label_ok, expr) else {
            return;
        };
        if let Some(frame) = self.construct_full_frame(ix, stype, label, &expr) {
            self.result.frames.insert(ix, frame);
        } else {
            self.result.failed.insert(ix);
        }
    }

    /// Builds the frame of an assertion from the active hypotheses.  Returns
    /// `None` if a mandatory hypothesis is broken.
    fn construct_full_frame(
        &self,
        ix: StatementIndex,
        stype: StatementType,
        label: &[u8],
        expr: &[SymbolId],
    ) -> Option<Frame> {
        let symbols = &self.result.symbols;
        let mut mandatory: HashSet<SymbolId> = expr
            .iter()
            .copied()
            .filter(|&s| symbols.is_variable(s))
            .collect();
        for &hyp in &self.active_hyps {
            if self.statements[hyp].statement_type() != StatementType::Essential {
                continue;
            }
            match self.result.hyps.get(&hyp) {
                Some(Hyp::Essential { expr, .. }) => {
                    mandatory.extend(expr.iter().copied().filter(|&s| symbols.is_variable(s)));
                }
                _ => return None,
            }
        }

        let mut hypotheses = Vec::new();
        let mut var_list = Vec::new();
        let mut optional_vars = Vec::new();
        let mut optional_hyps = Vec::new();
        for &hyp in &self.active_hyps {
            let h = self.result.hyps.get(&hyp)?;
            match *h {
                Hyp::Floating { var, .. } if !mandatory.contains(&var) => {
                    optional_vars.push(var);
                    optional_hyps.push(hyp);
                }
                Hyp::Floating { var, .. } => {
                    var_list.push(var);
                    hypotheses.push(h.clone());
                }
                Hyp::Essential { .. } => hypotheses.push(h.clone()),
            }
        }
        let mandatory_count = var_list.len();
        var_list.extend(optional_vars);

        let index_of = |var: SymbolId| var_list.iter().position(|&v| v == var);
        let mut mandatory_dv = Vec::new();
        let mut optional_dv = vec![Bitset::new(); var_list.len()];
        for &(a, b) in &self.active_dv {
            let (Some(ia), Some(ib)) = (index_of(a), index_of(b)) else {
                continue;
            };
            optional_dv[ia].set_bit(ib);
            optional_dv[ib].set_bit(ia);
            if ia < mandatory_count && ib < mandatory_count && !mandatory_dv.contains(&(ia, ib)) {
                mandatory_dv.push((ia, ib));
            }
        }

        Some(Frame {
            stype,
            stmt: ix,
            label: label.into(),
            typecode: expr[0],
            target: expr[1..].into(),
            hypotheses: hypotheses.into(),
            var_list: var_list.into(),
            mandatory_count,
            mandatory_dv: mandatory_dv.into(),
            optional_dv: optional_dv.into(),
            optional_hyps: optional_hyps.into(),
        })
    }

    fn scope_check_single(&mut self, ix: StatementIndex) {
        let statements = self.statements;
        match statements[ix].kind() {
            StatementKind::Open => self.scope_check_open(),
            StatementKind::Close => self.scope_check_close(ix),
            StatementKind::Constant { math } => self.scope_check_constant(ix, math),
            StatementKind::Variable { math } => self.scope_check_variable(ix, math),
            StatementKind::Disjoint { math } => self.scope_check_dv(ix, math),
            StatementKind::Floating { label, math } => self.scope_check_float(ix, label, math),
            StatementKind::Essential { label, math } => self.scope_check_essential(ix, label, math),
            StatementKind::Axiom { label, math } => {
                self.scope_check_assert(ix, StatementType::Axiom, label, math);
            }
            StatementKind::Provable { label, math, .. } => {
                self.scope_check_assert(ix, StatementType::Provable, label, math);
            }
            StatementKind::Eof if !self.blocks.is_empty() => {
                let count = self.blocks.len();
                self.diag(
                    ix,
                    Diagnostic::new(Category::Scope, "unclosed-scope", Anchor::Statement)
                        .text("count", count.to_string()),
                );
            }
            _ => {}
        }
    }
}

/// Runs the scope pass over a statement list.
#[must_use]
pub fn scope_check(statements: &[Statement]) -> ScopeResult {
    let mut state = ScopeState {
        statements,
        result: ScopeResult::default(),
        blocks: Vec::new(),
        active_hyps: Vec::new(),
        active_floats: HashMap::default(),
        active_dv: Vec::new(),
    };
    for ix in 0..statements.len() {
        state.scope_check_single(ix);
    }
    state.result
}

/// The scope pass as a database analyzer.
#[derive(Debug)]
pub struct ScopePass;

impl Analyzer for ScopePass {
    type Output = ScopeResult;
    const NAME: &'static str = "scopeck";

    fn compute(db: &mut Database) -> ScopeResult {
        scope_check(db.statements())
    }

    fn diagnostics(output: &ScopeResult) -> Vec<(StatementIndex, Diagnostic)> {
        output.diagnostics()
    }
}
