//! The proof verifier itself.
//!
//! This is structured as an analysis pass whose only output is the
//! diagnostics of each `$p` statement.
//!
//! Checking a proof is a kind of interpreter.  There is a stack of known
//! results; each step is an operation which pops zero or more results off the
//! stack, does local checks, and pushes a new result.  A hypothesis of the
//! proof's own frame, or a saved step of a compressed proof, is pushed as is.
//! An assertion pops one entry per mandatory hypothesis, matches the floating
//! hypotheses against the typecodes to build a substitution, checks the
//! essential hypotheses and the `$d` conditions under that substitution, and
//! pushes its substituted goal.
//!
//! Math strings live in an [`ExprStore`].  The default store appends symbols
//! to one long buffer, which is fast while formulas stay small.  When a
//! substitution would produce a formula longer than
//! [`DbOptions::abr_threshold`](crate::database::DbOptions), the whole proof
//! is checked again from the start with formulas kept in a persistent
//! [`StringStore`], where substitution and comparison cost a logarithmic
//! number of node operations instead of the length of the formulas.
//!
//! A `?` step pushes an unknown entry.  Assertions applied to unknown entries
//! are checked as far as the known entries allow, and the proof is reported as
//! incomplete once everything else has passed.

use crate::abr::{NodeRef, StringStore};
use crate::bit_set::Bitset;
use crate::database::{Analyzer, Database};
use crate::diag::{Anchor, Category, Diagnostic};
use crate::scopeck::{Frame, Hyp, ScopeResult, SymbolId};
use crate::statement::{Statement, StatementIndex, StatementType, Token};
use crate::util::{fast_extend, HashMap};
use log::{debug, info};
use std::ops::Range;

/// Why a proof check stopped early.
enum Failure {
    /// The proof is wrong; the check ends here.
    Errors(Vec<Diagnostic>),
    /// A formula outgrew the plain store.
    Overflow,
}

impl From<Diagnostic> for Failure {
    fn from(diag: Diagnostic) -> Self {
        Failure::Errors(vec![diag])
    }
}

type Result<T> = std::result::Result<T, Failure>;

// Proofs are very fragile and there are very few situations where errors are
// recoverable, so we bail out using Result on any error.
macro_rules! try_assert {
    ( $cond:expr , $($arg:tt)+ ) => {
        if !$cond {
            return Err(Failure::from($($arg)+))
        }
    }
}

/// Storage for the math strings on the proof stack, without typecodes.
trait ExprStore {
    type Expr: Clone;

    /// Stores a string of symbols.
    fn store(&mut self, symbols: &[SymbolId]) -> Result<Self::Expr>;

    /// Builds `template` with each variable `vars[i]` replaced by `subst[i]`.
    /// All variables of the template which are in `vars` must have a
    /// substitution.
    fn substitute(
        &mut self,
        template: &[SymbolId],
        vars: &[SymbolId],
        subst: &[Option<Self::Expr>],
    ) -> Result<Self::Expr>;

    /// Equality of two stored strings.
    fn equal(&self, a: &Self::Expr, b: &Self::Expr) -> bool;

    /// The symbols of a stored string.
    fn symbols(&self, expr: &Self::Expr) -> Vec<SymbolId>;
}

/// Formulas as ranges of one long buffer.
struct PlainExprs {
    buffer: Vec<SymbolId>,
    limit: usize,
}

impl ExprStore for PlainExprs {
    type Expr = Range<usize>;

    fn store(&mut self, symbols: &[SymbolId]) -> Result<Range<usize>> {
        let start = self.buffer.len();
        fast_extend(&mut self.buffer, symbols);
        Ok(start..self.buffer.len())
    }

    fn substitute(
        &mut self,
        template: &[SymbolId],
        vars: &[SymbolId],
        subst: &[Option<Range<usize>>],
    ) -> Result<Range<usize>> {
        let start = self.buffer.len();
        for &symbol in template {
            match vars.iter().position(|&var| var == symbol) {
                Some(ix) => {
                    if let Some(range) = &subst[ix] {
                        self.buffer.extend_from_within(range.clone());
                    }
                }
                None => self.buffer.push(symbol),
            }
            if self.buffer.len() - start > self.limit {
                self.buffer.truncate(start);
                return Err(Failure::Overflow);
            }
        }
        Ok(start..self.buffer.len())
    }

    fn equal(&self, a: &Range<usize>, b: &Range<usize>) -> bool {
        self.buffer[a.clone()] == self.buffer[b.clone()]
    }

    fn symbols(&self, expr: &Range<usize>) -> Vec<SymbolId> {
        self.buffer[expr.clone()].to_vec()
    }
}

/// Formulas as persistent strings.
#[derive(Default)]
struct AbrExprs {
    strings: StringStore,
}

impl ExprStore for AbrExprs {
    type Expr = NodeRef;

    fn store(&mut self, symbols: &[SymbolId]) -> Result<NodeRef> {
        let values: Vec<u32> = symbols.iter().map(|symbol| symbol.0).collect();
        Ok(self.strings.from_array(&values))
    }

    fn substitute(
        &mut self,
        template: &[SymbolId],
        vars: &[SymbolId],
        subst: &[Option<NodeRef>],
    ) -> Result<NodeRef> {
        let mut out = NodeRef::EMPTY;
        let mut constants = Vec::new();
        for &symbol in template {
            match vars.iter().position(|&var| var == symbol) {
                Some(ix) => {
                    if !constants.is_empty() {
                        let run = self.strings.from_array(&constants);
                        out = self.strings.concat(out, run);
                        constants.clear();
                    }
                    if let Some(node) = subst[ix] {
                        out = self.strings.concat(out, node);
                    }
                }
                None => constants.push(symbol.0),
            }
        }
        if !constants.is_empty() {
            let run = self.strings.from_array(&constants);
            out = self.strings.concat(out, run);
        }
        Ok(out)
    }

    fn equal(&self, a: &NodeRef, b: &NodeRef) -> bool {
        self.strings.equal(*a, *b)
    }

    fn symbols(&self, expr: &NodeRef) -> Vec<SymbolId> {
        self.strings.to_array(*expr).into_iter().map(SymbolId).collect()
    }
}

/// An entry on the stack.
///
/// This is notionally just a string of math symbols, but DV checking is
/// faster if we track the variables of the proof's frame as a bit vector, and
/// the typecode is not realignable so it can be profitably separated.
#[derive(Clone, Debug)]
enum Slot<E> {
    Known {
        typecode: SymbolId,
        expr: E,
        vars: Bitset,
    },
    /// The result of a `?` step, or of an assertion applied to one.
    Unknown,
}

/// Preparing a step means that it can be referenced by number in a compressed
/// proof.  Prepared steps are either hypotheses and saved results, which are
/// copied directly onto the stack, or previously proved assertions which
/// require substitution before use.
enum Step<'a, E> {
    Push(Slot<E>),
    Apply(&'a Frame),
}

/// Working memory for one proof.
struct Verifier<'a, S: ExprStore> {
    scope: &'a ScopeResult,
    /// The frame of the statement being proved
    frame: &'a Frame,
    exprs: S,
    prepared: Vec<Step<'a, S::Expr>>,
    stack: Vec<Slot<S::Expr>>,
    /// Substitution being built while applying an assertion, by `VarIndex`
    subst: Vec<Option<S::Expr>>,
    subst_vars: Vec<Bitset>,
    incomplete: bool,
}

impl<'a, S: ExprStore> Verifier<'a, S> {
    fn new(scope: &'a ScopeResult, frame: &'a Frame, exprs: S) -> Self {
        Verifier {
            scope,
            frame,
            exprs,
            prepared: Vec::new(),
            stack: Vec::new(),
            subst: Vec::new(),
            subst_vars: Vec::new(),
            incomplete: false,
        }
    }

    fn name(&self, symbol: SymbolId) -> &'a [u8] {
        self.scope.symbols().name(symbol)
    }

    fn tokens(&self, symbols: &[SymbolId]) -> Vec<Token> {
        symbols.iter().map(|&symbol| self.name(symbol).into()).collect()
    }

    fn math(&self, expr: &S::Expr) -> Vec<Token> {
        self.tokens(&self.exprs.symbols(expr))
    }

    fn hyp_slot(&mut self, hyp: &Hyp) -> Result<Slot<S::Expr>> {
        let mut vars = Bitset::new();
        for &symbol in hyp.expr() {
            if let Some(ix) = self.frame.var_index(symbol) {
                vars.set_bit(ix);
            }
        }
        Ok(Slot::Known {
            typecode: hyp.typecode(),
            expr: self.exprs.store(hyp.expr())?,
            vars,
        })
    }

    /// Resolves a step label: a hypothesis active in the proof's frame, or an
    /// earlier assertion.
    fn lookup_step(&mut self, label: &[u8]) -> Result<Option<Step<'a, S::Expr>>> {
        let frame = self.frame;
        let scope = self.scope;
        let own = frame.hypotheses.iter().chain(
            frame
                .optional_hyps
                .iter()
                .filter_map(|&stmt| scope.hyp(stmt)),
        );
        for hyp in own {
            if hyp.label() == label {
                return Ok(Some(Step::Push(self.hyp_slot(hyp)?)));
            }
        }
        Ok(scope
            .label(label)
            .filter(|info| info.index < frame.stmt)
            .and_then(|info| scope.frame(info.index))
            .map(Step::Apply))
    }

    fn unknown_step(label: &[u8], at: usize) -> Diagnostic {
        Diagnostic::new(Category::Verify, "unknown-step", Anchor::Proof(at)).label("label", label)
    }

    fn execute(&mut self, ix: usize, at: usize) -> Result<()> {
        match &self.prepared[ix] {
            Step::Push(slot) => {
                self.stack.push(slot.clone());
                Ok(())
            }
            Step::Apply(frame) => {
                let frame = *frame;
                self.apply(frame, at)
            }
        }
    }

    /// Returns true if every variable of `template` has a known substitution.
    fn resolvable(&self, template: &[SymbolId], vars: &[SymbolId]) -> bool {
        template.iter().all(|symbol| {
            vars.iter()
                .position(|var| var == symbol)
                .map_or(true, |ix| self.subst[ix].is_some())
        })
    }

    /// This is the main "VM" function.
    fn apply(&mut self, frame: &'a Frame, at: usize) -> Result<()> {
        let needed = frame.hypotheses.len();
        let available = self.stack.len();
        try_assert!(
            needed <= available,
            Diagnostic::new(Category::Verify, "stack-underflow", Anchor::Proof(at))
                .label("label", &frame.label)
                .text("needed", needed.to_string())
                .text("available", available.to_string())
        );
        let base = available - needed;

        self.subst.clear();
        self.subst.resize(frame.mandatory_count, None);
        self.subst_vars.clear();
        self.subst_vars.resize(frame.mandatory_count, Bitset::new());

        // typecodes first; the n-th floating hypothesis types variable n
        let mut var_ix = 0;
        for (hyp, slot) in frame.hypotheses.iter().zip(&self.stack[base..]) {
            if let Slot::Known {
                typecode,
                expr,
                vars,
            } = slot
            {
                try_assert!(
                    *typecode == hyp.typecode(),
                    Diagnostic::new(Category::Verify, "type-mismatch", Anchor::Proof(at))
                        .label("hyp", hyp.label())
                        .label("label", &frame.label)
                        .label("expected", self.name(hyp.typecode()))
                        .label("found", self.name(*typecode))
                );
                if let Hyp::Floating { .. } = hyp {
                    self.subst[var_ix] = Some(expr.clone());
                    self.subst_vars[var_ix] = vars.clone();
                }
            }
            if let Hyp::Floating { .. } = hyp {
                var_ix += 1;
            }
        }

        let vars = frame.mandatory_vars();
        for (hyp, ix) in frame.hypotheses.iter().zip(base..) {
            let Hyp::Essential { expr: template, .. } = hyp else {
                continue;
            };
            let Slot::Known { expr: found, .. } = &self.stack[ix] else {
                continue;
            };
            if !self.resolvable(template, vars) {
                continue;
            }
            let found = found.clone();
            let expected = self.exprs.substitute(template, vars, &self.subst)?;
            try_assert!(
                self.exprs.equal(&expected, &found),
                Diagnostic::new(Category::Verify, "hyp-mismatch", Anchor::Proof(at))
                    .label("hyp", hyp.label())
                    .label("label", &frame.label)
                    .math("expected", self.math(&expected))
                    .math("found", self.math(&found))
            );
        }

        // every violated pair is reported
        let mut violations = Vec::new();
        for &(a, b) in &*frame.mandatory_dv {
            for x in &self.subst_vars[a] {
                for y in &self.subst_vars[b] {
                    let allowed = x != y
                        && self
                            .frame
                            .optional_dv
                            .get(x)
                            .is_some_and(|row| row.has_bit(y));
                    if !allowed {
                        violations.push(
                            Diagnostic::new(Category::Verify, "dv-violation", Anchor::Proof(at))
                                .label("label", &frame.label)
                                .label("first", self.name(self.frame.var_list[x]))
                                .label("second", self.name(self.frame.var_list[y])),
                        );
                    }
                }
            }
        }
        if !violations.is_empty() {
            return Err(Failure::Errors(violations));
        }

        let result = if self.resolvable(&frame.target, vars) {
            let expr = self.exprs.substitute(&frame.target, vars, &self.subst)?;
            let mut used = Bitset::new();
            for (ix, var) in vars.iter().enumerate() {
                if frame.target.contains(var) {
                    used |= &self.subst_vars[ix];
                }
            }
            Slot::Known {
                typecode: frame.typecode,
                expr,
                vars: used,
            }
        } else {
            Slot::Unknown
        };
        self.stack.truncate(base);
        self.stack.push(result);
        Ok(())
    }

    fn push_unknown(&mut self) {
        self.stack.push(Slot::Unknown);
        self.incomplete = true;
    }

    /// NORMAL mode proofs are just a list of steps.
    fn run_explicit(&mut self, proof: &'a [Token]) -> Result<()> {
        let mut cache: HashMap<&'a [u8], usize> = HashMap::default();
        for (at, token) in proof.iter().enumerate() {
            if &**token == b"?" {
                self.push_unknown();
                continue;
            }
            let ix = match cache.get(&**token) {
                Some(&ix) => ix,
                None => {
                    let step = self
                        .lookup_step(token)?
                        .ok_or_else(|| Self::unknown_step(token, at))?;
                    self.prepared.push(step);
                    cache.insert(token, self.prepared.len() - 1);
                    self.prepared.len() - 1
                }
            };
            self.execute(ix, at)?;
        }
        Ok(())
    }

    /// Compressed proofs preload the mandatory hypotheses, then the labels of
    /// the roster, then every step saved with `Z`; steps refer to them by
    /// number.
    fn run_compressed(&mut self, proof: &'a [Token]) -> Result<()> {
        for hyp in &*self.frame.hypotheses {
            let slot = self.hyp_slot(hyp)?;
            self.prepared.push(Step::Push(slot));
        }

        let mut ix = 1;
        loop {
            let Some(token) = proof.get(ix) else {
                return Err(Diagnostic::new(
                    Category::Verify,
                    "compressed-unclosed-roster",
                    Anchor::Proof(0),
                )
                .into());
            };
            if &**token == b")" {
                ix += 1;
                break;
            }
            try_assert!(
                !self.frame.hypotheses.iter().any(|hyp| hyp.label() == &**token),
                Diagnostic::new(Category::Verify, "roster-hypothesis", Anchor::Proof(ix))
                    .label("label", token)
            );
            let step = self
                .lookup_step(token)?
                .ok_or_else(|| Self::unknown_step(token, ix))?;
            self.prepared.push(step);
            ix += 1;
        }

        // after ) is a packed list of numbers: U-Y are base 5 digits, A-T a
        // final base 20 digit
        let mut number = 0usize;
        let mut can_save = false;
        for (at, token) in proof.iter().enumerate().skip(ix) {
            for &ch in token.iter() {
                match ch {
                    b'A'..=b'T' => {
                        number = number.saturating_mul(20).saturating_add(usize::from(ch - b'A'));
                        try_assert!(
                            number < self.prepared.len(),
                            Diagnostic::new(
                                Category::Verify,
                                "compressed-recall-range",
                                Anchor::Proof(at)
                            )
                            .text("number", number.saturating_add(1).to_string())
                        );
                        self.execute(number, at)?;
                        number = 0;
                        can_save = true;
                    }
                    b'U'..=b'Y' => {
                        number = number.saturating_mul(5).saturating_add(usize::from(ch - b'U') + 1);
                        can_save = false;
                    }
                    b'Z' => {
                        try_assert!(
                            can_save,
                            Diagnostic::new(Category::Verify, "compressed-bad-save", Anchor::Proof(at))
                        );
                        if let Some(top) = self.stack.last() {
                            self.prepared.push(Step::Push(top.clone()));
                        }
                        can_save = false;
                    }
                    b'?' => {
                        try_assert!(
                            number == 0,
                            Diagnostic::new(Category::Verify, "compressed-leftover", Anchor::Proof(at))
                        );
                        self.push_unknown();
                        can_save = false;
                    }
                    _ => {
                        return Err(Diagnostic::new(
                            Category::Verify,
                            "compressed-bad-char",
                            Anchor::Proof(at),
                        )
                        .text("char", char::from(ch).to_string())
                        .into())
                    }
                }
            }
        }
        try_assert!(
            number == 0,
            Diagnostic::new(
                Category::Verify,
                "compressed-leftover",
                Anchor::Proof(proof.len().saturating_sub(1))
            )
        );
        Ok(())
    }

    // if we get here, it's a valid proof, but was it the _right_ valid proof?
    fn finish(&mut self) -> Result<()> {
        try_assert!(
            self.stack.len() == 1,
            Diagnostic::new(Category::Verify, "bad-stack-depth", Anchor::Statement)
                .text("depth", self.stack.len().to_string())
        );
        let Slot::Known { typecode, expr, .. } = self.stack[0].clone() else {
            return Ok(());
        };
        try_assert!(
            typecode == self.frame.typecode,
            Diagnostic::new(Category::Verify, "wrong-type-end", Anchor::Statement)
                .label("found", self.name(typecode))
                .label("expected", self.name(self.frame.typecode))
        );
        let goal = self.exprs.store(&self.frame.target)?;
        try_assert!(
            self.exprs.equal(&expr, &goal),
            Diagnostic::new(Category::Verify, "wrong-goal", Anchor::Statement)
                .math("found", self.math(&expr))
                .math("expected", self.tokens(&self.frame.target))
        );
        Ok(())
    }

    /// Checks the proof; `Err` means the store overflowed.
    fn run(mut self, proof: &'a [Token]) -> std::result::Result<ProofReport, ()> {
        let outcome = if proof.first().is_some_and(|token| &**token == b"(") {
            self.run_compressed(proof)
        } else {
            self.run_explicit(proof)
        };
        let diagnostics = match outcome.and_then(|()| self.finish()) {
            Ok(()) if self.incomplete => vec![Diagnostic::new(
                Category::Verify,
                "incomplete-proof",
                Anchor::Statement,
            )],
            Ok(()) => Vec::new(),
            Err(Failure::Errors(diagnostics)) => diagnostics,
            Err(Failure::Overflow) => return Err(()),
        };
        Ok(ProofReport {
            diagnostics,
            depth: self.stack.len(),
            incomplete: self.incomplete,
            persistent: false,
        })
    }
}

/// The outcome of checking one proof.
#[derive(Clone, Debug, Default)]
pub struct ProofReport {
    /// Errors, or the incomplete proof warning.
    pub diagnostics: Vec<Diagnostic>,
    /// Stack depth when the check ended.
    pub depth: usize,
    /// The proof has `?` steps.
    pub incomplete: bool,
    /// The proof was checked with persistent strings.
    pub persistent: bool,
}

impl ProofReport {
    /// Returns true if no error was found.  An incomplete proof is valid as
    /// far as it goes.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Checks the proof of the assertion with the given frame.
fn verify_frame(statements: &[Statement], scope: &ScopeResult, frame: &Frame, threshold: usize) -> ProofReport {
    let proof = statements[frame.stmt].proof();
    let plain = PlainExprs {
        buffer: Vec::new(),
        limit: threshold,
    };
    if let Ok(report) = Verifier::new(scope, frame, plain).run(proof) {
        return report;
    }
    info!(
        "proof of {} builds formulas longer than {threshold} symbols, checking again with persistent strings",
        crate::as_str(&frame.label)
    );
    let mut report = Verifier::new(scope, frame, AbrExprs::default())
        .run(proof)
        .unwrap_or_else(|()| unreachable!("persistent strings have no length limit"));
    report.persistent = true;
    report
}

/// Analysis pass result for the verifier.
#[derive(Debug, Default)]
pub struct VerifyResult {
    reports: HashMap<StatementIndex, ProofReport>,
}

impl VerifyResult {
    /// Report errors found during database verification.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<(StatementIndex, Diagnostic)> {
        let mut out = Vec::new();
        for (&index, report) in &self.reports {
            for diag in &report.diagnostics {
                out.push((index, diag.clone()));
            }
        }
        out.sort_by_key(|&(index, _)| index);
        out
    }

    /// The report for one `$p` statement, if its proof was checked.
    #[must_use]
    pub fn report(&self, index: StatementIndex) -> Option<&ProofReport> {
        self.reports.get(&index)
    }

    /// Number of proofs checked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Returns true if no proof was checked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

/// Proof checking as a database analyzer.
#[derive(Debug)]
pub struct VerifyPass;

impl Analyzer for VerifyPass {
    type Output = VerifyResult;
    const NAME: &'static str = "verify";

    fn compute(db: &mut Database) -> VerifyResult {
        let scope = db.scope_result();
        let threshold = db.options().abr_threshold;
        let mut reports = HashMap::default();
        // only intend to check $p statements with a valid frame
        for stmt in db.statements() {
            if stmt.statement_type() != StatementType::Provable {
                continue;
            }
            if let Some(frame) = scope.frame(stmt.index()) {
                reports.insert(stmt.index(), verify_frame(db.statements(), &scope, frame, threshold));
            }
        }
        debug!(
            "verified {} proofs, {} with persistent strings",
            reports.len(),
            reports.values().filter(|report| report.persistent).count()
        );
        VerifyResult { reports }
    }

    fn diagnostics(output: &VerifyResult) -> Vec<(StatementIndex, Diagnostic)> {
        output.diagnostics()
    }
}

impl Database {
    /// Checks a single proof, without caching.  A statement with scope errors
    /// is not checked and gets an empty report.
    ///
    /// ## Panics
    /// Panics if the statement is not a `$p` statement.
    pub fn verify_one(&mut self, index: StatementIndex) -> ProofReport {
        assert!(
            self.statement(index).statement_type() == StatementType::Provable,
            "statement {index} is not a $p statement"
        );
        let scope = self.scope_result();
        match scope.frame(index) {
            Some(frame) => verify_frame(self.statements(), &scope, frame, self.options().abr_threshold),
            None => ProofReport::default(),
        }
    }
}
