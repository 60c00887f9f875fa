//! Toplevel database API.
//!
//! A [`Database`] owns the result of one scan: the [`ScanContext`] with all
//! sources and the committed zone chain, and the ordered list of
//! [`Statement`]s.  Everything else is derived.
//!
//! # Analyzers
//!
//! Derived results (scope checking, the grammar, formula parsing, proof
//! verification) are computed by [`Analyzer`]s.  Each analyzer is a type; its
//! output is computed on first request, cached under the analyzer's type and
//! handed out as an `Arc`.  Analyzers may request other analyzers while
//! computing.  Every mutation of the statement list drops all cached outputs;
//! there is no partial recomputation.
//!
//! # Mutation
//!
//! [`Database::replace_statements`] splices freshly scanned text into an
//! include-free database.  The fragment is scanned on its own, rebased into the
//! linear address space of the root file, and every registered
//! [`ChangeObserver`] is told which statements were removed and which were
//! added.
//!
//! # Positions
//!
//! Statements only store their classification and tokens.  Exact positions
//! are rebuilt on first use by rescanning the one statement (see
//! [`crate::scanner::reparse`]) unless `lazy_positions` is off, in which case
//! the scanner records them as it goes.

use crate::diag::{self, Anchor, Diagnostic, ErrorLocation};
use crate::grammar::{Grammar, GrammarPass, StmtParse, StmtParsePass};
use crate::scanner::{reparse, ScanContext, ScanStep, Scanner};
use crate::scopeck::{ScopePass, ScopeResult};
use crate::source::{is_mm_space, MemoryResolver, Source, SourceId, SourceResolver};
use crate::statement::{Positions, Statement, StatementIndex, StatementType, Token};
use crate::util::HashMap;
use crate::verify::{VerifyPass, VerifyResult};
use crate::zone::{ZoneChain, ZoneId};
use annotate_snippets::Message;
use log::debug;
use std::any::{Any, TypeId};
use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Structure for options that affect database processing, and must be constant
/// for the lifetime of the database container.
#[derive(Clone, Debug)]
pub struct DbOptions {
    /// If false, exact token positions are recorded during the scan instead
    /// of being rebuilt on demand.
    pub lazy_positions: bool,
    /// Grammar categories, tightest binding first.  When empty, the order is
    /// derived from the `$f` typecodes and the syntax axioms.
    pub categories: Vec<String>,
    /// Maps logical typecodes to the grammar category their formulas are
    /// parsed as.
    pub roles: Vec<(String, String)>,
    /// Formula length above which the verifier switches to the persistent
    /// string store.
    pub abr_threshold: usize,
    /// If true, the time taken by each analyzer is printed.
    pub timing: bool,
}

impl Default for DbOptions {
    fn default() -> Self {
        DbOptions {
            lazy_positions: true,
            categories: Vec::new(),
            roles: vec![("|-".to_owned(), "wff".to_owned())],
            abr_threshold: 1 << 16,
            timing: false,
        }
    }
}

fn time<R>(timing: bool, name: &str, f: impl FnOnce() -> R) -> R {
    let now = Instant::now();
    let ret = f();
    if timing {
        println!("{} {}ms", name, now.elapsed().as_millis());
    } else {
        debug!("{} {}ms", name, now.elapsed().as_millis());
    }
    ret
}

/// A lazily computed, cached result derived from the statement list.
pub trait Analyzer: 'static {
    /// The computed result.
    type Output: Send + Sync + 'static;

    /// A short name, used for timing output.
    const NAME: &'static str;

    /// Computes the result.  Other analyzers may be requested through `db`.
    fn compute(db: &mut Database) -> Self::Output;

    /// The diagnostics contained in a result.
    fn diagnostics(output: &Self::Output) -> Vec<(StatementIndex, Diagnostic)>;
}

struct Slot {
    value: Arc<dyn Any + Send + Sync>,
    diagnostics: Vec<(StatementIndex, Diagnostic)>,
}

/// What kind of splice a [`StatementChange`] describes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChangeHint {
    /// Statements were added and none removed.
    Insert,
    /// Statements were removed and none added.
    Delete,
    /// Statements were removed and others added in their place.
    Replace,
}

/// A notification sent to observers after each mutation.
#[derive(Debug)]
pub struct StatementChange<'a> {
    /// The kind of change.
    pub hint: ChangeHint,
    /// Index of the first removed or added statement.
    pub index: StatementIndex,
    /// The statements which were removed, with their old indices.
    pub removed: &'a [Statement],
    /// The statements which took their place, with their new indices.
    pub added: &'a [Statement],
}

/// Receives a synchronous notification for every statement splice.
pub trait ChangeObserver {
    /// Called after the statement list has been updated.
    fn on_change(&mut self, change: &StatementChange<'_>);
}

/// Synchronous parsing could not complete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DbError {
    /// The resolver left the named source pending.
    SourcePending(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::SourcePending(name) => {
                write!(f, "source {name} was not provided by the resolver")
            }
        }
    }
}

impl std::error::Error for DbError {}

/// A precondition of [`Database::replace_statements`] was violated.  The
/// database is unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplaceError {
    /// The statement range is out of bounds.
    OutOfRange {
        /// Requested start.
        from: StatementIndex,
        /// Requested end.
        to: StatementIndex,
        /// Number of statements.
        count: usize,
    },
    /// Nothing has been parsed yet.
    Empty,
    /// The database has scan errors.
    DatabaseHasErrors,
    /// The database or the replacement text uses include directives.
    IncludesUnsupported,
    /// The replacement text does not scan cleanly.
    FragmentHasErrors,
    /// The replacement text would be glued to the preceding statement.
    NoLeadingWhitespace,
    /// The statement following the replaced range would be glued to the
    /// replacement text.
    NoSeparatingWhitespace,
    /// The replacement would leave trailing whitespace other than at the end.
    DuplicateEof,
}

impl fmt::Display for ReplaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplaceError::OutOfRange { from, to, count } => {
                write!(f, "statement range {from}..{to} is out of bounds for {count} statements")
            }
            ReplaceError::Empty => write!(f, "the database has not been parsed"),
            ReplaceError::DatabaseHasErrors => write!(f, "the database has scan errors"),
            ReplaceError::IncludesUnsupported => {
                write!(f, "include directives cannot be edited incrementally")
            }
            ReplaceError::FragmentHasErrors => write!(f, "the replacement text has scan errors"),
            ReplaceError::NoLeadingWhitespace => {
                write!(f, "the replacement text must start with whitespace")
            }
            ReplaceError::NoSeparatingWhitespace => {
                write!(f, "the statement after the replacement must start with whitespace")
            }
            ReplaceError::DuplicateEof => {
                write!(f, "trailing whitespace is only allowed at the end of the database")
            }
        }
    }
}

impl std::error::Error for ReplaceError {}

/// Master type of database containers.
///
/// A variable of type `Database` holds a database, i.e. an ordered collection
/// of statements together with the sources they were scanned from and any
/// derived results computed so far.
pub struct Database {
    options: Arc<DbOptions>,
    ctx: ScanContext,
    statements: Vec<Statement>,
    labels: OnceCell<HashMap<Token, StatementIndex>>,
    analyzers: HashMap<TypeId, Slot>,
    observers: Vec<Box<dyn ChangeObserver>>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("options", &self.options)
            .field("statements", &self.statements.len())
            .field("analyzers", &self.analyzers.len())
            .finish_non_exhaustive()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(DbOptions::default())
    }
}

impl Database {
    /// Constructs a new database object representing an empty set of files.
    #[must_use]
    pub fn new(options: DbOptions) -> Database {
        Database {
            options: Arc::new(options),
            ctx: ScanContext::new(Box::<MemoryResolver>::default()),
            statements: Vec::new(),
            labels: OnceCell::new(),
            analyzers: HashMap::default(),
            observers: Vec::new(),
        }
    }

    /// Wraps the result of a scan driven by the caller, for example one which
    /// answered [`ScanStep::Pending`] by providing sources asynchronously.
    #[must_use]
    pub fn from_scan(options: DbOptions, ctx: ScanContext, statements: Vec<Statement>) -> Database {
        let mut db = Database::new(options);
        db.ctx = ctx;
        db.install(statements);
        db
    }

    /// Scans a database starting at the root file `root`, discarding any
    /// previous contents.  Every source must be answered synchronously.
    pub fn parse(&mut self, root: &str, resolver: Box<dyn SourceResolver>) -> Result<(), DbError> {
        let timing = self.options.timing;
        let record = !self.options.lazy_positions;
        let (ctx, statements) = time(timing, "parse", || {
            let mut ctx = ScanContext::new(resolver);
            let mut scanner = Scanner::new(root, record);
            let mut statements = Vec::new();
            loop {
                match scanner.next_statement(&mut ctx) {
                    ScanStep::Statement(stmt) => statements.push(stmt),
                    ScanStep::Pending(name) => return Err(DbError::SourcePending(name)),
                    ScanStep::Done => break,
                }
            }
            Ok((ctx, statements))
        })?;
        self.ctx = ctx;
        self.install(statements);
        Ok(())
    }

    /// Scans a database from in-memory `(name, text)` pairs.
    pub fn parse_with(&mut self, root: &str, files: Vec<(String, Vec<u8>)>) -> Result<(), DbError> {
        self.parse(root, Box::new(MemoryResolver::new(files)))
    }

    fn install(&mut self, statements: Vec<Statement>) {
        let old: Vec<Statement> = std::mem::replace(&mut self.statements, statements);
        self.invalidate();
        debug!("{} statements scanned", self.statements.len());
        self.notify(0, &old, self.statements.len());
    }

    fn invalidate(&mut self) {
        self.analyzers.clear();
        self.labels = OnceCell::new();
    }

    fn notify(&mut self, index: StatementIndex, removed: &[Statement], added: usize) {
        if self.observers.is_empty() || (removed.is_empty() && added == 0) {
            return;
        }
        let hint = match (removed.is_empty(), added == 0) {
            (true, _) => ChangeHint::Insert,
            (false, true) => ChangeHint::Delete,
            (false, false) => ChangeHint::Replace,
        };
        let change = StatementChange {
            hint,
            index,
            removed,
            added: &self.statements[index..index + added],
        };
        for observer in &mut self.observers {
            observer.on_change(&change);
        }
    }

    /// Registers an observer for all later mutations.
    pub fn observe(&mut self, observer: Box<dyn ChangeObserver>) {
        self.observers.push(observer);
    }

    /// Returns the options the database was created with.
    #[must_use]
    pub fn options(&self) -> &DbOptions {
        &self.options
    }

    /// All statements, in order.
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Accessor for one statement.
    ///
    /// ## Panics
    /// Panics if the index is out of range.
    #[must_use]
    pub fn statement(&self, index: StatementIndex) -> &Statement {
        &self.statements[index]
    }

    /// Finds the first statement carrying a label.
    #[must_use]
    pub fn statement_by_label(&self, label: &[u8]) -> Option<&Statement> {
        let labels = self.labels.get_or_init(|| {
            let mut labels = HashMap::default();
            for stmt in &self.statements {
                if let Some(label) = stmt.label() {
                    labels.entry(label.into()).or_insert(stmt.index());
                }
            }
            labels
        });
        labels.get(label).map(|&index| &self.statements[index])
    }

    /// All sources referenced by the scan.
    #[must_use]
    pub fn sources(&self) -> &[Source] {
        self.ctx.sources()
    }

    /// Accessor for one source.
    #[must_use]
    pub fn source(&self, id: SourceId) -> &Source {
        self.ctx.source(id)
    }

    /// The committed zone chain.
    #[must_use]
    pub fn chain(&self) -> &ZoneChain {
        self.ctx.chain()
    }

    /// The concatenated raw text of all statements, which is the text of all
    /// files in traversal order.
    #[must_use]
    pub fn text(&self) -> Vec<u8> {
        match self.statements.last() {
            Some(last) => self
                .chain()
                .text_span(self.sources(), ZoneId::default(), 0, last.end()),
            None => Vec::new(),
        }
    }

    /// The raw text of one statement, including its leading whitespace.
    #[must_use]
    pub fn raw_text(&self, index: StatementIndex) -> Vec<u8> {
        let stmt = &self.statements[index];
        self.chain()
            .text_span(self.sources(), stmt.zone, stmt.start, stmt.end())
    }

    /// The exact positions of a statement's parts, rebuilt on first use.
    #[must_use]
    pub fn positions(&self, index: StatementIndex) -> &Positions {
        let stmt = &self.statements[index];
        stmt.positions
            .get_or_init(|| reparse(self.ctx.chain(), self.ctx.sources(), stmt.zone, stmt.start))
    }

    /// Resolves a statement-relative anchor to a byte range in one source.
    #[must_use]
    pub fn locate(&self, index: StatementIndex, anchor: &Anchor) -> ErrorLocation {
        let stmt = &self.statements[index];
        let chain = self.chain();
        let span = |from: usize, to: usize| {
            let zone_id = chain.seek(stmt.zone, from);
            let zone = chain.zone(zone_id);
            let to = to.min(chain.end(zone_id, self.sources())).max(from);
            ErrorLocation {
                statement: index,
                source: zone.source,
                from: from - zone.offset_base,
                to: to - zone.offset_base,
            }
        };
        let token = |at: Option<usize>| {
            at.map(|at| {
                let mut loc = span(at, at);
                loc.to = self.source(loc.source).token_end(loc.from);
                loc
            })
        };
        let located = match *anchor {
            Anchor::SourceStart(source) => {
                return ErrorLocation {
                    statement: index,
                    source,
                    from: 0,
                    to: 0,
                }
            }
            Anchor::Relative(from, to) => return span(stmt.start + from, stmt.start + to),
            Anchor::Statement => None,
            Anchor::Label => token(self.positions(index).label),
            Anchor::Keyword => token(Some(self.positions(index).keyword)),
            Anchor::Math(ix) => token(self.positions(index).math.get(ix).copied()),
            Anchor::Proof(ix) => token(self.positions(index).proof.get(ix).copied()),
        };
        located.unwrap_or_else(|| {
            let positions = self.positions(index);
            span(positions.start, positions.end)
        })
    }

    /// Diagnostics recorded by the scanner.
    #[must_use]
    pub fn scan_diagnostics(&self) -> Vec<(StatementIndex, Diagnostic)> {
        self.statements
            .iter()
            .flat_map(|stmt| stmt.diagnostics().iter().map(|d| (stmt.index(), d.clone())))
            .collect()
    }

    /// Scan diagnostics plus those of every analyzer computed so far, sorted
    /// by statement.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<(StatementIndex, Diagnostic)> {
        let mut out = self.scan_diagnostics();
        for slot in self.analyzers.values() {
            out.extend(slot.diagnostics.iter().cloned());
        }
        out.sort_by_key(|(index, _)| *index);
        out
    }

    /// Converts diagnostics to annotation messages, in continuation passing
    /// style.
    pub fn render_diags<T>(
        &self,
        diags: Vec<(StatementIndex, Diagnostic)>,
        f: impl for<'a> FnOnce(Message<'a>) -> T + Copy,
    ) -> Vec<T> {
        diag::to_annotations(self, diags, f)
    }

    /// Returns the output of an analyzer, computing it if needed.
    pub fn analysis<A: Analyzer>(&mut self) -> Arc<A::Output> {
        let key = TypeId::of::<A>();
        if let Some(slot) = self.analyzers.get(&key) {
            if let Ok(output) = slot.value.clone().downcast::<A::Output>() {
                return output;
            }
        }
        let timing = self.options.timing;
        let output = Arc::new(time(timing, A::NAME, || A::compute(self)));
        self.analyzers.insert(
            key,
            Slot {
                value: output.clone(),
                diagnostics: A::diagnostics(&output),
            },
        );
        output
    }

    /// Returns true if the analyzer's output is cached.
    #[must_use]
    pub fn is_computed<A: Analyzer>(&self) -> bool {
        self.analyzers.contains_key(&TypeId::of::<A>())
    }

    /// Calculates and returns the scope checking result.
    pub fn scope_result(&mut self) -> Arc<ScopeResult> {
        self.analysis::<ScopePass>()
    }

    /// Calculates and returns the grammar.
    pub fn grammar_result(&mut self) -> Arc<Grammar> {
        self.analysis::<GrammarPass>()
    }

    /// Calculates and returns the parse trees of all logical statements.
    pub fn stmt_parse_result(&mut self) -> Arc<StmtParse> {
        self.analysis::<StmtParsePass>()
    }

    /// Calculates and returns the verification result.
    pub fn verify_result(&mut self) -> Arc<VerifyResult> {
        self.analysis::<VerifyPass>()
    }

    /// Replaces the statements `from..to` with the statements scanned from
    /// `text`.
    ///
    /// Only include-free databases without scan errors can be edited, and the
    /// text must scan cleanly on its own.  Statements keep their leading
    /// whitespace, so the text must start with whitespace unless it is
    /// inserted at the very beginning, and the statement following the range
    /// must itself start with whitespace.  Only the end of the database may
    /// carry trailing whitespace.
    ///
    /// On success all observers are notified and every analyzer output is
    /// dropped.  On failure nothing is changed.
    pub fn replace_statements(
        &mut self,
        from: StatementIndex,
        to: StatementIndex,
        text: &[u8],
    ) -> Result<(), ReplaceError> {
        let count = self.statements.len();
        if from > to || to > count {
            return Err(ReplaceError::OutOfRange { from, to, count });
        }
        if count == 0 {
            return Err(ReplaceError::Empty);
        }
        if self.statements.iter().any(Statement::has_scan_errors) {
            return Err(ReplaceError::DatabaseHasErrors);
        }
        if self.chain().has_includes()
            || self
                .statements
                .iter()
                .any(|stmt| stmt.statement_type() == StatementType::Include)
        {
            return Err(ReplaceError::IncludesUnsupported);
        }
        if from > 0 && text.first().is_some_and(|&ch| !is_mm_space(ch)) {
            return Err(ReplaceError::NoLeadingWhitespace);
        }

        let root = self.source(SourceId::default()).name().to_owned();
        let mut added = self.scan_fragment(&root, text)?;
        let has_body = added.len() > 1;
        if to < count
            && has_body
            && self
                .raw_text(to)
                .first()
                .is_some_and(|&ch| !is_mm_space(ch))
        {
            return Err(ReplaceError::NoSeparatingWhitespace);
        }
        let eof_is_empty = added.last().map_or(true, Statement::is_empty);
        if to < count {
            if !eof_is_empty {
                return Err(ReplaceError::DuplicateEof);
            }
            added.pop();
        } else if from == count {
            if has_body || !eof_is_empty {
                return Err(ReplaceError::DuplicateEof);
            }
            return Ok(());
        }

        let old_text = self.source(SourceId::default()).text();
        let end = self.statements.last().map_or(0, Statement::end);
        let start_from = self.statements.get(from).map_or(end, |stmt| stmt.start);
        let end_to = self.statements.get(to).map_or(end, |stmt| stmt.start);
        let mut new_text = Vec::with_capacity(old_text.len() + text.len());
        new_text.extend_from_slice(&old_text[..start_from]);
        new_text.extend_from_slice(text);
        new_text.extend_from_slice(&old_text[end_to..]);
        self.ctx.replace_root_text(new_text);

        for stmt in &mut added {
            stmt.zone = ZoneId::default();
            stmt.start += start_from;
            stmt.positions = OnceCell::new();
        }
        let added_count = added.len();
        let removed: Vec<Statement> = self.statements.splice(from..to, added).collect();
        for (index, stmt) in self.statements.iter_mut().enumerate().skip(from) {
            if index >= from + added_count {
                stmt.start = stmt.start - end_to + start_from + text.len();
                stmt.positions = OnceCell::new();
            }
            stmt.index = index;
        }
        if !self.options.lazy_positions {
            for index in from..self.statements.len() {
                let _ = self.positions(index);
            }
        }
        debug!(
            "replaced statements {from}..{to} with {added_count} statements"
        );

        self.invalidate();
        self.notify(from, &removed, added_count);
        Ok(())
    }

    /// Scans replacement text on its own.
    fn scan_fragment(&self, root: &str, text: &[u8]) -> Result<Vec<Statement>, ReplaceError> {
        let mut ctx = ScanContext::new(Box::new(MemoryResolver::new(vec![(
            root.to_owned(),
            text.to_vec(),
        )])));
        let mut scanner = Scanner::new(root, false);
        let mut out = Vec::new();
        loop {
            match scanner.next_statement(&mut ctx) {
                ScanStep::Statement(stmt) => {
                    if stmt.statement_type() == StatementType::Include {
                        return Err(ReplaceError::IncludesUnsupported);
                    }
                    if stmt.has_scan_errors() {
                        return Err(ReplaceError::FragmentHasErrors);
                    }
                    out.push(stmt);
                }
                ScanStep::Pending(_) => return Err(ReplaceError::FragmentHasErrors),
                ScanStep::Done => break,
            }
        }
        Ok(out)
    }
}
