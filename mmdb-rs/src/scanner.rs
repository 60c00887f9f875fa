//! Implementation of the statement scanner.
//!
//! The scanner identifies the boundaries between statements, extracts their
//! labels, math strings and proofs, and does the validity checking which is
//! possible within one statement.  It follows include directives through the
//! zone chain, so the statements of all files come out as one sequence.
//!
//! There are two entry points.  A [`Scanner`] is the live scan: a resumable
//! value which produces one statement per call and commits zones to the
//! [`ScanContext`] as it goes.  When the text of a file is not available yet
//! it returns [`ScanStep::Pending`] without side effects, and the same call
//! can simply be repeated once the text has been provided.  [`reparse`] is the
//! position reconstruction path: it rescans exactly one statement over a
//! read-only view of the committed chain.
//!
//! Each statement begins exactly where the previous one ended, so leading
//! whitespace belongs to the statement that follows it.  Error recovery never
//! carries a token across a statement boundary; when a keyword interrupts a
//! statement, the statement is closed after the last token it consumed and the
//! next statement rescans the keyword.

use crate::diag::{Anchor, Category, Diagnostic};
use crate::source::{is_mm_space, is_token_char, Resolution, Source, SourceId, SourceResolver};
use crate::statement::{
    Positions, Statement, StatementIndex, StatementKind, StatementType, Token,
};
use crate::util::{as_str, HashMap, HashSet};
use crate::zone::{EphemeralZones, LinearOffset, ZoneAccess, ZoneChain, ZoneId};
use log::trace;
use std::cell::OnceCell;
use std::sync::Arc;

/// Owns all sources and the committed zone chain of one scan.
pub struct ScanContext {
    sources: Vec<Source>,
    by_name: HashMap<Arc<str>, SourceId>,
    chain: ZoneChain,
    resolver: Box<dyn SourceResolver>,
    requested: HashSet<SourceId>,
}

impl std::fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanContext")
            .field("sources", &self.sources)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl ScanContext {
    /// Creates an empty context which will ask `resolver` for source texts.
    #[must_use]
    pub fn new(resolver: Box<dyn SourceResolver>) -> Self {
        ScanContext {
            sources: Vec::new(),
            by_name: HashMap::default(),
            chain: ZoneChain::default(),
            resolver,
            requested: HashSet::default(),
        }
    }

    /// All sources referenced so far, indexed by `SourceId`.
    #[must_use]
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Accessor for one source.
    #[must_use]
    pub fn source(&self, id: SourceId) -> &Source {
        &self.sources[id.index()]
    }

    /// The committed zone chain.
    #[must_use]
    pub const fn chain(&self) -> &ZoneChain {
        &self.chain
    }

    /// Finds a source by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<SourceId> {
        self.by_name.get(name).copied()
    }

    /// Supplies the text (or the failure) of a source after its resolver
    /// answered [`Resolution::Pending`].  Only the first outcome for a name is
    /// recorded.
    pub fn provide(&mut self, name: &str, outcome: Result<Vec<u8>, String>) {
        let id = self.intern(name);
        self.sources[id.index()].settle(outcome);
    }

    fn intern(&mut self, name: &str) -> SourceId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        #[allow(clippy::cast_possible_truncation)]
        let id = SourceId(self.sources.len() as u32);
        let source = Source::new(name);
        self.by_name.insert(source.name().into(), id);
        self.sources.push(source);
        id
    }

    /// Asks the resolver for a source, at most once.  Returns true when the
    /// source is settled.
    fn load(&mut self, id: SourceId) -> bool {
        if self.sources[id.index()].is_settled() {
            return true;
        }
        if self.requested.insert(id) {
            let name = self.sources[id.index()].name().to_owned();
            match self.resolver.resolve(&name) {
                Resolution::Text(text) => self.sources[id.index()].settle(Ok(text)),
                Resolution::Failed(reason) => self.sources[id.index()].settle(Err(reason)),
                Resolution::Pending => {}
            }
        }
        self.sources[id.index()].is_settled()
    }

    /// Swaps in new text for the root source of an include-free database.
    pub(crate) fn replace_root_text(&mut self, text: Vec<u8>) {
        let name = self.sources[0].name().to_owned();
        self.sources[0] = Source::with_text(&name, text);
    }
}

impl ZoneAccess for ScanContext {
    fn chain(&self) -> &ZoneChain {
        &self.chain
    }

    fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Follows a committed link, or commits the continuation of the including
    /// file when an included file is exhausted.
    fn successor(&mut self, id: ZoneId) -> Option<ZoneId> {
        if let Some(next) = self.chain.chain_to(id) {
            return Some(next);
        }
        let (including, resume) = self.chain.zone(id).return_to?;
        let parent = self.chain.zone(including);
        let (source, parent_return) = (parent.source, parent.return_to);
        let start = self.chain.end(id, &self.sources);
        trace!(
            "resuming {} at {resume} (linear {start})",
            self.sources[source.index()].name()
        );
        Some(self.chain.push(source, start, resume, parent_return))
    }
}

/// The outcome of one call to [`Scanner::next_statement`].
#[derive(Debug)]
pub enum ScanStep {
    /// The next statement.
    Statement(Statement),
    /// The named source must be supplied through [`ScanContext::provide`]
    /// before scanning can continue.
    Pending(String),
    /// The end-of-input statement has been produced.
    Done,
}

/// The resumable state of a live scan.
#[derive(Debug)]
pub struct Scanner {
    root: String,
    /// Where the next statement begins, once the root zone exists.
    position: Option<(ZoneId, usize)>,
    /// File named by the last include statement, not yet entered.
    pending_include: Option<Token>,
    /// Diagnostics to attach to the next statement.
    carry: Vec<Diagnostic>,
    index: StatementIndex,
    record_positions: bool,
    finished: bool,
}

impl Scanner {
    /// Starts a scan at the named root source.  With `record_positions`, exact
    /// positions are stored in every statement instead of being rebuilt on
    /// demand.
    #[must_use]
    pub fn new(root: &str, record_positions: bool) -> Self {
        Scanner {
            root: root.to_owned(),
            position: None,
            pending_include: None,
            carry: Vec::new(),
            index: 0,
            record_positions,
            finished: false,
        }
    }

    /// Enters a source as a new zone, unless it was included before.
    ///
    /// Returns `Err` with the name when the source is not available yet;
    /// nothing is changed in that case.
    fn enter(
        &mut self,
        ctx: &mut ScanContext,
        name: &str,
        start: LinearOffset,
        return_to: Option<(ZoneId, usize)>,
    ) -> Result<Option<ZoneId>, String> {
        if ctx.chain.is_included(name) {
            trace!("skipping repeated include of {name}");
            return Ok(None);
        }
        let id = ctx.intern(name);
        if !ctx.load(id) {
            return Err(name.to_owned());
        }
        let source = &ctx.sources[id.index()];
        let key: Arc<str> = source.name().into();
        if let Some(reason) = source.failure() {
            self.carry.push(
                Diagnostic::new(Category::Scanner, "source-failed", Anchor::SourceStart(id))
                    .text("source", name)
                    .text("reason", reason),
            );
        }
        ctx.chain.mark_included(&key);
        let zone = ctx.chain.push(id, start, 0, return_to);
        trace!("entering {name} at linear {start}");
        Ok(Some(zone))
    }

    /// Produces the next statement, or reports that a source is pending.
    ///
    /// Calling again after [`ScanStep::Pending`] resumes from exactly the same
    /// point.
    pub fn next_statement(&mut self, ctx: &mut ScanContext) -> ScanStep {
        if self.finished {
            return ScanStep::Done;
        }
        let (mut zone, mut local) = match self.position {
            Some(position) => position,
            None => {
                let root = self.root.clone();
                match self.enter(ctx, &root, 0, None) {
                    Err(name) => return ScanStep::Pending(name),
                    Ok(zone) => {
                        // the chain is empty, so the root cannot be a repeat
                        let zone = zone.unwrap_or_default();
                        self.position = Some((zone, 0));
                        (zone, 0)
                    }
                }
            }
        };

        if let Some(file) = &self.pending_include {
            let name = as_str(file).to_owned();
            let linear = ctx.chain.zone(zone).offset_base + local;
            match self.enter(ctx, &name, linear, Some((zone, local))) {
                Err(name) => return ScanStep::Pending(name),
                Ok(Some(included)) => {
                    zone = included;
                    local = 0;
                }
                Ok(None) => {}
            }
            self.pending_include = None;
        }

        let base = ctx.chain.zone(zone).offset_base;
        let mut lexer = Lexer::new(ctx, zone, base + local, self.record_positions);
        let scanned = lexer.get_statement();
        self.position = Some((lexer.zone, lexer.position));

        let mut diagnostics = std::mem::take(&mut self.carry);
        diagnostics.extend(scanned.diagnostics);
        match &scanned.kind {
            StatementKind::Eof => self.finished = true,
            StatementKind::Include { file: Some(file) } => {
                self.pending_include = Some(file.clone());
            }
            _ => {}
        }
        let positions = OnceCell::new();
        if self.record_positions {
            let _ = positions.set(scanned.positions);
        }
        let statement = Statement {
            kind: scanned.kind,
            zone: scanned.zone,
            start: scanned.start,
            len: scanned.end - scanned.start,
            index: self.index,
            positions,
            diagnostics,
        };
        self.index += 1;
        ScanStep::Statement(statement)
    }
}

/// Rebuilds the exact positions of the statement whose text begins at
/// `start`, scanning from `zone` over the committed chain without changing it.
#[must_use]
pub fn reparse(
    chain: &ZoneChain,
    sources: &[Source],
    zone: ZoneId,
    start: LinearOffset,
) -> Positions {
    let mut zones = EphemeralZones::new(chain, sources);
    let mut lexer = Lexer::new(&mut zones, zone, start, true);
    lexer.get_statement().positions
}

/// Metamath spec valid label characters are `[-._a-zA-Z0-9]`
#[must_use]
pub fn is_valid_label(label: &[u8]) -> bool {
    label
        .iter()
        .all(|&c| c == b'.' || c == b'-' || c == b'_' || c.is_ascii_alphanumeric())
}

/// One whitespace-delimited token.
struct Tok {
    at: LinearOffset,
    bytes: Token,
}

/// What the raw token reader found.
enum Raw {
    Token(Tok),
    /// The end of a source was crossed; scanning continues in the including
    /// file.
    FileEnd(SourceId),
    /// The end of all input, in the given source.
    End(SourceId),
}

/// The result of scanning one statement.
struct Scanned {
    kind: StatementKind,
    zone: ZoneId,
    start: LinearOffset,
    end: LinearOffset,
    positions: Positions,
    diagnostics: Vec<Diagnostic>,
}

/// A point the lexer can rewind to.
#[derive(Copy, Clone)]
struct Mark {
    zone: ZoneId,
    position: usize,
    diagnostics: usize,
}

/// Scanning state for a single statement.
struct Lexer<'z, Z: ZoneAccess> {
    zones: &'z mut Z,
    zone: ZoneId,
    /// Local offset in the current zone's source; generally points
    /// immediately after a token, at whitespace.
    position: usize,
    start: LinearOffset,
    start_zone: ZoneId,
    record: bool,
    positions: Positions,
    diagnostics: Vec<Diagnostic>,
    /// Just after the last token which belongs to the statement.
    last_end: Mark,
}

impl<'z, Z: ZoneAccess> Lexer<'z, Z> {
    fn new(zones: &'z mut Z, zone: ZoneId, start: LinearOffset, record: bool) -> Self {
        let zone = zones.chain().seek(zone, start);
        let position = start - zones.chain().zone(zone).offset_base;
        Lexer {
            zones,
            zone,
            position,
            start,
            start_zone: zone,
            record,
            positions: Positions {
                start,
                keyword: start,
                end: start,
                ..Positions::default()
            },
            diagnostics: Vec::new(),
            last_end: Mark {
                zone,
                position,
                diagnostics: 0,
            },
        }
    }

    fn linear(&self) -> LinearOffset {
        self.zones.chain().zone(self.zone).offset_base + self.position
    }

    /// Record a diagnostic against the nascent statement
    fn diag(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    fn relative(&self, tok: &Tok) -> Anchor {
        let from = tok.at - self.start;
        Anchor::Relative(from, from + tok.bytes.len())
    }

    fn end_of(&self, id: SourceId) -> String {
        format!("the end of {}", self.zones.sources()[id.index()].name())
    }

    /// Notes that everything up to the current position belongs to the
    /// statement.
    fn consumed(&mut self) {
        self.last_end = Mark {
            zone: self.zone,
            position: self.position,
            diagnostics: self.diagnostics.len(),
        };
    }

    /// Returns to just after the last consumed token, forgetting diagnostics
    /// for anything read since; those tokens are scanned again as part of the
    /// next statement.
    fn rewind(&mut self) {
        self.zone = self.last_end.zone;
        self.position = self.last_end.position;
        self.diagnostics.truncate(self.last_end.diagnostics);
    }

    /// Get a single whitespace-delimited token without checking for comments.
    ///
    /// A token containing any byte outside printable ASCII is reported and
    /// skipped as a whole.  Crossing the end of a zone follows the chain.
    fn get_raw(&mut self) -> Raw {
        loop {
            let text = self.zones.zone_text(self.zone);
            let len = text.len();
            let mut ix = self.position;
            while ix < len && is_mm_space(text[ix]) {
                ix += 1;
            }

            if ix == len {
                self.position = ix;
                let source = self.zones.chain().zone(self.zone).source;
                let file_done = len == self.zones.sources()[source.index()].text().len();
                match self.zones.successor(self.zone) {
                    Some(next) => {
                        let zone = self.zones.chain().zone(next);
                        self.position = zone.start - zone.offset_base;
                        self.zone = next;
                        if file_done {
                            return Raw::FileEnd(source);
                        }
                        continue;
                    }
                    None => return Raw::End(source),
                }
            }

            let start = ix;
            let mut bad = None;
            while ix < len && !is_mm_space(text[ix]) {
                if bad.is_none() && !is_token_char(text[ix]) {
                    bad = Some(text[ix]);
                }
                ix += 1;
            }
            let tok = Tok {
                at: self.zones.chain().zone(self.zone).offset_base + start,
                bytes: text[start..ix].into(),
            };
            self.position = ix;

            match bad {
                None => return Raw::Token(tok),
                Some(byte) => {
                    let anchor = self.relative(&tok);
                    self.diag(
                        Diagnostic::new(Category::Scanner, "bad-character", anchor)
                            .text("byte", format!("0x{byte:02x}")),
                    );
                }
            }
        }
    }

    /// Assuming that a `$(` token has just been read, read and skip a comment.
    ///
    /// Returns true if the comment is a metacomment, and the end marker if the
    /// comment was still open when its file ended.
    fn get_comment(&mut self, opener: &Tok, embedded: bool) -> (bool, Option<Raw>) {
        let mut meta = false;
        let mut first = true;
        loop {
            let raw = self.get_raw();
            let tok = match raw {
                Raw::Token(tok) => tok,
                Raw::FileEnd(source) | Raw::End(source) => {
                    let anchor = self.relative(opener);
                    let source = self.zones.sources()[source.index()].name().to_owned();
                    self.diag(
                        Diagnostic::new(Category::Scanner, "unclosed-comment", anchor)
                            .text("source", source),
                    );
                    return (meta, Some(raw));
                }
            };
            let tok_ref = &*tok.bytes;
            if tok_ref == b"$)" {
                return (meta, None);
            }
            if first && (tok_ref == b"$t" || tok_ref == b"$j") {
                if embedded {
                    let anchor = self.relative(&tok);
                    self.diag(
                        Diagnostic::new(Category::Scanner, "embedded-metacomment", anchor)
                            .label("marker", tok_ref),
                    );
                } else {
                    meta = true;
                }
            } else if tok_ref.contains(&b'$') {
                let anchor = self.relative(&tok);
                if tok_ref.windows(2).any(|w| w == b"$(") {
                    self.diag(
                        Diagnostic::new(Category::Scanner, "pseudo-nested-comment", anchor.clone())
                            .label("token", tok_ref),
                    );
                }
                if tok_ref.windows(2).any(|w| w == b"$)") {
                    self.diag(
                        Diagnostic::new(Category::Scanner, "pseudo-comment-end", anchor)
                            .label("token", tok_ref),
                    );
                }
            }
            first = false;
        }
    }

    /// Fetches a single token, skipping over embedded comments.
    fn get(&mut self) -> Raw {
        loop {
            match self.get_raw() {
                Raw::Token(tok) if &*tok.bytes == b"$(" => {
                    if let (_, Some(end)) = self.get_comment(&tok, true) {
                        return end;
                    }
                    self.consumed();
                }
                raw => return raw,
            }
        }
    }

    fn finish(&mut self, kind: StatementKind) -> Scanned {
        let end = self.linear();
        let mut positions = std::mem::take(&mut self.positions);
        positions.end = end;
        Scanned {
            kind,
            zone: self.start_zone,
            start: self.start,
            end,
            positions,
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }

    /// Main function called to read a complete statement.
    fn get_statement(&mut self) -> Scanned {
        let mut label: Option<Tok> = None;
        loop {
            let tok = match self.get_raw() {
                Raw::Token(tok) => tok,
                Raw::FileEnd(_) => {
                    self.dangling_label(label.take());
                    continue;
                }
                Raw::End(_) => {
                    self.dangling_label(label.take());
                    return self.finish(StatementKind::Eof);
                }
            };

            if !tok.bytes.contains(&b'$') {
                if let Some(previous) = &label {
                    let diag = Diagnostic::new(Category::Scanner, "duplicate-label", self.relative(&tok))
                        .label("label", &previous.bytes)
                        .label("next", &tok.bytes);
                    self.diag(diag);
                } else {
                    self.positions.start = tok.at;
                }
                if !is_valid_label(&tok.bytes) {
                    let anchor = self.relative(&tok);
                    self.diag(
                        Diagnostic::new(Category::Scanner, "bad-label", anchor)
                            .label("label", &tok.bytes),
                    );
                }
                label = Some(tok);
                self.consumed();
                continue;
            }

            match StatementType::from_keyword(&tok.bytes) {
                Some(StatementType::Comment) if label.is_none() => {
                    self.positions.start = tok.at;
                    self.positions.keyword = tok.at;
                    let (meta, end) = self.get_comment(&tok, false);
                    if end.is_none() {
                        self.consumed();
                    }
                    let kind = if meta {
                        StatementKind::MetaComment
                    } else {
                        StatementKind::Comment
                    };
                    return self.finish(kind);
                }
                Some(StatementType::Comment) => match self.get_comment(&tok, true).1 {
                    None => self.consumed(),
                    Some(Raw::End(_)) => {
                        self.dangling_label(label.take());
                        return self.finish(StatementKind::Eof);
                    }
                    Some(_) => self.dangling_label(label.take()),
                },
                Some(stype) => return self.get_body(stype, label, tok),
                None => {
                    let anchor = self.relative(&tok);
                    self.diag(
                        Diagnostic::new(Category::Scanner, "unknown-keyword", anchor)
                            .label("keyword", &tok.bytes),
                    );
                }
            }
        }
    }

    fn dangling_label(&mut self, label: Option<Tok>) {
        if let Some(label) = label {
            let anchor = self.relative(&label);
            self.diag(
                Diagnostic::new(Category::Scanner, "dangling-label", anchor)
                    .label("label", &label.bytes),
            );
        }
    }

    /// Reads everything after the keyword of a statement.
    fn get_body(&mut self, stype: StatementType, label: Option<Tok>, keyword: Tok) -> Scanned {
        self.positions.keyword = keyword.at;
        if label.is_none() {
            self.positions.start = keyword.at;
        }
        self.consumed();

        let label = match (stype.takes_label(), label) {
            (true, Some(label)) => {
                self.positions.label = Some(label.at);
                Some(label.bytes)
            }
            (true, None) => {
                self.diag(
                    Diagnostic::new(Category::Scanner, "missing-label", Anchor::Keyword)
                        .label("keyword", &keyword.bytes),
                );
                None
            }
            (false, Some(label)) => {
                let anchor = self.relative(&label);
                self.diag(
                    Diagnostic::new(Category::Scanner, "spurious-label", anchor)
                        .label("keyword", &keyword.bytes)
                        .label("label", &label.bytes),
                );
                self.positions.start = keyword.at;
                None
            }
            (false, None) => None,
        };

        match stype {
            StatementType::Open => self.finish(StatementKind::Open),
            StatementType::Close => self.finish(StatementKind::Close),
            StatementType::Include => self.get_file_include(),
            _ => self.get_strings(stype, label, &keyword),
        }
    }

    /// Handles parsing for math and proof strings.
    fn get_strings(&mut self, stype: StatementType, label: Option<Token>, keyword: &Tok) -> Scanned {
        let mut math: Vec<Token> = Vec::new();
        let mut proof: Option<Vec<Token>> = None;
        loop {
            let tok = match self.get() {
                Raw::Token(tok) => tok,
                Raw::FileEnd(source) | Raw::End(source) => {
                    let at = self.end_of(source);
                    self.nonterminated(proof.is_some(), at);
                    break;
                }
            };
            let tok_ref = &*tok.bytes;
            if !tok_ref.contains(&b'$') {
                match &mut proof {
                    Some(proof) => {
                        if self.record {
                            self.positions.proof.push(tok.at);
                        }
                        proof.push(tok.bytes);
                    }
                    None => {
                        if self.record {
                            self.positions.math.push(tok.at);
                        }
                        math.push(tok.bytes);
                    }
                }
                self.consumed();
            } else if tok_ref == b"$." {
                self.consumed();
                break;
            } else if tok_ref == b"$=" && stype == StatementType::Provable && proof.is_none() {
                self.positions.separator = Some(tok.at);
                proof = Some(Vec::new());
                self.consumed();
            } else if tok_ref == b"$=" {
                let anchor = self.relative(&tok);
                self.diag(Diagnostic::new(Category::Scanner, "misplaced-separator", anchor));
            } else if StatementType::from_keyword(tok_ref).is_some() {
                let at = as_str(tok_ref).to_owned();
                self.nonterminated(proof.is_some(), at);
                break;
            } else {
                let anchor = self.relative(&tok);
                self.diag(
                    Diagnostic::new(Category::Scanner, "unknown-keyword", anchor)
                        .label("keyword", tok_ref),
                );
            }
        }

        if math.is_empty() {
            self.diag(
                Diagnostic::new(Category::Scanner, "empty-math", Anchor::Keyword)
                    .label("keyword", &keyword.bytes),
            );
        }

        let math = math.into_boxed_slice();
        let kind = match (stype, label) {
            (StatementType::Constant, _) => StatementKind::Constant { math },
            (StatementType::Variable, _) => StatementKind::Variable { math },
            (StatementType::Disjoint, _) => StatementKind::Disjoint { math },
            (StatementType::Axiom, Some(label)) => StatementKind::Axiom { label, math },
            (StatementType::Essential, Some(label)) => StatementKind::Essential { label, math },
            (StatementType::Floating, Some(label)) => StatementKind::Floating { label, math },
            (StatementType::Provable, Some(label)) => StatementKind::Provable {
                label,
                math,
                proof: proof.unwrap_or_default().into_boxed_slice(),
            },
            (intended, _) => StatementKind::Bogus {
                intended,
                math,
                proof: (intended == StatementType::Provable)
                    .then(|| proof.unwrap_or_default().into_boxed_slice()),
            },
        };
        self.finish(kind)
    }

    /// Closes an interrupted math string or proof after its last token.
    fn nonterminated(&mut self, in_proof: bool, at: String) {
        self.rewind();
        let code = if in_proof {
            "nonterminated-proof"
        } else {
            "nonterminated-math"
        };
        self.diag(Diagnostic::new(Category::Scanner, code, Anchor::Statement).text("at", at));
    }

    /// Handles parsing the filename after a `$[` keyword has been seen.
    fn get_file_include(&mut self) -> Scanned {
        let mut file: Option<Token> = None;
        loop {
            let tok = match self.get() {
                Raw::Token(tok) => tok,
                Raw::FileEnd(source) | Raw::End(source) => {
                    let at = self.end_of(source);
                    self.unclosed_include(at);
                    break;
                }
            };
            let tok_ref = &*tok.bytes;
            if tok_ref == b"$]" {
                self.consumed();
                if file.is_none() {
                    self.diag(Diagnostic::new(Category::Scanner, "include-empty", Anchor::Keyword));
                }
                break;
            } else if StatementType::from_keyword(tok_ref).is_some() {
                let at = as_str(tok_ref).to_owned();
                self.unclosed_include(at);
                break;
            } else if tok_ref.contains(&b'$') {
                let anchor = self.relative(&tok);
                self.diag(
                    Diagnostic::new(Category::Scanner, "include-dollar", anchor)
                        .label("file", tok_ref),
                );
            } else if file.is_some() {
                let anchor = self.relative(&tok);
                self.diag(
                    Diagnostic::new(Category::Scanner, "include-multiple", anchor)
                        .label("file", tok_ref),
                );
            } else {
                if self.record {
                    self.positions.math.push(tok.at);
                }
                file = Some(tok.bytes);
            }
            self.consumed();
        }
        self.finish(StatementKind::Include { file })
    }

    fn unclosed_include(&mut self, at: String) {
        self.rewind();
        self.diag(
            Diagnostic::new(Category::Scanner, "unclosed-include", Anchor::Statement).text("at", at),
        );
    }
}
