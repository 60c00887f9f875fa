//! Datatypes to represent diagnostics emitted by the analysis passes.
//!
//! A diagnostic is a `(category, code, data)` triple.  The pair identifies a
//! [`Template`] in a static registry which provides the severity, a short
//! title and a message with `{name}` placeholders; the data supplies the
//! placeholder values.  Constructing a diagnostic with a pair that is not in
//! the registry is a programming error and panics immediately.
//!
//! Diagnostics are attached to statements and located by an [`Anchor`]
//! relative to that statement.  Anchors naming a token are resolved through
//! the lazy position machinery only when a diagnostic is rendered.

use crate::database::Database;
use crate::source::SourceId;
use crate::statement::{StatementIndex, Token};
use crate::util::as_str;
use annotate_snippets::{Level, Message, Snippet};
use itertools::Itertools;
use std::borrow::Cow;
use std::fmt;
use std::io;
use typed_arena::Arena;

/// The pass which produced a diagnostic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Category {
    Scanner,
    Scope,
    Grammar,
    Parse,
    Verify,
    Io,
}

impl Category {
    /// The name used in rendered output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Scanner => "scanner",
            Category::Scope => "scope",
            Category::Grammar => "grammar",
            Category::Parse => "parse",
            Category::Verify => "verify",
            Category::Io => "io",
        }
    }
}

/// Severity tier of a diagnostic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Invalid input; the affected statement is not trustworthy.
    Error,
    /// Suspicious input which does not block any later computation.
    Warning,
}

impl Severity {
    const fn level(self) -> Level {
        match self {
            Severity::Error => Level::Error,
            Severity::Warning => Level::Warning,
        }
    }
}

/// A registered diagnostic template.
#[derive(Debug, PartialEq, Eq)]
pub struct Template {
    /// The emitting pass.
    pub category: Category,
    /// The kebab-case code, unique within its category.
    pub code: &'static str,
    /// Severity tier.
    pub severity: Severity,
    /// A short headline.
    pub title: &'static str,
    /// The message, with `{name}` placeholders.
    pub message: &'static str,
}

macro_rules! registry {
    ($($cat:ident $code:literal $sev:ident $title:literal $msg:literal;)*) => {
        &[$(Template {
            category: Category::$cat,
            code: $code,
            severity: Severity::$sev,
            title: $title,
            message: $msg,
        },)*]
    };
}

#[rustfmt::skip]
static REGISTRY: &[Template] = registry! {
    Scanner "pseudo-nested-comment" Warning "Nested comment" "comments cannot be nested; this {token} does not open a comment";
    Scanner "pseudo-comment-end" Warning "Comment end inside token" "{token} contains a comment end marker which does not close the comment";
    Scanner "unclosed-comment" Error "Unclosed comment" "comment is still open at the end of {source}";
    Scanner "embedded-metacomment" Warning "Embedded metacomment" "a {marker} comment is only interpreted between statements";
    Scanner "bad-character" Error "Invalid character" "token contains byte {byte}; sources are limited to printable ASCII, TAB, LF, FF and CR";
    Scanner "unknown-keyword" Error "Unknown keyword" "{keyword} is not a keyword here";
    Scanner "duplicate-label" Error "Repeated label" "label {label} is followed by a second label {next}";
    Scanner "missing-label" Error "Missing label" "{keyword} statements require a label";
    Scanner "spurious-label" Warning "Spurious label" "{keyword} statements do not take a label; {label} is ignored";
    Scanner "dangling-label" Error "Label without statement" "label {label} is not followed by a statement keyword";
    Scanner "bad-label" Error "Invalid label" "label {label} may only contain letters, digits, '-', '_' and '.'";
    Scanner "nonterminated-math" Error "Unterminated statement" "math string is not terminated before {at}";
    Scanner "nonterminated-proof" Error "Unterminated proof" "proof is not terminated before {at}";
    Scanner "misplaced-separator" Error "Misplaced $=" "only $p statements take a proof";
    Scanner "empty-math" Error "Empty statement" "{keyword} statement has no symbols";
    Scanner "include-empty" Error "Empty include" "include directive names no file";
    Scanner "include-multiple" Error "Multiple files in include" "only one file may be named; {file} is ignored";
    Scanner "include-dollar" Error "Invalid file name" "file name {file} contains a $";
    Scanner "unclosed-include" Error "Unclosed include" "include directive is not closed before {at}";
    Scanner "source-failed" Error "Cannot load source" "{source}: {reason}";
    Scope "duplicate-label" Error "Duplicate label" "label {label} is already defined at {previous}";
    Scope "label-is-symbol" Error "Label reuses a symbol" "label {label} is also declared as a math symbol";
    Scope "symbol-is-label" Error "Symbol reuses a label" "symbol {symbol} is also used as a label";
    Scope "inactive-symbol" Error "Inactive symbol" "symbol {symbol} is not declared or not in scope here";
    Scope "symbol-redeclared" Error "Symbol redeclared" "symbol {symbol} is already declared";
    Scope "constant-not-top-level" Error "Constant in block" "$c statements are only allowed outside of ${ $} blocks";
    Scope "typecode-not-constant" Error "Typecode not constant" "the first symbol {symbol} must be a constant";
    Scope "variable-missing-float" Error "Variable missing float" "variable {symbol} has no active $f";
    Scope "float-shape" Error "Malformed $f" "a $f statement takes exactly a typecode and a variable";
    Scope "float-not-constant" Error "Malformed $f" "typecode {symbol} is not a constant";
    Scope "float-not-variable" Error "Malformed $f" "{symbol} is not a variable";
    Scope "float-redeclared" Error "Float redeclared" "variable {symbol} already has an active $f at {previous}";
    Scope "disjoint-not-variable" Error "Malformed $d" "{symbol} is not an active variable";
    Scope "disjoint-repeated" Error "Malformed $d" "variable {symbol} is repeated";
    Scope "unmatched-close" Error "Unmatched close group" "this $} does not match any ${";
    Scope "unclosed-scope" Error "Unclosed group" "{count} ${ block(s) are still open at the end of input";
    Grammar "syntax-left-recursive" Error "Left-recursive syntax axiom" "{label} starts with category {first}, which does not bind tighter than {result}";
    Grammar "syntax-logical-hypothesis" Error "Syntax axiom with logical hypothesis" "{label} has the logical hypothesis {hyp}";
    Grammar "syntax-mandatory-dv" Error "Syntax axiom with $d" "{label} has mandatory disjoint variable conditions";
    Grammar "syntax-repeated-variable" Error "Repeated variable in syntax axiom" "variable {symbol} occurs more than once in {label}";
    Grammar "syntax-untyped-variable" Error "Untyped variable in syntax axiom" "variable {symbol} of {label} has type {typecode}, which is not a grammar category";
    Parse "ambiguous" Error "Ambiguous formula" "formula has two parses, rooted at {first} and {second}";
    Parse "trailing-symbols" Error "Trailing symbols" "the formula parses only up to {symbol}";
    Parse "no-parse" Error "Unparseable formula" "no rule applies here; expected one of {expected}";
    Parse "unknown-type" Error "Unconfigured typecode" "typecode {typecode} is neither a grammar category nor a configured logical type";
    Parse "syntactic-hypothesis" Error "Syntactic hypothesis" "hypothesis {label} uses the purely syntactic type {typecode}";
    Parse "syntactic-statement" Error "Syntactic theorem" "{label} proves the purely syntactic type {typecode}";
    Parse "formula-mismatch" Error "Formula verification failed" "the parse tree prints as {found}";
    Verify "stack-underflow" Error "Stack underflow" "step {label} needs {needed} hypotheses, but the stack holds {available}";
    Verify "type-mismatch" Error "Type mismatch" "hypothesis {hyp} of {label} expects a {expected}, found a {found}";
    Verify "hyp-mismatch" Error "Hypothesis mismatch" "hypothesis {hyp} of {label} requires {expected}, found {found}";
    Verify "dv-violation" Error "Disjoint variable violation" "{label} requires {first} and {second} to be disjoint";
    Verify "bad-stack-depth" Error "Bad stack depth" "proof leaves {depth} entries on the stack instead of 1";
    Verify "wrong-type-end" Error "Wrong type proven" "proof proves a {found} instead of a {expected}";
    Verify "wrong-goal" Error "Wrong statement proven" "proof proves {found} instead of {expected}";
    Verify "incomplete-proof" Warning "Incomplete proof" "proof contains unknown steps";
    Verify "unknown-step" Error "Unknown step" "{label} is not an active hypothesis or an earlier assertion";
    Verify "compressed-bad-char" Error "Invalid compressed proof" "character {char} is not valid in a compressed proof";
    Verify "compressed-bad-save" Error "Invalid compressed proof" "Z must immediately follow a step";
    Verify "compressed-recall-range" Error "Invalid compressed proof" "step number {number} is out of range";
    Verify "compressed-leftover" Error "Invalid compressed proof" "compressed proof ends in the middle of a number";
    Verify "compressed-unclosed-roster" Error "Invalid compressed proof" "label list is not closed by )";
    Verify "roster-hypothesis" Error "Invalid compressed proof" "mandatory hypothesis {label} must not be listed";
    Io "io-error" Error "I/O error" "{reason}";
};

impl Template {
    /// Looks up a registered template.
    ///
    /// ## Panics
    /// Panics if the pair is not registered.
    #[must_use]
    pub fn lookup(category: Category, code: &str) -> &'static Template {
        REGISTRY
            .iter()
            .find(|t| t.category == category && t.code == code)
            .unwrap_or_else(|| {
                panic!(
                    "unregistered diagnostic code {}/{code}",
                    category.as_str()
                )
            })
    }

    /// All registered templates.
    #[must_use]
    pub fn all() -> &'static [Template] {
        REGISTRY
    }
}

/// Where, relative to its statement, a diagnostic points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// The significant part of the statement, from label to terminator.
    Statement,
    /// The label.
    Label,
    /// The keyword or comment opener.
    Keyword,
    /// A math token, by index.
    Math(usize),
    /// A proof token, by index.
    Proof(usize),
    /// A byte range, relative to the start of the statement's text.
    Relative(usize, usize),
    /// The start of a source, for failures which have no text to point at.
    SourceStart(SourceId),
}

/// A resolved location: a byte range within one source.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ErrorLocation {
    /// The statement the diagnostic belongs to.
    pub statement: StatementIndex,
    /// The source containing the range.
    pub source: SourceId,
    /// Local start offset.
    pub from: usize,
    /// Local end offset.
    pub to: usize,
}

/// A data argument of a diagnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arg {
    /// Verbatim text.
    Text(String),
    /// A list of math tokens.
    Math(Vec<Token>),
    /// A bare label or symbol.
    Label(Token),
    /// Another location, rendered as a secondary note.
    Ref(StatementIndex, Anchor),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Text(text) => f.write_str(text),
            Arg::Math(tokens) => write!(f, "\"{}\"", tokens.iter().map(|t| as_str(t)).join(" ")),
            Arg::Label(label) => f.write_str(as_str(label)),
            Arg::Ref(index, _) => write!(f, "statement #{index}"),
        }
    }
}

/// One diagnostic.
#[derive(Clone, PartialEq, Eq)]
pub struct Diagnostic {
    template: &'static Template,
    anchor: Anchor,
    args: Vec<(&'static str, Arg)>,
}

impl fmt::Debug for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category().as_str(), self.code())?;
        if !self.args.is_empty() {
            f.debug_map()
                .entries(self.args.iter().map(|(k, v)| (k, v.to_string())))
                .finish()?;
        }
        Ok(())
    }
}

impl Diagnostic {
    /// Creates a diagnostic for a registered `(category, code)` pair.
    ///
    /// ## Panics
    /// Panics if the pair is not registered.
    #[must_use]
    pub fn new(category: Category, code: &str, anchor: Anchor) -> Self {
        Diagnostic {
            template: Template::lookup(category, code),
            anchor,
            args: vec![],
        }
    }

    /// Adds a verbatim text argument.
    #[must_use]
    pub fn text(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.args.push((name, Arg::Text(value.into())));
        self
    }

    /// Adds a math string argument.
    #[must_use]
    pub fn math(mut self, name: &'static str, value: Vec<Token>) -> Self {
        self.args.push((name, Arg::Math(value)));
        self
    }

    /// Adds a label or symbol argument.
    #[must_use]
    pub fn label(mut self, name: &'static str, value: &[u8]) -> Self {
        self.args.push((name, Arg::Label(value.into())));
        self
    }

    /// Adds a cross-reference to another statement.
    #[must_use]
    pub fn xref(mut self, name: &'static str, statement: StatementIndex, anchor: Anchor) -> Self {
        self.args.push((name, Arg::Ref(statement, anchor)));
        self
    }

    /// The emitting pass.
    #[must_use]
    pub fn category(&self) -> Category {
        self.template.category
    }

    /// The code within the category.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.template.code
    }

    /// The severity tier.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.template.severity
    }

    /// Returns true for error-level diagnostics.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    /// The location within the owning statement.
    #[must_use]
    pub const fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    /// Looks up a data argument by name.
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&Arg> {
        self.args.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    /// The short headline.
    #[must_use]
    pub fn title(&self) -> &'static str {
        self.template.title
    }

    /// The message with all placeholders substituted.
    #[must_use]
    pub fn message(&self) -> String {
        let mut out = String::new();
        let mut rest = self.template.message;
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}') else {
                break;
            };
            out.push_str(&rest[..open]);
            let name = &rest[open + 1..open + close];
            match self.arg(name) {
                Some(arg) => out.push_str(&arg.to_string()),
                None => out.push_str(&rest[open..=open + close]),
            }
            rest = &rest[open + close + 1..];
        }
        out.push_str(rest);
        out
    }

    fn references(&self) -> impl Iterator<Item = (StatementIndex, &Anchor)> {
        self.args.iter().filter_map(|(_, arg)| match arg {
            Arg::Ref(index, anchor) => Some((*index, anchor)),
            _ => None,
        })
    }
}

impl From<io::Error> for Diagnostic {
    fn from(err: io::Error) -> Diagnostic {
        Diagnostic::new(Category::Io, "io-error", Anchor::Statement).text("reason", err.to_string())
    }
}

/// Converts a collection of raw diagnostics to annotation messages.
#[must_use]
pub(crate) fn to_annotations<T>(
    db: &Database,
    mut diags: Vec<(StatementIndex, Diagnostic)>,
    f: impl for<'a> FnOnce(Message<'a>) -> T + Copy,
) -> Vec<T> {
    diags.sort_by_key(|(index, _)| *index);
    diags
        .iter()
        .map(|(index, diag)| diag.to_snippet(db, *index, f))
        .collect()
}

impl Diagnostic {
    fn to_snippet<T>(
        &self,
        db: &Database,
        index: StatementIndex,
        f: impl for<'a> FnOnce(Message<'a>) -> T,
    ) -> T {
        let mut infos: Vec<(Level, Cow<'_, str>, ErrorLocation)> = vec![(
            self.severity().level(),
            self.message().into(),
            db.locate(index, &self.anchor),
        )];
        for (other, anchor) in self.references() {
            infos.push((
                Level::Note,
                "previous occurrence".into(),
                db.locate(other, anchor),
            ));
        }
        let footer = format!("{}/{}", self.category().as_str(), self.code());
        make_snippet_from(self.title(), infos.into_iter(), &[&footer], db, f)
    }
}

/// Creates a `Message` containing one snippet per annotated location.
///
/// # Arguments
///
/// * `label` - The headline of the diagnostic.
/// * `infos` - Severity, annotation text and location of each annotation.
/// * `footer` - Notes appended after the snippets.
/// * `f` - A function for continuation passing style (CPS)
fn make_snippet_from<'b, T>(
    label: &str,
    infos: impl Iterator<Item = (Level, Cow<'b, str>, ErrorLocation)>,
    footer: &[&str],
    db: &Database,
    f: impl for<'a> FnOnce(Message<'a>) -> T,
) -> T {
    let mut snippets = vec![];
    let arena: Arena<String> = Arena::new();
    let mut level = None;
    for (level2, text, loc) in infos {
        level.get_or_insert(level2);
        let source = db.source(loc.source);
        let buf = source.text();
        let from = loc.from.min(buf.len());
        let to = loc.to.clamp(from, buf.len());
        let (line_start, col) = source.lookup_pos(from);
        let source_start = from + 1 - col as usize;
        let source_end = crate::line_cache::LineIndex::line_end(buf, to);
        let annotation = level2
            .span(from - source_start..to - source_start)
            .label(arena.alloc(text.into_owned()));
        let snippet = Snippet::source(as_str(&buf[source_start..source_end]))
            .line_start(line_start as usize)
            .origin(arena.alloc(source.name().to_owned()))
            .fold(true)
            .annotation(annotation);
        snippets.push(snippet);
    }

    f(level
        .unwrap_or(Level::Error)
        .title(label)
        .snippets(snippets)
        .footers(footer.iter().map(|msg| Level::Note.title(msg))))
}
