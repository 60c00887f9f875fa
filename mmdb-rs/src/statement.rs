//! Statements: the unit of the database.
//!
//! A statement owns the text from the end of the previous statement up to and
//! including its own terminator, so the raw texts of all statements, in order,
//! reproduce the input exactly.  Only the classification and the tokens are
//! stored eagerly; exact token positions are recomputed on demand by
//! rescanning the single statement (see [`crate::scanner::reparse`]).

use crate::diag::Diagnostic;
use crate::zone::{LinearOffset, ZoneId};
use std::cell::OnceCell;
use std::fmt;

/// Index of a statement in the database's statement list.
pub type StatementIndex = usize;

/// A label or math symbol, stored as its bytes.
pub type Token = Box<[u8]>;

/// Semantic type of a statement, without its payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StatementType {
    /// Trailing whitespace at the end of all input.
    Eof,
    /// A top-level comment `$( ... $)`.
    Comment,
    /// A top-level comment whose first token is `$t` or `$j`.
    MetaComment,
    /// `${`
    Open,
    /// `$}`
    Close,
    /// `$c`
    Constant,
    /// `$v`
    Variable,
    /// `$d`
    Disjoint,
    /// `$a`
    Axiom,
    /// `$p`
    Provable,
    /// A statement which needed a label and had none.
    Bogus,
    /// `$e`
    Essential,
    /// `$f`
    Floating,
    /// `$[ ... $]`
    Include,
}

impl StatementType {
    /// Returns true for `$a` and `$p` statements.
    #[must_use]
    pub const fn is_assertion(self) -> bool {
        matches!(self, StatementType::Axiom | StatementType::Provable)
    }

    /// Returns true for keywords which must be preceded by a label.
    #[must_use]
    pub const fn takes_label(self) -> bool {
        matches!(
            self,
            StatementType::Axiom
                | StatementType::Provable
                | StatementType::Essential
                | StatementType::Floating
        )
    }

    /// Returns true for keywords which collect a math string.
    #[must_use]
    pub const fn takes_math(self) -> bool {
        matches!(
            self,
            StatementType::Axiom
                | StatementType::Provable
                | StatementType::Essential
                | StatementType::Floating
                | StatementType::Constant
                | StatementType::Variable
                | StatementType::Disjoint
        )
    }

    /// Maps a keyword token to the statement type it starts.
    #[must_use]
    pub fn from_keyword(token: &[u8]) -> Option<Self> {
        Some(match token {
            b"$a" => StatementType::Axiom,
            b"$c" => StatementType::Constant,
            b"$d" => StatementType::Disjoint,
            b"$e" => StatementType::Essential,
            b"$f" => StatementType::Floating,
            b"$p" => StatementType::Provable,
            b"$v" => StatementType::Variable,
            b"${" => StatementType::Open,
            b"$}" => StatementType::Close,
            b"$[" => StatementType::Include,
            b"$(" => StatementType::Comment,
            _ => return None,
        })
    }
}

/// A statement's classification together with its kind-specific payload.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum StatementKind {
    Eof,
    Comment,
    MetaComment,
    Open,
    Close,
    Constant {
        math: Box<[Token]>,
    },
    Variable {
        math: Box<[Token]>,
    },
    Disjoint {
        math: Box<[Token]>,
    },
    Axiom {
        label: Token,
        math: Box<[Token]>,
    },
    Provable {
        label: Token,
        math: Box<[Token]>,
        proof: Box<[Token]>,
    },
    Essential {
        label: Token,
        math: Box<[Token]>,
    },
    Floating {
        label: Token,
        math: Box<[Token]>,
    },
    /// The keyword required a label and none was given.  The tokens are kept
    /// so the shape of the statement survives.
    Bogus {
        intended: StatementType,
        math: Box<[Token]>,
        proof: Option<Box<[Token]>>,
    },
    Include {
        file: Option<Token>,
    },
}

impl StatementKind {
    /// The payload-free type.
    #[must_use]
    pub const fn statement_type(&self) -> StatementType {
        match self {
            StatementKind::Eof => StatementType::Eof,
            StatementKind::Comment => StatementType::Comment,
            StatementKind::MetaComment => StatementType::MetaComment,
            StatementKind::Open => StatementType::Open,
            StatementKind::Close => StatementType::Close,
            StatementKind::Constant { .. } => StatementType::Constant,
            StatementKind::Variable { .. } => StatementType::Variable,
            StatementKind::Disjoint { .. } => StatementType::Disjoint,
            StatementKind::Axiom { .. } => StatementType::Axiom,
            StatementKind::Provable { .. } => StatementType::Provable,
            StatementKind::Essential { .. } => StatementType::Essential,
            StatementKind::Floating { .. } => StatementType::Floating,
            StatementKind::Bogus { .. } => StatementType::Bogus,
            StatementKind::Include { .. } => StatementType::Include,
        }
    }
}

/// Exact positions of the parts of a statement, as linear offsets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Positions {
    /// First byte of the label, keyword or comment opener.
    pub start: LinearOffset,
    /// The label, if one was given.
    pub label: Option<LinearOffset>,
    /// The keyword (or comment opener).
    pub keyword: LinearOffset,
    /// Each math token, or the file name of an include.
    pub math: Vec<LinearOffset>,
    /// The `$=` separator of a provable statement.
    pub separator: Option<LinearOffset>,
    /// Each proof token.
    pub proof: Vec<LinearOffset>,
    /// Just past the last byte of the statement.
    pub end: LinearOffset,
}

/// One statement of a database.
#[derive(Clone)]
pub struct Statement {
    pub(crate) kind: StatementKind,
    pub(crate) zone: ZoneId,
    pub(crate) start: LinearOffset,
    pub(crate) len: usize,
    pub(crate) index: StatementIndex,
    pub(crate) positions: OnceCell<Positions>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("start", &self.start)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl Statement {
    /// The kind and payload.
    #[must_use]
    pub const fn kind(&self) -> &StatementKind {
        &self.kind
    }

    /// The payload-free type.
    #[must_use]
    pub const fn statement_type(&self) -> StatementType {
        self.kind.statement_type()
    }

    /// Position of this statement in the database.
    #[must_use]
    pub const fn index(&self) -> StatementIndex {
        self.index
    }

    /// The zone in which the statement's text begins; the seed of a reparse.
    #[must_use]
    pub const fn reparse_zone(&self) -> ZoneId {
        self.zone
    }

    /// The linear offset at which the statement's text begins, including
    /// leading whitespace.
    #[must_use]
    pub const fn reparse_index(&self) -> LinearOffset {
        self.start
    }

    /// The number of bytes covered, including leading whitespace.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true for a zero-length statement (only possible for EOF).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Linear offset just past the statement.
    #[must_use]
    pub const fn end(&self) -> LinearOffset {
        self.start + self.len
    }

    /// The label, for statements which have one.
    #[must_use]
    pub fn label(&self) -> Option<&[u8]> {
        match &self.kind {
            StatementKind::Axiom { label, .. }
            | StatementKind::Provable { label, .. }
            | StatementKind::Essential { label, .. }
            | StatementKind::Floating { label, .. } => Some(label),
            _ => None,
        }
    }

    /// The math string; empty for kinds which have none.
    #[must_use]
    pub fn math(&self) -> &[Token] {
        match &self.kind {
            StatementKind::Constant { math }
            | StatementKind::Variable { math }
            | StatementKind::Disjoint { math }
            | StatementKind::Axiom { math, .. }
            | StatementKind::Provable { math, .. }
            | StatementKind::Essential { math, .. }
            | StatementKind::Floating { math, .. }
            | StatementKind::Bogus { math, .. } => math,
            _ => &[],
        }
    }

    /// The proof tokens; empty except for provable statements.
    #[must_use]
    pub fn proof(&self) -> &[Token] {
        match &self.kind {
            StatementKind::Provable { proof, .. } => proof,
            StatementKind::Bogus {
                proof: Some(proof), ..
            } => proof,
            _ => &[],
        }
    }

    /// Diagnostics recorded while scanning this statement.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Returns true if any scan diagnostic of error level is attached.
    #[must_use]
    pub fn has_scan_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Cached positions, if they have been computed.
    #[must_use]
    pub fn cached_positions(&self) -> Option<&Positions> {
        self.positions.get()
    }
}
