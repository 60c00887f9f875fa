//! Named units of source text and the resolvers which supply them.
//!
//! A `Source` is created empty when its name is first referenced and becomes
//! immutable once text (or a failure) has been recorded for it.  The scanner
//! never reads a file itself; it asks a [`SourceResolver`], which may answer
//! immediately, report a failure, or ask the caller to come back later.

use crate::line_cache::LineIndex;
use crate::util::HashMap;
use std::cell::OnceCell;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Index of a source within a scan context.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) u32);

impl SourceId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

const MM_VALID_SPACES: u64 =
    (1u64 << 9) | (1u64 << 10) | (1u64 << 12) | (1u64 << 13) | (1u64 << 32);

/// Check if a byte is whitespace in the source language (TAB, LF, FF, CR,
/// SPACE).  Every other byte, valid or not, is part of a token.
#[must_use]
pub const fn is_mm_space(byte: u8) -> bool {
    byte <= 32 && (MM_VALID_SPACES & (1u64 << byte)) != 0
}

/// Check if a byte may appear inside a token: printable ASCII.
#[must_use]
pub const fn is_token_char(byte: u8) -> bool {
    byte > 32 && byte < 127
}

/// The text of one named unit.
pub struct Source {
    name: Arc<str>,
    text: Option<Arc<[u8]>>,
    failed: Option<String>,
    lines: OnceCell<LineIndex>,
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("len", &self.text.as_ref().map(|t| t.len()))
            .field("failed", &self.failed)
            .finish()
    }
}

impl Source {
    pub(crate) fn new(name: &str) -> Self {
        Source {
            name: name.into(),
            text: None,
            failed: None,
            lines: OnceCell::new(),
        }
    }

    pub(crate) fn with_text(name: &str, text: impl Into<Arc<[u8]>>) -> Self {
        Source {
            text: Some(text.into()),
            ..Self::new(name)
        }
    }

    /// Records the outcome of resolution.  Only the first outcome sticks.
    pub(crate) fn settle(&mut self, outcome: Result<Vec<u8>, String>) {
        if self.is_settled() {
            return;
        }
        match outcome {
            Ok(text) => self.text = Some(text.into()),
            Err(reason) => self.failed = Some(reason),
        }
    }

    /// The name used to reference this unit.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The text, or an empty slice if the source has not been loaded or failed.
    #[must_use]
    pub fn text(&self) -> &[u8] {
        self.text.as_deref().unwrap_or(&[])
    }

    /// Returns true once text or a failure has been recorded.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.text.is_some() || self.failed.is_some()
    }

    /// The failure reason, for sources which could not be resolved.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failed.as_deref()
    }

    fn lines(&self) -> &LineIndex {
        self.lines.get_or_init(|| LineIndex::new(self.text()))
    }

    /// Converts a byte offset to a 1-based (line, column) pair.
    #[must_use]
    pub fn lookup_pos(&self, offset: usize) -> (u32, u32) {
        self.lines().from_offset(offset)
    }

    /// Returns a 1-based line including its terminator, or an empty slice if
    /// the line is out of range.
    #[must_use]
    pub fn get_line(&self, line: u32) -> &[u8] {
        self.lines()
            .line_range(line)
            .map_or(&[], |range| &self.text()[range])
    }

    /// Returns the offset just past the token starting at `offset`.
    #[must_use]
    pub fn token_end(&self, offset: usize) -> usize {
        let text = self.text();
        text.iter()
            .skip(offset)
            .position(|&ch| is_mm_space(ch))
            .map_or(text.len(), |len| offset + len)
    }
}

/// The answer of a resolver for one name.
#[derive(Debug)]
pub enum Resolution {
    /// The full text is available.
    Text(Vec<u8>),
    /// The source cannot be loaded; the string is a human-readable reason.
    Failed(String),
    /// The text will be supplied later through `ScanContext::provide`.
    Pending,
}

/// Supplies source text by name.
pub trait SourceResolver {
    /// Resolves a name.  Called at most once per name per scan.
    fn resolve(&mut self, name: &str) -> Resolution;
}

/// A resolver over in-memory `(name, text)` pairs.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    /// Builds a resolver from a list of named texts.
    #[must_use]
    pub fn new(files: Vec<(String, Vec<u8>)>) -> Self {
        MemoryResolver {
            files: files.into_iter().collect(),
        }
    }
}

impl SourceResolver for MemoryResolver {
    fn resolve(&mut self, name: &str) -> Resolution {
        match self.files.get(name) {
            Some(text) => Resolution::Text(text.clone()),
            None => Resolution::Failed(format!("no source named {name}")),
        }
    }
}

/// A resolver which reads files relative to a base directory.
#[derive(Debug, Default)]
pub struct FsResolver {
    base: PathBuf,
}

impl FsResolver {
    /// Creates a resolver for names relative to `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        FsResolver { base: base.into() }
    }
}

impl SourceResolver for FsResolver {
    fn resolve(&mut self, name: &str) -> Resolution {
        match fs::read(self.base.join(name)) {
            Ok(text) => Resolution::Text(text),
            Err(err) => Resolution::Failed(format!("{name}: {err}")),
        }
    }
}

/// A resolver which never answers, leaving every source pending.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeferredResolver;

impl SourceResolver for DeferredResolver {
    fn resolve(&mut self, _name: &str) -> Resolution {
        Resolution::Pending
    }
}
