//! Utilities for source-offset/line-number mapping.
//!
//! Line starts are kept in fixed-size chunks with a first-level table of the
//! first offset of each chunk, so a lookup is two binary searches.  A single
//! flat table would work as well for ordinary files, but chunking keeps the
//! index cheap to extend and to split for pathological inputs with millions of
//! very short lines.

use std::convert::TryFrom;

const CHUNK: usize = 1024;

/// A two-level index of the line starts of one buffer.
#[derive(Debug, Default)]
pub struct LineIndex {
    // first line start of each chunk
    heads: Vec<u32>,
    chunks: Vec<Box<[u32]>>,
    len: usize,
}

impl LineIndex {
    /// Builds the index for a buffer.
    ///
    /// ## Panics
    /// Panics if the buffer is larger than 4GiB.
    #[inline(never)]
    #[must_use]
    pub fn new(buf: &[u8]) -> Self {
        assert!(buf.len() < u32::MAX as usize - 1, "source too large");
        let mut heads = vec![];
        let mut chunks = vec![];
        let mut chunk = Vec::with_capacity(CHUNK);
        let starts = std::iter::once(0).chain(
            buf.iter()
                .enumerate()
                .filter(|&(_, &ch)| ch == b'\n')
                .map(|(pos, _)| pos + 1),
        );
        for start in starts {
            #[allow(clippy::cast_possible_truncation)]
            chunk.push(start as u32);
            if chunk.len() == CHUNK {
                heads.push(chunk[0]);
                chunks.push(std::mem::replace(&mut chunk, Vec::with_capacity(CHUNK)).into());
            }
        }
        if !chunk.is_empty() {
            heads.push(chunk[0]);
            chunks.push(chunk.into());
        }
        Self {
            heads,
            chunks,
            len: buf.len(),
        }
    }

    /// Number of lines.  A trailing newline opens a final, empty line.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    fn line_start(&self, line0: usize) -> Option<usize> {
        let chunk = self.chunks.get(line0 / CHUNK)?;
        chunk.get(line0 % CHUNK).map(|&s| s as usize)
    }

    /// Map a byte offset to a 1-based (line, column) pair.  Columns count
    /// bytes, so tabs and multi-byte characters are not expanded.
    ///
    /// ## Panics
    /// Panics if the offset is beyond the end of the buffer.
    #[must_use]
    pub fn from_offset(&self, offset: usize) -> (u32, u32) {
        assert!(offset <= self.len, "offset out of range");
        let off = u32::try_from(offset).unwrap_or(u32::MAX);
        let chunk_ix = self.heads.partition_point(|&h| h <= off) - 1;
        let chunk = &self.chunks[chunk_ix];
        let line_ix = chunk.partition_point(|&s| s <= off) - 1;
        let start = chunk[line_ix];
        #[allow(clippy::cast_possible_truncation)]
        let line = (chunk_ix * CHUNK + line_ix) as u32;
        (line + 1, off - start + 1)
    }

    /// Byte range of a 1-based line, including its terminator.  Returns
    /// `None` for lines out of range.
    #[must_use]
    pub fn line_range(&self, line: u32) -> Option<std::ops::Range<usize>> {
        let line0 = (line as usize).checked_sub(1)?;
        let start = self.line_start(line0)?;
        let end = self.line_start(line0 + 1).unwrap_or(self.len);
        Some(start..end)
    }

    /// Find the offset just after the end of the line (usually the
    /// location of a '\n', unless we are at the end of the file).
    #[must_use]
    pub fn line_end(buf: &[u8], offset: usize) -> usize {
        buf.iter()
            .skip(offset)
            .position(|&ch| ch == b'\n')
            .map_or(buf.len(), |pos| pos + offset)
    }
}
