//! The linear address space across included files.
//!
//! Every byte of every included file, in traversal order, gets a *linear
//! offset*: the position it would have in the virtual concatenation of the
//! whole database.  A *zone* is a maximal run of linear offsets served by one
//! source at a constant displacement (`offset_base`), so that
//! `linear = offset_base + local`.  Including a file ends the current zone and
//! starts a zone for the included file; reaching its end starts a new zone for
//! the including file, resuming just after the directive.
//!
//! There are two ways to walk zones.  [`ZoneChain`] is the committed chain,
//! built exactly once by the live scan and only ever appended to.
//! [`EphemeralZones`] is an ephemeral, read-only view used by position
//! reconstruction; it borrows the committed chain immutably and therefore
//! cannot extend or alter it.

use crate::source::{Source, SourceId};
use crate::util::HashSet;
use std::sync::Arc;

/// A byte offset in the virtual concatenation of all zones.
pub type LinearOffset = usize;

/// Index of a zone within its chain.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(pub(crate) u32);

impl ZoneId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One committed zone.
#[derive(Debug, Clone)]
pub struct Zone {
    /// The source serving this zone.
    pub source: SourceId,
    /// Displacement from local offsets of `source` to linear offsets.
    pub offset_base: LinearOffset,
    /// First linear offset owned by this zone.
    pub start: LinearOffset,
    /// The zone containing the include directive which opened this file, and
    /// the local offset in that zone's source at which to resume.
    pub return_to: Option<(ZoneId, usize)>,
}

/// A subrange of one source, as produced by [`ZoneChain::get_spans`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    /// The source the bytes come from.
    pub source: SourceId,
    /// Local start offset.
    pub from: usize,
    /// Local end offset.
    pub to: usize,
}

/// The append-only chain of zones built by a live scan.
#[derive(Debug, Default)]
pub struct ZoneChain {
    zones: Vec<Zone>,
    included: HashSet<Arc<str>>,
}

impl ZoneChain {
    /// Appends a zone in which local offset `local` of `source` sits at linear
    /// offset `start`.  Zones must be appended in linear order.
    pub(crate) fn push(
        &mut self,
        source: SourceId,
        start: LinearOffset,
        local: usize,
        return_to: Option<(ZoneId, usize)>,
    ) -> ZoneId {
        debug_assert!(self.zones.last().map_or(true, |z| z.start <= start));
        #[allow(clippy::cast_possible_truncation)]
        let id = ZoneId(self.zones.len() as u32);
        self.zones.push(Zone {
            source,
            offset_base: start - local,
            start,
            return_to,
        });
        id
    }

    /// Returns true if a name was already included somewhere in the chain.
    #[must_use]
    pub fn is_included(&self, name: &str) -> bool {
        self.included.contains(name)
    }

    /// Records a name as included.  Returns false if it already was, in which
    /// case the include is to be skipped.
    pub(crate) fn mark_included(&mut self, name: &Arc<str>) -> bool {
        self.included.insert(name.clone())
    }

    /// Returns true if any include directive opened a new zone.
    #[must_use]
    pub fn has_includes(&self) -> bool {
        self.zones.iter().any(|zone| zone.return_to.is_some())
    }

    /// Number of zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Returns true if nothing has been scanned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// The last zone, which is where a live scan is positioned.
    #[must_use]
    pub fn last(&self) -> Option<ZoneId> {
        #[allow(clippy::cast_possible_truncation)]
        self.zones.len().checked_sub(1).map(|ix| ZoneId(ix as u32))
    }

    /// Accessor for a committed zone.
    #[must_use]
    pub fn zone(&self, id: ZoneId) -> &Zone {
        &self.zones[id.index()]
    }

    /// The zone which takes over from `id`, if any.
    #[must_use]
    pub fn chain_to(&self, id: ZoneId) -> Option<ZoneId> {
        let next = ZoneId(id.0 + 1);
        (next.index() < self.zones.len()).then_some(next)
    }

    /// The linear offset at which `id` hands over to its successor.
    #[must_use]
    pub fn chain_at(&self, id: ZoneId) -> Option<LinearOffset> {
        self.chain_to(id).map(|next| self.zone(next).start)
    }

    /// The linear offset just past the last byte owned by `id`.
    #[must_use]
    pub fn end(&self, id: ZoneId, sources: &[Source]) -> LinearOffset {
        self.chain_at(id).unwrap_or_else(|| {
            let zone = self.zone(id);
            zone.offset_base + sources[zone.source.index()].text().len()
        })
    }

    /// Finds the zone owning `linear`, following the chain forward from
    /// `from`.
    #[must_use]
    pub fn seek(&self, mut from: ZoneId, linear: LinearOffset) -> ZoneId {
        while let Some(at) = self.chain_at(from) {
            if linear < at {
                break;
            }
            from = ZoneId(from.0 + 1);
        }
        from
    }

    /// Splits the linear range `from..to` at zone boundaries.
    #[must_use]
    pub fn get_spans(
        &self,
        sources: &[Source],
        start: ZoneId,
        mut from: LinearOffset,
        to: LinearOffset,
    ) -> Vec<SourceSpan> {
        let mut out = vec![];
        let mut id = self.seek(start, from);
        while from < to {
            let zone = self.zone(id);
            let end = self.end(id, sources).min(to);
            if end > from {
                out.push(SourceSpan {
                    source: zone.source,
                    from: from - zone.offset_base,
                    to: end - zone.offset_base,
                });
                from = end;
            }
            match self.chain_to(id) {
                Some(next) => id = next,
                None => break,
            }
        }
        out
    }

    /// Materializes the text of the linear range `from..to`.
    #[must_use]
    pub fn text_span(
        &self,
        sources: &[Source],
        start: ZoneId,
        from: LinearOffset,
        to: LinearOffset,
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(to.saturating_sub(from));
        for span in self.get_spans(sources, start, from, to) {
            out.extend_from_slice(&sources[span.source.index()].text()[span.from..span.to]);
        }
        out
    }
}

/// Read access to a zone chain, plus the ability to move past the end of a
/// zone.
///
/// The live scan implements this on its `ScanContext`, where moving past the
/// end of an included file commits a new continuation zone.  Reparsing uses
/// [`EphemeralZones`], which can only follow links that already exist.
pub trait ZoneAccess {
    /// The committed chain.
    fn chain(&self) -> &ZoneChain;

    /// All sources, indexed by `SourceId`.
    fn sources(&self) -> &[Source];

    /// The zone following `id` once its text is exhausted, or `None` at the
    /// end of all input.
    fn successor(&mut self, id: ZoneId) -> Option<ZoneId>;

    /// The local text window of a zone.  Bytes before the zone start are
    /// included so that local offsets index it directly.
    fn zone_text(&self, id: ZoneId) -> &[u8] {
        let chain = self.chain();
        let zone = chain.zone(id);
        let text = self.sources()[zone.source.index()].text();
        let end = chain.end(id, self.sources()) - zone.offset_base;
        &text[..end.min(text.len())]
    }
}

/// A read-only view of a committed chain, used for reparsing.
#[derive(Debug, Clone, Copy)]
pub struct EphemeralZones<'a> {
    chain: &'a ZoneChain,
    sources: &'a [Source],
}

impl<'a> EphemeralZones<'a> {
    /// Creates a view over a committed chain.
    #[must_use]
    pub const fn new(chain: &'a ZoneChain, sources: &'a [Source]) -> Self {
        EphemeralZones { chain, sources }
    }
}

impl ZoneAccess for EphemeralZones<'_> {
    fn chain(&self) -> &ZoneChain {
        self.chain
    }

    fn sources(&self) -> &[Source] {
        self.sources
    }

    fn successor(&mut self, id: ZoneId) -> Option<ZoneId> {
        self.chain.chain_to(id)
    }
}
