//! Source locations.
//!
//! A `Span` is a half-open byte range `[start, end)` inside one source
//! buffer, identified by `FileId`. The mapping from `FileId` to a path or
//! buffer text lives in higher-level components (the buffer registry for
//! driver inputs, the loaders for sibling sources).

/// Identifier for a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

impl FileId {
    /// File id used for sources that were parsed outside the buffer
    /// registry, e.g. module sources located by an import loader.
    pub const DETACHED: FileId = FileId(u32::MAX);
}

/// A byte range within a single file.
///
/// Offsets are bytes, not characters; line/column information is derived
/// by whoever renders a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Span {
        Span { file, start, end }
    }

    /// An empty span at a single position.
    pub fn empty(file: FileId, pos: u32) -> Span {
        Span::new(file, pos, pos)
    }

    /// Placeholder span for diagnostics that have no useful location,
    /// e.g. configuration errors reported before any parsing happened.
    pub fn dummy() -> Span {
        Span::new(FileId::DETACHED, 0, 0)
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Smallest span covering both `self` and `other`; `None` if they
    /// live in different files.
    pub fn join(self, other: Span) -> Option<Span> {
        if self.file != other.file {
            return None;
        }
        Some(Span::new(
            self.file,
            self.start.min(other.start),
            self.end.max(other.end),
        ))
    }

    /// Whether `offset` falls inside this span.
    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_spans_in_the_same_file() {
        let a = Span::new(FileId(0), 4, 10);
        let b = Span::new(FileId(0), 8, 16);
        assert_eq!(a.join(b), Some(Span::new(FileId(0), 4, 16)));
    }

    #[test]
    fn refuses_to_join_across_files() {
        let a = Span::new(FileId(0), 0, 1);
        let b = Span::new(FileId(1), 0, 1);
        assert_eq!(a.join(b), None);
    }

    #[test]
    fn containment_is_half_open() {
        let s = Span::new(FileId(0), 2, 5);
        assert!(s.contains(2));
        assert!(s.contains(4));
        assert!(!s.contains(5));
    }
}
