//! Store namespaces
//!
//! A namespace isolates one extension's entries from another's. Two
//! namespaces are equal when they were created from the same named parts, or
//! when they are the same identity-only namespace.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counter for identity-only namespaces; 0 is reserved for [`Namespace::global`].
static NEXT_UNIQUE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Named(Arc<str>),
    Unique(u64),
}

/// Isolation key for store entries
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    segments: Arc<[Segment]>,
}

impl Namespace {
    /// The shared namespace every extension may use
    pub fn global() -> Self {
        Self {
            segments: Arc::from(vec![Segment::Unique(0)]),
        }
    }

    /// Namespace with value equality over its parts
    pub fn create<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments: Vec<Segment> = parts
            .into_iter()
            .map(|part| Segment::Named(Arc::from(part.as_ref())))
            .collect();
        Self {
            segments: Arc::from(segments),
        }
    }

    /// Namespace equal only to itself (and its clones)
    pub fn unique() -> Self {
        let id = NEXT_UNIQUE.fetch_add(1, Ordering::Relaxed);
        Self {
            segments: Arc::from(vec![Segment::Unique(id)]),
        }
    }

    /// New namespace nested under this one
    pub fn append<I, S>(&self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut segments: Vec<Segment> = self.segments.to_vec();
        segments.extend(
            parts
                .into_iter()
                .map(|part| Segment::Named(Arc::from(part.as_ref()))),
        );
        Self {
            segments: Arc::from(segments),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Namespace[")?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match segment {
                Segment::Named(name) => f.write_str(name)?,
                Segment::Unique(0) => f.write_str("<global>")?,
                Segment::Unique(id) => write!(f, "#{id}")?,
            }
        }
        f.write_str("]")
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
