//! Node identity in the test tree

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Engine,
    Container,
    Test,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Engine => "engine",
            NodeKind::Container => "container",
            NodeKind::Test => "test",
        }
    }
}

/// Path of `[kind:value]` segments from the engine root,
/// e.g. `[engine:cadence]/[container:Outer]/[test:works]`
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UniqueId {
    segments: Arc<[(NodeKind, Arc<str>)]>,
}

impl UniqueId {
    pub fn engine(name: &str) -> Self {
        Self {
            segments: Arc::from(vec![(NodeKind::Engine, Arc::from(name))]),
        }
    }

    pub fn append(&self, kind: NodeKind, value: &str) -> Self {
        let mut segments = self.segments.to_vec();
        segments.push((kind, Arc::from(value)));
        Self {
            segments: Arc::from(segments),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.segments
            .last()
            .map(|(kind, _)| *kind)
            .unwrap_or(NodeKind::Engine)
    }

    /// Value of the last segment
    pub fn name(&self) -> &str {
        self.segments
            .last()
            .map(|(_, value)| value.as_ref())
            .unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: Arc::from(&self.segments[..self.segments.len() - 1]),
        })
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (kind, value)) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "[{}:{}]", kind.as_str(), value)?;
        }
        Ok(())
    }
}

impl fmt::Debug for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniqueId({self})")
    }
}

impl Serialize for UniqueId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
