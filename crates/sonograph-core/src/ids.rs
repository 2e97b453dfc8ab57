//! Identifier types shared by the graph model, the engines and the renderer.
//!
//! Graph-side ids ([`NodeId`], [`ParamId`]) embed the [`GraphId`] of the graph
//! that allocated them, so an id from one graph is never silently resolved
//! against another. Engine-side ids ([`ContextId`], [`NativeNodeId`],
//! [`NativeParamId`]) name objects owned by a rendering engine.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::slots::Key;

static NEXT_GRAPH: AtomicU32 = AtomicU32::new(0);
static NEXT_CONTEXT: AtomicU32 = AtomicU32::new(0);

/// Identity of one logical graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(u32);

impl GraphId {
    /// Allocates a process-unique graph id.
    pub fn next() -> Self {
        Self(NEXT_GRAPH.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Unique identifier for a node in an [`AudioGraph`](crate::AudioGraph).
///
/// The slot of a removed node is reused by a later node; the generation
/// tells the two apart, so a stale id never resolves to the new occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) graph: GraphId,
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    /// Returns the graph this node belongs to.
    #[inline]
    pub fn graph(self) -> GraphId {
        self.graph
    }

    /// Returns the slot index within the owning graph.
    #[inline]
    pub fn index(self) -> u32 {
        self.slot
    }

    /// Returns how many times the slot was vacated before this node took it.
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }

    pub(crate) fn key(self) -> Key {
        Key {
            slot: self.slot,
            generation: self.generation,
        }
    }
}

/// Unique identifier for a param in an [`AudioGraph`](crate::AudioGraph).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId {
    pub(crate) graph: GraphId,
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

impl ParamId {
    /// Returns the graph this param belongs to.
    #[inline]
    pub fn graph(self) -> GraphId {
        self.graph
    }

    /// Returns the slot index within the owning graph.
    #[inline]
    pub fn index(self) -> u32 {
        self.slot
    }

    pub(crate) fn key(self) -> Key {
        Key {
            slot: self.slot,
            generation: self.generation,
        }
    }
}

/// Unique identifier for a connection in an [`AudioGraph`](crate::AudioGraph).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

impl EdgeId {
    /// Returns the slot index within the owning graph.
    #[inline]
    pub fn index(self) -> u32 {
        self.slot
    }

    pub(crate) fn key(self) -> Key {
        Key {
            slot: self.slot,
            generation: self.generation,
        }
    }

    pub(crate) fn from_key(key: Key) -> Self {
        Self {
            slot: key.slot,
            generation: key.generation,
        }
    }
}

/// Identity of one rendering context owned by an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    /// Allocates a process-unique context id.
    pub fn next() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Handle to a node constructed by an engine inside one context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeNodeId(pub u32);

/// Handle to a param of a native node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeParamId {
    /// Node owning the param.
    pub node: NativeNodeId,
    /// Position of the param in the node's param list.
    pub index: u32,
}

impl core::fmt::Display for GraphId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "GraphId({})", self.0)
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NodeId({}:{}", self.graph.0, self.slot)?;
        write_generation(f, self.generation)
    }
}

impl core::fmt::Display for ParamId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ParamId({}:{}", self.graph.0, self.slot)?;
        write_generation(f, self.generation)
    }
}

impl core::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "EdgeId({}", self.slot)?;
        write_generation(f, self.generation)
    }
}

/// Closes an id's display, tagging reused slots with their generation.
fn write_generation(f: &mut core::fmt::Formatter<'_>, generation: u32) -> core::fmt::Result {
    if generation == 0 {
        f.write_str(")")
    } else {
        write!(f, "#{generation})")
    }
}

impl core::fmt::Display for ContextId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ContextId({})", self.0)
    }
}

impl core::fmt::Display for NativeNodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "native#{}", self.0)
    }
}
