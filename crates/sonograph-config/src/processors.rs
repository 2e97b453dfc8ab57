//! Named processor factories for worklet nodes.
//!
//! Processors are code, so a graph description can only refer to them by
//! name. The caller registers the factories it offers before building.

use std::collections::BTreeMap;
use std::sync::Arc;

use sonograph_core::ProcessorFactory;

/// Processor factories by name.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    factories: BTreeMap<String, Arc<dyn ProcessorFactory>>,
}

impl ProcessorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn ProcessorFactory>) {
        self.factories.insert(name.into(), factory);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, factory: Arc<dyn ProcessorFactory>) -> Self {
        self.register(name, factory);
        self
    }

    /// Looks up a factory.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ProcessorFactory>> {
        self.factories.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Number of registered processors.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl core::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
