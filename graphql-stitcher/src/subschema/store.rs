use std::sync::Arc;

use parking_lot::RwLock;

use super::SubschemaConfig;

/// The ordered, append-only list of remote subschemas.
///
/// Insertion order is merge order.
#[derive(Debug, Default)]
pub struct SubschemaStore {
    entries: RwLock<Vec<Arc<SubschemaConfig>>>,
}

impl SubschemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append subschemas. Executors are not contacted here.
    pub fn append(&self, configs: impl IntoIterator<Item = SubschemaConfig>) {
        self.entries
            .write()
            .extend(configs.into_iter().map(Arc::new));
    }

    /// The current contents, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<SubschemaConfig>> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
