//! The active schema served to clients.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::schema::UnifiedSchema;

/// Holds the schema the host currently serves.
///
/// Replacement must be atomic: a reader sees either the previous schema or
/// the new one, never a mix, and keeps its snapshot for as long as it needs it.
pub trait SchemaRegistry: Send + Sync + 'static {
    fn current_schema(&self) -> Arc<UnifiedSchema>;

    fn replace_schema(&self, schema: UnifiedSchema);
}

/// The default [`SchemaRegistry`], a lock-free swap cell.
#[derive(Debug)]
pub struct ActiveSchema {
    current: ArcSwap<UnifiedSchema>,
}

impl ActiveSchema {
    pub fn new(initial: UnifiedSchema) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }
}

impl SchemaRegistry for ActiveSchema {
    fn current_schema(&self) -> Arc<UnifiedSchema> {
        self.current.load_full()
    }

    fn replace_schema(&self, schema: UnifiedSchema) {
        self.current.store(Arc::new(schema));
    }
}
