//! Rebuilding the unified schema from the current subschemas.

use std::sync::Arc;

use futures::future::join_all;

use crate::configuration::MergeOptions;
use crate::configuration::StitchOptions;
use crate::error::RebuildError;
use crate::federation::FederationTranslator;
use crate::introspection::introspect;
use crate::merge::Merge;
use crate::registry::ActiveSchema;
use crate::registry::SchemaRegistry;
use crate::schema::UnifiedSchema;
use crate::subschema::LocalSubschema;
use crate::subschema::SubschemaDescriptor;
use crate::subschema::SubschemaId;
use crate::subschema::SubschemaStore;

/// Introspects, merges and swaps in the unified schema.
pub(crate) struct SchemaBuilder {
    store: Arc<SubschemaStore>,
    composition: Composition,
    registry: Arc<dyn SchemaRegistry>,
    // one rebuild at a time, so the last swap reflects the latest store contents
    rebuild_lock: tokio::sync::Mutex<()>,
}

/// Everything a rebuild needs besides the remote subschemas.
pub(crate) struct Composition {
    pub(crate) local: LocalSubschema,
    pub(crate) local_options: MergeOptions,
    pub(crate) stitch_options: StitchOptions,
    pub(crate) merger: Arc<dyn Merge>,
    pub(crate) federation: Option<FederationTranslator>,
}

impl Composition {
    /// Merge `remotes` followed by the local schema, then add federation metadata
    /// when enabled.
    fn compose(&self, mut remotes: Vec<SubschemaDescriptor>) -> Result<UnifiedSchema, RebuildError> {
        remotes.push(self.local.descriptor(self.local_options.clone()));
        let unified = self.merger.merge(&remotes, &self.stitch_options)?;

        match &self.federation {
            Some(translator) => {
                let (_, resolvers) = translator.translate(&unified)?;
                Ok(FederationTranslator::install(unified, resolvers)?)
            }
            None => Ok(unified),
        }
    }
}

impl SchemaBuilder {
    /// Create a builder serving the local schema alone until the first rebuild.
    ///
    /// Without a `registry` the schema is held by an [`ActiveSchema`].
    pub(crate) fn new(
        store: Arc<SubschemaStore>,
        composition: Composition,
        registry: Option<Arc<dyn SchemaRegistry>>,
    ) -> Result<Self, RebuildError> {
        let initial = composition.compose(Vec::new())?;
        let registry = match registry {
            Some(registry) => {
                registry.replace_schema(initial);
                registry
            }
            None => Arc::new(ActiveSchema::new(initial)),
        };
        Ok(Self {
            store,
            composition,
            registry,
            rebuild_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub(crate) fn registry(&self) -> &Arc<dyn SchemaRegistry> {
        &self.registry
    }

    /// Introspect every remote subschema, merge them with the local schema and
    /// swap the result in.
    ///
    /// On error nothing is swapped and the previous schema stays active.
    pub(crate) async fn rebuild(&self) -> Result<Arc<UnifiedSchema>, RebuildError> {
        let _guard = self.rebuild_lock.lock().await;
        let remotes = self.store.snapshot();
        tracing::debug!(remotes = remotes.len(), "rebuilding stitched schema");

        let descriptors = join_all(
            remotes
                .iter()
                .enumerate()
                .map(|(index, config)| introspect(SubschemaId::Remote(index), config)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

        let schema = self.composition.compose(descriptors)?;
        tracing::info!(
            schema_id = %schema.schema_id(),
            subschemas = remotes.len() + 1,
            "stitched schema updated"
        );
        self.registry.replace_schema(schema);
        Ok(self.registry.current_schema())
    }
}
