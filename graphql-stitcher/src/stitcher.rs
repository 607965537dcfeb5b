//! The public control surface of the stitching engine.

use std::sync::Arc;
use std::time::Duration;

use crate::builder::Composition;
use crate::builder::SchemaBuilder;
use crate::configuration::Configuration;
use crate::error::RebuildError;
use crate::federation::FederationSchemaBuilder;
use crate::federation::FederationTranslator;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::merge::Merge;
use crate::merge::TypeMerger;
use crate::registry::SchemaRegistry;
use crate::scheduler::RefreshScheduler;
use crate::scheduler::RefreshState;
use crate::schema::UnifiedSchema;
use crate::subschema::LocalSubschema;
use crate::subschema::SubschemaConfig;
use crate::subschema::SubschemaStore;

/// Stitches remote subschemas into the local schema and keeps the result fresh.
///
/// Dropping the stitcher stops its refresh timer.
pub struct Stitcher {
    configuration: Configuration,
    store: Arc<SubschemaStore>,
    builder: Arc<SchemaBuilder>,
    scheduler: RefreshScheduler,
}

#[buildstructor::buildstructor]
impl Stitcher {
    /// Returns a builder for a [`Stitcher`].
    ///
    /// The local schema is served on its own until remote subschemas are added.
    /// Without a `registry` the served schema is held internally; either way
    /// [`Stitcher::schema`] reads it.
    /// When `subschemas` is not empty a rebuild runs before this returns, and its
    /// error is returned. A configured `polling_interval` starts auto-refresh.
    ///
    /// Must be called from within a Tokio runtime.
    #[builder(visibility = "pub")]
    async fn new(
        configuration: Option<Configuration>,
        local: LocalSubschema,
        subschemas: Vec<SubschemaConfig>,
        merger: Option<Arc<dyn Merge>>,
        federation_builder: Option<Arc<dyn FederationSchemaBuilder>>,
        registry: Option<Arc<dyn SchemaRegistry>>,
    ) -> Result<Self, RebuildError> {
        let configuration = configuration.unwrap_or_default();
        let federation = configuration.federation_metadata().then(|| match federation_builder {
            Some(builder) => FederationTranslator::new(builder),
            None => FederationTranslator::default(),
        });
        let composition = Composition {
            local,
            local_options: configuration.local_subschema.clone(),
            stitch_options: configuration.stitch.clone(),
            merger: merger.unwrap_or_else(|| Arc::new(TypeMerger)),
            federation,
        };

        let store = Arc::new(SubschemaStore::new());
        let has_subschemas = !subschemas.is_empty();
        store.append(subschemas);
        let builder = Arc::new(SchemaBuilder::new(store.clone(), composition, registry)?);
        if has_subschemas {
            builder.rebuild().await?;
        }

        let stitcher = Self {
            scheduler: RefreshScheduler::new(builder.clone()),
            configuration,
            store,
            builder,
        };
        if let Some(interval) = stitcher.configuration.polling_interval() {
            stitcher.scheduler.start(interval);
        }
        Ok(stitcher)
    }
}

impl Stitcher {
    /// Append remote subschemas and rebuild.
    ///
    /// The subschemas stay in the store even when the rebuild fails.
    pub async fn add_remote_schemas(
        &self,
        subschemas: impl IntoIterator<Item = SubschemaConfig>,
    ) -> Result<Arc<UnifiedSchema>, RebuildError> {
        self.store.append(subschemas);
        self.builder.rebuild().await
    }

    /// Rebuild now from the current subschemas.
    pub async fn refresh_remote_schemas(&self) -> Result<Arc<UnifiedSchema>, RebuildError> {
        self.builder.rebuild().await
    }

    /// Start, or restart, periodic refresh.
    ///
    /// `interval` defaults to the configured polling interval; with neither,
    /// nothing is armed.
    pub fn auto_refresh_remote_schemas(&self, interval: Option<Duration>) {
        match interval.or(self.configuration.polling_interval()) {
            Some(interval) => self.scheduler.start(interval),
            None => tracing::warn!(
                "auto-refresh requested without an interval and no polling_interval is configured"
            ),
        }
    }

    /// Stop periodic refresh. Does nothing when it is not running.
    pub fn stop_auto_refresh_remote_schemas(&self) {
        self.scheduler.stop()
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.scheduler.state()
    }

    /// A snapshot of the schema currently served.
    pub fn schema(&self) -> Arc<UnifiedSchema> {
        self.builder.registry().current_schema()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// The number of remote subschemas in the store.
    pub fn remote_schema_count(&self) -> usize {
        self.store.len()
    }

    /// Execute a client request against the schema currently served.
    pub async fn execute(&self, request: Request) -> Response {
        self.schema().execute(request).await
    }
}
