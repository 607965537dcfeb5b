//! Subschemas: the local schema and the remote schemas stitched onto it.

mod store;

use std::sync::Arc;

use apollo_compiler::Schema;
use apollo_compiler::validation::Valid;
use apollo_compiler::validation::WithErrors;
use derivative::Derivative;
use derive_more::Display;
pub use store::SubschemaStore;

use crate::configuration::MergeOptions;
use crate::configuration::Transform;
use crate::executor::Executor;

/// Identifies one subschema within a rebuild.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubschemaId {
    /// A remote subschema, by its position in the store.
    #[display("remote subschema #{_0}")]
    Remote(usize),
    /// The host's own schema.
    #[display("local schema")]
    Local,
}

/// How a remote subschema exposes its type schema.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntrospectionKind {
    /// The standard `__schema` introspection query.
    #[default]
    Standard,
    /// The federation `{ _service { sdl } }` query, which keeps `@key` and
    /// other directive applications that standard introspection loses.
    Federation,
}

/// Configuration of one remote subschema, as held by the [`SubschemaStore`].
///
/// The executor is not contacted until the next rebuild.
#[derive(Clone, Default, Derivative)]
#[derivative(Debug)]
pub struct SubschemaConfig {
    pub(crate) name: Option<String>,
    #[derivative(Debug = "ignore")]
    pub(crate) executor: Option<Arc<dyn Executor>>,
    pub(crate) options: MergeOptions,
    pub(crate) introspection: IntrospectionKind,
}

impl SubschemaConfig {
    /// A subschema reached through `executor`.
    pub fn new(executor: impl Executor) -> Self {
        Self::from_arc(Arc::new(executor))
    }

    /// A subschema reached through a shared executor.
    pub fn from_arc(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor: Some(executor),
            ..Default::default()
        }
    }

    /// Name used in logs and errors instead of the subschema's position.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_options(mut self, options: MergeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.options.transforms.push(transform);
        self
    }

    pub fn with_introspection(mut self, introspection: IntrospectionKind) -> Self {
        self.introspection = introspection;
        self
    }

    pub(crate) fn label(&self, id: SubschemaId) -> String {
        self.name.clone().unwrap_or_else(|| id.to_string())
    }
}

/// A subschema whose type schema has been fetched, ready to merge.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct SubschemaDescriptor {
    pub(crate) id: SubschemaId,
    pub(crate) name: String,
    #[derivative(Debug = "ignore")]
    pub(crate) schema: Valid<Schema>,
    #[derivative(Debug = "ignore")]
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) options: MergeOptions,
}

impl SubschemaDescriptor {
    pub(crate) fn new(
        id: SubschemaId,
        name: String,
        schema: Valid<Schema>,
        executor: Arc<dyn Executor>,
        options: MergeOptions,
    ) -> Self {
        Self {
            id,
            name,
            schema,
            executor,
            options,
        }
    }

    pub fn id(&self) -> SubschemaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }
}

/// The host service's own schema and the executor that resolves it.
///
/// Always merged last, so its root fields shadow remote ones with the same name.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct LocalSubschema {
    #[derivative(Debug = "ignore")]
    pub(crate) schema: Valid<Schema>,
    #[derivative(Debug = "ignore")]
    pub(crate) executor: Arc<dyn Executor>,
}

impl LocalSubschema {
    pub fn new(schema: Valid<Schema>, executor: impl Executor) -> Self {
        Self {
            schema,
            executor: Arc::new(executor),
        }
    }

    /// Parse and validate the local SDL.
    pub fn parse(
        sdl: &str,
        executor: impl Executor,
    ) -> Result<Self, WithErrors<Schema>> {
        let schema = Schema::parse_and_validate(sdl, "local.graphql")?;
        Ok(Self::new(schema, executor))
    }

    pub(crate) fn descriptor(&self, options: MergeOptions) -> SubschemaDescriptor {
        SubschemaDescriptor::new(
            SubschemaId::Local,
            SubschemaId::Local.to_string(),
            self.schema.clone(),
            self.executor.clone(),
            options,
        )
    }
}
