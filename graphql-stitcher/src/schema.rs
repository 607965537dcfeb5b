//! The stitched schema served to clients.

use std::fmt::Display;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::ast::OperationType;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::validation::Valid;
use derivative::Derivative;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::executor::Executor;
use crate::federation::FederationResolvers;
use crate::subschema::SubschemaId;

/// The unified schema produced by a rebuild.
///
/// Immutable once built: a rebuild produces a new value which replaces this one.
pub struct UnifiedSchema {
    pub(crate) definitions: Valid<Schema>,
    pub(crate) raw_sdl: Arc<String>,
    pub(crate) schema_id: SchemaHash,
    pub(crate) routes: RootRoutes,
    pub(crate) entities: EntityIndex,
    pub(crate) federation: Option<Arc<FederationResolvers>>,
}

impl UnifiedSchema {
    pub(crate) fn new(definitions: Valid<Schema>, routes: RootRoutes, entities: EntityIndex) -> Self {
        let raw_sdl = Arc::new(definitions.to_string());
        let schema_id = SchemaHash::new(&raw_sdl);
        Self {
            definitions,
            raw_sdl,
            schema_id,
            routes,
            entities,
            federation: None,
        }
    }

    /// Replace the definitions, keeping routes and entities, and bind federation resolvers.
    pub(crate) fn with_federation(
        self,
        definitions: Valid<Schema>,
        resolvers: FederationResolvers,
    ) -> Self {
        let mut schema = Self::new(definitions, self.routes, self.entities);
        schema.federation = Some(Arc::new(resolvers));
        schema
    }

    /// The validated schema definitions.
    pub fn schema(&self) -> &Valid<Schema> {
        &self.definitions
    }

    /// The schema printed as SDL.
    pub fn as_sdl(&self) -> &str {
        &self.raw_sdl
    }

    pub fn schema_id(&self) -> &SchemaHash {
        &self.schema_id
    }

    /// Names of the fields of the query root type.
    pub fn query_fields(&self) -> Vec<&str> {
        self.root_fields(OperationType::Query)
    }

    /// Names of the fields of the mutation root type.
    pub fn mutation_fields(&self) -> Vec<&str> {
        self.root_fields(OperationType::Mutation)
    }

    fn root_fields(&self, operation: OperationType) -> Vec<&str> {
        self.definitions
            .root_operation(operation)
            .and_then(|root| self.definitions.get_object(root))
            .map(|root| root.fields.keys().map(Name::as_str).collect())
            .unwrap_or_default()
    }

    /// The subschema that resolves a root field.
    pub fn route(&self, operation: OperationType, field: &str) -> Option<&FieldRoute> {
        self.routes.get(operation, field)
    }

    pub fn entities(&self) -> &EntityIndex {
        &self.entities
    }

    /// The federation resolvers bound to this schema, when federation metadata is enabled.
    pub fn federation(&self) -> Option<&FederationResolvers> {
        self.federation.as_deref()
    }
}

impl std::fmt::Debug for UnifiedSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UnifiedSchema {{ schema_id: {}, query: {:?}, mutation: {:?}, entities: {:?} }}",
            self.schema_id,
            self.query_fields(),
            self.mutation_fields(),
            self.entities.names().collect::<Vec<_>>(),
        )
    }
}

/// Where a root field of the unified schema is resolved.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct FieldRoute {
    pub(crate) subschema: SubschemaId,
    pub(crate) subschema_name: String,
    /// The field name in the owning subschema, before transforms.
    pub(crate) field: Name,
    #[derivative(Debug = "ignore")]
    pub(crate) executor: Arc<dyn Executor>,
}

impl FieldRoute {
    pub fn subschema(&self) -> SubschemaId {
        self.subschema
    }

    pub fn subschema_name(&self) -> &str {
        &self.subschema_name
    }

    pub fn original_field(&self) -> &str {
        &self.field
    }
}

/// Routes of the query and mutation root fields.
#[derive(Clone, Debug, Default)]
pub struct RootRoutes {
    pub(crate) query: IndexMap<Name, FieldRoute>,
    pub(crate) mutation: IndexMap<Name, FieldRoute>,
}

impl RootRoutes {
    pub(crate) fn for_operation_mut(
        &mut self,
        operation: OperationType,
    ) -> Option<&mut IndexMap<Name, FieldRoute>> {
        match operation {
            OperationType::Query => Some(&mut self.query),
            OperationType::Mutation => Some(&mut self.mutation),
            OperationType::Subscription => None,
        }
    }

    pub fn get(&self, operation: OperationType, field: &str) -> Option<&FieldRoute> {
        match operation {
            OperationType::Query => self.query.get(field),
            OperationType::Mutation => self.mutation.get(field),
            OperationType::Subscription => None,
        }
    }
}

/// The subschema that resolves an entity type by key.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct EntityOwner {
    pub(crate) subschema: SubschemaId,
    pub(crate) subschema_name: String,
    /// The `fields` argument of every `@key` application.
    pub(crate) keys: Vec<String>,
    #[derivative(Debug = "ignore")]
    pub(crate) executor: Arc<dyn Executor>,
}

impl EntityOwner {
    pub fn subschema(&self) -> SubschemaId {
        self.subschema
    }

    pub fn subschema_name(&self) -> &str {
        &self.subschema_name
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// Entity types of the unified schema, in merge order.
#[derive(Clone, Debug, Default)]
pub struct EntityIndex(pub(crate) IndexMap<Name, EntityOwner>);

impl EntityIndex {
    pub fn get(&self, type_name: &str) -> Option<&EntityOwner> {
        self.0.get(type_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// A schema ID is the sha256 hash of the schema text.
///
/// That means that differences in whitespace and comments affect the hash, not only semantic
/// differences in the schema.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Deserialize, Serialize)]
pub struct SchemaHash(Arc<String>);

impl SchemaHash {
    pub(crate) fn new(sdl: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(sdl);
        let hash = format!("{:x}", hasher.finalize());
        Self(Arc::new(hash))
    }

    /// Return the hash as a hexadecimal string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for SchemaHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}
