//! Translation of the unified schema into a federation subgraph schema.
//!
//! The unified schema is printed without federation directives and plumbing,
//! rebuilt by a [`FederationSchemaBuilder`], and the `_service` and `_entities`
//! resolvers of the result are bound to the schema that gets served.

mod builder;
mod print;
mod resolvers;
pub(crate) mod spec;

use std::sync::Arc;

use apollo_compiler::Name;
use derivative::Derivative;

pub use self::builder::FederationSchema;
pub use self::builder::FederationSchemaBuilder;
pub use self::builder::SubgraphSchemaBuilder;
pub use self::print::PrintFilter;
pub use self::print::print_filtered;
pub use self::resolvers::EntitiesResolver;
pub use self::resolvers::FederationResolvers;
pub use self::resolvers::ServiceResolver;
use self::spec::ENTITIES_QUERY;
use self::spec::SERVICE_SDL_QUERY;
use self::spec::add_federation_plumbing;
use self::spec::has_root_field;
use self::spec::object_types;
use crate::error::FederationTranslationError;
use crate::schema::UnifiedSchema;

/// Produces federation metadata for a unified schema.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct FederationTranslator {
    filter: PrintFilter,
    #[derivative(Debug = "ignore")]
    builder: Arc<dyn FederationSchemaBuilder>,
}

impl Default for FederationTranslator {
    fn default() -> Self {
        Self::new(Arc::new(SubgraphSchemaBuilder))
    }
}

impl FederationTranslator {
    pub fn new(builder: Arc<dyn FederationSchemaBuilder>) -> Self {
        Self {
            filter: PrintFilter::default(),
            builder,
        }
    }

    pub fn with_filter(mut self, filter: PrintFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Print, rebuild and extract the federation resolvers of `unified`.
    pub(crate) fn translate(
        &self,
        unified: &UnifiedSchema,
    ) -> Result<(FederationSchema, FederationResolvers), FederationTranslationError> {
        let sdl = print_filtered(unified.schema(), &self.filter);
        let entities = object_types(unified.schema(), unified.entities().names());
        let federation = self.builder.build(&sdl, &entities)?;

        let service = if has_root_field(federation.schema(), SERVICE_SDL_QUERY) {
            Some(ServiceResolver::new(federation.sdl.clone()))
        } else {
            tracing::warn!("federation schema has no `_service` field, `_service` is not served");
            None
        };
        let entities = if entities.is_empty() {
            None
        } else if has_root_field(federation.schema(), ENTITIES_QUERY) {
            Some(EntitiesResolver::new(unified.entities().clone()))
        } else {
            tracing::warn!(
                "federation schema has no `_entities` field, entities are not resolvable"
            );
            None
        };

        Ok((federation, FederationResolvers { service, entities }))
    }

    /// Bind `resolvers` to `unified`, reinstating the root fields they answer.
    pub(crate) fn install(
        unified: UnifiedSchema,
        resolvers: FederationResolvers,
    ) -> Result<UnifiedSchema, FederationTranslationError> {
        let mut definitions = unified.schema().clone().into_inner();
        let entities: Vec<Name> = if resolvers.entities.is_some() {
            object_types(&definitions, unified.entities().names())
        } else {
            Vec::new()
        };
        add_federation_plumbing(&mut definitions, resolvers.service.is_some(), &entities)
            .map_err(|errors| FederationTranslationError::Reinstate(errors.into()))?;
        let definitions = definitions
            .validate()
            .map_err(|errors| FederationTranslationError::Reinstate(errors.into()))?;

        Ok(unified.with_federation(definitions, resolvers))
    }
}
