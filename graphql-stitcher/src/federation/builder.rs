use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::validation::Valid;

use super::spec::add_federation_plumbing;
use crate::error::FederationTranslationError;

/// A schema rebuilt from filtered SDL, with the federation root fields a
/// gateway expects.
#[derive(Debug)]
pub struct FederationSchema {
    pub(crate) schema: Valid<Schema>,
    pub(crate) sdl: Arc<String>,
}

impl FederationSchema {
    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    /// The filtered SDL the schema was built from, which is what `_service.sdl` reports.
    pub fn sdl(&self) -> &str {
        &self.sdl
    }
}

/// Builds a [`FederationSchema`] from filtered SDL.
pub trait FederationSchemaBuilder: Send + Sync + 'static {
    /// `entities` names the object types resolvable through `_entities`; their
    /// `@key` directives are no longer part of `sdl`.
    fn build(
        &self,
        sdl: &str,
        entities: &[Name],
    ) -> Result<FederationSchema, FederationTranslationError>;
}

/// The default [`FederationSchemaBuilder`]: adds `_service`, and `_entities`
/// when there are entities, the way a federation subgraph library does.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubgraphSchemaBuilder;

impl FederationSchemaBuilder for SubgraphSchemaBuilder {
    fn build(
        &self,
        sdl: &str,
        entities: &[Name],
    ) -> Result<FederationSchema, FederationTranslationError> {
        let mut schema = Schema::builder()
            .adopt_orphan_extensions()
            .parse(sdl, "federation.graphql")
            .build()
            .map_err(|errors| FederationTranslationError::Build(errors.into()))?;
        add_federation_plumbing(&mut schema, true, entities)
            .map_err(|errors| FederationTranslationError::Build(errors.into()))?;
        let schema = schema
            .validate()
            .map_err(|errors| FederationTranslationError::Build(errors.into()))?;

        Ok(FederationSchema {
            schema,
            sdl: Arc::new(sdl.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;

    use super::*;
    use crate::federation::spec::ENTITIES_QUERY;
    use crate::federation::spec::SERVICE_SDL_QUERY;
    use crate::federation::spec::has_root_field;

    #[test]
    fn adds_federation_root_fields() {
        let sdl = "type Query { add(x: Int, y: Int): Int } type Product { upc: ID! }";
        let federation = SubgraphSchemaBuilder
            .build(sdl, &[name!("Product")])
            .unwrap();

        assert!(has_root_field(federation.schema(), SERVICE_SDL_QUERY));
        assert!(has_root_field(federation.schema(), ENTITIES_QUERY));
        assert_eq!(federation.sdl(), sdl);
    }

    #[test]
    fn broken_sdl_is_a_build_error() {
        let err = SubgraphSchemaBuilder
            .build("type Query { add: Missing }", &[])
            .unwrap_err();
        assert!(matches!(err, FederationTranslationError::Build(_)), "{err}");
    }
}
