//! Printing a schema with federation metadata stripped.

use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::schema::DirectiveList;
use apollo_compiler::schema::ExtendedType;

use super::spec::ANY_SCALAR_NAME;
use super::spec::ENTITIES_QUERY;
use super::spec::ENTITY_UNION_NAME;
use super::spec::EXTENDS_DIRECTIVE_NAME;
use super::spec::EXTERNAL_DIRECTIVE_NAME;
use super::spec::FIELDSET_SCALAR_NAME;
use super::spec::KEY_DIRECTIVE_NAME;
use super::spec::PROVIDES_DIRECTIVE_NAME;
use super::spec::REQUIRES_DIRECTIVE_NAME;
use super::spec::SERVICE_SDL_QUERY;
use super::spec::SERVICE_TYPE;

/// What [`print_filtered`] leaves out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrintFilter {
    /// Directive definitions and applications to drop.
    pub directives: Vec<String>,
    /// Named types to drop.
    pub types: Vec<String>,
    /// Fields of the query root type to drop.
    pub query_fields: Vec<String>,
}

impl Default for PrintFilter {
    fn default() -> Self {
        Self {
            directives: [
                EXTERNAL_DIRECTIVE_NAME,
                REQUIRES_DIRECTIVE_NAME,
                PROVIDES_DIRECTIVE_NAME,
                KEY_DIRECTIVE_NAME,
                EXTENDS_DIRECTIVE_NAME,
            ]
            .map(String::from)
            .to_vec(),
            types: [
                ANY_SCALAR_NAME,
                FIELDSET_SCALAR_NAME,
                SERVICE_TYPE,
                ENTITY_UNION_NAME,
            ]
            .map(String::from)
            .to_vec(),
            query_fields: [SERVICE_SDL_QUERY, ENTITIES_QUERY].map(String::from).to_vec(),
        }
    }
}

impl PrintFilter {
    fn drops_directive(&self, name: &str) -> bool {
        self.directives.iter().any(|directive| directive == name)
    }
}

/// Print `schema` as SDL without the definitions and applications named by `filter`.
///
/// The output is not validated: dropping a type that is still referenced yields
/// SDL that only parses.
pub fn print_filtered(schema: &Schema, filter: &PrintFilter) -> String {
    let mut schema = schema.clone();

    schema
        .directive_definitions
        .retain(|name, _| !filter.drops_directive(name));
    schema
        .types
        .retain(|name, _| !filter.types.iter().any(|ty| ty == name.as_str()));

    let query_root = schema
        .schema_definition
        .query
        .as_ref()
        .map(|root| root.name.clone());
    if let Some(ExtendedType::Object(query)) =
        query_root.and_then(|root| schema.types.get_mut(&root))
    {
        query
            .make_mut()
            .fields
            .retain(|name, _| !filter.query_fields.iter().any(|field| field == name.as_str()));
    }

    let definition_directives = &mut schema.schema_definition.make_mut().directives;
    retain_directives(definition_directives, filter);
    for ty in schema.types.values_mut() {
        strip_type(ty, filter);
    }

    schema.to_string()
}

fn retain_directives(directives: &mut DirectiveList, filter: &PrintFilter) {
    directives
        .0
        .retain(|directive| !filter.drops_directive(&directive.name));
}

fn retain_ast_directives(directives: &mut ast::DirectiveList, filter: &PrintFilter) {
    directives
        .0
        .retain(|directive| !filter.drops_directive(&directive.name));
}

fn strip_type(ty: &mut ExtendedType, filter: &PrintFilter) {
    match ty {
        ExtendedType::Scalar(scalar) => retain_directives(&mut scalar.make_mut().directives, filter),
        ExtendedType::Object(object) => {
            let object = object.make_mut();
            retain_directives(&mut object.directives, filter);
            for field in object.fields.values_mut() {
                retain_ast_directives(&mut field.make_mut().directives, filter);
            }
        }
        ExtendedType::Interface(interface) => {
            let interface = interface.make_mut();
            retain_directives(&mut interface.directives, filter);
            for field in interface.fields.values_mut() {
                retain_ast_directives(&mut field.make_mut().directives, filter);
            }
        }
        ExtendedType::Union(union_) => retain_directives(&mut union_.make_mut().directives, filter),
        ExtendedType::Enum(enum_) => {
            let enum_ = enum_.make_mut();
            retain_directives(&mut enum_.directives, filter);
            for value in enum_.values.values_mut() {
                retain_ast_directives(&mut value.make_mut().directives, filter);
            }
        }
        ExtendedType::InputObject(input) => {
            let input = input.make_mut();
            retain_directives(&mut input.directives, filter);
            for field in input.fields.values_mut() {
                retain_ast_directives(&mut field.make_mut().directives, filter);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::spec::expand_subgraph;

    #[test]
    fn strips_federation_metadata() {
        let schema = expand_subgraph(
            r#"
            type Query {
              add(x: Int, y: Int): Int
            }
            type Product @key(fields: "upc") @extends {
              upc: ID! @external
              name: String @requires(fields: "upc")
              weight: Int @deprecated(reason: "gone")
            }
            "#,
            "products.graphql",
        )
        .unwrap();

        let sdl = print_filtered(&schema, &PrintFilter::default());

        assert!(sdl.contains("add(x: Int, y: Int): Int"), "{sdl}");
        assert!(sdl.contains("type Product"), "{sdl}");
        assert!(sdl.contains("@deprecated(reason: \"gone\")"), "{sdl}");
        for stripped in ["@key", "@external", "@requires", "@extends", "_FieldSet"] {
            assert!(!sdl.contains(stripped), "{stripped} in {sdl}");
        }
    }

    #[test]
    fn strips_federation_root_fields() {
        let schema = Schema::parse_and_validate(
            r#"
            scalar _Any
            type _Service { sdl: String }
            union _Entity = Product
            type Product { upc: ID! }
            type Query {
              _service: _Service!
              _entities(representations: [_Any!]!): [_Entity]!
              product: Product
            }
            "#,
            "schema.graphql",
        )
        .unwrap();

        let sdl = print_filtered(&schema, &PrintFilter::default());
        let reparsed = Schema::parse_and_validate(&sdl, "filtered.graphql").unwrap();
        let query = reparsed.get_object("Query").unwrap();
        assert_eq!(query.fields.len(), 1);
        assert!(!reparsed.types.contains_key("_Entity"));
        assert!(!reparsed.types.contains_key("_Service"));
    }
}
