//! Names and definitions of the federation subgraph specification.

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast::FieldDefinition;
use apollo_compiler::ast::OperationType;
use apollo_compiler::collections::IndexSet;
use apollo_compiler::name;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::ObjectType;
use apollo_compiler::validation::Valid;
use apollo_compiler::validation::WithErrors;
use itertools::Itertools;

pub(crate) const KEY_DIRECTIVE_NAME: &str = "key";
pub(crate) const EXTERNAL_DIRECTIVE_NAME: &str = "external";
pub(crate) const REQUIRES_DIRECTIVE_NAME: &str = "requires";
pub(crate) const PROVIDES_DIRECTIVE_NAME: &str = "provides";
pub(crate) const EXTENDS_DIRECTIVE_NAME: &str = "extends";

pub(crate) const ANY_SCALAR_NAME: &str = "_Any";
pub(crate) const FIELDSET_SCALAR_NAME: &str = "_FieldSet";
pub(crate) const SERVICE_TYPE: &str = "_Service";
pub(crate) const ENTITY_UNION_NAME: &str = "_Entity";

pub(crate) const SERVICE_SDL_QUERY: &str = "_service";
pub(crate) const ENTITIES_QUERY: &str = "_entities";

/// Definitions a federation subgraph may use without declaring them.
const FEDERATION_DEFINITIONS: &str = r#"
scalar _FieldSet
scalar link__Import

enum link__Purpose {
  SECURITY
  EXECUTION
}

directive @key(fields: _FieldSet!, resolvable: Boolean = true) repeatable on OBJECT | INTERFACE
directive @external(reason: String) on OBJECT | FIELD_DEFINITION
directive @requires(fields: _FieldSet!) on FIELD_DEFINITION
directive @provides(fields: _FieldSet!) on FIELD_DEFINITION
directive @extends on OBJECT | INTERFACE
directive @shareable repeatable on OBJECT | FIELD_DEFINITION
directive @inaccessible on FIELD_DEFINITION | OBJECT | INTERFACE | UNION | ARGUMENT_DEFINITION | SCALAR | ENUM | ENUM_VALUE | INPUT_OBJECT | INPUT_FIELD_DEFINITION
directive @override(from: String!) on FIELD_DEFINITION
directive @tag(name: String!) repeatable on FIELD_DEFINITION | OBJECT | INTERFACE | UNION | ARGUMENT_DEFINITION | SCALAR | ENUM | ENUM_VALUE | INPUT_OBJECT | INPUT_FIELD_DEFINITION
directive @interfaceObject on OBJECT
directive @composeDirective(name: String!) repeatable on SCHEMA
directive @link(url: String, as: String, for: link__Purpose, import: [link__Import]) repeatable on SCHEMA
"#;

/// Parse the SDL a federation subgraph reports through `_service { sdl }`.
///
/// Orphan extensions are adopted, federation definitions the SDL relies on
/// without declaring are added, and the subgraph's own `_service`/`_entities`
/// plumbing is removed since the stitched schema provides its own.
pub(crate) fn expand_subgraph(
    sdl: &str,
    path: &str,
) -> Result<Valid<Schema>, WithErrors<Schema>> {
    let mut schema = Schema::builder()
        .adopt_orphan_extensions()
        .parse(sdl, path)
        .build()?;
    let definitions = Schema::builder()
        .parse(FEDERATION_DEFINITIONS, "federation.graphql")
        .build()?;

    let used = used_directives(&schema);
    for (name, directive) in &definitions.directive_definitions {
        if used.contains(name) {
            schema
                .directive_definitions
                .entry(name.clone())
                .or_insert_with(|| directive.clone());
        }
    }
    let argument_types: Vec<Name> = schema
        .directive_definitions
        .values()
        .flat_map(|directive| directive.arguments.iter())
        .map(|argument| argument.ty.inner_named_type().clone())
        .collect();
    for type_name in argument_types {
        if let Some(ty) = definitions.types.get(&type_name)
            && !ty.is_built_in()
        {
            schema.types.entry(type_name).or_insert_with(|| ty.clone());
        }
    }

    let query_root = schema
        .schema_definition
        .query
        .as_ref()
        .map(|root| root.name.clone());
    if let Some(ExtendedType::Object(query)) =
        query_root.and_then(|root| schema.types.get_mut(&root))
    {
        let query = query.make_mut();
        query.fields.shift_remove(SERVICE_SDL_QUERY);
        query.fields.shift_remove(ENTITIES_QUERY);
    }
    for plumbing in [SERVICE_TYPE, ENTITY_UNION_NAME, ANY_SCALAR_NAME] {
        schema.types.shift_remove(plumbing);
    }

    schema.validate()
}

/// Names of the directives applied anywhere in `schema`.
fn used_directives(schema: &Schema) -> IndexSet<Name> {
    let mut used = IndexSet::default();
    used.extend(
        schema
            .schema_definition
            .directives
            .iter()
            .map(|directive| directive.name.clone()),
    );
    for ty in schema.types.values() {
        used.extend(ty.directives().iter().map(|directive| directive.name.clone()));
        match ty {
            ExtendedType::Object(object) => record_fields(&mut used, object.fields.values()),
            ExtendedType::Interface(interface) => {
                record_fields(&mut used, interface.fields.values())
            }
            ExtendedType::Enum(enum_type) => {
                for value in enum_type.values.values() {
                    used.extend(value.directives.iter().map(|directive| directive.name.clone()));
                }
            }
            ExtendedType::InputObject(input) => {
                for field in input.fields.values() {
                    used.extend(field.directives.iter().map(|directive| directive.name.clone()));
                }
            }
            ExtendedType::Scalar(_) | ExtendedType::Union(_) => {}
        }
    }
    used
}

fn record_fields<'a>(
    used: &mut IndexSet<Name>,
    fields: impl Iterator<Item = &'a Component<FieldDefinition>>,
) {
    for field in fields {
        used.extend(field.directives.iter().map(|directive| directive.name.clone()));
        for argument in &field.arguments {
            used.extend(argument.directives.iter().map(|directive| directive.name.clone()));
        }
    }
}

/// Add `_Service` and the `_service` root field, plus `_Any`, `_Entity` and the
/// `_entities` root field when `entities` is not empty. Definitions the schema
/// already has are kept.
pub(crate) fn add_federation_plumbing(
    schema: &mut Schema,
    service: bool,
    entities: &[Name],
) -> Result<(), WithErrors<Schema>> {
    if !service && entities.is_empty() {
        return Ok(());
    }

    let mut definitions = Vec::new();
    let mut fields = Vec::new();
    if service {
        definitions.push(format!("type {SERVICE_TYPE} {{ sdl: String }}"));
        fields.push(format!("{SERVICE_SDL_QUERY}: {SERVICE_TYPE}!"));
    }
    if !entities.is_empty() {
        definitions.push(format!("scalar {ANY_SCALAR_NAME}"));
        definitions.push(format!(
            "union {ENTITY_UNION_NAME} = {}",
            entities.iter().join(" | ")
        ));
        fields.push(format!(
            "{ENTITIES_QUERY}(representations: [{ANY_SCALAR_NAME}!]!): [{ENTITY_UNION_NAME}]!"
        ));
    }
    definitions.push(format!("type Query {{ {} }}", fields.join(" ")));
    let plumbing = Schema::builder()
        .parse(definitions.join("\n"), "federation_plumbing.graphql")
        .build()?;

    for (name, ty) in &plumbing.types {
        if !ty.is_built_in() && name != "Query" {
            schema
                .types
                .entry(name.clone())
                .or_insert_with(|| ty.clone());
        }
    }

    let query_root = schema
        .schema_definition
        .make_mut()
        .query
        .get_or_insert_with(|| name!("Query").into())
        .name
        .clone();
    let plumbing_fields = plumbing
        .get_object("Query")
        .map(|query| query.fields.clone())
        .unwrap_or_default();
    if let ExtendedType::Object(query) = schema
        .types
        .entry(query_root.clone())
        .or_insert_with(|| {
            ExtendedType::Object(Node::new(ObjectType {
                description: None,
                name: query_root,
                directives: Default::default(),
                fields: Default::default(),
                implements_interfaces: Default::default(),
            }))
        })
    {
        let query = query.make_mut();
        for (name, field) in plumbing_fields {
            query.fields.entry(name).or_insert(field);
        }
    }
    Ok(())
}

/// Names of the object types of `schema` listed in `candidates`.
pub(crate) fn object_types<'a>(
    schema: &Schema,
    candidates: impl Iterator<Item = &'a Name>,
) -> Vec<Name> {
    candidates
        .filter(|name| schema.get_object(name).is_some())
        .cloned()
        .collect()
}

pub(crate) fn has_root_field(schema: &Schema, field: &str) -> bool {
    schema
        .root_operation(OperationType::Query)
        .and_then(|root| schema.get_object(root))
        .is_some_and(|query| query.fields.contains_key(field))
}
