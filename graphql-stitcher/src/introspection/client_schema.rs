//! Conversion of a standard introspection result into a schema document.
//!
//! Every name the remote reports is checked before it becomes part of the
//! document, so malformed data is rejected instead of reinterpreted.

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::ast::Definition;
use apollo_compiler::ast::DirectiveLocation;
use serde::Deserialize;

use crate::json_ext::Value;

const BUILT_IN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];
const BUILT_IN_DIRECTIVES: [&str; 5] = ["skip", "include", "deprecated", "specifiedBy", "oneOf"];

const DIRECTIVE_LOCATIONS: [DirectiveLocation; 19] = [
    DirectiveLocation::Query,
    DirectiveLocation::Mutation,
    DirectiveLocation::Subscription,
    DirectiveLocation::Field,
    DirectiveLocation::FragmentDefinition,
    DirectiveLocation::FragmentSpread,
    DirectiveLocation::InlineFragment,
    DirectiveLocation::VariableDefinition,
    DirectiveLocation::Schema,
    DirectiveLocation::Scalar,
    DirectiveLocation::Object,
    DirectiveLocation::FieldDefinition,
    DirectiveLocation::ArgumentDefinition,
    DirectiveLocation::Interface,
    DirectiveLocation::Union,
    DirectiveLocation::Enum,
    DirectiveLocation::EnumValue,
    DirectiveLocation::InputObject,
    DirectiveLocation::InputFieldDefinition,
];

/// Turn the `data` of an introspection response into a schema document.
pub(super) fn document_from_introspection(data: Value) -> Result<ast::Document, String> {
    let data: IntrospectionData =
        serde_json_bytes::from_value(data).map_err(|err| err.to_string())?;
    data.schema.to_document()
}

#[derive(Deserialize)]
struct IntrospectionData {
    #[serde(rename = "__schema")]
    schema: IntrospectionSchema,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionSchema {
    query_type: Option<NamedRef>,
    mutation_type: Option<NamedRef>,
    subscription_type: Option<NamedRef>,
    types: Vec<FullType>,
    #[serde(default)]
    directives: Vec<DirectiveDef>,
}

#[derive(Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    List,
    NonNull,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullType {
    kind: TypeKind,
    name: String,
    description: Option<String>,
    fields: Option<Vec<Field>>,
    input_fields: Option<Vec<InputValue>>,
    interfaces: Option<Vec<TypeRef>>,
    enum_values: Option<Vec<EnumValue>>,
    possible_types: Option<Vec<TypeRef>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeRef {
    kind: TypeKind,
    name: Option<String>,
    of_type: Option<Box<TypeRef>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Field {
    name: String,
    description: Option<String>,
    #[serde(default)]
    args: Vec<InputValue>,
    #[serde(rename = "type")]
    ty: TypeRef,
    #[serde(default)]
    is_deprecated: bool,
    deprecation_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputValue {
    name: String,
    description: Option<String>,
    #[serde(rename = "type")]
    ty: TypeRef,
    default_value: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnumValue {
    name: String,
    description: Option<String>,
    #[serde(default)]
    is_deprecated: bool,
    deprecation_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectiveDef {
    name: String,
    description: Option<String>,
    locations: Vec<String>,
    #[serde(default)]
    args: Vec<InputValue>,
    #[serde(default)]
    is_repeatable: bool,
}

fn name(value: &str) -> Result<Name, String> {
    Name::new(value).map_err(|_| format!("`{value}` is not a valid GraphQL name"))
}

fn description(description: &Option<String>) -> Option<Node<str>> {
    description.as_deref().map(Node::new_str)
}

fn deprecated(is_deprecated: bool, reason: &Option<String>) -> ast::DirectiveList {
    if !is_deprecated {
        return ast::DirectiveList::default();
    }
    let arguments = reason
        .as_deref()
        .map(|reason| {
            Node::new(ast::Argument {
                name: apollo_compiler::name!("reason"),
                value: Node::new(ast::Value::from(reason)),
            })
        })
        .into_iter()
        .collect();
    ast::DirectiveList(vec![Node::new(ast::Directive {
        name: apollo_compiler::name!("deprecated"),
        arguments,
    })])
}

/// Parse a default value as printed by the remote, accepting nothing but one value.
fn default_value(text: &str) -> Result<Node<ast::Value>, String> {
    let malformed = || format!("`{text}` is not a GraphQL value");
    let document =
        ast::Document::parse(format!("{{ f(v: {text}) }}"), "default_value.graphql")
            .map_err(|_| malformed())?;
    let [Definition::OperationDefinition(operation)] = document.definitions.as_slice() else {
        return Err(malformed());
    };
    let [ast::Selection::Field(field)] = operation.selection_set.as_slice() else {
        return Err(malformed());
    };
    match field.arguments.as_slice() {
        [argument] if field.directives.is_empty() && field.selection_set.is_empty() => {
            Ok(argument.value.clone())
        }
        _ => Err(malformed()),
    }
}

fn directive_location(location: &str) -> Result<DirectiveLocation, String> {
    DIRECTIVE_LOCATIONS
        .into_iter()
        .find(|candidate| candidate.name() == location)
        .ok_or_else(|| format!("`{location}` is not a directive location"))
}

impl TypeRef {
    fn to_type(&self) -> Result<ast::Type, String> {
        match (self.kind, &self.of_type) {
            (TypeKind::NonNull, Some(inner)) => match inner.to_type()? {
                ast::Type::Named(named) => Ok(ast::Type::NonNullNamed(named)),
                ast::Type::List(item) => Ok(ast::Type::NonNullList(item)),
                _ => Err("a non-null type reference wraps another non-null type".to_string()),
            },
            (TypeKind::List, Some(inner)) => Ok(ast::Type::List(Box::new(inner.to_type()?))),
            (TypeKind::List | TypeKind::NonNull, None) => {
                Err("a wrapping type reference has no `ofType`".to_string())
            }
            _ => Ok(ast::Type::Named(self.to_name()?)),
        }
    }

    fn to_name(&self) -> Result<Name, String> {
        match &self.name {
            Some(named) => name(named),
            None => Err("a named type reference has no name".to_string()),
        }
    }
}

impl InputValue {
    fn to_definition(&self) -> Result<Node<ast::InputValueDefinition>, String> {
        Ok(Node::new(ast::InputValueDefinition {
            description: description(&self.description),
            name: name(&self.name)?,
            ty: Node::new(self.ty.to_type()?),
            default_value: self.default_value.as_deref().map(default_value).transpose()?,
            directives: Default::default(),
        }))
    }
}

impl Field {
    fn to_definition(&self) -> Result<Node<ast::FieldDefinition>, String> {
        Ok(Node::new(ast::FieldDefinition {
            description: description(&self.description),
            name: name(&self.name)?,
            arguments: input_values(&self.args)?,
            ty: self.ty.to_type()?,
            directives: deprecated(self.is_deprecated, &self.deprecation_reason),
        }))
    }
}

fn input_values(values: &[InputValue]) -> Result<Vec<Node<ast::InputValueDefinition>>, String> {
    values.iter().map(InputValue::to_definition).collect()
}

fn named_types(references: &Option<Vec<TypeRef>>) -> Result<Vec<Name>, String> {
    references.iter().flatten().map(TypeRef::to_name).collect()
}

impl FullType {
    fn is_built_in(&self) -> bool {
        self.name.starts_with("__")
            || (self.kind == TypeKind::Scalar && BUILT_IN_SCALARS.contains(&self.name.as_str()))
    }

    fn to_definition(&self) -> Result<Definition, String> {
        let type_name = name(&self.name)?;
        let description = description(&self.description);
        let fields = || -> Result<Vec<_>, String> {
            self.fields.iter().flatten().map(Field::to_definition).collect()
        };
        Ok(match self.kind {
            TypeKind::Scalar => Definition::ScalarTypeDefinition(Node::new(ast::ScalarTypeDefinition {
                description,
                name: type_name,
                directives: Default::default(),
            })),
            TypeKind::Object => Definition::ObjectTypeDefinition(Node::new(ast::ObjectTypeDefinition {
                description,
                name: type_name,
                implements_interfaces: named_types(&self.interfaces)?,
                directives: Default::default(),
                fields: fields()?,
            })),
            TypeKind::Interface => {
                Definition::InterfaceTypeDefinition(Node::new(ast::InterfaceTypeDefinition {
                    description,
                    name: type_name,
                    implements_interfaces: named_types(&self.interfaces)?,
                    directives: Default::default(),
                    fields: fields()?,
                }))
            }
            TypeKind::Union => Definition::UnionTypeDefinition(Node::new(ast::UnionTypeDefinition {
                description,
                name: type_name,
                directives: Default::default(),
                members: named_types(&self.possible_types)?,
            })),
            TypeKind::Enum => Definition::EnumTypeDefinition(Node::new(ast::EnumTypeDefinition {
                description,
                name: type_name,
                directives: Default::default(),
                values: self
                    .enum_values
                    .iter()
                    .flatten()
                    .map(|value| {
                        Ok(Node::new(ast::EnumValueDefinition {
                            description: value.description.as_deref().map(Node::new_str),
                            value: name(&value.name)?,
                            directives: deprecated(value.is_deprecated, &value.deprecation_reason),
                        }))
                    })
                    .collect::<Result<_, String>>()?,
            })),
            TypeKind::InputObject => {
                Definition::InputObjectTypeDefinition(Node::new(ast::InputObjectTypeDefinition {
                    description,
                    name: type_name,
                    directives: Default::default(),
                    fields: input_values(self.input_fields.as_deref().unwrap_or_default())?,
                }))
            }
            TypeKind::List | TypeKind::NonNull => {
                return Err(format!("`{}` is declared as a wrapping type", self.name));
            }
        })
    }
}

impl DirectiveDef {
    fn to_definition(&self) -> Result<Definition, String> {
        Ok(Definition::DirectiveDefinition(Node::new(ast::DirectiveDefinition {
            description: description(&self.description),
            name: name(&self.name)?,
            arguments: input_values(&self.args)?,
            repeatable: self.is_repeatable,
            locations: self
                .locations
                .iter()
                .map(|location| directive_location(location))
                .collect::<Result<_, _>>()?,
        })))
    }
}

impl IntrospectionSchema {
    fn to_document(&self) -> Result<ast::Document, String> {
        let Some(query) = &self.query_type else {
            return Err("the schema has no query type".to_string());
        };
        let mut root_operations = vec![Node::new((ast::OperationType::Query, name(&query.name)?))];
        for (operation, root) in [
            (ast::OperationType::Mutation, &self.mutation_type),
            (ast::OperationType::Subscription, &self.subscription_type),
        ] {
            if let Some(root) = root {
                root_operations.push(Node::new((operation, name(&root.name)?)));
            }
        }

        let mut document = ast::Document::new();
        document
            .definitions
            .push(Definition::SchemaDefinition(Node::new(ast::SchemaDefinition {
                description: None,
                directives: Default::default(),
                root_operations,
            })));
        for directive in &self.directives {
            if !BUILT_IN_DIRECTIVES.contains(&directive.name.as_str()) {
                document.definitions.push(directive.to_definition()?);
            }
        }
        for ty in self.types.iter().filter(|ty| !ty.is_built_in()) {
            document.definitions.push(ty.to_definition()?);
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    fn named(kind: &str, name: &str) -> Value {
        json!({ "kind": kind, "name": name, "ofType": null })
    }

    #[test]
    fn converts_every_kind_of_type() {
        let int = named("SCALAR", "Int");
        let non_null_string = json!({ "kind": "NON_NULL", "name": null, "ofType": named("SCALAR", "String") });
        let data = json!({
            "__schema": {
                "queryType": { "name": "Root" },
                "mutationType": null,
                "subscriptionType": null,
                "directives": [
                    { "name": "include", "description": null, "locations": ["FIELD"], "args": [] },
                    { "name": "cached", "description": "Cache hint", "locations": ["FIELD_DEFINITION", "OBJECT"], "args": [
                        { "name": "ttl", "description": null, "type": int, "defaultValue": "60" }
                    ], "isRepeatable": false }
                ],
                "types": [
                    { "kind": "OBJECT", "name": "Root", "description": "The \"root\"", "fields": [
                        { "name": "node", "description": null, "args": [
                            { "name": "id", "description": null, "type": non_null_string, "defaultValue": null }
                        ], "type": named("INTERFACE", "Node"), "isDeprecated": false, "deprecationReason": null },
                        { "name": "colors", "description": null, "args": [
                            { "name": "filter", "description": null, "type": named("INPUT_OBJECT", "Filter"), "defaultValue": null }
                        ], "type": { "kind": "LIST", "name": null, "ofType": named("ENUM", "Color") }, "isDeprecated": true, "deprecationReason": "use palette" },
                        { "name": "search", "description": null, "args": [], "type": named("UNION", "Result"), "isDeprecated": false, "deprecationReason": null }
                    ], "inputFields": null, "interfaces": [], "enumValues": null, "possibleTypes": null },
                    { "kind": "INTERFACE", "name": "Node", "description": null, "fields": [
                        { "name": "id", "description": null, "args": [], "type": non_null_string, "isDeprecated": false, "deprecationReason": null }
                    ], "inputFields": null, "interfaces": [], "enumValues": null, "possibleTypes": [named("OBJECT", "Book")] },
                    { "kind": "OBJECT", "name": "Book", "description": null, "fields": [
                        { "name": "id", "description": null, "args": [], "type": non_null_string, "isDeprecated": false, "deprecationReason": null }
                    ], "inputFields": null, "interfaces": [named("INTERFACE", "Node")], "enumValues": null, "possibleTypes": null },
                    { "kind": "UNION", "name": "Result", "description": null, "fields": null, "inputFields": null, "interfaces": null, "enumValues": null, "possibleTypes": [named("OBJECT", "Book")] },
                    { "kind": "ENUM", "name": "Color", "description": null, "fields": null, "inputFields": null, "interfaces": null, "enumValues": [
                        { "name": "RED", "description": null, "isDeprecated": false, "deprecationReason": null },
                        { "name": "BLUE", "description": "Blue", "isDeprecated": true, "deprecationReason": null }
                    ], "possibleTypes": null },
                    { "kind": "INPUT_OBJECT", "name": "Filter", "description": null, "fields": null, "inputFields": [
                        { "name": "color", "description": null, "type": named("ENUM", "Color"), "defaultValue": "RED" }
                    ], "interfaces": null, "enumValues": null, "possibleTypes": null },
                    { "kind": "SCALAR", "name": "Date", "description": null, "fields": null, "inputFields": null, "interfaces": null, "enumValues": null, "possibleTypes": null },
                    { "kind": "SCALAR", "name": "String", "description": null, "fields": null, "inputFields": null, "interfaces": null, "enumValues": null, "possibleTypes": null },
                    { "kind": "OBJECT", "name": "__Schema", "description": null, "fields": [], "inputFields": null, "interfaces": [], "enumValues": null, "possibleTypes": null }
                ]
            }
        });

        let document = document_from_introspection(data).unwrap();
        assert!(!document.definitions.iter().any(|definition| {
            definition
                .name()
                .is_some_and(|name| name == "__Schema" || name == "String")
        }));
        let schema = document.to_schema_validate().unwrap();

        assert_eq!(schema.schema_definition.query.as_ref().unwrap().name, "Root");
        assert!(schema.directive_definitions.contains_key("cached"));
        assert_eq!(
            schema.directive_definitions["cached"].arguments[0]
                .default_value
                .as_deref(),
            Some(&ast::Value::Int(60.into()))
        );
        assert!(schema.get_interface("Node").is_some());
        assert!(
            schema
                .get_object("Book")
                .unwrap()
                .implements_interfaces
                .iter()
                .any(|interface| interface.name == "Node")
        );
        assert!(schema.types.contains_key("Date"));
        let root = schema.get_object("Root").unwrap();
        assert_eq!(root.description.as_deref(), Some("The \"root\""));
        assert!(root.fields["colors"].directives.get("deprecated").is_some());
        assert_eq!(
            schema.get_input_object("Filter").unwrap().fields["color"]
                .default_value
                .as_deref(),
            Some(&ast::Value::Enum(apollo_compiler::name!("RED")))
        );
    }

    #[test]
    fn rejects_default_values_carrying_more_than_a_value() {
        assert!(default_value("1").is_ok());
        assert!(default_value("{ a: [1, 2] }").is_ok());
        assert!(default_value("1) other(v: 2").is_err());
        assert!(default_value("1) } type Injected { a: Int").is_err());
        assert!(default_value("1) @skip(if: true").is_err());
    }

    #[test]
    fn rejects_broken_type_references() {
        let data = json!({
            "__schema": {
                "queryType": { "name": "Query" },
                "types": [{
                    "kind": "OBJECT", "name": "Query",
                    "fields": [{ "name": "f", "args": [], "type": { "kind": "NON_NULL", "name": null, "ofType": null } }]
                }]
            }
        });
        assert!(document_from_introspection(data).is_err());
    }

    #[test]
    fn requires_a_query_type() {
        let data = json!({ "__schema": { "queryType": null, "types": [] } });
        assert_eq!(
            document_from_introspection(data).unwrap_err(),
            "the schema has no query type"
        );
    }
}
