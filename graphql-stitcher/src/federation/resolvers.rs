//! Resolvers for the `_service` and `_entities` federation root fields.

use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::name;
use futures::future::join_all;
use serde_json_bytes::ByteString;
use serde_json_bytes::json;

use super::spec::ENTITIES_QUERY;
use super::spec::SERVICE_TYPE;
use crate::delegation::OperationContext;
use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::value_from_ast;
use crate::schema::EntityIndex;
use crate::schema::EntityOwner;
use crate::subschema::SubschemaId;

/// Resolvers bound to the served schema when federation metadata is enabled.
#[derive(Clone, Debug, Default)]
pub struct FederationResolvers {
    pub(crate) service: Option<ServiceResolver>,
    pub(crate) entities: Option<EntitiesResolver>,
}

impl FederationResolvers {
    pub fn service(&self) -> Option<&ServiceResolver> {
        self.service.as_ref()
    }

    pub fn entities(&self) -> Option<&EntitiesResolver> {
        self.entities.as_ref()
    }
}

/// Answers `_service { sdl }`.
#[derive(Clone, Debug)]
pub struct ServiceResolver {
    sdl: Arc<String>,
}

impl ServiceResolver {
    pub(crate) fn new(sdl: Arc<String>) -> Self {
        Self { sdl }
    }

    pub fn sdl(&self) -> &str {
        &self.sdl
    }

    pub(crate) fn resolve(&self, selection_set: &SelectionSet, document: &ExecutableDocument) -> Value {
        let mut object = Object::new();
        self.resolve_into(&mut object, selection_set, document);
        Value::Object(object)
    }

    fn resolve_into(&self, object: &mut Object, selection_set: &SelectionSet, document: &ExecutableDocument) {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    let value = match field.name.as_str() {
                        "sdl" => Value::String(ByteString::from(self.sdl.as_str())),
                        "__typename" => Value::String(ByteString::from(SERVICE_TYPE)),
                        _ => Value::Null,
                    };
                    object.insert(field.response_key().as_str(), value);
                }
                Selection::InlineFragment(inline) => {
                    self.resolve_into(object, &inline.selection_set, document)
                }
                Selection::FragmentSpread(spread) => {
                    if let Some(fragment) = document.fragments.get(&spread.fragment_name) {
                        self.resolve_into(object, &fragment.selection_set, document)
                    }
                }
            }
        }
    }
}

/// Answers `_entities(representations:)` by asking each entity's owning
/// subschema for the representations of its types.
#[derive(Clone, Debug)]
pub struct EntitiesResolver {
    entities: EntityIndex,
}

impl EntitiesResolver {
    pub(crate) fn new(entities: EntityIndex) -> Self {
        Self { entities }
    }

    pub fn entities(&self) -> &EntityIndex {
        &self.entities
    }

    /// Resolve the `_entities` field of a client operation.
    ///
    /// Results keep the order of the representations; representations of
    /// unknown types resolve to `null` with an error.
    pub(crate) async fn resolve(
        &self,
        field: &Node<Field>,
        context: &OperationContext<'_>,
    ) -> (Value, Vec<Error>) {
        let response_key = field.response_key().as_str();
        let representations = field
            .arguments
            .iter()
            .find(|argument| argument.name == "representations")
            .map(|argument| value_from_ast(&argument.value, context.variables));
        let Some(Value::Array(representations)) = representations else {
            return (
                Value::Null,
                vec![
                    Error::builder()
                        .message("`representations` must be a list")
                        .path(json!([response_key]))
                        .extension_code("INVALID_REPRESENTATIONS")
                        .build(),
                ],
            );
        };

        let mut results = vec![Value::Null; representations.len()];
        let mut errors = Vec::new();
        let mut groups: IndexMap<SubschemaId, (&EntityOwner, Vec<usize>)> = IndexMap::default();
        for (index, representation) in representations.iter().enumerate() {
            let typename = representation
                .as_object()
                .and_then(|representation| representation.get("__typename"))
                .and_then(Value::as_str);
            match typename.and_then(|typename| self.entities.get(typename)) {
                Some(owner) => groups
                    .entry(owner.subschema)
                    .or_insert_with(|| (owner, Vec::new()))
                    .1
                    .push(index),
                None => errors.push(
                    Error::builder()
                        .message(format!(
                            "no subschema resolves entities of type `{}`",
                            typename.unwrap_or("<missing __typename>")
                        ))
                        .path(json!([response_key, index]))
                        .extension_code("ENTITY_NOT_RESOLVABLE")
                        .build(),
                ),
            }
        }

        let mut selection = field.clone();
        {
            let selection = selection.make_mut();
            selection.alias = None;
            selection.arguments = vec![Node::new(ast::Argument {
                name: name!("representations"),
                value: Node::new(ast::Value::Variable(name!("representations"))),
            })];
        }
        let variable = Node::new(ast::VariableDefinition {
            name: name!("representations"),
            ty: Node::new(ast::Type::NonNullList(Box::new(ast::Type::NonNullNamed(
                name!("_Any"),
            )))),
            default_value: None,
            directives: ast::DirectiveList(vec![]),
        });

        let fetches = groups.into_iter().map(|(_, (owner, indexes))| {
            let batch: Vec<Value> = indexes
                .iter()
                .map(|index| representations[*index].clone())
                .collect();
            let request = context.subrequest(
                vec![Selection::Field(selection.clone())],
                vec![(variable.clone(), Value::Array(batch))],
            );
            async move {
                tracing::debug!(
                    subschema = %owner.subschema_name,
                    count = indexes.len(),
                    "resolving entities"
                );
                (owner, indexes, owner.executor.execute(request).await)
            }
        });

        for (owner, indexes, response) in join_all(fetches).await {
            match response {
                Ok(mut response) => {
                    let entities = response
                        .data
                        .as_mut()
                        .and_then(|data| data.as_object_mut())
                        .and_then(|data| data.remove(ENTITIES_QUERY));
                    if let Some(Value::Array(entities)) = entities {
                        for (index, entity) in indexes.iter().zip(entities) {
                            results[*index] = entity;
                        }
                    }
                    errors.extend(
                        response
                            .errors
                            .into_iter()
                            .map(|error| rebase_error(error, response_key, &indexes)),
                    );
                }
                Err(err) => errors.extend(indexes.iter().map(|index| {
                    Error::builder()
                        .message(format!(
                            "could not resolve entity from {}: {err}",
                            owner.subschema_name
                        ))
                        .path(json!([response_key, index]))
                        .extension_code("SUBREQUEST_FAILED")
                        .build()
                })),
            }
        }

        (Value::Array(results), errors)
    }
}

/// Point an error path from an owner's `_entities` list into the client's list.
fn rebase_error(mut error: Error, response_key: &str, indexes: &[usize]) -> Error {
    if let Some(Value::Array(path)) = error.path.as_mut() {
        let position = path.get(1).and_then(Value::as_u64);
        if let Some(first) = path.first_mut() {
            *first = Value::String(ByteString::from(response_key));
        }
        if let Some(original) = position.and_then(|position| indexes.get(position as usize)) {
            path[1] = json!(original);
        }
    }
    error
}
