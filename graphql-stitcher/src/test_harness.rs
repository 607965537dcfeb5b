//! An in-memory GraphQL service for tests.
//!
//! [`MockService`] serves an SDL through the [`Executor`] trait. Requests run
//! through apollo-compiler's executor, so introspection and selections are
//! answered by the schema itself; root fields and entities resolve with closures.
//! The SDL can be swapped and the service can be made to fail.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::executable::Selection;
use apollo_compiler::resolvers::Execution;
use apollo_compiler::resolvers::FieldError;
use apollo_compiler::resolvers::ObjectValue;
use apollo_compiler::resolvers::ResolveInfo;
use apollo_compiler::resolvers::ResolvedValue;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use apollo_compiler::validation::WithErrors;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json_bytes::ByteString;
use tower::BoxError;

use crate::executor::Executor;
use crate::federation::spec::ENTITIES_QUERY;
use crate::federation::spec::KEY_DIRECTIVE_NAME;
use crate::federation::spec::SERVICE_SDL_QUERY;
use crate::federation::spec::SERVICE_TYPE;
use crate::federation::spec::add_federation_plumbing;
use crate::federation::spec::expand_subgraph;
use crate::graphql::Error;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Value;

type Resolver = Arc<dyn Fn(&Object) -> Value + Send + Sync>;

/// A GraphQL service backed by an SDL and closures.
#[derive(Clone)]
pub struct MockService {
    state: Arc<RwLock<MockState>>,
    introspections: Arc<AtomicUsize>,
}

struct MockState {
    sdl: String,
    // what introspection reports
    public: Valid<Schema>,
    // the public schema plus federation plumbing
    schema: Valid<Schema>,
    resolvers: HashMap<String, Resolver>,
    entity_resolvers: HashMap<String, Resolver>,
    failing: bool,
}

impl MockState {
    fn new(sdl: &str) -> Result<Self, WithErrors<Schema>> {
        let public = expand_subgraph(sdl, "mock.graphql")?;
        let mut schema = public.clone().into_inner();
        let entities: Vec<Name> = schema
            .types
            .iter()
            .filter(|(_, ty)| {
                matches!(ty, ExtendedType::Object(_))
                    && ty.directives().get(KEY_DIRECTIVE_NAME).is_some()
            })
            .map(|(name, _)| name.clone())
            .collect();
        add_federation_plumbing(&mut schema, true, &entities)?;

        Ok(Self {
            sdl: sdl.to_string(),
            public,
            schema: schema.validate()?,
            resolvers: HashMap::new(),
            entity_resolvers: HashMap::new(),
            failing: false,
        })
    }
}

impl MockService {
    /// Serve `sdl`. Federation directives may be used without being declared.
    pub fn new(sdl: &str) -> Result<Self, WithErrors<Schema>> {
        Ok(Self {
            state: Arc::new(RwLock::new(MockState::new(sdl)?)),
            introspections: Default::default(),
        })
    }

    /// Resolve the root field `field` with `resolver`, which receives the field arguments.
    pub fn with_resolver(
        self,
        field: &str,
        resolver: impl Fn(&Object) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.state
            .write()
            .resolvers
            .insert(field.to_string(), Arc::new(resolver));
        self
    }

    /// Resolve entities of type `typename` with `resolver`, which receives the representation.
    pub fn with_entity_resolver(
        self,
        typename: &str,
        resolver: impl Fn(&Object) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.state
            .write()
            .entity_resolvers
            .insert(typename.to_string(), Arc::new(resolver));
        self
    }

    /// Serve a new SDL, keeping the resolvers.
    pub fn replace(&self, sdl: &str) -> Result<(), WithErrors<Schema>> {
        let replacement = MockState::new(sdl)?;
        let mut state = self.state.write();
        state.sdl = replacement.sdl;
        state.public = replacement.public;
        state.schema = replacement.schema;
        Ok(())
    }

    /// Make every request fail as if the service were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.state.write().failing = failing;
    }

    /// How many times the standard introspection query was answered.
    pub fn introspection_count(&self) -> usize {
        self.introspections.load(Ordering::SeqCst)
    }

    fn respond(&self, request: Request) -> Result<Response, BoxError> {
        let state = self.state.read();
        if state.failing {
            return Err("mock service is unavailable".into());
        }
        let query = request.query.as_deref().ok_or("request has no query")?;
        // plumbing stays out of introspection, so only requests using it see it
        let (schema, document) =
            match ExecutableDocument::parse_and_validate(&state.public, query, "request.graphql") {
                Ok(document) => (&state.public, document),
                Err(_) => match ExecutableDocument::parse_and_validate(
                    &state.schema,
                    query,
                    "request.graphql",
                ) {
                    Ok(document) => (&state.schema, document),
                    Err(WithErrors { errors, .. }) => {
                        return Ok(Response::builder()
                            .errors(
                                errors
                                    .iter()
                                    .map(|diagnostic| {
                                        Error::builder()
                                            .message(diagnostic.unstable_to_json_compat().message)
                                            .extension_code("GRAPHQL_VALIDATION_FAILED")
                                            .build()
                                    })
                                    .collect(),
                            )
                            .build());
                    }
                },
            };
        let operation = document
            .operations
            .get(request.operation_name.as_deref())
            .map_err(|_| "no operation to execute")?;
        if operation.selection_set.selections.iter().any(
            |selection| matches!(selection, Selection::Field(field) if field.name == "__schema"),
        ) {
            self.introspections.fetch_add(1, Ordering::SeqCst);
        }

        let root = RootResolver {
            type_name: operation.object_type().as_str(),
            state: &state,
        };
        let result = Execution::new(schema, &document)
            .operation(operation)
            .raw_variable_values(&request.variables)
            .enable_schema_introspection(true)
            .execute_sync(&root);
        Ok(match result {
            Ok(response) => Response::builder()
                .and_data(response.data.map(Value::Object))
                .errors(response.errors.into_iter().map(Into::into).collect())
                .build(),
            Err(request_error) => {
                Response::from_error(request_error.to_graphql_error(&document.sources).into())
            }
        })
    }
}

#[async_trait]
impl Executor for MockService {
    async fn execute(&self, request: Request) -> Result<Response, BoxError> {
        self.respond(request)
    }
}

struct RootResolver<'a> {
    type_name: &'a str,
    state: &'a MockState,
}

impl ObjectValue for RootResolver<'_> {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn resolve_field<'a>(
        &'a self,
        info: &'a ResolveInfo<'a>,
    ) -> Result<ResolvedValue<'a>, FieldError> {
        match info.field_name() {
            SERVICE_SDL_QUERY => {
                let mut service = Object::new();
                service.insert("sdl", Value::String(ByteString::from(self.state.sdl.as_str())));
                Ok(ResolvedValue::object(MockObject {
                    type_name: SERVICE_TYPE.to_string(),
                    fields: service,
                }))
            }
            ENTITIES_QUERY => {
                let representations = info
                    .arguments()
                    .get("representations")
                    .and_then(Value::as_array)
                    .ok_or_else(|| FieldError {
                        message: "expected array `representations`".into(),
                    })?;
                let entities = representations
                    .iter()
                    .map(move |representation| Ok(self.entity(representation)));
                Ok(ResolvedValue::List(Box::new(entities)))
            }
            name => Ok(match self.state.resolvers.get(name) {
                Some(resolver) => resolve_value(resolver(info.arguments()), info),
                None => ResolvedValue::null(),
            }),
        }
    }
}

impl RootResolver<'_> {
    fn entity<'a>(&self, representation: &Value) -> ResolvedValue<'a> {
        let Some(representation) = representation.as_object() else {
            return ResolvedValue::null();
        };
        let Some(typename) = representation.get("__typename").and_then(Value::as_str) else {
            return ResolvedValue::null();
        };
        match self
            .state
            .entity_resolvers
            .get(typename)
            .map(|resolver| resolver(representation))
        {
            Some(Value::Object(fields)) => ResolvedValue::object(MockObject {
                type_name: typename.to_string(),
                fields,
            }),
            _ => ResolvedValue::null(),
        }
    }
}

/// An object resolved from a JSON value returned by a resolver closure.
struct MockObject {
    type_name: String,
    fields: Object,
}

impl ObjectValue for MockObject {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn resolve_field<'a>(
        &'a self,
        info: &'a ResolveInfo<'a>,
    ) -> Result<ResolvedValue<'a>, FieldError> {
        Ok(match self.fields.get(info.field_name()) {
            Some(value) => resolve_value(value.clone(), info),
            None => ResolvedValue::null(),
        })
    }
}

fn resolve_value<'a>(value: Value, info: &'a ResolveInfo<'a>) -> ResolvedValue<'a> {
    match value {
        Value::Object(fields) => {
            let type_name = fields
                .get("__typename")
                .and_then(Value::as_str)
                .unwrap_or_else(|| info.field_definition().ty.inner_named_type().as_str())
                .to_string();
            ResolvedValue::object(MockObject { type_name, fields })
        }
        Value::Array(items) => ResolvedValue::List(Box::new(
            items
                .into_iter()
                .map(move |item| Ok(resolve_value(item, info))),
        )),
        leaf => ResolvedValue::leaf(leaf),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    #[tokio::test]
    async fn resolves_root_fields_with_aliases_and_fragments() {
        let service = MockService::new("type Query { add(x: Int, y: Int = 2): Int }")
            .unwrap()
            .with_resolver("add", |args| {
                let arg = |name: &str| args.get(name).and_then(Value::as_i64).unwrap_or(0);
                json!(arg("x") + arg("y"))
            });
        let response = service
            .execute(
                Request::builder()
                    .query("query($x: Int) { sum: add(x: $x) ... on Query { __typename } }")
                    .variables(json!({ "x": 1 }).as_object().unwrap().clone())
                    .build(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.data,
            Some(json!({ "sum": 3, "__typename": "Query" }))
        );
    }

    #[tokio::test]
    async fn nested_objects_follow_the_selection() {
        let service = MockService::new(
            "type Query { book: Book } type Book { title: String author: Author } type Author { name: String }",
        )
        .unwrap()
        .with_resolver("book", |_| {
            json!({ "title": "Dune", "author": { "name": "Herbert", "born": 1920 } })
        });
        let response = service
            .execute(Request::builder().query("{ book { author { name } } }").build())
            .await
            .unwrap();

        assert_eq!(
            response.data,
            Some(json!({ "book": { "author": { "name": "Herbert" } } }))
        );
    }

    #[tokio::test]
    async fn answers_introspection_without_plumbing() {
        let service = MockService::new(
            r#"type Query { product: Product } type Product @key(fields: "upc") { upc: ID! }"#,
        )
        .unwrap();
        let response = service
            .execute(
                Request::builder()
                    .query("{ __schema { queryType { fields { name } } } }")
                    .build(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.data,
            Some(json!({ "__schema": { "queryType": { "fields": [{ "name": "product" }] } } }))
        );
        assert_eq!(service.introspection_count(), 1);
    }

    #[tokio::test]
    async fn resolves_service_and_entities() {
        let sdl = r#"type Query { product: Product } type Product @key(fields: "upc") { upc: ID! name: String }"#;
        let service = MockService::new(sdl)
            .unwrap()
            .with_entity_resolver("Product", |representation| {
                json!({ "upc": representation.get("upc").cloned().unwrap_or(Value::Null), "name": "Table" })
            });
        let response = service
            .execute(
                Request::builder()
                    .query(
                        "query($r: [_Any!]!) { _service { sdl } _entities(representations: $r) { __typename ... on Product { name } } }",
                    )
                    .variables(
                        json!({ "r": [{ "__typename": "Product", "upc": "1" }, { "__typename": "Chair" }] })
                            .as_object()
                            .unwrap()
                            .clone(),
                    )
                    .build(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.data,
            Some(json!({
                "_service": { "sdl": sdl },
                "_entities": [{ "__typename": "Product", "name": "Table" }, null]
            }))
        );
        assert_eq!(service.introspection_count(), 0);
    }

    #[tokio::test]
    async fn failing_service_errors_out() {
        let service = MockService::new("type Query { a: Int }").unwrap();
        service.set_failing(true);
        let result = service
            .execute(Request::builder().query("{ a }").build())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_requests_get_graphql_errors() {
        let service = MockService::new("type Query { a: Int }").unwrap();
        let response = service
            .execute(Request::builder().query("{ b }").build())
            .await
            .unwrap();
        assert!(response.data.is_none());
        assert_eq!(
            response.errors[0].extensions.get("code"),
            Some(&json!("GRAPHQL_VALIDATION_FAILED"))
        );
    }
}
