//! Root-field delegation of client operations against the unified schema.
//!
//! Every top-level field of an operation is owned by one subschema. Fields are
//! grouped per owner, forwarded as one document with their original names and
//! the client's response keys, and the partial results are put back together
//! in the order the client asked for them.

use std::collections::HashSet;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::ast::OperationType;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::Operation;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::introspection::partial_execute;
use apollo_compiler::request::coerce_variable_values;
use apollo_compiler::validation::Valid;
use apollo_compiler::validation::WithErrors;
use futures::future::join_all;
use serde_json_bytes::ByteString;
use serde_json_bytes::json;

use crate::federation::EntitiesResolver;
use crate::federation::spec::ENTITIES_QUERY;
use crate::federation::spec::SERVICE_SDL_QUERY;
use crate::graphql::Error;
use crate::graphql::Location;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::value_from_ast;
use crate::schema::FieldRoute;
use crate::schema::UnifiedSchema;

/// The client operation being delegated.
pub(crate) struct OperationContext<'a> {
    pub(crate) document: &'a Valid<ExecutableDocument>,
    pub(crate) operation: &'a Node<Operation>,
    pub(crate) variables: &'a Object,
}

impl OperationContext<'_> {
    /// A request running `selections` as the root selection set of this operation.
    ///
    /// Only the variables and fragments the selections use are forwarded.
    /// `extra_variables` are declared on the operation and sent along with their values.
    pub(crate) fn subrequest(
        &self,
        selections: Vec<Selection>,
        extra_variables: Vec<(Node<ast::VariableDefinition>, Value)>,
    ) -> Request {
        let mut used_variables = HashSet::new();
        let mut used_fragments = IndexMap::default();
        self.collect_usages(&selections, &mut used_variables, &mut used_fragments);

        let mut operation = self.operation.clone();
        let mut variables = Object::new();
        {
            let operation = operation.make_mut();
            operation.selection_set.selections = selections;
            operation
                .variables
                .retain(|definition| used_variables.contains(&definition.name));
            for definition in &operation.variables {
                if let Some(value) = self.variables.get(definition.name.as_str()) {
                    variables.insert(definition.name.as_str(), value.clone());
                }
            }
            for (definition, value) in extra_variables {
                operation
                    .variables
                    .retain(|existing| existing.name != definition.name);
                variables.insert(definition.name.as_str(), value);
                operation.variables.push(definition);
            }
        }

        let mut document = ExecutableDocument::new();
        document.fragments = used_fragments;
        document.operations.insert(operation);

        Request::builder()
            .query(document.serialize().no_indent().to_string())
            .variables(variables)
            .build()
    }

    fn collect_usages(
        &self,
        selections: &[Selection],
        variables: &mut HashSet<Name>,
        fragments: &mut IndexMap<Name, Node<apollo_compiler::executable::Fragment>>,
    ) {
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    for argument in &field.arguments {
                        collect_variables(&argument.value, variables);
                    }
                    collect_directive_variables(&field.directives, variables);
                    self.collect_usages(&field.selection_set.selections, variables, fragments);
                }
                Selection::InlineFragment(inline) => {
                    collect_directive_variables(&inline.directives, variables);
                    self.collect_usages(&inline.selection_set.selections, variables, fragments);
                }
                Selection::FragmentSpread(spread) => {
                    collect_directive_variables(&spread.directives, variables);
                    if fragments.contains_key(&spread.fragment_name) {
                        continue;
                    }
                    if let Some(fragment) = self.document.fragments.get(&spread.fragment_name) {
                        fragments.insert(spread.fragment_name.clone(), fragment.clone());
                        collect_directive_variables(&fragment.directives, variables);
                        self.collect_usages(
                            &fragment.selection_set.selections,
                            variables,
                            fragments,
                        );
                    }
                }
            }
        }
    }

    /// The root fields of the operation, with root fragments flattened and
    /// `@skip`/`@include` applied.
    fn root_fields(&self) -> Vec<&Node<Field>> {
        let mut fields = Vec::new();
        let mut visited = HashSet::new();
        self.flatten(&self.operation.selection_set, &mut fields, &mut visited);
        fields
    }

    fn flatten<'b>(
        &'b self,
        selection_set: &'b SelectionSet,
        fields: &mut Vec<&'b Node<Field>>,
        visited: &mut HashSet<&'b Name>,
    ) {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    if is_included(&field.directives, self.variables) {
                        fields.push(field);
                    }
                }
                Selection::InlineFragment(inline) => {
                    if is_included(&inline.directives, self.variables) {
                        self.flatten(&inline.selection_set, fields, visited);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !is_included(&spread.directives, self.variables)
                        || !visited.insert(&spread.fragment_name)
                    {
                        continue;
                    }
                    if let Some(fragment) = self.document.fragments.get(&spread.fragment_name) {
                        self.flatten(&fragment.selection_set, fields, visited);
                    }
                }
            }
        }
    }
}

fn collect_variables(value: &ast::Value, variables: &mut HashSet<Name>) {
    match value {
        ast::Value::Variable(name) => {
            variables.insert(name.clone());
        }
        ast::Value::List(items) => {
            for item in items {
                collect_variables(item, variables);
            }
        }
        ast::Value::Object(fields) => {
            for (_, value) in fields {
                collect_variables(value, variables);
            }
        }
        _ => {}
    }
}

fn collect_directive_variables(directives: &ast::DirectiveList, variables: &mut HashSet<Name>) {
    for directive in directives.iter() {
        for argument in &directive.arguments {
            collect_variables(&argument.value, variables);
        }
    }
}

fn is_included(directives: &ast::DirectiveList, variables: &Object) -> bool {
    let condition = |name: &str| {
        directives
            .get(name)
            .and_then(|directive| directive.specified_argument_by_name("if"))
            .map(|value| value_from_ast(value, variables))
    };
    !matches!(condition("skip"), Some(Value::Bool(true)))
        && !matches!(condition("include"), Some(Value::Bool(false)))
}

/// Work needed to answer some of the root fields of an operation.
enum Job<'a> {
    /// Root fields owned by one subschema, each with its own route.
    Delegate {
        owner: &'a FieldRoute,
        fields: Vec<(&'a FieldRoute, &'a Node<Field>)>,
    },
    Entities {
        resolver: &'a EntitiesResolver,
        field: &'a Node<Field>,
    },
}

type Resolved = (Vec<(Name, Value)>, Vec<Error>);

impl UnifiedSchema {
    /// Execute a client request against the unified schema by delegating each
    /// root field to the subschema that owns it.
    ///
    /// Query fields owned by different subschemas are fetched concurrently.
    /// Mutation fields run one after the other, batching consecutive fields
    /// owned by the same subschema.
    pub async fn execute(&self, request: Request) -> Response {
        let Some(query) = request.query.as_deref() else {
            return Response::from_error(
                Error::builder()
                    .message("Must provide query string.")
                    .extension_code("MISSING_QUERY_STRING")
                    .build(),
            );
        };
        let document = match ExecutableDocument::parse_and_validate(
            self.schema(),
            query,
            "query.graphql",
        ) {
            Ok(document) => document,
            Err(WithErrors { errors, .. }) => {
                return Response::builder()
                    .errors(
                        errors
                            .iter()
                            .map(|diagnostic| {
                                let diagnostic = diagnostic.unstable_to_json_compat();
                                Error::builder()
                                    .message(diagnostic.message)
                                    .locations(
                                        diagnostic
                                            .locations
                                            .iter()
                                            .map(|location| Location {
                                                line: location.line as u32,
                                                column: location.column as u32,
                                            })
                                            .collect(),
                                    )
                                    .extension_code("GRAPHQL_VALIDATION_FAILED")
                                    .build()
                            })
                            .collect(),
                    )
                    .build();
            }
        };
        let operation = match document.operations.get(request.operation_name.as_deref()) {
            Ok(operation) => operation,
            Err(err) => {
                return Response::from_error(
                    Error::builder()
                        .message(err.message().to_string())
                        .extension_code("GRAPHQL_VALIDATION_FAILED")
                        .build(),
                );
            }
        };
        if operation.operation_type == OperationType::Subscription {
            return Response::from_error(
                Error::builder()
                    .message("subscriptions are not supported by the stitched schema")
                    .extension_code("SUBSCRIPTION_NOT_SUPPORTED")
                    .build(),
            );
        }

        let context = OperationContext {
            document: &document,
            operation,
            variables: &request.variables,
        };
        let root_fields = context.root_fields();
        let mut data: IndexMap<Name, Value> = IndexMap::default();
        let mut errors = Vec::new();
        let mut jobs: Vec<Job<'_>> = Vec::new();
        let mut introspection = false;
        let federation = self.federation();

        for field in root_fields {
            let key = field.response_key();
            if data.contains_key(key) {
                // same response key selected again: merge into the job already planned
                if let Some(Job::Delegate { fields, .. }) = jobs.iter_mut().find(|job| {
                    matches!(job, Job::Delegate { fields, .. }
                        if fields.iter().any(|(_, planned)| planned.response_key() == key))
                }) {
                    if let Some(route) = self.route(operation.operation_type, &field.name) {
                        fields.push((route, field));
                    }
                }
                continue;
            }
            data.insert(key.clone(), Value::Null);

            match field.name.as_str() {
                "__schema" | "__type" => {
                    introspection = true;
                    continue;
                }
                "__typename" => {
                    data.insert(
                        key.clone(),
                        Value::String(ByteString::from(operation.selection_set.ty.as_str())),
                    );
                    continue;
                }
                SERVICE_SDL_QUERY if operation.operation_type == OperationType::Query => {
                    if let Some(service) = federation.and_then(|federation| federation.service()) {
                        data.insert(
                            key.clone(),
                            service.resolve(&field.selection_set, &document),
                        );
                        continue;
                    }
                }
                ENTITIES_QUERY if operation.operation_type == OperationType::Query => {
                    if let Some(resolver) = federation.and_then(|federation| federation.entities())
                    {
                        jobs.push(Job::Entities { resolver, field });
                        continue;
                    }
                }
                _ => {}
            }

            let Some(route) = self.route(operation.operation_type, &field.name) else {
                errors.push(
                    Error::builder()
                        .message(format!(
                            "no subschema resolves the root field `{}`",
                            field.name
                        ))
                        .path(json!([key.as_str()]))
                        .extension_code("FIELD_NOT_ROUTED")
                        .build(),
                );
                continue;
            };

            let batch = match operation.operation_type {
                OperationType::Mutation => match jobs.last_mut() {
                    Some(Job::Delegate { owner, fields }) if owner.subschema == route.subschema =>
                    {
                        Some(fields)
                    }
                    _ => None,
                },
                _ => jobs.iter_mut().find_map(|job| match job {
                    Job::Delegate { owner, fields } if owner.subschema == route.subschema => {
                        Some(fields)
                    }
                    _ => None,
                }),
            };
            match batch {
                Some(fields) => fields.push((route, field)),
                None => jobs.push(Job::Delegate {
                    owner: route,
                    fields: vec![(route, field)],
                }),
            }
        }

        let results = if operation.operation_type == OperationType::Mutation {
            let mut results = Vec::with_capacity(jobs.len());
            for job in jobs {
                results.push(run(job, &context).await);
            }
            results
        } else {
            join_all(jobs.into_iter().map(|job| run(job, &context))).await
        };
        if introspection {
            let (values, mut introspection_errors) = self.introspect(&context);
            for (key, value) in values {
                data.insert(key, value);
            }
            errors.append(&mut introspection_errors);
        }
        for (values, mut job_errors) in results {
            for (key, value) in values {
                data.insert(key, value);
            }
            errors.append(&mut job_errors);
        }

        let data: Object = data
            .into_iter()
            .map(|(key, value)| (ByteString::from(key.as_str()), value))
            .collect();
        Response::builder()
            .data(Value::Object(data))
            .errors(errors)
            .build()
    }
}

impl UnifiedSchema {
    /// Answer the `__schema` and `__type` root fields from the unified schema itself.
    ///
    /// Only the keys of those fields are returned; the caller owns the rest of the data.
    fn introspect(&self, context: &OperationContext<'_>) -> Resolved {
        let variables = match coerce_variable_values(
            self.schema(),
            context.operation,
            context.variables,
        ) {
            Ok(variables) => variables,
            Err(err) => {
                return (
                    Vec::new(),
                    vec![err.to_graphql_error(&context.document.sources).into()],
                );
            }
        };
        let result = partial_execute(
            self.schema(),
            &self.schema().implementers_map(),
            context.document,
            context.operation,
            &variables,
        );
        match result {
            Ok(response) => {
                let values = response
                    .data
                    .into_iter()
                    .flatten()
                    .filter_map(|(key, value)| Some((Name::new(key.as_str()).ok()?, value)))
                    .collect();
                (values, response.errors.into_iter().map(Into::into).collect())
            }
            Err(err) => (
                Vec::new(),
                vec![err.to_graphql_error(&context.document.sources).into()],
            ),
        }
    }
}

async fn run(job: Job<'_>, context: &OperationContext<'_>) -> Resolved {
    match job {
        Job::Entities { resolver, field } => {
            let (value, errors) = resolver.resolve(field, context).await;
            (vec![(field.response_key().clone(), value)], errors)
        }
        Job::Delegate { owner, fields } => delegate(owner, fields, context).await,
    }
}

async fn delegate(
    owner: &FieldRoute,
    fields: Vec<(&FieldRoute, &Node<Field>)>,
    context: &OperationContext<'_>,
) -> Resolved {
    let mut keys: Vec<Name> = Vec::new();
    let selections = fields
        .into_iter()
        .map(|(route, field)| {
            let key = field.response_key().clone();
            if !keys.contains(&key) {
                keys.push(key.clone());
            }
            let mut field = field.clone();
            let field_mut = field.make_mut();
            field_mut.alias = (route.field != key).then_some(key);
            field_mut.name = route.field.clone();
            Selection::Field(field)
        })
        .collect();

    let request = context.subrequest(selections, Vec::new());
    tracing::debug!(subschema = %owner.subschema_name, "delegating root fields");
    match owner.executor.execute(request).await {
        Ok(response) => {
            let mut data = match response.data {
                Some(Value::Object(data)) => data,
                _ => Object::new(),
            };
            let values = keys
                .into_iter()
                .map(|key| {
                    let value = data.remove(key.as_str()).unwrap_or(Value::Null);
                    (key, value)
                })
                .collect();
            (values, response.errors)
        }
        Err(err) => {
            let errors = keys
                .iter()
                .map(|key| {
                    Error::builder()
                        .message(format!(
                            "could not resolve `{key}` from {}: {err}",
                            owner.subschema_name
                        ))
                        .path(json!([key.as_str()]))
                        .extension_code("SUBREQUEST_FAILED")
                        .build()
                })
                .collect();
            (
                keys.into_iter().map(|key| (key, Value::Null)).collect(),
                errors,
            )
        }
    }
}
