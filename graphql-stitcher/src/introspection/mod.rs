//! Fetching the type schema of a remote subschema.

mod client_schema;

use itertools::Itertools;

use crate::error::IntrospectionError;
use crate::federation::spec::expand_subgraph;
use crate::graphql::Request;
use crate::json_ext::Value;
use crate::subschema::IntrospectionKind;
use crate::subschema::SubschemaConfig;
use crate::subschema::SubschemaDescriptor;
use crate::subschema::SubschemaId;

/// The standard introspection query sent to `standard` subschemas.
pub const INTROSPECTION_QUERY: &str = r#"query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types {
      ...FullType
    }
    directives {
      name
      description
      locations
      args {
        ...InputValue
      }
    }
  }
}

fragment FullType on __Type {
  kind
  name
  description
  fields(includeDeprecated: true) {
    name
    description
    args {
      ...InputValue
    }
    type {
      ...TypeRef
    }
    isDeprecated
    deprecationReason
  }
  inputFields {
    ...InputValue
  }
  interfaces {
    ...TypeRef
  }
  enumValues(includeDeprecated: true) {
    name
    description
    isDeprecated
    deprecationReason
  }
  possibleTypes {
    ...TypeRef
  }
}

fragment InputValue on __InputValue {
  name
  description
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
            ofType {
              kind
              name
              ofType {
                kind
                name
              }
            }
          }
        }
      }
    }
  }
}
"#;

/// The query sent to `federation` subschemas.
pub const SERVICE_SDL_QUERY: &str = "query __ApolloGetServiceDefinition__ { _service { sdl } }";

/// Retrieve the current type schema of a remote subschema.
///
/// Nothing is cached: every call contacts the executor.
pub(crate) async fn introspect(
    id: SubschemaId,
    config: &SubschemaConfig,
) -> Result<SubschemaDescriptor, IntrospectionError> {
    let subschema = config.label(id);
    let executor = config
        .executor
        .clone()
        .ok_or_else(|| IntrospectionError::MissingExecutor {
            subschema: subschema.clone(),
        })?;

    let query = match config.introspection {
        IntrospectionKind::Standard => INTROSPECTION_QUERY,
        IntrospectionKind::Federation => SERVICE_SDL_QUERY,
    };
    tracing::debug!(%subschema, kind = ?config.introspection, "introspecting subschema");

    let response = executor
        .execute(Request::builder().query(query).build())
        .await
        .map_err(|err| IntrospectionError::Request {
            subschema: subschema.clone(),
            reason: err.to_string(),
        })?;

    if !response.errors.is_empty() {
        return Err(IntrospectionError::Remote {
            subschema,
            errors: response.errors.iter().map(|error| &error.message).join("; "),
        });
    }
    let data = match response.data {
        Some(data) if !data.is_null() => data,
        _ => {
            return Err(IntrospectionError::Malformed {
                subschema,
                reason: "the response has no data".to_string(),
            });
        }
    };

    let schema = match config.introspection {
        IntrospectionKind::Standard => {
            let document = client_schema::document_from_introspection(data).map_err(|reason| {
                IntrospectionError::Malformed {
                    subschema: subschema.clone(),
                    reason,
                }
            })?;
            document.to_schema_validate()
        }
        IntrospectionKind::Federation => {
            let sdl = service_sdl(&data).ok_or_else(|| IntrospectionError::Malformed {
                subschema: subschema.clone(),
                reason: "`_service.sdl` is missing".to_string(),
            })?;
            expand_subgraph(sdl, &format!("{subschema}.graphql"))
        }
    }
    .map_err(|errors| IntrospectionError::InvalidSchema {
        subschema: subschema.clone(),
        errors: errors.into(),
    })?;

    tracing::debug!(
        %subschema,
        types = schema.types.len(),
        "introspected subschema"
    );
    Ok(SubschemaDescriptor::new(
        id,
        subschema,
        schema,
        executor,
        config.options.clone(),
    ))
}

fn service_sdl(data: &Value) -> Option<&str> {
    data.as_object()?
        .get("_service")?
        .as_object()?
        .get("sdl")?
        .as_str()
}
