//! JSON helpers shared by the wire types and the delegation layer.

use apollo_compiler::ast;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// Convert a GraphQL input value from a parsed document into JSON, substituting variables.
///
/// Unknown variables become `null`, as GraphQL does for omitted nullable variables.
pub(crate) fn value_from_ast(value: &ast::Value, variables: &Object) -> Value {
    match value {
        ast::Value::Null => Value::Null,
        ast::Value::Enum(name) => Value::String(ByteString::from(name.as_str())),
        ast::Value::Variable(name) => variables
            .get(name.as_str())
            .cloned()
            .unwrap_or(Value::Null),
        ast::Value::String(string) => Value::String(ByteString::from(string.as_str())),
        ast::Value::Float(float) => float
            .try_to_f64()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ast::Value::Int(int) => match int.try_to_i32() {
            Ok(int) => Value::from(int),
            // out of range for a GraphQL Int, keep the magnitude as a float
            Err(_) => int
                .try_to_f64()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        },
        ast::Value::Boolean(boolean) => Value::Bool(*boolean),
        ast::Value::List(items) => Value::Array(
            items
                .iter()
                .map(|item| value_from_ast(item, variables))
                .collect(),
        ),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| {
                    (
                        ByteString::from(name.as_str()),
                        value_from_ast(value, variables),
                    )
                })
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::ast::Definition;
    use apollo_compiler::ast::Selection;
    use serde_json_bytes::json;

    use super::*;

    fn first_field_arguments(query: &str) -> Vec<(String, ast::Value)> {
        let document = ast::Document::parse(query, "query.graphql").unwrap();
        let Some(Definition::OperationDefinition(operation)) = document.definitions.first() else {
            panic!("expected an operation");
        };
        let Some(Selection::Field(field)) = operation.selection_set.first() else {
            panic!("expected a field");
        };
        field
            .arguments
            .iter()
            .map(|argument| (argument.name.to_string(), (*argument.value).clone()))
            .collect()
    }

    #[test]
    fn converts_literals_and_variables() {
        let arguments = first_field_arguments(
            r#"query($who: String) { f(a: 1, b: 2.5, c: "s", d: RED, e: [true, null], f: { g: $who }, h: $missing) }"#,
        );
        let variables: Object = json!({ "who": "me" }).as_object().unwrap().clone();
        let converted: Vec<Value> = arguments
            .iter()
            .map(|(_, value)| value_from_ast(value, &variables))
            .collect();

        assert_eq!(
            Value::Array(converted),
            json!([1, 2.5, "s", "RED", [true, null], { "g": "me" }, null])
        );
    }
}
