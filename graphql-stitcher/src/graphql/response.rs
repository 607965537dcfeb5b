use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;

use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A GraphQL primary response, as returned by executors and by the stitched schema.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(data: Option<Value>, errors: Vec<Error>, extensions: Map<ByteString, Value>) -> Self {
        Self {
            data,
            errors,
            extensions,
        }
    }

    /// A response carrying a single error and no data.
    pub fn from_error(error: Error) -> Self {
        Self {
            data: None,
            errors: vec![error],
            extensions: Object::new(),
        }
    }

    /// append_errors moves the supplied errors to the end of this response's errors.
    pub fn append_errors(&mut self, errors: &mut Vec<Error>) {
        self.errors.append(errors)
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn deserializes_remote_response() {
        let response: Response = serde_json::from_str(
            r#"{
                "data": { "add": 4 },
                "errors": [{ "message": "partial", "path": ["add"], "locations": [{ "line": 1, "column": 3 }] }]
            }"#,
        )
        .unwrap();

        assert_eq!(response.data, Some(json!({ "add": 4 })));
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].message, "partial");
        assert_eq!(response.errors[0].path, Some(json!(["add"])));
    }
}
