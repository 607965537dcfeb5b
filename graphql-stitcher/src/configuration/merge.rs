use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Per-subschema merge options.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct MergeOptions {
    /// Transforms applied, in order, to the subschema's root fields before merging.
    pub transforms: Vec<Transform>,
}

impl MergeOptions {
    /// The name a root field is exposed under, or `None` when a transform drops it.
    pub fn root_field_name(&self, name: &str) -> Option<String> {
        self.transforms
            .iter()
            .try_fold(name.to_string(), |current, transform| transform.apply(&current))
    }
}

/// A transform of a subschema's root fields.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Transform {
    /// Prefix every root field name.
    RenameRootFields {
        /// Prepended to each root field name.
        prefix: String,
    },
    /// Only expose the listed root fields.
    FilterRootFields {
        /// Root field names to keep, as seen by this transform.
        fields: Vec<String>,
    },
}

impl Transform {
    pub(crate) fn apply(&self, name: &str) -> Option<String> {
        match self {
            Transform::RenameRootFields { prefix } => Some(format!("{prefix}{name}")),
            Transform::FilterRootFields { fields } => fields
                .iter()
                .any(|field| field == name)
                .then(|| name.to_string()),
        }
    }
}

/// Options applied to the merge as a whole.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct StitchOptions {
    /// How same-named, same-kind types from different subschemas are combined.
    pub on_type_conflict: OnTypeConflict,
}

/// Resolution of a type defined by more than one subschema.
///
/// Entity ownership follows the kept definition: the first `@key` declarer under
/// `keep_first`, the last one otherwise.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnTypeConflict {
    /// Union the members (fields, values, union members); later subschemas win per member.
    #[default]
    Merge,
    /// Keep the definition from the first subschema that declares the type.
    KeepFirst,
    /// Keep the definition from the last subschema that declares the type.
    KeepLast,
}
