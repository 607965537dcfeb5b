//! Stitcher configuration.
//!
//! Executors are code, so subschemas themselves are supplied to the
//! [`Stitcher`](crate::Stitcher) builder; everything else can come from YAML or JSON.

mod merge;

use std::str::FromStr;
use std::time::Duration;

use derivative::Derivative;
use displaydoc::Display;
pub use merge::MergeOptions;
pub use merge::OnTypeConflict;
pub use merge::StitchOptions;
pub use merge::Transform;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_json::Error),
    /// could not parse yaml configuration: {0}
    DeserializeYamlError(serde_yaml::Error),
}

/// The configuration for the stitcher.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with the builder.
#[derive(Clone, Derivative, Deserialize, Serialize, JsonSchema, Default, PartialEq)]
#[derivative(Debug)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Interval between automatic refreshes of the remote schemas, in
    /// human-readable format such as `30s`. Auto-refresh starts with the
    /// stitcher when set; defaults to none.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "Option<String>")]
    pub(crate) polling_interval: Option<Duration>,

    /// Options applied to the merge of all subschemas.
    pub(crate) stitch: StitchOptions,

    /// Merge options applied to the local schema.
    pub(crate) local_subschema: MergeOptions,

    /// Expose the stitched schema as a federation subgraph (`_service` and `_entities`).
    pub(crate) federation_metadata: bool,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder(visibility = "pub")]
    fn new(
        polling_interval: Option<Duration>,
        stitch: Option<StitchOptions>,
        local_subschema: Option<MergeOptions>,
        federation_metadata: Option<bool>,
    ) -> Self {
        Self {
            polling_interval,
            stitch: stitch.unwrap_or_default(),
            local_subschema: local_subschema.unwrap_or_default(),
            federation_metadata: federation_metadata.unwrap_or_default(),
        }
    }

    /// Parse configuration from JSON.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigurationError> {
        serde_json::from_value(value).map_err(ConfigurationError::DeserializeConfigError)
    }

    /// The JSON schema of the configuration, for editor support.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Configuration)
    }

    /// The configured polling interval, if any.
    pub fn polling_interval(&self) -> Option<Duration> {
        self.polling_interval
    }

    /// Whether federation metadata is exposed.
    pub fn federation_metadata(&self) -> bool {
        self.federation_metadata
    }
}

/// Parse configuration from a string in YAML syntax
impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(s).map_err(ConfigurationError::DeserializeYamlError)
    }
}
