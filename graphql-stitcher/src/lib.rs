//! Stitches remote GraphQL schemas into a local schema, and keeps the stitched
//! schema up to date as the remote services change.
//!
//! A [`Stitcher`] owns the list of remote subschemas. Every rebuild introspects
//! all of them, merges them with the local schema (local last, so it wins on
//! collisions) and atomically swaps in the resulting [`UnifiedSchema`]. Rebuilds
//! run when subschemas are added, on demand, or periodically. With
//! `federation_metadata` enabled the served schema also answers the federation
//! `_service` and `_entities` fields.

pub mod configuration;
pub mod error;
pub mod executor;
pub mod federation;
pub mod graphql;
pub mod json_ext;
pub mod test_harness;

mod builder;
mod delegation;
mod introspection;
mod merge;
mod registry;
mod scheduler;
mod schema;
mod stitcher;
mod subschema;

pub use configuration::Configuration;
pub use configuration::MergeOptions;
pub use configuration::OnTypeConflict;
pub use configuration::StitchOptions;
pub use configuration::Transform;
pub use error::RebuildError;
pub use executor::Executor;
pub use executor::ServiceExecutor;
pub use introspection::INTROSPECTION_QUERY;
pub use introspection::SERVICE_SDL_QUERY;
pub use merge::Merge;
pub use merge::TypeMerger;
pub use registry::ActiveSchema;
pub use registry::SchemaRegistry;
pub use scheduler::RefreshState;
pub use schema::EntityIndex;
pub use schema::EntityOwner;
pub use schema::FieldRoute;
pub use schema::SchemaHash;
pub use schema::UnifiedSchema;
pub use stitcher::Stitcher;
pub use subschema::IntrospectionKind;
pub use subschema::LocalSubschema;
pub use subschema::SubschemaConfig;
pub use subschema::SubschemaDescriptor;
pub use subschema::SubschemaId;
pub use subschema::SubschemaStore;
