//! Stitcher errors.
use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::WithErrors;
use displaydoc::Display;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;

/// Errors raised while fetching the type schema of one subschema.
#[derive(Error, Display, Debug)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum IntrospectionError {
    /// {subschema} has no executor to introspect it with
    MissingExecutor {
        /// The subschema that was being introspected.
        subschema: String,
    },

    /// introspection request to {subschema} failed: {reason}
    ///
    /// note that this relates to an executor error and not a GraphQL error
    Request {
        /// The subschema that was being introspected.
        subschema: String,
        /// The executor failure.
        reason: String,
    },

    /// {subschema} answered introspection with errors: {errors}
    Remote {
        /// The subschema that was being introspected.
        subschema: String,
        /// The GraphQL error messages, joined.
        errors: String,
    },

    /// {subschema} answered introspection with a malformed result: {reason}
    Malformed {
        /// The subschema that was being introspected.
        subschema: String,
        /// What could not be read.
        reason: String,
    },

    /// {subschema} exposes an invalid schema: {errors}
    InvalidSchema {
        /// The subschema that was being introspected.
        subschema: String,
        /// The validation failures.
        errors: SchemaDiagnostics,
    },
}

/// Errors raised while merging subschemas into one schema.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum MergeError {
    /// type `{type_name}` is {existing} in {existing_owner} but {incoming} in {incoming_owner}
    KindConflict {
        /// The conflicting type.
        type_name: String,
        /// The kind already merged.
        existing: &'static str,
        /// The subschema the merged kind came from.
        existing_owner: String,
        /// The kind being merged.
        incoming: &'static str,
        /// The subschema being merged.
        incoming_owner: String,
    },

    /// root field `{name}` of {subschema} is not a valid GraphQL name after transforms
    InvalidName {
        /// The offending name.
        name: String,
        /// The subschema whose transforms produced it.
        subschema: String,
    },

    /// no subschema provides a query root field
    MissingQueryType,

    /// the stitched schema is invalid: {0}
    Invalid(SchemaDiagnostics),
}

/// Errors raised while turning a stitched schema into a federation-compatible one.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum FederationTranslationError {
    /// the filtered federation SDL could not be built: {0}
    Build(SchemaDiagnostics),

    /// the federation fields could not be reinstated on the served schema: {0}
    Reinstate(SchemaDiagnostics),
}

/// A failed rebuild. The previously active schema stays in effect.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum RebuildError {
    /// introspection failed: {0}
    Introspection(#[from] IntrospectionError),

    /// merge failed: {0}
    Merge(#[from] MergeError),

    /// federation translation failed: {0}
    Federation(#[from] FederationTranslationError),
}

/// Collection of schema parse and validation diagnostics.
#[derive(Debug)]
pub struct SchemaDiagnostics {
    pub(crate) errors: DiagnosticList,
}

impl SchemaDiagnostics {
    /// The underlying diagnostics.
    pub fn diagnostics(&self) -> &DiagnosticList {
        &self.errors
    }
}

impl std::fmt::Display for SchemaDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut errors = self.errors.iter();
        for (i, error) in errors.by_ref().take(5).enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", error)?;
        }
        let remaining = errors.count();
        if remaining > 0 {
            write!(f, "\n...and {remaining} other errors")?;
        }
        Ok(())
    }
}

impl From<DiagnosticList> for SchemaDiagnostics {
    fn from(errors: DiagnosticList) -> Self {
        Self { errors }
    }
}

impl<T> From<WithErrors<T>> for SchemaDiagnostics {
    fn from(WithErrors { errors, .. }: WithErrors<T>) -> Self {
        errors.into()
    }
}
