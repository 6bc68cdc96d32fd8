use thiserror::Error;

/// Boxed error returned by a [`Retrieve`](crate::Retrieve) implementation.
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// Errors that abort an inlining run.
///
/// A run that fails leaves no schema behind: the document was moved into the
/// inliner and is dropped with it.
#[derive(Debug, Error)]
pub enum InlineError {
    #[error("invalid base URI '{uri}': {source}")]
    InvalidBaseUri {
        uri: String,
        source: url::ParseError,
    },

    #[error("cannot resolve $ref '{reference}' against '{scope}': {source}")]
    InvalidReference {
        reference: String,
        scope: String,
        source: url::ParseError,
    },

    /// A `$ref` key whose value is not a string.
    #[error("$ref at {path} is not a string")]
    NonStringReference { path: String },

    #[error("failed to retrieve '{uri}': {source}")]
    Retrieve { uri: String, source: BoxError },

    #[error("unresolvable JSON pointer '#{pointer}' in '{uri}'")]
    UnresolvablePointer { uri: String, pointer: String },

    #[error("schema root must be an object to hold inlined definitions")]
    RootNotObject,

    #[error("'{key}' in the schema root must be an object")]
    DefinitionsNotObject { key: String },

    /// A document referenced as a whole cannot be merged into its namespace.
    #[error("'{uri}' is referenced as a whole but is not an object")]
    DocumentNotObject { uri: String },

    /// A path recorded during the walk no longer resolves. This is a bug in
    /// the inliner, not a problem with the input.
    #[error("recorded path {path} no longer resolves in '{uri}'")]
    Inconsistent { uri: String, path: String },
}
