#![doc = include_str!("../README.md")]

extern crate alloc;

mod error;
mod inliner;
mod options;
pub mod pointer;
mod renamer;
mod resolver;
mod walker;

pub use error::{BoxError, InlineError};
pub use inliner::RefInliner;
pub use options::InlineOptions;
pub use pointer::{FileId, RefPath};
pub use renamer::RefRenamer;
pub use resolver::{MemoryRetriever, RefResolver, Retrieve, ScopeGuard};
pub use walker::{GraphWalker, RefGraph};

use serde_json::Value;

/// The key that marks an object as a reference.
pub const REF_KEY: &str = "$ref";

/// Inline every external reference of `schema` with default options.
///
/// `base_uri` is the identity of `schema` itself; relative references
/// resolve against it, and documents not yet seen are requested from
/// `retriever`.
///
/// # Errors
///
/// Returns an error if `base_uri` is not an absolute URL, a reference cannot
/// be resolved, or external content has nowhere to go because the root (or
/// its definitions) is not an object.
pub fn inline<R: Retrieve>(
    base_uri: &str,
    schema: Value,
    retriever: R,
) -> Result<Value, InlineError> {
    RefInliner::new(base_uri, schema, retriever)?.inline()
}
