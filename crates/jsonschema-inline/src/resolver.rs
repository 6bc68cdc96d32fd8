use core::ops::{Deref, DerefMut};
use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{BoxError, InlineError};
use crate::pointer::{parse_fragment, traverse};

/// Source of documents that are not yet in the resolver's store.
///
/// Implementations decide how a URI becomes a document (HTTP, disk, an
/// embedded catalog). Each URI is requested at most once per run.
pub trait Retrieve {
    /// # Errors
    ///
    /// Returns an error if no document exists for `uri` or it cannot be read.
    fn retrieve(&self, uri: &Url) -> Result<Value, BoxError>;
}

impl<F> Retrieve for F
where
    F: Fn(&Url) -> Result<Value, BoxError>,
{
    fn retrieve(&self, uri: &Url) -> Result<Value, BoxError> {
        self(uri)
    }
}

/// A [`Retrieve`] backed by documents registered up front.
#[derive(Debug, Clone, Default)]
pub struct MemoryRetriever {
    documents: HashMap<String, Value>,
}

impl MemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `document` under `uri`. Any fragment on `uri` is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if `uri` is not an absolute URL.
    pub fn insert(&mut self, uri: &str, document: Value) -> Result<(), url::ParseError> {
        let mut url = Url::parse(uri)?;
        url.set_fragment(None);
        self.documents.insert(url.into(), document);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    ///
    /// # Errors
    ///
    /// Returns an error if `uri` is not an absolute URL.
    pub fn with_document(mut self, uri: &str, document: Value) -> Result<Self, url::ParseError> {
        self.insert(uri, document)?;
        Ok(self)
    }
}

impl Retrieve for MemoryRetriever {
    fn retrieve(&self, uri: &Url) -> Result<Value, BoxError> {
        self.documents
            .get(uri.as_str())
            .cloned()
            .ok_or_else(|| format!("no document registered for {uri}").into())
    }
}

/// Resolves `$ref` strings against a stack of base URIs, caching every
/// document it fetches.
pub struct RefResolver<R> {
    scopes: Vec<Url>,
    store: IndexMap<String, Value>,
    retriever: R,
}

impl<R: Retrieve> RefResolver<R> {
    /// Create a resolver whose initial scope is `base_uri`, with `referrer`
    /// already stored as the document at that URI.
    pub fn new(base_uri: Url, referrer: Value, retriever: R) -> Self {
        let mut base = base_uri;
        base.set_fragment(None);
        let mut store = IndexMap::new();
        store.insert(base.to_string(), referrer);
        Self {
            scopes: vec![base],
            store,
            retriever,
        }
    }

    /// The base URI relative references currently resolve against.
    pub fn resolution_scope(&self) -> &Url {
        // The initial scope is never popped: guards only pop what they pushed.
        &self.scopes[self.scopes.len() - 1]
    }

    /// Number of scopes on the stack, including the initial one.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Make `url` the current scope until the returned guard is dropped.
    pub fn push_scope(&mut self, url: Url) -> ScopeGuard<'_, R> {
        self.scopes.push(url);
        ScopeGuard { resolver: self }
    }

    /// Resolve `reference` against the current scope.
    ///
    /// Returns the absolute URL (fragment included) and a copy of the node it
    /// points to. The containing document is fetched on first use and cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is not a valid URI reference, the
    /// document cannot be retrieved, or the fragment does not exist in it.
    pub fn resolve(&mut self, reference: &str) -> Result<(Url, Value), InlineError> {
        let url = self
            .resolution_scope()
            .join(reference)
            .map_err(|source| InlineError::InvalidReference {
                reference: reference.to_string(),
                scope: self.resolution_scope().to_string(),
                source,
            })?;
        let resolved = self.resolve_url(&url)?;
        Ok((url, resolved))
    }

    fn resolve_url(&mut self, url: &Url) -> Result<Value, InlineError> {
        let mut base = url.clone();
        base.set_fragment(None);
        let fragment = url.fragment().unwrap_or_default();

        let document = self.fetch(&base)?;
        traverse(document, &parse_fragment(fragment))
            .cloned()
            .ok_or_else(|| InlineError::UnresolvablePointer {
                uri: base.to_string(),
                pointer: fragment.to_string(),
            })
    }

    fn fetch(&mut self, base: &Url) -> Result<&Value, InlineError> {
        let key = base.as_str();
        if !self.store.contains_key(key) {
            debug!(uri = %base, "retrieving document");
            let document =
                self.retriever
                    .retrieve(base)
                    .map_err(|source| InlineError::Retrieve {
                        uri: key.to_string(),
                        source,
                    })?;
            self.store.insert(key.to_string(), document);
        }
        self.store
            .get(key)
            .ok_or_else(|| InlineError::Inconsistent {
                uri: key.to_string(),
                path: "#".to_string(),
            })
    }

    /// The cached document for a fragment-less base URI.
    pub fn document(&self, base_uri: &str) -> Option<&Value> {
        self.store.get(base_uri)
    }

    pub fn document_mut(&mut self, base_uri: &str) -> Option<&mut Value> {
        self.store.get_mut(base_uri)
    }

    /// Base URIs of every cached document, in fetch order.
    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.store.keys().map(String::as_str)
    }

    /// Consume the resolver, returning the document stored under `base_uri`.
    pub fn into_document(mut self, base_uri: &str) -> Option<Value> {
        self.store.swap_remove(base_uri)
    }
}

/// Keeps a scope pushed for as long as it lives.
///
/// Dereferences to the resolver, so resolution inside the scope goes through
/// the guard. Dropping it pops the scope, including on early return and
/// unwinding.
pub struct ScopeGuard<'a, R> {
    resolver: &'a mut RefResolver<R>,
}

impl<R> Deref for ScopeGuard<'_, R> {
    type Target = RefResolver<R>;

    fn deref(&self) -> &Self::Target {
        self.resolver
    }
}

impl<R> DerefMut for ScopeGuard<'_, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.resolver
    }
}

impl<R> Drop for ScopeGuard<'_, R> {
    fn drop(&mut self) {
        self.resolver.scopes.pop();
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use serde_json::json;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("valid URL")
    }

    fn resolver(retriever: MemoryRetriever) -> RefResolver<MemoryRetriever> {
        RefResolver::new(
            url("https://example.com/schemas/root.json"),
            json!({ "definitions": { "A": { "type": "integer" } } }),
            retriever,
        )
    }

    fn retriever() -> MemoryRetriever {
        MemoryRetriever::new()
            .with_document(
                "https://example.com/schemas/other.json",
                json!({ "X": { "type": "string" }, "list": [ { "n": 0 }, { "n": 1 } ] }),
            )
            .expect("valid URI")
    }

    #[test]
    fn resolves_local_fragment() {
        let mut resolver = resolver(MemoryRetriever::new());
        let (resolved_url, value) = resolver.resolve("#/definitions/A").expect("resolves");
        assert_eq!(
            resolved_url.as_str(),
            "https://example.com/schemas/root.json#/definitions/A"
        );
        assert_eq!(value, json!({ "type": "integer" }));
    }

    #[test]
    fn resolves_relative_document() {
        let mut resolver = resolver(retriever());
        let (resolved_url, value) = resolver.resolve("other.json#/X").expect("resolves");
        assert_eq!(
            resolved_url.as_str(),
            "https://example.com/schemas/other.json#/X"
        );
        assert_eq!(value, json!({ "type": "string" }));
        assert!(
            resolver
                .document("https://example.com/schemas/other.json")
                .is_some()
        );
    }

    #[test]
    fn resolves_whole_document() {
        let mut resolver = resolver(retriever());
        let (_, value) = resolver.resolve("./other.json").expect("resolves");
        assert_eq!(value["X"], json!({ "type": "string" }));
    }

    #[test]
    fn resolves_array_index() {
        let mut resolver = resolver(retriever());
        let (_, value) = resolver.resolve("other.json#/list/1").expect("resolves");
        assert_eq!(value, json!({ "n": 1 }));
    }

    #[test]
    fn fetches_each_document_once() {
        let calls = Cell::new(0);
        let retriever = |_: &Url| -> Result<Value, BoxError> {
            calls.set(calls.get() + 1);
            Ok(json!({ "X": true }))
        };
        let mut resolver =
            RefResolver::new(url("https://example.com/root.json"), json!({}), retriever);
        resolver.resolve("other.json#/X").expect("resolves");
        resolver.resolve("other.json").expect("resolves");
        resolver
            .resolve("https://example.com/other.json#/X")
            .expect("resolves");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn scope_changes_relative_resolution() {
        let retriever = MemoryRetriever::new()
            .with_document("https://example.com/a/inner.json", json!({ "Y": 1 }))
            .expect("valid URI");
        let mut resolver =
            RefResolver::new(url("https://example.com/root.json"), json!({}), retriever);
        {
            let mut scope = resolver.push_scope(url("https://example.com/a/outer.json#/Z"));
            let (resolved_url, value) = scope.resolve("inner.json#/Y").expect("resolves");
            assert_eq!(resolved_url.as_str(), "https://example.com/a/inner.json#/Y");
            assert_eq!(value, json!(1));
            assert_eq!(scope.depth(), 2);
        }
        assert_eq!(resolver.depth(), 1);
        assert_eq!(
            resolver.resolution_scope().as_str(),
            "https://example.com/root.json"
        );
    }

    #[test]
    fn scope_pops_on_error_path() {
        fn failing(resolver: &mut RefResolver<MemoryRetriever>) -> Result<(), InlineError> {
            let mut scope = resolver.push_scope(url("https://example.com/deeper/x.json"));
            scope.resolve("missing.json")?;
            Ok(())
        }
        let mut resolver = resolver(MemoryRetriever::new());
        assert!(failing(&mut resolver).is_err());
        assert_eq!(resolver.depth(), 1);
    }

    #[test]
    fn missing_document_is_retrieve_error() {
        let mut resolver = resolver(MemoryRetriever::new());
        let err = resolver.resolve("nope.json").expect_err("should fail");
        assert!(matches!(err, InlineError::Retrieve { .. }), "{err}");
    }

    #[test]
    fn missing_pointer_is_unresolvable() {
        let mut resolver = resolver(retriever());
        let err = resolver.resolve("other.json#/Nope").expect_err("should fail");
        let InlineError::UnresolvablePointer { pointer, .. } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(pointer, "/Nope");
    }

    #[test]
    fn into_document_returns_referrer() {
        let resolver = resolver(MemoryRetriever::new());
        let doc = resolver
            .into_document("https://example.com/schemas/root.json")
            .expect("stored");
        assert_eq!(doc["definitions"]["A"]["type"], "integer");
    }
}
