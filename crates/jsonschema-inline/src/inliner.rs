use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, info};
use url::Url;

use crate::REF_KEY;
use crate::error::InlineError;
use crate::options::InlineOptions;
use crate::pointer::{FileId, RefPath, rewrite_ref, traverse, traverse_mut};
use crate::renamer::RefRenamer;
use crate::resolver::{RefResolver, Retrieve};
use crate::walker::{GraphWalker, RefGraph};

/// Flattens a schema and everything it references into one document.
///
/// A run has three stages, each consuming what the previous one produced:
///
/// 1. walk: discover every `$ref` reachable from the root, fetching external
///    documents and naming them;
/// 2. rewrite: point every discovered `$ref`, in the root and in each fetched
///    document, at its final location in the merged definitions;
/// 3. inline: copy the referenced parts of each external document into its
///    own namespace under the root's definitions.
///
/// The schema is moved in, edited in place, and moved back out by
/// [`inline`](Self::inline).
pub struct RefInliner<R> {
    base_uri: String,
    options: InlineOptions,
    graph: RefGraph,
    renamer: RefRenamer,
    resolver: RefResolver<R>,
}

impl<R: Retrieve> RefInliner<R> {
    /// # Errors
    ///
    /// Returns an error if `base_uri` is not an absolute URL.
    pub fn new(base_uri: &str, schema: Value, retriever: R) -> Result<Self, InlineError> {
        Self::with_options(base_uri, schema, retriever, InlineOptions::default())
    }

    /// # Errors
    ///
    /// Returns an error if `base_uri` is not an absolute URL.
    pub fn with_options(
        base_uri: &str,
        schema: Value,
        retriever: R,
        options: InlineOptions,
    ) -> Result<Self, InlineError> {
        let mut url = Url::parse(base_uri).map_err(|source| InlineError::InvalidBaseUri {
            uri: base_uri.to_string(),
            source,
        })?;
        url.set_fragment(None);
        let base_uri = url.to_string();

        let banned = existing_definitions(&schema, &options.definitions_key);
        let mut renames = IndexMap::new();
        renames.insert(base_uri.clone(), FileId::Root);

        Ok(Self {
            base_uri,
            options,
            graph: RefGraph::new(),
            renamer: RefRenamer::new(renames, banned),
            resolver: RefResolver::new(url, schema, retriever),
        })
    }

    /// Run all three stages and return the self-contained schema.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference cannot be resolved, or if there is
    /// external content to inline but the root (or its definitions) is not an
    /// object.
    #[tracing::instrument(skip_all, fields(base_uri = %self.base_uri))]
    pub fn inline(mut self) -> Result<Value, InlineError> {
        self.walk_schema()?;
        self.rewrite_refs()?;
        self.inline_defs()?;
        info!(
            files = self.renamer.len().saturating_sub(1),
            refs = self.graph.len(),
            "inlined external definitions"
        );

        let Self {
            base_uri, resolver, ..
        } = self;
        resolver
            .into_document(&base_uri)
            .ok_or_else(|| inconsistent(&base_uri, &RefPath::root()))
    }

    fn walk_schema(&mut self) -> Result<(), InlineError> {
        let root = self
            .resolver
            .document(&self.base_uri)
            .cloned()
            .ok_or_else(|| inconsistent(&self.base_uri, &RefPath::root()))?;
        GraphWalker::new(&mut self.graph, &mut self.renamer).walk(
            &mut self.resolver,
            &root,
            &RefPath::root(),
        )
    }

    fn rewrite_refs(&mut self) -> Result<(), InlineError> {
        for (base_uri, file) in self.renamer.iter() {
            debug!(file = %file, uri = base_uri, "rewriting refs");
            let document = self
                .resolver
                .document_mut(base_uri)
                .ok_or_else(|| inconsistent(base_uri, &RefPath::new(file.clone(), Vec::new())))?;

            for (source, target) in self.graph.iter().filter(|(source, _)| &source.file == file) {
                let node = traverse_mut(document, &source.segments)
                    .and_then(Value::as_object_mut)
                    .ok_or_else(|| inconsistent(base_uri, source))?;
                let rewritten = rewrite_ref(target, &self.options.definitions_key);
                debug!(path = %source, to = %rewritten, "rewrote $ref");
                node.insert(REF_KEY.to_string(), Value::String(rewritten));
            }
        }
        Ok(())
    }

    fn inline_defs(&mut self) -> Result<(), InlineError> {
        let mut namespaces = Vec::new();
        for (base_uri, file) in self.renamer.iter() {
            let FileId::Named(name) = file else {
                continue;
            };
            debug!(file = %name, uri = base_uri, "inlining definitions");
            let document = self
                .resolver
                .document(base_uri)
                .ok_or_else(|| inconsistent(base_uri, &RefPath::new(file.clone(), Vec::new())))?;

            let mut local = Map::new();
            local.insert(
                self.options.provenance_key.clone(),
                Value::String(base_uri.to_string()),
            );
            for target in self.graph.values().filter(|target| &target.file == file) {
                if target.segments.is_empty() {
                    let Value::Object(whole) = document else {
                        return Err(InlineError::DocumentNotObject {
                            uri: base_uri.to_string(),
                        });
                    };
                    local.extend(whole.iter().map(|(k, v)| (k.clone(), v.clone())));
                    continue;
                }
                let key = target.segments.join("/");
                let value = traverse(document, &target.segments)
                    .ok_or_else(|| inconsistent(base_uri, target))?;
                debug!(file = %name, key = %key, "inlined definition");
                local.insert(key, value.clone());
            }
            namespaces.push((name.clone(), Value::Object(local)));
        }

        let root = self
            .resolver
            .document_mut(&self.base_uri)
            .ok_or_else(|| inconsistent(&self.base_uri, &RefPath::root()))?;
        let Value::Object(root) = root else {
            return if namespaces.is_empty() {
                Ok(())
            } else {
                Err(InlineError::RootNotObject)
            };
        };
        let definitions = root
            .entry(self.options.definitions_key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(definitions) = definitions else {
            return if namespaces.is_empty() {
                Ok(())
            } else {
                Err(InlineError::DefinitionsNotObject {
                    key: self.options.definitions_key.clone(),
                })
            };
        };
        definitions.extend(namespaces);
        Ok(())
    }
}

/// Keys of the root's existing definitions; empty when there are none or
/// they are not an object.
fn existing_definitions(schema: &Value, definitions_key: &str) -> HashSet<String> {
    schema
        .get(definitions_key)
        .and_then(Value::as_object)
        .map(|defs| defs.keys().cloned().collect())
        .unwrap_or_default()
}

fn inconsistent(uri: &str, path: &RefPath) -> InlineError {
    InlineError::Inconsistent {
        uri: uri.to_string(),
        path: path.to_string(),
    }
}
