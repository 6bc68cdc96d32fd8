use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::REF_KEY;
use crate::error::InlineError;
use crate::pointer::RefPath;
use crate::renamer::RefRenamer;
use crate::resolver::{RefResolver, Retrieve};

/// Edges from the location of each `$ref` node to the location it targets,
/// in discovery order. Each source appears at most once.
pub type RefGraph = IndexMap<RefPath, RefPath>;

/// Discovers every `$ref` reachable from a node, following references into
/// the documents they resolve to.
pub struct GraphWalker<'a> {
    graph: &'a mut RefGraph,
    renamer: &'a mut RefRenamer,
}

impl<'a> GraphWalker<'a> {
    pub fn new(graph: &'a mut RefGraph, renamer: &'a mut RefRenamer) -> Self {
        Self { graph, renamer }
    }

    /// Walk `node`, which lives at `path`.
    ///
    /// A `$ref` node whose path is already in the graph has been walked
    /// before and is skipped entirely. Otherwise its target is resolved,
    /// recorded, and walked under the target's URL as the resolution scope.
    ///
    /// # Errors
    ///
    /// Propagates resolution failures; the scope stack is balanced regardless.
    pub fn walk<R: Retrieve>(
        &mut self,
        resolver: &mut RefResolver<R>,
        node: &Value,
        path: &RefPath,
    ) -> Result<(), InlineError> {
        match node {
            Value::Object(map) => {
                for (key, value) in map {
                    if key != REF_KEY {
                        self.walk(resolver, value, &path.child(key.as_str()))?;
                        continue;
                    }
                    if self.graph.contains_key(path) {
                        debug!(path = %path, reference = %value, "already visited");
                        return Ok(());
                    }
                    self.follow(resolver, value, path)?;
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.walk(resolver, item, &path.child(i.to_string()))?;
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
        }
        Ok(())
    }

    fn follow<R: Retrieve>(
        &mut self,
        resolver: &mut RefResolver<R>,
        reference: &Value,
        path: &RefPath,
    ) -> Result<(), InlineError> {
        let Value::String(reference) = reference else {
            return Err(InlineError::NonStringReference {
                path: path.to_string(),
            });
        };
        let (url, resolved) = resolver.resolve(reference)?;
        debug!(reference = %reference, url = %url, "resolved $ref");

        let target = self.renamer.parse_ref_url(&url);
        debug!(from = %path, to = %target, "recorded edge");
        self.graph.insert(path.clone(), target.clone());

        let mut scope = resolver.push_scope(url);
        self.walk::<R>(&mut scope, &resolved, &target)
    }
}
