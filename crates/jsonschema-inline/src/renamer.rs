use std::collections::HashSet;

use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use tracing::debug;
use url::Url;

use crate::pointer::{FileId, RefPath, parse_fragment};

/// Name used when a URL offers nothing better.
const FALLBACK_NAME: &str = "schema";

/// Assigns each external document a short local name, used as its namespace
/// under the merged definitions.
///
/// Names are unique across the run and never collide with a banned name
/// (typically the keys already present in the root's definitions). The same
/// base URI always maps to the same [`FileId`].
#[derive(Debug, Default)]
pub struct RefRenamer {
    renames: IndexMap<String, FileId>,
    names: HashSet<String>,
}

impl RefRenamer {
    pub fn new(renames: IndexMap<String, FileId>, banned: HashSet<String>) -> Self {
        let mut names = banned;
        names.extend(
            renames
                .values()
                .filter_map(FileId::name)
                .map(ToString::to_string),
        );
        Self { renames, names }
    }

    /// The file identifier for `base_uri`, assigning a new one on first sight.
    ///
    /// `base_uri` must not carry a fragment.
    pub fn rename(&mut self, base_uri: &Url) -> FileId {
        if let Some(existing) = self.renames.get(base_uri.as_str()) {
            return existing.clone();
        }
        let name = self.unique_name(&name_hint(base_uri));
        debug!(uri = %base_uri, name = %name, "assigned local name");
        self.names.insert(name.clone());
        let file = FileId::Named(name);
        self.renames.insert(base_uri.to_string(), file.clone());
        file
    }

    /// Split a resolved absolute URL into its file identifier and the pointer
    /// tokens of its fragment.
    pub fn parse_ref_url(&mut self, url: &Url) -> RefPath {
        let mut base = url.clone();
        base.set_fragment(None);
        let file = self.rename(&base);
        RefPath::new(file, parse_fragment(url.fragment().unwrap_or_default()))
    }

    /// Every `(base URI, file identifier)` pair known so far, in the order
    /// they were assigned.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileId)> {
        self.renames.iter().map(|(uri, file)| (uri.as_str(), file))
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }

    /// `hint`, or `hint-2`, `hint-3`, ... for the first one not yet taken.
    fn unique_name(&self, hint: &str) -> String {
        if !self.names.contains(hint) {
            return hint.to_string();
        }
        let mut n = 2u32;
        loop {
            let candidate = format!("{hint}-{n}");
            if !self.names.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Derive a readable name from a URL: the stem of its last path segment,
/// else its host, else a fixed fallback.
fn name_hint(url: &Url) -> String {
    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            let decoded: &str = &decoded;
            let stem = match decoded.rfind('.') {
                Some(pos) if pos > 0 => &decoded[..pos],
                _ => decoded,
            };
            sanitize(stem)
        })
        .filter(|name| !name.is_empty());
    from_path
        .or_else(|| url.host_str().map(sanitize).filter(|name| !name.is_empty()))
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// Keep `[A-Za-z0-9_-]`, replacing anything else with `_`.
fn sanitize(raw: &str) -> String {
    let name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.chars().all(|c| c == '_') {
        String::new()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("valid URL")
    }

    fn renamer(root: &str, banned: &[&str]) -> RefRenamer {
        let mut renames = IndexMap::new();
        renames.insert(url(root).to_string(), FileId::Root);
        RefRenamer::new(renames, banned.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn root_maps_to_sentinel() {
        let mut renamer = renamer("https://example.com/root.json", &[]);
        let path = renamer.parse_ref_url(&url("https://example.com/root.json#/definitions/A"));
        assert_eq!(path.file, FileId::Root);
        assert_eq!(path.segments, vec!["definitions", "A"]);
    }

    #[test]
    fn names_from_file_stem() {
        let mut renamer = renamer("https://example.com/root.json", &[]);
        let path = renamer.parse_ref_url(&url("https://example.com/other.json#/X"));
        assert_eq!(path.file, FileId::Named("other".into()));
        assert_eq!(path.segments, vec!["X"]);
    }

    #[test]
    fn same_url_same_name() {
        let mut renamer = renamer("https://example.com/root.json", &[]);
        let a = renamer.parse_ref_url(&url("https://example.com/other.json#/X"));
        let b = renamer.parse_ref_url(&url("https://example.com/other.json#/Y"));
        let c = renamer.parse_ref_url(&url("https://example.com/other.json"));
        assert_eq!(a.file, b.file);
        assert_eq!(a.file, c.file);
        assert!(c.segments.is_empty());
        assert_eq!(renamer.len(), 2);
    }

    #[test]
    fn avoids_banned_names() {
        let mut renamer = renamer("https://example.com/root.json", &["other", "other-2"]);
        let path = renamer.parse_ref_url(&url("https://example.com/other.json"));
        assert_eq!(path.file, FileId::Named("other-3".into()));
    }

    #[test]
    fn distinct_files_with_same_stem() {
        let mut renamer = renamer("https://example.com/root.json", &[]);
        let a = renamer.rename(&url("https://a.example.com/types.json"));
        let b = renamer.rename(&url("https://b.example.com/types.json"));
        assert_eq!(a, FileId::Named("types".into()));
        assert_eq!(b, FileId::Named("types-2".into()));
    }

    #[test]
    fn falls_back_to_host() {
        let mut renamer = renamer("https://example.com/root.json", &[]);
        let file = renamer.rename(&url("https://meta.json-schema.tools/"));
        assert_eq!(file, FileId::Named("meta_json-schema_tools".into()));
    }

    #[test]
    fn sanitizes_unusual_characters() {
        let mut renamer = renamer("https://example.com/root.json", &[]);
        let file = renamer.rename(&url("https://example.com/my%20schema.v1.json"));
        assert_eq!(file, FileId::Named("my_schema_v1".into()));
    }

    #[test]
    fn dotfile_keeps_its_name() {
        assert_eq!(name_hint(&url("file:///tmp/.schema")), "_schema");
    }

    #[test]
    fn fallback_name_without_path_or_host() {
        assert_eq!(name_hint(&url("urn:example")), FALLBACK_NAME);
    }

    #[test]
    fn iter_preserves_assignment_order() {
        let mut renamer = renamer("https://example.com/root.json", &[]);
        renamer.rename(&url("https://example.com/b.json"));
        renamer.rename(&url("https://example.com/a.json"));
        let names: Vec<String> = renamer.iter().map(|(_, file)| file.to_string()).collect();
        assert_eq!(names, vec!["<root>", "b", "a"]);
    }
}
