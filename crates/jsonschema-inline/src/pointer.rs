use alloc::borrow::Cow;
use core::fmt;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde_json::Value;

/// Characters percent-encoded when writing a pointer token into a `$ref`
/// fragment.
///
/// Everything RFC 3986 disallows in a fragment, plus `%` and `#` so that a
/// token always decodes back to itself.
const FRAGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Identifies the document a [`RefPath`] points into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileId {
    /// The document being inlined.
    Root,
    /// An external document, by the local name the renamer gave it.
    Named(String),
}

impl FileId {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "<root>"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

/// A location inside one of the documents taking part in a run: the file,
/// followed by the map keys and stringified array indices leading to the node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefPath {
    pub file: FileId,
    pub segments: Vec<String>,
}

impl RefPath {
    pub fn new(file: FileId, segments: Vec<String>) -> Self {
        Self { file, segments }
    }

    /// The top of the root document.
    pub fn root() -> Self {
        Self::new(FileId::Root, Vec::new())
    }

    /// This path extended by one step.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self::new(self.file.clone(), segments)
    }
}

impl fmt::Display for RefPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#", self.file)?;
        for segment in &self.segments {
            write!(f, "/{}", escape_token(segment))?;
        }
        Ok(())
    }
}

/// Split a URI fragment into JSON Pointer tokens (RFC 6901).
///
/// The fragment is percent-decoded first. A leading `/` is optional, so the
/// plain-name fragment `foo` is treated like `/foo`. An empty fragment points
/// at the whole document and yields no tokens.
pub fn parse_fragment(fragment: &str) -> Vec<String> {
    let decoded = percent_decode_str(fragment).decode_utf8_lossy();
    let trimmed = decoded.trim_start_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').map(unescape_token).collect()
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn escape_token(token: &str) -> Cow<'_, str> {
    if token.contains(['~', '/']) {
        Cow::Owned(token.replace('~', "~0").replace('/', "~1"))
    } else {
        Cow::Borrowed(token)
    }
}

/// Build a `#/...` fragment from unescaped pointer tokens.
pub fn encode_fragment<'a>(tokens: impl IntoIterator<Item = &'a str>) -> String {
    let mut fragment = String::from("#");
    for token in tokens {
        fragment.push('/');
        fragment.extend(utf8_percent_encode(&escape_token(token), FRAGMENT_ENCODE_SET));
    }
    fragment
}

/// Follow `segments` from `document`, stepping into objects by key and into
/// arrays by decimal index.
pub fn traverse<'a>(document: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments.iter().try_fold(document, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    })
}

/// Mutable counterpart of [`traverse`].
pub fn traverse_mut<'a>(document: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    segments.iter().try_fold(document, |node, segment| match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?),
        _ => None,
    })
}

/// The `$ref` value that points at `target` once every external document has
/// been inlined under `definitions_key`.
///
/// Root locations keep their own pointer. External locations land in the
/// file's namespace, with the in-file path flattened to a single key.
pub fn rewrite_ref(target: &RefPath, definitions_key: &str) -> String {
    match &target.file {
        FileId::Root => encode_fragment(target.segments.iter().map(String::as_str)),
        FileId::Named(name) if target.segments.is_empty() => {
            encode_fragment([definitions_key, name.as_str()])
        }
        FileId::Named(name) => {
            let flattened = target.segments.join("/");
            encode_fragment([definitions_key, name.as_str(), flattened.as_str()])
        }
    }
}
