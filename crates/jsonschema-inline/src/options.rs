use schemars::JsonSchema;
use serde::Deserialize;

fn default_definitions_key() -> String {
    "definitions".to_string()
}

fn default_provenance_key() -> String {
    "$comment".to_string()
}

/// Settings for an inlining run.
///
/// Deserializable so tools can embed it in their own configuration files;
/// every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
#[schemars(title = "Inline Options")]
pub struct InlineOptions {
    /// Key in the schema root holding the merged definitions.
    ///
    /// Use `$defs` for draft 2019-09 and later. Existing entries under this
    /// key are kept, and external documents are never given one of their
    /// names.
    #[serde(default = "default_definitions_key")]
    pub definitions_key: String,

    /// Key written into each inlined namespace recording the base URI its
    /// content came from.
    #[serde(default = "default_provenance_key")]
    pub provenance_key: String,
}

impl Default for InlineOptions {
    fn default() -> Self {
        Self {
            definitions_key: default_definitions_key(),
            provenance_key: default_provenance_key(),
        }
    }
}

impl InlineOptions {
    #[must_use]
    pub fn with_definitions_key(mut self, key: impl Into<String>) -> Self {
        self.definitions_key = key.into();
        self
    }

    #[must_use]
    pub fn with_provenance_key(mut self, key: impl Into<String>) -> Self {
        self.provenance_key = key.into();
        self
    }
}
