//! Reference table
//!
//! Maps (URI, JSON pointer) pairs to interned schema ids, loading each
//! document at most once. The table is the only structure that spans
//! pipeline phases; it is populated monotonically and entries are never
//! rewritten after insertion. First-seen interning order is preserved so
//! downstream traversals stay deterministic.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::error::{GeneratorError, Result};

/// Opaque, comparable handle for one schema fragment. Assigned
/// monotonically; two references to the same fragment yield the same id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct SchemaId(pub(crate) u32);

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// A `$ref` occurrence. Once `resolved` is populated it is never changed.
#[derive(Debug, Clone)]
pub struct Reference {
    pub source_uri: Url,
    pub pointer: String,
    resolved: Option<SchemaId>,
}

impl Reference {
    pub fn new(source_uri: Url, pointer: impl Into<String>) -> Self {
        Self {
            source_uri,
            pointer: pointer.into(),
            resolved: None,
        }
    }

    pub fn resolved(&self) -> Option<SchemaId> {
        self.resolved
    }
}

// =============================================================================
// URI handling
// =============================================================================

/// Normalize a URI reference against an optional base.
///
/// The scheme and host are lowercased and `.`/`..` segments collapse; a
/// host-only URI gains its canonical trailing slash. Fragments are kept.
pub fn normalize_uri(reference: &str, base: Option<&Url>) -> Result<Url> {
    let parsed = match base {
        Some(base) => base.join(reference),
        None => Url::parse(reference),
    };
    parsed.map_err(|e| GeneratorError::Input(format!("invalid URI {reference:?}: {e}")))
}

/// Split a `$ref` string into its URI part and JSON pointer fragment
pub fn split_reference(reference: &str) -> (&str, &str) {
    match reference.split_once('#') {
        Some((uri, fragment)) => (uri, fragment),
        None => (reference, ""),
    }
}

/// Normalize a pointer fragment: empty or `/`-leading
fn normalize_pointer(fragment: &str) -> String {
    if fragment.is_empty() || fragment.starts_with('/') {
        fragment.to_string()
    } else {
        format!("/{fragment}")
    }
}

// =============================================================================
// Document fetching
// =============================================================================

/// Loads raw document text for a URI. The reference table parses and
/// memoizes; fetchers stay stateless.
pub trait DocumentFetcher {
    fn fetch(&self, uri: &Url, timeout: Option<Duration>) -> Result<String>;
}

/// Default fetcher: in-memory overlay first, then `file://` paths, then
/// HTTP(S) through a blocking client with per-request timeout.
pub struct StandardFetcher {
    client: reqwest::blocking::Client,
    overlay: HashMap<Url, String>,
}

impl StandardFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            overlay: HashMap::new(),
        }
    }

    /// Seed an in-memory document, e.g. the root input or a dict input
    pub fn with_document(mut self, uri: Url, text: impl Into<String>) -> Self {
        self.overlay.insert(uri, text.into());
        self
    }
}

impl Default for StandardFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentFetcher for StandardFetcher {
    fn fetch(&self, uri: &Url, timeout: Option<Duration>) -> Result<String> {
        if let Some(text) = self.overlay.get(uri) {
            return Ok(text.clone());
        }
        match uri.scheme() {
            "file" => {
                let path = uri.to_file_path().map_err(|_| GeneratorError::RefFetch {
                    uri: uri.to_string(),
                    cause: "not a local file path".to_string(),
                    timeout: false,
                })?;
                std::fs::read_to_string(&path).map_err(|e| GeneratorError::RefFetch {
                    uri: uri.to_string(),
                    cause: e.to_string(),
                    timeout: false,
                })
            }
            "http" | "https" => {
                let mut request = self.client.get(uri.clone());
                if let Some(timeout) = timeout {
                    request = request.timeout(timeout);
                }
                request
                    .send()
                    .and_then(|response| response.error_for_status())
                    .and_then(|response| response.text())
                    .map_err(|e| GeneratorError::RefFetch {
                        uri: uri.to_string(),
                        cause: e.to_string(),
                        timeout: e.is_timeout(),
                    })
            }
            other => Err(GeneratorError::RefFetch {
                uri: uri.to_string(),
                cause: format!("unsupported scheme {other:?}"),
                timeout: false,
            }),
        }
    }
}

/// Parse document text as JSON or YAML by sniffing the first non-whitespace
/// character
pub fn parse_document(uri: &Url, text: &str) -> Result<Value> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| {
            GeneratorError::Input(format!("{uri}: malformed JSON at line {}: {e}", e.line()))
        })
    } else {
        serde_yaml::from_str(text)
            .map_err(|e| GeneratorError::Input(format!("{uri}: malformed YAML: {e}")))
    }
}

// =============================================================================
// Reference Table
// =============================================================================

/// The reference table: memoized documents plus the id intern map
pub struct ReferenceTable {
    fetcher: Box<dyn DocumentFetcher>,
    documents: HashMap<Url, Value>,
    ids: IndexMap<(Url, String), SchemaId>,
    hop_limit: usize,
    timeout: Option<Duration>,
}

impl ReferenceTable {
    pub fn new(
        fetcher: Box<dyn DocumentFetcher>,
        hop_limit: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            fetcher,
            documents: HashMap::new(),
            ids: IndexMap::new(),
            hop_limit,
            timeout,
        }
    }

    /// Seed an already-parsed document. Entries are monotone: a second seed
    /// of the same URI is ignored.
    pub fn seed(&mut self, uri: Url, document: Value) {
        self.documents.entry(uri).or_insert(document);
    }

    /// Intern a (URI, pointer) pair. Pure and idempotent.
    pub fn intern(&mut self, uri: &Url, pointer: &str) -> SchemaId {
        let key = (uri.clone(), normalize_pointer(pointer));
        if let Some(id) = self.ids.get(&key) {
            return *id;
        }
        let id = SchemaId(self.ids.len() as u32);
        self.ids.insert(key, id);
        id
    }

    /// Locate an interned id
    pub fn location(&self, id: SchemaId) -> Option<(&Url, &str)> {
        self.ids
            .get_index(id.0 as usize)
            .map(|((uri, pointer), _)| (uri, pointer.as_str()))
    }

    /// Load a document once per URI; later calls hit the cache
    pub fn fetch(&mut self, uri: &Url) -> Result<&Value> {
        if !self.documents.contains_key(uri) {
            let text = self.fetcher.fetch(uri, self.timeout)?;
            let parsed = parse_document(uri, &text)?;
            self.documents.insert(uri.clone(), parsed);
        }
        Ok(&self.documents[uri])
    }

    /// Fetch the raw fragment behind an interned id
    pub fn fragment(&mut self, id: SchemaId) -> Result<Value> {
        let (uri, pointer) = self
            .location(id)
            .map(|(u, p)| (u.clone(), p.to_string()))
            .ok_or_else(|| GeneratorError::Input(format!("unknown schema id {id}")))?;
        let document = self.fetch(&uri)?;
        match document.pointer(&pointer) {
            Some(fragment) => Ok(fragment.clone()),
            None => Err(GeneratorError::at(
                &format!("{uri}#{pointer}"),
                "fragment does not exist",
            )),
        }
    }

    /// Resolve a `$ref`, following chained references up to the hop limit.
    /// The reference's `resolved` handle is populated exactly once.
    pub fn dereference(&mut self, reference: &mut Reference) -> Result<SchemaId> {
        if let Some(id) = reference.resolved {
            return Ok(id);
        }
        let id = self.resolve_chain(&reference.source_uri, &reference.pointer)?;
        reference.resolved = Some(id);
        Ok(id)
    }

    /// Resolve a raw `$ref` string relative to a base document URI
    pub fn resolve_ref_str(&mut self, base: &Url, reference: &str) -> Result<SchemaId> {
        let (uri_part, fragment) = split_reference(reference);
        let uri = if uri_part.is_empty() {
            base.clone()
        } else {
            let mut joined = normalize_uri(uri_part, Some(base))?;
            joined.set_fragment(None);
            joined
        };
        self.resolve_chain(&uri, fragment)
    }

    fn resolve_chain(&mut self, uri: &Url, fragment: &str) -> Result<SchemaId> {
        let mut uri = uri.clone();
        let mut pointer = normalize_pointer(fragment);
        for _ in 0..self.hop_limit {
            let fragment = {
                let document = self.fetch(&uri)?;
                document.pointer(&pointer).cloned()
            };
            let fragment = fragment.ok_or_else(|| {
                GeneratorError::at(&format!("{uri}#{pointer}"), "fragment does not exist")
            })?;
            // A pure {"$ref": ...} node is a chain link, not a schema
            match chained_ref(&fragment) {
                Some(next) => {
                    let (next_uri, next_fragment) = split_reference(next);
                    if !next_uri.is_empty() {
                        let mut joined = normalize_uri(next_uri, Some(&uri))?;
                        joined.set_fragment(None);
                        uri = joined;
                    }
                    pointer = normalize_pointer(next_fragment);
                }
                None => return Ok(self.intern(&uri.clone(), &pointer)),
            }
        }
        Err(GeneratorError::RefCycle {
            pointer,
            limit: self.hop_limit,
        })
    }

    /// All interned locations in first-seen order
    pub fn interned(&self) -> impl Iterator<Item = (SchemaId, &Url, &str)> {
        self.ids
            .iter()
            .map(|((uri, pointer), id)| (*id, uri, pointer.as_str()))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn chained_ref(fragment: &Value) -> Option<&str> {
    let object = fragment.as_object()?;
    if object.len() == 1 {
        object.get("$ref")?.as_str()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table_with(doc: Value) -> (ReferenceTable, Url) {
        let uri = Url::parse("mem://input/schema.json").unwrap();
        let fetcher = StandardFetcher::new();
        let mut table = ReferenceTable::new(Box::new(fetcher), 64, None);
        table.seed(uri.clone(), doc);
        (table, uri)
    }

    #[test]
    fn test_normalize_uri_lowercases_and_collapses() {
        let uri = normalize_uri("HTTP://Example.COM/a/./b/../c", None).unwrap();
        assert_eq!(uri.as_str(), "http://example.com/a/c");
    }

    #[test]
    fn test_intern_idempotent() {
        let (mut table, uri) = table_with(json!({}));
        let a = table.intern(&uri, "/definitions/Pet");
        let b = table.intern(&uri, "/definitions/Pet");
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_intern_order_is_first_seen() {
        let (mut table, uri) = table_with(json!({}));
        table.intern(&uri, "/b");
        table.intern(&uri, "/a");
        let pointers: Vec<&str> = table.interned().map(|(_, _, p)| p).collect();
        assert_eq!(pointers, vec!["/b", "/a"]);
    }

    #[test]
    fn test_chained_ref_resolution() {
        let (mut table, uri) = table_with(json!({
            "definitions": {
                "A": {"$ref": "#/definitions/B"},
                "B": {"type": "string"}
            }
        }));
        let id = table.resolve_ref_str(&uri, "#/definitions/A").unwrap();
        let (_, pointer) = table.location(id).map(|(u, p)| (u.clone(), p)).unwrap();
        assert_eq!(pointer, "/definitions/B");
    }

    #[test]
    fn test_ref_cycle_exceeds_hop_limit() {
        let (mut table, uri) = table_with(json!({
            "definitions": {
                "A": {"$ref": "#/definitions/B"},
                "B": {"$ref": "#/definitions/A"}
            }
        }));
        let result = table.resolve_ref_str(&uri, "#/definitions/A");
        assert!(matches!(result, Err(GeneratorError::RefCycle { .. })));
    }

    #[test]
    fn test_missing_fragment_errors() {
        let (mut table, uri) = table_with(json!({"definitions": {}}));
        let result = table.resolve_ref_str(&uri, "#/definitions/Missing");
        assert!(result.is_err());
    }

    #[test]
    fn test_dereference_resolves_once() {
        let (mut table, uri) = table_with(json!({
            "definitions": {"Pet": {"type": "object"}}
        }));
        let mut reference = Reference::new(uri, "/definitions/Pet");
        let first = table.dereference(&mut reference).unwrap();
        let second = table.dereference(&mut reference).unwrap();
        assert_eq!(first, second);
        assert_eq!(reference.resolved(), Some(first));
    }
}
