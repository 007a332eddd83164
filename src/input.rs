//! Input loading
//!
//! Detects the input kind, parses documents, and produces the schema roots
//! the model builder walks. Data-shaped inputs (json, yaml, dict, csv) are
//! first lowered to an inferred schema document; GraphQL SDL is lowered by
//! the graphql module. Directory inputs load every schema file beneath the
//! root in sorted order, one output module per file.

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;
use walkdir::WalkDir;

use crate::config::{GenerateConfig, GraphQlScope, InputKind, OpenApiScope};
use crate::error::{GeneratorError, Result};
use crate::graphql;
use crate::model::builder::SchemaRoot;
use crate::names::{to_pascal_case, to_snake_case};
use crate::reference::{parse_document, ReferenceTable, StandardFetcher};

/// HTTP methods in emission order
const METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// A generator input
#[derive(Debug, Clone)]
pub enum Input {
    /// A schema file or a directory of schema files
    Path(std::path::PathBuf),
    /// Raw document text with a synthetic name
    Text { name: String, text: String },
    /// An in-memory value (the dict input kind)
    Value { name: String, value: Value },
}

/// Everything the builder needs: the seeded reference table, the schema
/// roots in deterministic order, and the document-to-module mapping
pub struct DocumentSet {
    pub table: ReferenceTable,
    pub roots: Vec<SchemaRoot>,
    pub document_modules: HashMap<Url, String>,
}

/// Load an input into a document set
pub fn load(input: &Input, config: &GenerateConfig) -> Result<DocumentSet> {
    let timeout = config.fetch_timeout_secs.map(Duration::from_secs);
    let mut set = DocumentSet {
        table: ReferenceTable::new(
            Box::new(StandardFetcher::new()),
            config.ref_hop_limit,
            timeout,
        ),
        roots: Vec::new(),
        document_modules: HashMap::new(),
    };

    match input {
        Input::Path(path) if path.is_dir() => load_directory(path, config, &mut set)?,
        Input::Path(path) => {
            let text = std::fs::read_to_string(path)?;
            let uri = file_uri(path)?;
            let kind = effective_kind(config, path.extension().and_then(|e| e.to_str()), &text);
            load_document(&uri, &text, kind, stem(path), "", config, &mut set)?;
        }
        Input::Text { name, text } => {
            let uri = memory_uri(name)?;
            let kind = effective_kind(config, extension_of(name), text);
            load_document(&uri, text, kind, stem(Path::new(name)), "", config, &mut set)?;
        }
        Input::Value { name, value } => {
            let uri = memory_uri(name)?;
            let document = match config.input_kind {
                InputKind::JsonSchema | InputKind::OpenApi | InputKind::Auto => value.clone(),
                _ => infer_schema(value),
            };
            let kind = match config.input_kind {
                InputKind::Dict | InputKind::Json | InputKind::Yaml | InputKind::Csv => {
                    InputKind::JsonSchema
                }
                InputKind::Auto => sniff_value_kind(&document),
                other => other,
            };
            seed_and_scope(&uri, document, kind, &pascal_stem(name), "", config, &mut set)?;
        }
    }

    debug!(
        documents = set.document_modules.len().max(1),
        roots = set.roots.len(),
        "input loaded"
    );
    Ok(set)
}

/// Load every schema file under a directory, one module per file
fn load_directory(root: &Path, config: &GenerateConfig, set: &mut DocumentSet) -> Result<()> {
    let mut files: Vec<std::path::PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter(|entry| {
            matches!(
                entry.path().extension().and_then(|e| e.to_str()),
                Some("json") | Some("yaml") | Some("yml")
            )
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    for path in files {
        let text = std::fs::read_to_string(&path)?;
        let uri = file_uri(&path)?;
        let module = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .with_extension("")
            .to_string_lossy()
            .replace('\\', "/");
        let kind = effective_kind(config, path.extension().and_then(|e| e.to_str()), &text);
        load_document(&uri, &text, kind, stem(&path), &module, config, set)?;
    }
    Ok(())
}

fn load_document(
    uri: &Url,
    text: &str,
    kind: InputKind,
    name: String,
    module: &str,
    config: &GenerateConfig,
    set: &mut DocumentSet,
) -> Result<()> {
    let hint = to_pascal_case(&name);
    match kind {
        InputKind::GraphQl => {
            let (document, definitions) = graphql::schema_document(text)?;
            set.table.seed(uri.clone(), document);
            set.document_modules.insert(uri.clone(), module.to_string());
            if config.graphql_scopes.contains(&GraphQlScope::Schema) {
                for definition in definitions {
                    set.roots.push(SchemaRoot {
                        uri: uri.clone(),
                        pointer: format!("/$defs/{}", escape_pointer(&definition)),
                        name_hint: definition,
                        module_path: module.to_string(),
                    });
                }
            }
            Ok(())
        }
        InputKind::Csv => {
            let document = csv_schema(text, &hint)?;
            seed_and_scope(uri, document, InputKind::JsonSchema, &hint, module, config, set)
        }
        InputKind::Json | InputKind::Yaml | InputKind::Dict => {
            let data = parse_document(uri, text)?;
            let mut document = infer_schema(&data);
            if let Some(object) = document.as_object_mut() {
                object.insert("title".to_string(), json!(hint));
            }
            seed_and_scope(uri, document, InputKind::JsonSchema, &hint, module, config, set)
        }
        _ => {
            let document = parse_document(uri, text)?;
            seed_and_scope(uri, document, kind, &hint, module, config, set)
        }
    }
}

fn seed_and_scope(
    uri: &Url,
    document: Value,
    kind: InputKind,
    hint: &str,
    module: &str,
    config: &GenerateConfig,
    set: &mut DocumentSet,
) -> Result<()> {
    let kind = if kind == InputKind::Auto {
        sniff_value_kind(&document)
    } else {
        kind
    };
    set.table.seed(uri.clone(), document.clone());
    set.document_modules.insert(uri.clone(), module.to_string());
    match kind {
        InputKind::OpenApi => openapi_roots(uri, &document, module, config, set),
        _ => jsonschema_roots(uri, &document, hint, module, set),
    }
    Ok(())
}

// =============================================================================
// Kind detection
// =============================================================================

fn effective_kind(config: &GenerateConfig, extension: Option<&str>, text: &str) -> InputKind {
    if config.input_kind != InputKind::Auto {
        return config.input_kind;
    }
    match extension {
        Some("graphql") | Some("gql") => return InputKind::GraphQl,
        Some("csv") => return InputKind::Csv,
        _ => {}
    }
    sniff_text_kind(text)
}

/// Content sniffing for `auto`: JSON braces, an `openapi:` key, or
/// top-level GraphQL definition blocks
fn sniff_text_kind(text: &str) -> InputKind {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => sniff_value_kind(&value),
            Err(_) => InputKind::JsonSchema,
        };
    }
    let graphql_block =
        regex::Regex::new(r"(?m)^\s*(type|schema|enum|input|interface|union|scalar)\s")
            .expect("static pattern");
    if graphql_block.is_match(text) {
        return InputKind::GraphQl;
    }
    match serde_yaml::from_str::<Value>(text) {
        Ok(value) => sniff_value_kind(&value),
        Err(_) => InputKind::JsonSchema,
    }
}

fn sniff_value_kind(value: &Value) -> InputKind {
    match value.as_object() {
        Some(object) if object.contains_key("openapi") || object.contains_key("swagger") => {
            InputKind::OpenApi
        }
        _ => InputKind::JsonSchema,
    }
}

// =============================================================================
// JSON Schema roots
// =============================================================================

fn jsonschema_roots(uri: &Url, document: &Value, hint: &str, module: &str, set: &mut DocumentSet) {
    let title = document
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string);
    set.roots.push(SchemaRoot {
        uri: uri.clone(),
        pointer: String::new(),
        name_hint: title.unwrap_or_else(|| hint.to_string()),
        module_path: module.to_string(),
    });

    for keyword in ["definitions", "$defs"] {
        if let Some(definitions) = document.get(keyword).and_then(Value::as_object) {
            for name in definitions.keys() {
                set.roots.push(SchemaRoot {
                    uri: uri.clone(),
                    pointer: format!("/{keyword}/{}", escape_pointer(name)),
                    name_hint: name.clone(),
                    module_path: module.to_string(),
                });
            }
        }
    }
}

// =============================================================================
// OpenAPI roots
// =============================================================================

fn openapi_roots(
    uri: &Url,
    document: &Value,
    module: &str,
    config: &GenerateConfig,
    set: &mut DocumentSet,
) {
    if config.has_openapi_scope(OpenApiScope::Schemas) {
        for pointer in ["/components/schemas", "/definitions"] {
            if let Some(schemas) = document.pointer(pointer).and_then(Value::as_object) {
                for name in schemas.keys() {
                    set.roots.push(SchemaRoot {
                        uri: uri.clone(),
                        pointer: format!("{pointer}/{}", escape_pointer(name)),
                        name_hint: name.clone(),
                        module_path: module.to_string(),
                    });
                }
            }
        }
    }

    if config.has_openapi_scope(OpenApiScope::Parameters) {
        if let Some(parameters) = document.pointer("/components/parameters").and_then(Value::as_object)
        {
            for (name, parameter) in parameters {
                if parameter.get("schema").is_some() {
                    set.roots.push(SchemaRoot {
                        uri: uri.clone(),
                        pointer: format!("/components/parameters/{}/schema", escape_pointer(name)),
                        name_hint: to_pascal_case(name),
                        module_path: module.to_string(),
                    });
                }
            }
        }
    }

    if config.has_openapi_scope(OpenApiScope::RequestBodies) {
        if let Some(bodies) = document
            .pointer("/components/requestBodies")
            .and_then(Value::as_object)
        {
            for (name, body) in bodies {
                content_roots(
                    uri,
                    body,
                    &format!("/components/requestBodies/{}", escape_pointer(name)),
                    &to_pascal_case(name),
                    module,
                    set,
                );
            }
        }
    }

    if config.has_openapi_scope(OpenApiScope::Paths) {
        if let Some(paths) = document.get("paths").and_then(Value::as_object) {
            for (path, item) in paths {
                operation_roots(uri, path, item, "/paths", module, config, set);
            }
        }
    }

    if config.has_openapi_scope(OpenApiScope::Webhooks) {
        if let Some(webhooks) = document.get("webhooks").and_then(Value::as_object) {
            for (name, item) in webhooks {
                operation_roots(uri, name, item, "/webhooks", module, config, set);
            }
        }
    }
}

fn operation_roots(
    uri: &Url,
    path: &str,
    item: &Value,
    section: &str,
    module: &str,
    config: &GenerateConfig,
    set: &mut DocumentSet,
) {
    let item_pointer = format!("{section}/{}", escape_pointer(path));
    for method in METHODS {
        let Some(operation) = item.get(*method) else {
            continue;
        };
        let op_name = operation
            .get("operationId")
            .and_then(Value::as_str)
            .map(to_pascal_case)
            .unwrap_or_else(|| operation_name(path, method));

        // Tag-scoped operations group into a module named after the first tag
        let op_module = if config.has_openapi_scope(OpenApiScope::Tags) {
            operation
                .get("tags")
                .and_then(Value::as_array)
                .and_then(|tags| tags.first())
                .and_then(Value::as_str)
                .map(|tag| to_snake_case(tag))
                .unwrap_or_else(|| module.to_string())
        } else {
            module.to_string()
        };
        let op_pointer = format!("{item_pointer}/{method}");

        if let Some(parameters) = operation.get("parameters").and_then(Value::as_array) {
            for (index, parameter) in parameters.iter().enumerate() {
                if parameter.get("schema").map(is_named_schema) != Some(true) {
                    continue;
                }
                let parameter_name = parameter
                    .get("name")
                    .and_then(Value::as_str)
                    .map(to_pascal_case)
                    .unwrap_or_else(|| format!("Parameter{index}"));
                set.roots.push(SchemaRoot {
                    uri: uri.clone(),
                    pointer: format!("{op_pointer}/parameters/{index}/schema"),
                    name_hint: format!("{op_name}{parameter_name}"),
                    module_path: op_module.clone(),
                });
            }
        }

        if let Some(body) = operation.get("requestBody") {
            content_roots(
                uri,
                body,
                &format!("{op_pointer}/requestBody"),
                &format!("{op_name}Request"),
                &op_module,
                set,
            );
        }

        if let Some(responses) = operation.get("responses").and_then(Value::as_object) {
            for (code, response) in responses {
                let hint = if code.starts_with('2') || code == "default" {
                    format!("{op_name}Response")
                } else {
                    format!("{op_name}Response{code}")
                };
                content_roots(
                    uri,
                    response,
                    &format!("{op_pointer}/responses/{}", escape_pointer(code)),
                    &hint,
                    &op_module,
                    set,
                );
            }
        }
    }
}

/// Roots for each media type carrying a structural schema
fn content_roots(
    uri: &Url,
    carrier: &Value,
    pointer: &str,
    hint: &str,
    module: &str,
    set: &mut DocumentSet,
) {
    let Some(content) = carrier.get("content").and_then(Value::as_object) else {
        return;
    };
    for (media_type, media) in content {
        let Some(schema) = media.get("schema") else {
            continue;
        };
        if !is_named_schema(schema) {
            continue;
        }
        set.roots.push(SchemaRoot {
            uri: uri.clone(),
            pointer: format!("{pointer}/content/{}/schema", escape_pointer(media_type)),
            name_hint: hint.to_string(),
            module_path: module.to_string(),
        });
        // One model per carrier; further media types repeat the shape
        break;
    }
}

/// Whether a schema fragment warrants its own named model when reached
/// through an operation (plain scalars stay inline)
fn is_named_schema(schema: &Value) -> bool {
    let Some(object) = schema.as_object() else {
        return false;
    };
    object.contains_key("$ref")
        || object.contains_key("properties")
        || object.contains_key("enum")
        || object.contains_key("allOf")
        || object.contains_key("anyOf")
        || object.contains_key("oneOf")
        || object.get("type").and_then(Value::as_str) == Some("object")
        || object.get("type").and_then(Value::as_str) == Some("array")
}

fn operation_name(path: &str, method: &str) -> String {
    let mut name = String::new();
    for segment in path.split('/') {
        let cleaned = segment.trim_matches(|c| c == '{' || c == '}');
        if !cleaned.is_empty() {
            name.push_str(&to_pascal_case(cleaned));
        }
    }
    name.push_str(&to_pascal_case(method));
    name
}

// =============================================================================
// Schema inference
// =============================================================================

/// Infer a schema document from sample data
pub fn infer_schema(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "type": "null" }),
        Value::Bool(_) => json!({ "type": "boolean" }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "type": "integer" }),
        Value::Number(_) => json!({ "type": "number" }),
        Value::String(_) => json!({ "type": "string" }),
        Value::Array(items) => {
            let mut distinct: Vec<Value> = Vec::new();
            for item in items {
                let inferred = infer_schema(item);
                if !distinct.contains(&inferred) {
                    distinct.push(inferred);
                }
            }
            match distinct.len() {
                0 => json!({ "type": "array" }),
                1 => json!({ "type": "array", "items": distinct.remove(0) }),
                _ => json!({ "type": "array", "items": { "anyOf": distinct } }),
            }
        }
        Value::Object(object) => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for (key, item) in object {
                required.push(Value::String(key.clone()));
                properties.insert(key.clone(), infer_schema(item));
            }
            json!({
                "type": "object",
                "properties": Value::Object(properties),
                "required": Value::Array(required),
            })
        }
    }
}

/// Infer one object schema from CSV text: header row names the properties,
/// column values sniff the scalar type
pub fn csv_schema(text: &str, title: &str) -> Result<Value> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| GeneratorError::Input(format!("malformed CSV: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut kinds: Vec<ColumnKind> = vec![ColumnKind::Unknown; headers.len()];
    for record in reader.records() {
        let record = record.map_err(|e| GeneratorError::Input(format!("malformed CSV: {e}")))?;
        for (index, cell) in record.iter().enumerate() {
            if index < kinds.len() {
                kinds[index] = kinds[index].refine(cell);
            }
        }
    }

    let mut properties = Map::new();
    for (header, kind) in headers.iter().zip(&kinds) {
        properties.insert(header.clone(), json!({ "type": kind.type_name() }));
    }
    Ok(json!({
        "title": title,
        "type": "object",
        "properties": Value::Object(properties),
    }))
}

/// Column type lattice: unknown -> integer -> number -> string, with
/// boolean as a separate branch that widens to string on conflict
#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Unknown,
    Integer,
    Number,
    Boolean,
    String,
}

impl ColumnKind {
    fn refine(self, cell: &str) -> ColumnKind {
        if cell.is_empty() {
            return self;
        }
        let observed = if cell.parse::<i64>().is_ok() {
            ColumnKind::Integer
        } else if cell.parse::<f64>().is_ok() {
            ColumnKind::Number
        } else if cell == "true" || cell == "false" {
            ColumnKind::Boolean
        } else {
            ColumnKind::String
        };
        match (self, observed) {
            (ColumnKind::Unknown, next) => next,
            (current, next) if current == next => current,
            (ColumnKind::Integer, ColumnKind::Number) | (ColumnKind::Number, ColumnKind::Integer) => {
                ColumnKind::Number
            }
            _ => ColumnKind::String,
        }
    }

    fn type_name(self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Number => "number",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Unknown | ColumnKind::String => "string",
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn file_uri(path: &Path) -> Result<Url> {
    let absolute = std::fs::canonicalize(path)?;
    Url::from_file_path(&absolute)
        .map_err(|_| GeneratorError::Input(format!("cannot form file URI for {}", path.display())))
}

fn memory_uri(name: &str) -> Result<Url> {
    Url::parse(&format!("mem://input/{name}"))
        .map_err(|e| GeneratorError::Input(format!("invalid input name {name:?}: {e}")))
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("model")
        .to_string()
}

fn extension_of(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(_, extension)| extension)
}

fn pascal_stem(name: &str) -> String {
    to_pascal_case(&stem(Path::new(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_openapi() {
        let text = "openapi: 3.0.0\ninfo:\n  title: Petstore\n";
        assert_eq!(sniff_text_kind(text), InputKind::OpenApi);
    }

    #[test]
    fn test_sniff_json_schema() {
        let text = r#"{"type": "object", "properties": {}}"#;
        assert_eq!(sniff_text_kind(text), InputKind::JsonSchema);
    }

    #[test]
    fn test_sniff_graphql() {
        let text = "type Query {\n  hero: String\n}\n";
        assert_eq!(sniff_text_kind(text), InputKind::GraphQl);
    }

    #[test]
    fn test_infer_schema_object() {
        let inferred = infer_schema(&json!({"name": "x", "age": 3, "score": 1.5}));
        assert_eq!(inferred.pointer("/properties/name/type").unwrap(), "string");
        assert_eq!(inferred.pointer("/properties/age/type").unwrap(), "integer");
        assert_eq!(inferred.pointer("/properties/score/type").unwrap(), "number");
    }

    #[test]
    fn test_infer_heterogeneous_array() {
        let inferred = infer_schema(&json!([1, "two"]));
        assert!(inferred.pointer("/items/anyOf").is_some());
    }

    #[test]
    fn test_csv_schema_sniffs_columns() {
        let schema = csv_schema("name,age,score\nalice,3,1.5\nbob,4,2\n", "Row").unwrap();
        assert_eq!(schema.pointer("/properties/name/type").unwrap(), "string");
        assert_eq!(schema.pointer("/properties/age/type").unwrap(), "integer");
        assert_eq!(schema.pointer("/properties/score/type").unwrap(), "number");
    }

    #[test]
    fn test_operation_name() {
        assert_eq!(operation_name("/pets/{petId}", "get"), "PetsPetIdGet");
    }
}
