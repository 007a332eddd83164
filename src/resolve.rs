//! Schema resolver
//!
//! Transforms raw schema fragments into normalized nodes whose kind is
//! exactly one of the DataType kinds. Nullability forms collapse here,
//! allOf splits into reference bases and inline members, anyOf/oneOf become
//! unions, and `$ref` stays unexpanded so cycles remain representable.
//! Expansion happens on demand in the model builder.

use indexmap::IndexMap;
use serde_json::Value;
use url::Url;

use crate::config::{GenerateConfig, UnionMode};
use crate::datatype::{Constraints, NullableOrigin, PrimitiveKind};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::error::{GeneratorError, Result};
use crate::reference::{ReferenceTable, SchemaId};

// =============================================================================
// Source Paths
// =============================================================================

/// Where a normalized node came from, for diagnostics and naming
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SourcePath {
    pub uri: String,
    pub pointer: String,
}

impl SourcePath {
    pub fn new(uri: &Url, pointer: &str) -> Self {
        Self {
            uri: uri.to_string(),
            pointer: pointer.to_string(),
        }
    }

    /// The user-facing fragment form, e.g. `#/components/schemas/Pet`
    pub fn fragment(&self) -> String {
        format!("#{}", self.pointer)
    }

    pub fn child(&self, segment: &str) -> Self {
        Self {
            uri: self.uri.clone(),
            pointer: format!(
                "{}/{}",
                self.pointer,
                segment.replace('~', "~0").replace('/', "~1")
            ),
        }
    }
}

impl std::fmt::Display for SourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.uri, self.pointer)
    }
}

// =============================================================================
// Normalized Nodes
// =============================================================================

/// additionalProperties handling for an object node
#[derive(Debug, Clone, PartialEq)]
pub enum Additional {
    /// Key absent
    Default,
    /// `true`: open mapping of Any
    Allow,
    /// `false`: the carrying class forbids extra fields
    Forbid,
    /// An object schema: typed mapping values
    Schema(Box<ResolvedNode>),
}

/// Discriminator as read from the document; targets resolved to schema ids
#[derive(Debug, Clone, PartialEq)]
pub struct RawDiscriminator {
    pub field: String,
    /// Ordered (value, target schema) pairs
    pub mapping: Vec<(String, SchemaId)>,
}

/// Normalized node kind; one variant per DataType kind
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Any,
    Primitive(PrimitiveKind),
    Literal(Value),
    Enum(Vec<Value>),
    Array {
        items: Option<Box<ResolvedNode>>,
    },
    Object {
        properties: IndexMap<String, ResolvedNode>,
        required: Vec<String>,
        additional: Additional,
        /// allOf members that are pure `$ref`
        bases: Vec<SchemaId>,
    },
    Mapping {
        value: Box<ResolvedNode>,
    },
    Union {
        variants: Vec<ResolvedNode>,
        discriminator: Option<RawDiscriminator>,
        mode: UnionMode,
    },
    /// `$ref`, kept lazy
    Ref(SchemaId),
}

/// A normalized schema node
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub kind: NodeKind,
    pub constraints: Constraints,
    pub title: Option<String>,
    pub nullable: Option<NullableOrigin>,
    /// Schema keys captured for the `extras` pass-through option
    pub extras: std::collections::BTreeMap<String, Value>,
    pub source: SourcePath,
}

impl ResolvedNode {
    fn new(kind: NodeKind, source: SourcePath) -> Self {
        Self {
            kind,
            constraints: Constraints::default(),
            title: None,
            nullable: None,
            extras: std::collections::BTreeMap::new(),
            source,
        }
    }
}

impl ResolvedNode {
    /// Serialize the node back to its canonical schema form. Resolving the
    /// result yields an equal node, making resolution a fixed point.
    pub fn to_value(&self, table: &ReferenceTable) -> Value {
        let mut body = serde_json::Map::new();

        match &self.kind {
            NodeKind::Any => {}
            NodeKind::Primitive(kind) => {
                if let Some(type_name) = base_type_name(*kind) {
                    body.insert("type".to_string(), Value::String(type_name.to_string()));
                }
            }
            NodeKind::Literal(value) => {
                body.insert("const".to_string(), value.clone());
            }
            NodeKind::Enum(values) => {
                let mut members = values.clone();
                if self.nullable == Some(NullableOrigin::ExplicitNull) {
                    members.push(Value::Null);
                }
                body.insert("enum".to_string(), Value::Array(members));
            }
            NodeKind::Array { items } => {
                body.insert("type".to_string(), Value::String("array".to_string()));
                if let Some(items) = items {
                    body.insert("items".to_string(), items.to_value(table));
                }
            }
            NodeKind::Mapping { value } => {
                body.insert("type".to_string(), Value::String("object".to_string()));
                let additional = if matches!(value.kind, NodeKind::Any) {
                    Value::Bool(true)
                } else {
                    value.to_value(table)
                };
                body.insert("additionalProperties".to_string(), additional);
            }
            NodeKind::Object {
                properties,
                required,
                additional,
                bases,
            } => {
                let mut object = serde_json::Map::new();
                object.insert("type".to_string(), Value::String("object".to_string()));
                if !properties.is_empty() {
                    let mut rendered = serde_json::Map::new();
                    for (name, property) in properties {
                        rendered.insert(name.clone(), property.to_value(table));
                    }
                    object.insert("properties".to_string(), Value::Object(rendered));
                }
                if !required.is_empty() {
                    object.insert(
                        "required".to_string(),
                        Value::Array(required.iter().cloned().map(Value::String).collect()),
                    );
                }
                match additional {
                    Additional::Default => {}
                    Additional::Allow => {
                        object.insert("additionalProperties".to_string(), Value::Bool(true));
                    }
                    Additional::Forbid => {
                        object.insert("additionalProperties".to_string(), Value::Bool(false));
                    }
                    Additional::Schema(schema) => {
                        object.insert("additionalProperties".to_string(), schema.to_value(table));
                    }
                }

                if bases.is_empty() {
                    body = object;
                } else {
                    let mut members: Vec<Value> = bases
                        .iter()
                        .map(|base| json_ref(table, *base))
                        .collect();
                    members.push(Value::Object(object));
                    body.insert("allOf".to_string(), Value::Array(members));
                }
            }
            NodeKind::Union {
                variants,
                discriminator,
                mode,
            } => {
                let keyword = match mode {
                    UnionMode::Smart => "anyOf",
                    UnionMode::LeftToRight => "oneOf",
                };
                let rendered: Vec<Value> =
                    variants.iter().map(|variant| variant.to_value(table)).collect();
                body.insert(keyword.to_string(), Value::Array(rendered));
                if let Some(discriminator) = discriminator {
                    let mut mapping = serde_json::Map::new();
                    for (value, target) in &discriminator.mapping {
                        mapping.insert(value.clone(), json_ref(table, *target));
                    }
                    body.insert(
                        "discriminator".to_string(),
                        serde_json::json!({
                            "propertyName": discriminator.field,
                            "mapping": Value::Object(mapping),
                        }),
                    );
                }
            }
            NodeKind::Ref(target) => {
                body.insert("$ref".to_string(), ref_string(table, *target));
            }
        }

        write_constraints(&self.constraints, &mut body);
        if let Some(title) = &self.title {
            body.insert("title".to_string(), Value::String(title.clone()));
        }
        for (key, value) in &self.extras {
            body.insert(key.clone(), value.clone());
        }

        // Nullability re-emits in its originating form
        match self.nullable {
            Some(NullableOrigin::XNullable) => {
                body.insert("nullable".to_string(), Value::Bool(true));
                Value::Object(body)
            }
            Some(NullableOrigin::ExplicitNull) => match body.get("type").cloned() {
                Some(Value::String(type_name)) => {
                    body.insert(
                        "type".to_string(),
                        serde_json::json!([type_name, "null"]),
                    );
                    Value::Object(body)
                }
                _ => Value::Object(body),
            },
            Some(NullableOrigin::AnyOfWithNull) => serde_json::json!({
                "anyOf": [Value::Object(body), {"type": "null"}],
            }),
            _ => Value::Object(body),
        }
    }
}

fn base_type_name(kind: PrimitiveKind) -> Option<&'static str> {
    match kind {
        PrimitiveKind::Str
        | PrimitiveKind::Bytes
        | PrimitiveKind::Date
        | PrimitiveKind::DateTime
        | PrimitiveKind::Time
        | PrimitiveKind::Duration
        | PrimitiveKind::Uuid
        | PrimitiveKind::Url
        | PrimitiveKind::Email
        | PrimitiveKind::Decimal => Some("string"),
        PrimitiveKind::Int => Some("integer"),
        PrimitiveKind::Float => Some("number"),
        PrimitiveKind::Bool => Some("boolean"),
        PrimitiveKind::Any => None,
    }
}

fn ref_string(table: &ReferenceTable, target: SchemaId) -> Value {
    match table.location(target) {
        Some((uri, pointer)) => Value::String(format!("{uri}#{pointer}")),
        None => Value::String(String::new()),
    }
}

fn json_ref(table: &ReferenceTable, target: SchemaId) -> Value {
    let mut object = serde_json::Map::new();
    object.insert("$ref".to_string(), ref_string(table, target));
    Value::Object(object)
}

fn write_constraints(constraints: &Constraints, body: &mut serde_json::Map<String, Value>) {
    let entries: [(&str, Option<Value>); 13] = [
        ("pattern", constraints.pattern.clone().map(Value::String)),
        ("minLength", constraints.min_length.map(Value::from)),
        ("maxLength", constraints.max_length.map(Value::from)),
        ("minimum", constraints.minimum.map(number)),
        ("maximum", constraints.maximum.map(number)),
        (
            "exclusiveMinimum",
            constraints.exclusive_minimum.map(number),
        ),
        (
            "exclusiveMaximum",
            constraints.exclusive_maximum.map(number),
        ),
        ("multipleOf", constraints.multiple_of.map(number)),
        ("minItems", constraints.min_items.map(Value::from)),
        ("maxItems", constraints.max_items.map(Value::from)),
        ("format", constraints.format.clone().map(Value::String)),
        (
            "description",
            constraints.description.clone().map(Value::String),
        ),
        ("default", constraints.default.clone()),
    ];
    for (key, value) in entries {
        if let Some(value) = value {
            body.insert(key.to_string(), value);
        }
    }
    if constraints.unique_items {
        body.insert("uniqueItems".to_string(), Value::Bool(true));
    }
    if !constraints.examples.is_empty() {
        body.insert(
            "examples".to_string(),
            Value::Array(constraints.examples.clone()),
        );
    }
    if constraints.read_only {
        body.insert("readOnly".to_string(), Value::Bool(true));
    }
    if constraints.write_only {
        body.insert("writeOnly".to_string(), Value::Bool(true));
    }
    if constraints.deprecated {
        body.insert("deprecated".to_string(), Value::Bool(true));
    }
}

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Equality ignores the source path so re-resolving a normalized node's
/// canonical form compares equal (the round-trip fixed point).
impl PartialEq for ResolvedNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.constraints == other.constraints
            && self.title == other.title
            && self.nullable == other.nullable
            && self.extras == other.extras
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Walks raw fragments, producing normalized nodes
pub struct Resolver<'a> {
    table: &'a mut ReferenceTable,
    diagnostics: &'a mut Diagnostics,
    config: &'a GenerateConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(
        table: &'a mut ReferenceTable,
        diagnostics: &'a mut Diagnostics,
        config: &'a GenerateConfig,
    ) -> Self {
        Self {
            table,
            diagnostics,
            config,
        }
    }

    /// Resolve the fragment behind an interned schema id
    pub fn resolve_id(&mut self, id: SchemaId) -> Result<ResolvedNode> {
        let (uri, pointer) = self
            .table
            .location(id)
            .map(|(u, p)| (u.clone(), p.to_string()))
            .ok_or_else(|| GeneratorError::Input(format!("unknown schema id {id}")))?;
        let fragment = self.table.fragment(id)?;
        self.resolve_value(&uri, &pointer, &fragment)
    }

    /// Resolve a raw value at a known location
    pub fn resolve_value(
        &mut self,
        uri: &Url,
        pointer: &str,
        value: &Value,
    ) -> Result<ResolvedNode> {
        let source = SourcePath::new(uri, pointer);
        let object = match value {
            // JSON Schema boolean forms: `true` accepts anything, `false`
            // nothing a model could carry
            Value::Bool(_) => return Ok(ResolvedNode::new(NodeKind::Any, source)),
            Value::Object(object) => object,
            other => {
                return Err(GeneratorError::at(
                    &source.fragment(),
                    format!("expected schema object, found {}", value_kind(other)),
                ));
            }
        };

        let mut node = ResolvedNode::new(NodeKind::Any, source.clone());
        node.constraints = self.extract_constraints(object, &source);
        node.title = object
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);
        for key in &self.config.extras {
            if let Some(value) = object.get(key.as_str()) {
                node.extras.insert(key.clone(), value.clone());
            }
        }

        // OpenAPI 3.0 nullable / Swagger x-nullable
        if object.get("nullable").and_then(Value::as_bool) == Some(true)
            || object.get("x-nullable").and_then(Value::as_bool) == Some(true)
        {
            node.nullable = Some(NullableOrigin::XNullable);
        }

        // $ref replaces the node without expanding
        if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
            let mut base = uri.clone();
            base.set_fragment(None);
            let id = self.table.resolve_ref_str(&base, reference)?;
            node.kind = NodeKind::Ref(id);
            return Ok(node);
        }

        if let Some(constant) = object.get("const") {
            node.kind = NodeKind::Literal(constant.clone());
            return Ok(node);
        }

        if let Some(members) = object.get("enum").and_then(Value::as_array) {
            let mut values: Vec<Value> = Vec::with_capacity(members.len());
            for member in members {
                if member.is_null() {
                    node.nullable.get_or_insert(NullableOrigin::ExplicitNull);
                } else {
                    values.push(member.clone());
                }
            }
            node.kind = NodeKind::Enum(values);
            return Ok(node);
        }

        if let Some(members) = object.get("allOf").and_then(Value::as_array) {
            node.kind = self.resolve_all_of(uri, &source, object, members)?;
            return Ok(node);
        }

        for (keyword, mode) in [
            ("anyOf", UnionMode::Smart),
            ("oneOf", UnionMode::LeftToRight),
        ] {
            if let Some(members) = object.get(keyword).and_then(Value::as_array) {
                let resolved =
                    self.resolve_union(uri, &source, object, members, mode, &mut node.nullable)?;
                node.kind = resolved.kind;
                node.constraints = node.constraints.merge(&resolved.constraints, &source.fragment())?;
                if node.title.is_none() {
                    node.title = resolved.title;
                }
                if node.nullable.is_none() {
                    node.nullable = resolved.nullable;
                }
                return Ok(node);
            }
        }

        node.kind = self.resolve_typed(uri, &source, object, &mut node.nullable)?;
        Ok(node)
    }

    /// allOf: pure `$ref` members become bases, inline members merge into
    /// one object node
    fn resolve_all_of(
        &mut self,
        uri: &Url,
        source: &SourcePath,
        object: &serde_json::Map<String, Value>,
        members: &[Value],
    ) -> Result<NodeKind> {
        let mut merged = AllOfParts::default();

        for (index, member) in members.iter().enumerate() {
            let member_source = source.child("allOf").child(&index.to_string());
            if let Some(reference) = pure_ref(member) {
                let mut base = uri.clone();
                base.set_fragment(None);
                merged.bases.push(self.table.resolve_ref_str(&base, reference)?);
                continue;
            }
            let resolved = self.resolve_value(uri, &member_source.pointer, member)?;
            merged.fold(resolved)?;
        }

        // The carrying schema's own members merge last
        let own = self.resolve_typed(uri, source, object, &mut None)?;
        if !matches!(own, NodeKind::Any) {
            merged.fold(ResolvedNode::new(own, source.clone()))?;
        }

        Ok(NodeKind::Object {
            properties: merged.properties,
            required: merged.required,
            additional: merged.additional,
            bases: merged.bases,
        })
    }

    fn resolve_union(
        &mut self,
        uri: &Url,
        source: &SourcePath,
        object: &serde_json::Map<String, Value>,
        members: &[Value],
        mode: UnionMode,
        nullable: &mut Option<NullableOrigin>,
    ) -> Result<ResolvedNode> {
        let keyword = match mode {
            UnionMode::Smart => "anyOf",
            UnionMode::LeftToRight => "oneOf",
        };
        let mut variants = Vec::with_capacity(members.len());
        for (index, member) in members.iter().enumerate() {
            let member_source = source.child(keyword).child(&index.to_string());
            let resolved = self.resolve_value(uri, &member_source.pointer, member)?;
            // A literal null variant hoists to Optional
            if is_null_variant(&resolved) {
                nullable.get_or_insert(NullableOrigin::AnyOfWithNull);
                continue;
            }
            variants.push(resolved);
        }

        let discriminator = self.resolve_discriminator(uri, source, object, &variants)?;

        // A union with one remaining variant flattens to that variant,
        // keeping the variant's own constraints
        if variants.len() == 1 {
            return Ok(variants.into_iter().next().expect("one variant"));
        }
        Ok(ResolvedNode::new(
            NodeKind::Union {
                variants,
                discriminator,
                mode,
            },
            source.clone(),
        ))
    }

    /// Read a discriminator object. A discriminator without a mapping, or
    /// whose mapping misses entries for some referenced variants, demotes
    /// the union to non-discriminated with a warning.
    fn resolve_discriminator(
        &mut self,
        uri: &Url,
        source: &SourcePath,
        object: &serde_json::Map<String, Value>,
        variants: &[ResolvedNode],
    ) -> Result<Option<RawDiscriminator>> {
        let Some(discriminator) = object.get("discriminator").and_then(Value::as_object) else {
            return Ok(None);
        };
        let Some(field) = discriminator.get("propertyName").and_then(Value::as_str) else {
            return Ok(None);
        };
        let Some(raw_mapping) = discriminator.get("mapping").and_then(Value::as_object) else {
            return Ok(None);
        };

        let mut base = uri.clone();
        base.set_fragment(None);
        let mut mapping = Vec::with_capacity(raw_mapping.len());
        for (value, target) in raw_mapping {
            let Some(target) = target.as_str() else {
                continue;
            };
            match self.table.resolve_ref_str(&base, target) {
                Ok(id) => mapping.push((value.clone(), id)),
                Err(_) => {
                    self.diagnostics.unresolved_ref(&source.fragment(), target);
                    return Ok(None);
                }
            }
        }

        // Every referenced variant must appear in the mapping
        for variant in variants {
            if let NodeKind::Ref(id) = &variant.kind {
                if !mapping.iter().any(|(_, mapped)| mapped == id) {
                    self.diagnostics
                        .missing_discriminator_mapping(&source.fragment(), &variant.source.fragment());
                    return Ok(None);
                }
            }
        }

        Ok(Some(RawDiscriminator {
            field: field.to_string(),
            mapping,
        }))
    }

    /// Handle the `type`-driven forms
    fn resolve_typed(
        &mut self,
        uri: &Url,
        source: &SourcePath,
        object: &serde_json::Map<String, Value>,
        nullable: &mut Option<NullableOrigin>,
    ) -> Result<NodeKind> {
        let format = object.get("format").and_then(Value::as_str);

        let type_names: Vec<&str> = match object.get("type") {
            Some(Value::String(name)) => vec![name.as_str()],
            Some(Value::Array(names)) => {
                let mut kept = Vec::with_capacity(names.len());
                for name in names.iter().filter_map(Value::as_str) {
                    if name == "null" {
                        nullable.get_or_insert(NullableOrigin::ExplicitNull);
                    } else {
                        kept.push(name);
                    }
                }
                kept
            }
            _ => Vec::new(),
        };

        // Composite types become a smart union of primitives
        if type_names.len() > 1 {
            let variants = type_names
                .iter()
                .map(|name| {
                    let kind = self.primitive_kind(name, format, source);
                    ResolvedNode::new(NodeKind::Primitive(kind), source.clone())
                })
                .collect();
            return Ok(NodeKind::Union {
                variants,
                discriminator: None,
                mode: UnionMode::Smart,
            });
        }

        let type_name = type_names.first().copied();

        if type_name == Some("array") || object.contains_key("items") {
            return self.resolve_array(uri, source, object);
        }

        let has_properties = object
            .get("properties")
            .and_then(Value::as_object)
            .map(|p| !p.is_empty())
            .unwrap_or(false);

        if type_name == Some("object") || has_properties || object.contains_key("additionalProperties")
        {
            return self.resolve_object(uri, source, object);
        }

        match type_name {
            Some("null") => {
                nullable.get_or_insert(NullableOrigin::ExplicitNull);
                Ok(NodeKind::Any)
            }
            Some(name) => Ok(NodeKind::Primitive(self.primitive_kind(name, format, source))),
            None => Ok(NodeKind::Any),
        }
    }

    fn resolve_array(
        &mut self,
        uri: &Url,
        source: &SourcePath,
        object: &serde_json::Map<String, Value>,
    ) -> Result<NodeKind> {
        let items = match object.get("items") {
            Some(Value::Array(positional)) => {
                // Positional tuples widen to a union of the item types
                let mut variants = Vec::with_capacity(positional.len());
                for (index, member) in positional.iter().enumerate() {
                    let member_source = source.child("items").child(&index.to_string());
                    variants.push(self.resolve_value(uri, &member_source.pointer, member)?);
                }
                let union = ResolvedNode::new(
                    NodeKind::Union {
                        variants,
                        discriminator: None,
                        mode: UnionMode::Smart,
                    },
                    source.child("items"),
                );
                Some(Box::new(union))
            }
            Some(member) => {
                let member_source = source.child("items");
                Some(Box::new(self.resolve_value(
                    uri,
                    &member_source.pointer,
                    member,
                )?))
            }
            None => None,
        };
        Ok(NodeKind::Array { items })
    }

    fn resolve_object(
        &mut self,
        uri: &Url,
        source: &SourcePath,
        object: &serde_json::Map<String, Value>,
    ) -> Result<NodeKind> {
        let mut properties = IndexMap::new();
        if let Some(raw) = object.get("properties").and_then(Value::as_object) {
            for (name, value) in raw {
                let property_source = source.child("properties").child(name);
                let resolved = self.resolve_value(uri, &property_source.pointer, value)?;
                properties.insert(name.clone(), resolved);
            }
        }

        let required: Vec<String> = object
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let additional = match object.get("additionalProperties") {
            None => Additional::Default,
            Some(Value::Bool(true)) => Additional::Allow,
            Some(Value::Bool(false)) => Additional::Forbid,
            Some(schema) => {
                let schema_source = source.child("additionalProperties");
                Additional::Schema(Box::new(self.resolve_value(
                    uri,
                    &schema_source.pointer,
                    schema,
                )?))
            }
        };

        // An object with no declared properties and a typed or open
        // additionalProperties is a mapping, not a class
        if properties.is_empty() {
            match &additional {
                Additional::Schema(value) => {
                    return Ok(NodeKind::Mapping {
                        value: value.clone(),
                    });
                }
                Additional::Allow => {
                    return Ok(NodeKind::Mapping {
                        value: Box::new(ResolvedNode::new(
                            NodeKind::Any,
                            source.child("additionalProperties"),
                        )),
                    });
                }
                _ => {}
            }
        }

        Ok(NodeKind::Object {
            properties,
            required,
            additional,
            bases: Vec::new(),
        })
    }

    fn primitive_kind(
        &mut self,
        type_name: &str,
        format: Option<&str>,
        source: &SourcePath,
    ) -> PrimitiveKind {
        match PrimitiveKind::from_type_format(type_name, format) {
            Some(kind) => kind,
            None => match PrimitiveKind::from_type_format(type_name, None) {
                Some(base) => {
                    if let Some(format) = format {
                        self.diagnostics.push(
                            DiagnosticCode::UnknownFormat,
                            &source.fragment(),
                            format!("unrecognized format {format:?}, keeping {type_name}"),
                        );
                    }
                    base
                }
                None => {
                    self.diagnostics.push(
                        DiagnosticCode::SkippedFragment,
                        &source.fragment(),
                        format!("unrecognized type {type_name:?}"),
                    );
                    PrimitiveKind::Any
                }
            },
        }
    }

    fn extract_constraints(
        &mut self,
        object: &serde_json::Map<String, Value>,
        source: &SourcePath,
    ) -> Constraints {
        let mut constraints = Constraints {
            pattern: object
                .get("pattern")
                .and_then(Value::as_str)
                .map(str::to_string),
            min_length: object.get("minLength").and_then(Value::as_u64),
            max_length: object.get("maxLength").and_then(Value::as_u64),
            minimum: object.get("minimum").and_then(Value::as_f64),
            maximum: object.get("maximum").and_then(Value::as_f64),
            exclusive_minimum: object.get("exclusiveMinimum").and_then(Value::as_f64),
            exclusive_maximum: object.get("exclusiveMaximum").and_then(Value::as_f64),
            multiple_of: object.get("multipleOf").and_then(Value::as_f64),
            min_items: object.get("minItems").and_then(Value::as_u64),
            max_items: object.get("maxItems").and_then(Value::as_u64),
            unique_items: object.get("uniqueItems").and_then(Value::as_bool) == Some(true),
            format: object
                .get("format")
                .and_then(Value::as_str)
                .map(str::to_string),
            description: object
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            examples: object
                .get("examples")
                .and_then(Value::as_array)
                .cloned()
                .or_else(|| object.get("example").map(|e| vec![e.clone()]))
                .unwrap_or_default(),
            default: object.get("default").cloned(),
            read_only: object.get("readOnly").and_then(Value::as_bool) == Some(true),
            write_only: object.get("writeOnly").and_then(Value::as_bool) == Some(true),
            deprecated: object.get("deprecated").and_then(Value::as_bool) == Some(true),
        };

        // Draft 4 boolean exclusives modify the plain bounds
        if object.get("exclusiveMinimum") == Some(&Value::Bool(true)) {
            constraints.exclusive_minimum = constraints.minimum.take();
        }
        if object.get("exclusiveMaximum") == Some(&Value::Bool(true)) {
            constraints.exclusive_maximum = constraints.maximum.take();
        }

        if let Some(pattern) = &constraints.pattern {
            if regex::Regex::new(pattern).is_err() {
                self.diagnostics.push(
                    DiagnosticCode::InvalidPattern,
                    &source.fragment(),
                    format!("pattern {pattern:?} is not a valid regular expression"),
                );
            }
        }

        constraints
    }
}

/// Accumulator for allOf merging: reference bases plus one merged inline
/// object
#[derive(Default)]
struct AllOfParts {
    bases: Vec<SchemaId>,
    properties: IndexMap<String, ResolvedNode>,
    required: Vec<String>,
    additional: Additional,
}

impl AllOfParts {
    fn fold(&mut self, member: ResolvedNode) -> Result<()> {
        let source = member.source.clone();
        match member.kind {
            NodeKind::Object {
                properties,
                required,
                additional,
                bases,
            } => {
                self.bases.extend(bases);
                for (name, property) in properties {
                    match self.properties.get(&name) {
                        Some(existing) => {
                            // Tighter constraints win on overlap; a typed
                            // member replaces an untyped one
                            let merged = existing
                                .constraints
                                .merge(&property.constraints, &source.fragment())?;
                            let mut kept = if matches!(existing.kind, NodeKind::Any) {
                                property
                            } else {
                                existing.clone()
                            };
                            kept.constraints = merged;
                            self.properties.insert(name, kept);
                        }
                        None => {
                            self.properties.insert(name, property);
                        }
                    }
                }
                for name in required {
                    if !self.required.contains(&name) {
                        self.required.push(name);
                    }
                }
                if matches!(self.additional, Additional::Default) {
                    self.additional = additional;
                }
            }
            // Scalar members contribute nothing to an object shape
            _ => {}
        }
        Ok(())
    }
}

impl Default for Additional {
    fn default() -> Self {
        Additional::Default
    }
}

fn pure_ref(value: &Value) -> Option<&str> {
    let object = value.as_object()?;
    if object.len() == 1 {
        object.get("$ref")?.as_str()
    } else {
        None
    }
}

fn is_null_variant(node: &ResolvedNode) -> bool {
    matches!(node.kind, NodeKind::Any)
        && node.nullable == Some(NullableOrigin::ExplicitNull)
        && node.constraints.is_empty()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::StandardFetcher;
    use serde_json::json;

    fn resolve(value: Value) -> (ResolvedNode, Diagnostics) {
        let uri = Url::parse("mem://input/schema.json").unwrap();
        let mut table = ReferenceTable::new(Box::new(StandardFetcher::new()), 64, None);
        table.seed(uri.clone(), value.clone());
        let mut diagnostics = Diagnostics::new();
        let config = GenerateConfig::default();
        let node = {
            let mut resolver = Resolver::new(&mut table, &mut diagnostics, &config);
            resolver.resolve_value(&uri, "", &value).unwrap()
        };
        (node, diagnostics)
    }

    #[test]
    fn test_nullable_forms_collapse_identically() {
        let (array_form, _) = resolve(json!({"type": ["string", "null"]}));
        let (anyof_form, _) = resolve(json!({
            "anyOf": [{"type": "string"}, {"type": "null"}]
        }));
        let (flag_form, _) = resolve(json!({"type": "string", "nullable": true}));

        for node in [&array_form, &anyof_form, &flag_form] {
            assert_eq!(node.kind, NodeKind::Primitive(PrimitiveKind::Str));
            assert!(node.nullable.is_some());
        }
        assert_eq!(array_form.nullable, Some(NullableOrigin::ExplicitNull));
        assert_eq!(anyof_form.nullable, Some(NullableOrigin::AnyOfWithNull));
        assert_eq!(flag_form.nullable, Some(NullableOrigin::XNullable));
    }

    #[test]
    fn test_composite_type_becomes_smart_union() {
        let (node, _) = resolve(json!({"type": ["string", "integer"]}));
        match node.kind {
            NodeKind::Union { variants, mode, .. } => {
                assert_eq!(mode, UnionMode::Smart);
                assert_eq!(variants.len(), 2);
                assert_eq!(variants[0].kind, NodeKind::Primitive(PrimitiveKind::Str));
                assert_eq!(variants[1].kind, NodeKind::Primitive(PrimitiveKind::Int));
            }
            other => panic!("expected Union, got {other:?}"),
        }
    }

    #[test]
    fn test_all_of_splits_refs_and_inline() {
        let (node, _) = resolve(json!({
            "definitions": {"Base": {"type": "object", "properties": {"id": {"type": "integer"}}}},
            "allOf": [
                {"$ref": "#/definitions/Base"},
                {"properties": {"name": {"type": "string"}}, "required": ["name"]}
            ]
        }));
        match node.kind {
            NodeKind::Object {
                properties,
                required,
                bases,
                ..
            } => {
                assert_eq!(bases.len(), 1);
                assert_eq!(properties.len(), 1);
                assert!(properties.contains_key("name"));
                assert_eq!(required, vec!["name"]);
            }
            other => panic!("expected Object, got {other:?}"),
        }
    }

    #[test]
    fn test_mapping_from_additional_properties() {
        let (node, _) = resolve(json!({
            "type": "object",
            "additionalProperties": {"type": "integer"}
        }));
        match node.kind {
            NodeKind::Mapping { value } => {
                assert_eq!(value.kind, NodeKind::Primitive(PrimitiveKind::Int));
            }
            other => panic!("expected Mapping, got {other:?}"),
        }
    }

    #[test]
    fn test_additional_properties_false_marks_forbid() {
        let (node, _) = resolve(json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "additionalProperties": false
        }));
        match node.kind {
            NodeKind::Object { additional, .. } => {
                assert_eq!(additional, Additional::Forbid);
            }
            other => panic!("expected Object, got {other:?}"),
        }
    }

    #[test]
    fn test_discriminator_without_mapping_is_demoted() {
        let (node, _) = resolve(json!({
            "definitions": {
                "Cat": {"type": "object", "properties": {"kind": {"type": "string"}}},
                "Dog": {"type": "object", "properties": {"kind": {"type": "string"}}}
            },
            "oneOf": [
                {"$ref": "#/definitions/Cat"},
                {"$ref": "#/definitions/Dog"}
            ],
            "discriminator": {"propertyName": "kind"}
        }));
        match node.kind {
            NodeKind::Union {
                discriminator,
                mode,
                ..
            } => {
                assert!(discriminator.is_none());
                assert_eq!(mode, UnionMode::LeftToRight);
            }
            other => panic!("expected Union, got {other:?}"),
        }
    }

    #[test]
    fn test_incomplete_discriminator_mapping_warns() {
        let (node, diagnostics) = resolve(json!({
            "definitions": {
                "Cat": {"type": "object", "properties": {"kind": {"type": "string"}}},
                "Dog": {"type": "object", "properties": {"kind": {"type": "string"}}}
            },
            "oneOf": [
                {"$ref": "#/definitions/Cat"},
                {"$ref": "#/definitions/Dog"}
            ],
            "discriminator": {
                "propertyName": "kind",
                "mapping": {"cat": "#/definitions/Cat"}
            }
        }));
        match node.kind {
            NodeKind::Union { discriminator, .. } => assert!(discriminator.is_none()),
            other => panic!("expected Union, got {other:?}"),
        }
        assert_eq!(diagnostics.warnings().count(), 1);
    }

    #[test]
    fn test_draft4_exclusive_minimum() {
        let (node, _) = resolve(json!({
            "type": "integer",
            "minimum": 3,
            "exclusiveMinimum": true
        }));
        assert_eq!(node.constraints.exclusive_minimum, Some(3.0));
        assert_eq!(node.constraints.minimum, None);
    }

    #[test]
    fn test_unknown_format_warns_and_keeps_base() {
        let (node, diagnostics) = resolve(json!({"type": "string", "format": "hostname"}));
        assert_eq!(node.kind, NodeKind::Primitive(PrimitiveKind::Str));
        assert_eq!(diagnostics.warnings().count(), 1);
    }

    #[test]
    fn test_resolution_is_a_fixed_point() {
        let document = json!({
            "type": "object",
            "title": "Pet",
            "description": "a pet",
            "properties": {
                "id": {"type": "integer", "minimum": 1},
                "name": {"type": ["string", "null"]},
                "tags": {"type": "array", "items": {"type": "string"}, "uniqueItems": true},
                "status": {"enum": ["available", "sold"]},
                "owner": {"$ref": "#/definitions/Owner"},
                "nickname": {"anyOf": [{"type": "string"}, {"type": "null"}]}
            },
            "required": ["id", "name"],
            "definitions": {
                "Owner": {"type": "object", "properties": {"name": {"type": "string"}}}
            }
        });

        let uri = Url::parse("mem://input/schema.json").unwrap();
        let mut table = ReferenceTable::new(Box::new(StandardFetcher::new()), 64, None);
        table.seed(uri.clone(), document.clone());
        let mut diagnostics = Diagnostics::new();
        let config = GenerateConfig::default();

        let first = {
            let mut resolver = Resolver::new(&mut table, &mut diagnostics, &config);
            resolver.resolve_value(&uri, "", &document).unwrap()
        };
        let canonical = first.to_value(&table);
        let second = {
            let mut resolver = Resolver::new(&mut table, &mut diagnostics, &config);
            resolver.resolve_value(&uri, "", &canonical).unwrap()
        };
        assert_eq!(first, second);

        // And once more: the canonical form itself is stable
        let canonical_again = second.to_value(&table);
        assert_eq!(canonical, canonical_again);
    }
}
