//! Model builder
//!
//! Walks resolved schema nodes and produces DataModels in the registry.
//! `$ref` targets materialize on demand, so reference expansion stays lazy
//! and cycles are handled by handing out the placeholder id that was bound
//! before descending (the `Visiting` guard).
//!
//! Two post-passes finish the stage: readOnly/writeOnly variant expansion
//! and root-wrapper collapsing.

use std::collections::HashMap;
use tracing::debug;
use url::Url;

use crate::config::{
    AllOfMergeMode, CollapseRootModelsNameStrategy, GenerateConfig, ReadOnlyWriteOnlyModelType,
};
use crate::datatype::{
    optionalize, AdditionalPolicy, DataType, DataTypeKind, Discriminator, EnumMember,
    NullableOrigin, PrimitiveKind,
};
use crate::diagnostics::Diagnostics;
use crate::error::{GeneratorError, Result};
use crate::model::{BuildState, Field, ModelId, ModelKind, ModelRegistry, RwVariant};
use crate::reference::{ReferenceTable, SchemaId};
use crate::resolve::{Additional, NodeKind, RawDiscriminator, ResolvedNode, Resolver};

/// A named entry point into the schema documents
#[derive(Debug, Clone)]
pub struct SchemaRoot {
    pub uri: Url,
    pub pointer: String,
    pub name_hint: String,
    pub module_path: String,
}

/// Builds the model registry from schema roots
pub struct ModelBuilder<'a> {
    table: &'a mut ReferenceTable,
    diagnostics: &'a mut Diagnostics,
    config: &'a GenerateConfig,
    registry: ModelRegistry,
    /// Document URI to output module mapping
    document_modules: HashMap<Url, String>,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(
        table: &'a mut ReferenceTable,
        diagnostics: &'a mut Diagnostics,
        config: &'a GenerateConfig,
        document_modules: HashMap<Url, String>,
    ) -> Self {
        Self {
            table,
            diagnostics,
            config,
            registry: ModelRegistry::new(),
            document_modules,
        }
    }

    /// Build every root, run the post-passes, and hand back the registry
    pub fn build_roots(mut self, roots: &[SchemaRoot]) -> Result<ModelRegistry> {
        for root in roots {
            let id = self.table.intern(&root.uri, &root.pointer);
            self.build_schema(id, &root.name_hint, &root.module_path, None)?;
        }
        self.expand_read_write_variants();
        self.collapse_root_models();
        debug!(models = self.registry.live_count(), "model building complete");
        Ok(self.registry)
    }

    /// Build (or revisit) the model for a schema fragment.
    ///
    /// The schema binds to a placeholder id (in `Visiting` state) before
    /// its node is walked, so re-entry during cycle traversal returns a
    /// reference to the placeholder instead of recursing forever.
    fn build_schema(
        &mut self,
        schema: SchemaId,
        name_hint: &str,
        module_path: &str,
        parent: Option<ModelId>,
    ) -> Result<ModelId> {
        if let Some(existing) = self.registry.model_for_schema(schema) {
            return Ok(existing);
        }

        let node = self.resolve(schema)?;
        let model_id = self
            .registry
            .allocate(node.source.clone(), module_path.to_string());
        self.registry.bind_schema(schema, model_id);
        self.registry.get_mut(model_id).parent = parent;

        self.populate(model_id, &node, name_hint, module_path)?;
        Ok(model_id)
    }

    fn resolve(&mut self, schema: SchemaId) -> Result<ResolvedNode> {
        let mut resolver = Resolver::new(self.table, self.diagnostics, self.config);
        resolver.resolve_id(schema)
    }

    // =========================================================================
    // Model population
    // =========================================================================

    fn populate(
        &mut self,
        model_id: ModelId,
        node: &ResolvedNode,
        name_hint: &str,
        module_path: &str,
    ) -> Result<()> {
        let name = self.provisional_name(node, name_hint);
        {
            let model = self.registry.get_mut(model_id);
            model.name = name;
            model.docstring = node.constraints.description.clone();
        }

        match &node.kind {
            NodeKind::Object {
                properties,
                required,
                additional,
                bases,
            } => {
                self.populate_class(
                    model_id,
                    node,
                    properties,
                    required,
                    additional,
                    bases,
                    module_path,
                )?;
            }
            NodeKind::Enum(values) => {
                let model = self.registry.get_mut(model_id);
                model.kind = ModelKind::Enum;
                model.members = values.iter().map(enum_member).collect();
            }
            NodeKind::Ref(target) => {
                let target_model = self.build_ref(*target)?;
                let inner = DataType::model_ref(target_model);
                self.set_wrapper(model_id, node, inner);
            }
            _ => {
                let key_hint = format!("{}Item", name_hint);
                let inner = self.materialize(node, model_id, &key_hint, module_path)?;
                self.set_wrapper(model_id, node, inner);
            }
        }
        self.registry.advance_state(model_id, BuildState::Built);
        Ok(())
    }

    /// Named scalar, array, mapping, union, and reference roots become
    /// root wrappers; a shapeless root stays a plain alias
    fn set_wrapper(&mut self, model_id: ModelId, node: &ResolvedNode, inner: DataType) {
        let model = self.registry.get_mut(model_id);
        model.kind = if matches!(node.kind, NodeKind::Any) {
            ModelKind::Alias
        } else {
            ModelKind::RootWrapper
        };
        model.fields.push(Field {
            name: "__root__".to_string(),
            wire_name: "__root__".to_string(),
            ty: inner,
            required: true,
            default: node.constraints.default.clone(),
            annotations: node.extras.clone().into_iter().collect(),
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn populate_class(
        &mut self,
        model_id: ModelId,
        node: &ResolvedNode,
        properties: &indexmap::IndexMap<String, ResolvedNode>,
        required: &[String],
        additional: &Additional,
        bases: &[SchemaId],
        module_path: &str,
    ) -> Result<()> {
        self.registry.get_mut(model_id).kind = ModelKind::Class;

        // Materialize base models regardless of merge mode; the mode only
        // decides whether they stay bases or their fields fold in
        let mut base_models = Vec::with_capacity(bases.len());
        for base in bases {
            base_models.push(self.build_ref(*base)?);
        }

        let mut fields: Vec<Field> = Vec::with_capacity(properties.len());
        for (wire_name, property) in properties {
            let is_required = required.iter().any(|name| name == wire_name);
            let field = self.build_field(model_id, wire_name, property, is_required, module_path)?;
            fields.push(field);
        }

        match self.config.all_of_merge_mode {
            AllOfMergeMode::NoMerge => {
                self.registry.get_mut(model_id).bases = base_models;
            }
            mode => {
                // Copy parent properties and constraints into the child.
                // Under `constraints` only validation keywords travel;
                // under `all` annotations come along too.
                for base in base_models {
                    let parent_fields = self.registry.get(base).fields.clone();
                    for parent_field in parent_fields {
                        match fields
                            .iter_mut()
                            .find(|field| field.wire_name == parent_field.wire_name)
                        {
                            Some(child_field) => {
                                let mut parent_constraints =
                                    parent_field.ty.constraints.clone();
                                if mode == AllOfMergeMode::Constraints {
                                    parent_constraints.default = None;
                                    parent_constraints.examples = Vec::new();
                                    parent_constraints.description = None;
                                }
                                child_field.ty.constraints = child_field
                                    .ty
                                    .constraints
                                    .merge(&parent_constraints, &node.source.fragment())?;
                                // A constraint-only child overlay keeps the
                                // parent's type
                                adopt_parent_kind(&mut child_field.ty, &parent_field.ty);
                            }
                            None => fields.push(parent_field),
                        }
                    }
                }
            }
        }

        let model = self.registry.get_mut(model_id);
        model.fields = fields;
        model.attributes.extra_forbid = matches!(additional, Additional::Forbid);
        Ok(())
    }

    fn build_field(
        &mut self,
        parent: ModelId,
        wire_name: &str,
        property: &ResolvedNode,
        required: bool,
        module_path: &str,
    ) -> Result<Field> {
        let key_hint = pascal_hint(wire_name);
        let mut ty = self.materialize(property, parent, &key_hint, module_path)?;

        if !required && !self.config.strict_nullable {
            ty = optionalize(ty, NullableOrigin::NotRequired);
        }

        Ok(Field {
            name: wire_name.to_string(),
            wire_name: wire_name.to_string(),
            ty,
            required,
            default: property.constraints.default.clone(),
            annotations: property.extras.clone().into_iter().collect(),
        })
    }

    /// Lower a resolved node to a DataType, creating nested models for
    /// anonymous objects, enums, and referenced fragments
    fn materialize(
        &mut self,
        node: &ResolvedNode,
        parent: ModelId,
        key_hint: &str,
        module_path: &str,
    ) -> Result<DataType> {
        let constraints = node.constraints.clone();
        let ty = match &node.kind {
            NodeKind::Any => DataType::any(),
            NodeKind::Primitive(kind) => DataType::primitive(*kind),
            NodeKind::Literal(value) => DataType::new(DataTypeKind::Literal(value.clone())),
            NodeKind::Enum(_) => {
                let nested = self.nested_model(node, parent, key_hint, module_path)?;
                DataType::model_ref(nested)
            }
            NodeKind::Array { items } => {
                let items = match items {
                    Some(items) => {
                        let item_hint = format!("{key_hint}Item");
                        self.materialize(items, parent, &item_hint, module_path)?
                    }
                    None => DataType::any(),
                };
                DataType::new(DataTypeKind::Array {
                    items: Box::new(items),
                })
            }
            NodeKind::Mapping { value } => {
                let value_hint = format!("{key_hint}Value");
                let value = self.materialize(value, parent, &value_hint, module_path)?;
                let policy = if matches!(value.kind, DataTypeKind::Primitive(PrimitiveKind::Any)) {
                    AdditionalPolicy::Allow
                } else {
                    AdditionalPolicy::Schema
                };
                DataType::new(DataTypeKind::Mapping {
                    key: Box::new(DataType::primitive(PrimitiveKind::Str)),
                    value: Box::new(value),
                    policy,
                })
            }
            NodeKind::Object {
                properties, bases, ..
            } => {
                if properties.is_empty() && bases.len() == 1 {
                    // A single-ref allOf in value position stays referential
                    let base = self.build_ref(bases[0])?;
                    DataType::model_ref(base)
                } else if properties.is_empty() && !bases.is_empty() {
                    // Multiple bases need a named type to hang them on
                    let nested = self.nested_model(node, parent, key_hint, module_path)?;
                    DataType::model_ref(nested)
                } else if properties.is_empty() {
                    // A bare object with no declared shape is an open map
                    DataType::new(DataTypeKind::Mapping {
                        key: Box::new(DataType::primitive(PrimitiveKind::Str)),
                        value: Box::new(DataType::any()),
                        policy: AdditionalPolicy::Allow,
                    })
                } else {
                    let nested = self.nested_model(node, parent, key_hint, module_path)?;
                    DataType::model_ref(nested)
                }
            }
            NodeKind::Union {
                variants,
                discriminator,
                mode,
            } => {
                let mut lowered = Vec::with_capacity(variants.len());
                for (index, variant) in variants.iter().enumerate() {
                    let variant_hint = format!("{key_hint}{}", index + 1);
                    lowered.push(self.materialize(variant, parent, &variant_hint, module_path)?);
                }
                let discriminator = match discriminator {
                    Some(raw) => Some(self.lower_discriminator(raw)?),
                    None => None,
                };
                DataType::new(DataTypeKind::Union {
                    variants: lowered,
                    discriminator,
                    mode: *mode,
                })
            }
            NodeKind::Ref(target) => {
                let target_model = self.build_ref(*target)?;
                DataType::model_ref(target_model)
            }
        };

        let mut ty = crate::datatype::constrain(ty, &constraints, &node.source.fragment())?;
        if let Some(origin) = node.nullable {
            ty = optionalize(ty, origin);
        }
        Ok(ty)
    }

    /// Create a nested model for an anonymous object or enum
    fn nested_model(
        &mut self,
        node: &ResolvedNode,
        parent: ModelId,
        key_hint: &str,
        module_path: &str,
    ) -> Result<ModelId> {
        let model_id = self
            .registry
            .allocate(node.source.clone(), module_path.to_string());
        self.registry.get_mut(model_id).parent = Some(parent);
        self.populate(model_id, node, key_hint, module_path)?;
        Ok(model_id)
    }

    /// Build the model behind a `$ref` target, deriving its name from the
    /// pointer tail and its module from the owning document
    fn build_ref(&mut self, target: SchemaId) -> Result<ModelId> {
        let (uri, pointer) = self
            .table
            .location(target)
            .map(|(u, p)| (u.clone(), p.to_string()))
            .ok_or_else(|| GeneratorError::Input(format!("unknown schema id {target}")))?;
        let name_hint = pointer_tail(&pointer);
        let module_path = self.module_for(&uri);
        self.build_schema(target, &name_hint, &module_path, None)
    }

    fn lower_discriminator(&mut self, raw: &RawDiscriminator) -> Result<Discriminator> {
        let mut mapping = Vec::with_capacity(raw.mapping.len());
        for (value, target) in &raw.mapping {
            let model = self.build_ref(*target)?;
            mapping.push((value.clone(), model));
        }
        Ok(Discriminator {
            field: raw.field.clone(),
            mapping,
        })
    }

    fn module_for(&self, uri: &Url) -> String {
        if let Some(module) = self.document_modules.get(uri) {
            return module.clone();
        }
        // Remote documents fall back to their file stem
        uri.path_segments()
            .and_then(|segments| segments.last())
            .map(|name| {
                name.trim_end_matches(".json")
                    .trim_end_matches(".yaml")
                    .trim_end_matches(".yml")
                    .to_string()
            })
            .unwrap_or_default()
    }

    fn provisional_name(&self, node: &ResolvedNode, name_hint: &str) -> String {
        if self.config.use_title_as_name {
            if let Some(title) = &node.title {
                let sanitized = title.split_whitespace().collect::<String>();
                if !sanitized.is_empty() {
                    return sanitized;
                }
            }
        }
        if !name_hint.is_empty() {
            return name_hint.to_string();
        }
        if let Some(title) = &node.title {
            return title.clone();
        }
        pointer_tail(&node.source.pointer)
    }

    // =========================================================================
    // readOnly / writeOnly expansion
    // =========================================================================

    /// Expand classes containing readOnly/writeOnly fields into request and
    /// response variants
    fn expand_read_write_variants(&mut self) {
        let Some(mode) = self.config.read_only_write_only_model_type else {
            return;
        };

        let affected: Vec<ModelId> = self
            .registry
            .iter_live()
            .filter(|model| {
                model.kind == ModelKind::Class
                    && model.fields.iter().any(|field| {
                        field.ty.constraints.read_only || field.ty.constraints.write_only
                    })
            })
            .map(|model| model.id)
            .collect();

        let mut remap = HashMap::new();
        for model_id in affected {
            let template = self.registry.get(model_id).clone();

            self.clone_variant(&template, RwVariant::Request);
            let response = self.clone_variant(&template, RwVariant::Response);

            match mode {
                ReadOnlyWriteOnlyModelType::All => {
                    self.registry.get_mut(model_id).attributes.rw_variant = Some(RwVariant::Base);
                }
                ReadOnlyWriteOnlyModelType::RequestResponse => {
                    // The base model disappears; existing references bind to
                    // the response shape
                    self.registry.get_mut(model_id).attributes.dead = true;
                    remap.insert(model_id, response);
                }
            }
        }
        if !remap.is_empty() {
            self.registry.rewrite_refs(&remap);
        }
    }

    fn clone_variant(&mut self, template: &crate::model::DataModel, variant: RwVariant) -> ModelId {
        let suffix = match variant {
            RwVariant::Base => "",
            RwVariant::Request => "Request",
            RwVariant::Response => "Response",
        };
        let id = self
            .registry
            .allocate(template.source.clone(), template.module_path.clone());
        let fields = template
            .fields
            .iter()
            .filter(|field| match variant {
                RwVariant::Base => true,
                // Server-set fields never travel in requests
                RwVariant::Request => !field.ty.constraints.read_only,
                RwVariant::Response => !field.ty.constraints.write_only,
            })
            .cloned()
            .collect();
        let model = self.registry.get_mut(id);
        model.name = format!("{}{}", template.name, suffix);
        model.kind = template.kind;
        model.fields = fields;
        model.bases = template.bases.clone();
        model.docstring = template.docstring.clone();
        model.attributes.extra_forbid = template.attributes.extra_forbid;
        model.attributes.rw_variant = Some(variant);
        model.parent = template.parent;
        model.state = BuildState::Built;
        id
    }

    // =========================================================================
    // Root-wrapper collapsing
    // =========================================================================

    /// Remove root wrappers whose payload is a single model reference
    /// (directly, or through an array), splicing the payload type into
    /// every referrer
    fn collapse_root_models(&mut self) {
        if !self.config.collapse_root_models {
            return;
        }

        let wrappers: Vec<ModelId> = self
            .registry
            .iter_live()
            .filter(|model| model.kind == ModelKind::RootWrapper)
            .map(|model| model.id)
            .collect();

        for wrapper_id in wrappers {
            let wrapper = self.registry.get(wrapper_id);
            let Some(inner) = wrapper.inner_type().cloned() else {
                continue;
            };
            let Some(target) = sole_model_ref(&inner) else {
                continue;
            };
            if target == wrapper_id {
                continue;
            }
            let wrapper_name = wrapper.name.clone();

            if self.config.collapse_name_strategy == CollapseRootModelsNameStrategy::Parent {
                self.registry.get_mut(target).name = wrapper_name;
            }
            self.registry.get_mut(wrapper_id).attributes.dead = true;

            let ids = self.registry.iter_live_ids();
            for id in ids {
                let model = self.registry.get_mut(id);
                for base in &mut model.bases {
                    if *base == wrapper_id {
                        *base = target;
                    }
                }
                for field in &mut model.fields {
                    field.ty.replace_model_ref(wrapper_id, &inner);
                }
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// When a child field carries constraints but no type of its own, the
/// merged field takes the parent's type. Optional wrappers peel on both
/// sides so requiredness is untouched.
fn adopt_parent_kind(child: &mut DataType, parent: &DataType) {
    let parent_kind = match &parent.kind {
        DataTypeKind::Optional { inner, .. } => &inner.kind,
        _ => &parent.kind,
    };
    match &mut child.kind {
        DataTypeKind::Optional { inner, .. } => {
            if matches!(inner.kind, DataTypeKind::Primitive(PrimitiveKind::Any)) {
                inner.kind = parent_kind.clone();
            }
        }
        other => {
            if matches!(other, DataTypeKind::Primitive(PrimitiveKind::Any)) {
                *other = parent_kind.clone();
            }
        }
    }
}

/// Last pointer segment, unescaped
fn pointer_tail(pointer: &str) -> String {
    pointer
        .rsplit('/')
        .next()
        .unwrap_or(pointer)
        .replace("~1", "/")
        .replace("~0", "~")
}

/// PascalCase hint for nested model names derived from a property key
fn pascal_hint(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = true;
    for c in key.chars() {
        if c == '_' || c == '-' || c == ' ' || c == '.' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Derive a member name for an enum value
fn enum_member(value: &serde_json::Value) -> EnumMember {
    use serde_json::Value;
    let kind = PrimitiveKind::of_value(value);
    let name = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_i64() => {
            let n = n.as_i64().unwrap_or_default();
            if n < 0 {
                format!("integer_minus_{}", -n)
            } else {
                format!("integer_{n}")
            }
        }
        Value::Number(n) => format!("number_{}", n.to_string().replace(['.', '-'], "_")),
        Value::Bool(b) => format!("boolean_{b}"),
        _ => "null".to_string(),
    };
    EnumMember {
        name,
        value: value.clone(),
        kind,
    }
}

/// The single model reference inside a wrapper payload, if the payload is
/// a reference or an array of one
fn sole_model_ref(ty: &DataType) -> Option<ModelId> {
    match &ty.kind {
        DataTypeKind::ModelRef(id) => Some(*id),
        DataTypeKind::Array { items } => match &items.kind {
            DataTypeKind::ModelRef(id) => Some(*id),
            _ => None,
        },
        DataTypeKind::Optional { inner, .. } => sole_model_ref(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_tail_unescapes() {
        assert_eq!(pointer_tail("/components/schemas/Pet"), "Pet");
        assert_eq!(pointer_tail("/definitions/a~1b"), "a/b");
    }

    #[test]
    fn test_pascal_hint() {
        assert_eq!(pascal_hint("home_address"), "HomeAddress");
        assert_eq!(pascal_hint("home-address"), "HomeAddress");
        assert_eq!(pascal_hint("address"), "Address");
    }

    #[test]
    fn test_enum_member_names() {
        assert_eq!(enum_member(&serde_json::json!("red")).name, "red");
        assert_eq!(enum_member(&serde_json::json!(1)).name, "integer_1");
        assert_eq!(enum_member(&serde_json::json!(-1)).name, "integer_minus_1");
        assert_eq!(enum_member(&serde_json::json!(true)).name, "boolean_true");
    }
}
