//! Data models and the model registry
//!
//! The registry owns every DataModel; all other references are id lookups,
//! which keeps cyclic schemas legal in the graph. Models stay mutable
//! through building, naming, dedup, and ordering, then the registry freezes
//! before partitioning.

pub mod builder;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

use crate::datatype::{DataType, EnumMember};
use crate::reference::SchemaId;
use crate::resolve::SourcePath;

/// Opaque handle for a model in the registry
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ModelId(pub(crate) u32);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// What a model is emitted as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Class,
    Enum,
    Alias,
    RootWrapper,
}

/// readOnly/writeOnly expansion variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RwVariant {
    Base,
    Request,
    Response,
}

/// Per-model lifecycle; transitions are monotone. `Visiting` spans the
/// window between placeholder allocation and population, which is what
/// guards cycle traversal against re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Unvisited,
    Visiting,
    Built,
    Named,
    Deduped,
    Ordered,
    Emitted,
}

impl Default for BuildState {
    fn default() -> Self {
        BuildState::Unvisited
    }
}

/// One emitted field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Legal identifier in the target language
    pub name: String,
    /// Exact schema source name; emitted as an alias when it differs
    pub wire_name: String,
    pub ty: DataType,
    pub required: bool,
    pub default: Option<serde_json::Value>,
    /// Pass-through annotations from the `extras` option
    pub annotations: BTreeMap<String, serde_json::Value>,
}

impl Field {
    pub fn needs_alias(&self) -> bool {
        self.name != self.wire_name
    }
}

/// Class-level attributes the printer needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelAttributes {
    /// `additionalProperties: false` on the source object
    pub extra_forbid: bool,
    /// A field was rewritten to a forward reference; the target language
    /// may need an explicit update-refs call
    pub needs_update_refs: bool,
    /// readOnly/writeOnly expansion variant, if any
    pub rw_variant: Option<RwVariant>,
    /// Dedup tombstone; dead models never reach partitioning
    pub dead: bool,
}

/// An entity emitted as a named type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataModel {
    pub id: ModelId,
    pub name: String,
    pub kind: ModelKind,
    pub fields: Vec<Field>,
    /// Enum members, only populated when `kind` is `Enum`
    pub members: Vec<EnumMember>,
    pub bases: Vec<ModelId>,
    pub docstring: Option<String>,
    pub source: SourcePath,
    pub module_path: String,
    pub attributes: ModelAttributes,
    /// Immediate parent model for nested definitions; naming strategies use
    /// it for prefixes
    pub parent: Option<ModelId>,
    pub state: BuildState,
}

impl DataModel {
    /// The alias / root-wrapper payload, when the model has one
    pub fn inner_type(&self) -> Option<&DataType> {
        match self.kind {
            ModelKind::Alias | ModelKind::RootWrapper => {
                self.fields.first().map(|field| &field.ty)
            }
            _ => None,
        }
    }

    /// Model ids this model references directly (bases plus non-optional
    /// field types); the ordering phase builds edges from these
    pub fn direct_dependencies(&self) -> Vec<ModelId> {
        let mut out = self.bases.clone();
        for field in &self.fields {
            field.ty.direct_model_refs(&mut out);
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Every referenced model id, including optionals; import computation
    /// uses the full set
    pub fn all_dependencies(&self) -> Vec<ModelId> {
        let mut out = self.bases.clone();
        for field in &self.fields {
            field.ty.all_model_refs(&mut out);
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Owns all models; everything else refers to them by id
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<DataModel>,
    by_schema: HashMap<SchemaId, ModelId>,
    frozen: bool,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a placeholder model. The builder fills it in once the
    /// schema node is fully walked, which is what makes cycles legal.
    pub fn allocate(&mut self, source: SourcePath, module_path: impl Into<String>) -> ModelId {
        assert!(!self.frozen, "registry is frozen");
        let id = ModelId(self.models.len() as u32);
        self.models.push(DataModel {
            id,
            name: String::new(),
            kind: ModelKind::Alias,
            fields: Vec::new(),
            members: Vec::new(),
            bases: Vec::new(),
            docstring: None,
            source,
            module_path: module_path.into(),
            attributes: ModelAttributes::default(),
            parent: None,
            state: BuildState::Visiting,
        });
        id
    }

    /// Advance a model's lifecycle state. State is bookkeeping, not graph
    /// structure, so it stays writable after the registry freezes.
    pub fn advance_state(&mut self, id: ModelId, next: BuildState) {
        let model = &mut self.models[id.0 as usize];
        debug_assert!(model.state <= next, "build state must advance monotonically");
        model.state = next;
    }

    /// Advance every live model to `next`
    pub fn advance_all(&mut self, next: BuildState) {
        let ids: Vec<ModelId> = self.iter_live_ids();
        for id in ids {
            self.advance_state(id, next);
        }
    }

    pub fn get(&self, id: ModelId) -> &DataModel {
        &self.models[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ModelId) -> &mut DataModel {
        assert!(!self.frozen, "registry is frozen");
        &mut self.models[id.0 as usize]
    }

    /// Bind a schema id to its model; one model per fragment
    pub fn bind_schema(&mut self, schema: SchemaId, model: ModelId) {
        self.by_schema.insert(schema, model);
    }

    pub fn model_for_schema(&self, schema: SchemaId) -> Option<ModelId> {
        self.by_schema.get(&schema).copied()
    }

    /// Live models in id (creation) order
    pub fn iter_live(&self) -> impl Iterator<Item = &DataModel> {
        self.models.iter().filter(|model| !model.attributes.dead)
    }

    pub fn iter_live_ids(&self) -> Vec<ModelId> {
        self.iter_live().map(|model| model.id).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.iter_live().count()
    }

    /// Rewrite model references everywhere according to `remap`. Entries
    /// absent from the map stay untouched.
    pub fn rewrite_refs(&mut self, remap: &HashMap<ModelId, ModelId>) {
        assert!(!self.frozen, "registry is frozen");
        let mut lookup = |id: ModelId| *remap.get(&id).unwrap_or(&id);
        for model in &mut self.models {
            for base in &mut model.bases {
                *base = lookup(*base);
            }
            for field in &mut model.fields {
                field.ty.map_model_refs(&mut lookup);
            }
        }
        for target in self.by_schema.values_mut() {
            *target = lookup(*target);
        }
    }

    /// Freeze before partitioning; later mutation is a logic error
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::{DataType, DataTypeKind};

    fn registry_with_two() -> (ModelRegistry, ModelId, ModelId) {
        let mut registry = ModelRegistry::new();
        let a = registry.allocate(SourcePath::default(), "models");
        let b = registry.allocate(SourcePath::default(), "models");
        (registry, a, b)
    }

    #[test]
    fn test_allocate_assigns_monotonic_ids() {
        let (registry, a, b) = registry_with_two();
        assert!(a < b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_rewrite_refs_covers_fields_and_bases() {
        let (mut registry, a, b) = registry_with_two();
        {
            let model = registry.get_mut(a);
            model.bases.push(b);
            model.fields.push(Field {
                name: "other".to_string(),
                wire_name: "other".to_string(),
                ty: DataType::model_ref(b),
                required: true,
                default: None,
                annotations: BTreeMap::new(),
            });
        }
        let survivor = registry.allocate(SourcePath::default(), "models");
        let mut remap = HashMap::new();
        remap.insert(b, survivor);
        registry.rewrite_refs(&remap);

        let model = registry.get(a);
        assert_eq!(model.bases, vec![survivor]);
        assert_eq!(
            model.fields[0].ty.kind,
            DataTypeKind::ModelRef(survivor)
        );
    }

    #[test]
    fn test_direct_dependencies_skip_optionals() {
        let (mut registry, a, b) = registry_with_two();
        let optional = crate::datatype::optionalize(
            DataType::model_ref(b),
            crate::datatype::NullableOrigin::NotRequired,
        );
        registry.get_mut(a).fields.push(Field {
            name: "maybe".to_string(),
            wire_name: "maybe".to_string(),
            ty: optional,
            required: false,
            default: None,
            annotations: BTreeMap::new(),
        });
        assert!(registry.get(a).direct_dependencies().is_empty());
        assert_eq!(registry.get(a).all_dependencies(), vec![b]);
    }
}
