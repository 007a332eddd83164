//! Deduplication engine
//!
//! Detects structurally identical models within the configured reuse scope
//! and rewires references to a single survivor. Equality is a fixed point
//! over the model graph: models are partitioned by a local signature first,
//! then classes refine until reference structure stabilizes, which handles
//! mutually recursive models without chasing hashes forever.
//!
//! This pass never errors and is idempotent.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::config::{GenerateConfig, ReuseScope};
use crate::datatype::{DataType, DataTypeKind};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::model::{ModelId, ModelRegistry};

/// Run dedup to a fixed point. Returns the number of models merged away.
pub fn deduplicate(
    registry: &mut ModelRegistry,
    config: &GenerateConfig,
    diagnostics: &mut Diagnostics,
) -> usize {
    let mut merged_total = 0;
    let mut moved_to_shared: BTreeSet<ModelId> = BTreeSet::new();

    // Merging can make previously distinct referrers identical, so repeat
    // until no group merges
    loop {
        let classes = structural_classes(registry);

        let mut groups: BTreeMap<(String, usize), Vec<ModelId>> = BTreeMap::new();
        for id in registry.iter_live_ids() {
            let model = registry.get(id);
            let scope_key = match config.reuse_scope {
                ReuseScope::Module => model.module_path.clone(),
                ReuseScope::Tree => String::new(),
            };
            groups
                .entry((scope_key, classes[&id]))
                .or_default()
                .push(id);
        }

        let mut remap: HashMap<ModelId, ModelId> = HashMap::new();
        for members in groups.values() {
            if members.len() < 2 {
                continue;
            }
            let survivor = *members
                .iter()
                .min_by_key(|id| {
                    let model = registry.get(**id);
                    (model.module_path.clone(), model.name.clone(), **id)
                })
                .expect("non-empty group");

            let survivor_module = registry.get(survivor).module_path.clone();
            for id in members {
                if *id == survivor {
                    continue;
                }
                if registry.get(*id).module_path != survivor_module {
                    moved_to_shared.insert(survivor);
                }
                diagnostics.push(
                    DiagnosticCode::DuplicateModelMerged,
                    &registry.get(*id).source.fragment(),
                    format!(
                        "model {} merged into {}",
                        registry.get(*id).name,
                        registry.get(survivor).name
                    ),
                );
                registry.get_mut(*id).attributes.dead = true;
                remap.insert(*id, survivor);
            }
        }

        if remap.is_empty() {
            break;
        }
        merged_total += remap.len();
        registry.rewrite_refs(&remap);
    }

    if config.reuse_scope == ReuseScope::Tree && !moved_to_shared.is_empty() {
        move_to_shared_module(registry, config, &moved_to_shared);
    }

    registry.advance_all(crate::model::BuildState::Deduped);
    debug!(merged = merged_total, "deduplication complete");
    merged_total
}

/// Survivors whose merged set spanned modules move to the shared module;
/// name uniqueness inside the shared module is restored with numeric
/// suffixes
fn move_to_shared_module(
    registry: &mut ModelRegistry,
    config: &GenerateConfig,
    survivors: &BTreeSet<ModelId>,
) {
    let mut taken: BTreeSet<String> = registry
        .iter_live()
        .filter(|model| model.module_path == config.shared_module_name)
        .map(|model| model.name.clone())
        .collect();

    for id in survivors {
        let model = registry.get_mut(*id);
        if model.module_path == config.shared_module_name {
            continue;
        }
        model.module_path = config.shared_module_name.clone();
        let mut name = model.name.clone();
        if !taken.insert(name.clone()) {
            let mut suffix = 1usize;
            loop {
                let numbered = format!("{name}{suffix}");
                if taken.insert(numbered.clone()) {
                    name = numbered;
                    break;
                }
                suffix += 1;
            }
            model.name = name;
        }
    }
}

// =============================================================================
// Structural classes
// =============================================================================

/// Partition live models into structural equivalence classes.
///
/// Round zero hashes each model with references erased; every following
/// round folds the referenced models' class indices into the signature.
/// Classes only ever split, so the refinement terminates within N rounds.
fn structural_classes(registry: &ModelRegistry) -> HashMap<ModelId, usize> {
    let ids = registry.iter_live_ids();
    let mut classes: HashMap<ModelId, usize> = ids.iter().map(|id| (*id, 0)).collect();

    loop {
        let mut signatures: BTreeMap<String, usize> = BTreeMap::new();
        let mut next: HashMap<ModelId, usize> = HashMap::with_capacity(ids.len());
        for id in &ids {
            let signature = model_signature(registry, *id, &classes);
            let fresh = signatures.len();
            let class = *signatures.entry(signature).or_insert(fresh);
            next.insert(*id, class);
        }
        if next == classes {
            return classes;
        }
        classes = next;
    }
}

fn model_signature(
    registry: &ModelRegistry,
    id: ModelId,
    classes: &HashMap<ModelId, usize>,
) -> String {
    let model = registry.get(id);
    let mut hasher = Sha256::new();

    hasher.update(format!("kind:{:?};", model.kind));
    hasher.update(format!(
        "doc:{};",
        model
            .docstring
            .as_deref()
            .map(normalize_whitespace)
            .unwrap_or_default()
    ));
    hasher.update(format!("extra_forbid:{};", model.attributes.extra_forbid));
    hasher.update(format!("rw:{:?};", model.attributes.rw_variant));

    for base in &model.bases {
        hasher.update(format!("base:{};", class_of(classes, *base)));
    }
    for member in &model.members {
        hasher.update(format!("member:{}={};", member.name, member.value));
    }
    for field in &model.fields {
        hasher.update(format!(
            "field:{}:{}:{}:{:?};",
            field.name, field.wire_name, field.required, field.default
        ));
        let mut type_sig = String::new();
        type_signature(&field.ty, classes, &mut type_sig);
        hasher.update(type_sig);
    }

    format!("{:x}", hasher.finalize())
}

fn class_of(classes: &HashMap<ModelId, usize>, id: ModelId) -> String {
    match classes.get(&id) {
        Some(class) => class.to_string(),
        // Dead models keep their id so stale references never alias
        None => format!("dead{id}"),
    }
}

fn type_signature(ty: &DataType, classes: &HashMap<ModelId, usize>, out: &mut String) {
    out.push_str(&serde_json::to_string(&ty.constraints).unwrap_or_default());
    match &ty.kind {
        DataTypeKind::Primitive(kind) => out.push_str(&format!("prim:{kind:?}")),
        DataTypeKind::Literal(value) => out.push_str(&format!("lit:{value}")),
        DataTypeKind::Enum(members) => {
            out.push_str("enum[");
            for member in members {
                out.push_str(&format!("{}={};", member.name, member.value));
            }
            out.push(']');
        }
        DataTypeKind::Array { items } => {
            out.push_str("array[");
            type_signature(items, classes, out);
            out.push(']');
        }
        DataTypeKind::Mapping { key, value, policy } => {
            out.push_str(&format!("map:{policy:?}["));
            type_signature(key, classes, out);
            out.push(',');
            type_signature(value, classes, out);
            out.push(']');
        }
        DataTypeKind::Union {
            variants,
            discriminator,
            mode,
        } => {
            out.push_str(&format!("union:{mode:?}["));
            for variant in variants {
                type_signature(variant, classes, out);
                out.push(';');
            }
            if let Some(discriminator) = discriminator {
                out.push_str(&format!("disc:{}", discriminator.field));
                for (value, target) in &discriminator.mapping {
                    out.push_str(&format!("{}->{};", value, class_of(classes, *target)));
                }
            }
            out.push(']');
        }
        DataTypeKind::Intersection { bases, merge_mode } => {
            out.push_str(&format!("intersect:{merge_mode:?}["));
            for base in bases {
                out.push_str(&class_of(classes, *base));
                out.push(';');
            }
            out.push(']');
        }
        DataTypeKind::ModelRef(id) => {
            out.push_str(&format!("ref:{}", class_of(classes, *id)));
        }
        DataTypeKind::RootWrapper(inner) => {
            out.push_str("root[");
            type_signature(inner, classes, out);
            out.push(']');
        }
        DataTypeKind::Optional { inner, .. } => {
            out.push_str("optional[");
            type_signature(inner, classes, out);
            out.push(']');
        }
        DataTypeKind::ForwardRef(name) => out.push_str(&format!("forward:{name}")),
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::PrimitiveKind;
    use crate::model::{Field, ModelKind};
    use crate::resolve::SourcePath;
    use std::collections::BTreeMap as Map;

    fn field(name: &str, ty: DataType) -> Field {
        Field {
            name: name.to_string(),
            wire_name: name.to_string(),
            ty,
            required: true,
            default: None,
            annotations: Map::new(),
        }
    }

    fn class_model(registry: &mut ModelRegistry, module: &str, name: &str) -> ModelId {
        let id = registry.allocate(SourcePath::default(), module);
        let model = registry.get_mut(id);
        model.name = name.to_string();
        model.kind = ModelKind::Class;
        model.fields = vec![field("street", DataType::primitive(PrimitiveKind::Str))];
        id
    }

    #[test]
    fn test_identical_models_merge_to_lexicographic_survivor() {
        let mut registry = ModelRegistry::new();
        let config = GenerateConfig {
            reuse_scope: ReuseScope::Tree,
            ..GenerateConfig::default()
        };
        let mut diagnostics = Diagnostics::new();

        let b = class_model(&mut registry, "beta", "Address");
        let a = class_model(&mut registry, "alpha", "Address");

        // A third model referencing both copies
        let user = registry.allocate(SourcePath::default(), "alpha");
        registry.get_mut(user).name = "User".to_string();
        registry.get_mut(user).kind = ModelKind::Class;
        registry.get_mut(user).fields = vec![
            field("home", DataType::model_ref(a)),
            field("work", DataType::model_ref(b)),
        ];

        let merged = deduplicate(&mut registry, &config, &mut diagnostics);
        assert_eq!(merged, 1);

        // Survivor is the lexicographically smaller (module, name); it moved
        // to the shared module
        assert!(!registry.get(a).attributes.dead);
        assert!(registry.get(b).attributes.dead);
        assert_eq!(registry.get(a).module_path, "shared");

        for field in &registry.get(user).fields {
            assert_eq!(field.ty.kind, DataTypeKind::ModelRef(a));
        }
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let mut registry = ModelRegistry::new();
        let config = GenerateConfig {
            reuse_scope: ReuseScope::Tree,
            ..GenerateConfig::default()
        };
        let mut diagnostics = Diagnostics::new();

        class_model(&mut registry, "alpha", "Address");
        class_model(&mut registry, "beta", "Address");

        let first = deduplicate(&mut registry, &config, &mut diagnostics);
        let second = deduplicate(&mut registry, &config, &mut diagnostics);
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[test]
    fn test_different_shapes_do_not_merge() {
        let mut registry = ModelRegistry::new();
        let config = GenerateConfig::default();
        let mut diagnostics = Diagnostics::new();

        let a = class_model(&mut registry, "alpha", "Address");
        let b = class_model(&mut registry, "alpha", "Location");
        registry
            .get_mut(b)
            .fields
            .push(field("zip", DataType::primitive(PrimitiveKind::Str)));

        let merged = deduplicate(&mut registry, &config, &mut diagnostics);
        assert_eq!(merged, 0);
        assert!(!registry.get(a).attributes.dead);
        assert!(!registry.get(b).attributes.dead);
    }
}
