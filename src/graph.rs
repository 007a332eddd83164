//! Dependency graph and emission ordering
//!
//! Builds the model dependency graph (base-class edges plus non-optional
//! direct field references), breaks reference cycles by rewriting the
//! lexicographically later referrer's field type to a forward reference,
//! and produces a stable topological order. Ties always break on
//! `(module_path, name)`; a sort that still fails falls back to plain
//! lexicographic order so output stays deterministic.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::datatype::{DataType, DataTypeKind};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::model::{ModelId, ModelRegistry};

/// The finalized emission order
#[derive(Debug, Clone)]
pub struct EmissionOrder {
    pub order: Vec<ModelId>,
    /// Number of references rewritten to forward references
    pub forward_refs: usize,
}

/// Order the frozen model set for emission, recovering cycles with forward
/// references
pub fn order_models(registry: &mut ModelRegistry, diagnostics: &mut Diagnostics) -> EmissionOrder {
    let ids = registry.iter_live_ids();
    let sort_keys: HashMap<ModelId, (String, String)> = ids
        .iter()
        .map(|id| {
            let model = registry.get(*id);
            (*id, (model.module_path.clone(), model.name.clone()))
        })
        .collect();

    let forward_refs = break_cycles(registry, &ids, &sort_keys, diagnostics);

    // Edges run dependency -> dependent: a referenced model precedes its
    // referrer
    let references = reference_pairs(registry, &ids);
    let order = stable_toposort(&ids, &references, &sort_keys);
    registry.advance_all(crate::model::BuildState::Ordered);

    debug!(
        models = order.len(),
        forward_refs, "emission order computed"
    );
    EmissionOrder {
        order,
        forward_refs,
    }
}

/// (referrer, referenced) pairs from bases and non-optional field types
fn reference_pairs(registry: &ModelRegistry, ids: &[ModelId]) -> Vec<(ModelId, ModelId)> {
    let live: HashSet<ModelId> = ids.iter().copied().collect();
    let mut pairs = Vec::new();
    for id in ids {
        for dep in registry.get(*id).direct_dependencies() {
            if live.contains(&dep) {
                pairs.push((*id, dep));
            }
        }
    }
    pairs
}

/// Rewrite back-edges inside each strongly connected component.
///
/// Members sort by `(module_path, name)`; a reference from a later member
/// to an earlier one (and every self-reference) becomes a `ForwardRef`, so
/// the earliest member keeps plain references and the component flattens.
fn break_cycles(
    registry: &mut ModelRegistry,
    ids: &[ModelId],
    sort_keys: &HashMap<ModelId, (String, String)>,
    diagnostics: &mut Diagnostics,
) -> usize {
    let mut graph: DiGraph<ModelId, ()> = DiGraph::new();
    let mut nodes: HashMap<ModelId, NodeIndex> = HashMap::with_capacity(ids.len());
    for id in ids {
        nodes.insert(*id, graph.add_node(*id));
    }
    for (referrer, referenced) in reference_pairs(registry, ids) {
        graph.add_edge(nodes[&referrer], nodes[&referenced], ());
    }

    let mut rewritten = 0;
    for component in tarjan_scc(&graph) {
        let members: Vec<ModelId> = component.iter().map(|idx| graph[*idx]).collect();
        let member_set: HashSet<ModelId> = members.iter().copied().collect();
        let is_cycle = members.len() > 1
            || members
                .iter()
                .any(|id| registry.get(*id).direct_dependencies().contains(id));
        if !is_cycle {
            continue;
        }

        for referrer in &members {
            let targets: Vec<ModelId> = registry
                .get(*referrer)
                .direct_dependencies()
                .into_iter()
                .filter(|target| {
                    member_set.contains(target)
                        && (target == referrer || sort_keys[referrer] > sort_keys[target])
                })
                .collect();
            for target in targets {
                let name = registry.get(target).name.clone();
                let model = registry.get_mut(*referrer);
                let mut replaced = false;
                for field in &mut model.fields {
                    replaced |= forward_reference(&mut field.ty, target, &name);
                }
                if replaced {
                    model.attributes.needs_update_refs = true;
                    rewritten += 1;
                    diagnostics.push(
                        DiagnosticCode::CycleBroken,
                        &registry.get(*referrer).source.fragment(),
                        format!("reference to {name} rewritten to a forward reference"),
                    );
                }
            }
        }
    }
    rewritten
}

/// Replace non-optional occurrences of `ModelRef(target)` with a forward
/// reference. Optional occurrences never created an edge, so they stay.
fn forward_reference(ty: &mut DataType, target: ModelId, name: &str) -> bool {
    if ty.kind == DataTypeKind::ModelRef(target) {
        ty.kind = DataTypeKind::ForwardRef(name.to_string());
        return true;
    }
    match &mut ty.kind {
        DataTypeKind::Array { items } => forward_reference(items, target, name),
        DataTypeKind::Mapping { key, value, .. } => {
            forward_reference(key, target, name) | forward_reference(value, target, name)
        }
        DataTypeKind::Union { variants, .. } => {
            let mut replaced = false;
            for variant in variants {
                replaced |= forward_reference(variant, target, name);
            }
            replaced
        }
        DataTypeKind::RootWrapper(inner) => forward_reference(inner, target, name),
        _ => false,
    }
}

/// Kahn's algorithm with the ready set kept sorted by `(module_path,
/// name)`; on each step the lexicographically minimal ready node is
/// emitted. Falls back to lexicographic order if a cycle survives.
fn stable_toposort(
    ids: &[ModelId],
    references: &[(ModelId, ModelId)],
    sort_keys: &HashMap<ModelId, (String, String)>,
) -> Vec<ModelId> {
    let mut indegree: BTreeMap<ModelId, usize> = ids.iter().map(|id| (*id, 0)).collect();
    let mut dependents: HashMap<ModelId, Vec<ModelId>> = HashMap::new();
    let mut seen: HashSet<(ModelId, ModelId)> = HashSet::new();

    for (referrer, referenced) in references {
        if referrer == referenced || !seen.insert((*referenced, *referrer)) {
            continue;
        }
        *indegree.get_mut(referrer).expect("live referrer") += 1;
        dependents.entry(*referenced).or_default().push(*referrer);
    }

    let mut ready: BTreeSet<(&(String, String), ModelId)> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| (&sort_keys[id], *id))
        .collect();

    let mut order = Vec::with_capacity(ids.len());
    while let Some(entry) = ready.iter().next().copied() {
        ready.remove(&entry);
        let (_, id) = entry;
        order.push(id);
        if let Some(users) = dependents.get(&id) {
            for user in users.clone() {
                let degree = indegree.get_mut(&user).expect("live user");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert((&sort_keys[&user], user));
                }
            }
        }
    }

    if order.len() != ids.len() {
        // Impossible DAG; deterministic fallback
        let mut fallback = ids.to_vec();
        fallback.sort_by_key(|id| sort_keys[id].clone());
        return fallback;
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::model::{Field, ModelKind};
    use crate::resolve::SourcePath;
    use std::collections::BTreeMap;

    fn ref_field(name: &str, target: ModelId) -> Field {
        Field {
            name: name.to_string(),
            wire_name: name.to_string(),
            ty: DataType::model_ref(target),
            required: true,
            default: None,
            annotations: BTreeMap::new(),
        }
    }

    fn named_class(registry: &mut ModelRegistry, name: &str) -> ModelId {
        let id = registry.allocate(SourcePath::default(), "");
        let model = registry.get_mut(id);
        model.name = name.to_string();
        model.kind = ModelKind::Class;
        id
    }

    #[test]
    fn test_mutual_cycle_breaks_lexicographically() {
        let mut registry = ModelRegistry::new();
        let a = named_class(&mut registry, "A");
        let b = named_class(&mut registry, "B");
        registry.get_mut(a).fields.push(ref_field("b", b));
        registry.get_mut(b).fields.push(ref_field("a", a));

        let mut diagnostics = Diagnostics::new();
        let result = order_models(&mut registry, &mut diagnostics);

        // A.b keeps the direct reference; B.a becomes ForwardRef{A}
        assert_eq!(result.forward_refs, 1);
        assert_eq!(
            registry.get(a).fields[0].ty.kind,
            DataTypeKind::ModelRef(b)
        );
        assert_eq!(
            registry.get(b).fields[0].ty.kind,
            DataTypeKind::ForwardRef("A".to_string())
        );
        assert!(registry.get(b).attributes.needs_update_refs);
        assert!(!registry.get(a).attributes.needs_update_refs);

        // B carries no ordering constraint anymore, so it precedes A
        assert_eq!(result.order, vec![b, a]);
    }

    #[test]
    fn test_self_reference_becomes_forward_ref() {
        let mut registry = ModelRegistry::new();
        let node = named_class(&mut registry, "TreeNode");
        registry.get_mut(node).fields.push(ref_field("child", node));

        let mut diagnostics = Diagnostics::new();
        let result = order_models(&mut registry, &mut diagnostics);
        assert_eq!(result.forward_refs, 1);
        assert_eq!(
            registry.get(node).fields[0].ty.kind,
            DataTypeKind::ForwardRef("TreeNode".to_string())
        );
    }

    #[test]
    fn test_ready_ties_break_lexicographically() {
        let mut registry = ModelRegistry::new();
        let c = named_class(&mut registry, "Charlie");
        let a = named_class(&mut registry, "Alpha");
        let b = named_class(&mut registry, "Bravo");

        let mut diagnostics = Diagnostics::new();
        let result = order_models(&mut registry, &mut diagnostics);
        assert_eq!(result.order, vec![a, b, c]);
    }

    #[test]
    fn test_dependency_precedes_dependent() {
        let mut registry = ModelRegistry::new();
        let user = named_class(&mut registry, "Aaa");
        let address = named_class(&mut registry, "Zzz");
        registry.get_mut(user).fields.push(ref_field("address", address));

        let mut diagnostics = Diagnostics::new();
        let result = order_models(&mut registry, &mut diagnostics);
        assert_eq!(result.order, vec![address, user]);
    }
}
