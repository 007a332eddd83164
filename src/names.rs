//! Name resolution pass
//!
//! Assigns final identifiers across the model graph: sanitization, keyword
//! escaping, model-name collision handling under the configured strategy,
//! and field-vs-type collision handling. Wire names are never touched; a
//! field whose name diverges from its wire name surfaces as an alias.
//!
//! This pass runs after model building and before deduplication. It always
//! recovers; unresolvable collisions only exist at export time.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{FieldTypeCollisionStrategy, GenerateConfig, NamingStrategy};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::model::{ModelId, ModelKind, ModelRegistry};

/// Reserved words of the target language family
const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

/// Pointer segments that carry structure, not names
const STRUCTURAL_SEGMENTS: &[&str] = &[
    "properties",
    "items",
    "definitions",
    "$defs",
    "components",
    "schemas",
    "allOf",
    "anyOf",
    "oneOf",
    "additionalProperties",
];

// =============================================================================
// Identifier sanitization
// =============================================================================

/// Replace characters outside `[A-Za-z0-9_]`, escape keywords with a
/// trailing underscore, and prefix identifiers that start with a digit.
/// Deterministic and idempotent.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        out.push('_');
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out = format!("field_{out}");
    }
    if KEYWORDS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

/// Sanitize a type name; empty names fall back to `Model`
pub fn sanitize_type_name(raw: &str) -> String {
    let out = sanitize_identifier(raw);
    if out.chars().all(|c| c == '_') {
        "Model".to_string()
    } else {
        out
    }
}

/// Convert to snake_case, inserting breaks at case boundaries
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '-' || c == ' ' || c == '.' {
            out.push('_');
            prev_lower = false;
        } else if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}

/// Convert to PascalCase, splitting on separators
pub fn to_pascal_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = true;
    for c in name.chars() {
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

// =============================================================================
// Name resolution pass
// =============================================================================

/// Apply the naming strategy across the registry. After this pass
/// `(module_path, name)` is globally unique among live models.
pub fn resolve_names(
    registry: &mut ModelRegistry,
    config: &GenerateConfig,
    diagnostics: &mut Diagnostics,
) {
    let ids = registry.iter_live_ids();

    // Sanitize every provisional model name first so collision groups are
    // computed over final character sets
    for id in &ids {
        let model = registry.get_mut(*id);
        model.name = sanitize_type_name(&model.name);
    }

    resolve_model_collisions(registry, config, diagnostics, &ids);
    resolve_field_names(registry, config, &ids);
    resolve_field_type_collisions(registry, config, diagnostics, &ids);
    registry.advance_all(crate::model::BuildState::Named);
}

fn resolve_model_collisions(
    registry: &mut ModelRegistry,
    config: &GenerateConfig,
    diagnostics: &mut Diagnostics,
    ids: &[ModelId],
) {
    // (module, name) -> models in discovery order
    let mut groups: BTreeMap<(String, String), Vec<ModelId>> = BTreeMap::new();
    for id in ids {
        let model = registry.get(*id);
        groups
            .entry((model.module_path.clone(), model.name.clone()))
            .or_default()
            .push(*id);
    }

    let mut taken: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (module, name) in groups.keys() {
        taken.entry(module.clone()).or_default().insert(name.clone());
    }

    for ((module, name), members) in &groups {
        if members.len() < 2 {
            continue;
        }
        let taken = taken.entry(module.clone()).or_default();
        // The group's own name is reassigned below
        taken.remove(name);

        let ordered = strategy_order(registry, config.naming_strategy, members);
        for id in ordered {
            let candidate = strategy_candidate(registry, config.naming_strategy, id, name);
            let unique = claim(taken, &candidate);
            if unique != *name {
                diagnostics.push(
                    DiagnosticCode::RenamedIdentifier,
                    &registry.get(id).source.fragment(),
                    format!("model {name} renamed to {unique}"),
                );
            }
            registry.get_mut(id).name = unique;
        }
    }
}

/// Discovery order for most strategies; primary-first puts the shortest
/// schema path in front
fn strategy_order(
    registry: &ModelRegistry,
    strategy: NamingStrategy,
    members: &[ModelId],
) -> Vec<ModelId> {
    let mut ordered = members.to_vec();
    if strategy == NamingStrategy::PrimaryFirst {
        ordered.sort_by_key(|id| {
            let model = registry.get(*id);
            (model.source.pointer.len(), *id)
        });
    }
    ordered
}

fn strategy_candidate(
    registry: &ModelRegistry,
    strategy: NamingStrategy,
    id: ModelId,
    base: &str,
) -> String {
    match strategy {
        NamingStrategy::Numbered | NamingStrategy::PrimaryFirst => base.to_string(),
        NamingStrategy::ParentPrefixed => match registry.get(id).parent {
            Some(parent) => format!("{}{}", registry.get(parent).name, base),
            None => base.to_string(),
        },
        NamingStrategy::FullPath => {
            let path_name = full_path_name(&registry.get(id).source.pointer);
            if path_name.is_empty() {
                base.to_string()
            } else {
                path_name
            }
        }
    }
}

/// Concatenate the non-structural ancestor segments of a schema pointer
fn full_path_name(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|segment| {
            !segment.is_empty()
                && !STRUCTURAL_SEGMENTS.contains(segment)
                && !segment.chars().all(|c| c.is_ascii_digit())
        })
        .map(to_pascal_case)
        .collect::<String>()
}

/// Claim `candidate` in the taken set, appending `1, 2, ...` in discovery
/// order until the name is free
fn claim(taken: &mut BTreeSet<String>, candidate: &str) -> String {
    if taken.insert(candidate.to_string()) {
        return candidate.to_string();
    }
    let mut suffix = 1usize;
    loop {
        let numbered = format!("{candidate}{suffix}");
        if taken.insert(numbered.clone()) {
            return numbered;
        }
        suffix += 1;
    }
}

fn resolve_field_names(registry: &mut ModelRegistry, config: &GenerateConfig, ids: &[ModelId]) {
    for id in ids {
        let model = registry.get_mut(*id);

        let mut seen: BTreeSet<String> = BTreeSet::new();
        for field in &mut model.fields {
            if field.wire_name == "__root__" {
                continue;
            }
            let mut name = field.wire_name.clone();
            if config.snake_case_field {
                name = to_snake_case(&name);
            }
            name = sanitize_identifier(&name);
            field.name = claim(&mut seen, &name);
        }

        if model.kind == ModelKind::Enum {
            let mut seen: BTreeSet<String> = BTreeSet::new();
            for member in &mut model.members {
                let name = sanitize_identifier(&member.name);
                member.name = claim(&mut seen, &name);
            }
        }
    }
}

/// A field whose name equals a sibling type name in the same module
/// shadows it in the emitted source; resolve per the configured strategy
fn resolve_field_type_collisions(
    registry: &mut ModelRegistry,
    config: &GenerateConfig,
    diagnostics: &mut Diagnostics,
    ids: &[ModelId],
) {
    // module -> type names
    let mut type_names: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for id in ids {
        let model = registry.get(*id);
        type_names
            .entry(model.module_path.clone())
            .or_default()
            .insert(model.name.clone());
    }

    for id in ids {
        let module = registry.get(*id).module_path.clone();
        let Some(siblings) = type_names.get_mut(&module) else {
            continue;
        };

        let colliding: Vec<String> = registry
            .get(*id)
            .fields
            .iter()
            .filter(|field| siblings.contains(&field.name))
            .map(|field| field.name.clone())
            .collect();

        for name in colliding {
            match config.field_type_collision_strategy {
                FieldTypeCollisionStrategy::RenameField => {
                    let renamed = format!("{}_", to_snake_case(&name));
                    let model = registry.get_mut(*id);
                    if let Some(field) = model.fields.iter_mut().find(|f| f.name == name) {
                        field.name = renamed.clone();
                    }
                    diagnostics.push(
                        DiagnosticCode::RenamedIdentifier,
                        &registry.get(*id).source.fragment(),
                        format!("field {name} renamed to {renamed} (collides with type {name})"),
                    );
                }
                FieldTypeCollisionStrategy::RenameType => {
                    // Find the colliding type in this module and renumber it
                    let target = ids
                        .iter()
                        .find(|other| {
                            let other = registry.get(**other);
                            other.module_path == module && other.name == name
                        })
                        .copied();
                    if let Some(target) = target {
                        let renamed = claim(siblings, &name);
                        diagnostics.push(
                            DiagnosticCode::RenamedIdentifier,
                            &registry.get(target).source.fragment(),
                            format!("type {name} renamed to {renamed} (collides with field {name})"),
                        );
                        registry.get_mut(target).name = renamed;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("valid_name"), "valid_name");
        assert_eq!(sanitize_identifier("has space"), "has_space");
        assert_eq!(sanitize_identifier("has-dash"), "has_dash");
        assert_eq!(sanitize_identifier("class"), "class_");
        assert_eq!(sanitize_identifier("1st"), "field_1st");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for raw in ["has space", "class", "1st", "weird$chars", "ok"] {
            let once = sanitize_identifier(raw);
            assert_eq!(sanitize_identifier(&once), once);
        }
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("HomeAddress"), "home_address");
        assert_eq!(to_snake_case("Name"), "name");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("with-dash"), "with_dash");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(to_pascal_case("home_address"), "HomeAddress");
        assert_eq!(to_pascal_case("pet"), "Pet");
    }

    #[test]
    fn test_full_path_name_skips_structure() {
        assert_eq!(
            full_path_name("/definitions/Orders/properties/items/properties/Address"),
            "OrdersAddress"
        );
    }

    #[test]
    fn test_claim_numbers_in_order() {
        let mut taken = BTreeSet::new();
        assert_eq!(claim(&mut taken, "Address"), "Address");
        assert_eq!(claim(&mut taken, "Address"), "Address1");
        assert_eq!(claim(&mut taken, "Address"), "Address2");
    }
}
