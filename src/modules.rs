//! Module partitioner
//!
//! Assigns each model to an output module, computes the per-module import
//! set in three deterministically sorted groups (target-language stdlib,
//! model runtime, intra-project), and builds the package re-export list
//! under the configured export scope and collision strategy.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{
    AllExportsCollisionStrategy, AllExportsScope, GenerateConfig, ModuleSplitMode, OutputModelType,
};
use crate::datatype::{DataType, DataTypeKind, PrimitiveKind};
use crate::error::{GeneratorError, Result};
use crate::graph::EmissionOrder;
use crate::model::{ModelId, ModelKind, ModelRegistry};
use crate::names::{to_pascal_case, to_snake_case};

/// An intra-project import: names pulled from a sibling module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub names: Vec<String>,
}

/// One `__all__` entry; `module` is empty for a module's own models and
/// names the source module for package re-exports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub name: String,
    pub module: String,
    pub source_name: String,
}

impl ExportEntry {
    fn own(name: &str) -> Self {
        Self {
            name: name.to_string(),
            module: String::new(),
            source_name: name.to_string(),
        }
    }
}

/// A finalized output module, ready for the printer
#[derive(Debug, Clone)]
pub struct ModulePlan {
    /// Forward-slash path, no extension
    pub path: String,
    pub docstring: Option<String>,
    /// Models in emission order
    pub models: Vec<ModelId>,
    /// Group 1: stdlib equivalents, alphabetical
    pub stdlib_imports: Vec<String>,
    /// Group 2: model runtime imports, alphabetical
    pub framework_imports: Vec<String>,
    /// Group 3: intra-project imports, alphabetical by module
    pub project_imports: Vec<Import>,
    pub exports: Vec<ExportEntry>,
}

/// Partition ordered models into module plans
pub fn partition(
    registry: &ModelRegistry,
    order: &EmissionOrder,
    config: &GenerateConfig,
) -> Result<Vec<ModulePlan>> {
    // Effective path per model
    let mut paths: BTreeMap<ModelId, String> = BTreeMap::new();
    for id in &order.order {
        let model = registry.get(*id);
        let path = match config.module_split_mode {
            ModuleSplitMode::Default => model.module_path.clone(),
            ModuleSplitMode::Single => {
                let stem = to_snake_case(&model.name);
                if model.module_path.is_empty() {
                    stem
                } else {
                    format!("{}/{stem}", model.module_path)
                }
            }
        };
        paths.insert(*id, path);
    }

    // Group in emission order, modules sorted by path
    let mut grouped: BTreeMap<String, Vec<ModelId>> = BTreeMap::new();
    for id in &order.order {
        grouped.entry(paths[id].clone()).or_default().push(*id);
    }

    let mut plans: Vec<ModulePlan> = Vec::with_capacity(grouped.len());
    for (path, models) in &grouped {
        let mut plan = ModulePlan {
            path: path.clone(),
            docstring: None,
            models: models.clone(),
            stdlib_imports: Vec::new(),
            framework_imports: Vec::new(),
            project_imports: Vec::new(),
            exports: models
                .iter()
                .map(|id| ExportEntry::own(&registry.get(*id).name))
                .collect(),
        };
        plan.exports.sort_by(|a, b| a.name.cmp(&b.name));
        compute_imports(registry, config, &paths, &mut plan);
        plans.push(plan);
    }

    if plans.len() > 1 || plans.iter().any(|plan| !plan.path.is_empty()) {
        attach_package_exports(registry, config, &mut plans)?;
    }

    Ok(plans)
}

// =============================================================================
// Imports
// =============================================================================

fn compute_imports(
    registry: &ModelRegistry,
    config: &GenerateConfig,
    paths: &BTreeMap<ModelId, String>,
    plan: &mut ModulePlan,
) {
    let mut stdlib: BTreeSet<String> = BTreeSet::new();
    let mut framework: BTreeSet<String> = BTreeSet::new();
    let mut foreign: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for id in &plan.models {
        let model = registry.get(*id);

        match model.kind {
            ModelKind::Enum => {
                stdlib.insert("enum.Enum".to_string());
            }
            ModelKind::Class => {
                class_runtime_imports(config, &mut framework);
                if model.attributes.extra_forbid
                    && config.output_model_type == OutputModelType::PydanticV2BaseModel
                {
                    framework.insert("pydantic.ConfigDict".to_string());
                }
            }
            ModelKind::RootWrapper => match config.output_model_type {
                OutputModelType::PydanticV2BaseModel => {
                    framework.insert("pydantic.RootModel".to_string());
                }
                OutputModelType::PydanticBaseModel => {
                    framework.insert("pydantic.BaseModel".to_string());
                }
                // Other families render wrappers as aliases
                _ => {}
            },
            ModelKind::Alias => {}
        }

        let needs_field_helper = model.kind == ModelKind::Class
            && model
                .fields
                .iter()
                .any(|field| field.needs_alias() || !field.ty.constraints.is_empty());
        if needs_field_helper && pydantic_family(config.output_model_type) {
            framework.insert("pydantic.Field".to_string());
        }

        for field in &model.fields {
            scan_type(&field.ty, config, &mut stdlib, &mut framework);
        }

        // References to models that live elsewhere
        for dep in model.all_dependencies() {
            if registry.get(dep).attributes.dead {
                continue;
            }
            let dep_path = paths
                .get(&dep)
                .cloned()
                .unwrap_or_else(|| registry.get(dep).module_path.clone());
            if dep_path != plan.path {
                foreign
                    .entry(dep_path)
                    .or_default()
                    .insert(registry.get(dep).name.clone());
            }
        }
    }

    plan.stdlib_imports = stdlib.into_iter().collect();
    plan.framework_imports = framework.into_iter().collect();
    plan.project_imports = foreign
        .into_iter()
        .map(|(module, names)| Import {
            module,
            names: names.into_iter().collect(),
        })
        .collect();
}

fn pydantic_family(model_type: OutputModelType) -> bool {
    matches!(
        model_type,
        OutputModelType::PydanticBaseModel
            | OutputModelType::PydanticV2BaseModel
            | OutputModelType::PydanticV2Dataclass
    )
}

fn class_runtime_imports(config: &GenerateConfig, framework: &mut BTreeSet<String>) {
    match config.output_model_type {
        OutputModelType::PydanticBaseModel | OutputModelType::PydanticV2BaseModel => {
            framework.insert("pydantic.BaseModel".to_string());
        }
        OutputModelType::PydanticV2Dataclass => {
            framework.insert("pydantic.dataclasses.dataclass".to_string());
        }
        OutputModelType::Dataclass => {
            framework.insert("dataclasses.dataclass".to_string());
        }
        OutputModelType::TypedDict => {
            framework.insert("typing.TypedDict".to_string());
        }
        OutputModelType::MsgspecStruct => {
            framework.insert("msgspec.Struct".to_string());
        }
    }
}

fn scan_type(
    ty: &DataType,
    config: &GenerateConfig,
    stdlib: &mut BTreeSet<String>,
    framework: &mut BTreeSet<String>,
) {
    match &ty.kind {
        DataTypeKind::Primitive(kind) => {
            primitive_imports(*kind, config, stdlib, framework);
        }
        DataTypeKind::Literal(_) => {
            stdlib.insert("typing.Literal".to_string());
        }
        DataTypeKind::Array { items } => scan_type(items, config, stdlib, framework),
        DataTypeKind::Mapping { key, value, .. } => {
            scan_type(key, config, stdlib, framework);
            scan_type(value, config, stdlib, framework);
        }
        DataTypeKind::Union { variants, .. } => {
            if !config.union_operator_available() {
                stdlib.insert("typing.Union".to_string());
            }
            for variant in variants {
                scan_type(variant, config, stdlib, framework);
            }
        }
        DataTypeKind::Optional { inner, .. } => {
            if !config.union_operator_available() {
                stdlib.insert("typing.Optional".to_string());
            }
            scan_type(inner, config, stdlib, framework);
        }
        DataTypeKind::RootWrapper(inner) => scan_type(inner, config, stdlib, framework),
        DataTypeKind::Enum(_) => {
            stdlib.insert("enum.Enum".to_string());
        }
        DataTypeKind::Intersection { .. }
        | DataTypeKind::ModelRef(_)
        | DataTypeKind::ForwardRef(_) => {}
    }
}

fn primitive_imports(
    kind: PrimitiveKind,
    config: &GenerateConfig,
    stdlib: &mut BTreeSet<String>,
    framework: &mut BTreeSet<String>,
) {
    match kind {
        PrimitiveKind::Any => {
            stdlib.insert("typing.Any".to_string());
        }
        PrimitiveKind::Date => {
            stdlib.insert("datetime.date".to_string());
        }
        PrimitiveKind::DateTime => {
            stdlib.insert("datetime.datetime".to_string());
        }
        PrimitiveKind::Time => {
            stdlib.insert("datetime.time".to_string());
        }
        PrimitiveKind::Duration => {
            stdlib.insert("datetime.timedelta".to_string());
        }
        PrimitiveKind::Uuid => {
            stdlib.insert("uuid.UUID".to_string());
        }
        PrimitiveKind::Decimal => {
            stdlib.insert("decimal.Decimal".to_string());
        }
        PrimitiveKind::Url if pydantic_family(config.output_model_type) => {
            framework.insert("pydantic.AnyUrl".to_string());
        }
        PrimitiveKind::Email if pydantic_family(config.output_model_type) => {
            framework.insert("pydantic.EmailStr".to_string());
        }
        _ => {}
    }
}

// =============================================================================
// Package exports
// =============================================================================

/// Build the package root's re-export list per the export scope and
/// collision strategy
fn attach_package_exports(
    registry: &ModelRegistry,
    config: &GenerateConfig,
    plans: &mut Vec<ModulePlan>,
) -> Result<()> {
    let _ = registry;

    // Source modules in scope, skipping the root itself
    let in_scope: Vec<(String, Vec<String>)> = plans
        .iter()
        .filter(|plan| !plan.path.is_empty())
        .filter(|plan| match config.all_exports_scope {
            AllExportsScope::Recursive => true,
            AllExportsScope::Children => !plan.path.contains('/'),
        })
        .map(|plan| {
            (
                plan.path.clone(),
                plan.exports.iter().map(|e| e.name.clone()).collect(),
            )
        })
        .collect();

    // Count name occurrences to find collisions
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for (_, names) in &in_scope {
        for name in names {
            *seen.entry(name.clone()).or_insert(0) += 1;
        }
    }

    let mut entries: Vec<ExportEntry> = Vec::new();
    for (module, names) in &in_scope {
        for name in names {
            let collides = seen[name] > 1;
            let exported = if collides {
                match config.all_exports_collision_strategy {
                    AllExportsCollisionStrategy::Error => {
                        return Err(GeneratorError::NameCollision {
                            name: name.clone(),
                            module: module.clone(),
                        });
                    }
                    AllExportsCollisionStrategy::MinimalPrefix => {
                        let segment = module.rsplit('/').next().unwrap_or(module);
                        format!("{}{}", to_pascal_case(segment), name)
                    }
                    AllExportsCollisionStrategy::FullPrefix => {
                        let prefix: String =
                            module.split('/').map(to_pascal_case).collect::<String>();
                        format!("{prefix}{name}")
                    }
                }
            } else {
                name.clone()
            };
            entries.push(ExportEntry {
                name: exported,
                module: module.clone(),
                source_name: name.clone(),
            });
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.module.cmp(&b.module)));

    match plans.iter_mut().find(|plan| plan.path.is_empty()) {
        Some(root) => {
            root.exports.extend(entries);
        }
        None => {
            plans.insert(
                0,
                ModulePlan {
                    path: String::new(),
                    docstring: None,
                    models: Vec::new(),
                    stdlib_imports: Vec::new(),
                    framework_imports: Vec::new(),
                    project_imports: Vec::new(),
                    exports: entries,
                },
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::model::Field;
    use crate::resolve::SourcePath;
    use std::collections::BTreeMap;

    fn str_field(name: &str) -> Field {
        Field {
            name: name.to_string(),
            wire_name: name.to_string(),
            ty: DataType::primitive(PrimitiveKind::Str),
            required: true,
            default: None,
            annotations: BTreeMap::new(),
        }
    }

    fn setup(module_a: &str, module_b: &str) -> (ModelRegistry, EmissionOrder) {
        let mut registry = ModelRegistry::new();
        let a = registry.allocate(SourcePath::default(), module_a);
        registry.get_mut(a).name = "Pet".to_string();
        registry.get_mut(a).kind = ModelKind::Class;
        registry.get_mut(a).fields.push(str_field("name"));

        let b = registry.allocate(SourcePath::default(), module_b);
        registry.get_mut(b).name = "Owner".to_string();
        registry.get_mut(b).kind = ModelKind::Class;
        registry.get_mut(b).fields.push(Field {
            name: "pet".to_string(),
            wire_name: "pet".to_string(),
            ty: DataType::model_ref(a),
            required: true,
            default: None,
            annotations: BTreeMap::new(),
        });

        let order = EmissionOrder {
            order: vec![a, b],
            forward_refs: 0,
        };
        (registry, order)
    }

    #[test]
    fn test_cross_module_reference_becomes_import() {
        let (registry, order) = setup("pets", "people");
        let config = GenerateConfig::default();
        let plans = partition(&registry, &order, &config).unwrap();

        let people = plans.iter().find(|p| p.path == "people").unwrap();
        assert_eq!(
            people.project_imports,
            vec![Import {
                module: "pets".to_string(),
                names: vec!["Pet".to_string()],
            }]
        );
    }

    #[test]
    fn test_single_split_mode_gives_one_module_per_model() {
        let (registry, order) = setup("", "");
        let config = GenerateConfig {
            module_split_mode: ModuleSplitMode::Single,
            ..GenerateConfig::default()
        };
        let plans = partition(&registry, &order, &config).unwrap();
        let paths: Vec<&str> = plans.iter().map(|p| p.path.as_str()).collect();
        assert!(paths.contains(&"pet"));
        assert!(paths.contains(&"owner"));
    }

    #[test]
    fn test_export_collision_error_strategy() {
        let mut registry = ModelRegistry::new();
        let mut order = EmissionOrder {
            order: vec![],
            forward_refs: 0,
        };
        for module in ["alpha", "beta"] {
            let id = registry.allocate(SourcePath::default(), module);
            registry.get_mut(id).name = "Pet".to_string();
            registry.get_mut(id).kind = ModelKind::Class;
            order.order.push(id);
        }
        let config = GenerateConfig {
            all_exports_collision_strategy: AllExportsCollisionStrategy::Error,
            ..GenerateConfig::default()
        };
        assert!(matches!(
            partition(&registry, &order, &config),
            Err(GeneratorError::NameCollision { .. })
        ));
    }

    #[test]
    fn test_export_collision_minimal_prefix() {
        let mut registry = ModelRegistry::new();
        let mut order = EmissionOrder {
            order: vec![],
            forward_refs: 0,
        };
        for module in ["alpha", "beta"] {
            let id = registry.allocate(SourcePath::default(), module);
            registry.get_mut(id).name = "Pet".to_string();
            registry.get_mut(id).kind = ModelKind::Class;
            order.order.push(id);
        }
        let config = GenerateConfig::default();
        let plans = partition(&registry, &order, &config).unwrap();
        let root = plans.iter().find(|p| p.path.is_empty()).unwrap();
        let exported: Vec<&str> = root.exports.iter().map(|e| e.name.as_str()).collect();
        assert!(exported.contains(&"AlphaPet"));
        assert!(exported.contains(&"BetaPet"));
    }
}
