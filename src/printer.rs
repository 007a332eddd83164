//! Default printer
//!
//! Renders module plans as Python-family source for the configured model
//! runtime. The core never depends on this module; it exists so the crate
//! is usable end to end and so byte-level determinism can be exercised in
//! tests. It consumes only finalized plans, never raw schema.

use std::collections::BTreeMap;

use crate::config::{GenerateConfig, OutputModelType};
use crate::datatype::{Constraints, DataType, DataTypeKind, PrimitiveKind};
use crate::emit::Printer;
use crate::error::Result;
use crate::model::{DataModel, ModelKind, ModelRegistry};
use crate::modules::ModulePlan;

/// Python-family source printer
#[derive(Debug, Default)]
pub struct PythonPrinter;

impl Printer for PythonPrinter {
    fn print_module(
        &self,
        plan: &ModulePlan,
        registry: &ModelRegistry,
        config: &GenerateConfig,
    ) -> Result<Vec<u8>> {
        let mut out = String::new();

        match &config.custom_file_header {
            Some(header) => {
                out.push_str(header);
                out.push('\n');
            }
            None => out.push_str("# generated by modelgen\n"),
        }
        out.push_str("from __future__ import annotations\n");

        render_imports(&mut out, plan);
        render_exports(&mut out, plan);

        for id in &plan.models {
            let model = registry.get(*id);
            out.push('\n');
            render_model(&mut out, model, registry, config);
        }

        Ok(out.into_bytes())
    }
}

// =============================================================================
// Imports and exports
// =============================================================================

fn render_imports(out: &mut String, plan: &ModulePlan) {
    for group in [&plan.stdlib_imports, &plan.framework_imports] {
        if group.is_empty() {
            continue;
        }
        out.push('\n');
        // "module.Name" entries group into one from-import per module
        let mut by_module: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for entry in group.iter() {
            match entry.rsplit_once('.') {
                Some((module, name)) => by_module.entry(module).or_default().push(name),
                None => {
                    by_module.entry(entry).or_default();
                }
            }
        }
        for (module, names) in by_module {
            if names.is_empty() {
                out.push_str(&format!("import {module}\n"));
            } else {
                out.push_str(&format!("from {module} import {}\n", names.join(", ")));
            }
        }
    }

    if !plan.project_imports.is_empty() {
        out.push('\n');
        let depth = plan.path.matches('/').count();
        let dots = ".".repeat(depth + 1);
        for import in &plan.project_imports {
            out.push_str(&format!(
                "from {dots}{} import {}\n",
                import.module.replace('/', "."),
                import.names.join(", ")
            ));
        }
    }
}

fn render_exports(out: &mut String, plan: &ModulePlan) {
    let reexports: Vec<_> = plan
        .exports
        .iter()
        .filter(|entry| !entry.module.is_empty())
        .collect();
    if !reexports.is_empty() {
        out.push('\n');
        for entry in &reexports {
            let module = entry.module.replace('/', ".");
            if entry.name == entry.source_name {
                out.push_str(&format!("from .{module} import {}\n", entry.source_name));
            } else {
                out.push_str(&format!(
                    "from .{module} import {} as {}\n",
                    entry.source_name, entry.name
                ));
            }
        }
    }

    if !plan.exports.is_empty() {
        out.push('\n');
        out.push_str("__all__ = [\n");
        for entry in &plan.exports {
            out.push_str(&format!("    '{}',\n", entry.name));
        }
        out.push_str("]\n");
    }
}

// =============================================================================
// Models
// =============================================================================

fn render_model(
    out: &mut String,
    model: &DataModel,
    registry: &ModelRegistry,
    config: &GenerateConfig,
) {
    match model.kind {
        ModelKind::Enum => render_enum(out, model),
        ModelKind::Alias => {
            let inner = model
                .inner_type()
                .map(|ty| type_expr(ty, registry, config))
                .unwrap_or_else(|| "Any".to_string());
            out.push_str(&format!("{} = {}\n", model.name, inner));
        }
        ModelKind::RootWrapper => render_root_wrapper(out, model, registry, config),
        ModelKind::Class => render_class(out, model, registry, config),
    }
}

fn render_enum(out: &mut String, model: &DataModel) {
    out.push_str(&format!("class {}(Enum):\n", model.name));
    render_docstring(out, model);
    for member in &model.members {
        out.push_str(&format!("    {} = {}\n", member.name, literal(&member.value)));
    }
    if model.members.is_empty() {
        out.push_str("    pass\n");
    }
}

fn render_root_wrapper(
    out: &mut String,
    model: &DataModel,
    registry: &ModelRegistry,
    config: &GenerateConfig,
) {
    let inner = model
        .inner_type()
        .map(|ty| type_expr(ty, registry, config))
        .unwrap_or_else(|| "Any".to_string());
    match config.output_model_type {
        OutputModelType::PydanticV2BaseModel => {
            out.push_str(&format!("class {}(RootModel[{inner}]):\n", model.name));
            render_docstring(out, model);
            out.push_str(&format!("    root: {inner}\n"));
        }
        OutputModelType::PydanticBaseModel => {
            out.push_str(&format!("class {}(BaseModel):\n", model.name));
            render_docstring(out, model);
            out.push_str(&format!("    __root__: {inner}\n"));
        }
        _ => {
            // Families without a root-model convention fall back to an alias
            out.push_str(&format!("{} = {}\n", model.name, inner));
        }
    }
    render_update_refs(out, model, config);
}

fn render_class(
    out: &mut String,
    model: &DataModel,
    registry: &ModelRegistry,
    config: &GenerateConfig,
) {
    let bases: Vec<String> = model
        .bases
        .iter()
        .map(|base| registry.get(*base).name.clone())
        .collect();

    match config.output_model_type {
        OutputModelType::Dataclass => out.push_str("@dataclass\n"),
        OutputModelType::PydanticV2Dataclass => out.push_str("@dataclass\n"),
        _ => {}
    }

    let parents = if bases.is_empty() {
        default_parent(config, model)
    } else {
        bases.join(", ")
    };
    if parents.is_empty() {
        out.push_str(&format!("class {}:\n", model.name));
    } else {
        out.push_str(&format!("class {}({parents}):\n", model.name));
    }
    render_docstring(out, model);

    if model.attributes.extra_forbid
        && config.output_model_type == OutputModelType::PydanticV2BaseModel
    {
        out.push_str("    model_config = ConfigDict(extra='forbid')\n");
    }

    let mut body = false;
    for field in &model.fields {
        let annotation = type_expr(&field.ty, registry, config);
        let assignment = field_assignment(field, config);
        out.push_str(&format!("    {}: {annotation}{assignment}\n", field.name));
        body = true;
    }
    if model.attributes.extra_forbid && config.output_model_type == OutputModelType::PydanticBaseModel
    {
        out.push_str("\n    class Config:\n        extra = 'forbid'\n");
        body = true;
    }
    if !body {
        out.push_str("    pass\n");
    }
    render_update_refs(out, model, config);
}

fn default_parent(config: &GenerateConfig, model: &DataModel) -> String {
    match config.output_model_type {
        OutputModelType::PydanticBaseModel | OutputModelType::PydanticV2BaseModel => {
            "BaseModel".to_string()
        }
        OutputModelType::TypedDict => {
            if model.fields.iter().any(|field| !field.required) {
                "TypedDict, total=False".to_string()
            } else {
                "TypedDict".to_string()
            }
        }
        OutputModelType::MsgspecStruct => "Struct".to_string(),
        OutputModelType::Dataclass | OutputModelType::PydanticV2Dataclass => String::new(),
    }
}

fn render_docstring(out: &mut String, model: &DataModel) {
    if let Some(docstring) = &model.docstring {
        out.push_str(&format!("    \"\"\"{docstring}\"\"\"\n"));
    }
}

fn render_update_refs(out: &mut String, model: &DataModel, config: &GenerateConfig) {
    if !model.attributes.needs_update_refs {
        return;
    }
    match config.output_model_type {
        OutputModelType::PydanticBaseModel => {
            out.push_str(&format!("\n{}.update_forward_refs()\n", model.name));
        }
        OutputModelType::PydanticV2BaseModel => {
            out.push_str(&format!("\n{}.model_rebuild()\n", model.name));
        }
        _ => {}
    }
}

// =============================================================================
// Fields
// =============================================================================

fn field_assignment(field: &crate::model::Field, config: &GenerateConfig) -> String {
    let uses_field_helper = pydantic_family(config.output_model_type)
        && (field.needs_alias() || has_field_constraints(&field.ty.constraints));

    let default = match (&field.default, field.required) {
        (Some(value), _) => Some(literal(value)),
        (None, false) => Some("None".to_string()),
        (None, true) => None,
    };

    if uses_field_helper {
        let mut args = vec![default.unwrap_or_else(|| "...".to_string())];
        if field.needs_alias() {
            args.push(format!("alias='{}'", field.wire_name));
        }
        args.extend(constraint_args(&field.ty.constraints, config));
        return format!(" = Field({})", args.join(", "));
    }

    match default {
        Some(default) => format!(" = {default}"),
        None => String::new(),
    }
}

fn has_field_constraints(constraints: &Constraints) -> bool {
    constraints.pattern.is_some()
        || constraints.min_length.is_some()
        || constraints.max_length.is_some()
        || constraints.minimum.is_some()
        || constraints.maximum.is_some()
        || constraints.exclusive_minimum.is_some()
        || constraints.exclusive_maximum.is_some()
        || constraints.multiple_of.is_some()
        || constraints.description.is_some()
}

fn constraint_args(constraints: &Constraints, config: &GenerateConfig) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(value) = constraints.minimum {
        args.push(format!("ge={}", number(value)));
    }
    if let Some(value) = constraints.exclusive_minimum {
        args.push(format!("gt={}", number(value)));
    }
    if let Some(value) = constraints.maximum {
        args.push(format!("le={}", number(value)));
    }
    if let Some(value) = constraints.exclusive_maximum {
        args.push(format!("lt={}", number(value)));
    }
    if let Some(value) = constraints.min_length {
        args.push(format!("min_length={value}"));
    }
    if let Some(value) = constraints.max_length {
        args.push(format!("max_length={value}"));
    }
    if let Some(pattern) = &constraints.pattern {
        let keyword = match config.output_model_type {
            OutputModelType::PydanticBaseModel => "regex",
            _ => "pattern",
        };
        args.push(format!("{keyword}={}", quote(pattern)));
    }
    if let Some(description) = &constraints.description {
        args.push(format!("description={}", quote(description)));
    }
    args
}

fn pydantic_family(model_type: OutputModelType) -> bool {
    matches!(
        model_type,
        OutputModelType::PydanticBaseModel
            | OutputModelType::PydanticV2BaseModel
            | OutputModelType::PydanticV2Dataclass
    )
}

// =============================================================================
// Type expressions
// =============================================================================

fn type_expr(ty: &DataType, registry: &ModelRegistry, config: &GenerateConfig) -> String {
    match &ty.kind {
        DataTypeKind::Primitive(kind) => primitive_expr(*kind, config).to_string(),
        DataTypeKind::Literal(value) => format!("Literal[{}]", literal(value)),
        DataTypeKind::Enum(members) => {
            let values: Vec<String> = members.iter().map(|m| literal(&m.value)).collect();
            format!("Literal[{}]", values.join(", "))
        }
        DataTypeKind::Array { items } => {
            format!("list[{}]", type_expr(items, registry, config))
        }
        DataTypeKind::Mapping { key, value, .. } => format!(
            "dict[{}, {}]",
            type_expr(key, registry, config),
            type_expr(value, registry, config)
        ),
        DataTypeKind::Union { variants, .. } => {
            let rendered: Vec<String> = variants
                .iter()
                .map(|variant| type_expr(variant, registry, config))
                .collect();
            if config.union_operator_available() {
                rendered.join(" | ")
            } else {
                format!("Union[{}]", rendered.join(", "))
            }
        }
        DataTypeKind::Intersection { bases, .. } => {
            // No inline intersection syntax exists; reference the first base
            bases
                .first()
                .map(|base| registry.get(*base).name.clone())
                .unwrap_or_else(|| "Any".to_string())
        }
        DataTypeKind::ModelRef(id) => registry.get(*id).name.clone(),
        DataTypeKind::RootWrapper(inner) => type_expr(inner, registry, config),
        DataTypeKind::Optional { inner, .. } => {
            let inner = type_expr(inner, registry, config);
            if config.union_operator_available() {
                format!("{inner} | None")
            } else {
                format!("Optional[{inner}]")
            }
        }
        DataTypeKind::ForwardRef(name) => format!("'{name}'"),
    }
}

fn primitive_expr(kind: PrimitiveKind, config: &GenerateConfig) -> &'static str {
    let pydantic = pydantic_family(config.output_model_type);
    match kind {
        PrimitiveKind::Str => "str",
        PrimitiveKind::Int => "int",
        PrimitiveKind::Float => "float",
        PrimitiveKind::Bool => "bool",
        PrimitiveKind::Bytes => "bytes",
        PrimitiveKind::Date => "date",
        PrimitiveKind::DateTime => "datetime",
        PrimitiveKind::Time => "time",
        PrimitiveKind::Duration => "timedelta",
        PrimitiveKind::Uuid => "UUID",
        PrimitiveKind::Url => {
            if pydantic {
                "AnyUrl"
            } else {
                "str"
            }
        }
        PrimitiveKind::Email => {
            if pydantic {
                "EmailStr"
            } else {
                "str"
            }
        }
        PrimitiveKind::Decimal => "Decimal",
        PrimitiveKind::Any => "Any",
    }
}

// =============================================================================
// Literals
// =============================================================================

fn literal(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        // Containers render as their JSON form, which is also Python
        other => other.to_string(),
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Render a numeric bound without a trailing `.0` for whole values
fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::{optionalize, NullableOrigin};
    use crate::model::ModelRegistry;

    #[test]
    fn test_optional_renders_by_version() {
        let registry = ModelRegistry::new();
        let ty = optionalize(
            DataType::primitive(PrimitiveKind::Str),
            NullableOrigin::ExplicitNull,
        );

        let mut config = GenerateConfig::default();
        assert_eq!(type_expr(&ty, &registry, &config), "Optional[str]");

        config.use_union_operator = true;
        assert_eq!(type_expr(&ty, &registry, &config), "str | None");
    }

    #[test]
    fn test_literal_rendering() {
        assert_eq!(literal(&serde_json::json!("a'b")), "'a\\'b'");
        assert_eq!(literal(&serde_json::json!(null)), "None");
        assert_eq!(literal(&serde_json::json!(true)), "True");
        assert_eq!(literal(&serde_json::json!(3)), "3");
    }
}
