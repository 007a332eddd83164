//! Generator configuration
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (modelgen.toml)
//! - Environment variables (MODELGEN_*)
//!
//! ## Example config file (modelgen.toml):
//! ```toml
//! output_model_type = "pydantic_v2.BaseModel"
//! target_language_version = 12
//! reuse_scope = "tree"
//! naming_strategy = "parent-prefixed"
//! collapse_root_models = true
//! shared_module_name = "shared"
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GeneratorError, Result};

/// Lowest supported target language minor version
pub const MIN_VERSION: u8 = 10;
/// Highest supported target language minor version
pub const MAX_VERSION: u8 = 13;
/// Default name of the shared module under `reuse_scope = tree`
pub const DEFAULT_SHARED_MODULE_NAME: &str = "shared";
/// Default maximum number of chained `$ref` hops
pub const DEFAULT_REF_HOP_LIMIT: usize = 64;

// =============================================================================
// Option Enums
// =============================================================================

/// Recognized input kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Select by extension, then content sniffing
    Auto,
    OpenApi,
    JsonSchema,
    /// Infer a schema from sample JSON data
    Json,
    Yaml,
    /// Infer a schema from an in-memory value
    Dict,
    Csv,
    GraphQl,
}

/// Target model family for emitted code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputModelType {
    #[serde(rename = "pydantic.BaseModel")]
    PydanticBaseModel,
    #[serde(rename = "pydantic_v2.BaseModel")]
    PydanticV2BaseModel,
    #[serde(rename = "pydantic_v2.dataclass")]
    PydanticV2Dataclass,
    #[serde(rename = "dataclasses.dataclass")]
    Dataclass,
    #[serde(rename = "typing.TypedDict")]
    TypedDict,
    #[serde(rename = "msgspec.Struct")]
    MsgspecStruct,
}

impl OutputModelType {
    /// Wire name, used in diagnostics and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PydanticBaseModel => "pydantic.BaseModel",
            Self::PydanticV2BaseModel => "pydantic_v2.BaseModel",
            Self::PydanticV2Dataclass => "pydantic_v2.dataclass",
            Self::Dataclass => "dataclasses.dataclass",
            Self::TypedDict => "typing.TypedDict",
            Self::MsgspecStruct => "msgspec.Struct",
        }
    }

    /// Whether the family supports multiple base classes
    pub fn supports_multiple_inheritance(&self) -> bool {
        !matches!(self, Self::Dataclass | Self::MsgspecStruct | Self::TypedDict)
    }
}

/// Scope for model reuse deduplication
///
/// module: Deduplicate identical models within each module (default).
/// tree: Deduplicate identical models across all modules, placing shared
/// survivors in the shared module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReuseScope {
    Module,
    Tree,
}

/// Strategy for generating unique model names when duplicates occur
///
/// numbered: Append numeric suffix (Address1, Address2) [default].
/// parent-prefixed: Prefix with parent model name (CustomerAddress).
/// full-path: Use full schema path for unique names (OrdersItemsAddress).
/// primary-first: The shortest schema path wins the base name; others get
/// numeric suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingStrategy {
    Numbered,
    ParentPrefixed,
    FullPath,
    PrimaryFirst,
}

/// Strategy for handling field name and type name collisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldTypeCollisionStrategy {
    /// Rename the field with a suffix and add an alias (default)
    RenameField,
    /// Rename the type with a suffix to preserve the field name
    RenameType,
}

/// Strategy for naming when collapsing root models with object references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollapseRootModelsNameStrategy {
    /// Keep the inner (child) model's name, remove the wrapper
    Child,
    /// Rename the inner model to the wrapper's name, remove the wrapper
    Parent,
}

/// Mode for field merging in allOf schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllOfMergeMode {
    /// Merge only constraint fields from the parent
    Constraints,
    /// Merge constraints plus annotation fields (default, examples)
    All,
    /// Keep parents as base classes, merge nothing
    #[serde(rename = "none")]
    NoMerge,
}

/// Model generation strategy for readOnly/writeOnly fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadOnlyWriteOnlyModelType {
    /// Generate only Request/Response variants
    RequestResponse,
    /// Generate Base, Request, and Response variants
    All,
}

/// Scope for re-exports in the package root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllExportsScope {
    /// Export models from direct child modules only
    Children,
    /// Export models from all descendant modules
    Recursive,
}

/// Strategy for handling name collisions in recursive exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllExportsCollisionStrategy {
    /// Fail the run on export collisions
    Error,
    /// Prefix only colliding names with their module name
    MinimalPrefix,
    /// Prefix colliding names with the full module path
    FullPrefix,
}

/// Scopes for OpenAPI model generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenApiScope {
    Schemas,
    Paths,
    Tags,
    Parameters,
    Webhooks,
    RequestBodies,
}

/// Scopes for GraphQL model generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphQlScope {
    Schema,
}

/// Mode for splitting generated models into output modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleSplitMode {
    /// One module per source schema document
    Default,
    /// One module per model
    Single,
}

/// Union matching mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnionMode {
    Smart,
    LeftToRight,
}

// =============================================================================
// Generator Configuration
// =============================================================================

/// Complete configuration for one generator run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    pub input_kind: InputKind,
    pub output_model_type: OutputModelType,

    /// Target language minor version, gates feature availability
    pub target_language_version: u8,

    pub reuse_scope: ReuseScope,
    pub naming_strategy: NamingStrategy,
    pub field_type_collision_strategy: FieldTypeCollisionStrategy,

    /// Remove single-field root wrappers
    pub collapse_root_models: bool,
    pub collapse_name_strategy: CollapseRootModelsNameStrategy,

    pub all_of_merge_mode: AllOfMergeMode,

    /// When set, expand models containing readOnly/writeOnly fields into
    /// request/response variants
    pub read_only_write_only_model_type: Option<ReadOnlyWriteOnlyModelType>,

    pub all_exports_scope: AllExportsScope,
    pub all_exports_collision_strategy: AllExportsCollisionStrategy,

    pub openapi_scopes: Vec<OpenApiScope>,
    pub graphql_scopes: Vec<GraphQlScope>,

    /// Distinguish not-required from nullable
    pub strict_nullable: bool,

    /// Emit built-in union syntax where the target version supports it
    pub use_union_operator: bool,

    /// Prefer schema `title` over the derived name
    pub use_title_as_name: bool,

    /// Convert field names to snake_case (wire name kept as alias)
    pub snake_case_field: bool,

    /// Schema keys copied through to field annotations
    pub extras: Vec<String>,

    /// Verbatim prefix for every emitted module
    pub custom_file_header: Option<String>,

    pub shared_module_name: String,
    pub module_split_mode: ModuleSplitMode,

    /// Maximum chained `$ref` hops before failing with a cycle error
    pub ref_hop_limit: usize,

    /// Per-URI fetch timeout in seconds for remote references
    pub fetch_timeout_secs: Option<u64>,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            input_kind: InputKind::Auto,
            output_model_type: OutputModelType::PydanticV2BaseModel,
            target_language_version: MIN_VERSION,
            reuse_scope: ReuseScope::Module,
            naming_strategy: NamingStrategy::Numbered,
            field_type_collision_strategy: FieldTypeCollisionStrategy::RenameField,
            collapse_root_models: false,
            collapse_name_strategy: CollapseRootModelsNameStrategy::Child,
            all_of_merge_mode: AllOfMergeMode::Constraints,
            read_only_write_only_model_type: None,
            all_exports_scope: AllExportsScope::Children,
            all_exports_collision_strategy: AllExportsCollisionStrategy::MinimalPrefix,
            openapi_scopes: vec![OpenApiScope::Schemas],
            graphql_scopes: vec![GraphQlScope::Schema],
            strict_nullable: false,
            use_union_operator: false,
            use_title_as_name: false,
            snake_case_field: false,
            extras: Vec::new(),
            custom_file_header: None,
            shared_module_name: DEFAULT_SHARED_MODULE_NAME.to_string(),
            module_split_mode: ModuleSplitMode::Default,
            ref_hop_limit: DEFAULT_REF_HOP_LIMIT,
            fetch_timeout_secs: None,
        }
    }
}

impl GenerateConfig {
    /// Load configuration with layering: defaults, then `modelgen.toml` (or
    /// the given file), then `MODELGEN_*` environment variables.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        builder = match config_file {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name("modelgen").required(false)),
        };

        let settings = builder
            .add_source(Environment::with_prefix("MODELGEN"))
            .build()
            .map_err(|e| GeneratorError::Input(format!("config: {e}")))?;

        let config: GenerateConfig = settings
            .try_deserialize()
            .map_err(|e| GeneratorError::Input(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: GenerateConfig =
            toml::from_str(text).map_err(|e| GeneratorError::Input(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-option constraints
    pub fn validate(&self) -> Result<()> {
        if self.target_language_version < MIN_VERSION || self.target_language_version > MAX_VERSION
        {
            return Err(GeneratorError::Input(format!(
                "target_language_version {} outside supported range [{MIN_VERSION}, {MAX_VERSION}]",
                self.target_language_version
            )));
        }
        if self.openapi_scopes.is_empty() {
            return Err(GeneratorError::Input(
                "openapi_scopes must not be empty".to_string(),
            ));
        }
        if self.shared_module_name.is_empty() {
            return Err(GeneratorError::Input(
                "shared_module_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the target version accepts `X | Y` union syntax
    pub fn union_operator_available(&self) -> bool {
        self.use_union_operator && self.target_language_version >= MIN_VERSION
    }

    pub fn has_openapi_scope(&self, scope: OpenApiScope) -> bool {
        self.openapi_scopes.contains(&scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GenerateConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.shared_module_name, "shared");
        assert_eq!(config.ref_hop_limit, 64);
    }

    #[test]
    fn test_version_range() {
        let mut config = GenerateConfig::default();
        config.target_language_version = 9;
        assert!(config.validate().is_err());
        config.target_language_version = 14;
        assert!(config.validate().is_err());
        config.target_language_version = 13;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&OutputModelType::PydanticV2BaseModel).unwrap();
        assert_eq!(json, "\"pydantic_v2.BaseModel\"");
        let strategy: NamingStrategy = serde_json::from_str("\"parent-prefixed\"").unwrap();
        assert_eq!(strategy, NamingStrategy::ParentPrefixed);
        let merge: AllOfMergeMode = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(merge, AllOfMergeMode::NoMerge);
    }

    #[test]
    fn test_from_toml() {
        let config = GenerateConfig::from_toml_str(
            r#"
output_model_type = "pydantic_v2.BaseModel"
target_language_version = 12
reuse_scope = "tree"
naming_strategy = "parent-prefixed"
collapse_root_models = true
"#,
        )
        .unwrap();
        assert_eq!(config.target_language_version, 12);
        assert_eq!(config.reuse_scope, ReuseScope::Tree);
        assert_eq!(config.naming_strategy, NamingStrategy::ParentPrefixed);
        assert!(config.collapse_root_models);

        assert!(GenerateConfig::from_toml_str("target_language_version = 3").is_err());
    }

    #[test]
    fn test_multiple_inheritance_support() {
        assert!(OutputModelType::PydanticBaseModel.supports_multiple_inheritance());
        assert!(!OutputModelType::Dataclass.supports_multiple_inheritance());
    }
}
