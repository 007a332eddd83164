//! DataType algebra
//!
//! The tagged variant every resolved schema fragment lowers into, plus the
//! constraint side-structure and the five operations the algebra is closed
//! under: `unify`, `intersect`, `optionalize`, `constrain`, `widen`.
//!
//! DataTypes are immutable once inserted into a model; the mutating walkers
//! here are only called by the normalization passes before the registry is
//! frozen.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AllOfMergeMode, UnionMode};
use crate::error::{GeneratorError, Result};
use crate::model::ModelId;

// =============================================================================
// Primitive Kinds
// =============================================================================

/// Scalar kinds a schema `type`/`format` pair can lower to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Str,
    Int,
    Float,
    Bool,
    Bytes,
    Date,
    DateTime,
    Time,
    Duration,
    Uuid,
    Url,
    Email,
    Decimal,
    Any,
}

impl PrimitiveKind {
    /// Map a schema `type` + `format` pair to a primitive kind.
    ///
    /// Returns None for unknown formats so the caller can record a
    /// diagnostic and fall back to the base kind.
    pub fn from_type_format(ty: &str, format: Option<&str>) -> Option<Self> {
        match (ty, format) {
            ("string", None) => Some(Self::Str),
            ("string", Some("date")) => Some(Self::Date),
            ("string", Some("date-time")) => Some(Self::DateTime),
            ("string", Some("time")) => Some(Self::Time),
            ("string", Some("duration")) => Some(Self::Duration),
            ("string", Some("uuid")) | ("string", Some("uuid4")) | ("string", Some("uuid1")) => {
                Some(Self::Uuid)
            }
            ("string", Some("uri")) | ("string", Some("url")) => Some(Self::Url),
            ("string", Some("email")) | ("string", Some("idn-email")) => Some(Self::Email),
            ("string", Some("byte")) | ("string", Some("binary")) => Some(Self::Bytes),
            ("string", Some("decimal")) => Some(Self::Decimal),
            ("string", Some(_)) => None,
            ("integer", _) => Some(Self::Int),
            ("number", Some("decimal")) => Some(Self::Decimal),
            ("number", _) => Some(Self::Float),
            ("boolean", _) => Some(Self::Bool),
            ("null", _) => Some(Self::Any),
            _ => None,
        }
    }

    /// The primitive kind of a literal JSON value
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::String(_) => Self::Str,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Int,
            Value::Number(_) => Self::Float,
            Value::Bool(_) => Self::Bool,
            _ => Self::Any,
        }
    }
}

// =============================================================================
// Constraints
// =============================================================================

/// Constraint and annotation side-structure attached to a carrying DataType
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    pub pattern: Option<String>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub multiple_of: Option<f64>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
    pub format: Option<String>,
    pub description: Option<String>,
    pub examples: Vec<Value>,
    pub default: Option<Value>,
    pub read_only: bool,
    pub write_only: bool,
    pub deprecated: bool,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Constraints::default()
    }

    /// Merge two constraint sets. Numeric bounds take the tighter of the
    /// two; `pattern` becomes a conjunction; conflicting `format` or
    /// `multipleOf` values fail the merge.
    pub fn merge(&self, other: &Constraints, path: &str) -> Result<Constraints> {
        let format = match (&self.format, &other.format) {
            (Some(a), Some(b)) if a != b => {
                return Err(GeneratorError::SchemaMerge {
                    path: path.to_string(),
                    reason: format!("conflicting formats {a:?} and {b:?}"),
                });
            }
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        let multiple_of = match (self.multiple_of, other.multiple_of) {
            (Some(a), Some(b)) if a != b => {
                return Err(GeneratorError::SchemaMerge {
                    path: path.to_string(),
                    reason: format!("conflicting multipleOf {a} and {b}"),
                });
            }
            (a, b) => a.or(b),
        };
        let pattern = match (&self.pattern, &other.pattern) {
            (Some(a), Some(b)) if a != b => Some(format!("(?={a}){b}")),
            (a, b) => a.clone().or_else(|| b.clone()),
        };

        let mut examples = self.examples.clone();
        for example in &other.examples {
            if !examples.contains(example) {
                examples.push(example.clone());
            }
        }

        Ok(Constraints {
            pattern,
            min_length: max_opt(self.min_length, other.min_length),
            max_length: min_opt(self.max_length, other.max_length),
            minimum: max_opt(self.minimum, other.minimum),
            maximum: min_opt(self.maximum, other.maximum),
            exclusive_minimum: max_opt(self.exclusive_minimum, other.exclusive_minimum),
            exclusive_maximum: min_opt(self.exclusive_maximum, other.exclusive_maximum),
            multiple_of,
            min_items: max_opt(self.min_items, other.min_items),
            max_items: min_opt(self.max_items, other.max_items),
            unique_items: self.unique_items || other.unique_items,
            format,
            description: self
                .description
                .clone()
                .or_else(|| other.description.clone()),
            examples,
            default: self.default.clone().or_else(|| other.default.clone()),
            read_only: self.read_only || other.read_only,
            write_only: self.write_only || other.write_only,
            deprecated: self.deprecated || other.deprecated,
        })
    }
}

fn max_opt<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if a > b { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn min_opt<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if a < b { a } else { b }),
        (a, b) => a.or(b),
    }
}

// =============================================================================
// Supporting Types
// =============================================================================

/// A named enum member; order mirrors the source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    pub value: Value,
    pub kind: PrimitiveKind,
}

/// Discriminator attached to a union
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discriminator {
    pub field: String,
    /// Ordered (discriminator value, variant model) pairs
    pub mapping: Vec<(String, ModelId)>,
}

/// How a type became optional; recorded for downstream emission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullableOrigin {
    ExplicitNull,
    AnyOfWithNull,
    NotRequired,
    XNullable,
}

/// How a mapping came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdditionalPolicy {
    /// `additionalProperties: true`
    Allow,
    /// `additionalProperties: { ... }`
    Schema,
}

// =============================================================================
// DataType
// =============================================================================

/// The central algebra: one variant per generated type shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataTypeKind {
    Primitive(PrimitiveKind),
    Literal(Value),
    Enum(Vec<EnumMember>),
    Array {
        items: Box<DataType>,
    },
    Mapping {
        key: Box<DataType>,
        value: Box<DataType>,
        policy: AdditionalPolicy,
    },
    Union {
        variants: Vec<DataType>,
        discriminator: Option<Discriminator>,
        mode: UnionMode,
    },
    Intersection {
        bases: Vec<ModelId>,
        merge_mode: AllOfMergeMode,
    },
    ModelRef(ModelId),
    RootWrapper(Box<DataType>),
    Optional {
        inner: Box<DataType>,
        origin: NullableOrigin,
    },
    /// Only inserted by the ordering phase to break cycles
    ForwardRef(String),
}

/// A DataType together with its constraint side-structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataType {
    pub kind: DataTypeKind,
    pub constraints: Constraints,
}

impl DataType {
    pub fn new(kind: DataTypeKind) -> Self {
        Self {
            kind,
            constraints: Constraints::default(),
        }
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::new(DataTypeKind::Primitive(kind))
    }

    pub fn any() -> Self {
        Self::primitive(PrimitiveKind::Any)
    }

    pub fn model_ref(id: ModelId) -> Self {
        Self::new(DataTypeKind::ModelRef(id))
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn is_optional(&self) -> bool {
        matches!(self.kind, DataTypeKind::Optional { .. })
    }

    /// Structural equality; union variants compare as a multiset under
    /// `smart` mode and positionally under `left_to_right`.
    pub fn structurally_equal(&self, other: &DataType) -> bool {
        if self.constraints != other.constraints {
            return false;
        }
        match (&self.kind, &other.kind) {
            (
                DataTypeKind::Union {
                    variants: a,
                    discriminator: da,
                    mode: UnionMode::Smart,
                },
                DataTypeKind::Union {
                    variants: b,
                    discriminator: db,
                    mode: UnionMode::Smart,
                },
            ) => {
                if a.len() != b.len() || da != db {
                    return false;
                }
                let mut used = vec![false; b.len()];
                'outer: for variant in a {
                    for (i, candidate) in b.iter().enumerate() {
                        if !used[i] && variant.structurally_equal(candidate) {
                            used[i] = true;
                            continue 'outer;
                        }
                    }
                    return false;
                }
                true
            }
            (
                DataTypeKind::Array { items: a },
                DataTypeKind::Array { items: b },
            ) => a.structurally_equal(b),
            (
                DataTypeKind::Mapping {
                    key: ka,
                    value: va,
                    policy: pa,
                },
                DataTypeKind::Mapping {
                    key: kb,
                    value: vb,
                    policy: pb,
                },
            ) => pa == pb && ka.structurally_equal(kb) && va.structurally_equal(vb),
            (DataTypeKind::RootWrapper(a), DataTypeKind::RootWrapper(b)) => {
                a.structurally_equal(b)
            }
            (
                DataTypeKind::Optional { inner: a, .. },
                DataTypeKind::Optional { inner: b, .. },
            ) => a.structurally_equal(b),
            (a, b) => a == b,
        }
    }

    /// Collect model ids referenced directly (not behind an Optional).
    /// These are the edges the dependency graph orders by.
    pub fn direct_model_refs(&self, out: &mut Vec<ModelId>) {
        match &self.kind {
            DataTypeKind::ModelRef(id) => out.push(*id),
            DataTypeKind::Intersection { bases, .. } => out.extend(bases.iter().copied()),
            DataTypeKind::Array { items } => items.direct_model_refs(out),
            DataTypeKind::Mapping { key, value, .. } => {
                key.direct_model_refs(out);
                value.direct_model_refs(out);
            }
            DataTypeKind::Union { variants, .. } => {
                for variant in variants {
                    variant.direct_model_refs(out);
                }
            }
            DataTypeKind::RootWrapper(inner) => inner.direct_model_refs(out),
            DataTypeKind::Optional { .. } => {}
            _ => {}
        }
    }

    /// Collect every referenced model id, including behind Optional.
    /// Import computation needs the full set.
    pub fn all_model_refs(&self, out: &mut Vec<ModelId>) {
        match &self.kind {
            DataTypeKind::ModelRef(id) => out.push(*id),
            DataTypeKind::Intersection { bases, .. } => out.extend(bases.iter().copied()),
            DataTypeKind::Array { items } => items.all_model_refs(out),
            DataTypeKind::Mapping { key, value, .. } => {
                key.all_model_refs(out);
                value.all_model_refs(out);
            }
            DataTypeKind::Union { variants, .. } => {
                for variant in variants {
                    variant.all_model_refs(out);
                }
            }
            DataTypeKind::RootWrapper(inner) => inner.all_model_refs(out),
            DataTypeKind::Optional { inner, .. } => inner.all_model_refs(out),
            _ => {}
        }
    }

    /// Replace every `ModelRef(target)` with a full replacement type.
    /// Root-wrapper collapse uses this to splice the wrapper's payload
    /// into its referrers.
    pub fn replace_model_ref(&mut self, target: ModelId, replacement: &DataType) {
        if self.kind == DataTypeKind::ModelRef(target) {
            let constraints = std::mem::take(&mut self.constraints);
            *self = replacement.clone();
            if self.constraints.is_empty() {
                self.constraints = constraints;
            }
            return;
        }
        match &mut self.kind {
            DataTypeKind::Array { items } => items.replace_model_ref(target, replacement),
            DataTypeKind::Mapping { key, value, .. } => {
                key.replace_model_ref(target, replacement);
                value.replace_model_ref(target, replacement);
            }
            DataTypeKind::Union { variants, .. } => {
                for variant in variants {
                    variant.replace_model_ref(target, replacement);
                }
            }
            DataTypeKind::RootWrapper(inner) => inner.replace_model_ref(target, replacement),
            DataTypeKind::Optional { inner, .. } => inner.replace_model_ref(target, replacement),
            _ => {}
        }
    }

    /// Rewrite every model reference through `f`. Used when dedup elects
    /// survivors and when root wrappers collapse.
    pub fn map_model_refs(&mut self, f: &mut impl FnMut(ModelId) -> ModelId) {
        match &mut self.kind {
            DataTypeKind::ModelRef(id) => *id = f(*id),
            DataTypeKind::Intersection { bases, .. } => {
                for base in bases {
                    *base = f(*base);
                }
            }
            DataTypeKind::Array { items } => items.map_model_refs(f),
            DataTypeKind::Mapping { key, value, .. } => {
                key.map_model_refs(f);
                value.map_model_refs(f);
            }
            DataTypeKind::Union {
                variants,
                discriminator,
                ..
            } => {
                for variant in variants.iter_mut() {
                    variant.map_model_refs(f);
                }
                if let Some(discriminator) = discriminator {
                    for (_, id) in discriminator.mapping.iter_mut() {
                        *id = f(*id);
                    }
                }
            }
            DataTypeKind::RootWrapper(inner) => inner.map_model_refs(f),
            DataTypeKind::Optional { inner, .. } => inner.map_model_refs(f),
            _ => {}
        }
    }
}

// =============================================================================
// Algebra Operations
// =============================================================================

/// Wrap a type as optional. Idempotent: the existing origin wins. The
/// payload's constraints hoist to the wrapper so they stay attached to the
/// carrying type of the field.
pub fn optionalize(mut ty: DataType, origin: NullableOrigin) -> DataType {
    if ty.is_optional() {
        return ty;
    }
    let constraints = std::mem::take(&mut ty.constraints);
    DataType {
        kind: DataTypeKind::Optional {
            inner: Box::new(ty),
            origin,
        },
        constraints,
    }
}

/// Unify two types into one that accepts both.
///
/// `unify(Optional(T), U) = Optional(unify(T, U))` and `unify(T, T) = T`;
/// anything else becomes (or extends) a smart-mode union.
pub fn unify(a: DataType, b: DataType) -> DataType {
    if a.structurally_equal(&b) {
        return a;
    }
    match (a, b) {
        (
            DataType {
                kind: DataTypeKind::Optional { inner, origin },
                constraints,
            },
            other,
        ) => {
            let inner = unify(*inner, other);
            DataType {
                kind: DataTypeKind::Optional {
                    inner: Box::new(inner),
                    origin,
                },
                constraints,
            }
        }
        (
            other,
            DataType {
                kind: DataTypeKind::Optional { inner, origin },
                constraints,
            },
        ) => {
            let inner = unify(other, *inner);
            DataType {
                kind: DataTypeKind::Optional {
                    inner: Box::new(inner),
                    origin,
                },
                constraints,
            }
        }
        (
            DataType {
                kind:
                    DataTypeKind::Union {
                        variants: mut va,
                        discriminator,
                        mode: UnionMode::Smart,
                    },
                constraints,
            },
            other,
        ) => {
            let extra = match other.kind {
                DataTypeKind::Union {
                    variants,
                    mode: UnionMode::Smart,
                    ..
                } => variants,
                _ => vec![other],
            };
            for variant in extra {
                if !va.iter().any(|v| v.structurally_equal(&variant)) {
                    va.push(variant);
                }
            }
            DataType {
                kind: DataTypeKind::Union {
                    variants: va,
                    discriminator,
                    mode: UnionMode::Smart,
                },
                constraints,
            }
        }
        (a, b) => DataType::new(DataTypeKind::Union {
            variants: vec![a, b],
            discriminator: None,
            mode: UnionMode::Smart,
        }),
    }
}

/// Intersect two types.
///
/// Two model references produce an `Intersection` (fields are never inlined
/// here; that is the model builder's job). Matching primitives merge their
/// constraints; anything else is a merge error.
pub fn intersect(
    a: DataType,
    b: DataType,
    merge_mode: AllOfMergeMode,
    path: &str,
) -> Result<DataType> {
    match (a.kind.clone(), b.kind.clone()) {
        (DataTypeKind::ModelRef(x), DataTypeKind::ModelRef(y)) => {
            Ok(DataType::new(DataTypeKind::Intersection {
                bases: vec![x, y],
                merge_mode,
            })
            .with_constraints(a.constraints.merge(&b.constraints, path)?))
        }
        (DataTypeKind::Intersection { mut bases, .. }, DataTypeKind::ModelRef(y)) => {
            bases.push(y);
            Ok(DataType::new(DataTypeKind::Intersection { bases, merge_mode })
                .with_constraints(a.constraints.merge(&b.constraints, path)?))
        }
        (DataTypeKind::Primitive(x), DataTypeKind::Primitive(y)) if x == y => {
            constrain(a, &b.constraints, path)
        }
        (DataTypeKind::Primitive(PrimitiveKind::Any), _) => constrain(b, &a.constraints, path),
        (_, DataTypeKind::Primitive(PrimitiveKind::Any)) => constrain(a, &b.constraints, path),
        (x, y) => Err(GeneratorError::SchemaMerge {
            path: path.to_string(),
            reason: format!("cannot intersect {} with {}", kind_name(&x), kind_name(&y)),
        }),
    }
}

/// Attach additional constraints to a type
pub fn constrain(mut ty: DataType, constraints: &Constraints, path: &str) -> Result<DataType> {
    ty.constraints = ty.constraints.merge(constraints, path)?;
    Ok(ty)
}

/// Widen a type: literals and enums relax to their base primitive and
/// validation constraints are dropped. Annotations survive.
pub fn widen(ty: DataType) -> DataType {
    let annotations = Constraints {
        description: ty.constraints.description.clone(),
        default: ty.constraints.default.clone(),
        examples: ty.constraints.examples.clone(),
        ..Constraints::default()
    };
    let kind = match ty.kind {
        DataTypeKind::Literal(value) => DataTypeKind::Primitive(PrimitiveKind::of_value(&value)),
        DataTypeKind::Enum(members) => {
            let kinds: Vec<PrimitiveKind> = members.iter().map(|m| m.kind).collect();
            let first = kinds.first().copied().unwrap_or(PrimitiveKind::Any);
            if kinds.iter().all(|k| *k == first) {
                DataTypeKind::Primitive(first)
            } else {
                DataTypeKind::Primitive(PrimitiveKind::Any)
            }
        }
        DataTypeKind::Optional { inner, origin } => DataTypeKind::Optional {
            inner: Box::new(widen(*inner)),
            origin,
        },
        other => other,
    };
    DataType::new(kind).with_constraints(annotations)
}

fn kind_name(kind: &DataTypeKind) -> &'static str {
    match kind {
        DataTypeKind::Primitive(_) => "primitive",
        DataTypeKind::Literal(_) => "literal",
        DataTypeKind::Enum(_) => "enum",
        DataTypeKind::Array { .. } => "array",
        DataTypeKind::Mapping { .. } => "mapping",
        DataTypeKind::Union { .. } => "union",
        DataTypeKind::Intersection { .. } => "intersection",
        DataTypeKind::ModelRef(_) => "model reference",
        DataTypeKind::RootWrapper(_) => "root wrapper",
        DataTypeKind::Optional { .. } => "optional",
        DataTypeKind::ForwardRef(_) => "forward reference",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_optionalize_idempotent() {
        let once = optionalize(
            DataType::primitive(PrimitiveKind::Str),
            NullableOrigin::ExplicitNull,
        );
        let twice = optionalize(once.clone(), NullableOrigin::NotRequired);
        assert_eq!(once, twice);
        // The original origin is preserved
        match &twice.kind {
            DataTypeKind::Optional { origin, .. } => {
                assert_eq!(*origin, NullableOrigin::ExplicitNull);
            }
            other => panic!("expected Optional, got {other:?}"),
        }
    }

    #[test]
    fn test_unify_identity() {
        let a = DataType::primitive(PrimitiveKind::Int);
        assert_eq!(unify(a.clone(), a.clone()), a);
    }

    #[test]
    fn test_unify_optional_distributes() {
        let opt_str = optionalize(
            DataType::primitive(PrimitiveKind::Str),
            NullableOrigin::ExplicitNull,
        );
        let unified = unify(opt_str, DataType::primitive(PrimitiveKind::Int));
        match unified.kind {
            DataTypeKind::Optional { inner, .. } => match inner.kind {
                DataTypeKind::Union { variants, .. } => assert_eq!(variants.len(), 2),
                other => panic!("expected Union inside Optional, got {other:?}"),
            },
            other => panic!("expected Optional, got {other:?}"),
        }
    }

    #[test]
    fn test_smart_union_order_insensitive() {
        let ab = DataType::new(DataTypeKind::Union {
            variants: vec![
                DataType::primitive(PrimitiveKind::Str),
                DataType::primitive(PrimitiveKind::Int),
            ],
            discriminator: None,
            mode: UnionMode::Smart,
        });
        let ba = DataType::new(DataTypeKind::Union {
            variants: vec![
                DataType::primitive(PrimitiveKind::Int),
                DataType::primitive(PrimitiveKind::Str),
            ],
            discriminator: None,
            mode: UnionMode::Smart,
        });
        assert!(ab.structurally_equal(&ba));
        // Unifying equal unions keeps the left-hand side unchanged
        assert_eq!(unify(ab.clone(), ba), ab);
    }

    #[test]
    fn test_constraint_merge_tightens() {
        let a = Constraints {
            minimum: Some(1.0),
            ..Constraints::default()
        };
        let b = Constraints {
            minimum: Some(3.0),
            maximum: Some(10.0),
            ..Constraints::default()
        };
        let merged = a.merge(&b, "#/x").unwrap();
        assert_eq!(merged.minimum, Some(3.0));
        assert_eq!(merged.maximum, Some(10.0));
    }

    #[test]
    fn test_format_conflict_errors() {
        let a = Constraints {
            format: Some("uuid".to_string()),
            ..Constraints::default()
        };
        let b = Constraints {
            format: Some("email".to_string()),
            ..Constraints::default()
        };
        assert!(matches!(
            a.merge(&b, "#/x"),
            Err(GeneratorError::SchemaMerge { .. })
        ));
    }

    #[test]
    fn test_widen_literal() {
        let literal = DataType::new(DataTypeKind::Literal(json!("fixed")));
        let widened = widen(literal);
        assert_eq!(widened.kind, DataTypeKind::Primitive(PrimitiveKind::Str));
    }

    #[test]
    fn test_pattern_conjunction() {
        let a = Constraints {
            pattern: Some("^a".to_string()),
            ..Constraints::default()
        };
        let b = Constraints {
            pattern: Some("z$".to_string()),
            ..Constraints::default()
        };
        let merged = a.merge(&b, "#/x").unwrap();
        assert_eq!(merged.pattern.as_deref(), Some("(?=^a)z$"));
    }
}
