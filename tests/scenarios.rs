//! End-to-end scenarios
//!
//! Drives the full pipeline over literal fixtures and checks the
//! behaviors the generator guarantees: cycle recovery, nullable
//! normalization, allOf constraint merging, tree-scope dedup, collision
//! handling, root-wrapper collapsing, and byte-level determinism.

use pretty_assertions::assert_eq;
use serde_json::json;

use modelgen::config::{
    AllOfMergeMode, CollapseRootModelsNameStrategy, OutputModelType, ReuseScope,
};
use modelgen::{generate, GenerateConfig, GeneratorError, Input};

fn text_input(document: serde_json::Value) -> Input {
    Input::Text {
        name: "models.json".to_string(),
        text: document.to_string(),
    }
}

fn single_output(artifacts: &modelgen::Artifacts) -> String {
    assert_eq!(artifacts.files.len(), 1, "expected one module");
    String::from_utf8(artifacts.files[0].1.clone()).unwrap()
}

// =============================================================================
// Cycle recovery
// =============================================================================

#[test]
fn test_circular_reference_breaks_lexicographically() {
    let input = text_input(json!({
        "definitions": {
            "A": {
                "type": "object",
                "properties": {"b": {"$ref": "#/definitions/B"}},
                "required": ["b"]
            },
            "B": {
                "type": "object",
                "properties": {"a": {"$ref": "#/definitions/A"}},
                "required": ["a"]
            }
        }
    }));
    let artifacts = generate(&input, &GenerateConfig::default()).unwrap();
    let output = single_output(&artifacts);

    // A keeps the direct reference, B carries the forward reference
    assert!(output.contains("b: B"), "output:\n{output}");
    assert!(output.contains("a: 'A'"), "output:\n{output}");
    assert!(output.contains("B.model_rebuild()"), "output:\n{output}");
    assert!(!output.contains("A.model_rebuild()"), "output:\n{output}");

    // The dependency-free side is emitted first
    let b_at = output.find("class B(").unwrap();
    let a_at = output.find("class A(").unwrap();
    assert!(b_at < a_at);
}

// =============================================================================
// Nullable normalization
// =============================================================================

#[test]
fn test_three_nullable_forms_emit_identically() {
    let input = text_input(json!({
        "type": "object",
        "title": "Thing",
        "properties": {
            "a": {"type": ["string", "null"]},
            "b": {"anyOf": [{"type": "string"}, {"type": "null"}]},
            "c": {"type": "string", "nullable": true}
        },
        "required": ["a", "b", "c"]
    }));
    let artifacts = generate(&input, &GenerateConfig::default()).unwrap();
    let output = single_output(&artifacts);

    for field in ["a", "b", "c"] {
        assert!(
            output.contains(&format!("    {field}: Optional[str]\n")),
            "field {field} not normalized:\n{output}"
        );
    }
}

#[test]
fn test_strict_nullable_keeps_not_required_bare() {
    let input = text_input(json!({
        "type": "object",
        "title": "Thing",
        "properties": {"name": {"type": "string"}}
    }));
    let config = GenerateConfig {
        strict_nullable: true,
        ..GenerateConfig::default()
    };
    let artifacts = generate(&input, &config).unwrap();
    let output = single_output(&artifacts);
    assert!(output.contains("    name: str = None\n"), "output:\n{output}");
    assert!(!output.contains("Optional[str]"), "output:\n{output}");
}

// =============================================================================
// allOf merging
// =============================================================================

#[test]
fn test_allof_merges_tighter_constraints() {
    let input = text_input(json!({
        "definitions": {
            "Parent": {
                "type": "object",
                "properties": {"x": {"type": "integer", "minimum": 1}}
            },
            "Child": {
                "allOf": [
                    {"$ref": "#/definitions/Parent"},
                    {"type": "object", "properties": {"x": {"maximum": 10}}}
                ]
            }
        }
    }));
    let artifacts = generate(&input, &GenerateConfig::default()).unwrap();
    let output = single_output(&artifacts);

    assert!(
        output.contains("    x: Optional[int] = Field(None, ge=1, le=10)\n"),
        "output:\n{output}"
    );
    // Constraint merge mode inlines the parent instead of subclassing
    assert!(output.contains("class Child(BaseModel)"), "output:\n{output}");
}

#[test]
fn test_conflicting_formats_fail_the_merge() {
    let input = text_input(json!({
        "definitions": {
            "Parent": {
                "type": "object",
                "properties": {"x": {"type": "string", "format": "uuid"}}
            },
            "Child": {
                "allOf": [
                    {"$ref": "#/definitions/Parent"},
                    {"type": "object", "properties": {"x": {"type": "string", "format": "email"}}}
                ]
            }
        }
    }));
    let result = generate(&input, &GenerateConfig::default());
    assert!(matches!(result, Err(GeneratorError::SchemaMerge { .. })));
}

// =============================================================================
// Deduplication
// =============================================================================

#[test]
fn test_tree_scope_dedup_moves_survivor_to_shared_module() {
    let address = json!({
        "type": "object",
        "properties": {"street": {"type": "string"}},
        "required": ["street"]
    });
    let directory = tempfile::tempdir().unwrap();
    std::fs::write(
        directory.path().join("customers.json"),
        json!({
            "type": "object",
            "title": "Customer",
            "properties": {
                "name": {"type": "string"},
                "address": {"$ref": "#/definitions/Address"}
            },
            "required": ["name", "address"],
            "definitions": {"Address": address}
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        directory.path().join("orders.json"),
        json!({
            "type": "object",
            "title": "Order",
            "properties": {
                "total": {"type": "number"},
                "address": {"$ref": "#/definitions/Address"}
            },
            "required": ["total", "address"],
            "definitions": {"Address": address}
        })
        .to_string(),
    )
    .unwrap();

    let config = GenerateConfig {
        reuse_scope: ReuseScope::Tree,
        ..GenerateConfig::default()
    };
    let artifacts = generate(&Input::Path(directory.path().to_path_buf()), &config).unwrap();

    let by_path: std::collections::BTreeMap<String, String> = artifacts
        .files
        .iter()
        .map(|(path, bytes)| (path.clone(), String::from_utf8(bytes.clone()).unwrap()))
        .collect();

    // Exactly one definition of Address, in the shared module
    let definitions = by_path
        .values()
        .filter(|source| source.contains("class Address("))
        .count();
    assert_eq!(definitions, 1);
    assert!(by_path["shared"].contains("class Address("));

    // Both dependents import the survivor
    for module in ["customers", "orders"] {
        assert!(
            by_path[module].contains("from .shared import Address"),
            "{module}:\n{}",
            by_path[module]
        );
    }
}

// =============================================================================
// Name collisions
// =============================================================================

#[test]
fn test_field_type_collision_renames_field_with_alias() {
    let input = text_input(json!({
        "type": "object",
        "title": "Envelope",
        "properties": {"Name": {"$ref": "#/definitions/Name"}},
        "required": ["Name"],
        "definitions": {
            "Name": {
                "type": "object",
                "properties": {"value": {"type": "string"}},
                "required": ["value"]
            }
        }
    }));
    let artifacts = generate(&input, &GenerateConfig::default()).unwrap();
    let output = single_output(&artifacts);

    // The class keeps its name; the field is renamed and aliased to the
    // exact wire name
    assert!(output.contains("class Name(BaseModel)"), "output:\n{output}");
    assert!(
        output.contains("    name_: Name = Field(..., alias='Name')\n"),
        "output:\n{output}"
    );
}

// =============================================================================
// Root wrapper collapsing
// =============================================================================

#[test]
fn test_collapse_root_models_parent_strategy() {
    let input = text_input(json!({
        "title": "Pets",
        "type": "array",
        "items": {"$ref": "#/definitions/Pet"},
        "definitions": {
            "Pet": {
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            }
        }
    }));
    let config = GenerateConfig {
        collapse_root_models: true,
        collapse_name_strategy: CollapseRootModelsNameStrategy::Parent,
        ..GenerateConfig::default()
    };
    let artifacts = generate(&input, &config).unwrap();
    let output = single_output(&artifacts);

    // The wrapper vanished and the item class took its name
    assert!(!output.contains("RootModel"), "output:\n{output}");
    assert!(!output.contains("class Pet("), "output:\n{output}");
    assert!(output.contains("class Pets(BaseModel)"), "output:\n{output}");
    assert!(output.contains("    name: str\n"), "output:\n{output}");
}

#[test]
fn test_root_wrapper_kept_without_collapse() {
    let input = text_input(json!({
        "title": "Pets",
        "type": "array",
        "items": {"$ref": "#/definitions/Pet"},
        "definitions": {
            "Pet": {
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            }
        }
    }));
    let artifacts = generate(&input, &GenerateConfig::default()).unwrap();
    let output = single_output(&artifacts);
    assert!(
        output.contains("class Pets(RootModel[list[Pet]])"),
        "output:\n{output}"
    );
}

// =============================================================================
// Unsupported features
// =============================================================================

#[test]
fn test_typed_dict_refuses_multiple_inheritance() {
    let input = text_input(json!({
        "definitions": {
            "A": {"type": "object", "properties": {"a": {"type": "string"}}},
            "B": {"type": "object", "properties": {"b": {"type": "string"}}},
            "Child": {"allOf": [{"$ref": "#/definitions/A"}, {"$ref": "#/definitions/B"}]}
        }
    }));
    let config = GenerateConfig {
        output_model_type: OutputModelType::TypedDict,
        all_of_merge_mode: AllOfMergeMode::NoMerge,
        ..GenerateConfig::default()
    };
    let result = generate(&input, &config);
    assert!(matches!(
        result,
        Err(GeneratorError::UnsupportedFeature { .. })
    ));

    // allOf merge mode `all` inlines the parents instead
    let config = GenerateConfig {
        output_model_type: OutputModelType::TypedDict,
        all_of_merge_mode: AllOfMergeMode::All,
        ..GenerateConfig::default()
    };
    assert!(generate(&input, &config).is_ok());
}

// =============================================================================
// OpenAPI and GraphQL inputs
// =============================================================================

#[test]
fn test_openapi_components_schemas() {
    let input = Input::Text {
        name: "petstore.yaml".to_string(),
        text: r##"
openapi: "3.0.0"
info:
  title: Petstore
components:
  schemas:
    Pet:
      type: object
      properties:
        id:
          type: integer
        name:
          type: string
      required: [id, name]
    Pets:
      type: array
      items:
        $ref: "#/components/schemas/Pet"
"##
        .to_string(),
    };
    let artifacts = generate(&input, &GenerateConfig::default()).unwrap();
    let output = single_output(&artifacts);
    assert!(output.contains("class Pet(BaseModel)"), "output:\n{output}");
    assert!(output.contains("    id: int\n"), "output:\n{output}");
    assert!(
        output.contains("class Pets(RootModel[list[Pet]])"),
        "output:\n{output}"
    );
}

#[test]
fn test_graphql_schema_input() {
    let input = Input::Text {
        name: "schema.graphql".to_string(),
        text: r#"
enum Episode {
  NEWHOPE
  EMPIRE
}

type Human {
  id: ID!
  name: String!
  appearsIn: [Episode!]
}
"#
        .to_string(),
    };
    let artifacts = generate(&input, &GenerateConfig::default()).unwrap();
    let output = single_output(&artifacts);
    assert!(output.contains("class Episode(Enum)"), "output:\n{output}");
    assert!(output.contains("NEWHOPE = 'NEWHOPE'"), "output:\n{output}");
    assert!(output.contains("class Human(BaseModel)"), "output:\n{output}");
    assert!(output.contains("    id: str\n"), "output:\n{output}");
    assert!(
        output.contains("    appearsIn: Optional[list[Episode]]\n"),
        "output:\n{output}"
    );
}

#[test]
fn test_csv_input_infers_columns() {
    let input = Input::Text {
        name: "people.csv".to_string(),
        text: "name,age\nalice,30\nbob,41\n".to_string(),
    };
    let config = GenerateConfig {
        input_kind: modelgen::InputKind::Csv,
        ..GenerateConfig::default()
    };
    let artifacts = generate(&input, &config).unwrap();
    let output = single_output(&artifacts);
    assert!(output.contains("class People(BaseModel)"), "output:\n{output}");
    assert!(output.contains("name: Optional[str]"), "output:\n{output}");
    assert!(output.contains("age: Optional[int]"), "output:\n{output}");
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_rerun_is_byte_identical() {
    let document = json!({
        "openapi": "3.0.0",
        "components": {
            "schemas": {
                "Owner": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "pets": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}}
                    },
                    "required": ["name"]
                },
                "Pet": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "status": {"enum": ["available", "sold"]}
                    },
                    "required": ["name"]
                }
            }
        }
    });
    let input = text_input(document);
    let config = GenerateConfig::default();

    let first = generate(&input, &config).unwrap();
    let second = generate(&input, &config).unwrap();
    assert_eq!(first.files, second.files);
}

#[test]
fn test_custom_file_header_prefixes_modules() {
    let input = text_input(json!({
        "type": "object",
        "title": "Thing",
        "properties": {"name": {"type": "string"}}
    }));
    let config = GenerateConfig {
        custom_file_header: Some("# (c) example corp".to_string()),
        ..GenerateConfig::default()
    };
    let artifacts = generate(&input, &config).unwrap();
    let output = single_output(&artifacts);
    assert!(output.starts_with("# (c) example corp\n"), "output:\n{output}");
}
