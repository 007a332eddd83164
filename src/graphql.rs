//! GraphQL SDL input
//!
//! Lowers a schema document into the same JSON-Schema-shaped form the rest
//! of the pipeline consumes: object and input types become object schemas,
//! enums become enum schemas, unions become oneOf references, interfaces
//! become allOf bases, and custom scalars become open aliases. `NonNull`
//! maps to `required`; `List` maps to arrays.

use graphql_parser::schema::{
    Definition, Document, EnumType, Field, InputObjectType, InputValue, InterfaceType, ObjectType,
    ScalarType, Type, TypeDefinition, UnionType,
};
use serde_json::{json, Map, Value};

use crate::error::{GeneratorError, Result};

/// Parse SDL and build a `{"$defs": {...}}` document plus the list of
/// definition names in source order
pub fn schema_document(source: &str) -> Result<(Value, Vec<String>)> {
    let document: Document<String> = graphql_parser::schema::parse_schema(source)
        .map_err(|e| GeneratorError::Input(format!("malformed GraphQL schema: {e}")))?;

    let mut defs = Map::new();
    let mut names = Vec::new();

    for definition in &document.definitions {
        let Definition::TypeDefinition(type_definition) = definition else {
            continue;
        };
        let (name, schema) = match type_definition {
            TypeDefinition::Object(object) => (object.name.clone(), object_schema(object)),
            TypeDefinition::Interface(interface) => {
                (interface.name.clone(), interface_schema(interface))
            }
            TypeDefinition::InputObject(input) => (input.name.clone(), input_schema(input)),
            TypeDefinition::Enum(enumeration) => {
                (enumeration.name.clone(), enum_schema(enumeration))
            }
            TypeDefinition::Union(union) => (union.name.clone(), union_schema(union)),
            TypeDefinition::Scalar(scalar) => (scalar.name.clone(), scalar_schema(scalar)),
        };
        names.push(name.clone());
        defs.insert(name, schema);
    }

    Ok((json!({ "$defs": Value::Object(defs) }), names))
}

fn object_schema(object: &ObjectType<String>) -> Value {
    let body = fields_schema(&object.name, object.description.as_deref(), &object.fields);
    if object.implements_interfaces.is_empty() {
        return body;
    }
    // Implemented interfaces become reference bases
    let mut members: Vec<Value> = object
        .implements_interfaces
        .iter()
        .map(|interface| json!({ "$ref": format!("#/$defs/{interface}") }))
        .collect();
    members.push(body);
    json!({ "title": object.name, "allOf": members })
}

fn interface_schema(interface: &InterfaceType<String>) -> Value {
    fields_schema(
        &interface.name,
        interface.description.as_deref(),
        &interface.fields,
    )
}

fn fields_schema(name: &str, description: Option<&str>, fields: &[Field<String>]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in fields {
        if matches!(field.field_type, Type::NonNullType(_)) {
            required.push(Value::String(field.name.clone()));
        }
        properties.insert(field.name.clone(), type_schema(&field.field_type));
    }
    object_value(name, description, properties, required)
}

fn input_schema(input: &InputObjectType<String>) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in &input.fields {
        if matches!(field.value_type, Type::NonNullType(_)) && field.default_value.is_none() {
            required.push(Value::String(field.name.clone()));
        }
        properties.insert(field.name.clone(), input_value_schema(field));
    }
    object_value(&input.name, input.description.as_deref(), properties, required)
}

fn input_value_schema(field: &InputValue<String>) -> Value {
    let mut schema = type_schema(&field.value_type);
    if let (Some(default), Some(object)) = (&field.default_value, schema.as_object_mut()) {
        object.insert("default".to_string(), json!(default.to_string()));
    }
    schema
}

fn object_value(
    name: &str,
    description: Option<&str>,
    properties: Map<String, Value>,
    required: Vec<Value>,
) -> Value {
    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("title".to_string(), json!(name));
    if let Some(description) = description {
        schema.insert("description".to_string(), json!(description));
    }
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    Value::Object(schema)
}

fn enum_schema(enumeration: &EnumType<String>) -> Value {
    let values: Vec<Value> = enumeration
        .values
        .iter()
        .map(|value| Value::String(value.name.clone()))
        .collect();
    let mut schema = Map::new();
    schema.insert("title".to_string(), json!(enumeration.name));
    if let Some(description) = &enumeration.description {
        schema.insert("description".to_string(), json!(description));
    }
    schema.insert("enum".to_string(), Value::Array(values));
    Value::Object(schema)
}

fn union_schema(union: &UnionType<String>) -> Value {
    let members: Vec<Value> = union
        .types
        .iter()
        .map(|member| json!({ "$ref": format!("#/$defs/{member}") }))
        .collect();
    json!({ "title": union.name, "oneOf": members })
}

fn scalar_schema(scalar: &ScalarType<String>) -> Value {
    // Custom scalars carry no structure; they alias to Any
    match scalar.description.as_deref() {
        Some(description) => json!({ "title": scalar.name, "description": description }),
        None => json!({ "title": scalar.name }),
    }
}

/// Map a GraphQL type reference to a schema fragment. Nullability is
/// handled at the field level, so `NonNull` unwraps transparently.
fn type_schema(ty: &Type<String>) -> Value {
    match ty {
        Type::NonNullType(inner) => type_schema(inner),
        Type::ListType(inner) => json!({ "type": "array", "items": type_schema(inner) }),
        Type::NamedType(name) => match name.as_str() {
            "ID" | "String" => json!({ "type": "string" }),
            "Int" => json!({ "type": "integer" }),
            "Float" => json!({ "type": "number" }),
            "Boolean" => json!({ "type": "boolean" }),
            other => json!({ "$ref": format!("#/$defs/{other}") }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDL: &str = r#"
        enum Episode {
            NEWHOPE
            EMPIRE
            JEDI
        }

        interface Character {
            id: ID!
            name: String!
        }

        type Human implements Character {
            id: ID!
            name: String!
            homePlanet: String
            appearsIn: [Episode!]!
        }

        union SearchResult = Human
    "#;

    #[test]
    fn test_definitions_keep_source_order() {
        let (_, names) = schema_document(SDL).unwrap();
        assert_eq!(names, vec!["Episode", "Character", "Human", "SearchResult"]);
    }

    #[test]
    fn test_non_null_marks_required() {
        let (document, _) = schema_document(SDL).unwrap();
        let human = document.pointer("/$defs/Human").unwrap();
        // Interface bases wrap the body in allOf
        let body = human.pointer("/allOf/1").unwrap();
        let required = body.pointer("/required").unwrap().as_array().unwrap();
        let required: Vec<&str> = required.iter().filter_map(Value::as_str).collect();
        assert_eq!(required, vec!["id", "name", "appearsIn"]);
        assert!(human.pointer("/allOf/0/$ref").is_some());
    }

    #[test]
    fn test_list_of_non_null_becomes_array() {
        let (document, _) = schema_document(SDL).unwrap();
        let appears = document
            .pointer("/$defs/Human/allOf/1/properties/appearsIn")
            .unwrap();
        assert_eq!(appears.pointer("/type").unwrap(), "array");
        assert_eq!(
            appears.pointer("/items/$ref").unwrap(),
            "#/$defs/Episode"
        );
    }

    #[test]
    fn test_enum_values() {
        let (document, _) = schema_document(SDL).unwrap();
        let episode = document.pointer("/$defs/Episode/enum").unwrap();
        assert_eq!(episode, &json!(["NEWHOPE", "EMPIRE", "JEDI"]));
    }

    #[test]
    fn test_union_is_oneof_refs() {
        let (document, _) = schema_document(SDL).unwrap();
        assert_eq!(
            document.pointer("/$defs/SearchResult/oneOf/0/$ref").unwrap(),
            "#/$defs/Human"
        );
    }

    #[test]
    fn test_malformed_sdl_is_input_error() {
        assert!(matches!(
            schema_document("type {"),
            Err(GeneratorError::Input(_))
        ));
    }
}
