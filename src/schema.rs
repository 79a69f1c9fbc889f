//! Recursive JSON schema walker: turns a schema document into generated records.
//!
//! A schema document is an ordinary JSON value used as a *shape template*: object keys become
//! field paths, arrays are expanded to a configurable length (using their first element as the
//! prototype for every generated element), and scalar leaves dispatch to the value generator
//! keyed by their JSON type. Field paths collapse the same way regardless of nesting depth:
//! `orders[].id`, never `orders[][].id` for a doubly-nested array.

use indexmap::IndexMap;

use crate::context::RunContext;
use crate::error::Error;
use crate::generator::{default_rule, generate_value};
use crate::model::{ColumnInfo, FieldRule};
use crate::value::Value;

const DEFAULT_ARRAY_LENGTH: usize = 3;

/// Generates one flat record for `columns`, used by `database` and `csv` task types.
///
/// A column with no entry in `field_rules` gets [`default_rule`] (auto-increment sequence for
/// auto-increment columns, `random` otherwise).
pub fn generate_record(
    ctx: &mut RunContext,
    columns: &[ColumnInfo],
    field_rules: &std::collections::HashMap<String, FieldRule>,
    unique_fields: &[String],
) -> Result<IndexMap<String, Value>, Error> {
    let mut record = IndexMap::with_capacity(columns.len());
    for column in columns {
        let synthesized;
        let rule = match field_rules.get(&column.name) {
            Some(rule) => rule,
            None => {
                synthesized = default_rule(column.is_auto_increment);
                &synthesized
            }
        };
        let is_unique = unique_fields.iter().any(|f| f == &column.name);
        let value = generate_value(ctx, &column.name, &column.kind, rule, is_unique)
            .map_err(|e| Error::generation(&column.name, e.to_string()))?;
        record.insert(column.name.clone(), value);
    }
    Ok(record)
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_owned()
    } else {
        format!("{parent}.{key}")
    }
}

fn array_element_path(parent: &str) -> String {
    format!("{parent}[]")
}

/// Generates a single JSON object from `schema`, honoring `unique_fields` for leaf paths that
/// must not repeat within the run.
pub fn generate_json_object(
    ctx: &mut RunContext,
    schema: &serde_json::Value,
    field_rules: &std::collections::HashMap<String, FieldRule>,
    unique_fields: &[String],
) -> Result<IndexMap<String, Value>, Error> {
    match generate_json_value(ctx, "", schema, field_rules, unique_fields)? {
        Value::Map(map) => Ok(map),
        _ => Err(Error::generation("<root>", "JSON schema must be an object at the top level")),
    }
}

/// Walks `schema` and produces one generated value per node, applying `field_rules` by path and
/// falling back to an untyped `random` rule for paths with no explicit entry.
fn generate_json_value(
    ctx: &mut RunContext,
    path: &str,
    schema: &serde_json::Value,
    field_rules: &std::collections::HashMap<String, FieldRule>,
    unique_fields: &[String],
) -> Result<Value, Error> {
    match schema {
        serde_json::Value::Object(obj) => {
            let mut result = IndexMap::with_capacity(obj.len());
            for (key, child_schema) in obj {
                let child_path = join_path(path, key);
                let value = generate_json_value(ctx, &child_path, child_schema, field_rules, unique_fields)?;
                result.insert(key.clone(), value);
            }
            Ok(Value::Map(result))
        }
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return Ok(Value::List(Vec::new()));
            }
            let length = field_rules
                .get(path)
                .and_then(|rule| rule.param_f64("length"))
                .map_or(DEFAULT_ARRAY_LENGTH, |v| v as usize);

            let element_path = array_element_path(path);
            let prototype = &items[0];
            let mut result = Vec::with_capacity(length);
            for _ in 0..length {
                result.push(generate_json_value(ctx, &element_path, prototype, field_rules, unique_fields)?);
            }
            Ok(Value::List(result))
        }
        serde_json::Value::String(_) => generate_leaf(ctx, path, "string", field_rules, unique_fields),
        serde_json::Value::Number(n) if n.is_f64() && n.as_f64().map(|f| f.fract() != 0.0).unwrap_or(false) => {
            generate_leaf(ctx, path, "decimal", field_rules, unique_fields)
        }
        serde_json::Value::Number(_) => generate_leaf(ctx, path, "int", field_rules, unique_fields),
        other => Ok(Value::from(other.clone())),
    }
}

fn generate_leaf(
    ctx: &mut RunContext,
    path: &str,
    field_type: &str,
    field_rules: &std::collections::HashMap<String, FieldRule>,
    unique_fields: &[String],
) -> Result<Value, Error> {
    let default_rule = FieldRule::random();
    let rule = field_rules.get(path).unwrap_or(&default_rule);
    let is_unique = unique_fields.iter().any(|f| f == path);
    generate_value(ctx, path, field_type, rule, is_unique)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ctx() -> RunContext {
        RunContext::with_rng(StdRng::seed_from_u64(7))
    }

    #[test]
    fn object_keys_become_dotted_paths() {
        let mut ctx = ctx();
        let schema = serde_json::json!({"user": {"name": "x", "age": 1}});
        let rules = Default::default();
        let obj = generate_json_object(&mut ctx, &schema, &rules, &[]).unwrap();
        let Value::Map(user) = &obj["user"] else { panic!("expected map") };
        assert!(user.contains_key("name"));
        assert!(user.contains_key("age"));
    }

    #[test]
    fn arrays_default_to_three_elements_using_first_as_prototype() {
        let mut ctx = ctx();
        let schema = serde_json::json!({"tags": ["x"]});
        let rules = Default::default();
        let obj = generate_json_object(&mut ctx, &schema, &rules, &[]).unwrap();
        let Value::List(tags) = &obj["tags"] else { panic!("expected list") };
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn array_length_is_configurable_via_field_rules() {
        let mut ctx = ctx();
        let schema = serde_json::json!({"tags": ["x"]});
        let mut rules = std::collections::HashMap::new();
        let mut rule = FieldRule::random();
        rule.parameters.insert("length".to_owned(), serde_json::json!(5.0));
        rules.insert("tags".to_owned(), rule);
        let obj = generate_json_object(&mut ctx, &schema, &rules, &[]).unwrap();
        let Value::List(tags) = &obj["tags"] else { panic!("expected list") };
        assert_eq!(tags.len(), 5);
    }

    #[test]
    fn nested_array_path_collapses_regardless_of_depth() {
        let mut ctx = ctx();
        let schema = serde_json::json!({"orders": [{"items": ["sku"]}]});
        let mut rules = std::collections::HashMap::new();
        let mut fixed = FieldRule::random();
        fixed.r#type = "fixed".to_owned();
        fixed.parameters.insert("value".to_owned(), serde_json::json!("ABC"));
        rules.insert("orders[].items[]".to_owned(), fixed);
        let obj = generate_json_object(&mut ctx, &schema, &rules, &[]).unwrap();
        let Value::List(orders) = &obj["orders"] else { panic!("expected list") };
        let Value::Map(order) = &orders[0] else { panic!("expected map") };
        let Value::List(items) = &order["items"] else { panic!("expected list") };
        assert_eq!(items[0], Value::Str("ABC".to_owned()));
    }

    #[test]
    fn unique_fields_apply_to_leaf_paths() {
        let mut ctx = ctx();
        let schema = serde_json::json!({"email": "x"});
        let mut rules = std::collections::HashMap::new();
        let mut rule = FieldRule::random();
        rule.r#type = "enum".to_owned();
        rule.parameters.insert("values".to_owned(), serde_json::json!("a,b"));
        rules.insert("email".to_owned(), rule);
        ctx.max_unique_retries = 1;
        let first = generate_json_object(&mut ctx, &schema, &rules, &["email".to_owned()]).unwrap();
        let second = generate_json_object(&mut ctx, &schema, &rules, &["email".to_owned()]).unwrap();
        assert_ne!(first["email"], second["email"]);
    }

    #[test]
    fn record_uses_auto_increment_default_for_unruled_pk_column() {
        let mut ctx = ctx();
        let columns = vec![
            ColumnInfo {
                name: "id".to_owned(),
                kind: "int".to_owned(),
                nullable: false,
                default_value: String::new(),
                is_primary_key: true,
                is_auto_increment: true,
                max_length: 0,
            },
            ColumnInfo {
                name: "name".to_owned(),
                kind: "varchar".to_owned(),
                nullable: false,
                default_value: String::new(),
                is_primary_key: false,
                is_auto_increment: false,
                max_length: 255,
            },
        ];
        let rules = Default::default();
        let first = generate_record(&mut ctx, &columns, &rules, &[]).unwrap();
        let second = generate_record(&mut ctx, &columns, &rules, &[]).unwrap();
        assert_eq!(first["id"], Value::Int(1.into()));
        assert_eq!(second["id"], Value::Int(2.into()));
    }
}
