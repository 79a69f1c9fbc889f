//! The value generator: turns a [`FieldRule`] plus a target type into a [`Value`].
//!
//! This is the Rust counterpart of the original system's per-field dispatch: `fixed`,
//! `sequence`/`increment`, `date_sequence`, `random`, `range`, `regex`, `enum`, `uuid`, `custom`,
//! and `db_lookup`, plus the type-keyed fallback table `random` uses when no rule is given.

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use num_bigint::BigInt;
use rand::Rng;

use crate::context::RunContext;
use crate::error::Error;
use crate::model::FieldRule;
use crate::regexgen;
use crate::value::Value;

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Generates a value for `field_path` of declared type `field_type`, applying `rule`, retrying
/// on uniqueness collisions up to [`RunContext::max_unique_retries`] times.
pub fn generate_value(
    ctx: &mut RunContext,
    field_path: &str,
    field_type: &str,
    rule: &FieldRule,
    is_unique: bool,
) -> Result<Value, Error> {
    for attempt in 0..=ctx.max_unique_retries {
        let value = generate_once(ctx, field_path, field_type, rule)?;
        if ctx.try_claim_unique(field_path, is_unique, &value) {
            return Ok(value);
        }
        if attempt == ctx.max_unique_retries {
            return Err(Error::UniquenessExhausted {
                field: field_path.to_owned(),
                attempts: ctx.max_unique_retries,
            });
        }
    }
    unreachable!("loop always returns or errors on its last iteration")
}

fn generate_once(
    ctx: &mut RunContext,
    field_path: &str,
    field_type: &str,
    rule: &FieldRule,
) -> Result<Value, Error> {
    match rule.r#type.as_str() {
        "fixed" => Ok(rule
            .parameters
            .get("value")
            .or(rule.value.as_ref())
            .cloned()
            .map(Value::from)
            .unwrap_or(Value::Null)),
        "sequence" | "increment" => generate_sequence(ctx, field_path, rule),
        "date_sequence" => generate_date_sequence(ctx, field_path, rule),
        "random" | "" => generate_random(ctx, field_type, field_path, rule),
        "range" => generate_range(ctx, field_type, rule),
        "regex" => generate_regex(ctx, rule),
        "enum" => generate_enum(ctx, rule),
        "uuid" => Ok(Value::Str(generate_uuid(&mut ctx.rng))),
        "custom" => Ok(Value::Str(regexgen::random_alphanumeric_string(&mut ctx.rng, 10))),
        "db_lookup" => generate_db_lookup(ctx, field_path, rule),
        other => Err(Error::generation(field_path, format!("unknown rule type '{other}'"))),
    }
}

fn parse_bigint(value: &serde_json::Value, default: i64) -> BigInt {
    match value {
        serde_json::Value::String(s) => s.parse().unwrap_or_else(|_| BigInt::from(default)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(BigInt::from)
            .or_else(|| n.as_f64().map(|f| BigInt::from(f as i64)))
            .unwrap_or_else(|| BigInt::from(default)),
        _ => BigInt::from(default),
    }
}

fn generate_sequence(ctx: &mut RunContext, field_path: &str, rule: &FieldRule) -> Result<Value, Error> {
    let start = rule.parameters.get("start").map_or(BigInt::from(1), |v| parse_bigint(v, 1));
    let step = rule.parameters.get("step").map_or(BigInt::from(1), |v| parse_bigint(v, 1));
    Ok(Value::Int(ctx.next_sequence(field_path, &start, &step)))
}

fn generate_date_sequence(ctx: &mut RunContext, field_path: &str, rule: &FieldRule) -> Result<Value, Error> {
    let start_str = rule.param_str("start").unwrap_or("2024-01-01");
    let start = NaiveDate::parse_from_str(start_str, DEFAULT_DATE_FORMAT)
        .map_err(|_| Error::generation(field_path, format!("invalid start date '{start_str}'")))?;
    let step_days = rule
        .parameters
        .get("step")
        .map(|v| parse_bigint(v, 1))
        .and_then(|b| i64::try_from(b).ok())
        .unwrap_or(1);

    let count = ctx.next_date_sequence_count(field_path);
    let current = start + Duration::days(count * step_days);

    let format = rule.param_str("format").unwrap_or(DEFAULT_DATE_FORMAT);
    Ok(Value::Str(current.format(format).to_string()))
}

fn last_path_segment(field_path: &str) -> String {
    field_path
        .rsplit('.')
        .next()
        .unwrap_or(field_path)
        .replace("[]", "")
        .to_lowercase()
}

fn looks_like_date_field(field_path: &str) -> bool {
    let last = last_path_segment(field_path);
    ["date", "time", "created", "updated", "birth", "expire"].iter().any(|kw| last.contains(kw))
}

fn generate_random(
    ctx: &mut RunContext,
    field_type: &str,
    field_path: &str,
    rule: &FieldRule,
) -> Result<Value, Error> {
    match field_type.to_lowercase().as_str() {
        "int" | "integer" | "bigint" | "smallint" | "tinyint" => {
            Ok(Value::Int(BigInt::from(ctx.rng.gen_range(0..1_000_000_i64))))
        }
        "varchar" | "text" | "char" | "string" => {
            if looks_like_date_field(field_path) {
                let result = random_date(&mut ctx.rng);
                let format = rule.param_str("format").unwrap_or(DEFAULT_DATE_FORMAT);
                return Ok(Value::Str(result.format(format).to_string()));
            }
            let length = rule.param_f64("length").map_or(10, |v| v as usize);
            Ok(Value::Str(regexgen::random_alphanumeric_string(&mut ctx.rng, length)))
        }
        "decimal" | "float" | "double" | "numeric" => Ok(Value::Float(ctx.rng.gen::<f64>() * 1000.0)),
        "date" => {
            if rule.parameters.contains_key("start") || rule.parameters.contains_key("end") {
                return generate_date_range(ctx, rule, DEFAULT_DATE_FORMAT);
            }
            let result = random_date(&mut ctx.rng);
            let format = rule.param_str("format").unwrap_or(DEFAULT_DATE_FORMAT);
            Ok(Value::Str(result.format(format).to_string()))
        }
        "datetime" | "timestamp" => {
            if rule.parameters.contains_key("start") || rule.parameters.contains_key("end") {
                return generate_date_range(ctx, rule, DEFAULT_DATETIME_FORMAT);
            }
            let result = random_date(&mut ctx.rng);
            let format = rule.param_str("format").unwrap_or(DEFAULT_DATETIME_FORMAT);
            Ok(Value::Str(result.format(format).to_string()))
        }
        "boolean" | "bool" => Ok(Value::Bool(ctx.rng.gen())),
        _ => Ok(Value::Str(regexgen::random_alphanumeric_string(&mut ctx.rng, 10))),
    }
}

/// A uniformly random instant between 2020-01-01T00:00:00Z and now, matching the original
/// system's default random-date window.
fn random_date(rng: &mut impl Rng) -> NaiveDateTime {
    let min = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
    let max = Utc::now().timestamp();
    let delta = (max - min).max(1);
    let secs = min + rng.gen_range(0..delta);
    NaiveDateTime::from_timestamp_opt(secs, 0).unwrap()
}

fn parse_date_param(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DEFAULT_DATETIME_FORMAT)
        .ok()
        .or_else(|| NaiveDate::parse_from_str(raw, DEFAULT_DATE_FORMAT).ok().map(|d| d.and_hms_opt(0, 0, 0).unwrap()))
}

fn generate_date_range(ctx: &mut RunContext, rule: &FieldRule, default_format: &str) -> Result<Value, Error> {
    let start = match rule.param_str("start") {
        Some(raw) => {
            parse_date_param(raw).ok_or_else(|| Error::generation("date_range", format!("invalid start date '{raw}'")))?
        }
        None => NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
    };
    let end = match rule.param_str("end") {
        Some(raw) => {
            parse_date_param(raw).ok_or_else(|| Error::generation("date_range", format!("invalid end date '{raw}'")))?
        }
        None => Utc::now().naive_utc(),
    };
    if start > end {
        return Err(Error::generation("date_range", "start date must not be after end date"));
    }
    let delta = (end.and_utc().timestamp() - start.and_utc().timestamp()).max(0);
    let secs = if delta == 0 { 0 } else { ctx.rng.gen_range(0..delta) };
    let result = start + Duration::seconds(secs);
    let format = rule.param_str("format").unwrap_or(default_format);
    Ok(Value::Str(result.format(format).to_string()))
}

fn generate_range(ctx: &mut RunContext, field_type: &str, rule: &FieldRule) -> Result<Value, Error> {
    let min = rule.param_f64("min").ok_or_else(|| Error::generation("range", "range rule requires a 'min' parameter"))?;
    let max = rule.param_f64("max").ok_or_else(|| Error::generation("range", "range rule requires a 'max' parameter"))?;
    match field_type.to_lowercase().as_str() {
        "int" | "integer" | "bigint" | "smallint" | "tinyint" => {
            let (min, max) = (min as i64, max as i64);
            Ok(Value::Int(BigInt::from(ctx.rng.gen_range(min..=max))))
        }
        "decimal" | "float" | "double" | "numeric" => {
            // Half-open on purpose: matches `rand.Float64()*(max-min)+min`, which can never
            // reach `max` because `rand.Float64()` itself is confined to `[0, 1)`.
            Ok(Value::Float(ctx.rng.gen_range(min..max)))
        }
        other => Err(Error::generation("range", format!("field type '{other}' does not support the range rule"))),
    }
}

fn generate_regex(ctx: &mut RunContext, rule: &FieldRule) -> Result<Value, Error> {
    let pattern = rule.param_str("pattern").ok_or_else(|| Error::generation("regex", "regex rule requires a 'pattern' parameter"))?;
    Ok(Value::Str(regexgen::generate(pattern, &mut ctx.rng)))
}

fn generate_enum(ctx: &mut RunContext, rule: &FieldRule) -> Result<Value, Error> {
    let raw = rule.param_str("values").ok_or_else(|| Error::generation("enum", "enum rule requires a 'values' parameter"))?;
    let values: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if values.is_empty() {
        return Err(Error::generation("enum", "enum rule's 'values' parameter must not be empty"));
    }
    let idx = ctx.rng.gen_range(0..values.len());
    Ok(Value::Str(values[idx].to_owned()))
}

fn generate_uuid(rng: &mut impl Rng) -> String {
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        rng.gen::<u32>(),
        rng.gen::<u16>(),
        rng.gen::<u16>(),
        rng.gen::<u16>(),
        rng.gen::<u64>() & 0xffff_ffff_ffff,
    )
}

fn generate_db_lookup(ctx: &mut RunContext, field_path: &str, rule: &FieldRule) -> Result<Value, Error> {
    let data_source = rule.param_str_any(&["dataSourceId", "data_source"]).unwrap_or_default();
    let table = rule
        .param_str_any(&["tableName", "table"])
        .ok_or_else(|| Error::generation(field_path, "db_lookup rule requires a 'tableName' parameter"))?;
    let column = rule
        .param_str_any(&["columnName", "column"])
        .ok_or_else(|| Error::generation(field_path, "db_lookup rule requires a 'columnName' parameter"))?;

    let rows = ctx.db_lookup_cached(data_source, table, column, Vec::new);
    if rows.is_empty() {
        return Err(Error::generation(
            field_path,
            format!("db_lookup source {data_source}/{table}.{column} was not pre-fetched or is empty"),
        ));
    }
    let idx = ctx.rng.gen_range(0..rows.len());
    Ok(rows[idx].clone())
}

/// Synthesizes a default rule for a column with no explicit entry in `field_rules`: an
/// auto-increment starting at 1 stepping by 1 for auto-increment columns, `random` otherwise.
pub fn default_rule(is_auto_increment: bool) -> FieldRule {
    if is_auto_increment {
        let mut parameters = std::collections::HashMap::new();
        parameters.insert("start".to_owned(), serde_json::json!(1));
        parameters.insert("step".to_owned(), serde_json::json!(1));
        FieldRule { r#type: "sequence".to_owned(), value: None, parameters }
    } else {
        FieldRule::random()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ctx() -> RunContext {
        RunContext::with_rng(StdRng::seed_from_u64(42))
    }

    #[test]
    fn fixed_rule_returns_configured_value() {
        let mut ctx = ctx();
        let mut rule = FieldRule::random();
        rule.r#type = "fixed".to_owned();
        rule.parameters.insert("value".to_owned(), serde_json::json!("hello"));
        let v = generate_value(&mut ctx, "name", "string", &rule, false).unwrap();
        assert_eq!(v, Value::Str("hello".to_owned()));
    }

    #[test]
    fn sequence_rule_increments_across_calls() {
        let mut ctx = ctx();
        let rule = FieldRule { r#type: "sequence".to_owned(), value: None, parameters: Default::default() };
        let a = generate_value(&mut ctx, "id", "int", &rule, false).unwrap();
        let b = generate_value(&mut ctx, "id", "int", &rule, false).unwrap();
        assert_eq!(a, Value::Int(BigInt::from(1)));
        assert_eq!(b, Value::Int(BigInt::from(2)));
    }

    #[test]
    fn sequence_supports_bignum_start_beyond_i64() {
        let mut ctx = ctx();
        let mut rule = FieldRule::random();
        rule.r#type = "sequence".to_owned();
        rule.parameters.insert("start".to_owned(), serde_json::json!("100000000000000000000"));
        rule.parameters.insert("step".to_owned(), serde_json::json!(1));
        let v = generate_value(&mut ctx, "id", "int", &rule, false).unwrap();
        assert_eq!(v, Value::Int("100000000000000000000".parse().unwrap()));
    }

    #[test]
    fn range_int_is_inclusive() {
        let mut ctx = ctx();
        let mut rule = FieldRule::random();
        rule.r#type = "range".to_owned();
        rule.parameters.insert("min".to_owned(), serde_json::json!(5));
        rule.parameters.insert("max".to_owned(), serde_json::json!(5));
        let v = generate_value(&mut ctx, "n", "int", &rule, false).unwrap();
        assert_eq!(v, Value::Int(BigInt::from(5)));
    }

    #[test]
    fn range_float_is_half_open() {
        let mut ctx = ctx();
        let mut rule = FieldRule::random();
        rule.r#type = "range".to_owned();
        rule.parameters.insert("min".to_owned(), serde_json::json!(1.0));
        rule.parameters.insert("max".to_owned(), serde_json::json!(1.0000001));
        for _ in 0..20 {
            let v = generate_value(&mut ctx, "n", "decimal", &rule, false).unwrap();
            if let Value::Float(f) = v {
                assert!(f >= 1.0 && f < 1.0000001);
            } else {
                panic!("expected float");
            }
        }
    }

    #[test]
    fn enum_rule_picks_from_comma_separated_values() {
        let mut ctx = ctx();
        let mut rule = FieldRule::random();
        rule.r#type = "enum".to_owned();
        rule.parameters.insert("values".to_owned(), serde_json::json!("red, green, blue"));
        for _ in 0..20 {
            let v = generate_value(&mut ctx, "color", "string", &rule, false).unwrap();
            assert!(matches!(v, Value::Str(s) if ["red", "green", "blue"].contains(&s.as_str())));
        }
    }

    #[test]
    fn custom_rule_ignores_script_and_returns_random_string() {
        let mut ctx = ctx();
        let mut rule = FieldRule::random();
        rule.r#type = "custom".to_owned();
        rule.parameters.insert("script".to_owned(), serde_json::json!("return 42"));
        let v = generate_value(&mut ctx, "x", "string", &rule, false).unwrap();
        assert!(matches!(v, Value::Str(s) if s.len() == 10));
    }

    #[test]
    fn db_lookup_accepts_original_system_parameter_names() {
        let mut ctx = ctx();
        ctx.db_lookup_cached("orders_db", "users", "email", || {
            vec![Value::from("a@example.com"), Value::from("b@example.com")]
        });
        let mut rule = FieldRule::random();
        rule.r#type = "db_lookup".to_owned();
        rule.parameters.insert("dataSourceId".to_owned(), serde_json::json!("orders_db"));
        rule.parameters.insert("tableName".to_owned(), serde_json::json!("users"));
        rule.parameters.insert("columnName".to_owned(), serde_json::json!("email"));
        let v = generate_value(&mut ctx, "email", "string", &rule, false).unwrap();
        assert!(matches!(v, Value::Str(s) if s == "a@example.com" || s == "b@example.com"));
    }

    #[test]
    fn default_rule_is_sequence_for_auto_increment_columns() {
        let rule = default_rule(true);
        assert_eq!(rule.r#type, "sequence");
        let other = default_rule(false);
        assert_eq!(other.r#type, "random");
    }

    #[test]
    fn unique_retry_eventually_errors_when_value_space_exhausted() {
        let mut ctx = ctx();
        ctx.max_unique_retries = 3;
        let mut rule = FieldRule::random();
        rule.r#type = "enum".to_owned();
        rule.parameters.insert("values".to_owned(), serde_json::json!("only-option"));
        generate_value(&mut ctx, "tag", "string", &rule, true).unwrap();
        let err = generate_value(&mut ctx, "tag", "string", &rule, true).unwrap_err();
        assert!(matches!(err, Error::UniquenessExhausted { attempts: 3, .. }));
    }
}
