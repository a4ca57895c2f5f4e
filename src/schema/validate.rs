use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::{DefaultValue, EntityDef, FieldDef, FieldKind, RESERVED_COLUMNS, Relation};
use crate::error::{Error, Result};

const MAX_REFERENCE_LEN: usize = 64;
const MIN_TOKEN_LEN: usize = 16;
const MAX_TOKEN_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update,
}

/// Input after validation: declared fields normalized for storage, plus the
/// many-to-many id lists to replace.
#[derive(Debug, Default)]
pub struct Validated {
    pub fields: Map<String, Value>,
    pub links: Vec<(&'static Relation, Vec<String>)>,
}

/// Checks `input` against the entity's field table.
///
/// On create, defaults are applied and required fields must be present. On
/// update only the supplied keys are returned so the caller can merge them.
/// Shared columns and computed values are ignored so a record read from the
/// API can be sent back as-is.
pub fn validate(def: &EntityDef, input: &Map<String, Value>, mode: Mode) -> Result<Validated> {
    let mut out = Validated::default();
    let mut problems = Vec::new();

    for (key, value) in input {
        if let Some(field) = def.field(key) {
            match normalize_field(field, value) {
                Ok(v) => {
                    out.fields.insert(key.clone(), v);
                }
                Err(msg) => problems.push(msg),
            }
        } else if let Some(relation) = def.many_to_many_named(key) {
            match id_list(key, value) {
                Ok(ids) => out.links.push((relation, ids)),
                Err(msg) => problems.push(msg),
            }
        } else if RESERVED_COLUMNS.contains(&key.as_str())
            || def.computed.iter().any(|c| c.name == key)
        {
            continue;
        } else {
            problems.push(format!("{key} is not a field of {}", def.name));
        }
    }

    if mode == Mode::Create {
        for field in def.fields {
            if out.fields.contains_key(field.name) {
                continue;
            }
            let value = field.default.map(default_value).unwrap_or(Value::Null);
            out.fields.insert(field.name.to_string(), value);
        }
    }

    for field in def.fields {
        if field.required && out.fields.get(field.name).is_some_and(Value::is_null) {
            problems.push(format!("{} is required", field.name));
        }
    }

    if problems.is_empty() {
        Ok(out)
    } else {
        Err(Error::Validation(problems.join("; ")))
    }
}

fn default_value(default: DefaultValue) -> Value {
    match default {
        DefaultValue::Bool(b) => Value::Bool(b),
        DefaultValue::Str(s) => Value::String(s.to_string()),
        DefaultValue::Int(i) => Value::from(i),
    }
}

fn id_list(key: &str, value: &Value) -> std::result::Result<Vec<String>, String> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => return Err(format!("{key} must be an array of ids")),
    };

    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str().map(str::trim) {
            Some(id) if !id.is_empty() && id.len() <= MAX_REFERENCE_LEN => {
                if !ids.iter().any(|existing| existing == id) {
                    ids.push(id.to_string());
                }
            }
            _ => return Err(format!("{key} must be an array of ids")),
        }
    }
    Ok(ids)
}

/// Normalizes one value for storage. `null` passes through; the required
/// check happens in [`validate`].
pub fn normalize_field(field: &FieldDef, value: &Value) -> std::result::Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let name = field.name;
    match field.kind {
        FieldKind::String { min, max } => {
            let s = expect_str(name, value)?;
            if s.is_empty() {
                return Ok(Value::Null);
            }
            check_len(name, s, min, max)?;
            Ok(Value::String(s.to_string()))
        }
        FieldKind::Text { max } => {
            let s = expect_str(name, value)?;
            if s.is_empty() {
                return Ok(Value::Null);
            }
            check_len(name, s, 1, max)?;
            Ok(Value::String(s.to_string()))
        }
        FieldKind::Enum(values) => {
            let s = expect_str(name, value)?;
            if values.contains(&s) {
                Ok(Value::String(s.to_string()))
            } else {
                Err(format!("{name} must be one of: {}", values.join(", ")))
            }
        }
        FieldKind::Boolean => value
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| format!("{name} must be a boolean")),
        FieldKind::Integer { min, max } => {
            let n = value
                .as_i64()
                .ok_or_else(|| format!("{name} must be an integer"))?;
            if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                return Err(format!("{name} is out of range"));
            }
            Ok(Value::from(n))
        }
        FieldKind::Decimal { precision, scale } => {
            let raw = match value {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.trim().to_string(),
                _ => return Err(format!("{name} must be a decimal number")),
            };
            let d = Decimal::from_str(&raw)
                .map_err(|_| format!("{name} must be a decimal number"))?
                .normalize();
            let integer_digits = d.trunc().abs().to_string().trim_start_matches('0').len() as u32;
            if d.scale() > scale || integer_digits > precision.saturating_sub(scale) {
                return Err(format!(
                    "{name} allows {precision} digits with {scale} after the decimal point"
                ));
            }
            Ok(Value::String(d.to_string()))
        }
        FieldKind::Date => {
            let s = expect_str(name, value)?;
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| format!("{name} must be a date (YYYY-MM-DD)"))?;
            Ok(Value::String(date.format("%Y-%m-%d").to_string()))
        }
        FieldKind::DateTime => {
            let s = expect_str(name, value)?;
            let dt = parse_datetime(s).ok_or_else(|| format!("{name} must be an RFC 3339 datetime"))?;
            Ok(Value::String(format_datetime(&dt)))
        }
        FieldKind::Reference { .. } => {
            let s = expect_str(name, value)?;
            if s.is_empty() {
                return Ok(Value::Null);
            }
            check_len(name, s, 1, MAX_REFERENCE_LEN)?;
            Ok(Value::String(s.to_string()))
        }
        FieldKind::Token => {
            let s = expect_str(name, value)?;
            check_len(name, s, MIN_TOKEN_LEN, MAX_TOKEN_LEN)?;
            Ok(Value::String(s.to_string()))
        }
    }
}

fn expect_str<'a>(name: &str, value: &'a Value) -> std::result::Result<&'a str, String> {
    value
        .as_str()
        .map(str::trim)
        .ok_or_else(|| format!("{name} must be a string"))
}

fn check_len(name: &str, s: &str, min: usize, max: usize) -> std::result::Result<(), String> {
    let len = s.chars().count();
    if len < min {
        return Err(format!("{name} must be at least {min} characters"));
    }
    if len > max {
        return Err(format!("{name} cannot exceed {max} characters"));
    }
    Ok(())
}

pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Fixed-width UTC rendering so stored datetimes sort lexically.
#[must_use]
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
