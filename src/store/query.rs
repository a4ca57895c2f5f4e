use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::validate::normalize_field;
use crate::schema::{EntityDef, FieldDef, FieldKind};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 500;

/// Query parameters that are not field filters.
const CONTROL_PARAMS: &[&str] = &["limit", "offset", "order_by"];

const TIMESTAMP_COLUMNS: &[&str] = &["created_at", "updated_at"];

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    /// Case-insensitive substring match.
    Contains(&'static str, String),
    AtLeast {
        column: &'static str,
        value: Value,
        numeric: bool,
    },
    AtMost {
        column: &'static str,
        value: Value,
        numeric: bool,
    },
}

/// Tenant-scoped listing options. Soft-deleted rows are always excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub filters: Vec<Filter>,
    pub order_by: &'static str,
    pub descending: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            order_by: "created_at",
            descending: true,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl RecordQuery {
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Builds a query from HTTP query parameters.
    ///
    /// `<field>=v` filters by equality (substring for string fields),
    /// `<field>_from` / `<field>_to` bound a range, `order_by=<field>_asc|_desc`
    /// sorts, `limit` and `offset` page.
    pub fn from_params(def: &EntityDef, params: &HashMap<String, String>) -> Result<Self> {
        let mut query = RecordQuery::default();

        if let Some(limit) = params.get("limit") {
            let limit: i64 = limit
                .parse()
                .map_err(|_| Error::Validation("limit must be a number".into()))?;
            query.limit = limit.clamp(1, MAX_LIMIT);
        }
        if let Some(offset) = params.get("offset") {
            let offset: i64 = offset
                .parse()
                .map_err(|_| Error::Validation("offset must be a number".into()))?;
            query.offset = offset.max(0);
        }
        if let Some(order) = params.get("order_by") {
            let (column, descending) = parse_order(def, order)?;
            query.order_by = column;
            query.descending = descending;
        }

        // Sorted so error messages and generated SQL are stable.
        let mut keys: Vec<&String> = params
            .keys()
            .filter(|k| !CONTROL_PARAMS.contains(&k.as_str()))
            .collect();
        keys.sort();

        for key in keys {
            let raw = &params[key];
            if raw.is_empty() {
                continue;
            }
            query.filters.push(parse_filter(def, key, raw)?);
        }

        Ok(query)
    }
}

fn parse_order(def: &EntityDef, order: &str) -> Result<(&'static str, bool)> {
    let (name, descending) = if let Some(name) = order.strip_suffix("_desc") {
        (name, true)
    } else if let Some(name) = order.strip_suffix("_asc") {
        (name, false)
    } else {
        (order, false)
    };

    let column = TIMESTAMP_COLUMNS
        .iter()
        .copied()
        .find(|c| *c == name)
        .or_else(|| def.field(name).map(|f| f.name))
        .ok_or_else(|| Error::Validation(format!("cannot order by {name}")))?;
    Ok((column, descending))
}

fn parse_filter(def: &EntityDef, key: &str, raw: &str) -> Result<Filter> {
    for (suffix, lower) in [("_from", true), ("_to", false)] {
        let Some(name) = key.strip_suffix(suffix) else {
            continue;
        };
        let (column, kind) = match TIMESTAMP_COLUMNS.iter().copied().find(|c| *c == name) {
            Some(column) => (column, FieldKind::DateTime),
            None => match def.field(name) {
                Some(field) if field.kind.is_rangeable() => (field.name, field.kind),
                _ => continue,
            },
        };
        let (value, numeric) = range_value(column, kind, raw)?;
        return Ok(if lower {
            Filter::AtLeast {
                column,
                value,
                numeric,
            }
        } else {
            Filter::AtMost {
                column,
                value,
                numeric,
            }
        });
    }

    let field = def
        .field(key)
        .ok_or_else(|| Error::Validation(format!("cannot filter {} by {key}", def.name)))?;

    if field.kind.is_textual() {
        return Ok(Filter::Contains(field.name, raw.to_string()));
    }

    Ok(Filter::Eq(field.name, exact_value(field, raw)?))
}

fn exact_value(field: &FieldDef, raw: &str) -> Result<Value> {
    let value = match field.kind {
        FieldKind::Boolean => match raw {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => {
                return Err(Error::Validation(format!(
                    "{} must be true or false",
                    field.name
                )));
            }
        },
        FieldKind::Integer { .. } => Value::from(parse_int(field.name, raw)?),
        _ => Value::String(raw.to_string()),
    };
    normalize_field(field, &value).map_err(Error::Validation)
}

fn range_value(column: &'static str, kind: FieldKind, raw: &str) -> Result<(Value, bool)> {
    match kind {
        FieldKind::Integer { .. } => Ok((Value::from(parse_int(column, raw)?), true)),
        FieldKind::Decimal { .. } => {
            let n: f64 = raw
                .parse()
                .map_err(|_| Error::Validation(format!("{column} must be a number")))?;
            Ok((Value::from(n), true))
        }
        _ => {
            let bound = FieldDef {
                name: column,
                kind,
                required: false,
                default: None,
            };
            let value = normalize_field(&bound, &Value::String(raw.to_string()))
                .map_err(Error::Validation)?;
            Ok((value, false))
        }
    }
}

fn parse_int(name: &str, raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| Error::Validation(format!("{name} must be an integer")))
}
