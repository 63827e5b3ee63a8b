use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::{FieldDefinition, FieldType, FieldValue, Schema, TraitDefinition, RESERVED_FIELDS};
use crate::dates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    MissingRequired,
    TypeMismatch,
    InvalidEnum,
    OutOfRange,
    InvalidDate,
    UnknownField,
    RefTargetMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Looks up the type of the object a reference points at.
pub trait RefTypes {
    /// `None` when the reference is dangling or ambiguous.
    fn type_of(&self, reference: &str) -> Option<String>;
}

#[derive(Default)]
pub struct ValidateOptions<'a> {
    /// Field names accepted even though the type does not declare them.
    pub allow_unknown: BTreeSet<String>,
    /// Enables the ref target type check.
    pub refs: Option<&'a dyn RefTypes>,
}

/// Validates `fields` against `defs`, returning every problem found.
///
/// Missing required fields are reported first, in definition order, then
/// per-field problems in field-name order.
pub fn validate_fields(
    fields: &BTreeMap<String, FieldValue>,
    defs: &BTreeMap<String, FieldDefinition>,
    schema: &Schema,
    options: &ValidateOptions<'_>,
) -> Vec<FieldError> {
    let mut errors = Vec::new();

    for (name, def) in defs {
        let present = fields.get(name).is_some_and(|v| !v.is_null());
        if def.required && !present && def.default.is_none() {
            errors.push(FieldError::new(
                name,
                FieldErrorKind::MissingRequired,
                "required field is missing",
            ));
        }
    }

    for (name, value) in fields {
        if RESERVED_FIELDS.contains(&name.as_str()) {
            continue;
        }
        let Some(def) = defs.get(name) else {
            if !options.allow_unknown.contains(name) {
                errors.push(FieldError::new(
                    name,
                    FieldErrorKind::UnknownField,
                    "field is not declared for this type",
                ));
            }
            continue;
        };
        if value.is_null() {
            continue;
        }
        check_value(name, value, def, schema, options, &mut errors);
    }

    errors
}

fn check_value(
    name: &str,
    value: &FieldValue,
    def: &FieldDefinition,
    schema: &Schema,
    options: &ValidateOptions<'_>,
    errors: &mut Vec<FieldError>,
) {
    let mismatch = |expected: &str| {
        FieldError::new(
            name,
            FieldErrorKind::TypeMismatch,
            format!("expected {expected}, got {}", value.kind()),
        )
    };

    match def.field_type {
        FieldType::String => {
            if value.as_str().is_none() {
                errors.push(mismatch("string"));
            }
        }
        FieldType::Number => check_number(name, value, def, errors),
        FieldType::Date => check_date(name, value, errors),
        FieldType::Datetime => match value.as_str() {
            Some(s) if dates::is_valid_datetime(s) || dates::is_valid_date(s) => {}
            Some(s) => errors.push(FieldError::new(
                name,
                FieldErrorKind::InvalidDate,
                format!("'{s}' is not a valid datetime"),
            )),
            None => errors.push(mismatch("datetime")),
        },
        FieldType::Enum => match value.as_str() {
            Some(s) if def.values.iter().any(|v| v == s) => {}
            Some(s) => errors.push(FieldError::new(
                name,
                FieldErrorKind::InvalidEnum,
                format!("'{s}' is not one of: {}", def.values.join(", ")),
            )),
            None => errors.push(mismatch("enum value")),
        },
        FieldType::Bool => {
            if !matches!(value, FieldValue::Bool(_)) {
                errors.push(mismatch("bool"));
            }
        }
        FieldType::Ref => match value {
            FieldValue::Ref(r) | FieldValue::String(r) => {
                check_ref_target(name, r, def, schema, options, errors)
            }
            _ => errors.push(mismatch("reference")),
        },
        FieldType::StringArray | FieldType::NumberArray | FieldType::DateArray
        | FieldType::RefArray => {
            let items: &[FieldValue] = match value {
                FieldValue::Array(items) => items,
                // A single ref is accepted where a list of refs is expected.
                FieldValue::Ref(_) if def.field_type == FieldType::RefArray => {
                    std::slice::from_ref(value)
                }
                _ => {
                    errors.push(mismatch("array"));
                    return;
                }
            };
            for item in items {
                match def.field_type {
                    FieldType::StringArray if item.as_str().is_none() => {
                        errors.push(mismatch("array of strings"));
                    }
                    FieldType::NumberArray => check_number(name, item, def, errors),
                    FieldType::DateArray => check_date(name, item, errors),
                    FieldType::RefArray => match item {
                        FieldValue::Ref(r) | FieldValue::String(r) => {
                            check_ref_target(name, r, def, schema, options, errors)
                        }
                        _ => errors.push(mismatch("array of references")),
                    },
                    _ => {}
                }
            }
        }
    }
}

fn check_number(
    name: &str,
    value: &FieldValue,
    def: &FieldDefinition,
    errors: &mut Vec<FieldError>,
) {
    let Some(n) = value.as_f64() else {
        errors.push(FieldError::new(
            name,
            FieldErrorKind::TypeMismatch,
            format!("expected number, got {}", value.kind()),
        ));
        return;
    };
    if let Some(min) = def.min {
        if n < min {
            errors.push(FieldError::new(
                name,
                FieldErrorKind::OutOfRange,
                format!("{n} is below the minimum {min}"),
            ));
        }
    }
    if let Some(max) = def.max {
        if n > max {
            errors.push(FieldError::new(
                name,
                FieldErrorKind::OutOfRange,
                format!("{n} is above the maximum {max}"),
            ));
        }
    }
}

fn check_date(name: &str, value: &FieldValue, errors: &mut Vec<FieldError>) {
    match value {
        FieldValue::Date(_) => {}
        FieldValue::String(s) if dates::resolve_keyword(s, dates::today()).is_some() => {}
        FieldValue::String(s) => errors.push(FieldError::new(
            name,
            FieldErrorKind::InvalidDate,
            format!("'{s}' is not a date (YYYY-MM-DD, today, yesterday, tomorrow)"),
        )),
        other => errors.push(FieldError::new(
            name,
            FieldErrorKind::TypeMismatch,
            format!("expected date, got {}", other.kind()),
        )),
    }
}

fn check_ref_target(
    name: &str,
    reference: &str,
    def: &FieldDefinition,
    schema: &Schema,
    options: &ValidateOptions<'_>,
    errors: &mut Vec<FieldError>,
) {
    let (Some(target), Some(refs)) = (def.target.as_deref(), options.refs) else {
        return;
    };
    if !schema.has_type(target) {
        return;
    }
    if let Some(actual) = refs.type_of(reference) {
        if actual != target {
            errors.push(FieldError::new(
                name,
                FieldErrorKind::RefTargetMismatch,
                format!("'{reference}' is a {actual}, expected a {target}"),
            ));
        }
    }
}

/// Rewrites relative date keywords in date-typed fields to ISO dates.
pub fn normalize_date_fields(
    fields: &mut BTreeMap<String, FieldValue>,
    defs: &BTreeMap<String, FieldDefinition>,
    today: NaiveDate,
) {
    for (name, value) in fields.iter_mut() {
        let Some(def) = defs.get(name) else { continue };
        if !def.field_type.is_date() {
            continue;
        }
        match value {
            FieldValue::Array(items) => {
                for item in items.iter_mut() {
                    normalize_one(item, today);
                }
            }
            single => normalize_one(single, today),
        }
    }
}

fn normalize_one(value: &mut FieldValue, today: NaiveDate) {
    if let FieldValue::String(s) = value {
        if let Some(iso) = dates::normalize_date(s, today) {
            *value = FieldValue::Date(iso);
        }
    }
}

/// Checks a written trait value and returns its normalized form.
pub fn validate_trait_value(
    trait_name: &str,
    def: &TraitDefinition,
    value: Option<&str>,
    today: NaiveDate,
) -> Result<Option<String>, FieldError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let bad = |kind, message: String| Err(FieldError::new(trait_name, kind, message));

    match def.value_type {
        None | Some(FieldType::Bool) => match raw {
            "true" | "false" => Ok(Some(raw.to_string())),
            _ => bad(
                FieldErrorKind::TypeMismatch,
                format!("'{raw}' is not true or false"),
            ),
        },
        Some(FieldType::Date) => match dates::normalize_date(raw, today) {
            Some(iso) => Ok(Some(iso)),
            None => bad(
                FieldErrorKind::InvalidDate,
                format!("'{raw}' is not a date"),
            ),
        },
        Some(FieldType::Datetime) if !dates::is_valid_datetime(raw) => bad(
            FieldErrorKind::InvalidDate,
            format!("'{raw}' is not a datetime"),
        ),
        Some(FieldType::Enum) if !def.values.iter().any(|v| v == raw) => bad(
            FieldErrorKind::InvalidEnum,
            format!("'{raw}' is not one of: {}", def.values.join(", ")),
        ),
        Some(FieldType::Number) if raw.parse::<f64>().is_err() => bad(
            FieldErrorKind::TypeMismatch,
            format!("'{raw}' is not a number"),
        ),
        _ => Ok(Some(raw.to_string())),
    }
}
