//! Declarative allow-list validation for book payloads.
//!
//! The book shape is a table of [`FieldSpec`]s consumed by one routine for both
//! create and update requests. Every problem in a payload is reported, in
//! declaration order, followed by any undeclared keys. Undeclared keys are
//! always rejected, never stripped.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Non-empty string; whitespace-only counts as empty.
    Text,
    /// JSON integer. Numeric strings and floats are rejected, not coerced.
    Integer,
    /// JSON integer greater than zero.
    PositiveInteger,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Immutable fields are set on create and refused in update bodies.
    pub immutable: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            immutable: false,
        }
    }

    pub const fn key(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            required: true,
            immutable: true,
        }
    }
}

pub const BOOK_SCHEMA: &[FieldSpec] = &[
    FieldSpec::key("isbn"),
    FieldSpec::required("amazon_url", FieldKind::Text),
    FieldSpec::required("author", FieldKind::Text),
    FieldSpec::required("language", FieldKind::Text),
    FieldSpec::required("pages", FieldKind::PositiveInteger),
    FieldSpec::required("publisher", FieldKind::Text),
    FieldSpec::required("title", FieldKind::Text),
    FieldSpec::required("year", FieldKind::Integer),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    NotAnObject,
    Required,
    NotAString,
    Empty,
    NotAnInteger,
    NotPositive,
    Immutable,
    Unknown,
}

impl Violation {
    pub fn reason(self) -> &'static str {
        match self {
            Violation::NotAnObject => "request body must be a JSON object",
            Violation::Required => "is required",
            Violation::NotAString => "must be a string",
            Violation::Empty => "must not be empty",
            Violation::NotAnInteger => "must be an integer",
            Violation::NotPositive => "must be a positive integer",
            Violation::Immutable => "cannot be changed; it is taken from the URL",
            Violation::Unknown => "is not an allowed field",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub code: Violation,
    pub reason: &'static str,
}

impl FieldError {
    fn new(field: impl Into<String>, code: Violation) -> Self {
        Self {
            field: field.into(),
            code,
            reason: code.reason(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload failed validation on {} field(s)", .0.len())]
    Invalid(Vec<FieldError>),

    #[error("validated payload could not be decoded")]
    Decode(#[from] serde_json::Error),
}

/// Check `payload` against `schema` for `mode`.
///
/// On success returns a copy holding only the declared fields accepted in
/// `mode`.
pub fn validate(
    schema: &[FieldSpec],
    payload: &Value,
    mode: Mode,
) -> Result<Map<String, Value>, Vec<FieldError>> {
    let Some(object) = payload.as_object() else {
        return Err(vec![FieldError::new("body", Violation::NotAnObject)]);
    };

    let mut errors = Vec::new();
    let mut normalized = Map::new();

    for spec in schema {
        let value = object.get(spec.name);

        if spec.immutable && mode == Mode::Update {
            if value.is_some() {
                errors.push(FieldError::new(spec.name, Violation::Immutable));
            }
            continue;
        }

        match value {
            None if spec.required => errors.push(FieldError::new(spec.name, Violation::Required)),
            None => {}
            Some(value) => match check_kind(spec.kind, value) {
                Ok(()) => {
                    normalized.insert(spec.name.to_string(), value.clone());
                }
                Err(violation) => errors.push(FieldError::new(spec.name, violation)),
            },
        }
    }

    for key in object.keys() {
        if !schema.iter().any(|spec| spec.name == key.as_str()) {
            errors.push(FieldError::new(key.as_str(), Violation::Unknown));
        }
    }

    if errors.is_empty() {
        Ok(normalized)
    } else {
        Err(errors)
    }
}

/// Validate, then decode the normalized payload into `T`.
pub fn parse<T: DeserializeOwned>(
    schema: &[FieldSpec],
    payload: &Value,
    mode: Mode,
) -> Result<T, PayloadError> {
    let normalized = validate(schema, payload, mode).map_err(PayloadError::Invalid)?;
    Ok(serde_json::from_value(Value::Object(normalized))?)
}

fn check_kind(kind: FieldKind, value: &Value) -> Result<(), Violation> {
    match kind {
        FieldKind::Text => match value.as_str() {
            None => Err(Violation::NotAString),
            Some(text) if text.trim().is_empty() => Err(Violation::Empty),
            Some(_) => Ok(()),
        },
        FieldKind::Integer => value.as_i64().map(|_| ()).ok_or(Violation::NotAnInteger),
        FieldKind::PositiveInteger => match value.as_i64() {
            None => Err(Violation::NotAnInteger),
            Some(n) if n <= 0 => Err(Violation::NotPositive),
            Some(_) => Ok(()),
        },
    }
}
