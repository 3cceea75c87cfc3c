//! Field values.
//!
//! Nodes store their fields as [`Value`]s so one generic node type can carry
//! any model. [`FieldValue`] maps plain Rust types onto values for typed
//! accessors.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::id::Id;

/// The type of a field, as declared in a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Id,
    List,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Bytes => "bytes",
            ValueKind::Id => "id",
            ValueKind::List => "list",
        };
        f.write_str(name)
    }
}

/// A field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Id(Id),
    List(Vec<Value>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Id(_) => ValueKind::Id,
            Value::List(_) => ValueKind::List,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Conversion between a Rust type and a field [`Value`].
pub trait FieldValue: Sized {
    const KIND: ValueKind;

    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! field_value {
    ($ty:ty, $kind:ident) => {
        impl FieldValue for $ty {
            const KIND: ValueKind = ValueKind::$kind;

            fn into_value(self) -> Value {
                Value::$kind(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$kind(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(inner: $ty) -> Self {
                Value::$kind(inner)
            }
        }
    };
}

field_value!(bool, Bool);
field_value!(i64, Int);
field_value!(f64, Float);
field_value!(String, Text);
field_value!(Vec<u8>, Bytes);
field_value!(Id, Id);
field_value!(Vec<Value>, List);

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_owned())
    }
}

impl From<i32> for Value {
    fn from(int: i32) -> Self {
        Value::Int(int.into())
    }
}
