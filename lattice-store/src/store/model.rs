//! Model descriptions.
//!
//! A [`ModelSpec`] says what a node of one type looks like: its fields, their
//! kinds, which must be present, and the schema the type declares. Specs are
//! written by hand with [`ModelBuilder`] and consumed by a generic
//! [`Repository`](super::Repository); no code is generated per model.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

use super::schema::{EdgeKind, SchemaDescriptor};
use super::value::{Value, ValueKind};

/// Whether a field must always hold a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Required,
    Optional,
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: ValueKind,
    pub presence: Presence,
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }
}

/// The description of one node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    name: String,
    fields: IndexMap<String, FieldSpec>,
    schema: SchemaDescriptor,
}

impl ModelSpec {
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    /// The schema this type declares for itself.
    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Resolve caller-supplied initial values against the declaration.
    ///
    /// Returns one entry per declared field, in declaration order. Omitted
    /// fields take their default; fields marked absent stay absent.
    pub(crate) fn resolve(&self, initial: &InitialValues) -> Result<IndexMap<String, Option<Value>>> {
        let invalid = |field: &str, reason: String| StoreError::InvalidInitialValue {
            model: self.name.clone(),
            field: field.to_owned(),
            reason,
        };

        if let Some(unknown) = initial.values.keys().find(|name| !self.fields.contains_key(*name)) {
            return Err(invalid(unknown, "not a declared field".to_owned()));
        }

        let mut resolved = IndexMap::with_capacity(self.fields.len());
        for spec in self.fields.values() {
            let value = match initial.values.get(&spec.name) {
                Some(Some(value)) => Some(value.clone()),
                Some(None) if spec.is_required() => {
                    return Err(invalid(&spec.name, "required field cannot be absent".to_owned()));
                }
                Some(None) => None,
                None => spec.default.clone(),
            };
            match &value {
                Some(value) if value.kind() != spec.kind => {
                    return Err(invalid(
                        &spec.name,
                        format!("expected {}, found {}", spec.kind, value.kind()),
                    ));
                }
                None if spec.is_required() => {
                    return Err(invalid(&spec.name, "required field has no value".to_owned()));
                }
                _ => {}
            }
            resolved.insert(spec.name.clone(), value);
        }
        Ok(resolved)
    }
}

/// Builder for [`ModelSpec`].
///
/// # Example
///
/// ```rust
/// use lattice_store::store::{ModelBuilder, Value, ValueKind};
///
/// let item = ModelBuilder::new("Item")
///     .required("title", ValueKind::Text)
///     .optional("description", ValueKind::Text)
///     .required_with_default("completed", Value::Bool(false))
///     .acyclic("parent")
///     .build()
///     .unwrap();
///
/// assert_eq!(item.fields().count(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    schema: SchemaDescriptor,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            schema: SchemaDescriptor::default(),
        }
    }

    fn field(mut self, name: impl Into<String>, kind: ValueKind, presence: Presence, default: Option<Value>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            presence,
            default,
        });
        self
    }

    pub fn required(self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.field(name, kind, Presence::Required, None)
    }

    pub fn required_with_default(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        let default = default.into();
        self.field(name, default.kind(), Presence::Required, Some(default))
    }

    pub fn optional(self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.field(name, kind, Presence::Optional, None)
    }

    pub fn optional_with_default(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        let default = default.into();
        self.field(name, default.kind(), Presence::Optional, Some(default))
    }

    /// Never prune nodes of this type.
    pub fn sticky_node(mut self) -> Self {
        self.schema.sticky_nodes.insert(self.name.clone());
        self
    }

    pub fn sticky_cell(mut self, field: impl Into<String>) -> Self {
        self.schema.sticky_cells.insert(field.into());
        self
    }

    pub fn sticky_edge(mut self, kind: impl Into<EdgeKind>) -> Self {
        self.schema.sticky_edges.insert(kind.into());
        self
    }

    pub fn acyclic(mut self, kind: impl Into<EdgeKind>) -> Self {
        self.schema.acyclic_edges.insert(kind.into());
        self
    }

    pub fn build(self) -> Result<ModelSpec> {
        let invalid = |reason: String| StoreError::InvalidSchema {
            model: self.name.clone(),
            reason,
        };

        let mut fields = IndexMap::with_capacity(self.fields.len());
        for spec in &self.fields {
            if let Some(default) = &spec.default {
                if default.kind() != spec.kind {
                    return Err(invalid(format!(
                        "default of {} is {}, declared {}",
                        spec.name,
                        default.kind(),
                        spec.kind
                    )));
                }
            }
            if fields.insert(spec.name.clone(), spec.clone()).is_some() {
                return Err(invalid(format!("field {} declared twice", spec.name)));
            }
        }

        let model = ModelSpec {
            name: self.name.clone(),
            fields,
            schema: self.schema.clone(),
        };
        model.schema.validate(&model)?;
        Ok(model)
    }
}

/// Caller-supplied field values for `create`.
///
/// A field may be given a value, explicitly marked absent, or left out.
/// Left-out fields take the declared default. Absent fields stay absent,
/// which only optional fields allow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialValues {
    values: IndexMap<String, Option<Value>>,
}

impl InitialValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), Some(value.into()));
        self
    }

    pub fn absent(mut self, field: impl Into<String>) -> Self {
        self.values.insert(field.into(), None);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: Option<Value>) {
        self.values.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Option<Value>> {
        self.values.get(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for InitialValues
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(field, value)| (field.into(), Some(value.into())))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ModelSpec {
        ModelBuilder::new("Item")
            .required("title", ValueKind::Text)
            .optional("description", ValueKind::Text)
            .required_with_default("completed", false)
            .build()
            .unwrap()
    }

    #[test]
    fn defaults_fill_omitted_fields() {
        let resolved = item()
            .resolve(&InitialValues::new().with("title", "x"))
            .unwrap();

        assert_eq!(resolved["title"], Some(Value::from("x")));
        assert_eq!(resolved["description"], None);
        assert_eq!(resolved["completed"], Some(Value::Bool(false)));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = item().resolve(&InitialValues::new()).unwrap_err();
        match err {
            StoreError::InvalidInitialValue { field, .. } => assert_eq!(field, "title"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn explicit_absent_on_required_without_default_is_rejected() {
        let err = item()
            .resolve(&InitialValues::new().absent("title"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInitialValue { .. }));
    }

    #[test]
    fn explicit_absent_overrides_the_default() {
        let model = ModelBuilder::new("Task")
            .required("title", ValueKind::Text)
            .optional_with_default("note", "default-note")
            .required_with_default("done", false)
            .build()
            .unwrap();

        let resolved = model
            .resolve(&InitialValues::new().with("title", "x").absent("note"))
            .unwrap();
        assert_eq!(resolved["note"], None);
        assert_eq!(resolved["done"], Some(Value::Bool(false)));

        let err = model
            .resolve(&InitialValues::new().with("title", "x").absent("done"))
            .unwrap_err();
        match err {
            StoreError::InvalidInitialValue { field, .. } => assert_eq!(field, "done"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_kind_and_unknown_fields_are_rejected() {
        let model = item();
        assert!(model
            .resolve(&InitialValues::new().with("title", 3))
            .is_err());
        assert!(model
            .resolve(&InitialValues::new().with("title", "x").with("owner", "y"))
            .is_err());
    }

    #[test]
    fn builder_rejects_duplicate_fields() {
        let err = ModelBuilder::new("Item")
            .required("title", ValueKind::Text)
            .optional("title", ValueKind::Text)
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema { .. }));
    }

    #[test]
    fn builder_rejects_unknown_sticky_cell() {
        let err = ModelBuilder::new("Item")
            .required("title", ValueKind::Text)
            .sticky_cell("body")
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema { .. }));
    }

    #[test]
    fn initial_values_collect_from_pairs() {
        let values: InitialValues = [("title", "x"), ("description", "y")].into_iter().collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values.get("title"), Some(&Some(Value::from("x"))));
    }
}
