//! Per-view options and their identity key.

use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::config::ViewDefaults;
use crate::core::{FieldValue, Fields};

/// Derives a sort key from an entity snapshot.
pub type SortKeyFn = Rc<dyn Fn(&Fields) -> FieldValue>;

/// How members are ordered.
#[derive(Clone)]
pub enum SortBy {
    /// Value of one field; absent fields sort as `Null`.
    Field(String),
    /// Custom key function, identified by `name` for view identity.
    Key { name: String, key: SortKeyFn },
}

impl SortBy {
    pub fn field(name: impl Into<String>) -> Self {
        SortBy::Field(name.into())
    }

    pub fn key(name: impl Into<String>, key: impl Fn(&Fields) -> FieldValue + 'static) -> Self {
        SortBy::Key {
            name: name.into(),
            key: Rc::new(key),
        }
    }

    pub fn sort_key(&self, fields: &Fields) -> FieldValue {
        match self {
            SortBy::Field(name) => fields.get(name).cloned().unwrap_or(FieldValue::Null),
            SortBy::Key { key, .. } => key(fields),
        }
    }

    fn identity(&self) -> Value {
        match self {
            SortBy::Field(name) => Value::String(name.clone()),
            SortBy::Key { name, .. } => {
                let mut key = Map::new();
                key.insert("key".into(), Value::String(name.clone()));
                Value::Object(key)
            }
        }
    }
}

impl fmt::Debug for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortBy::Field(name) => f.debug_tuple("Field").field(name).finish(),
            SortBy::Key { name, .. } => f.debug_struct("Key").field("name", name).finish(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ViewOptions {
    pub sort_by: Option<SortBy>,
    /// Suppress per-entity field-change events; membership and order
    /// events are still delivered.
    pub list_changes_only: bool,
}

impl ViewOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_defaults(defaults: &ViewDefaults) -> Self {
        Self {
            sort_by: None,
            list_changes_only: defaults.list_changes_only,
        }
    }

    pub fn sort_by_field(mut self, name: impl Into<String>) -> Self {
        self.sort_by = Some(SortBy::field(name));
        self
    }

    pub fn sort_by_key(
        mut self,
        name: impl Into<String>,
        key: impl Fn(&Fields) -> FieldValue + 'static,
    ) -> Self {
        self.sort_by = Some(SortBy::key(name, key));
        self
    }

    pub fn list_changes_only(mut self, enabled: bool) -> Self {
        self.list_changes_only = enabled;
        self
    }

    /// JSON rendering of the options that affect behavior. Unset options
    /// are omitted, so the default renders as `{}`.
    pub fn options_key(&self) -> String {
        let mut key = Map::new();
        if self.list_changes_only {
            key.insert("listChangesOnly".into(), Value::Bool(true));
        }
        if let Some(sort_by) = &self.sort_by {
            key.insert("sortBy".into(), sort_by.identity());
        }
        Value::Object(key).to_string()
    }
}
