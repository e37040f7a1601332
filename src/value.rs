// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Dynamic export values
//!
//! A module's export value is untyped from the engine's point of view: a
//! factory may return a plain value, or mutate the `exports` placeholder it
//! was handed. [`Value`] models both. Objects are shared by reference
//! ([`ObjectRef`]), which is what makes the singleton-export guarantee
//! observable: every dependent of a module sees the same object.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::loader::ScopedRequire;

/// A shared, mutable string-keyed record.
///
/// Cloning an `ObjectRef` clones the reference, not the contents; identity is
/// compared with [`ObjectRef::ptr_eq`].
#[derive(Clone, Default)]
pub struct ObjectRef(Arc<Mutex<BTreeMap<String, Value>>>);

impl ObjectRef {
    /// Create a new empty object
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether two references point at the same object
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Set a field
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.0.lock().insert(key.into(), value);
    }

    /// Read a field
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.lock().get(key).cloned()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Whether the object has no fields
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Objects can be cyclic (module metadata holds its own exports), so
        // never recurse into fields here.
        write!(f, "ObjectRef({} fields)", self.len())
    }
}

/// A dynamic value flowing between modules: an export, a dependency argument,
/// or a context-injected special.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value; a factory returning this keeps its exports placeholder
    Undefined,
    /// Boolean
    Bool(bool),
    /// Double-precision number
    Number(f64),
    /// String
    String(String),
    /// Shared object reference
    Object(ObjectRef),
    /// A require function scoped to a module's own base path
    Require(ScopedRequire),
}

impl Value {
    /// Create a new empty object value
    pub fn object() -> Self {
        Self::Object(ObjectRef::new())
    }

    /// Whether this is [`Value::Undefined`]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// The object reference, if this is an object
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The string contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(string) => Some(string),
            _ => None,
        }
    }

    /// The numeric contents, if this is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }

    /// The scoped require, if this is one
    pub fn as_require(&self) -> Option<&ScopedRequire> {
        match self {
            Self::Require(require) => Some(require),
            _ => None,
        }
    }

    /// Convert a JSON document into a value tree.
    ///
    /// Arrays become objects with index keys plus a `length` field, which is
    /// how dependents conventionally consume list-shaped exports.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Undefined,
            serde_json::Value::Bool(flag) => Self::Bool(*flag),
            serde_json::Value::Number(number) => Self::Number(number.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(string) => Self::String(string.clone()),
            serde_json::Value::Array(items) => {
                let object = ObjectRef::new();
                for (index, item) in items.iter().enumerate() {
                    object.insert(index.to_string(), Self::from_json(item));
                }
                object.insert("length", Self::Number(items.len() as f64));
                Self::Object(object)
            }
            serde_json::Value::Object(fields) => {
                let object = ObjectRef::new();
                for (key, field) in fields {
                    object.insert(key.clone(), Self::from_json(field));
                }
                Self::Object(object)
            }
        }
    }
}

impl PartialEq for Value {
    /// Primitives compare structurally, objects by reference identity.
    /// Scoped requires never compare equal.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Self::Bool(flag)
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Self::Number(number)
    }
}

impl From<&str> for Value {
    fn from(string: &str) -> Self {
        Self::String(string.to_string())
    }
}

impl From<String> for Value {
    fn from(string: String) -> Self {
        Self::String(string)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Self::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_identity() {
        let object = ObjectRef::new();
        let alias = object.clone();
        assert!(object.ptr_eq(&alias));
        assert!(!object.ptr_eq(&ObjectRef::new()));

        alias.insert("x", Value::Number(1.0));
        assert_eq!(object.get("x"), Some(Value::Number(1.0)));
    }

    #[test]
    fn from_json_scalars() {
        let json: serde_json::Value = serde_json::from_str(r#"{"name": "a", "n": 2, "ok": true}"#).unwrap();
        let value = Value::from_json(&json);
        let object = value.as_object().unwrap();
        assert_eq!(object.get("name"), Some(Value::String("a".into())));
        assert_eq!(object.get("n"), Some(Value::Number(2.0)));
        assert_eq!(object.get("ok"), Some(Value::Bool(true)));
    }

    #[test]
    fn from_json_array() {
        let json: serde_json::Value = serde_json::from_str(r#"["x", "y"]"#).unwrap();
        let value = Value::from_json(&json);
        let object = value.as_object().unwrap();
        assert_eq!(object.get("0"), Some(Value::String("x".into())));
        assert_eq!(object.get("1"), Some(Value::String("y".into())));
        assert_eq!(object.get("length"), Some(Value::Number(2.0)));
    }
}
