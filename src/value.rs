//! Runtime value model for live programs.
//!
//! Aggregates are shared `Rc<RefCell<_>>` handles so writes through one
//! alias are visible through every other, matching the source language's
//! object semantics. The whole runtime is single-threaded (one logical
//! thread of control, cooperative), so `Rc` is sound here.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::Function;
use crate::graph::UnitId;
use crate::runtime::Env;

pub type ObjectRef = Rc<RefCell<IndexMap<String, Value>>>;
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// A function value: closure body plus the environment it closed over.
/// Live functions additionally carry their graph unit; invoking one
/// spawns a fresh runtime instance of that unit.
#[derive(Clone)]
pub struct FunctionRef {
    pub unit: Option<UnitId>,
    pub env: Env,
    pub body: Rc<Function>,
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(ObjectRef),
    Array(ArrayRef),
    Function(FunctionRef),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(s.into().into())
    }

    pub fn object(fields: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Self {
        Value::Object(Rc::new(RefCell::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Property read by string key; arrays answer numeric keys and
    /// `length`. Missing keys read as `Undefined`, like the source
    /// language.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(obj) => obj.borrow().get(key).cloned().unwrap_or_default(),
            Value::Array(arr) => {
                if key == "length" {
                    Value::Number(arr.borrow().len() as f64)
                } else if let Ok(index) = key.parse::<usize>() {
                    arr.borrow().get(index).cloned().unwrap_or_default()
                } else {
                    Value::Undefined
                }
            }
            _ => Value::Undefined,
        }
    }

    /// Property write by string key. Writing past an array's end fills
    /// the gap with `Undefined`.
    pub fn set(&self, key: &str, value: Value) {
        match self {
            Value::Object(obj) => {
                obj.borrow_mut().insert(key.to_string(), value);
            }
            Value::Array(arr) => {
                if key == "length" {
                    if let Value::Number(n) = value {
                        arr.borrow_mut().resize(n as usize, Value::Undefined);
                    }
                } else if let Ok(index) = key.parse::<usize>() {
                    let mut items = arr.borrow_mut();
                    if index >= items.len() {
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                }
            }
            _ => {}
        }
    }

    /// Property removal (`delete`).
    pub fn remove(&self, key: &str) {
        match self {
            Value::Object(obj) => {
                obj.borrow_mut().shift_remove(key);
            }
            Value::Array(arr) => {
                if let Ok(index) = key.parse::<usize>() {
                    let mut items = arr.borrow_mut();
                    if index < items.len() {
                        items[index] = Value::Undefined;
                    }
                }
            }
            _ => {}
        }
    }

    /// Read through a whole path of string keys.
    pub fn get_path(&self, path: &[impl AsRef<str>]) -> Value {
        let mut current = self.clone();
        for key in path {
            current = current.get(key.as_ref());
        }
        current
    }

    /// Write through a path of string keys; intermediate segments must
    /// already exist.
    pub fn set_path(&self, path: &[impl AsRef<str>], value: Value) {
        match path {
            [] => {}
            [last] => self.set(last.as_ref(), value),
            [head, rest @ ..] => self.get(head.as_ref()).set_path(rest, value),
        }
    }

    /// Enumerable own keys, in insertion order (indices for arrays).
    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Object(obj) => obj.borrow().keys().cloned().collect(),
            Value::Array(arr) => (0..arr.borrow().len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Array(_) | Value::Function(_) => true,
        }
    }

    /// Strict equality: primitives by value, aggregates by identity.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => {
                Rc::ptr_eq(&a.body, &b.body) && Env::ptr_eq(&a.env, &b.env)
            }
            _ => false,
        }
    }

    /// Coercion used for computed property keys and `for-in` keys.
    pub fn to_key(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Array(arr) => arr
                .borrow()
                .iter()
                .map(Value::to_key)
                .collect::<Vec<_>>()
                .join(","),
            Value::Function(_) => "[function]".to_string(),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(true) => 1.0,
            Value::Bool(false) | Value::Null => 0.0,
            Value::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Object(_) | Value::Array(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(obj) => {
                let obj = obj.borrow();
                let mut map = f.debug_map();
                for (k, v) in obj.iter() {
                    map.entry(k, v);
                }
                map.finish()
            }
            Value::Array(arr) => f.debug_list().entries(arr.borrow().iter()).finish(),
            Value::Function(func) => match func.unit {
                Some(unit) => write!(f, "[function unit {unit}]"),
                None => write!(f, "[function]"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_reads_and_writes() {
        let state = Value::object([("x", Value::object([("a", Value::Number(1.0))]))]);
        assert_eq!(state.get_path(&["x", "a"]), Value::Number(1.0));
        state.set_path(&["x", "a"], Value::Number(2.0));
        assert_eq!(state.get_path(&["x", "a"]), Value::Number(2.0));
        assert!(state.get_path(&["x", "missing"]).is_undefined());
    }

    #[test]
    fn array_keys_are_indices() {
        let list = Value::array([Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(list.keys(), vec!["0".to_string(), "1".to_string()]);
        assert_eq!(list.get("length"), Value::Number(2.0));
        list.set("3", Value::Number(9.0));
        assert_eq!(list.get("length"), Value::Number(4.0));
        assert!(list.get("2").is_undefined());
    }

    #[test]
    fn strict_eq_is_identity_for_aggregates() {
        let a = Value::object([("k", Value::Number(1.0))]);
        let b = Value::object([("k", Value::Number(1.0))]);
        assert!(a.strict_eq(&a.clone()));
        assert!(!a.strict_eq(&b));
    }
}
