//! Dynamic values seen by templates
//!
//! Maps are shared by reference, as Go maps are, so `set` and `merge` on a
//! dict are visible through every variable holding it.

use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::files_object::Files;

pub type Dict = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(Rc<RefCell<Dict>>),
    Files(Rc<Files>),
    ApiVersions(Rc<Vec<String>>),
}

impl Value {
    pub fn map(dict: Dict) -> Self {
        Value::Map(Rc::new(RefCell::new(dict)))
    }

    pub fn empty_map() -> Self {
        Value::map(Dict::new())
    }

    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Nil,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Nil | Value::Files(_) => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => JsonValue::Object(
                map.borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<JsonMap<_, _>>(),
            ),
            Value::ApiVersions(versions) => {
                JsonValue::Array(versions.iter().cloned().map(JsonValue::String).collect())
            }
        }
    }

    /// Go template truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.borrow().is_empty(),
            Value::Files(_) | Value::ApiVersions(_) => true,
        }
    }

    /// Kind name as reported by `kindOf`
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "invalid",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float64",
            Value::String(_) => "string",
            Value::List(_) | Value::ApiVersions(_) => "slice",
            Value::Map(_) | Value::Files(_) => "map",
        }
    }

    /// Type name as reported by `typeOf`
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "<nil>",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float64",
            Value::String(_) => "string",
            Value::List(_) => "[]interface {}",
            Value::Map(_) => "map[string]interface {}",
            Value::Files(_) => "chart.Files",
            Value::ApiVersions(_) => "chartutil.VersionSet",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a string the way sprig's `toString` does
    pub fn to_str(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Nil => "<nil>".to_string(),
            other => other.to_string(),
        }
    }

    /// Lenient integer conversion (sprig `toInt64`)
    pub fn to_int(&self) -> i64 {
        match self {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Bool(b) => *b as i64,
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .or_else(|_| s.trim().parse::<f64>().map(|f| f as i64))
                .unwrap_or_default(),
            _ => 0,
        }
    }

    /// Lenient float conversion (sprig `toFloat64`)
    pub fn to_float(&self) -> f64 {
        match self {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Bool(b) => *b as i64 as f64,
            Value::String(s) => s.trim().parse().unwrap_or_default(),
            _ => 0.0,
        }
    }

    /// Whether the value is "empty" in the sprig sense
    pub fn is_empty(&self) -> bool {
        !self.is_truthy()
    }

    /// Copy nested maps so the result shares nothing with `self`
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::List(items) => Value::List(items.iter().map(Value::deep_copy).collect()),
            Value::Map(map) => Value::map(
                map.borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Equality used by `eq`, `ne` and list helpers; numbers compare by value
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.to_float() == other.to_float()
            }
            (Value::List(_), Value::List(_)) | (Value::Map(_), Value::Map(_)) => {
                self.to_json() == other.to_json()
            }
            _ => false,
        }
    }

    /// Ordering used by `lt`, `gt` and friends
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.to_float().partial_cmp(&other.to_float())
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Go's `%v` formatting
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "<nil>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "map[")?;
                for (i, (k, v)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}:{}", k, v)?;
                }
                write!(f, "]")
            }
            Value::Files(files) => write!(f, "map[{}]", files.names().join(" ")),
            Value::ApiVersions(versions) => write!(f, "[{}]", versions.join(" ")),
        }
    }
}

/// Format a float like Go's `%v`: shortest representation, exponent form
/// only for very large or very small magnitudes
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if x == 0.0 {
        return "0".to_string();
    }

    let sci = format!("{:e}", x);
    let exponent = sci
        .split_once('e')
        .and_then(|(_, e)| e.parse::<i32>().ok())
        .unwrap_or_default();

    if (-4..21).contains(&exponent) {
        return x.to_string();
    }

    let (mantissa, _) = sci.split_once('e').unwrap_or((&sci, ""));
    format!(
        "{}e{}{:02}",
        mantissa,
        if exponent < 0 { '-' } else { '+' },
        exponent.abs()
    )
}
