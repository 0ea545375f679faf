//! value representation
//!
//! Variables hold the following data types
//! - boolean (true/false)
//! - integer (signed, i64)
//! - decimal (f64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", where the key is of type string)
//!
//! Additionally:
//! - there is no `null`/`None` value. A top level `null` is reported as absent (see [Value::from_json] and friends)
//!   and `null` entries nested inside arrays or objects are dropped during conversion.
//! - numbers that do not fit an `i64` are represented as `decimal`
//!
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};

/// Insertion ordered map of values
pub type Object = indexmap::IndexMap<String, Value>;

/// All possible value types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
}

impl Value {
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Follow a path of object keys
    pub fn get_path<'a, I>(&self, path: I) -> Option<&Value>
    where
        I: IntoIterator<Item = &'a str>,
    {
        path.into_iter()
            .try_fold(self, |current, key| current.as_object()?.get(key))
    }

    /// Wrap the value into nested single-key objects, innermost key last
    ///
    /// `nest(1, ["a", "b"])` is `{ a = { b = 1 } }`
    pub fn nest<'a, I>(self, path: I) -> Value
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: DoubleEndedIterator,
    {
        path.into_iter().rev().fold(self, |inner, key| {
            Value::Object(Object::from([(key.to_string(), inner)]))
        })
    }

    /// Convert a parsed hcl value, `None` for `null`
    pub fn from_hcl(value: hcl::Value) -> Option<Value> {
        Some(match value {
            hcl::Value::Null => return None,
            hcl::Value::Bool(b) => b.into(),
            hcl::Value::Number(n) => n.into(),
            hcl::Value::String(s) => s.into(),
            hcl::Value::Array(array) => {
                Value::Array(array.into_iter().filter_map(Value::from_hcl).collect())
            }
            hcl::Value::Object(object) => Value::Object(
                object
                    .into_iter()
                    .filter_map(|(k, v)| Value::from_hcl(v).map(|v| (k, v)))
                    .collect(),
            ),
        })
    }

    /// Convert a parsed json value, `None` for `null`
    pub fn from_json(value: serde_json::Value) -> Option<Value> {
        use serde_json::Value as Json;

        Some(match value {
            Json::Null => return None,
            Json::Bool(b) => b.into(),
            Json::Number(n) => match n.as_i64() {
                Some(int) => Value::Integer(int),
                None => Value::Decimal(n.as_f64()?),
            },
            Json::String(s) => s.into(),
            Json::Array(array) => {
                Value::Array(array.into_iter().filter_map(Value::from_json).collect())
            }
            Json::Object(object) => Value::Object(
                object
                    .into_iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k, v)))
                    .collect(),
            ),
        })
    }

    /// Convert a parsed yaml value, `None` for `null`
    ///
    /// Non-string mapping keys are stringified, tags are ignored.
    pub fn from_yaml(value: serde_yaml::Value) -> Option<Value> {
        use serde_yaml::Value as Yaml;

        Some(match value {
            Yaml::Null => return None,
            Yaml::Bool(b) => b.into(),
            Yaml::Number(n) => match n.as_i64() {
                Some(int) => Value::Integer(int),
                None => Value::Decimal(n.as_f64()?),
            },
            Yaml::String(s) => s.into(),
            Yaml::Sequence(sequence) => {
                Value::Array(sequence.into_iter().filter_map(Value::from_yaml).collect())
            }
            Yaml::Mapping(mapping) => Value::Object(
                mapping
                    .into_iter()
                    .filter_map(|(k, v)| {
                        let key = match k {
                            Yaml::String(s) => s,
                            Yaml::Bool(b) => b.to_string(),
                            Yaml::Number(n) => n.to_string(),
                            _ => return None,
                        };
                        Value::from_yaml(v).map(|v| (key, v))
                    })
                    .collect(),
            ),
            Yaml::Tagged(tagged) => return Value::from_yaml(tagged.value),
        })
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl From<hcl::Number> for Value {
    fn from(value: hcl::Number) -> Self {
        if let Some(int) = value.as_i64() {
            return Value::Integer(int);
        }

        // every hcl number that is not an i64 is representable as f64 (possibly lossy for large u64)
        Value::Decimal(value.as_f64().unwrap_or(f64::NAN))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Value {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Value::Object(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Token form as passed to terraform on the command line
///
/// Scalars are written plainly (strings without quotes), collections as json which terraform reads as hcl.
/// Decimals always carry a fraction or exponent so they read back as decimals.
impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Decimal(value) => write!(f, "{value:?}"),
            Value::String(value) => f.write_str(value),
            Value::Array(_) | Value::Object(_) => {
                let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
        }
    }
}
