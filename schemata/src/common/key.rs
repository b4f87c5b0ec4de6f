use crate::common::KEY_PATH_SEPARATOR;
use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// A primary key as understood by the storage engine.
///
/// Keys are totally ordered: every number sorts before every text key, and every
/// text key sorts before every array key. Arrays compare element by element.
#[derive(Debug, Clone)]
pub enum Key {
    Number(f64),
    Text(String),
    Array(Vec<Key>),
}

impl Key {
    /// Converts a raw record value into a key, or `None` when the value cannot be one
    /// (booleans, nulls, objects, or arrays containing such values).
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Number(number) => number.as_f64().map(|it| Key::Number(unsigned_zero(it))),
            Value::String(text) => Some(Key::Text(text.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
            _ => None,
        }
    }

    /// Converts the key back into its raw record form.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(number) => {
                if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
                    Value::from(*number as i64)
                } else {
                    serde_json::Number::from_f64(*number)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            Key::Text(text) => Value::String(text.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    /// NaN is never a valid key, at any nesting depth.
    pub fn is_valid(&self) -> bool {
        match self {
            Key::Number(number) => !number.is_nan(),
            Key::Text(_) => true,
            Key::Array(items) => items.iter().all(Key::is_valid),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Key::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(text) => Some(text),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Text(_) => 1,
            Key::Array(_) => 2,
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => unsigned_zero(*a).total_cmp(&unsigned_zero(*b)),
            (Key::Text(a), Key::Text(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Number(number) => write!(f, "{}", number),
            Key::Text(text) => write!(f, "\"{}\"", text),
            Key::Array(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}

impl From<f64> for Key {
    fn from(value: f64) -> Self {
        Key::Number(unsigned_zero(value))
    }
}

// -0.0 and 0.0 name the same key
fn unsigned_zero(number: f64) -> f64 {
    if number == 0.0 {
        0.0
    } else {
        number
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Number(value as f64)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Number(value as f64)
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::Number(value as f64)
    }
}

impl From<u64> for Key {
    fn from(value: u64) -> Self {
        Key::Number(value as f64)
    }
}

impl From<Vec<Key>> for Key {
    fn from(value: Vec<Key>) -> Self {
        Key::Array(value)
    }
}

/// Rule for extracting a record's primary key.
///
/// A `Single` path yields the key found at that (possibly dotted) path. A `Compound`
/// path yields an array key made of the values at each of its paths, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPath {
    Single(String),
    Compound(Vec<String>),
}

impl KeyPath {
    pub fn single(path: &str) -> Self {
        KeyPath::Single(path.to_string())
    }

    pub fn compound(paths: &[&str]) -> Self {
        KeyPath::Compound(paths.iter().map(|path| path.to_string()).collect())
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, KeyPath::Compound(_))
    }

    /// Checks that every path is non-empty and has no empty segment.
    pub fn validate(&self) -> SchemataResult<()> {
        match self {
            KeyPath::Single(path) => validate_path(path),
            KeyPath::Compound(paths) => {
                if paths.is_empty() {
                    log::error!("Compound key path must name at least one field");
                    return Err(SchemataError::new(
                        "Compound key path must name at least one field",
                        ErrorKind::SchemaError,
                    ));
                }
                paths.iter().try_for_each(|path| validate_path(path))
            }
        }
    }

    /// Extracts the key from a raw record, `None` when any path is missing or holds a
    /// value that cannot be a key.
    pub fn extract(&self, record: &Value) -> Option<Key> {
        let key = match self {
            KeyPath::Single(path) => Key::from_value(lookup(record, path)?)?,
            KeyPath::Compound(paths) => Key::Array(
                paths
                    .iter()
                    .map(|path| lookup(record, path).and_then(Key::from_value))
                    .collect::<Option<Vec<_>>>()?,
            ),
        };
        key.is_valid().then_some(key)
    }

    /// Whether every path of this key path resolves to some value in `record`, key or
    /// not.
    pub fn has_value(&self, record: &Value) -> bool {
        match self {
            KeyPath::Single(path) => lookup(record, path).is_some(),
            KeyPath::Compound(paths) => paths.iter().all(|path| lookup(record, path).is_some()),
        }
    }

    /// Writes `key` into `record` at this path, creating intermediate objects.
    ///
    /// Only single paths can receive a generated key; returns `false` when the record
    /// (or an intermediate value) is not an object or the path is compound.
    pub fn inject(&self, record: &mut Value, key: &Key) -> bool {
        let KeyPath::Single(path) = self else {
            return false;
        };

        let mut segments = path.split(KEY_PATH_SEPARATOR).peekable();
        let mut current = record;
        while let Some(segment) = segments.next() {
            let Value::Object(map) = current else {
                return false;
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), key.to_value());
                return true;
            }
            current = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        false
    }
}

impl Display for KeyPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPath::Single(path) => write!(f, "{}", path),
            KeyPath::Compound(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath::single(path)
    }
}

impl From<&[&str]> for KeyPath {
    fn from(paths: &[&str]) -> Self {
        KeyPath::compound(paths)
    }
}

impl<const N: usize> From<[&str; N]> for KeyPath {
    fn from(paths: [&str; N]) -> Self {
        KeyPath::compound(&paths)
    }
}

fn validate_path(path: &str) -> SchemataResult<()> {
    if path.is_empty() || path.split(KEY_PATH_SEPARATOR).any(str::is_empty) {
        log::error!("Invalid key path '{}'", path);
        return Err(SchemataError::new(
            &format!("Invalid key path '{}': empty segment", path),
            ErrorKind::SchemaError,
        ));
    }
    Ok(())
}

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split(KEY_PATH_SEPARATOR)
        .try_fold(record, |current, segment| current.as_object()?.get(segment))
}
