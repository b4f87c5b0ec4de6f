use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

/// Translates between a table's record type and the engine's raw representation.
///
/// A codec is the only place where record shape is enforced. Both directions may
/// refuse a value with [`ErrorKind::ValidationError`]; the query layer never
/// coerces or drops a value a codec refuses.
///
/// For any value `v` accepted by `encode`, `decode(encode(v))` must yield a value
/// equal to `v`.
pub trait Codec: Send + Sync + 'static {
    type Value;

    fn encode(&self, value: &Self::Value) -> SchemataResult<Value>;

    fn decode(&self, raw: &Value) -> SchemataResult<Self::Value>;

    /// Runs a raw record through `decode` then `encode`, returning the canonical
    /// raw form the engine should store.
    fn validate(&self, raw: &Value) -> SchemataResult<Value> {
        let value = self.decode(raw)?;
        self.encode(&value)
    }
}

type ValueCheck<T> = Arc<dyn Fn(&T) -> Result<(), String> + Send + Sync>;

/// Codec for any `serde` record type, stored as structured JSON.
///
/// Shape checking is whatever `serde` enforces for `T` (missing fields, wrong types,
/// and unknown fields when `T` uses `#[serde(deny_unknown_fields)]`). An extra value
/// check can be attached with [`SerdeCodec::with_check`]; it runs on both encode and
/// decode.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Todo { id: u32, title: String }
///
/// let codec = SerdeCodec::<Todo>::new()
///     .with_check(|todo| if todo.title.is_empty() { Err("empty title".into()) } else { Ok(()) });
/// ```
pub struct SerdeCodec<T> {
    check: Option<ValueCheck<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeCodec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    pub fn new() -> Self {
        SerdeCodec {
            check: None,
            _marker: PhantomData,
        }
    }

    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    {
        self.check = Some(Arc::new(check));
        self
    }

    fn run_check(&self, value: &T) -> SchemataResult<()> {
        match &self.check {
            Some(check) => check(value).map_err(|reason| {
                SchemataError::new(&format!("Record rejected: {}", reason), ErrorKind::ValidationError)
            }),
            None => Ok(()),
        }
    }
}

impl<T> Default for SerdeCodec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SerdeCodec<T> {
    fn clone(&self) -> Self {
        SerdeCodec {
            check: self.check.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Debug for SerdeCodec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerdeCodec")
            .field("type", &std::any::type_name::<T>())
            .field("checked", &self.check.is_some())
            .finish()
    }
}

impl<T> Codec for SerdeCodec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    type Value = T;

    fn encode(&self, value: &T) -> SchemataResult<Value> {
        self.run_check(value)?;
        Ok(serde_json::to_value(value)?)
    }

    fn decode(&self, raw: &Value) -> SchemataResult<T> {
        let value = T::deserialize(raw)?;
        self.run_check(&value)?;
        Ok(value)
    }
}

/// Pass-through codec accepting any JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl RawCodec {
    fn ensure_object(raw: &Value) -> SchemataResult<()> {
        if raw.is_object() {
            Ok(())
        } else {
            Err(SchemataError::new(
                &format!("Record must be an object, found {}", raw),
                ErrorKind::ValidationError,
            ))
        }
    }
}

impl Codec for RawCodec {
    type Value = Value;

    fn encode(&self, value: &Value) -> SchemataResult<Value> {
        Self::ensure_object(value)?;
        Ok(value.clone())
    }

    fn decode(&self, raw: &Value) -> SchemataResult<Value> {
        Self::ensure_object(raw)?;
        Ok(raw.clone())
    }
}
