use crate::common::{Key, FIRST_GENERATED_KEY};
use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use crate::schema::TableOptions;
use im::OrdMap;
use serde_json::Value;

/// Records of one collection, ordered by key.
///
/// Cloning is O(1); clones share structure until one side is written.
#[derive(Debug, Clone)]
pub(crate) struct MemoryCollection {
    options: TableOptions,
    records: OrdMap<Key, Value>,
    // `None` once an explicit key has pushed the generator past `u64::MAX`
    next_key: Option<u64>,
}

impl MemoryCollection {
    pub(crate) fn new(options: TableOptions) -> Self {
        MemoryCollection {
            options,
            records: OrdMap::new(),
            next_key: Some(FIRST_GENERATED_KEY),
        }
    }

    pub(crate) fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Stores `record` and returns its key together with the record as stored, which
    /// carries the generated key when one was assigned.
    pub(crate) fn insert(&mut self, mut record: Value, overwrite: bool) -> SchemataResult<(Key, Value)> {
        let key = self.resolve_key(&mut record)?;
        if !overwrite && self.records.contains_key(&key) {
            return Err(SchemataError::new(
                &format!("A record with key {} already exists", key),
                ErrorKind::WriteError,
            ));
        }

        if self.options.auto_increment {
            self.advance_generator(&key);
        }
        self.records.insert(key.clone(), record.clone());
        Ok((key, record))
    }

    pub(crate) fn get(&self, key: &Key) -> Option<Value> {
        self.records.get(key).cloned()
    }

    pub(crate) fn values(&self) -> Vec<Value> {
        self.records.values().cloned().collect()
    }

    pub(crate) fn remove(&mut self, key: &Key) {
        self.records.remove(key);
    }

    /// Drops every record. The key generator keeps counting.
    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    fn resolve_key(&mut self, record: &mut Value) -> SchemataResult<Key> {
        let key_path = &self.options.key_path;
        if let Some(key) = key_path.extract(record) {
            return Ok(key);
        }

        if self.options.auto_increment && !key_path.has_value(record) {
            let Some(next_key) = self.next_key else {
                return Err(SchemataError::new(
                    &format!("Key generator at {} is exhausted", key_path),
                    ErrorKind::WriteError,
                ));
            };
            let key = Key::from(next_key);
            if key_path.inject(record, &key) {
                return Ok(key);
            }
            return Err(SchemataError::new(
                &format!("Generated key cannot be stored at {}", key_path),
                ErrorKind::WriteError,
            ));
        }

        Err(SchemataError::new(
            &format!("Record has no valid key at {}", key_path),
            ErrorKind::WriteError,
        ))
    }

    fn advance_generator(&mut self, key: &Key) {
        let (Some(number), Some(next_key)) = (key.as_number(), self.next_key) else {
            return;
        };
        if !number.is_finite() || number < next_key as f64 {
            return;
        }

        let following = number.floor() + 1.0;
        self.next_key = if following < u64::MAX as f64 {
            Some(following as u64)
        } else {
            None
        };
    }
}
