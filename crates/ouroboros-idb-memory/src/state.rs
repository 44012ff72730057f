//! Database, store and record state

use crate::error::{constraint_error, data_error};
use ouroboros_idb::{HostFailure, StoreConfig, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Record key ordered by the host key order
#[derive(Debug, Clone)]
pub(crate) struct RecordKey(pub Value);

impl PartialEq for RecordKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RecordKey {}

impl PartialOrd for RecordKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.key_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseState {
    pub version: u32,
    pub stores: BTreeMap<String, StoreState>,
}

/// Largest key a generator hands out (2^53, the last exact double)
pub(crate) const MAX_GENERATED_KEY: u64 = 1 << 53;

#[derive(Debug, Clone)]
pub(crate) struct StoreState {
    pub config: StoreConfig,
    pub records: BTreeMap<RecordKey, Value>,
    /// Next generated key (key generators start at 1); past
    /// `MAX_GENERATED_KEY` the generator is exhausted
    pub next_key: u64,
    /// Index name -> key path
    pub indexes: BTreeMap<String, String>,
}

impl StoreState {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            records: BTreeMap::new(),
            next_key: 1,
            indexes: BTreeMap::new(),
        }
    }

    /// Determine the key for a write, generating (and injecting) one if needed
    fn resolve_key(&mut self, value: &mut Value, key: Option<Value>) -> Result<Value, HostFailure> {
        let key_path = self.config.key_path.clone();
        let key = match (&key_path, key) {
            (Some(_), Some(_)) => {
                return Err(data_error(
                    "The object store uses in-line keys and the key parameter was provided.",
                ))
            }
            (Some(path), None) => match value.lookup(path) {
                Some(found) => {
                    let found = found.clone();
                    found.validate_key().map_err(|_| {
                        data_error("Evaluating the object store's key path yielded a value that is not a valid key.")
                    })?;
                    found
                }
                None if self.config.auto_increment => {
                    let generated = self.generate_key()?;
                    inject_key(value, path, generated.clone())?;
                    return Ok(generated);
                }
                None => {
                    return Err(data_error(
                        "Evaluating the object store's key path did not yield a value.",
                    ))
                }
            },
            (None, Some(key)) => {
                key.validate_key()
                    .map_err(|_| data_error("The parameter is not a valid key."))?;
                key
            }
            (None, None) if self.config.auto_increment => return self.generate_key(),
            (None, None) => {
                return Err(data_error(
                    "The object store uses out-of-line keys and has no key generator and the key parameter was not provided.",
                ))
            }
        };

        // Explicit numeric keys push the generator forward
        if self.config.auto_increment {
            if let Some(n) = key.as_f64() {
                if n >= MAX_GENERATED_KEY as f64 {
                    self.next_key = MAX_GENERATED_KEY + 1;
                } else if n >= self.next_key as f64 {
                    self.next_key = n.floor() as u64 + 1;
                }
            }
        }
        Ok(key)
    }

    fn generate_key(&mut self) -> Result<Value, HostFailure> {
        let key = self.next_key;
        if key > MAX_GENERATED_KEY {
            return Err(constraint_error(
                "The key generator has reached its maximum value.",
            ));
        }
        let generated = i64::try_from(key).map_err(|_| {
            constraint_error("The key generator has reached its maximum value.")
        })?;
        self.next_key = key + 1;
        Ok(Value::Int(generated))
    }

    /// Insert or replace
    pub fn put(&mut self, mut value: Value, key: Option<Value>) -> Result<Value, HostFailure> {
        let key = self.resolve_key(&mut value, key)?;
        self.records.insert(RecordKey(key.clone()), value);
        Ok(key)
    }

    /// Insert only
    pub fn add(&mut self, mut value: Value, key: Option<Value>) -> Result<Value, HostFailure> {
        let key = self.resolve_key(&mut value, key)?;
        let record_key = RecordKey(key.clone());
        if self.records.contains_key(&record_key) {
            return Err(constraint_error("Key already exists in the object store."));
        }
        self.records.insert(record_key, value);
        Ok(key)
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.records.get(&RecordKey(key.clone())).cloned()
    }

    pub fn delete(&mut self, key: &Value) {
        self.records.remove(&RecordKey(key.clone()));
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn count(&self) -> u64 {
        self.records.len() as u64
    }

    /// First record, in key order, whose field at `key_path` equals `key`
    pub fn find_by(&self, key_path: &str, key: &Value) -> Option<Value> {
        self.records
            .values()
            .find(|record| {
                record
                    .lookup(key_path)
                    .map(|field| field.key_cmp(key) == Ordering::Equal)
                    .unwrap_or(false)
            })
            .cloned()
    }
}

/// Write a generated key into a record at a dotted path, creating
/// intermediate records as needed
fn inject_key(value: &mut Value, key_path: &str, key: Value) -> Result<(), HostFailure> {
    let mut current = value;
    let mut fields = key_path.split('.').peekable();

    while let Some(field) = fields.next() {
        let map = match current {
            Value::Map(map) => map,
            _ => {
                return Err(data_error(
                    "A generated key could not be inserted into the value.",
                ))
            }
        };

        if fields.peek().is_none() {
            map.insert(field.to_string(), key);
            return Ok(());
        }

        current = map
            .entry(field.to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
    }

    Err(data_error("A generated key could not be inserted into the value."))
}
