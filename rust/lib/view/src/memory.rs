//! In-memory entity store.
//!
//! Records are flat attribute maps keyed by `(entity type, id)`. References
//! between entities are stored by key (`{"ref": "Type/id"}`), so every load
//! materializes a fresh entity graph shaped by the requested fetch spec.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::access::{DataAccess, EntityStore};
use crate::config::ViewConfig;
use crate::error::AccessError;
use crate::fetch::FetchSpec;
use crate::file_loader::FileLoader;
use crate::value::{Entity, EntityList, Value};

/// Reference to another record, serialized as `{"ref": "Type/id"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefKey {
    #[serde(rename = "ref")]
    pub key: String,
}

impl RefKey {
    pub fn new(entity_type: &str, id: &str) -> Self {
        Self {
            key: format!("{}/{}", entity_type, id),
        }
    }

    pub fn of(entity: &Entity) -> Self {
        Self::new(entity.entity_type(), entity.id())
    }

    /// Split into `(entity type, id)`.
    pub fn parts(&self) -> Result<(&str, &str), AccessError> {
        self.key
            .split_once('/')
            .filter(|(t, id)| !t.is_empty() && !id.is_empty())
            .ok_or_else(|| AccessError::Decode(format!("malformed reference '{}'", self.key)))
    }
}

/// One stored attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Ref(RefKey),
    RefList(Vec<RefKey>),
    Scalar(serde_json::Value),
}

pub type Record = BTreeMap<String, StoredValue>;

type Key = (String, String);

/// MemoryStore is an `EntityStore` backed by a map of records.
pub struct MemoryStore {
    records: RwLock<BTreeMap<Key, Record>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a store and seed it from `config.data_dir`, if set.
    pub fn from_config(config: &ViewConfig) -> Result<Self, AccessError> {
        let store = Self::new();
        if let Some(dir) = &config.data_dir {
            let count = FileLoader::load(dir, &store)?;
            debug!("MemoryStore: seeded {} records from {:?}", count, dir);
        }
        Ok(store)
    }

    /// Insert or replace a record.
    pub fn insert(&self, entity_type: &str, id: &str, record: Record) {
        let mut records = self.records.write().unwrap();
        records.insert((entity_type.to_string(), id.to_string()), record);
    }

    /// Insert a record decoded from a JSON object.
    pub fn insert_json(&self, entity_type: &str, id: &str, data: &[u8]) -> Result<(), AccessError> {
        let record: Record = serde_json::from_slice(data)
            .map_err(|e| AccessError::Decode(format!("{}/{}: {}", entity_type, id, e)))?;
        self.insert(entity_type, id, record);
        Ok(())
    }

    /// Store an entity graph: the entity and, recursively, every entity it
    /// references through loaded attributes.
    pub fn insert_entity(&self, entity: &Entity) {
        let mut records = self.records.write().unwrap();
        let mut pending = vec![entity.clone()];
        let mut visited = Vec::new();
        while let Some(current) = pending.pop() {
            if visited.iter().any(|e: &Entity| e.ptr_eq(&current)) {
                continue;
            }
            let record = Self::to_record(&current, &mut pending);
            records.insert(
                (current.entity_type().to_string(), current.id().to_string()),
                record,
            );
            visited.push(current);
        }
    }

    pub fn record(&self, entity_type: &str, id: &str) -> Option<Record> {
        let records = self.records.read().unwrap();
        records
            .get(&(entity_type.to_string(), id.to_string()))
            .cloned()
    }

    pub fn contains(&self, entity_type: &str, id: &str) -> bool {
        self.record(entity_type, id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_record(entity: &Entity, referenced: &mut Vec<Entity>) -> Record {
        entity
            .attributes()
            .into_iter()
            .map(|(name, value)| {
                let stored = match value {
                    Value::Null => StoredValue::Scalar(serde_json::Value::Null),
                    Value::Bool(b) => StoredValue::Scalar(b.into()),
                    Value::Int(i) => StoredValue::Scalar(i.into()),
                    Value::Float(f) => StoredValue::Scalar(
                        serde_json::Number::from_f64(f)
                            .map(serde_json::Value::Number)
                            .unwrap_or(serde_json::Value::Null),
                    ),
                    Value::Text(s) => StoredValue::Scalar(s.into()),
                    Value::Ref(e) => {
                        let key = RefKey::of(&e);
                        referenced.push(e);
                        StoredValue::Ref(key)
                    }
                    Value::List(list) => {
                        let items = list.snapshot();
                        let keys = items.iter().map(RefKey::of).collect();
                        referenced.extend(items);
                        StoredValue::RefList(keys)
                    }
                };
                (name, stored)
            })
            .collect()
    }
}

/// Builds entity graphs from one consistent view of the records.
///
/// Within one materialization each record becomes exactly one entity, so
/// shared references stay shared.
struct Materializer<'a> {
    records: &'a BTreeMap<Key, Record>,
    seen: HashMap<Key, Entity>,
}

impl<'a> Materializer<'a> {
    fn new(records: &'a BTreeMap<Key, Record>) -> Self {
        Self {
            records,
            seen: HashMap::new(),
        }
    }

    fn entity(&mut self, entity_type: &str, id: &str, spec: &FetchSpec) -> Result<Entity, AccessError> {
        let records = self.records;
        let key = (entity_type.to_string(), id.to_string());
        let record = records
            .get(&key)
            .ok_or_else(|| AccessError::NotFound(format!("{}/{}", entity_type, id)))?;
        let entity = self
            .seen
            .entry(key)
            .or_insert_with(|| Entity::new(entity_type, id))
            .clone();

        for property in spec.properties() {
            if property.spec.is_none() && entity.is_loaded(&property.name) {
                continue;
            }
            let value = match record.get(&property.name) {
                None => Value::Null,
                Some(StoredValue::Scalar(json)) => scalar(json),
                Some(StoredValue::Ref(target)) => {
                    self.reference(target, property.spec.as_deref())?
                }
                Some(StoredValue::RefList(targets)) => {
                    let mut items = Vec::with_capacity(targets.len());
                    for target in targets {
                        if let Value::Ref(e) = self.reference(target, property.spec.as_deref())? {
                            items.push(e);
                        }
                    }
                    Value::List(EntityList::new(items))
                }
            };
            entity.set(&property.name, value);
        }
        Ok(entity)
    }

    /// A referenced entity: loaded with `spec` when nested, otherwise an
    /// unloaded stub carrying only type and id.
    fn reference(&mut self, target: &RefKey, spec: Option<&FetchSpec>) -> Result<Value, AccessError> {
        let (entity_type, id) = target.parts()?;
        match spec {
            Some(spec) => match self.entity(entity_type, id, spec) {
                Ok(e) => Ok(Value::Ref(e)),
                Err(AccessError::NotFound(_)) => {
                    warn!("MemoryStore: dangling reference '{}', loading as null", target.key);
                    Ok(Value::Null)
                }
                Err(e) => Err(e),
            },
            None => {
                let key = (entity_type.to_string(), id.to_string());
                let stub = self
                    .seen
                    .entry(key)
                    .or_insert_with(|| Entity::new(entity_type, id))
                    .clone();
                Ok(Value::Ref(stub))
            }
        }
    }
}

fn scalar(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

impl DataAccess for MemoryStore {
    fn reload(&self, entity: &Entity, spec: &FetchSpec) -> Result<Entity, AccessError> {
        let records = self.records.read().unwrap();
        let mut materializer = Materializer::new(&records);
        materializer.entity(entity.entity_type(), entity.id(), spec)
    }
}

impl EntityStore for MemoryStore {
    fn load(&self, entity_type: &str, id: &str, spec: &FetchSpec) -> Result<Option<Entity>, AccessError> {
        let records = self.records.read().unwrap();
        if !records.contains_key(&(entity_type.to_string(), id.to_string())) {
            return Ok(None);
        }
        let mut materializer = Materializer::new(&records);
        materializer.entity(entity_type, id, spec).map(Some)
    }

    fn query(&self, spec: &FetchSpec) -> Result<Vec<Entity>, AccessError> {
        let records = self.records.read().unwrap();
        let mut materializer = Materializer::new(&records);
        let mut results = Vec::new();
        for (entity_type, id) in records.keys() {
            if entity_type == &spec.entity_type {
                results.push(materializer.entity(entity_type, id, spec)?);
            }
        }
        Ok(results)
    }

    fn save(&self, entity: &Entity) -> Result<(), AccessError> {
        let mut ignored = Vec::new();
        let updates = Self::to_record(entity, &mut ignored);
        let mut records = self.records.write().unwrap();
        records
            .entry((entity.entity_type().to_string(), entity.id().to_string()))
            .or_default()
            .extend(updates);
        Ok(())
    }
}
