//! Raw entity data as handed over by the data-access layer.
//!
//! An `Entity` is a shared, identity-bearing object: cloning it clones the
//! handle, not the data. Attributes that are absent from the map are
//! "not loaded"; a loaded attribute may still hold `Value::Null`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A dynamically-typed attribute value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Reference to another entity (many-to-one / one-to-one).
    Ref(Entity),
    /// Ordered collection of entities (one-to-many).
    List(EntityList),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Value::Ref(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&EntityList> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

/// Scalars compare by value, references and lists by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Text(s) => write!(f, "Text({:?})", s),
            Value::Ref(e) => write!(f, "Ref({:?})", e),
            Value::List(l) => write!(f, "List(len={})", l.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Entity> for Value {
    fn from(e: Entity) -> Self {
        Value::Ref(e)
    }
}

impl From<EntityList> for Value {
    fn from(l: EntityList) -> Self {
        Value::List(l)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ── Entity ──────────────────────────────────────────────────────────

struct EntityData {
    entity_type: String,
    id: String,
    attributes: RwLock<BTreeMap<String, Value>>,
}

/// A raw, persistent domain object.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityData>,
}

impl Entity {
    /// Create an entity with no loaded attributes.
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EntityData {
                entity_type: entity_type.into(),
                id: id.into(),
                attributes: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.inner.entity_type
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Read an attribute. `None` means the attribute is not loaded.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.attributes.read().unwrap().get(name).cloned()
    }

    /// Write an attribute, marking it loaded.
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        let mut attrs = self.inner.attributes.write().unwrap();
        attrs.insert(name.to_string(), value.into());
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.inner.attributes.read().unwrap().contains_key(name)
    }

    /// Names of all loaded attributes, sorted.
    pub fn loaded_attributes(&self) -> Vec<String> {
        self.inner.attributes.read().unwrap().keys().cloned().collect()
    }

    /// Snapshot of all loaded attributes.
    pub fn attributes(&self) -> BTreeMap<String, Value> {
        self.inner.attributes.read().unwrap().clone()
    }

    /// Identity comparison: true if both handles point at the same object.
    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address-based identity key, stable while any handle is alive.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.inner.entity_type, self.inner.id)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.inner.entity_type, self.inner.id)
    }
}

// ── EntityList ──────────────────────────────────────────────────────

/// Shared, ordered backing collection for a one-to-many attribute.
///
/// Clones share the same storage, so a list read from an entity and
/// mutated through a collection view writes through to the entity.
#[derive(Clone, Default)]
pub struct EntityList {
    items: Arc<RwLock<Vec<Entity>>>,
}

impl EntityList {
    pub fn new(items: Vec<Entity>) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Entity> {
        self.items.read().unwrap().get(index).cloned()
    }

    pub fn push(&self, entity: Entity) {
        self.items.write().unwrap().push(entity);
    }

    /// Insert at `index`. Caller guarantees `index <= len`.
    pub fn insert(&self, index: usize, entity: Entity) {
        self.items.write().unwrap().insert(index, entity);
    }

    /// Replace the element at `index`, returning the previous one.
    pub fn replace(&self, index: usize, entity: Entity) -> Option<Entity> {
        let mut items = self.items.write().unwrap();
        items
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, entity))
    }

    pub fn remove(&self, index: usize) -> Option<Entity> {
        let mut items = self.items.write().unwrap();
        if index < items.len() {
            Some(items.remove(index))
        } else {
            None
        }
    }

    /// First position of `entity` (by identity) within `[start, end)`.
    pub fn position_in(&self, entity: &Entity, start: usize, end: usize) -> Option<usize> {
        let items = self.items.read().unwrap();
        let end = end.min(items.len());
        if start >= end {
            return None;
        }
        items[start..end]
            .iter()
            .position(|e| e.ptr_eq(entity))
            .map(|p| p + start)
    }

    pub fn position(&self, entity: &Entity) -> Option<usize> {
        self.position_in(entity, 0, usize::MAX)
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<Entity> {
        self.items.read().unwrap().clone()
    }

    pub fn ptr_eq(&self, other: &EntityList) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

impl fmt::Debug for EntityList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.snapshot().iter()).finish()
    }
}

impl FromIterator<Entity> for EntityList {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        EntityList::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unloaded_attribute_is_none() {
        let e = Entity::new("User", "u1").with("name", "Alice");
        assert_eq!(e.get("name"), Some(Value::Text("Alice".into())));
        assert_eq!(e.get("email"), None);
        assert!(e.is_loaded("name"));
        assert!(!e.is_loaded("email"));
    }

    #[test]
    fn loaded_null_differs_from_unloaded() {
        let e = Entity::new("User", "u1").with("manager", Value::Null);
        assert!(e.is_loaded("manager"));
        assert_eq!(e.get("manager"), Some(Value::Null));
    }

    #[test]
    fn clones_share_identity_and_data() {
        let a = Entity::new("User", "u1");
        let b = a.clone();
        b.set("name", "Bob");
        assert!(a.ptr_eq(&b));
        assert_eq!(a.get("name"), Some(Value::from("Bob")));

        let other = Entity::new("User", "u1");
        assert!(!a.ptr_eq(&other));
    }

    #[test]
    fn references_compare_by_identity() {
        let target = Entity::new("User", "u2");
        let same = Value::Ref(target.clone());
        assert_eq!(same, Value::Ref(target));
        assert_ne!(same, Value::Ref(Entity::new("User", "u2")));
    }

    #[test]
    fn entity_list_shared_storage() {
        let list = EntityList::new(vec![Entity::new("Task", "t1")]);
        let alias = list.clone();
        alias.push(Entity::new("Task", "t2"));
        assert_eq!(list.len(), 2);
        assert!(list.ptr_eq(&alias));
    }

    #[test]
    fn entity_list_position_in_window() {
        let a = Entity::new("Task", "a");
        let b = Entity::new("Task", "b");
        let list = EntityList::new(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(list.position(&a), Some(0));
        assert_eq!(list.position_in(&a, 1, 3), Some(2));
        assert_eq!(list.position_in(&b, 2, 3), None);
        assert_eq!(list.position_in(&b, 5, 9), None);
    }

    #[test]
    fn entity_list_replace_and_remove() {
        let list: EntityList = vec![Entity::new("Task", "a")].into_iter().collect();
        let old = list.replace(0, Entity::new("Task", "b")).unwrap();
        assert_eq!(old.id(), "a");
        assert_eq!(list.get(0).unwrap().id(), "b");
        assert!(list.replace(3, Entity::new("Task", "c")).is_none());
        assert_eq!(list.remove(0).unwrap().id(), "b");
        assert!(list.remove(0).is_none());
    }
}
