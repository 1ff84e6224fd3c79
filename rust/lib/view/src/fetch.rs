//! Fetch specification: which attributes must be loaded to satisfy a contract.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::value::{Entity, Value};

/// One property of a fetch specification. Relationship attributes carry the
/// nested specification of the related entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchProperty {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<Arc<FetchSpec>>,
}

impl FetchProperty {
    pub fn is_nested(&self) -> bool {
        self.spec.is_some()
    }
}

/// Entity-type-bound description of the attributes a view needs.
///
/// Properties keep insertion order and are unique by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSpec {
    pub entity_type: String,
    pub name: String,
    properties: Vec<FetchProperty>,
}

impl FetchSpec {
    pub fn new(entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
            properties: vec![],
        }
    }

    /// Add a leaf property. Adding an existing name is a no-op.
    pub fn add_property(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(FetchProperty {
            name: name.into(),
            spec: None,
        })
    }

    /// Add a relationship property with its nested spec. First write wins.
    pub fn add_nested(&mut self, name: impl Into<String>, spec: Arc<FetchSpec>) -> &mut Self {
        self.push(FetchProperty {
            name: name.into(),
            spec: Some(spec),
        })
    }

    fn push(&mut self, property: FetchProperty) -> &mut Self {
        if !self.contains(&property.name) {
            self.properties.push(property);
        }
        self
    }

    pub fn properties(&self) -> &[FetchProperty] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&FetchProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    pub fn property_names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.name.as_str()).collect()
    }

    /// Check that `entity` has every property loaded, recursively through
    /// nested references and collections. A loaded null satisfies any
    /// nested spec.
    pub fn is_satisfied_by(&self, entity: &Entity) -> bool {
        self.properties.iter().all(|prop| {
            let Some(value) = entity.get(&prop.name) else {
                return false;
            };
            match (&prop.spec, value) {
                (None, _) => true,
                (Some(nested), Value::Ref(target)) => nested.is_satisfied_by(&target),
                (Some(nested), Value::List(list)) => {
                    list.snapshot().iter().all(|e| nested.is_satisfied_by(e))
                }
                (Some(_), _) => true,
            }
        })
    }

    /// True if every property of `other` (recursively) is also required here.
    pub fn covers(&self, other: &FetchSpec) -> bool {
        other.properties.iter().all(|theirs| match self.property(&theirs.name) {
            None => false,
            Some(ours) => match (&ours.spec, &theirs.spec) {
                (_, None) => true,
                (Some(a), Some(b)) => a.covers(b),
                (None, Some(_)) => false,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::EntityList;

    fn minimal() -> Arc<FetchSpec> {
        let mut spec = FetchSpec::new("Node", "Minimal");
        spec.add_property("name");
        Arc::new(spec)
    }

    #[test]
    fn add_property_is_idempotent_first_write_wins() {
        let mut spec = FetchSpec::new("Node", "WithParent");
        spec.add_property("name")
            .add_nested("parent", minimal())
            .add_property("parent")
            .add_property("name");
        assert_eq!(spec.property_names(), vec!["name", "parent"]);
        assert!(spec.property("parent").unwrap().is_nested());
    }

    #[test]
    fn satisfied_by_requires_loaded_attributes() {
        let mut spec = FetchSpec::new("Node", "WithParent");
        spec.add_property("name").add_nested("parent", minimal());

        let parent = Entity::new("Node", "b").with("name", "B");
        let full = Entity::new("Node", "a")
            .with("name", "A")
            .with("parent", parent);
        assert!(spec.is_satisfied_by(&full));

        let shallow_parent = Entity::new("Node", "b");
        let partial = Entity::new("Node", "a")
            .with("name", "A")
            .with("parent", shallow_parent);
        assert!(!spec.is_satisfied_by(&partial));

        let missing = Entity::new("Node", "a").with("name", "A");
        assert!(!spec.is_satisfied_by(&missing));

        let null_parent = Entity::new("Node", "a")
            .with("name", "A")
            .with("parent", Value::Null);
        assert!(spec.is_satisfied_by(&null_parent));
    }

    #[test]
    fn satisfied_by_checks_every_list_element() {
        let mut spec = FetchSpec::new("Project", "WithTasks");
        spec.add_nested("tasks", minimal());

        let tasks = EntityList::new(vec![
            Entity::new("Node", "t1").with("name", "one"),
            Entity::new("Node", "t2"),
        ]);
        let project = Entity::new("Project", "p").with("tasks", tasks.clone());
        assert!(!spec.is_satisfied_by(&project));

        tasks.get(1).unwrap().set("name", "two");
        assert!(spec.is_satisfied_by(&project));
    }

    #[test]
    fn covers_compares_nested_properties() {
        let mut wide = FetchSpec::new("Node", "Wide");
        wide.add_property("name").add_property("code").add_nested("parent", minimal());

        let mut narrow = FetchSpec::new("Node", "Narrow");
        narrow.add_property("name").add_property("parent");

        assert!(wide.covers(&narrow));
        assert!(!narrow.covers(&wide));
    }

    #[test]
    fn serializes_nested_specs() {
        let mut spec = FetchSpec::new("Node", "WithParent");
        spec.add_property("name").add_nested("parent", minimal());
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["properties"][0], serde_json::json!({"name": "name"}));
        assert_eq!(json["properties"][1]["spec"]["name"], "Minimal");

        let back: FetchSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }
}
