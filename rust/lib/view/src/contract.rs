//! Contract definitions: the declared shape of a projection.
//!
//! A contract is a named, typed view over one entity type. It declares
//! accessor operations; each operation is either backed by an entity
//! attribute (read or write) or computed by contract-supplied logic.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ViewError;
use crate::naming;
use crate::view::{Arg, Outcome, View};

/// Base operation: returns the raw entity behind a view.
pub const GET_ORIGIN: &str = "getOrigin";
/// Base operation: returns the effective contract id of a view.
pub const GET_EFFECTIVE_CONTRACT: &str = "getEffectiveContract";
/// Base operation: re-view the same data as another contract, reloading if needed.
pub const TRANSFORM: &str = "transform";

/// Names every contract answers without declaring them.
pub const BASE_OPERATIONS: [&str; 3] = [GET_ORIGIN, GET_EFFECTIVE_CONTRACT, TRANSFORM];

pub fn is_base_operation(name: &str) -> bool {
    BASE_OPERATIONS.contains(&name)
}

/// Contract-supplied computation, run with the view itself as receiver.
pub type DefaultFn = Arc<dyn Fn(&View, &[Arg]) -> Result<Outcome, ViewError> + Send + Sync>;

/// What an operation returns, as declared by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    Void,
    /// Plain value, returned unchanged.
    Value,
    /// Nested contract: a non-null reference is wrapped as this contract.
    Contract(String),
    /// Ordered collection whose elements are wrapped as this contract.
    ContractList(String),
}

impl ReturnKind {
    /// The nested contract id, if any.
    pub fn nested_contract(&self) -> Option<&str> {
        match self {
            ReturnKind::Contract(c) | ReturnKind::ContractList(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub enum OperationKind {
    Accessor,
    Mutator,
    Default(DefaultFn),
}

impl fmt::Debug for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Accessor => write!(f, "Accessor"),
            OperationKind::Mutator => write!(f, "Mutator"),
            OperationKind::Default(_) => write!(f, "Default(..)"),
        }
    }
}

/// One operation declared on a contract.
#[derive(Debug, Clone)]
pub struct OperationDef {
    pub name: String,
    pub kind: OperationKind,
    pub returns: ReturnKind,
}

impl OperationDef {
    /// Plain attribute accessor, e.g. `getName`.
    pub fn getter(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Accessor,
            returns: ReturnKind::Value,
        }
    }

    /// Attribute mutator, e.g. `setName`.
    pub fn setter(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Mutator,
            returns: ReturnKind::Void,
        }
    }

    /// Accessor returning a nested contract, e.g. `getParent: Minimal`.
    pub fn nested(name: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Accessor,
            returns: ReturnKind::Contract(contract.into()),
        }
    }

    /// Accessor returning an ordered collection of a nested contract.
    pub fn nested_list(name: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Accessor,
            returns: ReturnKind::ContractList(contract.into()),
        }
    }

    /// Contract-default computation not backed by stored data.
    pub fn computed<F>(name: impl Into<String>, returns: ReturnKind, compute: F) -> Self
    where
        F: Fn(&View, &[Arg]) -> Result<Outcome, ViewError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: OperationKind::Default(Arc::new(compute)),
            returns,
        }
    }

    /// Field name derived from the accessor name.
    pub fn field_name(&self) -> Result<String, ViewError> {
        naming::field_name(&self.name)
    }

    pub fn is_default(&self) -> bool {
        matches!(self.kind, OperationKind::Default(_))
    }
}

/// An entity type known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeDef {
    pub name: String,

    /// Supertype, if any. Attributes are inherited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Attribute names declared on this type (not including inherited ones).
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl EntityTypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            attributes: vec![],
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(names.into_iter().map(Into::into));
        self
    }
}

/// A declared projection contract.
#[derive(Debug, Clone)]
pub struct ContractDef {
    /// Contract identity, unique within a registry.
    pub id: String,

    /// Entity type this contract views.
    pub entity_type: String,

    /// Declared view name. Defaults to the id.
    pub name: String,

    /// Parent contracts. Their operations are inherited, and a view of this
    /// contract satisfies them without reloading.
    pub extends: Vec<String>,

    /// Contract this one substitutes everywhere it is requested.
    pub replaces: Option<String>,

    pub operations: Vec<OperationDef>,
}

impl ContractDef {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            entity_type: entity_type.into(),
            extends: vec![],
            replaces: None,
            operations: vec![],
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends.push(parent.into());
        self
    }

    pub fn replaces(mut self, target: impl Into<String>) -> Self {
        self.replaces = Some(target.into());
        self
    }

    pub fn op(mut self, op: OperationDef) -> Self {
        self.operations.push(op);
        self
    }

    /// Shorthand for a plain getter per field name: `name` → `getName`.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for field in fields {
            self.operations
                .push(OperationDef::getter(accessor_name("get", field.as_ref())));
        }
        self
    }

    /// Operation declared directly on this contract.
    pub fn operation(&self, name: &str) -> Option<&OperationDef> {
        self.operations.iter().find(|op| op.name == name)
    }
}

/// Build a camelCase accessor name: `("get", "name")` → `getName`.
pub fn accessor_name(prefix: &str, field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", prefix, first.to_uppercase(), chars.as_str()),
        None => prefix.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_name_to_id() {
        let c = ContractDef::new("UserMinimal", "User");
        assert_eq!(c.name, "UserMinimal");
        assert_eq!(c.named("user-minimal").name, "user-minimal");
    }

    #[test]
    fn fields_shorthand_builds_getters() {
        let c = ContractDef::new("UserMinimal", "User").fields(["name", "email"]);
        let names: Vec<&str> = c.operations.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["getName", "getEmail"]);
        assert_eq!(c.operation("getEmail").unwrap().field_name().unwrap(), "email");
    }

    #[test]
    fn nested_return_kinds() {
        assert_eq!(
            OperationDef::nested("getParent", "Minimal").returns.nested_contract(),
            Some("Minimal")
        );
        assert_eq!(
            OperationDef::nested_list("getTasks", "TaskRow").returns,
            ReturnKind::ContractList("TaskRow".into())
        );
        assert_eq!(OperationDef::getter("getName").returns.nested_contract(), None);
        assert_eq!(OperationDef::setter("setName").returns, ReturnKind::Void);
    }

    #[test]
    fn base_operations() {
        assert!(is_base_operation("getOrigin"));
        assert!(is_base_operation("transform"));
        assert!(!is_base_operation("getName"));
    }

    #[test]
    fn accessor_name_capitalizes() {
        assert_eq!(accessor_name("get", "name"), "getName");
        assert_eq!(accessor_name("set", "parent"), "setParent");
        assert_eq!(accessor_name("get", ""), "get");
    }

    #[test]
    fn entity_type_def_serde() {
        let def = EntityTypeDef::new("Manager")
            .extends("User")
            .attributes(["reports"]);
        let json = serde_json::to_string(&def).unwrap();
        let back: EntityTypeDef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
    }
}
