//! Contract registry and substitution resolver.
//!
//! Contracts and entity types are collected on a [`RegistryBuilder`]
//! (append-only, duplicates rejected). [`RegistryBuilder::build`] validates
//! the contract graph and links every replaced contract to its replacement,
//! producing an immutable [`ContractRegistry`]. Because `build` is the only
//! way to obtain a registry, substitution links always exist before any
//! composition runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::contract::{ContractDef, EntityTypeDef, OperationDef};
use crate::dispatch::DispatchTable;
use crate::error::ViewError;
use crate::fetch::FetchSpec;

/// Registry record for one contract.
#[derive(Debug)]
pub struct ContractInfo {
    def: ContractDef,
    replaced_by: Option<String>,
    pub(crate) composed: OnceLock<Arc<FetchSpec>>,
    pub(crate) dispatch: OnceLock<Arc<DispatchTable>>,
}

impl ContractInfo {
    fn new(def: ContractDef) -> Self {
        Self {
            def,
            replaced_by: None,
            composed: OnceLock::new(),
            dispatch: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn entity_type(&self) -> &str {
        &self.def.entity_type
    }

    pub fn replaces_contract(&self) -> Option<&str> {
        self.def.replaces.as_deref()
    }

    /// The contract that directly replaces this one, if any.
    pub fn replaced_by(&self) -> Option<&str> {
        self.replaced_by.as_deref()
    }

    pub fn def(&self) -> &ContractDef {
        &self.def
    }

    /// Cached fetch specification, if already composed.
    pub fn composed_spec(&self) -> Option<&Arc<FetchSpec>> {
        self.composed.get()
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Collects definitions at startup.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entity_types: BTreeMap<String, EntityTypeDef>,
    contracts: BTreeMap<String, ContractDef>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge entity type definitions. Any duplicate name fails the whole batch.
    pub fn register_entity_types(
        &mut self,
        definitions: impl IntoIterator<Item = EntityTypeDef>,
    ) -> Result<&mut Self, ViewError> {
        let batch: Vec<EntityTypeDef> = definitions.into_iter().collect();
        let mut seen = BTreeSet::new();
        for def in &batch {
            if self.entity_types.contains_key(&def.name) || !seen.insert(def.name.as_str()) {
                return Err(ViewError::Registration(format!(
                    "entity type '{}' is already registered",
                    def.name
                )));
            }
        }
        for def in batch {
            self.entity_types.insert(def.name.clone(), def);
        }
        Ok(self)
    }

    /// Merge contract definitions. Any duplicate id fails the whole batch.
    pub fn register(
        &mut self,
        definitions: impl IntoIterator<Item = ContractDef>,
    ) -> Result<&mut Self, ViewError> {
        let batch: Vec<ContractDef> = definitions.into_iter().collect();
        let mut seen = BTreeSet::new();
        for def in &batch {
            if self.contracts.contains_key(&def.id) || !seen.insert(def.id.as_str()) {
                return Err(ViewError::Registration(format!(
                    "contract '{}' is already registered",
                    def.id
                )));
            }
        }
        for def in batch {
            self.contracts.insert(def.id.clone(), def);
        }
        Ok(self)
    }

    pub fn contract_count(&self) -> usize {
        self.contracts.len()
    }

    /// Validate the contract graph and resolve substitution links.
    pub fn build(self) -> Result<ContractRegistry, ViewError> {
        let registry_types = self.entity_types;
        validate_entity_types(&registry_types)?;

        for def in self.contracts.values() {
            if !registry_types.contains_key(&def.entity_type) {
                return Err(ViewError::Initialization(format!(
                    "contract '{}' views unknown entity type '{}'",
                    def.id, def.entity_type
                )));
            }
            for parent in &def.extends {
                if !self.contracts.contains_key(parent) {
                    return Err(ViewError::Initialization(format!(
                        "contract '{}' extends unknown contract '{}'",
                        def.id, parent
                    )));
                }
            }
        }
        validate_extends(&self.contracts)?;

        let mut contracts: BTreeMap<String, ContractInfo> = self
            .contracts
            .into_iter()
            .map(|(id, def)| (id, ContractInfo::new(def)))
            .collect();

        // Every (replacing, target) pair is checked independently; only the
        // direct link is recorded.
        let links: Vec<(String, String)> = contracts
            .values()
            .filter_map(|info| {
                info.replaces_contract()
                    .map(|target| (info.id().to_string(), target.to_string()))
            })
            .collect();

        for (replacing, target) in links {
            let replacing_type = contracts[&replacing].entity_type().to_string();
            let Some(target_info) = contracts.get_mut(&target) else {
                return Err(ViewError::Initialization(format!(
                    "contract '{}' replaces unknown contract '{}'",
                    replacing, target
                )));
            };
            if !is_subtype(&registry_types, &replacing_type, target_info.entity_type()) {
                return Err(ViewError::Initialization(format!(
                    "contract '{}' (entity '{}') cannot replace '{}' (entity '{}'): \
                     replacement must view the same entity type or a subtype",
                    replacing,
                    replacing_type,
                    target,
                    target_info.entity_type()
                )));
            }
            if let Some(existing) = &target_info.replaced_by {
                return Err(ViewError::Initialization(format!(
                    "contract '{}' is replaced by both '{}' and '{}'",
                    target, existing, replacing
                )));
            }
            debug!("registry: '{}' replaces '{}'", replacing, target);
            target_info.replaced_by = Some(replacing);
        }

        validate_substitution_chains(&contracts)?;

        Ok(ContractRegistry {
            entity_types: registry_types,
            contracts,
        })
    }
}

fn validate_entity_types(types: &BTreeMap<String, EntityTypeDef>) -> Result<(), ViewError> {
    for def in types.values() {
        let mut seen = BTreeSet::new();
        let mut current = Some(def);
        while let Some(t) = current {
            if !seen.insert(t.name.as_str()) {
                return Err(ViewError::Initialization(format!(
                    "entity type '{}' has a cyclic supertype chain",
                    def.name
                )));
            }
            current = match &t.parent {
                Some(parent) => Some(types.get(parent).ok_or_else(|| {
                    ViewError::Initialization(format!(
                        "entity type '{}' extends unknown type '{}'",
                        t.name, parent
                    ))
                })?),
                None => None,
            };
        }
    }
    Ok(())
}

fn validate_extends(contracts: &BTreeMap<String, ContractDef>) -> Result<(), ViewError> {
    fn visit<'a>(
        id: &'a str,
        contracts: &'a BTreeMap<String, ContractDef>,
        path: &mut Vec<&'a str>,
        done: &mut BTreeSet<&'a str>,
    ) -> Result<(), ViewError> {
        if done.contains(id) {
            return Ok(());
        }
        if path.contains(&id) {
            let mut cycle: Vec<String> = path.iter().map(|s| s.to_string()).collect();
            cycle.push(id.to_string());
            return Err(ViewError::Initialization(format!(
                "contract inheritance cycle: {}",
                cycle.join(" -> ")
            )));
        }
        path.push(id);
        if let Some(def) = contracts.get(id) {
            for parent in &def.extends {
                visit(parent, contracts, path, done)?;
            }
        }
        path.pop();
        done.insert(id);
        Ok(())
    }

    let mut done = BTreeSet::new();
    for id in contracts.keys() {
        visit(id, contracts, &mut Vec::new(), &mut done)?;
    }
    Ok(())
}

fn validate_substitution_chains(contracts: &BTreeMap<String, ContractInfo>) -> Result<(), ViewError> {
    for info in contracts.values() {
        let mut seen = BTreeSet::new();
        let mut current = Some(info);
        while let Some(c) = current {
            if !seen.insert(c.id()) {
                return Err(ViewError::Initialization(format!(
                    "contract '{}' has a cyclic substitution chain",
                    info.id()
                )));
            }
            current = c.replaced_by().and_then(|next| contracts.get(next));
        }
    }
    Ok(())
}

fn is_subtype(types: &BTreeMap<String, EntityTypeDef>, sub: &str, sup: &str) -> bool {
    let mut current = Some(sub);
    while let Some(name) = current {
        if name == sup {
            return true;
        }
        current = types.get(name).and_then(|t| t.parent.as_deref());
    }
    false
}

// ── Registry ────────────────────────────────────────────────────────

/// Immutable registry of contracts and entity types.
///
/// Built once at process start and shared by reference with every
/// component that needs contract or fetch-specification lookups.
#[derive(Debug)]
pub struct ContractRegistry {
    entity_types: BTreeMap<String, EntityTypeDef>,
    contracts: BTreeMap<String, ContractInfo>,
}

impl ContractRegistry {
    pub fn info(&self, contract: &str) -> Result<&ContractInfo, ViewError> {
        self.contracts
            .get(contract)
            .ok_or_else(|| ViewError::UnknownContract(contract.to_string()))
    }

    pub fn contains(&self, contract: &str) -> bool {
        self.contracts.contains_key(contract)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &ContractInfo> {
        self.contracts.values()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityTypeDef> {
        self.entity_types.get(name)
    }

    /// Follow `replaced_by` links to the terminal contract.
    pub fn effective_contract(&self, contract: &str) -> Result<&ContractInfo, ViewError> {
        let mut info = self.info(contract)?;
        while let Some(next) = info.replaced_by() {
            info = self.info(next)?;
        }
        Ok(info)
    }

    /// `sup.isAssignableFrom(sub)` over entity types.
    pub fn is_entity_subtype(&self, sub: &str, sup: &str) -> bool {
        is_subtype(&self.entity_types, sub, sup)
    }

    /// True if a view of `from` already satisfies `to`: same contract or
    /// `to` is an ancestor through `extends`.
    pub fn is_contract_assignable(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(info) = self.contracts.get(id) {
                for parent in &info.def.extends {
                    if parent == to {
                        return true;
                    }
                    stack.push(parent);
                }
            }
        }
        false
    }

    /// Own operations first, then inherited ones (depth-first through
    /// `extends`). The first definition of a name wins.
    pub fn operations<'a>(&'a self, contract: &'a str) -> Result<Vec<&'a OperationDef>, ViewError> {
        let mut result: Vec<&'a OperationDef> = Vec::new();
        let mut names = BTreeSet::new();
        let mut visited = BTreeSet::new();
        self.collect_operations(contract, &mut result, &mut names, &mut visited)?;
        Ok(result)
    }

    fn collect_operations<'a>(
        &'a self,
        contract: &'a str,
        result: &mut Vec<&'a OperationDef>,
        names: &mut BTreeSet<&'a str>,
        visited: &mut BTreeSet<&'a str>,
    ) -> Result<(), ViewError> {
        if !visited.insert(contract) {
            return Ok(());
        }
        let info = self.info(contract)?;
        for op in &info.def.operations {
            if names.insert(op.name.as_str()) {
                result.push(op);
            }
        }
        for parent in &info.def.extends {
            self.collect_operations(parent, result, names, visited)?;
        }
        Ok(())
    }

    /// True if the entity type (or one of its supertypes) declares the attribute.
    pub fn entity_has_attribute(&self, entity_type: &str, attribute: &str) -> bool {
        let mut current = self.entity_types.get(entity_type);
        while let Some(t) = current {
            if t.attributes.iter().any(|a| a == attribute) {
                return true;
            }
            current = t.parent.as_deref().and_then(|p| self.entity_types.get(p));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types() -> Vec<EntityTypeDef> {
        vec![
            EntityTypeDef::new("User").attributes(["name", "email", "manager"]),
            EntityTypeDef::new("Manager").extends("User").attributes(["reports"]),
            EntityTypeDef::new("Task").attributes(["title"]),
        ]
    }

    fn builder() -> RegistryBuilder {
        let mut b = RegistryBuilder::new();
        b.register_entity_types(types()).unwrap();
        b
    }

    #[test]
    fn duplicate_contract_fails_registration() {
        let mut b = builder();
        b.register([ContractDef::new("Base", "User")]).unwrap();
        let err = b
            .register([ContractDef::new("Other", "User"), ContractDef::new("Base", "User")])
            .unwrap_err();
        assert!(matches!(err, ViewError::Registration(_)));
        // Failed batch registers nothing.
        assert_eq!(b.contract_count(), 1);
    }

    #[test]
    fn duplicate_within_batch_fails() {
        let mut b = builder();
        let err = b
            .register([ContractDef::new("A", "User"), ContractDef::new("A", "User")])
            .unwrap_err();
        assert!(matches!(err, ViewError::Registration(_)));
        assert_eq!(b.contract_count(), 0);
    }

    #[test]
    fn duplicate_entity_type_fails() {
        let mut b = builder();
        let err = b
            .register_entity_types([EntityTypeDef::new("User")])
            .unwrap_err();
        assert_eq!(err.error_code(), "REGISTRATION");
    }

    #[test]
    fn effective_contract_follows_chain() {
        let mut b = builder();
        b.register([
            ContractDef::new("Base", "User").fields(["name"]),
            ContractDef::new("Sub", "User").extends("Base").replaces("Base"),
            ContractDef::new("SubSub", "Manager").extends("Sub").replaces("Sub"),
        ])
        .unwrap();
        let reg = b.build().unwrap();

        assert_eq!(reg.info("Base").unwrap().replaced_by(), Some("Sub"));
        assert_eq!(reg.info("Sub").unwrap().replaced_by(), Some("SubSub"));
        assert_eq!(reg.effective_contract("Base").unwrap().id(), "SubSub");
        assert_eq!(reg.effective_contract("SubSub").unwrap().id(), "SubSub");
    }

    #[test]
    fn replacement_must_view_same_or_narrower_entity() {
        let mut b = builder();
        b.register([
            ContractDef::new("ManagerView", "Manager"),
            ContractDef::new("UserView", "User").replaces("ManagerView"),
        ])
        .unwrap();
        let err = b.build().unwrap_err();
        match err {
            ViewError::Initialization(msg) => {
                assert!(msg.contains("UserView"));
                assert!(msg.contains("ManagerView"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn replacement_of_unrelated_entity_fails() {
        let mut b = builder();
        b.register([
            ContractDef::new("UserView", "User"),
            ContractDef::new("TaskView", "Task").replaces("UserView"),
        ])
        .unwrap();
        assert!(matches!(b.build(), Err(ViewError::Initialization(_))));
    }

    #[test]
    fn replacing_unknown_contract_fails() {
        let mut b = builder();
        b.register([ContractDef::new("UserView", "User").replaces("Missing")])
            .unwrap();
        assert!(matches!(b.build(), Err(ViewError::Initialization(_))));
    }

    #[test]
    fn double_replacement_fails() {
        let mut b = builder();
        b.register([
            ContractDef::new("Base", "User"),
            ContractDef::new("A", "User").replaces("Base"),
            ContractDef::new("B", "User").replaces("Base"),
        ])
        .unwrap();
        assert!(matches!(b.build(), Err(ViewError::Initialization(_))));
    }

    #[test]
    fn substitution_loop_fails() {
        let mut b = builder();
        b.register([
            ContractDef::new("A", "User").replaces("B"),
            ContractDef::new("B", "User").replaces("A"),
        ])
        .unwrap();
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("cyclic substitution"));
    }

    #[test]
    fn extends_cycle_fails() {
        let mut b = builder();
        b.register([
            ContractDef::new("A", "User").extends("B"),
            ContractDef::new("B", "User").extends("A"),
        ])
        .unwrap();
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("inheritance cycle"));
    }

    #[test]
    fn unknown_entity_type_fails() {
        let mut b = builder();
        b.register([ContractDef::new("A", "Ghost")]).unwrap();
        assert!(matches!(b.build(), Err(ViewError::Initialization(_))));
    }

    #[test]
    fn entity_subtypes_and_inherited_attributes() {
        let reg = builder().build().unwrap();
        assert!(reg.is_entity_subtype("Manager", "User"));
        assert!(reg.is_entity_subtype("User", "User"));
        assert!(!reg.is_entity_subtype("User", "Manager"));
        assert!(reg.entity_has_attribute("Manager", "name"));
        assert!(reg.entity_has_attribute("Manager", "reports"));
        assert!(!reg.entity_has_attribute("User", "reports"));
    }

    #[test]
    fn operations_are_inherited_own_first() {
        let mut b = builder();
        b.register([
            ContractDef::new("Base", "User").fields(["name", "email"]),
            ContractDef::new("Sub", "User")
                .extends("Base")
                .op(OperationDef::nested("getEmail", "Base"))
                .fields(["manager"]),
        ])
        .unwrap();
        let reg = b.build().unwrap();
        let ops = reg.operations("Sub").unwrap();
        let names: Vec<&str> = ops.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["getEmail", "getManager", "getName"]);
        // Own definition shadows the inherited one.
        assert!(ops[0].returns.nested_contract().is_some());
    }

    #[test]
    fn operations_for_runtime_contract_id() {
        let mut b = builder();
        b.register([ContractDef::new("Base", "User").fields(["name"])])
            .unwrap();
        let reg = b.build().unwrap();
        let id = format!("Ba{}", "se");
        let ops = reg.operations(&id).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].field_name().unwrap(), "name");
        assert!(matches!(
            reg.operations(&format!("{}X", id)),
            Err(ViewError::UnknownContract(_))
        ));
    }

    #[test]
    fn contract_assignability() {
        let mut b = builder();
        b.register([
            ContractDef::new("Root", "User"),
            ContractDef::new("Mid", "User").extends("Root"),
            ContractDef::new("Leaf", "User").extends("Mid"),
            ContractDef::new("Other", "User"),
        ])
        .unwrap();
        let reg = b.build().unwrap();
        assert!(reg.is_contract_assignable("Leaf", "Root"));
        assert!(reg.is_contract_assignable("Leaf", "Leaf"));
        assert!(!reg.is_contract_assignable("Root", "Leaf"));
        assert!(!reg.is_contract_assignable("Leaf", "Other"));
    }

    #[test]
    fn unknown_contract_lookup() {
        let reg = builder().build().unwrap();
        assert!(matches!(reg.info("Nope"), Err(ViewError::UnknownContract(_))));
        assert!(reg.is_empty());
    }
}
