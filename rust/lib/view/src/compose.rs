//! Fetch-specification composer.
//!
//! Turns a contract into the fetch specification that loads exactly the
//! attributes its accessors need, recursing into nested contracts. Specs
//! are cached per effective contract on first use.

use std::sync::Arc;

use tracing::debug;

use crate::contract::{is_base_operation, OperationKind, ReturnKind};
use crate::error::ViewError;
use crate::fetch::FetchSpec;
use crate::registry::ContractRegistry;

impl ContractRegistry {
    /// Fetch specification for a contract, resolved through substitution.
    pub fn fetch_spec_for(&self, contract: &str) -> Result<Arc<FetchSpec>, ViewError> {
        self.compose(contract, &mut Vec::new())
    }

    /// Compose every registered contract. Used at boot to fail fast on a
    /// broken contract graph. Returns the number of contracts composed.
    pub fn precompose_all(&self) -> Result<usize, ViewError> {
        let mut count = 0;
        for info in self.contracts() {
            self.fetch_spec_for(info.id())?;
            count += 1;
        }
        Ok(count)
    }

    fn compose(&self, contract: &str, path: &mut Vec<String>) -> Result<Arc<FetchSpec>, ViewError> {
        let effective = self.effective_contract(contract)?;

        if path.iter().any(|name| name == effective.name()) {
            let mut cycle = path.clone();
            cycle.push(effective.name().to_string());
            return Err(ViewError::CyclicReference(cycle));
        }

        if let Some(spec) = effective.composed.get() {
            return Ok(spec.clone());
        }

        let mut spec = FetchSpec::new(effective.entity_type(), effective.name());
        path.push(effective.name().to_string());

        for op in self.operations(effective.id())? {
            if is_base_operation(&op.name) {
                continue;
            }
            if op.returns == ReturnKind::Void {
                continue;
            }
            // A contract-default computation is fetched only when a stored
            // attribute of the same name shadows it; dispatch reads it then.
            let field = match op.kind {
                OperationKind::Accessor => op.field_name()?,
                OperationKind::Default(_) => match op.field_name() {
                    Ok(field) if self.entity_has_attribute(effective.entity_type(), &field) => field,
                    _ => continue,
                },
                _ => continue,
            };
            match op.returns.nested_contract() {
                Some(nested) => {
                    let nested_spec = self.compose(nested, path)?;
                    spec.add_nested(field, nested_spec);
                }
                None => {
                    spec.add_property(field);
                }
            }
        }

        path.pop();

        debug!(
            "compose: '{}' → {} ({} properties)",
            effective.id(),
            effective.name(),
            spec.properties().len()
        );

        // Racing composers produce equal specs; the first stored one wins.
        Ok(effective.composed.get_or_init(|| Arc::new(spec)).clone())
    }
}

#[cfg(test)]
mod tests {
    use crate::contract::{ContractDef, EntityTypeDef, OperationDef, ReturnKind};
    use crate::error::ViewError;
    use crate::registry::{ContractRegistry, RegistryBuilder};
    use crate::view::Outcome;

    fn build(contracts: Vec<ContractDef>) -> Result<ContractRegistry, ViewError> {
        let mut b = RegistryBuilder::new();
        b.register_entity_types([
            EntityTypeDef::new("Node").attributes(["name", "code", "parent", "children"]),
            EntityTypeDef::new("SpecialNode").extends("Node").attributes(["flavor"]),
        ])?;
        b.register(contracts)?;
        b.build()
    }

    fn minimal() -> ContractDef {
        ContractDef::new("Minimal", "Node").fields(["name"])
    }

    #[test]
    fn nested_contract_becomes_nested_property() {
        let reg = build(vec![
            minimal(),
            ContractDef::new("WithParent", "Node")
                .fields(["name"])
                .op(OperationDef::nested("getParent", "Minimal")),
        ])
        .unwrap();

        let spec = reg.fetch_spec_for("WithParent").unwrap();
        assert_eq!(spec.entity_type, "Node");
        assert_eq!(spec.name, "WithParent");
        assert_eq!(spec.property_names(), vec!["name", "parent"]);
        let parent = spec.property("parent").unwrap().spec.as_ref().unwrap();
        assert_eq!(parent.name, "Minimal");
        assert_eq!(parent.property_names(), vec!["name"]);
    }

    #[test]
    fn composition_is_idempotent_and_cached() {
        let reg = build(vec![
            minimal(),
            ContractDef::new("WithChildren", "Node")
                .fields(["code"])
                .op(OperationDef::nested_list("getChildren", "Minimal")),
        ])
        .unwrap();

        let first = reg.fetch_spec_for("WithChildren").unwrap();
        let second = reg.fetch_spec_for("WithChildren").unwrap();
        assert_eq!(*first, *second);
        assert!(std::sync::Arc::ptr_eq(&first, &second));
        assert!(reg.info("WithChildren").unwrap().composed_spec().is_some());
        // Nested contract was cached along the way.
        assert!(reg.info("Minimal").unwrap().composed_spec().is_some());
    }

    #[test]
    fn direct_self_reference_is_cyclic() {
        let reg = build(vec![ContractDef::new("Tree", "Node")
            .fields(["name"])
            .op(OperationDef::nested("getParent", "Tree"))])
        .unwrap();

        match reg.fetch_spec_for("Tree").unwrap_err() {
            ViewError::CyclicReference(path) => assert_eq!(path, vec!["Tree", "Tree"]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(reg.info("Tree").unwrap().composed_spec().is_none());
    }

    #[test]
    fn transitive_self_reference_is_cyclic() {
        let reg = build(vec![
            ContractDef::new("A", "Node").op(OperationDef::nested("getParent", "B")),
            ContractDef::new("B", "Node").op(OperationDef::nested_list("getChildren", "C")),
            ContractDef::new("C", "Node").op(OperationDef::nested("getParent", "A")),
        ])
        .unwrap();

        let err = reg.fetch_spec_for("B").unwrap_err();
        assert_eq!(err.to_string(), "cyclic contract reference: B -> C -> A -> B");
    }

    #[test]
    fn same_nested_contract_twice_is_not_a_cycle() {
        let reg = build(vec![
            minimal(),
            ContractDef::new("Pair", "Node")
                .op(OperationDef::nested("getParent", "Minimal"))
                .op(OperationDef::nested_list("getChildren", "Minimal")),
        ])
        .unwrap();
        let spec = reg.fetch_spec_for("Pair").unwrap();
        assert_eq!(spec.property_names(), vec!["parent", "children"]);
    }

    #[test]
    fn composes_the_effective_contract() {
        let reg = build(vec![
            minimal(),
            ContractDef::new("Special", "SpecialNode")
                .extends("Minimal")
                .replaces("Minimal")
                .fields(["flavor"]),
        ])
        .unwrap();

        let spec = reg.fetch_spec_for("Minimal").unwrap();
        assert_eq!(spec.name, "Special");
        assert_eq!(spec.entity_type, "SpecialNode");
        assert_eq!(spec.property_names(), vec!["flavor", "name"]);
    }

    #[test]
    fn skips_mutators_defaults_and_base_operations() {
        let reg = build(vec![ContractDef::new("Editable", "Node")
            .fields(["name"])
            .op(OperationDef::setter("setName"))
            .op(OperationDef::getter("getOrigin"))
            .op(OperationDef::computed("getLabel", ReturnKind::Value, |_, _| {
                Ok(Outcome::Unit)
            }))])
        .unwrap();
        let spec = reg.fetch_spec_for("Editable").unwrap();
        assert_eq!(spec.property_names(), vec!["name"]);
    }

    #[test]
    fn computed_getter_over_stored_attribute_is_fetched() {
        let reg = build(vec![ContractDef::new("Coded", "Node")
            .fields(["name"])
            .op(OperationDef::computed("getCode", ReturnKind::Value, |_, _| {
                Ok(Outcome::Unit)
            }))
            .op(OperationDef::computed("getLabel", ReturnKind::Value, |_, _| {
                Ok(Outcome::Unit)
            }))])
        .unwrap();
        let spec = reg.fetch_spec_for("Coded").unwrap();
        assert_eq!(spec.property_names(), vec!["name", "code"]);
    }

    #[test]
    fn bad_accessor_name_fails_composition() {
        let reg = build(vec![ContractDef::new("Bad", "Node").op(OperationDef::getter("name"))])
            .unwrap();
        assert!(matches!(
            reg.fetch_spec_for("Bad"),
            Err(ViewError::NamingConvention(ref n)) if n == "name"
        ));
    }

    #[test]
    fn precompose_all_fails_fast_on_cycle() {
        let ok = build(vec![minimal()]).unwrap();
        assert_eq!(ok.precompose_all().unwrap(), 1);

        let broken = build(vec![
            minimal(),
            ContractDef::new("Loop", "Node").op(OperationDef::nested("getParent", "Loop")),
        ])
        .unwrap();
        assert!(matches!(
            broken.precompose_all(),
            Err(ViewError::CyclicReference(_))
        ));
    }

    #[test]
    fn concurrent_composition_yields_equal_specs() {
        let reg = std::sync::Arc::new(
            build(vec![
                minimal(),
                ContractDef::new("WithParent", "Node")
                    .fields(["name"])
                    .op(OperationDef::nested("getParent", "Minimal")),
            ])
            .unwrap(),
        );
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || reg.fetch_spec_for("WithParent").unwrap())
            })
            .collect();
        let specs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for spec in &specs {
            assert_eq!(**spec, *specs[0]);
        }
    }
}
