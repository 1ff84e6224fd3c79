//! Per-contract dispatch tables.
//!
//! Built once per effective contract and cached on its registry record.
//! Each operation name maps to the handler that serves it, so a view call
//! is a single map lookup instead of a per-call resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::contract::{
    DefaultFn, OperationKind, ReturnKind, BASE_OPERATIONS, GET_EFFECTIVE_CONTRACT, GET_ORIGIN,
    TRANSFORM,
};
use crate::error::ViewError;
use crate::naming;
use crate::registry::ContractRegistry;

#[derive(Clone)]
pub(crate) enum Handler {
    Origin,
    EffectiveContract,
    Transform,
    /// Read an entity attribute, then wrap according to `returns`.
    Read { field: String, returns: ReturnKind },
    /// Write an entity attribute; view arguments are unwrapped to their origin.
    Write { field: String },
    /// Contract-default logic, run with the view as receiver.
    Computed { compute: DefaultFn, returns: ReturnKind },
    /// Declared by the contract but served by nothing.
    Unsupported,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Origin => write!(f, "Origin"),
            Handler::EffectiveContract => write!(f, "EffectiveContract"),
            Handler::Transform => write!(f, "Transform"),
            Handler::Read { field, returns } => write!(f, "Read({field}, {returns:?})"),
            Handler::Write { field } => write!(f, "Write({field})"),
            Handler::Computed { returns, .. } => write!(f, "Computed({returns:?})"),
            Handler::Unsupported => write!(f, "Unsupported"),
        }
    }
}

/// Operation → handler map for one contract.
#[derive(Debug)]
pub struct DispatchTable {
    contract: String,
    handlers: HashMap<String, Handler>,
    getters: HashMap<String, String>,
    setters: HashMap<String, String>,
}

impl DispatchTable {
    fn build(registry: &ContractRegistry, contract: &str) -> Result<Self, ViewError> {
        let info = registry.info(contract)?;
        let entity_type = info.entity_type();

        let mut handlers = HashMap::new();
        handlers.insert(GET_ORIGIN.to_string(), Handler::Origin);
        handlers.insert(GET_EFFECTIVE_CONTRACT.to_string(), Handler::EffectiveContract);
        handlers.insert(TRANSFORM.to_string(), Handler::Transform);

        let mut getters = HashMap::new();
        let mut setters = HashMap::new();

        for op in registry.operations(contract)? {
            if BASE_OPERATIONS.contains(&op.name.as_str()) {
                continue;
            }
            let backed_field = naming::field_name(&op.name)
                .ok()
                .filter(|field| registry.entity_has_attribute(entity_type, field));

            let handler = match (&op.kind, backed_field) {
                (OperationKind::Mutator, Some(field)) => {
                    setters.insert(field.clone(), op.name.clone());
                    Handler::Write { field }
                }
                (OperationKind::Mutator, None) => {
                    op.field_name()?;
                    Handler::Unsupported
                }
                (OperationKind::Accessor, Some(field)) | (OperationKind::Default(_), Some(field))
                    if op.returns != ReturnKind::Void =>
                {
                    getters.insert(field.clone(), op.name.clone());
                    Handler::Read {
                        field,
                        returns: op.returns.clone(),
                    }
                }
                (OperationKind::Default(compute), _) => {
                    if let Ok(field) = op.field_name() {
                        getters.entry(field).or_insert_with(|| op.name.clone());
                    }
                    Handler::Computed {
                        compute: compute.clone(),
                        returns: op.returns.clone(),
                    }
                }
                (OperationKind::Accessor, _) => {
                    op.field_name()?;
                    Handler::Unsupported
                }
            };
            handlers.insert(op.name.clone(), handler);
        }

        debug!(
            "dispatch: built table for '{}' ({} operations)",
            contract,
            handlers.len()
        );

        Ok(Self {
            contract: contract.to_string(),
            handlers,
            getters,
            setters,
        })
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub(crate) fn handler(&self, operation: &str) -> Option<&Handler> {
        self.handlers.get(operation)
    }

    /// True if the operation resolves to something other than "unsupported".
    pub fn supports(&self, operation: &str) -> bool {
        matches!(self.handlers.get(operation), Some(h) if !matches!(h, Handler::Unsupported))
    }

    /// Accessor operation serving a field, if the contract exposes it.
    pub fn getter_for(&self, field: &str) -> Option<&str> {
        self.getters.get(field).map(String::as_str)
    }

    /// Mutator operation writing a field, if the contract exposes it.
    pub fn setter_for(&self, field: &str) -> Option<&str> {
        self.setters.get(field).map(String::as_str)
    }

    /// All operation names, sorted.
    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ContractRegistry {
    /// Cached dispatch table for the contract as declared (not resolved).
    pub fn dispatch_table(&self, contract: &str) -> Result<Arc<DispatchTable>, ViewError> {
        let info = self.info(contract)?;
        if let Some(table) = info.dispatch.get() {
            return Ok(table.clone());
        }
        let table = DispatchTable::build(self, contract)?;
        Ok(info.dispatch.get_or_init(|| Arc::new(table)).clone())
    }
}
