//! Views: runtime objects that satisfy a contract over one raw entity.
//!
//! A [`View`] binds one raw entity to one effective contract and serves
//! every contract operation through the contract's dispatch table:
//!
//! 1. base operations (`getOrigin`, `getEffectiveContract`, `transform`)
//! 2. mutators, with view arguments unwrapped to their origin entity
//! 3. attribute-backed accessors and mutators, results re-wrapped when the
//!    declared return is a nested contract or a collection of one
//! 4. contract-default computations, run with the view as receiver
//! 5. anything else fails with `UnsupportedOperation`
//!
//! Views are cheap to clone; clones are the same view (`ptr_eq`). They are
//! meant for one request context and are not `Send`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::collection::CollectionView;
use crate::contract::ReturnKind;
use crate::dispatch::{DispatchTable, Handler};
use crate::engine::ViewEngine;
use crate::error::ViewError;
use crate::fetch::FetchSpec;
use crate::value::{Entity, Value};

/// Argument passed to a view operation.
#[derive(Clone, Debug)]
pub enum Arg {
    Value(Value),
    View(View),
    Views(CollectionView),
    /// Contract id, for `transform`.
    Contract(String),
}

impl Arg {
    pub fn contract(id: impl Into<String>) -> Self {
        Arg::Contract(id.into())
    }

    /// The value to store on a raw entity. Views are unwrapped to their origin.
    fn into_stored(self, operation: &str) -> Result<Value, ViewError> {
        match self {
            Arg::Value(v) => Ok(v),
            Arg::View(v) => Ok(Value::Ref(v.origin())),
            Arg::Views(cv) => Ok(Value::List(cv.to_entity_list())),
            Arg::Contract(_) => Err(ViewError::InvalidArgument {
                operation: operation.to_string(),
                reason: "a contract id cannot be stored".into(),
            }),
        }
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Value(v)
    }
}

impl From<View> for Arg {
    fn from(v: View) -> Self {
        Arg::View(v)
    }
}

impl From<CollectionView> for Arg {
    fn from(cv: CollectionView) -> Self {
        Arg::Views(cv)
    }
}

impl From<Entity> for Arg {
    fn from(e: Entity) -> Self {
        Arg::Value(Value::Ref(e))
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Value(Value::from(s))
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Value(Value::Text(s))
    }
}

impl From<i64> for Arg {
    fn from(i: i64) -> Self {
        Arg::Value(Value::Int(i))
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Value(Value::Bool(b))
    }
}

/// Result of a view operation.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// Mutators return nothing.
    Unit,
    Value(Value),
    View(View),
    Views(CollectionView),
    /// Raw entity, from `getOrigin`.
    Entity(Entity),
    /// Contract id, from `getEffectiveContract`.
    Contract(String),
}

impl Outcome {
    /// Flatten to a raw value: views become references to their origin.
    pub fn into_value(self) -> Value {
        match self {
            Outcome::Unit => Value::Null,
            Outcome::Value(v) => v,
            Outcome::View(v) => Value::Ref(v.origin()),
            Outcome::Views(cv) => Value::List(cv.to_entity_list()),
            Outcome::Entity(e) => Value::Ref(e),
            Outcome::Contract(c) => Value::Text(c),
        }
    }

    pub fn as_view(&self) -> Option<&View> {
        match self {
            Outcome::View(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Outcome::Unit | Outcome::Value(Value::Null))
    }
}

impl From<Value> for Outcome {
    fn from(v: Value) -> Self {
        Outcome::Value(v)
    }
}

impl From<View> for Outcome {
    fn from(v: View) -> Self {
        Outcome::View(v)
    }
}

struct ViewState {
    engine: Arc<ViewEngine>,
    table: Arc<DispatchTable>,
    spec: Arc<FetchSpec>,
    raw: RefCell<Entity>,
    needs_reload: Cell<bool>,
}

/// A raw entity seen through its effective contract.
#[derive(Clone)]
pub struct View {
    state: Rc<ViewState>,
}

impl View {
    pub(crate) fn new(
        engine: Arc<ViewEngine>,
        table: Arc<DispatchTable>,
        spec: Arc<FetchSpec>,
        raw: Entity,
        needs_reload: bool,
    ) -> Self {
        Self {
            state: Rc::new(ViewState {
                engine,
                table,
                spec,
                raw: RefCell::new(raw),
                needs_reload: Cell::new(needs_reload),
            }),
        }
    }

    /// The raw entity behind this view.
    pub fn origin(&self) -> Entity {
        self.state.raw.borrow().clone()
    }

    pub fn effective_contract(&self) -> &str {
        self.state.table.contract()
    }

    /// Fetch specification of the effective contract.
    pub fn spec(&self) -> &Arc<FetchSpec> {
        &self.state.spec
    }

    /// True until the first data-touching call reloads a raw entity that
    /// did not satisfy the contract's fetch specification.
    pub fn needs_reload(&self) -> bool {
        self.state.needs_reload.get()
    }

    pub fn engine(&self) -> &Arc<ViewEngine> {
        &self.state.engine
    }

    /// Identity comparison: true if both handles are the same view.
    pub fn ptr_eq(&self, other: &View) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub fn supports(&self, operation: &str) -> bool {
        self.state.table.supports(operation)
    }

    /// Invoke a contract operation by name.
    pub fn call(&self, operation: &str, args: &[Arg]) -> Result<Outcome, ViewError> {
        let Some(handler) = self.state.table.handler(operation) else {
            return Err(self.unsupported(operation));
        };
        match handler {
            Handler::Origin => Ok(Outcome::Entity(self.origin())),
            Handler::EffectiveContract => {
                Ok(Outcome::Contract(self.effective_contract().to_string()))
            }
            Handler::Transform => match args {
                [Arg::Contract(target)] => Ok(Outcome::View(self.transform(target)?)),
                [Arg::Value(Value::Text(target))] => Ok(Outcome::View(self.transform(target)?)),
                _ => Err(ViewError::InvalidArgument {
                    operation: operation.to_string(),
                    reason: "expected a single target contract".into(),
                }),
            },
            Handler::Read { field, returns } => {
                self.ensure_loaded()?;
                let raw = self.origin();
                let value = raw.get(field).ok_or_else(|| ViewError::NotLoaded {
                    entity: raw.to_string(),
                    attribute: field.clone(),
                })?;
                self.wrap_result(Outcome::Value(value), returns)
            }
            Handler::Write { field } => {
                let value = match args {
                    [arg] => arg.clone().into_stored(operation)?,
                    _ => {
                        return Err(ViewError::InvalidArgument {
                            operation: operation.to_string(),
                            reason: format!("expected 1 argument, got {}", args.len()),
                        })
                    }
                };
                self.ensure_loaded()?;
                self.origin().set(field, value);
                Ok(Outcome::Unit)
            }
            Handler::Computed { compute, returns } => {
                let outcome = compute(self, args)?;
                self.wrap_result(outcome, returns)
            }
            Handler::Unsupported => Err(self.unsupported(operation)),
        }
    }

    /// Read a field through the contract's accessor for it.
    pub fn get(&self, field: &str) -> Result<Outcome, ViewError> {
        let operation = self
            .state
            .table
            .getter_for(field)
            .ok_or_else(|| self.unsupported(field))?;
        self.call(operation, &[])
    }

    /// Read a field and flatten the result to a raw value.
    pub fn value(&self, field: &str) -> Result<Value, ViewError> {
        Ok(self.get(field)?.into_value())
    }

    /// Read a nested-contract field. `None` for a null reference.
    pub fn view(&self, field: &str) -> Result<Option<View>, ViewError> {
        match self.get(field)? {
            Outcome::View(v) => Ok(Some(v)),
            outcome if outcome.is_null() => Ok(None),
            _ => Err(ViewError::UnexpectedOutcome {
                operation: field.to_string(),
                expected: "a view",
            }),
        }
    }

    /// Read a one-to-many field as a collection view.
    pub fn views(&self, field: &str) -> Result<CollectionView, ViewError> {
        match self.get(field)? {
            Outcome::Views(cv) => Ok(cv),
            _ => Err(ViewError::UnexpectedOutcome {
                operation: field.to_string(),
                expected: "a collection view",
            }),
        }
    }

    /// Write a field through the contract's mutator for it.
    pub fn set(&self, field: &str, value: impl Into<Arg>) -> Result<(), ViewError> {
        let operation = self
            .state
            .table
            .setter_for(field)
            .ok_or_else(|| self.unsupported(field))?;
        self.call(operation, &[value.into()])?;
        Ok(())
    }

    /// Re-view the same data as `target`.
    ///
    /// `target` is resolved through substitution first. If this view's
    /// contract already satisfies it the same view is returned and nothing
    /// is reloaded. Otherwise the raw entity is reloaded with the target's
    /// fetch specification when it does not already satisfy it, and the
    /// result is wrapped as `target`.
    pub fn transform(&self, target: &str) -> Result<View, ViewError> {
        let engine = &self.state.engine;
        let registry = engine.registry();
        let effective = registry.effective_contract(target)?;

        let current = self.effective_contract();
        if registry.is_contract_assignable(current, target)
            || registry.is_contract_assignable(current, effective.id())
        {
            return Ok(self.clone());
        }

        let raw = self.origin();
        if !registry.is_entity_subtype(raw.entity_type(), effective.entity_type()) {
            return Err(ViewError::EntityMismatch {
                entity_type: raw.entity_type().to_string(),
                contract: effective.id().to_string(),
            });
        }

        let target_spec = registry.fetch_spec_for(effective.id())?;
        let source = if engine.access().loaded_with_spec(&raw, &target_spec) {
            raw
        } else {
            debug!(
                "view: reloading {} from '{}' to '{}'",
                raw,
                self.effective_contract(),
                target
            );
            engine.access().reload(&raw, &target_spec)?
        };
        engine.wrap(&source, target)
    }

    fn ensure_loaded(&self) -> Result<(), ViewError> {
        if !self.state.needs_reload.get() {
            return Ok(());
        }
        let raw = self.origin();
        let fresh = self.state.engine.access().reload(&raw, &self.state.spec)?;
        debug!("view: reloaded {} for '{}'", raw, self.effective_contract());
        *self.state.raw.borrow_mut() = fresh;
        self.state.needs_reload.set(false);
        Ok(())
    }

    fn wrap_result(&self, outcome: Outcome, returns: &ReturnKind) -> Result<Outcome, ViewError> {
        let engine = &self.state.engine;
        match (returns, outcome) {
            (ReturnKind::Contract(c), Outcome::Value(Value::Ref(e)))
            | (ReturnKind::Contract(c), Outcome::Entity(e)) => Ok(Outcome::View(engine.wrap(&e, c)?)),
            (ReturnKind::ContractList(c), Outcome::Value(Value::List(list))) => {
                Ok(Outcome::Views(engine.wrap_list(list, c)?))
            }
            (_, other) => Ok(other),
        }
    }

    fn unsupported(&self, operation: &str) -> ViewError {
        ViewError::UnsupportedOperation {
            contract: self.effective_contract().to_string(),
            operation: operation.to_string(),
        }
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "View({} @ {})", self.effective_contract(), self.origin())
    }
}
