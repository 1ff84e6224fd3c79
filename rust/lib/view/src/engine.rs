//! View engine, the wrapper factory.
//!
//! Owns the immutable contract registry and the data-access collaborator,
//! and turns raw entities into views. Constructed once at process start and
//! shared as `Arc<ViewEngine>` with every view it produces.

use std::sync::Arc;

use tracing::{debug, info};

use crate::access::DataAccess;
use crate::collection::CollectionView;
use crate::config::ViewConfig;
use crate::error::ViewError;
use crate::fetch::FetchSpec;
use crate::registry::{ContractRegistry, RegistryBuilder};
use crate::value::{Entity, EntityList};
use crate::view::View;

pub struct ViewEngine {
    registry: ContractRegistry,
    access: Arc<dyn DataAccess>,
}

impl ViewEngine {
    pub fn new(registry: ContractRegistry, access: Arc<dyn DataAccess>) -> Arc<Self> {
        Arc::new(Self { registry, access })
    }

    /// Build the registry and, when configured, compose every contract up
    /// front so a broken contract graph aborts startup.
    pub fn bootstrap(
        config: &ViewConfig,
        builder: RegistryBuilder,
        access: Arc<dyn DataAccess>,
    ) -> Result<Arc<Self>, ViewError> {
        let registry = builder.build()?;
        if config.precompose {
            let count = registry.precompose_all()?;
            info!("view engine: precomposed {} contracts", count);
        } else {
            info!(
                "view engine: {} contracts registered, composing lazily",
                registry.len()
            );
        }
        Ok(Self::new(registry, access))
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    pub fn access(&self) -> &Arc<dyn DataAccess> {
        &self.access
    }

    /// Terminal contract id reached through substitution links.
    pub fn effective_contract(&self, contract: &str) -> Result<&str, ViewError> {
        Ok(self.registry.effective_contract(contract)?.id())
    }

    pub fn fetch_spec_for(&self, contract: &str) -> Result<Arc<FetchSpec>, ViewError> {
        self.registry.fetch_spec_for(contract)
    }

    /// Wrap a raw entity as `contract` (resolved to its effective contract).
    pub fn wrap(self: &Arc<Self>, raw: &Entity, contract: &str) -> Result<View, ViewError> {
        let effective = self.registry.effective_contract(contract)?;
        if !self
            .registry
            .is_entity_subtype(raw.entity_type(), effective.entity_type())
        {
            return Err(ViewError::EntityMismatch {
                entity_type: raw.entity_type().to_string(),
                contract: effective.id().to_string(),
            });
        }

        let table = self.registry.dispatch_table(effective.id())?;
        let spec = self.registry.fetch_spec_for(effective.id())?;
        let needs_reload = !self.access.loaded_with_spec(raw, &spec);
        if needs_reload {
            debug!(
                "wrap: {} does not satisfy '{}', reload deferred to first access",
                raw,
                effective.id()
            );
        }
        Ok(View::new(self.clone(), table, spec, raw.clone(), needs_reload))
    }

    /// Null-propagating wrap: `None` in, `None` out.
    pub fn wrap_opt(
        self: &Arc<Self>,
        raw: Option<&Entity>,
        contract: &str,
    ) -> Result<Option<View>, ViewError> {
        raw.map(|e| self.wrap(e, contract)).transpose()
    }

    /// Wrap every entity of a batch, e.g. a query result.
    pub fn wrap_all(self: &Arc<Self>, raws: &[Entity], contract: &str) -> Result<Vec<View>, ViewError> {
        raws.iter().map(|e| self.wrap(e, contract)).collect()
    }

    /// Collection view over a one-to-many backing list.
    pub fn wrap_list(
        self: &Arc<Self>,
        list: EntityList,
        contract: &str,
    ) -> Result<CollectionView, ViewError> {
        self.registry.info(contract)?;
        Ok(CollectionView::new(self.clone(), list, contract))
    }
}
