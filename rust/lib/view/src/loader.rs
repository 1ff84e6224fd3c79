//! ViewLoader: load and query data directly as a contract.
//!
//! The loader asks the registry for the contract's fetch spec, fetches raw
//! entities from the store with it, and wraps the results, so views come
//! back fully loaded and never need a lazy reload.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::access::EntityStore;
use crate::engine::ViewEngine;
use crate::error::{AccessError, ViewError};
use crate::fetch::FetchSpec;
use crate::view::View;

/// One page of a paginated listing.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
}

/// Pagination summary, for callers that report it without the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn info(&self, offset: usize, limit: usize) -> PageInfo {
        PageInfo {
            offset,
            limit,
            total: self.total,
            has_more: self.has_more,
        }
    }
}

/// Loads views of a contract from an `EntityStore`.
pub struct ViewLoader {
    engine: Arc<ViewEngine>,
    store: Arc<dyn EntityStore>,
}

impl ViewLoader {
    pub fn new(engine: Arc<ViewEngine>, store: Arc<dyn EntityStore>) -> Self {
        Self { engine, store }
    }

    pub fn engine(&self) -> &Arc<ViewEngine> {
        &self.engine
    }

    fn spec(&self, contract: &str) -> Result<Arc<FetchSpec>, ViewError> {
        let effective = self.engine.effective_contract(contract)?;
        self.engine.fetch_spec_for(effective)
    }

    /// Load one entity as `contract`. Returns None if it does not exist.
    pub fn load(&self, contract: &str, id: &str) -> Result<Option<View>, ViewError> {
        let spec = self.spec(contract)?;
        let raw = self.store.load(&spec.entity_type, id, &spec)?;
        self.engine.wrap_opt(raw.as_ref(), contract)
    }

    /// Load one entity or fail with `NotFound`.
    pub fn load_or_err(&self, contract: &str, id: &str) -> Result<View, ViewError> {
        self.load(contract, id)?.ok_or_else(|| {
            AccessError::NotFound(format!("{} '{}' not found", contract, id)).into()
        })
    }

    /// Every entity of the contract's entity type, sorted by id.
    pub fn list(&self, contract: &str) -> Result<Vec<View>, ViewError> {
        let spec = self.spec(contract)?;
        let raws = self.store.query(&spec)?;
        debug!("ViewLoader: {} {} entities as '{}'", raws.len(), spec.entity_type, contract);
        self.engine.wrap_all(&raws, contract)
    }

    /// List with offset/limit.
    ///
    /// Queries everything and slices in memory; only the returned page is
    /// wrapped.
    pub fn list_paginated(
        &self,
        contract: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<View>, ViewError> {
        let spec = self.spec(contract)?;
        let raws = self.store.query(&spec)?;
        let total = raws.len();
        let offset = offset.min(total);
        let end = offset.saturating_add(limit).min(total);
        let items = self.engine.wrap_all(&raws[offset..end], contract)?;
        Ok(Page {
            items,
            total,
            has_more: end < total,
        })
    }

    /// Persist the loaded attributes of the view's origin entity.
    pub fn save(&self, view: &View) -> Result<(), ViewError> {
        let raw = view.origin();
        self.store.save(&raw)?;
        debug!("ViewLoader: saved {} via '{}'", raw, view.effective_contract());
        Ok(())
    }
}
