//! Identity-preserving collection views for one-to-many attributes.
//!
//! A [`CollectionView`] adapts a shared backing [`EntityList`] to a list of
//! views. It caches one view per raw element, so repeated reads of the same
//! element return the same view, and keeps that cache consistent with the
//! backing list across every mutation.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;

use crate::engine::ViewEngine;
use crate::error::ViewError;
use crate::value::{Entity, EntityList};
use crate::view::View;

/// A sub-range of the backing list.
struct Window {
    start: usize,
    len: Cell<usize>,
}

struct CollectionState {
    engine: Arc<ViewEngine>,
    contract: String,
    backing: EntityList,
    window: Option<Window>,
    /// Raw element identity → its view.
    cache: RefCell<HashMap<usize, View>>,
}

/// List-like view over a backing entity list. Clones share the cache.
#[derive(Clone)]
pub struct CollectionView {
    state: Rc<CollectionState>,
}

impl CollectionView {
    pub(crate) fn new(engine: Arc<ViewEngine>, backing: EntityList, contract: &str) -> Self {
        Self::with_window(engine, backing, contract, None)
    }

    fn with_window(
        engine: Arc<ViewEngine>,
        backing: EntityList,
        contract: &str,
        window: Option<Window>,
    ) -> Self {
        Self {
            state: Rc::new(CollectionState {
                engine,
                contract: contract.to_string(),
                backing,
                window,
                cache: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Element contract, as requested (not resolved).
    pub fn contract(&self) -> &str {
        &self.state.contract
    }

    /// The full backing list, shared with the owning entity.
    pub fn backing(&self) -> &EntityList {
        &self.state.backing
    }

    fn start(&self) -> usize {
        self.state.window.as_ref().map_or(0, |w| w.start)
    }

    pub fn len(&self) -> usize {
        let total = self.state.backing.len();
        match &self.state.window {
            None => total,
            Some(w) => w.len.get().min(total.saturating_sub(w.start)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_len(&self, len: usize) {
        if let Some(w) = &self.state.window {
            w.len.set(len);
        }
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// View of the element at `index`, or None past the end.
    pub fn get(&self, index: usize) -> Result<Option<View>, ViewError> {
        if index >= self.len() {
            return Ok(None);
        }
        match self.state.backing.get(self.start() + index) {
            Some(raw) => self.wrap_element(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Single read path: cached view for `raw`, or wrap and cache.
    fn wrap_element(&self, raw: &Entity) -> Result<View, ViewError> {
        if let Some(view) = self.state.cache.borrow().get(&raw.identity()) {
            return Ok(view.clone());
        }
        let view = self.state.engine.wrap(raw, &self.state.contract)?;
        self.state
            .cache
            .borrow_mut()
            .insert(raw.identity(), view.clone());
        Ok(view)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            view: self,
            index: 0,
        }
    }

    pub fn to_vec(&self) -> Result<Vec<View>, ViewError> {
        self.iter().collect()
    }

    /// Whether a view for `raw` is currently cached.
    pub fn is_cached(&self, raw: &Entity) -> bool {
        self.state.cache.borrow().contains_key(&raw.identity())
    }

    fn position_of(&self, raw: &Entity) -> Option<usize> {
        let start = self.start();
        self.state
            .backing
            .position_in(raw, start, start + self.len())
            .map(|abs| abs - start)
    }

    /// Position of the view. A view handed out by this collection is found
    /// through the cache even after a lazy reload swapped its origin;
    /// any other view is matched by its origin entity.
    pub fn index_of(&self, view: &View) -> Option<usize> {
        let start = self.start();
        let cached = {
            let cache = self.state.cache.borrow();
            (0..self.len()).find(|&index| {
                self.state
                    .backing
                    .get(start + index)
                    .and_then(|raw| cache.get(&raw.identity()).cloned())
                    .is_some_and(|cached| cached.ptr_eq(view))
            })
        };
        cached.or_else(|| self.position_of(&view.origin()))
    }

    pub fn contains(&self, view: &View) -> bool {
        self.index_of(view).is_some()
    }

    /// The elements as an entity list. The whole-list view shares the
    /// backing list; a sub-range yields a copy of its window.
    pub fn to_entity_list(&self) -> EntityList {
        match &self.state.window {
            None => self.state.backing.clone(),
            Some(_) => {
                let start = self.start();
                self.state
                    .backing
                    .snapshot()
                    .into_iter()
                    .skip(start)
                    .take(self.len())
                    .collect()
            }
        }
    }

    // ── Mutations ───────────────────────────────────────────────────

    fn cache_view(&self, view: &View) -> Entity {
        let origin = view.origin();
        self.state
            .cache
            .borrow_mut()
            .insert(origin.identity(), view.clone());
        origin
    }

    fn evict_if_absent(&self, raw: &Entity) {
        if self.position_of(raw).is_none() {
            self.state.cache.borrow_mut().remove(&raw.identity());
        }
    }

    /// An element must view the collection's entity type and satisfy its
    /// contract.
    fn check_element(&self, operation: &str, view: &View) -> Result<(), ViewError> {
        let registry = self.state.engine.registry();
        let expected = registry.effective_contract(&self.state.contract)?;
        let origin = view.origin();
        if !registry.is_entity_subtype(origin.entity_type(), expected.entity_type()) {
            return Err(ViewError::EntityMismatch {
                entity_type: origin.entity_type().to_string(),
                contract: expected.id().to_string(),
            });
        }
        if !registry.is_contract_assignable(view.effective_contract(), expected.id()) {
            return Err(ViewError::InvalidArgument {
                operation: operation.to_string(),
                reason: format!(
                    "a '{}' view does not satisfy element contract '{}'",
                    view.effective_contract(),
                    expected.id()
                ),
            });
        }
        Ok(())
    }

    fn check_index(&self, index: usize, len: usize) -> Result<(), ViewError> {
        if index >= len {
            return Err(ViewError::IndexOutOfBounds { index, len });
        }
        Ok(())
    }

    /// Append a view; its origin goes to the backing list.
    pub fn push(&self, view: View) -> Result<(), ViewError> {
        self.check_element("push", &view)?;
        let len = self.len();
        let origin = self.cache_view(&view);
        match &self.state.window {
            None => self.state.backing.push(origin),
            Some(_) => self.state.backing.insert(self.start() + len, origin),
        }
        self.set_len(len + 1);
        Ok(())
    }

    pub fn insert(&self, index: usize, view: View) -> Result<(), ViewError> {
        let len = self.len();
        if index > len {
            return Err(ViewError::IndexOutOfBounds { index, len });
        }
        self.check_element("insert", &view)?;
        let origin = self.cache_view(&view);
        self.state.backing.insert(self.start() + index, origin);
        self.set_len(len + 1);
        Ok(())
    }

    /// Replace the element at `index`, returning the previous view.
    pub fn set(&self, index: usize, view: View) -> Result<View, ViewError> {
        let len = self.len();
        self.check_index(index, len)?;
        self.check_element("set", &view)?;
        let previous = self
            .get(index)?
            .ok_or(ViewError::IndexOutOfBounds { index, len })?;
        let origin = self.cache_view(&view);
        let replaced = self
            .state
            .backing
            .replace(self.start() + index, origin)
            .ok_or(ViewError::IndexOutOfBounds { index, len })?;
        self.evict_if_absent(&replaced);
        Ok(previous)
    }

    /// Remove the element at `index`, returning its view.
    pub fn remove(&self, index: usize) -> Result<View, ViewError> {
        let len = self.len();
        self.check_index(index, len)?;
        let removed = self
            .get(index)?
            .ok_or(ViewError::IndexOutOfBounds { index, len })?;
        let raw = self
            .state
            .backing
            .remove(self.start() + index)
            .ok_or(ViewError::IndexOutOfBounds { index, len })?;
        self.set_len(len - 1);
        self.evict_if_absent(&raw);
        Ok(removed)
    }

    /// Remove the view's element, located as by [`index_of`](Self::index_of).
    pub fn remove_view(&self, view: &View) -> Result<bool, ViewError> {
        match self.index_of(view) {
            Some(index) => {
                self.remove(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Push every view in order, stopping at the first rejected one.
    pub fn extend<I: IntoIterator<Item = View>>(&self, views: I) -> Result<(), ViewError> {
        for view in views {
            self.push(view)?;
        }
        Ok(())
    }

    /// Keep only the elements for which `keep` returns true.
    pub fn retain<F>(&self, mut keep: F) -> Result<(), ViewError>
    where
        F: FnMut(&View) -> bool,
    {
        let mut index = 0;
        while let Some(view) = self.get(index)? {
            if keep(&view) {
                index += 1;
            } else {
                self.remove(index)?;
            }
        }
        Ok(())
    }

    pub fn clear(&self) {
        let start = self.start();
        for _ in 0..self.len() {
            self.state.backing.remove(start);
        }
        self.set_len(0);
        self.state.cache.borrow_mut().clear();
    }

    /// View over `range` of this collection. Writes go through to the same
    /// backing list, but the sub-range starts with its own empty cache.
    pub fn sub_range(&self, range: Range<usize>) -> Result<CollectionView, ViewError> {
        let len = self.len();
        if range.start > range.end || range.end > len {
            return Err(ViewError::IndexOutOfBounds {
                index: range.end,
                len,
            });
        }
        Ok(Self::with_window(
            self.state.engine.clone(),
            self.state.backing.clone(),
            &self.state.contract,
            Some(Window {
                start: self.start() + range.start,
                len: Cell::new(range.len()),
            }),
        ))
    }

    /// Identity comparison: true if both handles are the same collection view.
    pub fn ptr_eq(&self, other: &CollectionView) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for CollectionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionView")
            .field("contract", &self.state.contract)
            .field("len", &self.len())
            .field("cached", &self.state.cache.borrow().len())
            .finish()
    }
}

/// Iterator over the views of a collection. Reads go through the cache.
pub struct Iter<'a> {
    view: &'a CollectionView,
    index: usize,
}

impl Iterator for Iter<'_> {
    type Item = Result<View, ViewError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.view.get(self.index).transpose()?;
        self.index += 1;
        Some(item)
    }
}

impl<'a> IntoIterator for &'a CollectionView {
    type Item = Result<View, ViewError>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
