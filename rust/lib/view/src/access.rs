use crate::error::AccessError;
use crate::fetch::FetchSpec;
use crate::value::Entity;

/// DataAccess is the persistence collaborator views reload through.
///
/// Implementations may block on I/O; the view layer only requires that a
/// reload completes before the call that needed it returns.
pub trait DataAccess: Send + Sync {
    /// Load the entity again so it satisfies `spec`. May return a new
    /// instance; callers must use the returned entity from then on.
    fn reload(&self, entity: &Entity, spec: &FetchSpec) -> Result<Entity, AccessError>;

    /// Whether `entity` already has every attribute `spec` requires.
    fn loaded_with_spec(&self, entity: &Entity, spec: &FetchSpec) -> bool {
        spec.is_satisfied_by(entity)
    }
}

/// EntityStore adds the load/query side used by `ViewLoader`.
pub trait EntityStore: DataAccess {
    /// Load one entity by type and id, restricted to `spec`.
    /// Returns None if the entity does not exist.
    fn load(&self, entity_type: &str, id: &str, spec: &FetchSpec) -> Result<Option<Entity>, AccessError>;

    /// Load every entity of `spec.entity_type`, sorted by id.
    fn query(&self, spec: &FetchSpec) -> Result<Vec<Entity>, AccessError>;

    /// Persist the loaded attributes of an entity.
    fn save(&self, entity: &Entity) -> Result<(), AccessError>;
}
