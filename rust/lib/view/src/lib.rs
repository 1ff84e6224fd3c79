pub mod access;
pub mod collection;
pub mod compose;
pub mod config;
pub mod contract;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod file_loader;
pub mod loader;
pub mod memory;
pub mod naming;
pub mod registry;
pub mod value;
pub mod view;

pub use access::{DataAccess, EntityStore};
pub use collection::CollectionView;
pub use config::ViewConfig;
pub use contract::{ContractDef, EntityTypeDef, OperationDef, OperationKind, ReturnKind};
pub use dispatch::DispatchTable;
pub use engine::ViewEngine;
pub use error::{AccessError, ViewError};
pub use fetch::{FetchProperty, FetchSpec};
pub use file_loader::FileLoader;
pub use loader::{Page, PageInfo, ViewLoader};
pub use memory::{MemoryStore, RefKey, StoredValue};
pub use registry::{ContractInfo, ContractRegistry, RegistryBuilder};
pub use value::{Entity, EntityList, Value};
pub use view::{Arg, Outcome, View};
