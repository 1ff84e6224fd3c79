use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Callers match on these,
// never on the human-readable message string.

pub mod error_code {
    pub const REGISTRATION: &str = "REGISTRATION";
    pub const INITIALIZATION: &str = "INITIALIZATION";
    pub const CYCLIC_REFERENCE: &str = "CYCLIC_REFERENCE";
    pub const NAMING_CONVENTION: &str = "NAMING_CONVENTION";
    pub const UNSUPPORTED_OPERATION: &str = "UNSUPPORTED_OPERATION";
    pub const UNKNOWN_CONTRACT: &str = "UNKNOWN_CONTRACT";
    pub const ENTITY_MISMATCH: &str = "ENTITY_MISMATCH";
    pub const NOT_LOADED: &str = "NOT_LOADED";
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    pub const INDEX_OUT_OF_BOUNDS: &str = "INDEX_OUT_OF_BOUNDS";
    pub const UNEXPECTED_OUTCOME: &str = "UNEXPECTED_OUTCOME";
    pub const ACCESS: &str = "ACCESS";
}

/// Errors raised by the data-access collaborator (store, loader).
///
/// These propagate through the view layer unchanged.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Unified error type for contract registration, composition and view dispatch.
///
/// Registration, initialization, cycle and naming errors are detectable at
/// startup; the rest only surface while serving calls.
#[derive(Error, Debug)]
pub enum ViewError {
    /// A contract or entity type was registered twice.
    #[error("{0}")]
    Registration(String),

    /// The registry could not be built (bad substitution, unknown parent, ...).
    #[error("{0}")]
    Initialization(String),

    /// The contract graph closes a loop. Holds the composition path.
    #[error("cyclic contract reference: {}", .0.join(" -> "))]
    CyclicReference(Vec<String>),

    /// An accessor name is not `get*`, `is*` or `set*`.
    #[error("accessor '{0}' does not follow the get/is/set naming convention")]
    NamingConvention(String),

    /// A view received a call it cannot satisfy. Programming defect.
    #[error("contract '{contract}' cannot dispatch '{operation}'")]
    UnsupportedOperation { contract: String, operation: String },

    #[error("unknown contract '{0}'")]
    UnknownContract(String),

    #[error("entity type '{entity_type}' cannot be viewed as '{contract}'")]
    EntityMismatch { entity_type: String, contract: String },

    #[error("attribute '{attribute}' of {entity} is not loaded")]
    NotLoaded { entity: String, attribute: String },

    #[error("invalid argument for '{operation}': {reason}")]
    InvalidArgument { operation: String, reason: String },

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("'{operation}' did not return {expected}")]
    UnexpectedOutcome { operation: String, expected: &'static str },

    #[error(transparent)]
    Access(#[from] AccessError),
}

impl ViewError {
    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ViewError::Registration(_) => error_code::REGISTRATION,
            ViewError::Initialization(_) => error_code::INITIALIZATION,
            ViewError::CyclicReference(_) => error_code::CYCLIC_REFERENCE,
            ViewError::NamingConvention(_) => error_code::NAMING_CONVENTION,
            ViewError::UnsupportedOperation { .. } => error_code::UNSUPPORTED_OPERATION,
            ViewError::UnknownContract(_) => error_code::UNKNOWN_CONTRACT,
            ViewError::EntityMismatch { .. } => error_code::ENTITY_MISMATCH,
            ViewError::NotLoaded { .. } => error_code::NOT_LOADED,
            ViewError::InvalidArgument { .. } => error_code::INVALID_ARGUMENT,
            ViewError::IndexOutOfBounds { .. } => error_code::INDEX_OUT_OF_BOUNDS,
            ViewError::UnexpectedOutcome { .. } => error_code::UNEXPECTED_OUTCOME,
            ViewError::Access(_) => error_code::ACCESS,
        }
    }

    /// True for errors that can only be caused by a broken contract graph.
    /// These abort initialization.
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            ViewError::Registration(_)
                | ViewError::Initialization(_)
                | ViewError::CyclicReference(_)
                | ViewError::NamingConvention(_)
        )
    }
}
