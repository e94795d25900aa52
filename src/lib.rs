// VarStore - session-scoped named value store
// Named, typed, optionally-constant values cached in a balanced search tree
// and written through to a durable row backend.

#![warn(rust_2018_idioms)]

pub mod codec;
pub mod coerce;
pub mod persist;
pub mod session;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use codec::{Codec, FormatVersion};
pub use persist::{FileBackend, MemoryBackend, VariableBackend, VariableRow};
pub use session::Session;
pub use store::{SearchOutcome, Side, VariableStore};
pub use types::{BuiltinCatalog, Content, TypeCatalog, TypeId, TypedValue, WidthClass};

/// VarStore error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("type {0} is not supported")]
        UnsupportedType(String),

        #[error("value of type {from} cannot be cast to type {to}")]
        CoercionFailed { from: String, to: String },

        #[error("variable \"{0}\" already exists")]
        AlreadyExists(String),

        #[error("variable or constant \"{0}\" does not exist")]
        NotFound(String),

        #[error("{0} must be filled")]
        NullValueNotAllowed(&'static str),

        #[error("variable or constant name must be filled")]
        EmptyName,

        #[error("constant \"{0}\" cannot be set")]
        ConstantImmutable(String),

        #[error("variable \"{0}\" is incorrectly stored in the variables table")]
        CorruptRow(String),

        #[error("persistence failure: {0}")]
        Persistence(String),

        #[error("internal error: {0}")]
        Internal(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
