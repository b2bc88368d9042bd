use std::collections::TryReserveError;

use crate::AddressFamily;

/// Error types for prefix index operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The backend cannot store or query addresses of this family.
    #[error("{backend} index does not support {family} addresses")]
    UnsupportedFamily {
        backend: &'static str,
        family: AddressFamily,
    },

    /// Growing backend storage failed.
    #[error("allocation failed while growing {what}")]
    AllocationFailure { what: &'static str },

    /// An interval index is locked to the first provider that inserted into it.
    #[error("interval index holds records for provider {locked}, refusing provider {requested}")]
    MultiProviderNotSupported { locked: u8, requested: u8 },

    /// An internal id space ran out.
    #[error("{what} id space exhausted")]
    CapacityExhausted { what: &'static str },

    /// Mask length or address bytes do not form a prefix of the family.
    #[error("invalid prefix: {reason}")]
    InvalidPrefix { reason: String },

    /// Provider ids must be in `1..=MAX_PROVIDERS`.
    #[error("invalid provider id {id}")]
    InvalidProvider { id: u32 },

    /// No backend is registered under this name.
    #[error("unknown index backend: {name}")]
    UnknownBackend { name: String },
}

impl Error {
    pub(crate) fn invalid_prefix(reason: impl Into<String>) -> Self {
        Error::InvalidPrefix {
            reason: reason.into(),
        }
    }

    pub(crate) fn alloc(what: &'static str) -> impl FnOnce(TryReserveError) -> Self {
        move |_| Error::AllocationFailure { what }
    }
}

/// Convenience type alias for Results using the index error.
pub type Result<T> = std::result::Result<T, Error>;
