use camino::Utf8PathBuf;

/// Error types for the ipmeta library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The prefix index rejected an insert or lookup.
    #[error(transparent)]
    Index(#[from] ipmeta_index::Error),

    /// No provider is registered under this name or id.
    #[error("unknown provider: {name}")]
    UnknownProvider { name: String },

    /// A provider with this name is already registered.
    #[error("provider already registered: {name}")]
    DuplicateProvider { name: String },

    /// Every provider id is taken.
    #[error("cannot register {name}: all {max} provider ids are in use")]
    TooManyProviders { name: String, max: usize },

    /// The provider exists but has not been enabled.
    #[error("provider not enabled: {name}")]
    ProviderDisabled { name: String },

    /// A record reference names a record its provider does not hold.
    #[error("record {id} is not registered with provider {provider}")]
    UnknownRecord { provider: String, id: u32 },

    /// A line of input could not be parsed.
    #[error("line {line}: {reason}")]
    Parse { line: u64, reason: String },

    /// An input file could not be opened.
    #[error("failed to open {path}")]
    Open {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using the library error.
pub type Result<T> = std::result::Result<T, Error>;
