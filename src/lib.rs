//! The ipmeta library: per-provider IP metadata lookups.
//!
//! An [`Engine`] owns one prefix index (see [`ipmeta_index`]) shared by every
//! provider, the providers themselves and the [`Record`]s they hold. Provider
//! loaders register records and associate them with prefixes; lookups then
//! report, per enabled provider, the records applying to an address or a
//! prefix and how many addresses each applies to.
//!
//! # Examples
//!
//! ```
//! use ipmeta::{Engine, IndexKind, Prefix, ProviderMask, Record, RecordSet};
//!
//! let mut engine = Engine::new(IndexKind::Patricia);
//! let provider = engine.enable_provider_by_name("maxmind")?;
//!
//! let mut record = Record::new(1);
//! record.country_code = "AU".to_string();
//! let record = engine.register_record(provider, record)?;
//! engine.associate(&"1.0.0.0/24".parse::<Prefix>()?, record)?;
//!
//! let mut out = RecordSet::new();
//! engine.lookup_str("1.0.0.0/25", ProviderMask::EMPTY, &mut out)?;
//! let found: Vec<_> = engine.resolve(&out).collect();
//! assert_eq!(found[0].record.country_code, "AU");
//! assert_eq!(found[0].ip_count, 128);
//! # Ok::<(), ipmeta::Error>(())
//! ```

pub mod engine;
pub mod error;
pub mod input;
pub mod output;
pub mod pfx2as;
pub mod provider;
pub mod record;

pub use crate::engine::{Engine, ResolvedMatch};
pub use crate::error::{Error, Result};
pub use crate::provider::{Provider, BUILTIN_PROVIDERS};
pub use crate::record::Record;
pub use ipmeta_index::{
    AddressFamily, Index, IndexKind, IndexRegistry, Prefix, PrefixIndex, ProviderId, ProviderMask,
    RecordRef, RecordSet, MAX_PROVIDERS,
};
