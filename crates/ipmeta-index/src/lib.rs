//! Prefix indexes mapping IP prefixes to per-provider metadata records.
//!
//! Callers bulk-load `(prefix, record)` associations and then ask, for an
//! address or a prefix, which record each provider has for it and how many
//! addresses that record applies to. Three interchangeable backends
//! implement the [`PrefixIndex`] contract:
//!
//! - [`PatriciaIndex`]: binary radix trie per address family. The default.
//! - [`BigArrayIndex`]: IPv4-only direct-mapped table. O(1) point lookups,
//!   O(range) inserts and range lookups.
//! - [`IntervalIndex`]: IPv4-only interval tree for a single provider.
//!
//! Indexes never own records. They store [`RecordRef`] handles, which the
//! owner of the records resolves.
//!
//! # Examples
//!
//! ```
//! use ipmeta_index::{IndexRegistry, Prefix, PrefixIndex, ProviderId, ProviderMask, RecordRef, RecordSet};
//!
//! let mut index = IndexRegistry::default().create("patricia")?;
//! let provider = ProviderId::new(1)?;
//! index.insert_prefix(&"10.0.0.0/24".parse::<Prefix>()?, RecordRef::new(provider, 7))?;
//!
//! let mut out = RecordSet::new();
//! index.lookup_prefix(&"10.0.0.0/25".parse::<Prefix>()?, ProviderMask::single(provider), &mut out)?;
//! assert_eq!(out.as_slice()[0].ip_count, 128);
//! # Ok::<(), ipmeta_index::Error>(())
//! ```

use std::net::IpAddr;

pub mod bigarray;
pub mod error;
pub mod interval;
pub mod patricia;
pub mod prefix;
pub mod provider;
pub mod record_set;
pub mod registry;

pub use crate::bigarray::BigArrayIndex;
pub use crate::error::{Error, Result};
pub use crate::interval::IntervalIndex;
pub use crate::patricia::PatriciaIndex;
pub use crate::prefix::{AddressFamily, Prefix};
pub use crate::provider::{ProviderId, ProviderMask, RecordRef, MAX_PROVIDERS};
pub use crate::record_set::{RecordMatch, RecordSet};
pub use crate::registry::{Index, IndexKind, IndexRegistry};

/// The contract shared by every prefix index backend.
///
/// Lookups append to `out` and return the number of entries they appended;
/// they never clear it.
pub trait PrefixIndex {
    /// Canonical backend name.
    fn name(&self) -> &'static str;

    /// Register `record` for its provider under exactly `prefix`.
    ///
    /// Inserting again for the same provider and prefix replaces the
    /// earlier record. A failed insert leaves the index unchanged.
    fn insert_prefix(&mut self, prefix: &Prefix, record: RecordRef) -> Result<()>;

    /// Find, per provider in `mask`, the records applying to `prefix`.
    fn lookup_prefix(&self, prefix: &Prefix, mask: ProviderMask, out: &mut RecordSet)
        -> Result<usize>;

    /// Find, per provider in `mask`, the records applying to one address.
    fn lookup_address(&self, addr: IpAddr, mask: ProviderMask, out: &mut RecordSet)
        -> Result<usize>;
}
