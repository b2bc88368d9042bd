//! Backend selection by name.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::prefix::Prefix;
use crate::provider::{ProviderMask, RecordRef};
use crate::record_set::RecordSet;
use crate::{BigArrayIndex, IntervalIndex, PatriciaIndex, PrefixIndex};

/// The available index backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexKind {
    #[default]
    Patricia,
    BigArray,
    IntervalTree,
}

impl IndexKind {
    pub const ALL: [IndexKind; 3] = [
        IndexKind::Patricia,
        IndexKind::BigArray,
        IndexKind::IntervalTree,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IndexKind::Patricia => PatriciaIndex::NAME,
            IndexKind::BigArray => BigArrayIndex::NAME,
            IndexKind::IntervalTree => IntervalIndex::NAME,
        }
    }

    /// One-line summary for listings.
    pub fn description(self) -> &'static str {
        match self {
            IndexKind::Patricia => "binary radix trie, IPv4 and IPv6, the default",
            IndexKind::BigArray => "direct-mapped IPv4 table, fastest point lookups",
            IndexKind::IntervalTree => "IPv4 interval tree, one provider per instance",
        }
    }

    /// Construct a fresh, empty index of this kind.
    pub fn create(self) -> Index {
        match self {
            IndexKind::Patricia => Index::Patricia(PatriciaIndex::new()),
            IndexKind::BigArray => Index::BigArray(BigArrayIndex::new()),
            IndexKind::IntervalTree => Index::IntervalTree(IntervalIndex::new()),
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<IndexKind> {
        IndexKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownBackend {
                name: s.to_string(),
            })
    }
}

/// One of the three index backends.
#[derive(Debug)]
pub enum Index {
    Patricia(PatriciaIndex),
    BigArray(BigArrayIndex),
    IntervalTree(IntervalIndex),
}

impl Index {
    pub fn kind(&self) -> IndexKind {
        match self {
            Index::Patricia(_) => IndexKind::Patricia,
            Index::BigArray(_) => IndexKind::BigArray,
            Index::IntervalTree(_) => IndexKind::IntervalTree,
        }
    }
}

impl PrefixIndex for Index {
    fn name(&self) -> &'static str {
        match self {
            Index::Patricia(index) => index.name(),
            Index::BigArray(index) => index.name(),
            Index::IntervalTree(index) => index.name(),
        }
    }

    fn insert_prefix(&mut self, prefix: &Prefix, record: RecordRef) -> Result<()> {
        match self {
            Index::Patricia(index) => index.insert_prefix(prefix, record),
            Index::BigArray(index) => index.insert_prefix(prefix, record),
            Index::IntervalTree(index) => index.insert_prefix(prefix, record),
        }
    }

    fn lookup_prefix(
        &self,
        prefix: &Prefix,
        mask: ProviderMask,
        out: &mut RecordSet,
    ) -> Result<usize> {
        match self {
            Index::Patricia(index) => index.lookup_prefix(prefix, mask, out),
            Index::BigArray(index) => index.lookup_prefix(prefix, mask, out),
            Index::IntervalTree(index) => index.lookup_prefix(prefix, mask, out),
        }
    }

    fn lookup_address(
        &self,
        addr: IpAddr,
        mask: ProviderMask,
        out: &mut RecordSet,
    ) -> Result<usize> {
        match self {
            Index::Patricia(index) => index.lookup_address(addr, mask, out),
            Index::BigArray(index) => index.lookup_address(addr, mask, out),
            Index::IntervalTree(index) => index.lookup_address(addr, mask, out),
        }
    }
}

/// Constructor of a fresh index.
pub type IndexConstructor = fn() -> Index;

/// Maps backend names to constructors.
#[derive(Debug, Clone)]
pub struct IndexRegistry {
    constructors: HashMap<&'static str, IndexConstructor>,
}

impl Default for IndexRegistry {
    fn default() -> Self {
        let mut registry = IndexRegistry {
            constructors: HashMap::new(),
        };
        registry.register(PatriciaIndex::NAME, || Index::Patricia(PatriciaIndex::new()));
        registry.register(BigArrayIndex::NAME, || Index::BigArray(BigArrayIndex::new()));
        registry.register(IntervalIndex::NAME, || {
            Index::IntervalTree(IntervalIndex::new())
        });
        registry
    }
}

impl IndexRegistry {
    /// Register a constructor under `name`, replacing any earlier one.
    pub fn register(&mut self, name: &'static str, constructor: IndexConstructor) {
        self.constructors.insert(name, constructor);
    }

    /// Registered backend names, sorted.
    pub fn available_backends(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.constructors.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Build a fresh index for the backend registered under `name`.
    pub fn create(&self, name: &str) -> Result<Index> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| Error::UnknownBackend {
                name: name.to_string(),
            })?;
        let index = constructor();
        tracing::debug!(backend = index.name(), "created prefix index");
        Ok(index)
    }
}
