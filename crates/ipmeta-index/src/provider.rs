//! Provider ids, provider masks and record references.

use std::fmt;
use std::num::NonZeroU8;

use crate::error::{Error, Result};

/// Maximum number of providers an index can distinguish.
pub const MAX_PROVIDERS: usize = 32;

/// Identifier of a metadata provider, in `1..=MAX_PROVIDERS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(NonZeroU8);

impl ProviderId {
    pub fn new(id: u8) -> Result<ProviderId> {
        match NonZeroU8::new(id) {
            Some(nz) if usize::from(id) <= MAX_PROVIDERS => Ok(ProviderId(nz)),
            _ => Err(Error::InvalidProvider { id: u32::from(id) }),
        }
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0.get()
    }

    /// Zero-based slot index (`id - 1`).
    #[inline]
    pub fn index(self) -> usize {
        usize::from(self.0.get()) - 1
    }

    /// Build an id from a zero-based slot index.
    #[inline]
    pub(crate) fn from_index(index: usize) -> ProviderId {
        debug_assert!(index < MAX_PROVIDERS);
        // index < 32, so index + 1 is a valid non-zero u8
        ProviderId(NonZeroU8::MIN.saturating_add(index as u8))
    }

    /// The mask bit for this provider (`1 << (id - 1)`).
    #[inline]
    pub fn bit(self) -> u32 {
        1u32 << self.index()
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A set of provider ids; bit `id - 1` is set for each member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProviderMask(u32);

impl ProviderMask {
    pub const EMPTY: ProviderMask = ProviderMask(0);
    pub const ALL: ProviderMask = ProviderMask(u32::MAX);

    #[inline]
    pub const fn from_bits(bits: u32) -> ProviderMask {
        ProviderMask(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn single(id: ProviderId) -> ProviderMask {
        ProviderMask(id.bit())
    }

    #[inline]
    pub fn insert(&mut self, id: ProviderId) {
        self.0 |= id.bit();
    }

    #[inline]
    pub fn contains(self, id: ProviderId) -> bool {
        self.0 & id.bit() != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn intersection(self, other: ProviderMask) -> ProviderMask {
        ProviderMask(self.0 & other.0)
    }

    /// Members of `self` not in `other`.
    #[inline]
    pub fn difference(self, other: ProviderMask) -> ProviderMask {
        ProviderMask(self.0 & !other.0)
    }

    #[inline]
    pub fn is_subset_of(self, other: ProviderMask) -> bool {
        self.0 & !other.0 == 0
    }

    /// Number of providers in the set.
    #[inline]
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Member ids in ascending order.
    pub fn iter(self) -> impl Iterator<Item = ProviderId> {
        let bits = self.0;
        (0..MAX_PROVIDERS)
            .filter(move |i| bits & (1u32 << i) != 0)
            .map(ProviderId::from_index)
    }
}

impl FromIterator<ProviderId> for ProviderMask {
    fn from_iter<I: IntoIterator<Item = ProviderId>>(iter: I) -> Self {
        let mut mask = ProviderMask::EMPTY;
        for id in iter {
            mask.insert(id);
        }
        mask
    }
}

impl From<ProviderId> for ProviderMask {
    fn from(id: ProviderId) -> Self {
        ProviderMask::single(id)
    }
}

/// A non-owning reference to a record: its provider and provider-local id.
///
/// Indexes store these instead of records; the owner of the records
/// resolves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordRef {
    pub provider: ProviderId,
    pub id: u32,
}

impl RecordRef {
    #[inline]
    pub fn new(provider: ProviderId, id: u32) -> RecordRef {
        RecordRef { provider, id }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.id)
    }
}

/// Per-prefix table holding at most one record per provider.
pub(crate) type SlotTable = [Option<RecordRef>; MAX_PROVIDERS];

pub(crate) const EMPTY_SLOTS: SlotTable = [None; MAX_PROVIDERS];
