//! The lookup engine: one shared prefix index plus the providers feeding it.

use std::net::IpAddr;

use hashbrown::HashMap;
use ipmeta_index::{
    AddressFamily, Index, IndexKind, IndexRegistry, Prefix, PrefixIndex, ProviderId, ProviderMask,
    RecordRef, RecordSet, MAX_PROVIDERS,
};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::provider::{Provider, BUILTIN_PROVIDERS};
use crate::record::Record;

/// A lookup result joined with the record and provider it refers to.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResolvedMatch<'a> {
    pub provider: &'a str,
    pub ip_count: u64,
    pub record: &'a Record,
}

/// Owns the prefix index, the registered providers and their records.
///
/// Providers start disabled. Only enabled providers may associate prefixes,
/// and lookups only ever consult enabled providers.
#[derive(Debug)]
pub struct Engine {
    index: Index,
    /// Indexed by provider slot (`id - 1`).
    providers: Vec<Option<Provider>>,
    names: HashMap<String, ProviderId>,
    enabled: ProviderMask,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(IndexKind::default())
    }
}

impl Engine {
    pub fn new(kind: IndexKind) -> Engine {
        Engine::with_index(kind.create())
    }

    /// Build an engine over the backend registered under `name`.
    pub fn from_backend_name(name: &str) -> Result<Engine> {
        let index = IndexRegistry::default().create(name)?;
        Ok(Engine::with_index(index))
    }

    /// Build an engine over an existing, usually empty, index.
    pub fn with_index(index: Index) -> Engine {
        let mut engine = Engine {
            index,
            providers: (0..MAX_PROVIDERS).map(|_| None).collect(),
            names: HashMap::new(),
            enabled: ProviderMask::EMPTY,
        };
        for (id, name, description) in BUILTIN_PROVIDERS {
            if let Ok(id) = ProviderId::new(id) {
                engine.install(Provider::new(id, name, description));
            }
        }
        tracing::debug!(backend = engine.index.name(), "engine ready");
        engine
    }

    fn install(&mut self, provider: Provider) {
        self.names.insert(provider.name().to_string(), provider.id());
        let slot = provider.id().index();
        self.providers[slot] = Some(provider);
    }

    #[inline]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[inline]
    pub fn backend(&self) -> IndexKind {
        self.index.kind()
    }

    /// Register a new provider under the lowest free id.
    pub fn register_provider(&mut self, name: &str, description: &str) -> Result<ProviderId> {
        if self.names.contains_key(name) {
            return Err(Error::DuplicateProvider {
                name: name.to_string(),
            });
        }
        let slot = self
            .providers
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| Error::TooManyProviders {
                name: name.to_string(),
                max: MAX_PROVIDERS,
            })?;
        let id = ProviderId::new(slot as u8 + 1)?;
        self.install(Provider::new(id, name, description));
        tracing::debug!(provider = name, id = id.get(), "registered provider");
        Ok(id)
    }

    #[inline]
    pub fn provider(&self, id: ProviderId) -> Option<&Provider> {
        self.providers[id.index()].as_ref()
    }

    pub fn provider_mut(&mut self, id: ProviderId) -> Option<&mut Provider> {
        self.providers[id.index()].as_mut()
    }

    pub fn provider_by_name(&self, name: &str) -> Option<&Provider> {
        self.names.get(name).and_then(|id| self.provider(*id))
    }

    /// Every registered provider, in id order.
    pub fn providers(&self) -> impl Iterator<Item = &Provider> + '_ {
        self.providers.iter().flatten()
    }

    fn known(&self, id: ProviderId) -> Result<&Provider> {
        self.provider(id).ok_or_else(|| Error::UnknownProvider {
            name: id.to_string(),
        })
    }

    /// Enable a provider for association and lookup. Enabling twice is a no-op.
    pub fn enable_provider(&mut self, id: ProviderId) -> Result<()> {
        let provider = self
            .providers
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::UnknownProvider {
                name: id.to_string(),
            })?;
        if !provider.is_enabled() {
            provider.set_enabled();
            self.enabled.insert(id);
            tracing::debug!(provider = provider.name(), "enabled provider");
        }
        Ok(())
    }

    /// Enable a provider by name, returning its id.
    pub fn enable_provider_by_name(&mut self, name: &str) -> Result<ProviderId> {
        let id = *self.names.get(name).ok_or_else(|| Error::UnknownProvider {
            name: name.to_string(),
        })?;
        self.enable_provider(id)?;
        Ok(id)
    }

    #[inline]
    pub fn is_enabled(&self, id: ProviderId) -> bool {
        self.enabled.contains(id)
    }

    #[inline]
    pub fn enabled_mask(&self) -> ProviderMask {
        self.enabled
    }

    /// Hand a record to its provider, returning the reference to associate.
    pub fn register_record(&mut self, id: ProviderId, record: Record) -> Result<RecordRef> {
        let provider = self
            .provider_mut(id)
            .ok_or_else(|| Error::UnknownProvider {
                name: id.to_string(),
            })?;
        Ok(provider.insert_record(record))
    }

    pub fn record(&self, record: RecordRef) -> Option<&Record> {
        self.provider(record.provider)?.record(record.id)
    }

    /// Index `record` under `prefix`.
    pub fn associate(&mut self, prefix: &Prefix, record: RecordRef) -> Result<()> {
        let provider = self.known(record.provider)?;
        if !provider.is_enabled() {
            return Err(Error::ProviderDisabled {
                name: provider.name().to_string(),
            });
        }
        if provider.record(record.id).is_none() {
            return Err(Error::UnknownRecord {
                provider: provider.name().to_string(),
                id: record.id,
            });
        }
        self.index.insert_prefix(prefix, record)?;
        Ok(())
    }

    /// [`Engine::associate`] for a prefix given as raw network-order bytes.
    pub fn associate_bytes(
        &mut self,
        family: AddressFamily,
        addr: &[u8],
        len: u8,
        record: RecordRef,
    ) -> Result<()> {
        let prefix = Prefix::new(family, addr, len)?;
        self.associate(&prefix, record)
    }

    /// The caller's mask restricted to enabled providers; an empty mask
    /// selects every enabled provider.
    pub fn effective_mask(&self, mask: ProviderMask) -> ProviderMask {
        if mask.is_empty() {
            self.enabled
        } else {
            mask.intersection(self.enabled)
        }
    }

    /// Look up a prefix. A full-length prefix is a point lookup.
    ///
    /// `out` is cleared first. Returns the number of matches.
    pub fn lookup(&self, prefix: &Prefix, mask: ProviderMask, out: &mut RecordSet) -> Result<usize> {
        out.clear();
        let mask = self.effective_mask(mask);
        if mask.is_empty() {
            return Ok(0);
        }
        let found = if prefix.len() == prefix.family().max_bits() {
            self.index.lookup_address(prefix.addr(), mask, out)?
        } else {
            self.index.lookup_prefix(prefix, mask, out)?
        };
        Ok(found)
    }

    pub fn lookup_address(
        &self,
        addr: IpAddr,
        mask: ProviderMask,
        out: &mut RecordSet,
    ) -> Result<usize> {
        self.lookup(&Prefix::host(addr), mask, out)
    }

    /// Look up `addr` or `addr/len`.
    pub fn lookup_str(&self, query: &str, mask: ProviderMask, out: &mut RecordSet) -> Result<usize> {
        let prefix: Prefix = query.trim().parse()?;
        self.lookup(&prefix, mask, out)
    }

    fn require_enabled(&self, id: ProviderId) -> Result<()> {
        let provider = self.known(id)?;
        if provider.is_enabled() {
            Ok(())
        } else {
            Err(Error::ProviderDisabled {
                name: provider.name().to_string(),
            })
        }
    }

    /// Look up a prefix for a single provider.
    pub fn provider_lookup(
        &self,
        id: ProviderId,
        prefix: &Prefix,
        out: &mut RecordSet,
    ) -> Result<usize> {
        self.require_enabled(id)?;
        self.lookup(prefix, ProviderMask::single(id), out)
    }

    pub fn provider_lookup_address(
        &self,
        id: ProviderId,
        addr: IpAddr,
        out: &mut RecordSet,
    ) -> Result<usize> {
        self.require_enabled(id)?;
        self.lookup_address(addr, ProviderMask::single(id), out)
    }

    /// Join each match in `set` with its record and provider name.
    ///
    /// Matches whose record is no longer registered are skipped.
    pub fn resolve<'a>(&'a self, set: &'a RecordSet) -> impl Iterator<Item = ResolvedMatch<'a>> + 'a {
        set.iter().filter_map(move |m| {
            let provider = self.provider(m.record.provider)?;
            let record = provider.record(m.record.id)?;
            Some(ResolvedMatch {
                provider: provider.name(),
                ip_count: m.ip_count,
                record,
            })
        })
    }
}
