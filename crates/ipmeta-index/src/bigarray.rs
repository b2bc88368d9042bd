//! Direct-mapped IPv4 index.
//!
//! Conceptually a `2^32 × MAX_PROVIDERS` table of 32-bit lookup ids, one cell
//! per (address, provider). A lookup id names a slot table holding one record
//! per provider; id 0 marks an empty cell. Each provider's plane is split
//! into 64K-cell pages that are allocated on first write, so untouched
//! address space costs nothing.
//!
//! Point lookups are a single array read per provider. Inserts and range
//! lookups touch every address in the range.

use std::net::IpAddr;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::prefix::{AddressFamily, Prefix};
use crate::provider::{ProviderId, ProviderMask, RecordRef, SlotTable, EMPTY_SLOTS, MAX_PROVIDERS};
use crate::record_set::RecordSet;
use crate::PrefixIndex;

const PAGE_BITS: u32 = 16;
const PAGE_CELLS: usize = 1 << PAGE_BITS;
const PAGE_COUNT: usize = 1 << (32 - PAGE_BITS);

type LookupId = u32;

/// One provider's lookup ids for the whole IPv4 space.
#[derive(Debug)]
struct Plane {
    pages: Vec<Option<Box<[LookupId]>>>,
}

impl Plane {
    fn new() -> Result<Plane> {
        let mut pages = Vec::new();
        pages
            .try_reserve_exact(PAGE_COUNT)
            .map_err(Error::alloc("bigarray plane"))?;
        pages.resize_with(PAGE_COUNT, || None);
        Ok(Plane { pages })
    }

    fn new_page() -> Result<Box<[LookupId]>> {
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(PAGE_CELLS)
            .map_err(Error::alloc("bigarray page"))?;
        cells.resize(PAGE_CELLS, 0);
        Ok(cells.into_boxed_slice())
    }

    #[inline]
    fn get(&self, addr: u32) -> LookupId {
        match &self.pages[(addr >> PAGE_BITS) as usize] {
            Some(page) => page[(addr as usize) & (PAGE_CELLS - 1)],
            None => 0,
        }
    }

    fn page_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_some()).count()
    }
}

/// Cell bounds of `start..=end` that fall inside page `page`.
#[inline]
fn page_span(page: usize, start: u32, end: u32) -> (usize, usize) {
    let base = (page as u64) << PAGE_BITS;
    let lo = u64::from(start).max(base) - base;
    let hi = u64::from(end).min(base + PAGE_CELLS as u64 - 1) - base;
    (lo as usize, hi as usize)
}

/// IPv4-only direct-mapped index.
#[derive(Debug)]
pub struct BigArrayIndex {
    /// Indexed by provider slot.
    planes: Vec<Option<Plane>>,
    /// Slot tables, indexed by `lookup id - 1`.
    records: Vec<SlotTable>,
    /// Record id to lookup id, so repeated inserts of one record share an id.
    ids: FxHashMap<u32, LookupId>,
}

impl Default for BigArrayIndex {
    fn default() -> Self {
        BigArrayIndex::new()
    }
}

impl BigArrayIndex {
    pub const NAME: &'static str = "bigarray";

    pub fn new() -> BigArrayIndex {
        BigArrayIndex {
            planes: (0..MAX_PROVIDERS).map(|_| None).collect(),
            records: Vec::new(),
            ids: FxHashMap::default(),
        }
    }

    /// Number of lookup ids handed out so far.
    pub fn lookup_id_count(&self) -> usize {
        self.records.len()
    }

    /// Number of 64K-address pages materialised for a provider.
    pub fn page_count(&self, provider: ProviderId) -> usize {
        self.planes[provider.index()]
            .as_ref()
            .map_or(0, Plane::page_count)
    }

    fn v4_range(prefix: &Prefix) -> Result<(u32, u32)> {
        prefix.v4_range().ok_or(Error::UnsupportedFamily {
            backend: BigArrayIndex::NAME,
            family: prefix.family(),
        })
    }

    fn has_page(&self, slot: usize, page: usize) -> bool {
        self.planes[slot]
            .as_ref()
            .is_some_and(|plane| plane.pages[page].is_some())
    }

    /// Emit the pending run, if any. Returns the number of entries added.
    fn flush_run(
        &self,
        run: &mut Option<(LookupId, u64)>,
        provider: ProviderId,
        out: &mut RecordSet,
    ) -> Result<usize> {
        match run.take() {
            Some((lid, count)) => match self.record(lid, provider) {
                Some(record) => {
                    out.add(record, count)?;
                    Ok(1)
                }
                None => Ok(0),
            },
            None => Ok(0),
        }
    }

    #[inline]
    fn record(&self, lid: LookupId, provider: ProviderId) -> Option<RecordRef> {
        self.records
            .get((lid as usize).checked_sub(1)?)
            .and_then(|slots| slots[provider.index()])
    }
}

impl PrefixIndex for BigArrayIndex {
    fn name(&self) -> &'static str {
        BigArrayIndex::NAME
    }

    fn insert_prefix(&mut self, prefix: &Prefix, record: RecordRef) -> Result<()> {
        let (start, end) = BigArrayIndex::v4_range(prefix)?;
        let slot = record.provider.index();

        // Everything that can fail happens before the first write.
        let (lid, new_lid) = match self.ids.get(&record.id) {
            Some(&lid) => (lid, false),
            None => {
                if self.records.len() >= (LookupId::MAX - 1) as usize {
                    return Err(Error::CapacityExhausted {
                        what: "bigarray lookup",
                    });
                }
                self.records
                    .try_reserve(1)
                    .map_err(Error::alloc("bigarray slot tables"))?;
                self.ids
                    .try_reserve(1)
                    .map_err(Error::alloc("bigarray id map"))?;
                (self.records.len() as LookupId + 1, true)
            }
        };

        let new_plane = match self.planes[slot] {
            Some(_) => None,
            None => Some(Plane::new()?),
        };
        let first_page = (start >> PAGE_BITS) as usize;
        let last_page = (end >> PAGE_BITS) as usize;
        let missing = (first_page..=last_page).filter(|&page| !self.has_page(slot, page));
        let mut fresh_pages = Vec::new();
        fresh_pages
            .try_reserve_exact(missing.clone().count())
            .map_err(Error::alloc("bigarray page list"))?;
        for page in missing {
            fresh_pages.push((page, Plane::new_page()?));
        }

        if new_lid {
            self.records.push(EMPTY_SLOTS);
            self.ids.insert(record.id, lid);
        }
        self.records[lid as usize - 1][slot] = Some(record);

        if new_plane.is_some() {
            self.planes[slot] = new_plane;
        }
        if let Some(plane) = self.planes[slot].as_mut() {
            for (page, cells) in fresh_pages {
                plane.pages[page] = Some(cells);
            }
            for page in first_page..=last_page {
                let (lo, hi) = page_span(page, start, end);
                if let Some(cells) = plane.pages[page].as_mut() {
                    cells[lo..=hi].fill(lid);
                }
            }
        }
        Ok(())
    }

    fn lookup_prefix(
        &self,
        prefix: &Prefix,
        mask: ProviderMask,
        out: &mut RecordSet,
    ) -> Result<usize> {
        let (start, end) = BigArrayIndex::v4_range(prefix)?;
        let first_page = (start >> PAGE_BITS) as usize;
        let last_page = (end >> PAGE_BITS) as usize;
        let mut added = 0;

        for provider in mask.iter() {
            let Some(plane) = &self.planes[provider.index()] else {
                continue;
            };
            // Consecutive addresses with the same lookup id form one entry.
            let mut run: Option<(LookupId, u64)> = None;
            for page in first_page..=last_page {
                let Some(cells) = &plane.pages[page] else {
                    added += self.flush_run(&mut run, provider, out)?;
                    continue;
                };
                let (lo, hi) = page_span(page, start, end);
                for &lid in &cells[lo..=hi] {
                    if let Some((current, count)) = run.as_mut() {
                        if *current == lid {
                            *count += 1;
                            continue;
                        }
                    }
                    added += self.flush_run(&mut run, provider, out)?;
                    if lid != 0 {
                        run = Some((lid, 1));
                    }
                }
            }
            added += self.flush_run(&mut run, provider, out)?;
        }
        Ok(added)
    }

    fn lookup_address(
        &self,
        addr: IpAddr,
        mask: ProviderMask,
        out: &mut RecordSet,
    ) -> Result<usize> {
        let IpAddr::V4(v4) = addr else {
            return Err(Error::UnsupportedFamily {
                backend: BigArrayIndex::NAME,
                family: AddressFamily::V6,
            });
        };
        let addr = u32::from(v4);
        let mut added = 0;
        for provider in mask.iter() {
            let Some(plane) = &self.planes[provider.index()] else {
                continue;
            };
            if let Some(record) = self.record(plane.get(addr), provider) {
                out.add(record, 1)?;
                added += 1;
            }
        }
        Ok(added)
    }
}
