//! Per-lookup result buffer.

use crate::error::{Error, Result};
use crate::provider::RecordRef;

/// One lookup result: a record and the number of addresses it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMatch {
    pub record: RecordRef,
    pub ip_count: u64,
}

/// A reusable accumulator of lookup results.
///
/// Entries keep discovery order and are not deduplicated. Clearing keeps the
/// allocation, so one set can serve many lookups. Storage grows to the next
/// power of two when an append does not fit.
#[derive(Debug, Default, Clone)]
pub struct RecordSet {
    entries: Vec<RecordMatch>,
    cursor: usize,
}

impl RecordSet {
    pub fn new() -> RecordSet {
        RecordSet::default()
    }

    pub fn with_capacity(capacity: usize) -> RecordSet {
        RecordSet {
            entries: Vec::with_capacity(capacity),
            cursor: 0,
        }
    }

    /// Append a record with its address count.
    pub fn add(&mut self, record: RecordRef, ip_count: u64) -> Result<()> {
        if self.entries.len() == self.entries.capacity() {
            let wanted = (self.entries.len() + 1)
                .checked_next_power_of_two()
                .ok_or(Error::AllocationFailure { what: "record set" })?;
            self.entries
                .try_reserve_exact(wanted - self.entries.len())
                .map_err(Error::alloc("record set"))?;
        }
        self.entries.push(RecordMatch { record, ip_count });
        Ok(())
    }

    /// Drop all entries and rewind, keeping the allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Return the entry under the cursor and advance it.
    pub fn next_record(&mut self) -> Option<RecordMatch> {
        let entry = self.entries.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(entry)
    }

    /// Move the cursor back to the first entry.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordMatch> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[RecordMatch] {
        &self.entries
    }

    /// Sum of address counts over all entries.
    pub fn total_ip_count(&self) -> u64 {
        self.entries
            .iter()
            .fold(0u64, |acc, m| acc.saturating_add(m.ip_count))
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a RecordMatch;
    type IntoIter = std::slice::Iter<'a, RecordMatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderId;
    use proptest::prelude::*;

    fn rec(id: u32) -> RecordRef {
        RecordRef::new(ProviderId::new(1).unwrap(), id)
    }

    #[test]
    fn grows_by_powers_of_two() {
        let mut set = RecordSet::new();
        for i in 0..5 {
            set.add(rec(i), 1).unwrap();
        }
        assert_eq!(set.len(), 5);
        assert_eq!(set.capacity(), 8);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut set = RecordSet::new();
        for i in 0..20 {
            set.add(rec(i), 1).unwrap();
        }
        let cap = set.capacity();
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.capacity(), cap);
        assert_eq!(set.next_record(), None);
    }

    #[test]
    fn cursor_and_rewind() {
        let mut set = RecordSet::new();
        set.add(rec(1), 10).unwrap();
        set.add(rec(1), 20).unwrap();
        assert_eq!(set.next_record().map(|m| m.ip_count), Some(10));
        assert_eq!(set.next_record().map(|m| m.ip_count), Some(20));
        assert_eq!(set.next_record(), None);
        set.rewind();
        assert_eq!(set.next_record().map(|m| m.ip_count), Some(10));
        assert_eq!(set.total_ip_count(), 30);
    }

    proptest! {
        #[test]
        fn clear_then_add_yields_insertion_order(
            warmup in 0usize..300,
            counts in proptest::collection::vec(any::<u64>(), 0..300),
        ) {
            let mut set = RecordSet::new();
            for i in 0..warmup {
                set.add(rec(i as u32), 1).unwrap();
            }
            set.clear();
            for (i, count) in counts.iter().enumerate() {
                set.add(rec(i as u32), *count).unwrap();
            }
            let mut seen = Vec::new();
            while let Some(m) = set.next_record() {
                seen.push((m.record.id, m.ip_count));
            }
            let expected: Vec<_> = counts.iter().enumerate().map(|(i, c)| (i as u32, *c)).collect();
            prop_assert_eq!(seen, expected);
        }
    }
}
