//! Binary radix (patricia) trie index.
//!
//! One trie per address family. Nodes live in an arena and refer to each
//! other by index; every node carries its key masked to its own length, so
//! internal branch nodes (which hold no records) compare exactly like prefix
//! nodes. A node's provider slot table is attached the first time a record is
//! inserted at exactly that prefix.
//!
//! Point lookups take the longest matching prefix and then walk up through
//! less specific ancestors for providers the best match did not have. Range
//! lookups do the same for the query prefix, then split the query into CIDR
//! halves, depth first, looking for exact prefixes that satisfy the remaining
//! providers.

use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::prefix::{bit_at, mask_bits, AddressFamily, Prefix};
use crate::provider::{ProviderMask, RecordRef, SlotTable, EMPTY_SLOTS};
use crate::record_set::RecordSet;
use crate::PrefixIndex;

type NodeId = u32;
type SlotId = u32;

#[derive(Debug, Clone)]
struct Node {
    /// Key bits, zero beyond `len`.
    key: u128,
    len: u8,
    parent: Option<NodeId>,
    children: [Option<NodeId>; 2],
    /// Present on prefix nodes, absent on branch-only nodes.
    slots: Option<SlotId>,
}

#[derive(Debug)]
struct Trie {
    family: AddressFamily,
    nodes: Vec<Node>,
    slots: Vec<SlotTable>,
    root: Option<NodeId>,
}

impl Trie {
    fn new(family: AddressFamily) -> Trie {
        Trie {
            family,
            nodes: Vec::new(),
            slots: Vec::new(),
            root: None,
        }
    }

    #[inline]
    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    fn insert(&mut self, prefix: &Prefix, record: RecordRef) -> Result<()> {
        // An insert adds at most two nodes and one slot table. Secure the
        // room up front so nothing below can fail halfway through.
        if self.nodes.len() + 2 > NodeId::MAX as usize {
            return Err(Error::CapacityExhausted {
                what: "patricia node",
            });
        }
        if self.slots.len() + 1 > SlotId::MAX as usize {
            return Err(Error::CapacityExhausted {
                what: "patricia slot table",
            });
        }
        self.nodes
            .try_reserve(2)
            .map_err(Error::alloc("patricia nodes"))?;
        self.slots
            .try_reserve(1)
            .map_err(Error::alloc("patricia slot tables"))?;

        let id = self.insert_node(prefix.bits(), prefix.len());
        let slot = match self.node(id).slots {
            Some(slot) => slot,
            None => {
                let slot = self.slots.len() as SlotId;
                self.slots.push(EMPTY_SLOTS);
                self.node_mut(id).slots = Some(slot);
                slot
            }
        };
        self.slots[slot as usize][record.provider.index()] = Some(record);
        Ok(())
    }

    fn push_node(&mut self, key: u128, len: u8, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node {
            key,
            len,
            parent,
            children: [None, None],
            slots: None,
        });
        id
    }

    /// Point whatever referred to `old` (its parent or the root) at `new`.
    fn replace_child(&mut self, parent: Option<NodeId>, old: NodeId, new: NodeId) {
        match parent {
            None => self.root = Some(new),
            Some(p) => {
                let children = &mut self.node_mut(p).children;
                if children[0] == Some(old) {
                    children[0] = Some(new);
                } else {
                    children[1] = Some(new);
                }
            }
        }
    }

    /// Find or create the node for exactly `key/len`.
    fn insert_node(&mut self, key: u128, len: u8) -> NodeId {
        let Some(mut cur) = self.root else {
            let id = self.push_node(key, len, None);
            self.root = Some(id);
            return id;
        };

        loop {
            let (node_key, node_len, node_parent) = {
                let n = self.node(cur);
                (n.key, n.len, n.parent)
            };
            let common = ((key ^ node_key).leading_zeros() as u8)
                .min(len)
                .min(node_len);

            if common == node_len {
                if node_len == len {
                    return cur;
                }
                let side = bit_at(key, node_len);
                match self.node(cur).children[side] {
                    Some(child) => cur = child,
                    None => {
                        let id = self.push_node(key, len, Some(cur));
                        self.node_mut(cur).children[side] = Some(id);
                        return id;
                    }
                }
            } else if common == len {
                // The new prefix sits between `cur` and its parent.
                let id = self.push_node(key, len, node_parent);
                self.node_mut(id).children[bit_at(node_key, len)] = Some(cur);
                self.replace_child(node_parent, cur, id);
                self.node_mut(cur).parent = Some(id);
                return id;
            } else {
                // Paths diverge at `common`: add a branch node with both
                // `cur` and the new prefix beneath it.
                let branch = self.push_node(mask_bits(key, common), common, node_parent);
                let id = self.push_node(key, len, Some(branch));
                {
                    let b = self.node_mut(branch);
                    b.children[bit_at(key, common)] = Some(id);
                    b.children[bit_at(node_key, common)] = Some(cur);
                }
                self.replace_child(node_parent, cur, branch);
                self.node_mut(cur).parent = Some(branch);
                return id;
            }
        }
    }

    /// The shallowest node at depth `len` or deeper inside `bits/len`.
    ///
    /// `None` means nothing at all is stored inside that prefix.
    fn subtree(&self, bits: u128, len: u8) -> Option<NodeId> {
        let mut cur = self.root?;
        loop {
            let node = self.node(cur);
            if node.len >= len {
                return (mask_bits(node.key, len) == bits).then_some(cur);
            }
            if mask_bits(bits, node.len) != node.key {
                return None;
            }
            cur = node.children[bit_at(bits, node.len)]?;
        }
    }

    /// The prefix node for exactly `bits/len`.
    fn search_exact(&self, bits: u128, len: u8) -> Option<NodeId> {
        let id = self.subtree(bits, len)?;
        let node = self.node(id);
        (node.len == len && node.slots.is_some()).then_some(id)
    }

    /// The longest prefix node containing `bits/len`, including itself.
    fn search_best(&self, bits: u128, len: u8) -> Option<NodeId> {
        let mut cur = self.root;
        let mut best = None;
        while let Some(id) = cur {
            let node = self.node(id);
            if node.len > len || mask_bits(bits, node.len) != node.key {
                break;
            }
            if node.slots.is_some() {
                best = Some(id);
            }
            if node.len == len {
                break;
            }
            cur = node.children[bit_at(bits, node.len)];
        }
        best
    }

    /// Add the node's records for providers in `wanted` but not yet `found`.
    fn collect(
        &self,
        id: NodeId,
        wanted: ProviderMask,
        found: &mut ProviderMask,
        ip_count: u64,
        out: &mut RecordSet,
    ) -> Result<usize> {
        let Some(slot) = self.node(id).slots else {
            return Ok(0);
        };
        let table = &self.slots[slot as usize];
        let mut added = 0;
        for provider in wanted.difference(*found).iter() {
            if let Some(record) = table[provider.index()] {
                out.add(record, ip_count)?;
                found.insert(provider);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Collect from `start`, then from each ancestor prefix node in turn.
    fn collect_ascending(
        &self,
        start: NodeId,
        wanted: ProviderMask,
        found: &mut ProviderMask,
        ip_count: u64,
        out: &mut RecordSet,
    ) -> Result<usize> {
        let mut added = 0;
        let mut cur = Some(start);
        while let Some(id) = cur {
            added += self.collect(id, wanted, found, ip_count, out)?;
            if wanted.is_subset_of(*found) {
                break;
            }
            cur = self.node(id).parent;
        }
        Ok(added)
    }

    fn lookup_address(&self, prefix: &Prefix, wanted: ProviderMask, out: &mut RecordSet) -> Result<usize> {
        let mut found = ProviderMask::EMPTY;
        match self.search_best(prefix.bits(), prefix.len()) {
            Some(best) => {
                let ip_count = self.family.span_weight(self.family.weight_bits());
                self.collect_ascending(best, wanted, &mut found, ip_count, out)
            }
            None => Ok(0),
        }
    }

    fn lookup_prefix(&self, prefix: &Prefix, wanted: ProviderMask, out: &mut RecordSet) -> Result<usize> {
        let family = self.family;
        let mut found = ProviderMask::EMPTY;
        let mut added = 0;

        // Anything covering the whole query counts for the whole query; IPv6
        // spans finer than the /64 counting unit still count as one unit.
        if let Some(best) = self.search_best(prefix.bits(), prefix.len()) {
            let ip_count = family.span_weight(prefix.len().min(family.weight_bits()));
            added += self.collect_ascending(best, wanted, &mut found, ip_count, out)?;
        }

        if !wanted.is_subset_of(found) && prefix.len() < family.descend_limit() {
            added += self.descend(prefix, wanted, &mut found, out)?;
        }
        Ok(added)
    }

    /// Depth-first search over the CIDR halves of `prefix` for exact prefix
    /// nodes holding providers not yet found. Halves are never ascended from.
    fn descend(
        &self,
        prefix: &Prefix,
        wanted: ProviderMask,
        found: &mut ProviderMask,
        out: &mut RecordSet,
    ) -> Result<usize> {
        let limit = self.family.descend_limit();
        let mut added = 0;
        for half in 0..2 {
            let Some(sub) = prefix.child(half) else {
                break;
            };
            let Some(top) = self.subtree(sub.bits(), sub.len()) else {
                continue;
            };
            if self.node(top).len == sub.len() {
                let ip_count = self.family.span_weight(sub.len());
                added += self.collect(top, wanted, found, ip_count, out)?;
                if wanted.is_subset_of(*found) {
                    break;
                }
            }
            if sub.len() < limit {
                added += self.descend(&sub, wanted, found, out)?;
                if wanted.is_subset_of(*found) {
                    break;
                }
            }
        }
        Ok(added)
    }
}

/// Patricia trie index over both address families.
#[derive(Debug)]
pub struct PatriciaIndex {
    v4: Trie,
    v6: Trie,
}

impl Default for PatriciaIndex {
    fn default() -> Self {
        PatriciaIndex::new()
    }
}

impl PatriciaIndex {
    pub const NAME: &'static str = "patricia";

    pub fn new() -> PatriciaIndex {
        PatriciaIndex {
            v4: Trie::new(AddressFamily::V4),
            v6: Trie::new(AddressFamily::V6),
        }
    }

    fn trie(&self, family: AddressFamily) -> &Trie {
        match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        }
    }

    /// Number of trie nodes, branch nodes included, for one family.
    pub fn node_count(&self, family: AddressFamily) -> usize {
        self.trie(family).nodes.len()
    }

    /// Number of distinct prefixes holding records, for one family.
    pub fn prefix_count(&self, family: AddressFamily) -> usize {
        self.trie(family).slots.len()
    }

    /// True if a record is stored under exactly `prefix` for any provider.
    pub fn contains_exact(&self, prefix: &Prefix) -> bool {
        self.trie(prefix.family())
            .search_exact(prefix.bits(), prefix.len())
            .is_some()
    }
}

impl PrefixIndex for PatriciaIndex {
    fn name(&self) -> &'static str {
        PatriciaIndex::NAME
    }

    fn insert_prefix(&mut self, prefix: &Prefix, record: RecordRef) -> Result<()> {
        match prefix.family() {
            AddressFamily::V4 => self.v4.insert(prefix, record),
            AddressFamily::V6 => self.v6.insert(prefix, record),
        }
    }

    fn lookup_prefix(
        &self,
        prefix: &Prefix,
        mask: ProviderMask,
        out: &mut RecordSet,
    ) -> Result<usize> {
        if mask.is_empty() {
            return Ok(0);
        }
        self.trie(prefix.family()).lookup_prefix(prefix, mask, out)
    }

    fn lookup_address(
        &self,
        addr: IpAddr,
        mask: ProviderMask,
        out: &mut RecordSet,
    ) -> Result<usize> {
        if mask.is_empty() {
            return Ok(0);
        }
        let prefix = Prefix::host(addr);
        self.trie(prefix.family()).lookup_address(&prefix, mask, out)
    }
}
