//! Interval tree index for a single provider.
//!
//! An AVL tree of `[start, end]` IPv4 ranges ordered by `(start, end)`, each
//! node augmented with the largest `end` in its subtree so overlap queries can
//! skip subtrees that end before the query starts. Nodes live in an arena and
//! link by index.
//!
//! Every stored range overlapping a query is reported, weighted by the size of
//! the overlap. The first provider to insert owns the instance.

use std::cmp::Ordering;
use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::prefix::{AddressFamily, Prefix};
use crate::provider::{ProviderId, ProviderMask, RecordRef};
use crate::record_set::RecordSet;
use crate::PrefixIndex;

type NodeId = u32;

#[derive(Debug, Clone)]
struct Node {
    start: u32,
    end: u32,
    /// Largest `end` anywhere in this subtree.
    max_end: u32,
    height: u8,
    left: Option<NodeId>,
    right: Option<NodeId>,
    record: RecordRef,
}

/// IPv4-only interval tree locked to one provider.
#[derive(Debug, Default)]
pub struct IntervalIndex {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    provider: Option<ProviderId>,
}

impl IntervalIndex {
    pub const NAME: &'static str = "intervaltree";

    pub fn new() -> IntervalIndex {
        IntervalIndex::default()
    }

    /// The provider this instance is locked to, once anything was inserted.
    pub fn provider(&self) -> Option<ProviderId> {
        self.provider
    }

    /// Number of distinct ranges stored.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Height of the tree; zero when empty.
    pub fn height(&self) -> u8 {
        self.height_of(self.root)
    }

    fn v4_range(prefix: &Prefix) -> Result<(u32, u32)> {
        prefix.v4_range().ok_or(Error::UnsupportedFamily {
            backend: IntervalIndex::NAME,
            family: prefix.family(),
        })
    }

    #[inline]
    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    #[inline]
    fn height_of(&self, id: Option<NodeId>) -> u8 {
        id.map_or(0, |id| self.node(id).height)
    }

    /// Recompute height and `max_end` from the children.
    fn update(&mut self, id: NodeId) {
        let (left, right) = {
            let n = self.node(id);
            (n.left, n.right)
        };
        let height = 1 + self.height_of(left).max(self.height_of(right));
        let mut max_end = self.node(id).end;
        for child in [left, right].into_iter().flatten() {
            max_end = max_end.max(self.node(child).max_end);
        }
        let n = self.node_mut(id);
        n.height = height;
        n.max_end = max_end;
    }

    fn rotate_right(&mut self, id: NodeId) -> NodeId {
        let Some(pivot) = self.node(id).left else {
            return id;
        };
        self.node_mut(id).left = self.node(pivot).right;
        self.node_mut(pivot).right = Some(id);
        self.update(id);
        self.update(pivot);
        pivot
    }

    fn rotate_left(&mut self, id: NodeId) -> NodeId {
        let Some(pivot) = self.node(id).right else {
            return id;
        };
        self.node_mut(id).right = self.node(pivot).left;
        self.node_mut(pivot).left = Some(id);
        self.update(id);
        self.update(pivot);
        pivot
    }

    fn balance_factor(&self, id: NodeId) -> i16 {
        let n = self.node(id);
        i16::from(self.height_of(n.left)) - i16::from(self.height_of(n.right))
    }

    fn rebalance(&mut self, id: NodeId) -> NodeId {
        self.update(id);
        let bf = self.balance_factor(id);
        if bf > 1 {
            if let Some(left) = self.node(id).left {
                if self.balance_factor(left) < 0 {
                    let left = self.rotate_left(left);
                    self.node_mut(id).left = Some(left);
                }
            }
            self.rotate_right(id)
        } else if bf < -1 {
            if let Some(right) = self.node(id).right {
                if self.balance_factor(right) > 0 {
                    let right = self.rotate_right(right);
                    self.node_mut(id).right = Some(right);
                }
            }
            self.rotate_left(id)
        } else {
            id
        }
    }

    /// Insert below `at`, returning the new root of that subtree.
    fn insert_at(&mut self, at: Option<NodeId>, start: u32, end: u32, record: RecordRef) -> NodeId {
        let Some(id) = at else {
            let id = self.nodes.len() as NodeId;
            self.nodes.push(Node {
                start,
                end,
                max_end: end,
                height: 1,
                left: None,
                right: None,
                record,
            });
            return id;
        };

        let (key, left, right) = {
            let n = self.node(id);
            ((n.start, n.end), n.left, n.right)
        };
        match (start, end).cmp(&key) {
            Ordering::Equal => {
                self.node_mut(id).record = record;
                return id;
            }
            Ordering::Less => {
                let left = self.insert_at(left, start, end, record);
                self.node_mut(id).left = Some(left);
            }
            Ordering::Greater => {
                let right = self.insert_at(right, start, end, record);
                self.node_mut(id).right = Some(right);
            }
        }
        self.rebalance(id)
    }

    /// Report every range overlapping `[start, end]`, in ascending order.
    fn collect(&self, at: Option<NodeId>, start: u32, end: u32, out: &mut RecordSet) -> Result<usize> {
        let Some(id) = at else {
            return Ok(0);
        };
        let node = self.node(id);
        if node.max_end < start {
            return Ok(0);
        }
        let mut added = self.collect(node.left, start, end, out)?;
        // Everything to the right starts at or after this node.
        if node.start > end {
            return Ok(added);
        }
        if node.end >= start {
            let overlap = u64::from(node.end.min(end)) - u64::from(node.start.max(start)) + 1;
            out.add(node.record, overlap)?;
            added += 1;
        }
        added += self.collect(node.right, start, end, out)?;
        Ok(added)
    }

    fn query(&self, start: u32, end: u32, mask: ProviderMask, out: &mut RecordSet) -> Result<usize> {
        match self.provider {
            Some(provider) if mask.contains(provider) => self.collect(self.root, start, end, out),
            _ => Ok(0),
        }
    }
}

impl PrefixIndex for IntervalIndex {
    fn name(&self) -> &'static str {
        IntervalIndex::NAME
    }

    fn insert_prefix(&mut self, prefix: &Prefix, record: RecordRef) -> Result<()> {
        let (start, end) = IntervalIndex::v4_range(prefix)?;
        if let Some(locked) = self.provider {
            if locked != record.provider {
                return Err(Error::MultiProviderNotSupported {
                    locked: locked.get(),
                    requested: record.provider.get(),
                });
            }
        }
        if self.nodes.len() >= NodeId::MAX as usize {
            return Err(Error::CapacityExhausted {
                what: "interval node",
            });
        }
        self.nodes
            .try_reserve(1)
            .map_err(Error::alloc("interval nodes"))?;

        let root = self.insert_at(self.root, start, end, record);
        self.root = Some(root);
        self.provider = Some(record.provider);
        Ok(())
    }

    fn lookup_prefix(
        &self,
        prefix: &Prefix,
        mask: ProviderMask,
        out: &mut RecordSet,
    ) -> Result<usize> {
        let (start, end) = IntervalIndex::v4_range(prefix)?;
        self.query(start, end, mask, out)
    }

    fn lookup_address(
        &self,
        addr: IpAddr,
        mask: ProviderMask,
        out: &mut RecordSet,
    ) -> Result<usize> {
        let IpAddr::V4(v4) = addr else {
            return Err(Error::UnsupportedFamily {
                backend: IntervalIndex::NAME,
                family: AddressFamily::V6,
            });
        };
        let addr = u32::from(v4);
        self.query(addr, addr, mask, out)
    }
}
