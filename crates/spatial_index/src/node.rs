//! Node storage (C4, §4.5): key → node, plus a bounded FIFO node
//! pool for reuse across insert/remove churn.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::hash::Hash;

use bitflags::bitflags;
use hashbrown::HashMap;

bitflags! {
    /// Bit `i` set iff a child exists at octant/tet-child `i`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChildMask: u8 {
        const C0 = 1 << 0;
        const C1 = 1 << 1;
        const C2 = 1 << 2;
        const C3 = 1 << 3;
        const C4 = 1 << 4;
        const C5 = 1 << 5;
        const C6 = 1 << 6;
        const C7 = 1 << 7;
    }
}

impl ChildMask {
    pub fn bit(index: u8) -> Self {
        Self::from_bits_truncate(1 << (index & 0x7))
    }

    pub fn has(&self, index: u8) -> bool {
        self.contains(Self::bit(index))
    }

    pub fn set(&mut self, index: u8) {
        self.insert(Self::bit(index));
    }

    pub fn clear_bit(&mut self, index: u8) {
        self.remove(Self::bit(index));
    }
}

/// A single occupied cell: the entities stored there, in insertion
/// order with duplicates forbidden, plus the child presence mask.
#[derive(Debug, Clone, Default)]
pub struct Node<Id> {
    entity_ids: Vec<Id>,
    children_mask: ChildMask,
    subdivision_candidate: bool,
}

impl<Id: Eq> Node<Id> {
    pub fn new() -> Self {
        Self {
            entity_ids: Vec::new(),
            children_mask: ChildMask::empty(),
            subdivision_candidate: false,
        }
    }

    fn reset(&mut self) {
        self.entity_ids.clear();
        self.children_mask = ChildMask::empty();
        self.subdivision_candidate = false;
    }

    /// Whether the node is marked for deferred subdivision (I5a).
    pub fn is_subdivision_candidate(&self) -> bool {
        self.subdivision_candidate
    }

    pub(crate) fn mark_subdivision_candidate(&mut self) {
        self.subdivision_candidate = true;
    }

    pub(crate) fn clear_subdivision_candidate(&mut self) {
        self.subdivision_candidate = false;
    }

    /// Returns `true` iff the node now exceeds `max_entities_per_node`.
    pub fn add_entity(&mut self, id: Id, max_entities_per_node: u32) -> bool {
        if !self.entity_ids.contains(&id) {
            self.entity_ids.push(id);
        }
        self.entity_ids.len() as u32 > max_entities_per_node
    }

    pub fn remove_entity(&mut self, id: &Id) -> bool {
        if let Some(pos) = self.entity_ids.iter().position(|e| e == id) {
            self.entity_ids.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn entity_ids(&self) -> &[Id] {
        &self.entity_ids
    }

    pub fn entity_count(&self) -> usize {
        self.entity_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_ids.is_empty() && self.children_mask.is_empty()
    }

    pub fn children_mask(&self) -> ChildMask {
        self.children_mask
    }

    pub fn set_child_bit(&mut self, index: u8) {
        self.children_mask.set(index);
    }

    pub fn clear_child_bit(&mut self, index: u8) {
        self.children_mask.clear_bit(index);
    }

    pub fn has_child(&self, index: u8) -> bool {
        self.children_mask.has(index)
    }
}

/// A bounded FIFO pool recycling [`Node`] allocations. `acquire`
/// pops a reset node or allocates a fresh one; `release` pushes back
/// onto the pool, dropping the node once `max_size` is reached.
#[derive(Debug)]
pub struct NodePool<Id> {
    free: VecDeque<Node<Id>>,
    max_size: usize,
    growth_factor: f32,
}

impl<Id: Eq> NodePool<Id> {
    pub fn new(initial_size: usize, max_size: usize, growth_factor: f32) -> Self {
        let mut free = VecDeque::with_capacity(initial_size.min(max_size));
        for _ in 0..initial_size.min(max_size) {
            free.push_back(Node::new());
        }
        Self {
            free,
            max_size,
            growth_factor,
        }
    }

    pub fn acquire(&mut self) -> Node<Id> {
        self.free.pop_front().unwrap_or_else(Node::new)
    }

    /// Pushes `node` back onto the pool. Under sustained churn (the
    /// free list already at `max_size`), grows the cap by
    /// `growth_factor` instead of dropping the node; a factor `<= 1.0`
    /// preserves the old drop-on-full behavior.
    pub fn release(&mut self, mut node: Node<Id>) {
        if self.free.len() >= self.max_size {
            if self.growth_factor <= 1.0 {
                return;
            }
            self.max_size = ((self.max_size.max(1) as f32) * self.growth_factor).ceil() as usize;
        }
        node.reset();
        self.free.push_back(node);
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

/// Maps keys to nodes, with an ordered index alongside the hash map
/// to support O(1) membership and ordered range scans (§4.5).
#[derive(Debug)]
pub struct NodeStore<K, Id> {
    nodes: HashMap<K, Node<Id>>,
    ordered_keys: BTreeSet<K>,
    /// Keys currently marked for deferred subdivision (I5a), tracked
    /// separately from `nodes` so the bulk finalize phase (§4.8) can
    /// find them without scanning every live cell.
    candidates: HashSet<K>,
}

impl<K, Id> NodeStore<K, Id>
where
    K: Ord + Hash + Eq + Clone,
    Id: Eq,
{
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            ordered_keys: BTreeSet::new(),
            candidates: HashSet::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&Node<Id>> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut Node<Id>> {
        self.nodes.get_mut(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.nodes.contains_key(key)
    }

    /// Returns the node at `key`, creating an empty one (drawn from
    /// `pool` if given) if absent.
    pub fn get_or_create(&mut self, key: &K, pool: Option<&mut NodePool<Id>>) -> &mut Node<Id> {
        if !self.nodes.contains_key(key) {
            let node = pool.map(|p| p.acquire()).unwrap_or_else(Node::new);
            self.nodes.insert(key.clone(), node);
            self.ordered_keys.insert(key.clone());
        }
        self.nodes.get_mut(key).expect("just inserted")
    }

    /// Removes the node at `key` if it is empty and childless,
    /// optionally returning it to `pool`. No-op otherwise.
    pub fn prune_if_empty(&mut self, key: &K, pool: Option<&mut NodePool<Id>>) {
        let should_remove = self.nodes.get(key).is_some_and(Node::is_empty);
        if should_remove {
            if let Some(node) = self.nodes.remove(key) {
                self.ordered_keys.remove(key);
                self.candidates.remove(key);
                if let Some(pool) = pool {
                    pool.release(node);
                }
            }
        }
    }

    /// Marks `key` as a deferred-subdivision candidate (I5a). No-op
    /// if the node doesn't exist.
    pub fn mark_candidate(&mut self, key: &K) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.mark_subdivision_candidate();
            self.candidates.insert(key.clone());
        }
    }

    /// Clears `key`'s candidate marking, e.g. once subdivision has
    /// been attempted (I5b) or the node has shrunk back under the
    /// entity-count threshold.
    pub fn unmark_candidate(&mut self, key: &K) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.clear_subdivision_candidate();
        }
        self.candidates.remove(key);
    }

    /// Candidate keys in priority order for the bulk finalize phase
    /// (§4.8): largest `entity_count` first.
    pub fn candidates_sorted_by_entity_count(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.candidates.iter().cloned().collect();
        keys.sort_by_key(|k| std::cmp::Reverse(self.nodes.get(k).map_or(0, Node::entity_count)));
        keys
    }

    /// Ordered iteration over all live keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.ordered_keys.iter()
    }

    /// Keys in `[lo, hi]`, inclusive, in ascending SFC order.
    pub fn range(&self, lo: &K, hi: &K) -> impl Iterator<Item = &K> {
        self.ordered_keys.range(lo.clone()..=hi.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Node<Id>)> {
        self.ordered_keys
            .iter()
            .filter_map(move |k| self.nodes.get(k).map(|n| (k, n)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<K, Id> Default for NodeStore<K, Id>
where
    K: Ord + Hash + Eq + Clone,
    Id: Eq,
{
    fn default() -> Self {
        Self::new()
    }
}
