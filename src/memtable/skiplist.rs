use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::comparator::Comparator;
use crate::key::{parse_internal_key, InternalKeyComparator};

/// Maximum height of the skip list. LevelDB uses 12.
pub const MAX_HEIGHT: usize = 12;

/// Each level is populated with probability 1/BRANCHING.
const BRANCHING: u32 = 4;

/// Index of the sentinel head node.
const HEAD: usize = 0;

/// A single node. `next[l]` is the index of the following node on level `l`.
///
/// ```text
/// Level 2:  HEAD ──────────► 20 ────────────────► 50 ──────────► NIL
/// Level 1:  HEAD ──► 10 ──► 20 ────► 35 ────────► 50 ──► 60 ──► NIL
/// Level 0:  HEAD ──► 10 ──► 20 ──► 25 ──► 35 ──► 50 ──► 60 ──► 70 ► NIL
/// ```
struct Node {
    key: Vec<u8>,
    value: Vec<u8>,
    next: Vec<Option<usize>>,
}

/// Arena skip list keyed by encoded internal keys.
///
/// Nodes live in a `Vec` and link by index, so there is no unsafe code and
/// indices handed out to iterators never dangle.
pub struct SkipList {
    nodes: Vec<Node>,
    height: usize,
    cmp: InternalKeyComparator,
    rng: StdRng,
    size_bytes: usize,
}

impl SkipList {
    pub fn new(cmp: InternalKeyComparator) -> Self {
        let head = Node {
            key: Vec::new(),
            value: Vec::new(),
            next: vec![None; MAX_HEIGHT],
        };
        Self {
            nodes: vec![head],
            height: 1,
            cmp,
            rng: StdRng::seed_from_u64(0xdead_beef),
            size_bytes: 0,
        }
    }

    /// Insert `key`, or overwrite the entry for the same user key and
    /// sequence. Such an entry can only differ in its type byte, so it sits
    /// directly beside `key` and overwriting it in place keeps the order.
    /// Returns true when a new node was created.
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) -> bool {
        let mut prev = [HEAD; MAX_HEIGHT];
        let found = self.find_greater_or_equal(&key, Some(&mut prev));
        let before = (prev[0] != HEAD).then_some(prev[0]);
        for candidate in [found, before].into_iter().flatten() {
            if self.same_user_key_and_sequence(&self.nodes[candidate].key, &key) {
                let node = &mut self.nodes[candidate];
                self.size_bytes = self.size_bytes - node.key.len() - node.value.len() + key.len() + value.len();
                node.key = key;
                node.value = value;
                return false;
            }
        }

        let height = self.random_height();
        if height > self.height {
            // prev[] already holds HEAD for the new levels
            self.height = height;
        }

        let index = self.nodes.len();
        let next = (0..height).map(|level| self.nodes[prev[level]].next[level]).collect();
        self.size_bytes += key.len() + value.len() + height * std::mem::size_of::<usize>();
        self.nodes.push(Node { key, value, next });

        for (level, &p) in prev.iter().enumerate().take(height) {
            self.nodes[p].next[level] = Some(index);
        }
        true
    }

    fn same_user_key_and_sequence(&self, a: &[u8], b: &[u8]) -> bool {
        match (parse_internal_key(a), parse_internal_key(b)) {
            (Some(x), Some(y)) => {
                x.sequence == y.sequence && self.cmp.compare_user(x.user_key, y.user_key) == Ordering::Equal
            }
            _ => false,
        }
    }

    /// First node whose key is `>= key`. Fills `prev` with the last node
    /// before it on every level.
    pub fn find_greater_or_equal(
        &self,
        key: &[u8],
        mut prev: Option<&mut [usize; MAX_HEIGHT]>,
    ) -> Option<usize> {
        let mut x = HEAD;
        let mut level = self.height - 1;
        loop {
            let next = self.nodes[x].next[level];
            match next {
                Some(n) if self.cmp.compare(&self.nodes[n].key, key) == Ordering::Less => x = n,
                _ => {
                    if let Some(p) = prev.as_deref_mut() {
                        p[level] = x;
                    }
                    if level == 0 {
                        return next;
                    }
                    level -= 1;
                }
            }
        }
    }

    /// Last node whose key is `< key`, if any.
    pub fn find_less_than(&self, key: &[u8]) -> Option<usize> {
        let mut x = HEAD;
        let mut level = self.height - 1;
        loop {
            match self.nodes[x].next[level] {
                Some(n) if self.cmp.compare(&self.nodes[n].key, key) == Ordering::Less => x = n,
                _ => {
                    if level == 0 {
                        return (x != HEAD).then_some(x);
                    }
                    level -= 1;
                }
            }
        }
    }

    /// Last node in the list, if any.
    pub fn find_last(&self) -> Option<usize> {
        let mut x = HEAD;
        let mut level = self.height - 1;
        loop {
            match self.nodes[x].next[level] {
                Some(n) => x = n,
                None => {
                    if level == 0 {
                        return (x != HEAD).then_some(x);
                    }
                    level -= 1;
                }
            }
        }
    }

    pub fn first(&self) -> Option<usize> {
        self.nodes[HEAD].next[0]
    }

    pub fn next(&self, node: usize) -> Option<usize> {
        self.nodes[node].next[0]
    }

    pub fn key(&self, node: usize) -> &[u8] {
        &self.nodes[node].key
    }

    pub fn value(&self, node: usize) -> &[u8] {
        &self.nodes[node].value
    }

    /// Number of entries (the head sentinel excluded)
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate memory held by keys, values and links
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.rng.gen_range(0..BRANCHING) == 0 {
            height += 1;
        }
        height
    }
}
