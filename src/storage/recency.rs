//! Arena-Backed Recency List
//!
//! Keeps the keys of a shard ordered from most recently used (front) to
//! least recently used (back). Nodes live in a `Vec` and link to each other
//! by index, so the shard's hash index can hold a plain [`NodeId`] instead of
//! a pointer into the list.
//!
//! ```text
//!   front (MRU)                                   back (LRU)
//!   ┌────────┐  next  ┌────────┐  next  ┌────────┐
//!   │ slot 3 │ ─────> │ slot 0 │ ─────> │ slot 5 │ ──> eviction victim
//!   │  "c"   │ <───── │  "a"   │ <───── │  "b"   │
//!   └────────┘  prev  └────────┘  prev  └────────┘
//! ```
//!
//! Freed slots go onto a free list and are reused by the next insert, so the
//! arena never grows beyond the peak number of live keys.
//!
//! Every operation is O(1) except iteration.

use bytes::Bytes;

/// Stable handle to a node in a [`RecencyList`].
///
/// A handle stays valid until the node is removed; after that the slot may
/// be handed out again for a different key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
struct Node {
    key: Bytes,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

/// Doubly-linked recency order over an index-addressed arena.
#[derive(Debug, Default)]
pub struct RecencyList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl RecencyList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of linked keys.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `key` as the most recently used entry and returns its handle.
    pub fn push_front(&mut self, key: Bytes) -> NodeId {
        let node = Node {
            key,
            prev: None,
            next: self.head,
        };

        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                NodeId(slot)
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        };

        match self.head {
            Some(old_head) => self.nodes[old_head.0].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
        id
    }

    /// Promotes the node to the front.
    pub fn move_to_front(&mut self, id: NodeId) {
        if self.head == Some(id) {
            return;
        }
        self.unlink(id);

        let node = &mut self.nodes[id.0];
        node.prev = None;
        node.next = self.head;
        if let Some(old_head) = self.head {
            self.nodes[old_head.0].prev = Some(id);
        }
        self.head = Some(id);
        if self.tail.is_none() {
            self.tail = Some(id);
        }
    }

    /// Unlinks the node, frees its slot and returns its key.
    pub fn remove(&mut self, id: NodeId) -> Bytes {
        self.unlink(id);
        self.len -= 1;
        self.free.push(id.0);

        let node = &mut self.nodes[id.0];
        node.prev = None;
        node.next = None;
        std::mem::take(&mut node.key)
    }

    /// Removes and returns the least recently used key.
    pub fn pop_back(&mut self) -> Option<Bytes> {
        self.tail.map(|id| self.remove(id))
    }

    /// Returns the least recently used key without removing it.
    pub fn peek_back(&self) -> Option<&Bytes> {
        self.tail.map(|id| &self.nodes[id.0].key)
    }

    /// Returns the most recently used key.
    pub fn peek_front(&self) -> Option<&Bytes> {
        self.head.map(|id| &self.nodes[id.0].key)
    }

    /// Drops every node and releases the arena.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Iterates keys from most to least recently used.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
            forward: true,
        }
    }

    /// Iterates keys from least to most recently used.
    pub fn iter_lru(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.tail,
            forward: false,
        }
    }

    /// Detaches a node from its neighbours and fixes head/tail.
    /// Does not touch `len` or the free list.
    fn unlink(&mut self, id: NodeId) {
        let (prev, next) = {
            let node = &self.nodes[id.0];
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.nodes[p.0].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n.0].prev = prev,
            None => self.tail = prev,
        }
    }
}

/// Iterator over the keys of a [`RecencyList`].
pub struct Iter<'a> {
    list: &'a RecencyList,
    cursor: Option<NodeId>,
    forward: bool,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = &self.list.nodes[id.0];
        self.cursor = if self.forward { node.next } else { node.prev };
        Some(&node.key)
    }
}
