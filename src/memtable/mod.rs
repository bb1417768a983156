//! # Memtable Module
//!
//! The in-memory ordered buffer of recent writes, backed by an immutable,
//! path-copying red-black tree.
//!
//! ## Design Invariants
//!
//! - Every write produces a fresh root; untouched subtrees are shared
//!   between roots through reference counting.
//! - A root captured by a reader remains a valid, fully consistent
//!   snapshot for as long as the reader holds it, regardless of later
//!   writes or flushes.
//! - Deletions are writes of the tombstone sentinel; the key stays
//!   resident so it can mask older values in deeper layers.
//! - Writers are serialized by the caller; readers never block writers
//!   beyond the brief root swap.
//!
//! ## Node Shapes
//!
//! Nodes come in four variants — red/black crossed with leaf/branch —
//! and rebalance on insertion with the classic rotation cases on a red
//! parent (`balance_left` / `balance_right`), finishing with a `blacken`
//! of the returned root.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

mod iterator;

pub use iterator::MemtableIterator;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

use tracing::trace;

use crate::comparator::compare;
use crate::error::StoreError;
use crate::iterator::{HexKey, Pair, TOMBSTONE};

// ------------------------------------------------------------------------------------------------
// Persistent red-black tree nodes
// ------------------------------------------------------------------------------------------------

/// A node of the persistent tree. Leaves carry no children; branches
/// carry up to two.
pub(crate) enum Node {
    BlackLeaf {
        pair: Pair,
    },
    BlackBranch {
        pair: Pair,
        left: Option<Arc<Node>>,
        right: Option<Arc<Node>>,
    },
    RedLeaf {
        pair: Pair,
    },
    RedBranch {
        pair: Pair,
        left: Option<Arc<Node>>,
        right: Option<Arc<Node>>,
    },
}

fn make_black(pair: Pair, left: Option<Arc<Node>>, right: Option<Arc<Node>>) -> Arc<Node> {
    match (left, right) {
        (None, None) => Arc::new(Node::BlackLeaf { pair }),
        (left, right) => Arc::new(Node::BlackBranch { pair, left, right }),
    }
}

fn make_red(pair: Pair, left: Option<Arc<Node>>, right: Option<Arc<Node>>) -> Arc<Node> {
    match (left, right) {
        (None, None) => Arc::new(Node::RedLeaf { pair }),
        (left, right) => Arc::new(Node::RedBranch { pair, left, right }),
    }
}

impl Node {
    pub(crate) fn pair(&self) -> &Pair {
        match self {
            Node::BlackLeaf { pair }
            | Node::BlackBranch { pair, .. }
            | Node::RedLeaf { pair }
            | Node::RedBranch { pair, .. } => pair,
        }
    }

    pub(crate) fn left(&self) -> Option<&Arc<Node>> {
        match self {
            Node::BlackBranch { left, .. } | Node::RedBranch { left, .. } => left.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn right(&self) -> Option<&Arc<Node>> {
        match self {
            Node::BlackBranch { right, .. } | Node::RedBranch { right, .. } => right.as_ref(),
            _ => None,
        }
    }

    fn is_red(&self) -> bool {
        matches!(self, Node::RedLeaf { .. } | Node::RedBranch { .. })
    }

    /// Attaches a freshly built left subtree below this node, rebalancing
    /// through the subtree root.
    fn add_left(self: &Arc<Self>, left: Arc<Node>) -> Arc<Node> {
        match self.as_ref() {
            Node::BlackLeaf { .. } | Node::BlackBranch { .. } => left.balance_left(self),
            Node::RedLeaf { pair } => make_red(pair.clone(), Some(left), None),
            Node::RedBranch { pair, right, .. } => make_red(pair.clone(), Some(left), right.clone()),
        }
    }

    /// Attaches a freshly built right subtree below this node, rebalancing
    /// through the subtree root.
    fn add_right(self: &Arc<Self>, right: Arc<Node>) -> Arc<Node> {
        match self.as_ref() {
            Node::BlackLeaf { .. } | Node::BlackBranch { .. } => right.balance_right(self),
            Node::RedLeaf { pair } => make_red(pair.clone(), None, Some(right)),
            Node::RedBranch { pair, left, .. } => make_red(pair.clone(), left.clone(), Some(right)),
        }
    }

    /// Rebalances with `self` as the incoming left child of `parent`,
    /// resolving the left-leaning red-red rotation cases.
    fn balance_left(self: &Arc<Self>, parent: &Arc<Node>) -> Arc<Node> {
        if let Node::RedBranch { pair, left, right } = self.as_ref() {
            if let Some(red_left) = left.as_ref().filter(|node| node.is_red()) {
                let rotated = make_black(
                    parent.pair().clone(),
                    right.clone(),
                    parent.right().cloned(),
                );
                return make_red(pair.clone(), Some(red_left.blacken()), Some(rotated));
            }
            if let Some(red_right) = right.as_ref().filter(|node| node.is_red()) {
                let new_left = make_black(pair.clone(), left.clone(), red_right.left().cloned());
                let new_right = make_black(
                    parent.pair().clone(),
                    red_right.right().cloned(),
                    parent.right().cloned(),
                );
                return make_red(red_right.pair().clone(), Some(new_left), Some(new_right));
            }
        }
        make_black(
            parent.pair().clone(),
            Some(self.clone()),
            parent.right().cloned(),
        )
    }

    /// Mirror image of [`Node::balance_left`] for the right side.
    fn balance_right(self: &Arc<Self>, parent: &Arc<Node>) -> Arc<Node> {
        if let Node::RedBranch { pair, left, right } = self.as_ref() {
            if let Some(red_right) = right.as_ref().filter(|node| node.is_red()) {
                let rotated =
                    make_black(parent.pair().clone(), parent.left().cloned(), left.clone());
                return make_red(pair.clone(), Some(rotated), Some(red_right.blacken()));
            }
            if let Some(red_left) = left.as_ref().filter(|node| node.is_red()) {
                let new_left = make_black(
                    parent.pair().clone(),
                    parent.left().cloned(),
                    red_left.left().cloned(),
                );
                let new_right = make_black(pair.clone(), red_left.right().cloned(), right.clone());
                return make_red(red_left.pair().clone(), Some(new_left), Some(new_right));
            }
        }
        make_black(
            parent.pair().clone(),
            parent.left().cloned(),
            Some(self.clone()),
        )
    }

    /// Returns the black form of this node, sharing its children.
    pub(crate) fn blacken(self: &Arc<Self>) -> Arc<Node> {
        match self.as_ref() {
            Node::BlackLeaf { .. } | Node::BlackBranch { .. } => Arc::clone(self),
            Node::RedLeaf { pair } => Arc::new(Node::BlackLeaf { pair: pair.clone() }),
            Node::RedBranch { pair, left, right } => Arc::new(Node::BlackBranch {
                pair: pair.clone(),
                left: left.clone(),
                right: right.clone(),
            }),
        }
    }

    /// Returns the red form of a black node, sharing its children.
    ///
    /// # Panics
    ///
    /// Reddening a red node violates the rebalancing invariants and fails
    /// fast.
    pub(crate) fn redden(self: &Arc<Self>) -> Arc<Node> {
        match self.as_ref() {
            Node::BlackLeaf { pair } => Arc::new(Node::RedLeaf { pair: pair.clone() }),
            Node::BlackBranch { pair, left, right } => Arc::new(Node::RedBranch {
                pair: pair.clone(),
                left: left.clone(),
                right: right.clone(),
            }),
            Node::RedLeaf { .. } | Node::RedBranch { .. } => panic!("cannot redden a red node"),
        }
    }

    /// Rebuilds this node with a new pair and children, keeping its color.
    fn replace(&self, pair: Pair, left: Option<Arc<Node>>, right: Option<Arc<Node>>) -> Arc<Node> {
        match self {
            Node::BlackLeaf { .. } | Node::BlackBranch { .. } => make_black(pair, left, right),
            Node::RedLeaf { .. } | Node::RedBranch { .. } => make_red(pair, left, right),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Insertion
// ------------------------------------------------------------------------------------------------

enum AddOutcome {
    /// A new subtree containing the inserted key.
    Inserted(Arc<Node>),
    /// The key already exists; carries the matched node.
    Existed(Arc<Node>),
}

fn add_node(root: &Arc<Node>, key: &[u8], value: &[u8]) -> AddOutcome {
    match compare(key, &root.pair().key) {
        Ordering::Equal => AddOutcome::Existed(Arc::clone(root)),
        Ordering::Less => match root.left() {
            None => {
                let leaf = Arc::new(Node::RedLeaf {
                    pair: Pair::new(key.to_vec(), value.to_vec()),
                });
                AddOutcome::Inserted(root.add_left(leaf))
            }
            Some(left) => match add_node(left, key, value) {
                AddOutcome::Existed(node) => AddOutcome::Existed(node),
                AddOutcome::Inserted(node) => AddOutcome::Inserted(root.add_left(node)),
            },
        },
        Ordering::Greater => match root.right() {
            None => {
                let leaf = Arc::new(Node::RedLeaf {
                    pair: Pair::new(key.to_vec(), value.to_vec()),
                });
                AddOutcome::Inserted(root.add_right(leaf))
            }
            Some(right) => match add_node(right, key, value) {
                AddOutcome::Existed(node) => AddOutcome::Existed(node),
                AddOutcome::Inserted(node) => AddOutcome::Inserted(root.add_right(node)),
            },
        },
    }
}

/// Path-copies the descent to `key`, replacing only the matched node's
/// value. Interior nodes keep their own pairs; shape and colors are
/// untouched, so no rebalancing is needed.
fn replace_node(root: &Arc<Node>, key: &[u8], value: &[u8]) -> Arc<Node> {
    match compare(key, &root.pair().key) {
        Ordering::Equal => root.replace(
            Pair::new(key.to_vec(), value.to_vec()),
            root.left().cloned(),
            root.right().cloned(),
        ),
        Ordering::Less => {
            let left = root.left().map(|left| replace_node(left, key, value));
            root.replace(root.pair().clone(), left, root.right().cloned())
        }
        Ordering::Greater => {
            let right = root.right().map(|right| replace_node(right, key, value));
            root.replace(root.pair().clone(), root.left().cloned(), right)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Memtable
// ------------------------------------------------------------------------------------------------

/// A snapshot of the tree plus its aggregate counters.
#[derive(Clone, Default)]
pub(crate) struct SortedMap {
    pub(crate) root: Option<Arc<Node>>,
    count: i64,
    bytes: i64,
}

/// Result of a point lookup against a memtable.
#[derive(Debug, PartialEq, Eq)]
pub enum MemtableGet {
    /// The key's latest value.
    Found(Vec<u8>),
    /// The key was deleted; masks any older value in deeper layers.
    Tombstone,
    /// The key is not present in this memtable.
    NotFound,
}

/// The in-memory ordered write buffer.
///
/// Reads capture the current root under a brief lock and then walk it
/// lock-free; writers install a new root per write.
pub struct Memtable {
    map: RwLock<SortedMap>,
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

impl Memtable {
    /// Creates an empty memtable.
    pub fn new() -> Self {
        Self {
            map: RwLock::new(SortedMap::default()),
        }
    }

    /// Returns the value stored for `key`, distinguishing a deletion
    /// marker from true absence so the engine can stop probing deeper
    /// layers on a tombstone hit.
    pub fn get(&self, key: &[u8]) -> Result<MemtableGet, StoreError> {
        let mut node = self.snapshot()?.root;
        while let Some(current) = node {
            match compare(key, &current.pair().key) {
                Ordering::Equal => {
                    return Ok(if current.pair().value == TOMBSTONE {
                        MemtableGet::Tombstone
                    } else {
                        MemtableGet::Found(current.pair().value.clone())
                    });
                }
                Ordering::Less => node = current.left().cloned(),
                Ordering::Greater => node = current.right().cloned(),
            }
        }
        Ok(MemtableGet::NotFound)
    }

    /// Writes a pair, installing a fresh root.
    ///
    /// Overwriting a key with a different value keeps the pair count and
    /// adjusts the byte total by the value-length delta. Overwriting with
    /// an unchanged value still counts as a write: the pair count grows
    /// and the byte total is extended by the full record size.
    pub fn write(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        trace!(key = %HexKey(&key), value_len = value.len(), "memtable write");

        let mut map = self
            .map
            .write()
            .map_err(|_| StoreError::Internal("memtable lock poisoned".into()))?;
        let record_bytes = (key.len() + value.len()) as i64;

        let Some(root) = map.root.clone() else {
            *map = SortedMap {
                root: Some(Arc::new(Node::RedLeaf {
                    pair: Pair::new(key, value),
                })),
                count: 1,
                bytes: record_bytes,
            };
            return Ok(());
        };

        let (count, bytes) = (map.count, map.bytes);
        match add_node(&root, &key, &value) {
            AddOutcome::Existed(node) => {
                let new_root = replace_node(&root, &key, &value);
                if node.pair().value != value {
                    let delta = value.len() as i64 - node.pair().value.len() as i64;
                    *map = SortedMap {
                        root: Some(new_root),
                        count,
                        bytes: bytes + delta,
                    };
                } else {
                    *map = SortedMap {
                        root: Some(new_root),
                        count: count + 1,
                        bytes: bytes + record_bytes,
                    };
                }
            }
            AddOutcome::Inserted(node) => {
                *map = SortedMap {
                    root: Some(node.blacken()),
                    count: count + 1,
                    bytes: bytes + record_bytes,
                };
            }
        }
        Ok(())
    }

    /// Total bytes of keys and values accepted by this memtable.
    pub fn bytes(&self) -> Result<i64, StoreError> {
        Ok(self.snapshot()?.bytes)
    }

    /// Number of accepted writes (see [`Memtable::write`] for the
    /// overwrite accounting).
    pub fn count(&self) -> Result<i64, StoreError> {
        Ok(self.snapshot()?.count)
    }

    /// Lazy in-order cursor over `[start, end]`, both bounds inclusive.
    pub fn iterator(&self, start: &[u8], end: &[u8]) -> Result<MemtableIterator, StoreError> {
        Ok(MemtableIterator::bounded(&self.snapshot()?, start, end))
    }

    /// Lazy in-order cursor over the whole memtable.
    pub fn unbounded_iterator(&self) -> Result<MemtableIterator, StoreError> {
        Ok(MemtableIterator::unbounded(&self.snapshot()?))
    }

    pub(crate) fn snapshot(&self) -> Result<SortedMap, StoreError> {
        Ok(self
            .map
            .read()
            .map_err(|_| StoreError::Internal("memtable lock poisoned".into()))?
            .clone())
    }
}
