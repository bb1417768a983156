//! Lazy in-order cursor over a memtable snapshot.
//!
//! The cursor holds a stack of ancestors into the captured tree root, so
//! it stays valid no matter how many writes land after it was taken.
//! `next` pops the current node and pushes the left spine of its right
//! subtree. The bounded form seeds the stack by walking the descent path
//! to `start`, keeping only nodes whose key is at or past it, and stops
//! as soon as the current key passes `end` (both bounds inclusive).

use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::compare;
use crate::error::StoreError;
use crate::iterator::{Pair, PairIterator};
use crate::memtable::{Node, SortedMap};

pub struct MemtableIterator {
    init: bool,
    stack: Vec<Arc<Node>>,
    end: Option<Vec<u8>>,
}

/// Pushes the path from `root` toward `start` (or the whole left spine
/// when `start` is absent), keeping only nodes at or past the bound.
fn append_stack(start: Option<&[u8]>, root: Option<Arc<Node>>, stack: &mut Vec<Arc<Node>>) {
    let mut node = root;
    while let Some(current) = node {
        match start {
            Some(bound) => match compare(bound, &current.pair().key) {
                Ordering::Equal => {
                    stack.push(current);
                    return;
                }
                Ordering::Less => {
                    let left = current.left().cloned();
                    stack.push(current);
                    node = left;
                }
                Ordering::Greater => node = current.right().cloned(),
            },
            None => {
                let left = current.left().cloned();
                stack.push(current);
                node = left;
            }
        }
    }
}

impl MemtableIterator {
    pub(crate) fn bounded(map: &SortedMap, start: &[u8], end: &[u8]) -> Self {
        let mut stack = Vec::new();
        append_stack(Some(start), map.root.clone(), &mut stack);
        Self {
            init: false,
            stack,
            end: Some(end.to_vec()),
        }
    }

    pub(crate) fn unbounded(map: &SortedMap) -> Self {
        let mut stack = Vec::new();
        append_stack(None, map.root.clone(), &mut stack);
        Self {
            init: false,
            stack,
            end: None,
        }
    }
}

impl PairIterator for MemtableIterator {
    fn next(&mut self) -> Result<bool, StoreError> {
        if !self.init {
            self.init = true;
        } else {
            let Some(node) = self.stack.pop() else {
                return Ok(false);
            };
            append_stack(None, node.right().cloned(), &mut self.stack);
        }

        match self.stack.last() {
            None => Ok(false),
            Some(node) => {
                if let Some(end) = &self.end {
                    if compare(&node.pair().key, end) == Ordering::Greater {
                        self.stack.clear();
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    fn get(&self) -> Result<Option<Pair>, StoreError> {
        Ok(self.stack.last().map(|node| node.pair().clone()))
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.stack.clear();
        Ok(())
    }
}
