// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Caller owned, ordered list of attribute records
//!
//! Records live in an arena and are addressed by [`Handle`]s which stay
//! valid until the record is removed. A separate sequence of handles
//! gives list order. Each node may also point at a "sister" node, a
//! grouping used by higher layers which this crate only stores.

use std::sync::Arc;

use crate::record::Svrattrl;

/// Stable reference to a list node. Removed nodes invalidate their handle,
/// even if the slot is later reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Node {
    record: Arc<Svrattrl>,
    sister: Option<Handle>,
    flags: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    node: Option<Node>,
}

#[derive(Debug, Default)]
pub struct AttrList {
    slots: Vec<Slot>,
    free: Vec<usize>,
    order: Vec<Handle>,
}

impl AttrList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Link `record` at the tail
    pub fn append(&mut self, record: impl Into<Arc<Svrattrl>>) -> Handle {
        let handle = self.insert_node(record.into());
        self.order.push(handle);
        handle
    }

    /// Link `record` at the head
    pub fn prepend(&mut self, record: impl Into<Arc<Svrattrl>>) -> Handle {
        let handle = self.insert_node(record.into());
        self.order.insert(0, handle);
        handle
    }

    /// Link `record` directly after `anchor`, `None` if `anchor` is stale
    pub fn insert_after(&mut self, anchor: Handle, record: impl Into<Arc<Svrattrl>>) -> Option<Handle> {
        let position = self.position(anchor)?;
        let handle = self.insert_node(record.into());
        self.order.insert(position + 1, handle);
        Some(handle)
    }

    /// Link `record` directly before `anchor`, `None` if `anchor` is stale
    pub fn insert_before(&mut self, anchor: Handle, record: impl Into<Arc<Svrattrl>>) -> Option<Handle> {
        let position = self.position(anchor)?;
        let handle = self.insert_node(record.into());
        self.order.insert(position, handle);
        Some(handle)
    }

    /// Unlink a node, handing back this list's reference to the record
    pub fn remove(&mut self, handle: Handle) -> Option<Arc<Svrattrl>> {
        let position = self.position(handle)?;
        self.order.remove(position);
        self.release(handle)
    }

    /// Unlink every node past the first `len`
    pub fn truncate(&mut self, len: usize) {
        if len >= self.order.len() {
            return;
        }

        for handle in self.order.split_off(len) {
            self.release(handle);
        }
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    pub fn get(&self, handle: Handle) -> Option<&Svrattrl> {
        self.node(handle).map(|node| node.record.as_ref())
    }

    pub fn first(&self) -> Option<&Svrattrl> {
        self.order.first().and_then(|handle| self.get(*handle))
    }

    pub fn last(&self) -> Option<&Svrattrl> {
        self.order.last().and_then(|handle| self.get(*handle))
    }

    /// Take an additional owner of the record behind `handle`
    pub fn share(&self, handle: Handle) -> Option<Arc<Svrattrl>> {
        self.node(handle).map(|node| Arc::clone(&node.record))
    }

    /// Number of owners of the record behind `handle`, this list included
    pub fn ref_count(&self, handle: Handle) -> Option<usize> {
        self.node(handle).map(|node| Arc::strong_count(&node.record))
    }

    pub fn sister(&self, handle: Handle) -> Option<Handle> {
        self.node(handle).and_then(|node| node.sister)
    }

    /// Returns `false` if `handle` is stale
    pub fn set_sister(&mut self, handle: Handle, sister: Option<Handle>) -> bool {
        self.node_mut(handle).map(|node| node.sister = sister).is_some()
    }

    pub fn flags(&self, handle: Handle) -> Option<u32> {
        self.node(handle).map(|node| node.flags)
    }

    /// Returns `false` if `handle` is stale
    pub fn set_flags(&mut self, handle: Handle, flags: u32) -> bool {
        self.node_mut(handle).map(|node| node.flags = flags).is_some()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.node(handle).is_some()
    }

    /// Handles in list order
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.order.iter().copied()
    }

    /// Records in list order
    pub fn iter(&self) -> impl Iterator<Item = &Svrattrl> + '_ {
        self.order.iter().filter_map(|handle| self.get(*handle))
    }

    fn position(&self, handle: Handle) -> Option<usize> {
        self.node(handle)?;
        self.order.iter().position(|h| *h == handle)
    }

    fn node(&self, handle: Handle) -> Option<&Node> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, handle: Handle) -> Option<&mut Node> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn insert_node(&mut self, record: Arc<Svrattrl>) -> Handle {
        let node = Node {
            record,
            sister: None,
            flags: 0,
        };

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };

        let slot = &mut self.slots[index];
        slot.node = Some(node);

        Handle {
            index,
            generation: slot.generation,
        }
    }

    fn release(&mut self, handle: Handle) -> Option<Arc<Svrattrl>> {
        let slot = self.slots.get_mut(handle.index)?;
        let node = slot.node.take()?;

        slot.generation += 1;
        self.free.push(handle.index);

        Some(node.record)
    }
}

impl<'a> IntoIterator for &'a AttrList {
    type Item = &'a Svrattrl;
    type IntoIter = Box<dyn Iterator<Item = &'a Svrattrl> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl<T: Into<Arc<Svrattrl>>> Extend<T> for AttrList {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for record in iter {
            self.append(record);
        }
    }
}

impl<T: Into<Arc<Svrattrl>>> FromIterator<T> for AttrList {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}
