//! Arena-backed doubly-linked list
//!
//! Statement bodies and instruction sequences are stored as linked lists so
//! that ranges can be spliced, replaced, or removed in place. Nodes live in
//! a `Vec` owned by the list and are addressed by `NodeId`; removed slots are
//! recycled through a free list.

use std::collections::HashMap;

/// Handle to a node in a `LinkedList`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: Option<T>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct LinkedList<T> {
    entries: Vec<Entry<T>>,
    free: Vec<usize>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl<T> Default for LinkedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LinkedList<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id).and_then(|e| e.next)
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id).and_then(|e| e.prev)
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.entry(id).and_then(|e| e.value.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.entries
            .get_mut(id.0)
            .and_then(|e| e.value.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Append a value at the tail and return its handle
    pub fn append(&mut self, value: T) -> NodeId {
        self.insert_before(value, None)
    }

    /// Insert a value before `reference`; `None` appends at the tail
    pub fn insert_before(&mut self, value: T, reference: Option<NodeId>) -> NodeId {
        let prev = match reference {
            Some(r) => self.prev(r),
            None => self.tail,
        };

        let entry = Entry {
            value: Some(value),
            prev,
            next: reference,
        };

        let id = match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = entry;
                NodeId(slot)
            }
            None => {
                self.entries.push(entry);
                NodeId(self.entries.len() - 1)
            }
        };

        match prev {
            Some(p) => self.entries[p.0].next = Some(id),
            None => self.head = Some(id),
        }
        match reference {
            Some(r) => self.entries[r.0].prev = Some(id),
            None => self.tail = Some(id),
        }

        self.len += 1;
        id
    }

    /// Unlink a node and return its value
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let (prev, next) = match self.entry(id) {
            Some(e) if e.value.is_some() => (e.prev, e.next),
            _ => return None,
        };

        match prev {
            Some(p) => self.entries[p.0].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.entries[n.0].prev = prev,
            None => self.tail = prev,
        }

        let entry = &mut self.entries[id.0];
        entry.prev = None;
        entry.next = None;
        let value = entry.value.take();
        self.free.push(id.0);
        self.len -= 1;
        value
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Iterate starting at `start` (inclusive)
    pub fn iter_from(&self, start: NodeId) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: Some(start),
        }
    }

    fn entry(&self, id: NodeId) -> Option<&Entry<T>> {
        self.entries.get(id.0)
    }
}

impl<T: Clone> LinkedList<T> {
    /// Copy every node of `other` into this list before `reference`.
    ///
    /// Returns the mapping from `other`'s handles to the new handles so
    /// callers can re-target anything that pointed into `other`.
    pub fn splice_list(
        &mut self,
        other: &LinkedList<T>,
        reference: Option<NodeId>,
    ) -> HashMap<NodeId, NodeId> {
        let mut mapping = HashMap::with_capacity(other.len());
        for (old, value) in other.iter() {
            let new = self.insert_before(value.clone(), reference);
            mapping.insert(old, new);
        }
        mapping
    }
}

pub struct Iter<'a, T> {
    list: &'a LinkedList<T>,
    cursor: Option<NodeId>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let value = self.list.get(id)?;
        self.cursor = self.list.next(id);
        Some((id, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn values(list: &LinkedList<&'static str>) -> Vec<&'static str> {
        list.iter().map(|(_, v)| *v).collect()
    }

    #[test]
    fn test_insert_and_remove() {
        let mut list = LinkedList::new();
        let a = list.append("a");
        let c = list.append("c");
        list.insert_before("b", Some(c));
        assert_eq!(values(&list), vec!["a", "b", "c"]);

        assert_eq!(list.remove(a), Some("a"));
        assert_eq!(list.remove(a), None);
        assert_eq!(values(&list), vec!["b", "c"]);
        assert_eq!(list.len(), 2);

        // Freed slots are reused
        let d = list.append("d");
        assert_eq!(d, a);
        assert_eq!(values(&list), vec!["b", "c", "d"]);
        assert_eq!(list.prev(d), Some(c));
    }

    #[test]
    fn test_splice_list_maps_handles() {
        let mut target = LinkedList::new();
        target.append("open");
        let close = target.append("close");

        let mut other = LinkedList::new();
        let x = other.append("x");
        let y = other.append("y");

        let mapping = target.splice_list(&other, Some(close));
        assert_eq!(values(&target), vec!["open", "x", "y", "close"]);
        assert_eq!(target.get(mapping[&x]), Some(&"x"));
        assert_eq!(target.next(mapping[&y]), Some(close));
        // The source list is untouched
        assert_eq!(values(&other), vec!["x", "y"]);
    }
}
