//! Circular singly linked list stored in a slab.
//!
//! The ring keeps a pointer to its tail; the tail's `next` is the head. This
//! gives O(1) push and O(1) splicing of one ring onto another while keeping
//! insertion order.

use core::fmt;

struct Slot<T> {
    value: T,
    next: usize,
}

/// An insertion-ordered circular list.
pub struct Ring<T> {
    slots: Vec<Slot<T>>,
    tail: Option<usize>,
}

impl<T> Ring<T> {
    /// Creates an empty ring.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            tail: None,
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the ring has no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tail.is_none()
    }

    /// Appends `value` after the current tail.
    pub fn push(&mut self, value: T) {
        let index = self.slots.len();
        match self.tail {
            Some(tail) => {
                let head = self.slots[tail].next;
                self.slots.push(Slot { value, next: head });
                self.slots[tail].next = index;
            }
            None => self.slots.push(Slot { value, next: index }),
        }
        self.tail = Some(index);
    }

    /// Splices `other` after this ring's tail, consuming it.
    pub fn append(&mut self, other: Self) {
        let Some(other_tail) = other.tail else {
            return;
        };
        let Some(tail) = self.tail else {
            *self = other;
            return;
        };

        let offset = self.slots.len();
        let head = self.slots[tail].next;
        let other_head = other.slots[other_tail].next + offset;
        self.slots.extend(other.slots.into_iter().map(|slot| Slot {
            value: slot.value,
            next: slot.next + offset,
        }));
        self.slots[tail].next = other_head;
        self.slots[other_tail + offset].next = head;
        self.tail = Some(other_tail + offset);
    }

    /// Removes every entry, returning them as a new ring.
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }

    /// Iterates from the oldest entry to the newest.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            ring: self,
            cursor: self.tail.map(|tail| self.slots[tail].next),
            remaining: self.slots.len(),
        }
    }
}

impl<T> Default for Ring<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Ring<T> {
    fn clone(&self) -> Self {
        Self {
            slots: self
                .slots
                .iter()
                .map(|slot| Slot {
                    value: slot.value.clone(),
                    next: slot.next,
                })
                .collect(),
            tail: self.tail,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Ring<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> FromIterator<T> for Ring<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut ring = Self::new();
        for value in iter {
            ring.push(value);
        }
        ring
    }
}

impl<'a, T> IntoIterator for &'a Ring<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`Ring`], oldest first.
#[derive(Debug)]
pub struct Iter<'a, T> {
    ring: &'a Ring<T>,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.cursor?;
        let slot = &self.ring.slots[index];
        self.cursor = Some(slot.next);
        self.remaining -= 1;
        Some(&slot.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(ring: &Ring<u32>) -> Vec<u32> {
        ring.iter().copied().collect()
    }

    #[test]
    fn push_keeps_insertion_order() {
        let mut ring = Ring::new();
        assert!(ring.is_empty());
        ring.push(1);
        ring.push(2);
        ring.push(3);
        assert_eq!(collect(&ring), vec![1, 2, 3]);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn append_splices_after_tail() {
        let mut first: Ring<u32> = [1, 2].into_iter().collect();
        let second: Ring<u32> = [3, 4, 5].into_iter().collect();
        first.append(second);
        assert_eq!(collect(&first), vec![1, 2, 3, 4, 5]);

        first.push(6);
        assert_eq!(collect(&first), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn append_onto_empty_adopts_other() {
        let mut empty = Ring::new();
        empty.append([7, 8].into_iter().collect());
        assert_eq!(collect(&empty), vec![7, 8]);

        empty.append(Ring::new());
        assert_eq!(collect(&empty), vec![7, 8]);
    }

    #[test]
    fn take_leaves_ring_empty() {
        let mut ring: Ring<u32> = [1, 2].into_iter().collect();
        let taken = ring.take();
        assert!(ring.is_empty());
        assert_eq!(collect(&taken), vec![1, 2]);
    }
}
