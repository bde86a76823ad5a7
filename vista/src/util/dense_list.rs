//! Dense list of keys with O(1) lookup of a key's position.
//!
//! Removal swaps the last key into the hole. The list rewrites the stored
//! position of the moved key itself so `items()[position(key)] == key` holds
//! for every member at all times.

use crate::util::freelist::FreelistIndex;

const ABSENT: u32 = u32::MAX;

/// Result of removing a key from a [`DenseList`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SwapRemoved {
    /// Position the removed key used to occupy.
    pub position: usize,
    /// Previous position of the key that now lives at `position`, if a key
    /// was moved.
    pub moved_from: Option<usize>,
}

#[derive(Debug, Default, Clone)]
pub struct DenseList {
    items: Vec<FreelistIndex>,
    /// Indexed by [`FreelistIndex::slot`].
    positions: Vec<u32>,
}

impl DenseList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the key and returns its position. Panics if the key is already a
    /// member.
    #[track_caller]
    pub fn push(&mut self, key: FreelistIndex) -> usize {
        assert!(!self.contains(key), "{key:?} is already a member of the list");

        let slot = key.slot();
        if slot >= self.positions.len() {
            self.positions.resize(slot + 1, ABSENT);
        }
        let position = self.items.len();
        self.positions[slot] = position as u32;
        self.items.push(key);
        position
    }

    /// Removes the key by swapping the last key into its position.
    pub fn swap_remove(&mut self, key: FreelistIndex) -> Option<SwapRemoved> {
        let position = self.position(key)?;
        self.positions[key.slot()] = ABSENT;
        self.items.swap_remove(position);

        let moved_from = if position < self.items.len() {
            let moved = self.items[position];
            self.positions[moved.slot()] = position as u32;
            Some(self.items.len())
        } else {
            None
        };

        Some(SwapRemoved { position, moved_from })
    }

    pub fn position(&self, key: FreelistIndex) -> Option<usize> {
        let position = *self.positions.get(key.slot())?;
        if position == ABSENT {
            return None;
        }
        // The slot may be shared with a stale generation of the key.
        (self.items[position as usize] == key).then_some(position as usize)
    }

    pub fn contains(&self, key: FreelistIndex) -> bool {
        self.position(key).is_some()
    }

    pub fn items(&self) -> &[FreelistIndex] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes every key, returning them in list order.
    pub fn drain(&mut self) -> impl Iterator<Item = FreelistIndex> + '_ {
        for key in &self.items {
            self.positions[key.slot()] = ABSENT;
        }
        self.items.drain(..)
    }
}

#[cfg(test)]
mod test {
    use super::{DenseList, SwapRemoved};
    use crate::util::freelist::FreelistVec;

    #[test]
    fn swap_remove_back_patches() {
        let mut keys = FreelistVec::new();
        let a = keys.push(());
        let b = keys.push(());
        let c = keys.push(());

        let mut list = DenseList::new();
        assert_eq!(list.push(a), 0);
        assert_eq!(list.push(b), 1);
        assert_eq!(list.push(c), 2);

        assert_eq!(
            list.swap_remove(a),
            Some(SwapRemoved {
                position: 0,
                moved_from: Some(2)
            })
        );
        assert_eq!(list.items(), &[c, b]);
        assert_eq!(list.position(c), Some(0));
        assert_eq!(list.position(b), Some(1));
        assert_eq!(list.position(a), None);

        assert_eq!(
            list.swap_remove(b),
            Some(SwapRemoved {
                position: 1,
                moved_from: None
            })
        );
        assert_eq!(list.swap_remove(b), None);
    }

    #[test]
    fn stale_generation_is_not_a_member() {
        let mut keys = FreelistVec::new();
        let a = keys.push(());
        let mut list = DenseList::new();
        list.push(a);
        keys.remove(a);
        let reused = keys.push(());
        assert_eq!(reused.slot(), a.slot());
        assert!(!list.contains(reused));
        assert!(list.contains(a));
    }

    #[test]
    fn drain_clears_positions() {
        let mut keys = FreelistVec::new();
        let a = keys.push(());
        let b = keys.push(());
        let mut list = DenseList::new();
        list.push(a);
        list.push(b);
        assert_eq!(list.drain().collect::<Vec<_>>(), vec![a, b]);
        assert!(list.is_empty());
        assert!(!list.contains(a));
        list.push(b);
        assert_eq!(list.position(b), Some(0));
    }
}
