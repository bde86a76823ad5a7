use std::ops::{Index, IndexMut};

/// Generational index into a [`FreelistVec`].
///
/// A key stays invalid forever after its value was removed, even when its
/// storage slot is reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FreelistIndex {
    index: u32,
    generation: u32,
}

impl FreelistIndex {
    /// Position of the storage slot, stable for the lifetime of the value.
    pub fn slot(self) -> usize {
        self.index as usize
    }
}

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

pub struct FreelistVec<T> {
    data: Vec<Entry<T>>,
    freelist: Vec<u32>,
    len: usize,
}

impl<T> FreelistVec<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            freelist: Vec::new(),
            len: 0,
        }
    }

    pub fn push(&mut self, value: T) -> FreelistIndex {
        self.len += 1;
        if let Some(index) = self.freelist.pop() {
            let entry = &mut self.data[index as usize];
            debug_assert!(entry.value.is_none());
            entry.value = Some(value);
            FreelistIndex {
                index,
                generation: entry.generation,
            }
        } else {
            let index = u32::try_from(self.data.len()).expect("freelist vec exceeded u32::MAX entries");
            self.data.push(Entry {
                generation: 0,
                value: Some(value),
            });
            FreelistIndex { index, generation: 0 }
        }
    }

    pub fn remove(&mut self, index: FreelistIndex) -> Option<T> {
        let entry = self.data.get_mut(index.slot())?;
        if entry.generation != index.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.freelist.push(index.index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, index: FreelistIndex) -> Option<&T> {
        self.data
            .get(index.slot())
            .filter(|entry| entry.generation == index.generation)
            .and_then(|entry| entry.value.as_ref())
    }

    pub fn get_mut(&mut self, index: FreelistIndex) -> Option<&mut T> {
        self.data
            .get_mut(index.slot())
            .filter(|entry| entry.generation == index.generation)
            .and_then(|entry| entry.value.as_mut())
    }

    pub fn contains(&self, index: FreelistIndex) -> bool {
        self.get(index).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Default for FreelistVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<FreelistIndex> for FreelistVec<T> {
    type Output = T;

    #[track_caller]
    fn index(&self, index: FreelistIndex) -> &Self::Output {
        match self.get(index) {
            Some(value) => value,
            None => panic!("stale or foreign freelist index {index:?}"),
        }
    }
}

impl<T> IndexMut<FreelistIndex> for FreelistVec<T> {
    #[track_caller]
    fn index_mut(&mut self, index: FreelistIndex) -> &mut Self::Output {
        match self.get_mut(index) {
            Some(value) => value,
            None => panic!("stale or foreign freelist index {index:?}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::FreelistVec;

    #[test]
    fn reuse_bumps_generation() {
        let mut vec = FreelistVec::new();
        let a = vec.push(1);
        let b = vec.push(2);
        assert_eq!(vec.remove(a), Some(1));
        assert_eq!(vec.remove(a), None);

        let c = vec.push(3);
        assert_eq!(c.slot(), a.slot());
        assert!(vec.get(a).is_none());
        assert_eq!(vec[c], 3);
        assert_eq!(vec[b], 2);
        assert_eq!(vec.len(), 2);
        assert_eq!(vec.data.len(), 2);
    }

    #[test]
    #[should_panic]
    fn stale_index_panics() {
        let mut vec = FreelistVec::new();
        let a = vec.push(1);
        vec.remove(a);
        let _ = vec[a];
    }
}
