/// Position of a value in a [`Slab`], tagged with the generation of the
/// slot at insertion time.
///
/// Once the value is removed the slot's generation moves on, so a stale
/// key never resolves to whatever reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Key {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// A generational slab allocator.
///
/// Values live in a contiguous array; removed slots are pushed on a free
/// stack and reused by later insertions, so the array only grows to the
/// peak number of values alive at once.
pub(crate) struct Slab<T> {
    entries: Vec<Entry<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Slab<T> {
    /// Inserts the value built by `make`, which receives the key it will
    /// be stored under.
    pub(crate) fn insert_with(&mut self, make: impl FnOnce(Key) -> T) -> Key {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    value: None,
                });
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[index];
        let key = Key {
            index,
            generation: entry.generation,
        };

        entry.value = Some(make(key));

        key
    }

    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        self.entries
            .get(key.index)
            .filter(|entry| entry.generation == key.generation)
            .and_then(|entry| entry.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.entries
            .get_mut(key.index)
            .filter(|entry| entry.generation == key.generation)
            .and_then(|entry| entry.value.as_mut())
    }

    /// Removes and returns the value stored under `key`.
    ///
    /// Returns `None` if the key is stale.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let entry = self
            .entries
            .get_mut(key.index)
            .filter(|entry| entry.generation == key.generation)?;

        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);

        self.free.push(key.index);

        Some(value)
    }

    /// Number of values stored.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    /// Number of slots allocated, occupied or free.
    #[cfg(test)]
    pub(crate) fn slots(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Key, &T)> {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            let key = Key {
                index,
                generation: entry.generation,
            };
            entry.value.as_ref().map(|value| (key, value))
        })
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries
            .iter_mut()
            .filter_map(|entry| entry.value.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_slots_are_reused() {
        let mut slab = Slab::default();

        let a = slab.insert_with(|_| "a");
        let b = slab.insert_with(|_| "b");
        assert_eq!(slab.remove(a), Some("a"));

        let c = slab.insert_with(|_| "c");
        assert_eq!(c.index, a.index);
        assert_eq!(slab.slots(), 2);
        assert_eq!(slab.len(), 2);
        assert_eq!(slab.get(b), Some(&"b"));
    }

    #[test]
    fn stale_keys_do_not_resolve() {
        let mut slab = Slab::default();

        let old = slab.insert_with(|_| 1);
        slab.remove(old);
        let new = slab.insert_with(|_| 2);

        assert_ne!(old, new);
        assert_eq!(slab.get(old), None);
        assert_eq!(slab.remove(old), None);
        assert_eq!(slab.get(new), Some(&2));
    }

    #[test]
    fn insert_with_sees_its_own_key() {
        let mut slab = Slab::default();

        let key = slab.insert_with(|key| key);
        assert_eq!(slab.get(key), Some(&key));
    }
}
