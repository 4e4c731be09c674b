//! One-level undo buffers for MCMC proposals.
//!
//! A proposal caches the values it may touch, mutates them, and then either
//! clears the cache (accept) or restores it (reject). Restoring without a
//! cache is a programming error and panics.

#[derive(Debug, Clone, PartialEq)]
enum Saved<T> {
    All(Vec<T>),
    Slots(Vec<(usize, T)>),
}

/// A per-vertex array whose slots can be cached selectively.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointedArray<T> {
    values: Vec<T>,
    cache: Option<Saved<T>>,
}

impl<T: Clone> CheckpointedArray<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self {
            values,
            cache: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, i: usize) -> &T {
        &self.values[i]
    }

    pub fn set(&mut self, i: usize, value: T) {
        self.values[i] = value;
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Replaces every slot, possibly changing the length. Only a full
    /// cache can undo this.
    pub fn reset(&mut self, values: Vec<T>) {
        self.values = values;
    }

    /// Saves the listed slots, or every slot when `affected` is `None`.
    /// Any earlier cache is replaced.
    pub fn cache(&mut self, affected: Option<&[usize]>) {
        self.cache = Some(match affected {
            None => Saved::All(self.values.clone()),
            Some(slots) => Saved::Slots(
                slots.iter().map(|&i| (i, self.values[i].clone())).collect(),
            ),
        });
    }

    /// Keeps the current values and drops the cache.
    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    /// Puts the cached slots back.
    ///
    /// # Panics
    /// If nothing was cached.
    pub fn restore_cache(&mut self) {
        match self.cache.take() {
            Some(Saved::All(values)) => self.values = values,
            Some(Saved::Slots(slots)) => {
                for (i, value) in slots {
                    self.values[i] = value;
                }
            }
            None => panic!("restore_cache called without a cache"),
        }
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }
}

/// A single value with the same cache protocol, for components that are
/// always rebuilt whole.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpointed<T> {
    current: T,
    cache: Option<T>,
}

impl<T: Clone> Checkpointed<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: value,
            cache: None,
        }
    }

    pub fn get(&self) -> &T {
        &self.current
    }

    pub fn set(&mut self, value: T) {
        self.current = value;
    }

    pub fn cache(&mut self) {
        self.cache = Some(self.current.clone());
    }

    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    /// # Panics
    /// If nothing was cached.
    pub fn restore_cache(&mut self) {
        self.current = self
            .cache
            .take()
            .unwrap_or_else(|| panic!("restore_cache called without a cache"));
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_brings_back_cached_values() {
        let mut a = CheckpointedArray::new(vec![1.0, 2.0, 3.0]);
        a.cache(None);
        a.set(0, 10.0);
        a.set(2, 30.0);
        a.restore_cache();
        assert_eq!(a.values(), &[1.0, 2.0, 3.0]);
        assert!(!a.has_cache());
    }

    #[test]
    fn clear_keeps_new_values() {
        let mut a = CheckpointedArray::new(vec![vec![1.0], vec![2.0]]);
        a.cache(None);
        a.set(1, vec![5.0, 6.0]);
        a.clear_cache();
        assert_eq!(a.get(1), &vec![5.0, 6.0]);
        assert!(!a.has_cache());
    }

    #[test]
    fn selective_cache_restores_only_listed_slots() {
        let mut a = CheckpointedArray::new(vec![1, 2, 3, 4]);
        a.cache(Some(&[1, 3][..]));
        a.set(1, 20);
        a.set(3, 40);
        a.restore_cache();
        assert_eq!(a.values(), &[1, 2, 3, 4]);

        // Slots outside the cached set keep whatever was written.
        a.cache(Some(&[0][..]));
        a.set(2, 99);
        a.restore_cache();
        assert_eq!(a.values(), &[1, 2, 99, 4]);
    }

    #[test]
    fn full_cache_undoes_reset() {
        let mut a = CheckpointedArray::new(vec![1, 2]);
        a.cache(None);
        a.reset(vec![7, 8, 9]);
        assert_eq!(a.len(), 3);
        a.restore_cache();
        assert_eq!(a.values(), &[1, 2]);
    }

    #[test]
    #[should_panic(expected = "without a cache")]
    fn restore_without_cache_panics() {
        let mut a = CheckpointedArray::new(vec![1]);
        a.restore_cache();
    }

    #[test]
    fn single_value_protocol() {
        let mut v = Checkpointed::new(String::from("old"));
        v.cache();
        v.set("new".into());
        v.restore_cache();
        assert_eq!(v.get(), "old");
        v.cache();
        v.set("new".into());
        v.clear_cache();
        assert_eq!(v.get(), "new");
    }
}
