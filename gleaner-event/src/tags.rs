use std::fmt;
use std::mem;

/// An ordered list of labels that tracks the byte length of its contents.
///
/// Logically this is a map with unique keys, but duplicates may exist transiently while a
/// caller rewrites labels, for example between [`push_back`](Self::push_back) and
/// [`compact`](Self::compact). Lookups always resolve to the first match.
///
/// The tracked size is the sum of all key and value lengths and is updated together with every
/// structural change. It is read by memory accounting and must never drift.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SizedTags {
    inner: Vec<(String, String)>,
    tracked: usize,
}

impl SizedTags {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing the value of an existing key in place.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(key) {
            Some(index) => {
                let slot = &mut self.inner[index].1;
                self.tracked = self.tracked - slot.len() + value.len();
                *slot = value;
            }
            None => {
                self.tracked += key.len() + value.len();
                self.inner.push((key.to_owned(), value));
            }
        }
    }

    /// Appends a label without checking for an existing key.
    pub fn push_back(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.tracked += key.len() + value.len();
        self.inner.push((key, value));
    }

    /// Removes the first label with the given key and returns its value.
    pub fn erase(&mut self, key: &str) -> Option<String> {
        let index = self.position(key)?;
        let (key, value) = self.inner.remove(index);
        self.tracked -= key.len() + value.len();
        Some(value)
    }

    /// Renames the label at `index` and keeps its value.
    ///
    /// Out of range indexes are ignored.
    pub fn rename_at(&mut self, index: usize, name: impl Into<String>) {
        if let Some((key, _)) = self.inner.get_mut(index) {
            let name = name.into();
            self.tracked = self.tracked - key.len() + name.len();
            *key = name;
        }
    }

    /// Keeps only the labels for which `keep` returns `true`, preserving their order.
    pub fn compact<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str, &str) -> bool,
    {
        let mut kept = 0;
        self.inner.retain(|(key, value)| {
            let retain = keep(key, value);
            if retain {
                kept += key.len() + value.len();
            }
            retain
        });
        self.tracked = kept;
    }

    /// Sorts the labels by key, then by value.
    pub fn sort(&mut self) {
        self.inner.sort_unstable();
    }

    /// Returns the index of the first label with the given key.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.inner.iter().position(|(k, _)| k == key)
    }

    /// Returns the value of the first label with the given key, or `""` if there is none.
    pub fn get(&self, key: &str) -> &str {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map_or("", |(_, v)| v.as_str())
    }

    /// Returns `true` if a label with the given key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Iterates over all labels in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of labels, including transient duplicates.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no labels.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes all labels and keeps the allocation.
    pub fn clear(&mut self) {
        self.inner.clear();
        self.tracked = 0;
    }

    /// Returns the summed byte length of all keys and values.
    pub fn tracked_size(&self) -> usize {
        self.tracked
    }

    /// Returns the container overhead plus the tracked size.
    ///
    /// Only meant for memory accounting.
    pub fn byte_footprint(&self) -> usize {
        mem::size_of::<Vec<(String, String)>>() + self.tracked
    }
}

impl fmt::Debug for SizedTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for SizedTags
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Self::new();
        for (key, value) in iter {
            tags.push_back(key, value);
        }
        tags
    }
}

impl<K, V> Extend<(K, V)> for SizedTags
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.push_back(key, value);
        }
    }
}
