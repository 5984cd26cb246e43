//! A separately chained hash map whose nodes live in a [`ChunkedArena`].
//!
//! Buckets hold the arena index of the first node in their chain; each node
//! keeps its full hash and the index of the next node. Growing only relinks
//! nodes into a new bucket array, so keys are never rehashed and values never
//! move.

use alloc::vec::Vec;
use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;
use core::ops::Index;

use crate::DefaultHashBuilder;
use crate::arena::ChunkedArena;
use crate::config::LoadFactor;
use crate::error::Error;
use crate::error::infallible;
use crate::error::try_vec_with_capacity;
use crate::storage::MIN_CAPACITY;

/// End-of-chain marker.
const NIL: u32 = u32::MAX;

#[derive(Clone)]
struct Node<K, V> {
    hash: u64,
    next: u32,
    key: K,
    value: V,
}

/// A hash map resolving collisions with per-bucket chains.
///
/// Nodes are stored in a [`ChunkedArena`], so an entry keeps its arena index
/// for as long as it is in the map. The bucket count is a power of two sized
/// by the same [`LoadFactor`] rules as [`HashMap`](crate::HashMap).
///
/// # Examples
///
/// ```rust
/// use flat16::ChainedHashMap;
///
/// let mut map = ChainedHashMap::new();
/// assert!(map.insert("a", 1));
/// assert!(!map.insert("a", 2));
/// assert_eq!(map.insert_or_assign("a", 3), Some(1));
/// assert_eq!(map.get("a"), Some(&3));
/// assert_eq!(map.erase("a"), 1);
/// assert!(map.is_empty());
/// ```
#[derive(Clone)]
pub struct ChainedHashMap<K, V, S = DefaultHashBuilder> {
    nodes: ChunkedArena<Node<K, V>>,
    buckets: Vec<u32>,
    max_load_factor: LoadFactor,
    hash_builder: S,
}

impl<K: Debug, V: Debug, S> Debug for ChainedHashMap<K, V, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(any(feature = "std", feature = "foldhash"))]
impl<K, V> ChainedHashMap<K, V, DefaultHashBuilder> {
    /// Creates an empty map using the default hasher.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates an empty map that holds at least `capacity` entries without
    /// growing, using the default hasher.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> Default for ChainedHashMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> ChainedHashMap<K, V, S> {
    /// Creates an empty map with the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty map with the given hasher builder that holds at least
    /// `capacity` entries without growing.
    ///
    /// # Panics
    ///
    /// Panics if the bucket count overflows `usize`.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        let max_load_factor = LoadFactor::default();
        let bucket_count = infallible(
            max_load_factor
                .slots_for(capacity)
                .ok_or(Error::CapacityOverflow),
        );
        let mut buckets = infallible(try_vec_with_capacity(bucket_count));
        buckets.resize(bucket_count, NIL);

        Self {
            nodes: ChunkedArena::with_capacity(capacity),
            buckets,
            max_load_factor,
            hash_builder,
        }
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of buckets. Always a power of two.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the number of entries the map can hold before it grows.
    pub fn capacity(&self) -> usize {
        self.max_load_factor.threshold(self.buckets.len())
    }

    /// Returns the average number of entries per bucket.
    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.buckets.len() as f64
    }

    /// Returns the maximum load factor.
    pub fn max_load_factor(&self) -> f64 {
        self.max_load_factor.get()
    }

    /// Returns the arena chunks holding the nodes.
    pub fn arena_chunks(&self) -> &[crate::arena::ChunkInfo] {
        self.nodes.chunks()
    }

    /// Removes every entry. Buckets and arena chunks are kept.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.buckets.fill(NIL);
    }

    /// Swaps the contents of two maps in O(1).
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns an iterator over the entries, in arena index order.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter {
            cursor: self.begin(),
            remaining: self.len(),
        }
    }

    /// Returns an iterator over the entries with mutable values.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> + '_ {
        self.nodes
            .iter_mut()
            .map(|(_, node)| (&node.key, &mut node.value))
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    /// Returns an iterator over the values.
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Returns a cursor at the first entry, or the end cursor.
    pub fn begin(&self) -> ChainedCursor<'_, K, V, S> {
        self.cursor_at(0)
    }

    /// Returns the end cursor.
    pub fn end(&self) -> ChainedCursor<'_, K, V, S> {
        ChainedCursor {
            map: self,
            index: self.nodes.capacity(),
        }
    }

    /// Returns a cursor at the first entry at or after arena index `index`.
    fn cursor_at(&self, index: usize) -> ChainedCursor<'_, K, V, S> {
        ChainedCursor {
            map: self,
            index: self
                .nodes
                .next_occupied(index)
                .unwrap_or(self.nodes.capacity()),
        }
    }

    /// Removes the entry at arena index `index`, returning it along with the
    /// index of the next entry (the end index if there is none).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flat16::ChainedHashMap;
    ///
    /// let mut map: ChainedHashMap<u32, u32> = (0..10).map(|x| (x, x)).collect();
    /// let mut index = map.begin().index();
    /// while let Some(((k, v), next)) = map.remove_at(index) {
    ///     assert_eq!(k, v);
    ///     index = next;
    /// }
    /// assert!(map.is_empty());
    /// ```
    pub fn remove_at(&mut self, index: usize) -> Option<((K, V), usize)> {
        let hash = self.nodes.get(index)?.hash;
        let bucket = self.bucket_of(hash);

        let mut prev = NIL;
        let mut current = self.buckets[bucket];
        while current as usize != index {
            prev = current;
            current = self.nodes.get(current as usize)?.next;
        }
        let node = self.unlink(bucket, prev, current)?;

        let next = self.cursor_at(index + 1).index;
        Some(((node.key, node.value), next))
    }

    fn bucket_of(&self, hash: u64) -> usize {
        hash as usize & (self.buckets.len() - 1)
    }

    /// Detaches `index` from `bucket`'s chain, given its predecessor, and
    /// frees its arena slot.
    fn unlink(&mut self, bucket: usize, prev: u32, index: u32) -> Option<Node<K, V>> {
        let next = self.nodes.get(index as usize)?.next;
        if prev == NIL {
            self.buckets[bucket] = next;
        } else {
            self.nodes.get_mut(prev as usize)?.next = next;
        }
        self.nodes.remove(index as usize)
    }

    /// Replaces the bucket array with `count` buckets and relinks every node.
    /// On error the map is unchanged.
    fn try_relink(&mut self, count: usize) -> Result<(), Error> {
        debug_assert!(count.is_power_of_two() && count >= MIN_CAPACITY);
        let mut buckets = try_vec_with_capacity(count)?;
        buckets.resize(count, NIL);

        let mask = count - 1;
        for (index, node) in self.nodes.iter_mut() {
            let bucket = node.hash as usize & mask;
            node.next = buckets[bucket];
            buckets[bucket] = index as u32;
        }
        self.buckets = buckets;
        Ok(())
    }

    /// Rebuilds the bucket array for at least `count` entries (and at least
    /// the current entries).
    pub fn rehash(&mut self, count: usize) {
        infallible(self.try_rehash(count));
    }

    /// Fallible variant of [`ChainedHashMap::rehash`].
    pub fn try_rehash(&mut self, count: usize) -> Result<(), Error> {
        let buckets = self
            .max_load_factor
            .slots_for(count.max(self.len()))
            .ok_or(Error::CapacityOverflow)?;
        self.try_relink(buckets)
    }

    /// Reserves room for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        infallible(self.try_reserve(additional));
    }

    /// Fallible variant of [`ChainedHashMap::reserve`]. On error the bucket
    /// array is unchanged.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        let required = self
            .len()
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;
        if required > self.capacity() {
            let buckets = self
                .max_load_factor
                .slots_for(required)
                .ok_or(Error::CapacityOverflow)?;
            self.try_relink(buckets)?;
        }
        self.nodes.try_reserve(additional)
    }

    /// Shrinks the bucket array to fit the current entries and drops vacant
    /// trailing arena chunks.
    pub fn shrink_to_fit(&mut self) {
        if let Some(buckets) = self.max_load_factor.slots_for(self.len()) {
            if buckets < self.buckets.len() {
                infallible(self.try_relink(buckets));
            }
        }
        self.nodes.shrink_to_fit();
    }

    /// Changes the maximum load factor (clamped to `[0.2, 0.8]`), adding
    /// buckets if the entries no longer fit.
    pub fn set_max_load_factor(&mut self, max_load_factor: f64) {
        self.max_load_factor = LoadFactor::new(max_load_factor);
        if self.len() > self.capacity() {
            self.rehash(self.len());
        }
    }
}

impl<K, V, S> ChainedHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns `(predecessor, index)` of the node holding `key`, with `NIL`
    /// as the predecessor of a chain head.
    fn locate<Q>(&self, hash: u64, key: &Q) -> Option<(u32, u32)>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mut prev = NIL;
        let mut current = self.buckets[self.bucket_of(hash)];
        while current != NIL {
            let node = self.nodes.get(current as usize)?;
            if node.hash == hash && node.key.borrow() == key {
                return Some((prev, current));
            }
            prev = current;
            current = node.next;
        }
        None
    }

    /// Links a new node at the head of its chain, growing first if needed.
    fn insert_new(&mut self, hash: u64, key: K, value: V) -> usize {
        if self.len() + 1 > self.capacity() {
            self.grow_for_insert();
        }
        let bucket = self.bucket_of(hash);
        let index = self.nodes.insert(Node {
            hash,
            next: self.buckets[bucket],
            key,
            value,
        });
        self.buckets[bucket] = index as u32;
        index
    }

    #[cold]
    fn grow_for_insert(&mut self) {
        let buckets = infallible(
            self.max_load_factor
                .slots_for(self.len() + 1)
                .ok_or(Error::CapacityOverflow),
        );
        infallible(self.try_relink(buckets));
    }

    /// Inserts `value` under `key` if the key is absent. Returns `true` if
    /// the entry was inserted.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let hash = self.hash_builder.hash_one(&key);
        if self.locate(hash, &key).is_some() {
            return false;
        }
        self.insert_new(hash, key, value);
        true
    }

    /// Inserts `value` under `key`, replacing and returning any previous
    /// value.
    pub fn insert_or_assign(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.hash_builder.hash_one(&key);
        match self.locate(hash, &key) {
            Some((_, index)) => Some(core::mem::replace(
                &mut self.nodes[index as usize].value,
                value,
            )),
            None => {
                self.insert_new(hash, key, value);
                None
            }
        }
    }

    /// Constructs a value with `f` and inserts it only if `key` is absent.
    /// Returns the value under `key` and whether it was inserted.
    pub fn try_emplace(&mut self, key: K, f: impl FnOnce() -> V) -> (&mut V, bool) {
        let hash = self.hash_builder.hash_one(&key);
        let (index, inserted) = match self.locate(hash, &key) {
            Some((_, index)) => (index as usize, false),
            None => (self.insert_new(hash, key, f()), true),
        };
        (&mut self.nodes[index].value, inserted)
    }

    /// Returns the value under `key`, inserting `V::default()` first if the
    /// key is absent.
    pub fn get_or_insert_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.try_emplace(key, V::default).0
    }

    /// Returns a reference to the value under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Returns the stored key and value under `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        let (_, index) = self.locate(hash, key)?;
        let node = self.nodes.get(index as usize)?;
        Some((&node.key, &node.value))
    }

    /// Returns a mutable reference to the value under `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        let (_, index) = self.locate(hash, key)?;
        self.nodes.get_mut(index as usize).map(|node| &mut node.value)
    }

    /// Returns a reference to the value under `key`, or
    /// [`Error::KeyNotFound`].
    pub fn at<Q>(&self, key: &Q) -> Result<&V, Error>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).ok_or(Error::KeyNotFound)
    }

    /// Returns a mutable reference to the value under `key`, or
    /// [`Error::KeyNotFound`].
    pub fn at_mut<Q>(&mut self, key: &Q) -> Result<&mut V, Error>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_mut(key).ok_or(Error::KeyNotFound)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).is_some()
    }

    /// Returns the number of entries under `key`: 0 or 1.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        usize::from(self.contains_key(key))
    }

    /// Returns a cursor at the entry under `key`, or the end cursor.
    pub fn find<Q>(&self, key: &Q) -> ChainedCursor<'_, K, V, S>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        match self.locate(hash, key) {
            Some((_, index)) => ChainedCursor {
                map: self,
                index: index as usize,
            },
            None => self.end(),
        }
    }

    /// Removes the entry under `key` and returns its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes the entry under `key` and returns the stored key and value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        let (prev, index) = self.locate(hash, key)?;
        let bucket = self.bucket_of(hash);
        self.unlink(bucket, prev, index)
            .map(|node| (node.key, node.value))
    }

    /// Removes the entry under `key`, returning how many entries were
    /// removed: 0 or 1.
    pub fn erase<Q>(&mut self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        usize::from(self.remove_entry(key).is_some())
    }

    /// Keeps only the entries for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        let mut index = self.begin().index;
        while index < self.nodes.capacity() {
            let keep = match self.nodes.get_mut(index) {
                Some(node) => f(&node.key, &mut node.value),
                None => true,
            };
            index = if keep {
                self.cursor_at(index + 1).index
            } else {
                match self.remove_at(index) {
                    Some((_, next)) => next,
                    None => self.cursor_at(index + 1).index,
                }
            };
        }
    }
}

impl<K, V, S> PartialEq for ChainedHashMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V, S> Eq for ChainedHashMap<K, V, S>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, Q, V, S> Index<&Q> for ChainedHashMap<K, V, S>
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if the key is not present.
    fn index(&self, key: &Q) -> &V {
        match self.get(key) {
            Some(value) => value,
            None => panic!("key not found"),
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for ChainedHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

impl<K, V, S> Extend<(K, V)> for ChainedHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Inserts every pair, overwriting the values of existing keys.
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for (k, v) in iter {
            self.insert_or_assign(k, v);
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a ChainedHashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A position in a [`ChainedHashMap`]: the arena index of an entry, or the
/// end.
///
/// Cursors compare equal when they point into the same map at the same index.
pub struct ChainedCursor<'a, K, V, S> {
    map: &'a ChainedHashMap<K, V, S>,
    index: usize,
}

impl<'a, K, V, S> ChainedCursor<'a, K, V, S> {
    /// The arena index, or the arena capacity at the end.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns `true` at the end position.
    pub fn is_end(&self) -> bool {
        self.index >= self.map.nodes.capacity()
    }

    /// Returns the entry under the cursor, or `None` at the end.
    pub fn get(&self) -> Option<(&'a K, &'a V)> {
        let node = self.map.nodes.get(self.index)?;
        Some((&node.key, &node.value))
    }

    /// Moves to the next entry in arena order. Stays put at the end.
    pub fn advance(&mut self) {
        if !self.is_end() {
            self.index = self.map.cursor_at(self.index + 1).index;
        }
    }
}

impl<K, V, S> Clone for ChainedCursor<'_, K, V, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V, S> Copy for ChainedCursor<'_, K, V, S> {}

impl<K, V, S> PartialEq for ChainedCursor<'_, K, V, S> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.map, other.map) && self.index == other.index
    }
}

impl<K, V, S> Eq for ChainedCursor<'_, K, V, S> {}

impl<K, V, S> Debug for ChainedCursor<'_, K, V, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChainedCursor")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// An iterator over the entries of a `ChainedHashMap`, in arena order.
pub struct Iter<'a, K, V, S> {
    cursor: ChainedCursor<'a, K, V, S>,
    remaining: usize,
}

impl<'a, K, V, S> Iterator for Iter<'a, K, V, S> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.cursor.get()?;
        self.cursor.advance();
        self.remaining -= 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, S> ExactSizeIterator for Iter<'_, K, V, S> {}
impl<K, V, S> FusedIterator for Iter<'_, K, V, S> {}
