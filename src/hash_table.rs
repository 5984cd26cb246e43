//! The raw table: values of type `V` addressed by caller-supplied hashes and
//! equality predicates.

use core::fmt::Debug;

use crate::config::Config;
use crate::config::LoadFactor;
use crate::control::DELETED;
use crate::control::EMPTY;
use crate::control::GROUP_WIDTH;
use crate::control::fragment;
use crate::control::is_deleted;
use crate::control::is_empty;
use crate::control::is_used;
use crate::error::Error;
use crate::error::infallible;
use crate::error::try_vec_with_capacity;
pub use crate::iter::Cursor;
pub use crate::iter::Drain;
pub use crate::iter::ExtractIf;
pub use crate::iter::IntoIter;
pub use crate::iter::Iter;
pub use crate::iter::IterMut;
use crate::iter::RawIter;
use crate::storage::MIN_CAPACITY;
use crate::storage::Storage;

/// Outcome of walking a probe sequence on the insert path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Probe {
    /// The key is stored at this slot.
    Found(usize),
    /// The key is absent; this is the first non-used slot on its path.
    Vacant(usize),
    /// Every group was visited without finding the key or a free slot.
    Exhausted,
}

/// An open-addressing hash table scanning 16 control bytes at a time.
///
/// `HashTable<V>` stores values of type `V` in a single allocation of
/// power-of-two size. Like a raw table, it does not know how to hash its
/// values: every lookup takes the value's hash and an equality predicate, and
/// every operation that may move values takes a re-hasher as well.
///
/// The re-hasher is only called while migrating to a new allocation, and only
/// when the table was configured not to store hashes (see
/// [`Config::with_store_hash`]). It must return the same hash that was used to
/// insert each value.
///
/// ## Layout
///
/// Each slot has one control byte. Used slots hold the top seven bits of their
/// hash, so a group of 16 slots is filtered with one SIMD compare before any
/// value is touched. Lookups walk groups linearly from the home group
/// `(hash & (slots - 1)) / 16` and stop at the first group containing an empty
/// slot. Erasing from a full group leaves a tombstone so that later keys stay
/// reachable; erasing from any other group frees the slot outright.
///
/// ## Performance Characteristics
///
/// - **Memory**: 1 byte of control per slot, plus `V`, plus a `u64` per slot
///   when hashes are stored.
/// - **Growth**: the table grows when an insert of a new value would exceed
///   [`capacity`](HashTable::capacity), and rehashes in place when tombstones
///   leave fewer than one empty slot in eight.
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use flat16::hash_table::Entry;
/// # use flat16::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # #[derive(Debug, PartialEq)]
/// # struct Person {
/// #     id: u64,
/// #     name: String,
/// # }
/// #
/// # fn hash_id(id: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     id.hash(&mut hasher);
/// #     hasher.finish()
/// # }
///
/// let mut table = HashTable::with_capacity(100);
/// let hash = hash_id(123);
///
/// match table.entry(hash, |p: &Person| p.id == 123, |p| hash_id(p.id)) {
///     Entry::Vacant(entry) => {
///         entry.insert(Person {
///             id: 123,
///             name: "Alice".to_string(),
///         });
///     }
///     Entry::Occupied(_) => {
///         println!("Person already exists");
///     }
/// }
///
/// assert_eq!(table.find(hash, |p| p.id == 123).unwrap().name, "Alice");
/// ```
pub struct HashTable<V> {
    pub(crate) storage: Storage<V>,
    pub(crate) len: usize,
    pub(crate) tombstones: usize,
    threshold: usize,
    config: Config,
}

impl<V> Debug for HashTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field("len", &self.len)
            .field("tombstones", &self.tombstones)
            .field("capacity", &self.threshold)
            .field("storage", &self.storage)
            .finish()
    }
}

impl<V> Clone for HashTable<V>
where
    V: Clone,
{
    /// Clones every live value into a fresh allocation of the same size.
    ///
    /// The slot layout, tombstones included, is reproduced exactly so that no
    /// hashing is needed.
    fn clone(&self) -> Self {
        let mut storage = Storage::new(self.storage.capacity(), self.storage.store_hash());

        for index in 0..self.storage.capacity() {
            // SAFETY: `index` is below capacity in both storages, which have
            // the same size. A used source slot holds an initialized value and
            // the destination slot is still vacant. The control byte is only
            // published once the clone succeeded, so a panicking `clone`
            // leaves `storage` consistent.
            unsafe {
                let ctrl = self.storage.ctrl(index);
                if is_used(ctrl) {
                    storage.write_value(index, self.storage.get(index).clone());
                    if let Some(hash) = self.storage.hash(index) {
                        storage.write_hash(index, hash);
                    }
                    storage.set_ctrl(index, ctrl);
                } else if is_deleted(ctrl) {
                    storage.set_ctrl(index, DELETED);
                }
            }
        }

        HashTable {
            storage,
            len: self.len,
            tombstones: self.tombstones,
            threshold: self.threshold,
            config: self.config,
        }
    }
}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> HashTable<V> {
    /// Creates an empty table with the default configuration.
    ///
    /// The smallest table still allocates four slots.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let table: HashTable<u32> = HashTable::new();
    /// assert_eq!(table.slot_count(), 4);
    /// assert_eq!(table.capacity(), 2);
    /// ```
    pub fn new() -> Self {
        Self::with_capacity_and_config(0, Config::new())
    }

    /// Creates a table that can hold at least `capacity` values without
    /// growing.
    ///
    /// # Panics
    ///
    /// Panics if the required slot count overflows `usize`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let table: HashTable<String> = HashTable::with_capacity(100);
    /// assert!(table.capacity() >= 100);
    /// assert!(table.slot_count().is_power_of_two());
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_config(capacity, Config::new())
    }

    /// Creates an empty table with the given configuration.
    pub fn with_config(config: Config) -> Self {
        Self::with_capacity_and_config(0, config)
    }

    /// Creates a table with the given configuration that can hold at least
    /// `capacity` values without growing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::Config;
    /// # use flat16::HashTable;
    /// #
    /// let config = Config::new().with_max_load_factor(0.8).with_store_hash(false);
    /// let table: HashTable<u64> = HashTable::with_capacity_and_config(12, config);
    /// assert_eq!(table.slot_count(), 16);
    /// assert_eq!(table.capacity(), 12);
    /// ```
    pub fn with_capacity_and_config(capacity: usize, config: Config) -> Self {
        infallible(Self::try_with_capacity_and_config(capacity, config))
    }

    /// Fallible variant of [`HashTable::with_capacity_and_config`].
    pub fn try_with_capacity_and_config(capacity: usize, config: Config) -> Result<Self, Error> {
        let slots = config
            .max_load_factor()
            .slots_for(capacity)
            .ok_or(Error::CapacityOverflow)?;
        let storage = Storage::try_new(slots, config.store_hash())?;

        Ok(HashTable {
            threshold: config.max_load_factor().threshold(slots),
            storage,
            len: 0,
            tombstones: 0,
            config,
        })
    }

    /// Returns the number of values in the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// assert_eq!(table.len(), 0);
    ///
    /// table.entry(1, |&v: &u64| v == 1, |&v| v).or_insert(1);
    /// table.entry(2, |&v: &u64| v == 2, |&v| v).or_insert(2);
    /// assert_eq!(table.len(), 2);
    /// ```
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table contains no values.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of values the table can hold before it grows.
    ///
    /// This is the slot count scaled by the maximum load factor, and is always
    /// below [`slot_count`](HashTable::slot_count).
    pub fn capacity(&self) -> usize {
        self.threshold
    }

    /// Returns the number of slots in the table. Always a power of two, and
    /// at least four.
    pub fn slot_count(&self) -> usize {
        self.storage.capacity()
    }

    /// Returns the current fraction of slots holding values.
    pub fn load_factor(&self) -> f64 {
        self.len as f64 / self.storage.capacity() as f64
    }

    /// Returns the maximum load factor.
    pub fn max_load_factor(&self) -> f64 {
        self.config.max_load_factor().get()
    }

    /// Returns the configuration the table was built with.
    pub fn config(&self) -> Config {
        self.config
    }

    /// Returns an iterator over all values in the table, in slot order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// for v in [3u64, 1, 2] {
    ///     table.entry(v, |&x| x == v, |&x| x).or_insert(v);
    /// }
    ///
    /// let mut values: Vec<_> = table.iter().copied().collect();
    /// values.sort();
    /// assert_eq!(values, [1, 2, 3]);
    /// ```
    pub fn iter(&self) -> Iter<'_, V> {
        Iter::new(self)
    }

    /// Returns an iterator yielding mutable references to all values.
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        IterMut::new(self)
    }

    /// Removes all values from the table and yields them. The allocation is
    /// kept.
    ///
    /// Values not consumed by the iterator are dropped when it is dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.entry(7, |&x: &u64| x == 7, |&x| x).or_insert(7);
    ///
    /// let drained: Vec<_> = table.drain().collect();
    /// assert_eq!(drained, [7]);
    /// assert!(table.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, V> {
        Drain::new(self)
    }

    /// Removes and yields every value for which `f` returns `true`.
    ///
    /// Values the iterator does not reach are kept.
    pub fn extract_if<F>(&mut self, f: F) -> ExtractIf<'_, V, F>
    where
        F: FnMut(&mut V) -> bool,
    {
        ExtractIf::new(self, f)
    }

    /// Keeps only the values for which `f` returns `true`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// for v in 0u64..10 {
    ///     table.entry(v, |&x| x == v, |&x| x).or_insert(v);
    /// }
    ///
    /// table.retain(|v| *v % 2 == 0);
    /// assert_eq!(table.len(), 5);
    /// ```
    pub fn retain(&mut self, mut f: impl FnMut(&mut V) -> bool) {
        let mut iter = RawIter::new(&self.storage, self.len);
        while let Some(value) = iter.extract_next(self, |value| !f(value)) {
            drop(value);
        }
    }

    /// Drops every value. The allocation is kept and every tombstone is
    /// cleared.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(64);
    /// table.entry(1, |&x: &u64| x == 1, |&x| x).or_insert(1);
    ///
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert!(table.capacity() >= 64);
    /// ```
    pub fn clear(&mut self) {
        self.storage.clear();
        self.len = 0;
        self.tombstones = 0;
    }

    /// Swaps the contents of two tables without moving any value.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns a reference to the value matching `hash` and `eq`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use flat16::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::new();
    /// table
    ///     .entry(hash_str("key"), |s: &String| s == "key", |s| hash_str(s))
    ///     .or_insert("key".to_string());
    ///
    /// assert_eq!(
    ///     table.find(hash_str("key"), |s| s == "key").map(String::as_str),
    ///     Some("key")
    /// );
    /// assert!(table.find(hash_str("nope"), |s| s == "nope").is_none());
    /// ```
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        let index = self.find_index(hash, eq)?;
        // SAFETY: `find_index` only returns used slots.
        Some(unsafe { self.storage.get(index) })
    }

    /// Returns a mutable reference to the value matching `hash` and `eq`.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        let index = self.find_index(hash, eq)?;
        // SAFETY: `find_index` only returns used slots.
        Some(unsafe { self.storage.get_mut(index) })
    }

    /// Returns a cursor at the value matching `hash` and `eq`, or the end
    /// cursor when there is none.
    pub fn find_cursor(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Cursor<'_, V> {
        match self.find_index(hash, eq) {
            Some(index) => Cursor::new(self, index),
            None => self.end(),
        }
    }

    /// Returns a cursor at the lowest used slot, or the end cursor for an
    /// empty table.
    ///
    /// Finding the first value scans control bytes from slot zero, so this
    /// costs up to one group load per 16 slots.
    pub fn begin(&self) -> Cursor<'_, V> {
        Cursor::new(self, self.next_used_index(0))
    }

    /// Returns the end cursor, whose index equals the slot count.
    pub fn end(&self) -> Cursor<'_, V> {
        Cursor::new(self, self.storage.capacity())
    }

    /// Returns a cursor at the first used slot at or after `index`.
    pub fn cursor_at(&self, index: usize) -> Cursor<'_, V> {
        Cursor::new(self, self.next_used_index(index))
    }

    /// Returns the value stored at slot `index`, if the slot is used.
    pub fn get_at(&self, index: usize) -> Option<&V> {
        if !self.is_used_at(index) {
            return None;
        }
        // SAFETY: The slot was just checked to be used.
        Some(unsafe { self.storage.get(index) })
    }

    /// Returns a mutable reference to the value stored at slot `index`, if
    /// the slot is used.
    pub fn get_at_mut(&mut self, index: usize) -> Option<&mut V> {
        if !self.is_used_at(index) {
            return None;
        }
        // SAFETY: The slot was just checked to be used.
        Some(unsafe { self.storage.get_mut(index) })
    }

    /// Removes the value at slot `index`, returning it along with the index
    /// of the next used slot (the slot count if there is none).
    ///
    /// Removal never moves other values, so the returned index stays valid
    /// until the table is next modified.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// for v in 0u64..3 {
    ///     table.entry(v, |&x| x == v, |&x| x).or_insert(v);
    /// }
    ///
    /// let mut index = table.begin().index();
    /// let mut removed = Vec::new();
    /// while let Some((value, next)) = table.remove_at(index) {
    ///     removed.push(value);
    ///     index = next;
    /// }
    /// assert_eq!(removed.len(), 3);
    /// assert!(table.is_empty());
    /// ```
    pub fn remove_at(&mut self, index: usize) -> Option<(V, usize)> {
        if !self.is_used_at(index) {
            return None;
        }
        // SAFETY: The slot was just checked to be used.
        let value = unsafe { self.erase_slot(index) };
        Some((value, self.next_used_index(index + 1)))
    }

    /// Removes and returns the value matching `hash` and `eq`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.entry(42, |&n: &u64| n == 42, |&n| n).or_insert(42);
    ///
    /// assert_eq!(table.remove(42, |&n| n == 42), Some(42));
    /// assert!(table.is_empty());
    /// assert_eq!(table.remove(42, |&n| n == 42), None);
    /// ```
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        let index = self.find_index(hash, eq)?;
        // SAFETY: `find_index` only returns used slots.
        Some(unsafe { self.erase_slot(index) })
    }

    /// Gets the entry for the value matching `hash` and `eq`.
    ///
    /// If the value is absent and inserting one would exceed the capacity, the
    /// table grows first, calling `hasher` on stored values when hashes are
    /// not kept.
    ///
    /// # Panics
    ///
    /// Panics if the new slot count overflows `usize`. Allocation failure is
    /// reported through `handle_alloc_error`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use flat16::hash_table::Entry;
    /// # use flat16::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table = HashTable::new();
    /// let hash = hash_str("hello");
    ///
    /// match table.entry(hash, |s: &String| s == "hello", |s| hash_str(s)) {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert("hello".to_string());
    ///     }
    ///     Entry::Occupied(mut entry) => {
    ///         entry.get_mut().push('!');
    ///     }
    /// }
    ///
    /// table
    ///     .entry(hash, |s| s == "hello", |s| hash_str(s))
    ///     .or_insert("ignored".to_string());
    /// assert_eq!(table.len(), 1);
    /// ```
    #[inline]
    pub fn entry(
        &mut self,
        hash: u64,
        eq: impl Fn(&V) -> bool,
        hasher: impl Fn(&V) -> u64,
    ) -> Entry<'_, V> {
        infallible(self.try_entry(hash, eq, hasher))
    }

    /// Fallible variant of [`HashTable::entry`].
    ///
    /// If growing fails the table is left exactly as it was.
    pub fn try_entry(
        &mut self,
        hash: u64,
        eq: impl Fn(&V) -> bool,
        hasher: impl Fn(&V) -> u64,
    ) -> Result<Entry<'_, V>, Error> {
        match self.probe(hash, &eq) {
            Probe::Found(index) => {
                return Ok(Entry::Occupied(OccupiedEntry { table: self, index }));
            }
            Probe::Vacant(index) => {
                if self.len + 1 > self.threshold {
                    self.grow_for_insert(&hasher)?;
                } else if self.needs_purge(index) {
                    self.try_resize(self.storage.capacity(), &hasher)?;
                } else {
                    return Ok(Entry::Vacant(VacantEntry {
                        table: self,
                        hash,
                        index,
                    }));
                }
            }
            Probe::Exhausted => {
                debug_assert!(false, "probe visited every group without a free slot");
                self.grow_for_insert(&hasher)?;
            }
        }

        // The key is known to be absent, and the fresh allocation has no
        // tombstones, so the first free slot on the path is the one to use.
        let index = Self::first_vacant(&self.storage, hash).ok_or(Error::CapacityOverflow)?;
        Ok(Entry::Vacant(VacantEntry {
            table: self,
            hash,
            index,
        }))
    }

    /// Reserves room for at least `additional` more values.
    ///
    /// # Panics
    ///
    /// Panics if the new slot count overflows `usize`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.reserve(50, |&v| v);
    /// assert!(table.capacity() >= 50);
    /// ```
    pub fn reserve(&mut self, additional: usize, hasher: impl Fn(&V) -> u64) {
        infallible(self.try_reserve(additional, hasher))
    }

    /// Fallible variant of [`HashTable::reserve`]. On error the table is
    /// unchanged.
    pub fn try_reserve(
        &mut self,
        additional: usize,
        hasher: impl Fn(&V) -> u64,
    ) -> Result<(), Error> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;
        if required <= self.threshold {
            return Ok(());
        }

        let slots = self
            .config
            .max_load_factor()
            .slots_for(required)
            .ok_or(Error::CapacityOverflow)?;
        self.try_resize(slots, &hasher)
    }

    /// Reallocates the table so that it holds at least `count` values (and at
    /// least its current contents) without growing.
    ///
    /// The table is always rebuilt, even when the slot count does not change,
    /// so every tombstone is purged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.entry(1, |&v| v == 1, |&v| v).or_insert(1);
    ///
    /// table.rehash(16, |&v| v);
    /// assert_eq!(table.slot_count(), 32);
    /// assert_eq!(table.find(1, |&v| v == 1), Some(&1));
    /// ```
    pub fn rehash(&mut self, count: usize, hasher: impl Fn(&V) -> u64) {
        infallible(self.try_rehash(count, hasher))
    }

    /// Fallible variant of [`HashTable::rehash`]. On error the table is
    /// unchanged.
    pub fn try_rehash(&mut self, count: usize, hasher: impl Fn(&V) -> u64) -> Result<(), Error> {
        let slots = self
            .config
            .max_load_factor()
            .slots_for(count.max(self.len))
            .ok_or(Error::CapacityOverflow)?;
        self.try_resize(slots, &hasher)
    }

    /// Shrinks the table to the smallest slot count that holds its values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::with_capacity(1000);
    /// table.entry(5, |&v| v == 5, |&v| v).or_insert(5);
    ///
    /// table.shrink_to_fit(|&v| v);
    /// assert_eq!(table.slot_count(), 4);
    /// assert_eq!(table.find(5, |&v| v == 5), Some(&5));
    /// ```
    pub fn shrink_to_fit(&mut self, hasher: impl Fn(&V) -> u64) {
        let slots = self
            .config
            .max_load_factor()
            .slots_for(self.len)
            .unwrap_or(self.storage.capacity());
        if slots < self.storage.capacity() {
            infallible(self.try_resize(slots, &hasher));
        }
    }

    /// Changes the maximum load factor (clamped to `[0.2, 0.8]`), growing the
    /// table if its values no longer fit.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::with_capacity(8);
    /// for v in 0..8 {
    ///     table.entry(v, |&x| x == v, |&x| x).or_insert(v);
    /// }
    ///
    /// table.set_max_load_factor(0.2, |&x| x);
    /// assert_eq!(table.max_load_factor(), 0.2);
    /// assert!(table.capacity() >= 8);
    /// ```
    pub fn set_max_load_factor(&mut self, max_load_factor: f64, hasher: impl Fn(&V) -> u64) {
        let max_load_factor = LoadFactor::new(max_load_factor);
        self.config.set_max_load_factor(max_load_factor);
        self.threshold = max_load_factor.threshold(self.storage.capacity());

        if self.len > self.threshold {
            let slots = max_load_factor.slots_for(self.len);
            infallible(
                slots
                    .ok_or(Error::CapacityOverflow)
                    .and_then(|slots| self.try_resize(slots, &hasher)),
            );
        }
    }

    /// Index of the first used slot at or after `start`, or the slot count.
    pub(crate) fn next_used_index(&self, start: usize) -> usize {
        let capacity = self.storage.capacity();
        if start >= capacity || self.len == 0 {
            return capacity;
        }

        let num_groups = self.storage.num_groups();
        let mut group = start / GROUP_WIDTH;
        // SAFETY: `start` is below capacity, so its group exists.
        let mut used =
            unsafe { self.storage.group(group).match_used() }.from_offset(start % GROUP_WIDTH);
        loop {
            if let Some(bit) = used.lowest_set_bit() {
                return group * GROUP_WIDTH + bit;
            }
            group += 1;
            if group == num_groups {
                return capacity;
            }
            // SAFETY: `group` was just checked against `num_groups`.
            used = unsafe { self.storage.group(group).match_used() };
        }
    }

    #[inline(always)]
    fn is_used_at(&self, index: usize) -> bool {
        // SAFETY: `index` is checked against capacity first.
        index < self.storage.capacity() && is_used(unsafe { self.storage.ctrl(index) })
    }

    #[inline(always)]
    fn home_group(storage: &Storage<V>, hash: u64) -> usize {
        (hash as usize & storage.mask()) / GROUP_WIDTH
    }

    /// Walks the probe sequence of `hash` until the value is found or a group
    /// with an empty slot ends the search.
    #[inline]
    pub(crate) fn find_index(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<usize> {
        if self.len == 0 {
            return None;
        }

        let h2 = fragment(hash);
        let group_mask = self.storage.num_groups() - 1;
        let mut group = Self::home_group(&self.storage, hash);

        for _ in 0..=group_mask {
            // SAFETY: `group` is masked to the group count.
            let ctrl = unsafe { self.storage.group(group) };
            for bit in ctrl.match_fragment(h2) {
                let index = group * GROUP_WIDTH + bit;
                // SAFETY: The fragment matched, so the slot is used.
                if eq(unsafe { self.storage.get(index) }) {
                    return Some(index);
                }
            }

            if ctrl.match_empty().any_bit_set() {
                return None;
            }
            group = (group + 1) & group_mask;
        }

        debug_assert!(false, "lookup visited every group without an empty slot");
        None
    }

    /// The full lookup of the insert path. While scanning, remembers the
    /// first deleted-or-empty slot in probe order, lowest index first within
    /// a group.
    #[inline]
    fn probe(&self, hash: u64, eq: &impl Fn(&V) -> bool) -> Probe {
        let h2 = fragment(hash);
        let group_mask = self.storage.num_groups() - 1;
        let mut group = Self::home_group(&self.storage, hash);
        let mut vacant = None;

        for _ in 0..=group_mask {
            // SAFETY: `group` is masked to the group count.
            let ctrl = unsafe { self.storage.group(group) };
            if self.len > 0 {
                for bit in ctrl.match_fragment(h2) {
                    let index = group * GROUP_WIDTH + bit;
                    // SAFETY: The fragment matched, so the slot is used.
                    if eq(unsafe { self.storage.get(index) }) {
                        return Probe::Found(index);
                    }
                }
            }

            if vacant.is_none() {
                vacant = ctrl
                    .match_empty_or_deleted()
                    .lowest_set_bit()
                    .map(|bit| group * GROUP_WIDTH + bit);
            }

            if ctrl.match_empty().any_bit_set() {
                break;
            }
            group = (group + 1) & group_mask;
        }

        match vacant {
            Some(index) => Probe::Vacant(index),
            None => Probe::Exhausted,
        }
    }

    /// First deleted-or-empty slot on the probe path of `hash`.
    #[inline]
    fn first_vacant(storage: &Storage<V>, hash: u64) -> Option<usize> {
        let group_mask = storage.num_groups() - 1;
        let mut group = Self::home_group(storage, hash);

        for _ in 0..=group_mask {
            // SAFETY: `group` is masked to the group count.
            let vacant = unsafe { storage.group(group).match_empty_or_deleted() };
            if let Some(bit) = vacant.lowest_set_bit() {
                return Some(group * GROUP_WIDTH + bit);
            }
            group = (group + 1) & group_mask;
        }

        None
    }

    /// Whether filling the empty slot `index` would leave fewer than one
    /// empty slot in eight.
    #[inline]
    fn needs_purge(&self, index: usize) -> bool {
        let capacity = self.storage.capacity();
        let max_occupied = capacity - (capacity / 8).max(1);
        // SAFETY: `index` came from a probe of this storage.
        let filling_empty = is_empty(unsafe { self.storage.ctrl(index) });
        filling_empty && self.len + self.tombstones + 1 > max_occupied
    }

    #[cold]
    fn grow_for_insert(&mut self, hasher: &impl Fn(&V) -> u64) -> Result<(), Error> {
        let required = self.len.checked_add(1).ok_or(Error::CapacityOverflow)?;
        let slots = self
            .config
            .max_load_factor()
            .slots_for(required)
            .ok_or(Error::CapacityOverflow)?;
        self.try_resize(slots, hasher)
    }

    /// Moves every value into a fresh allocation of `slots` slots.
    ///
    /// Nothing is modified until the new allocation and every hash are in
    /// hand: if allocating fails or `hasher` panics, the table is untouched.
    /// The moves themselves cannot fail.
    fn try_resize(&mut self, slots: usize, hasher: &impl Fn(&V) -> u64) -> Result<(), Error> {
        debug_assert!(self.config.max_load_factor().threshold(slots) >= self.len);

        let mut storage = Storage::try_new(slots, self.storage.store_hash())?;

        let hashes = if self.storage.store_hash() {
            alloc::vec::Vec::new()
        } else {
            let mut hashes = try_vec_with_capacity(self.len)?;
            let mut iter = RawIter::new(&self.storage, self.len);
            while let Some(index) = iter.next_index(&self.storage) {
                // SAFETY: The raw iterator only yields used slots.
                hashes.push(hasher(unsafe { self.storage.get(index) }));
            }
            hashes
        };

        let mut iter = RawIter::new(&self.storage, self.len);
        let mut moved = 0;
        while let Some(index) = iter.next_index(&self.storage) {
            // SAFETY: The source slot is used. The destination has no
            // tombstones and room for every value, so `first_vacant` finds an
            // empty slot.
            unsafe {
                let hash = match self.storage.hash(index) {
                    Some(hash) => hash,
                    None => *hashes.get_unchecked(moved),
                };
                let Some(target) = Self::first_vacant(&storage, hash) else {
                    unreachable!("fresh storage has a free slot for every value");
                };
                storage.move_from(target, fragment(hash), hash, &self.storage, index);
            }
            moved += 1;
        }
        debug_assert_eq!(moved, self.len);

        // Every value now lives in `storage`; forget them in the old one
        // before it is dropped.
        self.storage.reset_ctrl();
        self.storage = storage;
        self.tombstones = 0;
        self.threshold = self.config.max_load_factor().threshold(slots);
        Ok(())
    }

    /// Detaches the storage, leaving an empty minimum-size table behind. If
    /// the storage is never reattached its values are leaked and the table
    /// stays empty.
    pub(crate) fn detach_storage(&mut self) -> Storage<V> {
        let empty = Storage::new(MIN_CAPACITY, self.storage.store_hash());
        self.len = 0;
        self.tombstones = 0;
        self.threshold = self.config.max_load_factor().threshold(MIN_CAPACITY);
        core::mem::replace(&mut self.storage, empty)
    }

    /// Swaps storage taken by [`HashTable::detach_storage`] back in, handing
    /// the placeholder out through `storage`. The reattached storage must
    /// hold no used or deleted slots.
    pub(crate) fn reattach_storage(&mut self, storage: &mut Storage<V>) {
        debug_assert_eq!(self.len, 0);
        core::mem::swap(&mut self.storage, storage);
        self.tombstones = 0;
        self.threshold = self.config.max_load_factor().threshold(self.storage.capacity());
    }

    /// Moves the value out of slot `index` and updates its control byte.
    ///
    /// # Safety
    ///
    /// The slot at `index` must be used.
    pub(crate) unsafe fn erase_slot(&mut self, index: usize) -> V {
        // SAFETY: Caller ensures the slot is used, so its group exists and its
        // payload is initialized. The control byte is updated before the value
        // leaves, so the slot is never observed as used and uninitialized.
        unsafe {
            let group = self.storage.group(index / GROUP_WIDTH);
            if group.match_empty().any_bit_set() {
                self.storage.set_ctrl(index, EMPTY);
            } else {
                self.storage.set_ctrl(index, DELETED);
                self.tombstones += 1;
            }
            self.len -= 1;
            self.storage.take(index)
        }
    }
}

impl<V> IntoIterator for HashTable<V> {
    type Item = V;
    type IntoIter = IntoIter<V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter::new(self)
    }
}

impl<'a, V> IntoIterator for &'a HashTable<V> {
    type Item = &'a V;
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, V> IntoIterator for &'a mut HashTable<V> {
    type Item = &'a mut V;
    type IntoIter = IterMut<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// A view into a single entry in the table, which may be vacant or occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashTable`].
///
/// [`entry`]: HashTable::entry
///
/// # Examples
///
/// ```rust
/// # use flat16::hash_table::Entry;
/// # use flat16::hash_table::HashTable;
/// #
/// let mut table = HashTable::new();
///
/// match table.entry(9, |&v: &u64| v == 9, |&v| v) {
///     Entry::Vacant(entry) => {
///         entry.insert(9);
///     }
///     Entry::Occupied(entry) => {
///         println!("already present: {}", entry.get());
///     }
/// }
/// ```
pub enum Entry<'a, V> {
    /// The value is not present in the table.
    Vacant(VacantEntry<'a, V>),
    /// The value is present in the table.
    Occupied(OccupiedEntry<'a, V>),
}

impl<'a, V> Entry<'a, V> {
    /// Inserts `default` if the entry is vacant, and returns a mutable
    /// reference to the value in the entry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// let value = table
    ///     .entry(3, |p: &(u64, &str)| p.0 == 3, |p| p.0)
    ///     .or_insert((3, "three"));
    /// assert_eq!(value.1, "three");
    ///
    /// let existing = table
    ///     .entry(3, |p| p.0 == 3, |p| p.0)
    ///     .or_insert((3, "other"));
    /// assert_eq!(existing.1, "three");
    /// ```
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the result of `default` if the entry is vacant. The closure is
    /// only called when a value is inserted.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Calls `f` on the value if the entry is occupied.
    pub fn and_modify(mut self, f: impl FnOnce(&mut V)) -> Self {
        if let Entry::Occupied(entry) = &mut self {
            f(entry.get_mut());
        }
        self
    }

    /// Inserts `V::default()` if the entry is vacant.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(V::default)
    }
}

/// A view into a vacant entry of a [`HashTable`].
///
/// The slot has already been chosen: it is the first deleted or empty slot on
/// the probe path of the hash.
pub struct VacantEntry<'a, V> {
    table: &'a mut HashTable<V>,
    hash: u64,
    index: usize,
}

impl<'a, V> VacantEntry<'a, V> {
    /// Inserts the value and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        let table = self.table;
        // SAFETY: `index` was chosen by a probe of this storage and is not
        // used, so it is in bounds and its payload is uninitialized.
        unsafe {
            if is_deleted(table.storage.ctrl(self.index)) {
                table.tombstones -= 1;
            }
            table.len += 1;
            table.storage.write_hash(self.index, self.hash);
            table.storage.set_ctrl(self.index, fragment(self.hash));
            table.storage.write_value(self.index, value)
        }
    }

    /// Returns the slot the value will be written to.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A view into an occupied entry of a [`HashTable`].
pub struct OccupiedEntry<'a, V> {
    table: &'a mut HashTable<V>,
    index: usize,
}

impl<'a, V> OccupiedEntry<'a, V> {
    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        // SAFETY: The entry was found at a used slot and the table is
        // borrowed for the entry's lifetime.
        unsafe { self.table.storage.get(self.index) }
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: As in `get`.
        unsafe { self.table.storage.get_mut(self.index) }
    }

    /// Converts the entry into a mutable reference with the entry's lifetime.
    pub fn into_mut(self) -> &'a mut V {
        let table = self.table;
        // SAFETY: As in `get`.
        unsafe { table.storage.get_mut(self.index) }
    }

    /// Removes the value from the table and returns it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::hash_table::Entry;
    /// # use flat16::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.entry(1, |&v: &u64| v == 1, |&v| v).or_insert(1);
    ///
    /// let removed = match table.entry(1, |&v| v == 1, |&v| v) {
    ///     Entry::Occupied(entry) => entry.remove(),
    ///     Entry::Vacant(_) => unreachable!(),
    /// };
    /// assert_eq!(removed, 1);
    /// assert!(table.is_empty());
    /// ```
    pub fn remove(self) -> V {
        // SAFETY: As in `get`.
        unsafe { self.table.erase_slot(self.index) }
    }

    /// Returns the slot holding the value.
    pub fn index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::hash::Hasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct Item {
        key: u64,
        value: i32,
    }

    fn hash_key(state: &HashState, key: u64) -> u64 {
        let mut h = state.build_hasher();
        h.write_u64(key);
        h.finish()
    }

    fn insert_item(table: &mut HashTable<Item>, state: &HashState, key: u64, value: i32) {
        match table.entry(
            hash_key(state, key),
            |v| v.key == key,
            |v| hash_key(state, v.key),
        ) {
            Entry::Vacant(entry) => {
                entry.insert(Item { key, value });
            }
            Entry::Occupied(_) => panic!("{key} already present"),
        }
    }

    fn assert_consistent<V>(table: &HashTable<V>) {
        assert!(table.slot_count().is_power_of_two());
        assert!(table.slot_count() >= 4);
        assert!(table.len() <= table.capacity());
        assert!(table.capacity() < table.slot_count());
        assert_eq!(table.iter().count(), table.len());
        assert_eq!(table.storage.count_deleted(), table.tombstones);
    }

    #[test]
    fn new_table_allocates_minimum() {
        let table: HashTable<u64> = HashTable::new();
        assert_eq!(table.slot_count(), 4);
        assert_eq!(table.capacity(), 2);
        assert!(table.is_empty());
        assert_eq!(table.begin(), table.end());
        assert!(table.find(0, |_| true).is_none());
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..32u64 {
            insert_item(&mut table, &state, k, (k as i32) * 2);
            assert_eq!(
                table.find(hash_key(&state, k), |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: (k as i32) * 2
                }),
                "{:#?}",
                table
            );
        }

        for k in 0..32u64 {
            let item = table.find(hash_key(&state, k), |v| v.key == k).unwrap();
            assert_eq!(item.value, (k as i32) * 2);
        }
        assert!(table.find(hash_key(&state, 99), |v| v.key == 99).is_none());
        assert_consistent(&table);
    }

    #[test]
    fn duplicate_entry_is_occupied() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(8);
        let hash = hash_key(&state, 42);
        table
            .entry(hash, |v| v.key == 42, |v| hash_key(&state, v.key))
            .or_insert(Item { key: 42, value: 1 });

        match table.entry(hash, |v| v.key == 42, |v| hash_key(&state, v.key)) {
            Entry::Occupied(entry) => assert_eq!(entry.get().value, 1),
            Entry::Vacant(_) => panic!("expected occupied"),
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn find_mut_and_modify() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(8);
        insert_item(&mut table, &state, 7, 10);

        table
            .find_mut(hash_key(&state, 7), |v| v.key == 7)
            .unwrap()
            .value += 5;
        table
            .entry(hash_key(&state, 7), |v| v.key == 7, |v| hash_key(&state, v.key))
            .and_modify(|v| v.value *= 2)
            .or_insert(Item { key: 7, value: 0 });

        assert_eq!(
            table.find(hash_key(&state, 7), |v| v.key == 7).unwrap().value,
            30
        );
    }

    #[test]
    fn remove_items() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..100u64 {
            insert_item(&mut table, &state, k, k as i32);
        }

        for k in (0..100u64).step_by(2) {
            let removed = table.remove(hash_key(&state, k), |v| v.key == k);
            assert_eq!(removed, Some(Item { key: k, value: k as i32 }));
            assert_eq!(table.remove(hash_key(&state, k), |v| v.key == k), None);
        }

        assert_eq!(table.len(), 50);
        for k in 0..100u64 {
            let found = table.find(hash_key(&state, k), |v| v.key == k);
            assert_eq!(found.is_some(), k % 2 == 1);
        }
        assert_consistent(&table);
    }

    #[test]
    fn insert_many() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..5000u64 {
            insert_item(&mut table, &state, k, k as i32);
            assert!(table.len() <= table.capacity());
        }
        assert_eq!(table.len(), 5000);
        assert_eq!(table.slot_count(), 16384);
        for k in 0..5000u64 {
            assert!(table.find(hash_key(&state, k), |v| v.key == k).is_some());
        }
        assert_consistent(&table);
    }

    #[test]
    fn explicit_collision() {
        let mut table: HashTable<Item> = HashTable::with_capacity(64);
        for k in 0..40u64 {
            match table.entry(0, |v| v.key == k, |_| 0) {
                Entry::Vacant(entry) => {
                    entry.insert(Item { key: k, value: k as i32 });
                }
                Entry::Occupied(_) => panic!("unexpected occupied"),
            }
        }

        for k in 0..40u64 {
            let cursor = table.find_cursor(0, |v| v.key == k);
            assert_eq!(cursor.index(), k as usize);
            assert_eq!(cursor.get().unwrap().value, k as i32);
        }
        assert!(table.find(0, |v| v.key == 40).is_none());
    }

    #[test]
    fn insert_takes_lowest_free_slot_in_group() {
        let mut table: HashTable<u64> = HashTable::with_capacity(32);
        for k in 0..6u64 {
            table.entry(0, |&v| v == k, |_| 0).or_insert(k);
        }
        assert_eq!(table.find_cursor(0, |&v| v == 4).index(), 4);

        // Group 0 still has empty slots, so no tombstone is left behind.
        assert_eq!(table.remove(0, |&v| v == 2), Some(2));
        assert_eq!(table.tombstones, 0);

        match table.entry(0, |&v| v == 100, |_| 0) {
            Entry::Vacant(entry) => {
                assert_eq!(entry.index(), 2);
                entry.insert(100);
            }
            Entry::Occupied(_) => panic!("expected vacant"),
        }
        assert_consistent(&table);
    }

    #[test]
    fn tombstone_ahead_of_later_empty_is_reused() {
        let mut table: HashTable<u64> = HashTable::with_capacity(32);
        assert_eq!(table.slot_count(), 64);
        for k in 0..17u64 {
            table.entry(0, |&v| v == k, |_| 0).or_insert(k);
        }
        assert_eq!(table.find_cursor(0, |&v| v == 16).index(), 16);

        assert_eq!(table.remove(0, |&v| v == 5), Some(5));
        assert_eq!(table.tombstones, 1);
        assert!(table.find(0, |&v| v == 16).is_some());

        match table.entry(0, |&v| v == 200, |_| 0) {
            Entry::Vacant(entry) => {
                assert_eq!(entry.index(), 5);
                entry.insert(200);
            }
            Entry::Occupied(_) => panic!("expected vacant"),
        }
        assert_eq!(table.tombstones, 0);

        // Group 1 has empty slots, so erasing there frees the slot outright.
        assert_eq!(table.remove(0, |&v| v == 16), Some(16));
        assert_eq!(table.tombstones, 0);
        assert_consistent(&table);
    }

    #[test]
    fn churn_purges_tombstones_without_growing() {
        let state = HashState::default();
        let mut table: HashTable<u64> = HashTable::with_capacity(32);
        let slots = table.slot_count();
        let hasher = |v: &u64| hash_key(&state, *v);

        for k in 0..10_000u64 {
            table.entry(hasher(&k), |&v| v == k, hasher).or_insert(k);
            if k >= 20 {
                let old = k - 20;
                assert_eq!(table.remove(hasher(&old), |&v| v == old), Some(old));
            }
            assert_eq!(table.slot_count(), slots);
            assert!(table.len() + table.tombstones <= slots - slots / 8);
        }

        assert_eq!(table.len(), 20);
        for k in 9980..10_000u64 {
            assert_eq!(table.find(hasher(&k), |&v| v == k), Some(&k));
        }
        assert_consistent(&table);
    }

    #[test]
    fn insert_erase_rehash_scenario() {
        let mut table: HashTable<(u64, &str)> = HashTable::with_capacity(4);
        let hasher = |p: &(u64, &str)| p.0.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        for (k, v) in [(1, "a"), (2, "b"), (3, "c")] {
            table
                .entry(hasher(&(k, "")), |p| p.0 == k, hasher)
                .or_insert((k, v));
        }
        assert_eq!(table.len(), 3);

        assert!(table.remove(hasher(&(2, "")), |p| p.0 == 2).is_some());
        assert_eq!(table.find_cursor(hasher(&(2, "")), |p| p.0 == 2), table.end());
        assert_eq!(table.len(), 2);

        assert!(matches!(
            table.entry(hasher(&(5, "")), |p| p.0 == 5, hasher),
            Entry::Vacant(_)
        ));
        table
            .entry(hasher(&(5, "")), |p| p.0 == 5, hasher)
            .or_insert((5, "e"));

        table.rehash(16, hasher);
        assert_eq!(table.len(), 3);
        assert_eq!(table.slot_count(), 32);
        for (k, v) in [(1, "a"), (3, "c"), (5, "e")] {
            assert_eq!(table.find(hasher(&(k, "")), |p| p.0 == k), Some(&(k, v)));
        }
    }

    #[test]
    fn million_keys_end_at_minimal_capacity() {
        let state = HashState::default();
        let hasher = |v: &u64| hash_key(&state, *v);
        let mut table: HashTable<u64> = HashTable::new();
        for k in 0..1_000_000u64 {
            table.entry(hasher(&k), |&v| v == k, hasher).or_insert(k);
            assert!(table.len() <= table.capacity());
        }
        assert_eq!(table.len(), 1_000_000);
        assert_eq!(table.slot_count(), 1 << 21);
        assert!(table.len() <= table.capacity());
    }

    #[cfg(feature = "std")]
    #[test]
    fn panicking_hasher_leaves_table_untouched() {
        use std::panic::AssertUnwindSafe;
        use std::panic::catch_unwind;

        let state = HashState::default();
        let hasher = |v: &u64| hash_key(&state, *v);
        let mut table: HashTable<u64> =
            HashTable::with_config(Config::new().with_store_hash(false));
        for k in 0..50u64 {
            table.entry(hasher(&k), |&v| v == k, hasher).or_insert(k);
        }
        table.remove(hasher(&3), |&v| v == 3);
        let slots = table.slot_count();
        let before: Vec<u64> = table.iter().copied().collect();

        let result = catch_unwind(AssertUnwindSafe(|| {
            table.rehash(1000, |_: &u64| -> u64 { panic!("hasher failure") });
        }));
        assert!(result.is_err());

        assert_eq!(table.slot_count(), slots);
        assert_eq!(table.iter().copied().collect::<Vec<_>>(), before);
        for k in (0..50u64).filter(|&k| k != 3) {
            assert_eq!(table.find(hasher(&k), |&v| v == k), Some(&k));
        }
        assert_consistent(&table);
    }

    #[test]
    fn stored_hashes_skip_the_hasher() {
        let state = HashState::default();
        let hasher = |v: &u64| hash_key(&state, *v);
        let mut table: HashTable<u64> = HashTable::new();
        assert!(table.config().store_hash());

        for k in 0..100u64 {
            table
                .entry(hasher(&k), |&v| v == k, |_| unreachable!("rehash used the hasher"))
                .or_insert(k);
        }
        table.rehash(5000, |_| unreachable!("rehash used the hasher"));
        table.shrink_to_fit(|_| unreachable!("rehash used the hasher"));

        for k in 0..100u64 {
            assert_eq!(table.find(hasher(&k), |&v| v == k), Some(&k));
        }
    }

    #[test]
    fn unstored_hashes_use_the_hasher() {
        let state = HashState::default();
        let hasher = |v: &u64| hash_key(&state, *v);
        let calls = core::cell::Cell::new(0usize);
        let counting = |v: &u64| {
            calls.set(calls.get() + 1);
            hasher(v)
        };

        let mut table: HashTable<u64> =
            HashTable::with_config(Config::new().with_store_hash(false));
        for k in 0..10u64 {
            table.entry(hasher(&k), |&v| v == k, counting).or_insert(k);
        }
        calls.set(0);
        table.rehash(100, counting);
        assert_eq!(calls.get(), 10);
        for k in 0..10u64 {
            assert_eq!(table.find(hasher(&k), |&v| v == k), Some(&k));
        }
    }

    #[test]
    fn try_reserve_overflow_leaves_table_unchanged() {
        let mut table: HashTable<u64> = HashTable::new();
        table.entry(1, |&v| v == 1, |&v| v).or_insert(1);

        assert_eq!(
            table.try_reserve(usize::MAX, |&v| v),
            Err(Error::CapacityOverflow)
        );
        assert_eq!(
            table.try_rehash(usize::MAX / 2, |&v| v),
            Err(Error::CapacityOverflow)
        );
        assert_eq!(table.slot_count(), 4);
        assert_eq!(table.find(1, |&v| v == 1), Some(&1));
        assert!(table.try_reserve(10, |&v| v).is_ok());
        assert!(table.capacity() >= 11);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn failed_allocation_leaves_table_unchanged() {
        type Block = [u8; 1024];

        let mut table: HashTable<Block> = HashTable::with_capacity(20);
        for v in 0..20u8 {
            table.entry(0, |b| b[0] == v, |_| 0).or_insert([v; 1024]);
        }
        assert!(table.remove(0, |b| b[0] == 3).is_some());
        assert_eq!(table.tombstones, 1);

        // The slot count fits in `usize` but the allocation size does not.
        assert_eq!(
            table.try_rehash(1 << 55, |_| 0),
            Err(Error::CapacityOverflow)
        );
        assert_eq!(
            table.try_reserve(1 << 55, |_| 0),
            Err(Error::CapacityOverflow)
        );

        assert_eq!(table.slot_count(), 64);
        assert_eq!(table.len(), 19);
        assert_eq!(table.tombstones, 1);
        for v in (0..20u8).filter(|&v| v != 3) {
            assert_eq!(table.find(0, |b| b[0] == v), Some(&[v; 1024]));
        }
        assert!(table.find(0, |b| b[0] == 3).is_none());

        assert!(table.try_rehash(0, |_| 0).is_ok());
        assert_eq!(table.tombstones, 0);
        assert_eq!(table.len(), 19);
    }

    #[test]
    fn set_max_load_factor_grows_when_needed() {
        let mut table: HashTable<u64> = HashTable::with_capacity(16);
        for v in 0..16u64 {
            table.entry(v, |&x| x == v, |&x| x).or_insert(v);
        }
        assert_eq!(table.slot_count(), 32);

        table.set_max_load_factor(0.25, |&x| x);
        assert_eq!(table.slot_count(), 64);
        assert_eq!(table.capacity(), 16);

        table.set_max_load_factor(5.0, |&x| x);
        assert_eq!(table.max_load_factor(), 0.8);
        assert_eq!(table.slot_count(), 64);
        assert_eq!(table.capacity(), 51);
        assert_consistent(&table);
    }

    #[test]
    fn string_values() {
        let state = HashState::default();
        let hash_str = |s: &str| {
            let mut h = state.build_hasher();
            h.write(s.as_bytes());
            h.finish()
        };

        let mut table: HashTable<String> = HashTable::new();
        let words = ["apple", "banana", "cherry", "date", "elderberry", "fig"];
        for word in words {
            table
                .entry(hash_str(word), |s| s == word, |s| hash_str(s))
                .or_insert(word.to_string());
        }

        assert_eq!(table.len(), words.len());
        assert_eq!(
            table.remove(hash_str("cherry"), |s| s == "cherry"),
            Some("cherry".to_string())
        );
        let mut remaining: Vec<String> = table.drain().collect();
        remaining.sort();
        assert_eq!(remaining, ["apple", "banana", "date", "elderberry", "fig"]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_clone() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(32);
        for k in 0..30u64 {
            insert_item(&mut table, &state, k, k as i32);
        }
        for k in 0..10u64 {
            table.remove(hash_key(&state, k), |v| v.key == k);
        }

        let cloned = table.clone();
        assert_eq!(cloned.len(), table.len());
        assert_eq!(cloned.slot_count(), table.slot_count());
        assert_eq!(cloned.tombstones, table.tombstones);
        for index in 0..table.slot_count() {
            unsafe { assert_eq!(cloned.storage.ctrl(index), table.storage.ctrl(index)) };
            assert_eq!(cloned.get_at(index), table.get_at(index));
        }
        for k in 10..30u64 {
            assert!(cloned.find(hash_key(&state, k), |v| v.key == k).is_some());
        }
        assert_consistent(&cloned);
    }

    #[test]
    fn test_clone_empty_table() {
        let table: HashTable<Item> = HashTable::new();
        let cloned = table.clone();
        assert!(cloned.is_empty());
        assert_eq!(cloned.slot_count(), 4);
    }

    #[test]
    fn test_shrink_to_fit_after_removals() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(0);
        for k in 0..1000u64 {
            insert_item(&mut table, &state, k, k as i32);
        }
        let large = table.slot_count();

        for k in 0..990u64 {
            table.remove(hash_key(&state, k), |v| v.key == k);
        }
        table.shrink_to_fit(|v| hash_key(&state, v.key));

        assert!(table.slot_count() < large);
        assert_eq!(table.slot_count(), 32);
        assert_eq!(table.tombstones, 0);
        for k in 990..1000u64 {
            assert!(table.find(hash_key(&state, k), |v| v.key == k).is_some());
        }
        assert_consistent(&table);
    }

    #[test]
    fn test_shrink_to_fit_no_change_when_optimal() {
        let mut table: HashTable<u64> = HashTable::new();
        table.entry(1, |&v| v == 1, |&v| v).or_insert(1);
        table.shrink_to_fit(|&v| v);
        assert_eq!(table.slot_count(), 4);

        table.clear();
        table.shrink_to_fit(|&v| v);
        assert_eq!(table.slot_count(), 4);
    }

    #[test]
    fn remove_at_walks_every_value() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..64u64 {
            insert_item(&mut table, &state, k, k as i32);
        }

        let mut index = table.begin().index();
        let mut seen = vec![false; 64];
        while let Some((item, next)) = table.remove_at(index) {
            assert!(!seen[item.key as usize]);
            seen[item.key as usize] = true;
            assert!(next > index);
            index = next;
        }
        assert_eq!(index, table.slot_count());
        assert!(seen.iter().all(|&s| s));
        assert!(table.is_empty());
        assert!(table.remove_at(table.slot_count()).is_none());
    }

    #[test]
    fn swap_tables() {
        let mut a: HashTable<u64> = HashTable::new();
        let mut b: HashTable<u64> = HashTable::with_capacity(100);
        a.entry(1, |&v| v == 1, |&v| v).or_insert(1);

        a.swap(&mut b);
        assert!(a.is_empty());
        assert!(a.capacity() >= 100);
        assert_eq!(b.find(1, |&v| v == 1), Some(&1));
    }
}
