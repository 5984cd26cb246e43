//! Slot storage divided into chunks of doubling size, with a free stack that
//! recycles vacated slots before fresh capacity is used.

use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt::Debug;
use core::ops::Index;
use core::ops::IndexMut;

use crate::error::Error;
use crate::error::infallible;
use crate::error::try_reserve_exact;

const FIRST_CHUNK_CAPACITY: usize = 16;

/// Slot indices are handed out as `u32`; `u32::MAX` is kept free as a
/// sentinel for index-linked structures.
const MAX_SLOTS: usize = u32::MAX as usize;

/// Bookkeeping for one chunk of a [`ChunkedArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkInfo {
    index: u32,
    start: usize,
    capacity: usize,
    size: usize,
}

impl ChunkInfo {
    /// Position of the chunk in [`ChunkedArena::chunks`].
    pub fn index(&self) -> u32 {
        self.index
    }

    /// First slot index owned by the chunk.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Number of slots owned by the chunk.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied slots in the chunk.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Fraction of the chunk's slots that are occupied.
    pub fn utilization(&self) -> f64 {
        self.size as f64 / self.capacity as f64
    }

    /// Orders chunks by how closely they fit `target`: smallest capacity, then
    /// fullest, then lowest index.
    fn fit_order(&self, other: &Self) -> Ordering {
        self.capacity
            .cmp(&other.capacity)
            .then_with(|| {
                let this = self.size as u128 * other.capacity as u128;
                let that = other.size as u128 * self.capacity as u128;
                that.cmp(&this)
            })
            .then(self.index.cmp(&other.index))
    }
}

/// A slab of `T` values addressed by stable `usize` indices.
///
/// Capacity is added in chunks: the first holds 16 slots and each later chunk
/// doubles the previous one. Every slot remembers which chunk owns it, so
/// per-chunk occupancy is tracked as values come and go. Removed slots go on a
/// free stack and are reused, most recent first, before any fresh slot.
///
/// Indices stay valid until the value is removed; values never move.
///
/// # Examples
///
/// ```rust
/// use flat16::ChunkedArena;
///
/// let mut arena = ChunkedArena::new();
/// let a = arena.insert("a");
/// let b = arena.insert("b");
/// assert_eq!(arena.capacity(), 16);
///
/// assert_eq!(arena.remove(a), Some("a"));
/// let c = arena.insert("c");
/// assert_eq!(c, a);
/// assert_eq!(arena.get(b), Some(&"b"));
/// ```
#[derive(Clone)]
pub struct ChunkedArena<T> {
    slots: Vec<Option<T>>,
    owners: Vec<u32>,
    chunks: Vec<ChunkInfo>,
    free: Vec<u32>,
    /// Slots at or past this index have never been handed out.
    next_fresh: usize,
    len: usize,
}

impl<T> Default for ChunkedArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Debug> Debug for ChunkedArena<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<T> Index<usize> for ChunkedArena<T> {
    type Output = T;

    /// # Panics
    ///
    /// Panics if no value is stored at `index`.
    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(value) => value,
            None => panic!("no value at arena index {index}"),
        }
    }
}

impl<T> IndexMut<usize> for ChunkedArena<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        match self.get_mut(index) {
            Some(value) => value,
            None => panic!("no value at arena index {index}"),
        }
    }
}

impl<T> ChunkedArena<T> {
    /// Creates an empty arena. No memory is allocated until the first insert.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            owners: Vec::new(),
            chunks: Vec::new(),
            free: Vec::new(),
            next_fresh: 0,
            len: 0,
        }
    }

    /// Creates an arena with room for at least `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut arena = Self::new();
        arena.reserve(capacity);
        arena
    }

    /// Number of values stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no values are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total slots across all chunks.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The chunks in allocation order.
    pub fn chunks(&self) -> &[ChunkInfo] {
        &self.chunks
    }

    /// Slots that can be filled without adding a chunk.
    fn vacant_slots(&self) -> usize {
        self.free.len() + (self.slots.len() - self.next_fresh)
    }

    fn next_chunk_capacity(&self) -> usize {
        self.chunks
            .last()
            .map_or(FIRST_CHUNK_CAPACITY, |chunk| chunk.capacity.saturating_mul(2))
    }

    /// Stores `value` and returns its index.
    ///
    /// # Panics
    ///
    /// Panics if the arena would exceed `u32::MAX` slots.
    pub fn insert(&mut self, value: T) -> usize {
        infallible(self.try_insert(value))
    }

    /// Fallible variant of [`ChunkedArena::insert`]. On error the arena is
    /// unchanged and `value` is dropped.
    pub fn try_insert(&mut self, value: T) -> Result<usize, Error> {
        let index = match self.free.pop() {
            Some(index) => index as usize,
            None => {
                if self.next_fresh == self.slots.len() {
                    self.try_add_chunk(self.next_chunk_capacity())?;
                }
                let index = self.next_fresh;
                self.next_fresh += 1;
                index
            }
        };

        debug_assert!(self.slots[index].is_none());
        self.slots[index] = Some(value);
        self.chunks[self.owners[index] as usize].size += 1;
        self.len += 1;
        Ok(index)
    }

    /// Removes and returns the value at `index`. The slot goes on the free
    /// stack.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let value = self.slots.get_mut(index)?.take()?;
        self.chunks[self.owners[index] as usize].size -= 1;
        self.free.push(index as u32);
        self.len -= 1;
        Some(value)
    }

    /// Returns a reference to the value at `index`.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    /// Returns a mutable reference to the value at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Returns `true` if a value is stored at `index`.
    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// The chunk owning slot `index`, whether or not the slot is occupied.
    pub fn chunk_of(&self, index: usize) -> Option<&ChunkInfo> {
        let owner = *self.owners.get(index)?;
        self.chunks.get(owner as usize)
    }

    /// Appends a chunk of `capacity` slots and returns its index.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or the arena would exceed `u32::MAX`
    /// slots.
    pub fn add_chunk(&mut self, capacity: usize) -> u32 {
        infallible(self.try_add_chunk(capacity))
    }

    /// Fallible variant of [`ChunkedArena::add_chunk`].
    pub fn try_add_chunk(&mut self, capacity: usize) -> Result<u32, Error> {
        assert!(capacity > 0, "chunk capacity must be positive");
        let start = self.slots.len();
        let total = start
            .checked_add(capacity)
            .filter(|&total| total <= MAX_SLOTS)
            .ok_or(Error::CapacityOverflow)?;

        try_reserve_exact(&mut self.slots, capacity)?;
        try_reserve_exact(&mut self.owners, capacity)?;

        let index = self.chunks.len() as u32;
        self.slots.resize_with(total, || None);
        self.owners.resize(total, index);
        self.chunks.push(ChunkInfo {
            index,
            start,
            capacity,
            size: 0,
        });
        Ok(index)
    }

    /// Removes the last chunk if none of its slots are occupied. Returns
    /// whether a chunk was removed.
    pub fn remove_last_chunk(&mut self) -> bool {
        let Some(last) = self.chunks.last().copied() else {
            return false;
        };
        if last.size != 0 {
            return false;
        }

        self.free.retain(|&index| (index as usize) < last.start);
        self.next_fresh = self.next_fresh.min(last.start);
        self.slots.truncate(last.start);
        self.owners.truncate(last.start);
        self.chunks.pop();
        true
    }

    /// Finds the chunk that best fits `target_capacity`: the smallest chunk
    /// holding at least that many slots, preferring the most utilized and then
    /// the lowest index among equals.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flat16::ChunkedArena;
    ///
    /// let mut arena = ChunkedArena::<u32>::new();
    /// arena.add_chunk(16);
    /// arena.add_chunk(64);
    /// arena.add_chunk(32);
    ///
    /// assert_eq!(arena.find_closed_chunk(20).map(|c| c.capacity()), Some(32));
    /// assert_eq!(arena.find_closed_chunk(16).map(|c| c.index()), Some(0));
    /// assert!(arena.find_closed_chunk(100).is_none());
    /// ```
    pub fn find_closed_chunk(&self, target_capacity: usize) -> Option<&ChunkInfo> {
        self.chunks
            .iter()
            .filter(|chunk| chunk.capacity >= target_capacity)
            .min_by(|a, b| a.fit_order(b))
    }

    /// Ensures `additional` more values fit without adding a chunk.
    ///
    /// # Panics
    ///
    /// Panics if the arena would exceed `u32::MAX` slots.
    pub fn reserve(&mut self, additional: usize) {
        infallible(self.try_reserve(additional));
    }

    /// Fallible variant of [`ChunkedArena::reserve`].
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        let vacant = self.vacant_slots();
        if additional <= vacant {
            return Ok(());
        }
        let missing = additional - vacant;
        let capacity = self.next_chunk_capacity().max(
            missing
                .checked_next_power_of_two()
                .ok_or(Error::CapacityOverflow)?,
        );
        self.try_add_chunk(capacity).map(|_| ())
    }

    /// Drops trailing chunks that hold no values.
    pub fn shrink_to_fit(&mut self) {
        while self.remove_last_chunk() {}
    }

    /// Drops every value. Chunks are kept.
    pub fn clear(&mut self) {
        for slot in &mut self.slots[..self.next_fresh] {
            *slot = None;
        }
        for chunk in &mut self.chunks {
            chunk.size = 0;
        }
        self.free.clear();
        self.next_fresh = 0;
        self.len = 0;
    }

    /// Iterates over `(index, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.slots[..self.next_fresh]
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
    }

    /// Iterates over `(index, value)` pairs with mutable values.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> + '_ {
        self.slots[..self.next_fresh]
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|value| (index, value)))
    }

    /// Index of the first occupied slot at or after `start`, if any.
    pub(crate) fn next_occupied(&self, start: usize) -> Option<usize> {
        let end = self.next_fresh;
        (start.min(end)..end).find(|&index| self.slots[index].is_some())
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn chunks_double_from_sixteen() {
        let mut arena = ChunkedArena::new();
        for i in 0..100u32 {
            assert_eq!(arena.insert(i), i as usize);
        }

        let capacities: Vec<_> = arena.chunks().iter().map(|c| c.capacity()).collect();
        assert_eq!(capacities, [16, 32, 64]);
        assert_eq!(arena.capacity(), 112);
        assert_eq!(arena.chunks()[2].start(), 48);
        assert_eq!(arena.chunks()[2].size(), 52);
        assert_eq!(arena.chunk_of(47).map(|c| c.index()), Some(1));
        assert_eq!(arena.chunk_of(48).map(|c| c.index()), Some(2));
        assert!(arena.chunk_of(112).is_none());
    }

    #[test]
    fn free_stack_is_reused_before_fresh_slots() {
        let mut arena = ChunkedArena::new();
        let ids: Vec<_> = (0..10).map(|i| arena.insert(i)).collect();

        assert_eq!(arena.remove(ids[3]), Some(3));
        assert_eq!(arena.remove(ids[7]), Some(7));
        assert_eq!(arena.remove(ids[7]), None);
        assert_eq!(arena.len(), 8);

        assert_eq!(arena.insert(70), ids[7]);
        assert_eq!(arena.insert(30), ids[3]);
        assert_eq!(arena.insert(10), 10);
        assert_eq!(arena.get(ids[7]), Some(&70));
        assert_eq!(arena.chunks()[0].size(), 11);
    }

    #[test]
    fn find_closed_chunk_prefers_fuller_chunks() {
        let mut arena = ChunkedArena::new();
        arena.add_chunk(32);
        arena.add_chunk(16);
        arena.add_chunk(32);

        // Fill chunk 0 with one value and chunk 2 with three.
        let ids: Vec<_> = (0..51).map(|i| arena.insert(i)).collect();
        for &id in &ids {
            let owner = arena.chunk_of(id).map(|c| c.index());
            let keep = match owner {
                Some(0) => id == 0,
                Some(2) => (48..51).contains(&id),
                _ => false,
            };
            if !keep {
                arena.remove(id);
            }
        }
        assert_eq!(arena.chunks()[0].size(), 1);
        assert_eq!(arena.chunks()[2].size(), 3);

        assert_eq!(arena.find_closed_chunk(10).map(|c| c.index()), Some(1));
        assert_eq!(arena.find_closed_chunk(17).map(|c| c.index()), Some(2));
        assert_eq!(arena.find_closed_chunk(0).map(|c| c.index()), Some(1));
        assert!(arena.find_closed_chunk(33).is_none());
    }

    #[test]
    fn find_closed_chunk_ties_go_to_lowest_index() {
        let mut arena = ChunkedArena::<u8>::new();
        arena.add_chunk(16);
        arena.add_chunk(16);
        assert_eq!(arena.find_closed_chunk(16).map(|c| c.index()), Some(0));
        assert!(ChunkedArena::<u8>::new().find_closed_chunk(1).is_none());
    }

    #[test]
    fn remove_last_chunk_only_when_vacant() {
        let mut arena = ChunkedArena::new();
        let ids: Vec<_> = (0..20).map(|i| arena.insert(i)).collect();
        assert_eq!(arena.chunks().len(), 2);

        assert!(!arena.remove_last_chunk());
        for &id in &ids[16..] {
            arena.remove(id);
        }
        assert!(arena.remove_last_chunk());
        assert_eq!(arena.capacity(), 16);
        assert!(!arena.remove_last_chunk());

        // The freed slots of the dropped chunk are gone from the free stack,
        // so the next insert opens a fresh chunk.
        assert_eq!(arena.insert(99), 16);
        assert_eq!(arena.chunks()[1].capacity(), 32);
        assert_eq!(arena.len(), 17);
    }

    #[test]
    fn reserve_adds_one_chunk() {
        let mut arena = ChunkedArena::<u64>::with_capacity(100);
        assert_eq!(arena.chunks().len(), 1);
        assert_eq!(arena.capacity(), 128);

        for i in 0..128 {
            arena.insert(i);
        }
        assert_eq!(arena.chunks().len(), 1);
        arena.reserve(1);
        assert_eq!(arena.chunks()[1].capacity(), 256);
        assert_eq!(arena.try_reserve(usize::MAX), Err(Error::CapacityOverflow));
    }

    #[test]
    fn clear_and_shrink() {
        let mut arena = ChunkedArena::new();
        for i in 0..40 {
            arena.insert(i);
        }
        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.iter().count(), 0);
        assert!(arena.chunks().iter().all(|c| c.size() == 0));
        assert_eq!(arena.insert(5), 0);

        arena.remove(0);
        arena.shrink_to_fit();
        assert_eq!(arena.capacity(), 0);
        assert_eq!(arena.insert(1), 0);
    }

    #[test]
    fn iter_in_index_order() {
        let mut arena = ChunkedArena::new();
        for i in 0..5 {
            arena.insert(i * 10);
        }
        arena.remove(2);
        for (_, value) in arena.iter_mut() {
            *value += 1;
        }
        let values: Vec<_> = arena.iter().collect();
        assert_eq!(values, vec![(0, &1), (1, &11), (3, &31), (4, &41)]);
        assert_eq!(arena.next_occupied(2), Some(3));
        assert_eq!(arena.next_occupied(5), None);
    }

    #[test]
    #[should_panic(expected = "no value at arena index 3")]
    fn indexing_a_vacant_slot_panics() {
        let mut arena = ChunkedArena::new();
        for i in 0..5 {
            arena.insert(i);
        }
        arena[1] += 10;
        assert_eq!(arena[1], 11);
        arena.remove(3);
        let _ = arena[3];
    }

    #[test]
    fn values_are_dropped() {
        let marker = Rc::new(());
        let mut arena = ChunkedArena::new();
        for _ in 0..20 {
            arena.insert(marker.clone());
        }
        arena.remove(4);
        assert_eq!(Rc::strong_count(&marker), 20);
        arena.clear();
        assert_eq!(Rc::strong_count(&marker), 1);

        arena.insert(marker.clone());
        drop(arena);
        assert_eq!(Rc::strong_count(&marker), 1);
    }
}
