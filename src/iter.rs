//! Iteration over the used slots of a [`HashTable`].
//!
//! Every iterator here is driven by [`RawIter`], which walks the control
//! array one group at a time and yields the index of each used slot in
//! ascending order.

use core::fmt::Debug;
use core::iter::FusedIterator;
use core::marker::PhantomData;

use crate::control::BitMask;
use crate::control::EMPTY;
use crate::control::GROUP_WIDTH;
use crate::hash_table::HashTable;
use crate::storage::Storage;

/// Yields the index of every used slot, lowest first.
///
/// The iterator holds no reference to the storage: callers pass it to every
/// call, which lets owners mutate slots the iterator has already passed.
/// The used mask of a group is captured when the group is entered, so
/// erasing an already-yielded slot never disturbs the walk.
#[derive(Clone, Debug)]
pub(crate) struct RawIter {
    group: usize,
    used: BitMask,
    num_groups: usize,
    remaining: usize,
}

impl RawIter {
    pub(crate) fn new<V>(storage: &Storage<V>, len: usize) -> Self {
        let used = if len == 0 {
            BitMask(0)
        } else {
            // SAFETY: Every storage has at least one group.
            unsafe { storage.group(0).match_used() }
        };

        RawIter {
            group: 0,
            used,
            num_groups: storage.num_groups(),
            remaining: len,
        }
    }

    #[inline]
    pub(crate) fn next_index<V>(&mut self, storage: &Storage<V>) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }

        loop {
            if let Some(bit) = self.used.lowest_set_bit() {
                self.used = self.used.remove_lowest_bit();
                self.remaining -= 1;
                return Some(self.group * GROUP_WIDTH + bit);
            }

            self.group += 1;
            if self.group >= self.num_groups {
                debug_assert!(false, "fewer used slots than the table length");
                self.remaining = 0;
                return None;
            }
            // SAFETY: `group` was just checked against the group count.
            self.used = unsafe { storage.group(self.group).match_used() };
        }
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.remaining
    }

    /// Advances to the next value matching `pred` and removes it from
    /// `table`. Values the predicate rejects are kept.
    pub(crate) fn extract_next<V>(
        &mut self,
        table: &mut HashTable<V>,
        mut pred: impl FnMut(&mut V) -> bool,
    ) -> Option<V> {
        while let Some(index) = self.next_index(&table.storage) {
            // SAFETY: Only used slots are yielded, and erasing one never
            // changes the control bytes the walk has yet to visit.
            unsafe {
                if pred(table.storage.get_mut(index)) {
                    return Some(table.erase_slot(index));
                }
            }
        }
        None
    }
}

/// An iterator over the values of a [`HashTable`].
///
/// Created by [`HashTable::iter`]. Values are yielded in slot order, which
/// depends on the hashes and capacity and changes across rehashes.
///
/// # Examples
///
/// ```rust
/// # use flat16::HashTable;
/// #
/// let mut table = HashTable::new();
/// table.entry(1, |&v: &u64| v == 1, |&v| v).or_insert(1);
/// table.entry(2, |&v: &u64| v == 2, |&v| v).or_insert(2);
///
/// let iter = table.iter();
/// assert_eq!(iter.len(), 2);
/// assert_eq!(iter.sum::<u64>(), 3);
/// ```
pub struct Iter<'a, V> {
    storage: &'a Storage<V>,
    raw: RawIter,
}

impl<'a, V> Iter<'a, V> {
    pub(crate) fn new(table: &'a HashTable<V>) -> Self {
        Iter {
            storage: &table.storage,
            raw: RawIter::new(&table.storage, table.len),
        }
    }
}

impl<V> Clone for Iter<'_, V> {
    fn clone(&self) -> Self {
        Iter {
            storage: self.storage,
            raw: self.raw.clone(),
        }
    }
}

impl<V: Debug> Debug for Iter<'_, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let index = self.raw.next_index(self.storage)?;
        // SAFETY: The raw iterator only yields used slots.
        Some(unsafe { self.storage.get(index) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.raw.remaining(), Some(self.raw.remaining()))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}
impl<V> FusedIterator for Iter<'_, V> {}

/// A mutable iterator over the values of a [`HashTable`].
///
/// Created by [`HashTable::iter_mut`].
pub struct IterMut<'a, V> {
    storage: &'a Storage<V>,
    raw: RawIter,
    _marker: PhantomData<&'a mut V>,
}

impl<'a, V> IterMut<'a, V> {
    pub(crate) fn new(table: &'a mut HashTable<V>) -> Self {
        let raw = RawIter::new(&table.storage, table.len);
        IterMut {
            storage: &table.storage,
            raw,
            _marker: PhantomData,
        }
    }
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = &'a mut V;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let index = self.raw.next_index(self.storage)?;
        // SAFETY: The raw iterator yields each used slot once, and the table
        // is mutably borrowed for 'a, so no other reference to the value
        // exists. Slot pointers are derived from the allocation, not from the
        // shared borrow of the storage.
        Some(unsafe { &mut *self.storage.slot_ptr(index) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.raw.remaining(), Some(self.raw.remaining()))
    }
}

impl<V> ExactSizeIterator for IterMut<'_, V> {}
impl<V> FusedIterator for IterMut<'_, V> {}

/// A draining iterator over the values of a [`HashTable`].
///
/// Created by [`HashTable::drain`]. The table is empty once the iterator is
/// dropped, whether or not it was exhausted; its allocation is kept. The
/// values are detached from the table up front, so leaking the iterator
/// leaks them and leaves the table empty.
pub struct Drain<'a, V> {
    table: &'a mut HashTable<V>,
    storage: Storage<V>,
    raw: RawIter,
}

impl<'a, V> Drain<'a, V> {
    pub(crate) fn new(table: &'a mut HashTable<V>) -> Self {
        let len = table.len;
        let storage = table.detach_storage();
        let raw = RawIter::new(&storage, len);
        Drain {
            table,
            storage,
            raw,
        }
    }
}

impl<V> Drop for Drain<'_, V> {
    fn drop(&mut self) {
        for _ in &mut *self {}

        self.storage.reset_ctrl();
        self.table.reattach_storage(&mut self.storage);
    }
}

impl<V> Iterator for Drain<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.raw.next_index(&self.storage)?;
        // SAFETY: The raw iterator only yields used slots. The slot is marked
        // empty before the value leaves it, so it is never dropped twice.
        unsafe {
            self.storage.set_ctrl(index, EMPTY);
            Some(self.storage.take(index))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.raw.remaining(), Some(self.raw.remaining()))
    }
}

impl<V> ExactSizeIterator for Drain<'_, V> {}
impl<V> FusedIterator for Drain<'_, V> {}

/// An owning iterator over the values of a [`HashTable`].
///
/// Created by the [`IntoIterator`] implementation of [`HashTable`]. Values
/// not consumed are dropped with the iterator.
pub struct IntoIter<V> {
    table: HashTable<V>,
    raw: RawIter,
}

impl<V> IntoIter<V> {
    pub(crate) fn new(table: HashTable<V>) -> Self {
        let raw = RawIter::new(&table.storage, table.len);
        IntoIter { table, raw }
    }
}

impl<V> Iterator for IntoIter<V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.raw.next_index(&self.table.storage)?;
        self.table.len -= 1;
        // SAFETY: As in `Drain::next`.
        unsafe {
            self.table.storage.set_ctrl(index, EMPTY);
            Some(self.table.storage.take(index))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.raw.remaining(), Some(self.raw.remaining()))
    }
}

impl<V> ExactSizeIterator for IntoIter<V> {}
impl<V> FusedIterator for IntoIter<V> {}

/// An iterator that removes the values matching a predicate.
///
/// Created by [`HashTable::extract_if`].
///
/// # Examples
///
/// ```rust
/// # use flat16::HashTable;
/// #
/// let mut table = HashTable::new();
/// for v in 0u64..8 {
///     table.entry(v, |&x| x == v, |&x| x).or_insert(v);
/// }
///
/// let mut odd: Vec<u64> = table.extract_if(|v| *v % 2 == 1).collect();
/// odd.sort();
/// assert_eq!(odd, [1, 3, 5, 7]);
/// assert_eq!(table.len(), 4);
/// ```
pub struct ExtractIf<'a, V, F> {
    table: &'a mut HashTable<V>,
    raw: RawIter,
    pred: F,
}

impl<'a, V, F> ExtractIf<'a, V, F> {
    pub(crate) fn new(table: &'a mut HashTable<V>, pred: F) -> Self {
        let raw = RawIter::new(&table.storage, table.len);
        ExtractIf { table, raw, pred }
    }
}

impl<V, F> Iterator for ExtractIf<'_, V, F>
where
    F: FnMut(&mut V) -> bool,
{
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        self.raw.extract_next(self.table, &mut self.pred)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.raw.remaining()))
    }
}

impl<V, F> FusedIterator for ExtractIf<'_, V, F> where F: FnMut(&mut V) -> bool {}

/// A position in a [`HashTable`]: either a used slot or the end.
///
/// The end cursor's index equals the table's slot count. Two cursors are
/// equal when they point into the same table at the same index.
///
/// # Examples
///
/// ```rust
/// # use flat16::HashTable;
/// #
/// let mut table = HashTable::new();
/// for v in [10u64, 20, 30] {
///     table.entry(v, |&x| x == v, |&x| x).or_insert(v);
/// }
///
/// let mut cursor = table.begin();
/// let mut sum = 0;
/// while let Some(value) = cursor.get() {
///     sum += value;
///     cursor.advance();
/// }
/// assert_eq!(sum, 60);
/// assert_eq!(cursor, table.end());
/// assert_eq!(cursor.get(), None);
/// ```
pub struct Cursor<'a, V> {
    table: &'a HashTable<V>,
    index: usize,
}

impl<'a, V> Cursor<'a, V> {
    pub(crate) fn new(table: &'a HashTable<V>, index: usize) -> Self {
        debug_assert!(index <= table.slot_count());
        Cursor { table, index }
    }

    /// The slot index, or the slot count at the end.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns `true` at the end position.
    pub fn is_end(&self) -> bool {
        self.index == self.table.slot_count()
    }

    /// Returns the value under the cursor, or `None` at the end.
    pub fn get(&self) -> Option<&'a V> {
        self.table.get_at(self.index)
    }

    /// Moves to the next used slot. Stays put at the end.
    pub fn advance(&mut self) {
        if !self.is_end() {
            self.index = self.table.next_used_index(self.index + 1);
        }
    }
}

impl<V> Clone for Cursor<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Cursor<'_, V> {}

impl<V> PartialEq for Cursor<'_, V> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.table, other.table) && self.index == other.index
    }
}

impl<V> Eq for Cursor<'_, V> {}

impl<V> Debug for Cursor<'_, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cursor")
            .field("table", &(self.table as *const HashTable<V>))
            .field("index", &self.index)
            .finish()
    }
}

impl<'a, V> Iterator for Cursor<'a, V> {
    type Item = &'a V;

    /// Yields the value under the cursor, then advances.
    fn next(&mut self) -> Option<Self::Item> {
        let value = self.get()?;
        self.advance();
        Some(value)
    }
}

impl<V> FusedIterator for Cursor<'_, V> {}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec::Vec;

    use super::*;

    fn mix(v: &u64) -> u64 {
        v.wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    fn table_of(values: impl IntoIterator<Item = u64>) -> HashTable<u64> {
        let mut table = HashTable::new();
        for v in values {
            table.entry(mix(&v), |&x| x == v, mix).or_insert(v);
        }
        table
    }

    #[test]
    fn iter_visits_every_value_once() {
        let table = table_of(0..500);
        let iter = table.iter();
        assert_eq!(iter.len(), 500);

        let mut values: Vec<u64> = iter.copied().collect();
        values.sort();
        assert_eq!(values, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn iter_follows_slot_order() {
        let table = table_of(0..100);
        let mut cursor = table.begin();
        for value in table.iter() {
            assert_eq!(cursor.get(), Some(value));
            cursor.advance();
        }
        assert!(cursor.is_end());
    }

    #[test]
    fn iter_mut_updates_in_place() {
        let mut table = table_of(0..50);
        for value in table.iter_mut() {
            *value += 1000;
        }
        for v in 0..50u64 {
            assert!(table.find(mix(&v), |&x| x == v + 1000).is_some());
        }
    }

    #[test]
    fn drain_empties_table_even_when_dropped_early() {
        let mut table = table_of(0..40);
        let slots = table.slot_count();
        let mut drain = table.drain();
        assert_eq!(drain.len(), 40);
        drain.next();
        drain.next();
        drop(drain);

        assert!(table.is_empty());
        assert_eq!(table.slot_count(), slots);
        assert_eq!(table.begin(), table.end());
        assert!(table.find(mix(&5), |&x| x == 5).is_none());
        table.entry(mix(&5), |&x| x == 5, mix).or_insert(5);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn forgotten_drain_leaves_table_consistent() {
        let mut table: HashTable<u64> = HashTable::with_capacity(32);
        for v in 0..17u64 {
            table.entry(0, |&x| x == v, |_| 0).or_insert(v);
        }

        let mut drain = table.drain();
        assert_eq!(drain.next(), Some(0));
        core::mem::forget(drain);

        assert!(table.is_empty());
        assert_eq!(table.iter().count(), 0);
        for v in 0..17u64 {
            assert!(table.find(0, |&x| x == v).is_none());
        }

        for v in 0..17u64 {
            assert!(matches!(
                table.entry(0, |&x| x == v, |_| 0),
                crate::hash_table::Entry::Vacant(_)
            ));
            table.entry(0, |&x| x == v, |_| 0).or_insert(v);
        }
        assert_eq!(table.len(), 17);
        assert_eq!(table.iter().count(), 17);
        assert!(table.find(0, |&x| x == 16).is_some());
    }

    #[test]
    fn into_iter_drops_unconsumed_values() {
        let marker = Rc::new(());
        let mut table: HashTable<(u64, Rc<()>)> = HashTable::new();
        for v in 0..20u64 {
            table
                .entry(mix(&v), |p| p.0 == v, |p| mix(&p.0))
                .or_insert((v, marker.clone()));
        }
        assert_eq!(Rc::strong_count(&marker), 21);

        let mut iter = table.into_iter();
        let first = iter.next();
        assert!(first.is_some());
        assert_eq!(iter.len(), 19);
        drop(iter);
        assert_eq!(Rc::strong_count(&marker), 2);
        drop(first);
        assert_eq!(Rc::strong_count(&marker), 1);
    }

    #[test]
    fn extract_if_partial_consumption_keeps_the_rest() {
        let mut table = table_of(0..64);
        let taken: Vec<u64> = table.extract_if(|v| *v < 32).take(5).collect();
        assert_eq!(taken.len(), 5);
        assert_eq!(table.len(), 59);
        for v in taken {
            assert!(table.find(mix(&v), |&x| x == v).is_none());
        }
        assert_eq!(table.iter().count(), 59);
    }

    #[test]
    fn retain_and_tombstones() {
        let mut table = table_of(0..300);
        table.retain(|v| *v % 3 == 0);
        assert_eq!(table.len(), 100);
        assert_eq!(table.storage.count_deleted(), table.tombstones);
        for v in 0..300u64 {
            assert_eq!(table.find(mix(&v), |&x| x == v).is_some(), v % 3 == 0);
        }
    }

    #[test]
    fn cursor_equality_is_per_table() {
        let a = table_of(0..3);
        let b = a.clone();
        assert_eq!(a.begin(), a.begin());
        assert_eq!(a.begin().index(), b.begin().index());
        assert_ne!(a.begin(), b.begin());
        assert_ne!(a.end(), b.end());
    }

    #[test]
    fn cursor_at_skips_to_next_used_slot() {
        let mut table: HashTable<u64> = HashTable::with_capacity(32);
        for v in 0..3u64 {
            table.entry(0, |&x| x == v, |_| 0).or_insert(v);
        }
        table.remove(0, |&x| x == 1);

        assert_eq!(table.cursor_at(1).index(), 2);
        assert_eq!(table.cursor_at(3), table.end());
        assert_eq!(table.cursor_at(usize::MAX), table.end());

        let end = table.end();
        let mut advanced = end;
        advanced.advance();
        assert_eq!(advanced, end);
        assert_eq!(table.begin().collect::<Vec<_>>(), [&0, &2]);
    }
}
