use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;

use crate::DefaultHashBuilder;
use crate::config::Config;
use crate::error::Error;
use crate::hash_table::Entry;
use crate::hash_table::HashTable;
use crate::iter::RawIter;

/// A hash set backed by a [`HashTable`].
///
/// `HashSet<T, S>` stores values of type `T` where `T` implements `Hash + Eq`
/// and uses a configurable hasher builder `S` to hash values.
///
/// # Performance Characteristics
///
/// - **Memory**: 1 byte of control per slot, plus the size of `T`, plus a u64
///   for the hash when [`Config::store_hash`] is set (the default).
///
/// # Examples
///
/// ```rust
/// use flat16::HashSet;
///
/// let mut set = HashSet::new();
/// assert!(set.insert("a"));
/// assert!(!set.insert("a"));
/// assert!(set.contains("a"));
/// ```
#[derive(Clone)]
pub struct HashSet<T, S = DefaultHashBuilder> {
    table: HashTable<T>,
    hash_builder: S,
}

impl<T, S> PartialEq for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|v| other.contains(v))
    }
}

impl<T, S> Eq for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

impl<T, S> Debug for HashSet<T, S>
where
    T: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(any(feature = "std", feature = "foldhash"))]
impl<T> HashSet<T, DefaultHashBuilder> {
    /// Creates an empty set using the default hasher.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flat16::HashSet;
    ///
    /// let set: HashSet<i32> = HashSet::new();
    /// assert!(set.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates an empty set that holds at least `capacity` values without
    /// growing, using the default hasher.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flat16::HashSet;
    ///
    /// let set: HashSet<i32> = HashSet::with_capacity(100);
    /// assert!(set.capacity() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }

    /// Creates an empty set with the given configuration, using the default
    /// hasher.
    pub fn with_config(config: Config) -> Self {
        Self::with_capacity_config_and_hasher(0, config, DefaultHashBuilder::default())
    }
}

impl<T, S> HashSet<T, S> {
    /// Creates an empty set with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::collections::hash_map::RandomState;
    ///
    /// use flat16::HashSet;
    ///
    /// let set: HashSet<i32, _> = HashSet::with_hasher(RandomState::new());
    /// assert!(set.is_empty());
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty set with the given hasher builder that holds at least
    /// `capacity` values without growing.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self::with_capacity_config_and_hasher(capacity, Config::new(), hash_builder)
    }

    /// Creates an empty set with a configuration and hasher builder, holding
    /// at least `capacity` values without growing.
    pub fn with_capacity_config_and_hasher(capacity: usize, config: Config, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity_and_config(capacity, config),
            hash_builder,
        }
    }

    /// Returns a reference to the set's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the number of values in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no values.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of values the set can hold before it grows.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the number of slots allocated.
    pub fn slot_count(&self) -> usize {
        self.table.slot_count()
    }

    /// Returns the current fraction of slots holding values.
    pub fn load_factor(&self) -> f64 {
        self.table.load_factor()
    }

    /// Removes every value, keeping the allocation.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns an iterator over the values, in slot order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Removes every value and yields it. The allocation is kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flat16::HashSet;
    ///
    /// let mut set: HashSet<i32> = (1..=3).collect();
    /// let mut drained: Vec<_> = set.drain().collect();
    /// drained.sort();
    /// assert_eq!(drained, [1, 2, 3]);
    /// assert!(set.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, T> {
        Drain {
            inner: self.table.drain(),
        }
    }

    /// Keeps only the values for which `f` returns `true`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flat16::HashSet;
    ///
    /// let mut set: HashSet<i32> = (0..10).collect();
    /// set.retain(|&x| x % 3 == 0);
    /// assert_eq!(set.len(), 4);
    /// ```
    pub fn retain(&mut self, mut f: impl FnMut(&T) -> bool) {
        self.table.retain(|value| f(value));
    }

    /// Removes and yields every value for which `f` returns `true`.
    ///
    /// Values the iterator has not reached when it is dropped stay in the
    /// set.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flat16::HashSet;
    ///
    /// let mut set: HashSet<i32> = (0..10).collect();
    /// let mut evens: Vec<_> = set.extract_if(|&x| x % 2 == 0).collect();
    /// evens.sort();
    /// assert_eq!(evens, [0, 2, 4, 6, 8]);
    /// assert_eq!(set.len(), 5);
    /// ```
    pub fn extract_if<F>(&mut self, f: F) -> ExtractIf<'_, T, F>
    where
        F: FnMut(&T) -> bool,
    {
        let raw = RawIter::new(&self.table.storage, self.table.len);
        ExtractIf {
            table: &mut self.table,
            raw,
            pred: f,
        }
    }
}

impl<T, S> HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn hasher_fn(hash_builder: &S) -> impl Fn(&T) -> u64 + '_ {
        move |value| hash_builder.hash_one(value)
    }

    /// Reserves room for at least `additional` more values.
    pub fn reserve(&mut self, additional: usize) {
        self.table
            .reserve(additional, Self::hasher_fn(&self.hash_builder));
    }

    /// Fallible variant of [`HashSet::reserve`]. On error the set is
    /// unchanged.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        self.table
            .try_reserve(additional, Self::hasher_fn(&self.hash_builder))
    }

    /// Rebuilds the set so that it holds at least `count` values without
    /// growing.
    pub fn rehash(&mut self, count: usize) {
        self.table
            .rehash(count, Self::hasher_fn(&self.hash_builder));
    }

    /// Shrinks the set to the smallest slot count that holds its values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flat16::HashSet;
    ///
    /// let mut set: HashSet<i32> = (0..1000).collect();
    /// set.retain(|&x| x < 10);
    /// set.shrink_to_fit();
    /// assert_eq!(set.slot_count(), 32);
    /// ```
    pub fn shrink_to_fit(&mut self) {
        self.table
            .shrink_to_fit(Self::hasher_fn(&self.hash_builder));
    }

    /// Adds `value` to the set. Returns `true` if it was not present; an
    /// equal value already in the set is kept.
    pub fn insert(&mut self, value: T) -> bool {
        let hash = self.hash_builder.hash_one(&value);
        let hash_builder = &self.hash_builder;
        match self
            .table
            .entry(hash, |v| *v == value, Self::hasher_fn(hash_builder))
        {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// Adds `value` to the set, replacing and returning an equal value if one
    /// was present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flat16::HashSet;
    ///
    /// let mut set = HashSet::new();
    /// assert_eq!(set.replace(String::from("a")), None);
    /// assert_eq!(set.replace(String::from("a")), Some(String::from("a")));
    /// assert_eq!(set.len(), 1);
    /// ```
    pub fn replace(&mut self, value: T) -> Option<T> {
        let hash = self.hash_builder.hash_one(&value);
        let hash_builder = &self.hash_builder;
        match self
            .table
            .entry(hash, |v| *v == value, Self::hasher_fn(hash_builder))
        {
            Entry::Occupied(mut entry) => Some(core::mem::replace(entry.get_mut(), value)),
            Entry::Vacant(entry) => {
                entry.insert(value);
                None
            }
        }
    }

    /// Returns `true` if the set contains `value`.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(value).is_some()
    }

    /// Returns the stored value equal to `value`.
    pub fn get<Q>(&self, value: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.find(hash, |v| v.borrow() == value)
    }

    /// Removes `value` from the set. Returns `true` if it was present.
    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.take(value).is_some()
    }

    /// Removes and returns the stored value equal to `value`.
    pub fn take<Q>(&mut self, value: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.remove(hash, |v| v.borrow() == value)
    }

    /// Returns `true` if the sets have no values in common.
    pub fn is_disjoint(&self, other: &HashSet<T, S>) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.iter().all(|v| !large.contains(v))
    }

    /// Returns `true` if every value in `self` is in `other`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flat16::HashSet;
    ///
    /// let small: HashSet<i32> = [1, 2].into_iter().collect();
    /// let large: HashSet<i32> = [1, 2, 3].into_iter().collect();
    /// assert!(small.is_subset(&large));
    /// assert!(large.is_superset(&small));
    /// assert!(!large.is_subset(&small));
    /// ```
    pub fn is_subset(&self, other: &HashSet<T, S>) -> bool {
        self.len() <= other.len() && self.iter().all(|v| other.contains(v))
    }

    /// Returns `true` if every value in `other` is in `self`.
    pub fn is_superset(&self, other: &HashSet<T, S>) -> bool {
        other.is_subset(self)
    }

    /// Visits the values in `self` or `other`, without duplicates.
    pub fn union<'a>(&'a self, other: &'a HashSet<T, S>) -> Union<'a, T, S> {
        Union {
            iter: self.iter(),
            other_iter: other.iter(),
            set: self,
        }
    }

    /// Visits the values in both `self` and `other`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flat16::HashSet;
    ///
    /// let a: HashSet<i32> = [1, 2, 3].into_iter().collect();
    /// let b: HashSet<i32> = [2, 3, 4].into_iter().collect();
    /// let mut both: Vec<_> = a.intersection(&b).copied().collect();
    /// both.sort();
    /// assert_eq!(both, [2, 3]);
    /// ```
    pub fn intersection<'a>(&'a self, other: &'a HashSet<T, S>) -> Intersection<'a, T, S> {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        Intersection {
            iter: small.iter(),
            other: large,
        }
    }

    /// Visits the values in `self` that are not in `other`.
    pub fn difference<'a>(&'a self, other: &'a HashSet<T, S>) -> Difference<'a, T, S> {
        Difference {
            iter: self.iter(),
            other,
        }
    }

    /// Visits the values in exactly one of `self` and `other`.
    pub fn symmetric_difference<'a>(
        &'a self,
        other: &'a HashSet<T, S>,
    ) -> SymmetricDifference<'a, T, S> {
        SymmetricDifference {
            iter: self.difference(other).chain(other.difference(self)),
        }
    }
}

impl<T, S> Default for HashSet<T, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

/// An iterator over the values of a `HashSet`.
pub struct Iter<'a, T> {
    inner: crate::hash_table::Iter<'a, T>,
}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Iter {
            inner: self.inner.clone(),
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

/// A draining iterator over the values of a `HashSet`.
pub struct Drain<'a, T> {
    inner: crate::hash_table::Drain<'a, T>,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Drain<'_, T> {}
impl<T> FusedIterator for Drain<'_, T> {}

/// A consuming iterator over the values of a `HashSet`.
pub struct IntoIter<T> {
    inner: crate::hash_table::IntoIter<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}
impl<T> FusedIterator for IntoIter<T> {}

impl<T, S> IntoIterator for HashSet<T, S> {
    type IntoIter = IntoIter<T>;
    type Item = T;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, T, S> IntoIterator for &'a HashSet<T, S> {
    type IntoIter = Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T, S> FromIterator<T> for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = HashSet::with_hasher(S::default());
        set.extend(iter);
        set
    }
}

impl<T, S, const N: usize> From<[T; N]> for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from(values: [T; N]) -> Self {
        values.into_iter().collect()
    }
}

impl<T, S> Extend<T> for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        self.reserve(if self.is_empty() { lower } else { lower.div_ceil(2) });
        for value in iter {
            self.insert(value);
        }
    }
}

impl<'a, T, S> Extend<&'a T> for HashSet<T, S>
where
    T: Hash + Eq + Copy + 'a,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied());
    }
}

/// An iterator over the union of two sets.
pub struct Union<'a, T, S> {
    iter: Iter<'a, T>,
    other_iter: Iter<'a, T>,
    set: &'a HashSet<T, S>,
}

impl<'a, T, S> Iterator for Union<'a, T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(v) = self.iter.next() {
            return Some(v);
        }
        loop {
            let v = self.other_iter.next()?;
            if !self.set.contains(v) {
                return Some(v);
            }
        }
    }
}

impl<T, S> FusedIterator for Union<'_, T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

/// An iterator over the intersection of two sets.
pub struct Intersection<'a, T, S> {
    iter: Iter<'a, T>,
    other: &'a HashSet<T, S>,
}

impl<'a, T, S> Iterator for Intersection<'a, T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let v = self.iter.next()?;
            if self.other.contains(v) {
                return Some(v);
            }
        }
    }
}

impl<T, S> FusedIterator for Intersection<'_, T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

/// An iterator over the difference of two sets.
pub struct Difference<'a, T, S> {
    iter: Iter<'a, T>,
    other: &'a HashSet<T, S>,
}

impl<'a, T, S> Iterator for Difference<'a, T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let v = self.iter.next()?;
            if !self.other.contains(v) {
                return Some(v);
            }
        }
    }
}

impl<T, S> FusedIterator for Difference<'_, T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

/// An iterator over the symmetric difference of two sets.
pub struct SymmetricDifference<'a, T, S> {
    iter: core::iter::Chain<Difference<'a, T, S>, Difference<'a, T, S>>,
}

impl<'a, T, S> Iterator for SymmetricDifference<'a, T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

impl<T, S> FusedIterator for SymmetricDifference<'_, T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

/// An iterator that removes and yields the values of a `HashSet` matching a
/// predicate.
pub struct ExtractIf<'a, T, F> {
    table: &'a mut HashTable<T>,
    raw: RawIter,
    pred: F,
}

impl<T, F> Iterator for ExtractIf<'_, T, F>
where
    F: FnMut(&T) -> bool,
{
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let pred = &mut self.pred;
        self.raw.extract_next(self.table, |value| pred(value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.raw.remaining()))
    }
}

impl<T, F> FusedIterator for ExtractIf<'_, T, F> where F: FnMut(&T) -> bool {}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec::Vec;
    use core::hash::BuildHasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipHashBuilder {
        k1: u64,
        k2: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k1, self.k2)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k1: rng.try_next_u64().unwrap_or(0),
                k2: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    type SipSet<T> = HashSet<T, SipHashBuilder>;

    fn sorted<T: Ord + Clone>(iter: impl Iterator<Item = T>) -> Vec<T> {
        let mut values: Vec<T> = iter.collect();
        values.sort();
        values
    }

    #[test]
    fn test_new_and_with_hasher() {
        let set: SipSet<i32> = HashSet::default();
        assert!(set.is_empty());
        assert_eq!(set.slot_count(), 4);

        let set2 = HashSet::<i32, _>::with_hasher(SipHashBuilder::default());
        assert!(set2.is_empty());
    }

    #[test]
    fn test_with_capacity() {
        let set = HashSet::<i32, _>::with_capacity_and_hasher(100, SipHashBuilder::default());
        assert!(set.capacity() >= 100);
        assert!(set.is_empty());
    }

    #[test]
    fn test_insert_and_contains() {
        let mut set = SipSet::default();

        assert!(set.insert(1));
        assert!(set.insert(2));
        assert!(!set.insert(1));

        assert_eq!(set.len(), 2);
        assert!(set.contains(&1));
        assert!(set.contains(&2));
        assert!(!set.contains(&3));
    }

    #[test]
    fn test_remove() {
        let mut set = SipSet::default();
        set.insert(1);
        set.insert(2);

        assert!(set.remove(&1));
        assert!(!set.remove(&1));
        assert_eq!(set.len(), 1);
        assert!(!set.contains(&1));
        assert!(set.contains(&2));
    }

    #[test]
    fn test_take_and_get_borrowed() {
        let mut set = SipSet::default();
        set.insert("hello".to_string());

        assert_eq!(set.get("hello"), Some(&"hello".to_string()));
        assert_eq!(set.take("hello"), Some("hello".to_string()));
        assert_eq!(set.take("hello"), None);
        assert!(set.is_empty());
    }

    #[test]
    fn test_replace_keeps_single_copy() {
        #[derive(Debug)]
        struct Tagged(u32, &'static str);

        impl PartialEq for Tagged {
            fn eq(&self, other: &Self) -> bool {
                self.0 == other.0
            }
        }

        impl Eq for Tagged {}

        impl core::hash::Hash for Tagged {
            fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }

        let mut set = SipSet::default();
        assert!(set.insert(Tagged(1, "first")));
        assert!(!set.insert(Tagged(1, "second")));
        assert_eq!(set.get(&Tagged(1, "")).map(|t| t.1), Some("first"));

        let old = set.replace(Tagged(1, "third"));
        assert_eq!(old.map(|t| t.1), Some("first"));
        assert_eq!(set.get(&Tagged(1, "")).map(|t| t.1), Some("third"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_clear_and_reserve() {
        let mut set = SipSet::default();
        for i in 0..10 {
            set.insert(i);
        }
        set.clear();
        assert!(set.is_empty());

        set.reserve(100);
        assert!(set.capacity() >= 100);
        assert_eq!(set.try_reserve(usize::MAX), Err(Error::CapacityOverflow));
    }

    #[test]
    fn test_set_operations() {
        let a: SipSet<i32> = (0..10).collect();
        let b: SipSet<i32> = (5..15).collect();

        assert_eq!(sorted(a.union(&b).copied()), (0..15).collect::<Vec<_>>());
        assert_eq!(sorted(a.intersection(&b).copied()), (5..10).collect::<Vec<_>>());
        assert_eq!(sorted(a.difference(&b).copied()), (0..5).collect::<Vec<_>>());
        assert_eq!(
            sorted(a.symmetric_difference(&b).copied()),
            (0..5).chain(10..15).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_subset_and_disjoint() {
        let a: SipSet<i32> = (0..5).collect();
        let b: SipSet<i32> = (0..10).collect();
        let c: SipSet<i32> = (20..25).collect();

        assert!(a.is_subset(&b));
        assert!(!b.is_subset(&a));
        assert!(b.is_superset(&a));
        assert!(a.is_disjoint(&c));
        assert!(!a.is_disjoint(&b));
    }

    #[test]
    fn test_drain_retain_extract_if() {
        let mut set: SipSet<i32> = (0..100).collect();
        set.retain(|&x| x % 2 == 0);
        assert_eq!(set.len(), 50);

        let extracted = sorted(set.extract_if(|&x| x >= 50));
        assert_eq!(extracted.len(), 25);
        assert_eq!(extracted[0], 50);
        assert_eq!(set.len(), 25);

        let drained = sorted(set.drain());
        assert_eq!(drained, (0..50).step_by(2).collect::<Vec<_>>());
        assert!(set.is_empty());
    }

    #[test]
    fn test_equality_and_debug() {
        let a: SipSet<i32> = (0..20).collect();
        let mut b = a.clone();
        assert_eq!(a, b);
        b.remove(&3);
        assert_ne!(a, b);

        let mut single = SipSet::default();
        single.insert(7);
        assert_eq!(alloc::format!("{single:?}"), "{7}");
    }

    #[test]
    fn test_extend_and_into_iter() {
        let mut set: SipSet<String> = HashSet::default();
        set.extend(["a", "b", "a"].iter().map(|s| s.to_string()));
        assert_eq!(set.len(), 2);

        let mut numbers: SipSet<u8> = HashSet::default();
        numbers.extend(&[1, 2, 3]);
        assert_eq!(sorted(numbers.into_iter()), [1, 2, 3]);
    }

    #[test]
    fn test_many_insertions_and_shrink() {
        let mut set: SipSet<u64> = HashSet::default();
        for i in 0..10_000 {
            assert!(set.insert(i));
        }
        for i in 0..10_000 {
            assert!(set.contains(&i));
        }
        set.retain(|&x| x < 100);
        set.shrink_to_fit();
        assert_eq!(set.len(), 100);
        assert_eq!(set.slot_count(), 256);
        for i in 0..100 {
            assert!(set.contains(&i));
        }
    }
}
