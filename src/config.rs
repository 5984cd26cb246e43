//! Runtime tuning for a table: the growth threshold and whether full hashes
//! are kept alongside each slot.

use crate::storage::MIN_CAPACITY;

/// The fraction of slots that may hold live entries before the table grows.
///
/// Values are clamped to `[LoadFactor::MIN, LoadFactor::MAX]`; `NaN` maps to
/// the default.
///
/// # Examples
///
/// ```rust
/// use flat16::LoadFactor;
///
/// assert_eq!(LoadFactor::new(0.65).get(), 0.65);
/// assert_eq!(LoadFactor::new(1.5).get(), LoadFactor::MAX);
/// assert_eq!(LoadFactor::new(0.0).get(), LoadFactor::MIN);
/// assert_eq!(LoadFactor::default().get(), 0.5);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct LoadFactor(f64);

impl LoadFactor {
    /// Smallest accepted load factor.
    pub const MIN: f64 = 0.2;
    /// Largest accepted load factor.
    pub const MAX: f64 = 0.8;
    /// Load factor used when none is configured.
    pub const DEFAULT: f64 = 0.5;

    /// Creates a load factor, clamping `value` into the accepted range.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return LoadFactor(Self::DEFAULT);
        }
        LoadFactor(value.clamp(Self::MIN, Self::MAX))
    }

    /// Returns the load factor as a fraction.
    pub fn get(self) -> f64 {
        self.0
    }

    /// Maximum live entries for a table of `slots` slots. At least one entry
    /// fits and at least one slot always stays free.
    #[inline]
    pub(crate) fn threshold(self, slots: usize) -> usize {
        debug_assert!(slots >= MIN_CAPACITY);
        let threshold = (slots as f64 * self.0) as usize;
        threshold.clamp(1, slots - 1)
    }

    /// Smallest power-of-two slot count (at least `MIN_CAPACITY`) whose
    /// threshold admits `items` entries, or `None` on overflow.
    pub(crate) fn slots_for(self, items: usize) -> Option<usize> {
        let min_slots = (items as f64 / self.0).ceil();
        if min_slots >= usize::MAX as f64 {
            return None;
        }

        let mut slots = (min_slots as usize)
            .max(MIN_CAPACITY)
            .checked_next_power_of_two()?;
        while self.threshold(slots) < items {
            slots = slots.checked_mul(2)?;
        }
        Some(slots)
    }
}

impl Default for LoadFactor {
    fn default() -> Self {
        LoadFactor(Self::DEFAULT)
    }
}

/// Table configuration.
///
/// `store_hash` controls whether each slot keeps its full 64-bit hash. With
/// stored hashes a rehash never calls back into the hasher, at the cost of
/// eight bytes per slot. Without them, every rehash recomputes one hash per
/// live entry. The default stores hashes.
///
/// # Examples
///
/// ```rust
/// use flat16::Config;
///
/// let config = Config::new().with_max_load_factor(0.75).with_store_hash(false);
/// assert_eq!(config.max_load_factor().get(), 0.75);
/// assert!(!config.store_hash());
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    max_load_factor: LoadFactor,
    store_hash: bool,
}

impl Config {
    /// The default configuration: load factor 0.5, hashes stored.
    pub fn new() -> Self {
        Config {
            max_load_factor: LoadFactor::default(),
            store_hash: true,
        }
    }

    /// Sets the maximum load factor (clamped to `[0.2, 0.8]`).
    pub fn with_max_load_factor(mut self, max_load_factor: f64) -> Self {
        self.max_load_factor = LoadFactor::new(max_load_factor);
        self
    }

    /// Sets whether slots keep their full hash.
    pub fn with_store_hash(mut self, store_hash: bool) -> Self {
        self.store_hash = store_hash;
        self
    }

    /// Returns the configured maximum load factor.
    pub fn max_load_factor(&self) -> LoadFactor {
        self.max_load_factor
    }

    /// Returns `true` if slots keep their full hash.
    pub fn store_hash(&self) -> bool {
        self.store_hash
    }

    pub(crate) fn set_max_load_factor(&mut self, max_load_factor: LoadFactor) {
        self.max_load_factor = max_load_factor;
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamping() {
        assert_eq!(LoadFactor::new(0.1).get(), LoadFactor::MIN);
        assert_eq!(LoadFactor::new(0.9).get(), LoadFactor::MAX);
        assert_eq!(LoadFactor::new(f64::NAN).get(), LoadFactor::DEFAULT);
        assert_eq!(LoadFactor::new(0.3).get(), 0.3);
    }

    #[test]
    fn threshold_keeps_a_free_slot() {
        assert_eq!(LoadFactor::new(0.5).threshold(4), 2);
        assert_eq!(LoadFactor::new(0.8).threshold(4), 3);
        assert_eq!(LoadFactor::new(0.2).threshold(4), 1);
        assert_eq!(LoadFactor::new(0.5).threshold(1 << 20), 1 << 19);
    }

    #[test]
    fn slots_for_is_minimal_power_of_two() {
        let lf = LoadFactor::default();
        assert_eq!(lf.slots_for(0), Some(4));
        assert_eq!(lf.slots_for(2), Some(4));
        assert_eq!(lf.slots_for(3), Some(8));
        assert_eq!(lf.slots_for(16), Some(32));
        assert_eq!(lf.slots_for(1_000_000), Some(1 << 21));

        let lf = LoadFactor::new(0.8);
        assert_eq!(lf.slots_for(3), Some(4));
        assert_eq!(lf.slots_for(4), Some(8));
        assert_eq!(lf.slots_for(13), Some(32));

        for items in 0..2000 {
            let slots = lf.slots_for(items).unwrap();
            assert!(slots.is_power_of_two());
            assert!(lf.threshold(slots) >= items);
            assert!(slots == MIN_CAPACITY || lf.threshold(slots / 2) < items);
        }
    }

    #[test]
    fn slots_for_overflow() {
        assert_eq!(LoadFactor::default().slots_for(usize::MAX), None);
        assert_eq!(LoadFactor::default().slots_for(usize::MAX / 2), None);
    }

    #[test]
    fn builder() {
        let config = Config::default();
        assert_eq!(config.max_load_factor().get(), 0.5);
        assert!(config.store_hash());

        let config = Config::new().with_max_load_factor(2.0).with_store_hash(false);
        assert_eq!(config.max_load_factor().get(), 0.8);
        assert!(!config.store_hash());
    }
}
