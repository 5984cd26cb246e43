//! Low-level table statistics, compiled with the `stats` feature.

use alloc::vec;
use alloc::vec::Vec;

use crate::control::GROUP_WIDTH;
use crate::hash_table::HashTable;
use crate::iter::RawIter;

/// A snapshot of a table's occupancy and memory use.
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of values in the table
    pub populated: usize,
    /// Maximum number of values before the table grows
    pub capacity: usize,
    /// Total number of slots allocated
    pub total_slots: usize,
    /// Number of deleted slots awaiting a rehash
    pub tombstones: usize,
    /// Fraction of slots holding values
    pub load_factor: f64,
    /// Configured maximum load factor
    pub max_load_factor: f64,
    /// Total memory in bytes of the table's allocation
    pub total_bytes: usize,
    /// Bytes reserved for slots that hold no value
    pub wasted_bytes: usize,
}

impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% of capacity)",
            self.populated,
            self.capacity,
            if self.capacity == 0 {
                0.0
            } else {
                self.populated as f64 / self.capacity as f64 * 100.0
            }
        );
        println!(
            "Slots: {} ({:.2}% load, max {:.2}%)",
            self.total_slots,
            self.load_factor * 100.0,
            self.max_load_factor * 100.0
        );
        println!("Tombstones: {}", self.tombstones);
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

/// Number of values by probe length, measured in groups from each value's
/// home group. Bin `0` counts values stored in their home group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHistogram {
    /// Count of values per probe length.
    pub bins: Vec<usize>,
}

impl ProbeHistogram {
    /// Total number of values counted.
    pub fn total(&self) -> usize {
        self.bins.iter().sum()
    }

    /// The longest probe length with at least one value.
    pub fn max_probe_length(&self) -> Option<usize> {
        self.bins.iter().rposition(|&count| count > 0)
    }

    /// Pretty-prints the histogram horizontally using stdout.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = self.bins.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!("probe histogram ({} entries):", self.total());

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let full = units / 8;
            let rem = units % 8;
            let mut bar = "█".repeat(full);
            if rem > 0 {
                bar.push(['▏', '▎', '▍', '▌', '▋', '▊', '▉'][rem - 1]);
            }
            bar
        };

        for (i, &count) in self.bins.iter().enumerate() {
            println!("{:>3} | {} ({})", i, make_bar(count), count);
        }
    }
}

impl<V> HashTable<V> {
    /// Computes a histogram of probe lengths, in groups.
    ///
    /// Stored hashes are used when available; otherwise `hasher` is called
    /// once per value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use flat16::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// for v in 0u64..100 {
    ///     table.entry(v, |&x| x == v, |&x| x).or_insert(v);
    /// }
    ///
    /// let histogram = table.probe_histogram(|&x| x);
    /// assert_eq!(histogram.total(), 100);
    /// ```
    pub fn probe_histogram(&self, hasher: impl Fn(&V) -> u64) -> ProbeHistogram {
        let num_groups = self.storage.num_groups();
        let mut bins = vec![0usize; num_groups];

        let mut iter = RawIter::new(&self.storage, self.len);
        while let Some(index) = iter.next_index(&self.storage) {
            // SAFETY: The raw iterator only yields used slots.
            let hash = unsafe {
                match self.storage.hash(index) {
                    Some(hash) => hash,
                    None => hasher(self.storage.get(index)),
                }
            };
            let home = (hash as usize & self.storage.mask()) / GROUP_WIDTH;
            let distance = (index / GROUP_WIDTH).wrapping_sub(home) & (num_groups - 1);
            bins[distance] += 1;
        }

        let used_bins = bins.iter().rposition(|&count| count > 0).map_or(1, |i| i + 1);
        bins.truncate(used_bins);
        ProbeHistogram { bins }
    }

    /// Returns occupancy and memory statistics for the table.
    pub fn debug_stats(&self) -> DebugStats {
        let total_slots = self.storage.capacity();
        let slot_bytes = core::mem::size_of::<V>()
            + if self.storage.store_hash() {
                core::mem::size_of::<u64>()
            } else {
                0
            };

        DebugStats {
            populated: self.len,
            capacity: self.capacity(),
            total_slots,
            tombstones: self.tombstones,
            load_factor: self.load_factor(),
            max_load_factor: self.max_load_factor(),
            total_bytes: self.storage.allocated_bytes(),
            wasted_bytes: (total_slots - self.len) * slot_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    #[test]
    fn histogram_counts_every_value() {
        let mut table: HashTable<u64> = HashTable::with_config(Config::new().with_store_hash(false));
        for v in 0..1000u64 {
            let hash = v.wrapping_mul(0x9E37_79B9_7F4A_7C15);
            table
                .entry(hash, |&x| x == v, |&x| x.wrapping_mul(0x9E37_79B9_7F4A_7C15))
                .or_insert(v);
        }

        let histogram = table.probe_histogram(|&x| x.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        assert_eq!(histogram.total(), 1000);
        assert!(histogram.bins[0] > 0);
        #[cfg(feature = "std")]
        histogram.print();
    }

    #[test]
    fn colliding_values_spill_into_later_groups() {
        let mut table: HashTable<u64> = HashTable::with_capacity(64);
        for v in 0..40u64 {
            table.entry(0, |&x| x == v, |_| 0).or_insert(v);
        }

        let histogram = table.probe_histogram(|_| 0);
        assert_eq!(histogram.bins, [16, 16, 8]);
        assert_eq!(histogram.max_probe_length(), Some(2));
    }

    #[test]
    fn stats_reflect_tombstones() {
        let mut table: HashTable<u64> = HashTable::with_capacity(32);
        for v in 0..20u64 {
            table.entry(0, |&x| x == v, |_| 0).or_insert(v);
        }
        table.remove(0, |&x| x == 3);

        let stats = table.debug_stats();
        assert_eq!(stats.populated, 19);
        assert_eq!(stats.total_slots, 64);
        assert_eq!(stats.tombstones, 1);
        assert_eq!(stats.capacity, 32);
        assert!(stats.total_bytes >= 64 * (8 + 8) + 64);
        assert_eq!(stats.wasted_bytes, 45 * 16);
        #[cfg(feature = "std")]
        stats.print();
    }

    #[test]
    fn empty_table_histogram() {
        let table: HashTable<u64> = HashTable::new();
        let histogram = table.probe_histogram(|&x| x);
        assert_eq!(histogram.total(), 0);
        assert_eq!(histogram.max_probe_length(), None);
    }
}
