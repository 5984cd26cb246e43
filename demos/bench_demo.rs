use std::cell::Cell;
use std::collections::HashMap as StdHashMap;
use std::hash::BuildHasher;
use std::time::Duration;
use std::time::Instant;

use clap::Parser;
use flat16::ChainedHashMap;
use flat16::Config;
use flat16::HashMap;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use siphasher::sip::SipHasher;

#[derive(Parser, Debug)]
struct Args {
    /// Number of keys inserted, looked up and erased per map.
    iterations: usize,
}

/// Counts every hasher built, i.e. every key hashed, into a caller-owned
/// counter.
#[derive(Clone, Copy)]
struct CountingBuilder<'a> {
    hashes: &'a Cell<u64>,
}

impl BuildHasher for CountingBuilder<'_> {
    type Hasher = SipHasher;

    fn build_hasher(&self) -> Self::Hasher {
        self.hashes.set(self.hashes.get() + 1);
        SipHasher::new_with_keys(0x5555_5555, 0xAAAA_AAAA)
    }
}

trait DemoMap {
    fn put(&mut self, key: u64, value: u64);
    fn has(&self, key: u64) -> bool;
    fn erase(&mut self, key: u64) -> bool;
    fn sum(&self) -> u64;
    fn slots(&self) -> usize;
}

impl DemoMap for HashMap<u64, u64, CountingBuilder<'_>> {
    fn put(&mut self, key: u64, value: u64) {
        self.insert(key, value);
    }

    fn has(&self, key: u64) -> bool {
        self.contains_key(&key)
    }

    fn erase(&mut self, key: u64) -> bool {
        HashMap::erase(self, &key) == 1
    }

    fn sum(&self) -> u64 {
        self.values().fold(0, |acc, v| acc.wrapping_add(*v))
    }

    fn slots(&self) -> usize {
        self.slot_count()
    }
}

impl DemoMap for ChainedHashMap<u64, u64, CountingBuilder<'_>> {
    fn put(&mut self, key: u64, value: u64) {
        self.insert(key, value);
    }

    fn has(&self, key: u64) -> bool {
        self.contains_key(&key)
    }

    fn erase(&mut self, key: u64) -> bool {
        ChainedHashMap::erase(self, &key) == 1
    }

    fn sum(&self) -> u64 {
        self.values().fold(0, |acc, v| acc.wrapping_add(*v))
    }

    fn slots(&self) -> usize {
        self.bucket_count()
    }
}

impl DemoMap for StdHashMap<u64, u64, CountingBuilder<'_>> {
    fn put(&mut self, key: u64, value: u64) {
        self.entry(key).or_insert(value);
    }

    fn has(&self, key: u64) -> bool {
        self.contains_key(&key)
    }

    fn erase(&mut self, key: u64) -> bool {
        self.remove(&key).is_some()
    }

    fn sum(&self) -> u64 {
        self.values().fold(0, |acc, v| acc.wrapping_add(*v))
    }

    fn slots(&self) -> usize {
        self.capacity()
    }
}

impl DemoMap for hashbrown::HashMap<u64, u64, CountingBuilder<'_>> {
    fn put(&mut self, key: u64, value: u64) {
        self.entry(key).or_insert(value);
    }

    fn has(&self, key: u64) -> bool {
        self.contains_key(&key)
    }

    fn erase(&mut self, key: u64) -> bool {
        self.remove(&key).is_some()
    }

    fn sum(&self) -> u64 {
        self.values().fold(0, |acc, v| acc.wrapping_add(*v))
    }

    fn slots(&self) -> usize {
        self.capacity()
    }
}

struct Row {
    op: &'static str,
    elapsed: Duration,
    ops: usize,
    hashes: u64,
}

fn time<T>(hashes: &Cell<u64>, op: &'static str, ops: usize, f: impl FnOnce() -> T) -> (T, Row) {
    let before = hashes.get();
    let start = Instant::now();
    let result = std::hint::black_box(f());
    let elapsed = start.elapsed();
    (
        result,
        Row {
            op,
            elapsed,
            ops,
            hashes: hashes.get() - before,
        },
    )
}

fn run<M: DemoMap>(map: &mut M, hashes: &Cell<u64>, keys: &[u64], misses: &[u64]) -> Vec<Row> {
    let mut rows = Vec::new();

    let ((), row) = time(hashes, "insert", keys.len(), || {
        for &key in keys {
            map.put(key, key);
        }
    });
    rows.push(row);

    let (hits, row) = time(hashes, "find hit", keys.len(), || {
        keys.iter().filter(|&&key| map.has(key)).count()
    });
    assert_eq!(hits, keys.len());
    rows.push(row);

    let (found, row) = time(hashes, "find miss", misses.len(), || {
        misses.iter().filter(|&&key| map.has(key)).count()
    });
    assert_eq!(found, 0);
    rows.push(row);

    let (_, row) = time(hashes, "iterate", keys.len(), || map.sum());
    rows.push(row);

    let half = &keys[..keys.len() / 2];
    let (erased, row) = time(hashes, "erase half", half.len(), || {
        half.iter().filter(|&&key| map.erase(key)).count()
    });
    assert_eq!(erased, half.len());
    rows.push(row);

    let ((), row) = time(hashes, "reinsert half", half.len(), || {
        for &key in half {
            map.put(key, key);
        }
    });
    rows.push(row);

    rows
}

fn print_table(name: &str, slots: usize, rows: &[Row]) {
    println!();
    println!("{name} ({slots} slots)");
    println!(
        "{:<14} {:>12} {:>10} {:>12}",
        "operation", "total (ms)", "ns/op", "hashes"
    );
    for row in rows {
        let ns_per_op = if row.ops == 0 {
            0.0
        } else {
            row.elapsed.as_nanos() as f64 / row.ops as f64
        };
        println!(
            "{:<14} {:>12.3} {:>10.1} {:>12}",
            row.op,
            row.elapsed.as_secs_f64() * 1000.0,
            ns_per_op,
            row.hashes
        );
    }
}

fn bench<M: DemoMap>(name: &str, mut map: M, hashes: &Cell<u64>, keys: &[u64], misses: &[u64]) {
    hashes.set(0);
    let rows = run(&mut map, hashes, keys, misses);
    print_table(name, map.slots(), &rows);
}

fn main() {
    let args = Args::parse();

    let mut rng = SmallRng::from_os_rng();
    let mut keys: Vec<u64> = (0..args.iterations * 2)
        .map(|_| rng.random::<u64>())
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys.shuffle(&mut rng);
    let (keys, misses) = keys.split_at(keys.len() / 2);

    println!("{} keys, {} misses", keys.len(), misses.len());

    let hashes = Cell::new(0);
    let builder = CountingBuilder { hashes: &hashes };

    bench(
        "flat16::HashMap",
        HashMap::<u64, u64, _>::with_hasher(builder),
        &hashes,
        keys,
        misses,
    );
    bench(
        "flat16::HashMap (no stored hash)",
        HashMap::<u64, u64, _>::with_capacity_config_and_hasher(
            0,
            Config::new().with_store_hash(false),
            builder,
        ),
        &hashes,
        keys,
        misses,
    );
    bench(
        "flat16::HashMap (load factor 0.8)",
        HashMap::<u64, u64, _>::with_capacity_config_and_hasher(
            0,
            Config::new().with_max_load_factor(0.8),
            builder,
        ),
        &hashes,
        keys,
        misses,
    );
    bench(
        "flat16::ChainedHashMap",
        ChainedHashMap::<u64, u64, _>::with_hasher(builder),
        &hashes,
        keys,
        misses,
    );
    bench(
        "std::collections::HashMap",
        StdHashMap::<u64, u64, _>::with_hasher(builder),
        &hashes,
        keys,
        misses,
    );
    bench(
        "hashbrown::HashMap",
        hashbrown::HashMap::<u64, u64, _>::with_hasher(builder),
        &hashes,
        keys,
        misses,
    );
}
