use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use clap::Parser;
use flat16::Config;
use flat16::HashTable;
use flat16::hash_table::Entry;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    #[arg(short = 'l', long = "load_factor", default_value_t = 0.5)]
    load_factor: f64,

    /// Erase every n-th value after filling, leaving tombstones behind.
    #[arg(short = 'e', long = "erase_every", default_value_t = 3)]
    erase_every: u64,

    /// Recompute hashes on rehash instead of storing them.
    #[arg(long = "no_store_hash")]
    no_store_hash: bool,
}

fn hash_u64(value: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn main() {
    let args = Args::parse();
    let config = Config::new()
        .with_max_load_factor(args.load_factor)
        .with_store_hash(!args.no_store_hash);

    println!(
        "Creating HashTable with target capacity: {} ({:?})",
        args.target_capacity, config
    );

    let mut table: HashTable<u64> =
        HashTable::with_capacity_and_config(args.target_capacity, config);

    println!(
        "Actual capacity: {} ({} slots)",
        table.capacity(),
        table.slot_count()
    );
    println!("Filling table with u64 values...");

    let mut num_failures = 0;
    let num_values = table.capacity() as u64;
    for value in 0..num_values {
        let hash = hash_u64(value);

        match table.try_entry(hash, |&v| v == value, |&v| hash_u64(v)) {
            Ok(Entry::Vacant(entry)) => {
                entry.insert(value);
            }
            Ok(Entry::Occupied(_)) => {
                panic!("Value already exists in table: {}", value);
            }
            Err(err) => {
                println!("try_entry failed for {value}: {err}");
                num_failures += 1;
            }
        }
    }

    println!("Inserted {} values into table", table.len());
    println!("Final load factor: {:.2}%", table.load_factor() * 100.0);

    table.probe_histogram(|&v| hash_u64(v)).print();
    table.debug_stats().print();

    if args.erase_every > 0 {
        let mut erased = 0;
        for value in (0..num_values).step_by(args.erase_every as usize) {
            if table.remove(hash_u64(value), |&v| v == value).is_some() {
                erased += 1;
            }
        }
        println!();
        println!("Erased {erased} values");
        table.debug_stats().print();

        table.rehash(0, |&v| hash_u64(v));
        println!();
        println!("After rehash:");
        table.debug_stats().print();
    }

    println!(
        "Number of failed try_entry attempts: {} ({:.02}%)",
        num_failures,
        num_failures as f64 / num_values.max(1) as f64 * 100.0
    );
}
