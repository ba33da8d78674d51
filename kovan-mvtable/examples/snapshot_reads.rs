//! Readers holding a snapshot keep seeing the same values while a writer
//! layers new versions on top.

use kovan_mvtable::{MvccError, MvccTable};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn main() -> Result<(), MvccError> {
    println!("=== Snapshot Reads Demo ===\n");

    let table: Arc<MvccTable> = Arc::new(MvccTable::new(512, 16)?);
    for key in 1..=256u64 {
        table.put(key, 0)?;
    }

    let snap_version = table.last_committed();
    println!("Initial load committed at version {}", snap_version);

    let start = Instant::now();
    let writer = {
        let table = Arc::clone(&table);
        thread::spawn(move || -> Result<(), MvccError> {
            for round in 1..=100u64 {
                for key in 1..=256u64 {
                    table.put(key, round)?;
                }
            }
            Ok(())
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                let mut stale = 0;
                for key in 1..=256u64 {
                    if table.get_at(key, snap_version) == Some(0) {
                        stale += 1;
                    }
                }
                stale
            })
        })
        .collect();

    for reader in readers {
        let stale = reader.join().unwrap();
        println!("Reader saw {} keys unchanged at version {}", stale, snap_version);
    }
    writer.join().unwrap()?;

    println!(
        "Writer finished 25,600 puts in {:?}; last committed version {}",
        start.elapsed(),
        table.last_committed()
    );
    println!("Key 1 now: {:?}", table.get(1));

    // A one-bucket table fills after a single key.
    let tight: MvccTable = MvccTable::new(1, 4)?;
    tight.put(1, 1)?;
    match tight.put(2, 2) {
        Err(e) => println!("Tight table: {}", e),
        Ok(()) => println!("Tight table unexpectedly accepted key 2"),
    }

    Ok(())
}
