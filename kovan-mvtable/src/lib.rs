#![doc(
    html_logo_url = "https://raw.githubusercontent.com/vertexclique/kovan/master/art/kovan-square.svg"
)]
//! # Kovan MVTable
//!
//! `kovan-mvtable` is a fixed-size, multi-version hash table. Each bucket is a
//! lock-free, version-ordered chain of historical values, so readers observe a
//! consistent snapshot ("as of transaction N") without blocking writers, and a
//! failed write is undone by deleting only the nodes it created.
//!
//! ## How it works
//!
//! - **Chains**: [`VersionedChain`] is a CAS-linked list of `(version, payload)`
//!   nodes, newest first, reclaimed through `kovan`.
//! - **Placement**: every key has two candidate buckets. When both are taken,
//!   the resident of the second is shadowed and carried forward to its own
//!   candidates, up to `max_reach` times.
//! - **Versions**: each write draws one transaction id; all nodes it links share
//!   it. Success advances the last committed version, failure deletes every
//!   node tagged with the id.
//! - **Reads**: lock-free, at most two bucket scans, bounded by the last
//!   committed version.
//!
//! Writers are serialized by a single lock. Key 0 is the empty sentinel and
//! cannot be stored.
//!
//! ## Example
//!
//! ```rust
//! use kovan_mvtable::MvccTable;
//!
//! let table: MvccTable = MvccTable::new(512, 16).unwrap();
//!
//! table.put(7, 100).unwrap();
//! let before = table.snapshot();
//!
//! table.put(7, 200).unwrap();
//! assert_eq!(table.get(7), Some(200));
//! assert_eq!(before.get(7), Some(100));
//!
//! assert_eq!(table.delete(7), Ok(true));
//! assert_eq!(table.get(7), None);
//! ```

mod chain;
mod config;
mod entry;
mod error;
mod table;

pub use crate::chain::{NodeRef, VersionedChain};
pub use crate::config::{DEFAULT_MAX_REACH, DEFAULT_SIZE, TableConfig};
pub use crate::entry::Entry;
pub use crate::error::MvccError;
pub use crate::table::{MvccTable, Snapshot};

// Chain operations run under a kovan guard.
pub use kovan::{Guard, pin};
