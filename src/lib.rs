//! cuckoo-map: a single-threaded key-value map backed by two-table cuckoo
//! hashing.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: constant-time expected lookup and insert. Every key has exactly
//!   two candidate slots, one per table. Collisions are resolved by
//!   displacing occupants between the tables, not by chaining or probing.
//! - Layers:
//!   - CuckooHash: multiply-shift hash from a 32-bit key digest to a table
//!     index. Two random coefficients per function, one function per table.
//!   - SlotTables<K, V>: structural layer. Entry storage (a `SlotMap`), the
//!     two slot arrays, displacement insertion, growth, and rehash.
//!   - CuckooMap<K, V, S, R>: public API. Computes digests through
//!     `S: BuildHasher`, draws coefficients from `R: RngCore`, enforces the
//!     load factor threshold, and guards against reentrancy.
//!
//! Invariants
//! - A key occupies at most one slot across both tables.
//! - Outside of a call in progress, every stored entry occupies exactly one
//!   slot.
//! - After every public operation, `len / (2 * capacity)` stays at or below
//!   the configured threshold (0.4 by default). The check runs before each
//!   insert.
//!
//! Displacement and rehash
//! - Insertion starts at table 0 and alternates tables, evicting occupants,
//!   for at most `len + 1` rounds. An entry still homeless after that
//!   triggers a rehash: fresh coefficients and every entry placed again.
//!   A rehash that cannot place everything restarts with new coefficients.
//! - Insert-driven rehashes give up on a size after a fixed number of
//!   failed attempts and double the tables instead, a bounded number of
//!   times before panicking.
//! - Equal digests share both candidate slots, so a third key on one digest
//!   never fits. `put` detects it, takes the key back out and panics with
//!   the first two keys still in place.
//! - Displacement moves slot-map keys, not entries. A homeless entry is
//!   never dropped; it stays in storage until a rehash places it.
//!
//! Hashing
//! - Each entry stores its digest. Rehash and growth never call `K: Hash`;
//!   `K: Eq` runs only during lookups, after a digest match.
//! - The random source is injected (`SmallRng` from OS entropy by default),
//!   so a seeded generator makes table layouts reproducible.
//!
//! Constraints and non-goals
//! - Single-threaded: `!Send`/`!Sync`, via the debug reentrancy tracker.
//! - Removal never shrinks the tables or triggers a rehash.
//! - No std map adapters (`Index`, `Extend`, entry API).
//! - Logging goes through the `log` facade: growth at `debug`, rehash
//!   attempts at `trace`, escalation at `warn`.

mod config;
mod cuckoo_hash;
mod cuckoo_map;
mod cuckoo_map_proptest;
mod error;
mod reentrancy;
mod slot_table;

// Public surface
pub use config::{CuckooConfig, DEFAULT_LOAD_FACTOR, DEFAULT_SIZE};
pub use cuckoo_hash::{digest_of, log2, CuckooHash};
pub use cuckoo_map::CuckooMap;
pub use error::ConfigError;
pub use slot_table::{Iter, IterMut};
