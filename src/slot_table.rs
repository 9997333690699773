//! SlotTables: the two cuckoo tables plus entry storage.
//!
//! Entries live in a `SlotMap`; each table slot holds the entry's
//! generational key. Displacement therefore only moves small keys, and an
//! entry that fails to settle is never lost: it stays in storage, unplaced,
//! until the next successful rehash places it.
//!
//! This layer never calls `K: Hash`. The digest is cached per entry when it
//! is stored, and rehashing reads the cached digest. `K: Eq` runs only during
//! lookups, after the digests already match.

use crate::cuckoo_hash::CuckooHash;
use core::borrow::Borrow;
use log::{debug, trace, warn};
use rand::RngCore;
use slotmap::{DefaultKey, SlotMap};

/// Consecutive failed rehash attempts at one size before an insert-driven
/// rebuild doubles the tables instead of drawing new coefficients again.
pub(crate) const MAX_REHASH_ATTEMPTS: usize = 32;

/// Doublings an insert-driven rebuild may add to the size it started from.
pub(crate) const MAX_ESCALATIONS: u32 = 8;

#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    digest: u32,
}

pub(crate) struct SlotTables<K, V> {
    entries: SlotMap<DefaultKey, Entry<K, V>>,
    tables: [Vec<Option<DefaultKey>>; 2],
    hashes: [CuckooHash; 2],
}

/// Utilization of two tables of `table_size` slots holding `len` entries.
#[inline]
pub(crate) fn load(len: usize, table_size: usize) -> f64 {
    len as f64 / (table_size as f64 * 2.0)
}

impl<K, V> SlotTables<K, V> {
    pub(crate) fn new<R: RngCore + ?Sized>(table_size: usize, rng: &mut R) -> Self {
        Self {
            entries: SlotMap::with_key(),
            tables: [vec![None; table_size], vec![None; table_size]],
            hashes: CuckooHash::pair(rng, table_size),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_hashes(table_size: usize, hashes: [CuckooHash; 2]) -> Self {
        Self {
            entries: SlotMap::with_key(),
            tables: [vec![None; table_size], vec![None; table_size]],
            hashes,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn table_size(&self) -> usize {
        self.tables[0].len()
    }

    #[cfg(test)]
    pub(crate) fn hashes(&self) -> &[CuckooHash; 2] {
        &self.hashes
    }

    /// Number of non-empty slots across both tables.
    #[cfg(test)]
    pub(crate) fn occupied_slots(&self) -> usize {
        self.tables
            .iter()
            .map(|t| t.iter().filter(|s| s.is_some()).count())
            .sum()
    }

    /// Entry stored at `(table, index)`, if any.
    pub(crate) fn slot(&self, table: usize, index: usize) -> Option<&Entry<K, V>> {
        self.tables[table][index].and_then(|k| self.entries.get(k))
    }

    /// Finds the slot holding `q` by checking its position in each table.
    fn locate<Q>(&self, digest: u32, q: &Q) -> Option<(usize, usize, DefaultKey)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        (0..2).find_map(|t| {
            let i = self.hashes[t].index(digest);
            let k = self.tables[t][i]?;
            self.entries
                .get(k)
                .filter(|e| e.digest == digest && e.key.borrow() == q)
                .map(|_| (t, i, k))
        })
    }

    pub(crate) fn get<Q>(&self, digest: u32, q: &Q) -> Option<&Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let (_, _, k) = self.locate(digest, q)?;
        self.entries.get(k)
    }

    pub(crate) fn get_mut<Q>(&mut self, digest: u32, q: &Q) -> Option<&mut Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let (_, _, k) = self.locate(digest, q)?;
        self.entries.get_mut(k)
    }

    pub(crate) fn remove<Q>(&mut self, digest: u32, q: &Q) -> Option<Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let (t, i, k) = self.locate(digest, q)?;
        self.tables[t][i] = None;
        self.entries.remove(k)
    }

    /// Takes every entry out, leaving empty tables of the same size and
    /// the same hash functions.
    pub(crate) fn take_all(&mut self) -> SlotMap<DefaultKey, Entry<K, V>> {
        for t in &mut self.tables {
            t.fill(None);
        }
        core::mem::take(&mut self.entries)
    }

    /// Stores a new entry without placing it in either table. The caller must
    /// follow up with [`Self::displace`] (and a rebuild if that fails).
    pub(crate) fn store(&mut self, key: K, value: V, digest: u32) -> DefaultKey {
        self.entries.insert(Entry { key, value, digest })
    }

    /// Cuckoo insertion of an already stored entry. Starting at table 0, the
    /// entry takes its slot; an evicted occupant moves on to its slot in the
    /// other table, and so on, for at most `len() + 1` rounds. Returns the
    /// entry still homeless when the bound runs out.
    pub(crate) fn displace(&mut self, mut k: DefaultKey) -> Option<DefaultKey> {
        let rounds = self.entries.len() + 1;
        let mut t = 0;
        for _ in 0..rounds {
            let i = self.hashes[t].index(self.entries[k].digest);
            match self.tables[t][i].replace(k) {
                None => return None,
                Some(evicted) => k = evicted,
            }
            t ^= 1;
        }
        Some(k)
    }

    /// Number of stored entries with this digest. Equal digests map to the
    /// same two slots under every hash pair, so more than two never fit.
    fn sharing(&self, digest: u32) -> usize {
        self.entries.values().filter(|e| e.digest == digest).count()
    }

    fn reset<R: RngCore + ?Sized>(&mut self, table_size: usize, rng: &mut R) {
        if table_size == self.table_size() {
            for t in &mut self.tables {
                t.fill(None);
            }
        } else {
            self.tables = [vec![None; table_size], vec![None; table_size]];
        }
        self.hashes = CuckooHash::pair(rng, table_size);
    }

    fn place_all(&mut self, keys: &[DefaultKey]) -> Result<(), DefaultKey> {
        for &k in keys {
            if let Some(homeless) = self.displace(k) {
                return Err(homeless);
            }
        }
        Ok(())
    }

    /// Regenerates both hash functions for `table_size` and places every
    /// stored entry again, restarting with fresh coefficients until all of
    /// them settle. With `escalate`, every [`MAX_REHASH_ATTEMPTS`] failures
    /// double the table size, up to [`MAX_ESCALATIONS`] times; past that it
    /// panics.
    fn rebuild<R: RngCore + ?Sized>(
        &mut self,
        mut table_size: usize,
        rng: &mut R,
        escalate: bool,
    ) {
        let keys: Vec<DefaultKey> = self.entries.keys().collect();
        let start = table_size;
        let mut attempts = 0usize;
        let mut escalations = 0u32;
        loop {
            self.reset(table_size, rng);
            match self.place_all(&keys) {
                Ok(()) => {
                    trace!(
                        "rehash placed {} entries in 2x{} slots after {} failed attempts",
                        keys.len(),
                        table_size,
                        attempts
                    );
                    return;
                }
                Err(_) => attempts += 1,
            }
            if escalate && attempts >= MAX_REHASH_ATTEMPTS {
                if escalations == MAX_ESCALATIONS {
                    panic!(
                        "failed to place {} entries after growing the tables from {} to {} slots each",
                        keys.len(),
                        start,
                        table_size
                    );
                }
                escalations += 1;
                let grown = table_size.checked_mul(2).expect("capacity overflow");
                warn!(
                    "{} rehash attempts failed at table size {}; growing to {}",
                    attempts, table_size, grown
                );
                table_size = grown;
                attempts = 0;
            }
        }
    }

    /// Rehash at the current size; never changes the table size.
    pub(crate) fn rehash<R: RngCore + ?Sized>(&mut self, rng: &mut R) {
        self.rebuild(self.table_size(), rng, false);
    }

    /// Recovery after [`Self::displace`] of the freshly stored `pending`
    /// left an entry homeless.
    ///
    /// Everything was placed before `pending` arrived, so the only input no
    /// table size can hold is `pending` being the third entry on its digest.
    /// That case takes `pending` back out of storage, rehashes the rest and
    /// returns it as the error.
    pub(crate) fn rehash_for_insert<R: RngCore + ?Sized>(
        &mut self,
        pending: DefaultKey,
        rng: &mut R,
    ) -> Result<(), Entry<K, V>> {
        let digest = self.entries[pending].digest;
        let shared = self.sharing(digest);
        if shared > 2 {
            if let Some(rejected) = self.entries.remove(pending) {
                warn!("rejecting entry: {} entries share digest {:#010x}", shared, digest);
                self.rebuild(self.table_size(), rng, true);
                return Err(rejected);
            }
        }
        self.rebuild(self.table_size(), rng, true);
        Ok(())
    }

    /// Doubles the table size until `len() + additional` entries fit under
    /// `max_load`, then rebuilds once at the final size.
    pub(crate) fn grow_for<R: RngCore + ?Sized>(
        &mut self,
        additional: usize,
        max_load: f64,
        rng: &mut R,
    ) {
        let needed = self.len().saturating_add(additional);
        let old = self.table_size();
        let mut size = old;
        while load(needed, size) > max_load {
            size = size.checked_mul(2).expect("capacity overflow");
        }
        if size != old {
            debug!(
                "growing cuckoo tables from {} to {} slots each ({} entries)",
                old,
                size,
                self.len()
            );
            self.rebuild(size, rng, true);
        }
    }
}

/// Immutable iterator over live entries in physical slot order: index 0 of
/// table 0, index 0 of table 1, index 1 of table 0, and so on.
pub struct Iter<'a, K, V> {
    tables: &'a SlotTables<K, V>,
    pos: usize,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(tables: &'a SlotTables<K, V>) -> Self {
        Self {
            tables,
            pos: 0,
            remaining: tables.len(),
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let tables = self.tables;
        let end = tables.table_size() * 2;
        while self.remaining > 0 && self.pos < end {
            let (i, t) = (self.pos / 2, self.pos % 2);
            self.pos += 1;
            if let Some(e) = tables.slot(t, i) {
                self.remaining -= 1;
                return Some((&e.key, &e.value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            tables: self.tables,
            pos: self.pos,
            remaining: self.remaining,
        }
    }
}

/// Mutable iterator over live entries, in storage order.
pub struct IterMut<'a, K, V> {
    it: slotmap::basic::IterMut<'a, DefaultKey, Entry<K, V>>,
}

impl<'a, K, V> IterMut<'a, K, V> {
    pub(crate) fn new(tables: &'a mut SlotTables<K, V>) -> Self {
        Self {
            it: tables.entries.iter_mut(),
        }
    }
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(_, e)| (&e.key, &mut e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}
