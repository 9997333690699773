//! CuckooMap: public key-value API over the slot tables.

use crate::config::CuckooConfig;
use crate::cuckoo_hash::digest_of;
use crate::error::ConfigError;
use crate::reentrancy::DebugReentrancy;
use crate::slot_table::{load, Iter, IterMut, SlotTables};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use std::collections::hash_map::RandomState;
use std::fmt::Write as _;

/// A map using two-table cuckoo hashing.
///
/// Every key lives in one of exactly two slots: its position in table 0 or
/// its position in table 1. Lookups check both and nothing else. Inserts may
/// displace existing entries between the tables. Growth and rehashing happen
/// inside `put` and draw hash coefficients from the injected generator `R`.
///
/// Keys must have consistent `Eq` and `Hash` impls. Digests are 32 bits, and
/// the two slots of a key depend on its digest alone, so at most two distinct
/// keys with one digest fit. `put` of a third panics and leaves the map
/// holding the first two.
pub struct CuckooMap<K, V, S = RandomState, R = SmallRng> {
    tables: SlotTables<K, V>,
    hasher: S,
    rng: R,
    max_load_factor: f64,
    reentrancy: DebugReentrancy,
}

impl<K, V> CuckooMap<K, V>
where
    K: Eq + Hash,
{
    /// Empty map with the default configuration: 10 slots per table and a
    /// load factor threshold of 0.4.
    pub fn new() -> Self {
        Self::from_parts(
            CuckooConfig::default(),
            RandomState::new(),
            SmallRng::from_entropy(),
        )
    }

    /// Empty map with `initial_size` slots per table.
    pub fn with_capacity(initial_size: usize) -> Result<Self, ConfigError> {
        Self::with_config(CuckooConfig::default().with_initial_size(initial_size))
    }

    pub fn with_config(config: CuckooConfig) -> Result<Self, ConfigError> {
        Self::with_config_hasher_and_rng(config, RandomState::new(), SmallRng::from_entropy())
    }
}

impl<K, V> Default for CuckooMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, R> CuckooMap<K, V, S, R>
where
    K: Eq + Hash,
    S: BuildHasher,
    R: RngCore,
{
    /// Fully injected constructor: `hasher` produces key digests and `rng`
    /// supplies hash coefficients, so a seeded generator makes the table
    /// layout reproducible.
    pub fn with_config_hasher_and_rng(
        config: CuckooConfig,
        hasher: S,
        rng: R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(config, hasher, rng))
    }

    fn from_parts(config: CuckooConfig, hasher: S, mut rng: R) -> Self {
        Self {
            tables: SlotTables::new(config.initial_size, &mut rng),
            hasher,
            rng,
            max_load_factor: config.max_load_factor,
            reentrancy: DebugReentrancy::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.len() == 0
    }

    /// Slots per table. Total slot count is twice this.
    pub fn capacity(&self) -> usize {
        self.tables.table_size()
    }

    /// `len() / (2 * capacity())`.
    pub fn current_load(&self) -> f64 {
        load(self.tables.len(), self.tables.table_size())
    }

    pub fn max_load_factor(&self) -> f64 {
        self.max_load_factor
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let digest = digest_of(&self.hasher, q);
        self.tables.get(digest, q).map(|e| &e.value)
    }

    pub fn get_key_value<Q>(&self, q: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let digest = digest_of(&self.hasher, q);
        self.tables.get(digest, q).map(|e| (&e.key, &e.value))
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let digest = digest_of(&self.hasher, q);
        self.tables.get_mut(digest, q).map(|e| &mut e.value)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let digest = digest_of(&self.hasher, q);
        self.tables.get(digest, q).is_some()
    }

    /// Inserts or updates `key`. Returns the previous value for an existing
    /// key, which is overwritten in place without growing or rehashing.
    ///
    /// A new key first grows the tables if it would push the load above the
    /// threshold, then goes through cuckoo displacement. When displacement
    /// cannot settle, the tables are rehashed with fresh coefficients until
    /// every entry has a slot. Both growth and rehash touch every entry;
    /// use [`Self::reserve`] to size the map up front.
    ///
    /// # Panics
    ///
    /// If two other keys already share the digest of `key`. The map is left
    /// unchanged apart from a rehash.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let _g = self.reentrancy.enter();
        let digest = digest_of(&self.hasher, &key);
        if let Some(e) = self.tables.get_mut(digest, &key) {
            return Some(core::mem::replace(&mut e.value, value));
        }

        self.tables.grow_for(1, self.max_load_factor, &mut self.rng);
        let k = self.tables.store(key, value, digest);
        if self.tables.displace(k).is_some() {
            if let Err(rejected) = self.tables.rehash_for_insert(k, &mut self.rng) {
                drop(_g);
                drop(rejected);
                panic!("cannot place key: more than two keys share digest {digest:#010x}");
            }
        }
        None
    }

    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(q).map(|(_, v)| v)
    }

    /// Removes `q`, returning the stored key and value. Never shrinks or
    /// rehashes.
    pub fn remove_entry<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let digest = digest_of(&self.hasher, q);
        self.tables.remove(digest, q).map(|e| (e.key, e.value))
    }

    /// Removes every entry. Capacity and hash functions are kept.
    pub fn clear(&mut self) {
        let drained = {
            let _g = self.reentrancy.enter();
            self.tables.take_all()
        };
        // K/V destructors run outside the guarded section.
        drop(drained);
    }

    /// Grows ahead of time so that `additional` more keys can be inserted
    /// without triggering growth.
    pub fn reserve(&mut self, additional: usize) {
        let _g = self.reentrancy.enter();
        self.tables.grow_for(additional, self.max_load_factor, &mut self.rng);
    }

    /// Draws new hash coefficients and reinserts every entry at the current
    /// capacity, retrying with fresh coefficients until all entries settle.
    pub fn rehash(&mut self) {
        let _g = self.reentrancy.enter();
        self.tables.rehash(&mut self.rng);
    }
}

impl<K, V, S, R> CuckooMap<K, V, S, R> {
    /// Live entries in physical slot order. The order depends on the hash
    /// coefficients, not on insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.tables)
    }

    /// Live entries with mutable values, in unspecified order.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut::new(&mut self.tables)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Non-empty slots across both tables; equals `len()` between calls.
    #[cfg(test)]
    pub(crate) fn occupied_slots(&self) -> usize {
        self.tables.occupied_slots()
    }

    /// One line per slot index: the entry in table 0, a tab, the entry in
    /// table 1. Empty slots render as `-`.
    pub fn table_layout(&self) -> String
    where
        K: fmt::Debug,
        V: fmt::Debug,
    {
        let mut out = String::new();
        for i in 0..self.tables.table_size() {
            for t in 0..2 {
                if t == 1 {
                    out.push('\t');
                }
                match self.tables.slot(t, i) {
                    Some(e) => {
                        let _ = write!(out, "{:?}={:?}", e.key, e.value);
                    }
                    None => out.push('-'),
                }
            }
            out.push('\n');
        }
        out
    }
}

impl<'a, K, V, S, R> IntoIterator for &'a CuckooMap<K, V, S, R> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, S, R> fmt::Debug for CuckooMap<K, V, S, R>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_pcg::Pcg64;
    use std::collections::BTreeSet;
    use std::hash::Hasher;

    fn seeded<K: Eq + Hash, V>(seed: u64) -> CuckooMap<K, V, RandomState, Pcg64> {
        CuckooMap::with_config_hasher_and_rng(
            CuckooConfig::default(),
            RandomState::new(),
            Pcg64::seed_from_u64(seed),
        )
        .unwrap()
    }

    #[test]
    fn new_map_is_empty() {
        let m: CuckooMap<String, i32> = CuckooMap::new();
        assert_eq!(m.len(), 0);
        assert!(m.is_empty());
        assert_eq!(m.capacity(), 10);
        assert_eq!(m.current_load(), 0.0);
        assert_eq!(m.max_load_factor(), 0.4);
        assert_eq!(m.iter().count(), 0);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let r: Result<CuckooMap<String, i32>, _> = CuckooMap::with_capacity(0);
        assert!(matches!(r, Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn invalid_load_factor_is_rejected() {
        let cfg = CuckooConfig::default().with_max_load_factor(0.75);
        let r: Result<CuckooMap<String, i32>, _> = CuckooMap::with_config(cfg);
        assert!(matches!(r, Err(ConfigError::InvalidLoadFactor(_))));
    }

    /// Invariant: updating a key returns the old value, keeps one entry and
    /// leaves capacity alone.
    #[test]
    fn put_existing_key_updates_in_place() {
        let mut m = CuckooMap::new();
        assert_eq!(m.put("k".to_string(), 1), None);
        let cap = m.capacity();
        assert_eq!(m.put("k".to_string(), 2), Some(1));
        assert_eq!(m.len(), 1);
        assert_eq!(m.capacity(), cap);
        assert_eq!(m.get("k"), Some(&2));
        assert_eq!(m.iter().filter(|(k, _)| k.as_str() == "k").count(), 1);
    }

    #[test]
    fn borrowed_lookup_with_str() {
        let mut m = CuckooMap::new();
        m.put("hello".to_string(), 1);
        assert!(m.contains_key("hello"));
        assert!(!m.contains_key("world"));
        assert_eq!(m.get_key_value("hello"), Some((&"hello".to_string(), &1)));
    }

    #[test]
    fn get_mut_and_iter_mut_update_values() {
        let mut m = CuckooMap::new();
        for i in 0..5 {
            m.put(i, i * 10);
        }
        *m.get_mut(&3).unwrap() += 1;
        assert_eq!(m.get(&3), Some(&31));
        for (_, v) in m.iter_mut() {
            *v += 100;
        }
        let vals: BTreeSet<i32> = m.values().copied().collect();
        assert_eq!(vals, [100, 110, 120, 131, 140].into_iter().collect());
    }

    /// Invariant: removal clears the slot and decrements the count; absent
    /// keys yield `None`.
    #[test]
    fn remove_then_reinsert() {
        let mut m = CuckooMap::new();
        m.put("a".to_string(), 1);
        m.put("b".to_string(), 2);
        assert_eq!(m.remove("a"), Some(1));
        assert_eq!(m.remove("a"), None);
        assert_eq!(m.len(), 1);
        assert_eq!(m.occupied_slots(), 1);
        assert_eq!(m.put("a".to_string(), 3), None);
        assert_eq!(m.get("a"), Some(&3));
        assert_eq!(m.remove_entry("b"), Some(("b".to_string(), 2)));
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut m = CuckooMap::new();
        for i in 0..100 {
            m.put(i, i);
        }
        let cap = m.capacity();
        m.clear();
        assert!(m.is_empty());
        assert_eq!(m.capacity(), cap);
        assert_eq!(m.get(&1), None);
        m.put(1, 1);
        assert_eq!(m.get(&1), Some(&1));
    }

    /// Invariant: after growth triggered by the load factor, every entry
    /// occupies exactly one slot.
    #[test]
    fn growth_keeps_slot_count_in_sync() {
        let mut m = seeded(11);
        for i in 0..1000u32 {
            m.put(i, i);
            assert!(m.current_load() <= m.max_load_factor());
        }
        assert!(m.capacity() > 10);
        assert_eq!(m.len(), 1000);
        assert_eq!(m.occupied_slots(), 1000);
    }

    #[test]
    fn reserve_prevents_growth() {
        let mut m = seeded(12);
        m.reserve(500);
        let cap = m.capacity();
        assert!(500.0 / (2.0 * cap as f64) <= 0.4);
        for i in 0..500u32 {
            m.put(i, ());
        }
        assert_eq!(m.capacity(), cap);
    }

    /// Invariant: explicit rehash never changes capacity or the entry set.
    #[test]
    fn rehash_keeps_entries_and_capacity() {
        let mut m = seeded(13);
        for i in 0..5 {
            m.put(format!("key{i}"), format!("value{i}"));
        }
        let before: BTreeSet<(String, String)> =
            m.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let cap = m.capacity();
        for _ in 0..10 {
            m.rehash();
            let after: BTreeSet<_> = m.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            assert_eq!(after, before);
            assert_eq!(m.capacity(), cap);
        }
    }

    #[test]
    fn debug_and_layout_render_entries() {
        let mut m = seeded(14);
        m.put("a", 1);
        assert_eq!(format!("{:?}", m), r#"{"a": 1}"#);
        let layout = m.table_layout();
        assert_eq!(layout.lines().count(), 10);
        assert_eq!(layout.matches("\"a\"=1").count(), 1);
        assert!(layout.lines().all(|l| l.split('\t').count() == 2));
    }

    /// Invariant: lookups stay correct when every key shares one digest pair
    /// of slots with at most one other key.
    #[test]
    fn paired_digest_collisions_resolve_by_eq() {
        #[derive(Clone, Default)]
        struct PairBuildHasher;
        struct PairHasher(u64);
        impl BuildHasher for PairBuildHasher {
            type Hasher = PairHasher;
            fn build_hasher(&self) -> Self::Hasher {
                PairHasher(0)
            }
        }
        impl Hasher for PairHasher {
            fn write(&mut self, bytes: &[u8]) {
                for b in bytes {
                    self.0 = self.0.wrapping_mul(31).wrapping_add(*b as u64);
                }
            }
            fn write_u32(&mut self, n: u32) {
                // Keys 2k and 2k+1 collide.
                self.0 = ((n / 2) as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            }
            fn finish(&self) -> u64 {
                self.0
            }
        }

        let mut m: CuckooMap<u32, u32, PairBuildHasher, Pcg64> =
            CuckooMap::with_config_hasher_and_rng(
                CuckooConfig::default(),
                PairBuildHasher,
                Pcg64::seed_from_u64(5),
            )
            .unwrap();
        for i in 0..40 {
            m.put(i, i + 1);
        }
        for i in 0..40 {
            assert_eq!(m.get(&i), Some(&(i + 1)));
        }
        assert_eq!(m.len(), 40);
    }

    /// Invariant: a third key on one digest panics instead of growing the
    /// tables without bound, and the map still holds the first two.
    #[test]
    fn third_key_on_one_digest_panics_cleanly() {
        #[derive(Clone, Default)]
        struct ConstBuildHasher;
        struct ConstHasher;
        impl BuildHasher for ConstBuildHasher {
            type Hasher = ConstHasher;
            fn build_hasher(&self) -> Self::Hasher {
                ConstHasher
            }
        }
        impl Hasher for ConstHasher {
            fn write(&mut self, _bytes: &[u8]) {}
            fn finish(&self) -> u64 {
                7
            }
        }

        let mut m: CuckooMap<u32, (), ConstBuildHasher, Pcg64> =
            CuckooMap::with_config_hasher_and_rng(
                CuckooConfig::default(),
                ConstBuildHasher,
                Pcg64::seed_from_u64(6),
            )
            .unwrap();
        assert_eq!(m.put(0, ()), None);
        assert_eq!(m.put(1, ()), None);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            m.put(2, ());
        }));
        let payload = res.expect_err("third key must panic");
        let msg = payload
            .downcast_ref::<String>()
            .map(String::as_str)
            .unwrap_or_default();
        assert!(msg.contains("more than two keys share digest 0x00000007"), "{msg}");

        assert_eq!(m.len(), 2);
        assert_eq!(m.occupied_slots(), 2);
        assert_eq!(m.capacity(), 10);
        assert!(m.contains_key(&0) && m.contains_key(&1));
        assert!(!m.contains_key(&2));
        assert_eq!(m.put(1, ()), Some(()));
    }

    /// Invariant (debug-only): a key whose `Eq` re-enters the map panics.
    #[cfg(debug_assertions)]
    #[test]
    fn reentrancy_from_eq_panics() {
        struct ReentryKey {
            id: u32,
            map: *const CuckooMap<ReentryKey, i32>,
        }
        impl PartialEq for ReentryKey {
            fn eq(&self, other: &Self) -> bool {
                if !other.map.is_null() {
                    // Re-enter the same map while it compares keys.
                    unsafe {
                        let _ = (*other.map).contains_key(&ReentryKey {
                            id: 0,
                            map: core::ptr::null(),
                        });
                    }
                }
                self.id == other.id
            }
        }
        impl Eq for ReentryKey {}
        impl Hash for ReentryKey {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }

        let mut m: CuckooMap<ReentryKey, i32> = CuckooMap::new();
        m.put(
            ReentryKey {
                id: 1,
                map: core::ptr::null(),
            },
            1,
        );
        let query = ReentryKey {
            id: 1,
            map: &m as *const _,
        };
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = m.get(&query);
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
    }
}
