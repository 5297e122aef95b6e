//! Client-local tool shortlists: favorites and the comparison set.
//!
//! Both are ordered lists of tool ids persisted in the local namespace
//! and mutated only by explicit calls here. They never touch the storage
//! backend.

use crate::kv::Kv;
use crate::store::keys;

/// The comparison view holds at most this many tools.
pub const COMPARE_CAP: usize = 4;

#[derive(Clone)]
pub struct Favorites {
    kv: Kv,
}

impl Favorites {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    pub fn list(&self) -> Vec<i64> {
        self.kv.read_json(keys::FAVORITES).unwrap_or_default()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.list().contains(&id)
    }

    /// Add if absent, remove if present. Returns true when the tool is a
    /// favorite afterwards.
    pub fn toggle(&self, id: i64) -> bool {
        let mut ids = self.list();
        let now_favorite = if let Some(pos) = ids.iter().position(|x| *x == id) {
            ids.remove(pos);
            false
        } else {
            ids.push(id);
            true
        };
        self.persist(&ids);
        now_favorite
    }

    pub fn add(&self, id: i64) {
        let mut ids = self.list();
        if !ids.contains(&id) {
            ids.push(id);
            self.persist(&ids);
        }
    }

    pub fn remove(&self, id: i64) {
        let mut ids = self.list();
        let before = ids.len();
        ids.retain(|x| *x != id);
        if ids.len() != before {
            self.persist(&ids);
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.kv.remove(keys::FAVORITES) {
            tracing::warn!(error = %e, "failed to clear favorites");
        }
    }

    fn persist(&self, ids: &[i64]) {
        if let Err(e) = self.kv.write_json(keys::FAVORITES, &ids) {
            tracing::warn!(error = %e, "failed to persist favorites");
        }
    }
}

#[derive(Clone)]
pub struct CompareSet {
    kv: Kv,
}

impl CompareSet {
    pub fn new(kv: Kv) -> Self {
        Self { kv }
    }

    pub fn list(&self) -> Vec<i64> {
        self.kv.read_json(keys::COMPARE).unwrap_or_default()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.list().contains(&id)
    }

    /// Add a tool. Returns false, leaving the set unchanged, when the set
    /// already holds [`COMPARE_CAP`] tools or the tool is already in it.
    pub fn add(&self, id: i64) -> bool {
        let mut ids = self.list();
        if ids.contains(&id) || ids.len() >= COMPARE_CAP {
            return false;
        }
        ids.push(id);
        self.persist(&ids);
        true
    }

    pub fn remove(&self, id: i64) {
        let mut ids = self.list();
        let before = ids.len();
        ids.retain(|x| *x != id);
        if ids.len() != before {
            self.persist(&ids);
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.kv.remove(keys::COMPARE) {
            tracing::warn!(error = %e, "failed to clear comparison set");
        }
    }

    fn persist(&self, ids: &[i64]) {
        if let Err(e) = self.kv.write_json(keys::COMPARE, &ids) {
            tracing::warn!(error = %e, "failed to persist comparison set");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn kv() -> (TempDir, Kv) {
        let tmp = TempDir::new().unwrap();
        let kv = Kv::open(tmp.path()).unwrap();
        (tmp, kv)
    }

    #[test]
    fn toggle_flips_membership_and_keeps_order() {
        let (_tmp, kv) = kv();
        let favorites = Favorites::new(kv);

        assert!(favorites.toggle(3));
        assert!(favorites.toggle(1));
        assert!(favorites.toggle(2));
        assert_eq!(favorites.list(), [3, 1, 2]);

        assert!(!favorites.toggle(1));
        assert_eq!(favorites.list(), [3, 2]);

        favorites.clear();
        assert!(favorites.list().is_empty());
    }

    #[test]
    fn compare_refuses_a_fifth_tool() {
        let (_tmp, kv) = kv();
        let compare = CompareSet::new(kv);

        for id in 1..=4 {
            assert!(compare.add(id));
        }
        assert!(!compare.add(5));
        assert_eq!(compare.list(), [1, 2, 3, 4]);

        compare.remove(2);
        assert!(compare.add(5));
        assert_eq!(compare.list(), [1, 3, 4, 5]);
    }

    #[test]
    fn duplicate_adds_are_ignored() {
        let (_tmp, kv) = kv();
        let compare = CompareSet::new(kv);
        assert!(compare.add(1));
        assert!(!compare.add(1));
        assert_eq!(compare.list(), [1]);
    }
}
