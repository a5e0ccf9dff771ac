//! Mutex-guarded maps with rewrite-on-mutation persistence.
//!
//! Every map shared between workers lives in a [`Store`]: a `HashMap`
//! behind an async mutex, bound to a snapshot path. Mutating accessors
//! snapshot before the lock is released, so the on-disk state never skips
//! ahead of a mutation another worker could still observe in memory.

use crate::persist;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;
use tokio::sync::{Mutex, MutexGuard};

/// Outcome of [`Store::try_insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was absent and has been inserted.
    Inserted,
    /// The key was present with an equal value; nothing changed.
    Unchanged,
    /// The key was present with a different value; nothing changed.
    Conflict,
}

pub struct Store<K, V> {
    path: PathBuf,
    map: Mutex<HashMap<K, V>>,
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Loads the snapshot at `path` if one exists, otherwise starts empty.
    pub fn load(path: PathBuf) -> crate::Result<Self> {
        let map = match persist::restore::<K, V>(&path)? {
            Some(entries) => entries.into_iter().collect(),
            None => HashMap::new(),
        };
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.map.lock().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.map.lock().await.contains_key(key)
    }

    /// Runs a read-only closure under the lock.
    pub async fn read<T>(&self, f: impl FnOnce(&HashMap<K, V>) -> T) -> T {
        f(&*self.map.lock().await)
    }

    /// Locks the map for a compound read spanning other stores.
    ///
    /// The guard is read-only by convention: mutations must go through
    /// [`Store::mutate`] so the snapshot stays in step.
    pub async fn guard(&self) -> MutexGuard<'_, HashMap<K, V>> {
        self.map.lock().await
    }

    /// Applies `f` under the lock and snapshots before releasing it.
    pub async fn mutate<T>(&self, f: impl FnOnce(&mut HashMap<K, V>) -> T) -> crate::Result<T> {
        let mut map = self.map.lock().await;
        let out = f(&mut map);
        self.write_snapshot(&map)?;
        Ok(out)
    }

    /// Inserts `value` only if `key` is absent, snapshotting on insert.
    pub async fn try_insert(&self, key: K, value: V) -> crate::Result<InsertOutcome>
    where
        V: PartialEq,
    {
        let mut map = self.map.lock().await;
        match map.get(&key) {
            Some(existing) if *existing == value => Ok(InsertOutcome::Unchanged),
            Some(_) => Ok(InsertOutcome::Conflict),
            None => {
                map.insert(key, value);
                self.write_snapshot(&map)?;
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    /// Removes `key`, snapshotting if it was present.
    pub async fn remove(&self, key: &K) -> crate::Result<bool> {
        let mut map = self.map.lock().await;
        if map.remove(key).is_none() {
            return Ok(false);
        }
        self.write_snapshot(&map)?;
        Ok(true)
    }

    /// Rewrites the snapshot from the current contents (shutdown path).
    pub async fn snapshot(&self) -> crate::Result<()> {
        let map = self.map.lock().await;
        self.write_snapshot(&map)
    }

    fn write_snapshot(&self, map: &HashMap<K, V>) -> crate::Result<()> {
        let entries: Vec<(K, V)> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        persist::snapshot(&entries, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_at(dir: &tempfile::TempDir) -> Store<(String, String), u32> {
        Store::load(dir.path().join("map.json")).unwrap()
    }

    #[tokio::test]
    async fn mutations_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        store
            .mutate(|m| {
                m.insert(("12345".into(), "photos".into()), 2);
            })
            .await
            .unwrap();

        let reloaded = store_at(&dir);
        assert_eq!(
            reloaded.get(&("12345".into(), "photos".into())).await,
            Some(2)
        );
    }

    #[tokio::test]
    async fn try_insert_reports_all_three_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        let key = ("12345".to_owned(), "docs".to_owned());

        assert_eq!(
            store.try_insert(key.clone(), 0).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.try_insert(key.clone(), 0).await.unwrap(),
            InsertOutcome::Unchanged
        );
        assert_eq!(
            store.try_insert(key.clone(), 9).await.unwrap(),
            InsertOutcome::Conflict
        );
        assert_eq!(store.get(&key).await, Some(0));
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        let key = ("12345".to_owned(), "docs".to_owned());

        assert!(!store.remove(&key).await.unwrap());
        store.try_insert(key.clone(), 1).await.unwrap();
        assert!(store.remove(&key).await.unwrap());
        assert!(!store.contains(&key).await);
    }
}
