use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use serde::Deserialize;

use presence_api::{LivenessStore, SubjectId, TimestampMs};

use crate::error::EngineError;

// ═══════════════════════════════════════════════════════════════
//  ShardedStore
// ═══════════════════════════════════════════════════════════════

/// In-memory store на DashMap: блокировка per-shard по хэшу subject id.
///
/// Операции над разными subject'ами не конкурируют за один lock,
/// snapshot sweeper'а держит read lock только одного shard'а за раз.
#[derive(Debug, Default)]
pub struct ShardedStore {
    entries: DashMap<SubjectId, TimestampMs>,
}

impl ShardedStore {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Явное число shard'ов. Должно быть степенью двойки и > 1.
    pub fn with_shards(shards: usize) -> Result<Self, EngineError> {
        if shards < 2 || !shards.is_power_of_two() {
            return Err(EngineError::config(
                "shards",
                format!("{shards} is not a power of two greater than 1"),
            ));
        }
        Ok(Self { entries: DashMap::with_shard_amount(shards) })
    }
}

impl LivenessStore for ShardedStore {
    fn put(&self, id: &SubjectId, ts: TimestampMs) {
        self.entries
            .entry(id.clone())
            .and_modify(|last| {
                if ts > *last {
                    *last = ts;
                }
            })
            .or_insert(ts);
    }

    fn get(&self, id: &SubjectId) -> Option<TimestampMs> {
        self.entries.get(id).map(|r| *r)
    }

    fn delete(&self, id: &SubjectId) {
        self.entries.remove(id);
    }

    fn snapshot_keys_older_than(&self, cutoff: TimestampMs) -> Vec<SubjectId> {
        self.entries
            .iter()
            .filter(|e| *e.value() < cutoff)
            .map(|e| e.key().clone())
            .collect()
    }

    fn remove_if_older_than(&self, id: &SubjectId, cutoff: TimestampMs) -> bool {
        self.entries.remove_if(id, |_, last| *last < cutoff).is_some()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ═══════════════════════════════════════════════════════════════
//  LockedStore
// ═══════════════════════════════════════════════════════════════

/// Один `RwLock<HashMap>` на весь store.
///
/// Корректен, но все writer'ы и sweep сериализуются на одном lock'е.
/// Это предел масштабирования при большом числе subject'ов, не ошибка.
#[derive(Debug, Default)]
pub struct LockedStore {
    entries: RwLock<HashMap<SubjectId, TimestampMs>>,
}

impl LockedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// Map держит только plain значения, poisoned lock безопасно переиспользовать.
impl LivenessStore for LockedStore {
    fn put(&self, id: &SubjectId, ts: TimestampMs) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(id.clone())
            .and_modify(|last| *last = (*last).max(ts))
            .or_insert(ts);
    }

    fn get(&self, id: &SubjectId) -> Option<TimestampMs> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(id).copied()
    }

    fn delete(&self, id: &SubjectId) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(id);
    }

    fn snapshot_keys_older_than(&self, cutoff: TimestampMs) -> Vec<SubjectId> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|(_, last)| **last < cutoff)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn remove_if_older_than(&self, id: &SubjectId, cutoff: TimestampMs) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(id) {
            Some(last) if *last < cutoff => {
                entries.remove(id);
                true
            }
            _ => false,
        }
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// ═══════════════════════════════════════════════════════════════
//  StoreKind
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Sharded,
    Locked,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Sharded => f.write_str("sharded"),
            StoreKind::Locked => f.write_str("locked"),
        }
    }
}

/// Создать store по виду из конфига. `shards` учитывается только для `Sharded`.
pub fn build_store(
    kind: StoreKind,
    shards: Option<usize>,
) -> Result<Arc<dyn LivenessStore>, EngineError> {
    match kind {
        StoreKind::Sharded => match shards {
            Some(n) => Ok(Arc::new(ShardedStore::with_shards(n)?)),
            None => Ok(Arc::new(ShardedStore::new())),
        },
        StoreKind::Locked => {
            if shards.is_some() {
                tracing::warn!("`shards` is ignored for the locked store");
            }
            Ok(Arc::new(LockedStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> Vec<(&'static str, Arc<dyn LivenessStore>)> {
        vec![
            ("sharded", Arc::new(ShardedStore::new())),
            ("locked", Arc::new(LockedStore::new())),
        ]
    }

    #[test]
    fn put_then_get() {
        for (name, store) in stores() {
            let id = SubjectId::from("a");
            assert_eq!(store.get(&id), None, "{name}");
            store.put(&id, 100);
            assert_eq!(store.get(&id), Some(100), "{name}");
            assert_eq!(store.len(), 1, "{name}");
        }
    }

    #[test]
    fn put_keeps_max_timestamp() {
        for (name, store) in stores() {
            let id = SubjectId::from("a");
            store.put(&id, 200);
            store.put(&id, 100);
            assert_eq!(store.get(&id), Some(200), "{name}");
            store.put(&id, 300);
            assert_eq!(store.get(&id), Some(300), "{name}");
            assert_eq!(store.len(), 1, "{name}");
        }
    }

    #[test]
    fn delete_is_idempotent() {
        for (name, store) in stores() {
            let id = SubjectId::from("a");
            store.delete(&id);
            store.put(&id, 1);
            store.delete(&id);
            store.delete(&id);
            assert_eq!(store.get(&id), None, "{name}");
            assert!(store.is_empty(), "{name}");
        }
    }

    #[test]
    fn snapshot_returns_only_strictly_older_keys() {
        for (name, store) in stores() {
            store.put(&"old".into(), 10);
            store.put(&"edge".into(), 50);
            store.put(&"new".into(), 90);
            let mut keys = store.snapshot_keys_older_than(50);
            keys.sort();
            assert_eq!(keys, vec![SubjectId::from("old")], "{name}");
        }
    }

    #[test]
    fn conditional_remove_spares_refreshed_entry() {
        for (name, store) in stores() {
            let id = SubjectId::from("a");
            store.put(&id, 10);
            let snapshot = store.snapshot_keys_older_than(50);
            assert_eq!(snapshot, vec![id.clone()], "{name}");

            // heartbeat между snapshot и remove
            store.put(&id, 60);
            assert!(!store.remove_if_older_than(&id, 50), "{name}");
            assert_eq!(store.get(&id), Some(60), "{name}");

            assert!(store.remove_if_older_than(&id, 61), "{name}");
            assert!(!store.remove_if_older_than(&id, 61), "{name}");
        }
    }

    #[test]
    fn concurrent_puts_converge_to_max() {
        for (name, store) in stores() {
            let id = SubjectId::from("racer");
            std::thread::scope(|s| {
                for t in 0..8i64 {
                    let store = &store;
                    let id = &id;
                    s.spawn(move || {
                        // потоки пишут в разном порядке: убывающие и возрастающие
                        for i in 0..1_000i64 {
                            let ts = if t % 2 == 0 { i * 8 + t } else { (999 - i) * 8 + t };
                            store.put(id, ts);
                        }
                    });
                }
            });
            assert_eq!(store.get(&id), Some(999 * 8 + 7), "{name}");
        }
    }

    #[test]
    fn concurrent_distinct_subjects() {
        for (name, store) in stores() {
            std::thread::scope(|s| {
                for t in 0..4 {
                    let store = &store;
                    s.spawn(move || {
                        for i in 0..250 {
                            store.put(&SubjectId::from(format!("{t}-{i}")), i);
                        }
                    });
                }
            });
            assert_eq!(store.len(), 1_000, "{name}");
        }
    }

    #[test]
    fn shard_amount_must_be_power_of_two() {
        assert!(ShardedStore::with_shards(64).is_ok());
        assert!(ShardedStore::with_shards(48).is_err());
        assert!(ShardedStore::with_shards(1).is_err());
    }

    #[test]
    fn build_store_by_kind() {
        let store = build_store(StoreKind::Locked, None).unwrap();
        store.put(&"a".into(), 1);
        assert_eq!(store.len(), 1);
        assert!(build_store(StoreKind::Sharded, Some(3)).is_err());
        assert!(build_store(StoreKind::Sharded, Some(16)).is_ok());
    }
}
